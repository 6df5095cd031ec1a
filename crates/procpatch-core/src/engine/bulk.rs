use std::fmt;

use tracing::{info, warn};

use super::PatchEngine;
use crate::error::{Error, Result};
use crate::events::Event;
use crate::memory::ProcessProvider;

/// How a bulk operation treats a failed item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BulkMode {
    /// Keep going; every item is attempted
    #[default]
    BestEffort,
    /// Stop at the first failure; later items depend on earlier ones
    Chain,
}

/// Aggregate result of a bulk operation, in processing order
#[derive(Debug, Default)]
pub struct BulkOutcome {
    pub succeeded: Vec<String>,
    /// Already in the requested state
    pub skipped: Vec<String>,
    pub failed: Vec<(String, Error)>,
    /// Never tried because an earlier failure halted the run
    pub not_attempted: Vec<String>,
}

impl BulkOutcome {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.not_attempted.is_empty()
    }

    pub fn failed_names(&self) -> Vec<&str> {
        self.failed.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Append `other` after this outcome
    pub fn merge(&mut self, other: BulkOutcome) {
        self.succeeded.extend(other.succeeded);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
        self.not_attempted.extend(other.not_attempted);
    }
}

impl fmt::Display for BulkOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} skipped, {} failed",
            self.succeeded.len(),
            self.skipped.len(),
            self.failed.len()
        )?;
        if !self.not_attempted.is_empty() {
            write!(f, ", {} not attempted", self.not_attempted.len())?;
        }
        Ok(())
    }
}

impl<P: ProcessProvider> PatchEngine<P> {
    /// Apply patches in the given order
    pub fn apply_all<S: AsRef<str>>(&mut self, names: &[S], mode: BulkMode) -> BulkOutcome {
        self.run_bulk(names, mode, |engine, name| engine.set_patch(name, true))
    }

    /// Remove patches in the given order. Callers removing a dependency
    /// sequence pass it reversed, or use [`Self::remove_chain`].
    pub fn remove_all<S: AsRef<str>>(&mut self, names: &[S], mode: BulkMode) -> BulkOutcome {
        self.run_bulk(names, mode, |engine, name| engine.set_patch(name, false))
    }

    /// Apply a catalogue chain root first, halting at the first failure
    pub fn apply_chain(&mut self, name: &str) -> Result<BulkOutcome> {
        let patches = self.chains.get(name).map(|c| c.patches.clone());
        let patches = self.finish(patches)?;
        info!("Applying chain {} ({} patches)", name, patches.len());
        Ok(self.apply_all(&patches, BulkMode::Chain))
    }

    /// Remove a catalogue chain in reverse order, halting at the first
    /// failure so no patch is removed while a dependent one is still active
    pub fn remove_chain(&mut self, name: &str) -> Result<BulkOutcome> {
        let patches = self.chains.get(name).map(|c| c.patches.clone());
        let mut patches = self.finish(patches)?;
        patches.reverse();
        info!("Removing chain {} ({} patches)", name, patches.len());
        Ok(self.remove_all(&patches, BulkMode::Chain))
    }

    /// Undo every active modification: unlocks, then bundles, then patches.
    ///
    /// Patches that belong to a chain are removed in reverse chain order
    /// before the rest, which go in reverse catalogue order.
    pub fn revert_all(&mut self) -> BulkOutcome {
        let unlocks: Vec<String> = self
            .unlocks
            .iter()
            .filter(|u| u.enabled && u.selectable)
            .map(|u| u.name.clone())
            .collect();
        let bundles: Vec<String> = self
            .bundles
            .iter()
            .filter(|b| b.enabled)
            .map(|b| b.name.clone())
            .collect();

        let mut patches: Vec<String> = Vec::new();
        for chain in self.chains.iter().rev() {
            for name in chain.patches.iter().rev() {
                if !patches.contains(name) {
                    patches.push(name.clone());
                }
            }
        }
        for patch in self.patches.iter().rev() {
            if !patches.contains(&patch.name) {
                patches.push(patch.name.clone());
            }
        }
        patches.retain(|name| self.patches.find(name).is_some_and(|p| p.enabled));

        let mut outcome = self.disable_unlocks(&unlocks, BulkMode::BestEffort);
        outcome.merge(self.disable_bundles(&bundles, BulkMode::BestEffort));
        outcome.merge(self.remove_all(&patches, BulkMode::BestEffort));
        info!("Revert: {}", outcome);
        outcome
    }

    /// Drive `op` over `names`. `op` returns `Ok(false)` for an item that is
    /// already in the requested state. A lost session ends the run in either
    /// mode since no later item can succeed.
    pub(super) fn run_bulk<S, F>(&mut self, names: &[S], mode: BulkMode, mut op: F) -> BulkOutcome
    where
        S: AsRef<str>,
        F: FnMut(&mut Self, &str) -> Result<bool>,
    {
        let mut outcome = BulkOutcome::default();
        let mut halted = false;

        for name in names {
            let name: &str = name.as_ref();
            if halted {
                outcome.not_attempted.push(name.to_string());
                continue;
            }

            match op(self, name) {
                Ok(true) => outcome.succeeded.push(name.to_string()),
                Ok(false) => outcome.skipped.push(name.to_string()),
                Err(e) => {
                    warn!("{}: {}", name, e);
                    self.push(Event::from(&e));
                    halted = mode == BulkMode::Chain || e.is_session_lost();
                    outcome.failed.push((name.to_string(), e));
                }
            }
        }

        if !outcome.not_attempted.is_empty() {
            warn!(
                "Stopped after failure; not attempted: {}",
                outcome.not_attempted.join(", ")
            );
        }
        outcome
    }
}
