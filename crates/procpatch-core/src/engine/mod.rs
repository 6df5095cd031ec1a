//! Patch engine
//!
//! [`PatchEngine`] owns the process capability for one attach session, the
//! name to address cache, and the typed registries of patches, unlock items,
//! bundles and patch chains. Every mutating entry point takes `&mut self`;
//! callers that share an engine across threads wrap it in a `Mutex`.
//!
//! Flags move only after a memory operation has been confirmed. Failures are
//! returned to the caller and also queued as [`Event::Error`] notifications.

mod bulk;
mod bundle;
mod patch;
mod session;
mod unlock;

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::catalog::{Bundle, Catalog, PatchChain, PatchSpec, TargetSpec, UnlockItem};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::events::Event;
use crate::memory::{ProcessInfo, ProcessMemory, ProcessProvider};
use crate::registry::Registry;

pub use bulk::{BulkMode, BulkOutcome};
pub use patch::SiteState;

use session::Session;

pub struct PatchEngine<P: ProcessProvider> {
    provider: P,
    config: EngineConfig,
    target: TargetSpec,
    patches: Registry<PatchSpec>,
    unlocks: Registry<UnlockItem>,
    bundles: Registry<Bundle>,
    chains: Registry<PatchChain>,
    session: Option<Session<P::Process>>,
    events: VecDeque<Event>,
}

impl<P: ProcessProvider> PatchEngine<P> {
    pub fn new(provider: P, catalog: Catalog) -> Result<Self> {
        Self::with_config(provider, catalog, EngineConfig::default())
    }

    pub fn with_config(provider: P, catalog: Catalog, config: EngineConfig) -> Result<Self> {
        catalog.validate()?;

        Ok(Self {
            provider,
            config,
            target: catalog.target,
            patches: Registry::new(catalog.patches)?,
            unlocks: Registry::new(catalog.unlocks)?,
            bundles: Registry::new(catalog.bundles)?,
            chains: Registry::new(catalog.chains)?,
            session: None,
            events: VecDeque::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Process image name this engine attaches to
    pub fn process_name(&self) -> &str {
        self.config.process.as_deref().unwrap_or(&self.target.process)
    }

    /// Module scanned for patch signatures
    pub fn module_name(&self) -> &str {
        self.config
            .module
            .as_deref()
            .or(self.target.module.as_deref())
            .or(self.config.process.as_deref())
            .unwrap_or(&self.target.process)
    }

    pub fn patches(&self) -> &Registry<PatchSpec> {
        &self.patches
    }

    pub fn unlocks(&self) -> &Registry<UnlockItem> {
        &self.unlocks
    }

    pub fn bundles(&self) -> &Registry<Bundle> {
        &self.bundles
    }

    pub fn chains(&self) -> &Registry<PatchChain> {
        &self.chains
    }

    /// Identity of the attached process, without a liveness check
    pub fn process_info(&self) -> Option<&ProcessInfo> {
        self.session.as_ref().map(|s| s.process.info())
    }

    /// Items that may be toggled individually, in catalogue order
    pub fn selectable_unlocks(&self) -> Vec<&UnlockItem> {
        self.unlocks.iter().filter(|u| u.selectable).collect()
    }

    pub fn unlocks_in_category(&self, category: &str) -> Vec<&UnlockItem> {
        self.unlocks
            .iter()
            .filter(|u| u.category.as_deref() == Some(category))
            .collect()
    }

    /// Take every queued notification, oldest first
    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    fn push(&mut self, event: Event) {
        self.events.push_back(event);
    }

    /// Queue an error notification for a failed entry point
    fn finish<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            match e {
                // expected while polling for the target to start
                Error::ProcessNotFound(_) => debug!("{}", e),
                _ => warn!("{}", e),
            }
            self.events.push_back(Event::from(e));
        }
        result
    }
}


#[cfg(test)]
mod tests {
    use super::fixture::*;
    use super::*;
    use crate::config::EngineConfig;
    use crate::memory::MockProvider;

    #[test]
    fn test_rejects_invalid_catalog() {
        let mut catalog = catalog();
        catalog.patches[0].patched.push(0x90);
        assert!(PatchEngine::new(MockProvider::new(), catalog).is_err());
    }

    #[test]
    fn test_target_names_follow_overrides() {
        let engine = PatchEngine::new(MockProvider::new(), catalog()).unwrap();
        assert_eq!(engine.process_name(), "game.exe");
        assert_eq!(engine.module_name(), "game.exe");

        let config = EngineConfig::builder().process("other.exe").build();
        let engine = PatchEngine::with_config(MockProvider::new(), catalog(), config).unwrap();
        assert_eq!(engine.process_name(), "other.exe");
        assert_eq!(engine.module_name(), "other.exe");

        let config = EngineConfig::builder().module("engine.dll").build();
        let engine = PatchEngine::with_config(MockProvider::new(), catalog(), config).unwrap();
        assert_eq!(engine.module_name(), "engine.dll");
    }

    #[test]
    fn test_unlock_queries() {
        let engine = PatchEngine::new(MockProvider::new(), catalog()).unwrap();
        let selectable: Vec<_> = engine.selectable_unlocks().iter().map(|u| u.name.as_str()).collect();
        assert_eq!(selectable, vec!["costume_a", "costume_b"]);

        let costumes: Vec<_> = engine
            .unlocks_in_category("costumes")
            .iter()
            .map(|u| u.name.as_str())
            .collect();
        assert_eq!(costumes, vec!["costume_a", "platform_only"]);
        assert!(engine.unlocks_in_category("weapons").is_empty());
    }
}
