use tracing::{debug, info};

use super::{BulkMode, BulkOutcome, PatchEngine};
use crate::error::{Error, Result};
use crate::events::Event;
use crate::memory::{ProcessProvider, write_protected};

impl<P: ProcessProvider> PatchEngine<P> {
    /// Write `1` to the item's flag byte
    pub fn enable_unlock(&mut self, name: &str) -> Result<()> {
        let result = self.set_unlock(name, true).map(|_| ());
        self.finish(result)
    }

    /// Write `0` to the item's flag byte
    pub fn disable_unlock(&mut self, name: &str) -> Result<()> {
        let result = self.set_unlock(name, false).map(|_| ());
        self.finish(result)
    }

    /// Invert the item's current state; returns the new state
    pub fn toggle_unlock(&mut self, name: &str) -> Result<bool> {
        let result = self
            .unlocks
            .get(name)
            .map(|u| !u.enabled)
            .and_then(|target| self.set_unlock(name, target).map(|_| target));
        self.finish(result)
    }

    pub fn enable_unlocks<S: AsRef<str>>(&mut self, names: &[S], mode: BulkMode) -> BulkOutcome {
        self.run_bulk(names, mode, |engine, name| engine.set_unlock(name, true))
    }

    pub fn disable_unlocks<S: AsRef<str>>(&mut self, names: &[S], mode: BulkMode) -> BulkOutcome {
        self.run_bulk(names, mode, |engine, name| engine.set_unlock(name, false))
    }

    /// Enable every selectable item, continuing past failures
    pub fn enable_all_unlocks(&mut self) -> BulkOutcome {
        let names = self.selectable_names();
        self.enable_unlocks(&names, BulkMode::BestEffort)
    }

    /// Disable every selectable item, continuing past failures
    pub fn disable_all_unlocks(&mut self) -> BulkOutcome {
        let names = self.selectable_names();
        self.disable_unlocks(&names, BulkMode::BestEffort)
    }

    fn selectable_names(&self) -> Vec<String> {
        self.selectable_unlocks().iter().map(|u| u.name.clone()).collect()
    }

    /// Items that are not selectable are rejected without touching memory
    pub(super) fn set_unlock(&mut self, name: &str, enable: bool) -> Result<bool> {
        let item = self.unlocks.get(name)?;
        if !item.selectable {
            return Err(Error::NotSelectable(name.to_string()));
        }
        let (address, enabled) = (item.address, item.enabled);
        self.ensure_live()?;
        if enabled == enable {
            debug!("Unlock {} already {}", name, if enable { "enabled" } else { "disabled" });
            return Ok(false);
        }

        self.with_process(|process| write_protected(process, address, &[u8::from(enable)]))?;

        self.unlocks.get_mut(name)?.enabled = enable;
        if enable {
            info!("Unlock {} enabled at {:#x}", name, address);
            self.push(Event::UnlockEnabled(name.to_string()));
        } else {
            info!("Unlock {} disabled at {:#x}", name, address);
            self.push(Event::UnlockDisabled(name.to_string()));
        }
        Ok(true)
    }
}
