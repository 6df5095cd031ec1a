use tracing::{debug, info};

use super::PatchEngine;
use crate::error::{Error, Result};
use crate::events::Event;
use crate::memory::{ProcessProvider, ReadMemory, write_protected};
use crate::scan::format_hex_bytes;

/// What a patch site currently holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteState {
    Original,
    Patched,
    /// Neither form; carries the bytes found
    Unknown(Vec<u8>),
}

impl<P: ProcessProvider> PatchEngine<P> {
    /// Write a patch's replacement bytes.
    ///
    /// The site is resolved from the session cache or by scanning the target
    /// module. Applying an enabled patch is a no-op.
    pub fn apply_patch(&mut self, name: &str) -> Result<()> {
        let result = self.set_patch(name, true).map(|_| ());
        self.finish(result)
    }

    /// Restore a patch's original bytes.
    ///
    /// The site is always resolved and written, whatever the flag says, so a
    /// patch left in place by an earlier session can be removed without a
    /// [`Self::refresh_state`] first.
    pub fn remove_patch(&mut self, name: &str) -> Result<()> {
        let result = self.patches.get(name).map(|_| ()).and_then(|()| self.write_patch(name, false));
        self.finish(result)
    }

    /// Remove if enabled, else apply; returns the new state
    pub fn toggle_patch(&mut self, name: &str) -> Result<bool> {
        let result = self
            .patches
            .get(name)
            .map(|p| !p.enabled)
            .and_then(|target| self.set_patch(name, target).map(|_| target));
        self.finish(result)
    }

    /// Read the patch site and compare against both byte forms
    pub fn inspect_patch(&mut self, name: &str) -> Result<SiteState> {
        let result = self.read_site(name);
        self.finish(result)
    }

    /// Reconcile every flag with the bytes currently in the target.
    ///
    /// A flag only changes when its read succeeds; entries whose site cannot
    /// be resolved or read keep their current state.
    pub fn refresh_state(&mut self) -> Result<()> {
        let result = self.ensure_live();
        if result.is_ok() {
            self.reconcile();
        }
        self.finish(result)
    }

    /// Apply (`enable = true`) or remove; `Ok(false)` when already there
    pub(super) fn set_patch(&mut self, name: &str, enable: bool) -> Result<bool> {
        let enabled = self.patches.get(name)?.enabled;
        self.ensure_live()?;
        if enabled == enable {
            debug!("Patch {} already {}", name, if enable { "applied" } else { "removed" });
            return Ok(false);
        }

        self.write_patch(name, enable)?;
        Ok(true)
    }

    /// Resolve the site and write one of the patch's byte forms
    fn write_patch(&mut self, name: &str, enable: bool) -> Result<()> {
        let site = self.resolve_site(name)?;
        let spec = self.patches.get(name)?;
        let bytes = if enable { spec.patched.clone() } else { spec.original.clone() };

        self.with_process(|process| write_protected(process, site, &bytes))?;

        self.patches.get_mut(name)?.enabled = enable;
        if enable {
            info!("Applied patch {} at {:#x} [{}]", name, site, format_hex_bytes(&bytes));
            self.push(Event::PatchApplied(name.to_string()));
        } else {
            info!("Removed patch {} at {:#x}", name, site);
            self.push(Event::PatchRemoved(name.to_string()));
        }
        Ok(())
    }

    /// Absolute address of the bytes a patch rewrites
    fn resolve_site(&mut self, name: &str) -> Result<u64> {
        self.ensure_live()?;

        let module = self.module_name().to_string();
        let chunk_size = self.config.chunk_size;
        let spec = self.patches.get(name)?;
        let offset = spec.offset;
        let session = self.session.as_mut().ok_or(Error::NotAttached)?;

        let resolved = session.resolve(spec, &module, chunk_size);
        let matched = resolved.map_err(|e| self.check_exit(e))?;

        matched.checked_add_signed(offset).ok_or_else(|| {
            Error::InvalidCatalog(format!("patch {} offset overflows the address space", name))
        })
    }

    fn read_site(&mut self, name: &str) -> Result<SiteState> {
        let site = self.resolve_site(name)?;
        let spec = self.patches.get(name)?;
        let (original, patched) = (spec.original.clone(), spec.patched.clone());

        let bytes = self.with_process(|process| process.read_exact(site, original.len()))?;
        Ok(if bytes == patched {
            SiteState::Patched
        } else if bytes == original {
            SiteState::Original
        } else {
            SiteState::Unknown(bytes)
        })
    }

    fn reconcile(&mut self) {
        for name in self.patches.names() {
            match self.read_site(&name) {
                Ok(state) => {
                    if let Ok(spec) = self.patches.get_mut(&name) {
                        spec.enabled = state == SiteState::Patched;
                    }
                }
                Err(e) => debug!("Patch {} not refreshed: {}", name, e),
            }
        }

        let Some(session) = self.session.as_ref() else {
            return;
        };

        for item in self.unlocks.iter_mut() {
            match session.process.read_u8(item.address) {
                Ok(value) => item.enabled = value != 0,
                Err(e) => debug!("Unlock {} not refreshed: {}", item.name, e),
            }
        }

        for bundle in self.bundles.iter_mut() {
            let values: Result<Vec<u8>> = bundle
                .addresses
                .iter()
                .map(|&address| session.process.read_u8(address))
                .collect();
            match values {
                Ok(values) => bundle.enabled = values.iter().all(|&v| v != 0),
                Err(e) => debug!("Bundle {} not refreshed: {}", bundle.name, e),
            }
        }

        info!(
            "State refreshed: {} patches, {} unlocks, {} bundles enabled",
            self.patches.iter().filter(|p| p.enabled).count(),
            self.unlocks.iter().filter(|u| u.enabled).count(),
            self.bundles.iter().filter(|b| b.enabled).count()
        );
    }
}
