use tracing::{debug, info, warn};

use super::{BulkMode, BulkOutcome, PatchEngine};
use crate::error::{Error, ErrorKind, Result};
use crate::events::Event;
use crate::memory::{ProcessProvider, write_protected};

impl<P: ProcessProvider> PatchEngine<P> {
    /// Write `1` to every address of the bundle.
    ///
    /// Not atomic: every address is attempted, and when any write fails the
    /// bundle stays disabled with `BundlePartial` returned, while the writes
    /// that did succeed are left in place.
    pub fn enable_bundle(&mut self, name: &str) -> Result<()> {
        let result = self.set_bundle(name, true).map(|_| ());
        self.finish(result)
    }

    /// Write `0` to every address of the bundle. Same partial-failure rules
    /// as [`Self::enable_bundle`].
    pub fn disable_bundle(&mut self, name: &str) -> Result<()> {
        let result = self.set_bundle(name, false).map(|_| ());
        self.finish(result)
    }

    pub fn toggle_bundle(&mut self, name: &str) -> Result<bool> {
        let result = self
            .bundles
            .get(name)
            .map(|b| !b.enabled)
            .and_then(|target| self.set_bundle(name, target).map(|_| target));
        self.finish(result)
    }

    pub fn enable_bundles<S: AsRef<str>>(&mut self, names: &[S], mode: BulkMode) -> BulkOutcome {
        self.run_bulk(names, mode, |engine, name| engine.set_bundle(name, true))
    }

    pub fn disable_bundles<S: AsRef<str>>(&mut self, names: &[S], mode: BulkMode) -> BulkOutcome {
        self.run_bulk(names, mode, |engine, name| engine.set_bundle(name, false))
    }

    pub fn enable_all_bundles(&mut self) -> BulkOutcome {
        let names = self.bundles.names();
        self.enable_bundles(&names, BulkMode::BestEffort)
    }

    pub fn disable_all_bundles(&mut self) -> BulkOutcome {
        let names = self.bundles.names();
        self.disable_bundles(&names, BulkMode::BestEffort)
    }

    pub(super) fn set_bundle(&mut self, name: &str, enable: bool) -> Result<bool> {
        let bundle = self.bundles.get(name)?;
        let (addresses, enabled) = (bundle.addresses.clone(), bundle.enabled);
        self.ensure_live()?;
        if enabled == enable {
            debug!("Bundle {} already {}", name, if enable { "enabled" } else { "disabled" });
            return Ok(false);
        }

        let value = [u8::from(enable)];
        let failed = self.with_process(|process| {
            let failed: Vec<(u64, ErrorKind)> = addresses
                .iter()
                .filter_map(|&address| match write_protected(process, address, &value) {
                    Ok(()) => None,
                    Err(e) => {
                        warn!("Bundle {}: write at {:#x} failed: {}", name, address, e);
                        Some((address, e.kind()))
                    }
                })
                .collect();
            Ok(failed)
        })?;

        if !failed.is_empty() {
            return Err(self.check_exit(Error::BundlePartial {
                name: name.to_string(),
                failed,
                total: addresses.len(),
            }));
        }

        self.bundles.get_mut(name)?.enabled = enable;
        if enable {
            info!("Bundle {} enabled ({} addresses)", name, addresses.len());
            self.push(Event::BundleEnabled(name.to_string()));
        } else {
            info!("Bundle {} disabled ({} addresses)", name, addresses.len());
            self.push(Event::BundleDisabled(name.to_string()));
        }
        Ok(true)
    }
}
