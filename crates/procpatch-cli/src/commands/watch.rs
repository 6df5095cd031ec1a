//! Keep a profile applied for as long as the command runs.
//!
//! Waits for the target, applies the profile, then polls liveness. When the
//! target restarts the profile is applied to the new process. Ctrl+C reverts
//! everything and detaches.

use anyhow::{Result, bail};
use procpatch_core::config::timing::{ATTACH_RETRY_INTERVAL, LIVENESS_POLL_INTERVAL};
use procpatch_core::{BulkMode, Error};
use tracing::{debug, info, warn};

use super::{Engine, Session, print_events};
use crate::stop::{StopSignal, Wake};

/// Entries to keep applied
pub struct Profile {
    pub patches: Vec<String>,
    pub chains: Vec<String>,
    pub unlocks: Vec<String>,
    pub bundles: Vec<String>,
}

impl Profile {
    fn is_empty(&self) -> bool {
        self.patches.is_empty() && self.chains.is_empty() && self.unlocks.is_empty() && self.bundles.is_empty()
    }
}

pub fn run(session: &Session, profile: Profile) -> Result<()> {
    if profile.is_empty() {
        bail!("Nothing to watch: pass --patch, --chain, --unlock or --bundle");
    }

    let mut engine = session.engine()?;
    check_profile(&engine, &profile)?;

    let mut stop = StopSignal::install()?;
    println!("Waiting for {}... (Ctrl+C to stop)", engine.process_name());

    while !stop.is_stopped() {
        match engine.attach() {
            Ok(info) => {
                debug!("Attached to pid {}", info.pid);
                if let Err(e) = engine.refresh_state() {
                    warn!("Failed to read current state: {}", e);
                }
                apply_profile(&mut engine, &profile);
                print_events(&mut engine);

                match stop.hold(&mut engine, LIVENESS_POLL_INTERVAL) {
                    Wake::Stop => break,
                    Wake::TargetExited => {
                        print_events(&mut engine);
                        println!("Target exited, waiting for restart...");
                    }
                }
            }
            Err(Error::ProcessNotFound(_)) => {
                // not running yet
                engine.drain_events();
            }
            Err(e) => {
                print_events(&mut engine);
                return Err(e.into());
            }
        }

        stop.wait(ATTACH_RETRY_INTERVAL);
    }

    if engine.is_attached() {
        let outcome = engine.revert_all();
        info!("Reverted: {}", outcome);
        engine.detach();
    }
    print_events(&mut engine);
    Ok(())
}

fn check_profile(engine: &Engine, profile: &Profile) -> Result<()> {
    for name in &profile.patches {
        engine.patches().get(name)?;
    }
    for name in &profile.chains {
        engine.chains().get(name)?;
    }
    for name in &profile.unlocks {
        if !engine.unlocks().get(name)?.selectable {
            return Err(Error::NotSelectable(name.clone()).into());
        }
    }
    for name in &profile.bundles {
        engine.bundles().get(name)?;
    }
    Ok(())
}

fn apply_profile(engine: &mut Engine, profile: &Profile) {
    for chain in &profile.chains {
        match engine.apply_chain(chain) {
            Ok(outcome) => info!("Chain {}: {}", chain, outcome),
            Err(e) => warn!("Chain {}: {}", chain, e),
        }
    }

    let patches = engine.apply_all(&profile.patches, BulkMode::BestEffort);
    let unlocks = engine.enable_unlocks(&profile.unlocks, BulkMode::BestEffort);
    let bundles = engine.enable_bundles(&profile.bundles, BulkMode::BestEffort);
    info!("Profile applied: patches {}; unlocks {}; bundles {}", patches, unlocks, bundles);
}
