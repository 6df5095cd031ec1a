//! CLI command implementations.
//!
//! One-shot commands attach, reconcile flags with target memory, act, and
//! leave their modifications in place when they exit. `watch` is the only
//! command that reverts on its way out.

pub mod bundle;
pub mod chain;
pub mod hex;
pub mod list;
pub mod patch;
pub mod peek;
pub mod scan;
pub mod status;
pub mod unlock;
pub mod watch;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use procpatch_core::{
    BulkOutcome, Catalog, EngineConfig, Event, PatchEngine, SystemProvider, is_elevated,
    load_catalog,
};
use tracing::{debug, warn};

pub type Engine = PatchEngine<SystemProvider>;

/// Requested state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Toggle {
    Enable,
    Disable,
    Toggle,
}

/// Global options shared by every command
pub struct Session {
    pub catalog: PathBuf,
    pub process: Option<String>,
    pub module: Option<String>,
    pub chunk_size: Option<usize>,
}

impl Session {
    pub fn load_catalog(&self) -> Result<Catalog> {
        load_catalog(&self.catalog)
            .with_context(|| format!("Failed to load catalog {}", self.catalog.display()))
    }

    pub fn engine(&self) -> Result<Engine> {
        let mut builder = EngineConfig::builder();
        if let Some(process) = &self.process {
            builder = builder.process(process.as_str());
        }
        if let Some(module) = &self.module {
            builder = builder.module(module.as_str());
        }
        if let Some(chunk_size) = self.chunk_size {
            builder = builder.chunk_size(chunk_size);
        }

        let engine = PatchEngine::with_config(SystemProvider, self.load_catalog()?, builder.build())?;
        Ok(engine)
    }

    /// Build an engine, attach to the target and read back current state
    pub fn attach(&self) -> Result<Engine> {
        let mut engine = self.engine()?;

        if is_elevated() == Some(false) {
            warn!("Not running elevated; opening the target may be denied");
        }

        let attached = engine.attach();
        print_events(&mut engine);
        attached?;

        engine.refresh_state()?;
        Ok(engine)
    }
}

/// Print and clear the engine's queued notifications
pub fn print_events(engine: &mut Engine) {
    for event in engine.drain_events() {
        match event {
            Event::Error { .. } => eprintln!("  ! {}", event),
            _ => println!("  {}", event),
        }
    }
}

/// Summarise a bulk run and fail if any item failed
pub fn report_outcome(outcome: &BulkOutcome) -> Result<()> {
    println!("{}", outcome);
    for (name, error) in &outcome.failed {
        debug!("{} failed: {:?}", name, error);
    }
    if !outcome.not_attempted.is_empty() {
        println!("Not attempted: {}", outcome.not_attempted.join(", "));
    }
    if !outcome.is_success() {
        bail!("{} item(s) failed", outcome.failed.len() + outcome.not_attempted.len());
    }
    Ok(())
}

pub fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}
