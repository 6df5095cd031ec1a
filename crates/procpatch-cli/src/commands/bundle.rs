use anyhow::{Result, bail};
use procpatch_core::BulkMode;

use super::{Session, Toggle, print_events, report_outcome};

pub fn run(session: &Session, action: Toggle, names: &[String], all: bool) -> Result<()> {
    if names.is_empty() && !all {
        bail!("Name at least one bundle, or pass --all");
    }

    let mut engine = session.attach()?;

    let names = if all { engine.bundles().names() } else { names.to_vec() };

    let outcome = match action {
        Toggle::Enable => engine.enable_bundles(&names, BulkMode::BestEffort),
        Toggle::Disable => engine.disable_bundles(&names, BulkMode::BestEffort),
        Toggle::Toggle => {
            let (on, off): (Vec<String>, Vec<String>) = names.into_iter().partition(|name| {
                engine.bundles().find(name).is_some_and(|b| b.is_enabled())
            });
            let mut outcome = engine.disable_bundles(&on, BulkMode::BestEffort);
            outcome.merge(engine.enable_bundles(&off, BulkMode::BestEffort));
            outcome
        }
    };

    print_events(&mut engine);
    report_outcome(&outcome)
}
