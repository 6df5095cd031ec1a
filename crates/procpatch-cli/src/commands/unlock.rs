use anyhow::{Result, bail};
use procpatch_core::BulkMode;

use super::{Session, Toggle, print_events, report_outcome};

pub fn run(session: &Session, action: Toggle, names: &[String], all: bool) -> Result<()> {
    if names.is_empty() && !all {
        bail!("Name at least one unlock item, or pass --all");
    }

    let mut engine = session.attach()?;

    let names: Vec<String> = if all {
        engine.selectable_unlocks().iter().map(|u| u.name.clone()).collect()
    } else {
        names.to_vec()
    };

    let outcome = match action {
        Toggle::Enable => engine.enable_unlocks(&names, BulkMode::BestEffort),
        Toggle::Disable => engine.disable_unlocks(&names, BulkMode::BestEffort),
        Toggle::Toggle => {
            let (on, off): (Vec<String>, Vec<String>) = names.into_iter().partition(|name| {
                engine.unlocks().find(name).is_some_and(|u| u.is_enabled())
            });
            let mut outcome = engine.disable_unlocks(&on, BulkMode::BestEffort);
            outcome.merge(engine.enable_unlocks(&off, BulkMode::BestEffort));
            outcome
        }
    };

    print_events(&mut engine);
    report_outcome(&outcome)
}
