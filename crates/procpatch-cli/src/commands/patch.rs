use anyhow::Result;
use procpatch_core::BulkMode;

use super::{Session, Toggle, print_events, report_outcome};

pub fn run(session: &Session, action: Toggle, names: &[String]) -> Result<()> {
    let mut engine = session.attach()?;

    let outcome = match action {
        Toggle::Enable => engine.apply_all(names, BulkMode::BestEffort),
        Toggle::Disable => engine.remove_all(names, BulkMode::BestEffort),
        Toggle::Toggle => {
            let (on, off): (Vec<String>, Vec<String>) = names.iter().cloned().partition(|name| {
                engine.patches().find(name).is_some_and(|p| p.is_enabled())
            });
            let mut outcome = engine.remove_all(&on, BulkMode::BestEffort);
            outcome.merge(engine.apply_all(&off, BulkMode::BestEffort));
            outcome
        }
    };

    print_events(&mut engine);
    report_outcome(&outcome)
}
