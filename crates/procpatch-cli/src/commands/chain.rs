use anyhow::Result;

use super::{Session, Toggle, print_events, report_outcome};

pub fn run(session: &Session, action: Toggle, name: &str) -> Result<()> {
    let mut engine = session.attach()?;

    let apply = match action {
        Toggle::Enable => true,
        Toggle::Disable => false,
        // a chain counts as applied only when every member is
        Toggle::Toggle => {
            let chain = engine.chains().get(name)?;
            !chain
                .patches
                .iter()
                .all(|p| engine.patches().find(p).is_some_and(|spec| spec.is_enabled()))
        }
    };

    let outcome = if apply {
        engine.apply_chain(name)
    } else {
        engine.remove_chain(name)
    };

    print_events(&mut engine);
    report_outcome(&outcome?)
}
