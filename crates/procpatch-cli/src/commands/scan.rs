use anyhow::{Context, Result};
use procpatch_core::ByteSignature;

use super::{Session, print_events};

pub fn run(session: &Session, pattern: &str) -> Result<()> {
    let signature: ByteSignature = pattern
        .parse()
        .with_context(|| format!("Invalid pattern '{}'", pattern))?;

    let mut engine = session.engine()?;
    let attached = engine.attach();
    print_events(&mut engine);
    attached?;

    let found = engine.find_signature(&signature);
    print_events(&mut engine);

    match found? {
        Some(address) => println!("[{}] found at {:#x} in {}", signature, address, engine.module_name()),
        None => println!("[{}] not found in {}", signature, engine.module_name()),
    }
    Ok(())
}
