//! Live state of every catalogue entry.

use anyhow::Result;
use procpatch_core::SiteState;

use super::{Session, on_off, print_events};

pub fn run(session: &Session) -> Result<()> {
    let mut engine = session.attach()?;

    if let Some(info) = engine.process_info() {
        println!("Process: {} (pid {})", info.name, info.pid);
    }

    println!();
    println!("Patches:");
    for name in engine.patches().names() {
        let state = match engine.inspect_patch(&name) {
            Ok(SiteState::Original) => "off".to_string(),
            Ok(SiteState::Patched) => "on".to_string(),
            Ok(SiteState::Unknown(bytes)) => {
                format!("unknown ({})", procpatch_core::format_hex_bytes(&bytes))
            }
            Err(e) => format!("unresolved ({})", e),
        };
        let address = engine
            .cached_address(&name)
            .map(|a| format!("{:#x}", a))
            .unwrap_or_else(|| "-".to_string());
        println!("  {:<24} {:<14} {}", name, address, state);
    }
    // resolution failures are already shown inline
    engine.drain_events();

    println!();
    println!("Unlocks:");
    for unlock in engine.unlocks().iter() {
        println!("  {:<24} {:#x}  {}", unlock.name, unlock.address, on_off(unlock.is_enabled()));
    }

    println!();
    println!("Bundles:");
    for bundle in engine.bundles().iter() {
        println!("  {:<24} {}", bundle.name, on_off(bundle.is_enabled()));
    }

    engine.detach();
    print_events(&mut engine);
    Ok(())
}
