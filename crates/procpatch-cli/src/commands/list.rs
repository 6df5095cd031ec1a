//! Catalogue listing; does not attach.

use anyhow::Result;
use procpatch_core::format_hex_bytes;

use super::Session;

pub fn run(session: &Session) -> Result<()> {
    let catalog = session.load_catalog()?;

    println!(
        "Target: {} (module {})",
        catalog.target.process,
        catalog.target.module_name()
    );
    if !catalog.version.is_empty() {
        println!("Catalog version: {}", catalog.version);
    }

    println!();
    println!("Patches ({}):", catalog.patches.len());
    for patch in &catalog.patches {
        println!(
            "  {:<24} [{}] {:+#x}  {} -> {}",
            patch.name,
            patch.signature,
            patch.offset,
            format_hex_bytes(&patch.original),
            format_hex_bytes(&patch.patched)
        );
        if !patch.description.is_empty() {
            println!("  {:<24} {}", "", patch.description);
        }
    }

    if !catalog.chains.is_empty() {
        println!();
        println!("Chains ({}):", catalog.chains.len());
        for chain in &catalog.chains {
            println!("  {:<24} {}", chain.name, chain.patches.join(" -> "));
        }
    }

    println!();
    println!("Unlocks ({}):", catalog.unlocks.len());
    for unlock in &catalog.unlocks {
        println!(
            "  {:<24} {:#x}  {:<12} {}{}",
            unlock.name,
            unlock.address,
            unlock.category.as_deref().unwrap_or("-"),
            if unlock.selectable { "" } else { "(not selectable) " },
            unlock.description
        );
    }

    println!();
    println!("Bundles ({}):", catalog.bundles.len());
    for bundle in &catalog.bundles {
        println!(
            "  {:<24} {} addresses  {}",
            bundle.name,
            bundle.addresses.len(),
            bundle.description
        );
    }

    Ok(())
}
