//! Catalogue of modifications for one target binary
//!
//! The catalogue is external configuration: which process and module to
//! attach to, the signature-based code patches, the single-byte unlock flags,
//! the bundles of flags, and the ordered patch chains that encode which
//! patches depend on which.
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "target": { "process": "game.exe" },
//!   "patches": [
//!     { "name": "skip_check", "signature": "74 4F 8B 05", "offset": 0,
//!       "original": "74 4F", "patched": "90 90" }
//!   ],
//!   "unlocks": [
//!     { "name": "costume_a", "address": "0x140752038", "category": "costumes" }
//!   ],
//!   "bundles": [
//!     { "name": "starter_pack", "addresses": ["0x140752040", "0x140752041"] }
//!   ],
//!   "chains": [
//!     { "name": "unlock_all", "patches": ["bounds_bypass", "dl_bypass"] }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EntryKind, Error, Result};
use crate::registry::Entry;
use crate::scan::ByteSignature;

/// Process and module the catalogue applies to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSpec {
    /// Image name of the process, e.g. `game.exe`
    pub process: String,
    /// Module scanned for signatures; defaults to the process image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
}

impl TargetSpec {
    pub fn module_name(&self) -> &str {
        self.module.as_deref().unwrap_or(&self.process)
    }
}

/// Signature-located code patch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub signature: ByteSignature,
    /// Distance from the start of the signature match to the patch site
    #[serde(default)]
    pub offset: i64,
    #[serde(with = "hex_bytes")]
    pub original: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub patched: Vec<u8>,
    #[serde(skip)]
    pub(crate) enabled: bool,
}

impl PatchSpec {
    pub fn new(name: &str, signature: ByteSignature, offset: i64, original: &[u8], patched: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            signature,
            offset,
            original: original.to_vec(),
            patched: patched.to_vec(),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Signature as it reads once this patch is in place, if the patch
    /// overlaps it
    pub fn patched_signature(&self) -> Option<ByteSignature> {
        self.signature.overlay(self.offset, &self.patched)
    }

    fn validate(&self) -> Result<()> {
        if self.signature.is_empty() {
            return Err(Error::InvalidCatalog(format!("patch {} has an empty signature", self.name)));
        }
        if self.original.is_empty() {
            return Err(Error::InvalidCatalog(format!("patch {} has no bytes", self.name)));
        }
        if self.original.len() != self.patched.len() {
            return Err(Error::InvalidCatalog(format!(
                "patch {}: original is {} bytes but patched is {}",
                self.name,
                self.original.len(),
                self.patched.len()
            )));
        }
        if self.offset.unsigned_abs() > MAX_PATCH_OFFSET.unsigned_abs() {
            return Err(Error::InvalidCatalog(format!(
                "patch {}: offset {} is further than {:#x} from its signature",
                self.name, self.offset, MAX_PATCH_OFFSET
            )));
        }
        Ok(())
    }
}

/// Largest distance a patch site may sit from its signature match
pub const MAX_PATCH_OFFSET: i64 = 0x1000_0000;

fn default_selectable() -> bool {
    true
}

/// Single-byte flag at a known address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockItem {
    pub name: String,
    #[serde(with = "hex_address")]
    pub address: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// `false` when the target ignores this flag unless a blanket code patch
    /// is active; individual toggles are then rejected
    #[serde(default = "default_selectable")]
    pub selectable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip)]
    pub(crate) enabled: bool,
}

impl UnlockItem {
    pub fn new(name: &str, address: u64, selectable: bool) -> Self {
        Self {
            name: name.to_string(),
            address,
            description: String::new(),
            selectable,
            category: None,
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Group of flag addresses toggled as one logical unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(with = "hex_addresses")]
    pub addresses: Vec<u64>,
    #[serde(skip)]
    pub(crate) enabled: bool,
}

impl Bundle {
    pub fn new(name: &str, addresses: &[u64]) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            addresses: addresses.to_vec(),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Ordered patch sequence; each patch requires the ones before it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchChain {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub patches: Vec<String>,
}

impl Entry for PatchSpec {
    const KIND: EntryKind = EntryKind::Patch;

    fn name(&self) -> &str {
        &self.name
    }
}

impl Entry for UnlockItem {
    const KIND: EntryKind = EntryKind::Unlock;

    fn name(&self) -> &str {
        &self.name
    }
}

impl Entry for Bundle {
    const KIND: EntryKind = EntryKind::Bundle;

    fn name(&self) -> &str {
        &self.name
    }
}

impl Entry for PatchChain {
    const KIND: EntryKind = EntryKind::Chain;

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub version: String,
    pub target: TargetSpec,
    #[serde(default)]
    pub patches: Vec<PatchSpec>,
    #[serde(default)]
    pub unlocks: Vec<UnlockItem>,
    #[serde(default)]
    pub bundles: Vec<Bundle>,
    #[serde(default)]
    pub chains: Vec<PatchChain>,
}

impl Catalog {
    pub fn new(process: &str) -> Self {
        Self {
            version: String::new(),
            target: TargetSpec {
                process: process.to_string(),
                module: None,
            },
            patches: Vec::new(),
            unlocks: Vec::new(),
            bundles: Vec::new(),
            chains: Vec::new(),
        }
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let catalog: Catalog = serde_json::from_str(content)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<()> {
        if self.target.process.trim().is_empty() {
            return Err(Error::InvalidCatalog("target process is empty".to_string()));
        }

        check_unique(self.patches.iter().map(|p| p.name.as_str()), EntryKind::Patch)?;
        check_unique(self.unlocks.iter().map(|u| u.name.as_str()), EntryKind::Unlock)?;
        check_unique(self.bundles.iter().map(|b| b.name.as_str()), EntryKind::Bundle)?;
        check_unique(self.chains.iter().map(|c| c.name.as_str()), EntryKind::Chain)?;

        for patch in &self.patches {
            patch.validate()?;
        }

        if let Some(bundle) = self.bundles.iter().find(|b| b.addresses.is_empty()) {
            return Err(Error::InvalidCatalog(format!("bundle {} has no addresses", bundle.name)));
        }

        let known: HashSet<&str> = self.patches.iter().map(|p| p.name.as_str()).collect();
        for chain in &self.chains {
            if chain.patches.is_empty() {
                return Err(Error::InvalidCatalog(format!("chain {} is empty", chain.name)));
            }
            check_unique(chain.patches.iter().map(String::as_str), EntryKind::Patch)?;
            if let Some(missing) = chain.patches.iter().find(|p| !known.contains(p.as_str())) {
                return Err(Error::InvalidCatalog(format!(
                    "chain {} references unknown patch {}",
                    chain.name, missing
                )));
            }
        }

        Ok(())
    }
}

fn check_unique<'a>(names: impl Iterator<Item = &'a str>, kind: EntryKind) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if name.is_empty() {
            return Err(Error::InvalidCatalog(format!("{} with an empty name", kind)));
        }
        if !seen.insert(name) {
            return Err(Error::InvalidCatalog(format!("duplicate {} name: {}", kind, name)));
        }
    }
    Ok(())
}

pub fn load_catalog<P: AsRef<Path>>(path: P) -> Result<Catalog> {
    let content = fs::read_to_string(&path)?;
    Catalog::from_json(&content)
}

pub fn save_catalog<P: AsRef<Path>>(path: P, catalog: &Catalog) -> Result<()> {
    let content = serde_json::to_string_pretty(catalog)?;
    fs::write(path, content)?;
    Ok(())
}

/// Parse `0x`-prefixed hex or plain decimal
pub fn parse_address(text: &str) -> Result<u64> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => text.replace('_', "").parse::<u64>(),
    };
    parsed.map_err(|e| Error::InvalidCatalog(format!("invalid address '{}': {}", text, e)))
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::scan::{format_hex_bytes, parse_hex_bytes};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Bytes(Vec<u8>),
    }

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_hex_bytes(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Text(text) => parse_hex_bytes(&text).map_err(serde::de::Error::custom),
            Repr::Bytes(bytes) => Ok(bytes),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AddressRepr {
    Text(String),
    Number(u64),
}

impl AddressRepr {
    fn resolve(self) -> Result<u64> {
        match self {
            AddressRepr::Text(text) => parse_address(&text),
            AddressRepr::Number(value) => Ok(value),
        }
    }
}

mod hex_address {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::AddressRepr;

    pub fn serialize<S: Serializer>(address: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{:#x}", address))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        AddressRepr::deserialize(deserializer)?
            .resolve()
            .map_err(serde::de::Error::custom)
    }
}

mod hex_addresses {
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::AddressRepr;

    pub fn serialize<S: Serializer>(addresses: &[u64], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(addresses.len()))?;
        for address in addresses {
            seq.serialize_element(&format!("{:#x}", address))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u64>, D::Error> {
        Vec::<AddressRepr>::deserialize(deserializer)?
            .into_iter()
            .map(|repr| repr.resolve().map_err(serde::de::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "version": "1.0",
        "target": { "process": "game.exe" },
        "patches": [
            { "name": "skip_check", "signature": "74 4F 8B 05", "original": "74 4F", "patched": [144, 144] },
            { "name": "dl_bypass", "description": "second", "signature": [15, 132], "offset": 2,
              "original": "0F 84", "patched": "90 E9" }
        ],
        "unlocks": [
            { "name": "costume_a", "address": "0x140752038", "category": "costumes" },
            { "name": "platform_only", "address": 5368709120, "selectable": false }
        ],
        "bundles": [
            { "name": "starter_pack", "addresses": ["0x140752040", 5368709121] }
        ],
        "chains": [
            { "name": "unlock_all", "patches": ["skip_check", "dl_bypass"] }
        ]
    }"#;

    #[test]
    fn test_parse_sample_catalog() {
        let catalog = Catalog::from_json(SAMPLE).unwrap();

        assert_eq!(catalog.target.module_name(), "game.exe");
        assert_eq!(catalog.patches[0].patched, vec![0x90, 0x90]);
        assert_eq!(catalog.patches[0].offset, 0);
        assert_eq!(catalog.patches[1].offset, 2);
        assert_eq!(catalog.unlocks[0].address, 0x140752038);
        assert!(catalog.unlocks[0].selectable);
        assert!(!catalog.unlocks[1].selectable);
        assert_eq!(catalog.unlocks[1].address, 0x140000000);
        assert_eq!(catalog.bundles[0].addresses, vec![0x140752040, 0x140000001]);
        assert!(!catalog.patches[0].is_enabled());
    }

    #[test]
    fn test_save_and_load_catalog() {
        let catalog = Catalog::from_json(SAMPLE).unwrap();
        let file = tempfile::NamedTempFile::new().unwrap();

        save_catalog(file.path(), &catalog).unwrap();
        let written = fs::read_to_string(file.path()).unwrap();
        assert!(written.contains("\"0x140752038\""));
        assert!(written.contains("\"74 4F 8B 05\""));

        let loaded = load_catalog(file.path()).unwrap();
        assert_eq!(loaded.patches.len(), 2);
        assert_eq!(loaded.chains[0].patches, vec!["skip_check", "dl_bypass"]);
    }

    #[test]
    fn test_rejects_length_mismatch() {
        let mut catalog = Catalog::new("game.exe");
        catalog.patches.push(PatchSpec::new(
            "bad",
            ByteSignature::exact(&[0x74]),
            0,
            &[0x74, 0x4F],
            &[0x90],
        ));
        assert!(matches!(catalog.validate(), Err(Error::InvalidCatalog(_))));
    }

    #[test]
    fn test_rejects_offset_out_of_range() {
        let json = r#"{
            "target": { "process": "game.exe" },
            "patches": [
                { "name": "far", "signature": "74 4F", "offset": 9223372036854775807,
                  "original": "74 4F", "patched": "90 90" }
            ]
        }"#;
        let err = Catalog::from_json(json).unwrap_err();
        assert!(err.to_string().contains("offset"));

        let mut catalog = Catalog::new("game.exe");
        let near = |offset| PatchSpec::new("p", ByteSignature::exact(&[0x74]), offset, &[0x74], &[0x90]);
        catalog.patches.push(near(-MAX_PATCH_OFFSET));
        assert!(catalog.validate().is_ok());
        catalog.patches[0] = near(i64::MIN);
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn test_rejects_duplicates_and_unknown_chain_refs() {
        let mut catalog = Catalog::new("game.exe");
        catalog.unlocks.push(UnlockItem::new("a", 1, true));
        catalog.unlocks.push(UnlockItem::new("a", 2, true));
        assert!(catalog.validate().is_err());

        let mut catalog = Catalog::new("game.exe");
        catalog.chains.push(PatchChain {
            name: "chain".to_string(),
            description: String::new(),
            patches: vec!["missing".to_string()],
        });
        let err = catalog.validate().unwrap_err();
        assert!(err.to_string().contains("unknown patch missing"));
    }

    #[test]
    fn test_rejects_empty_bundle() {
        let mut catalog = Catalog::new("game.exe");
        catalog.bundles.push(Bundle::new("empty", &[]));
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x140752038").unwrap(), 0x140752038);
        assert_eq!(parse_address("0X10").unwrap(), 16);
        assert_eq!(parse_address("4096").unwrap(), 4096);
        assert!(parse_address("0xZZ").is_err());
    }

    #[test]
    fn test_patched_signature() {
        let patch = PatchSpec::new(
            "skip_check",
            ByteSignature::exact(&[0x74, 0x4F, 0x8B]),
            0,
            &[0x74, 0x4F],
            &[0x90, 0x90],
        );
        assert_eq!(patch.patched_signature().unwrap().to_string(), "90 90 8B");
    }
}
