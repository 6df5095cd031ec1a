//! # procpatch-core
//!
//! Core library for reversible in-memory patching of a running process.
//!
//! This crate provides:
//! - Process attach, liveness and memory access (Windows, plus a simulated
//!   process for tests)
//! - Chunked signature scanning with wildcard support
//! - Protected writes that always restore page protection
//! - A patch engine with code patches, single-byte unlock flags, bundles and
//!   ordered patch chains, driven by a JSON catalogue

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod memory;
pub mod registry;
pub mod scan;

pub use catalog::{
    Bundle, Catalog, PatchChain, PatchSpec, TargetSpec, UnlockItem, load_catalog, parse_address,
    save_catalog,
};
pub use config::{EngineConfig, EngineConfigBuilder};
pub use engine::{BulkMode, BulkOutcome, PatchEngine, SiteState};
pub use error::{EntryKind, Error, ErrorKind, Result};
pub use events::Event;
pub use memory::{
    ModuleInfo, ProcessHandle, ProcessInfo, ProcessMemory, ProcessProvider, Protection,
    ReadMemory, SystemProvider, WriteMemory, is_elevated,
};
pub use registry::{Entry, Registry};
pub use scan::{ByteSignature, PatternCache, PatternScanner, format_hex_bytes, parse_hex_bytes};
