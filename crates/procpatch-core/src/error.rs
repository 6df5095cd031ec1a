use strum::{Display, IntoStaticStr};
use thiserror::Error;

/// Kind of catalogue entry, used in lookup errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum EntryKind {
    Patch,
    Unlock,
    Bundle,
    Chain,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Not attached to a process")]
    NotAttached,

    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Failed to open process {name} (pid {pid}): {message}. Run as administrator?")]
    OpenFailed {
        name: String,
        pid: u32,
        message: String,
    },

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Pattern not found for {name} in module {module}")]
    PatternNotFound { name: String, module: String },

    #[error("Failed to change memory protection at {address:#x}: {message}")]
    ProtectionChangeFailed { address: u64, message: String },

    #[error("Failed to write process memory at {address:#x}: wrote {written} of {expected} bytes")]
    PartialWriteFailed {
        address: u64,
        written: usize,
        expected: usize,
    },

    #[error("Target process exited")]
    ProcessExited,

    #[error("Failed to read process memory at address {address:#x}: {message}")]
    MemoryReadFailed { address: u64, message: String },

    #[error("Unknown {kind}: {name}")]
    UnknownEntry { kind: EntryKind, name: String },

    #[error("Unlock item {0} is not individually selectable")]
    NotSelectable(String),

    #[error("Bundle {name} partially written: {} of {total} addresses failed", .failed.len())]
    BundlePartial {
        name: String,
        /// Each address that failed, with the kind of its failure
        failed: Vec<(u64, ErrorKind)>,
        total: usize,
    },

    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Unsupported platform: {0}")]
    Unsupported(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification carried by error notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum ErrorKind {
    NotAttached,
    ProcessNotFound,
    OpenFailed,
    ModuleNotFound,
    PatternNotFound,
    ProtectionChangeFailed,
    PartialWriteFailed,
    ProcessExited,
    ReadFailed,
    Rejected,
    Configuration,
    Unsupported,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotAttached => ErrorKind::NotAttached,
            Error::ProcessNotFound(_) => ErrorKind::ProcessNotFound,
            Error::OpenFailed { .. } => ErrorKind::OpenFailed,
            Error::ModuleNotFound(_) => ErrorKind::ModuleNotFound,
            Error::PatternNotFound { .. } => ErrorKind::PatternNotFound,
            Error::ProtectionChangeFailed { .. } => ErrorKind::ProtectionChangeFailed,
            Error::PartialWriteFailed { .. } => ErrorKind::PartialWriteFailed,
            Error::BundlePartial { failed, .. } => bundle_kind(failed),
            Error::ProcessExited => ErrorKind::ProcessExited,
            Error::MemoryReadFailed { .. } => ErrorKind::ReadFailed,
            Error::UnknownEntry { .. } | Error::NotSelectable(_) => ErrorKind::Rejected,
            Error::InvalidCatalog(_) | Error::InvalidSignature(_) | Error::Io(_) | Error::Json(_) => {
                ErrorKind::Configuration
            }
            Error::Unsupported(_) => ErrorKind::Unsupported,
        }
    }

    /// Check if this error means the attach session is gone
    pub fn is_session_lost(&self) -> bool {
        matches!(self, Error::NotAttached | Error::ProcessExited)
    }

    pub(crate) fn unknown(kind: EntryKind, name: &str) -> Self {
        Error::UnknownEntry {
            kind,
            name: name.to_string(),
        }
    }
}

/// The shared kind when every address failed the same way
fn bundle_kind(failed: &[(u64, ErrorKind)]) -> ErrorKind {
    match failed.split_first() {
        Some((&(_, first), rest)) if rest.iter().all(|&(_, kind)| kind == first) => first,
        _ => ErrorKind::PartialWriteFailed,
    }
}
