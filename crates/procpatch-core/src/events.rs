use std::fmt;

use crate::error::{Error, ErrorKind};

/// Notification queued by the engine for the caller to drain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ProcessAttached { name: String, pid: u32 },
    ProcessDetached,
    PatchApplied(String),
    PatchRemoved(String),
    UnlockEnabled(String),
    UnlockDisabled(String),
    BundleEnabled(String),
    BundleDisabled(String),
    Error { message: String, kind: ErrorKind },
}

impl Event {
    pub fn is_error(&self) -> bool {
        matches!(self, Event::Error { .. })
    }
}

impl From<&Error> for Event {
    fn from(error: &Error) -> Self {
        Event::Error {
            message: error.to_string(),
            kind: error.kind(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::ProcessAttached { name, pid } => write!(f, "Attached to {} (pid {})", name, pid),
            Event::ProcessDetached => write!(f, "Detached"),
            Event::PatchApplied(name) => write!(f, "Patch applied: {}", name),
            Event::PatchRemoved(name) => write!(f, "Patch removed: {}", name),
            Event::UnlockEnabled(name) => write!(f, "Unlock enabled: {}", name),
            Event::UnlockDisabled(name) => write!(f, "Unlock disabled: {}", name),
            Event::BundleEnabled(name) => write!(f, "Bundle enabled: {}", name),
            Event::BundleDisabled(name) => write!(f, "Bundle disabled: {}", name),
            Event::Error { message, kind } => write!(f, "[{}] {}", kind, message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_from_error() {
        let event = Event::from(&Error::ProcessExited);
        assert!(event.is_error());
        assert_eq!(event.to_string(), "[ProcessExited] Target process exited");
    }

    #[test]
    fn test_event_display() {
        let event = Event::ProcessAttached {
            name: "game.exe".to_string(),
            pid: 42,
        };
        assert_eq!(event.to_string(), "Attached to game.exe (pid 42)");
        assert!(!event.is_error());
    }
}
