use crate::scan::DEFAULT_CHUNK_SIZE;

/// Runtime settings for a [`crate::PatchEngine`]
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bytes read per scan step, before the signature overlap is added
    pub chunk_size: usize,
    /// Process image name to attach to, overriding the catalogue target
    pub process: Option<String>,
    /// Module to scan, overriding the catalogue target
    pub module: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            process: None,
            module: None,
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    chunk_size: Option<usize>,
    process: Option<String>,
    module: Option<String>,
}

impl EngineConfigBuilder {
    /// Set the scan chunk size; zero is treated as one
    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = Some(bytes.max(1));
        self
    }

    pub fn process<S: Into<String>>(mut self, name: S) -> Self {
        self.process = Some(name.into());
        self
    }

    pub fn module<S: Into<String>>(mut self, name: S) -> Self {
        self.module = Some(name.into());
        self
    }

    pub fn build(self) -> EngineConfig {
        let default = EngineConfig::default();
        EngineConfig {
            chunk_size: self.chunk_size.unwrap_or(default.chunk_size),
            process: self.process.or(default.process),
            module: self.module.or(default.module),
        }
    }
}

/// Polling intervals used by callers that drive the engine on a timer
pub mod timing {
    use std::time::Duration;

    /// Interval between liveness checks of the attached process
    pub const LIVENESS_POLL_INTERVAL: Duration = Duration::from_secs(2);

    /// Interval between attach attempts while waiting for the target to start
    pub const ATTACH_RETRY_INTERVAL: Duration = Duration::from_secs(2);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = EngineConfig::builder().build();
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(config.process.is_none());
        assert!(config.module.is_none());
    }

    #[test]
    fn test_builder_overrides() {
        let config = EngineConfig::builder()
            .chunk_size(0)
            .process("game.exe")
            .module("engine.dll")
            .build();
        assert_eq!(config.chunk_size, 1);
        assert_eq!(config.process.as_deref(), Some("game.exe"));
        assert_eq!(config.module.as_deref(), Some("engine.dll"));
    }
}
