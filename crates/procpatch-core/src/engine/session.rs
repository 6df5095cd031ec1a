use tracing::{debug, info, warn};

use super::PatchEngine;
use crate::catalog::PatchSpec;
use crate::error::{Error, Result};
use crate::events::Event;
use crate::memory::{ProcessInfo, ProcessMemory, ProcessProvider, ReadMemory, write_protected};
use crate::scan::{ByteSignature, PatternCache, PatternScanner};

/// Live attach session: the open process and its resolved addresses
pub(super) struct Session<M> {
    pub(super) process: M,
    pub(super) cache: PatternCache,
}

impl<M: ProcessMemory> Session<M> {
    fn new(process: M) -> Self {
        Self {
            process,
            cache: PatternCache::new(),
        }
    }

    /// Signature match address for `spec`, cache first
    pub(super) fn resolve(&mut self, spec: &PatchSpec, module: &str, chunk_size: usize) -> Result<u64> {
        if let Some(address) = self.cache.get(&spec.name) {
            debug!("{}: cached at {:#x}", spec.name, address);
            return Ok(address);
        }

        let address = self.locate(spec, module, chunk_size)?;
        self.cache.insert(&spec.name, address);
        Ok(address)
    }

    /// Scan for the signature, then for its patched form when the patch
    /// overlaps the signature
    fn locate(&mut self, spec: &PatchSpec, module: &str, chunk_size: usize) -> Result<u64> {
        let module_info = self.process.find_module(module)?;
        let scanner = PatternScanner::with_chunk_size(&self.process, chunk_size);

        self.cache.record_scan();
        if let Some(address) = scanner.scan_module(&module_info, &spec.signature) {
            debug!("{}: signature found at {:#x}", spec.name, address);
            return Ok(address);
        }

        if let Some(patched) = spec.patched_signature().filter(|s| *s != spec.signature) {
            self.cache.record_scan();
            if let Some(address) = scanner.scan_module(&module_info, &patched) {
                debug!("{}: found in patched form at {:#x}", spec.name, address);
                return Ok(address);
            }
        }

        Err(Error::PatternNotFound {
            name: spec.name.clone(),
            module: module_info.name,
        })
    }
}

impl<P: ProcessProvider> PatchEngine<P> {
    /// Attach to the configured target process
    pub fn attach(&mut self) -> Result<ProcessInfo> {
        let name = self.process_name().to_string();
        self.attach_to(&name)
    }

    /// Attach to a process by case-insensitive image name.
    ///
    /// Any previous session is ended first, so cached addresses and flags
    /// never carry over from one process to another.
    pub fn attach_to(&mut self, name: &str) -> Result<ProcessInfo> {
        let opened = self.provider.open(name);
        let process = self.finish(opened)?;

        if self.session.is_some() {
            self.end_session();
        }

        let info = process.info().clone();
        info!("Attached to {} (pid {})", info.name, info.pid);
        self.session = Some(Session::new(process));
        self.push(Event::ProcessAttached {
            name: info.name.clone(),
            pid: info.pid,
        });
        Ok(info)
    }

    /// Release the process, clear cached addresses and reset every flag.
    ///
    /// Memory in the target is left as it is; call [`Self::revert_all`]
    /// first to undo modifications.
    pub fn detach(&mut self) {
        if self.session.is_some() {
            self.end_session();
        }
    }

    /// Check that the target is still running. A target that exited without
    /// a detach ends the session here.
    pub fn is_attached(&mut self) -> bool {
        match self.ensure_live() {
            Ok(()) => true,
            Err(Error::NotAttached) => false,
            Err(e) => {
                let _ = self.finish::<()>(Err(e));
                false
            }
        }
    }

    /// Resolved signature address for a patch in the current session
    pub fn cached_address(&self, name: &str) -> Option<u64> {
        self.session.as_ref().and_then(|s| s.cache.get(name))
    }

    /// Module scans performed in the current session
    pub fn scan_count(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.cache.scans())
    }

    pub fn read_byte(&mut self, address: u64) -> Result<u8> {
        let result = self.with_process(|process| process.read_u8(address));
        self.finish(result)
    }

    pub fn read_bytes(&mut self, address: u64, size: usize) -> Result<Vec<u8>> {
        let result = self.with_process(|process| process.read_exact(address, size));
        self.finish(result)
    }

    /// Protected single-byte write outside any catalogue entry
    pub fn write_byte(&mut self, address: u64, value: u8) -> Result<()> {
        let result = self.with_process(|process| write_protected(process, address, &[value]));
        self.finish(result)
    }

    /// Scan the target module for an arbitrary signature, bypassing the cache
    pub fn find_signature(&mut self, signature: &ByteSignature) -> Result<Option<u64>> {
        let module = self.module_name().to_string();
        let chunk_size = self.config.chunk_size;
        let result = self.with_process(|process| {
            PatternScanner::with_chunk_size(process, chunk_size).find_in_module(&module, signature)
        });
        self.finish(result)
    }

    /// Fail with `NotAttached` or `ProcessExited` unless a live session exists
    pub(super) fn ensure_live(&mut self) -> Result<()> {
        let alive = match &self.session {
            Some(session) => session.process.is_alive(),
            None => return Err(Error::NotAttached),
        };
        if !alive {
            warn!("Target process exited without detach");
            self.end_session();
            return Err(Error::ProcessExited);
        }
        Ok(())
    }

    /// Run `op` against the live process; a failure caused by the process
    /// exiting mid-operation ends the session
    pub(super) fn with_process<T>(&mut self, op: impl FnOnce(&P::Process) -> Result<T>) -> Result<T> {
        self.ensure_live()?;
        let result = match &self.session {
            Some(session) => op(&session.process),
            None => Err(Error::NotAttached),
        };
        result.map_err(|e| self.check_exit(e))
    }

    /// Replace `error` with `ProcessExited` when the target has gone away
    pub(super) fn check_exit(&mut self, error: Error) -> Error {
        let gone = self.session.as_ref().is_some_and(|s| !s.process.is_alive());
        if gone {
            debug!("Operation failed after target exit: {}", error);
            self.end_session();
            return Error::ProcessExited;
        }
        error
    }

    fn end_session(&mut self) {
        if let Some(session) = self.session.take() {
            let info = session.process.info();
            info!("Detached from {} (pid {})", info.name, info.pid);
        }

        for patch in self.patches.iter_mut() {
            patch.enabled = false;
        }
        for unlock in self.unlocks.iter_mut() {
            unlock.enabled = false;
        }
        for bundle in self.bundles.iter_mut() {
            bundle.enabled = false;
        }

        self.push(Event::ProcessDetached);
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixture::*;
    use super::super::PatchEngine;
    use crate::error::{Error, ErrorKind};
    use crate::events::Event;
    use crate::memory::{MockProcess, MockProvider};
    use crate::scan::ByteSignature;

    #[test]
    fn test_attach_emits_event() {
        let provider = MockProvider::with(process());
        let mut engine = PatchEngine::new(provider, catalog()).unwrap();

        let info = engine.attach().unwrap();
        assert_eq!(info.pid, 4242);
        assert!(engine.is_attached());
        assert_eq!(
            engine.drain_events(),
            vec![Event::ProcessAttached {
                name: "game.exe".to_string(),
                pid: 4242
            }]
        );
    }

    #[test]
    fn test_attach_failures() {
        let mut engine = PatchEngine::new(MockProvider::new(), catalog()).unwrap();
        assert!(matches!(engine.attach(), Err(Error::ProcessNotFound(_))));

        let provider = MockProvider::with(process());
        provider.deny_open(true);
        let mut engine = PatchEngine::new(provider, catalog()).unwrap();
        assert!(matches!(engine.attach(), Err(Error::OpenFailed { pid: 4242, .. })));
        assert!(!engine.is_attached());

        let events = engine.drain_events();
        assert!(matches!(
            events.as_slice(),
            [Event::Error { kind: ErrorKind::OpenFailed, .. }]
        ));
    }

    #[test]
    fn test_detach_resets_flags_and_cache() {
        let (mut engine, _process) = attached();
        engine.apply_patch("skip_check").unwrap();
        engine.enable_unlock("costume_a").unwrap();
        assert!(engine.cached_address("skip_check").is_some());

        engine.detach();

        assert!(!engine.is_attached());
        assert!(!engine.patches().get("skip_check").unwrap().is_enabled());
        assert!(!engine.unlocks().get("costume_a").unwrap().is_enabled());
        assert!(engine.cached_address("skip_check").is_none());
        assert_eq!(engine.drain_events().last(), Some(&Event::ProcessDetached));
    }

    #[test]
    fn test_liveness_without_detach() {
        let (mut engine, process) = attached();
        engine.enable_unlock("costume_a").unwrap();
        engine.drain_events();

        process.kill();

        assert!(!engine.is_attached());
        assert!(!engine.unlocks().get("costume_a").unwrap().is_enabled());
        let events = engine.drain_events();
        assert_eq!(events[0], Event::ProcessDetached);
        assert!(matches!(events[1], Event::Error { kind: ErrorKind::ProcessExited, .. }));

        assert!(matches!(engine.read_byte(FLAG_DATA), Err(Error::NotAttached)));
    }

    #[test]
    fn test_reattach_replaces_session() {
        let (mut engine, process) = attached();
        engine.apply_patch("skip_check").unwrap();
        assert_eq!(engine.scan_count(), 1);

        engine.attach().unwrap();
        assert_eq!(engine.scan_count(), 0);
        assert!(engine.cached_address("skip_check").is_none());
        assert!(!engine.patches().get("skip_check").unwrap().is_enabled());
        assert_eq!(process.peek(SKIP_CHECK_AT, 2), vec![0x90, 0x90]);
    }

    #[test]
    fn test_low_level_access() {
        let (mut engine, process) = attached();

        engine.write_byte(SKIP_CHECK_AT + 3, 0x06).unwrap();
        assert_eq!(engine.read_byte(SKIP_CHECK_AT + 3).unwrap(), 0x06);
        assert_eq!(engine.read_bytes(SKIP_CHECK_AT, 2).unwrap(), vec![0x74, 0x4F]);
        assert_eq!(process.flushes(), 1);

        let signature = ByteSignature::parse("0F 84 ?? 01").unwrap();
        assert_eq!(engine.find_signature(&signature).unwrap(), Some(DL_AT));
        assert_eq!(engine.scan_count(), 0);

        assert!(matches!(
            engine.read_bytes(0x10, 4),
            Err(Error::MemoryReadFailed { .. })
        ));
    }

    #[test]
    fn test_attach_to_named_process() {
        let provider = MockProvider::with(process());
        provider.add(MockProcess::builder("launcher.exe").pid(7).build());
        let mut engine = PatchEngine::new(provider, catalog()).unwrap();

        let info = engine.attach_to("LAUNCHER.EXE").unwrap();
        assert_eq!(info.pid, 7);
        assert_eq!(engine.process_info().map(|i| i.pid), Some(7));
    }
}
