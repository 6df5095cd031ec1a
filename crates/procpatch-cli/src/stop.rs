//! Ctrl+C delivery for the long-running `watch` command.
//!
//! The handler feeds a channel; waits are `recv_timeout` calls, so a stop
//! request ends a poll interval immediately.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use anyhow::Result;
use procpatch_core::{PatchEngine, ProcessProvider};
use tracing::info;

/// Why [`StopSignal::hold`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Stop,
    TargetExited,
}

pub struct StopSignal {
    rx: Receiver<()>,
    stopped: bool,
}

impl StopSignal {
    /// Route Ctrl+C into a new signal
    pub fn install() -> Result<Self> {
        let (tx, signal) = Self::channel();
        ctrlc::set_handler(move || {
            info!("Received shutdown signal, stopping...");
            let _ = tx.send(());
        })?;
        Ok(signal)
    }

    fn channel() -> (Sender<()>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self { rx, stopped: false })
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Block for up to `timeout`; `true` once a stop has arrived.
    ///
    /// A dropped sender counts as a stop.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        if self.stopped {
            return true;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                self.stopped = true;
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    /// Poll the engine's liveness every `interval` until the target exits or
    /// a stop arrives
    pub fn hold<P: ProcessProvider>(&mut self, engine: &mut PatchEngine<P>, interval: Duration) -> Wake {
        loop {
            if self.wait(interval) {
                return Wake::Stop;
            }
            if !engine.is_attached() {
                return Wake::TargetExited;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procpatch_core::Catalog;
    use procpatch_core::memory::{MockProcess, MockProvider};

    const TICK: Duration = Duration::from_millis(10);

    fn attached_engine() -> (PatchEngine<MockProvider>, MockProcess) {
        let process = MockProcess::builder("game.exe").build();
        let provider = MockProvider::with(process.clone());
        let mut engine = PatchEngine::new(provider, Catalog::new("game.exe")).unwrap();
        engine.attach().unwrap();
        (engine, process)
    }

    #[test]
    fn test_wait_times_out_without_stop() {
        let (_tx, mut signal) = StopSignal::channel();
        assert!(!signal.wait(TICK));
        assert!(!signal.is_stopped());
    }

    #[test]
    fn test_stop_is_sticky() {
        let (tx, mut signal) = StopSignal::channel();
        tx.send(()).unwrap();
        assert!(signal.wait(Duration::from_secs(10)));
        assert!(signal.wait(Duration::from_secs(10)));
        assert!(signal.is_stopped());
    }

    #[test]
    fn test_stop_from_another_thread() {
        let (tx, mut signal) = StopSignal::channel();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            tx.send(()).unwrap();
        });
        assert!(signal.wait(Duration::from_secs(10)));
        handle.join().unwrap();
    }

    #[test]
    fn test_hold_ends_on_stop() {
        let (tx, mut signal) = StopSignal::channel();
        let (mut engine, _process) = attached_engine();
        tx.send(()).unwrap();

        assert_eq!(signal.hold(&mut engine, Duration::from_secs(10)), Wake::Stop);
        assert!(engine.is_attached());
    }

    #[test]
    fn test_hold_ends_when_target_exits() {
        let (_tx, mut signal) = StopSignal::channel();
        let (mut engine, process) = attached_engine();
        process.kill();

        assert_eq!(signal.hold(&mut engine, TICK), Wake::TargetExited);
        assert!(!signal.is_stopped());
        assert!(engine.process_info().is_none());
    }
}
