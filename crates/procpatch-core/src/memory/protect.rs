//! Protected writes
//!
//! Code sections of the target are normally mapped `EXECUTE_READ`, so a write
//! first flips the destination range to `EXECUTE_READWRITE` and then puts the
//! previous protection back. The restore runs whether or not the write
//! succeeded; [`ProtectionGuard`] also restores on unwind.

use tracing::{debug, warn};

use super::{Protection, WriteMemory};
use crate::error::Result;

/// Restores a saved page protection when dropped
pub struct ProtectionGuard<'a, M: WriteMemory + ?Sized> {
    memory: &'a M,
    address: u64,
    size: usize,
    previous: Protection,
    restored: bool,
}

impl<'a, M: WriteMemory + ?Sized> ProtectionGuard<'a, M> {
    /// Relax protection on `[address, address + size)` to `protection`
    pub fn relax(memory: &'a M, address: u64, size: usize, protection: Protection) -> Result<Self> {
        let previous = memory.protect(address, size, protection)?;
        debug!(
            "Protection at {:#x} (+{}) changed {:?} -> {:?}",
            address, size, previous, protection
        );
        Ok(Self {
            memory,
            address,
            size,
            previous,
            restored: false,
        })
    }

    pub fn previous(&self) -> Protection {
        self.previous
    }

    /// Put the saved protection back
    pub fn restore(mut self) -> Result<()> {
        self.restored = true;
        self.memory
            .protect(self.address, self.size, self.previous)
            .map(|_| ())
    }
}

impl<M: WriteMemory + ?Sized> Drop for ProtectionGuard<'_, M> {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        if let Err(e) = self.memory.protect(self.address, self.size, self.previous) {
            warn!(
                "Failed to restore protection {:?} at {:#x}: {}",
                self.previous, self.address, e
            );
        }
    }
}

/// Write `data` at `address` under a temporary `EXECUTE_READWRITE` flip.
///
/// Protection is restored even when the write fails. A failed restore after a
/// successful write is logged, not returned: the bytes are already in place
/// and the caller's state must reflect that.
pub fn write_protected<M: WriteMemory + ?Sized>(memory: &M, address: u64, data: &[u8]) -> Result<()> {
    if data.is_empty() {
        return Ok(());
    }

    let guard = ProtectionGuard::relax(memory, address, data.len(), Protection::EXECUTE_READWRITE)?;
    let written = memory.write_bytes(address, data);
    let previous = guard.previous();

    if let Err(e) = guard.restore() {
        warn!(
            "Failed to restore protection {:?} at {:#x}: {}",
            previous, address, e
        );
    }

    written?;

    if let Err(e) = memory.flush_instruction_cache(address, data.len()) {
        debug!("Instruction cache flush at {:#x} failed: {}", address, e);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::memory::mock::MockProcess;
    use crate::memory::ReadMemory;

    const BASE: u64 = 0x1000;

    fn process() -> MockProcess {
        MockProcess::builder("game.exe")
            .module("game.exe", BASE, vec![0xCC; 0x2000])
            .build()
    }

    #[test]
    fn test_write_protected_restores_protection() {
        let process = process();
        write_protected(&process, BASE + 0x10, &[0x90, 0x90]).unwrap();

        assert_eq!(process.read_bytes(BASE + 0x10, 2).unwrap(), vec![0x90, 0x90]);
        assert_eq!(process.protection_at(BASE + 0x10), Protection::EXECUTE_READ);
        assert_eq!(process.flushes(), 1);
    }

    #[test]
    fn test_write_protected_restores_after_failed_write() {
        let process = process();
        process.fail_writes_at(BASE + 0x20);

        let err = write_protected(&process, BASE + 0x20, &[0x90]).unwrap_err();
        assert!(matches!(err, Error::PartialWriteFailed { written: 0, expected: 1, .. }));
        assert_eq!(process.protection_at(BASE + 0x20), Protection::EXECUTE_READ);
        assert_eq!(process.read_bytes(BASE + 0x20, 1).unwrap(), vec![0xCC]);
    }

    #[test]
    fn test_write_protected_skips_write_when_flip_fails() {
        let process = process();
        process.fail_protect_at(BASE + 0x30);

        let err = write_protected(&process, BASE + 0x30, &[0x90]).unwrap_err();
        assert!(matches!(err, Error::ProtectionChangeFailed { .. }));
        assert_eq!(process.read_bytes(BASE + 0x30, 1).unwrap(), vec![0xCC]);
        assert_eq!(process.writes(), 0);
    }

    #[test]
    fn test_guard_restores_on_drop() {
        let process = process();
        {
            let _guard =
                ProtectionGuard::relax(&process, BASE, 1, Protection::EXECUTE_READWRITE).unwrap();
            assert_eq!(process.protection_at(BASE), Protection::EXECUTE_READWRITE);
        }
        assert_eq!(process.protection_at(BASE), Protection::EXECUTE_READ);
    }
}
