use std::fmt;

use crate::error::{Error, Result};

/// Identity of an attached process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub name: String,
    pub pid: u32,
}

/// Loaded module address range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub base: u64,
    pub size: usize,
}

impl ModuleInfo {
    pub fn end(&self) -> u64 {
        self.base + self.size as u64
    }

    pub fn contains(&self, address: u64) -> bool {
        (self.base..self.end()).contains(&address)
    }
}

/// Raw page protection value (Windows `PAGE_*` constants)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Protection(pub u32);

impl Protection {
    pub const NOACCESS: Self = Self(0x01);
    pub const READONLY: Self = Self(0x02);
    pub const READWRITE: Self = Self(0x04);
    pub const EXECUTE_READ: Self = Self(0x20);
    pub const EXECUTE_READWRITE: Self = Self(0x40);

    pub fn is_writable(self) -> bool {
        self == Self::READWRITE || self == Self::EXECUTE_READWRITE
    }
}

impl fmt::Debug for Protection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::NOACCESS => "NOACCESS",
            Self::READONLY => "READONLY",
            Self::READWRITE => "READWRITE",
            Self::EXECUTE_READ => "EXECUTE_READ",
            Self::EXECUTE_READWRITE => "EXECUTE_READWRITE",
            _ => return write!(f, "Protection({:#x})", self.0),
        };
        f.write_str(name)
    }
}

/// Read access to a target process
pub trait ReadMemory {
    /// Read `size` bytes. May return fewer bytes than requested when the
    /// tail of the range is inaccessible.
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>>;

    fn read_u8(&self, address: u64) -> Result<u8> {
        self.read_bytes(address, 1)?
            .first()
            .copied()
            .ok_or_else(|| Error::MemoryReadFailed {
                address,
                message: "empty read".to_string(),
            })
    }

    /// Read exactly `size` bytes or fail
    fn read_exact(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        let bytes = self.read_bytes(address, size)?;
        if bytes.len() != size {
            return Err(Error::MemoryReadFailed {
                address,
                message: format!("short read: {} of {} bytes", bytes.len(), size),
            });
        }
        Ok(bytes)
    }
}

/// Write and protection access to a target process
pub trait WriteMemory {
    /// Write all of `data`, failing with `PartialWriteFailed` on a short write
    fn write_bytes(&self, address: u64, data: &[u8]) -> Result<()>;

    /// Change page protection for the range, returning the previous protection
    fn protect(&self, address: u64, size: usize, protection: Protection) -> Result<Protection>;

    fn flush_instruction_cache(&self, _address: u64, _size: usize) -> Result<()> {
        Ok(())
    }
}

/// An open capability to a live external process
pub trait ProcessMemory: ReadMemory + WriteMemory {
    fn info(&self) -> &ProcessInfo;

    /// Look up a loaded module by case-insensitive name
    fn find_module(&self, name: &str) -> Result<ModuleInfo>;

    /// Query exit status; `false` once the process has terminated
    fn is_alive(&self) -> bool;
}

/// Source of process capabilities
pub trait ProcessProvider {
    type Process: ProcessMemory;

    /// Find a running process by case-insensitive image name and open it
    /// with read, write and query rights.
    fn open(&self, name: &str) -> Result<Self::Process>;
}

/// Case-insensitive image name comparison
pub fn names_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || a.to_lowercase() == b.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_match() {
        assert!(names_match("Game.EXE", "game.exe"));
        assert!(!names_match("game.exe", "game2.exe"));
    }

    #[test]
    fn test_module_contains() {
        let module = ModuleInfo {
            name: "game.exe".to_string(),
            base: 0x1000,
            size: 0x100,
        };
        assert!(module.contains(0x1000));
        assert!(module.contains(0x10FF));
        assert!(!module.contains(0x1100));
        assert_eq!(module.end(), 0x1100);
    }

    #[test]
    fn test_protection_debug() {
        assert_eq!(format!("{:?}", Protection::EXECUTE_READ), "EXECUTE_READ");
        assert_eq!(format!("{:?}", Protection(0x80)), "Protection(0x80)");
        assert!(Protection::EXECUTE_READWRITE.is_writable());
        assert!(!Protection::EXECUTE_READ.is_writable());
    }
}
