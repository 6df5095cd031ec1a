use tracing::debug;

use super::ByteSignature;
use crate::error::Result;
use crate::memory::{ModuleInfo, ProcessMemory, ReadMemory};

/// Default scan chunk size (64KB)
pub const DEFAULT_CHUNK_SIZE: usize = 0x10000;

/// Chunked linear signature scanner.
///
/// Each chunk read is extended by `len(signature) - 1` bytes so a match that
/// straddles a chunk boundary is still seen whole. Chunks that cannot be read
/// are skipped and the scan continues with the next one.
pub struct PatternScanner<'a, M: ReadMemory + ?Sized> {
    memory: &'a M,
    chunk_size: usize,
}

impl<'a, M: ReadMemory + ?Sized> PatternScanner<'a, M> {
    pub fn new(memory: &'a M) -> Self {
        Self::with_chunk_size(memory, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(memory: &'a M, chunk_size: usize) -> Self {
        Self {
            memory,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Lowest address in `[start, start + size)` where `signature` matches
    pub fn scan_range(&self, start: u64, size: usize, signature: &ByteSignature) -> Option<u64> {
        if signature.is_empty() || size < signature.len() {
            return None;
        }

        let overlap = signature.len() - 1;
        let mut offset = 0usize;
        let mut skipped = 0usize;

        while offset < size {
            let read_size = (self.chunk_size + overlap).min(size - offset);
            let address = start + offset as u64;

            match self.memory.read_bytes(address, read_size) {
                Ok(chunk) => {
                    if let Some(pos) = signature.find_in(&chunk) {
                        if skipped > 0 {
                            debug!("  Skipped {} unreadable chunks before match", skipped);
                        }
                        return Some(address + pos as u64);
                    }
                }
                Err(_) => skipped += 1,
            }

            offset += self.chunk_size;
        }

        if skipped > 0 {
            debug!(
                "  Scan of {:#x}..{:#x} skipped {} unreadable chunks",
                start,
                start + size as u64,
                skipped
            );
        }
        None
    }

    pub fn scan_module(&self, module: &ModuleInfo, signature: &ByteSignature) -> Option<u64> {
        self.scan_range(module.base, module.size, signature)
    }
}

impl<M: ProcessMemory + ?Sized> PatternScanner<'_, M> {
    /// Resolve `module_name` and scan its whole image
    pub fn find_in_module(&self, module_name: &str, signature: &ByteSignature) -> Result<Option<u64>> {
        let module = self.memory.find_module(module_name)?;
        debug!(
            "Scanning {} ({:#x}, {:#x} bytes) for [{}]",
            module.name, module.base, module.size, signature
        );
        Ok(self.scan_module(&module, signature))
    }
}
