//! In-memory process simulation
//!
//! `MockProcess` models sparse process memory as a set of regions with
//! page-granular protection, a liveness flag and fault injection hooks.
//! Clones share state, so a test can keep a handle to the process it hands
//! to the engine and inspect or kill it later.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::rc::Rc;

use super::{ModuleInfo, ProcessInfo, ProcessMemory, ProcessProvider, Protection, ReadMemory, WriteMemory, names_match};
use crate::error::{Error, Result};

const PAGE_SIZE: u64 = 0x1000;

struct Region {
    base: u64,
    bytes: Vec<u8>,
    protection: Protection,
}

impl Region {
    fn covers(&self, address: u64, size: usize) -> bool {
        address >= self.base && address + size as u64 <= self.base + self.bytes.len() as u64
    }
}

struct MockState {
    info: ProcessInfo,
    modules: Vec<ModuleInfo>,
    regions: RefCell<Vec<Region>>,
    pages: RefCell<HashMap<u64, Protection>>,
    alive: Cell<bool>,
    fail_writes: RefCell<HashSet<u64>>,
    fail_protect: RefCell<HashSet<u64>>,
    unreadable: RefCell<Vec<Range<u64>>>,
    reads: Cell<usize>,
    writes: Cell<usize>,
    flushes: Cell<usize>,
}

/// Simulated target process
#[derive(Clone)]
pub struct MockProcess {
    state: Rc<MockState>,
}

/// Builder for MockProcess
pub struct MockProcessBuilder {
    info: ProcessInfo,
    modules: Vec<ModuleInfo>,
    regions: Vec<Region>,
}

impl MockProcessBuilder {
    pub fn pid(mut self, pid: u32) -> Self {
        self.info.pid = pid;
        self
    }

    /// Add a loaded module backed by `bytes`, mapped `EXECUTE_READ`
    pub fn module(mut self, name: &str, base: u64, bytes: Vec<u8>) -> Self {
        self.modules.push(ModuleInfo {
            name: name.to_string(),
            base,
            size: bytes.len(),
        });
        self.regions.push(Region {
            base,
            bytes,
            protection: Protection::EXECUTE_READ,
        });
        self
    }

    /// Add a plain data region mapped `READWRITE`
    pub fn region(mut self, base: u64, bytes: Vec<u8>) -> Self {
        self.regions.push(Region {
            base,
            bytes,
            protection: Protection::READWRITE,
        });
        self
    }

    pub fn build(self) -> MockProcess {
        MockProcess {
            state: Rc::new(MockState {
                info: self.info,
                modules: self.modules,
                regions: RefCell::new(self.regions),
                pages: RefCell::new(HashMap::new()),
                alive: Cell::new(true),
                fail_writes: RefCell::new(HashSet::new()),
                fail_protect: RefCell::new(HashSet::new()),
                unreadable: RefCell::new(Vec::new()),
                reads: Cell::new(0),
                writes: Cell::new(0),
                flushes: Cell::new(0),
            }),
        }
    }
}

fn pages(address: u64, size: usize) -> impl Iterator<Item = u64> {
    let first = address / PAGE_SIZE;
    let last = (address + size.max(1) as u64 - 1) / PAGE_SIZE;
    (first..=last).map(|page| page * PAGE_SIZE)
}

fn hits(set: &HashSet<u64>, address: u64, size: usize) -> bool {
    set.iter().any(|&a| a >= address && a < address + size as u64)
}

impl MockProcess {
    pub fn builder(name: &str) -> MockProcessBuilder {
        MockProcessBuilder {
            info: ProcessInfo {
                name: name.to_string(),
                pid: 4242,
            },
            modules: Vec::new(),
            regions: Vec::new(),
        }
    }

    /// Simulate process termination
    pub fn kill(&self) {
        self.state.alive.set(false);
    }

    pub fn fail_writes_at(&self, address: u64) {
        self.state.fail_writes.borrow_mut().insert(address);
    }

    pub fn fail_protect_at(&self, address: u64) {
        self.state.fail_protect.borrow_mut().insert(address);
    }

    pub fn mark_unreadable(&self, range: Range<u64>) {
        self.state.unreadable.borrow_mut().push(range);
    }

    pub fn clear_faults(&self) {
        self.state.fail_writes.borrow_mut().clear();
        self.state.fail_protect.borrow_mut().clear();
        self.state.unreadable.borrow_mut().clear();
    }

    /// Number of `read_bytes` calls so far
    pub fn reads(&self) -> usize {
        self.state.reads.get()
    }

    /// Number of successful writes so far
    pub fn writes(&self) -> usize {
        self.state.writes.get()
    }

    pub fn flushes(&self) -> usize {
        self.state.flushes.get()
    }

    pub fn protection_at(&self, address: u64) -> Protection {
        let page = address / PAGE_SIZE * PAGE_SIZE;
        if let Some(protection) = self.state.pages.borrow().get(&page) {
            return *protection;
        }
        self.state
            .regions
            .borrow()
            .iter()
            .find(|r| r.covers(address, 1))
            .map(|r| r.protection)
            .unwrap_or(Protection::NOACCESS)
    }

    /// Copy bytes out without counting a read or honouring faults
    pub fn peek(&self, address: u64, size: usize) -> Vec<u8> {
        let regions = self.state.regions.borrow();
        regions
            .iter()
            .find(|r| r.covers(address, size))
            .map(|r| {
                let start = (address - r.base) as usize;
                r.bytes[start..start + size].to_vec()
            })
            .unwrap_or_default()
    }

    /// Store bytes directly, ignoring protection
    pub fn poke(&self, address: u64, data: &[u8]) {
        let mut regions = self.state.regions.borrow_mut();
        if let Some(region) = regions.iter_mut().find(|r| r.covers(address, data.len())) {
            let start = (address - region.base) as usize;
            region.bytes[start..start + data.len()].copy_from_slice(data);
        }
    }
}

impl ReadMemory for MockProcess {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        self.state.reads.set(self.state.reads.get() + 1);

        let fail = |message: &str| Error::MemoryReadFailed {
            address,
            message: message.to_string(),
        };

        if !self.state.alive.get() {
            return Err(fail("process exited"));
        }
        let end = address + size as u64;
        if self
            .state
            .unreadable
            .borrow()
            .iter()
            .any(|r| r.start < end && address < r.end)
        {
            return Err(fail("partial copy"));
        }

        let regions = self.state.regions.borrow();
        let region = regions
            .iter()
            .find(|r| r.covers(address, size))
            .ok_or_else(|| fail("unmapped"))?;
        let start = (address - region.base) as usize;
        Ok(region.bytes[start..start + size].to_vec())
    }
}

impl WriteMemory for MockProcess {
    fn write_bytes(&self, address: u64, data: &[u8]) -> Result<()> {
        let failed = Error::PartialWriteFailed {
            address,
            written: 0,
            expected: data.len(),
        };

        if !self.state.alive.get() || hits(&self.state.fail_writes.borrow(), address, data.len()) {
            return Err(failed);
        }
        if !pages(address, data.len()).all(|page| self.protection_at(page).is_writable()) {
            return Err(failed);
        }

        let mut regions = self.state.regions.borrow_mut();
        let region = match regions.iter_mut().find(|r| r.covers(address, data.len())) {
            Some(region) => region,
            None => return Err(failed),
        };
        let start = (address - region.base) as usize;
        region.bytes[start..start + data.len()].copy_from_slice(data);
        self.state.writes.set(self.state.writes.get() + 1);
        Ok(())
    }

    fn protect(&self, address: u64, size: usize, protection: Protection) -> Result<Protection> {
        let failed = |message: &str| Error::ProtectionChangeFailed {
            address,
            message: message.to_string(),
        };

        if !self.state.alive.get() {
            return Err(failed("process exited"));
        }
        if hits(&self.state.fail_protect.borrow(), address, size) {
            return Err(failed("access denied"));
        }
        if !self
            .state
            .regions
            .borrow()
            .iter()
            .any(|r| r.covers(address, size))
        {
            return Err(failed("unmapped"));
        }

        let previous = self.protection_at(address);
        let mut overrides = self.state.pages.borrow_mut();
        for page in pages(address, size) {
            overrides.insert(page, protection);
        }
        Ok(previous)
    }

    fn flush_instruction_cache(&self, _address: u64, _size: usize) -> Result<()> {
        self.state.flushes.set(self.state.flushes.get() + 1);
        Ok(())
    }
}

impl ProcessMemory for MockProcess {
    fn info(&self) -> &ProcessInfo {
        &self.state.info
    }

    fn find_module(&self, name: &str) -> Result<ModuleInfo> {
        self.state
            .modules
            .iter()
            .find(|m| names_match(&m.name, name))
            .cloned()
            .ok_or_else(|| Error::ModuleNotFound(name.to_string()))
    }

    fn is_alive(&self) -> bool {
        self.state.alive.get()
    }
}

#[derive(Default)]
struct ProviderState {
    processes: RefCell<Vec<MockProcess>>,
    deny_open: Cell<bool>,
    opens: Cell<usize>,
}

/// Simulated process table
#[derive(Clone, Default)]
pub struct MockProvider {
    state: Rc<ProviderState>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(process: MockProcess) -> Self {
        let provider = Self::new();
        provider.add(process);
        provider
    }

    /// Start a process; later processes shadow earlier ones with the same name
    pub fn add(&self, process: MockProcess) {
        self.state.processes.borrow_mut().push(process);
    }

    /// Make `open` fail as if rights were insufficient
    pub fn deny_open(&self, deny: bool) {
        self.state.deny_open.set(deny);
    }

    pub fn opens(&self) -> usize {
        self.state.opens.get()
    }
}

impl ProcessProvider for MockProvider {
    type Process = MockProcess;

    fn open(&self, name: &str) -> Result<MockProcess> {
        let processes = self.state.processes.borrow();
        let process = processes
            .iter()
            .rev()
            .find(|p| p.is_alive() && names_match(&p.info().name, name))
            .ok_or_else(|| Error::ProcessNotFound(name.to_string()))?;

        if self.state.deny_open.get() {
            return Err(Error::OpenFailed {
                name: process.info().name.clone(),
                pid: process.info().pid,
                message: "Access is denied.".to_string(),
            });
        }

        self.state.opens.set(self.state.opens.get() + 1);
        Ok(process.clone())
    }
}
