//! Operating system process access
//!
//! On Windows this wraps `OpenProcess`, Toolhelp snapshots,
//! `Read/WriteProcessMemory` and `VirtualProtectEx`. Other platforms get a
//! provider that reports the platform as unsupported.

#[cfg(target_os = "windows")]
pub use windows_impl::{ProcessHandle, SystemProvider, is_elevated};

#[cfg(not(target_os = "windows"))]
pub use fallback::{ProcessHandle, SystemProvider, is_elevated};

#[cfg(target_os = "windows")]
mod windows_impl {
    use std::ffi::c_void;
    use std::mem::size_of;

    use tracing::{debug, info};
    use windows::Win32::Foundation::{CloseHandle, HANDLE, STILL_ACTIVE};
    use windows::Win32::Security::{GetTokenInformation, TOKEN_ELEVATION, TOKEN_QUERY, TokenElevation};
    use windows::Win32::System::Diagnostics::Debug::{
        FlushInstructionCache, ReadProcessMemory, WriteProcessMemory,
    };
    use windows::Win32::System::Diagnostics::ToolHelp::{
        CreateToolhelp32Snapshot, MODULEENTRY32W, Module32FirstW, Module32NextW, PROCESSENTRY32W,
        Process32FirstW, Process32NextW, TH32CS_SNAPMODULE, TH32CS_SNAPMODULE32, TH32CS_SNAPPROCESS,
    };
    use windows::Win32::System::Memory::{PAGE_PROTECTION_FLAGS, VirtualProtectEx};
    use windows::Win32::System::Threading::{
        GetCurrentProcess, GetExitCodeProcess, OpenProcess, OpenProcessToken,
        PROCESS_QUERY_INFORMATION, PROCESS_VM_OPERATION, PROCESS_VM_READ, PROCESS_VM_WRITE,
    };

    use crate::error::{Error, Result};
    use crate::memory::{
        ModuleInfo, ProcessInfo, ProcessMemory, ProcessProvider, Protection, ReadMemory,
        WriteMemory, names_match,
    };

    /// Closes a handle on drop
    struct OwnedHandle(HANDLE);

    impl Drop for OwnedHandle {
        fn drop(&mut self) {
            // SAFETY: the handle was returned by a successful Win32 call and is closed once.
            unsafe {
                let _ = CloseHandle(self.0);
            }
        }
    }

    fn wide_to_string(wide: &[u16]) -> String {
        let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
        String::from_utf16_lossy(&wide[..len])
    }

    fn find_process(name: &str) -> Result<ProcessInfo> {
        // SAFETY: snapshot creation has no preconditions.
        let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }
            .map_err(|e| Error::ProcessNotFound(format!("{} (snapshot failed: {})", name, e)))?;
        let snapshot = OwnedHandle(snapshot);

        let mut entry = PROCESSENTRY32W {
            dwSize: size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };

        // SAFETY: entry.dwSize is initialized as the API requires.
        let mut next = unsafe { Process32FirstW(snapshot.0, &mut entry) };
        while next.is_ok() {
            let exe = wide_to_string(&entry.szExeFile);
            if names_match(&exe, name) {
                return Ok(ProcessInfo {
                    name: exe,
                    pid: entry.th32ProcessID,
                });
            }
            // SAFETY: same snapshot and entry as above.
            next = unsafe { Process32NextW(snapshot.0, &mut entry) };
        }

        Err(Error::ProcessNotFound(name.to_string()))
    }

    /// Open handle to a target process
    pub struct ProcessHandle {
        handle: HANDLE,
        info: ProcessInfo,
    }

    // SAFETY: a process handle is a kernel object reference usable from any thread;
    // the engine serializes all calls through `&mut self`.
    unsafe impl Send for ProcessHandle {}

    impl ProcessHandle {
        /// Find a process by image name and open it with read/write/query rights
        pub fn open(name: &str) -> Result<Self> {
            let info = find_process(name)?;
            let access =
                PROCESS_VM_READ | PROCESS_VM_WRITE | PROCESS_VM_OPERATION | PROCESS_QUERY_INFORMATION;

            // SAFETY: OpenProcess has no memory-safety preconditions.
            let handle = unsafe { OpenProcess(access, false, info.pid) }.map_err(|e| {
                Error::OpenFailed {
                    name: info.name.clone(),
                    pid: info.pid,
                    message: e.to_string(),
                }
            })?;

            info!("Opened {} (pid {})", info.name, info.pid);
            Ok(Self { handle, info })
        }
    }

    impl Drop for ProcessHandle {
        fn drop(&mut self) {
            debug!("Closing handle for pid {}", self.info.pid);
            // SAFETY: the handle came from OpenProcess and is closed exactly once.
            unsafe {
                let _ = CloseHandle(self.handle);
            }
        }
    }

    impl ReadMemory for ProcessHandle {
        fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
            let mut buffer = vec![0u8; size];
            let mut read = 0usize;

            // SAFETY: buffer is valid for `size` bytes and outlives the call.
            unsafe {
                ReadProcessMemory(
                    self.handle,
                    address as *const c_void,
                    buffer.as_mut_ptr().cast(),
                    size,
                    Some(&mut read),
                )
            }
            .map_err(|e| Error::MemoryReadFailed {
                address,
                message: e.to_string(),
            })?;

            buffer.truncate(read);
            Ok(buffer)
        }
    }

    impl WriteMemory for ProcessHandle {
        fn write_bytes(&self, address: u64, data: &[u8]) -> Result<()> {
            let mut written = 0usize;

            // SAFETY: data is valid for `data.len()` bytes for the duration of the call.
            let result = unsafe {
                WriteProcessMemory(
                    self.handle,
                    address as *const c_void,
                    data.as_ptr().cast(),
                    data.len(),
                    Some(&mut written),
                )
            };

            if let Err(e) = &result {
                debug!("WriteProcessMemory at {:#x} failed: {}", address, e);
            }
            if result.is_err() || written != data.len() {
                return Err(Error::PartialWriteFailed {
                    address,
                    written,
                    expected: data.len(),
                });
            }
            Ok(())
        }

        fn protect(&self, address: u64, size: usize, protection: Protection) -> Result<Protection> {
            let mut previous = PAGE_PROTECTION_FLAGS::default();

            // SAFETY: `previous` is a valid out pointer; the target range belongs to another process.
            unsafe {
                VirtualProtectEx(
                    self.handle,
                    address as *const c_void,
                    size,
                    PAGE_PROTECTION_FLAGS(protection.0),
                    &mut previous,
                )
            }
            .map_err(|e| Error::ProtectionChangeFailed {
                address,
                message: e.to_string(),
            })?;

            Ok(Protection(previous.0))
        }

        fn flush_instruction_cache(&self, address: u64, size: usize) -> Result<()> {
            // SAFETY: only flushes the target's cache lines; no local memory is touched.
            unsafe { FlushInstructionCache(self.handle, Some(address as *const c_void), size) }
                .map_err(|e| Error::ProtectionChangeFailed {
                    address,
                    message: format!("instruction cache flush: {}", e),
                })
        }
    }

    impl ProcessMemory for ProcessHandle {
        fn info(&self) -> &ProcessInfo {
            &self.info
        }

        fn find_module(&self, name: &str) -> Result<ModuleInfo> {
            // SAFETY: snapshot creation has no preconditions.
            let snapshot = unsafe {
                CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, self.info.pid)
            }
            .map_err(|e| {
                debug!("Module snapshot for pid {} failed: {}", self.info.pid, e);
                Error::ModuleNotFound(name.to_string())
            })?;
            let snapshot = OwnedHandle(snapshot);

            let mut entry = MODULEENTRY32W {
                dwSize: size_of::<MODULEENTRY32W>() as u32,
                ..Default::default()
            };

            // SAFETY: entry.dwSize is initialized as the API requires.
            let mut next = unsafe { Module32FirstW(snapshot.0, &mut entry) };
            while next.is_ok() {
                let module = wide_to_string(&entry.szModule);
                if names_match(&module, name) {
                    return Ok(ModuleInfo {
                        name: module,
                        base: entry.modBaseAddr as u64,
                        size: entry.modBaseSize as usize,
                    });
                }
                // SAFETY: same snapshot and entry as above.
                next = unsafe { Module32NextW(snapshot.0, &mut entry) };
            }

            Err(Error::ModuleNotFound(name.to_string()))
        }

        fn is_alive(&self) -> bool {
            let mut code = 0u32;
            // SAFETY: `code` is a valid out pointer.
            match unsafe { GetExitCodeProcess(self.handle, &mut code) } {
                Ok(()) => code == STILL_ACTIVE.0 as u32,
                Err(_) => false,
            }
        }
    }

    /// Opens real processes
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemProvider;

    impl ProcessProvider for SystemProvider {
        type Process = ProcessHandle;

        fn open(&self, name: &str) -> Result<ProcessHandle> {
            ProcessHandle::open(name)
        }
    }

    /// Whether the current process token is elevated
    pub fn is_elevated() -> Option<bool> {
        let mut token = HANDLE::default();
        // SAFETY: GetCurrentProcess returns a pseudo handle; `token` is a valid out pointer.
        unsafe { OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token) }.ok()?;
        let token = OwnedHandle(token);

        let mut elevation = TOKEN_ELEVATION::default();
        let mut len = 0u32;
        // SAFETY: the buffer is a TOKEN_ELEVATION of the size passed in.
        unsafe {
            GetTokenInformation(
                token.0,
                TokenElevation,
                Some((&mut elevation as *mut TOKEN_ELEVATION).cast()),
                size_of::<TOKEN_ELEVATION>() as u32,
                &mut len,
            )
        }
        .ok()?;

        Some(elevation.TokenIsElevated != 0)
    }
}

#[cfg(not(target_os = "windows"))]
mod fallback {
    use crate::error::{Error, Result};
    use crate::memory::{
        ModuleInfo, ProcessInfo, ProcessMemory, ProcessProvider, Protection, ReadMemory,
        WriteMemory,
    };

    const UNSUPPORTED: &str = "process memory access requires Windows";

    /// Placeholder handle; never constructed on this platform
    pub struct ProcessHandle {
        info: ProcessInfo,
    }

    impl ProcessHandle {
        pub fn open(_name: &str) -> Result<Self> {
            Err(Error::Unsupported(UNSUPPORTED))
        }
    }

    impl ReadMemory for ProcessHandle {
        fn read_bytes(&self, _address: u64, _size: usize) -> Result<Vec<u8>> {
            Err(Error::Unsupported(UNSUPPORTED))
        }
    }

    impl WriteMemory for ProcessHandle {
        fn write_bytes(&self, _address: u64, _data: &[u8]) -> Result<()> {
            Err(Error::Unsupported(UNSUPPORTED))
        }

        fn protect(&self, _address: u64, _size: usize, _protection: Protection) -> Result<Protection> {
            Err(Error::Unsupported(UNSUPPORTED))
        }
    }

    impl ProcessMemory for ProcessHandle {
        fn info(&self) -> &ProcessInfo {
            &self.info
        }

        fn find_module(&self, _name: &str) -> Result<ModuleInfo> {
            Err(Error::Unsupported(UNSUPPORTED))
        }

        fn is_alive(&self) -> bool {
            false
        }
    }

    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemProvider;

    impl ProcessProvider for SystemProvider {
        type Process = ProcessHandle;

        fn open(&self, name: &str) -> Result<ProcessHandle> {
            ProcessHandle::open(name)
        }
    }

    pub fn is_elevated() -> Option<bool> {
        None
    }
}
