mod handle;
mod process;
mod protect;

// Simulated process for unit and integration tests
#[doc(hidden)]
pub mod mock;

pub use handle::{ProcessHandle, SystemProvider, is_elevated};
pub use process::*;
pub use protect::{ProtectionGuard, write_protected};

#[doc(hidden)]
pub use mock::{MockProcess, MockProcessBuilder, MockProvider};
