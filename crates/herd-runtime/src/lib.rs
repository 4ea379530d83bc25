//! Process runtime for herd.
//!
//! Adapters for the ports in `herd-core`:
//!
//! - [`LlamaLauncher`] spawns llama.cpp and exposes its stdout as events
//! - [`GenerationSupervisor`] keeps at most one generation in flight and
//!   drives each one through the echo filter, stop policy and watchdog
//! - [`StaticModelRegistry`] resolves model ids and lists model files

#![deny(unsafe_code)]

mod generation;
pub mod invocation;
pub mod process;
pub mod registry;
pub mod supervisor;
pub mod watchdog;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use invocation::LlamaInvocation;
pub use process::{DEFAULT_SHUTDOWN_GRACE, LlamaLauncher, LlamaProcess};
pub use registry::{BUILTIN_ALIASES, StaticModelRegistry};
pub use supervisor::{GenerationSupervisor, SupervisorConfig};
pub use watchdog::{StallAction, StallPolicy, StallWatchdog};
