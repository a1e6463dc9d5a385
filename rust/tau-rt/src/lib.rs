//! tau runtime: the bytecode virtual machine, its per-unit garbage
//! collector, the builtin table and the bridge to native plugins.

pub mod builtins;
pub mod config;
pub mod error;
pub mod gc;
mod native;
pub mod vm;

pub use config::{ConfigError, VmConfig};
pub use error::{Fatal, VmError};
pub use gc::{Heap, SweepStats};
pub use vm::{Module, ModuleContext, ModuleLoader, Vm};
