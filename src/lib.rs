//! wordvm - a small direct-threaded stack machine
//!
//! The machine runs words from a fixed code block against a single stack
//! that holds both call frames and evaluation temporaries. Words are not
//! reliably tagged once they land in memory, so the crate also ships a
//! heuristic introspector used for execution traces and stack dumps.

pub mod config;
pub mod logging;
pub mod vm;

// Re-export commonly used types
pub use config::{TraceFormat, VmConfig};
pub use vm::{Op, RunState, Vm, VmError, Word};
