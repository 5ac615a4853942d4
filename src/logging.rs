//! Log subscriber setup.
//!
//! The VM emits `tracing` events under the `wordvm::vm` target: run start
//! and halt at `debug`, every step at `trace`, aborted runs at `warn`. These
//! are separate from the execution trace written to the VM's trace sink.

use tracing_subscriber::{EnvFilter, fmt};

use crate::config::VmConfig;

/// Install a stderr subscriber filtered by `filter` (e.g. `"wordvm=debug"`).
///
/// `RUST_LOG` takes precedence when set. Returns false if a global
/// subscriber was already installed, which makes repeated calls harmless.
pub fn init_logging(filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    install(filter)
}

/// `init_logging` with the config's `log_filter`.
pub fn init_from_config(config: &VmConfig) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter_for(config));
    install(filter)
}

/// The filter described by the config, ignoring `RUST_LOG`.
pub fn filter_for(config: &VmConfig) -> EnvFilter {
    EnvFilter::new(&config.log_filter)
}

/// Like `init_logging`, but routes output through the test harness's
/// captured writer.
pub fn init_test_logging(filter: &str) -> bool {
    fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_test_writer()
        .try_init()
        .is_ok()
}

fn install(filter: EnvFilter) -> bool {
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .is_ok()
}
