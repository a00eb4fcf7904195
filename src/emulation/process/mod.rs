//! Process model for the emulated guest.
//!
//! The process module organizes emulation around an [`EmulationProcess`], which represents a
//! single guest process with its own:
//!
//! - Thread table, current-thread pointer and per-thread TLS
//! - Handle table and sentinel handle values
//! - API dispatch table
//! - Configuration (identity, limits, tracing)
//!
//! # Key Components
//!
//! - [`ProcessBuilder`] - Fluent API for configuring and creating processes
//! - [`EmulationProcess`] - Owns the host engine and dispatches intercepted calls
//! - [`ProcessState`] - The bookkeeping the API shims operate on
//! - [`EmulationConfig`] - Configuration with presets
//!
//! # Workflow
//!
//! 1. Create a [`ProcessBuilder`] and give it a [`HostEngine`](crate::emulation::HostEngine)
//! 2. Call [`build()`](ProcessBuilder::build)
//! 3. Call [`start()`](EmulationProcess::start) when the guest entry point runs
//! 4. Forward every intercepted call to [`dispatch()`](EmulationProcess::dispatch) and every
//!    context switch to [`switch_to_context()`](EmulationProcess::switch_to_context)

mod builder;
mod config;
mod execution;
mod state;

pub use builder::ProcessBuilder;
pub use config::{
    EmulationConfig, EmulationLimits, ProcessConfig, StartupInfoConfig, ThreadConfig,
    TracingConfig,
};
pub use execution::{EmulationProcess, ProcessSummary};
pub use state::ProcessState;
