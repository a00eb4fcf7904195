//! # procthreads Prelude
//!
//! Re-exports the types needed to embed the process-control layer in an emulator.
//!
//! ```rust
//! use procthreads::prelude::*;
//!
//! let mut process = ProcessBuilder::new()
//!     .host(RecordingHost::new(PointerWidth::Bits64))
//!     .for_x64()
//!     .build()?;
//! let primary = process.host().primary_context();
//! process.start(0x140001000, primary)?;
//!
//! let thread = process.dispatch("GetCurrentThread", &[])?;
//! assert_eq!(thread, ApiReturn::Value(u64::MAX - 1));
//! # Ok::<(), procthreads::Error>(())
//! ```

// ================================================================================================
// Core Error Handling
// ================================================================================================

/// The main error type for all operations
pub use crate::Error;

/// Result type alias
pub use crate::Result;

// ================================================================================================
// Process Model
// ================================================================================================

/// Process embedding, construction and configuration
pub use crate::emulation::{
    EmulationConfig, EmulationLimits, EmulationProcess, ProcessBuilder, ProcessConfig,
    ProcessState, ProcessSummary, StartupInfoConfig, ThreadConfig, TracingConfig,
};

// ================================================================================================
// Host Boundary
// ================================================================================================

/// What the embedding emulator implements, plus the in-memory reference host
pub use crate::emulation::{
    ContextRequest, EngineContextId, HostEngine, PointerWidth, RecordingHost,
};

// ================================================================================================
// Threads, Handles and Errors
// ================================================================================================

/// Thread bookkeeping
pub use crate::emulation::{
    CreationFlags, EmulationThread, ThreadId, ThreadManager, ThreadStart, ThreadState,
    TlsSlotTable,
};

/// Handle bookkeeping
pub use crate::emulation::{HandleId, HandleTable, HandleValue, KernelObject, PseudoHandle};

/// Guest-visible error codes
pub use crate::emulation::Win32Error;

// ================================================================================================
// Call Surface
// ================================================================================================

/// API dispatch
pub use crate::emulation::{ApiId, ApiRegistry, ApiReturn, ApiShim};
