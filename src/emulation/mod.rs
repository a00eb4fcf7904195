//! Windows process, thread, handle and TLS emulation for binary emulators.
//!
//! This module provides the bookkeeping a guest Windows binary expects from its host OS
//! while an emulator executes it: which threads exist and in what state, which thread is
//! current, what each thread's TLS slots and last-error hold, and which handle values name
//! which kernel objects. Instruction execution, memory mapping and scheduling stay with the
//! embedding emulator, which is reached through the [`HostEngine`] trait.
//!
//! # Architecture
//!
//! Components, leaves first:
//!
//! - Handle table mapping small integer ids to kernel objects
//! - Per-thread TLS slot tables
//! - Threads with a READY / RUNNING / SUSPENDED / TERMINATED lifecycle
//! - Thread manager owning all threads and the current-thread pointer
//! - Process state and the kernel32 API shims operating on it
//!
//! # Key Components
//!
//! ## Process Model
//! - [`crate::emulation::EmulationProcess`] - Owns the host engine and dispatches calls
//! - [`crate::emulation::ProcessBuilder`] - Fluent API for configuring processes
//! - [`crate::emulation::EmulationConfig`] - Configuration with presets
//!
//! ## Threads
//! - [`crate::emulation::ThreadManager`] - Thread table and current-thread scoping
//! - [`crate::emulation::EmulationThread`] - One guest thread
//! - [`crate::emulation::TlsSlotTable`] - Per-thread TLS slots
//!
//! ## Handles
//! - [`crate::emulation::HandleTable`] - Allocated handle ids
//! - [`crate::emulation::HandleSentinels`] - Pseudo-handle encoding and decoding
//!
//! ## Call Surface
//! - [`crate::emulation::ApiRegistry`] - Explicit dispatch table
//! - [`crate::emulation::ApiId`] - Every dispatchable API
//!
//! ## Host Boundary
//! - [`crate::emulation::HostEngine`] - What the embedding emulator must provide
//! - [`crate::emulation::RecordingHost`] - In-memory implementation for tests and tooling
//!
//! # Usage Example
//!
//! ```rust
//! use procthreads::emulation::{ApiReturn, PointerWidth, ProcessBuilder, RecordingHost};
//!
//! let mut host = RecordingHost::new(PointerWidth::Bits32);
//! host.map(0x10000, 0x1000);
//! let primary = host.primary_context();
//!
//! let mut process = ProcessBuilder::new().host(host).build()?;
//! process.start(0x401000, primary)?;
//!
//! let slot = process.dispatch("TlsAlloc", &[])?;
//! assert_eq!(slot, ApiReturn::Value(0));
//!
//! let thread = process.dispatch("CreateThread", &[0, 0, 0x402000, 0, 0x4, 0x10000])?;
//! assert_eq!(thread, ApiReturn::Value(1));
//! # Ok::<(), procthreads::Error>(())
//! ```
//!
//! # Thread Safety
//!
//! All mutation goes through `&mut` borrows of [`crate::emulation::EmulationProcess`], so
//! calls are serialized by construction. The process is `Send` when its host engine is.

mod handle;
mod host;
mod memory;
mod process;
mod runtime;
mod thread;
mod winerror;

pub use handle::{
    Handle, HandleId, HandleSentinels, HandleTable, HandleValue, KernelObject, ProcessId,
    PseudoHandle,
};

pub use host::{
    ContextRequest, EngineContextId, HostEngine, PointerWidth, RecordedContext, RecordingHost,
};

pub use memory::{pad_to, read_le_at, read_ptr_at, write_le_at, write_ptr_at, GuestIO};

pub use process::{
    EmulationConfig, EmulationLimits, EmulationProcess, ProcessBuilder, ProcessConfig,
    ProcessState, ProcessSummary, StartupInfoConfig, ThreadConfig, TracingConfig,
};

pub use runtime::{
    encode_startup_info, startup_info_size, ApiContext, ApiHandler, ApiId, ApiRegistry,
    ApiReturn, ApiShim, CallArgs, Param, ParamKind, STILL_ACTIVE,
};

pub use thread::{
    CreationFlags, EmulationThread, ThreadId, ThreadManager, ThreadStart, ThreadState,
    TlsSlotTable, MAX_SUSPEND_COUNT, TLS_OUT_OF_INDEXES,
};

pub use winerror::Win32Error;
