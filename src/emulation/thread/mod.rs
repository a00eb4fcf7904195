//! Guest threads, their TLS slots and the thread manager.
//!
//! # Key Components
//!
//! - [`EmulationThread`] - One guest thread: identity, lifecycle state, start parameters,
//!   TLS slots and last-error
//! - [`ThreadState`] - READY / RUNNING / SUSPENDED / TERMINATED state machine
//! - [`TlsSlotTable`] - Per-thread TLS slots with a forward-only index allocator
//! - [`ThreadManager`] - Owns all threads and the current-thread pointer
//! - [`CreationFlags`] - `CreateThread` flags
//!
//! # Scheduling Model
//!
//! Threads are cooperative from this module's point of view. The host engine decides which
//! execution context runs and reports context switches through
//! [`ThreadManager::switch_to`]; nothing here blocks or waits. "Suspended" is a flag the host
//! consumes, not a host-level blocking primitive.

mod flags;
mod guest;
mod manager;
mod tls;

pub use flags::CreationFlags;
pub use guest::{EmulationThread, ThreadId, ThreadStart, ThreadState, MAX_SUSPEND_COUNT};
pub use manager::{ThreadManager, TLS_OUT_OF_INDEXES};
pub use tls::TlsSlotTable;
