// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

//! # procthreads
//!
//! Windows process, thread, handle and TLS semantics for binary emulators.
//!
//! A guest Windows binary running inside an emulator still expects its host OS to keep track
//! of threads, thread-local storage, handles and the per-thread last-error value. `procthreads`
//! is that bookkeeping layer. It sits between the emulator's API interception and its
//! scheduler: the emulator forwards intercepted kernel32 calls, reports context switches,
//! and receives directives (halt, create a context, park a context) back through the
//! [`emulation::HostEngine`] trait.
//!
//! ## Features
//!
//! - **Thread lifecycle** - READY / RUNNING / SUSPENDED / TERMINATED with Windows suspend counts
//! - **Per-thread TLS** - forward-only slot allocation with Windows failure semantics
//! - **Per-thread last-error** - scoped to whichever thread is current
//! - **Tagged handles** - pseudo-handles decoded explicitly, never confused with table ids
//! - **Explicit dispatch table** - static signatures, argument masking, no global registration
//! - **Host independence** - anything implementing [`emulation::HostEngine`] can embed it
//!
//! ## Quick Start
//!
//! ```rust
//! use procthreads::prelude::*;
//!
//! let host = RecordingHost::new(PointerWidth::Bits32);
//! let primary = host.primary_context();
//! let mut process = ProcessBuilder::new().host(host).build()?;
//! process.start(0x401000, primary)?;
//!
//! process.dispatch("SetLastError", &[5])?;
//! assert_eq!(process.dispatch("GetLastError", &[])?, ApiReturn::Value(5));
//! # Ok::<(), procthreads::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! Failures the guest can observe (an unallocated TLS slot, a bad thread handle, thread
//! exhaustion) are reported the Windows way, through return values and last-error, and come
//! back as `Ok`. An `Err(`[`Error`]`)` from dispatch means the bookkeeping cannot continue and
//! the emulation run should stop.

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]
#![deny(unsafe_code)]

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use procthreads::prelude::*;
///
/// let config = EmulationConfig::x64();
/// assert_eq!(config.process.process_id, 0x2005);
/// ```
pub mod prelude;

/// Process, thread, handle and TLS emulation.
///
/// See the module documentation for the component overview and an embedding example.
pub mod emulation;

/// `procthreads` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
/// This is used consistently throughout the crate for all fallible operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `procthreads` Error type
///
/// The main error type for all operations in this crate.
///
/// # Examples
///
/// ```rust
/// use procthreads::{emulation::{PointerWidth, ProcessBuilder, RecordingHost}, Error};
///
/// let mut process = ProcessBuilder::new()
///     .host(RecordingHost::new(PointerWidth::Bits32))
///     .build()?;
///
/// match process.dispatch("TlsAlloc", &[]) {
///     Err(Error::NoCurrentThread) => println!("process not started"),
///     Err(e) if e.is_fatal() => println!("stop: {e}"),
///     Err(e) => println!("skip: {e}"),
///     Ok(value) => println!("{value:?}"),
/// }
/// # Ok::<(), procthreads::Error>(())
/// ```
pub use error::Error;
