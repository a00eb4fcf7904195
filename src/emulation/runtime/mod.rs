//! API call surface of the emulated process.
//!
//! The host engine intercepts guest calls into kernel32 and forwards them, by name or
//! [`ApiId`], together with the raw argument values its calling-convention layer decoded.
//! This module turns such a call into an invocation of the matching shim.
//!
//! # Key Components
//!
//! - [`ApiRegistry`] - Explicit dispatch table from [`ApiId`] to [`ApiShim`]
//! - [`ApiShim`] - Static parameter signature plus handler function pointer
//! - [`Param`] / [`ParamKind`] - Signature entries deciding how each argument is masked
//! - [`ApiContext`] - What a shim may touch: process state, host engine, decoded arguments
//! - [`ApiReturn`] - Value for the return register, or nothing for `void` APIs
//!
//! # Registered APIs
//!
//! | Group | APIs |
//! |-------|------|
//! | Process | `ExitProcess`, `TerminateProcess`, `GetCurrentProcess`, `GetCurrentProcessId`, `OpenProcess` |
//! | Thread | `CreateThread`, `ExitThread`, `GetCurrentThread`, `GetCurrentThreadId`, `GetThreadId`, `SuspendThread`, `ResumeThread`, `GetExitCodeThread` |
//! | TLS | `TlsAlloc`, `TlsFree`, `TlsGetValue`, `TlsSetValue` |
//! | Error | `GetLastError`, `SetLastError` |
//! | Environment | `GetStartupInfoA`, `GetStartupInfoW`, `IsProcessorFeaturePresent` |

mod kernel32;
mod registry;
mod startupinfo;
mod types;

pub use kernel32::STILL_ACTIVE;
pub use registry::{ApiRegistry, ApiShim};
pub use startupinfo::{encode_startup_info, startup_info_size};
pub use types::{ApiContext, ApiHandler, ApiId, ApiReturn, CallArgs, Param, ParamKind};
