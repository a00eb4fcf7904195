use thiserror::Error;

use crate::emulation::{HandleId, ThreadId, ThreadState};

macro_rules! invariant_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Invariant {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Invariant {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which covers every failure the bookkeeping subsystem can report
/// to its embedder.
///
/// Guest-visible failures (an unallocated TLS slot, a bad thread handle) are *not* errors in
/// this sense: the API shims report them to the guest through return values and the calling
/// thread's last-error value, exactly as Windows would. An [`Error`] returned from
/// [`crate::emulation::EmulationProcess::dispatch`] means the emulator itself cannot continue
/// faithfully and the run should be stopped.
///
/// # Error Categories
///
/// ## Internal invariant violations
/// - [`Error::Invariant`] - Bookkeeping state contradicts itself
/// - [`Error::NoCurrentThread`] - A thread-scoped call arrived before any thread context
/// - [`Error::ThreadNotFound`] - A thread id that was never assigned
/// - [`Error::HandleNotFound`] - A handle id that was never allocated
/// - [`Error::InvalidStateTransition`] - An illegal thread lifecycle transition
///
/// ## Resource errors
/// - [`Error::ResourceExhausted`] - Id space or a configured limit ran out
///
/// ## Host and dispatch errors
/// - [`Error::InvalidAddress`] - Guest memory access outside mapped memory
/// - [`Error::OutOfBounds`] - Encoding past the end of a structure buffer
/// - [`Error::UnknownApi`] - No shim registered for the requested call
/// - [`Error::ArgumentCount`] - Decoded argument list does not fit the call contract
/// - [`Error::Host`] - Free-form failure reported by the host engine
///
/// # Examples
///
/// ```rust
/// use procthreads::Error;
///
/// let err = Error::NoCurrentThread;
/// assert!(err.is_fatal());
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// Internal bookkeeping state is inconsistent.
    ///
    /// This indicates a bug in the subsystem rather than a guest condition. The error
    /// includes the source location where the violation was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Description of the violated invariant
    /// * `file` - Source file where the violation was detected
    /// * `line` - Source line where the violation was detected
    #[error("Invariant violated - {file}:{line}: {message}")]
    Invariant {
        /// The message to be printed for the Invariant error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A thread-scoped operation was requested before any thread context was established.
    #[error("No current thread has been established")]
    NoCurrentThread,

    /// The requested thread id was never assigned.
    #[error("Thread {0} does not exist")]
    ThreadNotFound(ThreadId),

    /// The requested handle id was never allocated.
    #[error("Handle {0} does not exist")]
    HandleNotFound(HandleId),

    /// A thread lifecycle transition that the state machine does not allow.
    #[error("Thread {thread} cannot move from {from} to {to}")]
    InvalidStateTransition {
        /// The thread whose state was being changed
        thread: ThreadId,
        /// The state the thread was in
        from: ThreadState,
        /// The requested target state
        to: ThreadState,
    },

    /// An identifier space or a configured limit has been exhausted.
    ///
    /// The associated value names the exhausted resource.
    #[error("Resource exhausted - {0}")]
    ResourceExhausted(&'static str),

    /// A guest memory access touched memory the host has not mapped.
    #[error("Invalid guest memory access at {address:#x} ({len} bytes)")]
    InvalidAddress {
        /// Start address of the access
        address: u64,
        /// Length of the access in bytes
        len: usize,
    },

    /// An out of bound access was attempted while encoding or decoding a guest structure.
    #[error("Out of Bound access would have occurred!")]
    OutOfBounds,

    /// No shim is registered for the requested API name.
    #[error("No shim registered for API '{0}'")]
    UnknownApi(String),

    /// The decoded argument list does not match the call contract.
    #[error("{api} expects {expected} arguments, got {got}")]
    ArgumentCount {
        /// Name of the API being dispatched
        api: &'static str,
        /// Number of parameters in the static signature
        expected: usize,
        /// Number of decoded arguments supplied
        got: usize,
    },

    /// Failure reported by the host execution engine.
    #[error("Host engine error: {0}")]
    Host(String),
}

impl Error {
    /// Returns `true` if the error indicates a bug in the bookkeeping subsystem or its
    /// embedding, as opposed to a condition the embedder may recover from.
    ///
    /// Only [`Error::UnknownApi`] is non-fatal: the embedder may fall back to another
    /// implementation of the call.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::UnknownApi(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invariant_macro_records_location() {
        let err = invariant_error!("thread {} has no context", 7);
        match err {
            Error::Invariant {
                message,
                file,
                line,
            } => {
                assert_eq!(message, "thread 7 has no context");
                assert!(file.ends_with("error.rs"));
                assert!(line > 0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_fatal_classification() {
        assert!(Error::NoCurrentThread.is_fatal());
        assert!(Error::ResourceExhausted("handles").is_fatal());
        assert!(!Error::UnknownApi("Sleep".to_string()).is_fatal());
    }

    #[test]
    fn test_display() {
        let err = Error::ArgumentCount {
            api: "TlsFree",
            expected: 1,
            got: 0,
        };
        assert_eq!(err.to_string(), "TlsFree expects 1 arguments, got 0");
    }
}
