//! Win32 error codes reported to the guest through last-error.

use strum::{Display, FromRepr, IntoStaticStr};

/// Guest-visible error codes produced by the emulated APIs.
///
/// Last-error is stored as a raw `u32` because guests may set arbitrary values through
/// `SetLastError`; this enum names the codes the shims themselves produce.
///
/// # Examples
///
/// ```rust
/// use procthreads::emulation::Win32Error;
///
/// assert_eq!(Win32Error::InvalidParameter.code(), 0x57);
/// assert_eq!(Win32Error::from_repr(0x57), Some(Win32Error::InvalidParameter));
/// assert_eq!(Win32Error::InvalidParameter.to_string(), "ERROR_INVALID_PARAMETER");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, FromRepr, IntoStaticStr)]
#[repr(u32)]
pub enum Win32Error {
    /// The operation completed successfully.
    #[strum(serialize = "ERROR_SUCCESS")]
    Success = 0,
    /// Access is denied.
    #[strum(serialize = "ERROR_ACCESS_DENIED")]
    AccessDenied = 5,
    /// The handle is invalid.
    #[strum(serialize = "ERROR_INVALID_HANDLE")]
    InvalidHandle = 6,
    /// Not enough memory resources are available to process this command.
    #[strum(serialize = "ERROR_NOT_ENOUGH_MEMORY")]
    NotEnoughMemory = 8,
    /// The parameter is incorrect.
    #[strum(serialize = "ERROR_INVALID_PARAMETER")]
    InvalidParameter = 0x57,
    /// The recipient process has refused the signal (suspend count overflow).
    #[strum(serialize = "ERROR_SIGNAL_REFUSED")]
    SignalRefused = 156,
    /// No more data is available.
    #[strum(serialize = "ERROR_NO_MORE_ITEMS")]
    NoMoreItems = 259,
}

impl Win32Error {
    /// Returns the numeric code.
    #[must_use]
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl From<Win32Error> for u32 {
    fn from(err: Win32Error) -> Self {
        err.code()
    }
}
