//! Types shared by the API registry and the shims.

use strum::{Display, EnumCount, EnumIter, EnumString, IntoStaticStr};

use crate::{
    emulation::{process::ProcessState, HostEngine, PointerWidth, Win32Error},
    Result,
};

/// Every API the registry knows how to dispatch.
///
/// The string form is the exported kernel32 name, so `ApiId` converts both ways with
/// `str::parse` and `Into<&'static str>`.
///
/// # Examples
///
/// ```rust
/// use procthreads::emulation::ApiId;
///
/// let id: ApiId = "TlsGetValue".parse()?;
/// assert_eq!(id, ApiId::TlsGetValue);
/// assert_eq!(id.to_string(), "TlsGetValue");
/// # Ok::<(), strum::ParseError>(())
/// ```
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, EnumIter,
    EnumCount, IntoStaticStr,
)]
#[allow(missing_docs)]
pub enum ApiId {
    ExitProcess,
    TerminateProcess,
    GetCurrentProcess,
    GetCurrentThread,
    OpenProcess,
    IsProcessorFeaturePresent,
    GetStartupInfoA,
    GetStartupInfoW,
    GetCurrentThreadId,
    GetCurrentProcessId,
    TlsAlloc,
    TlsFree,
    TlsGetValue,
    TlsSetValue,
    CreateThread,
    GetLastError,
    SetLastError,
    SuspendThread,
    ResumeThread,
    ExitThread,
    GetThreadId,
    GetExitCodeThread,
}

impl ApiId {
    /// Returns the exported name.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// C type class of an API parameter, which decides how the raw value is masked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// `DWORD` / `BOOL`, always 32 bits.
    Dword,
    /// `UINT`, always 32 bits.
    Uint,
    /// Any pointer type.
    Pointer,
    /// `SIZE_T`, pointer-sized.
    SizeT,
    /// `HANDLE`, pointer-sized.
    Handle,
}

impl ParamKind {
    /// Masks a raw register or stack value to the width of this parameter.
    #[must_use]
    pub fn mask(self, value: u64, width: PointerWidth) -> u64 {
        match self {
            ParamKind::Dword | ParamKind::Uint => value & 0xFFFF_FFFF,
            ParamKind::Pointer | ParamKind::SizeT | ParamKind::Handle => width.truncate(value),
        }
    }
}

/// One entry of an API's static signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Param {
    /// Parameter name as in the Windows SDK headers.
    pub name: &'static str,
    /// Type class.
    pub kind: ParamKind,
}

impl Param {
    /// Creates a signature entry.
    #[must_use]
    pub const fn new(name: &'static str, kind: ParamKind) -> Self {
        Self { name, kind }
    }
}

/// Decoded arguments of one call, already masked to their declared widths.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallArgs {
    api: ApiId,
    params: &'static [Param],
    values: Vec<u64>,
}

impl CallArgs {
    /// Masks `raw` according to `params`.
    ///
    /// The caller has already checked that the lengths match.
    pub(crate) fn new(
        api: ApiId,
        params: &'static [Param],
        raw: &[u64],
        width: PointerWidth,
    ) -> Self {
        let values = params
            .iter()
            .zip(raw)
            .map(|(param, &value)| param.kind.mask(value, width))
            .collect();
        Self { api, params, values }
    }

    /// Returns the argument at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Invariant`] if the signature has no such parameter.
    pub fn get(&self, index: usize) -> Result<u64> {
        self.values.get(index).copied().ok_or_else(|| {
            invariant_error!("{} has no parameter at index {}", self.api, index)
        })
    }

    /// Returns a 32-bit argument at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Invariant`] if the signature has no such parameter.
    pub fn dword(&self, index: usize) -> Result<u32> {
        let value = self.get(index)?;
        u32::try_from(value)
            .map_err(|_| invariant_error!("{} argument {} is not a DWORD", self.api, index))
    }

    /// Returns the argument with the given parameter name.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Invariant`] if the signature has no such parameter.
    pub fn named(&self, name: &str) -> Result<u64> {
        let index = self
            .params
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| invariant_error!("{} has no parameter {}", self.api, name))?;
        self.get(index)
    }

    /// Returns the masked values in signature order.
    #[must_use]
    pub fn values(&self) -> &[u64] {
        &self.values
    }
}

/// Result of a shim.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiReturn {
    /// Value placed in the return register.
    Value(u64),
    /// The API returns `void`.
    Void,
}

impl ApiReturn {
    /// Returns the value, if any.
    #[must_use]
    pub fn value(self) -> Option<u64> {
        match self {
            ApiReturn::Value(value) => Some(value),
            ApiReturn::Void => None,
        }
    }

    /// `TRUE` or `FALSE`.
    #[must_use]
    pub fn from_bool(value: bool) -> Self {
        ApiReturn::Value(u64::from(value))
    }
}

/// Everything a shim may touch during one call.
pub struct ApiContext<'a> {
    /// Process bookkeeping.
    pub state: &'a mut ProcessState,
    /// The host engine.
    pub host: &'a mut dyn HostEngine,
    /// Decoded arguments.
    pub args: CallArgs,
}

impl ApiContext<'_> {
    /// Returns the guest pointer width.
    #[must_use]
    pub fn width(&self) -> PointerWidth {
        self.host.pointer_width()
    }

    /// Sets the current thread's last-error.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NoCurrentThread`] before any thread context was established.
    pub fn set_last_error(&mut self, code: impl Into<u32>) -> Result<()> {
        self.state
            .threads_mut()
            .current_thread_mut()?
            .set_last_error(code);
        Ok(())
    }

    /// Sets the current thread's last-error and returns `value`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NoCurrentThread`] before any thread context was established.
    pub fn fail(&mut self, error: Win32Error, value: u64) -> Result<ApiReturn> {
        self.set_last_error(error)?;
        Ok(ApiReturn::Value(value))
    }
}

/// Signature of every shim.
pub type ApiHandler = fn(&mut ApiContext<'_>) -> Result<ApiReturn>;
