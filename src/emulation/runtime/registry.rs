//! Explicit API dispatch table.
//!
//! The registry maps each [`ApiId`] to an [`ApiShim`]: a static parameter signature plus a
//! plain function pointer. It is built once when a process is created and consulted for every
//! call the host forwards. Dispatch checks the argument count against the signature, masks
//! each argument to its declared width, invokes the handler and masks the return value to the
//! guest pointer width.

use std::{collections::HashMap, fmt};

use crate::{
    emulation::{
        process::ProcessState,
        runtime::{
            kernel32,
            types::{ApiContext, ApiHandler, ApiId, ApiReturn, CallArgs, Param},
        },
        HostEngine,
    },
    Error, Result,
};

/// One dispatchable API.
#[derive(Clone, Copy)]
pub struct ApiShim {
    id: ApiId,
    params: &'static [Param],
    handler: ApiHandler,
}

impl ApiShim {
    /// Creates a shim.
    #[must_use]
    pub const fn new(id: ApiId, params: &'static [Param], handler: ApiHandler) -> Self {
        Self {
            id,
            params,
            handler,
        }
    }

    /// Returns the API this shim implements.
    #[must_use]
    pub fn id(&self) -> ApiId {
        self.id
    }

    /// Returns the parameter signature.
    #[must_use]
    pub fn params(&self) -> &'static [Param] {
        self.params
    }
}

impl fmt::Debug for ApiShim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiShim")
            .field("id", &self.id)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Table of all dispatchable APIs.
///
/// # Examples
///
/// ```rust
/// use procthreads::emulation::{ApiId, ApiRegistry};
///
/// let registry = ApiRegistry::kernel32();
/// let shim = registry.lookup("CreateThread")?;
/// assert_eq!(shim.id(), ApiId::CreateThread);
/// assert_eq!(shim.params().len(), 6);
/// # Ok::<(), procthreads::Error>(())
/// ```
#[derive(Clone, Debug, Default)]
pub struct ApiRegistry {
    shims: HashMap<ApiId, ApiShim>,
}

impl ApiRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every process and thread shim.
    #[must_use]
    pub fn kernel32() -> Self {
        let mut registry = Self::new();
        kernel32::register(&mut registry);
        registry
    }

    /// Adds a shim, returning the one it replaces.
    pub fn register(&mut self, shim: ApiShim) -> Option<ApiShim> {
        self.shims.insert(shim.id, shim)
    }

    /// Returns the shim for an API.
    #[must_use]
    pub fn get(&self, id: ApiId) -> Option<&ApiShim> {
        self.shims.get(&id)
    }

    /// Returns the shim for an exported name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownApi`] if the name is not registered.
    pub fn lookup(&self, name: &str) -> Result<&ApiShim> {
        name.parse::<ApiId>()
            .ok()
            .and_then(|id| self.get(id))
            .ok_or_else(|| Error::UnknownApi(name.to_string()))
    }

    /// Returns the number of registered shims.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shims.len()
    }

    /// Returns `true` if no shim is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shims.is_empty()
    }

    /// Iterates over the registered shims in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &ApiShim> {
        self.shims.values()
    }

    /// Invokes the shim for `id` with raw argument values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownApi`] if `id` is not registered, [`Error::ArgumentCount`] if
    /// `raw` does not match the signature, and whatever fatal error the shim reports.
    pub fn dispatch(
        &self,
        id: ApiId,
        state: &mut ProcessState,
        host: &mut dyn HostEngine,
        raw: &[u64],
    ) -> Result<ApiReturn> {
        let shim = self
            .get(id)
            .ok_or_else(|| Error::UnknownApi(id.to_string()))?;
        if raw.len() != shim.params.len() {
            return Err(Error::ArgumentCount {
                api: id.name(),
                expected: shim.params.len(),
                got: raw.len(),
            });
        }

        let width = host.pointer_width();
        let args = CallArgs::new(id, shim.params, raw, width);
        let trace = state.config().tracing.trace_calls;
        if trace {
            log::trace!("{id}({:x?})", args.values());
        }

        let mut context = ApiContext { state, host, args };
        let result = match (shim.handler)(&mut context)? {
            ApiReturn::Value(value) => ApiReturn::Value(width.truncate(value)),
            ApiReturn::Void => ApiReturn::Void,
        };

        if trace {
            log::trace!("{id} -> {result:x?}");
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;
    use crate::test::create_test_state;

    fn always_seven(_: &mut ApiContext<'_>) -> Result<ApiReturn> {
        Ok(ApiReturn::Value(7))
    }

    #[test]
    fn test_kernel32_is_complete() {
        let registry = ApiRegistry::kernel32();
        for api in ApiId::iter() {
            assert!(registry.get(api).is_some(), "{api} is not registered");
        }
        assert_eq!(registry.len(), ApiId::iter().count());
    }

    #[test]
    fn test_unknown_api() {
        let registry = ApiRegistry::new();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.lookup("GetCurrentThreadId"),
            Err(Error::UnknownApi(name)) if name == "GetCurrentThreadId"
        ));

        let (mut state, mut host) = create_test_state();
        assert!(matches!(
            registry.dispatch(ApiId::TlsAlloc, &mut state, &mut host, &[]),
            Err(Error::UnknownApi(_))
        ));
    }

    #[test]
    fn test_argument_count_checked() {
        let registry = ApiRegistry::kernel32();
        let (mut state, mut host) = create_test_state();
        assert!(matches!(
            registry.dispatch(ApiId::TlsGetValue, &mut state, &mut host, &[]),
            Err(Error::ArgumentCount {
                api: "TlsGetValue",
                expected: 1,
                got: 0
            })
        ));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = ApiRegistry::kernel32();
        let previous = registry.register(ApiShim::new(ApiId::GetCurrentProcessId, &[], always_seven));
        assert!(previous.is_some());

        let (mut state, mut host) = create_test_state();
        let result = registry
            .dispatch(ApiId::GetCurrentProcessId, &mut state, &mut host, &[])
            .unwrap();
        assert_eq!(result, ApiReturn::Value(7));
    }
}
