//! Emulation process - main entry point for embedding the process-control layer.
//!
//! An [`EmulationProcess`] owns the host engine, the process bookkeeping and the API dispatch
//! table. The embedding emulator drives it through three calls:
//!
//! - [`start`](EmulationProcess::start) once, when the guest's entry point begins executing
//!   on the host's primary context
//! - [`switch_to_context`](EmulationProcess::switch_to_context) whenever the host schedules a
//!   different execution context
//! - [`dispatch`](EmulationProcess::dispatch) for every intercepted API call
//!
//! # Example
//!
//! ```rust
//! use procthreads::emulation::{ApiReturn, PointerWidth, ProcessBuilder, RecordingHost};
//!
//! let host = RecordingHost::new(PointerWidth::Bits32);
//! let primary = host.primary_context();
//! let mut process = ProcessBuilder::new().host(host).build()?;
//!
//! process.start(0x401000, primary)?;
//! assert_eq!(process.dispatch("GetCurrentThreadId", &[])?, ApiReturn::Value(1));
//! # Ok::<(), procthreads::Error>(())
//! ```

use std::fmt;

use crate::{
    emulation::{
        process::{EmulationConfig, ProcessState},
        runtime::{ApiId, ApiRegistry, ApiReturn},
        EngineContextId, HostEngine, ThreadId, ThreadStart,
    },
    Error, Result,
};

/// One emulated guest process bound to its host engine.
pub struct EmulationProcess<H: HostEngine> {
    /// Process name for identification and logging.
    pub(super) name: String,

    /// The host engine that executes guest code.
    pub(super) host: H,

    /// Thread, handle and TLS bookkeeping.
    pub(super) state: ProcessState,

    /// Dispatch table for intercepted calls.
    pub(super) registry: ApiRegistry,
}

impl<H: HostEngine> EmulationProcess<H> {
    /// Creates a process with the full kernel32 dispatch table.
    #[must_use]
    pub fn new(host: H, config: EmulationConfig) -> Self {
        Self::with_registry(host, config, ApiRegistry::kernel32())
    }

    /// Creates a process with a custom dispatch table.
    #[must_use]
    pub fn with_registry(host: H, config: EmulationConfig, registry: ApiRegistry) -> Self {
        let state = ProcessState::new(config, &host);
        Self {
            name: String::from("guest"),
            host,
            state,
            registry,
        }
    }

    /// Returns the process name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &EmulationConfig {
        self.state.config()
    }

    /// Returns the host engine.
    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Returns the host engine for modification.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Returns the process bookkeeping.
    #[must_use]
    pub fn state(&self) -> &ProcessState {
        &self.state
    }

    /// Returns the process bookkeeping for modification.
    pub fn state_mut(&mut self) -> &mut ProcessState {
        &mut self.state
    }

    /// Returns the dispatch table.
    #[must_use]
    pub fn registry(&self) -> &ApiRegistry {
        &self.registry
    }

    /// Returns the exit code once the process has exited.
    #[must_use]
    pub fn exit_code(&self) -> Option<u32> {
        self.state.exit_code()
    }

    /// Registers the main thread on the host's already running primary context.
    ///
    /// The main thread becomes RUNNING and current. It gets no handle table entry; guests
    /// refer to it through the current-thread pseudo-handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invariant`] if the process was already started and
    /// [`Error::ResourceExhausted`] if the thread limit is 0.
    pub fn start(&mut self, entry_point: u64, context: EngineContextId) -> Result<ThreadId> {
        if !self.state.threads().is_empty() {
            return Err(invariant_error!("process {} already started", self.name));
        }

        let start = ThreadStart {
            entry_point,
            argument: 0,
            stack_size: self.config().threads.default_stack_size,
        };
        let threads = self.state.threads_mut();
        let id = threads.create(start, false)?;
        threads.bind_context(id, context)?;
        threads.switch_to(id)?;

        log::debug!("process {} started main thread {id} at {entry_point:#x}", self.name);
        Ok(id)
    }

    /// Makes the thread driven by `context` the current thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invariant`] if no thread is bound to `context` and
    /// [`Error::InvalidStateTransition`] if that thread is suspended or terminated.
    pub fn switch_to_context(&mut self, context: EngineContextId) -> Result<ThreadId> {
        let threads = self.state.threads_mut();
        let id = threads
            .thread_for_context(context)
            .ok_or_else(|| invariant_error!("no thread runs on {}", context))?;
        threads.switch_to(id)?;
        Ok(id)
    }

    /// Dispatches an intercepted call by exported name.
    ///
    /// `args` holds the raw argument values in declaration order, as decoded by the host's
    /// calling-convention layer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownApi`] for names without a shim and every fatal error of
    /// [`dispatch_id`](Self::dispatch_id).
    pub fn dispatch(&mut self, name: &str, args: &[u64]) -> Result<ApiReturn> {
        let id = name
            .parse::<ApiId>()
            .map_err(|_| Error::UnknownApi(name.to_string()))?;
        self.dispatch_id(id, args)
    }

    /// Dispatches an intercepted call.
    ///
    /// Guest-visible failures are reported through the return value and last-error and are
    /// `Ok` here.
    ///
    /// # Errors
    ///
    /// Any `Err` means the run cannot continue faithfully: see [`Error::is_fatal`].
    pub fn dispatch_id(&mut self, id: ApiId, args: &[u64]) -> Result<ApiReturn> {
        let result = self
            .registry
            .dispatch(id, &mut self.state, &mut self.host, args);

        if let Err(err) = &result {
            if self.state.config().tracing.trace_errors {
                log::warn!("process {}: {id} failed: {err}", self.name);
            }
        }
        result
    }

    /// Returns a snapshot of the bookkeeping counters.
    #[must_use]
    pub fn summary(&self) -> ProcessSummary {
        let threads = self.state.threads();
        ProcessSummary {
            name: self.name.clone(),
            process_id: self.state.process_id(),
            thread_count: threads.len(),
            live_thread_count: threads.live_count(),
            handle_count: self.state.handles().len(),
            current_thread: threads.current_id().ok(),
            exit_code: self.state.exit_code(),
        }
    }
}

impl<H: HostEngine> fmt::Debug for EmulationProcess<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmulationProcess")
            .field("name", &self.name)
            .field("pointer_width", &self.host.pointer_width())
            .field("threads", &self.state.threads().len())
            .field("handles", &self.state.handles().len())
            .field("apis", &self.registry.len())
            .finish_non_exhaustive()
    }
}

/// Counters describing a process at one point in time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessSummary {
    /// Process name.
    pub name: String,
    /// Guest-visible process id.
    pub process_id: u32,
    /// Threads ever created, terminated ones included.
    pub thread_count: usize,
    /// Threads that have not terminated.
    pub live_thread_count: usize,
    /// Allocated handles.
    pub handle_count: usize,
    /// Current thread, if a context was established.
    pub current_thread: Option<ThreadId>,
    /// Exit code, if the process has exited.
    pub exit_code: Option<u32>,
}

impl fmt::Display for ProcessSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (pid {:#x}): {}/{} threads live, {} handles",
            self.name,
            self.process_id,
            self.live_thread_count,
            self.thread_count,
            self.handle_count
        )?;
        if let Some(code) = self.exit_code {
            write!(f, ", exited with {code:#x}")?;
        }
        Ok(())
    }
}
