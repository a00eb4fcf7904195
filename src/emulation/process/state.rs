//! Process-wide bookkeeping shared by every API shim.

use crate::{
    emulation::{
        process::EmulationConfig, ContextRequest, CreationFlags, EngineContextId, HandleId, HandleSentinels,
        HandleTable, HandleValue, HostEngine, KernelObject, PseudoHandle, ThreadId,
        ThreadManager, ThreadStart,
    },
    Result,
};

/// The process-control state of one emulated guest process.
///
/// `ProcessState` owns the thread manager and the handle table and knows the sentinel handle
/// values of the process. It never owns the host engine: every operation that has to reach
/// the host takes it as a `&mut dyn HostEngine` argument, so API shims can borrow both at the
/// same time.
#[derive(Debug)]
pub struct ProcessState {
    config: EmulationConfig,
    threads: ThreadManager,
    handles: HandleTable,
    sentinels: HandleSentinels,
    exit_code: Option<u32>,
}

impl ProcessState {
    /// Creates the state for a guest of the host's pointer width.
    #[must_use]
    pub fn new(config: EmulationConfig, host: &dyn HostEngine) -> Self {
        let sentinels = HandleSentinels::new(
            host.pointer_width(),
            config.process.image_base,
            config.process.open_process_handle,
        );
        let threads = ThreadManager::new(
            config.threads.first_thread_id,
            config.limits.max_threads,
            config.limits.max_tls_slots,
        );
        let handles = HandleTable::with_reserved(config.limits.max_handles, sentinels.reserved_ids());

        Self {
            config,
            threads,
            handles,
            sentinels,
            exit_code: None,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &EmulationConfig {
        &self.config
    }

    /// Returns the thread manager.
    #[must_use]
    pub fn threads(&self) -> &ThreadManager {
        &self.threads
    }

    /// Returns the thread manager for modification.
    pub fn threads_mut(&mut self) -> &mut ThreadManager {
        &mut self.threads
    }

    /// Returns the handle table.
    #[must_use]
    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    /// Returns the sentinel handle values.
    #[must_use]
    pub fn sentinels(&self) -> &HandleSentinels {
        &self.sentinels
    }

    /// Returns the configured process id.
    #[must_use]
    pub fn process_id(&self) -> u32 {
        self.config.process.process_id
    }

    /// Returns the exit code recorded by `ExitProcess` or `TerminateProcess`.
    #[must_use]
    pub fn exit_code(&self) -> Option<u32> {
        self.exit_code
    }

    /// Creates a guest thread, a handle naming it and the host context that will run it.
    ///
    /// In order: the thread is registered (SUSPENDED if `flags` contains `CREATE_SUSPENDED`,
    /// READY otherwise), a handle is allocated, the thread id is written as a DWORD to
    /// `thread_id_out` unless it is 0, and the host is asked for an execution context that is
    /// runnable unless the thread is suspended. A stack size of 0 is replaced by the
    /// configured default.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NoCurrentThread`] before the process was started,
    /// [`crate::Error::ResourceExhausted`] when the thread or handle limit is reached, and
    /// propagates host failures. On any failure after the thread was registered it is
    /// terminated again, so it never counts as live and its handle never reports it running.
    pub fn create_thread(
        &mut self,
        host: &mut dyn HostEngine,
        mut start: ThreadStart,
        flags: CreationFlags,
        thread_id_out: u64,
    ) -> Result<(ThreadId, HandleId)> {
        let creator = self.threads.current_id()?;
        if start.stack_size == 0 {
            start.stack_size = self.config.threads.default_stack_size;
        }
        let suspended = flags.starts_suspended();

        let id = self.threads.create(start, suspended)?;
        match self.attach_thread(host, id, start, suspended, thread_id_out) {
            Ok((handle, context)) => {
                log::debug!("thread {creator} created thread {id}, handle {handle} on {context}");
                Ok((id, handle))
            }
            Err(err) => {
                log::debug!("thread {id} discarded: {err}");
                self.threads.terminate(id, 0)?;
                Err(err)
            }
        }
    }

    fn attach_thread(
        &mut self,
        host: &mut dyn HostEngine,
        id: ThreadId,
        start: ThreadStart,
        suspended: bool,
        thread_id_out: u64,
    ) -> Result<(HandleId, EngineContextId)> {
        let handle = self.handles.allocate(KernelObject::Thread(id))?;

        if thread_id_out != 0 {
            host.write_guest_memory(thread_id_out, &id.0.to_le_bytes())?;
        }

        let context = host.register_execution_context(ContextRequest {
            entry_point: start.entry_point,
            argument: start.argument,
            stack_size: start.stack_size,
            runnable: !suspended,
        })?;
        self.threads.bind_context(id, context)?;
        Ok((handle, context))
    }

    /// Stops the run and records `code` as the process exit code.
    pub fn exit_process(&mut self, host: &mut dyn HostEngine, code: u32) {
        log::info!("process exiting with code {code:#x}");
        self.exit_code = Some(code);
        host.halt_execution();
    }

    /// Stops the run if `handle` names this process.
    ///
    /// The null handle, the current-process pseudo-handle and the image base all name this
    /// process. Any other value is ignored. Returns `true` if the run was halted.
    pub fn terminate_process(&mut self, host: &mut dyn HostEngine, handle: u64, code: u32) -> bool {
        let value = self.sentinels.decode(handle);
        if value.is_own_process() {
            self.exit_process(host, code);
            true
        } else {
            log::warn!("TerminateProcess on foreign handle {handle:#x} ignored");
            false
        }
    }

    /// Returns the guest value of a pseudo-handle.
    #[must_use]
    pub fn pseudo_handle(&self, pseudo: PseudoHandle) -> u64 {
        self.sentinels.encode(pseudo)
    }

    /// Resolves a raw guest handle to the thread it names.
    ///
    /// Accepts the current-thread pseudo-handle and real thread handles. Returns `None` for
    /// every other value, including real handles that name a process.
    #[must_use]
    pub fn thread_for_handle(&self, handle: u64) -> Option<ThreadId> {
        match self.sentinels.decode(handle) {
            HandleValue::Pseudo(PseudoHandle::CurrentThread) => self.threads.current_id().ok(),
            value => match self.handles.resolve(value)?.referent {
                KernelObject::Thread(id) => Some(id),
                KernelObject::Process(_) => None,
            },
        }
    }

    /// Like [`thread_for_handle`](Self::thread_for_handle), but only for threads that have not
    /// terminated.
    #[must_use]
    pub fn live_thread_for_handle(&self, handle: u64) -> Option<ThreadId> {
        self.thread_for_handle(handle)
            .filter(|&id| self.threads.get(id).is_ok_and(|t| !t.is_terminated()))
    }

    /// Increments a thread's suspend count and parks its host context.
    ///
    /// Returns the previous suspend count, or `None` if the count is already at its maximum.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ThreadNotFound`] for an unknown id and
    /// [`crate::Error::InvalidStateTransition`] for a terminated thread.
    pub fn suspend_thread(&mut self, host: &mut dyn HostEngine, id: ThreadId) -> Result<Option<u32>> {
        let thread = self.threads.get_mut(id)?;
        let previous = thread.suspend()?;
        if previous.is_some() {
            if let Some(context) = thread.context() {
                host.set_context_runnable(context, false)?;
            }
        }
        Ok(previous)
    }

    /// Decrements a thread's suspend count.
    ///
    /// When the count reaches 0 the thread becomes READY and its host context runnable.
    /// Returns the previous suspend count.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ThreadNotFound`] for an unknown id and propagates host failures.
    pub fn resume_thread(&mut self, host: &mut dyn HostEngine, id: ThreadId) -> Result<u32> {
        let thread = self.threads.get_mut(id)?;
        let previous = thread.resume();
        if previous == 1 && !thread.is_terminated() {
            if let Some(context) = thread.context() {
                host.set_context_runnable(context, true)?;
            }
        }
        Ok(previous)
    }

    /// Terminates the current thread with `code` and retires its host context.
    ///
    /// The thread record is retained in the TERMINATED state and stays current until the host
    /// switches to another context. When no live thread remains the process exits with `code`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NoCurrentThread`] before any thread context was established and
    /// [`crate::Error::InvalidStateTransition`] if the thread already terminated.
    pub fn exit_thread(&mut self, host: &mut dyn HostEngine, code: u32) -> Result<ThreadId> {
        let id = self.threads.current_id()?;
        self.threads.terminate(id, code)?;
        log::debug!("thread {id} exited with code {code:#x}");

        if let Some(context) = self.threads.get(id)?.context() {
            host.exit_execution_context(context)?;
        }
        if self.threads.live_count() == 0 {
            self.exit_process(host, code);
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        emulation::{PointerWidth, RecordingHost, ThreadState},
        Error,
    };

    fn setup() -> (ProcessState, RecordingHost) {
        setup_with(EmulationConfig::default())
    }

    fn setup_with(config: EmulationConfig) -> (ProcessState, RecordingHost) {
        let mut host = RecordingHost::new(PointerWidth::Bits32);
        host.map(0x1000, 0x1000);
        let mut state = ProcessState::new(config, &host);
        let main = state
            .threads_mut()
            .create(
                ThreadStart {
                    entry_point: 0x40_1000,
                    argument: 0,
                    stack_size: 0x10_0000,
                },
                false,
            )
            .unwrap();
        state
            .threads_mut()
            .bind_context(main, host.primary_context())
            .unwrap();
        state.threads_mut().switch_to(main).unwrap();
        (state, host)
    }

    fn start(entry_point: u64, stack_size: u64) -> ThreadStart {
        ThreadStart {
            entry_point,
            argument: 0x55,
            stack_size,
        }
    }

    #[test]
    fn test_create_thread_ready() {
        let (mut state, mut host) = setup();
        let (id, handle) = state
            .create_thread(&mut host, start(0x40_2000, 0x2000), CreationFlags::empty(), 0x1000)
            .unwrap();

        assert_eq!(id, ThreadId(2));
        assert_eq!(handle, HandleId(1));
        assert_eq!(host.read_guest_memory(0x1000, 4).unwrap(), 2_u32.to_le_bytes());

        let thread = state.threads().get(id).unwrap();
        assert_eq!(thread.state(), ThreadState::Ready);
        let context = host.context(thread.context().unwrap()).unwrap();
        assert!(context.runnable);
        assert_eq!(context.request.entry_point, 0x40_2000);
        assert_eq!(context.request.argument, 0x55);
        assert_eq!(context.request.stack_size, 0x2000);
    }

    #[test]
    fn test_create_thread_suspended_default_stack() {
        let (mut state, mut host) = setup();
        let (id, _) = state
            .create_thread(&mut host, start(0x40_2000, 0), CreationFlags::CREATE_SUSPENDED, 0)
            .unwrap();

        let thread = state.threads().get(id).unwrap();
        assert_eq!(thread.state(), ThreadState::Suspended);
        assert_eq!(thread.stack_size(), 1024 * 1024);
        assert!(!host.context(thread.context().unwrap()).unwrap().runnable);
    }

    #[test]
    fn test_create_thread_handle_exhaustion_terminates_thread() {
        let config = EmulationConfig::default()
            .with_limits(crate::emulation::EmulationLimits::new().with_max_handles(0));
        let (mut state, mut host) = setup_with(config);

        let result = state.create_thread(&mut host, start(1, 0), CreationFlags::empty(), 0);
        assert!(matches!(result, Err(Error::ResourceExhausted(_))));
        assert_eq!(state.threads().live_count(), 1);
        assert_eq!(state.threads().get(ThreadId(2)).unwrap().state(), ThreadState::Terminated);
        assert!(host.contexts().is_empty());
    }

    #[test]
    fn test_create_thread_bad_out_pointer() {
        let (mut state, mut host) = setup();
        let result = state.create_thread(&mut host, start(1, 0), CreationFlags::empty(), 0x9000);
        assert!(matches!(result, Err(Error::InvalidAddress { .. })));

        let orphan = state.threads().get(ThreadId(2)).unwrap();
        assert_eq!(orphan.state(), ThreadState::Terminated);
        assert_eq!(orphan.context(), None);
        assert_eq!(state.threads().live_count(), 1);
        assert!(host.contexts().is_empty());
        assert_eq!(state.live_thread_for_handle(1), None);
    }

    #[test]
    fn test_create_thread_requires_started_process() {
        let mut host = RecordingHost::new(PointerWidth::Bits32);
        let mut state = ProcessState::new(EmulationConfig::default(), &host);

        let result = state.create_thread(&mut host, start(1, 0), CreationFlags::empty(), 0);
        assert!(matches!(result, Err(Error::NoCurrentThread)));
        assert!(state.threads().is_empty());
        assert!(state.handles().is_empty());
    }

    #[test]
    fn test_thread_limit_ignores_exited_threads() {
        let config = EmulationConfig::default()
            .with_limits(crate::emulation::EmulationLimits::new().with_max_threads(2));
        let (mut state, mut host) = setup_with(config);

        for round in 0..10_u32 {
            let (id, _) = state
                .create_thread(&mut host, start(1, 0), CreationFlags::empty(), 0)
                .unwrap();
            state.threads_mut().switch_to(id).unwrap();
            state.exit_thread(&mut host, round).unwrap();
            state.threads_mut().switch_to(ThreadId(1)).unwrap();
        }
        assert_eq!(state.threads().len(), 11);
        assert_eq!(state.threads().live_count(), 1);
        assert!(!host.is_halted());
    }

    #[test]
    fn test_terminate_process() {
        let (mut state, mut host) = setup();
        assert!(!state.terminate_process(&mut host, 0x1234, 1));
        assert!(!host.is_halted());

        let own = state.pseudo_handle(PseudoHandle::CurrentProcess);
        assert!(state.terminate_process(&mut host, own, 3));
        assert!(host.is_halted());
        assert_eq!(state.exit_code(), Some(3));
    }

    #[test]
    fn test_terminate_by_null_and_image_base() {
        for handle in [0, 0x40_0000] {
            let (mut state, mut host) = setup();
            assert!(state.terminate_process(&mut host, handle, 0));
            assert!(host.is_halted());
        }
    }

    #[test]
    fn test_thread_for_handle() {
        let (mut state, mut host) = setup();
        let (id, handle) = state
            .create_thread(&mut host, start(1, 0), CreationFlags::empty(), 0)
            .unwrap();

        assert_eq!(state.thread_for_handle(u64::from(handle.0)), Some(id));
        assert_eq!(
            state.thread_for_handle(state.pseudo_handle(PseudoHandle::CurrentThread)),
            Some(ThreadId(1))
        );
        assert_eq!(state.thread_for_handle(0), None);
        assert_eq!(state.thread_for_handle(0x77), None);
        assert_eq!(
            state.thread_for_handle(state.pseudo_handle(PseudoHandle::CurrentProcess)),
            None
        );
    }

    #[test]
    fn test_suspend_resume_drive_host() {
        let (mut state, mut host) = setup();
        let (id, _) = state
            .create_thread(&mut host, start(1, 0), CreationFlags::CREATE_SUSPENDED, 0)
            .unwrap();
        let context = state.threads().get(id).unwrap().context().unwrap();

        assert_eq!(state.suspend_thread(&mut host, id).unwrap(), Some(1));
        assert_eq!(state.resume_thread(&mut host, id).unwrap(), 2);
        assert!(!host.context(context).unwrap().runnable);

        assert_eq!(state.resume_thread(&mut host, id).unwrap(), 1);
        assert!(host.context(context).unwrap().runnable);
        assert_eq!(state.threads().get(id).unwrap().state(), ThreadState::Ready);

        assert_eq!(state.resume_thread(&mut host, id).unwrap(), 0);
    }

    #[test]
    fn test_exit_thread_retains_record() {
        let (mut state, mut host) = setup();
        let (id, _) = state
            .create_thread(&mut host, start(1, 0), CreationFlags::empty(), 0)
            .unwrap();
        state.threads_mut().switch_to(id).unwrap();

        assert_eq!(state.exit_thread(&mut host, 9).unwrap(), id);
        let thread = state.threads().get(id).unwrap();
        assert_eq!(thread.state(), ThreadState::Terminated);
        assert_eq!(thread.exit_code(), Some(9));
        assert!(host.context(thread.context().unwrap()).unwrap().exited);
        assert!(matches!(
            state.exit_thread(&mut host, 0),
            Err(Error::InvalidStateTransition { .. })
        ));
        assert!(!host.is_halted());
    }

    #[test]
    fn test_exit_last_thread_ends_process() {
        let (mut state, mut host) = setup();
        assert_eq!(state.exit_thread(&mut host, 4).unwrap(), ThreadId(1));
        assert!(host.is_halted());
        assert_eq!(state.exit_code(), Some(4));
    }
}
