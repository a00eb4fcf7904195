//! Owner of all guest threads and of the "current thread" pointer.

use std::collections::BTreeMap;

use crate::{
    emulation::{
        thread::guest::{EmulationThread, ThreadId, ThreadStart, ThreadState},
        EngineContextId, Win32Error,
    },
    Error, Result,
};

/// `TlsAlloc` failure value.
pub const TLS_OUT_OF_INDEXES: u32 = 0xFFFF_FFFF;

/// Registry of every thread the guest process has ever had.
///
/// The manager assigns thread ids (strictly increasing, never reused), tracks which thread is
/// current in the emulator's active context, and scopes the TLS operations and last-error to
/// that thread. Terminated threads are retained so that stale handles to them stay
/// well-defined.
///
/// # Current Thread
///
/// Until [`switch_to`](Self::switch_to) has been called at least once there is no current
/// thread and every thread-scoped operation fails with [`Error::NoCurrentThread`]. That is an
/// embedding bug, not a guest condition.
///
/// # Examples
///
/// ```rust
/// use procthreads::emulation::{ThreadManager, ThreadStart, ThreadState};
///
/// let mut threads = ThreadManager::new(1, 64, 1088);
/// let main = threads.create(
///     ThreadStart { entry_point: 0x401000, argument: 0, stack_size: 0x100000 },
///     false,
/// )?;
/// threads.switch_to(main)?;
/// assert_eq!(threads.current_thread()?.state(), ThreadState::Running);
///
/// let slot = threads.tls_alloc()?;
/// assert!(threads.tls_set(slot, 42)?);
/// assert_eq!(threads.tls_get(slot)?, 42);
/// # Ok::<(), procthreads::Error>(())
/// ```
#[derive(Debug)]
pub struct ThreadManager {
    threads: BTreeMap<ThreadId, EmulationThread>,
    current: Option<ThreadId>,
    next_id: Option<u32>,
    live: usize,
    max_threads: usize,
    max_tls_slots: u32,
}

impl ThreadManager {
    /// Creates an empty manager.
    ///
    /// # Arguments
    ///
    /// * `first_id` - Id given to the first thread
    /// * `max_threads` - Maximum number of threads alive at the same time
    /// * `max_tls_slots` - Maximum TLS indices each thread may allocate
    #[must_use]
    pub fn new(first_id: u32, max_threads: usize, max_tls_slots: u32) -> Self {
        Self {
            threads: BTreeMap::new(),
            current: None,
            next_id: Some(first_id),
            live: 0,
            max_threads,
            max_tls_slots,
        }
    }

    /// Creates and registers a new thread.
    ///
    /// The thread starts SUSPENDED (suspend count 1) if `suspended` is set, READY otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceExhausted`] when the live thread limit is reached or the id
    /// space is used up.
    pub fn create(&mut self, start: ThreadStart, suspended: bool) -> Result<ThreadId> {
        if self.live >= self.max_threads {
            return Err(Error::ResourceExhausted("thread limit"));
        }
        let raw = self
            .next_id
            .ok_or(Error::ResourceExhausted("thread id space"))?;
        self.next_id = raw.checked_add(1);

        let id = ThreadId(raw);
        let thread = EmulationThread::new(id, start, suspended);
        log::debug!(
            "created thread {id} entry={:#x} arg={:#x} state={}",
            start.entry_point,
            start.argument,
            thread.state()
        );
        self.threads.insert(id, thread);
        self.live += 1;
        Ok(id)
    }

    /// Marks a thread TERMINATED with `exit_code`.
    ///
    /// The record is kept, but it no longer counts against the thread limit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ThreadNotFound`] for an unknown id and
    /// [`Error::InvalidStateTransition`] if the thread already terminated.
    pub fn terminate(&mut self, id: ThreadId, exit_code: u32) -> Result<()> {
        self.get_mut(id)?.terminate(exit_code)?;
        self.live -= 1;
        Ok(())
    }

    /// Associates a thread with the host execution context that drives it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ThreadNotFound`] for an unknown id, or [`Error::Invariant`] if the
    /// context already belongs to another thread.
    pub fn bind_context(&mut self, id: ThreadId, context: EngineContextId) -> Result<()> {
        if let Some(owner) = self.thread_for_context(context) {
            if owner != id {
                return Err(invariant_error!(
                    "context {} already drives thread {}",
                    context,
                    owner
                ));
            }
        }
        self.get_mut(id)?.bind_context(context);
        Ok(())
    }

    /// Returns a thread by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ThreadNotFound`] if the id was never assigned.
    pub fn get(&self, id: ThreadId) -> Result<&EmulationThread> {
        self.threads.get(&id).ok_or(Error::ThreadNotFound(id))
    }

    /// Returns a thread by id for modification.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ThreadNotFound`] if the id was never assigned.
    pub fn get_mut(&mut self, id: ThreadId) -> Result<&mut EmulationThread> {
        self.threads.get_mut(&id).ok_or(Error::ThreadNotFound(id))
    }

    /// Returns the id of the current thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCurrentThread`] before any thread context was established.
    pub fn current_id(&self) -> Result<ThreadId> {
        self.current.ok_or(Error::NoCurrentThread)
    }

    /// Returns the current thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCurrentThread`] before any thread context was established.
    pub fn current_thread(&self) -> Result<&EmulationThread> {
        let id = self.current_id()?;
        self.threads
            .get(&id)
            .ok_or_else(|| invariant_error!("current thread {} is not registered", id))
    }

    /// Returns the current thread for modification.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCurrentThread`] before any thread context was established.
    pub fn current_thread_mut(&mut self) -> Result<&mut EmulationThread> {
        let id = self.current_id()?;
        self.threads
            .get_mut(&id)
            .ok_or_else(|| invariant_error!("current thread {} is not registered", id))
    }

    /// Makes `id` the current thread.
    ///
    /// Called by the host at context-switch points. A previously RUNNING thread becomes READY
    /// and the target becomes RUNNING.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ThreadNotFound`] for an unknown id and
    /// [`Error::InvalidStateTransition`] if the target is SUSPENDED or TERMINATED.
    pub fn switch_to(&mut self, id: ThreadId) -> Result<()> {
        let target_state = self.get(id)?.state();
        if !target_state.can_transition(ThreadState::Running) {
            return Err(Error::InvalidStateTransition {
                thread: id,
                from: target_state,
                to: ThreadState::Running,
            });
        }

        if let Some(previous) = self.current.filter(|&p| p != id) {
            let thread = self.get_mut(previous)?;
            if thread.state() == ThreadState::Running {
                thread.transition(ThreadState::Ready)?;
            }
            log::debug!("switching thread {previous} -> {id}");
        }

        self.get_mut(id)?.transition(ThreadState::Running)?;
        self.current = Some(id);
        Ok(())
    }

    /// Returns the thread driven by a host execution context.
    #[must_use]
    pub fn thread_for_context(&self, context: EngineContextId) -> Option<ThreadId> {
        self.threads
            .values()
            .find(|t| t.context() == Some(context))
            .map(EmulationThread::id)
    }

    /// Allocates a TLS index on the current thread.
    ///
    /// Returns [`TLS_OUT_OF_INDEXES`] and sets last-error to `ERROR_NO_MORE_ITEMS` once the
    /// per-thread limit is reached.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCurrentThread`] before any thread context was established.
    pub fn tls_alloc(&mut self) -> Result<u32> {
        let limit = self.max_tls_slots;
        let thread = self.current_thread_mut()?;
        match thread.tls_mut().alloc(limit) {
            Some(index) => Ok(index),
            None => {
                thread.set_last_error(Win32Error::NoMoreItems);
                Ok(TLS_OUT_OF_INDEXES)
            }
        }
    }

    /// Frees a TLS index on the current thread.
    ///
    /// Returns `false` and sets last-error to `ERROR_INVALID_PARAMETER` if `index` is not
    /// allocated. The allocator is never rolled back.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCurrentThread`] before any thread context was established.
    pub fn tls_free(&mut self, index: u32) -> Result<bool> {
        let thread = self.current_thread_mut()?;
        if thread.tls_mut().free(index) {
            Ok(true)
        } else {
            thread.set_last_error(Win32Error::InvalidParameter);
            Ok(false)
        }
    }

    /// Reads a TLS slot on the current thread.
    ///
    /// On success last-error is cleared to `ERROR_SUCCESS`, matching `TlsGetValue`. For an
    /// unallocated index 0 is returned and last-error is `ERROR_INVALID_PARAMETER`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCurrentThread`] before any thread context was established.
    pub fn tls_get(&mut self, index: u32) -> Result<u64> {
        let thread = self.current_thread_mut()?;
        match thread.tls().get(index) {
            Some(value) => {
                thread.set_last_error(Win32Error::Success);
                Ok(value)
            }
            None => {
                thread.set_last_error(Win32Error::InvalidParameter);
                Ok(0)
            }
        }
    }

    /// Writes a TLS slot on the current thread.
    ///
    /// Returns `false` and sets last-error to `ERROR_INVALID_PARAMETER` if `index` is not
    /// allocated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCurrentThread`] before any thread context was established.
    pub fn tls_set(&mut self, index: u32, value: u64) -> Result<bool> {
        let thread = self.current_thread_mut()?;
        if thread.tls_mut().set(index, value) {
            Ok(true)
        } else {
            thread.set_last_error(Win32Error::InvalidParameter);
            Ok(false)
        }
    }

    /// Returns the number of threads ever created.
    #[must_use]
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    /// Returns `true` if no thread was created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Returns the number of threads that have not terminated.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Iterates over all threads in id order, including terminated ones.
    pub fn iter(&self) -> impl Iterator<Item = &EmulationThread> {
        self.threads.values()
    }
}
