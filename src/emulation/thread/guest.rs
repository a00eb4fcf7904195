//! Guest thread record and lifecycle state machine.

use std::fmt;

use strum::Display;

use crate::{
    emulation::{thread::tls::TlsSlotTable, EngineContextId, Win32Error},
    Error, Result,
};

/// Highest suspend count a thread may reach (`MAXIMUM_SUSPEND_COUNT`).
pub const MAX_SUSPEND_COUNT: u32 = 0x7F;

/// Unique, never reused guest thread identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u32);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Lifecycle state of a guest thread.
///
/// ```text
///            ┌────────────┐
///   create ─►│   READY    │◄──── resume (count → 0)
///            └──┬──────▲──┘             │
///     scheduled │      │ preempted  ┌───┴───────┐
///            ┌──▼──────┴──┐ suspend │ SUSPENDED │
///            │  RUNNING   ├────────►│           │
///            └─────┬──────┘         └─────┬─────┘
///                  │ exit                 │ exit
///                  ▼                      ▼
///            ┌──────────────────────────────────┐
///            │            TERMINATED            │
///            └──────────────────────────────────┘
/// ```
///
/// READY may also move straight to SUSPENDED. TERMINATED is final and observable; a
/// terminated thread is never removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreadState {
    /// Created and eligible for scheduling, not currently running.
    Ready,
    /// The thread the emulator is executing.
    Running,
    /// Parked until its suspend count drops to zero.
    Suspended,
    /// Exited; never scheduled again.
    Terminated,
}

impl ThreadState {
    /// Returns `true` if the state machine allows moving from `self` to `to`.
    ///
    /// Staying in the same non-terminal state is allowed.
    #[must_use]
    pub fn can_transition(self, to: ThreadState) -> bool {
        use ThreadState::{Ready, Running, Suspended, Terminated};

        match (self, to) {
            (Terminated, _) => false,
            (_, Terminated) => true,
            (from, to) if from == to => true,
            (Ready, Running | Suspended) | (Running, Ready | Suspended) | (Suspended, Ready) => {
                true
            }
            _ => false,
        }
    }
}

/// Parameters of a new guest thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThreadStart {
    /// Guest address where execution begins.
    pub entry_point: u64,
    /// Opaque machine word passed to the entry point.
    pub argument: u64,
    /// Requested stack size in bytes.
    pub stack_size: u64,
}

/// A guest-visible unit of execution.
///
/// Threads are created and owned exclusively by the
/// [`ThreadManager`](crate::emulation::ThreadManager). Besides its identity and start
/// parameters a thread carries its own TLS slots and its own last-error value, so guest
/// threads never observe each other's error state.
#[derive(Clone, Debug)]
pub struct EmulationThread {
    id: ThreadId,
    state: ThreadState,
    start: ThreadStart,
    tls: TlsSlotTable,
    last_error: u32,
    suspend_count: u32,
    exit_code: Option<u32>,
    context: Option<EngineContextId>,
}

impl EmulationThread {
    pub(crate) fn new(id: ThreadId, start: ThreadStart, suspended: bool) -> Self {
        Self {
            id,
            state: if suspended {
                ThreadState::Suspended
            } else {
                ThreadState::Ready
            },
            start,
            tls: TlsSlotTable::new(),
            last_error: Win32Error::Success.code(),
            suspend_count: u32::from(suspended),
            exit_code: None,
            context: None,
        }
    }

    /// Returns the thread id.
    #[must_use]
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ThreadState {
        self.state
    }

    /// Returns `true` once the thread has exited.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.state == ThreadState::Terminated
    }

    /// Returns the guest entry point.
    #[must_use]
    pub fn entry_point(&self) -> u64 {
        self.start.entry_point
    }

    /// Returns the argument passed to the entry point.
    #[must_use]
    pub fn argument(&self) -> u64 {
        self.start.argument
    }

    /// Returns the requested stack size.
    #[must_use]
    pub fn stack_size(&self) -> u64 {
        self.start.stack_size
    }

    /// Returns the host execution context driving this thread, once registered.
    #[must_use]
    pub fn context(&self) -> Option<EngineContextId> {
        self.context
    }

    pub(crate) fn bind_context(&mut self, context: EngineContextId) {
        self.context = Some(context);
    }

    /// Returns the thread's TLS slots.
    #[must_use]
    pub fn tls(&self) -> &TlsSlotTable {
        &self.tls
    }

    /// Returns the thread's TLS slots for modification.
    pub fn tls_mut(&mut self) -> &mut TlsSlotTable {
        &mut self.tls
    }

    /// Returns the thread's last-error value.
    #[must_use]
    pub fn last_error(&self) -> u32 {
        self.last_error
    }

    /// Sets the thread's last-error value.
    pub fn set_last_error(&mut self, code: impl Into<u32>) {
        self.last_error = code.into();
    }

    /// Returns the suspend count.
    #[must_use]
    pub fn suspend_count(&self) -> u32 {
        self.suspend_count
    }

    /// Returns the exit code once the thread has terminated.
    #[must_use]
    pub fn exit_code(&self) -> Option<u32> {
        self.exit_code
    }

    /// Moves the thread to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStateTransition`] if the state machine forbids the move.
    pub(crate) fn transition(&mut self, to: ThreadState) -> Result<()> {
        if !self.state.can_transition(to) {
            return Err(Error::InvalidStateTransition {
                thread: self.id,
                from: self.state,
                to,
            });
        }

        if self.state != to {
            log::trace!("thread {} {} -> {}", self.id, self.state, to);
        }
        self.state = to;
        Ok(())
    }

    /// Increments the suspend count and parks the thread.
    ///
    /// Returns the previous count, or `None` if the count is already at
    /// [`MAX_SUSPEND_COUNT`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStateTransition`] if the thread has terminated.
    pub fn suspend(&mut self) -> Result<Option<u32>> {
        if self.suspend_count >= MAX_SUSPEND_COUNT {
            return Ok(None);
        }

        self.transition(ThreadState::Suspended)?;
        let previous = self.suspend_count;
        self.suspend_count += 1;
        Ok(Some(previous))
    }

    /// Decrements the suspend count, making a SUSPENDED thread READY when it reaches zero.
    ///
    /// Returns the previous count.
    pub fn resume(&mut self) -> u32 {
        let previous = self.suspend_count;
        if previous == 0 {
            return 0;
        }

        self.suspend_count -= 1;
        if self.suspend_count == 0 && self.state == ThreadState::Suspended {
            log::trace!("thread {} {} -> {}", self.id, self.state, ThreadState::Ready);
            self.state = ThreadState::Ready;
        }
        previous
    }

    /// Marks the thread TERMINATED with `exit_code`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStateTransition`] if the thread already terminated.
    pub(crate) fn terminate(&mut self, exit_code: u32) -> Result<()> {
        self.transition(ThreadState::Terminated)?;
        self.exit_code = Some(exit_code);
        Ok(())
    }
}
