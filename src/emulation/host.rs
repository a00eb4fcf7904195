//! Boundary to the surrounding emulator.
//!
//! The bookkeeping subsystem never executes guest instructions or touches guest memory on
//! its own. Everything that needs the CPU/memory emulator or its scheduler goes through the
//! [`HostEngine`] trait defined here:
//!
//! | Operation | Purpose |
//! |-----------|---------|
//! | [`halt_execution`](HostEngine::halt_execution) | Stop the whole emulation run |
//! | [`register_execution_context`](HostEngine::register_execution_context) | Create a schedulable unit for a new guest thread |
//! | [`set_context_runnable`](HostEngine::set_context_runnable) | Park or release a context on suspend/resume |
//! | [`exit_execution_context`](HostEngine::exit_execution_context) | Retire a context whose thread exited |
//! | [`write_guest_memory`](HostEngine::write_guest_memory) / [`read_guest_memory`](HostEngine::read_guest_memory) | Raw guest memory access |
//! | [`pointer_width`](HostEngine::pointer_width) | Guest pointer size for marshalling |
//!
//! [`RecordingHost`] is a self-contained implementation backed by plain byte buffers. It
//! records every directive it receives, which makes it suitable both for tests and for
//! driving the subsystem from tooling that has no real CPU emulator attached.

use std::{collections::BTreeMap, fmt};

use crate::{Error, Result};

/// Width of guest pointers and handle-sized values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PointerWidth {
    /// 32-bit guest (4-byte pointers).
    Bits32,
    /// 64-bit guest (8-byte pointers).
    Bits64,
}

impl PointerWidth {
    /// Returns the pointer size in bytes.
    #[must_use]
    pub fn bytes(self) -> usize {
        match self {
            PointerWidth::Bits32 => 4,
            PointerWidth::Bits64 => 8,
        }
    }

    /// Returns the mask that truncates a value to this width.
    #[must_use]
    pub fn mask(self) -> u64 {
        match self {
            PointerWidth::Bits32 => u64::from(u32::MAX),
            PointerWidth::Bits64 => u64::MAX,
        }
    }

    /// Truncates `value` to this width.
    #[must_use]
    pub fn truncate(self, value: u64) -> u64 {
        value & self.mask()
    }
}

/// Identifier the host engine assigns to an execution context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EngineContextId(pub u64);

impl fmt::Display for EngineContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// Request to create a new execution context for a guest thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContextRequest {
    /// Guest address where execution begins.
    pub entry_point: u64,
    /// Opaque machine word handed to the entry point.
    pub argument: u64,
    /// Requested stack size in bytes. Advisory; the host decides the real allocation.
    pub stack_size: u64,
    /// Whether the context may be scheduled immediately.
    pub runnable: bool,
}

/// Operations the bookkeeping subsystem consumes from the host emulator.
///
/// Implementations are called only from dispatch points, one at a time, so they need no
/// internal synchronization on behalf of this crate.
pub trait HostEngine {
    /// Stops the overall emulation loop.
    fn halt_execution(&mut self);

    /// Creates a new schedulable unit of execution.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot create another context.
    fn register_execution_context(&mut self, request: ContextRequest) -> Result<EngineContextId>;

    /// Marks a context as schedulable (`true`) or parked (`false`).
    ///
    /// # Errors
    ///
    /// Returns an error if the host does not know `context`.
    fn set_context_runnable(&mut self, context: EngineContextId, runnable: bool) -> Result<()>;

    /// Retires a context whose guest thread has exited.
    ///
    /// # Errors
    ///
    /// Returns an error if the host does not know `context`.
    fn exit_execution_context(&mut self, context: EngineContextId) -> Result<()>;

    /// Writes raw bytes into guest memory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if the range is not mapped.
    fn write_guest_memory(&mut self, address: u64, bytes: &[u8]) -> Result<()>;

    /// Reads raw bytes from guest memory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if the range is not mapped.
    fn read_guest_memory(&self, address: u64, length: usize) -> Result<Vec<u8>>;

    /// Returns the guest pointer width.
    fn pointer_width(&self) -> PointerWidth;
}

/// A context as seen by [`RecordingHost`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedContext {
    /// Id handed back to the caller.
    pub id: EngineContextId,
    /// The registration request as received.
    pub request: ContextRequest,
    /// Current schedulability.
    pub runnable: bool,
    /// Whether the context has been retired.
    pub exited: bool,
}

/// In-memory [`HostEngine`] that records every directive it receives.
///
/// Guest memory is modelled as a set of non-overlapping mapped regions; accesses must fall
/// entirely inside one region.
///
/// # Examples
///
/// ```rust
/// use procthreads::emulation::{HostEngine, PointerWidth, RecordingHost};
///
/// let mut host = RecordingHost::new(PointerWidth::Bits32);
/// host.map(0x1000, 0x100);
/// host.write_guest_memory(0x1010, &[1, 2, 3])?;
/// assert_eq!(host.read_guest_memory(0x1010, 3)?, vec![1, 2, 3]);
/// # Ok::<(), procthreads::Error>(())
/// ```
#[derive(Debug)]
pub struct RecordingHost {
    width: PointerWidth,
    regions: BTreeMap<u64, Vec<u8>>,
    contexts: Vec<RecordedContext>,
    halted: bool,
    next_context: u64,
}

impl RecordingHost {
    /// Creates a host with no mapped memory and a single primary context (id 0).
    #[must_use]
    pub fn new(width: PointerWidth) -> Self {
        Self {
            width,
            regions: BTreeMap::new(),
            contexts: Vec::new(),
            halted: false,
            next_context: 1,
        }
    }

    /// The id of the context that was running before any guest thread was created.
    #[must_use]
    pub fn primary_context(&self) -> EngineContextId {
        EngineContextId(0)
    }

    /// Maps a zero-filled region of `size` bytes at `base`.
    ///
    /// Mapping over an existing region replaces it.
    pub fn map(&mut self, base: u64, size: usize) {
        self.regions.insert(base, vec![0; size]);
    }

    /// Returns `true` once [`HostEngine::halt_execution`] has been called.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Returns all contexts registered so far, in registration order.
    #[must_use]
    pub fn contexts(&self) -> &[RecordedContext] {
        &self.contexts
    }

    /// Returns a registered context by id.
    #[must_use]
    pub fn context(&self, id: EngineContextId) -> Option<&RecordedContext> {
        self.contexts.iter().find(|c| c.id == id)
    }

    fn context_mut(&mut self, id: EngineContextId) -> Result<&mut RecordedContext> {
        self.contexts
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::Host(format!("unknown execution context {id}")))
    }

    fn region_for(&self, address: u64, len: usize) -> Result<(u64, usize)> {
        let invalid = || Error::InvalidAddress { address, len };
        let (&base, data) = self.regions.range(..=address).next_back().ok_or_else(invalid)?;

        let offset = usize::try_from(address - base).map_err(|_| invalid())?;
        match offset.checked_add(len) {
            Some(end) if end <= data.len() => Ok((base, offset)),
            _ => Err(invalid()),
        }
    }
}

impl HostEngine for RecordingHost {
    fn halt_execution(&mut self) {
        self.halted = true;
    }

    fn register_execution_context(&mut self, request: ContextRequest) -> Result<EngineContextId> {
        let id = EngineContextId(self.next_context);
        self.next_context = self
            .next_context
            .checked_add(1)
            .ok_or(Error::ResourceExhausted("execution contexts"))?;

        self.contexts.push(RecordedContext {
            id,
            request,
            runnable: request.runnable,
            exited: false,
        });
        Ok(id)
    }

    fn set_context_runnable(&mut self, context: EngineContextId, runnable: bool) -> Result<()> {
        if context == self.primary_context() {
            return Ok(());
        }
        self.context_mut(context)?.runnable = runnable;
        Ok(())
    }

    fn exit_execution_context(&mut self, context: EngineContextId) -> Result<()> {
        if context == self.primary_context() {
            return Ok(());
        }
        let ctx = self.context_mut(context)?;
        ctx.runnable = false;
        ctx.exited = true;
        Ok(())
    }

    fn write_guest_memory(&mut self, address: u64, bytes: &[u8]) -> Result<()> {
        let (base, offset) = self.region_for(address, bytes.len())?;
        let data = self
            .regions
            .get_mut(&base)
            .ok_or(Error::InvalidAddress {
                address,
                len: bytes.len(),
            })?;
        data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn read_guest_memory(&self, address: u64, length: usize) -> Result<Vec<u8>> {
        let (base, offset) = self.region_for(address, length)?;
        let data = self.regions.get(&base).ok_or(Error::InvalidAddress {
            address,
            len: length,
        })?;
        Ok(data[offset..offset + length].to_vec())
    }

    fn pointer_width(&self) -> PointerWidth {
        self.width
    }
}
