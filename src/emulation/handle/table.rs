//! The process-wide handle table.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    emulation::handle::value::{HandleId, HandleValue, KernelObject},
    Error, Result,
};

/// A handle table entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Handle {
    /// The guest-visible id.
    pub id: HandleId,
    /// The object the handle names.
    pub referent: KernelObject,
}

/// Registry mapping small non-zero integers to kernel-like objects.
///
/// Ids start at 1 and increase strictly with every allocation; an id is never handed out
/// twice. Values reserved for pseudo-handles are skipped so a real handle can never be
/// confused with a sentinel. The table stores and looks up only; it has no knowledge of the
/// objects behind the entries.
///
/// # Examples
///
/// ```rust
/// use procthreads::emulation::{HandleTable, KernelObject, ThreadId};
///
/// let mut table = HandleTable::new(1024);
/// let id = table.allocate(KernelObject::Thread(ThreadId(1)))?;
/// assert_eq!(table.lookup(id)?.referent, KernelObject::Thread(ThreadId(1)));
/// # Ok::<(), procthreads::Error>(())
/// ```
#[derive(Debug)]
pub struct HandleTable {
    handles: BTreeMap<HandleId, Handle>,
    reserved: BTreeSet<u32>,
    next_id: u32,
    max_handles: usize,
}

impl HandleTable {
    /// Creates an empty table that holds at most `max_handles` entries.
    #[must_use]
    pub fn new(max_handles: usize) -> Self {
        Self::with_reserved(max_handles, [])
    }

    /// Creates an empty table that never allocates any of the `reserved` ids.
    #[must_use]
    pub fn with_reserved(max_handles: usize, reserved: impl IntoIterator<Item = u32>) -> Self {
        Self {
            handles: BTreeMap::new(),
            reserved: reserved.into_iter().collect(),
            next_id: 1,
            max_handles,
        }
    }

    /// Allocates the next unused id for `referent`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceExhausted`] when the configured limit is reached or the id
    /// space is used up.
    pub fn allocate(&mut self, referent: KernelObject) -> Result<HandleId> {
        if self.handles.len() >= self.max_handles {
            return Err(Error::ResourceExhausted("handle table limit"));
        }

        // 0 marks a wrapped counter.
        if self.next_id == 0 {
            return Err(Error::ResourceExhausted("handle id space"));
        }

        let mut candidate = self.next_id;
        while self.reserved.contains(&candidate) {
            candidate = candidate
                .checked_add(1)
                .ok_or(Error::ResourceExhausted("handle id space"))?;
        }

        self.next_id = candidate.checked_add(1).unwrap_or(0);

        let id = HandleId(candidate);
        self.handles.insert(id, Handle { id, referent });
        log::debug!("allocated handle {id} -> {referent:?}");
        Ok(id)
    }

    /// Looks up a handle by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandleNotFound`] if `id` was never allocated.
    pub fn lookup(&self, id: HandleId) -> Result<&Handle> {
        self.handles.get(&id).ok_or(Error::HandleNotFound(id))
    }

    /// Resolves a decoded guest value to its table entry, if it names one.
    ///
    /// Null, pseudo and out-of-range values resolve to `None`, as do real-looking ids that
    /// were never allocated; interpreting those is up to the caller.
    #[must_use]
    pub fn resolve(&self, value: HandleValue) -> Option<&Handle> {
        match value {
            HandleValue::Real(id) => self.handles.get(&id),
            HandleValue::Null | HandleValue::Pseudo(_) | HandleValue::Invalid(_) => None,
        }
    }

    /// Returns the number of allocated handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns `true` if no handle has been allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Iterates over all handles in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Handle> {
        self.handles.values()
    }
}
