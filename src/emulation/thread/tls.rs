//! Per-thread TLS slot table.

use std::collections::BTreeMap;

/// Mapping from TLS slot index to a machine word, with its own index allocator.
///
/// The allocator only moves forward: freeing a slot removes its entry but the index is never
/// handed out again by this table. Only indices that were allocated and not yet freed are
/// present.
///
/// # Examples
///
/// ```rust
/// use procthreads::emulation::TlsSlotTable;
///
/// let mut tls = TlsSlotTable::new();
/// let slot = tls.alloc(64).unwrap();
/// assert_eq!(slot, 0);
/// assert!(tls.set(slot, 42));
/// assert_eq!(tls.get(slot), Some(42));
/// assert!(tls.free(slot));
/// assert_eq!(tls.get(slot), None);
/// assert_eq!(tls.alloc(64), Some(1));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TlsSlotTable {
    slots: BTreeMap<u32, u64>,
    next_index: u32,
}

impl TlsSlotTable {
    /// Creates an empty table whose first allocation returns index 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next index with an initial value of 0.
    ///
    /// Returns `None` once `limit` indices have been handed out.
    pub fn alloc(&mut self, limit: u32) -> Option<u32> {
        if self.next_index >= limit {
            return None;
        }

        let index = self.next_index;
        self.slots.insert(index, 0);
        self.next_index += 1;
        Some(index)
    }

    /// Removes an allocated slot. Returns `false` if `index` is not allocated.
    pub fn free(&mut self, index: u32) -> bool {
        self.slots.remove(&index).is_some()
    }

    /// Returns the value of an allocated slot.
    #[must_use]
    pub fn get(&self, index: u32) -> Option<u64> {
        self.slots.get(&index).copied()
    }

    /// Overwrites the value of an allocated slot. Returns `false` if `index` is not allocated.
    pub fn set(&mut self, index: u32, value: u64) -> bool {
        match self.slots.get_mut(&index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Returns `true` if `index` is currently allocated.
    #[must_use]
    pub fn contains(&self, index: u32) -> bool {
        self.slots.contains_key(&index)
    }

    /// Returns the index the next allocation would hand out.
    #[must_use]
    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    /// Returns the number of live slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no slot is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
