//! Guest handle values and the objects they name.
//!
//! A guest sees handles as plain pointer-sized integers. Some of those integers are real
//! entries in the [`HandleTable`](super::HandleTable); others are conventional sentinels
//! ("the current process", "the current thread") that are never allocated. Rather than
//! comparing raw integers at every call site, raw values are decoded once into a
//! [`HandleValue`] so a sentinel can never be mistaken for a table entry.

use std::fmt;

use crate::emulation::{PointerWidth, ThreadId};

/// Identifier of a real handle table entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandleId(pub u32);

impl HandleId {
    /// Returns the raw guest-visible value.
    #[must_use]
    pub fn raw(self) -> u64 {
        u64::from(self.0)
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Emulated process identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u32);

/// Kernel-like object a handle refers to.
///
/// Objects are named by their identity, not owned: the thread record itself stays in the
/// [`ThreadManager`](crate::emulation::ThreadManager) for its whole lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KernelObject {
    /// A guest thread.
    Thread(ThreadId),
    /// A process.
    Process(ProcessId),
}

/// Kinds of sentinel handle values that are never table entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PseudoHandle {
    /// `GetCurrentProcess()`, `(HANDLE)-1`.
    CurrentProcess,
    /// `GetCurrentThread()`, `(HANDLE)-2`.
    CurrentThread,
    /// The emulated image base, which guests conventionally pass to mean "this process".
    OwnImage,
    /// The fixed value handed out by `OpenProcess` for processes that are not modelled.
    OpenedProcess,
}

/// A decoded guest handle value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandleValue {
    /// The null handle.
    Null,
    /// A sentinel handle.
    Pseudo(PseudoHandle),
    /// A value that may name a handle table entry.
    Real(HandleId),
    /// A value that cannot be a table entry (wider than any allocated id).
    Invalid(u64),
}

impl HandleValue {
    /// Returns `true` if the value denotes the emulated process itself.
    ///
    /// `TerminateProcess` halts the run only for these values.
    #[must_use]
    pub fn is_own_process(self) -> bool {
        matches!(
            self,
            HandleValue::Null
                | HandleValue::Pseudo(PseudoHandle::CurrentProcess | PseudoHandle::OwnImage)
        )
    }
}

/// Raw values of the sentinel handles for one emulated process.
///
/// # Examples
///
/// ```rust
/// use procthreads::emulation::{HandleSentinels, HandleValue, PointerWidth, PseudoHandle};
///
/// let sentinels = HandleSentinels::new(PointerWidth::Bits32, 0x400000, 0xD10C);
/// assert_eq!(sentinels.encode(PseudoHandle::CurrentProcess), 0xFFFF_FFFF);
/// assert_eq!(
///     sentinels.decode(0xFFFF_FFFE),
///     HandleValue::Pseudo(PseudoHandle::CurrentThread)
/// );
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandleSentinels {
    width: PointerWidth,
    image_base: u64,
    opened_process: u64,
}

impl HandleSentinels {
    /// Creates the sentinel set for a guest of the given pointer width.
    #[must_use]
    pub fn new(width: PointerWidth, image_base: u64, opened_process: u64) -> Self {
        Self {
            width,
            image_base: width.truncate(image_base),
            opened_process: width.truncate(opened_process),
        }
    }

    /// Returns the raw guest value of a pseudo-handle.
    #[must_use]
    pub fn encode(&self, pseudo: PseudoHandle) -> u64 {
        match pseudo {
            PseudoHandle::CurrentProcess => self.width.mask(),
            PseudoHandle::CurrentThread => self.width.mask() - 1,
            PseudoHandle::OwnImage => self.image_base,
            PseudoHandle::OpenedProcess => self.opened_process,
        }
    }

    /// Decodes a raw guest value, truncated to the pointer width first.
    #[must_use]
    pub fn decode(&self, raw: u64) -> HandleValue {
        let raw = self.width.truncate(raw);
        if raw == 0 {
            return HandleValue::Null;
        }

        for pseudo in [
            PseudoHandle::CurrentProcess,
            PseudoHandle::CurrentThread,
            PseudoHandle::OwnImage,
            PseudoHandle::OpenedProcess,
        ] {
            if raw == self.encode(pseudo) {
                return HandleValue::Pseudo(pseudo);
            }
        }

        match u32::try_from(raw) {
            Ok(id) => HandleValue::Real(HandleId(id)),
            Err(_) => HandleValue::Invalid(raw),
        }
    }

    /// Returns the sentinel values that fall inside the table's id space.
    ///
    /// The handle table never hands these out as real ids.
    #[must_use]
    pub fn reserved_ids(&self) -> Vec<u32> {
        [
            PseudoHandle::CurrentProcess,
            PseudoHandle::CurrentThread,
            PseudoHandle::OwnImage,
            PseudoHandle::OpenedProcess,
        ]
        .into_iter()
        .filter_map(|p| u32::try_from(self.encode(p)).ok())
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_32bit() {
        let s = HandleSentinels::new(PointerWidth::Bits32, 0x400000, 0xD10C);
        assert_eq!(s.decode(0), HandleValue::Null);
        assert_eq!(s.decode(0x400000), HandleValue::Pseudo(PseudoHandle::OwnImage));
        assert_eq!(s.decode(0xD10C), HandleValue::Pseudo(PseudoHandle::OpenedProcess));
        assert_eq!(
            s.decode(u64::MAX),
            HandleValue::Pseudo(PseudoHandle::CurrentProcess)
        );
        assert_eq!(s.decode(3), HandleValue::Real(HandleId(3)));
        // Upper bits are not part of a 32-bit handle.
        assert_eq!(s.decode(0x1_0000_0003), HandleValue::Real(HandleId(3)));
    }

    #[test]
    fn test_decode_64bit() {
        let s = HandleSentinels::new(PointerWidth::Bits64, 0x1_4000_0000, 0xD10C);
        assert_eq!(
            s.decode(u64::MAX - 1),
            HandleValue::Pseudo(PseudoHandle::CurrentThread)
        );
        assert_eq!(
            s.decode(0x1_4000_0000),
            HandleValue::Pseudo(PseudoHandle::OwnImage)
        );
        assert_eq!(s.decode(0x2_0000_0000), HandleValue::Invalid(0x2_0000_0000));
        // 0xFFFFFFFF is an ordinary value on a 64-bit guest.
        assert_eq!(s.decode(0xFFFF_FFFF), HandleValue::Real(HandleId(u32::MAX)));
    }

    #[test]
    fn test_reserved_ids() {
        let s = HandleSentinels::new(PointerWidth::Bits32, 0x400000, 0xD10C);
        let reserved = s.reserved_ids();
        assert!(reserved.contains(&0x400000));
        assert!(reserved.contains(&0xD10C));
        assert!(reserved.contains(&0xFFFF_FFFF));
        assert!(reserved.contains(&0xFFFF_FFFE));

        let s = HandleSentinels::new(PointerWidth::Bits64, 0x1_4000_0000, 0xD10C);
        assert_eq!(s.reserved_ids(), vec![0xD10C]);
    }

    #[test]
    fn test_own_process() {
        assert!(HandleValue::Null.is_own_process());
        assert!(HandleValue::Pseudo(PseudoHandle::OwnImage).is_own_process());
        assert!(HandleValue::Pseudo(PseudoHandle::CurrentProcess).is_own_process());
        assert!(!HandleValue::Pseudo(PseudoHandle::OpenedProcess).is_own_process());
        assert!(!HandleValue::Pseudo(PseudoHandle::CurrentThread).is_own_process());
        assert!(!HandleValue::Real(HandleId(1)).is_own_process());
    }
}
