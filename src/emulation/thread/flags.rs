use bitflags::bitflags;

bitflags! {
    /// `dwCreationFlags` accepted by `CreateThread`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CreationFlags: u32 {
        /// The thread is created suspended and does not run until resumed.
        const CREATE_SUSPENDED = 0x0000_0004;
        /// `dwStackSize` is the reserve size rather than the commit size.
        const STACK_SIZE_PARAM_IS_A_RESERVATION = 0x0001_0000;
    }
}

impl CreationFlags {
    /// Returns `true` if the thread should start suspended.
    #[must_use]
    pub fn starts_suspended(self) -> bool {
        self.contains(CreationFlags::CREATE_SUSPENDED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_bits_are_kept() {
        let flags = CreationFlags::from_bits_retain(0x8000_0004);
        assert!(flags.starts_suspended());
        assert!(!CreationFlags::from_bits_retain(0x10000).starts_suspended());
    }
}
