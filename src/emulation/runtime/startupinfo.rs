//! Encoding of the `STARTUPINFO` structure.
//!
//! Both the ANSI and the wide variant have the same layout; only the pointed-to strings
//! differ, and those are never materialised.
//!
//! # 32-bit layout (0x44 bytes)
//!
//! | Offset | Field |
//! |--------|-------|
//! | 0x00 | `cb` |
//! | 0x04 | `lpReserved` |
//! | 0x08 | `lpDesktop` |
//! | 0x0C | `lpTitle` |
//! | 0x10 | `dwX`, `dwY`, `dwXSize`, `dwYSize`, `dwXCountChars`, `dwYCountChars`, `dwFillAttribute` |
//! | 0x2C | `dwFlags` |
//! | 0x30 | `wShowWindow` |
//! | 0x32 | `cbReserved2` |
//! | 0x34 | `lpReserved2` |
//! | 0x38 | `hStdInput`, `hStdOutput`, `hStdError` |
//!
//! On 64-bit guests pointers and handles are 8 bytes with natural alignment, which gives 0x68
//! bytes in total.

use crate::{
    emulation::{pad_to, process::StartupInfoConfig, write_le_at, write_ptr_at, PointerWidth},
    Result,
};

/// Size of `STARTUPINFO` for the given pointer width.
#[must_use]
pub fn startup_info_size(width: PointerWidth) -> usize {
    match width {
        PointerWidth::Bits32 => 0x44,
        PointerWidth::Bits64 => 0x68,
    }
}

/// Builds the bytes of a `STARTUPINFO` block.
///
/// The three standard handles are all-ones (`INVALID_HANDLE_VALUE`).
///
/// # Errors
///
/// Only fails if the field layout and [`startup_info_size`] disagree: with
/// [`crate::Error::OutOfBounds`] when the fields run past the block and with
/// [`crate::Error::Invariant`] when they end short of it.
///
/// # Examples
///
/// ```rust
/// use procthreads::emulation::{encode_startup_info, PointerWidth, StartupInfoConfig};
///
/// let bytes = encode_startup_info(&StartupInfoConfig::default(), PointerWidth::Bits32)?;
/// assert_eq!(bytes.len(), 0x44);
/// assert_eq!(&bytes[0..4], &[0x44, 0, 0, 0]);
/// # Ok::<(), procthreads::Error>(())
/// ```
pub fn encode_startup_info(config: &StartupInfoConfig, width: PointerWidth) -> Result<Vec<u8>> {
    let size = startup_info_size(width);
    let ptr_align = width.bytes();
    let mut data = vec![0_u8; size];
    let offset = &mut 0_usize;

    #[allow(clippy::cast_possible_truncation)]
    write_le_at::<u32>(&mut data, offset, size as u32)?;
    pad_to(&mut data, offset, ptr_align)?;
    write_ptr_at(&mut data, offset, 0, width)?;
    write_ptr_at(&mut data, offset, config.desktop, width)?;
    write_ptr_at(&mut data, offset, config.title, width)?;

    for value in [
        config.x,
        config.y,
        config.x_size,
        config.y_size,
        config.x_count_chars,
        config.y_count_chars,
        config.fill_attribute,
        config.flags,
    ] {
        write_le_at::<u32>(&mut data, offset, value)?;
    }

    write_le_at::<u16>(&mut data, offset, config.show_window)?;
    write_le_at::<u16>(&mut data, offset, 0)?;
    pad_to(&mut data, offset, ptr_align)?;
    write_ptr_at(&mut data, offset, 0, width)?;

    for _ in 0..3 {
        write_ptr_at(&mut data, offset, width.mask(), width)?;
    }

    if *offset != size {
        return Err(invariant_error!(
            "STARTUPINFO layout ends at {:#x}, expected {:#x}",
            offset,
            size
        ));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulation::{read_le_at, read_ptr_at};

    #[test]
    fn test_layout_fills_block() {
        for width in [PointerWidth::Bits32, PointerWidth::Bits64] {
            let bytes = encode_startup_info(&StartupInfoConfig::default(), width).unwrap();
            assert_eq!(bytes.len(), startup_info_size(width));
        }
    }

    #[test]
    fn test_layout_32() {
        let data = encode_startup_info(&StartupInfoConfig::default(), PointerWidth::Bits32).unwrap();
        assert_eq!(data.len(), 0x44);

        let offset = &mut 0;
        assert_eq!(read_le_at::<u32>(&data, offset).unwrap(), 0x44);
        assert_eq!(read_le_at::<u32>(&data, offset).unwrap(), 0);
        assert_eq!(read_le_at::<u32>(&data, offset).unwrap(), 0xC3_C930);
        assert_eq!(read_le_at::<u32>(&data, offset).unwrap(), 0);

        let mut dwords = [0_u32; 8];
        for value in &mut dwords {
            *value = read_le_at::<u32>(&data, offset).unwrap();
        }
        assert_eq!(dwords, [0, 0, 0x64, 0x64, 0x84, 0x80, 0xFF, 0x40]);

        assert_eq!(*offset, 0x30);
        assert_eq!(read_le_at::<u16>(&data, offset).unwrap(), 1);
        assert_eq!(read_le_at::<u16>(&data, offset).unwrap(), 0);
        assert_eq!(read_le_at::<u32>(&data, offset).unwrap(), 0);
        assert_eq!(&data[0x38..0x44], &[0xFF; 12]);
    }

    #[test]
    fn test_layout_64() {
        let data = encode_startup_info(&StartupInfoConfig::default(), PointerWidth::Bits64).unwrap();
        assert_eq!(data.len(), 0x68);
        assert_eq!(&data[0..8], &[0x68, 0, 0, 0, 0, 0, 0, 0]);

        let offset = &mut 0x10;
        assert_eq!(
            read_ptr_at(&data, offset, PointerWidth::Bits64).unwrap(),
            0xC3_C930
        );

        let offset = &mut 0x3C;
        assert_eq!(read_le_at::<u32>(&data, offset).unwrap(), 0x40);
        assert_eq!(read_le_at::<u16>(&data, offset).unwrap(), 1);

        assert_eq!(&data[0x44..0x50], &[0; 12]);
        assert_eq!(&data[0x50..0x68], &[0xFF; 24]);
    }

    #[test]
    fn test_custom_values() {
        let config = StartupInfoConfig {
            show_window: 5,
            flags: 0x101,
            ..Default::default()
        };
        let data = encode_startup_info(&config, PointerWidth::Bits32).unwrap();
        assert_eq!(&data[0x2C..0x32], &[0x01, 0x01, 0, 0, 5, 0]);
    }
}
