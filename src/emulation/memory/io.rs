//! Bounds-checked little-endian encoding of guest-visible structures.
//!
//! Guest code reads structures such as `STARTUPINFO` byte-for-byte out of emulated memory, so
//! they are built here into plain byte buffers with explicit offsets rather than through
//! `#[repr(C)]` host types. All helpers advance a caller-owned offset and fail with
//! [`crate::Error::OutOfBounds`] instead of panicking when the buffer is too small.
//!
//! Pointer-sized fields are written with [`write_ptr_at`], which takes the guest
//! [`PointerWidth`] so the same layout code serves 32-bit and 64-bit guests.

use crate::{emulation::PointerWidth, Error::OutOfBounds, Result};

/// Trait for primitive integers that can be moved between host values and guest bytes.
///
/// Each implementation defines a `Bytes` associated type for its fixed-size little-endian
/// representation (e.g. `[u8; 4]` for `u32`).
pub trait GuestIO: Sized + Copy {
    /// Fixed-size byte array for this integer type.
    type Bytes: AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Decode from little-endian bytes.
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Encode to little-endian bytes.
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_guest_io {
    ($($ty:ty => $n:literal),* $(,)?) => {
        $(
            impl GuestIO for $ty {
                type Bytes = [u8; $n];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_guest_io!(u8 => 1, u16 => 2, u32 => 4, u64 => 8);

/// Reads a `T` at `offset` and advances the offset.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if fewer than `size_of::<T>()` bytes remain.
///
/// # Examples
///
/// ```rust
/// use procthreads::emulation::read_le_at;
///
/// let data = [0x01, 0x00, 0x02, 0x00];
/// let mut offset = 0;
/// assert_eq!(read_le_at::<u16>(&data, &mut offset)?, 1);
/// assert_eq!(read_le_at::<u16>(&data, &mut offset)?, 2);
/// assert_eq!(offset, 4);
/// # Ok::<(), procthreads::Error>(())
/// ```
pub fn read_le_at<T: GuestIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let end = offset.checked_add(type_len).ok_or(OutOfBounds)?;
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;
    Ok(T::from_le_bytes(read))
}

/// Writes `value` at `offset` and advances the offset.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit.
///
/// # Examples
///
/// ```rust
/// use procthreads::emulation::write_le_at;
///
/// let mut data = [0u8; 6];
/// let mut offset = 0;
/// write_le_at(&mut data, &mut offset, 0x44_u32)?;
/// write_le_at(&mut data, &mut offset, 1_u16)?;
/// assert_eq!(data, [0x44, 0, 0, 0, 1, 0]);
/// # Ok::<(), procthreads::Error>(())
/// ```
pub fn write_le_at<T: GuestIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let bytes = value.to_le_bytes();
    let bytes = bytes.as_ref();
    let end = offset.checked_add(bytes.len()).ok_or(OutOfBounds)?;
    if end > data.len() {
        return Err(OutOfBounds);
    }

    data[*offset..end].copy_from_slice(bytes);
    *offset = end;
    Ok(())
}

/// Writes a pointer-sized value, truncated to `width`.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit.
pub fn write_ptr_at(
    data: &mut [u8],
    offset: &mut usize,
    value: u64,
    width: PointerWidth,
) -> Result<()> {
    match width {
        #[allow(clippy::cast_possible_truncation)]
        PointerWidth::Bits32 => write_le_at::<u32>(data, offset, value as u32),
        PointerWidth::Bits64 => write_le_at::<u64>(data, offset, value),
    }
}

/// Reads a pointer-sized value of the given `width`.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if fewer than `width.bytes()` bytes remain.
pub fn read_ptr_at(data: &[u8], offset: &mut usize, width: PointerWidth) -> Result<u64> {
    match width {
        PointerWidth::Bits32 => read_le_at::<u32>(data, offset).map(u64::from),
        PointerWidth::Bits64 => read_le_at::<u64>(data, offset),
    }
}

/// Advances `offset` to the next multiple of `align`, zero-filling the gap.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if the padding runs past the buffer.
pub fn pad_to(data: &mut [u8], offset: &mut usize, align: usize) -> Result<()> {
    let aligned = offset.next_multiple_of(align);
    if aligned > data.len() {
        return Err(OutOfBounds);
    }

    data[*offset..aligned].fill(0);
    *offset = aligned;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_write_and_read_mixed() {
        let mut data = [0u8; 8];
        let mut offset = 0;
        write_le_at(&mut data, &mut offset, 0xAABB_u16).unwrap();
        write_le_at(&mut data, &mut offset, 0x1122_3344_u32).unwrap();
        assert_eq!(offset, 6);
        assert_eq!(&data[..6], &[0xBB, 0xAA, 0x44, 0x33, 0x22, 0x11]);

        let mut offset = 2;
        assert_eq!(read_le_at::<u32>(&data, &mut offset).unwrap(), 0x1122_3344);
    }

    #[test]
    fn test_out_of_bounds() {
        let mut data = [0u8; 3];
        let mut offset = 0;
        assert!(matches!(
            write_le_at(&mut data, &mut offset, 1_u32),
            Err(Error::OutOfBounds)
        ));
        assert_eq!(offset, 0);

        let mut offset = usize::MAX;
        assert!(matches!(
            read_le_at::<u8>(&data, &mut offset),
            Err(Error::OutOfBounds)
        ));
    }

    #[test]
    fn test_pointer_width_fields() {
        let mut data = [0u8; 12];
        let mut offset = 0;
        write_ptr_at(&mut data, &mut offset, u64::MAX, PointerWidth::Bits32).unwrap();
        write_ptr_at(&mut data, &mut offset, 0x1_0000_0001, PointerWidth::Bits64).unwrap();
        assert_eq!(offset, 12);
        assert_eq!(&data[..4], &[0xFF; 4]);

        let mut offset = 4;
        assert_eq!(
            read_ptr_at(&data, &mut offset, PointerWidth::Bits64).unwrap(),
            0x1_0000_0001
        );
    }

    #[test]
    fn test_pad_to() {
        let mut data = [0xEEu8; 8];
        let mut offset = 1;
        pad_to(&mut data, &mut offset, 4).unwrap();
        assert_eq!(offset, 4);
        assert_eq!(&data[1..4], &[0, 0, 0]);

        let mut offset = 8;
        pad_to(&mut data, &mut offset, 8).unwrap();
        assert_eq!(offset, 8);

        let mut offset = 7;
        assert!(pad_to(&mut data, &mut offset, 16).is_err());
    }
}
