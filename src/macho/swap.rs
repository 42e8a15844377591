//! Byte-order handling for on-disk records.
//!
//! Two independent rules decide whether a record needs swapping:
//!
//! - The Mach-O rule: the header magic tells whether the file was written in
//!   the host's byte order. Every load command, symbol and data-in-code
//!   record of that file follows the header.
//! - The big-endian format rule: code-signature blobs and fat headers are
//!   always stored big-endian, so they need swapping exactly when the host
//!   is little-endian, whatever the Mach-O header says.
//!
//! Each decoder carries its own [`SwapPolicy`] value; there is no global flag.

use zerocopy::FromBytes;

use super::constants::*;

/// A record whose integer fields can be byte-swapped.
///
/// Implementations must be pure and total: swapping twice returns the
/// original value.
pub trait ByteSwap: Sized {
    /// Returns a copy with every multi-byte integer field reversed.
    fn byte_swapped(&self) -> Self;
}

macro_rules! impl_byte_swap_int {
    ($($ty:ty),*) => {
        $(
            impl ByteSwap for $ty {
                #[inline(always)]
                fn byte_swapped(&self) -> Self {
                    self.swap_bytes()
                }
            }
        )*
    };
}

impl_byte_swap_int!(u16, u32, u64, i16, i32, i64);

/// Implements [`ByteSwap`] for a record by swapping the listed fields.
///
/// Fields that are not listed (byte arrays, names) are copied unchanged.
macro_rules! impl_byte_swap {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::macho::ByteSwap for $ty {
            #[inline]
            #[allow(clippy::needless_update)]
            fn byte_swapped(&self) -> Self {
                Self {
                    $($field: self.$field.swap_bytes(),)*
                    ..*self
                }
            }
        }
    };
}

pub(crate) use impl_byte_swap;

/// Whether records read by a decoder must be byte-swapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwapPolicy {
    swapped: bool,
}

impl SwapPolicy {
    /// Records are in host byte order.
    pub const NATIVE: Self = Self { swapped: false };

    /// Records are in the opposite of host byte order.
    pub const SWAPPED: Self = Self { swapped: true };

    /// Rule for formats that are big-endian on disk (code signatures, fat headers).
    pub const BIG_ENDIAN_FORMAT: Self = Self {
        swapped: cfg!(target_endian = "little"),
    };

    /// Rule for formats that are little-endian on disk (dyld shared caches).
    pub const LITTLE_ENDIAN_FORMAT: Self = Self {
        swapped: cfg!(target_endian = "big"),
    };

    /// Derives the Mach-O rule from a header magic read in host byte order.
    ///
    /// Returns the policy and whether the file is 64-bit, or `None` if the
    /// magic is not one of the four Mach-O values.
    pub fn from_macho_magic(magic: u32) -> Option<(Self, bool)> {
        match magic {
            MH_MAGIC => Some((Self::NATIVE, false)),
            MH_CIGAM => Some((Self::SWAPPED, false)),
            MH_MAGIC_64 => Some((Self::NATIVE, true)),
            MH_CIGAM_64 => Some((Self::SWAPPED, true)),
            _ => None,
        }
    }

    /// Returns true if records must be swapped.
    #[inline]
    pub fn is_swapped(self) -> bool {
        self.swapped
    }

    /// Returns true if the data this policy describes is big-endian.
    #[inline]
    pub fn is_big_endian(self) -> bool {
        self.swapped == cfg!(target_endian = "little")
    }

    /// Brings a record into host byte order.
    #[inline]
    pub fn apply<T: ByteSwap>(self, value: T) -> T {
        if self.swapped {
            value.byte_swapped()
        } else {
            value
        }
    }

    /// Overlays a record on the start of `data` and applies the policy.
    ///
    /// Returns `None` if `data` is shorter than the record.
    #[inline]
    pub fn read<T: FromBytes + ByteSwap>(self, data: &[u8]) -> Option<T> {
        let (value, _) = T::read_from_prefix(data).ok()?;
        Some(self.apply(value))
    }

    /// Reads a u32 at `offset` in the described byte order.
    #[inline]
    pub fn read_u32_at(self, data: &[u8], offset: usize) -> Option<u32> {
        crate::util::read_u32(data.get(offset..)?, self.is_big_endian())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_macho_magic() {
        assert_eq!(
            SwapPolicy::from_macho_magic(MH_MAGIC),
            Some((SwapPolicy::NATIVE, false))
        );
        assert_eq!(
            SwapPolicy::from_macho_magic(MH_CIGAM),
            Some((SwapPolicy::SWAPPED, false))
        );
        assert_eq!(
            SwapPolicy::from_macho_magic(MH_MAGIC_64),
            Some((SwapPolicy::NATIVE, true))
        );
        assert_eq!(
            SwapPolicy::from_macho_magic(MH_CIGAM_64),
            Some((SwapPolicy::SWAPPED, true))
        );
        assert_eq!(SwapPolicy::from_macho_magic(FAT_MAGIC), None);
    }

    #[test]
    fn test_big_endian_format() {
        let data = [0xfa, 0xde, 0x0c, 0xc0];
        assert_eq!(
            SwapPolicy::BIG_ENDIAN_FORMAT.read::<u32>(&data),
            Some(0xfade0cc0)
        );
        assert!(SwapPolicy::BIG_ENDIAN_FORMAT.is_big_endian());
    }

    #[test]
    fn test_apply() {
        assert_eq!(SwapPolicy::SWAPPED.apply(0x11223344u32), 0x44332211);
        assert_eq!(SwapPolicy::NATIVE.apply(0x11223344u32), 0x11223344);
        assert_eq!(SwapPolicy::NATIVE.read::<u32>(&[1, 2]), None);
    }
}
