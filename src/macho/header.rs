//! Mach-O header decoding.

use super::constants::*;
use super::structs::{MachHeader32, MachHeader64};
use super::swap::SwapPolicy;
use crate::error::{Error, Result};
use crate::source::ByteSource;

/// A decoded Mach-O header in host byte order.
///
/// 32-bit headers are widened; `reserved` is zero for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachHeader {
    /// Magic number as stored (before any swap)
    pub magic: u32,
    /// CPU type
    pub cputype: u32,
    /// CPU subtype, including capability bits
    pub cpusubtype: u32,
    /// File type (MH_EXECUTE, MH_DYLIB, ...)
    pub filetype: u32,
    /// Number of load commands
    pub ncmds: u32,
    /// Total size of the load command block
    pub sizeofcmds: u32,
    /// Header flags
    pub flags: u32,
    /// Reserved (64-bit only)
    pub reserved: u32,
    is_64: bool,
    policy: SwapPolicy,
}

impl MachHeader {
    /// Decodes the header at `offset` in `source`.
    ///
    /// Fails with [`Error::InvalidMagic`] unless the first four bytes are one
    /// of the four Mach-O magics.
    pub fn parse<S: ByteSource + ?Sized>(source: &S, offset: u64) -> Result<Self> {
        let magic: u32 = source.read_record(offset)?;
        let (policy, is_64) =
            SwapPolicy::from_macho_magic(magic).ok_or(Error::InvalidMagic(magic))?;

        let header = if is_64 {
            let raw: MachHeader64 = policy.apply(source.read_record(offset)?);
            Self {
                magic,
                cputype: raw.cputype,
                cpusubtype: raw.cpusubtype,
                filetype: raw.filetype,
                ncmds: raw.ncmds,
                sizeofcmds: raw.sizeofcmds,
                flags: raw.flags,
                reserved: raw.reserved,
                is_64,
                policy,
            }
        } else {
            let raw: MachHeader32 = policy.apply(source.read_record(offset)?);
            Self {
                magic,
                cputype: raw.cputype,
                cpusubtype: raw.cpusubtype,
                filetype: raw.filetype,
                ncmds: raw.ncmds,
                sizeofcmds: raw.sizeofcmds,
                flags: raw.flags,
                reserved: 0,
                is_64,
                policy,
            }
        };

        tracing::trace!(
            offset,
            is_64,
            swapped = policy.is_swapped(),
            ncmds = header.ncmds,
            "decoded Mach-O header"
        );

        Ok(header)
    }

    /// Returns true for a 64-bit image.
    #[inline]
    pub fn is_64(&self) -> bool {
        self.is_64
    }

    /// Returns true if the file is in the opposite of host byte order.
    #[inline]
    pub fn is_swapped(&self) -> bool {
        self.policy.is_swapped()
    }

    /// The byte-order rule for every Mach-O record of this file.
    #[inline]
    pub fn swap_policy(&self) -> SwapPolicy {
        self.policy
    }

    /// Size of the header record itself.
    #[inline]
    pub fn size(&self) -> usize {
        if self.is_64 {
            MachHeader64::SIZE
        } else {
            MachHeader32::SIZE
        }
    }

    /// Size of a pointer in this image.
    #[inline]
    pub fn pointer_size(&self) -> u64 {
        if self.is_64 {
            8
        } else {
            4
        }
    }

    /// CPU subtype with the capability bits masked off.
    #[inline]
    pub fn cpu_subtype(&self) -> u32 {
        self.cpusubtype & !CPU_SUBTYPE_MASK
    }

    /// Header flags as a typed set. Unknown bits are kept.
    #[inline]
    pub fn flags(&self) -> HeaderFlags {
        HeaderFlags::from_bits_retain(self.flags)
    }

    /// Returns the conventional name of the file type.
    pub fn filetype_name(&self) -> &'static str {
        match self.filetype {
            MH_OBJECT => "OBJECT",
            MH_EXECUTE => "EXECUTE",
            MH_FVMLIB => "FVMLIB",
            MH_CORE => "CORE",
            MH_PRELOAD => "PRELOAD",
            MH_DYLIB => "DYLIB",
            MH_DYLINKER => "DYLINKER",
            MH_BUNDLE => "BUNDLE",
            MH_DYLIB_STUB => "DYLIB_STUB",
            MH_DSYM => "DSYM",
            MH_KEXT_BUNDLE => "KEXT_BUNDLE",
            MH_FILESET => "FILESET",
            _ => "UNKNOWN",
        }
    }
}
