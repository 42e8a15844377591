//! Universal (fat) binary headers.
//!
//! The fat header and its architecture table are always big-endian, so they
//! are read with [`SwapPolicy::BIG_ENDIAN_FORMAT`] regardless of the slices'
//! own byte order.

use super::constants::*;
use super::structs::{FatArch32, FatArch64, FatHeader};
use super::swap::SwapPolicy;
use crate::error::{Error, Result};
use crate::source::ByteSource;

/// Upper bound on architecture entries; real files carry a handful.
const MAX_FAT_ARCHS: u32 = 64;

/// One slice of a universal binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatArch {
    /// CPU type of the slice
    pub cputype: u32,
    /// CPU subtype of the slice
    pub cpusubtype: u32,
    /// File offset of the slice
    pub offset: u64,
    /// Size of the slice
    pub size: u64,
    /// Alignment as a power of two
    pub align: u32,
}

impl FatArch {
    /// Conventional architecture name of the slice.
    pub fn name(&self) -> &'static str {
        arch_name(self.cputype, self.cpusubtype)
    }
}

/// Returns the conventional name for a CPU type/subtype pair.
pub fn arch_name(cputype: u32, cpusubtype: u32) -> &'static str {
    match (cputype, cpusubtype & !CPU_SUBTYPE_MASK) {
        (CPU_TYPE_ARM64, CPU_SUBTYPE_ARM64E) => "arm64e",
        (CPU_TYPE_ARM64, _) => "arm64",
        (CPU_TYPE_ARM64_32, _) => "arm64_32",
        (CPU_TYPE_ARM, 9) => "armv7",
        (CPU_TYPE_ARM, 11) => "armv7s",
        (CPU_TYPE_ARM, 12) => "armv7k",
        (CPU_TYPE_ARM, _) => "arm",
        (CPU_TYPE_X86_64, 8) => "x86_64h",
        (CPU_TYPE_X86_64, _) => "x86_64",
        (CPU_TYPE_X86, _) => "i386",
        (CPU_TYPE_POWERPC, _) => "ppc",
        (CPU_TYPE_POWERPC64, _) => "ppc64",
        _ => "unknown",
    }
}

/// Returns true if `source` starts with a fat magic.
pub fn is_fat<S: ByteSource + ?Sized>(source: &S) -> bool {
    matches!(
        source
            .read_record::<u32>(0)
            .map(|m| SwapPolicy::BIG_ENDIAN_FORMAT.apply(m)),
        Ok(FAT_MAGIC | FAT_MAGIC_64)
    )
}

/// Parses the fat header and architecture table at the start of `source`.
pub fn parse_fat_archs<S: ByteSource + ?Sized>(source: &S) -> Result<Vec<FatArch>> {
    let policy = SwapPolicy::BIG_ENDIAN_FORMAT;
    let header: FatHeader = policy.apply(source.read_record(0)?);

    let is_64 = match header.magic {
        FAT_MAGIC => false,
        FAT_MAGIC_64 => true,
        other => return Err(Error::InvalidFatMagic(other)),
    };

    // Java class files share 0xCAFEBABE; their "count" is a version number.
    if header.nfat_arch > MAX_FAT_ARCHS {
        return Err(Error::InvalidFatMagic(header.magic));
    }

    let mut archs = Vec::with_capacity(header.nfat_arch as usize);
    let mut offset = FatHeader::SIZE as u64;
    for _ in 0..header.nfat_arch {
        let arch = if is_64 {
            let raw: FatArch64 = policy.apply(source.read_record(offset)?);
            offset += FatArch64::SIZE as u64;
            FatArch {
                cputype: raw.cputype,
                cpusubtype: raw.cpusubtype,
                offset: raw.offset,
                size: raw.size,
                align: raw.align,
            }
        } else {
            let raw: FatArch32 = policy.apply(source.read_record(offset)?);
            offset += FatArch32::SIZE as u64;
            FatArch {
                cputype: raw.cputype,
                cpusubtype: raw.cpusubtype,
                offset: raw.offset as u64,
                size: raw.size as u64,
                align: raw.align,
            }
        };
        archs.push(arch);
    }

    Ok(archs)
}

/// Selects a slice by architecture name (`arm64`, `x86_64`, ...).
pub fn find_arch(archs: &[FatArch], name: &str) -> Result<FatArch> {
    archs
        .iter()
        .find(|a| a.name() == name)
        .copied()
        .ok_or_else(|| Error::ArchNotFound {
            arch: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::Writer;

    fn fat_fixture() -> Vec<u8> {
        let mut w = Writer::new(true);
        w.u32(FAT_MAGIC).u32(2);
        w.u32(CPU_TYPE_X86_64).u32(3).u32(0x1000).u32(0x200).u32(12);
        w.u32(CPU_TYPE_ARM64).u32(CPU_SUBTYPE_ARM64E).u32(0x2000).u32(0x300).u32(14);
        w.finish()
    }

    #[test]
    fn test_parse_fat() {
        let data = fat_fixture();
        assert!(is_fat(data.as_slice()));
        let archs = parse_fat_archs(data.as_slice()).unwrap();
        assert_eq!(archs.len(), 2);
        assert_eq!(archs[0].name(), "x86_64");
        assert_eq!(archs[1].name(), "arm64e");
        assert_eq!(archs[1].offset, 0x2000);

        assert_eq!(find_arch(&archs, "arm64e").unwrap().size, 0x300);
        assert!(matches!(
            find_arch(&archs, "ppc"),
            Err(Error::ArchNotFound { .. })
        ));
    }

    #[test]
    fn test_not_fat() {
        let mut data = 0xFEEDFACFu32.to_le_bytes().to_vec();
        data.extend([0u8; 4]);
        assert!(!is_fat(&data[..]));
        assert!(matches!(
            parse_fat_archs(&data[..]),
            Err(Error::InvalidFatMagic(_))
        ));
    }

    #[test]
    fn test_truncated_arch_table() {
        let mut data = fat_fixture();
        data.truncate(20);
        assert!(matches!(
            parse_fat_archs(data.as_slice()),
            Err(Error::OutOfBounds { .. })
        ));
    }
}
