//! Code directory decoding.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::blob::{Blob, POLICY};
use super::constants::*;
use crate::error::{Error, Result};
use crate::macho::{impl_byte_swap, PackedVersion};
use crate::util::c_str_bytes;

/// Fixed part of a code directory, up to the version 0x20500 fields.
///
/// Fields past what the blob's `version` supports are zeroed on decode, so
/// an older directory never reads its identifier string as a scatter offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct CodeDirectoryHeader {
    /// Magic (`CSMAGIC_CODEDIRECTORY`)
    pub magic: u32,
    /// Total blob length
    pub length: u32,
    /// Format version
    pub version: u32,
    /// `CS_*` flags
    pub flags: u32,
    /// Offset of code slot zero
    pub hash_offset: u32,
    /// Offset of the identifier string
    pub ident_offset: u32,
    /// Number of special slots
    pub n_special_slots: u32,
    /// Number of code slots
    pub n_code_slots: u32,
    /// Limit of the signed range (32-bit)
    pub code_limit: u32,
    /// Bytes per hash
    pub hash_size: u8,
    /// `CS_HASHTYPE_*`
    pub hash_type: u8,
    /// Platform identifier, zero if not a platform binary
    pub platform: u8,
    /// log2 of the page size, zero for unpaged
    pub page_size: u8,
    /// Unused
    pub spare2: u32,
    /// Offset of the scatter vector (0x20100)
    pub scatter_offset: u32,
    /// Offset of the team identifier (0x20200)
    pub team_offset: u32,
    /// Unused (0x20300)
    pub spare3: u32,
    /// Limit of the signed range (64-bit, 0x20300)
    pub code_limit64: u64,
    /// File offset of the executable segment (0x20400)
    pub exec_seg_base: u64,
    /// Size of the executable segment (0x20400)
    pub exec_seg_limit: u64,
    /// Executable segment flags (0x20400)
    pub exec_seg_flags: u64,
    /// Hardened runtime version (0x20500)
    pub runtime: u32,
    /// Offset of pre-encryption hashes (0x20500)
    pub pre_encrypt_offset: u32,
}

impl CodeDirectoryHeader {
    /// Size of the record.
    pub const SIZE: usize = 96;
    /// Size of the fields every version carries.
    pub const MIN_SIZE: usize = 44;
}

impl_byte_swap!(CodeDirectoryHeader {
    magic,
    length,
    version,
    flags,
    hash_offset,
    ident_offset,
    n_special_slots,
    n_code_slots,
    code_limit,
    spare2,
    scatter_offset,
    team_offset,
    spare3,
    code_limit64,
    exec_seg_base,
    exec_seg_limit,
    exec_seg_flags,
    runtime,
    pre_encrypt_offset,
});

/// Executable segment description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecSegment {
    /// File offset of the segment
    pub base: u64,
    /// Size of the segment
    pub limit: u64,
    /// Segment flags
    pub flags: ExecSegFlags,
}

/// A decoded code directory.
#[derive(Debug, Clone, Copy)]
pub struct CodeDirectory<'a> {
    /// Fixed fields, version-gated
    pub header: CodeDirectoryHeader,
    /// Slot the directory was found in
    pub slot: u32,
    bytes: &'a [u8],
}

impl<'a> CodeDirectory<'a> {
    /// Decodes a code directory blob.
    pub fn parse(blob: Blob<'a>) -> Result<Self> {
        if blob.magic != CSMAGIC_CODEDIRECTORY {
            return Err(Error::malformed_signature(
                blob.offset,
                format!("expected code directory, got magic {:#x}", blob.magic),
            ));
        }
        if blob.bytes.len() < CodeDirectoryHeader::MIN_SIZE {
            return Err(Error::malformed_signature(blob.offset, "truncated code directory"));
        }

        let mut raw = [0u8; CodeDirectoryHeader::SIZE];
        let n = blob.bytes.len().min(CodeDirectoryHeader::SIZE);
        raw[..n].copy_from_slice(&blob.bytes[..n]);
        let mut header: CodeDirectoryHeader = POLICY
            .read(&raw)
            .ok_or_else(|| Error::malformed_signature(blob.offset, "truncated code directory"))?;

        let version = header.version;
        if version < CS_SUPPORTSSCATTER {
            header.scatter_offset = 0;
        }
        if version < CS_SUPPORTSTEAMID {
            header.team_offset = 0;
        }
        if version < CS_SUPPORTSCODELIMIT64 {
            header.spare3 = 0;
            header.code_limit64 = 0;
        }
        if version < CS_SUPPORTSEXECSEG {
            header.exec_seg_base = 0;
            header.exec_seg_limit = 0;
            header.exec_seg_flags = 0;
        }
        if version < CS_SUPPORTSRUNTIME {
            header.runtime = 0;
            header.pre_encrypt_offset = 0;
        }

        Ok(Self {
            header,
            slot: blob.slot,
            bytes: blob.bytes,
        })
    }

    /// Raw blob bytes, header included.
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Format version.
    pub fn version(&self) -> u32 {
        self.header.version
    }

    /// Code signing flags.
    pub fn flags(&self) -> CodeSignFlags {
        CodeSignFlags::from_bits_retain(self.header.flags)
    }

    /// Hash algorithm name.
    pub fn hash_type_name(&self) -> &'static str {
        hash_type_name(self.header.hash_type)
    }

    /// Page size in bytes, `None` for an unpaged signature.
    pub fn page_size(&self) -> Option<u32> {
        match self.header.page_size {
            0 => None,
            shift => 1u32.checked_shl(shift as u32),
        }
    }

    /// Limit of the signed range, preferring the 64-bit field.
    pub fn code_limit(&self) -> u64 {
        match self.header.code_limit64 {
            0 => self.header.code_limit as u64,
            limit => limit,
        }
    }

    fn string_at(&self, offset: u32) -> Option<String> {
        let data = self.bytes.get(offset as usize..)?;
        let (bytes, _) = c_str_bytes(data);
        match std::str::from_utf8(bytes) {
            Ok(s) => Some(s.to_string()),
            Err(_) => {
                tracing::debug!(offset, "invalid UTF-8 in code directory string");
                Some(String::new())
            }
        }
    }

    /// Signing identifier (usually the bundle id).
    pub fn identifier(&self) -> String {
        self.string_at(self.header.ident_offset).unwrap_or_default()
    }

    /// Team identifier, if the directory carries one.
    pub fn team_id(&self) -> Option<String> {
        match self.header.team_offset {
            0 => None,
            offset => self.string_at(offset),
        }
    }

    /// Scatter vector offset, if present.
    pub fn scatter_offset(&self) -> Option<u32> {
        (self.header.scatter_offset != 0).then_some(self.header.scatter_offset)
    }

    /// Executable segment information (version 0x20400 and later).
    pub fn exec_segment(&self) -> Option<ExecSegment> {
        (self.header.version >= CS_SUPPORTSEXECSEG).then(|| ExecSegment {
            base: self.header.exec_seg_base,
            limit: self.header.exec_seg_limit,
            flags: ExecSegFlags::from_bits_retain(self.header.exec_seg_flags),
        })
    }

    /// Hardened runtime version (version 0x20500 and later).
    pub fn runtime(&self) -> Option<PackedVersion> {
        (self.header.version >= CS_SUPPORTSRUNTIME).then_some(PackedVersion(self.header.runtime))
    }

    fn hash_at(&self, start: Option<usize>) -> Option<&'a [u8]> {
        let start = start?;
        let end = start.checked_add(self.header.hash_size as usize)?;
        self.bytes.get(start..end)
    }

    /// Hash of code page `index`.
    pub fn code_slot(&self, index: u32) -> Option<&'a [u8]> {
        if index >= self.header.n_code_slots {
            return None;
        }
        let rel = (index as usize).checked_mul(self.header.hash_size as usize);
        self.hash_at(rel.and_then(|r| r.checked_add(self.header.hash_offset as usize)))
    }

    /// Hash of special slot `index` (1-based, stored before slot zero).
    pub fn special_slot(&self, index: u32) -> Option<&'a [u8]> {
        if index == 0 || index > self.header.n_special_slots {
            return None;
        }
        let rel = (index as usize).checked_mul(self.header.hash_size as usize);
        self.hash_at(rel.and_then(|r| (self.header.hash_offset as usize).checked_sub(r)))
    }

    /// Iterates over all code page hashes.
    pub fn code_hashes(&self) -> impl Iterator<Item = Option<&'a [u8]>> + '_ {
        (0..self.header.n_code_slots).map(|i| self.code_slot(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{blob, code_directory};

    fn as_blob(bytes: &[u8]) -> Blob<'_> {
        Blob {
            slot: CSSLOT_CODEDIRECTORY,
            magic: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            offset: 0,
            bytes,
        }
    }

    #[test]
    fn test_parse_code_directory() {
        let special = [[0x11; 32], [0x22; 32]];
        let hashes = [[0xaa; 32], [0xbb; 32], [0xcc; 32]];
        let bytes = code_directory("com.example.tool", Some("ABCDE12345"), &special, &hashes);
        let cd = CodeDirectory::parse(as_blob(&bytes)).unwrap();

        assert_eq!(cd.version(), 0x20400);
        assert!(cd.flags().contains(CodeSignFlags::RUNTIME));
        assert_eq!(cd.identifier(), "com.example.tool");
        assert_eq!(cd.team_id().as_deref(), Some("ABCDE12345"));
        assert_eq!(cd.hash_type_name(), "sha256");
        assert_eq!(cd.page_size(), Some(0x1000));
        assert_eq!(cd.code_limit(), 0x3000);
        assert_eq!(cd.runtime(), None);

        let exec = cd.exec_segment().unwrap();
        assert_eq!(exec.limit, 0x4000);
        assert!(exec.flags.contains(ExecSegFlags::MAIN_BINARY));

        assert_eq!(cd.code_slot(0), Some(&[0xaa; 32][..]));
        assert_eq!(cd.code_slot(2), Some(&[0xcc; 32][..]));
        assert_eq!(cd.code_slot(3), None);
        assert_eq!(cd.special_slot(1), Some(&[0x11; 32][..]));
        assert_eq!(cd.special_slot(2), Some(&[0x22; 32][..]));
        assert_eq!(cd.special_slot(0), None);
        assert_eq!(cd.code_hashes().flatten().count(), 3);
    }

    #[test]
    fn test_old_version_fields_are_gated() {
        let mut bytes = code_directory("id", None, &[], &[]);
        // Downgrade to 0x20001; the bytes after offset 44 are now ignored.
        bytes[8..12].copy_from_slice(&0x20001u32.to_be_bytes());
        let cd = CodeDirectory::parse(as_blob(&bytes)).unwrap();
        assert_eq!(cd.exec_segment(), None);
        assert_eq!(cd.header.exec_seg_limit, 0);
        assert_eq!(cd.team_id(), None);
    }

    #[test]
    fn test_wrong_magic() {
        let bytes = blob(0xfade7171, &[0u8; 64]);
        assert!(matches!(
            CodeDirectory::parse(as_blob(&bytes)),
            Err(Error::MalformedCodeSignature { .. })
        ));
    }
}
