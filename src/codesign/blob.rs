//! Generic blobs and super blobs.
//!
//! Every field in a code signature is big-endian on disk, independent of the
//! Mach-O header's byte order.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::{Error, Result};
use crate::macho::{impl_byte_swap, SwapPolicy};

/// Swap rule for every code signing record.
pub(crate) const POLICY: SwapPolicy = SwapPolicy::BIG_ENDIAN_FORMAT;

// =============================================================================
// Records
// =============================================================================

/// Header shared by every blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct BlobHeader {
    /// Blob magic
    pub magic: u32,
    /// Total length including this header
    pub length: u32,
}

impl BlobHeader {
    /// Size of the record.
    pub const SIZE: usize = 8;
}

impl_byte_swap!(BlobHeader { magic, length });

/// Header of a super blob, followed by `count` [`BlobIndex`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct SuperBlobHeader {
    /// Super blob magic
    pub magic: u32,
    /// Total length including the index table and all blobs
    pub length: u32,
    /// Number of index entries
    pub count: u32,
}

impl SuperBlobHeader {
    /// Size of the record.
    pub const SIZE: usize = 12;
}

impl_byte_swap!(SuperBlobHeader { magic, length, count });

/// One entry of a super blob index table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct BlobIndex {
    /// Slot type (`CSSLOT_*`)
    pub slot_type: u32,
    /// Offset of the blob from the start of the super blob
    pub offset: u32,
}

impl BlobIndex {
    /// Size of the record.
    pub const SIZE: usize = 8;
}

impl_byte_swap!(BlobIndex { slot_type, offset });

// =============================================================================
// Views
// =============================================================================

/// A blob resolved from a super blob index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blob<'a> {
    /// Slot type the blob was indexed under
    pub slot: u32,
    /// Magic from the blob's own header
    pub magic: u32,
    /// Offset from the start of the enclosing super blob
    pub offset: usize,
    /// Whole blob, header included
    pub bytes: &'a [u8],
}

impl<'a> Blob<'a> {
    /// Bytes after the generic blob header.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[BlobHeader::SIZE..]
    }
}

/// Slices the blob at `offset` using the length from its own header.
pub fn blob_at(data: &[u8], offset: usize) -> Result<(BlobHeader, &[u8])> {
    let header: BlobHeader = data
        .get(offset..)
        .and_then(|d| POLICY.read(d))
        .ok_or_else(|| Error::malformed_signature(offset, "truncated blob header"))?;

    let len = header.length as usize;
    if len < BlobHeader::SIZE {
        return Err(Error::malformed_signature(
            offset,
            format!("blob length {len:#x} is smaller than its header"),
        ));
    }

    let bytes = offset
        .checked_add(len)
        .and_then(|end| data.get(offset..end))
        .ok_or_else(|| {
            Error::malformed_signature(offset, format!("blob length {len:#x} overruns container"))
        })?;

    Ok((header, bytes))
}

/// A super blob with a validated index table.
#[derive(Debug, Clone)]
pub struct SuperBlob<'a> {
    /// Super blob bytes, trimmed to the declared length
    pub data: &'a [u8],
    /// Super blob magic
    pub magic: u32,
    /// Index table
    pub indices: Vec<BlobIndex>,
}

impl<'a> SuperBlob<'a> {
    /// Parses the header and index table at the start of `data`.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let header: SuperBlobHeader = POLICY
            .read(data)
            .ok_or_else(|| Error::malformed_signature(0, "truncated super blob header"))?;

        let length = header.length as usize;
        if length < SuperBlobHeader::SIZE || length > data.len() {
            return Err(Error::malformed_signature(
                0,
                format!("super blob length {length:#x} outside {:#x} bytes", data.len()),
            ));
        }
        let data = &data[..length];

        let table_end = (header.count as usize)
            .checked_mul(BlobIndex::SIZE)
            .and_then(|n| n.checked_add(SuperBlobHeader::SIZE))
            .filter(|&end| end <= length)
            .ok_or_else(|| {
                Error::malformed_signature(
                    SuperBlobHeader::SIZE,
                    format!("index table of {} entries overruns super blob", header.count),
                )
            })?;

        let indices = data[SuperBlobHeader::SIZE..table_end]
            .chunks_exact(BlobIndex::SIZE)
            .filter_map(|raw| POLICY.read::<BlobIndex>(raw))
            .collect();

        Ok(Self {
            data,
            magic: header.magic,
            indices,
        })
    }

    /// Resolves one index entry.
    pub fn resolve(&self, index: &BlobIndex) -> Result<Blob<'a>> {
        resolve(self.data, index)
    }
}

/// Resolves an index entry against super blob bytes.
pub(crate) fn resolve<'a>(data: &'a [u8], index: &BlobIndex) -> Result<Blob<'a>> {
    let offset = index.offset as usize;
    let (header, bytes) = blob_at(data, offset)?;
    Ok(Blob {
        slot: index.slot_type,
        magic: header.magic,
        offset,
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{blob, super_blob};

    #[test]
    fn test_parse_super_blob() {
        let data = super_blob(0xfade0cc0, &[(5, blob(0xfade7171, b"abc")), (7, blob(0xfade7172, b"de"))]);
        let sb = SuperBlob::parse(&data).unwrap();
        assert_eq!(sb.magic, 0xfade0cc0);
        assert_eq!(sb.indices.len(), 2);
        assert_eq!(sb.indices[0].offset, 28);

        let first = sb.resolve(&sb.indices[0]).unwrap();
        assert_eq!(first.magic, 0xfade7171);
        assert_eq!(first.payload(), b"abc");
        let second = sb.resolve(&sb.indices[1]).unwrap();
        assert_eq!(second.offset, 28 + 11);
        assert_eq!(second.payload(), b"de");
    }

    #[test]
    fn test_trailing_padding_is_trimmed() {
        let mut data = super_blob(0xfade0cc0, &[(5, blob(0xfade7171, b"x"))]);
        let len = data.len();
        data.extend([0u8; 16]);
        assert_eq!(SuperBlob::parse(&data).unwrap().data.len(), len);
    }

    #[test]
    fn test_index_table_overrun() {
        let mut data = super_blob(0xfade0cc0, &[]);
        data[8..12].copy_from_slice(&100u32.to_be_bytes());
        assert!(matches!(
            SuperBlob::parse(&data),
            Err(Error::MalformedCodeSignature { offset: 12, .. })
        ));
    }

    #[test]
    fn test_blob_length_overrun() {
        let mut data = super_blob(0xfade0cc0, &[(5, blob(0xfade7171, b"abc"))]);
        // Inflate the inner blob's own length past the super blob end.
        data[24..28].copy_from_slice(&64u32.to_be_bytes());
        let sb = SuperBlob::parse(&data).unwrap();
        assert!(matches!(
            sb.resolve(&sb.indices[0]),
            Err(Error::MalformedCodeSignature { offset: 20, .. })
        ));
    }
}
