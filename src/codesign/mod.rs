//! Embedded code signature decoding.
//!
//! `LC_CODE_SIGNATURE` points at one super blob holding an index of typed
//! blobs: code directories, entitlements, requirements and a CMS signature.
//! All of it is big-endian on disk, so decoding uses its own
//! [`SwapPolicy`](crate::macho::SwapPolicy) rather than the Mach-O header's.
//!
//! Cryptographic validation is out of scope; hashes and the CMS blob are
//! returned as bytes.

mod blob;
mod code_directory;
mod constants;

pub use blob::*;
pub use code_directory::*;
pub use constants::*;

use crate::error::{Error, Result};
use crate::limits::Limits;

/// A parsed embedded signature.
///
/// Owns the signature bytes; every blob accessor returns views into them.
#[derive(Debug, Clone)]
pub struct CodeSignature {
    data: Vec<u8>,
    magic: u32,
    indices: Vec<BlobIndex>,
    max_nesting: usize,
}

impl CodeSignature {
    /// Parses the top-level super blob.
    ///
    /// Trailing padding after the declared length is dropped.
    pub fn parse(mut data: Vec<u8>, limits: &Limits) -> Result<Self> {
        let SuperBlob {
            data: trimmed,
            magic,
            indices,
        } = SuperBlob::parse(&data)?;
        let length = trimmed.len();

        if !matches!(
            magic,
            CSMAGIC_EMBEDDED_SIGNATURE | CSMAGIC_EMBEDDED_SIGNATURE_OLD | CSMAGIC_DETACHED_SIGNATURE
        ) {
            return Err(Error::malformed_signature(
                0,
                format!("unexpected super blob magic {magic:#x}"),
            ));
        }

        data.truncate(length);
        tracing::debug!(length, blobs = indices.len(), "parsed code signature");

        Ok(Self {
            data,
            magic,
            indices,
            max_nesting: limits.max_blob_nesting,
        })
    }

    /// Super blob magic.
    pub fn magic(&self) -> u32 {
        self.magic
    }

    /// Raw signature bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Index table in on-disk order.
    pub fn indices(&self) -> &[BlobIndex] {
        &self.indices
    }

    /// Resolves every indexed blob. A bad entry fails alone.
    pub fn blobs(&self) -> impl Iterator<Item = Result<Blob<'_>>> + '_ {
        self.indices.iter().map(|index| resolve(&self.data, index))
    }

    /// First blob stored under `slot`.
    pub fn find(&self, slot: u32) -> Result<Option<Blob<'_>>> {
        self.indices
            .iter()
            .find(|index| index.slot_type == slot)
            .map(|index| resolve(&self.data, index))
            .transpose()
    }

    /// Primary and alternate code directories, in index order.
    pub fn code_directories(&self) -> Result<Vec<CodeDirectory<'_>>> {
        self.indices
            .iter()
            .filter(|index| is_code_directory_slot(index.slot_type))
            .map(|index| CodeDirectory::parse(resolve(&self.data, index)?))
            .collect()
    }

    /// The primary code directory.
    pub fn code_directory(&self) -> Result<Option<CodeDirectory<'_>>> {
        self.find(CSSLOT_CODEDIRECTORY)?
            .map(CodeDirectory::parse)
            .transpose()
    }

    /// XML entitlements property list, verbatim.
    pub fn entitlements(&self) -> Result<Option<&[u8]>> {
        self.payload(CSSLOT_ENTITLEMENTS, CSMAGIC_EMBEDDED_ENTITLEMENTS)
    }

    /// DER-encoded entitlements, verbatim.
    pub fn der_entitlements(&self) -> Result<Option<&[u8]>> {
        self.payload(CSSLOT_DER_ENTITLEMENTS, CSMAGIC_EMBEDDED_DER_ENTITLEMENTS)
    }

    /// CMS signature, verbatim. Ad-hoc signatures carry an empty wrapper.
    pub fn signature(&self) -> Result<Option<&[u8]>> {
        self.payload(CSSLOT_SIGNATURESLOT, CSMAGIC_BLOBWRAPPER)
    }

    fn payload(&self, slot: u32, magic: u32) -> Result<Option<&[u8]>> {
        let Some(blob) = self.find(slot)? else {
            return Ok(None);
        };
        if blob.magic != magic {
            return Err(Error::malformed_signature(
                blob.offset,
                format!("slot {slot:#x} holds magic {:#x}, expected {magic:#x}", blob.magic),
            ));
        }
        Ok(Some(blob.payload()))
    }

    /// Individual requirement blobs, each with its own header.
    pub fn requirements(&self) -> Result<Option<Vec<&[u8]>>> {
        let Some(blob) = self.find(CSSLOT_REQUIREMENTS)? else {
            return Ok(None);
        };
        if blob.magic != CSMAGIC_REQUIREMENTS {
            return Err(Error::malformed_signature(
                blob.offset,
                format!("requirements slot holds magic {:#x}", blob.magic),
            ));
        }
        // The top-level signature is nesting level one.
        if self.max_nesting < 2 {
            return Err(Error::malformed_signature(blob.offset, "super blob nesting limit reached"));
        }

        let nested = SuperBlob::parse(blob.bytes).map_err(|err| match err {
            Error::MalformedCodeSignature { offset, reason } => {
                Error::malformed_signature(blob.offset + offset, reason)
            }
            other => other,
        })?;

        nested
            .indices
            .iter()
            .map(|index| nested.resolve(index).map(|b| b.bytes))
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{blob, code_directory, super_blob};

    const PLIST: &[u8] = b"<?xml version=\"1.0\"?><plist><dict/></plist>";

    fn signature(entries: &[(u32, Vec<u8>)]) -> CodeSignature {
        let data = super_blob(CSMAGIC_EMBEDDED_SIGNATURE, entries);
        CodeSignature::parse(data, &Limits::default()).unwrap()
    }

    #[test]
    fn test_directory_and_entitlements() {
        let sig = signature(&[
            (CSSLOT_CODEDIRECTORY, code_directory("a.b", None, &[], &[[7; 32]])),
            (CSSLOT_ENTITLEMENTS, blob(CSMAGIC_EMBEDDED_ENTITLEMENTS, PLIST)),
        ]);
        assert_eq!(sig.indices().len(), 2);

        let dirs = sig.code_directories().unwrap();
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].identifier(), "a.b");
        assert_eq!(sig.entitlements().unwrap(), Some(PLIST));
        assert_eq!(sig.der_entitlements().unwrap(), None);
        assert_eq!(sig.requirements().unwrap(), None);
    }

    #[test]
    fn test_der_entitlements() {
        // DER dictionary holding a single boolean entitlement.
        let der: &[u8] = &[
            0x70, 0x0b, 0x02, 0x01, 0x01, 0xb0, 0x06, 0x30, 0x04, 0x0c, 0x01, 0x61, 0x01, 0x01,
            0xff,
        ];
        let sig = signature(&[
            (CSSLOT_CODEDIRECTORY, code_directory("a.b", None, &[], &[])),
            (CSSLOT_ENTITLEMENTS, blob(CSMAGIC_EMBEDDED_ENTITLEMENTS, PLIST)),
            (CSSLOT_DER_ENTITLEMENTS, blob(CSMAGIC_EMBEDDED_DER_ENTITLEMENTS, der)),
        ]);
        assert_eq!(sig.der_entitlements().unwrap(), Some(der));
        assert_eq!(sig.entitlements().unwrap(), Some(PLIST));

        let swapped = signature(&[(
            CSSLOT_DER_ENTITLEMENTS,
            blob(CSMAGIC_EMBEDDED_ENTITLEMENTS, der),
        )]);
        assert!(swapped.der_entitlements().is_err());
    }

    #[test]
    fn test_alternate_directories() {
        let sig = signature(&[
            (CSSLOT_CODEDIRECTORY, code_directory("x", None, &[], &[])),
            (CSSLOT_REQUIREMENTS, super_blob(CSMAGIC_REQUIREMENTS, &[])),
            (CSSLOT_ALTERNATE_CODEDIRECTORIES, code_directory("x", None, &[], &[[1; 32]])),
            (CSSLOT_SIGNATURESLOT, blob(CSMAGIC_BLOBWRAPPER, &[])),
        ]);
        let dirs = sig.code_directories().unwrap();
        assert_eq!(dirs.len(), 2);
        assert_eq!(dirs[1].slot, CSSLOT_ALTERNATE_CODEDIRECTORIES);
        assert_eq!(sig.code_directory().unwrap().unwrap().header.n_code_slots, 0);
        assert_eq!(sig.signature().unwrap(), Some(&[][..]));
        assert_eq!(sig.requirements().unwrap(), Some(Vec::new()));
    }

    #[test]
    fn test_nested_requirements() {
        let designated = blob(CSMAGIC_REQUIREMENT, &[0, 0, 0, 1, 0, 0, 0, 6]);
        let library = blob(CSMAGIC_REQUIREMENT, &[0, 0, 0, 1]);
        let reqs = super_blob(CSMAGIC_REQUIREMENTS, &[(3, designated.clone()), (4, library.clone())]);
        let sig = signature(&[(CSSLOT_REQUIREMENTS, reqs)]);

        let found = sig.requirements().unwrap().unwrap();
        assert_eq!(found, vec![&designated[..], &library[..]]);

        let flat = CodeSignature::parse(
            super_blob(
                CSMAGIC_EMBEDDED_SIGNATURE,
                &[(CSSLOT_REQUIREMENTS, super_blob(CSMAGIC_REQUIREMENTS, &[]))],
            ),
            &Limits {
                max_blob_nesting: 1,
                ..Limits::default()
            },
        )
        .unwrap();
        assert!(flat.requirements().is_err());
    }

    #[test]
    fn test_mismatched_slot_magic() {
        let sig = signature(&[(CSSLOT_ENTITLEMENTS, blob(CSMAGIC_REQUIREMENT, b"x"))]);
        assert!(matches!(
            sig.entitlements(),
            Err(Error::MalformedCodeSignature { offset: 20, .. })
        ));
    }

    #[test]
    fn test_rejects_other_super_blobs() {
        let data = super_blob(CSMAGIC_REQUIREMENTS, &[]);
        assert!(CodeSignature::parse(data, &Limits::default()).is_err());
    }
}
