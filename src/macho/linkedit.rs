//! Auxiliary link-edit tables: function starts and data in code.

use super::constants::*;
use super::structs::DataInCodeEntry;
use super::swap::SwapPolicy;
use crate::error::{Error, Result};
use crate::util::read_uleb128;

// =============================================================================
// Function Starts
// =============================================================================

/// One function start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionStart {
    /// Offset from the start of `__TEXT`
    pub offset: u64,
    /// Absolute virtual address
    pub address: u64,
}

/// Lazy decoder for LC_FUNCTION_STARTS data.
///
/// The table is a list of ULEB128 deltas; the first is relative to the
/// `__TEXT` segment and a zero delta ends the list.
#[derive(Debug, Clone)]
pub struct FunctionStarts {
    data: Vec<u8>,
    pos: usize,
    text_vmaddr: u64,
    offset: u64,
    done: bool,
}

impl FunctionStarts {
    /// Creates a decoder over raw table bytes.
    pub fn new(data: Vec<u8>, text_vmaddr: u64) -> Self {
        Self {
            data,
            pos: 0,
            text_vmaddr,
            offset: 0,
            done: false,
        }
    }

    /// An empty sequence, for images without the table.
    pub fn empty() -> Self {
        Self::new(Vec::new(), 0)
    }
}

impl Iterator for FunctionStarts {
    type Item = Result<FunctionStart>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pos >= self.data.len() {
            return None;
        }

        let Some((delta, len)) = read_uleb128(&self.data[self.pos..]) else {
            self.done = true;
            return Some(Err(Error::TruncatedOpcodeStream { offset: self.pos }));
        };
        self.pos += len;

        if delta == 0 {
            self.done = true;
            return None;
        }

        self.offset = self.offset.wrapping_add(delta);
        Some(Ok(FunctionStart {
            offset: self.offset,
            address: self.text_vmaddr.wrapping_add(self.offset),
        }))
    }
}

// =============================================================================
// Data In Code
// =============================================================================

/// Kind of a data-in-code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataInCodeKind {
    /// Plain data
    Data,
    /// Jump table of 8-bit entries
    JumpTable8,
    /// Jump table of 16-bit entries
    JumpTable16,
    /// Jump table of 32-bit entries
    JumpTable32,
    /// Absolute jump table of 32-bit entries
    AbsJumpTable32,
    /// Unrecognized kind
    Other(u16),
}

impl From<u16> for DataInCodeKind {
    fn from(kind: u16) -> Self {
        match kind {
            DICE_KIND_DATA => Self::Data,
            DICE_KIND_JUMP_TABLE8 => Self::JumpTable8,
            DICE_KIND_JUMP_TABLE16 => Self::JumpTable16,
            DICE_KIND_JUMP_TABLE32 => Self::JumpTable32,
            DICE_KIND_ABS_JUMP_TABLE32 => Self::AbsJumpTable32,
            other => Self::Other(other),
        }
    }
}

/// One data-in-code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataInCode {
    /// Offset from the Mach-O header
    pub offset: u32,
    /// Length in bytes
    pub length: u16,
    /// What the bytes hold
    pub kind: DataInCodeKind,
}

/// Decodes an LC_DATA_IN_CODE table. Trailing bytes that do not form a
/// whole entry are ignored.
pub fn parse_data_in_code(data: &[u8], policy: SwapPolicy) -> Vec<DataInCode> {
    data.chunks_exact(DataInCodeEntry::SIZE)
        .filter_map(|raw| policy.read::<DataInCodeEntry>(raw))
        .map(|e| DataInCode {
            offset: e.offset,
            length: e.length,
            kind: DataInCodeKind::from(e.kind),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{uleb, Writer};

    #[test]
    fn test_function_starts() {
        let mut data = uleb(0x4a0);
        data.extend(uleb(0x20));
        data.extend(uleb(0x1000));
        data.push(0);
        data.extend([0, 0, 0]);

        let starts: Vec<_> = FunctionStarts::new(data, 0x1_0000_0000)
            .map(|s| s.unwrap())
            .collect();
        assert_eq!(
            starts.iter().map(|s| s.offset).collect::<Vec<_>>(),
            vec![0x4a0, 0x4c0, 0x14c0]
        );
        assert_eq!(starts[0].address, 0x1_0000_04a0);
    }

    #[test]
    fn test_function_starts_truncated() {
        let mut data = uleb(0x10);
        data.push(0x80);
        let results: Vec<_> = FunctionStarts::new(data, 0).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(Error::TruncatedOpcodeStream { offset: 1 })
        ));
        assert_eq!(FunctionStarts::empty().count(), 0);
    }

    #[test]
    fn test_data_in_code() {
        for big_endian in [false, true] {
            let mut w = Writer::new(big_endian);
            w.u32(0x100).u16(8).u16(DICE_KIND_JUMP_TABLE32);
            w.u32(0x200).u16(4).u16(0x77);
            w.u8(0xff);
            let policy = if big_endian == cfg!(target_endian = "big") {
                SwapPolicy::NATIVE
            } else {
                SwapPolicy::SWAPPED
            };
            let entries = parse_data_in_code(&w.finish(), policy);
            assert_eq!(entries.len(), 2);
            assert_eq!(entries[0].offset, 0x100);
            assert_eq!(entries[0].kind, DataInCodeKind::JumpTable32);
            assert_eq!(entries[1].kind, DataInCodeKind::Other(0x77));
        }
    }
}
