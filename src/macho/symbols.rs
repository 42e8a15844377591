//! Symbol table and string table access.

use super::constants::*;
use super::structs::{Nlist32, Nlist64, SymtabCommand};
use super::swap::SwapPolicy;
use crate::error::Result;
use crate::source::ByteSource;

// =============================================================================
// String Table
// =============================================================================

/// The string table referenced by LC_SYMTAB.
///
/// Strings are addressed by byte offset, not by ordinal. Lookups that fail
/// (index out of range, unreadable bytes, invalid UTF-8) yield an empty
/// string and are logged at debug level.
pub struct StringTable<'a, S: ?Sized> {
    source: &'a S,
    offset: u64,
    size: u32,
    max_len: usize,
}

impl<S: ?Sized> Clone for StringTable<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: ?Sized> Copy for StringTable<'_, S> {}

impl<'a, S: ByteSource + ?Sized> StringTable<'a, S> {
    /// Creates a table over `[offset, offset + size)` of `source`.
    pub fn new(source: &'a S, offset: u64, size: u32, max_len: usize) -> Self {
        Self {
            source,
            offset,
            size,
            max_len,
        }
    }

    /// Size of the table in bytes.
    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Returns the string starting at byte `strx`.
    pub fn get(&self, strx: u32) -> String {
        match self.get_bytes(strx) {
            Some(bytes) => match String::from_utf8(bytes) {
                Ok(s) => s,
                Err(_) => {
                    tracing::debug!(strx, "string table entry is not valid UTF-8");
                    String::new()
                }
            },
            None => String::new(),
        }
    }

    /// Returns the raw bytes of the string at `strx`, without the terminator.
    ///
    /// Strings longer than the configured limit are truncated.
    pub fn get_bytes(&self, strx: u32) -> Option<Vec<u8>> {
        if strx >= self.size {
            tracing::debug!(strx, size = self.size, "string index out of range");
            return None;
        }

        let available = (self.size - strx) as usize;
        let limit = available.min(self.max_len);
        let start = self.offset + strx as u64;

        // Most symbol names are short; grow the window only when needed.
        let mut window = limit.min(128);
        loop {
            let bytes = match self.source.read_bytes(start, window) {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::debug!(strx, %err, "string table read failed");
                    return None;
                }
            };
            if let Some(end) = memchr::memchr(0, &bytes) {
                let mut bytes = bytes;
                bytes.truncate(end);
                return Some(bytes);
            }
            if window == limit {
                return Some(bytes);
            }
            window = (window * 4).min(limit);
        }
    }
}

// =============================================================================
// Symbols
// =============================================================================

/// A symbol table entry with its resolved name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Symbol name (empty if it could not be decoded)
    pub name: String,
    /// Index into the string table
    pub strx: u32,
    /// Type byte
    pub n_type: u8,
    /// Section ordinal, or NO_SECT
    pub n_sect: u8,
    /// Description bits
    pub n_desc: u16,
    /// Value (usually an address)
    pub n_value: u64,
}

impl Symbol {
    /// Returns true for a debugging (stab) entry.
    #[inline]
    pub fn is_stab(&self) -> bool {
        self.n_type & N_STAB != 0
    }

    /// Returns the N_TYPE bits.
    #[inline]
    pub fn type_bits(&self) -> u8 {
        self.n_type & N_TYPE
    }

    /// Returns true for an external symbol.
    #[inline]
    pub fn is_external(&self) -> bool {
        self.n_type & N_EXT != 0
    }

    /// Returns true for a private external symbol.
    #[inline]
    pub fn is_private_external(&self) -> bool {
        self.n_type & N_PEXT != 0
    }

    /// Returns true for an undefined symbol.
    #[inline]
    pub fn is_undefined(&self) -> bool {
        !self.is_stab() && self.type_bits() == N_UNDF
    }

    /// Returns true for a weak definition.
    #[inline]
    pub fn is_weak_def(&self) -> bool {
        self.n_desc & N_WEAK_DEF != 0
    }

    /// Returns true for a weak reference.
    #[inline]
    pub fn is_weak_ref(&self) -> bool {
        self.n_desc & N_WEAK_REF != 0
    }

    /// Two-level namespace library ordinal of an undefined symbol.
    #[inline]
    pub fn library_ordinal(&self) -> u8 {
        (self.n_desc >> 8) as u8
    }

    /// One-letter kind in the style of `nm`.
    pub fn nm_kind(&self) -> char {
        let c = match self.type_bits() {
            N_UNDF if self.n_value != 0 => 'c',
            N_UNDF => 'u',
            N_ABS => 'a',
            N_SECT => 's',
            N_PBUD => 'u',
            N_INDR => 'i',
            _ => '?',
        };
        if self.is_external() {
            c.to_ascii_uppercase()
        } else {
            c
        }
    }
}

/// Random access to the symbol table of one image.
pub struct SymbolTable<'a, S: ?Sized> {
    source: &'a S,
    policy: SwapPolicy,
    is_64: bool,
    symoff: u64,
    nsyms: u32,
    strings: StringTable<'a, S>,
}

impl<S: ?Sized> Clone for SymbolTable<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: ?Sized> Copy for SymbolTable<'_, S> {}

impl<'a, S: ByteSource + ?Sized> SymbolTable<'a, S> {
    /// Creates a table from an LC_SYMTAB command.
    ///
    /// `data_base` is added to the command's file offsets.
    pub fn new(
        source: &'a S,
        symtab: &SymtabCommand,
        data_base: u64,
        policy: SwapPolicy,
        is_64: bool,
        max_string_len: usize,
    ) -> Self {
        Self {
            source,
            policy,
            is_64,
            symoff: data_base + symtab.symoff as u64,
            nsyms: symtab.nsyms,
            strings: StringTable::new(
                source,
                data_base + symtab.stroff as u64,
                symtab.strsize,
                max_string_len,
            ),
        }
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.nsyms as usize
    }

    /// Returns true if the table has no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nsyms == 0
    }

    /// The associated string table.
    #[inline]
    pub fn strings(&self) -> StringTable<'a, S> {
        self.strings
    }

    fn entry_size(&self) -> usize {
        if self.is_64 {
            Nlist64::SIZE
        } else {
            Nlist32::SIZE
        }
    }

    /// Reads the entry at `index`, or `None` past the end of the table.
    pub fn get(&self, index: u32) -> Result<Option<Symbol>> {
        if index >= self.nsyms {
            return Ok(None);
        }
        let offset = self.symoff + index as u64 * self.entry_size() as u64;

        let (strx, n_type, n_sect, n_desc, n_value) = if self.is_64 {
            let raw: Nlist64 = self.policy.apply(self.source.read_record(offset)?);
            (raw.n_strx, raw.n_type, raw.n_sect, raw.n_desc, raw.n_value)
        } else {
            let raw: Nlist32 = self.policy.apply(self.source.read_record(offset)?);
            (raw.n_strx, raw.n_type, raw.n_sect, raw.n_desc, raw.n_value as u64)
        };

        Ok(Some(Symbol {
            name: self.strings.get(strx),
            strx,
            n_type,
            n_sect,
            n_desc,
            n_value,
        }))
    }

    /// Iterates over every entry in order.
    pub fn iter(&self) -> Symbols<'a, S> {
        Symbols {
            table: *self,
            index: 0,
            failed: false,
        }
    }
}

/// Lazy iterator over a [`SymbolTable`].
pub struct Symbols<'a, S: ?Sized> {
    table: SymbolTable<'a, S>,
    index: u32,
    failed: bool,
}

impl<S: ByteSource + ?Sized> Iterator for Symbols<'_, S> {
    type Item = Result<Symbol>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.table.get(self.index) {
            Ok(Some(symbol)) => {
                self.index += 1;
                Some(Ok(symbol))
            }
            Ok(None) => None,
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.table.nsyms.saturating_sub(self.index) as usize;
        (0, Some(left))
    }
}
