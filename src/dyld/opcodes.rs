//! Rebase and bind opcode interpreters.
//!
//! LC_DYLD_INFO describes load-time fix-ups as compact byte-code programs.
//! Each opcode byte carries an operation in its high nibble and an immediate
//! in its low nibble; larger operands follow as ULEB128/SLEB128 values.
//!
//! The interpreters here are lazy iterators: every pulled item runs the
//! program until the next emitted operation. An error (truncated operand,
//! unknown opcode, a repeat that runs off its segment) is yielded once and
//! the iterator then stops; operations already yielded stay valid.

use crate::error::{Error, Result};
use crate::util::{c_str_bytes, read_sleb128, read_uleb128};

// =============================================================================
// Opcode Constants
// =============================================================================

/// Rebase opcodes.
#[allow(missing_docs)]
pub mod rebase_opcodes {
    pub const REBASE_OPCODE_DONE: u8 = 0x00;
    pub const REBASE_OPCODE_SET_TYPE_IMM: u8 = 0x10;
    pub const REBASE_OPCODE_SET_SEGMENT_AND_OFFSET_ULEB: u8 = 0x20;
    pub const REBASE_OPCODE_ADD_ADDR_ULEB: u8 = 0x30;
    pub const REBASE_OPCODE_ADD_ADDR_IMM_SCALED: u8 = 0x40;
    pub const REBASE_OPCODE_DO_REBASE_IMM_TIMES: u8 = 0x50;
    pub const REBASE_OPCODE_DO_REBASE_ULEB_TIMES: u8 = 0x60;
    pub const REBASE_OPCODE_DO_REBASE_ADD_ADDR_ULEB: u8 = 0x70;
    pub const REBASE_OPCODE_DO_REBASE_ULEB_TIMES_SKIPPING_ULEB: u8 = 0x80;

    pub const REBASE_IMMEDIATE_MASK: u8 = 0x0F;
    pub const REBASE_OPCODE_MASK: u8 = 0xF0;
}

/// Bind opcodes.
#[allow(missing_docs)]
pub mod bind_opcodes {
    /// Terminates a binding sequence.
    pub const BIND_OPCODE_DONE: u8 = 0x00;
    pub const BIND_OPCODE_SET_DYLIB_ORDINAL_IMM: u8 = 0x10;
    pub const BIND_OPCODE_SET_DYLIB_ORDINAL_ULEB: u8 = 0x20;
    pub const BIND_OPCODE_SET_DYLIB_SPECIAL_IMM: u8 = 0x30;
    pub const BIND_OPCODE_SET_SYMBOL_TRAILING_FLAGS_IMM: u8 = 0x40;
    pub const BIND_OPCODE_SET_TYPE_IMM: u8 = 0x50;
    pub const BIND_OPCODE_SET_ADDEND_SLEB: u8 = 0x60;
    pub const BIND_OPCODE_SET_SEGMENT_AND_OFFSET_ULEB: u8 = 0x70;
    pub const BIND_OPCODE_ADD_ADDR_ULEB: u8 = 0x80;
    pub const BIND_OPCODE_DO_BIND: u8 = 0x90;
    pub const BIND_OPCODE_DO_BIND_ADD_ADDR_ULEB: u8 = 0xA0;
    pub const BIND_OPCODE_DO_BIND_ADD_ADDR_IMM_SCALED: u8 = 0xB0;
    pub const BIND_OPCODE_DO_BIND_ULEB_TIMES_SKIPPING_ULEB: u8 = 0xC0;
    pub const BIND_OPCODE_THREADED: u8 = 0xD0;

    pub const BIND_SUBOPCODE_THREADED_SET_BIND_ORDINAL_TABLE_SIZE_ULEB: u8 = 0x00;
    pub const BIND_SUBOPCODE_THREADED_APPLY: u8 = 0x01;

    pub const BIND_IMMEDIATE_MASK: u8 = 0x0F;
    pub const BIND_OPCODE_MASK: u8 = 0xF0;

    pub const BIND_SYMBOL_FLAGS_WEAK_IMPORT: u8 = 0x1;
    pub const BIND_SYMBOL_FLAGS_NON_WEAK_DEFINITION: u8 = 0x8;
}

// =============================================================================
// Shared Types
// =============================================================================

/// What a rebased or bound slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixupType {
    /// A pointer-sized slot
    Pointer,
    /// A 32-bit absolute address in text
    TextAbsolute32,
    /// A 32-bit PC-relative address in text
    TextPcrel32,
    /// Any other type value
    Other(u8),
}

impl From<u8> for FixupType {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Pointer,
            2 => Self::TextAbsolute32,
            3 => Self::TextPcrel32,
            other => Self::Other(other),
        }
    }
}

impl FixupType {
    /// Short lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pointer => "pointer",
            Self::TextAbsolute32 => "text abs32",
            Self::TextPcrel32 => "text rel32",
            Self::Other(_) => "other",
        }
    }
}

/// Which bind stream an operation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindKind {
    /// Non-lazy binds
    Normal,
    /// Weak binds (coalesced at load time)
    Weak,
    /// Lazy binds (resolved on first call)
    Lazy,
}

impl BindKind {
    /// Short lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Weak => "weak",
            Self::Lazy => "lazy",
        }
    }
}

/// Library a bound symbol is looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LibraryOrdinal {
    /// The image itself (ordinal 0)
    SelfImage,
    /// A 1-based index into the image's dylib load commands
    Dylib(u64),
    /// The main executable (-1)
    MainExecutable,
    /// Flat namespace lookup (-2)
    FlatLookup,
    /// Weak definition lookup (-3)
    WeakLookup,
    /// Any other negative special value
    Special(i64),
}

impl LibraryOrdinal {
    fn from_special(value: i64) -> Self {
        match value {
            0 => Self::SelfImage,
            -1 => Self::MainExecutable,
            -2 => Self::FlatLookup,
            -3 => Self::WeakLookup,
            other => Self::Special(other),
        }
    }

    fn from_unsigned(value: u64) -> Self {
        if value == 0 {
            Self::SelfImage
        } else {
            Self::Dylib(value)
        }
    }

    /// Raw ordinal value as dyld stores it.
    pub fn value(self) -> i64 {
        match self {
            Self::SelfImage => 0,
            Self::Dylib(n) => n as i64,
            Self::MainExecutable => -1,
            Self::FlatLookup => -2,
            Self::WeakLookup => -3,
            Self::Special(v) => v,
        }
    }
}

/// A reconstructed rebase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebaseOperation {
    /// Index of the segment load command
    pub segment_index: u8,
    /// Offset of the slot within the segment
    pub segment_offset: u64,
    /// Kind of slot
    pub rebase_type: FixupType,
}

/// A reconstructed bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindOperation {
    /// Index of the segment load command
    pub segment_index: u8,
    /// Offset of the slot within the segment
    pub segment_offset: u64,
    /// Imported symbol name
    pub symbol_name: String,
    /// BIND_SYMBOL_FLAGS_* bits
    pub symbol_flags: u8,
    /// Library the symbol is looked up in
    pub library_ordinal: LibraryOrdinal,
    /// Value added to the resolved address
    pub addend: i64,
    /// Kind of slot
    pub bind_type: FixupType,
    /// Stream the operation came from
    pub kind: BindKind,
}

/// A pending repeated operation.
#[derive(Debug, Clone, Copy, Default)]
struct Repeat {
    count: u64,
    skip: u64,
}

/// Default cap on a single repeat count when segment sizes are unknown.
pub const DEFAULT_MAX_OPCODE_REPEAT: u64 = 1 << 24;

/// Bounds on repeat opcodes: a fixed count cap, plus the size of each
/// segment when the caller knows them.
#[derive(Debug, Clone)]
struct RepeatBound {
    max_count: u64,
    segment_sizes: Vec<u64>,
}

impl Default for RepeatBound {
    fn default() -> Self {
        Self {
            max_count: DEFAULT_MAX_OPCODE_REPEAT,
            segment_sizes: Vec::new(),
        }
    }
}

impl RepeatBound {
    /// Validates a repeat starting at `segment_offset` whose slots are
    /// `pointer_size` wide and `pointer_size + skip` apart.
    fn check(
        &self,
        repeat: Repeat,
        pointer_size: u64,
        segment_index: u8,
        segment_offset: u64,
        opcode_offset: usize,
        opcode: u8,
    ) -> Result<Repeat> {
        let invalid = || Error::InvalidOpcode {
            offset: opcode_offset,
            opcode,
        };
        if repeat.count > self.max_count {
            tracing::debug!(count = repeat.count, max = self.max_count, "opcode repeat over limit");
            return Err(invalid());
        }
        if repeat.count == 0 {
            return Ok(repeat);
        }
        let Some(&size) = self.segment_sizes.get(segment_index as usize) else {
            return Ok(repeat);
        };
        let end = pointer_size
            .checked_add(repeat.skip)
            .and_then(|stride| stride.checked_mul(repeat.count - 1))
            .and_then(|span| span.checked_add(segment_offset))
            .and_then(|last| last.checked_add(pointer_size));
        match end {
            Some(end) if end <= size => Ok(repeat),
            _ => {
                tracing::debug!(
                    segment = segment_index,
                    offset = segment_offset,
                    count = repeat.count,
                    size,
                    "opcode repeat runs past its segment"
                );
                Err(invalid())
            }
        }
    }
}

// =============================================================================
// Opcode Reader
// =============================================================================

/// Bounds-checked reader over an owned opcode stream.
#[derive(Debug, Clone, Default)]
struct OpcodeReader {
    data: Vec<u8>,
    pos: usize,
}

impl OpcodeReader {
    fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn byte(&mut self) -> Option<u8> {
        let b = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn uleb(&mut self) -> Result<u64> {
        let (value, len) = self
            .data
            .get(self.pos..)
            .and_then(read_uleb128)
            .ok_or(Error::TruncatedOpcodeStream { offset: self.pos })?;
        self.pos += len;
        Ok(value)
    }

    fn sleb(&mut self) -> Result<i64> {
        let (value, len) = self
            .data
            .get(self.pos..)
            .and_then(read_sleb128)
            .ok_or(Error::TruncatedOpcodeStream { offset: self.pos })?;
        self.pos += len;
        Ok(value)
    }

    /// Reads an inline symbol name. Invalid UTF-8 degrades to an empty name.
    fn symbol_name(&mut self) -> Result<String> {
        let tail = self.data.get(self.pos..).unwrap_or_default();
        let (bytes, terminated) = c_str_bytes(tail);
        if !terminated {
            return Err(Error::TruncatedOpcodeStream { offset: self.data.len() });
        }
        let name = match std::str::from_utf8(bytes) {
            Ok(name) => name.to_string(),
            Err(_) => {
                tracing::debug!(offset = self.pos, "bind symbol name is not valid UTF-8");
                String::new()
            }
        };
        self.pos += bytes.len() + 1;
        Ok(name)
    }
}

// =============================================================================
// Rebase Interpreter
// =============================================================================

/// Lazy interpreter for a rebase opcode stream.
#[derive(Debug, Clone)]
pub struct RebaseOperations {
    reader: OpcodeReader,
    pointer_size: u64,
    segment_index: u8,
    segment_offset: u64,
    rebase_type: u8,
    repeat: Repeat,
    bound: RepeatBound,
    finished: bool,
}

impl RebaseOperations {
    /// Creates an interpreter over `data` for an image with the given
    /// pointer size (4 or 8).
    pub fn new(data: Vec<u8>, pointer_size: u64) -> Self {
        Self {
            reader: OpcodeReader { data, pos: 0 },
            pointer_size,
            segment_index: 0,
            segment_offset: 0,
            rebase_type: 0,
            repeat: Repeat::default(),
            bound: RepeatBound::default(),
            finished: false,
        }
    }

    /// Rejects repeats that run past the end of their segment. `sizes` holds
    /// the vmsize of each segment in load command order.
    pub fn with_segment_sizes(mut self, sizes: Vec<u64>) -> Self {
        self.bound.segment_sizes = sizes;
        self
    }

    /// Caps the count of any single repeat opcode.
    pub fn with_max_repeat(mut self, max: u64) -> Self {
        self.bound.max_count = max;
        self
    }

    fn start_repeat(&mut self, repeat: Repeat, opcode_offset: usize, opcode: u8) -> Result<()> {
        self.repeat = self.bound.check(
            repeat,
            self.pointer_size,
            self.segment_index,
            self.segment_offset,
            opcode_offset,
            opcode,
        )?;
        Ok(())
    }

    /// An empty sequence, for images without rebase info.
    pub fn empty() -> Self {
        Self::new(Vec::new(), 8)
    }

    fn current(&self) -> RebaseOperation {
        RebaseOperation {
            segment_index: self.segment_index,
            segment_offset: self.segment_offset,
            rebase_type: FixupType::from(self.rebase_type),
        }
    }

    fn step(&mut self) -> Result<Option<RebaseOperation>> {
        use rebase_opcodes::*;

        loop {
            if self.repeat.count > 0 {
                self.repeat.count -= 1;
                let op = self.current();
                self.segment_offset = self
                    .segment_offset
                    .wrapping_add(self.pointer_size)
                    .wrapping_add(self.repeat.skip);
                return Ok(Some(op));
            }

            let opcode_offset = self.reader.pos;
            let Some(byte) = self.reader.byte() else {
                tracing::trace!("rebase opcodes ended without REBASE_OPCODE_DONE");
                return Ok(None);
            };
            let immediate = byte & REBASE_IMMEDIATE_MASK;

            match byte & REBASE_OPCODE_MASK {
                REBASE_OPCODE_DONE => return Ok(None),

                REBASE_OPCODE_SET_TYPE_IMM => self.rebase_type = immediate,

                REBASE_OPCODE_SET_SEGMENT_AND_OFFSET_ULEB => {
                    self.segment_index = immediate;
                    self.segment_offset = self.reader.uleb()?;
                }

                REBASE_OPCODE_ADD_ADDR_ULEB => {
                    let delta = self.reader.uleb()?;
                    self.segment_offset = self.segment_offset.wrapping_add(delta);
                }

                REBASE_OPCODE_ADD_ADDR_IMM_SCALED => {
                    self.segment_offset = self
                        .segment_offset
                        .wrapping_add(immediate as u64 * self.pointer_size);
                }

                REBASE_OPCODE_DO_REBASE_IMM_TIMES => {
                    let repeat = Repeat {
                        count: immediate as u64,
                        skip: 0,
                    };
                    self.start_repeat(repeat, opcode_offset, byte)?;
                }

                REBASE_OPCODE_DO_REBASE_ULEB_TIMES => {
                    let repeat = Repeat {
                        count: self.reader.uleb()?,
                        skip: 0,
                    };
                    self.start_repeat(repeat, opcode_offset, byte)?;
                }

                REBASE_OPCODE_DO_REBASE_ADD_ADDR_ULEB => {
                    let delta = self.reader.uleb()?;
                    let op = self.current();
                    self.segment_offset = self
                        .segment_offset
                        .wrapping_add(self.pointer_size)
                        .wrapping_add(delta);
                    return Ok(Some(op));
                }

                REBASE_OPCODE_DO_REBASE_ULEB_TIMES_SKIPPING_ULEB => {
                    let count = self.reader.uleb()?;
                    let skip = self.reader.uleb()?;
                    self.start_repeat(Repeat { count, skip }, opcode_offset, byte)?;
                }

                _ => {
                    return Err(Error::InvalidOpcode {
                        offset: opcode_offset,
                        opcode: byte,
                    })
                }
            }
        }
    }
}

impl Iterator for RebaseOperations {
    type Item = Result<RebaseOperation>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.step() {
            Ok(Some(op)) => Some(Ok(op)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

// =============================================================================
// Bind Interpreter
// =============================================================================

/// Lazy interpreter for a bind, weak-bind or lazy-bind opcode stream.
///
/// Lazy-bind streams are a sequence of independent entries, each closed by
/// BIND_OPCODE_DONE. For [`BindKind::Lazy`] the interpreter treats DONE as an
/// entry separator: it resets the per-entry registers and keeps going until
/// the end of the stream.
#[derive(Debug, Clone)]
pub struct BindOperations {
    reader: OpcodeReader,
    kind: BindKind,
    pointer_size: u64,
    segment_index: u8,
    segment_offset: u64,
    symbol_name: String,
    symbol_flags: u8,
    library_ordinal: LibraryOrdinal,
    addend: i64,
    bind_type: u8,
    repeat: Repeat,
    bound: RepeatBound,
    finished: bool,
}

impl BindOperations {
    /// Creates an interpreter over `data`.
    pub fn new(data: Vec<u8>, kind: BindKind, pointer_size: u64) -> Self {
        Self {
            reader: OpcodeReader { data, pos: 0 },
            kind,
            pointer_size,
            segment_index: 0,
            segment_offset: 0,
            symbol_name: String::new(),
            symbol_flags: 0,
            library_ordinal: LibraryOrdinal::SelfImage,
            addend: 0,
            bind_type: 1,
            repeat: Repeat::default(),
            bound: RepeatBound::default(),
            finished: false,
        }
    }

    /// Rejects repeats that run past the end of their segment. `sizes` holds
    /// the vmsize of each segment in load command order.
    pub fn with_segment_sizes(mut self, sizes: Vec<u64>) -> Self {
        self.bound.segment_sizes = sizes;
        self
    }

    /// Caps the count of any single repeat opcode.
    pub fn with_max_repeat(mut self, max: u64) -> Self {
        self.bound.max_count = max;
        self
    }

    /// An empty sequence, for images without this kind of bind info.
    pub fn empty(kind: BindKind) -> Self {
        Self::new(Vec::new(), kind, 8)
    }

    /// Resets the registers a lazy-bind entry may leave implicit.
    fn reset_entry(&mut self) {
        self.segment_index = 0;
        self.segment_offset = 0;
        self.symbol_name.clear();
        self.symbol_flags = 0;
        self.library_ordinal = LibraryOrdinal::SelfImage;
        self.addend = 0;
        self.bind_type = 1;
    }

    fn current(&self) -> BindOperation {
        BindOperation {
            segment_index: self.segment_index,
            segment_offset: self.segment_offset,
            symbol_name: self.symbol_name.clone(),
            symbol_flags: self.symbol_flags,
            library_ordinal: self.library_ordinal,
            addend: self.addend,
            bind_type: FixupType::from(self.bind_type),
            kind: self.kind,
        }
    }

    /// Emits the current bind and advances past the slot plus `extra` bytes.
    fn emit(&mut self, extra: u64) -> BindOperation {
        let op = self.current();
        self.segment_offset = self
            .segment_offset
            .wrapping_add(self.pointer_size)
            .wrapping_add(extra);
        op
    }

    fn step(&mut self) -> Result<Option<BindOperation>> {
        use bind_opcodes::*;

        loop {
            if self.repeat.count > 0 {
                self.repeat.count -= 1;
                return Ok(Some(self.emit(self.repeat.skip)));
            }

            let opcode_offset = self.reader.pos;
            let Some(byte) = self.reader.byte() else {
                if self.kind != BindKind::Lazy {
                    tracing::trace!(kind = self.kind.as_str(), "bind opcodes ended without BIND_OPCODE_DONE");
                }
                return Ok(None);
            };
            let immediate = byte & BIND_IMMEDIATE_MASK;

            match byte & BIND_OPCODE_MASK {
                BIND_OPCODE_DONE => {
                    if self.kind != BindKind::Lazy {
                        return Ok(None);
                    }
                    self.reset_entry();
                    if self.reader.is_at_end() {
                        return Ok(None);
                    }
                }

                BIND_OPCODE_SET_DYLIB_ORDINAL_IMM => {
                    self.library_ordinal = LibraryOrdinal::from_unsigned(immediate as u64);
                }

                BIND_OPCODE_SET_DYLIB_ORDINAL_ULEB => {
                    self.library_ordinal = LibraryOrdinal::from_unsigned(self.reader.uleb()?);
                }

                BIND_OPCODE_SET_DYLIB_SPECIAL_IMM => {
                    // Special ordinals are sign-extended from the low nibble.
                    let value = if immediate == 0 {
                        0
                    } else {
                        (BIND_OPCODE_MASK | immediate) as i8 as i64
                    };
                    self.library_ordinal = LibraryOrdinal::from_special(value);
                }

                BIND_OPCODE_SET_SYMBOL_TRAILING_FLAGS_IMM => {
                    self.symbol_flags = immediate;
                    self.symbol_name = self.reader.symbol_name()?;
                }

                BIND_OPCODE_SET_TYPE_IMM => self.bind_type = immediate,

                BIND_OPCODE_SET_ADDEND_SLEB => self.addend = self.reader.sleb()?,

                BIND_OPCODE_SET_SEGMENT_AND_OFFSET_ULEB => {
                    self.segment_index = immediate;
                    self.segment_offset = self.reader.uleb()?;
                }

                BIND_OPCODE_ADD_ADDR_ULEB => {
                    let delta = self.reader.uleb()?;
                    self.segment_offset = self.segment_offset.wrapping_add(delta);
                }

                BIND_OPCODE_DO_BIND => return Ok(Some(self.emit(0))),

                BIND_OPCODE_DO_BIND_ADD_ADDR_ULEB => {
                    let delta = self.reader.uleb()?;
                    return Ok(Some(self.emit(delta)));
                }

                BIND_OPCODE_DO_BIND_ADD_ADDR_IMM_SCALED => {
                    let extra = immediate as u64 * self.pointer_size;
                    return Ok(Some(self.emit(extra)));
                }

                BIND_OPCODE_DO_BIND_ULEB_TIMES_SKIPPING_ULEB => {
                    let count = self.reader.uleb()?;
                    let skip = self.reader.uleb()?;
                    self.repeat = self.bound.check(
                        Repeat { count, skip },
                        self.pointer_size,
                        self.segment_index,
                        self.segment_offset,
                        opcode_offset,
                        byte,
                    )?;
                }

                BIND_OPCODE_THREADED => match immediate {
                    BIND_SUBOPCODE_THREADED_SET_BIND_ORDINAL_TABLE_SIZE_ULEB => {
                        let size = self.reader.uleb()?;
                        tracing::debug!(size, "threaded bind ordinal table");
                    }
                    BIND_SUBOPCODE_THREADED_APPLY => {
                        // The chain lives in segment data, not in this stream.
                        tracing::debug!(
                            segment = self.segment_index,
                            offset = self.segment_offset,
                            "skipping threaded bind apply"
                        );
                    }
                    _ => {
                        return Err(Error::InvalidOpcode {
                            offset: opcode_offset,
                            opcode: byte,
                        })
                    }
                },

                _ => {
                    return Err(Error::InvalidOpcode {
                        offset: opcode_offset,
                        opcode: byte,
                    })
                }
            }
        }
    }
}

impl Iterator for BindOperations {
    type Item = Result<BindOperation>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.step() {
            Ok(Some(op)) => Some(Ok(op)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}
