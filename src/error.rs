//! Error types for Mach-O decoding.
//!
//! Every accessor on a [`MachFile`](crate::MachFile) is independently fallible.
//! Structures that are simply absent (no symbol table, no code signature) are
//! reported as `None` or an empty sequence, never as an error.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for decoding operations.
#[derive(Error, Debug)]
pub enum Error {
    // ==================== I/O Errors ====================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to open file '{path}': {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to memory map file '{path}': {source}")]
    MemoryMap {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("read of {len} bytes at offset {offset:#x} is out of bounds (size: {size:#x})")]
    OutOfBounds { offset: u64, len: usize, size: u64 },

    // ==================== Mach-O Errors ====================
    #[error("invalid Mach-O magic: {0:#x}")]
    InvalidMagic(u32),

    #[error("malformed load commands at offset {offset:#x}: {reason}")]
    MalformedLoadCommands { offset: u64, reason: String },

    // ==================== Dyld Info Errors ====================
    #[error("opcode stream truncated at offset {offset:#x}")]
    TruncatedOpcodeStream { offset: usize },

    #[error("invalid opcode {opcode:#04x} at offset {offset:#x}")]
    InvalidOpcode { offset: usize, opcode: u8 },

    #[error("malformed export trie at offset {offset:#x}: {reason}")]
    MalformedExportTrie { offset: usize, reason: &'static str },

    // ==================== Code Signature Errors ====================
    #[error("malformed code signature at offset {offset:#x}: {reason}")]
    MalformedCodeSignature { offset: usize, reason: String },

    // ==================== Container Errors ====================
    #[error("invalid fat header magic: {0:#x}")]
    InvalidFatMagic(u32),

    #[error("no slice for architecture '{arch}'")]
    ArchNotFound { arch: String },

    #[error("invalid dyld cache magic: expected 'dyld', got {0:?}")]
    InvalidCacheMagic([u8; 4]),

    #[error("address {addr:#x} not found in any cache mapping")]
    AddressNotFound { addr: u64 },

    #[error("image not found: {name}")]
    ImageNotFound { name: String },
}

/// A specialized Result type for decoding operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns true if this error is confined to one sub-structure.
    ///
    /// A bad trie node or a truncated bind stream does not invalidate the
    /// header or any other accessor of the same file.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::MalformedLoadCommands { .. }
                | Error::TruncatedOpcodeStream { .. }
                | Error::InvalidOpcode { .. }
                | Error::MalformedExportTrie { .. }
                | Error::MalformedCodeSignature { .. }
        )
    }

    /// Creates a malformed load commands error.
    #[inline]
    pub fn malformed_commands(offset: u64, reason: impl Into<String>) -> Self {
        Error::MalformedLoadCommands {
            offset,
            reason: reason.into(),
        }
    }

    /// Creates a malformed code signature error.
    #[inline]
    pub fn malformed_signature(offset: usize, reason: impl Into<String>) -> Self {
        Error::MalformedCodeSignature {
            offset,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable() {
        assert!(Error::TruncatedOpcodeStream { offset: 3 }.is_recoverable());
        assert!(Error::malformed_commands(0x20, "zero size").is_recoverable());
        assert!(!Error::InvalidMagic(0xdeadbeef).is_recoverable());
    }

    #[test]
    fn test_display() {
        let err = Error::InvalidMagic(0x12345678);
        assert_eq!(err.to_string(), "invalid Mach-O magic: 0x12345678");
    }
}
