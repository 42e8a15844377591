//! Dyld-specific formats.
//!
//! This module decodes the structures the dynamic linker consumes:
//! - Rebase and bind opcode streams from `LC_DYLD_INFO`
//! - The export trie
//! - Single-file dyld shared caches, whose images open as
//!   [`MachFile`](crate::MachFile)s

mod cache;
mod opcodes;
pub mod trie;

pub use cache::*;
pub use opcodes::*;
pub use trie::{ExportFlags, ExportTarget, ExportWalker, ExportedSymbol};
