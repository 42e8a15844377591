//! Decoder limits for untrusted input.

/// Bounds applied while decoding structures that can nest or loop.
///
/// Attach to a file with [`MachFile::with_limits`](crate::MachFile::with_limits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of edges followed from the export trie root
    pub max_trie_depth: usize,
    /// Maximum super blob nesting in a code signature (top level counts as 1)
    pub max_blob_nesting: usize,
    /// Maximum bytes scanned for one string table entry
    pub max_string_len: usize,
    /// Maximum count of one rebase or bind repeat opcode
    pub max_opcode_repeat: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_trie_depth: 128,
            max_blob_nesting: 2,
            max_string_len: 4096,
            max_opcode_repeat: crate::dyld::DEFAULT_MAX_OPCODE_REPEAT,
        }
    }
}
