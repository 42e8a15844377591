//! Export trie parsing.
//!
//! The export trie is a compact representation of exported symbols in a Mach-O file.
//! It uses a trie (prefix tree) structure where each node can contain:
//! - Terminal information (flags, address, optional other value)
//! - Children edges (label prefix + offset to child node)
//!
//! Walking is iterative over an explicit stack. A visited-offset set and a
//! depth bound stop malformed tries that loop back on themselves; a bad node
//! is reported once and its subtree is skipped.

use std::collections::HashSet;

use bitflags::bitflags;

use crate::error::{Error, Result};
use crate::util::Cursor;

// =============================================================================
// Export Flags
// =============================================================================

/// Export symbol kind mask.
pub const EXPORT_SYMBOL_FLAGS_KIND_MASK: u64 = 0x03;

bitflags! {
    /// Flags of a terminal trie node.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ExportFlags: u64 {
        /// Thread-local variable
        const KIND_THREAD_LOCAL = 0x01;
        /// Absolute symbol (not relative to the image base)
        const KIND_ABSOLUTE = 0x02;
        /// Weak definition
        const WEAK_DEFINITION = 0x04;
        /// Re-export from another dylib
        const REEXPORT = 0x08;
        /// Stub and resolver
        const STUB_AND_RESOLVER = 0x10;
        /// Static resolver
        const STATIC_RESOLVER = 0x20;
    }
}

impl ExportFlags {
    /// Returns a short label for the kind bits.
    pub fn kind_name(self) -> &'static str {
        match self.bits() & EXPORT_SYMBOL_FLAGS_KIND_MASK {
            0x00 => "regular",
            0x01 => "thread-local",
            0x02 => "absolute",
            _ => "unknown",
        }
    }
}

// =============================================================================
// Export Info
// =============================================================================

/// Where an exported symbol resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportTarget {
    /// Defined in this image
    Regular {
        /// Address relative to the image base
        address: u64,
    },
    /// Re-exported from a dependency
    Reexport {
        /// 1-based dylib ordinal
        library_ordinal: u64,
        /// Name in the source dylib, when it differs
        import_name: Option<String>,
    },
    /// Lazily resolved through a stub
    StubAndResolver {
        /// Stub offset relative to the image base
        stub_offset: u64,
        /// Resolver offset relative to the image base
        resolver_offset: u64,
    },
}

/// A symbol recovered from the export trie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedSymbol {
    /// Concatenated edge labels from the root
    pub name: String,
    /// Terminal flags
    pub flags: ExportFlags,
    /// Resolution target
    pub target: ExportTarget,
    /// Number of edges from the root
    pub depth: usize,
}

impl ExportedSymbol {
    /// Address of the symbol (the stub for stub-and-resolver exports).
    pub fn address(&self) -> Option<u64> {
        match self.target {
            ExportTarget::Regular { address } => Some(address),
            ExportTarget::StubAndResolver { stub_offset, .. } => Some(stub_offset),
            ExportTarget::Reexport { .. } => None,
        }
    }

    /// Returns true if this is a re-export.
    #[inline]
    pub fn is_reexport(&self) -> bool {
        matches!(self.target, ExportTarget::Reexport { .. })
    }

    /// Returns true if this is a weak definition.
    #[inline]
    pub fn is_weak(&self) -> bool {
        self.flags.contains(ExportFlags::WEAK_DEFINITION)
    }
}

// =============================================================================
// Node Decoding
// =============================================================================

/// A decoded trie node.
struct Node<'a> {
    terminal: Option<(ExportFlags, ExportTarget)>,
    edges: Vec<(&'a [u8], usize)>,
}

fn malformed(offset: usize, reason: &'static str) -> Error {
    Error::MalformedExportTrie { offset, reason }
}

fn parse_terminal(data: &[u8], pos: usize) -> Result<(ExportFlags, ExportTarget)> {
    let mut cursor = Cursor::new(data, pos);
    let truncated = || malformed(pos, "truncated terminal info");

    let flags = ExportFlags::from_bits_retain(cursor.uleb().ok_or_else(truncated)?);

    let target = if flags.contains(ExportFlags::REEXPORT) {
        let library_ordinal = cursor.uleb().ok_or_else(truncated)?;
        let import = cursor.c_str().ok_or_else(truncated)?;
        ExportTarget::Reexport {
            library_ordinal,
            import_name: (!import.is_empty()).then(|| String::from_utf8_lossy(import).into_owned()),
        }
    } else if flags.contains(ExportFlags::STUB_AND_RESOLVER) {
        ExportTarget::StubAndResolver {
            stub_offset: cursor.uleb().ok_or_else(truncated)?,
            resolver_offset: cursor.uleb().ok_or_else(truncated)?,
        }
    } else {
        ExportTarget::Regular {
            address: cursor.uleb().ok_or_else(truncated)?,
        }
    };

    Ok((flags, target))
}

fn parse_node(data: &[u8], offset: usize) -> Result<Node<'_>> {
    if offset >= data.len() {
        return Err(malformed(offset, "node offset out of range"));
    }

    let mut cursor = Cursor::new(data, offset);
    let terminal_size = cursor
        .uleb()
        .ok_or_else(|| malformed(offset, "truncated terminal size"))?;

    let terminal_start = cursor.pos();
    let children_start = usize::try_from(terminal_size)
        .ok()
        .and_then(|size| terminal_start.checked_add(size))
        .filter(|&end| end <= data.len())
        .ok_or_else(|| malformed(offset, "terminal info overruns trie"))?;

    let terminal = if terminal_size > 0 {
        // Terminal info must not read into the child table.
        Some(parse_terminal(&data[..children_start], terminal_start)?)
    } else {
        None
    };

    let mut cursor = Cursor::new(data, children_start);
    // A node at the very end of the data has no child table.
    let child_count = cursor.u8().unwrap_or(0);

    let mut edges = Vec::with_capacity(child_count as usize);
    for _ in 0..child_count {
        let label = cursor
            .c_str()
            .ok_or_else(|| malformed(offset, "unterminated edge label"))?;
        let child = cursor
            .uleb()
            .ok_or_else(|| malformed(offset, "truncated child offset"))?;
        let child = usize::try_from(child)
            .ok()
            .filter(|&c| c != 0 && c < data.len())
            .ok_or_else(|| malformed(offset, "child offset out of range"))?;
        edges.push((label, child));
    }

    Ok(Node { terminal, edges })
}

// =============================================================================
// Walker
// =============================================================================

struct Frame {
    offset: usize,
    prefix: Vec<u8>,
    depth: usize,
}

/// Depth-first iterator over every exported symbol of a trie.
///
/// Yields symbols in edge order. A malformed node yields one error and the
/// walk continues with its siblings.
pub struct ExportWalker<D> {
    data: D,
    stack: Vec<Frame>,
    visited: HashSet<usize>,
    max_depth: usize,
}

impl<D: AsRef<[u8]>> ExportWalker<D> {
    /// Creates a walker over serialized trie bytes.
    pub fn new(data: D, max_depth: usize) -> Self {
        let stack = if data.as_ref().is_empty() {
            Vec::new()
        } else {
            vec![Frame {
                offset: 0,
                prefix: Vec::new(),
                depth: 0,
            }]
        };
        Self {
            data,
            stack,
            visited: HashSet::new(),
            max_depth,
        }
    }
}

impl<D: AsRef<[u8]>> Iterator for ExportWalker<D> {
    type Item = Result<ExportedSymbol>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.pop()?;

            if frame.depth > self.max_depth {
                tracing::debug!(offset = frame.offset, "export trie too deep, skipping subtree");
                return Some(Err(malformed(frame.offset, "maximum trie depth exceeded")));
            }
            if !self.visited.insert(frame.offset) {
                tracing::debug!(offset = frame.offset, "export trie cycle, skipping subtree");
                return Some(Err(malformed(frame.offset, "node visited twice")));
            }

            let node = match parse_node(self.data.as_ref(), frame.offset) {
                Ok(node) => node,
                Err(err) => {
                    tracing::debug!(%err, "skipping malformed export trie node");
                    return Some(Err(err));
                }
            };

            // Reverse so the first edge is walked first.
            for (label, child) in node.edges.iter().rev() {
                let mut prefix = Vec::with_capacity(frame.prefix.len() + label.len());
                prefix.extend_from_slice(&frame.prefix);
                prefix.extend_from_slice(label);
                self.stack.push(Frame {
                    offset: *child,
                    prefix,
                    depth: frame.depth + 1,
                });
            }

            if let Some((flags, target)) = node.terminal {
                return Some(Ok(ExportedSymbol {
                    name: String::from_utf8_lossy(&frame.prefix).into_owned(),
                    flags,
                    target,
                    depth: frame.depth,
                }));
            }
        }
    }
}

/// Looks up a single symbol by name.
///
/// Follows the one edge whose label prefixes the remaining name at each
/// node, so only the nodes on the path are decoded.
pub fn lookup(data: &[u8], name: &str, max_depth: usize) -> Result<Option<ExportedSymbol>> {
    if data.is_empty() {
        return Ok(None);
    }

    let name_bytes = name.as_bytes();
    let mut offset = 0usize;
    let mut matched = 0usize;

    for depth in 0..=max_depth {
        let node = parse_node(data, offset)?;

        if matched == name_bytes.len() {
            return Ok(node.terminal.map(|(flags, target)| ExportedSymbol {
                name: name.to_string(),
                flags,
                target,
                depth,
            }));
        }

        let remaining = &name_bytes[matched..];
        let Some(&(label, child)) = node
            .edges
            .iter()
            .find(|(label, _)| !label.is_empty() && remaining.starts_with(label))
        else {
            return Ok(None);
        };

        matched += label.len();
        offset = child;
    }

    Err(malformed(offset, "maximum trie depth exceeded"))
}
