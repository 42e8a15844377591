//! machread - A read-only decoder for Mach-O binaries and dyld cache images.
//!
//! This library maps raw bytes from a file or dyld shared cache into
//! structured views of Mach-O headers, load commands, symbol tables, dyld
//! fix-up metadata, export tries and code signatures, without involving the
//! platform loader.
//!
//! # Features
//!
//! - Memory-mapped or in-memory byte sources
//! - Native and byte-swapped files, 32-bit and 64-bit
//! - Fat (universal) binaries and single-file dyld shared caches
//! - Lazy, pull-based iteration over load commands, symbols, opcode streams
//!   and export tries
//! - Code signature blobs, always decoded big-endian
//!
//! # Example
//!
//! ```no_run
//! use machread::{BindKind, MachFile, MappedFile};
//!
//! fn main() -> machread::Result<()> {
//!     let file = MachFile::parse(MappedFile::open("/usr/bin/true")?)?;
//!
//!     for dylib in file.dylibs()? {
//!         println!("{} ({})", dylib.dylib.name, dylib.kind.as_str());
//!     }
//!
//!     for bind in file.bind_operations(BindKind::Lazy)? {
//!         println!("{}", bind?.symbol_name);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codesign;
pub mod dyld;
pub mod error;
pub mod limits;
pub mod macho;
pub mod source;
pub mod util;

#[cfg(test)]
mod testutil;

// Re-export main types
pub use codesign::{CodeDirectory, CodeSignature};
pub use dyld::{
    BindKind, BindOperation, DyldCache, ExportedSymbol, ImageEntry, LibraryOrdinal,
    MappingEntry, RebaseOperation,
};
pub use error::{Error, Result};
pub use limits::Limits;
pub use macho::{LoadCommand, MachFile, MachHeader, SwapPolicy};
pub use source::{ByteSource, MappedFile};
