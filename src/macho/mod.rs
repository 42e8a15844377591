//! Mach-O file format handling.
//!
//! This module provides the on-disk records, the header and load command
//! decoders, symbol and string tables, and [`MachFile`], the entry point that
//! ties them together over a [`ByteSource`](crate::ByteSource).

mod constants;
mod fat;
mod file;
mod header;
mod linkedit;
mod load_command;
mod structs;
mod swap;
mod symbols;
mod version;

pub use constants::*;
pub use fat::*;
pub use file::*;
pub use header::*;
pub use linkedit::*;
pub use load_command::*;
pub use structs::*;
pub use swap::{ByteSwap, SwapPolicy};
pub use symbols::*;
pub use version::*;

pub(crate) use swap::impl_byte_swap;
