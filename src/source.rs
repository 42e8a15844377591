//! Random-access byte sources.
//!
//! Decoders never hold a slice of the whole input. They ask a [`ByteSource`]
//! for exactly the bytes they need at an absolute offset, which lets the same
//! code run over an in-memory buffer, a memory-mapped file, or a region of a
//! dyld shared cache.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;
use zerocopy::{FromBytes, IntoBytes};

use crate::error::{Error, Result};

/// A read-only, random-access provider of bytes.
///
/// Implementations must fail (not panic) when a read extends past the end of
/// the source. Reads take `&self` so a source can be shared across threads as
/// long as the implementation supports positioned reads.
pub trait ByteSource {
    /// Total size of the source in bytes.
    fn size(&self) -> u64;

    /// Fills `buf` with the bytes starting at `offset`.
    fn read_into(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Reads exactly `len` bytes at `offset`.
    fn read_bytes(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let size = self.size();
        let fits = offset
            .checked_add(len as u64)
            .is_some_and(|end| end <= size);
        if !fits {
            return Err(Error::OutOfBounds { offset, len, size });
        }
        let mut buf = vec![0u8; len];
        self.read_into(offset, &mut buf)?;
        Ok(buf)
    }

    /// Reads a fixed-size record at `offset`.
    ///
    /// The record is returned exactly as stored; callers apply their own
    /// [`SwapPolicy`](crate::macho::SwapPolicy).
    fn read_record<T: FromBytes + IntoBytes>(&self, offset: u64) -> Result<T> {
        let mut value = T::new_zeroed();
        self.read_into(offset, value.as_mut_bytes())?;
        Ok(value)
    }
}

/// Copies `buf.len()` bytes out of `data`, bounds-checking the range.
#[inline]
fn read_from_slice(data: &[u8], offset: u64, buf: &mut [u8]) -> Result<()> {
    let out_of_bounds = || Error::OutOfBounds {
        offset,
        len: buf.len(),
        size: data.len() as u64,
    };

    let start = usize::try_from(offset).map_err(|_| out_of_bounds())?;
    let end = start.checked_add(buf.len()).ok_or_else(out_of_bounds)?;
    let src = data.get(start..end).ok_or_else(out_of_bounds)?;
    buf.copy_from_slice(src);
    Ok(())
}

impl ByteSource for [u8] {
    fn size(&self) -> u64 {
        self.len() as u64
    }

    fn read_into(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        read_from_slice(self, offset, buf)
    }
}

impl ByteSource for Vec<u8> {
    fn size(&self) -> u64 {
        self.len() as u64
    }

    fn read_into(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        read_from_slice(self, offset, buf)
    }
}

impl ByteSource for Mmap {
    fn size(&self) -> u64 {
        self.len() as u64
    }

    fn read_into(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        read_from_slice(self, offset, buf)
    }
}

impl<T: ByteSource + ?Sized> ByteSource for &T {
    fn size(&self) -> u64 {
        (**self).size()
    }

    fn read_into(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read_into(offset, buf)
    }
}

impl<T: ByteSource + ?Sized> ByteSource for Arc<T> {
    fn size(&self) -> u64 {
        (**self).size()
    }

    fn read_into(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read_into(offset, buf)
    }
}

// =============================================================================
// Mapped File
// =============================================================================

/// A memory-mapped file.
#[derive(Debug)]
pub struct MappedFile {
    mmap: Mmap,
    path: PathBuf,
}

impl MappedFile {
    /// Opens and maps the file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = File::open(&path).map_err(|e| Error::FileOpen {
            path: path.clone(),
            source: e,
        })?;

        // SAFETY: the mapping is read-only and the decoder never assumes the
        // contents stay valid UTF-8 or well-formed between reads.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::MemoryMap {
            path: path.clone(),
            source: e,
        })?;

        Ok(Self { mmap, path })
    }

    /// Path the file was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the mapped bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap
    }
}

impl ByteSource for MappedFile {
    fn size(&self) -> u64 {
        self.mmap.len() as u64
    }

    fn read_into(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        read_from_slice(&self.mmap, offset, buf)
    }
}
