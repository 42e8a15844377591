//! Dyld shared cache reading.
//!
//! Decodes the cache header, mapping table and image table of a single-file
//! cache, and opens embedded images as [`MachFile`]s. Split caches
//! (`.01`, `.symbols`) are not followed.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::macho::{impl_byte_swap, MachFile, StringTable, SwapPolicy, VmProt};
use crate::source::ByteSource;

/// The magic string prefix for all dyld caches.
pub const DYLD_CACHE_MAGIC_PREFIX: &[u8; 4] = b"dyld";

/// Header offset of the modern `images_offset` field.
const IMAGES_OFFSET_FIELD: u64 = 0x1c0;
/// Header offset of the modern `images_count` field.
const IMAGES_COUNT_FIELD: u64 = 0x1c4;

/// Dyld caches are little-endian on every platform that ships them.
const POLICY: SwapPolicy = SwapPolicy::LITTLE_ENDIAN_FORMAT;

// =============================================================================
// Records
// =============================================================================

/// Leading fields of the cache header, present in every cache version.
///
/// Later fields are only valid when `mapping_offset` lies past them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct DyldCacheHeader {
    /// Magic identifier, e.g., "dyld_v1   arm64e"
    pub magic: [u8; 16],
    /// File offset to first mapping
    pub mapping_offset: u32,
    /// Number of mappings
    pub mapping_count: u32,
    /// Legacy: file offset to the image array
    pub images_offset_old: u32,
    /// Legacy: number of images
    pub images_count_old: u32,
    /// Base address of dyld when the cache was built
    pub dyld_base_address: u64,
    /// File offset of the cache code signature
    pub code_signature_offset: u64,
    /// Size of the cache code signature
    pub code_signature_size: u64,
    /// Legacy slide info offset
    pub slide_info_offset_unused: u64,
    /// Legacy slide info size
    pub slide_info_size_unused: u64,
    /// File offset of local symbols info
    pub local_symbols_offset: u64,
    /// Size of local symbols info
    pub local_symbols_size: u64,
    /// UUID of this cache
    pub uuid: [u8; 16],
}

impl DyldCacheHeader {
    /// Size of the record.
    pub const SIZE: usize = 104;

    /// Returns the architecture from the magic string.
    pub fn architecture(&self) -> &str {
        std::str::from_utf8(&self.magic)
            .unwrap_or("")
            .trim_start_matches("dyld_v0")
            .trim_start_matches("dyld_v1")
            .trim_matches(|c: char| c == ' ' || c == '\0')
    }

    /// Checks if a header field exists based on `mapping_offset`.
    pub fn contains_field(&self, field_offset: u64) -> bool {
        field_offset < self.mapping_offset as u64
    }
}

impl_byte_swap!(DyldCacheHeader {
    mapping_offset,
    mapping_count,
    images_offset_old,
    images_count_old,
    dyld_base_address,
    code_signature_offset,
    code_signature_size,
    slide_info_offset_unused,
    slide_info_size_unused,
    local_symbols_offset,
    local_symbols_size,
});

/// One entry of the mapping table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct DyldCacheMappingInfo {
    /// Virtual memory address
    pub address: u64,
    /// Size in bytes
    pub size: u64,
    /// File offset
    pub file_offset: u64,
    /// Maximum protection
    pub max_prot: u32,
    /// Initial protection
    pub init_prot: u32,
}

impl DyldCacheMappingInfo {
    /// Size of the record.
    pub const SIZE: usize = 32;
}

impl_byte_swap!(DyldCacheMappingInfo {
    address,
    size,
    file_offset,
    max_prot,
    init_prot,
});

/// One entry of the image table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct DyldCacheImageInfo {
    /// Address of the Mach-O header
    pub address: u64,
    /// Modification time
    pub mod_time: u64,
    /// Inode
    pub inode: u64,
    /// File offset of the path string
    pub path_file_offset: u32,
    /// Padding
    pub pad: u32,
}

impl DyldCacheImageInfo {
    /// Size of the record.
    pub const SIZE: usize = 32;
}

impl_byte_swap!(DyldCacheImageInfo {
    address,
    mod_time,
    inode,
    path_file_offset,
    pad,
});

// =============================================================================
// Mapping Entry
// =============================================================================

/// A region of the cache file mapped into memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingEntry {
    /// Virtual memory address
    pub address: u64,
    /// Size in bytes
    pub size: u64,
    /// File offset
    pub file_offset: u64,
    /// Maximum protection
    pub max_prot: VmProt,
    /// Initial protection
    pub init_prot: VmProt,
}

impl From<&DyldCacheMappingInfo> for MappingEntry {
    fn from(info: &DyldCacheMappingInfo) -> Self {
        Self {
            address: info.address,
            size: info.size,
            file_offset: info.file_offset,
            max_prot: VmProt::from_bits_retain(info.max_prot),
            init_prot: VmProt::from_bits_retain(info.init_prot),
        }
    }
}

impl MappingEntry {
    /// Returns true if this mapping contains the given virtual address.
    #[inline]
    pub fn contains_addr(&self, addr: u64) -> bool {
        addr >= self.address && addr - self.address < self.size
    }

    /// Returns true if this mapping contains the given file offset.
    #[inline]
    pub fn contains_offset(&self, offset: u64) -> bool {
        offset >= self.file_offset && offset - self.file_offset < self.size
    }

    /// Converts a contained virtual address to a file offset.
    ///
    /// Returns `None` if the address is outside the mapping or the result
    /// does not fit in 64 bits.
    #[inline]
    pub fn addr_to_offset(&self, addr: u64) -> Option<u64> {
        if !self.contains_addr(addr) {
            return None;
        }
        self.file_offset.checked_add(addr - self.address)
    }

    /// Converts a contained file offset to a virtual address.
    #[inline]
    pub fn offset_to_addr(&self, offset: u64) -> Option<u64> {
        if !self.contains_offset(offset) {
            return None;
        }
        self.address.checked_add(offset - self.file_offset)
    }
}

// =============================================================================
// Image Entry
// =============================================================================

/// Information about a dylib in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    /// Index in the image table
    pub index: usize,
    /// Virtual address of the Mach-O header
    pub address: u64,
    /// File offset of the Mach-O header, if a mapping covers it
    pub file_offset: Option<u64>,
    /// Install path (e.g., "/usr/lib/libc.dylib")
    pub path: String,
    /// Modification time
    pub mod_time: u64,
    /// Inode
    pub inode: u64,
}

impl ImageEntry {
    /// Returns the basename of the path.
    pub fn basename(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Returns true if the path matches the given filter.
    pub fn matches_filter(&self, filter: &str) -> bool {
        self.path.contains(filter) || self.basename().contains(filter)
    }
}

// =============================================================================
// Dyld Cache
// =============================================================================

/// A single-file dyld shared cache over a byte source.
#[derive(Debug, Clone)]
pub struct DyldCache<S> {
    source: S,
    header: DyldCacheHeader,
    mappings: Vec<MappingEntry>,
    images: Vec<ImageEntry>,
    limits: Limits,
}

impl<S: ByteSource> DyldCache<S> {
    /// Parses the header, mappings and image table.
    pub fn parse(source: S) -> Result<Self> {
        let magic: [u8; 16] = source.read_record(0)?;
        if &magic[..4] != DYLD_CACHE_MAGIC_PREFIX {
            return Err(Error::InvalidCacheMagic([
                magic[0], magic[1], magic[2], magic[3],
            ]));
        }

        let header: DyldCacheHeader = POLICY.apply(source.read_record(0)?);
        let mappings = Self::parse_mappings(&source, &header)?;

        let mut cache = Self {
            source,
            header,
            mappings,
            images: Vec::new(),
            limits: Limits::default(),
        };
        cache.images = cache.parse_images()?;

        tracing::debug!(
            arch = cache.header.architecture(),
            mappings = cache.mappings.len(),
            images = cache.images.len(),
            "parsed dyld cache"
        );
        Ok(cache)
    }

    /// Replaces the limits applied to images opened from this cache.
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    fn parse_mappings(source: &S, header: &DyldCacheHeader) -> Result<Vec<MappingEntry>> {
        let count = header.mapping_count as usize;
        let mut mappings = Vec::with_capacity(count.min(64));
        for i in 0..count as u64 {
            let offset = header.mapping_offset as u64 + i * DyldCacheMappingInfo::SIZE as u64;
            let info: DyldCacheMappingInfo = POLICY.apply(source.read_record(offset)?);
            mappings.push(MappingEntry::from(&info));
        }
        Ok(mappings)
    }

    /// Image table location: the modern fields when the header carries them,
    /// the legacy ones otherwise.
    fn images_location(&self) -> Result<(u64, u64)> {
        if self.header.contains_field(IMAGES_COUNT_FIELD) {
            let offset: u32 = POLICY.apply(self.source.read_record(IMAGES_OFFSET_FIELD)?);
            let count: u32 = POLICY.apply(self.source.read_record(IMAGES_COUNT_FIELD)?);
            if offset != 0 {
                return Ok((offset as u64, count as u64));
            }
        }
        Ok((
            self.header.images_offset_old as u64,
            self.header.images_count_old as u64,
        ))
    }

    fn parse_images(&self) -> Result<Vec<ImageEntry>> {
        let (table, count) = self.images_location()?;
        let mut images = Vec::with_capacity((count as usize).min(4096));

        for index in 0..count {
            let offset = table + index * DyldCacheImageInfo::SIZE as u64;
            let info: DyldCacheImageInfo = POLICY.apply(self.source.read_record(offset)?);

            images.push(ImageEntry {
                index: index as usize,
                address: info.address,
                file_offset: self.mapping_for_addr(info.address).and_then(|m| m.addr_to_offset(info.address)),
                path: self.read_string(info.path_file_offset as u64),
                mod_time: info.mod_time,
                inode: info.inode,
            });
        }

        Ok(images)
    }

    /// Reads a NUL-terminated string at a cache file offset.
    ///
    /// Out-of-range offsets and invalid UTF-8 yield an empty string.
    pub fn read_string(&self, offset: u64) -> String {
        let remaining = self.source.size().saturating_sub(offset);
        let size = remaining.min(u32::MAX as u64) as u32;
        StringTable::new(&self.source, offset, size, self.limits.max_string_len).get(0)
    }

    /// The underlying byte source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The decoded header.
    pub fn header(&self) -> &DyldCacheHeader {
        &self.header
    }

    /// Architecture name from the magic.
    pub fn architecture(&self) -> &str {
        self.header.architecture()
    }

    /// Cache UUID.
    pub fn uuid(&self) -> [u8; 16] {
        self.header.uuid
    }

    /// Mapping table.
    pub fn mappings(&self) -> &[MappingEntry] {
        &self.mappings
    }

    /// Image table.
    pub fn images(&self) -> &[ImageEntry] {
        &self.images
    }

    /// Returns the mapping for a given virtual address.
    pub fn mapping_for_addr(&self, addr: u64) -> Option<&MappingEntry> {
        self.mappings.iter().find(|m| m.contains_addr(addr))
    }

    /// Converts a virtual address to a file offset.
    pub fn addr_to_offset(&self, addr: u64) -> Result<u64> {
        self.mapping_for_addr(addr)
            .and_then(|m| m.addr_to_offset(addr))
            .ok_or(Error::AddressNotFound { addr })
    }

    /// Converts a file offset to a virtual address.
    pub fn offset_to_addr(&self, offset: u64) -> Option<u64> {
        // Mappings aren't sorted by file offset, so linear scan is necessary
        self.mappings
            .iter()
            .find(|m| m.contains_offset(offset))
            .and_then(|m| m.offset_to_addr(offset))
    }

    /// Finds an image by exact path, then by path or basename substring.
    pub fn find_image(&self, name: &str) -> Option<&ImageEntry> {
        self.images
            .iter()
            .find(|img| img.path == name)
            .or_else(|| self.images.iter().find(|img| img.matches_filter(name)))
    }

    /// Opens an embedded image.
    ///
    /// Link-edit offsets inside cache images are relative to the cache file,
    /// so the image's data base is zero.
    pub fn image(&self, name: &str) -> Result<MachFile<&S>> {
        let entry = self.find_image(name).ok_or_else(|| Error::ImageNotFound {
            name: name.to_string(),
        })?;
        let offset = self.addr_to_offset(entry.address)?;
        tracing::debug!(path = %entry.path, offset, "opening cache image");
        Ok(MachFile::parse_at(&self.source, offset, 0)?.with_limits(self.limits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macho::{LC_ID_DYLIB, MH_DYLIB};
    use crate::testutil::{MachOBuilder, Writer};

    const BASE: u64 = 0x1_8000_0000;

    fn put(data: &mut [u8], offset: usize, bytes: &[u8]) {
        data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    fn cache_fixture(modern: bool) -> Vec<u8> {
        let mut data = vec![0u8; 0x2000];
        put(&mut data, 0, b"dyld_v1   arm64e");

        let (mapping_offset, images_offset) = if modern { (0x200u32, 0x240u32) } else { (0x98, 0xd8) };
        put(&mut data, 0x10, &mapping_offset.to_le_bytes());
        put(&mut data, 0x14, &2u32.to_le_bytes());
        let images_field = if modern { 0x1c0 } else { 0x18 };
        put(&mut data, images_field, &images_offset.to_le_bytes());
        put(&mut data, images_field + 4, &2u32.to_le_bytes());
        put(&mut data, 0x58, &[0x11; 16]);

        let mut w = Writer::new(false);
        w.u64(BASE).u64(0x1000).u64(0).u32(5).u32(5);
        w.u64(BASE + 0x4000).u64(0x1000).u64(0x1000).u32(3).u32(3);
        put(&mut data, mapping_offset as usize, &w.finish());

        let mut w = Writer::new(false);
        w.u64(BASE + 0x4000).u64(0).u64(0).u32(0x300).u32(0);
        w.u64(0x2_0000_0000).u64(0).u64(0).u32(0x320).u32(0);
        put(&mut data, images_offset as usize, &w.finish());

        put(&mut data, 0x300, b"/usr/lib/libfoo.dylib\0");
        put(&mut data, 0x320, b"/usr/lib/libgone.dylib\0");

        let mut image = MachOBuilder::new(false, true).filetype(MH_DYLIB);
        image
            .segment("__TEXT", BASE + 0x4000, 0x1000, 0x1000, 0x1000, &[])
            .dylib(LC_ID_DYLIB, "/usr/lib/libfoo.dylib", 0x10000, 0x10000);
        put(&mut data, 0x1000, &image.build());
        data
    }

    #[test]
    fn test_parse_cache() {
        for modern in [true, false] {
            let cache = DyldCache::parse(cache_fixture(modern)).unwrap();
            assert_eq!(cache.architecture(), "arm64e");
            assert_eq!(cache.uuid(), [0x11; 16]);
            assert_eq!(cache.mappings().len(), 2);
            assert!(cache.mappings()[0].init_prot.contains(VmProt::EXECUTE));

            let images = cache.images();
            assert_eq!(images.len(), 2);
            assert_eq!(images[0].path, "/usr/lib/libfoo.dylib");
            assert_eq!(images[0].basename(), "libfoo.dylib");
            assert_eq!(images[0].file_offset, Some(0x1000));
            assert_eq!(images[1].file_offset, None);
        }
    }

    #[test]
    fn test_address_conversion() {
        let cache = DyldCache::parse(cache_fixture(true)).unwrap();
        assert_eq!(cache.addr_to_offset(BASE + 0x10).unwrap(), 0x10);
        assert_eq!(cache.addr_to_offset(BASE + 0x4010).unwrap(), 0x1010);
        assert!(matches!(
            cache.addr_to_offset(BASE + 0x2000),
            Err(Error::AddressNotFound { .. })
        ));
        assert_eq!(cache.offset_to_addr(0x1020), Some(BASE + 0x4020));
    }

    #[test]
    fn test_overflowing_mapping() {
        let mut data = cache_fixture(true);
        // Second mapping's file offset sits just below the top of the range.
        put(&mut data, 0x200 + 32 + 16, &(u64::MAX - 0x10).to_le_bytes());
        let cache = DyldCache::parse(data).unwrap();

        assert_eq!(cache.addr_to_offset(BASE + 0x4008).unwrap(), u64::MAX - 0x8);
        assert!(matches!(
            cache.addr_to_offset(BASE + 0x4020),
            Err(Error::AddressNotFound { addr }) if addr == BASE + 0x4020
        ));
        assert_eq!(cache.offset_to_addr(0x1020), None);
        assert_eq!(cache.addr_to_offset(BASE + 0x10).unwrap(), 0x10);

        let mapping = MappingEntry {
            address: u64::MAX - 0x10,
            size: 0x100,
            file_offset: 0x1000,
            max_prot: VmProt::READ,
            init_prot: VmProt::READ,
        };
        assert_eq!(mapping.offset_to_addr(0x1008), Some(u64::MAX - 0x8));
        assert_eq!(mapping.offset_to_addr(0x1020), None);
    }

    #[test]
    fn test_open_image() {
        let cache = DyldCache::parse(cache_fixture(true)).unwrap();

        let image = cache.image("libfoo").unwrap();
        assert_eq!(image.header_offset(), 0x1000);
        assert_eq!(image.data_base(), 0);
        assert_eq!(image.id_dylib().unwrap().unwrap().name, "/usr/lib/libfoo.dylib");
        assert_eq!(image.addr_to_offset(BASE + 0x4008).unwrap(), Some(0x1008));

        assert!(matches!(
            cache.image("/usr/lib/libgone.dylib"),
            Err(Error::AddressNotFound { .. })
        ));
        assert!(matches!(
            cache.image("UIKit"),
            Err(Error::ImageNotFound { .. })
        ));
    }

    #[test]
    fn test_bad_magic() {
        let mut data = cache_fixture(true);
        put(&mut data, 0, b"abcd");
        assert!(matches!(
            DyldCache::parse(data),
            Err(Error::InvalidCacheMagic(m)) if &m == b"abcd"
        ));
    }
}
