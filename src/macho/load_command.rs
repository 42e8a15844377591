//! Load command decoding.
//!
//! [`LoadCommands`] walks the command block that follows the header one
//! record at a time, reading each command from the byte source only when it
//! is pulled. Every command is classified into the closed [`LoadCommand`]
//! enum; anything unrecognized is passed through as [`LoadCommand::Unknown`].

use zerocopy::FromBytes;

use super::constants::*;
use super::header::MachHeader;
use super::structs::*;
use super::swap::{ByteSwap, SwapPolicy};
use super::version::{PackedVersion, SourceVersion};
use crate::error::{Error, Result};
use crate::source::ByteSource;
use crate::util::{c_str_bytes, fixed_name, lc_str};

// =============================================================================
// Segments And Sections
// =============================================================================

/// A segment command, widened to 64-bit fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Segment name
    pub name: String,
    /// Virtual memory address
    pub vmaddr: u64,
    /// Virtual memory size
    pub vmsize: u64,
    /// File offset
    pub fileoff: u64,
    /// Bytes mapped from the file
    pub filesize: u64,
    /// Maximum protection
    pub maxprot: VmProt,
    /// Initial protection
    pub initprot: VmProt,
    /// Segment flags
    pub flags: SegmentFlags,
    /// Sections following the command
    pub sections: Vec<Section>,
    /// Whether this came from LC_SEGMENT_64
    pub is_64: bool,
}

impl Segment {
    /// Returns a section by name.
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Returns true if `addr` falls inside the segment's address range.
    #[inline]
    pub fn contains_addr(&self, addr: u64) -> bool {
        addr >= self.vmaddr && addr - self.vmaddr < self.vmsize
    }
}

/// A section record, widened to 64-bit fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Section name
    pub name: String,
    /// Name of the owning segment
    pub segname: String,
    /// Virtual memory address
    pub addr: u64,
    /// Size in bytes
    pub size: u64,
    /// File offset
    pub offset: u32,
    /// Alignment as a power of two
    pub align: u32,
    /// File offset of relocation entries
    pub reloff: u32,
    /// Number of relocation entries
    pub nreloc: u32,
    /// Type and attributes
    pub flags: u32,
    /// Indirect symbol index (for stubs and pointer sections)
    pub reserved1: u32,
    /// Stub size (for stub sections)
    pub reserved2: u32,
    /// Reserved (64-bit only)
    pub reserved3: u32,
}

impl Section {
    /// Section type (low byte of the flags).
    #[inline]
    pub fn section_type(&self) -> u32 {
        self.flags & SECTION_TYPE
    }

    /// Section attributes (high bits of the flags).
    #[inline]
    pub fn attributes(&self) -> u32 {
        self.flags & SECTION_ATTRIBUTES
    }

    /// Returns the full name (segment,section).
    pub fn full_name(&self) -> String {
        format!("{},{}", self.segname, self.name)
    }
}

impl From<&Section64> for Section {
    fn from(s: &Section64) -> Self {
        Self {
            name: fixed_name(&s.sectname).to_string(),
            segname: fixed_name(&s.segname).to_string(),
            addr: s.addr,
            size: s.size,
            offset: s.offset,
            align: s.align,
            reloff: s.reloff,
            nreloc: s.nreloc,
            flags: s.flags,
            reserved1: s.reserved1,
            reserved2: s.reserved2,
            reserved3: s.reserved3,
        }
    }
}

impl From<&Section32> for Section {
    fn from(s: &Section32) -> Self {
        Self {
            name: fixed_name(&s.sectname).to_string(),
            segname: fixed_name(&s.segname).to_string(),
            addr: s.addr as u64,
            size: s.size as u64,
            offset: s.offset,
            align: s.align,
            reloff: s.reloff,
            nreloc: s.nreloc,
            flags: s.flags,
            reserved1: s.reserved1,
            reserved2: s.reserved2,
            reserved3: 0,
        }
    }
}

// =============================================================================
// Dylibs
// =============================================================================

/// A dylib reference from an LC_*_DYLIB command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dylib {
    /// Install name
    pub name: String,
    /// Build timestamp
    pub timestamp: u32,
    /// Current version
    pub current_version: PackedVersion,
    /// Compatibility version
    pub compatibility_version: PackedVersion,
}

/// How a depended-on dylib is linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    /// LC_LOAD_DYLIB
    Load,
    /// LC_LOAD_WEAK_DYLIB
    Weak,
    /// LC_REEXPORT_DYLIB
    Reexport,
    /// LC_LOAD_UPWARD_DYLIB
    Upward,
    /// LC_LAZY_LOAD_DYLIB
    Lazy,
}

impl DependencyKind {
    /// Short lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Weak => "weak",
            Self::Reexport => "reexport",
            Self::Upward => "upward",
            Self::Lazy => "lazy",
        }
    }
}

/// A library this image depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependedDylib {
    /// The referenced dylib
    pub dylib: Dylib,
    /// The relationship to it
    pub kind: DependencyKind,
}

// =============================================================================
// Other Decoded Payloads
// =============================================================================

/// Encryption range from LC_ENCRYPTION_INFO(_64).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionInfo {
    /// File offset of the encrypted range
    pub cryptoff: u32,
    /// Size of the encrypted range
    pub cryptsize: u32,
    /// Encryption system, 0 when not encrypted
    pub cryptid: u32,
    /// Whether this came from the 64-bit command
    pub is_64: bool,
}

/// A tool entry of LC_BUILD_VERSION.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildTool {
    /// Tool identifier (1 = clang, 2 = swift, 3 = ld)
    pub tool: u32,
    /// Tool version
    pub version: PackedVersion,
}

/// Decoded LC_BUILD_VERSION.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildVersion {
    /// PLATFORM_* value
    pub platform: u32,
    /// Minimum OS version
    pub minos: PackedVersion,
    /// SDK version
    pub sdk: PackedVersion,
    /// Tools used to build the image
    pub tools: Vec<BuildTool>,
}

/// Returns the name of a PLATFORM_* value.
pub fn platform_name(platform: u32) -> &'static str {
    match platform {
        PLATFORM_MACOS => "macOS",
        PLATFORM_IOS => "iOS",
        PLATFORM_TVOS => "tvOS",
        PLATFORM_WATCHOS => "watchOS",
        PLATFORM_BRIDGEOS => "bridgeOS",
        PLATFORM_MACCATALYST => "macCatalyst",
        PLATFORM_IOSSIMULATOR => "iOS Simulator",
        PLATFORM_TVOSSIMULATOR => "tvOS Simulator",
        PLATFORM_WATCHOSSIMULATOR => "watchOS Simulator",
        PLATFORM_DRIVERKIT => "DriverKit",
        PLATFORM_VISIONOS => "visionOS",
        PLATFORM_VISIONOSSIMULATOR => "visionOS Simulator",
        _ => "unknown",
    }
}

// =============================================================================
// Load Command
// =============================================================================

/// A decoded load command.
///
/// Variants that share a layout keep the command constant (`cmd`) so the
/// caller can tell them apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadCommand {
    /// LC_SEGMENT or LC_SEGMENT_64, with its sections
    Segment(Segment),
    /// LC_SYMTAB
    Symtab(SymtabCommand),
    /// LC_DYSYMTAB
    Dysymtab(DysymtabCommand),
    /// LC_DYLD_INFO or LC_DYLD_INFO_ONLY
    DyldInfo {
        /// The command record
        command: DyldInfoCommand,
        /// True for LC_DYLD_INFO_ONLY
        only: bool,
    },
    /// LC_ID_DYLIB
    IdDylib(Dylib),
    /// LC_LOAD_DYLIB and its weak, reexport, upward and lazy variants
    Dylib(DependedDylib),
    /// LC_LOAD_DYLINKER, LC_ID_DYLINKER or LC_DYLD_ENVIRONMENT
    Dylinker {
        /// Command constant
        cmd: u32,
        /// Path or environment string
        name: String,
    },
    /// LC_RPATH
    Rpath(String),
    /// LC_UUID
    Uuid([u8; 16]),
    /// Any command pointing at a range of the link-edit segment
    LinkeditData(LinkeditDataCommand),
    /// LC_ENCRYPTION_INFO or LC_ENCRYPTION_INFO_64
    EncryptionInfo(EncryptionInfo),
    /// LC_VERSION_MIN_MACOSX, _IPHONEOS, _TVOS or _WATCHOS
    VersionMin {
        /// Command constant
        cmd: u32,
        /// Minimum OS version
        version: PackedVersion,
        /// SDK version
        sdk: PackedVersion,
    },
    /// LC_BUILD_VERSION
    BuildVersion(BuildVersion),
    /// LC_SOURCE_VERSION
    SourceVersion(SourceVersion),
    /// LC_MAIN
    Main(EntryPointCommand),
    /// LC_SUB_FRAMEWORK, LC_SUB_UMBRELLA, LC_SUB_CLIENT or LC_SUB_LIBRARY
    SubName {
        /// Command constant
        cmd: u32,
        /// The referenced name
        name: String,
    },
    /// LC_LINKER_OPTION
    LinkerOption(Vec<String>),
    /// LC_NOTE
    Note {
        /// Owner name
        owner: String,
        /// File offset of the note data
        offset: u64,
        /// Size of the note data
        size: u64,
    },
    /// LC_FILESET_ENTRY
    FilesetEntry {
        /// Virtual address of the entry
        vmaddr: u64,
        /// File offset of the entry
        fileoff: u64,
        /// Entry identifier
        entry_id: String,
    },
    /// LC_THREAD or LC_UNIXTHREAD; register state is kept raw
    Thread {
        /// Command constant
        cmd: u32,
        /// Bytes after the command header
        data: Vec<u8>,
    },
    /// LC_ROUTINES or LC_ROUTINES_64
    Routines {
        /// Address of the initialization routine
        init_address: u64,
        /// Module index of the initialization routine
        init_module: u64,
    },
    /// LC_TWOLEVEL_HINTS
    TwolevelHints(TwolevelHintsCommand),
    /// LC_PREBIND_CKSUM
    PrebindCksum(u32),
    /// A command this decoder does not interpret
    Unknown {
        /// Command constant
        cmd: u32,
        /// Bytes after the command header
        data: Vec<u8>,
    },
}

/// One entry of the load command list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadCommandEntry {
    /// Absolute offset of the command in the byte source
    pub offset: u64,
    /// Command constant as stored
    pub cmd: u32,
    /// Declared command size
    pub cmdsize: u32,
    /// Decoded command
    pub command: LoadCommand,
}

impl LoadCommandEntry {
    /// Returns the conventional name of the command, or `None` if unknown.
    pub fn name(&self) -> Option<&'static str> {
        load_command_name(self.cmd)
    }
}

/// Overlays a record on the start of a command and applies the file's policy.
fn record<T: FromBytes + ByteSwap>(data: &[u8], policy: SwapPolicy, offset: u64, what: &str) -> Result<T> {
    policy
        .read(data)
        .ok_or_else(|| Error::malformed_commands(offset, format!("{what} command truncated")))
}

impl LoadCommand {
    /// Decodes one command from its complete bytes (`data.len() == cmdsize`).
    fn parse(cmd: u32, data: &[u8], policy: SwapPolicy, offset: u64) -> Result<Self> {
        Ok(match cmd {
            LC_SEGMENT_64 => {
                let seg: SegmentCommand64 = record(data, policy, offset, "segment")?;
                let sections = data
                    .get(SegmentCommand64::SIZE..)
                    .unwrap_or_default()
                    .chunks_exact(Section64::SIZE)
                    .take(seg.nsects as usize)
                    .filter_map(|raw| policy.read::<Section64>(raw))
                    .map(|s| Section::from(&s))
                    .collect::<Vec<_>>();
                if sections.len() != seg.nsects as usize {
                    return Err(Error::malformed_commands(offset, "sections overrun segment command"));
                }
                LoadCommand::Segment(Segment {
                    name: seg.name().to_string(),
                    vmaddr: seg.vmaddr,
                    vmsize: seg.vmsize,
                    fileoff: seg.fileoff,
                    filesize: seg.filesize,
                    maxprot: VmProt::from_bits_retain(seg.maxprot),
                    initprot: VmProt::from_bits_retain(seg.initprot),
                    flags: SegmentFlags::from_bits_retain(seg.flags),
                    sections,
                    is_64: true,
                })
            }

            LC_SEGMENT => {
                let seg: SegmentCommand32 = record(data, policy, offset, "segment")?;
                let sections = data
                    .get(SegmentCommand32::SIZE..)
                    .unwrap_or_default()
                    .chunks_exact(Section32::SIZE)
                    .take(seg.nsects as usize)
                    .filter_map(|raw| policy.read::<Section32>(raw))
                    .map(|s| Section::from(&s))
                    .collect::<Vec<_>>();
                if sections.len() != seg.nsects as usize {
                    return Err(Error::malformed_commands(offset, "sections overrun segment command"));
                }
                LoadCommand::Segment(Segment {
                    name: fixed_name(&seg.segname).to_string(),
                    vmaddr: seg.vmaddr as u64,
                    vmsize: seg.vmsize as u64,
                    fileoff: seg.fileoff as u64,
                    filesize: seg.filesize as u64,
                    maxprot: VmProt::from_bits_retain(seg.maxprot),
                    initprot: VmProt::from_bits_retain(seg.initprot),
                    flags: SegmentFlags::from_bits_retain(seg.flags),
                    sections,
                    is_64: false,
                })
            }

            LC_SYMTAB => LoadCommand::Symtab(record(data, policy, offset, "symtab")?),

            LC_DYSYMTAB => LoadCommand::Dysymtab(record(data, policy, offset, "dysymtab")?),

            LC_DYLD_INFO | LC_DYLD_INFO_ONLY => LoadCommand::DyldInfo {
                command: record(data, policy, offset, "dyld info")?,
                only: cmd == LC_DYLD_INFO_ONLY,
            },

            LC_ID_DYLIB => LoadCommand::IdDylib(parse_dylib(data, policy, offset)?),

            LC_LOAD_DYLIB => depended(data, policy, offset, DependencyKind::Load)?,
            LC_LOAD_WEAK_DYLIB => depended(data, policy, offset, DependencyKind::Weak)?,
            LC_REEXPORT_DYLIB => depended(data, policy, offset, DependencyKind::Reexport)?,
            LC_LOAD_UPWARD_DYLIB => depended(data, policy, offset, DependencyKind::Upward)?,
            LC_LAZY_LOAD_DYLIB => depended(data, policy, offset, DependencyKind::Lazy)?,

            LC_LOAD_DYLINKER | LC_ID_DYLINKER | LC_DYLD_ENVIRONMENT => {
                let command: StrCommand = record(data, policy, offset, "dylinker")?;
                LoadCommand::Dylinker {
                    cmd,
                    name: lc_str(data, command.offset),
                }
            }

            LC_RPATH => {
                let command: StrCommand = record(data, policy, offset, "rpath")?;
                LoadCommand::Rpath(lc_str(data, command.offset))
            }

            LC_SUB_FRAMEWORK | LC_SUB_UMBRELLA | LC_SUB_CLIENT | LC_SUB_LIBRARY => {
                let command: StrCommand = record(data, policy, offset, "sub name")?;
                LoadCommand::SubName {
                    cmd,
                    name: lc_str(data, command.offset),
                }
            }

            LC_UUID => {
                let command: UuidCommand = record(data, policy, offset, "uuid")?;
                LoadCommand::Uuid(command.uuid)
            }

            LC_CODE_SIGNATURE
            | LC_SEGMENT_SPLIT_INFO
            | LC_FUNCTION_STARTS
            | LC_DATA_IN_CODE
            | LC_DYLIB_CODE_SIGN_DRS
            | LC_LINKER_OPTIMIZATION_HINT
            | LC_DYLD_EXPORTS_TRIE
            | LC_DYLD_CHAINED_FIXUPS
            | LC_ATOM_INFO => LoadCommand::LinkeditData(record(data, policy, offset, "linkedit data")?),

            LC_ENCRYPTION_INFO => {
                let command: EncryptionInfoCommand32 = record(data, policy, offset, "encryption info")?;
                LoadCommand::EncryptionInfo(EncryptionInfo {
                    cryptoff: command.cryptoff,
                    cryptsize: command.cryptsize,
                    cryptid: command.cryptid,
                    is_64: false,
                })
            }

            LC_ENCRYPTION_INFO_64 => {
                let command: EncryptionInfoCommand64 = record(data, policy, offset, "encryption info")?;
                LoadCommand::EncryptionInfo(EncryptionInfo {
                    cryptoff: command.cryptoff,
                    cryptsize: command.cryptsize,
                    cryptid: command.cryptid,
                    is_64: true,
                })
            }

            LC_VERSION_MIN_MACOSX | LC_VERSION_MIN_IPHONEOS | LC_VERSION_MIN_TVOS
            | LC_VERSION_MIN_WATCHOS => {
                let command: VersionMinCommand = record(data, policy, offset, "version min")?;
                LoadCommand::VersionMin {
                    cmd,
                    version: PackedVersion(command.version),
                    sdk: PackedVersion(command.sdk),
                }
            }

            LC_BUILD_VERSION => {
                let command: BuildVersionCommand = record(data, policy, offset, "build version")?;
                let tools = data
                    .get(BuildVersionCommand::SIZE..)
                    .unwrap_or_default()
                    .chunks_exact(BuildToolVersion::SIZE)
                    .take(command.ntools as usize)
                    .filter_map(|raw| policy.read::<BuildToolVersion>(raw))
                    .map(|t| BuildTool {
                        tool: t.tool,
                        version: PackedVersion(t.version),
                    })
                    .collect();
                LoadCommand::BuildVersion(BuildVersion {
                    platform: command.platform,
                    minos: PackedVersion(command.minos),
                    sdk: PackedVersion(command.sdk),
                    tools,
                })
            }

            LC_SOURCE_VERSION => {
                let command: SourceVersionCommand = record(data, policy, offset, "source version")?;
                LoadCommand::SourceVersion(SourceVersion(command.version))
            }

            LC_MAIN => LoadCommand::Main(record(data, policy, offset, "main")?),

            LC_LINKER_OPTION => {
                let command: LinkerOptionCommand = record(data, policy, offset, "linker option")?;
                let mut rest = data.get(LinkerOptionCommand::SIZE..).unwrap_or_default();
                let mut options = Vec::with_capacity(command.count.min(64) as usize);
                for _ in 0..command.count {
                    let (bytes, terminated) = c_str_bytes(rest);
                    if bytes.is_empty() && !terminated {
                        break;
                    }
                    options.push(String::from_utf8_lossy(bytes).into_owned());
                    rest = rest.get(bytes.len() + 1..).unwrap_or_default();
                }
                LoadCommand::LinkerOption(options)
            }

            LC_NOTE => {
                let command: NoteCommand = record(data, policy, offset, "note")?;
                LoadCommand::Note {
                    owner: fixed_name(&command.data_owner).to_string(),
                    offset: command.offset,
                    size: command.size,
                }
            }

            LC_FILESET_ENTRY => {
                let command: FilesetEntryCommand = record(data, policy, offset, "fileset entry")?;
                LoadCommand::FilesetEntry {
                    vmaddr: command.vmaddr,
                    fileoff: command.fileoff,
                    entry_id: lc_str(data, command.entry_id_offset),
                }
            }

            LC_THREAD | LC_UNIXTHREAD => LoadCommand::Thread {
                cmd,
                data: data.get(LoadCommandHeader::SIZE..).unwrap_or_default().to_vec(),
            },

            LC_ROUTINES => {
                let command: RoutinesCommand32 = record(data, policy, offset, "routines")?;
                LoadCommand::Routines {
                    init_address: command.init_address as u64,
                    init_module: command.init_module as u64,
                }
            }

            LC_ROUTINES_64 => {
                let command: RoutinesCommand64 = record(data, policy, offset, "routines")?;
                LoadCommand::Routines {
                    init_address: command.init_address,
                    init_module: command.init_module,
                }
            }

            LC_TWOLEVEL_HINTS => LoadCommand::TwolevelHints(record(data, policy, offset, "twolevel hints")?),

            LC_PREBIND_CKSUM => {
                let command: PrebindCksumCommand = record(data, policy, offset, "prebind cksum")?;
                LoadCommand::PrebindCksum(command.cksum)
            }

            _ => {
                tracing::debug!(cmd, offset, "unknown load command");
                LoadCommand::Unknown {
                    cmd,
                    data: data.get(LoadCommandHeader::SIZE..).unwrap_or_default().to_vec(),
                }
            }
        })
    }
}

fn parse_dylib(data: &[u8], policy: SwapPolicy, offset: u64) -> Result<Dylib> {
    let command: DylibCommand = record(data, policy, offset, "dylib")?;
    Ok(Dylib {
        name: lc_str(data, command.name_offset),
        timestamp: command.timestamp,
        current_version: PackedVersion(command.current_version),
        compatibility_version: PackedVersion(command.compatibility_version),
    })
}

fn depended(data: &[u8], policy: SwapPolicy, offset: u64, kind: DependencyKind) -> Result<LoadCommand> {
    Ok(LoadCommand::Dylib(DependedDylib {
        dylib: parse_dylib(data, policy, offset)?,
        kind,
    }))
}

// =============================================================================
// Iterator
// =============================================================================

/// Lazy iterator over the load commands of one image.
///
/// Each call to `next` reads exactly one command from the byte source. A
/// command whose body cannot be decoded yields an error for that entry only
/// and the walk continues with the next command. A framing error (a size
/// below the command header or past `sizeofcmds`) fuses the iterator, since
/// nothing after it can be located.
#[derive(Debug)]
pub struct LoadCommands<'a, S: ?Sized> {
    source: &'a S,
    policy: SwapPolicy,
    offset: u64,
    end: u64,
    remaining: u32,
    failed: bool,
}

impl<'a, S: ByteSource + ?Sized> LoadCommands<'a, S> {
    /// Creates an iterator for the header decoded at `header_offset`.
    pub fn new(source: &'a S, header: &MachHeader, header_offset: u64) -> Self {
        let offset = header_offset + header.size() as u64;
        Self {
            source,
            policy: header.swap_policy(),
            offset,
            end: offset + header.sizeofcmds as u64,
            remaining: header.ncmds,
            failed: false,
        }
    }

    /// Returns true once a framing error has stopped the walk.
    pub fn is_fused(&self) -> bool {
        self.failed
    }

    fn fail(&mut self, err: Error) -> Option<Result<LoadCommandEntry>> {
        self.failed = true;
        Some(Err(err))
    }

    fn next_frame(&mut self) -> Result<(u64, LoadCommandHeader)> {
        let offset = self.offset;
        if offset + LoadCommandHeader::SIZE as u64 > self.end {
            return Err(Error::malformed_commands(offset, "command header overruns sizeofcmds"));
        }

        let lc: LoadCommandHeader = self.policy.apply(self.source.read_record(offset)?);
        if lc.cmdsize < LoadCommandHeader::SIZE as u32 {
            return Err(Error::malformed_commands(
                offset,
                format!("command size {} is smaller than its header", lc.cmdsize),
            ));
        }
        if offset + lc.cmdsize as u64 > self.end {
            return Err(Error::malformed_commands(
                offset,
                format!("command size {} overruns sizeofcmds", lc.cmdsize),
            ));
        }

        self.offset += lc.cmdsize as u64;
        self.remaining -= 1;
        Ok((offset, lc))
    }

    fn read_entry(&self, offset: u64, lc: LoadCommandHeader) -> Result<LoadCommandEntry> {
        let data = self.source.read_bytes(offset, lc.cmdsize as usize)?;
        let command = LoadCommand::parse(lc.cmd, &data, self.policy, offset)?;
        Ok(LoadCommandEntry {
            offset,
            cmd: lc.cmd,
            cmdsize: lc.cmdsize,
            command,
        })
    }
}

impl<S: ByteSource + ?Sized> Iterator for LoadCommands<'_, S> {
    type Item = Result<LoadCommandEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if self.remaining == 0 {
            if self.offset != self.end {
                tracing::trace!(
                    unused = self.end - self.offset,
                    "load commands do not fill sizeofcmds"
                );
                // Only report once.
                self.offset = self.end;
            }
            return None;
        }

        let (offset, lc) = match self.next_frame() {
            Ok(frame) => frame,
            Err(err) => return self.fail(err),
        };
        Some(self.read_entry(offset, lc))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            (0, Some(0))
        } else {
            (0, Some(self.remaining as usize))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MachOBuilder, SectionSpec};

    fn commands(data: &[u8]) -> Vec<Result<LoadCommandEntry>> {
        let header = MachHeader::parse(data, 0).unwrap();
        LoadCommands::new(data, &header, 0).collect()
    }

    fn sample(big_endian: bool, is_64: bool) -> Vec<u8> {
        let mut b = MachOBuilder::new(big_endian, is_64);
        b.segment(
            "__TEXT",
            0x1000,
            0x1000,
            0,
            0x1000,
            &[SectionSpec {
                name: "__text",
                addr: 0x1800,
                size: 0x40,
                offset: 0x800,
            }],
        );
        b.dylib(LC_LOAD_WEAK_DYLIB, "/usr/lib/libSystem.B.dylib", 0x0501_0000, 0x0001_0000);
        b.str_command(LC_RPATH, "@loader_path/../Frameworks");
        b.uuid([0xAB; 16]);
        b.raw_command(0x7777, &[1, 2, 3, 4]);
        b.build()
    }

    #[test]
    fn test_visits_every_command() {
        for big_endian in [false, true] {
            for is_64 in [false, true] {
                let data = sample(big_endian, is_64);
                let header = MachHeader::parse(data.as_slice(), 0).unwrap();
                let entries: Vec<_> = commands(&data).into_iter().map(|e| e.unwrap()).collect();

                assert_eq!(entries.len(), header.ncmds as usize);
                let consumed: u32 = entries.iter().map(|e| e.cmdsize).sum();
                assert_eq!(consumed, header.sizeofcmds);

                let LoadCommand::Segment(seg) = &entries[0].command else {
                    panic!("expected segment, got {:?}", entries[0].command);
                };
                assert_eq!(seg.name, "__TEXT");
                assert_eq!(seg.is_64, is_64);
                assert_eq!(seg.initprot, VmProt::READ | VmProt::EXECUTE);
                assert_eq!(seg.sections.len(), 1);
                assert_eq!(seg.sections[0].full_name(), "__TEXT,__text");
                assert_eq!(seg.sections[0].addr, 0x1800);
            }
        }
    }

    #[test]
    fn test_command_payloads() {
        let data = sample(true, true);
        let entries: Vec<_> = commands(&data).into_iter().map(|e| e.unwrap()).collect();

        match &entries[1].command {
            LoadCommand::Dylib(dep) => {
                assert_eq!(dep.kind, DependencyKind::Weak);
                assert_eq!(dep.dylib.name, "/usr/lib/libSystem.B.dylib");
                assert_eq!(dep.dylib.current_version.to_string(), "1281.0");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(entries[2].command, LoadCommand::Rpath("@loader_path/../Frameworks".into()));
        assert_eq!(entries[3].command, LoadCommand::Uuid([0xAB; 16]));
        assert_eq!(
            entries[4].command,
            LoadCommand::Unknown {
                cmd: 0x7777,
                data: vec![1, 2, 3, 4]
            }
        );
        assert_eq!(entries[4].name(), None);
        assert_eq!(entries[2].name(), Some("LC_RPATH"));
    }

    #[test]
    fn test_overrun_stops_iteration() {
        let mut b = MachOBuilder::new(false, true);
        b.uuid([1; 16]);
        b.uuid([2; 16]);
        let mut data = b.build();
        // Inflate the second command's size past the command block.
        let second = 32 + 24 + 4;
        data[second..second + 4].copy_from_slice(&0x1000u32.to_le_bytes());

        let results = commands(&data);
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(Error::MalformedLoadCommands { offset: 56, .. })
        ));
    }

    #[test]
    fn test_short_body_is_local() {
        let mut b = MachOBuilder::new(false, true);
        b.raw_command(LC_UUID, &[1, 2, 3, 4]);
        b.symtab(0x1000, 1, 0x1010, 8);
        let data = b.build();

        let results = commands(&data);
        assert_eq!(results.len(), 2);
        assert!(matches!(
            results[0],
            Err(Error::MalformedLoadCommands { offset: 32, .. })
        ));
        match &results[1] {
            Ok(entry) => assert!(matches!(entry.command, LoadCommand::Symtab(_))),
            Err(e) => panic!("symtab after a short command: {e}"),
        }
    }

    #[test]
    fn test_zero_size_command() {
        let mut b = MachOBuilder::new(false, true);
        b.uuid([1; 16]);
        let mut data = b.build();
        data[36..40].copy_from_slice(&0u32.to_le_bytes());

        let results = commands(&data);
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(Error::MalformedLoadCommands { .. })));
    }

    #[test]
    fn test_restartable() {
        let data = sample(false, true);
        let header = MachHeader::parse(data.as_slice(), 0).unwrap();
        let first: Vec<_> = LoadCommands::new(data.as_slice(), &header, 0)
            .map(|e| e.unwrap())
            .collect();
        let second: Vec<_> = LoadCommands::new(data.as_slice(), &header, 0)
            .map(|e| e.unwrap())
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_platform_name() {
        assert_eq!(platform_name(PLATFORM_IOS), "iOS");
        assert_eq!(platform_name(99), "unknown");
    }
}
