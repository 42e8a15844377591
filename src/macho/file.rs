//! The Mach-O file view.
//!
//! [`MachFile`] decodes only the header eagerly. Every other accessor walks
//! the load commands again and reads what it needs from the byte source, so
//! accessors are independent: a malformed bind stream does not prevent
//! reading the symbol table.

use super::constants::*;
use super::fat::{find_arch, is_fat, parse_fat_archs};
use super::header::MachHeader;
use super::linkedit::{parse_data_in_code, DataInCode, FunctionStarts};
use super::load_command::*;
use super::structs::*;
use super::symbols::{StringTable, SymbolTable};
use crate::codesign::CodeSignature;
use crate::dyld::trie::{self, ExportWalker, ExportedSymbol};
use crate::dyld::{BindKind, BindOperations, RebaseOperations};
use crate::error::Result;
use crate::limits::Limits;
use crate::source::ByteSource;

/// A decoded Mach-O image over a byte source.
///
/// `header_offset` locates the header inside the source (non-zero for fat
/// slices and cache images). `data_base` is added to every link-edit file
/// offset: the slice offset for fat binaries, zero for thin files and for
/// dyld cache images, whose offsets are already cache-relative.
#[derive(Debug, Clone)]
pub struct MachFile<S> {
    source: S,
    header: MachHeader,
    header_offset: u64,
    data_base: u64,
    limits: Limits,
}

impl<S: ByteSource> MachFile<S> {
    /// Parses a thin Mach-O, or the first slice of a fat binary.
    pub fn parse(source: S) -> Result<Self> {
        Self::parse_arch(source, None)
    }

    /// Parses a Mach-O, selecting a fat slice by architecture name.
    ///
    /// `arch` is ignored for thin files. For fat files without `arch` the
    /// first slice is used.
    pub fn parse_arch(source: S, arch: Option<&str>) -> Result<Self> {
        if !is_fat(&source) {
            return Self::parse_at(source, 0, 0);
        }

        let archs = parse_fat_archs(&source)?;
        let slice = match arch {
            Some(name) => find_arch(&archs, name)?,
            None => match archs.first() {
                Some(first) => {
                    tracing::debug!(arch = first.name(), "using first fat slice");
                    *first
                }
                None => find_arch(&archs, "any")?,
            },
        };
        Self::parse_at(source, slice.offset, slice.offset)
    }

    /// Parses the header at `header_offset`, resolving link-edit offsets
    /// against `data_base`.
    pub fn parse_at(source: S, header_offset: u64, data_base: u64) -> Result<Self> {
        let header = MachHeader::parse(&source, header_offset)?;
        tracing::debug!(
            header_offset,
            filetype = header.filetype_name(),
            ncmds = header.ncmds,
            swapped = header.is_swapped(),
            "parsed Mach-O header"
        );
        Ok(Self {
            source,
            header,
            header_offset,
            data_base,
            limits: Limits::default(),
        })
    }

    /// Replaces the decoder limits.
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Decoder limits in effect.
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// The underlying byte source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The decoded header.
    pub fn header(&self) -> &MachHeader {
        &self.header
    }

    /// Offset of the header inside the source.
    pub fn header_offset(&self) -> u64 {
        self.header_offset
    }

    /// Base added to link-edit file offsets.
    pub fn data_base(&self) -> u64 {
        self.data_base
    }

    // =========================================================================
    // Load Commands
    // =========================================================================

    /// Lazily iterates over the load commands, re-reading them on each call.
    pub fn load_commands(&self) -> LoadCommands<'_, S> {
        LoadCommands::new(&self.source, &self.header, self.header_offset)
    }

    fn first_command<T>(&self, mut f: impl FnMut(LoadCommand) -> Option<T>) -> Result<Option<T>> {
        let mut commands = self.load_commands();
        while let Some(entry) = commands.next() {
            match entry {
                Ok(entry) => {
                    if let Some(found) = f(entry.command) {
                        return Ok(Some(found));
                    }
                }
                Err(err) if commands.is_fused() => return Err(err),
                Err(err) => tracing::debug!(error = %err, "skipping undecodable load command"),
            }
        }
        Ok(None)
    }

    fn all_commands<T>(&self, mut f: impl FnMut(LoadCommand) -> Option<T>) -> Result<Vec<T>> {
        let mut found = Vec::new();
        let mut commands = self.load_commands();
        while let Some(entry) = commands.next() {
            match entry {
                Ok(entry) => found.extend(f(entry.command)),
                Err(err) if commands.is_fused() => return Err(err),
                Err(err) => tracing::debug!(error = %err, "skipping undecodable load command"),
            }
        }
        Ok(found)
    }

    /// All segments in load command order.
    pub fn segments(&self) -> Result<Vec<Segment>> {
        self.all_commands(|cmd| match cmd {
            LoadCommand::Segment(seg) => Some(seg),
            _ => None,
        })
    }

    /// All sections of all segments.
    pub fn sections(&self) -> Result<Vec<Section>> {
        Ok(self
            .segments()?
            .into_iter()
            .flat_map(|seg| seg.sections)
            .collect())
    }

    /// The first segment named `name`.
    pub fn segment(&self, name: &str) -> Result<Option<Segment>> {
        self.first_command(|cmd| match cmd {
            LoadCommand::Segment(seg) if seg.name == name => Some(seg),
            _ => None,
        })
    }

    /// A section by segment and section name.
    pub fn section(&self, segname: &str, sectname: &str) -> Result<Option<Section>> {
        Ok(self
            .segment(segname)?
            .and_then(|seg| seg.section(sectname).cloned()))
    }

    /// Converts a virtual address to an offset in the byte source.
    ///
    /// Returns `None` if no segment maps the address to file bytes.
    pub fn addr_to_offset(&self, addr: u64) -> Result<Option<u64>> {
        Ok(self.segments()?.iter().find_map(|seg| {
            let delta = addr.checked_sub(seg.vmaddr)?;
            if delta >= seg.filesize {
                return None;
            }
            self.data_base.checked_add(seg.fileoff)?.checked_add(delta)
        }))
    }

    /// LC_SYMTAB, if present.
    pub fn symtab(&self) -> Result<Option<SymtabCommand>> {
        self.first_command(|cmd| match cmd {
            LoadCommand::Symtab(symtab) => Some(symtab),
            _ => None,
        })
    }

    /// LC_DYSYMTAB, if present.
    pub fn dysymtab(&self) -> Result<Option<DysymtabCommand>> {
        self.first_command(|cmd| match cmd {
            LoadCommand::Dysymtab(dysymtab) => Some(dysymtab),
            _ => None,
        })
    }

    /// Dependent libraries in load order.
    pub fn dylibs(&self) -> Result<Vec<DependedDylib>> {
        self.all_commands(|cmd| match cmd {
            LoadCommand::Dylib(dylib) => Some(dylib),
            _ => None,
        })
    }

    /// The image's own install name, for dylibs.
    pub fn id_dylib(&self) -> Result<Option<Dylib>> {
        self.first_command(|cmd| match cmd {
            LoadCommand::IdDylib(dylib) => Some(dylib),
            _ => None,
        })
    }

    /// Runpath search paths.
    pub fn rpaths(&self) -> Result<Vec<String>> {
        self.all_commands(|cmd| match cmd {
            LoadCommand::Rpath(path) => Some(path),
            _ => None,
        })
    }

    /// LC_UUID, if present.
    pub fn uuid(&self) -> Result<Option<[u8; 16]>> {
        self.first_command(|cmd| match cmd {
            LoadCommand::Uuid(uuid) => Some(uuid),
            _ => None,
        })
    }

    /// LC_DYLD_INFO(_ONLY), if present.
    pub fn dyld_info(&self) -> Result<Option<DyldInfoCommand>> {
        self.first_command(|cmd| match cmd {
            LoadCommand::DyldInfo { command, .. } => Some(command),
            _ => None,
        })
    }

    /// The link-edit data command with constant `cmd`, if present.
    pub fn linkedit_data(&self, cmd: u32) -> Result<Option<LinkeditDataCommand>> {
        self.first_command(|command| match command {
            LoadCommand::LinkeditData(data) if data.cmd == cmd => Some(data),
            _ => None,
        })
    }

    /// LC_ENCRYPTION_INFO(_64), if present.
    pub fn encryption_info(&self) -> Result<Option<EncryptionInfo>> {
        self.first_command(|cmd| match cmd {
            LoadCommand::EncryptionInfo(info) => Some(info),
            _ => None,
        })
    }

    /// LC_BUILD_VERSION, if present.
    pub fn build_version(&self) -> Result<Option<BuildVersion>> {
        self.first_command(|cmd| match cmd {
            LoadCommand::BuildVersion(version) => Some(version),
            _ => None,
        })
    }

    /// LC_MAIN, if present.
    pub fn entry_point(&self) -> Result<Option<EntryPointCommand>> {
        self.first_command(|cmd| match cmd {
            LoadCommand::Main(entry) => Some(entry),
            _ => None,
        })
    }

    // =========================================================================
    // Link-Edit Data
    // =========================================================================

    /// Reads `size` bytes at link-edit offset `offset`. Zero size reads nothing.
    fn read_linkedit(&self, offset: u32, size: u32) -> Result<Vec<u8>> {
        if size == 0 {
            return Ok(Vec::new());
        }
        self.source
            .read_bytes(self.data_base + offset as u64, size as usize)
    }

    /// The symbol table, if the image has one.
    pub fn symbols(&self) -> Result<Option<SymbolTable<'_, S>>> {
        Ok(self.symtab()?.map(|symtab| {
            SymbolTable::new(
                &self.source,
                &symtab,
                self.data_base,
                self.header.swap_policy(),
                self.header.is_64(),
                self.limits.max_string_len,
            )
        }))
    }

    /// The string table, if the image has one.
    pub fn strings(&self) -> Result<Option<StringTable<'_, S>>> {
        Ok(self.symtab()?.map(|symtab| {
            StringTable::new(
                &self.source,
                self.data_base + symtab.stroff as u64,
                symtab.strsize,
                self.limits.max_string_len,
            )
        }))
    }

    /// Entries of the indirect symbol table (indices into the symbol table,
    /// or `INDIRECT_SYMBOL_LOCAL` / `INDIRECT_SYMBOL_ABS`).
    pub fn indirect_symbols(&self) -> Result<Vec<u32>> {
        let Some(dysymtab) = self.dysymtab()? else {
            return Ok(Vec::new());
        };
        let size = dysymtab.nindirectsyms.saturating_mul(4);
        let data = self.read_linkedit(dysymtab.indirectsymoff, size)?;
        let policy = self.header.swap_policy();
        Ok((0..data.len() / 4)
            .filter_map(|i| policy.read_u32_at(&data, i * 4))
            .collect())
    }

    /// Rebase operations from LC_DYLD_INFO; empty when absent.
    pub fn rebase_operations(&self) -> Result<RebaseOperations> {
        let Some(info) = self.dyld_info()? else {
            return Ok(RebaseOperations::empty());
        };
        let data = self.read_linkedit(info.rebase_off, info.rebase_size)?;
        Ok(RebaseOperations::new(data, self.header.pointer_size())
            .with_segment_sizes(self.segment_sizes()?)
            .with_max_repeat(self.limits.max_opcode_repeat))
    }

    /// Bind operations of one kind from LC_DYLD_INFO; empty when absent.
    pub fn bind_operations(&self, kind: BindKind) -> Result<BindOperations> {
        let Some(info) = self.dyld_info()? else {
            return Ok(BindOperations::empty(kind));
        };
        let (offset, size) = match kind {
            BindKind::Normal => (info.bind_off, info.bind_size),
            BindKind::Weak => (info.weak_bind_off, info.weak_bind_size),
            BindKind::Lazy => (info.lazy_bind_off, info.lazy_bind_size),
        };
        let data = self.read_linkedit(offset, size)?;
        Ok(BindOperations::new(data, kind, self.header.pointer_size())
            .with_segment_sizes(self.segment_sizes()?)
            .with_max_repeat(self.limits.max_opcode_repeat))
    }

    /// Segment vmsizes in load command order, as indexed by dyld opcodes.
    fn segment_sizes(&self) -> Result<Vec<u64>> {
        Ok(self.segments()?.iter().map(|seg| seg.vmsize).collect())
    }

    /// Raw export trie bytes, preferring LC_DYLD_EXPORTS_TRIE.
    pub fn export_trie(&self) -> Result<Vec<u8>> {
        if let Some(cmd) = self.linkedit_data(LC_DYLD_EXPORTS_TRIE)? {
            return self.read_linkedit(cmd.dataoff, cmd.datasize);
        }
        match self.dyld_info()? {
            Some(info) => self.read_linkedit(info.export_off, info.export_size),
            None => Ok(Vec::new()),
        }
    }

    /// Walks the export trie; empty when the image exports nothing.
    pub fn exported_symbols(&self) -> Result<ExportWalker<Vec<u8>>> {
        Ok(ExportWalker::new(
            self.export_trie()?,
            self.limits.max_trie_depth,
        ))
    }

    /// Looks up one exported symbol by name.
    pub fn export_lookup(&self, name: &str) -> Result<Option<ExportedSymbol>> {
        trie::lookup(&self.export_trie()?, name, self.limits.max_trie_depth)
    }

    /// Function start addresses from LC_FUNCTION_STARTS; empty when absent.
    pub fn function_starts(&self) -> Result<FunctionStarts> {
        let Some(cmd) = self.linkedit_data(LC_FUNCTION_STARTS)? else {
            return Ok(FunctionStarts::empty());
        };
        let text_vmaddr = self.segment(SEG_TEXT)?.map_or(0, |seg| seg.vmaddr);
        let data = self.read_linkedit(cmd.dataoff, cmd.datasize)?;
        Ok(FunctionStarts::new(data, text_vmaddr))
    }

    /// Data-in-code ranges from LC_DATA_IN_CODE; empty when absent.
    pub fn data_in_code(&self) -> Result<Vec<DataInCode>> {
        let Some(cmd) = self.linkedit_data(LC_DATA_IN_CODE)? else {
            return Ok(Vec::new());
        };
        let data = self.read_linkedit(cmd.dataoff, cmd.datasize)?;
        Ok(parse_data_in_code(&data, self.header.swap_policy()))
    }

    /// The embedded code signature, if the image is signed.
    pub fn code_signature(&self) -> Result<Option<CodeSignature>> {
        let Some(cmd) = self.linkedit_data(LC_CODE_SIGNATURE)? else {
            return Ok(None);
        };
        let data = self.read_linkedit(cmd.dataoff, cmd.datasize)?;
        CodeSignature::parse(data, &self.limits).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codesign::{
        CSMAGIC_EMBEDDED_ENTITLEMENTS, CSMAGIC_EMBEDDED_SIGNATURE, CSSLOT_CODEDIRECTORY,
        CSSLOT_ENTITLEMENTS,
    };
    use crate::dyld::LibraryOrdinal;
    use crate::error::Error;
    use crate::testutil::{blob, code_directory, nlist, super_blob, uleb, MachOBuilder, SectionSpec, Writer};

    const TEXT: u64 = 0x1_0000_0000;
    const ENTITLEMENTS: &[u8] = b"<plist><dict><key>get-task-allow</key><true/></dict></plist>";

    fn export_trie() -> Vec<u8> {
        let mut data = vec![0x00, 0x01];
        data.extend(b"_main\0");
        data.push(9);
        let mut info = uleb(0);
        info.extend(uleb(0xf00));
        data.extend(uleb(info.len() as u64));
        data.extend(info);
        data.push(0);
        data
    }

    fn fixture(big_endian: bool) -> Vec<u8> {
        let mut b = MachOBuilder::new(big_endian, true);

        let mut syms = nlist(big_endian, true, 1, N_SECT | N_EXT, 1, 0, TEXT + 0xf00);
        syms.extend(nlist(big_endian, true, 7, N_UNDF | N_EXT, 0, 0x0100, 0));
        let symoff = b.add_data(&syms);
        let stroff = b.add_data(b"\0_main\0_printf\0");

        let rebase = b.add_data(&[0x11, 0x21, 0x10, 0x51, 0x00]);
        let mut bind = vec![0x11, 0x40];
        bind.extend(b"_printf\0");
        bind.extend([0x51, 0x71, 0x08, 0x90, 0x00]);
        let bind_off = b.add_data(&bind);
        let mut lazy = vec![0x71, 0x00, 0x11, 0x40];
        lazy.extend(b"_printf\0");
        lazy.extend([0x90, 0x00]);
        let lazy_off = b.add_data(&lazy);
        let trie = export_trie();
        let trie_off = b.add_data(&trie);

        let mut starts = uleb(0xf00);
        starts.extend(uleb(0x20));
        starts.push(0);
        let starts_off = b.add_data(&starts);

        let mut dice = Writer::new(big_endian);
        dice.u32(0xf30).u16(8).u16(DICE_KIND_JUMP_TABLE32);
        let dice = dice.finish();
        let dice_off = b.add_data(&dice);

        let sig = super_blob(
            CSMAGIC_EMBEDDED_SIGNATURE,
            &[
                (CSSLOT_CODEDIRECTORY, code_directory("com.example.fixture", Some("TEAM1"), &[], &[[9; 32]])),
                (CSSLOT_ENTITLEMENTS, blob(CSMAGIC_EMBEDDED_ENTITLEMENTS, ENTITLEMENTS)),
            ],
        );
        let sig_off = b.add_data(&sig);

        let mut indirect = Writer::new(big_endian);
        indirect.u32(1).u32(INDIRECT_SYMBOL_LOCAL);
        let indirect_off = b.add_data(&indirect.finish());

        let mut dysymtab = Writer::new(big_endian);
        for field in [0, 1, 1, 0, 1, 1, 0, 0, 0, 0, 0, 0, indirect_off, 2, 0, 0, 0, 0] {
            dysymtab.u32(field);
        }

        b.segment(
            "__TEXT",
            TEXT,
            0x1000,
            0,
            0x1000,
            &[SectionSpec {
                name: "__text",
                addr: TEXT + 0xf00,
                size: 0x40,
                offset: 0xf00,
            }],
        )
        .segment("__DATA", TEXT + 0x1000, 0x1000, 0x1000, 0x1000, &[])
        .segment("__LINKEDIT", TEXT + 0x2000, 0x1000, 0x2000, 0x1000, &[])
        .dyld_info([
            (rebase, 5),
            (bind_off, bind.len() as u32),
            (0, 0),
            (lazy_off, lazy.len() as u32),
            (trie_off, trie.len() as u32),
        ])
        .symtab(symoff, 2, stroff, 15)
        .raw_command(LC_DYSYMTAB, &dysymtab.finish())
        .dylib(LC_LOAD_DYLIB, "/usr/lib/libSystem.B.dylib", 0x0501_0000, 0x0001_0000)
        .dylib(LC_LOAD_WEAK_DYLIB, "/usr/lib/libweak.dylib", 0x0001_0000, 0x0001_0000)
        .str_command(LC_RPATH, "@executable_path/../Frameworks")
        .uuid([0xab; 16])
        .main(0xf00)
        .linkedit(LC_FUNCTION_STARTS, starts_off, starts.len() as u32)
        .linkedit(LC_DATA_IN_CODE, dice_off, dice.len() as u32)
        .linkedit(LC_CODE_SIGNATURE, sig_off, sig.len() as u32);
        b.build()
    }

    #[test]
    fn test_structure_accessors() {
        for big_endian in [false, true] {
            let file = MachFile::parse(fixture(big_endian)).unwrap();
            assert_eq!(file.header().filetype, MH_EXECUTE);

            let segments = file.segments().unwrap();
            assert_eq!(
                segments.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
                ["__TEXT", "__DATA", "__LINKEDIT"]
            );
            assert_eq!(file.sections().unwrap().len(), 1);
            let text = file.section("__TEXT", "__text").unwrap().unwrap();
            assert_eq!(text.addr, TEXT + 0xf00);
            assert!(file.section("__DATA", "__data").unwrap().is_none());

            assert_eq!(file.addr_to_offset(TEXT + 0xf10).unwrap(), Some(0xf10));
            assert_eq!(file.addr_to_offset(TEXT + 0x1008).unwrap(), Some(0x1008));
            assert_eq!(file.addr_to_offset(0x1000).unwrap(), None);

            let dylibs = file.dylibs().unwrap();
            assert_eq!(dylibs.len(), 2);
            assert_eq!(dylibs[0].dylib.name, "/usr/lib/libSystem.B.dylib");
            assert_eq!(dylibs[0].dylib.current_version.to_string(), "1281.0");
            assert_eq!(dylibs[1].kind, DependencyKind::Weak);
            assert!(file.id_dylib().unwrap().is_none());
            assert_eq!(file.rpaths().unwrap(), ["@executable_path/../Frameworks"]);
            assert_eq!(file.uuid().unwrap(), Some([0xab; 16]));
            assert_eq!(file.entry_point().unwrap().unwrap().entryoff, 0xf00);
            assert!(file.encryption_info().unwrap().is_none());
            assert!(file.build_version().unwrap().is_none());
        }
    }

    #[test]
    fn test_symbols() {
        for big_endian in [false, true] {
            let file = MachFile::parse(fixture(big_endian)).unwrap();
            let table = file.symbols().unwrap().unwrap();
            assert_eq!(table.len(), 2);

            let symbols: Vec<_> = table.iter().map(|s| s.unwrap()).collect();
            assert_eq!(symbols[0].name, "_main");
            assert_eq!(symbols[0].n_value, TEXT + 0xf00);
            assert_eq!(symbols[1].name, "_printf");
            assert!(symbols[1].is_undefined());
            assert_eq!(symbols[1].library_ordinal(), 1);

            assert_eq!(file.strings().unwrap().unwrap().get(7), "_printf");
            assert_eq!(file.indirect_symbols().unwrap(), [1, INDIRECT_SYMBOL_LOCAL]);
        }
    }

    #[test]
    fn test_dyld_info_streams() {
        let file = MachFile::parse(fixture(false)).unwrap();

        let rebases: Vec<_> = file.rebase_operations().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(rebases.len(), 1);
        assert_eq!((rebases[0].segment_index, rebases[0].segment_offset), (1, 0x10));

        let binds: Vec<_> = file
            .bind_operations(BindKind::Normal)
            .unwrap()
            .map(|b| b.unwrap())
            .collect();
        assert_eq!(binds.len(), 1);
        assert_eq!(binds[0].symbol_name, "_printf");
        assert_eq!(binds[0].library_ordinal, LibraryOrdinal::Dylib(1));
        assert_eq!(binds[0].segment_offset, 8);

        assert_eq!(file.bind_operations(BindKind::Weak).unwrap().count(), 0);

        let lazy: Vec<_> = file
            .bind_operations(BindKind::Lazy)
            .unwrap()
            .map(|b| b.unwrap())
            .collect();
        assert_eq!(lazy.len(), 1);
        assert_eq!(lazy[0].kind, BindKind::Lazy);
    }

    #[test]
    fn test_exports_and_tables() {
        let file = MachFile::parse(fixture(true)).unwrap();

        let exports: Vec<_> = file.exported_symbols().unwrap().map(|e| e.unwrap()).collect();
        assert_eq!(exports.len(), 1);
        assert_eq!(exports[0].name, "_main");
        assert_eq!(exports[0].address(), Some(0xf00));
        assert!(file.export_lookup("_main").unwrap().is_some());
        assert!(file.export_lookup("_missing").unwrap().is_none());

        let starts: Vec<_> = file.function_starts().unwrap().map(|s| s.unwrap()).collect();
        assert_eq!(
            starts.iter().map(|s| s.address).collect::<Vec<_>>(),
            [TEXT + 0xf00, TEXT + 0xf20]
        );

        let dice = file.data_in_code().unwrap();
        assert_eq!(dice.len(), 1);
        assert_eq!(dice[0].offset, 0xf30);

        let sig = file.code_signature().unwrap().unwrap();
        let dirs = sig.code_directories().unwrap();
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].identifier(), "com.example.fixture");
    }

    #[test]
    fn test_signature_ignores_header_byte_order() {
        let little = MachFile::parse(fixture(false)).unwrap();
        let big = MachFile::parse(fixture(true)).unwrap();
        assert_ne!(little.header().is_swapped(), big.header().is_swapped());

        let little = little.code_signature().unwrap().unwrap();
        let big = big.code_signature().unwrap().unwrap();
        assert_eq!(little.as_bytes(), big.as_bytes());

        let little_dirs = little.code_directories().unwrap();
        let big_dirs = big.code_directories().unwrap();
        assert_eq!(little_dirs.len(), 1);
        assert_eq!(little_dirs.len(), big_dirs.len());
        for (l, b) in little_dirs.iter().zip(&big_dirs) {
            assert_eq!(l.header, b.header);
            assert_eq!(l.identifier(), "com.example.fixture");
            assert_eq!(l.identifier(), b.identifier());
            assert_eq!(l.team_id().as_deref(), Some("TEAM1"));
            assert_eq!(l.team_id(), b.team_id());
            assert_eq!(l.code_slot(0), Some(&[9u8; 32][..]));
            assert_eq!(l.code_slot(0), b.code_slot(0));
        }

        assert_eq!(little.entitlements().unwrap(), Some(ENTITLEMENTS));
        assert_eq!(little.entitlements().unwrap(), big.entitlements().unwrap());
    }

    #[test]
    fn test_absent_structures() {
        let mut b = MachOBuilder::new(false, false);
        b.segment("__TEXT", 0x1000, 0x1000, 0, 0x1000, &[]);
        let file = MachFile::parse(b.build()).unwrap();

        assert!(!file.header().is_64());
        assert!(file.symbols().unwrap().is_none());
        assert!(file.strings().unwrap().is_none());
        assert!(file.dyld_info().unwrap().is_none());
        assert!(file.code_signature().unwrap().is_none());
        assert!(file.uuid().unwrap().is_none());
        assert_eq!(file.rebase_operations().unwrap().count(), 0);
        assert_eq!(file.bind_operations(BindKind::Lazy).unwrap().count(), 0);
        assert_eq!(file.exported_symbols().unwrap().count(), 0);
        assert_eq!(file.function_starts().unwrap().count(), 0);
        assert!(file.data_in_code().unwrap().is_empty());
        assert!(file.indirect_symbols().unwrap().is_empty());
        assert!(file.export_lookup("_main").unwrap().is_none());
    }

    #[test]
    fn test_fat_slice() {
        let thin = fixture(false);
        let mut data = Writer::new(true);
        data.u32(FAT_MAGIC).u32(1);
        data.u32(CPU_TYPE_ARM64).u32(0).u32(0x4000).u32(thin.len() as u32).u32(14);
        let mut data = data.finish();
        data.resize(0x4000, 0);
        data.extend(&thin);

        let file = MachFile::parse_arch(data.as_slice(), Some("arm64")).unwrap();
        assert_eq!(file.header_offset(), 0x4000);
        assert_eq!(file.data_base(), 0x4000);
        let names: Vec<_> = file
            .symbols()
            .unwrap()
            .unwrap()
            .iter()
            .map(|s| s.unwrap().name)
            .collect();
        assert_eq!(names, ["_main", "_printf"]);
        assert_eq!(file.addr_to_offset(TEXT + 0x10).unwrap(), Some(0x4010));

        assert!(MachFile::parse(data.as_slice()).is_ok());
        assert!(matches!(
            MachFile::parse_arch(data.as_slice(), Some("x86_64")),
            Err(Error::ArchNotFound { .. })
        ));
    }

    #[test]
    fn test_with_limits() {
        let limits = Limits {
            max_string_len: 3,
            ..Limits::default()
        };
        let file = MachFile::parse(fixture(false)).unwrap().with_limits(limits);
        let first = file.symbols().unwrap().unwrap().get(0).unwrap().unwrap();
        assert_eq!(first.name, "_ma");
        assert_eq!(file.limits().max_string_len, 3);
    }

    #[test]
    fn test_short_command_body_is_skipped() {
        let mut b = MachOBuilder::new(false, true);
        let symoff = b.add_data(&nlist(false, true, 1, N_SECT | N_EXT, 1, 0, TEXT));
        let stroff = b.add_data(b"\0_main\0");
        b.raw_command(LC_UUID, &[1, 2, 3, 4]);
        b.symtab(symoff, 1, stroff, 7);
        let file = MachFile::parse(b.build()).unwrap();

        let results: Vec<_> = file.load_commands().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_err());
        assert!(results[1].is_ok());

        assert_eq!(file.uuid().unwrap(), None);
        let symbols = file.symbols().unwrap().unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols.get(0).unwrap().unwrap().name, "_main");
        assert!(file.code_signature().unwrap().is_none());
    }

    #[test]
    fn test_malformed_commands_are_local() {
        let mut data = fixture(false);
        // Corrupt the cmdsize of the last load command; the header still parses.
        let file = MachFile::parse(data.clone()).unwrap();
        let last = file.load_commands().last().unwrap().unwrap();
        let at = last.offset as usize + 4;
        data[at..at + 4].copy_from_slice(&0x1000u32.to_le_bytes());

        let file = MachFile::parse(data).unwrap();
        let results: Vec<_> = file.load_commands().collect();
        assert!(results[..results.len() - 1].iter().all(|r| r.is_ok()));
        assert!(matches!(
            results.last(),
            Some(Err(Error::MalformedLoadCommands { .. }))
        ));
        assert!(file.code_signature().is_err());
        assert_eq!(file.header().ncmds as usize, results.len());
    }
}
