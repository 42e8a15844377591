//! machread - Inspect Mach-O binaries and dyld shared cache images.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

use machread::codesign::slot_name;
use machread::dyld::ExportTarget;
use machread::macho::{arch_name, load_command_name, platform_name, Segment};
use machread::util::uuid_string;
use machread::{BindKind, ByteSource, DyldCache, LoadCommand, MachFile, MappedFile};

/// Inspect Mach-O binaries and dyld shared cache images.
#[derive(Parser, Debug)]
#[command(name = "machread")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity (-v warnings, -vv info, -vvv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbosity: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Which file to decode.
#[derive(Args, Debug)]
struct Target {
    /// Mach-O, fat binary or dyld shared cache
    path: PathBuf,

    /// Fat slice to use (e.g., "arm64", "x86_64")
    #[arg(short, long)]
    arch: Option<String>,

    /// Image inside a dyld shared cache (path or name substring)
    #[arg(short, long)]
    image: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum KindArg {
    Normal,
    Weak,
    Lazy,
}

impl From<KindArg> for BindKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Normal => BindKind::Normal,
            KindArg::Weak => BindKind::Weak,
            KindArg::Lazy => BindKind::Lazy,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the Mach-O header
    Header(Target),

    /// List load commands
    Commands(Target),

    /// List symbol table entries
    Symbols(Target),

    /// List linked libraries
    Dylibs(Target),

    /// List exported symbols from the export trie
    Exports(Target),

    /// List rebase operations
    Rebases(Target),

    /// List bind operations
    Binds {
        #[command(flatten)]
        target: Target,

        /// Which bind stream to decode
        #[arg(short, long, value_enum, default_value = "normal")]
        kind: KindArg,
    },

    /// Show the embedded code signature
    Codesign {
        #[command(flatten)]
        target: Target,

        /// Print the entitlements property list
        #[arg(short, long)]
        entitlements: bool,
    },

    /// List function start addresses
    FunctionStarts(Target),

    /// List images in a dyld shared cache
    Cache {
        /// Path to the dyld shared cache
        path: PathBuf,

        /// Filter images by name
        #[arg(short, long)]
        filter: Option<String>,

        /// Show addresses
        #[arg(short = 'A', long)]
        addresses: bool,
    },
}

impl Commands {
    fn target(&self) -> Option<&Target> {
        match self {
            Commands::Header(t)
            | Commands::Commands(t)
            | Commands::Symbols(t)
            | Commands::Dylibs(t)
            | Commands::Exports(t)
            | Commands::Rebases(t)
            | Commands::FunctionStarts(t) => Some(t),
            Commands::Binds { target, .. } | Commands::Codesign { target, .. } => Some(target),
            Commands::Cache { .. } => None,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbosity);

    if let Commands::Cache {
        path,
        filter,
        addresses,
    } = &cli.command
    {
        return cmd_cache(path, filter.as_deref(), *addresses);
    }

    let Some(target) = cli.command.target() else {
        return Ok(());
    };
    let mapped = MappedFile::open(&target.path)
        .with_context(|| format!("Failed to open {}", target.path.display()))?;

    match &target.image {
        Some(name) => {
            let cache = DyldCache::parse(&mapped)
                .with_context(|| format!("Not a dyld shared cache: {}", target.path.display()))?;
            let file = cache
                .image(name)
                .with_context(|| format!("Failed to open image: {}", name))?;
            run(&file, &cli.command)
        }
        None => {
            let file = MachFile::parse_arch(&mapped, target.arch.as_deref())
                .with_context(|| format!("Failed to parse {}", target.path.display()))?;
            run(&file, &cli.command)
        }
    }
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        _ => Level::DEBUG,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .finish();

    tracing::subscriber::set_global_default(subscriber).ok();
}

fn run<S: ByteSource>(file: &MachFile<S>, command: &Commands) -> Result<()> {
    match command {
        Commands::Header(_) => cmd_header(file),
        Commands::Commands(_) => cmd_commands(file),
        Commands::Symbols(_) => cmd_symbols(file),
        Commands::Dylibs(_) => cmd_dylibs(file),
        Commands::Exports(_) => cmd_exports(file),
        Commands::Rebases(_) => cmd_rebases(file),
        Commands::Binds { kind, .. } => cmd_binds(file, (*kind).into()),
        Commands::Codesign { entitlements, .. } => cmd_codesign(file, *entitlements),
        Commands::FunctionStarts(_) => cmd_function_starts(file),
        Commands::Cache { .. } => Ok(()),
    }
}

fn segment_name(segments: &[Segment], index: u8) -> &str {
    segments
        .get(index as usize)
        .map_or("?", |seg| seg.name.as_str())
}

fn cmd_header<S: ByteSource>(file: &MachFile<S>) -> Result<()> {
    let header = file.header();

    println!("Mach-O Header");
    println!("=============");
    println!("Magic:        {:#010x}", header.magic);
    println!(
        "CPU:          {} ({:#x}/{:#x})",
        arch_name(header.cputype, header.cpusubtype),
        header.cputype,
        header.cpusubtype
    );
    println!("File type:    {}", header.filetype_name());
    println!("Commands:     {} ({} bytes)", header.ncmds, header.sizeofcmds);
    println!("Flags:        {:?}", header.flags());
    println!("64-bit:       {}", header.is_64());
    println!("Swapped:      {}", header.is_swapped());

    if let Some(uuid) = file.uuid()? {
        println!("UUID:         {}", uuid_string(&uuid));
    }
    if let Some(build) = file.build_version()? {
        println!(
            "Platform:     {} {} (SDK {})",
            platform_name(build.platform),
            build.minos,
            build.sdk
        );
    }
    if let Some(entry) = file.entry_point()? {
        println!("Entry point:  {:#x}", entry.entryoff);
    }

    Ok(())
}

fn describe(command: &LoadCommand) -> String {
    match command {
        LoadCommand::Segment(seg) => format!(
            "{} vmaddr={:#x} vmsize={:#x} fileoff={:#x} sections={}",
            seg.name,
            seg.vmaddr,
            seg.vmsize,
            seg.fileoff,
            seg.sections.len()
        ),
        LoadCommand::Symtab(symtab) => format!("nsyms={} strsize={}", symtab.nsyms, symtab.strsize),
        LoadCommand::IdDylib(dylib) => dylib.name.clone(),
        LoadCommand::Dylib(dep) => format!("{} ({})", dep.dylib.name, dep.kind.as_str()),
        LoadCommand::Dylinker { name, .. } | LoadCommand::SubName { name, .. } => name.clone(),
        LoadCommand::Rpath(path) => path.clone(),
        LoadCommand::Uuid(uuid) => uuid_string(uuid),
        LoadCommand::LinkeditData(data) => {
            format!("dataoff={:#x} datasize={:#x}", data.dataoff, data.datasize)
        }
        LoadCommand::VersionMin { version, sdk, .. } => format!("{} (SDK {})", version, sdk),
        LoadCommand::BuildVersion(build) => format!(
            "{} {} (SDK {})",
            platform_name(build.platform),
            build.minos,
            build.sdk
        ),
        LoadCommand::SourceVersion(version) => version.to_string(),
        LoadCommand::Main(entry) => format!("entryoff={:#x}", entry.entryoff),
        LoadCommand::EncryptionInfo(info) => format!(
            "cryptoff={:#x} cryptsize={:#x} cryptid={}",
            info.cryptoff, info.cryptsize, info.cryptid
        ),
        LoadCommand::FilesetEntry {
            vmaddr, entry_id, ..
        } => format!("{} vmaddr={:#x}", entry_id, vmaddr),
        LoadCommand::LinkerOption(options) => options.join(" "),
        _ => String::new(),
    }
}

fn cmd_commands<S: ByteSource>(file: &MachFile<S>) -> Result<()> {
    for (index, entry) in file.load_commands().enumerate() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("malformed load command: {}", e);
                continue;
            }
        };
        let name = load_command_name(entry.cmd).map_or_else(
            || format!("{:#x}", entry.cmd),
            |name| name.to_string(),
        );
        println!(
            "{:3}  {:#08x}  {:<26} {:5}  {}",
            index,
            entry.offset,
            name,
            entry.cmdsize,
            describe(&entry.command)
        );
    }
    Ok(())
}

fn cmd_symbols<S: ByteSource>(file: &MachFile<S>) -> Result<()> {
    let Some(table) = file.symbols()? else {
        println!("No symbol table");
        return Ok(());
    };

    for symbol in table.iter() {
        match symbol {
            Ok(sym) => println!("{:016x} {} {}", sym.n_value, sym.nm_kind(), sym.name),
            Err(e) => {
                warn!("symbol table truncated: {}", e);
                break;
            }
        }
    }
    Ok(())
}

fn cmd_dylibs<S: ByteSource>(file: &MachFile<S>) -> Result<()> {
    if let Some(id) = file.id_dylib()? {
        println!("{} (id, current version {})", id.name, id.current_version);
    }
    for dep in file.dylibs()? {
        println!(
            "{} ({}, compatibility version {}, current version {})",
            dep.dylib.name,
            dep.kind.as_str(),
            dep.dylib.compatibility_version,
            dep.dylib.current_version
        );
    }
    for rpath in file.rpaths()? {
        println!("rpath {}", rpath);
    }
    Ok(())
}

fn cmd_exports<S: ByteSource>(file: &MachFile<S>) -> Result<()> {
    for export in file.exported_symbols()? {
        let export = match export {
            Ok(export) => export,
            Err(e) => {
                warn!("skipping malformed trie node: {}", e);
                continue;
            }
        };
        match &export.target {
            ExportTarget::Regular { address } => {
                println!("{:#012x}  {}  [{}]", address, export.name, export.flags.kind_name())
            }
            ExportTarget::StubAndResolver {
                stub_offset,
                resolver_offset,
            } => println!(
                "{:#012x}  {}  [resolver {:#x}]",
                stub_offset, export.name, resolver_offset
            ),
            ExportTarget::Reexport {
                library_ordinal,
                import_name,
            } => println!(
                "{:>12}  {}  [re-export from #{} {}]",
                "",
                export.name,
                library_ordinal,
                import_name.as_deref().unwrap_or(&export.name)
            ),
        }
    }
    Ok(())
}

fn cmd_rebases<S: ByteSource>(file: &MachFile<S>) -> Result<()> {
    let segments = file.segments()?;
    for rebase in file.rebase_operations()? {
        match rebase {
            Ok(op) => println!(
                "{:<16} {:#010x}  {}",
                segment_name(&segments, op.segment_index),
                op.segment_offset,
                op.rebase_type.as_str()
            ),
            Err(e) => {
                warn!("rebase stream stopped: {}", e);
                break;
            }
        }
    }
    Ok(())
}

fn cmd_binds<S: ByteSource>(file: &MachFile<S>, kind: BindKind) -> Result<()> {
    let segments = file.segments()?;
    for bind in file.bind_operations(kind)? {
        match bind {
            Ok(op) => println!(
                "{:<16} {:#010x}  {:>4}  {}{}",
                segment_name(&segments, op.segment_index),
                op.segment_offset,
                op.library_ordinal.value(),
                op.symbol_name,
                if op.addend != 0 {
                    format!(" + {:#x}", op.addend)
                } else {
                    String::new()
                }
            ),
            Err(e) => {
                warn!("{} bind stream stopped: {}", kind.as_str(), e);
                break;
            }
        }
    }
    Ok(())
}

fn cmd_codesign<S: ByteSource>(file: &MachFile<S>, entitlements: bool) -> Result<()> {
    let Some(signature) = file.code_signature()? else {
        println!("Not signed");
        return Ok(());
    };

    println!("Blobs:");
    for index in signature.indices() {
        println!(
            "  {:#07x} {:<24} at {:#x}",
            index.slot_type,
            slot_name(index.slot_type),
            index.offset
        );
    }

    for cd in signature.code_directories()? {
        println!("\nCodeDirectory (slot {:#x})", cd.slot);
        println!("  Identifier:  {}", cd.identifier());
        if let Some(team) = cd.team_id() {
            println!("  Team ID:     {}", team);
        }
        println!("  Version:     {:#x}", cd.version());
        println!("  Flags:       {:?}", cd.flags());
        println!("  Hash:        {}", cd.hash_type_name());
        println!(
            "  Slots:       {} code, {} special",
            cd.header.n_code_slots, cd.header.n_special_slots
        );
        println!("  Code limit:  {:#x}", cd.code_limit());
        if let Some(exec) = cd.exec_segment() {
            println!("  Exec seg:    {:#x}+{:#x} {:?}", exec.base, exec.limit, exec.flags);
        }
    }

    if let Some(reqs) = signature.requirements()? {
        println!("\nRequirements: {}", reqs.len());
    }
    if let Some(cms) = signature.signature()? {
        println!("CMS signature: {} bytes", cms.len());
    }

    if entitlements {
        match signature.entitlements()? {
            Some(plist) => println!("\n{}", String::from_utf8_lossy(plist)),
            None => println!("\nNo entitlements"),
        }
    }
    Ok(())
}

fn cmd_function_starts<S: ByteSource>(file: &MachFile<S>) -> Result<()> {
    for start in file.function_starts()? {
        match start {
            Ok(start) => println!("{:#x}", start.address),
            Err(e) => {
                warn!("function starts truncated: {}", e);
                break;
            }
        }
    }
    Ok(())
}

fn cmd_cache(path: &Path, filter: Option<&str>, addresses: bool) -> Result<()> {
    let mapped =
        MappedFile::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let cache = DyldCache::parse(&mapped)
        .with_context(|| format!("Failed to open cache: {}", path.display()))?;

    println!("Architecture: {}", cache.architecture());
    println!("UUID:         {}", uuid_string(&cache.uuid()));
    println!("Mappings:");
    for mapping in cache.mappings() {
        println!(
            "  {:#014x}-{:#014x}  file {:#x}  {}",
            mapping.address,
            mapping.address + mapping.size,
            mapping.file_offset,
            mapping.init_prot.to_rwx()
        );
    }
    println!("Images:");
    for image in cache.images() {
        if filter.is_some_and(|f| !image.matches_filter(f)) {
            continue;
        }
        if addresses {
            println!("  {:#018x}  {}", image.address, image.path);
        } else {
            println!("  {}", image.path);
        }
    }
    Ok(())
}
