use std::path::{Path, PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand};
use defschema_core::{
    CacheDescriptor, MergeStrategy, NodeQuery, SchemaCache, render_outline, validate_cache,
};
use defschema_db::{LibraryConfig, MANIFEST_FILE, Manifest, SchemaLibrary, read_cache, write_cache};
use defschema_extract::{
    ExtractionConfig, ExtractionSession, LiveDescriptor, ModuleScanner, OutputFormat,
    format_definitions,
};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "defschema")]
#[command(about = "Definition schema extraction and cache management", version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Extract a base module and its add-ons into one merged cache.
    Extract(ExtractArgs),
    /// Merge persisted caches left to right into one cache.
    Merge(MergeArgs),
    /// Print the field tree of one type.
    Inspect(InspectArgs),
    /// Print the definitions of a cache.
    Outline(OutlineArgs),
    /// Check caches for dangling handles and malformed fields.
    Validate(ValidateArgs),
    /// List the child tags or values allowed at an XML path.
    Query(QueryArgs),
}

#[derive(Debug, Args)]
struct ExtractArgs {
    /// Library configuration YAML (base module, add-ons, cache directory).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Base module type manifest; overrides the configured one.
    #[arg(long)]
    module: Option<PathBuf>,
    /// Add-on module type manifest; may be repeated.
    #[arg(long = "addon")]
    addons: Vec<PathBuf>,
    /// Directory for persisted per-module caches.
    #[arg(long)]
    cache_dir: Option<PathBuf>,
    /// Worker threads for add-on extraction.
    #[arg(long)]
    jobs: Option<usize>,
    /// Ignore persisted caches.
    #[arg(long)]
    force: bool,
    /// Merged cache output path (`.gz` for compressed output).
    #[arg(long)]
    output: PathBuf,
}

#[derive(Debug, Args)]
struct MergeArgs {
    /// Cache files, merged in the given order.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Merged cache output path.
    #[arg(long)]
    output: PathBuf,
    /// Replace definitions with an existing tag instead of appending them.
    #[arg(long)]
    overwrite: bool,
}

#[derive(Debug, Args)]
struct InspectArgs {
    /// Full type name (or tag name when reading a cache).
    type_name: String,
    /// Describe the type live from a module type manifest.
    #[arg(long, conflicts_with = "cache", required_unless_present = "cache")]
    module: Option<PathBuf>,
    /// Describe the type from a persisted cache.
    #[arg(long)]
    cache: Option<PathBuf>,
    /// Extraction settings YAML used with --module.
    #[arg(long, requires = "module")]
    config: Option<PathBuf>,
    /// Maximum nesting depth to print.
    #[arg(long, default_value_t = 4)]
    depth: usize,
}

#[derive(Debug, Args)]
struct OutlineArgs {
    /// Cache file.
    #[arg(long)]
    cache: PathBuf,
    /// Output format.
    #[arg(long, default_value = "table")]
    format: OutputFormat,
}

#[derive(Debug, Args)]
struct ValidateArgs {
    /// Cache files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

#[derive(Debug, Args)]
struct QueryArgs {
    /// Cache file.
    #[arg(long)]
    cache: PathBuf,
    /// Slash-separated XML path, e.g. `ThingDef/comps/li`. Omit to list
    /// root tags.
    path: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Extract(args) => run_extract(args),
        Command::Merge(args) => run_merge(args),
        Command::Inspect(args) => run_inspect(args),
        Command::Outline(args) => run_outline(args),
        Command::Validate(args) => run_validate(args),
        Command::Query(args) => run_query(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_cache(path: &Path) -> Result<SchemaCache, String> {
    read_cache(path).map_err(|e| format!("Failed to read cache '{}': {e}", path.display()))
}

fn store_cache(path: &Path, cache: &SchemaCache) -> Result<(), String> {
    write_cache(path, cache).map_err(|e| format!("Failed to write '{}': {e}", path.display()))
}

fn run_extract(args: ExtractArgs) -> Result<(), String> {
    let mut config = match (&args.config, &args.module) {
        (Some(path), _) => LibraryConfig::load(path)
            .map_err(|e| format!("Failed to load config '{}': {e}", path.display()))?,
        (None, Some(module)) => LibraryConfig::new(module),
        (None, None) => return Err("Specify a base module with --module or --config".to_string()),
    };
    if let Some(module) = args.module {
        config.base_module = module;
    }
    config.addons.extend(args.addons);
    if let Some(dir) = args.cache_dir {
        config.cache_dir = dir;
    }
    if let Some(jobs) = args.jobs {
        config.jobs = jobs;
    }

    let previous_manifest = config.cache_dir.join(MANIFEST_FILE);
    let previous = Manifest::load(&previous_manifest).ok();

    let library = SchemaLibrary::from_config(&config, args.force);
    if !library.contains_module(&config.base_module) {
        return Err(format!(
            "Failed to load base module '{}'",
            config.base_module.display()
        ));
    }

    if let Some(previous) = previous {
        for module in previous.changed_since(library.manifest()) {
            println!("Changed since last run: {module}");
        }
    }
    if let Err(err) = library.save_manifest() {
        warn!(error = %err, "could not write module manifest");
    }

    let cache = library.cache();
    store_cache(&args.output, cache)?;
    println!(
        "Extracted {} definition(s), {} schema(s), {} variant(s) from {} module(s) into '{}'.",
        cache.definitions.len(),
        cache.schemas.len(),
        cache.variants.len(),
        library.manifest().len(),
        args.output.display()
    );
    Ok(())
}

fn run_merge(args: MergeArgs) -> Result<(), String> {
    let strategy = if args.overwrite {
        MergeStrategy::Overwrite
    } else {
        MergeStrategy::Append
    };

    let mut merged = SchemaCache::default();
    for input in &args.inputs {
        let cache = load_cache(input)?;
        let report = merged.merge_with(&cache, strategy);
        debug!(input = %input.display(), ?report, "merged cache");
        if report.variant_collisions > 0 {
            eprintln!(
                "{}: {} variant name collision(s), existing variants kept",
                input.display(),
                report.variant_collisions
            );
        }
    }

    store_cache(&args.output, &merged)?;
    println!(
        "Merged {} cache(s) into '{}' ({} definition(s)).",
        args.inputs.len(),
        args.output.display(),
        merged.definitions.len()
    );
    Ok(())
}

fn run_inspect(args: InspectArgs) -> Result<(), String> {
    let outline = if let Some(module) = &args.module {
        let config = match &args.config {
            Some(path) => ExtractionConfig::load(path)
                .map_err(|e| format!("Failed to load config '{}': {e}", path.display()))?,
            None => ExtractionConfig::default(),
        };
        let scanner = ModuleScanner::load(module).map_err(|e| e.to_string())?;
        let mut descriptor = LiveDescriptor::new(ExtractionSession::new(&scanner, config));
        render_outline(&mut descriptor, &args.type_name, args.depth)
    } else if let Some(path) = &args.cache {
        let cache = load_cache(path)?;
        let mut descriptor = CacheDescriptor::new(&cache);
        render_outline(&mut descriptor, &args.type_name, args.depth)
    } else {
        return Err("Specify --module or --cache".to_string());
    };

    match outline {
        Some(text) => {
            print!("{text}");
            Ok(())
        }
        None => Err(format!("Unknown type '{}'", args.type_name)),
    }
}

fn run_outline(args: OutlineArgs) -> Result<(), String> {
    let cache = load_cache(&args.cache)?;
    let raw = format_definitions(&cache, args.format)?;
    print!("{raw}");
    if !raw.ends_with('\n') {
        println!();
    }
    Ok(())
}

fn run_validate(args: ValidateArgs) -> Result<(), String> {
    let mut invalid = 0usize;
    for input in &args.inputs {
        let cache = load_cache(input)?;
        let problems = validate_cache(&cache);
        if problems.is_empty() {
            continue;
        }
        invalid += 1;
        eprintln!("{}: {} problem(s)", input.display(), problems.len());
        for problem in &problems {
            eprintln!("  {problem}");
        }
    }

    if invalid > 0 {
        return Err(format!("{invalid} of {} cache(s) failed validation", args.inputs.len()));
    }
    println!("Validated {} cache file(s).", args.inputs.len());
    Ok(())
}

fn run_query(args: QueryArgs) -> Result<(), String> {
    let cache = load_cache(&args.cache)?;
    let query = NodeQuery::new(&cache);
    let lines = match args.path.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        Some(path) => query.child_names_or_values(path),
        None => query.root_tags().into_iter().map(String::from).collect(),
    };
    for line in lines {
        println!("{line}");
    }
    Ok(())
}
