use anyhow::Context;
use clap::Parser;
use coldstart_core::config::DEFAULT_CONFIG_FILE;
use coldstart_core::{
    generate_snapshot, CacheMode, CacheStore, CliOverrides, Collaborators, ExclusionRules,
    GenerateOptions, GeneratedScript, MemoryCache, SnapshotConfig,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// coldstart - bundle a module graph into a snapshot script
#[derive(Parser, Debug, Clone)]
#[command(name = "coldstart")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Entry module
    #[arg(value_name = "MAIN")]
    main: Option<PathBuf>,

    /// Path to coldstart.yaml configuration file
    #[arg(short, long, value_name = "FILE")]
    project: Option<PathBuf>,

    /// Base directory for display paths and relative exclude patterns
    #[arg(long, value_name = "DIR")]
    base_dir: Option<PathBuf>,

    /// Output script
    #[arg(short, long, value_name = "FILE")]
    out: Option<PathBuf>,

    /// Leave matching modules to the host loader (repeatable)
    #[arg(long, value_name = "GLOB")]
    exclude: Vec<String>,

    /// JSON file embedded as snapshotAuxiliaryData
    #[arg(long, value_name = "FILE")]
    aux_data: Option<PathBuf>,

    /// Transform cache directory
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Extra input folded into the cache invalidation key
    #[arg(long, value_name = "KEY")]
    invalidation_key: Option<String>,

    /// Disable the persistent transform cache
    #[arg(long)]
    no_cache: bool,

    /// Keep going when the cache cannot be written
    #[arg(long)]
    best_effort_cache: bool,

    /// Write the line position table as JSON
    #[arg(long, value_name = "FILE")]
    positions_out: Option<PathBuf>,

    /// Create a coldstart.yaml in the current directory
    #[arg(long)]
    init: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG takes precedence; --verbose only raises the default
    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.into()))
        .with_writer(std::io::stderr)
        .init();

    if cli.init {
        return init_project();
    }

    let config = load_config(&cli)?;
    let generated = run(&config)?;

    write_output(&config.output, &generated.script)?;
    println!(
        "Wrote {} ({} modules inlined)",
        config.output.display(),
        generated.positions.len()
    );

    if let Some(positions_path) = &config.positions_output {
        let json = serde_json::to_string_pretty(&generated.positions)?;
        write_output(positions_path, &json)?;
        println!("Wrote {}", positions_path.display());
    }

    Ok(())
}

/// Write a default project file
fn init_project() -> anyhow::Result<()> {
    let path = PathBuf::from(DEFAULT_CONFIG_FILE);
    if path.exists() {
        anyhow::bail!("{} already exists", DEFAULT_CONFIG_FILE);
    }
    SnapshotConfig::init_file(&path)?;
    println!("Created {}", DEFAULT_CONFIG_FILE);
    Ok(())
}

/// Project file (explicit, or ./coldstart.yaml when present) with the command
/// line merged on top
fn load_config(cli: &Cli) -> anyhow::Result<SnapshotConfig> {
    let project_path = match &cli.project {
        Some(path) => Some(path.clone()),
        None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|path| path.exists()),
    };

    let mut config = match &project_path {
        Some(path) => {
            debug!("Loading {}", path.display());
            let mut config = SnapshotConfig::from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            if let Some(dir) = path.parent() {
                config.anchor_to(dir);
            }
            config
        }
        None => SnapshotConfig::default(),
    };

    let auxiliary_data = match &cli.aux_data {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Some(
                serde_json::from_str(&content)
                    .with_context(|| format!("{} is not valid JSON", path.display()))?,
            )
        }
        None => None,
    };

    config.merge_with_cli(CliOverrides {
        main: cli.main.clone(),
        base_dir: cli.base_dir.clone(),
        output: cli.out.clone(),
        exclude: cli.exclude.clone(),
        auxiliary_data,
        positions_output: cli.positions_out.clone(),
        cache_dir: cli.cache_dir.clone(),
        invalidation_key: cli.invalidation_key.clone(),
        no_cache: cli.no_cache,
        best_effort_cache: cli.best_effort_cache,
    });
    Ok(config)
}

fn run(config: &SnapshotConfig) -> anyhow::Result<GeneratedScript> {
    if !config.main.is_file() {
        anyhow::bail!("Entry module {} does not exist", config.main.display());
    }

    let base_dir = config.effective_base_dir();
    let rules = ExclusionRules::new(&base_dir, &config.exclude)?;
    let mut options = GenerateOptions::new(&base_dir, &config.main)
        .with_exclusion(move |path: &Path| rules.matches(path));
    options.auxiliary_data = config.auxiliary_data.clone();

    info!(
        "Generating snapshot for {} (base {})",
        config.main.display(),
        base_dir.display()
    );
    let collaborators = Collaborators::new();

    if !config.cache.enabled {
        debug!("Persistent cache disabled");
        let cache = MemoryCache::new();
        return Ok(generate_snapshot(&cache, &options, &collaborators)?);
    }

    let mode = if config.cache.best_effort {
        CacheMode::BestEffort
    } else {
        CacheMode::Strict
    };
    let mut store = CacheStore::new(
        &config.cache.dir,
        config.cache.effective_invalidation_key(),
    )
    .with_mode(mode);
    store.load_or_create()?;

    let generated = generate_snapshot(&store, &options, &collaborators);
    if let Ok(count) = store.entry_count() {
        debug!("Cache holds {} entries", count);
    }
    match store.dispose() {
        Ok(()) => {}
        Err(e) if generated.is_err() => warn!("Failed to close cache: {}", e),
        Err(e) => return Err(e.into()),
    }
    Ok(generated?)
}

fn write_output(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}
