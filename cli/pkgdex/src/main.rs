//! pkgdex CLI: administer a local package registry.

mod commands;

use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pkgdex_registry::RegistryConfig;

use commands::LocalRegistry;

#[derive(Parser)]
#[command(name = "pkgdex", version, about = "Local package registry administration")]
struct Cli {
    /// Configuration file (default: ./pkgdex.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Registry storage directory (overrides the configuration)
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new, empty package
    Create {
        /// Package name
        name: String,
        /// Identity that may publish versions
        #[arg(long)]
        owner: String,
    },
    /// Publish a new version of a package
    Publish {
        /// Package name
        package: String,
        /// Archive file to upload
        #[arg(long)]
        archive: PathBuf,
        /// Metadata TOML describing the version
        #[arg(long)]
        metadata: PathBuf,
        /// Identity publishing the version
        #[arg(long = "as")]
        publisher: String,
        /// Validate without publishing
        #[arg(long)]
        dry_run: bool,
    },
    /// List versions of a package, newest first
    Versions {
        /// Package name
        package: String,
    },
    /// Show the metadata of one version
    Show {
        /// Package name
        package: String,
        /// Version identifier
        version: String,
    },
    /// Download the archive of one version
    Fetch {
        /// Package name
        package: String,
        /// Version identifier
        version: String,
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Recompute the sort order of a package's versions
    Reconcile {
        /// Package name
        package: String,
    },
}

fn main() {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let mut config = load_config(&cwd, cli.config.as_deref())?;
    if let Some(root) = cli.root {
        config.storage.root = root;
    }

    let local = LocalRegistry::open(&config)?;
    let result = match cli.command {
        Commands::Create { name, owner } => commands::package::create(&local, &name, &owner),

        Commands::Publish {
            package,
            archive,
            metadata,
            publisher,
            dry_run,
        } => commands::package::publish(&local, &package, &archive, &metadata, &publisher, dry_run),

        Commands::Versions { package } => commands::package::versions(&local, &package),

        Commands::Show { package, version } => commands::package::show(&local, &package, &version),

        Commands::Fetch {
            package,
            version,
            output,
        } => commands::package::fetch(&local, &package, &version, &output),

        Commands::Reconcile { package } => commands::package::reconcile(&local, &package),
    };
    local.close();
    result
}

/// Load `--config`, else `pkgdex.toml` in `cwd`, else defaults.
fn load_config(cwd: &Path, explicit: Option<&Path>) -> anyhow::Result<RegistryConfig> {
    if let Some(path) = explicit {
        return RegistryConfig::load(path).with_context(|| format!("loading {}", path.display()));
    }

    let path = cwd.join("pkgdex.toml");
    if path.is_file() {
        return RegistryConfig::load(&path).context("loading pkgdex.toml");
    }

    let mut config = RegistryConfig::default();
    config.storage.root = cwd.join(&config.storage.root);
    Ok(config)
}

fn setup_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("PKGDEX_LOG").unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("pkgdex=debug,pkgdex_registry=debug,warn")
        } else {
            EnvFilter::new("pkgdex=info,pkgdex_registry=info,warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
