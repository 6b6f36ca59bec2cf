//! Quay - a CLI demonstration of the dependency-resolution core.
//!
//! Out of scope per the core's design: this binary exists to exercise the
//! library surface end to end, not to grow its own feature set. It never
//! invokes an external Swift or C toolchain.

use clap::{Parser, Subcommand};
use miette::Result;
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "quay")]
#[command(version, about = "Dependency resolution and checkout materialization for Quay packages", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct GlobalOptions {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Package root (defaults to the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve dependencies and materialize checkouts
    Resolve,

    /// Re-resolve dependencies, honoring existing pins for packages not named
    Update {
        /// Packages to update; empty means update everything
        packages: Vec<String>,
        /// Compute the resolution but don't touch disk
        #[arg(long)]
        dry_run: bool,
    },

    /// Switch a dependency into an editable, mutable checkout
    Edit {
        /// Package identity to edit
        package: String,
        #[arg(long, conflicts_with_all = ["revision", "path"])]
        branch: Option<String>,
        #[arg(long, conflicts_with_all = ["branch", "path"])]
        revision: Option<String>,
        #[arg(long, conflicts_with_all = ["branch", "revision"])]
        path: Option<PathBuf>,
    },

    /// Leave edit mode and restore the dependency's managed checkout
    Unedit {
        /// Package identity to stop editing
        package: String,
    },

    /// Discard all resolver-derived on-disk state
    Reset,

    /// Remove ephemeral build outputs
    Clean,

    /// Print the resolved dependency graph
    ShowDependencies {
        #[arg(long, value_enum, default_value = "text")]
        format: ShowFormat,
    },

    /// Print the content hash of a file or directory tree
    ComputeChecksum {
        path: PathBuf,
    },

    /// Manage repository URL mirrors
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ShowFormat {
    Text,
    Dot,
    Json,
    Flatlist,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Register a mirror for a repository URL
    SetMirror {
        #[arg(long)]
        original_url: String,
        #[arg(long)]
        mirror_url: String,
    },
    /// Remove a mirror for a repository URL
    UnsetMirror {
        #[arg(long)]
        original_url: String,
    },
    /// Print the mirror registered for a repository URL, if any
    GetMirror {
        #[arg(long)]
        original_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    quay_diagnostics::setup();

    let cli = Cli::parse();

    let log_level = match cli.global.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    if !cli.global.quiet {
        tracing_subscriber::fmt().with_max_level(log_level).with_target(false).init();
    }

    let root = cli.global.root.unwrap_or_else(|| PathBuf::from("."));

    let exit_code = match cli.command {
        Commands::Resolve => commands::resolve(&root).await?,
        Commands::Update { packages, dry_run } => commands::update(&root, &packages, dry_run).await?,
        Commands::Edit { package, branch, revision, path } => {
            commands::edit(&root, &package, branch, revision, path).await?
        }
        Commands::Unedit { package } => commands::unedit(&root, &package).await?,
        Commands::Reset => commands::reset(&root)?,
        Commands::Clean => commands::clean(&root)?,
        Commands::ShowDependencies { format } => {
            commands::show_dependencies(&root, format.into()).await?
        }
        Commands::ComputeChecksum { path } => commands::compute_checksum(&path)?,
        Commands::Config { action } => match action {
            ConfigAction::SetMirror { original_url, mirror_url } => {
                commands::config_set_mirror(&original_url, &mirror_url)?
            }
            ConfigAction::UnsetMirror { original_url } => commands::config_unset_mirror(&original_url)?,
            ConfigAction::GetMirror { original_url } => commands::config_get_mirror(&original_url)?,
        },
    };

    std::process::exit(exit_code);
}

impl From<ShowFormat> for commands::DependencyFormat {
    fn from(value: ShowFormat) -> Self {
        match value {
            ShowFormat::Text => commands::DependencyFormat::Text,
            ShowFormat::Dot => commands::DependencyFormat::Dot,
            ShowFormat::Json => commands::DependencyFormat::Json,
            ShowFormat::Flatlist => commands::DependencyFormat::Flatlist,
        }
    }
}
