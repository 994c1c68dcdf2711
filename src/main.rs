//! # pdf-index CLI (`pidx`)
//!
//! The `pidx` binary turns a directory of PDFs into a persisted vector index.
//!
//! ## Usage
//!
//! ```bash
//! pidx --config ./config/pidx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pidx init` | Write a starter configuration file |
//! | `pidx build` | Extract, split, embed, and save the index |
//! | `pidx info [dir]` | Summarize a persisted index |
//! | `pidx models` | List supported local embedding models |
//!
//! ## Examples
//!
//! ```bash
//! # Index ./documents into ./faiss_index with the defaults
//! pidx build
//!
//! # Count pages and chunks without loading a model
//! pidx build --input ./papers --dry-run
//!
//! # Smaller pool, machine-readable progress
//! pidx build --pool-size 4 --progress json
//!
//! # Inspect the result
//! pidx info ./faiss_index
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use pdf_index::config::{self, Config, DEFAULT_CONFIG_TOML};
use pdf_index::embedding::supported_models;
use pdf_index::ingest::{self, BuildOptions};
use pdf_index::progress::ProgressMode;
use pdf_index::stats;

const DEFAULT_CONFIG_PATH: &str = "./config/pidx.toml";

/// pdf-index CLI: build a vector index from a directory of PDFs.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Every setting has a default, so the file may be empty or, when the
/// default path is used, absent.
#[derive(Parser)]
#[command(
    name = "pidx",
    about = "pdf-index: turn a directory of PDFs into a persisted vector index",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults to `./config/pidx.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Write a commented starter configuration.
    ///
    /// Does nothing if the file already exists.
    Init,

    /// Build the index.
    ///
    /// Extracts the text of every PDF under the input directory, splits it
    /// into overlapping chunks, embeds every chunk on a pool of model
    /// workers, and atomically replaces the index in the output directory.
    Build {
        /// Directory to read PDFs from (overrides `source.input_directory`).
        #[arg(long)]
        input: Option<PathBuf>,

        /// Directory to write the index to (overrides `index.output_directory`).
        #[arg(long)]
        output: Option<PathBuf>,

        /// Number of embedding workers (overrides `embedding.pool_size`).
        #[arg(long)]
        pool_size: Option<usize>,

        /// Chunks per embedding batch (overrides `embedding.batch_size`).
        #[arg(long)]
        batch_size: Option<usize>,

        /// Extract and split only; print counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,

        /// Progress output on stderr. Defaults to `human` on a terminal, `off` otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Summarize a persisted index.
    Info {
        /// Index directory. Defaults to `index.output_directory`.
        dir: Option<PathBuf>,
    },

    /// List supported local embedding models and their dimensions.
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    // Commands that don't require config
    match &cli.command {
        Commands::Init => return init_config(&config_path),
        Commands::Models => {
            println!("{:<28} {:>6}", "MODEL", "DIMS");
            for (name, dims) in supported_models() {
                println!("{:<28} {:>6}", name, dims);
            }
            return Ok(());
        }
        _ => {}
    }

    let cfg = resolve_config(cli.config.as_deref(), &config_path)?;

    match cli.command {
        Commands::Build {
            input,
            output,
            pool_size,
            batch_size,
            dry_run,
            progress,
        } => {
            let options = BuildOptions {
                input,
                output,
                pool_size,
                batch_size,
                dry_run,
                progress,
            };
            tokio::select! {
                result = ingest::run_build(cfg, &options) => {
                    result?;
                }
                _ = tokio::signal::ctrl_c() => {
                    bail!("Interrupted; the index was not written");
                }
            }
        }
        Commands::Info { dir } => {
            let dir = dir.unwrap_or(cfg.index.output_directory);
            stats::run_info(&dir)?;
        }
        Commands::Init | Commands::Models => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}

/// Load the config file; fall back to defaults only when the implicit
/// default path does not exist.
fn resolve_config(explicit: Option<&Path>, path: &Path) -> Result<Config> {
    if explicit.is_none() && !path.exists() {
        info!(path = %path.display(), "no config file; using defaults");
        let config = Config::default();
        config.validate()?;
        return Ok(config);
    }
    config::load_config(path)
}

fn init_config(path: &Path) -> Result<()> {
    if path.exists() {
        println!("Config already exists: {}", path.display());
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    std::fs::write(path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}
