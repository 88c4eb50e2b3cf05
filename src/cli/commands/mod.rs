//! CLI subcommands

pub mod check;
pub mod doctor;
pub mod release;

use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build and publish every service in the catalog
    Release {
        /// Monorepo checkout to release from
        #[arg(short = 'C', long, default_value = ".")]
        project_dir: PathBuf,

        /// Catalog file (defaults to slipway.toml in the project dir)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Target platform override (e.g. linux/arm64)
        #[arg(long)]
        platform: Option<String>,

        /// Date tag override (YYYYMMDD)
        #[arg(long)]
        date: Option<String>,

        /// Revision override
        #[arg(long)]
        revision: Option<String>,

        /// Maximum services released concurrently
        #[arg(short = 'j', long)]
        max_parallel: Option<usize>,

        /// Abort the whole batch on the first failure
        #[arg(long)]
        fail_fast: bool,
    },

    /// Validate the catalog against the source tree without building
    Check {
        /// Monorepo checkout to validate against
        #[arg(short = 'C', long, default_value = ".")]
        project_dir: PathBuf,

        /// Catalog file (defaults to slipway.toml in the project dir)
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Diagnose the host environment and registry connectivity
    Doctor {
        /// Monorepo checkout holding the catalog
        #[arg(short = 'C', long, default_value = ".")]
        project_dir: PathBuf,

        /// Catalog file (defaults to slipway.toml in the project dir)
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
}

impl Commands {
    /// Dispatch to the command implementation
    pub async fn run(self) -> Result<()> {
        match self {
            Commands::Release {
                project_dir,
                catalog,
                platform,
                date,
                revision,
                max_parallel,
                fail_fast,
            } => {
                let options = release::ReleaseOptions {
                    platform,
                    date,
                    revision,
                    max_parallel,
                    fail_fast,
                };
                release::execute(&project_dir, catalog.as_deref(), options).await
            }
            Commands::Check {
                project_dir,
                catalog,
            } => check::execute(&project_dir, catalog.as_deref()),
            Commands::Doctor {
                project_dir,
                catalog,
            } => doctor::execute(&project_dir, catalog.as_deref()).await,
        }
    }
}

/// Resolve the catalog path for a project directory.
pub(crate) fn catalog_path(
    project_dir: &std::path::Path,
    catalog: Option<&std::path::Path>,
) -> PathBuf {
    catalog
        .map(std::path::Path::to_path_buf)
        .unwrap_or_else(|| project_dir.join("slipway.toml"))
}
