//! Check command implementation
//!
//! Validates the catalog against the source tree without staging anything:
//! descriptor field discipline, name uniqueness, subtree existence, and
//! bundled build-command resolution all surface here first.

use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::cli::commands::catalog_path;
use crate::cli::output::{status, OutputConfig};
use crate::core::catalog::Catalog;
use crate::core::source::SourceTree;

/// Execute the check command
pub fn execute(project_dir: &Path, catalog: Option<&Path>) -> Result<()> {
    let catalog_file = catalog_path(project_dir, catalog);
    let catalog = Catalog::load(&catalog_file)
        .with_context(|| format!("Failed to load catalog at {}", catalog_file.display()))?;

    let tree = SourceTree::open(project_dir).with_context(|| "Failed to open source tree")?;

    let output = OutputConfig::global();
    let mut failures = Vec::new();

    for service in &catalog.services {
        match service.validate_against(&tree) {
            Ok(()) => {
                if output.interactive() {
                    println!("{} {} ({})", status::SUCCESS, service.name, service.kind);
                }
            }
            Err(error) => {
                eprintln!("{} {}: {error}", status::ERROR, service.name);
                failures.push(service.name.clone());
            }
        }
    }

    if output.json {
        let summary = serde_json::json!({
            "catalog": catalog_file.display().to_string(),
            "services": catalog.services.len(),
            "invalid": failures,
        });
        println!("{summary}");
    }

    if !failures.is_empty() {
        bail!(
            "{} of {} services failed validation",
            failures.len(),
            catalog.services.len()
        );
    }

    if output.interactive() {
        println!(
            "{} {} services valid against {}",
            status::SUCCESS,
            catalog.services.len(),
            tree.root().display()
        );
    }

    Ok(())
}
