//! Doctor command implementation
//!
//! Diagnoses the host before a release: container runtime presence and
//! version, registry reachability, and credential availability.

use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::cli::commands::catalog_path;
use crate::cli::output::status;
use crate::config::defaults;
use crate::core::catalog::Catalog;
use crate::infra::docker::DockerSubstrate;
use crate::registry::auth::Credential;
use crate::registry::client::RegistryApiClient;

/// Execute the doctor command
pub async fn execute(project_dir: &Path, catalog: Option<&Path>) -> Result<()> {
    let catalog_file = catalog_path(project_dir, catalog);
    let catalog = Catalog::load(&catalog_file)
        .with_context(|| format!("Failed to load catalog at {}", catalog_file.display()))?;

    let mut problems = 0usize;

    // Container runtime
    match DockerSubstrate::detect().await {
        Ok(substrate) => {
            let (runtime, version) = substrate.runtime_info();
            println!("{} container runtime: {runtime} {version}", status::SUCCESS);
        }
        Err(error) => {
            println!("{} container runtime: {error}", status::ERROR);
            problems += 1;
        }
    }

    // Registry reachability
    let client = RegistryApiClient::new(&catalog.registry.endpoint);
    match client.ping().await {
        Ok(()) => {
            println!(
                "{} registry reachable: {}",
                status::SUCCESS,
                catalog.registry.endpoint
            );
        }
        Err(error) => {
            println!("{} registry: {error}", status::ERROR);
            problems += 1;
        }
    }

    // Credential
    match Credential::from_env(
        &catalog.registry.endpoint,
        catalog.registry.username.as_deref(),
    ) {
        Ok(credential) => {
            println!(
                "{} credential present (user '{}')",
                status::SUCCESS,
                credential.username()
            );
        }
        Err(_) => {
            println!(
                "{} credential: set {} and {}",
                status::WARNING,
                defaults::REGISTRY_USER_ENV,
                defaults::REGISTRY_TOKEN_ENV
            );
        }
    }

    println!(
        "{} {} services in catalog",
        status::INFO,
        catalog.services.len()
    );

    if problems > 0 {
        bail!("{problems} problem(s) found");
    }
    Ok(())
}
