//! Release command implementation
//!
//! Loads the catalog, opens the source tree, and hands both to the release
//! orchestrator. Maps any failed service to a non-zero exit code with the
//! failed service names and error details printed.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use indicatif::MultiProgress;

use crate::cli::commands::catalog_path;
use crate::cli::output::{self, status, OutputConfig};
use crate::core::catalog::Catalog;
use crate::core::release::{
    PhaseHook, ReleaseConfig, ReleaseOrchestrator, ReleaseReport, ServiceOutcome, ServicePhase,
};
use crate::core::source::SourceTree;
use crate::infra::docker::DockerSubstrate;
use crate::registry::auth::Credential;

/// CLI overrides applied on top of the catalog's release settings
#[derive(Debug, Default)]
pub struct ReleaseOptions {
    pub platform: Option<String>,
    pub date: Option<String>,
    pub revision: Option<String>,
    pub max_parallel: Option<usize>,
    pub fail_fast: bool,
}

/// Execute the release command
pub async fn execute(
    project_dir: &Path,
    catalog: Option<&Path>,
    options: ReleaseOptions,
) -> Result<()> {
    let catalog_file = catalog_path(project_dir, catalog);
    let catalog = Catalog::load(&catalog_file)
        .with_context(|| format!("Failed to load catalog at {}", catalog_file.display()))?;

    if catalog.services.is_empty() {
        bail!("Catalog has no services to release");
    }

    let tree = SourceTree::open(project_dir).with_context(|| "Failed to open source tree")?;

    let mut config = ReleaseConfig::from_catalog(&catalog, &tree);
    if let Some(platform) = options.platform {
        config.platform = platform;
    }
    if let Some(date) = options.date {
        config.date = date;
    }
    if let Some(revision) = options.revision {
        config.revision = revision;
    }
    if let Some(max_parallel) = options.max_parallel {
        config.max_parallel = max_parallel;
    }
    if options.fail_fast {
        config.fail_fast = true;
    }

    let credential =
        Credential::from_env(&config.registry, catalog.registry.username.as_deref())
            .with_context(|| "Registry credential missing from environment")?;

    let substrate = Arc::new(
        DockerSubstrate::detect()
            .await
            .with_context(|| "No usable container runtime")?,
    );

    tracing::info!(
        registry = %config.registry,
        platform = %config.platform,
        services = catalog.services.len(),
        "starting release"
    );

    let output = OutputConfig::global();
    let mut orchestrator = ReleaseOrchestrator::new(substrate, config);
    if output.interactive() {
        orchestrator = orchestrator.with_phase_hook(progress_hook(&catalog));
    }

    let report = orchestrator
        .release(&catalog.services, &tree, &credential)
        .await;

    render_report(&report, output);

    let failures = report.failures();
    if !failures.is_empty() {
        bail!(
            "{} of {} services failed",
            failures.len(),
            report.results.len()
        );
    }

    Ok(())
}

/// Progress display: one spinner per service, finished on its terminal phase.
fn progress_hook(catalog: &Catalog) -> PhaseHook {
    let multi = MultiProgress::new();
    let bars: Mutex<HashMap<String, indicatif::ProgressBar>> = Mutex::new(
        catalog
            .services
            .iter()
            .map(|service| {
                let bar = multi.add(output::create_spinner(&format!("{} pending", service.name)));
                (service.name.clone(), bar)
            })
            .collect(),
    );

    Arc::new(move |service: &str, phase: ServicePhase| {
        let bars = bars.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(bar) = bars.get(service) {
            match phase {
                ServicePhase::Succeeded => {
                    bar.finish_with_message(format!("{} {service} published", status::SUCCESS));
                }
                ServicePhase::Failed => {
                    bar.finish_with_message(format!("{} {service} failed", status::ERROR));
                }
                other => bar.set_message(format!("{service} {other}")),
            }
        }
    })
}

/// Print the aggregate report.
fn render_report(report: &ReleaseReport, output: OutputConfig) {
    if output.json {
        println!("{}", report.to_json());
        return;
    }

    if !output.quiet {
        println!();
    }

    for result in &report.results {
        match &result.outcome {
            ServiceOutcome::Published(refs) => {
                if !output.quiet {
                    println!("{} {}", status::SUCCESS, result.service);
                    for reference in refs {
                        println!("    {reference}");
                    }
                }
            }
            ServiceOutcome::Failed(error) => {
                eprintln!(
                    "{} {} ({} error): {error}",
                    status::ERROR,
                    result.service,
                    error.kind()
                );
            }
            ServiceOutcome::Skipped => {
                eprintln!(
                    "{} {} skipped after earlier failure",
                    status::WARNING,
                    result.service
                );
            }
        }
    }
}
