//! Release orchestration
//!
//! Fans out one task per service descriptor, drives each through
//! build → package → tag → publish, and aggregates per-service outcomes
//! into a single report ordered like the catalog. Failures are isolated by
//! default: one broken service never cancels its siblings. The legacy
//! all-or-nothing behavior is available behind `fail_fast`, which stops
//! scheduling new services and cancels in-flight ones at their next phase
//! boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::defaults;
use crate::core::builder::{builder_for, BuildOutput};
use crate::core::cache::CacheRegistry;
use crate::core::catalog::{Catalog, ServiceDescriptor};
use crate::core::package::ImagePackager;
use crate::core::source::SourceTree;
use crate::core::tags;
use crate::error::ServiceError;
use crate::infra::substrate::BuildSubstrate;
use crate::registry::auth::Credential;
use crate::registry::publisher::RegistryPublisher;

/// Lifecycle of one service task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServicePhase {
    Pending,
    Building,
    Packaging,
    Publishing,
    Succeeded,
    Failed,
}

impl std::fmt::Display for ServicePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Building => "building",
            Self::Packaging => "packaging",
            Self::Publishing => "publishing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Callback invoked on every phase transition, keyed by service name.
pub type PhaseHook = Arc<dyn Fn(&str, ServicePhase) + Send + Sync>;

/// Terminal outcome of one service task.
#[derive(Debug)]
pub enum ServiceOutcome {
    /// Pushed references, one per tag
    Published(Vec<String>),
    /// Failed with an isolated error
    Failed(ServiceError),
    /// Never ran: an earlier failure aborted the batch (fail-fast only)
    Skipped,
}

/// Per-service result in the aggregate report.
#[derive(Debug)]
pub struct PublishResult {
    /// Service name
    pub service: String,
    /// Target repository
    pub repository: String,
    /// Terminal outcome
    pub outcome: ServiceOutcome,
}

impl PublishResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ServiceOutcome::Published(_))
    }
}

/// Aggregate outcome of one orchestration run.
///
/// Lists every service exactly once, in catalog order, independent of
/// completion order.
#[derive(Debug, Default)]
pub struct ReleaseReport {
    pub results: Vec<PublishResult>,
}

impl ReleaseReport {
    /// Whether every service succeeded
    pub fn is_success(&self) -> bool {
        self.results.iter().all(PublishResult::is_success)
    }

    /// Results that did not succeed
    pub fn failures(&self) -> Vec<&PublishResult> {
        self.results
            .iter()
            .filter(|r| !r.is_success())
            .collect()
    }

    /// JSON rendering for scripting consumers.
    pub fn to_json(&self) -> serde_json::Value {
        let services: Vec<serde_json::Value> = self
            .results
            .iter()
            .map(|result| match &result.outcome {
                ServiceOutcome::Published(refs) => serde_json::json!({
                    "service": result.service,
                    "repository": result.repository,
                    "status": "succeeded",
                    "pushed": refs,
                }),
                ServiceOutcome::Failed(error) => serde_json::json!({
                    "service": result.service,
                    "repository": result.repository,
                    "status": "failed",
                    "error": { "kind": error.kind(), "message": error.to_string() },
                }),
                ServiceOutcome::Skipped => serde_json::json!({
                    "service": result.service,
                    "repository": result.repository,
                    "status": "skipped",
                }),
            })
            .collect();

        serde_json::json!({
            "success": self.is_success(),
            "services": services,
        })
    }
}

/// Run-scoped configuration.
///
/// Registry, date and revision defaults are explicit fields here, scoped
/// to one orchestration run; nothing is ambient process state.
#[derive(Debug, Clone)]
pub struct ReleaseConfig {
    /// Registry host images are published to
    pub registry: String,
    /// Target platform for every built image
    pub platform: String,
    /// Date component of the versioned tag (YYYYMMDD)
    pub date: String,
    /// Revision component of the versioned tag (may be empty)
    pub revision: String,
    /// Maximum services in flight at once
    pub max_parallel: usize,
    /// Abort the batch on first failure instead of isolating it
    pub fail_fast: bool,
}

impl ReleaseConfig {
    /// Derive the run configuration from a catalog and source tree.
    pub fn from_catalog(catalog: &Catalog, tree: &SourceTree) -> Self {
        Self {
            registry: catalog.registry.endpoint.clone(),
            platform: catalog
                .release
                .platform
                .clone()
                .unwrap_or_else(|| defaults::DEPLOY_PLATFORM.to_string()),
            date: catalog
                .release
                .date
                .clone()
                .unwrap_or_else(|| chrono::Utc::now().format("%Y%m%d").to_string()),
            revision: catalog
                .release
                .revision
                .clone()
                .unwrap_or_else(|| tree.revision().to_string()),
            max_parallel: catalog
                .release
                .max_parallel
                .unwrap_or_else(|| defaults::DEFAULT_MAX_PARALLEL.min(num_cpus::get().max(1))),
            fail_fast: catalog.release.fail_fast,
        }
    }
}

/// Drives a whole release: one concurrent task per service, shared caches,
/// aggregated report.
pub struct ReleaseOrchestrator {
    substrate: Arc<dyn BuildSubstrate>,
    config: Arc<ReleaseConfig>,
    phase_hook: Option<PhaseHook>,
}

impl ReleaseOrchestrator {
    pub fn new(substrate: Arc<dyn BuildSubstrate>, config: ReleaseConfig) -> Self {
        Self {
            substrate,
            config: Arc::new(config),
            phase_hook: None,
        }
    }

    /// Install a phase-transition callback (progress display).
    #[must_use]
    pub fn with_phase_hook(mut self, hook: PhaseHook) -> Self {
        self.phase_hook = Some(hook);
        self
    }

    /// Release every service in the catalog slice.
    ///
    /// The report has one entry per descriptor, in input order.
    pub async fn release(
        &self,
        services: &[ServiceDescriptor],
        tree: &SourceTree,
        credential: &Credential,
    ) -> ReleaseReport {
        let task = Arc::new(ServiceTask {
            substrate: self.substrate.clone(),
            config: self.config.clone(),
            caches: CacheRegistry::new(),
            tree: tree.clone(),
            credential: credential.clone(),
            abort: AtomicBool::new(false),
            phase_hook: self.phase_hook.clone(),
        });

        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel.max(1)));
        let mut handles = Vec::with_capacity(services.len());

        for (index, descriptor) in services.iter().cloned().enumerate() {
            let task = task.clone();
            let semaphore = semaphore.clone();

            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (index, descriptor, ServiceOutcome::Skipped);
                };
                if task.aborted() {
                    return (index, descriptor, ServiceOutcome::Skipped);
                }

                let outcome = task.run(&descriptor).await;
                if task.config.fail_fast && matches!(outcome, ServiceOutcome::Failed(_)) {
                    task.abort.store(true, Ordering::Relaxed);
                }
                (index, descriptor, outcome)
            }));
        }

        let mut slots: Vec<Option<PublishResult>> =
            services.iter().map(|_| None).collect();

        for joined in futures::future::join_all(handles).await {
            if let Ok((index, descriptor, outcome)) = joined {
                slots[index] = Some(PublishResult {
                    service: descriptor.name,
                    repository: descriptor.repository,
                    outcome,
                });
            }
        }

        // A panicked task leaves its slot empty; report it rather than
        // dropping the service from the aggregate.
        let results = slots
            .into_iter()
            .zip(services)
            .map(|(slot, descriptor)| {
                slot.unwrap_or_else(|| PublishResult {
                    service: descriptor.name.clone(),
                    repository: descriptor.repository.clone(),
                    outcome: ServiceOutcome::Failed(ServiceError::Build(
                        crate::error::BuildError::Substrate("service task panicked".to_string()),
                    )),
                })
            })
            .collect();

        ReleaseReport { results }
    }
}

/// Shared context for one run's service tasks.
struct ServiceTask {
    substrate: Arc<dyn BuildSubstrate>,
    config: Arc<ReleaseConfig>,
    caches: CacheRegistry,
    tree: SourceTree,
    credential: Credential,
    abort: AtomicBool,
    phase_hook: Option<PhaseHook>,
}

impl ServiceTask {
    fn aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    fn set_phase(&self, service: &str, phase: ServicePhase) {
        tracing::info!(service, %phase, "service phase");
        if let Some(ref hook) = self.phase_hook {
            hook(service, phase);
        }
    }

    /// Drive one service Pending → terminal.
    async fn run(&self, descriptor: &ServiceDescriptor) -> ServiceOutcome {
        match self.run_inner(descriptor).await {
            Ok(Some(pushed)) => {
                self.set_phase(&descriptor.name, ServicePhase::Succeeded);
                ServiceOutcome::Published(pushed)
            }
            Ok(None) => ServiceOutcome::Skipped,
            Err(error) => {
                self.set_phase(&descriptor.name, ServicePhase::Failed);
                tracing::warn!(
                    service = %descriptor.name,
                    kind = error.kind(),
                    %error,
                    "service failed"
                );
                ServiceOutcome::Failed(error)
            }
        }
    }

    /// `Ok(None)` means cooperative cancellation took effect mid-flight.
    async fn run_inner(
        &self,
        descriptor: &ServiceDescriptor,
    ) -> Result<Option<Vec<String>>, ServiceError> {
        self.set_phase(&descriptor.name, ServicePhase::Pending);

        // Configuration problems surface before anything is staged.
        descriptor.validate_against(&self.tree)?;

        self.set_phase(&descriptor.name, ServicePhase::Building);
        let builder = builder_for(descriptor.kind, self.substrate.clone(), &self.config.platform);
        let output = builder.build(descriptor, &self.tree, &self.caches).await?;

        if self.aborted() {
            return Ok(None);
        }

        self.set_phase(&descriptor.name, ServicePhase::Packaging);
        let image = match output {
            BuildOutput::Image(image) => image,
            BuildOutput::Artifact(artifact) => {
                let run_command: Vec<String> = descriptor
                    .run_command
                    .clone()
                    .unwrap_or_else(|| {
                        defaults::DEFAULT_ASSETS_RUN
                            .iter()
                            .map(|s| (*s).to_string())
                            .collect()
                    });
                let packager = ImagePackager::new(self.substrate.clone(), &self.config.platform);
                packager
                    .package(artifact, &run_command)
                    .await
                    .map_err(ServiceError::Build)?
            }
        };

        if self.aborted() {
            return Ok(None);
        }

        self.set_phase(&descriptor.name, ServicePhase::Publishing);
        let release_tags = tags::tags(&self.config.revision, &self.config.date);
        let publisher = RegistryPublisher::new(self.substrate.clone());
        let pushed = publisher
            .publish(
                &image,
                &self.config.registry,
                &self.credential,
                &descriptor.repository,
                &release_tags,
            )
            .await?;

        Ok(Some(pushed))
    }
}
