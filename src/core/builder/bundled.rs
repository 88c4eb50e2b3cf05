//! Bundled build strategy
//!
//! Builds one workspace package of a pnpm-managed monorepo. Two caches with
//! distinct keys back the install: the content-addressed store shared by
//! every bundled service, and a per-service materialized node_modules tree.
//! Two services' materialized trees can diverge even when their store
//! contents overlap, so the second key is never shared.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::defaults;
use crate::core::artifact::Artifact;
use crate::core::builder::{BuildOutput, ProjectBuilder};
use crate::core::cache::CacheRegistry;
use crate::core::catalog::{bundled_build_command, ServiceDescriptor};
use crate::core::source::SourceTree;
use crate::core::stage::BuildEnvironment;
use crate::error::ServiceError;
use crate::infra::substrate::BuildSubstrate;

/// Builder for bundled (pnpm workspace) services.
#[derive(Debug)]
pub struct BundledBuilder {
    substrate: Arc<dyn BuildSubstrate>,
    platform: String,
}

impl BundledBuilder {
    pub fn new(substrate: Arc<dyn BuildSubstrate>, platform: &str) -> Self {
        Self {
            substrate,
            platform: platform.to_string(),
        }
    }
}

#[async_trait]
impl ProjectBuilder for BundledBuilder {
    async fn build(
        &self,
        descriptor: &ServiceDescriptor,
        tree: &SourceTree,
        caches: &CacheRegistry,
    ) -> Result<BuildOutput, ServiceError> {
        // Resolved before anything is staged; a service with no build
        // script and no explicit command fails without wasting compute.
        let build_command = bundled_build_command(descriptor, tree)?;
        let command_argv: Vec<&str> = build_command.iter().map(String::as_str).collect();

        let store = caches.volume(defaults::PNPM_STORE_CACHE_KEY);
        let modules = caches.volume(&format!("pnpm-modules-{}", descriptor.name));

        let package_dir = format!("{}/{}", defaults::APP_ROOT, descriptor.path);
        let bundle_path = format!("{package_dir}/{}", descriptor.bundle_dir());

        tracing::info!(
            service = %descriptor.name,
            command = %build_command.join(" "),
            "building bundled service"
        );

        // Workspace manifests first so the install layer keys off the
        // lockfile, then the rest of the workspace source.
        let installed = BuildEnvironment::new(self.substrate.clone(), &self.platform)
            .with_base_image(defaults::NODE_BASE_IMAGE)
            .with_exec(&["corepack", "enable"])
            .with_directory_filtered(
                defaults::APP_ROOT,
                tree.root().to_path_buf(),
                &["package.json", "pnpm-lock.yaml", "pnpm-workspace.yaml", ".npmrc"],
            )
            .with_mounted_cache(defaults::PNPM_STORE_PATH, store)
            .with_mounted_cache(&format!("{}/node_modules", defaults::APP_ROOT), modules)
            .with_workdir(defaults::APP_ROOT)
            .with_exec(&["pnpm", "install", "--frozen-lockfile"]);

        let bundled = installed
            .with_directory(defaults::APP_ROOT, tree.root().to_path_buf())
            .with_workdir(&package_dir)
            .with_exec(&command_argv);

        let assets = bundled
            .directory(&bundle_path)
            .await
            .map_err(ServiceError::Build)?;

        Ok(BuildOutput::Artifact(Artifact::Assets { path: assets }))
    }
}
