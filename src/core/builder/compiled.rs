//! Compiled build strategy
//!
//! Builds a Go service into a static binary with a pinned toolchain image.
//! Dependency manifests are copied and resolved before the full source, so
//! unrelated source edits never invalidate the downloaded-module cache, and
//! cross-compilation for the deployment platform is the default.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::defaults;
use crate::core::artifact::Artifact;
use crate::core::builder::{BuildOutput, ProjectBuilder};
use crate::core::cache::CacheRegistry;
use crate::core::catalog::ServiceDescriptor;
use crate::core::source::SourceTree;
use crate::core::stage::BuildEnvironment;
use crate::error::{BuildError, ServiceError};
use crate::infra::substrate::BuildSubstrate;

/// Builder for compiled (Go) services.
#[derive(Debug)]
pub struct CompiledBuilder {
    substrate: Arc<dyn BuildSubstrate>,
    platform: String,
}

impl CompiledBuilder {
    pub fn new(substrate: Arc<dyn BuildSubstrate>, platform: &str) -> Self {
        Self {
            substrate,
            platform: platform.to_string(),
        }
    }

    /// Directory the module commands run in: the service subtree when it
    /// is its own module, the tree root otherwise.
    fn module_workdir(descriptor: &ServiceDescriptor, tree: &SourceTree) -> String {
        if tree.path(&descriptor.path).join("go.mod").is_file() {
            format!("/src/{}", descriptor.path)
        } else {
            "/src".to_string()
        }
    }
}

#[async_trait]
impl ProjectBuilder for CompiledBuilder {
    async fn build(
        &self,
        descriptor: &ServiceDescriptor,
        tree: &SourceTree,
        caches: &CacheRegistry,
    ) -> Result<BuildOutput, ServiceError> {
        let output_name = descriptor.output_name().to_string();
        let output_path = format!("/out/{output_name}");
        let workdir = Self::module_workdir(descriptor, tree);

        let entrypoint = descriptor
            .entrypoint
            .clone()
            .ok_or_else(|| BuildError::InvalidPlan {
                reason: format!("service '{}' has no entrypoint source file", descriptor.name),
            })
            .map_err(ServiceError::Build)?;

        let (goos, goarch) = split_platform(&self.platform);

        tracing::info!(
            service = %descriptor.name,
            platform = %self.platform,
            "building compiled service"
        );

        // Manifests first: module resolution runs against go.mod/go.sum
        // alone so the download cache keys off dependency identity.
        let resolved = BuildEnvironment::new(self.substrate.clone(), &self.platform)
            .with_base_image(defaults::GO_BASE_IMAGE)
            .with_directory_filtered("/src", tree.root().to_path_buf(), &["go.mod", "go.sum"])
            .with_mounted_cache(defaults::GO_MOD_CACHE_PATH, caches.volume(defaults::GO_MOD_CACHE_KEY))
            .with_workdir(&workdir)
            .with_exec(&["go", "mod", "download"]);

        let mut build_argv: Vec<&str> = vec!["go", "build", "-o", output_path.as_str()];
        for flag in &descriptor.build_flags {
            build_argv.push(flag.as_str());
        }
        build_argv.push(entrypoint.as_str());

        let compiled = resolved
            .with_directory_filtered(
                "/src",
                tree.root().to_path_buf(),
                &["*.go", "go.mod", "go.sum"],
            )
            .with_mounted_cache(
                defaults::GO_BUILD_CACHE_PATH,
                caches.volume(defaults::GO_BUILD_CACHE_KEY),
            )
            .with_env("GOOS", &goos)
            .with_env("GOARCH", &goarch)
            .with_env("CGO_ENABLED", "0")
            .with_exec(&build_argv);

        let binary = compiled
            .file(&output_path)
            .await
            .map_err(ServiceError::Build)?;

        Ok(BuildOutput::Artifact(Artifact::Binary {
            name: output_name,
            path: binary,
        }))
    }
}

/// Split "os/arch" into its GOOS/GOARCH pair.
fn split_platform(platform: &str) -> (String, String) {
    match platform.split_once('/') {
        Some((os, arch)) => (os.to_string(), arch.to_string()),
        None => ("linux".to_string(), platform.to_string()),
    }
}
