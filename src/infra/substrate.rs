//! Build substrate interface
//!
//! The substrate is the external execution layer underneath staged build
//! environments: something able to run a staged chain against a filesystem
//! snapshot and hand back files, directories or images. The core stages
//! plans and interprets results; everything between is behind this trait.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::core::artifact::ImageSpec;
use crate::core::stage::StagePlan;
use crate::error::SubstrateError;

/// Execution substrate for staged build plans.
///
/// Implementations must be safe to share across concurrent service tasks;
/// slipway drives one instance from many builders at once.
#[async_trait]
pub trait BuildSubstrate: Send + Sync + std::fmt::Debug {
    /// Execute `plan` and export a single file, returning its host path.
    ///
    /// Fails with [`SubstrateError::PathNotFound`] if the path does not
    /// exist after execution.
    async fn export_file(&self, plan: &StagePlan, path: &str) -> Result<PathBuf, SubstrateError>;

    /// Execute `plan` and export a directory, returning its host path.
    async fn export_directory(
        &self,
        plan: &StagePlan,
        path: &str,
    ) -> Result<PathBuf, SubstrateError>;

    /// Execute `plan` and capture the stdout of its final command.
    async fn capture_stdout(&self, plan: &StagePlan) -> Result<String, SubstrateError>;

    /// Execute `plan` and commit the result as an image with `entrypoint`.
    ///
    /// Returns the substrate's image identifier.
    async fn commit_image(
        &self,
        plan: &StagePlan,
        entrypoint: &[String],
    ) -> Result<String, SubstrateError>;

    /// Realize a rendered runtime-image spec into an image identifier.
    async fn realize_image(&self, spec: &ImageSpec) -> Result<String, SubstrateError>;

    /// Build an image from a pre-existing Dockerfile against `context`.
    async fn build_dockerfile(
        &self,
        context: &Path,
        dockerfile: &Path,
        platform: &str,
    ) -> Result<String, SubstrateError>;

    /// Authenticate against a registry host.
    async fn login(
        &self,
        registry: &str,
        username: &str,
        secret: &str,
    ) -> Result<(), SubstrateError>;

    /// Push an image under a fully-qualified reference.
    ///
    /// Pushing a reference whose tag already exists overwrites it; pushes
    /// are idempotent for identical content.
    async fn push(&self, image_id: &str, reference: &str) -> Result<(), SubstrateError>;
}
