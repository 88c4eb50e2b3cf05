//! Project build strategies
//!
//! A closed variant set (compiled, bundled, passthrough) behind one
//! [`ProjectBuilder`] capability, dispatched by descriptor kind. Builders
//! stage build environments; they never execute anything themselves, and
//! they never reach back upstream of the source tree they are handed.

mod bundled;
mod compiled;
mod passthrough;

pub use bundled::BundledBuilder;
pub use compiled::CompiledBuilder;
pub use passthrough::PassthroughBuilder;

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::artifact::{Artifact, Image};
use crate::core::cache::CacheRegistry;
use crate::core::catalog::{BuildKind, ServiceDescriptor};
use crate::core::source::SourceTree;
use crate::error::ServiceError;
use crate::infra::substrate::BuildSubstrate;

/// What a build strategy hands downstream.
///
/// Compiled and bundled strategies produce an artifact for the image
/// packager; passthrough skips that split and produces an image directly.
#[derive(Debug, Clone)]
pub enum BuildOutput {
    /// Needs packaging before publishing
    Artifact(Artifact),
    /// Ready to tag and publish
    Image(Image),
}

/// One build strategy.
#[async_trait]
pub trait ProjectBuilder: Send + Sync {
    /// Materialize the service's build output from the source tree.
    async fn build(
        &self,
        descriptor: &ServiceDescriptor,
        tree: &SourceTree,
        caches: &CacheRegistry,
    ) -> Result<BuildOutput, ServiceError>;
}

/// Select the builder for a descriptor kind.
pub fn builder_for(
    kind: BuildKind,
    substrate: Arc<dyn BuildSubstrate>,
    platform: &str,
) -> Box<dyn ProjectBuilder> {
    match kind {
        BuildKind::Compiled => Box::new(CompiledBuilder::new(substrate, platform)),
        BuildKind::Bundled => Box::new(BundledBuilder::new(substrate, platform)),
        BuildKind::Passthrough => Box::new(PassthroughBuilder::new(substrate, platform)),
    }
}
