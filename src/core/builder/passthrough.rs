//! Passthrough build strategy
//!
//! Delegates entirely to a pre-existing Dockerfile via the substrate's
//! native image-build primitive. No compile or bundle step, no artifact
//! split, and no cache staging beyond whatever the Dockerfile specifies.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::artifact::Image;
use crate::core::builder::{BuildOutput, ProjectBuilder};
use crate::core::cache::CacheRegistry;
use crate::core::catalog::ServiceDescriptor;
use crate::core::source::SourceTree;
use crate::error::{BuildError, ServiceError};
use crate::infra::substrate::BuildSubstrate;

/// Builder for Dockerfile-delegated services.
#[derive(Debug)]
pub struct PassthroughBuilder {
    substrate: Arc<dyn BuildSubstrate>,
    platform: String,
}

impl PassthroughBuilder {
    pub fn new(substrate: Arc<dyn BuildSubstrate>, platform: &str) -> Self {
        Self {
            substrate,
            platform: platform.to_string(),
        }
    }
}

#[async_trait]
impl ProjectBuilder for PassthroughBuilder {
    async fn build(
        &self,
        descriptor: &ServiceDescriptor,
        tree: &SourceTree,
        _caches: &CacheRegistry,
    ) -> Result<BuildOutput, ServiceError> {
        let dockerfile = descriptor
            .dockerfile
            .as_deref()
            .ok_or_else(|| BuildError::InvalidPlan {
                reason: format!("service '{}' has no dockerfile", descriptor.name),
            })
            .map_err(ServiceError::Build)?;

        tracing::info!(
            service = %descriptor.name,
            dockerfile,
            "building passthrough service"
        );

        let id = self
            .substrate
            .build_dockerfile(tree.root(), &tree.path(dockerfile), &self.platform)
            .await
            .map_err(BuildError::from)
            .map_err(ServiceError::Build)?;

        // The Dockerfile owns the entrypoint; nothing to declare here.
        Ok(BuildOutput::Image(Image::new(
            id,
            &self.platform,
            Vec::new(),
        )))
    }
}
