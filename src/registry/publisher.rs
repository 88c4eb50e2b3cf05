//! Registry publisher
//!
//! Authenticates once per publish call and pushes an image under every
//! computed tag. Authentication is deliberately not cached across services:
//! each service may target a different repository under the same registry.
//! A failed tag push fails that service's result and nothing else.

use std::sync::Arc;

use crate::core::artifact::Image;
use crate::core::tags::ReleaseTags;
use crate::error::{PublishError, SubstrateError};
use crate::infra::substrate::BuildSubstrate;
use crate::registry::auth::Credential;

/// Pushes packaged images to a remote registry.
#[derive(Debug)]
pub struct RegistryPublisher {
    substrate: Arc<dyn BuildSubstrate>,
}

impl RegistryPublisher {
    pub fn new(substrate: Arc<dyn BuildSubstrate>) -> Self {
        Self { substrate }
    }

    /// Publish `image` under every tag, returning the fully-qualified
    /// references that were pushed.
    ///
    /// Both tags must land before the service is reported successful.
    /// Pushing a tag that already exists overwrites it; identical content
    /// makes the push idempotent.
    pub async fn publish(
        &self,
        image: &Image,
        registry: &str,
        credential: &Credential,
        repository: &str,
        tags: &ReleaseTags,
    ) -> Result<Vec<String>, PublishError> {
        self.substrate
            .login(registry, credential.username(), credential.secret())
            .await
            .map_err(|e| match e {
                SubstrateError::CommandFailed { output, .. } => PublishError::Authentication {
                    registry: registry.to_string(),
                    detail: output,
                },
                other => PublishError::Authentication {
                    registry: registry.to_string(),
                    detail: other.to_string(),
                },
            })?;

        let mut pushed = Vec::new();
        for tag in tags.all() {
            let reference = format!("{registry}/{repository}:{tag}");
            tracing::info!(%reference, "pushing");

            self.substrate
                .push(image.id(), &reference)
                .await
                .map_err(|e| PublishError::Push {
                    reference: reference.clone(),
                    detail: match e {
                        SubstrateError::CommandFailed { output, .. } => output,
                        other => other.to_string(),
                    },
                })?;

            pushed.push(reference);
        }

        Ok(pushed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::artifact::Image;
    use crate::core::tags;
    use crate::test_utils::fake::FakeSubstrate;

    fn image() -> Image {
        Image::new("img-0".to_string(), "linux/arm64", Vec::new())
    }

    #[tokio::test]
    async fn test_publishes_both_tags_after_single_login() {
        let substrate = Arc::new(FakeSubstrate::new());
        let publisher = RegistryPublisher::new(substrate.clone());
        let credential = Credential::new("releaser", "token");
        let release = tags::tags("abcdef1234567", "20240115");

        let pushed = publisher
            .publish(
                &image(),
                "registry.example.com",
                &credential,
                "sandbox/api",
                &release,
            )
            .await
            .unwrap();

        assert_eq!(
            pushed,
            vec![
                "registry.example.com/sandbox/api:abcdef1-20240115".to_string(),
                "registry.example.com/sandbox/api:latest".to_string(),
            ]
        );
        assert_eq!(substrate.logins().len(), 1);
        assert_eq!(substrate.pushes().len(), 2);
    }

    #[tokio::test]
    async fn test_authentication_failure_is_distinct() {
        let substrate = Arc::new(FakeSubstrate::new().fail_login());
        let publisher = RegistryPublisher::new(substrate.clone());
        let credential = Credential::new("releaser", "bad-token");
        let release = tags::tags("abcdef1234567", "20240115");

        let err = publisher
            .publish(
                &image(),
                "registry.example.com",
                &credential,
                "sandbox/api",
                &release,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::Authentication { .. }));
        assert!(substrate.pushes().is_empty());
    }

    #[tokio::test]
    async fn test_tag_push_failure_fails_the_service() {
        let substrate = Arc::new(FakeSubstrate::new().fail_push_containing(":latest"));
        let publisher = RegistryPublisher::new(substrate.clone());
        let credential = Credential::new("releaser", "token");
        let release = tags::tags("abcdef1234567", "20240115");

        let err = publisher
            .publish(
                &image(),
                "registry.example.com",
                &credential,
                "sandbox/api",
                &release,
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PublishError::Push { ref reference, .. } if reference.ends_with(":latest")
        ));
        // The versioned tag had already been pushed; at-least-once push
        // semantics make the retry of the whole service safe.
        assert_eq!(substrate.pushes().len(), 1);
    }
}
