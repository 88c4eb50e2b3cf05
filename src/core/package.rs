//! Image packaging
//!
//! Wraps a build artifact into a minimal runtime image with a declared
//! entrypoint. Rendering the image spec is pure and deterministic:
//! identical artifact and entrypoint always yield an identical spec.
//! Rendering is separated from realization through the substrate.

use std::sync::Arc;

use crate::config::defaults;
use crate::core::artifact::{Artifact, CopySpec, Image, ImageSpec};
use crate::error::BuildError;
use crate::infra::substrate::BuildSubstrate;

/// Packages artifacts into runtime images.
#[derive(Debug)]
pub struct ImagePackager {
    substrate: Arc<dyn BuildSubstrate>,
    platform: String,
}

impl ImagePackager {
    pub fn new(substrate: Arc<dyn BuildSubstrate>, platform: &str) -> Self {
        Self {
            substrate,
            platform: platform.to_string(),
        }
    }

    /// Render the deterministic image spec for an artifact.
    ///
    /// Binaries land at a fixed path under the install dir and become the
    /// entrypoint themselves; asset directories become the application
    /// root with the supplied run command.
    pub fn render(&self, artifact: &Artifact, entrypoint: &[String]) -> ImageSpec {
        match artifact {
            Artifact::Binary { name, path } => {
                let install_path = format!("{}/{name}", defaults::BINARY_INSTALL_DIR);
                ImageSpec {
                    base_image: defaults::RUNTIME_BASE_IMAGE.to_string(),
                    platform: self.platform.clone(),
                    copies: vec![CopySpec {
                        source: path.clone(),
                        dest: install_path.clone(),
                    }],
                    workdir: None,
                    entrypoint: vec![install_path],
                }
            }
            Artifact::Assets { path } => ImageSpec {
                base_image: defaults::NODE_BASE_IMAGE.to_string(),
                platform: self.platform.clone(),
                copies: vec![CopySpec {
                    source: path.clone(),
                    dest: defaults::APP_ROOT.to_string(),
                }],
                workdir: Some(defaults::APP_ROOT.to_string()),
                entrypoint: entrypoint.to_vec(),
            },
        }
    }

    /// Package an artifact into a runnable image.
    pub async fn package(
        &self,
        artifact: Artifact,
        entrypoint: &[String],
    ) -> Result<Image, BuildError> {
        let spec = self.render(&artifact, entrypoint);
        tracing::debug!(base = %spec.base_image, "realizing runtime image");
        let id = self.substrate.realize_image(&spec).await?;
        Ok(Image::new(id, &self.platform, spec.entrypoint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fake::FakeSubstrate;
    use std::path::PathBuf;

    fn packager(substrate: Arc<FakeSubstrate>) -> ImagePackager {
        ImagePackager::new(substrate, "linux/arm64")
    }

    #[test]
    fn test_binary_render_is_deterministic() {
        let packager = packager(Arc::new(FakeSubstrate::new()));
        let artifact = Artifact::Binary {
            name: "platform-auth".to_string(),
            path: PathBuf::from("/scratch/export/platform-auth"),
        };

        let first = packager.render(&artifact, &[]);
        let second = packager.render(&artifact, &[]);
        assert_eq!(first, second);

        assert_eq!(first.base_image, defaults::RUNTIME_BASE_IMAGE);
        assert_eq!(first.copies[0].dest, "/usr/local/bin/platform-auth");
        assert_eq!(first.entrypoint, vec!["/usr/local/bin/platform-auth"]);
        assert!(first.workdir.is_none());
    }

    #[test]
    fn test_assets_render_uses_supplied_run_command() {
        let packager = packager(Arc::new(FakeSubstrate::new()));
        let artifact = Artifact::Assets {
            path: PathBuf::from("/scratch/export/dist"),
        };
        let run = vec!["npm".to_string(), "run".to_string(), "start".to_string()];

        let spec = packager.render(&artifact, &run);
        assert_eq!(spec.copies[0].dest, "/app");
        assert_eq!(spec.workdir.as_deref(), Some("/app"));
        assert_eq!(spec.entrypoint, run);
    }

    #[tokio::test]
    async fn test_package_realizes_through_substrate() {
        let substrate = Arc::new(FakeSubstrate::new());
        let packager = packager(substrate.clone());
        let artifact = Artifact::Binary {
            name: "api".to_string(),
            path: PathBuf::from("/scratch/export/api"),
        };

        let image = packager.package(artifact, &[]).await.unwrap();
        assert_eq!(image.platform(), "linux/arm64");
        assert_eq!(image.entrypoint(), ["/usr/local/bin/api"]);
        assert_eq!(substrate.realized().len(), 1);
    }
}
