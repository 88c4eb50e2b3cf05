//! Staged build environments
//!
//! A [`BuildEnvironment`] is a value describing not-yet-executed operations
//! over a base image. Staging operations are pure: each returns a new
//! environment and leaves the receiver untouched, so intermediate stages can
//! be branched from safely. Nothing runs until a terminal operation
//! ([`BuildEnvironment::file`], [`directory`](BuildEnvironment::directory),
//! [`as_image`](BuildEnvironment::as_image),
//! [`stdout`](BuildEnvironment::stdout)) forces the chain through the
//! substrate.
//!
//! Every staging call's result must be captured and threaded forward;
//! dropping it drops the stage.

use std::path::PathBuf;
use std::sync::Arc;

use crate::core::artifact::Image;
use crate::core::cache::CacheVolume;
use crate::error::BuildError;
use crate::infra::substrate::BuildSubstrate;

/// One staged operation over the base image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOp {
    /// Start from a container image reference
    BaseImage { reference: String },
    /// Copy a host directory into the environment, optionally filtered
    CopyDir {
        source: PathBuf,
        dest: String,
        include: Vec<String>,
    },
    /// Mount a persistent cache volume
    MountCache { volume: CacheVolume, dest: String },
    /// Set the working directory
    Workdir { path: String },
    /// Set an environment variable
    Env { key: String, value: String },
    /// Run a command
    Exec { argv: Vec<String> },
}

/// The ordered, executable description of a staged chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    /// Target platform (e.g. "linux/arm64")
    pub platform: String,
    /// Operations in staging order
    pub ops: Vec<StageOp>,
}

impl StagePlan {
    /// The base image reference, if one was staged
    pub fn base_image(&self) -> Option<&str> {
        self.ops.iter().find_map(|op| match op {
            StageOp::BaseImage { reference } => Some(reference.as_str()),
            _ => None,
        })
    }

    /// Number of staged exec operations
    pub fn exec_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, StageOp::Exec { .. }))
            .count()
    }

    /// Cache keys mounted anywhere in the chain
    pub fn mounted_cache_keys(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                StageOp::MountCache { volume, .. } => Some(volume.key()),
                _ => None,
            })
            .collect()
    }
}

/// Staged, immutable execution context.
///
/// Created per builder kind from a fixed base image, staged through setup,
/// dependency resolution and compile/bundle steps, and terminated by an
/// extraction operation.
#[derive(Debug, Clone)]
pub struct BuildEnvironment {
    substrate: Arc<dyn BuildSubstrate>,
    plan: StagePlan,
}

impl BuildEnvironment {
    /// Create an empty environment for a target platform.
    pub fn new(substrate: Arc<dyn BuildSubstrate>, platform: &str) -> Self {
        Self {
            substrate,
            plan: StagePlan {
                platform: platform.to_string(),
                ops: Vec::new(),
            },
        }
    }

    /// The staged plan so far
    pub fn plan(&self) -> &StagePlan {
        &self.plan
    }

    fn with_op(&self, op: StageOp) -> Self {
        let mut next = self.clone();
        next.plan.ops.push(op);
        next
    }

    /// Stage the base image the chain starts from.
    #[must_use]
    pub fn with_base_image(&self, reference: &str) -> Self {
        self.with_op(StageOp::BaseImage {
            reference: reference.to_string(),
        })
    }

    /// Stage a host directory copy into `dest`, taking every file.
    #[must_use]
    pub fn with_directory(&self, dest: &str, source: PathBuf) -> Self {
        self.with_op(StageOp::CopyDir {
            source,
            dest: dest.to_string(),
            include: Vec::new(),
        })
    }

    /// Stage a filtered host directory copy into `dest`.
    ///
    /// Include patterns are file names or `*.ext` globs matched against
    /// paths relative to `source`; an empty list means everything.
    #[must_use]
    pub fn with_directory_filtered(&self, dest: &str, source: PathBuf, include: &[&str]) -> Self {
        self.with_op(StageOp::CopyDir {
            source,
            dest: dest.to_string(),
            include: include.iter().map(|s| (*s).to_string()).collect(),
        })
    }

    /// Stage a cache volume mount at `dest` for the remainder of the chain.
    #[must_use]
    pub fn with_mounted_cache(&self, dest: &str, volume: CacheVolume) -> Self {
        self.with_op(StageOp::MountCache {
            volume,
            dest: dest.to_string(),
        })
    }

    /// Stage a working directory change.
    #[must_use]
    pub fn with_workdir(&self, path: &str) -> Self {
        self.with_op(StageOp::Workdir {
            path: path.to_string(),
        })
    }

    /// Stage an environment variable.
    #[must_use]
    pub fn with_env(&self, key: &str, value: &str) -> Self {
        self.with_op(StageOp::Env {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    /// Stage a command execution.
    #[must_use]
    pub fn with_exec(&self, argv: &[&str]) -> Self {
        self.with_op(StageOp::Exec {
            argv: argv.iter().map(|s| (*s).to_string()).collect(),
        })
    }

    fn check_executable(&self) -> Result<(), BuildError> {
        if self.plan.base_image().is_none() {
            return Err(BuildError::InvalidPlan {
                reason: "no base image staged".to_string(),
            });
        }
        Ok(())
    }

    /// Execute the chain and export a single file, returning its host path.
    pub async fn file(&self, path: &str) -> Result<PathBuf, BuildError> {
        self.check_executable()?;
        tracing::debug!(path, ops = self.plan.ops.len(), "exporting file");
        Ok(self.substrate.export_file(&self.plan, path).await?)
    }

    /// Execute the chain and export a directory, returning its host path.
    pub async fn directory(&self, path: &str) -> Result<PathBuf, BuildError> {
        self.check_executable()?;
        tracing::debug!(path, ops = self.plan.ops.len(), "exporting directory");
        Ok(self.substrate.export_directory(&self.plan, path).await?)
    }

    /// Execute the chain and capture the final command's stdout.
    pub async fn stdout(&self) -> Result<String, BuildError> {
        self.check_executable()?;
        if self.plan.exec_count() == 0 {
            return Err(BuildError::InvalidPlan {
                reason: "stdout requested but no command staged".to_string(),
            });
        }
        Ok(self.substrate.capture_stdout(&self.plan).await?)
    }

    /// Execute the chain and commit the result as a runnable image.
    pub async fn as_image(&self, entrypoint: &[String]) -> Result<Image, BuildError> {
        self.check_executable()?;
        let id = self.substrate.commit_image(&self.plan, entrypoint).await?;
        Ok(Image::new(id, &self.plan.platform, entrypoint.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::CacheRegistry;
    use crate::test_utils::fake::FakeSubstrate;

    fn env() -> BuildEnvironment {
        BuildEnvironment::new(Arc::new(FakeSubstrate::new()), "linux/arm64")
    }

    #[test]
    fn test_staging_is_pure() {
        let base = env().with_base_image("golang:1.24");
        let with_exec = base.with_exec(&["go", "mod", "download"]);

        // The receiver is unaffected by the staged call.
        assert_eq!(base.plan().ops.len(), 1);
        assert_eq!(with_exec.plan().ops.len(), 2);
    }

    #[test]
    fn test_branching_from_shared_prefix() {
        let setup = env()
            .with_base_image("golang:1.24")
            .with_workdir("/src");

        let a = setup.with_exec(&["go", "build", "./cmd/api"]);
        let b = setup.with_exec(&["go", "build", "./cmd/worker"]);

        assert_eq!(a.plan().ops.len(), 3);
        assert_eq!(b.plan().ops.len(), 3);
        assert_ne!(a.plan(), b.plan());
    }

    #[test]
    fn test_ops_recorded_in_order() {
        let caches = CacheRegistry::new();
        let staged = env()
            .with_base_image("golang:1.24")
            .with_mounted_cache("/go/pkg/mod", caches.volume("go-mod-cache"))
            .with_env("CGO_ENABLED", "0")
            .with_exec(&["go", "mod", "download"]);

        let plan = staged.plan();
        assert_eq!(plan.base_image(), Some("golang:1.24"));
        assert_eq!(plan.exec_count(), 1);
        assert_eq!(plan.mounted_cache_keys(), vec!["go-mod-cache"]);
        assert!(matches!(plan.ops[3], StageOp::Exec { .. }));
    }

    #[tokio::test]
    async fn test_terminal_requires_base_image() {
        let err = env().file("/out/api").await.unwrap_err();
        assert!(matches!(err, BuildError::InvalidPlan { .. }));
    }

    #[tokio::test]
    async fn test_stdout_captures_final_command() {
        let substrate = Arc::new(FakeSubstrate::new());
        substrate.push_stdout("go version go1.24.0 linux/arm64");

        let env = BuildEnvironment::new(substrate, "linux/arm64")
            .with_base_image("golang:1.24")
            .with_exec(&["go", "version"]);

        let captured = env.stdout().await.unwrap();
        assert_eq!(captured, "go version go1.24.0 linux/arm64");
    }

    #[tokio::test]
    async fn test_stdout_requires_exec() {
        let err = env()
            .with_base_image("alpine:3.21")
            .stdout()
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidPlan { .. }));
    }
}
