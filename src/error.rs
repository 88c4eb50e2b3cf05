//! Error types for slipway
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

/// Service catalog and descriptor validation errors.
///
/// Raised before any build environment is staged and never retried. A
/// descriptor that fails validation consumes no compute.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Catalog file not found
    #[error("Catalog not found at '{path}'. Create a slipway.toml to describe your services.")]
    CatalogNotFound { path: PathBuf },

    /// Catalog parse error
    #[error("Failed to parse catalog: {source}")]
    CatalogParse { source: toml::de::Error },

    /// Two services share a name
    #[error("Duplicate service name '{name}' in catalog")]
    DuplicateService { name: String },

    /// Service name does not match the allowed pattern
    #[error("Invalid service name '{name}': must be lowercase alphanumeric with '-', '_' or '.'")]
    InvalidServiceName { name: String },

    /// Repository name does not match the allowed pattern
    #[error("Service '{service}' has invalid repository '{repository}'")]
    InvalidRepository { service: String, repository: String },

    /// Service subtree missing from the source tree
    #[error("Service '{service}' path '{path}' does not exist in the source tree")]
    MissingSubtree { service: String, path: String },

    /// A field only meaningful for another build kind was set
    #[error("Service '{service}' ({kind}) sets '{field}', which only applies to {expected_kind} services")]
    ForeignField {
        service: String,
        kind: String,
        field: String,
        expected_kind: String,
    },

    /// A field required by the build kind is missing
    #[error("Service '{service}' ({kind}) is missing required field '{field}'")]
    MissingField {
        service: String,
        kind: String,
        field: String,
    },

    /// Bundled service with no build script and no explicit command
    #[error("Service '{service}' declares no build script in its package manifest and no build_command in the catalog")]
    NoBuildCommand { service: String },

    /// Registry endpoint missing or malformed
    #[error("Invalid registry endpoint '{endpoint}': {reason}")]
    InvalidRegistry { endpoint: String, reason: String },

    /// Source tree root missing
    #[error("Source tree root '{path}' does not exist or is not a directory")]
    SourceRootNotFound { path: PathBuf },

    /// Date override not in YYYYMMDD form
    #[error("Invalid date tag '{date}': expected YYYYMMDD")]
    InvalidDate { date: String },
}

/// Build execution errors.
///
/// Raised when a staged command exits non-zero or a requested output path
/// does not exist after execution. Fatal for the service that hit them;
/// carries the captured command output for diagnosis.
#[derive(Error, Debug)]
pub enum BuildError {
    /// A staged command exited non-zero
    #[error("Command '{command}' failed with status {status}:\n{output}")]
    CommandFailed {
        command: String,
        status: i32,
        output: String,
    },

    /// Requested output path missing after execution
    #[error("Output path '{path}' not found after build")]
    MissingOutput { path: String },

    /// The staged chain is not executable as requested
    #[error("Invalid build plan: {reason}")]
    InvalidPlan { reason: String },

    /// Substrate-level failure (runtime missing, I/O)
    #[error("Build substrate error: {0}")]
    Substrate(String),
}

/// Registry publish errors.
///
/// Distinct from [`BuildError`] so operators can tell "didn't build" from
/// "built but didn't publish".
#[derive(Error, Debug)]
pub enum PublishError {
    /// Registry rejected the credential
    #[error("Authentication failed for registry '{registry}': {detail}")]
    Authentication { registry: String, detail: String },

    /// Push rejected or failed mid-transfer
    #[error("Push of '{reference}' failed: {detail}")]
    Push { reference: String, detail: String },

    /// No credential available for the registry
    #[error("No credential available for registry '{registry}'")]
    MissingCredential { registry: String },
}

/// Container runtime failures underneath the build environment
#[derive(Error, Debug)]
pub enum SubstrateError {
    /// No usable container runtime on the host
    #[error("Container runtime not available. Install Docker or Podman.")]
    RuntimeNotAvailable,

    /// Runtime present but too old
    #[error("Container runtime '{runtime}' version {version} is older than required {required}")]
    RuntimeTooOld {
        runtime: String,
        version: String,
        required: String,
    },

    /// Runtime invocation failed
    #[error("'{command}' failed with status {status}:\n{output}")]
    CommandFailed {
        command: String,
        status: i32,
        output: String,
    },

    /// Requested path missing in the executed environment
    #[error("Path '{path}' not found in build output")]
    PathNotFound { path: String },

    /// IO error
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },
}

/// Git revision discovery errors
#[derive(Error, Debug)]
pub enum GitError {
    /// Not a git repository
    #[error("'{path}' is not inside a git repository")]
    NotARepository { path: PathBuf },

    /// HEAD could not be resolved
    #[error("Failed to resolve HEAD: {error}")]
    HeadUnresolved { error: String },
}

/// Per-service release outcome error.
///
/// Wraps the three failure classes a service task can resolve to. Errors
/// never cross the service-task boundary into sibling tasks.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Descriptor invalid, nothing was staged
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Build or packaging failed
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    /// Built but not distributed
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),
}

impl ServiceError {
    /// Short classification for reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "configuration",
            Self::Build(_) => "build",
            Self::Publish(_) => "publish",
        }
    }
}

/// Top-level slipway error type
#[derive(Error, Debug)]
pub enum SlipwayError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Build error
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    /// Publish error
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// Substrate error
    #[error("Substrate error: {0}")]
    Substrate(#[from] SubstrateError),

    /// Git error
    #[error("Git error: {0}")]
    Git(#[from] GitError),

    /// IO error
    #[error("IO error: {source}")]
    Io { source: std::io::Error },

    /// Generic error
    #[error("{0}")]
    Generic(String),
}

impl From<SubstrateError> for BuildError {
    fn from(err: SubstrateError) -> Self {
        match err {
            SubstrateError::CommandFailed {
                command,
                status,
                output,
            } => BuildError::CommandFailed {
                command,
                status,
                output,
            },
            SubstrateError::PathNotFound { path } => BuildError::MissingOutput { path },
            other => BuildError::Substrate(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_kind() {
        let config: ServiceError = ConfigError::DuplicateService {
            name: "api".to_string(),
        }
        .into();
        assert_eq!(config.kind(), "configuration");

        let build: ServiceError = BuildError::MissingOutput {
            path: "/out/api".to_string(),
        }
        .into();
        assert_eq!(build.kind(), "build");

        let publish: ServiceError = PublishError::Push {
            reference: "registry.example.com/api:latest".to_string(),
            detail: "denied".to_string(),
        }
        .into();
        assert_eq!(publish.kind(), "publish");
    }

    #[test]
    fn test_substrate_error_maps_to_build_error() {
        let err = SubstrateError::CommandFailed {
            command: "go build".to_string(),
            status: 2,
            output: "undefined: main".to_string(),
        };
        let build: BuildError = err.into();
        assert!(matches!(build, BuildError::CommandFailed { status: 2, .. }));

        let missing = SubstrateError::PathNotFound {
            path: "/out/api".to_string(),
        };
        let build: BuildError = missing.into();
        assert!(matches!(build, BuildError::MissingOutput { .. }));
    }
}
