//! Service catalog (slipway.toml) parsing and validation
//!
//! The catalog is the declarative input to a release: the registry to
//! publish into, run-level settings, and one descriptor per buildable
//! service. Validation is strict and happens before any build environment
//! is staged; a descriptor that mixes fields from different build kinds is
//! rejected outright.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::defaults;
use crate::core::source::SourceTree;
use crate::error::ConfigError;

/// Build strategy for one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildKind {
    /// Compile a binary with a pinned toolchain and package it
    Compiled,
    /// Install and bundle a workspace package, package the output directory
    Bundled,
    /// Delegate entirely to a pre-existing Dockerfile
    Passthrough,
}

impl std::fmt::Display for BuildKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compiled => write!(f, "compiled"),
            Self::Bundled => write!(f, "bundled"),
            Self::Passthrough => write!(f, "passthrough"),
        }
    }
}

/// Static description of one buildable service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceDescriptor {
    /// Unique service name
    pub name: String,

    /// Subtree path within the source tree
    pub path: String,

    /// Build strategy
    pub kind: BuildKind,

    /// Target image repository (e.g. "keygraph-sandbox/platform-auth")
    pub repository: String,

    /// Entrypoint source file relative to the subtree (compiled only)
    #[serde(default)]
    pub entrypoint: Option<String>,

    /// Output binary name (compiled only; defaults to the service name)
    #[serde(default)]
    pub output: Option<String>,

    /// Extra compiler flags (compiled only)
    #[serde(default)]
    pub build_flags: Vec<String>,

    /// Explicit build command (bundled only)
    #[serde(default)]
    pub build_command: Option<Vec<String>>,

    /// Bundler output directory within the subtree (bundled only)
    #[serde(default)]
    pub output_dir: Option<String>,

    /// Runtime command for the packaged assets (bundled only)
    #[serde(default)]
    pub run_command: Option<Vec<String>>,

    /// Dockerfile path within the source tree (passthrough only)
    #[serde(default)]
    pub dockerfile: Option<String>,
}

impl ServiceDescriptor {
    /// Output binary name for compiled services
    pub fn output_name(&self) -> &str {
        self.output.as_deref().unwrap_or(&self.name)
    }

    /// Bundler output directory for bundled services
    pub fn bundle_dir(&self) -> &str {
        self.output_dir
            .as_deref()
            .unwrap_or(defaults::DEFAULT_BUNDLE_DIR)
    }

    /// Validate intra-descriptor consistency.
    ///
    /// Checks the name and repository shapes and the kind-scoped field
    /// discipline: a field belonging to a different kind is an error, and
    /// fields the kind requires must be present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let name_re = Regex::new(r"^[a-z0-9][a-z0-9._-]*$").expect("static pattern compiles");
        if !name_re.is_match(&self.name) {
            return Err(ConfigError::InvalidServiceName {
                name: self.name.clone(),
            });
        }

        let repo_re =
            Regex::new(r"^[a-z0-9]+(?:[._-][a-z0-9]+)*(?:/[a-z0-9]+(?:[._-][a-z0-9]+)*)*$")
                .expect("static pattern compiles");
        if !repo_re.is_match(&self.repository) {
            return Err(ConfigError::InvalidRepository {
                service: self.name.clone(),
                repository: self.repository.clone(),
            });
        }

        match self.kind {
            BuildKind::Compiled => {
                self.reject_foreign("build_command", self.build_command.is_some(), "bundled")?;
                self.reject_foreign("output_dir", self.output_dir.is_some(), "bundled")?;
                self.reject_foreign("run_command", self.run_command.is_some(), "bundled")?;
                self.reject_foreign("dockerfile", self.dockerfile.is_some(), "passthrough")?;
                if self.entrypoint.is_none() {
                    return Err(self.missing("entrypoint"));
                }
            }
            BuildKind::Bundled => {
                self.reject_foreign("entrypoint", self.entrypoint.is_some(), "compiled")?;
                self.reject_foreign("output", self.output.is_some(), "compiled")?;
                self.reject_foreign("build_flags", !self.build_flags.is_empty(), "compiled")?;
                self.reject_foreign("dockerfile", self.dockerfile.is_some(), "passthrough")?;
            }
            BuildKind::Passthrough => {
                self.reject_foreign("entrypoint", self.entrypoint.is_some(), "compiled")?;
                self.reject_foreign("output", self.output.is_some(), "compiled")?;
                self.reject_foreign("build_flags", !self.build_flags.is_empty(), "compiled")?;
                self.reject_foreign("build_command", self.build_command.is_some(), "bundled")?;
                self.reject_foreign("output_dir", self.output_dir.is_some(), "bundled")?;
                self.reject_foreign("run_command", self.run_command.is_some(), "bundled")?;
                if self.dockerfile.is_none() {
                    return Err(self.missing("dockerfile"));
                }
            }
        }

        Ok(())
    }

    /// Validate the descriptor against the source tree snapshot.
    pub fn validate_against(&self, tree: &SourceTree) -> Result<(), ConfigError> {
        self.validate()?;

        if !tree.contains(&self.path) {
            return Err(ConfigError::MissingSubtree {
                service: self.name.clone(),
                path: self.path.clone(),
            });
        }

        if let Some(ref dockerfile) = self.dockerfile {
            if !tree.contains(dockerfile) {
                return Err(ConfigError::MissingSubtree {
                    service: self.name.clone(),
                    path: dockerfile.clone(),
                });
            }
        }

        if self.kind == BuildKind::Bundled {
            // Resolving the build command surfaces the no-script,
            // no-command case before anything is staged.
            bundled_build_command(self, tree)?;
        }

        Ok(())
    }

    fn reject_foreign(
        &self,
        field: &str,
        set: bool,
        expected_kind: &str,
    ) -> Result<(), ConfigError> {
        if set {
            return Err(ConfigError::ForeignField {
                service: self.name.clone(),
                kind: self.kind.to_string(),
                field: field.to_string(),
                expected_kind: expected_kind.to_string(),
            });
        }
        Ok(())
    }

    fn missing(&self, field: &str) -> ConfigError {
        ConfigError::MissingField {
            service: self.name.clone(),
            kind: self.kind.to_string(),
            field: field.to_string(),
        }
    }
}

/// Resolve the build command for a bundled service.
///
/// Preference order: explicit catalog command, then the package manifest's
/// build script (run through pnpm). Absence of both is a configuration
/// error raised before staging.
pub fn bundled_build_command(
    descriptor: &ServiceDescriptor,
    tree: &SourceTree,
) -> Result<Vec<String>, ConfigError> {
    if let Some(ref command) = descriptor.build_command {
        if !command.is_empty() {
            return Ok(command.clone());
        }
    }

    let manifest_path = tree.path(&descriptor.path).join("package.json");
    if let Ok(raw) = std::fs::read_to_string(&manifest_path) {
        if let Ok(manifest) = serde_json::from_str::<serde_json::Value>(&raw) {
            if manifest
                .get("scripts")
                .and_then(|s| s.get("build"))
                .is_some()
            {
                return Ok(vec![
                    "pnpm".to_string(),
                    "run".to_string(),
                    "build".to_string(),
                ]);
            }
        }
    }

    Err(ConfigError::NoBuildCommand {
        service: descriptor.name.clone(),
    })
}

/// Registry section of the catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryConfig {
    /// Registry host, optionally with port (e.g. "registry.example.com:5000")
    pub endpoint: String,

    /// Username presented on login (credential itself comes from the
    /// environment)
    #[serde(default)]
    pub username: Option<String>,
}

/// Run-level settings section of the catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReleaseSettings {
    /// Target platform override
    #[serde(default)]
    pub platform: Option<String>,

    /// Date tag override (YYYYMMDD)
    #[serde(default)]
    pub date: Option<String>,

    /// Revision override
    #[serde(default)]
    pub revision: Option<String>,

    /// Maximum services released concurrently
    #[serde(default)]
    pub max_parallel: Option<usize>,

    /// Abort the whole batch on the first failure instead of isolating it
    #[serde(default)]
    pub fail_fast: bool,
}

/// The release catalog (slipway.toml)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Catalog {
    /// Registry to publish into
    pub registry: RegistryConfig,

    /// Run-level settings
    #[serde(default)]
    pub release: ReleaseSettings,

    /// Service descriptors, in report order
    #[serde(rename = "service", default)]
    pub services: Vec<ServiceDescriptor>,
}

impl Catalog {
    /// Parse a catalog from TOML text.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let catalog: Catalog =
            toml::from_str(raw).map_err(|source| ConfigError::CatalogParse { source })?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load and parse a catalog file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::CatalogNotFound {
            path: path.to_path_buf(),
        })?;
        Self::from_toml(&raw)
    }

    /// Catalog-level validation: registry shape, date shape, name
    /// uniqueness, and every descriptor's intra-descriptor rules.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint_re = Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9.-]*(?::\d+)?$")
            .expect("static pattern compiles");
        if !endpoint_re.is_match(&self.registry.endpoint) {
            return Err(ConfigError::InvalidRegistry {
                endpoint: self.registry.endpoint.clone(),
                reason: "expected host[:port]".to_string(),
            });
        }

        if let Some(ref date) = self.release.date {
            let date_re = Regex::new(r"^\d{8}$").expect("static pattern compiles");
            if !date_re.is_match(date) {
                return Err(ConfigError::InvalidDate { date: date.clone() });
            }
        }

        let mut seen = std::collections::HashSet::new();
        for service in &self.services {
            if !seen.insert(service.name.clone()) {
                return Err(ConfigError::DuplicateService {
                    name: service.name.clone(),
                });
            }
            service.validate()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiled(name: &str) -> ServiceDescriptor {
        ServiceDescriptor {
            name: name.to_string(),
            path: format!("cmd/{name}"),
            kind: BuildKind::Compiled,
            repository: format!("sandbox/{name}"),
            entrypoint: Some("./main.go".to_string()),
            output: None,
            build_flags: Vec::new(),
            build_command: None,
            output_dir: None,
            run_command: None,
            dockerfile: None,
        }
    }

    const CATALOG: &str = r#"
[registry]
endpoint = "registry.example.com"
username = "releaser"

[release]
max_parallel = 2

[[service]]
name = "platform-auth"
path = "cmd/platform.auth"
kind = "compiled"
repository = "sandbox/platform-auth"
entrypoint = "./main.go"

[[service]]
name = "web-app"
path = "ts/apps/web-app"
kind = "bundled"
repository = "sandbox/web-app"
build_command = ["pnpm", "run", "build"]

[[service]]
name = "redpanda-connect"
path = "pkg/redpanda"
kind = "passthrough"
repository = "sandbox/redpanda-connect"
dockerfile = "build/redpanda/Dockerfile"
"#;

    #[test]
    fn test_catalog_parses() {
        let catalog = Catalog::from_toml(CATALOG).unwrap();
        assert_eq!(catalog.registry.endpoint, "registry.example.com");
        assert_eq!(catalog.services.len(), 3);
        assert_eq!(catalog.services[0].kind, BuildKind::Compiled);
        assert_eq!(catalog.services[1].kind, BuildKind::Bundled);
        assert_eq!(catalog.services[2].kind, BuildKind::Passthrough);
        assert_eq!(catalog.release.max_parallel, Some(2));
        assert!(!catalog.release.fail_fast);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let raw = r#"
[registry]
endpoint = "registry.example.com"

[[service]]
name = "api"
path = "cmd/api"
kind = "compiled"
repository = "sandbox/api"
entrypoint = "./main.go"

[[service]]
name = "api"
path = "cmd/api2"
kind = "compiled"
repository = "sandbox/api2"
entrypoint = "./main.go"
"#;
        let err = Catalog::from_toml(raw).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateService { .. }));
    }

    #[test]
    fn test_foreign_field_rejected() {
        let mut descriptor = compiled("api");
        descriptor.dockerfile = Some("Dockerfile".to_string());
        let err = descriptor.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ForeignField { ref field, .. } if field == "dockerfile"
        ));
    }

    #[test]
    fn test_compiled_requires_entrypoint() {
        let mut descriptor = compiled("api");
        descriptor.entrypoint = None;
        let err = descriptor.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingField { ref field, .. } if field == "entrypoint"
        ));
    }

    #[test]
    fn test_passthrough_requires_dockerfile() {
        let descriptor = ServiceDescriptor {
            name: "proxy".to_string(),
            path: "pkg/proxy".to_string(),
            kind: BuildKind::Passthrough,
            repository: "sandbox/proxy".to_string(),
            entrypoint: None,
            output: None,
            build_flags: Vec::new(),
            build_command: None,
            output_dir: None,
            run_command: None,
            dockerfile: None,
        };
        let err = descriptor.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingField { ref field, .. } if field == "dockerfile"
        ));
    }

    #[test]
    fn test_invalid_service_name_rejected() {
        let mut descriptor = compiled("api");
        descriptor.name = "Bad Name".to_string();
        assert!(matches!(
            descriptor.validate(),
            Err(ConfigError::InvalidServiceName { .. })
        ));
    }

    #[test]
    fn test_invalid_date_rejected() {
        let raw = r#"
[registry]
endpoint = "registry.example.com"

[release]
date = "2024-01-15"
"#;
        let err = Catalog::from_toml(raw).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDate { .. }));
    }

    #[test]
    fn test_missing_subtree_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tree = SourceTree::with_revision(dir.path(), String::new()).unwrap();
        let descriptor = compiled("api");
        let err = descriptor.validate_against(&tree).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSubtree { .. }));
    }

    #[test]
    fn test_bundled_build_command_resolution() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("apps/web")).unwrap();
        std::fs::write(
            dir.path().join("apps/web/package.json"),
            r#"{"name": "web", "scripts": {"build": "vite build"}}"#,
        )
        .unwrap();
        let tree = SourceTree::with_revision(dir.path(), String::new()).unwrap();

        let mut descriptor = ServiceDescriptor {
            name: "web".to_string(),
            path: "apps/web".to_string(),
            kind: BuildKind::Bundled,
            repository: "sandbox/web".to_string(),
            entrypoint: None,
            output: None,
            build_flags: Vec::new(),
            build_command: None,
            output_dir: None,
            run_command: None,
            dockerfile: None,
        };

        // Falls back to the manifest's build script.
        let command = bundled_build_command(&descriptor, &tree).unwrap();
        assert_eq!(command, vec!["pnpm", "run", "build"]);

        // Explicit command wins.
        descriptor.build_command = Some(vec!["pnpm".to_string(), "build:prod".to_string()]);
        let command = bundled_build_command(&descriptor, &tree).unwrap();
        assert_eq!(command, vec!["pnpm", "build:prod"]);

        // No script and no command is a configuration error.
        descriptor.build_command = None;
        std::fs::write(
            dir.path().join("apps/web/package.json"),
            r#"{"name": "web"}"#,
        )
        .unwrap();
        let err = bundled_build_command(&descriptor, &tree).unwrap_err();
        assert!(matches!(err, ConfigError::NoBuildCommand { .. }));
    }
}
