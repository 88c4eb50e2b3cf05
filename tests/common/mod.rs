//! Shared test helpers for CLI integration tests

use assert_fs::prelude::*;
use assert_fs::TempDir;
use std::path::Path;

/// A throwaway monorepo checkout with a catalog for CLI tests.
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    /// Create an empty project directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// Project root path
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Create a file with content, creating parent directories as needed
    pub fn create_file(&self, rel: &str, content: &str) {
        self.dir
            .child(rel)
            .write_str(content)
            .expect("Failed to write test file");
    }

    /// Create a directory
    pub fn create_dir(&self, rel: &str) {
        self.dir
            .child(rel)
            .create_dir_all()
            .expect("Failed to create test dir");
    }

    /// Write a catalog with the given service blocks
    pub fn write_catalog(&self, services: &str) {
        let catalog = format!(
            r#"[registry]
endpoint = "registry.example.com"
username = "releaser"

{services}"#
        );
        self.create_file("slipway.toml", &catalog);
    }

    /// Seed a compiled service subtree
    pub fn seed_compiled(&self, path: &str) {
        self.create_dir(path);
        self.create_file("go.mod", "module example.com/mono\n");
        self.create_file(&format!("{path}/main.go"), "package main\n");
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}
