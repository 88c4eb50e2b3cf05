//! Test utilities
//!
//! Proptest generators and a recording fake substrate used by unit tests.

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;

    /// Generate a valid service name (lowercase alphanumeric with hyphens)
    pub fn service_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,30}[a-z0-9]?".prop_filter("Name must not be empty", |s| !s.is_empty())
    }

    /// Generate a git-like revision (hex, full or abbreviated)
    pub fn revision() -> impl Strategy<Value = String> {
        "[0-9a-f]{7,40}"
    }

    /// Generate a YYYYMMDD date string
    pub fn date_tag() -> impl Strategy<Value = String> {
        (2020u32..2035, 1u32..13, 1u32..29)
            .prop_map(|(year, month, day)| format!("{year}{month:02}{day:02}"))
    }

    /// Generate an image repository path
    pub fn repository() -> impl Strategy<Value = String> {
        ("[a-z][a-z0-9-]{0,15}", "[a-z][a-z0-9-]{0,15}")
            .prop_map(|(namespace, name)| format!("{namespace}/{name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_service_name_generator(name in service_name()) {
            prop_assert!(!name.is_empty());
            prop_assert!(name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }

        #[test]
        fn test_date_tag_generator(date in date_tag()) {
            prop_assert_eq!(date.len(), 8);
            prop_assert!(date.chars().all(|c| c.is_ascii_digit()));
        }

        #[test]
        fn test_repository_generator(repository in repository()) {
            prop_assert_eq!(repository.split('/').count(), 2);
        }
    }
}

#[cfg(test)]
pub mod fake {
    use std::collections::VecDeque;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::core::artifact::ImageSpec;
    use crate::core::stage::{StageOp, StagePlan};
    use crate::error::SubstrateError;
    use crate::infra::substrate::BuildSubstrate;

    /// Recording substrate for unit tests.
    ///
    /// Executes nothing; records every plan, image spec, login and push it
    /// is handed, and can be scripted to fail specific commands.
    #[derive(Debug, Default)]
    pub struct FakeSubstrate {
        state: Mutex<State>,
        sequence: AtomicU64,
    }

    #[derive(Debug, Default)]
    struct State {
        plans: Vec<StagePlan>,
        realized: Vec<ImageSpec>,
        dockerfile_builds: Vec<(PathBuf, PathBuf, String)>,
        logins: Vec<(String, String)>,
        pushes: Vec<(String, String)>,
        fail_exec_containing: Option<String>,
        fail_push_containing: Option<String>,
        fail_login: bool,
        stdout_lines: VecDeque<String>,
    }

    impl FakeSubstrate {
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail any plan whose exec commands contain `needle`.
        pub fn fail_exec_containing(self, needle: &str) -> Self {
            self.state.lock().unwrap().fail_exec_containing = Some(needle.to_string());
            self
        }

        /// Fail pushes whose reference contains `needle`.
        pub fn fail_push_containing(self, needle: &str) -> Self {
            self.state.lock().unwrap().fail_push_containing = Some(needle.to_string());
            self
        }

        /// Reject every login attempt.
        pub fn fail_login(self) -> Self {
            self.state.lock().unwrap().fail_login = true;
            self
        }

        /// Queue a canned stdout response.
        pub fn push_stdout(&self, line: &str) {
            self.state
                .lock()
                .unwrap()
                .stdout_lines
                .push_back(line.to_string());
        }

        /// Plans executed so far, in order
        pub fn plans(&self) -> Vec<StagePlan> {
            self.state.lock().unwrap().plans.clone()
        }

        /// Image specs realized so far
        pub fn realized(&self) -> Vec<ImageSpec> {
            self.state.lock().unwrap().realized.clone()
        }

        /// Dockerfile builds (context, dockerfile, platform)
        pub fn dockerfile_builds(&self) -> Vec<(PathBuf, PathBuf, String)> {
            self.state.lock().unwrap().dockerfile_builds.clone()
        }

        /// Logins (registry, username)
        pub fn logins(&self) -> Vec<(String, String)> {
            self.state.lock().unwrap().logins.clone()
        }

        /// Pushes (image id, reference)
        pub fn pushes(&self) -> Vec<(String, String)> {
            self.state.lock().unwrap().pushes.clone()
        }

        fn next_id(&self, prefix: &str) -> String {
            format!("{prefix}-{}", self.sequence.fetch_add(1, Ordering::Relaxed))
        }

        fn check_plan(&self, plan: &StagePlan) -> Result<(), SubstrateError> {
            let state = self.state.lock().unwrap();
            if let Some(ref needle) = state.fail_exec_containing {
                for op in &plan.ops {
                    if let StageOp::Exec { argv } = op {
                        let command = argv.join(" ");
                        if command.contains(needle.as_str()) {
                            return Err(SubstrateError::CommandFailed {
                                command,
                                status: 1,
                                output: format!("simulated failure matching '{needle}'"),
                            });
                        }
                    }
                }
            }
            Ok(())
        }

        fn record_plan(&self, plan: &StagePlan) -> Result<(), SubstrateError> {
            self.check_plan(plan)?;
            self.state.lock().unwrap().plans.push(plan.clone());
            Ok(())
        }
    }

    #[async_trait]
    impl BuildSubstrate for FakeSubstrate {
        async fn export_file(
            &self,
            plan: &StagePlan,
            path: &str,
        ) -> Result<PathBuf, SubstrateError> {
            self.record_plan(plan)?;
            Ok(PathBuf::from(format!(
                "/fake/{}/{}",
                self.next_id("export"),
                path.trim_start_matches('/')
            )))
        }

        async fn export_directory(
            &self,
            plan: &StagePlan,
            path: &str,
        ) -> Result<PathBuf, SubstrateError> {
            self.export_file(plan, path).await
        }

        async fn capture_stdout(&self, plan: &StagePlan) -> Result<String, SubstrateError> {
            self.record_plan(plan)?;
            Ok(self
                .state
                .lock()
                .unwrap()
                .stdout_lines
                .pop_front()
                .unwrap_or_default())
        }

        async fn commit_image(
            &self,
            plan: &StagePlan,
            _entrypoint: &[String],
        ) -> Result<String, SubstrateError> {
            self.record_plan(plan)?;
            Ok(self.next_id("img"))
        }

        async fn realize_image(&self, spec: &ImageSpec) -> Result<String, SubstrateError> {
            self.state.lock().unwrap().realized.push(spec.clone());
            Ok(self.next_id("img"))
        }

        async fn build_dockerfile(
            &self,
            context: &Path,
            dockerfile: &Path,
            platform: &str,
        ) -> Result<String, SubstrateError> {
            self.state.lock().unwrap().dockerfile_builds.push((
                context.to_path_buf(),
                dockerfile.to_path_buf(),
                platform.to_string(),
            ));
            Ok(self.next_id("img"))
        }

        async fn login(
            &self,
            registry: &str,
            username: &str,
            _secret: &str,
        ) -> Result<(), SubstrateError> {
            let mut state = self.state.lock().unwrap();
            if state.fail_login {
                return Err(SubstrateError::CommandFailed {
                    command: format!("login {registry}"),
                    status: 1,
                    output: "unauthorized: authentication required".to_string(),
                });
            }
            state.logins.push((registry.to_string(), username.to_string()));
            Ok(())
        }

        async fn push(&self, image_id: &str, reference: &str) -> Result<(), SubstrateError> {
            let mut state = self.state.lock().unwrap();
            if let Some(ref needle) = state.fail_push_containing {
                if reference.contains(needle.as_str()) {
                    return Err(SubstrateError::CommandFailed {
                        command: format!("push {reference}"),
                        status: 1,
                        output: "denied: requested access to the resource is denied".to_string(),
                    });
                }
            }
            state
                .pushes
                .push((image_id.to_string(), reference.to_string()));
            Ok(())
        }
    }
}
