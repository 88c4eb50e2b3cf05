//! Container runtime substrate
//!
//! Realizes staged build plans through the Docker or Podman CLI. A plan is
//! synthesized into a Dockerfile (cache mounts become BuildKit cache
//! mounts keyed by volume id, so identical keys reuse storage across runs),
//! built in a scratch workspace, and outputs are lifted out of the built
//! image with create/cp. Registry login and push ride the same CLI.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::defaults;
use crate::core::artifact::ImageSpec;
use crate::core::stage::{StageOp, StagePlan};
use crate::error::SubstrateError;
use crate::infra::substrate::BuildSubstrate;

/// Container runtime type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerRuntime {
    /// Docker container runtime
    Docker,
    /// Podman container runtime
    Podman,
}

impl ContainerRuntime {
    /// Get the command name for this runtime
    pub fn command(&self) -> &'static str {
        match self {
            ContainerRuntime::Docker => "docker",
            ContainerRuntime::Podman => "podman",
        }
    }
}

/// CLI-driven substrate over Docker or Podman.
#[derive(Debug)]
pub struct DockerSubstrate {
    runtime: ContainerRuntime,
    version: semver::Version,
    scratch_root: PathBuf,
    sequence: AtomicU64,
}

impl DockerSubstrate {
    /// Detect an available runtime and verify its version floor.
    pub async fn detect() -> Result<Self, SubstrateError> {
        let runtime = Self::detect_runtime().ok_or(SubstrateError::RuntimeNotAvailable)?;
        let version = Self::runtime_version(runtime).await?;

        let required: semver::Version = defaults::MIN_RUNTIME_VERSION
            .parse()
            .expect("version floor constant parses");
        if version < required {
            return Err(SubstrateError::RuntimeTooOld {
                runtime: runtime.command().to_string(),
                version: version.to_string(),
                required: required.to_string(),
            });
        }

        let scratch_root = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("slipway")
            .join("scratch");

        tracing::debug!(runtime = runtime.command(), %version, "substrate detected");

        Ok(Self {
            runtime,
            version,
            scratch_root,
            sequence: AtomicU64::new(0),
        })
    }

    /// Override the scratch workspace root
    #[must_use]
    pub fn with_scratch_root(mut self, root: PathBuf) -> Self {
        self.scratch_root = root;
        self
    }

    /// The detected runtime and its version, for diagnostics
    pub fn runtime_info(&self) -> (&'static str, String) {
        (self.runtime.command(), self.version.to_string())
    }

    /// Find docker or podman on the PATH, docker first.
    fn detect_runtime() -> Option<ContainerRuntime> {
        if which::which(ContainerRuntime::Docker.command()).is_ok() {
            return Some(ContainerRuntime::Docker);
        }
        if which::which(ContainerRuntime::Podman.command()).is_ok() {
            return Some(ContainerRuntime::Podman);
        }
        None
    }

    async fn runtime_version(runtime: ContainerRuntime) -> Result<semver::Version, SubstrateError> {
        let output = Command::new(runtime.command())
            .arg("--version")
            .output()
            .await
            .map_err(|_| SubstrateError::RuntimeNotAvailable)?;

        if !output.status.success() {
            return Err(SubstrateError::RuntimeNotAvailable);
        }

        let text = String::from_utf8_lossy(&output.stdout);
        parse_version(&text).ok_or(SubstrateError::RuntimeNotAvailable)
    }

    /// Allocate a fresh scratch directory for one realization.
    fn scratch_dir(&self) -> Result<PathBuf, SubstrateError> {
        let n = self.sequence.fetch_add(1, Ordering::Relaxed);
        let dir = self
            .scratch_root
            .join(format!("{}-{n}", std::process::id()));
        std::fs::create_dir_all(&dir).map_err(|e| SubstrateError::Io {
            path: dir.clone(),
            error: e.to_string(),
        })?;
        Ok(dir)
    }

    /// Run the runtime CLI, optionally feeding stdin.
    async fn run_cli(
        &self,
        args: &[&str],
        stdin: Option<&str>,
    ) -> Result<std::process::Output, SubstrateError> {
        let cmdline = format!("{} {}", self.runtime.command(), args.join(" "));
        tracing::trace!(command = %cmdline, "running");

        let mut command = Command::new(self.runtime.command());
        command.args(args);
        if stdin.is_some() {
            command.stdin(std::process::Stdio::piped());
        }
        command.stdout(std::process::Stdio::piped());
        command.stderr(std::process::Stdio::piped());

        let mut child = command.spawn().map_err(|e| SubstrateError::Io {
            path: PathBuf::from(self.runtime.command()),
            error: e.to_string(),
        })?;

        if let (Some(input), Some(mut handle)) = (stdin, child.stdin.take()) {
            handle
                .write_all(input.as_bytes())
                .await
                .map_err(|e| SubstrateError::Io {
                    path: PathBuf::from(self.runtime.command()),
                    error: e.to_string(),
                })?;
            drop(handle);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SubstrateError::Io {
                path: PathBuf::from(self.runtime.command()),
                error: e.to_string(),
            })?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(SubstrateError::CommandFailed {
                command: cmdline,
                status: output.status.code().unwrap_or(-1),
                output: combined,
            });
        }

        Ok(output)
    }

    /// Materialize the plan into a build context and synthesized Dockerfile,
    /// then build it, returning the image id.
    async fn build_plan(
        &self,
        plan: &StagePlan,
        entrypoint: Option<&[String]>,
        trim_final_exec: bool,
    ) -> Result<String, SubstrateError> {
        let scratch = self.scratch_dir()?;
        let context = scratch.join("context");
        std::fs::create_dir_all(&context).map_err(|e| SubstrateError::Io {
            path: context.clone(),
            error: e.to_string(),
        })?;

        let ops = if trim_final_exec {
            trim_last_exec(&plan.ops)
        } else {
            plan.ops.clone()
        };

        let dockerfile = render_dockerfile(&ops, entrypoint, &context)?;
        let dockerfile_path = context.join("Dockerfile");
        std::fs::write(&dockerfile_path, dockerfile).map_err(|e| SubstrateError::Io {
            path: dockerfile_path.clone(),
            error: e.to_string(),
        })?;

        self.build_context(&context, &dockerfile_path, &plan.platform)
            .await
    }

    async fn build_context(
        &self,
        context: &Path,
        dockerfile: &Path,
        platform: &str,
    ) -> Result<String, SubstrateError> {
        let context_arg = context.display().to_string();
        let dockerfile_arg = dockerfile.display().to_string();
        let platform_arg = format!("--platform={platform}");

        let output = self
            .run_cli(
                &[
                    "build",
                    "-q",
                    platform_arg.as_str(),
                    "-f",
                    dockerfile_arg.as_str(),
                    context_arg.as_str(),
                ],
                None,
            )
            .await?;

        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            return Err(SubstrateError::CommandFailed {
                command: format!("{} build", self.runtime.command()),
                status: -1,
                output: "build produced no image id".to_string(),
            });
        }
        Ok(id)
    }

    /// Lift a path out of a built image into the scratch workspace.
    async fn export_path(&self, image_id: &str, path: &str) -> Result<PathBuf, SubstrateError> {
        let scratch = self.scratch_dir()?;
        let dest = scratch.join("export");

        let create = self.run_cli(&["create", image_id], None).await?;
        let container_id = String::from_utf8_lossy(&create.stdout).trim().to_string();

        let cp_source = format!("{container_id}:{path}");
        let cp_dest = dest.display().to_string();
        let copied = self
            .run_cli(&["cp", cp_source.as_str(), cp_dest.as_str()], None)
            .await;

        // Remove the container regardless of cp outcome.
        let _ = self
            .run_cli(&["rm", "-f", container_id.as_str()], None)
            .await;

        match copied {
            Ok(_) => Ok(dest),
            Err(SubstrateError::CommandFailed { .. }) => Err(SubstrateError::PathNotFound {
                path: path.to_string(),
            }),
            Err(other) => Err(other),
        }
    }
}

#[async_trait]
impl BuildSubstrate for DockerSubstrate {
    async fn export_file(&self, plan: &StagePlan, path: &str) -> Result<PathBuf, SubstrateError> {
        let image_id = self.build_plan(plan, None, false).await?;
        let exported = self.export_path(&image_id, path).await?;
        if !exported.is_file() {
            return Err(SubstrateError::PathNotFound {
                path: path.to_string(),
            });
        }
        Ok(exported)
    }

    async fn export_directory(
        &self,
        plan: &StagePlan,
        path: &str,
    ) -> Result<PathBuf, SubstrateError> {
        let image_id = self.build_plan(plan, None, false).await?;
        let exported = self.export_path(&image_id, path).await?;
        if !exported.is_dir() {
            return Err(SubstrateError::PathNotFound {
                path: path.to_string(),
            });
        }
        Ok(exported)
    }

    async fn capture_stdout(&self, plan: &StagePlan) -> Result<String, SubstrateError> {
        let last = last_exec(&plan.ops).ok_or_else(|| SubstrateError::CommandFailed {
            command: "capture_stdout".to_string(),
            status: -1,
            output: "no command staged".to_string(),
        })?;

        // Build everything up to the final command, then run it live.
        let image_id = self.build_plan(plan, None, true).await?;

        let mut args = vec!["run", "--rm", image_id.as_str()];
        let argv: Vec<&str> = last.iter().map(String::as_str).collect();
        args.extend(argv);

        let output = self.run_cli(&args, None).await?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn commit_image(
        &self,
        plan: &StagePlan,
        entrypoint: &[String],
    ) -> Result<String, SubstrateError> {
        self.build_plan(plan, Some(entrypoint), false).await
    }

    async fn realize_image(&self, spec: &ImageSpec) -> Result<String, SubstrateError> {
        let scratch = self.scratch_dir()?;
        let context = scratch.join("context");
        std::fs::create_dir_all(&context).map_err(|e| SubstrateError::Io {
            path: context.clone(),
            error: e.to_string(),
        })?;

        let dockerfile = render_image_spec(spec, &context)?;
        let dockerfile_path = context.join("Dockerfile");
        std::fs::write(&dockerfile_path, dockerfile).map_err(|e| SubstrateError::Io {
            path: dockerfile_path.clone(),
            error: e.to_string(),
        })?;

        self.build_context(&context, &dockerfile_path, &spec.platform)
            .await
    }

    async fn build_dockerfile(
        &self,
        context: &Path,
        dockerfile: &Path,
        platform: &str,
    ) -> Result<String, SubstrateError> {
        self.build_context(context, dockerfile, platform).await
    }

    async fn login(
        &self,
        registry: &str,
        username: &str,
        secret: &str,
    ) -> Result<(), SubstrateError> {
        self.run_cli(
            &["login", registry, "-u", username, "--password-stdin"],
            Some(secret),
        )
        .await?;
        Ok(())
    }

    async fn push(&self, image_id: &str, reference: &str) -> Result<(), SubstrateError> {
        self.run_cli(&["tag", image_id, reference], None).await?;
        self.run_cli(&["push", reference], None).await?;
        Ok(())
    }
}

/// Extract "x.y.z" from `docker --version` style output.
fn parse_version(text: &str) -> Option<semver::Version> {
    let re = regex::Regex::new(r"(\d+\.\d+\.\d+)").ok()?;
    let captured = re.captures(text)?.get(1)?.as_str();
    captured.parse().ok()
}

fn last_exec(ops: &[StageOp]) -> Option<&[String]> {
    ops.iter().rev().find_map(|op| match op {
        StageOp::Exec { argv } => Some(argv.as_slice()),
        _ => None,
    })
}

fn trim_last_exec(ops: &[StageOp]) -> Vec<StageOp> {
    let mut trimmed = ops.to_vec();
    if let Some(pos) = trimmed
        .iter()
        .rposition(|op| matches!(op, StageOp::Exec { .. }))
    {
        trimmed.remove(pos);
    }
    trimmed
}

/// Render staged operations into Dockerfile text, materializing filtered
/// directory copies into the build context as numbered subdirectories.
fn render_dockerfile(
    ops: &[StageOp],
    entrypoint: Option<&[String]>,
    context: &Path,
) -> Result<String, SubstrateError> {
    let mut lines = Vec::new();
    let mut active_mounts: Vec<(String, String)> = Vec::new(); // (cache id, target)
    let mut copy_index = 0usize;

    for op in ops {
        match op {
            StageOp::BaseImage { reference } => {
                lines.push(format!("FROM {reference}"));
            }
            StageOp::CopyDir {
                source,
                dest,
                include,
            } => {
                let ctx_name = format!("ctx{copy_index}");
                copy_index += 1;
                materialize_copy(source, &context.join(&ctx_name), include)?;
                lines.push(format!("COPY {ctx_name}/ {dest}"));
            }
            StageOp::MountCache { volume, dest } => {
                active_mounts.push((volume.id().to_string(), dest.clone()));
            }
            StageOp::Workdir { path } => {
                lines.push(format!("WORKDIR {path}"));
            }
            StageOp::Env { key, value } => {
                lines.push(format!("ENV {key}={}", shell_quote(value)));
            }
            StageOp::Exec { argv } => {
                let mut run = String::from("RUN");
                for (id, target) in &active_mounts {
                    run.push_str(&format!(" --mount=type=cache,id={id},target={target}"));
                }
                let quoted: Vec<String> = argv.iter().map(|a| shell_quote(a)).collect();
                run.push(' ');
                run.push_str(&quoted.join(" "));
                lines.push(run);
            }
        }
    }

    if let Some(cmd) = entrypoint {
        lines.push(format!("ENTRYPOINT {}", json_array(cmd)));
    }

    lines.push(String::new());
    Ok(lines.join("\n"))
}

/// Render a runtime-image spec, copying artifact content into the context.
fn render_image_spec(spec: &ImageSpec, context: &Path) -> Result<String, SubstrateError> {
    let mut lines = vec![format!("FROM {}", spec.base_image)];

    for (index, copy) in spec.copies.iter().enumerate() {
        let ctx_name = format!("art{index}");
        let staging = context.join(&ctx_name);
        copy_tree(&copy.source, &staging)?;
        lines.push(format!("COPY {ctx_name} {}", copy.dest));
    }

    if let Some(ref workdir) = spec.workdir {
        lines.push(format!("WORKDIR {workdir}"));
    }
    lines.push(format!("ENTRYPOINT {}", json_array(&spec.entrypoint)));
    lines.push(String::new());

    Ok(lines.join("\n"))
}

/// Copy `source` into `dest`, keeping only files matching the include
/// patterns (everything when the list is empty).
fn materialize_copy(
    source: &Path,
    dest: &Path,
    include: &[String],
) -> Result<(), SubstrateError> {
    // The COPY source must exist even when nothing matches the filter.
    std::fs::create_dir_all(dest).map_err(|e| SubstrateError::Io {
        path: dest.to_path_buf(),
        error: e.to_string(),
    })?;

    for entry in walkdir::WalkDir::new(source)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| SubstrateError::Io {
                path: entry.path().to_path_buf(),
                error: e.to_string(),
            })?;

        if !include.is_empty() && !include_match(rel, include) {
            continue;
        }

        let target = dest.join(rel);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SubstrateError::Io {
                path: parent.to_path_buf(),
                error: e.to_string(),
            })?;
        }
        std::fs::copy(entry.path(), &target).map_err(|e| SubstrateError::Io {
            path: target.clone(),
            error: e.to_string(),
        })?;
    }
    Ok(())
}

fn copy_tree(source: &Path, dest: &Path) -> Result<(), SubstrateError> {
    if source.is_file() {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SubstrateError::Io {
                path: parent.to_path_buf(),
                error: e.to_string(),
            })?;
        }
        std::fs::copy(source, dest).map_err(|e| SubstrateError::Io {
            path: dest.to_path_buf(),
            error: e.to_string(),
        })?;
        return Ok(());
    }
    materialize_copy(source, dest, &[])
}

/// Match a relative path against include patterns: exact relative path,
/// bare file name, or `*.ext` suffix glob.
fn include_match(rel: &Path, patterns: &[String]) -> bool {
    let rel_str = rel.to_string_lossy();
    let file_name = rel
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    patterns.iter().any(|pattern| {
        if let Some(suffix) = pattern.strip_prefix("*.") {
            file_name.ends_with(&format!(".{suffix}"))
        } else {
            rel_str == pattern.as_str() || file_name == pattern.as_str()
        }
    })
}

/// Single-quote an argument for a Dockerfile RUN line.
fn shell_quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@,".contains(c))
    {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

fn json_array(argv: &[String]) -> String {
    serde_json::to_string(argv).unwrap_or_else(|_| "[]".to_string())
}
