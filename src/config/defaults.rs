//! Default configuration values

/// Platform images are built and published for.
///
/// This is the deployment platform, not the host platform: cross-building
/// for it is the default, not an exception.
pub const DEPLOY_PLATFORM: &str = "linux/arm64";

/// Pinned Go toolchain base image for compiled services
pub const GO_BASE_IMAGE: &str = "golang:1.24";

/// Pinned Node toolchain base image for bundled services
pub const NODE_BASE_IMAGE: &str = "node:22-bookworm-slim";

/// Minimal runtime base image for packaged binaries
pub const RUNTIME_BASE_IMAGE: &str = "alpine:3.21";

/// Cache key for the Go module download cache (shared by all compiled services)
pub const GO_MOD_CACHE_KEY: &str = "go-mod-cache";

/// Cache key for the Go build object cache (shared by all compiled services)
pub const GO_BUILD_CACHE_KEY: &str = "go-build-cache";

/// Cache key for the content-addressed pnpm store (shared by all bundled services)
pub const PNPM_STORE_CACHE_KEY: &str = "pnpm-store";

/// Mount path of the Go module cache inside the build environment
pub const GO_MOD_CACHE_PATH: &str = "/go/pkg/mod";

/// Mount path of the Go build cache inside the build environment
pub const GO_BUILD_CACHE_PATH: &str = "/root/.cache/go-build";

/// Mount path of the pnpm store inside the build environment
pub const PNPM_STORE_PATH: &str = "/root/.local/share/pnpm/store";

/// Install path for packaged binaries inside the runtime image
pub const BINARY_INSTALL_DIR: &str = "/usr/local/bin";

/// Application root for packaged asset directories
pub const APP_ROOT: &str = "/app";

/// Default bundler output directory within a bundled service's subtree
pub const DEFAULT_BUNDLE_DIR: &str = "dist";

/// Default runtime command for packaged asset directories
pub const DEFAULT_ASSETS_RUN: [&str; 3] = ["npm", "run", "start"];

/// Default number of services released concurrently
pub const DEFAULT_MAX_PARALLEL: usize = 4;

/// Minimum container runtime version slipway is tested against
pub const MIN_RUNTIME_VERSION: &str = "20.10.0";

/// Registry API request timeout (in seconds)
pub const REGISTRY_TIMEOUT_SECS: u64 = 30;

/// Window within which failed registry API requests are retried (seconds)
pub const REGISTRY_RETRY_WINDOW_SECS: u64 = 60;

/// Environment variable holding the registry username
pub const REGISTRY_USER_ENV: &str = "SLIPWAY_REGISTRY_USER";

/// Environment variable holding the registry token or password
pub const REGISTRY_TOKEN_ENV: &str = "SLIPWAY_REGISTRY_TOKEN";
