//! Registry credentials
//!
//! Credentials are opaque to the rest of the crate: the orchestrator only
//! ever forwards them to the substrate's login. Sourced from the
//! environment so CI systems can inject them without touching the catalog.

use crate::config::defaults;
use crate::error::PublishError;

/// An opaque registry credential.
///
/// The secret never appears in Debug output or logs.
#[derive(Clone)]
pub struct Credential {
    username: String,
    secret: String,
}

impl Credential {
    pub fn new(username: &str, secret: &str) -> Self {
        Self {
            username: username.to_string(),
            secret: secret.to_string(),
        }
    }

    /// Read the credential from the environment.
    ///
    /// The username falls back to the catalog's `registry.username` when
    /// the environment does not override it.
    pub fn from_env(registry: &str, default_username: Option<&str>) -> Result<Self, PublishError> {
        let username = std::env::var(defaults::REGISTRY_USER_ENV)
            .ok()
            .or_else(|| default_username.map(str::to_string))
            .ok_or_else(|| PublishError::MissingCredential {
                registry: registry.to_string(),
            })?;

        let secret = std::env::var(defaults::REGISTRY_TOKEN_ENV).map_err(|_| {
            PublishError::MissingCredential {
                registry: registry.to_string(),
            }
        })?;

        Ok(Self { username, secret })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let credential = Credential::new("releaser", "hunter2");
        let rendered = format!("{credential:?}");
        assert!(rendered.contains("releaser"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
