use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use tracing::debug;

pub const USERNAME_ENV: &str = "ADBOOK_USERNAME";
pub const PASSWORD_ENV: &str = "ADBOOK_PASSWORD";

#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading credentials: {}", path.display()))?;
        let creds: Credentials = serde_json::from_str(&raw)
            .with_context(|| format!("parsing credentials JSON: {}", path.display()))?;
        creds.validate()?;
        Ok(creds)
    }

    pub fn from_env() -> Option<Self> {
        let username = std::env::var(USERNAME_ENV).ok()?;
        let password = std::env::var(PASSWORD_ENV).ok()?;
        Some(Self { username, password })
    }

    pub fn resolve(path: &Path, allow_env: bool) -> Result<Self> {
        if allow_env {
            if let Some(creds) = Self::from_env() {
                debug!("using credentials from {USERNAME_ENV}/{PASSWORD_ENV}");
                creds.validate()?;
                return Ok(creds);
            }
        }
        Self::load(path)
    }

    fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            bail!("credentials have an empty username");
        }
        Ok(())
    }
}
