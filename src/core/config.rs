//! Embedding backend credentials
//!
//! Read from `secrets.toml`:
//!
//! ```toml
//! [openai]
//! api_key = "sk-..."
//! organization = "org-..."            # optional
//! model = "text-embedding-3-small"    # optional
//! base_url = "https://api.openai.com" # optional
//! ```

use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Secrets {
    pub openai: OpenAiSecrets,
}

#[derive(Clone, Deserialize)]
pub struct OpenAiSecrets {
    pub api_key: String,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl fmt::Debug for OpenAiSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiSecrets")
            .field("api_key", &"<redacted>")
            .field("organization", &self.organization)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl Secrets {
    pub fn parse(raw: &str) -> Result<Self> {
        let secrets: Secrets = toml::from_str(raw)?;
        if secrets.openai.api_key.trim().is_empty() {
            bail!("openai.api_key is empty");
        }
        Ok(secrets)
    }

    /// Load secrets, returning `None` when they are missing or unusable
    ///
    /// The search core falls back to exact-only mode in that case, so this is
    /// never an error.
    pub fn load_optional(path: &Path) -> Option<Self> {
        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "no secrets found, semantic search disabled"
            );
            return None;
        }

        let loaded = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))
            .and_then(|raw| Self::parse(&raw));

        match loaded {
            Ok(secrets) => Some(secrets),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %format!("{:#}", e),
                    "invalid secrets, semantic search disabled"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full() -> Result<()> {
        let secrets = Secrets::parse(
            r#"
            [openai]
            organization = "org-123"
            api_key = "sk-abc"
            model = "text-embedding-3-large"
            "#,
        )?;
        assert_eq!(secrets.openai.organization.as_deref(), Some("org-123"));
        assert_eq!(secrets.openai.model.as_deref(), Some("text-embedding-3-large"));
        assert!(secrets.openai.base_url.is_none());
        assert!(!format!("{:?}", secrets).contains("sk-abc"));
        Ok(())
    }

    #[test]
    fn test_invalid_secrets() {
        assert!(Secrets::parse("[openai]\napi_key = \"  \"").is_err());
        assert!(Secrets::parse("[other]\nkey = 1").is_err());
        assert!(Secrets::parse("not toml at all [").is_err());
    }

    #[test]
    fn test_missing_file_is_none() {
        let path = Path::new("/nonexistent/dir/secrets.toml");
        assert!(Secrets::load_optional(path).is_none());
    }
}
