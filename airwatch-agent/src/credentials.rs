//! PurpleAir read key loading
//!
//! The key lives alone in a text file; only its first line counts and
//! surrounding whitespace is ignored.

use anyhow::{bail, Context, Result};
use std::fmt;
use std::path::Path;
use tracing::info;

/// API read key. Never printed, only its length shows up in logs.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey(<{} chars>)", self.0.len())
    }
}

pub async fn read_api_key(path: &Path) -> Result<ApiKey> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Cannot read API key file {}", path.display()))?;

    let key = content.lines().next().unwrap_or_default().trim();
    if key.is_empty() {
        bail!("API key file {} is empty", path.display());
    }

    let key = ApiKey::new(key);
    info!("Loaded PurpleAir read key ({} chars)", key.expose().len());
    Ok(key)
}
