use crate::constants::{limits, network};
use crate::services::credentials::CredentialField;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Process-level configuration: static credential defaults plus gateway tunables.
#[derive(Debug, Clone)]
pub struct Config {
    defaults: HashMap<CredentialField, String>,
    pub request_timeout: Duration,
    pub detail_concurrency: usize,
    pub prompts_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            defaults: HashMap::new(),
            request_timeout: Duration::from_millis(network::TIMEOUT_API_REQUEST_MS),
            detail_concurrency: limits::DETAIL_FETCH_CONCURRENCY,
            prompts_dir: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts")),
        }
    }
}

impl Config {
    /// Reads `NEXTGEN_*` variables, after loading a `.env` file when one is present.
    pub fn from_env() -> Self {
        let _ = dotenv::dotenv();
        let mut config = Config::default();
        for field in CredentialField::ALL {
            if let Ok(value) = std::env::var(field.env_var()) {
                config = config.with_default(field, value);
            }
        }
        if let Some(ms) = read_positive_env("NEXTGEN_HTTP_TIMEOUT_MS") {
            config.request_timeout = Duration::from_millis(ms as u64);
        }
        if let Some(width) = read_positive_env("NEXTGEN_DETAIL_CONCURRENCY") {
            config.detail_concurrency = width;
        }
        if let Some(dir) = std::env::var("NEXTGEN_PROMPTS_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
        {
            config.prompts_dir = PathBuf::from(dir.trim());
        }
        config
    }

    pub fn with_default(mut self, field: CredentialField, value: impl Into<String>) -> Self {
        let value = value.into();
        if value.trim().is_empty() {
            self.defaults.remove(&field);
        } else {
            self.defaults.insert(field, value.trim().to_string());
        }
        self
    }

    pub fn with_detail_concurrency(mut self, width: usize) -> Self {
        self.detail_concurrency = width.max(1);
        self
    }

    pub fn with_prompts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompts_dir = dir.into();
        self
    }

    pub fn default_for(&self, field: CredentialField) -> Option<&str> {
        self.defaults.get(&field).map(String::as_str)
    }
}

fn read_positive_env(key: &str) -> Option<usize> {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
}
