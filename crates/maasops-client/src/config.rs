use crate::ClientError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const URL_ENV: &str = "MAAS_URL";
pub const API_KEY_ENV: &str = "MAAS_APIKEY";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaasConfig {
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl MaasConfig {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_owned(),
            api_key: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_owned());
        self
    }

    #[must_use]
    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Resolve the configuration for one invocation.
    ///
    /// Each field is taken from the explicit argument, then the process
    /// environment (`MAAS_URL`, `MAAS_APIKEY`), then the config file
    /// (`~/.config/maasops/config.toml`, or `file` if given).
    pub fn resolve(
        url: Option<&str>,
        api_key: Option<&str>,
        file: Option<&Path>,
    ) -> Result<Self, ClientError> {
        let file_config = match file {
            Some(path) => Some(Self::load(path)?),
            None => match default_config_path() {
                Ok(path) if path.exists() => Some(Self::load(&path)?),
                _ => None,
            },
        };
        Self::resolve_with(url, api_key, |name| std::env::var(name).ok(), file_config)
    }

    /// [`resolve`](Self::resolve) with the environment lookup and file contents injected.
    pub fn resolve_with(
        url: Option<&str>,
        api_key: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
        file_config: Option<Self>,
    ) -> Result<Self, ClientError> {
        let non_empty = |s: String| if s.trim().is_empty() { None } else { Some(s) };

        let file_url = file_config.as_ref().map(|c| c.url.clone());
        let file_key = file_config.as_ref().and_then(|c| c.api_key.clone());
        let timeout = file_config
            .as_ref()
            .map_or(DEFAULT_REQUEST_TIMEOUT_SECS, |c| c.request_timeout_secs);

        let url = url
            .map(str::to_owned)
            .and_then(non_empty)
            .or_else(|| env(URL_ENV).and_then(non_empty))
            .or_else(|| file_url.and_then(non_empty))
            .ok_or_else(|| {
                ClientError::Config(format!(
                    "no MAAS URL: pass --maas-url or set {URL_ENV}"
                ))
            })?;
        let api_key = api_key
            .map(str::to_owned)
            .and_then(non_empty)
            .or_else(|| env(API_KEY_ENV).and_then(non_empty))
            .or_else(|| file_key.and_then(non_empty));

        let mut config = Self::new(&url).with_request_timeout_secs(timeout);
        config.api_key = api_key;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ClientError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            ClientError::Config(format!("invalid config {}: {e}", path.display()))
        })
    }

    /// Absolute URL of an API path such as `machines/` or `machines/abc/`.
    pub fn api_url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.url, crate::API_PREFIX, path)
    }
}

fn default_config_path() -> Result<PathBuf, ClientError> {
    let home = std::env::var("HOME").map_err(|_| ClientError::Config("HOME not set".to_owned()))?;
    Ok(PathBuf::from(home).join(".config/maasops/config.toml"))
}
