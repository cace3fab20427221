use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use url::{ParseError, Url};

use crate::error::{ClientError, Result};
use crate::stream::StreamProtocol;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const API_BASE_URL_ENV: &str = "RAGCHAT_API_BASE_URL";
pub const STREAM_PROTOCOL_ENV: &str = "RAGCHAT_STREAM_PROTOCOL";

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub stream_protocol: Option<StreamProtocol>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            api_base_url: Some(DEFAULT_API_BASE_URL.to_string()),
            stream_protocol: Some(StreamProtocol::Structured),
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path).map_err(|source| ClientError::File {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = serde_json::from_str(&config_content)
            .map_err(|e| ClientError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let io_err = |source| ClientError::File {
            path: path.display().to_string(),
            source,
        };

        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content).map_err(io_err)?;
        Ok(())
    }

    /// Environment wins over the file, the file over the default.
    pub fn api_base_url(&self) -> String {
        std::env::var(API_BASE_URL_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.api_base_url.clone())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
    }

    /// Environment wins over the file; an unknown value is ignored.
    pub fn stream_protocol(&self) -> StreamProtocol {
        self.stream_protocol_with(std::env::var(STREAM_PROTOCOL_ENV).ok())
    }

    fn stream_protocol_with(&self, env_value: Option<String>) -> StreamProtocol {
        let from_env = env_value
            .filter(|v| !v.trim().is_empty())
            .and_then(|v| match v.parse::<StreamProtocol>() {
                Ok(protocol) => Some(protocol),
                Err(err) => {
                    tracing::warn!(%err, "ignoring {}", STREAM_PROTOCOL_ENV);
                    None
                }
            });
        from_env.or(self.stream_protocol).unwrap_or_default()
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints::new(&self.api_base_url())
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ClientError::Config("Could not determine config directory".to_string()))?;

        Ok(config_dir.join("ragchat"))
    }

    fn get_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }
}

/// Backend URLs derived from one base address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: String,
}

impl Endpoints {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn chat(&self) -> String {
        format!("{}/api/chat", self.base)
    }

    pub fn ingest(&self) -> String {
        format!("{}/api/ingest/", self.base)
    }

    /// Document id and page are encoded as single path segments.
    pub fn page(&self, doc_id: &str, page: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base)?;
        url.path_segments_mut()
            .map_err(|_| ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(["api", "files", doc_id, "page", page]);
        Ok(url)
    }
}
