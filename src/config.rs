use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::api::QueryOptions;
use crate::repositories::{RepositoryError, RepositoryResult};

/// Client configuration persisted as JSON under the platform config dir
/// (`<config>/docchat/config.json`). Missing file loads as defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    pub k: u32,
    pub use_llm: bool,
    pub llm_extractive: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let options = QueryOptions::default();
        Self {
            base_url: "http://localhost:8000".to_string(),
            k: options.k,
            use_llm: options.use_llm,
            llm_extractive: options.llm_extractive,
        }
    }
}

impl ClientConfig {
    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            k: self.k,
            use_llm: self.use_llm,
            llm_extractive: self.llm_extractive,
        }
    }

    fn default_path() -> RepositoryResult<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| RepositoryError::Initialization {
            message: "could not determine config directory".to_string(),
        })?;
        Ok(config_dir.join("docchat").join("config.json"))
    }

    pub fn load() -> RepositoryResult<Self> {
        Self::load_from(&Self::default_path()?)
    }

    pub fn load_from(path: &std::path::Path) -> RepositoryResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn save(&self) -> RepositoryResult<()> {
        self.save_to(&Self::default_path()?)
    }

    /// Atomic write: temp file then rename.
    pub fn save_to(&self, path: &std::path::Path) -> RepositoryResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, json)?;
        std::fs::rename(&temp_path, path)?;
        Ok(())
    }
}
