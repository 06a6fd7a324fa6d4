use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{HavenError, Result};
use crate::types::DistanceMetric;

/// Top-level configuration for the Haven application.
///
/// Loaded from `~/.haven/config.toml` by default. Every section falls back to
/// its defaults when omitted, so a partial file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HavenConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl HavenConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: HavenConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| HavenError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.vector.dimension == 0 {
            return Err(HavenError::Config(
                "vector.dimension must be greater than zero".to_string(),
            ));
        }
        if self.vector.nprobe == 0 || self.vector.nlist == 0 {
            return Err(HavenError::Config(
                "vector.nlist and vector.nprobe must be greater than zero".to_string(),
            ));
        }
        if self.chat.max_message_length == 0 {
            return Err(HavenError::Config(
                "chat.max_message_length must be greater than zero".to_string(),
            ));
        }
        if self.session.cookie_name.trim().is_empty() {
            return Err(HavenError::Config(
                "session.cookie_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Interface the HTTP server binds to.
    pub host: String,
    /// HTTP server port.
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.haven/data".to_string(),
            log_level: "info".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Relational store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file name, relative to `general.data_dir`.
    pub database_file: String,
    /// Rows fetched per page when streaming a session's history.
    pub history_page_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_file: "chat_history.db".to_string(),
            history_page_size: 256,
        }
    }
}

/// Which embedding generator to wire into the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// Uniform random vectors. Placeholder until a real model is plugged in.
    #[default]
    Random,
    /// Deterministic hash-derived vectors.
    Hash,
}

/// Vector collection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// Collection holding chat message embeddings.
    pub collection: String,
    /// Vector dimension of the collection.
    pub dimension: usize,
    /// Distance metric of the collection.
    pub metric: DistanceMetric,
    /// Number of inverted lists once the index is trained.
    pub nlist: usize,
    /// Number of lists scanned per search.
    pub nprobe: usize,
    /// Entry count at which k-means training kicks in. Below it, search is exhaustive.
    pub train_threshold: usize,
    /// Lloyd iterations used when training centroids.
    pub kmeans_iterations: usize,
    /// Embedding generator.
    pub embedding: EmbeddingBackend,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            collection: "chat_messages".to_string(),
            dimension: 1536,
            metric: DistanceMetric::L2,
            nlist: 1024,
            nprobe: 10,
            train_threshold: 40_960,
            kmeans_iterations: 10,
            embedding: EmbeddingBackend::Random,
        }
    }
}

/// Chat pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Similar prior messages fetched per turn. 0 disables the lookup.
    pub similar_limit: usize,
    /// Maximum accepted message length in characters.
    pub max_message_length: usize,
    /// Reply text produced by the placeholder responder.
    pub placeholder_response: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            similar_limit: 5,
            max_message_length: 4000,
            placeholder_response:
                "This is an AI response placeholder. How can I help you today?".to_string(),
        }
    }
}

/// Session cookie settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name of the cookie carrying the chat session id.
    pub cookie_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "chat_session".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn create_temp_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = HavenConfig::default();
        assert_eq!(config.general.data_dir, "~/.haven/data");
        assert_eq!(config.general.port, 8000);
        assert_eq!(config.storage.database_file, "chat_history.db");
        assert_eq!(config.vector.collection, "chat_messages");
        assert_eq!(config.vector.dimension, 1536);
        assert_eq!(config.vector.metric, DistanceMetric::L2);
        assert_eq!(config.vector.nlist, 1024);
        assert_eq!(config.vector.nprobe, 10);
        assert_eq!(config.chat.similar_limit, 5);
        assert_eq!(config.session.cookie_name, "chat_session");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
data_dir = "/custom/data"
log_level = "debug"
port = 9000

[vector]
collection = "journal"
dimension = 384
metric = "cosine"
embedding = "hash"

[chat]
similar_limit = 0
"#;
        let file = create_temp_config(content);
        let config = HavenConfig::load(file.path()).unwrap();
        assert_eq!(config.general.data_dir, "/custom/data");
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.port, 9000);
        assert_eq!(config.vector.collection, "journal");
        assert_eq!(config.vector.dimension, 384);
        assert_eq!(config.vector.metric, DistanceMetric::Cosine);
        assert_eq!(config.vector.embedding, EmbeddingBackend::Hash);
        assert_eq!(config.chat.similar_limit, 0);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let file = create_temp_config("[general]\nlog_level = \"warn\"\n");
        let config = HavenConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.vector.dimension, 1536);
        assert_eq!(config.chat.max_message_length, 4000);
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("[general\nport = ");
        let result = HavenConfig::load(file.path());
        assert!(matches!(result, Err(HavenError::Config(_))));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = HavenConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.general.data_dir, "~/.haven/data");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = HavenConfig::default();
        config.vector.nprobe = 32;
        config.save(&path).unwrap();

        let reloaded = HavenConfig::load(&path).unwrap();
        assert_eq!(reloaded.vector.nprobe, 32);
        assert_eq!(reloaded.general.port, config.general.port);
        assert_eq!(reloaded.session.cookie_name, config.session.cookie_name);
    }

    #[test]
    fn test_validate_rejects_zero_dimension() {
        let mut config = HavenConfig::default();
        config.vector.dimension = 0;
        assert!(matches!(config.validate(), Err(HavenError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_nprobe() {
        let mut config = HavenConfig::default();
        config.vector.nprobe = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_cookie_name() {
        let mut config = HavenConfig::default();
        config.session.cookie_name = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
