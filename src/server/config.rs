//! Inference Server Configuration

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use crate::models::{
    EmbeddingConfig, GenerationConfig, InferenceError, InferenceResult, ModelsConfig,
    OnnxRuntimeConfig,
};

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:5050";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub network: NetworkConfig,
    pub models: ModelsConfig,
    pub onnx: OnnxRuntimeConfig,
    pub generation: GenerationConfig,
    pub embedding: EmbeddingConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_address: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> InferenceResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> InferenceResult<Self> {
        let config: ServerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read `path` if it exists, otherwise fall back to the built-in defaults.
    ///
    /// Runs before logging is set up, so callers report the fallback themselves.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> InferenceResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn bind_address(&self) -> InferenceResult<SocketAddr> {
        self.network
            .bind_address
            .parse()
            .map_err(|e| InferenceError::ConfigError {
                message: format!("Invalid bind address '{}': {}", self.network.bind_address, e),
            })
    }

    pub fn validate(&self) -> InferenceResult<()> {
        self.bind_address()?;
        self.generation.validate()?;
        self.embedding.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_address().unwrap().port(), 5050);
        assert_eq!(config.embedding.batch_size, 8);
        assert_eq!(config.embedding.max_seq_length, 128);
        assert_eq!(config.generation.max_input_tokens, 512);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = ServerConfig::from_str(
            r#"
            [network]
            bind_address = "127.0.0.1:6000"

            [generation]
            seed = 42

            [models]
            offline = true
            "#,
        )
        .unwrap();

        assert_eq!(config.bind_address().unwrap().port(), 6000);
        assert_eq!(config.generation.seed, Some(42));
        assert_eq!(config.generation.max_new_tokens, 100);
        assert!(config.models.offline);
        assert_eq!(config.models.embedder_repo, "sentence-transformers/all-MiniLM-L6-v2");
        assert_eq!(config.monitoring.log_level, "info");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(ServerConfig::from_str("[embedding]\nbatch_size = 0").is_err());
        assert!(ServerConfig::from_str("[network]\nbind_address = \"nowhere\"").is_err());
        assert!(ServerConfig::from_str("[generation]\ntemperature = -0.5").is_err());
        assert!(ServerConfig::from_str("not toml at all [").is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = ServerConfig::load_or_default("/nonexistent/config.toml").unwrap();
        assert_eq!(config.network.bind_address, DEFAULT_BIND_ADDRESS);
    }
}
