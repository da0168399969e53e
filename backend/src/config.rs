use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::inference::artifact::ArtifactFormat;
use crate::inference::preprocess::{InputSize, PreprocessConfig, TensorLayout};

pub const CONFIG_ENV_VAR: &str = "REALEYEZ_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/realeyez.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub preprocessing: PreprocessConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    /// Inferred from the file extension when absent.
    pub format: Option<ArtifactFormat>,
    /// Required when the artifact does not declare its resolution.
    pub input_size: Option<InputSize>,
    pub layout: Option<TensorLayout>,
    /// Set for exports that emit logits instead of a sigmoid probability.
    pub apply_sigmoid: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/real_vs_fake_classifier.onnx"),
            format: None,
            input_size: None,
            layout: None,
            apply_sigmoid: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    pub timeout_ms: u64,
    pub max_upload_bytes: usize,
    pub media_dir: PathBuf,
    pub persist_uploads: bool,
    pub cache_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
            workers: None,
            timeout_ms: 30_000,
            max_upload_bytes: 50 * 1024 * 1024,
            media_dir: PathBuf::from("media"),
            persist_uploads: false,
            cache_capacity: 1024,
        }
    }
}

impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl AppConfig {
    /// Reads the file named by `REALEYEZ_CONFIG`, else `config/realeyez.yaml`,
    /// falling back to defaults when neither exists. `PORT` overrides the port.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var(CONFIG_ENV_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let path = Path::new(&path);

        let mut config = if path.exists() {
            info!("Loading configuration from {}", path.display());
            Self::read_file(path)?
        } else {
            warn!(
                "Configuration file {} not found, using built-in defaults",
                path.display()
            );
            Self::default()
        };
        config.apply_port_override(env::var("PORT").ok().as_deref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::read_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_yaml::from_str(&config_str)?)
    }

    pub fn apply_port_override(&mut self, port: Option<&str>) -> Result<(), ConfigError> {
        if let Some(port) = port {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("PORT is not a valid port: {port:?}")))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("model.path must not be empty".into()));
        }
        if let Some(size) = self.model.input_size {
            if !size.is_valid() {
                return Err(ConfigError::Invalid(format!(
                    "model.input_size must be positive, got {}x{}",
                    size.width, size.height
                )));
            }
        }
        if self.preprocessing.max_image_dimension == 0 {
            return Err(ConfigError::Invalid(
                "preprocessing.max_image_dimension must be positive".into(),
            ));
        }
        if self.server.timeout_ms == 0 {
            return Err(ConfigError::Invalid("server.timeout_ms must be positive".into()));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid(
                "server.max_upload_bytes must be positive".into(),
            ));
        }
        if self.server.workers == Some(0) {
            return Err(ConfigError::Invalid("server.workers must be positive".into()));
        }
        Ok(())
    }
}
