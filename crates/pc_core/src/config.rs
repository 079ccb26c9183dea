use std::path::{Path, PathBuf};
use std::time::Duration;

use pc_proto::{ChunkConfig, FloodConfig};
use serde::{Deserialize, Serialize};

use crate::{error::CoreError, paths};

fn default_sweep_interval() -> u64 {
    5
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Handle of the local user; part of the at-rest key derivation.
    pub local_handle: String,
    /// Root for local state.  `PC_DATA_DIR` wins over this.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub chunking: ChunkConfig,
    #[serde(default)]
    pub flood: FloodConfig,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl CoreConfig {
    pub fn new(local_handle: &str) -> Self {
        Self {
            local_handle: local_handle.to_string(),
            data_dir: None,
            chunking: ChunkConfig::default(),
            flood: FloodConfig::default(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let bytes = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.local_handle.trim().is_empty() {
            return Err(CoreError::Config("local_handle must not be empty".into()));
        }
        if self.flood.max_messages == 0 {
            return Err(CoreError::Config("flood.max_messages must be non-zero".into()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(CoreError::Config("sweep_interval_secs must be non-zero".into()));
        }
        self.chunking.validate()?;
        Ok(())
    }

    /// `PC_DATA_DIR`, then `data_dir`, then the platform data directory.
    pub fn resolve_data_dir(&self) -> Result<PathBuf, CoreError> {
        if let Ok(override_path) = std::env::var(paths::DATA_DIR_ENV) {
            return Ok(PathBuf::from(override_path));
        }
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => paths::platform_data_dir(),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn minimal_json_gets_defaults() {
        let config: CoreConfig = serde_json::from_str(r#"{"local_handle":"me"}"#).unwrap();
        assert_eq!(config, CoreConfig::new("me"));
        assert_eq!(config.chunking.buffer_timeout_secs, 30);
        assert_eq!(config.flood.cooldown_ms, 5_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config: CoreConfig = serde_json::from_str(
            r#"{"local_handle":"me","flood":{"max_messages":4},"chunking":{"threshold":100000}}"#,
        )
        .unwrap();
        assert_eq!(config.flood.max_messages, 4);
        assert_eq!(config.flood.window_ms, 1_000);
        assert_eq!(config.chunking.threshold, 100_000);
        assert_eq!(config.chunking.chunk_size, ChunkConfig::default().chunk_size);
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = CoreConfig::new("me");
        config.data_dir = Some(dir.path().join("data"));
        config.save(&path).unwrap();
        assert_eq!(CoreConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn rejects_empty_handle_and_bad_chunking() {
        assert!(matches!(CoreConfig::new(" ").validate(), Err(CoreError::Config(_))));
        let mut config = CoreConfig::new("me");
        config.chunking.chunk_size = config.chunking.threshold;
        assert!(matches!(config.validate(), Err(CoreError::Chunk(_))));
    }
}
