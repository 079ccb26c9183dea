use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::error::CoreError;

pub const APP_QUALIFIER: &str = "org";
pub const APP_ORG: &str = "peerchat";
pub const APP_NAME: &str = "peerchat";

/// Overrides every other data directory setting when set.
pub const DATA_DIR_ENV: &str = "PC_DATA_DIR";

pub fn platform_data_dir() -> Result<PathBuf, CoreError> {
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .ok_or_else(|| CoreError::Config("cannot determine data directory".into()))?;
    Ok(dirs.data_dir().to_path_buf())
}

pub fn default_config_path() -> Result<PathBuf, CoreError> {
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .ok_or_else(|| CoreError::Config("cannot determine config directory".into()))?;
    Ok(dirs.config_dir().join("config.json"))
}

/// Conversation history lives under `<data>/messages/`.
pub fn message_root(data_dir: &Path) -> PathBuf {
    data_dir.join("messages")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_dirs_belong_to_this_project() {
        // Headless environments may have no home directory at all.
        if let Ok(config) = default_config_path() {
            let text = config.to_string_lossy().to_lowercase();
            assert!(text.contains(APP_NAME), "{text}");
            assert!(config.ends_with("config.json"));
        }
        assert_eq!(message_root(Path::new("/data")), Path::new("/data/messages"));
    }
}
