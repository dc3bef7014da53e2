use std::fs;
use std::path::{Path, PathBuf};

use tidemirror_types::{ConfigError, MirrorConfig};

const CONFIG_DIR: &str = "tidemirror";
const CONFIG_FILE: &str = "mirrors.json";

/// `<platform config dir>/tidemirror/mirrors.json`, if the platform has one.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Load the mirror configuration.
///
/// An explicit `path` must exist. Without one the default location is tried,
/// and if nothing is there the built-in mirror catalogue is used.
pub fn load_config(path: Option<&Path>) -> Result<MirrorConfig, ConfigError> {
    if let Some(path) = path {
        return read_config(path);
    }

    match default_config_path() {
        Some(path) if path.exists() => read_config(&path),
        _ => {
            tracing::debug!("No config file found, using built-in mirrors");
            Ok(MirrorConfig::default())
        },
    }
}

pub fn read_config(path: &Path) -> Result<MirrorConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let config: MirrorConfig = serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    config.check()?;

    tracing::info!(
        path = %path.display(),
        targets = config.targets.len(),
        proxy = config.proxy.enabled,
        "Loaded mirror config"
    );
    Ok(config)
}

/// Validate and write `config` to `path`, creating parent directories.
pub fn save_config(path: &Path, config: &MirrorConfig) -> Result<(), ConfigError> {
    config.check()?;

    let io_error = |e: std::io::Error| ConfigError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    let content = serde_json::to_string_pretty(config).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    // Atomic write
    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    let temp_path = PathBuf::from(temp_path);
    fs::write(&temp_path, content).map_err(io_error)?;
    fs::rename(&temp_path, path).map_err(io_error)
}
