//! Configuration file lookup and root folder resolution

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "VCMP_ROOT_FOLDER";

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. `root_folder` key of the TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    config_file: Option<&Path>,
) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    let config_path = config_file
        .map(Path::to_path_buf)
        .or_else(|| default_config_file().ok());
    if let Some(config_path) = config_path {
        if let Ok(Some(root)) = read_root_folder_key(&config_path) {
            return root;
        }
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Read the `root_folder` key of a TOML config file
///
/// Returns `Ok(None)` when the file parses but has no such key.
pub fn read_root_folder_key(config_path: &Path) -> Result<Option<PathBuf>> {
    let content = std::fs::read_to_string(config_path)?;
    let value = toml::from_str::<toml::Value>(&content)
        .map_err(|e| Error::Config(format!("{}: {}", config_path.display(), e)))?;

    Ok(value
        .get("root_folder")
        .and_then(|v| v.as_str())
        .map(PathBuf::from))
}

/// Locate the platform config file (`<config dir>/vcmp/config.toml`)
///
/// On Linux `/etc/vcmp/config.toml` is consulted when the user file is absent.
pub fn default_config_file() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("vcmp").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/vcmp/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/vcmp (or /var/lib/vcmp for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("vcmp"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/vcmp"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("vcmp"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/vcmp"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("vcmp"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\vcmp"))
    } else {
        PathBuf::from("./vcmp_data")
    }
}
