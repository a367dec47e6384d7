//! Persistent per-installation device identifier

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;
use uuid::Uuid;

use crate::error::DeviceIdError;

/// Default location: `<config dir>/tvgo_export/uuid`
pub fn default_device_file() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("tvgo_export");
    path.push("uuid");
    path
}

/// Read the stored device id, creating and persisting a fresh one on first use.
pub fn load_or_create(path: &Path) -> Result<String, DeviceIdError> {
    if path.exists() {
        let content = fs::read_to_string(path).map_err(|source| DeviceIdError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let id = content.trim();
        if !id.is_empty() {
            return Ok(id.to_string());
        }
    }

    let id = Uuid::new_v4().to_string();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| DeviceIdError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, &id).map_err(|source| DeviceIdError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "registered new device id");
    Ok(id)
}
