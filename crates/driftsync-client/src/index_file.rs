//! Client index file persistence: load/save the local `FileInfoMap` snapshot
//! that the sync engine reconciles against. Saved as JSON by default;
//! loadable as JSON or YAML by file extension, falling back to trying both
//! parsers when the extension is absent or unrecognized.

use std::path::Path;

use driftsync_core::{FileInfoMap, SyncError};

pub const DEFAULT_META_FILENAME: &str = "index.json";

pub fn load(path: &Path) -> Result<FileInfoMap, SyncError> {
    if !path.exists() {
        return Ok(FileInfoMap::new());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| {
        SyncError::from_io_error(e, format!("reading index file {}", path.display()))
    })?;
    if contents.trim().is_empty() {
        return Ok(FileInfoMap::new());
    }

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&contents)
            .map_err(|e| SyncError::Parse {
                message: e.to_string(),
                context: format!("parsing YAML index file {}", path.display()),
            }),
        _ => serde_json::from_str(&contents).or_else(|json_err| {
            serde_yaml::from_str(&contents).map_err(|_| SyncError::Parse {
                message: json_err.to_string(),
                context: format!("parsing index file {} as JSON or YAML", path.display()),
            })
        }),
    }
}

pub fn save(path: &Path, map: &FileInfoMap) -> Result<(), SyncError> {
    let serialized = match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::to_string(map).map_err(|e| SyncError::Parse {
            message: e.to_string(),
            context: "serializing index file as YAML".to_string(),
        })?,
        _ => serde_json::to_string_pretty(map).map_err(|e| SyncError::Parse {
            message: e.to_string(),
            context: "serializing index file as JSON".to_string(),
        })?,
    };
    std::fs::write(path, serialized)
        .map_err(|e| SyncError::from_io_error(e, format!("writing index file {}", path.display())))
}
