use std::{fs, path::Path, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::scanner::VIDEO_EXTENSIONS;

pub const DATA_DIR_ENV: &str = "VIDEO_CATALOG_DATA_DIR";
pub const CATALOG_DB_FILE: &str = "catalog.sqlite";
pub const PREFS_DB_FILE: &str = "preferences.sqlite";

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub default_scan_depth: usize,
    pub video_extensions: Vec<String>,
    /// Used until the user has toggled filter persistence once.
    pub persist_filters_default: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            default_scan_depth: 2,
            video_extensions: VIDEO_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            persist_filters_default: true,
        }
    }
}

impl AppConfig {
    pub fn catalog_db_path(&self) -> PathBuf {
        self.data_dir.join(CATALOG_DB_FILE)
    }

    pub fn prefs_db_path(&self) -> PathBuf {
        self.data_dir.join(PREFS_DB_FILE)
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    data_dir: Option<String>,
    default_scan_depth: Option<usize>,
    video_extensions: Option<Vec<String>>,
    persist_filters_default: Option<bool>,
}

pub fn default_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("VideoCatalog")
}

/// Reads `path` as JSON. Missing or malformed files fall back to defaults.
pub fn load_config(path: &Path) -> AppConfig {
    let mut cfg = AppConfig::default();

    match fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str::<RawConfig>(&raw) {
            Ok(parsed) => {
                if let Some(dir) = parsed.data_dir {
                    cfg.data_dir = PathBuf::from(dir);
                }
                if let Some(depth) = parsed.default_scan_depth {
                    cfg.default_scan_depth = depth;
                }
                if let Some(exts) = parsed.video_extensions {
                    let exts: Vec<String> = exts
                        .into_iter()
                        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
                        .filter(|e| !e.is_empty())
                        .collect();
                    if exts.is_empty() {
                        warn!("Empty video_extensions in {}; keeping defaults.", path.display());
                    } else {
                        cfg.video_extensions = exts;
                    }
                }
                if let Some(persist) = parsed.persist_filters_default {
                    cfg.persist_filters_default = persist;
                }
                info!("Loaded config from {}", path.display());
            }
            Err(err) => {
                warn!("Failed to parse {} ({}). Using defaults.", path.display(), err);
            }
        },
        Err(_) => {
            info!("No {} found; using defaults", path.display());
        }
    }

    cfg
}
