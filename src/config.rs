use std::path::PathBuf;
use std::{env, io};

use tracing::debug;

pub const LOCATION_STORAGE_KEY: &str = "xbuddyLocationCache";
pub const DEBUG_STORAGE_KEY: &str = "debug";
pub const DEFAULT_EXPORT_PREFIX: &str = "xbuddy-locations";

const DEFAULT_DATA_DIR: &str = "xbuddy-data";
const DEFAULT_DATABASE_FILE: &str = "xbuddy-storage.db";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub database_file_name: String,
    pub download_dir: PathBuf,
    pub location_storage_key: String,
    pub debug_storage_key: String,
    pub export_prefix: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        let data_dir = env::var("XBUDDY_DATA_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let download_dir = env::var("XBUDDY_DOWNLOAD_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("downloads"));

        Self {
            database_file_name: parse_string("XBUDDY_DATABASE_FILE", DEFAULT_DATABASE_FILE),
            location_storage_key: parse_string("XBUDDY_LOCATION_STORAGE_KEY", LOCATION_STORAGE_KEY),
            debug_storage_key: parse_string("XBUDDY_DEBUG_STORAGE_KEY", DEBUG_STORAGE_KEY),
            export_prefix: parse_string("XBUDDY_EXPORT_PREFIX", DEFAULT_EXPORT_PREFIX),
            data_dir,
            download_dir,
        }
    }

    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            download_dir: data_dir.join("downloads"),
            data_dir,
            database_file_name: DEFAULT_DATABASE_FILE.to_string(),
            location_storage_key: LOCATION_STORAGE_KEY.to_string(),
            debug_storage_key: DEBUG_STORAGE_KEY.to_string(),
            export_prefix: DEFAULT_EXPORT_PREFIX.to_string(),
        }
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.data_dir.join("staging")
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_string(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}
