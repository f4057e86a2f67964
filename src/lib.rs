mod config;
mod controller;
mod csv_codec;
mod db;
mod download;
mod errors;
mod location_cache;
mod settings;
mod storage;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use crate::config::{AppConfig, DEBUG_STORAGE_KEY, LOCATION_STORAGE_KEY};
pub use crate::controller::{
    export_status, import_status, ExportOutcome, OptionsController, OptionsView,
};
pub use crate::csv_codec::{
    escape_csv_value, normalize_username, parse_rows, split_line, to_csv, CsvExport, CsvRow,
    CSV_HEADER,
};
pub use crate::db::{bootstrap, DatabaseBootstrap, DatabaseContext};
pub use crate::download::{export_file_name, DownloadTarget, FsDownloadTarget, ObjectUrl};
pub use crate::errors::{AppError, AppResult};
pub use crate::location_cache::{LocationCache, LocationCacheMap, LocationEntry};
pub use crate::settings::SettingsStore;
pub use crate::storage::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore, StorageArea};

pub struct OptionsApp {
    controller: OptionsController,
    db_path: PathBuf,
    db_bootstrap_recovered: bool,
}

impl OptionsApp {
    pub fn initialize(config: &AppConfig) -> AppResult<Self> {
        init_tracing();
        let DatabaseBootstrap {
            context: DatabaseContext { connection, path },
            recovered,
        } = bootstrap(&config.data_dir, &config.database_file_name)?;
        let db = Arc::new(Mutex::new(connection));

        let sync: Arc<dyn KeyValueStore> =
            Arc::new(SqliteKeyValueStore::new(Arc::clone(&db), StorageArea::Sync));
        let local: Arc<dyn KeyValueStore> =
            Arc::new(SqliteKeyValueStore::new(db, StorageArea::Local));
        let downloads = FsDownloadTarget::new(config.staging_dir(), &config.download_dir)?;

        let controller = OptionsController::new(
            SettingsStore::new(sync, config.debug_storage_key.clone()),
            LocationCache::new(local, config.location_storage_key.clone()),
            Arc::new(downloads),
            config.export_prefix.clone(),
        );

        info!(
            target: "options",
            db = %path.display(),
            recovered,
            downloads = %config.download_dir.display(),
            "options backend ready"
        );

        Ok(Self {
            controller,
            db_path: path,
            db_bootstrap_recovered: recovered,
        })
    }

    pub fn controller(&self) -> &OptionsController {
        &self.controller
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn db_bootstrap_recovered(&self) -> bool {
        self.db_bootstrap_recovered
    }
}

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,xbuddy_options_lib=debug"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    });
}
