use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::csv_codec::{normalize_username, parse_rows, to_csv};
use crate::download::{export_file_name, DownloadTarget, ObjectUrl, CSV_MIME_TYPE};
use crate::errors::{AppError, AppResult};
use crate::location_cache::{LocationCache, LocationEntry};
use crate::settings::SettingsStore;

pub const SETTINGS_SAVED: &str = "Settings saved!";
pub const SAVE_FAILED: &str = "Failed to save settings. See console for details.";
pub const EXPORT_PREPARING: &str = "Preparing CSV export...";
pub const EXPORT_EMPTY: &str = "No cached entries found.";
pub const EXPORT_FAILED: &str = "Failed to export CSV. See console for details.";
pub const IMPORT_SYNCING: &str = "Syncing entries from CSV...";
pub const IMPORT_FAILED: &str = "Failed to import CSV. See console for details.";

pub trait OptionsView: Send + Sync {
    fn debug_checked(&self) -> bool;

    fn set_debug_checked(&self, checked: bool);

    fn set_status(&self, message: &str, is_error: bool);

    fn alert(&self, message: &str);

    fn selected_file(&self) -> Option<PathBuf>;

    fn clear_selected_file(&self);
}

#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub count: usize,
    pub file_name: String,
    pub path: PathBuf,
}

pub struct OptionsController {
    settings: SettingsStore,
    cache: LocationCache,
    downloads: Arc<dyn DownloadTarget>,
    export_prefix: String,
}

impl OptionsController {
    pub fn new(
        settings: SettingsStore,
        cache: LocationCache,
        downloads: Arc<dyn DownloadTarget>,
        export_prefix: impl Into<String>,
    ) -> Self {
        Self {
            settings,
            cache,
            downloads,
            export_prefix: export_prefix.into(),
        }
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn cache(&self) -> &LocationCache {
        &self.cache
    }

    pub async fn load(&self, view: &dyn OptionsView) {
        match self.settings.debug_flag().await {
            Ok(enabled) => view.set_debug_checked(enabled),
            Err(err) => {
                warn!(target: "options", ?err, "failed to read debug flag");
                view.set_debug_checked(false);
            }
        }
    }

    pub async fn save(&self, view: &dyn OptionsView) {
        match self.settings.set_debug_flag(view.debug_checked()).await {
            Ok(()) => view.alert(SETTINGS_SAVED),
            Err(err) => {
                error!(target: "options", ?err, "X Buddy settings save failed");
                view.set_status(SAVE_FAILED, true);
            }
        }
    }

    pub async fn export(&self, view: &dyn OptionsView) {
        view.set_status(EXPORT_PREPARING, false);
        match self.export_locations().await {
            Ok(outcome) => view.set_status(&export_status(outcome.count), false),
            Err(err) => {
                error!(target: "options", ?err, "X Buddy export failed");
                view.set_status(&err.user_message(EXPORT_FAILED), true);
            }
        }
    }

    pub async fn import(&self, view: &dyn OptionsView) {
        let Some(path) = view.selected_file() else {
            view.set_status(&AppError::MissingFile.to_string(), true);
            return;
        };

        view.set_status(IMPORT_SYNCING, false);
        match self.import_file(&path).await {
            Ok(imported) => {
                view.clear_selected_file();
                view.set_status(&import_status(imported), false);
            }
            Err(err) => {
                error!(target: "options", ?err, path = %path.display(), "X Buddy import failed");
                view.set_status(&err.user_message(IMPORT_FAILED), true);
            }
        }
    }

    pub async fn export_locations(&self) -> AppResult<ExportOutcome> {
        let cache = self.cache.read().await?;
        let export = to_csv(&cache);
        let file_name = export_file_name(&self.export_prefix, Utc::now());

        let url = ObjectUrl::create(
            Arc::clone(&self.downloads),
            export.text.as_bytes(),
            CSV_MIME_TYPE,
        )?;
        let path = url.deliver(&file_name)?;
        drop(url);

        info!(target: "options", count = export.count, file = %file_name, "location cache exported");
        Ok(ExportOutcome {
            count: export.count,
            file_name,
            path,
        })
    }

    async fn import_file(&self, path: &Path) -> AppResult<usize> {
        let bytes = tokio::fs::read(path).await?;
        let text = String::from_utf8_lossy(&bytes);
        self.import_locations(&text).await
    }

    pub async fn import_locations(&self, text: &str) -> AppResult<usize> {
        let rows = parse_rows(text);
        if rows.is_empty() {
            return Err(AppError::EmptyInput);
        }

        let mut cache = self.cache.read().await?;
        let now = now_millis();
        let mut updated = 0_usize;

        for row in rows {
            let username = normalize_username(&row.username);
            if username.is_empty() {
                continue;
            }
            let location = Some(row.location).filter(|location| !location.is_empty());
            cache.insert(
                username,
                LocationEntry::new(location, row.timestamp.unwrap_or(now)),
            );
            updated += 1;
        }

        if updated == 0 {
            return Err(AppError::NoValidEntries);
        }

        self.cache.write(&cache).await?;
        info!(target: "options", updated, total = cache.len(), "location cache imported");
        Ok(updated)
    }
}

pub fn export_status(count: usize) -> String {
    if count == 0 {
        return EXPORT_EMPTY.to_string();
    }
    format!("Exported {count} {}.", entries_label(count))
}

pub fn import_status(count: usize) -> String {
    format!("Synced {count} {} from CSV.", entries_label(count))
}

fn entries_label(count: usize) -> &'static str {
    if count == 1 {
        "entry"
    } else {
        "entries"
    }
}

fn now_millis() -> f64 {
    Utc::now().timestamp_millis() as f64
}

#[cfg(test)]
mod tests {
    use std::fs;

    use parking_lot::Mutex;
    use tempfile::{tempdir, TempDir};

    use super::*;
    use crate::download::FsDownloadTarget;
    use crate::location_cache::LocationCacheMap;
    use crate::storage::{MemoryKeyValueStore, StorageArea, TestFaultInjector};

    #[derive(Default)]
    struct ViewState {
        checked: bool,
        status: Vec<(String, bool)>,
        alerts: Vec<String>,
        file: Option<PathBuf>,
    }

    #[derive(Default)]
    struct RecordingView {
        state: Mutex<ViewState>,
    }

    impl RecordingView {
        fn with_file(path: PathBuf) -> Self {
            let view = Self::default();
            view.state.lock().file = Some(path);
            view
        }

        fn last_status(&self) -> (String, bool) {
            self.state.lock().status.last().cloned().unwrap()
        }
    }

    impl OptionsView for RecordingView {
        fn debug_checked(&self) -> bool {
            self.state.lock().checked
        }

        fn set_debug_checked(&self, checked: bool) {
            self.state.lock().checked = checked;
        }

        fn set_status(&self, message: &str, is_error: bool) {
            self.state.lock().status.push((message.to_string(), is_error));
        }

        fn alert(&self, message: &str) {
            self.state.lock().alerts.push(message.to_string());
        }

        fn selected_file(&self) -> Option<PathBuf> {
            self.state.lock().file.clone()
        }

        fn clear_selected_file(&self) {
            self.state.lock().file = None;
        }
    }

    struct Harness {
        dir: TempDir,
        controller: OptionsController,
        sync_hooks: Arc<TestFaultInjector>,
        local_hooks: Arc<TestFaultInjector>,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let mut sync = MemoryKeyValueStore::new(StorageArea::Sync);
            let mut local = MemoryKeyValueStore::new(StorageArea::Local);
            let sync_hooks = sync.enable_test_hooks();
            let local_hooks = local.enable_test_hooks();
            let downloads =
                FsDownloadTarget::new(dir.path().join("staging"), dir.path().join("downloads"))
                    .unwrap();
            let controller = OptionsController::new(
                SettingsStore::new(Arc::new(sync), "debug"),
                LocationCache::new(Arc::new(local), "xbuddyLocationCache"),
                Arc::new(downloads),
                "xbuddy-locations",
            );
            Self {
                dir,
                controller,
                sync_hooks,
                local_hooks,
            }
        }

        fn csv_file(&self, contents: &str) -> PathBuf {
            let path = self.dir.path().join("import.csv");
            fs::write(&path, contents).unwrap();
            path
        }

        fn downloads(&self) -> Vec<PathBuf> {
            fs::read_dir(self.dir.path().join("downloads"))
                .unwrap()
                .map(|entry| entry.unwrap().path())
                .collect()
        }
    }

    #[tokio::test]
    async fn load_reflects_stored_flag() {
        let harness = Harness::new();
        let view = RecordingView::default();
        harness.controller.load(&view).await;
        assert!(!view.debug_checked());

        harness.controller.settings().set_debug_flag(true).await.unwrap();
        harness.controller.load(&view).await;
        assert!(view.debug_checked());
    }

    #[tokio::test]
    async fn save_persists_checkbox_and_confirms() {
        let harness = Harness::new();
        let view = RecordingView::default();
        view.set_debug_checked(true);

        harness.controller.save(&view).await;

        assert_eq!(view.state.lock().alerts, vec![SETTINGS_SAVED.to_string()]);
        assert!(harness.controller.settings().debug_flag().await.unwrap());
    }

    #[tokio::test]
    async fn save_failure_is_reported_in_status() {
        let harness = Harness::new();
        let view = RecordingView::default();
        harness.sync_hooks.fail_next_set();

        harness.controller.save(&view).await;

        assert!(view.state.lock().alerts.is_empty());
        assert_eq!(view.last_status(), (SAVE_FAILED.to_string(), true));
    }

    #[tokio::test]
    async fn export_of_empty_cache_reports_no_entries() {
        let harness = Harness::new();
        let view = RecordingView::default();

        harness.controller.export(&view).await;

        let status = view.state.lock().status.clone();
        assert_eq!(status[0], (EXPORT_PREPARING.to_string(), false));
        assert_eq!(view.last_status(), (EXPORT_EMPTY.to_string(), false));
        let files = harness.downloads();
        assert_eq!(files.len(), 1);
        assert_eq!(
            fs::read_to_string(&files[0]).unwrap(),
            "username,location,timestamp"
        );
    }

    #[tokio::test]
    async fn export_writes_named_file_and_counts_entries() {
        let harness = Harness::new();
        let mut cache = LocationCacheMap::new();
        cache.insert("alice".into(), LocationEntry::new(Some("NYC".into()), 1.0));
        harness.controller.cache().write(&cache).await.unwrap();
        let view = RecordingView::default();

        harness.controller.export(&view).await;

        assert_eq!(view.last_status(), ("Exported 1 entry.".to_string(), false));
        let files = harness.downloads();
        let name = files[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("xbuddy-locations-"));
        assert!(name.ends_with(".csv"));
        assert!(!name.contains(':'));
        assert_eq!(
            fs::read_dir(harness.dir.path().join("staging")).unwrap().count(),
            0
        );
    }

    #[tokio::test]
    async fn export_failure_shows_error_status() {
        let harness = Harness::new();
        harness.local_hooks.fail_next_get();
        let view = RecordingView::default();

        harness.controller.export(&view).await;

        assert_eq!(view.last_status(), (EXPORT_FAILED.to_string(), true));
        assert!(harness.downloads().is_empty());
    }

    #[tokio::test]
    async fn import_without_file_touches_no_storage() {
        let harness = Harness::new();
        harness.local_hooks.fail_next_get();
        let view = RecordingView::default();

        harness.controller.import(&view).await;

        assert_eq!(
            view.last_status(),
            ("Choose a CSV file to import.".to_string(), true)
        );
        // the injected failure is still armed because nothing read the cache
        assert!(harness.controller.cache().read().await.is_err());
    }

    #[tokio::test]
    async fn import_merges_rows_and_clears_selection() {
        let harness = Harness::new();
        let mut existing = LocationCacheMap::new();
        existing.insert("alice".into(), LocationEntry::new(Some("Paris".into()), 10.0));
        existing.insert("zed".into(), LocationEntry::new(Some("Oslo".into()), 20.0));
        harness.controller.cache().write(&existing).await.unwrap();

        let path = harness.csv_file("username,location,timestamp\r\n@alice,,\r\nbob,LA,123\r\n");
        let view = RecordingView::with_file(path);
        let before = now_millis();

        harness.controller.import(&view).await;

        assert_eq!(
            view.last_status(),
            ("Synced 2 entries from CSV.".to_string(), false)
        );
        assert!(view.selected_file().is_none());

        let cache = harness.controller.cache().read().await.unwrap();
        assert_eq!(cache.len(), 3);
        assert_eq!(cache["alice"].location, None);
        assert!(cache["alice"].timestamp >= before);
        assert_eq!(cache["bob"], LocationEntry::new(Some("LA".into()), 123.0));
        assert_eq!(cache["zed"], LocationEntry::new(Some("Oslo".into()), 20.0));
    }

    #[tokio::test]
    async fn import_rejects_file_without_rows() {
        let harness = Harness::new();
        let path = harness.csv_file("\u{feff}\r\n\r\n");
        let view = RecordingView::with_file(path.clone());

        harness.controller.import(&view).await;

        assert_eq!(
            view.last_status(),
            ("No valid rows found in CSV.".to_string(), true)
        );
        assert_eq!(view.selected_file(), Some(path));
    }

    #[tokio::test]
    async fn import_rejects_rows_without_usable_usernames() {
        let harness = Harness::new();
        let err = harness
            .controller
            .import_locations(",LA,123\n@@,Paris,5\n")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoValidEntries));
        assert!(harness.controller.cache().read().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rows_dropped_by_the_parser_count_as_empty_input() {
        let harness = Harness::new();
        let err = harness
            .controller
            .import_locations(",LA,123\n")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::EmptyInput));
    }

    #[tokio::test]
    async fn import_decodes_invalid_utf8_lossily() {
        let harness = Harness::new();
        let path = harness.dir.path().join("latin1.csv");
        fs::write(&path, b"username,location\nalice,Z\xfcrich\n").unwrap();
        let view = RecordingView::with_file(path);

        harness.controller.import(&view).await;

        assert_eq!(
            view.last_status(),
            ("Synced 1 entry from CSV.".to_string(), false)
        );
        let cache = harness.controller.cache().read().await.unwrap();
        assert_eq!(
            cache["alice"].location.as_deref(),
            Some("Z\u{fffd}rich")
        );
    }

    #[tokio::test]
    async fn import_storage_failure_uses_generic_message() {
        let harness = Harness::new();
        harness.local_hooks.fail_next_set();
        let view = RecordingView::with_file(harness.csv_file("carol,Rome,1\n"));

        harness.controller.import(&view).await;

        assert_eq!(view.last_status(), (IMPORT_FAILED.to_string(), true));
        assert!(view.selected_file().is_some());
    }

    #[test]
    fn status_texts_pluralize() {
        assert_eq!(export_status(0), EXPORT_EMPTY);
        assert_eq!(export_status(1), "Exported 1 entry.");
        assert_eq!(export_status(3), "Exported 3 entries.");
        assert_eq!(import_status(1), "Synced 1 entry from CSV.");
        assert_eq!(import_status(0), "Synced 0 entries from CSV.");
    }
}
