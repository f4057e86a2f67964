use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info, warn};

use crate::errors::{AppError, AppResult};

pub const CSV_MIME_TYPE: &str = "text/csv";

pub trait DownloadTarget: Send + Sync {
    fn stage(&self, bytes: &[u8], mime_type: &str) -> AppResult<String>;

    fn deliver(&self, handle: &str, file_name: &str) -> AppResult<PathBuf>;

    fn release(&self, handle: &str) -> AppResult<()>;
}

pub struct ObjectUrl {
    target: Arc<dyn DownloadTarget>,
    handle: String,
}

impl ObjectUrl {
    pub fn create(
        target: Arc<dyn DownloadTarget>,
        bytes: &[u8],
        mime_type: &str,
    ) -> AppResult<Self> {
        let handle = target.stage(bytes, mime_type)?;
        Ok(Self { target, handle })
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn deliver(&self, file_name: &str) -> AppResult<PathBuf> {
        self.target.deliver(&self.handle, file_name)
    }
}

impl Drop for ObjectUrl {
    fn drop(&mut self) {
        if let Err(err) = self.target.release(&self.handle) {
            warn!(target: "download", handle = %self.handle, ?err, "failed to release staged download");
        }
    }
}

pub fn export_file_name(prefix: &str, now: DateTime<Utc>) -> String {
    let stamp = now
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("{prefix}-{stamp}.csv")
}

pub struct FsDownloadTarget {
    staging_dir: PathBuf,
    download_dir: PathBuf,
    counter: AtomicU64,
}

impl FsDownloadTarget {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(staging_dir: P, download_dir: Q) -> AppResult<Self> {
        let staging_dir = staging_dir.as_ref().to_path_buf();
        let download_dir = download_dir.as_ref().to_path_buf();
        fs::create_dir_all(&staging_dir)?;
        fs::create_dir_all(&download_dir)?;
        Ok(Self {
            staging_dir,
            download_dir,
            counter: AtomicU64::new(0),
        })
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    fn staged_path(&self, handle: &str) -> AppResult<PathBuf> {
        let valid = !handle.is_empty()
            && handle
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
        if !valid {
            return Err(AppError::Path(format!("invalid staged download handle: {handle}")));
        }
        Ok(self.staging_dir.join(handle))
    }
}

impl DownloadTarget for FsDownloadTarget {
    fn stage(&self, bytes: &[u8], mime_type: &str) -> AppResult<String> {
        let sequence = self.counter.fetch_add(1, Ordering::SeqCst);
        let handle = format!(
            "blob-{}-{}-{sequence}{}",
            std::process::id(),
            Utc::now().timestamp_millis(),
            extension_for(mime_type)
        );
        fs::write(self.staging_dir.join(&handle), bytes)?;
        debug!(target: "download", %handle, bytes = bytes.len(), "staged download");
        Ok(handle)
    }

    fn deliver(&self, handle: &str, file_name: &str) -> AppResult<PathBuf> {
        let source = self.staged_path(handle)?;
        let file_name = Path::new(file_name)
            .file_name()
            .ok_or_else(|| AppError::Path(format!("invalid download file name: {file_name}")))?;
        let destination = self.download_dir.join(file_name);
        fs::copy(&source, &destination)?;
        info!(target: "download", path = %destination.display(), "download delivered");
        Ok(destination)
    }

    fn release(&self, handle: &str) -> AppResult<()> {
        match fs::remove_file(self.staged_path(handle)?) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AppError::Io(err)),
        }
    }
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        CSV_MIME_TYPE => ".csv",
        _ => "",
    }
}
