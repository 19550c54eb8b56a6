//! Local-disk ZIP storage.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Timelike, Utc};
use zip::write::FileOptions;
use zip::CompressionMethod;

use crate::error::{Result, ZiplineError};
use crate::storage::{ArchiveObject, ArchiveSaver};

/// Writes archives to a local directory and hands out URLs under a public
/// base such as `http://host:port/zips`.
#[derive(Debug)]
pub struct LocalZipStorage {
    base_url: String,
    dir: PathBuf,
}

impl LocalZipStorage {
    /// Creates the storage directory if it does not exist yet.
    pub fn new(base_url: &str, dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();

        if !dir.exists() {
            create_storage_dir(&dir)?;
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            dir,
        })
    }
}

#[async_trait]
impl ArchiveSaver for LocalZipStorage {
    async fn save(&self, name: &str, objects: Vec<ArchiveObject>) -> Result<String> {
        let path = self.dir.join(format!("{name}.zip"));

        // Zip encoding is CPU + disk bound, keep it off the async runtime.
        tokio::task::spawn_blocking(move || write_zip(&path, &objects))
            .await
            .map_err(|e| ZiplineError::WorkerPanic(e.to_string()))??;

        Ok(format!("{}/{}.zip", self.base_url, name))
    }
}

#[cfg(unix)]
fn create_storage_dir(dir: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new().mode(0o774).create(dir)?;
    Ok(())
}

#[cfg(not(unix))]
fn create_storage_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir(dir)?;
    Ok(())
}

fn write_zip(path: &Path, objects: &[ArchiveObject]) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let mut writer = zip::ZipWriter::new(file);

    for object in objects {
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip_timestamp(object.time));

        writer.start_file(object.name.as_str(), options)?;
        writer.write_all(&object.content)?;
    }

    writer.finish()?;
    Ok(())
}

/// ZIP timestamps only cover 1980..=2107; anything outside falls back to the
/// format's epoch.
fn zip_timestamp(time: DateTime<Utc>) -> zip::DateTime {
    zip::DateTime::from_date_and_time(
        time.year() as u16,
        time.month() as u8,
        time.day() as u8,
        time.hour() as u8,
        time.minute() as u8,
        time.second() as u8,
    )
    .unwrap_or_default()
}
