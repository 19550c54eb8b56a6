//! Archive object model and storage abstraction.

pub mod local_zip;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

pub use local_zip::LocalZipStorage;

/// One fetched file, ready to be placed into an archive.
#[derive(Debug, Clone)]
pub struct ArchiveObject {
    pub name: String,
    pub time: DateTime<Utc>,
    pub content: Vec<u8>,
}

/// Writes a named archive from a list of objects and returns the public URL
/// at which the archive is downloadable.
#[async_trait]
pub trait ArchiveSaver: Send + Sync {
    async fn save(&self, name: &str, objects: Vec<ArchiveObject>) -> Result<String>;
}
