//! Shared mocks and helpers for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use zipline::archiver::{Archiver, ArchiverConfig, TaskInfo, TaskStatus};
use zipline::error::{Result, ZiplineError};
use zipline::fetcher::ObjectFetcher;
use zipline::storage::{ArchiveObject, ArchiveSaver};

/// Fetcher that succeeds for every URL except those containing `"fail"`.
pub struct MockFetcher;

#[async_trait]
impl ObjectFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<ArchiveObject> {
        if url.contains("fail") {
            return Err(ZiplineError::FileNotFound);
        }

        Ok(ArchiveObject {
            name: url.to_string(),
            time: Utc::now(),
            content: b"data".to_vec(),
        })
    }
}

/// Saver that records what it was asked to archive.
#[derive(Default)]
pub struct MockSaver {
    pub delay: Duration,
    pub calls: AtomicUsize,
    pub saved: Mutex<Vec<(String, Vec<ArchiveObject>)>>,
}

impl MockSaver {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ArchiveSaver for MockSaver {
    async fn save(&self, name: &str, objects: Vec<ArchiveObject>) -> Result<String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.calls.fetch_add(1, Ordering::SeqCst);
        self.saved.lock().await.push((name.to_string(), objects));

        Ok(format!("http://test/zips/{name}.zip"))
    }
}

/// Saver that always fails.
pub struct FailingSaver;

#[async_trait]
impl ArchiveSaver for FailingSaver {
    async fn save(&self, _name: &str, _objects: Vec<ArchiveObject>) -> Result<String> {
        Err(ZiplineError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk full",
        )))
    }
}

/// Saver that panics, for worker containment tests.
pub struct PanickingSaver;

#[async_trait]
impl ArchiveSaver for PanickingSaver {
    async fn save(&self, _name: &str, _objects: Vec<ArchiveObject>) -> Result<String> {
        panic!("saver exploded");
    }
}

pub fn new_archiver(max_tasks: u32, max_objects: usize) -> (Arc<Archiver>, Arc<MockSaver>) {
    new_archiver_with_delay(max_tasks, max_objects, Duration::ZERO)
}

pub fn new_archiver_with_delay(
    max_tasks: u32,
    max_objects: usize,
    saver_delay: Duration,
) -> (Arc<Archiver>, Arc<MockSaver>) {
    let saver = Arc::new(MockSaver::with_delay(saver_delay));
    let archiver = Arc::new(Archiver::new(
        ArchiverConfig {
            max_tasks,
            max_objects,
        },
        Arc::new(MockFetcher),
        Arc::clone(&saver) as Arc<dyn ArchiveSaver>,
    ));

    (archiver, saver)
}

/// Polls until the task reaches `want` or the deadline passes.
pub async fn wait_for_status(archiver: &Archiver, id: &str, want: TaskStatus) -> TaskInfo {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);

    loop {
        let info = archiver
            .get_status(id)
            .await
            .expect("task should be queryable while waiting");

        if info.status == want {
            return info;
        }

        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {want:?}, last observed {:?}",
            info.status
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub fn urls(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}
