//! Task-lifecycle scheduler.
//!
//! The [`Archiver`] owns the task map and drives every task through
//! `WaitingForObjects -> Archiving -> Done | Error`:
//!
//! 1. `new_task` admits a task against the global ceiling and registers it
//! 2. `add_objects` appends URLs; the call that fills the last slot
//!    dispatches a background worker
//! 3. the worker fetches every object, bundles the survivors into a ZIP
//!    and settles the task
//! 4. `stop` latches the stop signal and joins outstanding workers
//!
//! Lock order: the task map lock is always released before the per-task
//! lock is taken.

pub mod admission;
pub mod short_id;
pub mod task;

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::{Result, ZiplineError};
use crate::fetcher::ObjectFetcher;
use crate::storage::ArchiveSaver;

use admission::AdmissionCounter;
use task::Task;

pub use task::{ObjectInfo, TaskInfo, TaskStatus};

const DEFAULT_MAX_TASKS: u32 = 3;
const DEFAULT_MAX_OBJECTS: usize = 3;

#[derive(Debug, Clone)]
pub struct ArchiverConfig {
    /// Admission ceiling on concurrently live tasks.
    pub max_tasks: u32,
    /// Object slots per task.
    pub max_objects: usize,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            max_tasks: DEFAULT_MAX_TASKS,
            max_objects: DEFAULT_MAX_OBJECTS,
        }
    }
}

impl ArchiverConfig {
    fn normalized(mut self) -> Self {
        if self.max_tasks == 0 {
            self.max_tasks = DEFAULT_MAX_TASKS;
        }
        if self.max_objects == 0 {
            self.max_objects = DEFAULT_MAX_OBJECTS;
        }
        self
    }
}

pub struct Archiver {
    cfg: ArchiverConfig,
    fetcher: Arc<dyn ObjectFetcher>,
    saver: Arc<dyn ArchiveSaver>,

    tasks: RwLock<HashMap<String, Arc<Task>>>,
    active: Arc<AdmissionCounter>,

    stop: CancellationToken,
    workers: TaskTracker,
}

impl Archiver {
    pub fn new(
        cfg: ArchiverConfig,
        fetcher: Arc<dyn ObjectFetcher>,
        saver: Arc<dyn ArchiveSaver>,
    ) -> Self {
        Self {
            cfg: cfg.normalized(),
            fetcher,
            saver,
            tasks: RwLock::new(HashMap::new()),
            active: Arc::new(AdmissionCounter::new()),
            stop: CancellationToken::new(),
            workers: TaskTracker::new(),
        }
    }

    /// Admits and registers a fresh task.
    ///
    /// Errors: [`ZiplineError::ServiceStopped`], [`ZiplineError::MaxTasksExceeded`].
    pub async fn new_task(&self) -> Result<String> {
        if self.is_stopped() {
            return Err(ZiplineError::ServiceStopped);
        }

        // Admission before insert: a refused task must not leak a map entry.
        if !self.active.try_acquire(self.cfg.max_tasks) {
            return Err(ZiplineError::MaxTasksExceeded);
        }

        let id = new_id();
        let task = Arc::new(Task::new(id.clone(), self.cfg.max_objects));

        self.tasks.write().await.insert(id.clone(), task);

        tracing::debug!(task_id = %id, "task created");

        Ok(id)
    }

    /// Appends URLs to a task; dispatches the bundling worker when the call
    /// fills the task's last slot. Returns how many URLs were accepted.
    ///
    /// Errors: [`ZiplineError::ServiceStopped`], [`ZiplineError::TaskNotFound`],
    /// [`ZiplineError::TaskInProgress`], [`ZiplineError::TaskCompleted`].
    pub async fn add_objects(&self, id: &str, urls: &[String]) -> Result<usize> {
        if self.is_stopped() {
            return Err(ZiplineError::ServiceStopped);
        }

        let task = self
            .tasks
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(ZiplineError::TaskNotFound)?;

        let (accepted, ready) = task.add_objects(urls, self.cfg.max_objects).await?;

        if ready {
            self.dispatch(task);
        }

        Ok(accepted)
    }

    /// Snapshot of a task's current state.
    ///
    /// Errors: [`ZiplineError::ServiceStopped`], [`ZiplineError::TaskNotFound`].
    pub async fn get_status(&self, id: &str) -> Result<TaskInfo> {
        if self.is_stopped() {
            return Err(ZiplineError::ServiceStopped);
        }

        let task = self
            .tasks
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(ZiplineError::TaskNotFound)?;

        Ok(task.snapshot().await)
    }

    /// Latches the stop signal and waits for outstanding workers.
    ///
    /// Workers are not cancelled; the timeout only caps how long the caller
    /// waits. On expiry returns [`ZiplineError::ShutdownTimeout`] while the
    /// remaining workers drain in the background.
    pub async fn stop(&self, timeout: Duration) -> Result<()> {
        if self.is_stopped() {
            return Err(ZiplineError::ServiceStopped);
        }

        self.stop.cancel();
        self.workers.close();

        tokio::time::timeout(timeout, self.workers.wait())
            .await
            .map_err(|_| ZiplineError::ShutdownTimeout)
    }

    /// Number of currently admitted tasks.
    pub fn active_tasks(&self) -> u32 {
        self.active.active()
    }

    fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Spawns the bundling worker for a task whose slots just filled.
    ///
    /// The worker gets only the task and its collaborators, never the
    /// scheduler itself; the admission unit is returned through a drop
    /// guard so every exit path, panics included, releases it.
    fn dispatch(&self, task: Arc<Task>) {
        let fetcher = Arc::clone(&self.fetcher);
        let saver = Arc::clone(&self.saver);
        let admission = ReleaseOnDrop(Arc::clone(&self.active));

        self.workers.spawn(async move {
            let _admission = admission;

            let work = process_task(Arc::clone(&task), fetcher, saver);
            if let Err(panic) = AssertUnwindSafe(work).catch_unwind().await {
                let msg = panic_message(panic);
                tracing::error!(task_id = %task.id(), panic = %msg, "worker panicked");
                task.fail(ZiplineError::WorkerPanic(msg)).await;
            }
        });
    }
}

/// Fetches every object of one task sequentially, then bundles the
/// survivors into an archive and settles the task.
async fn process_task(task: Arc<Task>, fetcher: Arc<dyn ObjectFetcher>, saver: Arc<dyn ArchiveSaver>) {
    let sources = task.sources().await;
    let mut to_save = Vec::with_capacity(sources.len());

    for (index, src) in sources.iter().enumerate() {
        match fetcher.fetch(src).await {
            Ok(object) => to_save.push(object),
            Err(err) => {
                tracing::warn!(task_id = %task.id(), url = %src, error = %err, "object fetch failed");
                task.set_object_error(index, err).await;
            }
        }
    }

    if to_save.is_empty() {
        task.fail(ZiplineError::NoObjectsToArchive).await;
        return;
    }

    match saver.save(task.id(), to_save).await {
        Ok(zip_url) => {
            tracing::info!(task_id = %task.id(), zip = %zip_url, "archive saved");
            task.complete(zip_url).await;
        }
        Err(err) => {
            tracing::error!(task_id = %task.id(), error = %err, "archive save failed");
            task.fail(err).await;
        }
    }
}

struct ReleaseOnDrop(Arc<AdmissionCounter>);

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        self.0.release();
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// UUIDv4 when the OS random source cooperates, monotonic short ID when it
/// does not.
fn new_id() -> String {
    let mut bytes = [0u8; 16];
    match getrandom::getrandom(&mut bytes) {
        Ok(()) => uuid::Builder::from_random_bytes(bytes)
            .into_uuid()
            .to_string(),
        Err(_) => short_id::next(),
    }
}
