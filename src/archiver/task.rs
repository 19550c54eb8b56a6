use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{Result, ZiplineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    WaitingForObjects,
    Archiving,
    Done,
    Error,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::WaitingForObjects => write!(f, "Waiting for objects"),
            TaskStatus::Archiving => write!(f, "Archiving"),
            TaskStatus::Done => write!(f, "Done"),
            TaskStatus::Error => write!(f, "Error"),
        }
    }
}

/// One archiving job. All mutable state sits behind a single lock; the
/// status only ever moves `WaitingForObjects -> Archiving -> Done | Error`.
#[derive(Debug)]
pub(crate) struct Task {
    id: String,
    state: RwLock<TaskState>,
}

#[derive(Debug)]
struct TaskState {
    status: TaskStatus,
    objects: Vec<ObjectSlot>,
    zip: Option<String>,
    err: Option<Arc<ZiplineError>>,
}

#[derive(Debug)]
struct ObjectSlot {
    src: String,
    err: Option<Arc<ZiplineError>>,
}

impl Task {
    pub(crate) fn new(id: String, max_objects: usize) -> Self {
        Self {
            id,
            state: RwLock::new(TaskState {
                status: TaskStatus::WaitingForObjects,
                objects: Vec::with_capacity(max_objects),
                zip: None,
                err: None,
            }),
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    /// Appends up to `max_objects - len` URLs as fresh slots.
    ///
    /// Returns `(accepted, ready)`; `ready` is true for exactly the call
    /// that fills the last slot, which also flips the task to `Archiving`.
    pub(crate) async fn add_objects(
        &self,
        urls: &[String],
        max_objects: usize,
    ) -> Result<(usize, bool)> {
        let mut state = self.state.write().await;

        match state.status {
            TaskStatus::WaitingForObjects => {
                let free = max_objects - state.objects.len();
                let accepted = free.min(urls.len());

                for url in &urls[..accepted] {
                    state.objects.push(ObjectSlot {
                        src: url.clone(),
                        err: None,
                    });
                }

                let ready = state.objects.len() == max_objects;
                if ready {
                    state.status = TaskStatus::Archiving;
                }

                Ok((accepted, ready))
            }
            TaskStatus::Archiving => Err(ZiplineError::TaskInProgress),
            TaskStatus::Done | TaskStatus::Error => Err(ZiplineError::TaskCompleted),
        }
    }

    /// Source URLs in slot order. Once the task leaves `WaitingForObjects`
    /// the list is append-frozen, so the worker can iterate this copy and
    /// address slots by index.
    pub(crate) async fn sources(&self) -> Vec<String> {
        let state = self.state.read().await;
        state.objects.iter().map(|o| o.src.clone()).collect()
    }

    pub(crate) async fn set_object_error(&self, index: usize, err: ZiplineError) {
        let mut state = self.state.write().await;
        if let Some(slot) = state.objects.get_mut(index) {
            slot.err = Some(Arc::new(err));
        }
    }

    pub(crate) async fn fail(&self, err: ZiplineError) {
        let mut state = self.state.write().await;
        state.err = Some(Arc::new(err));
        state.status = TaskStatus::Error;
    }

    pub(crate) async fn complete(&self, zip: String) {
        let mut state = self.state.write().await;
        state.zip = Some(zip);
        state.status = TaskStatus::Done;
    }

    /// Deep-copied, internally consistent view of the task.
    pub(crate) async fn snapshot(&self) -> TaskInfo {
        let state = self.state.read().await;

        TaskInfo {
            status: state.status,
            objects: state
                .objects
                .iter()
                .map(|o| ObjectInfo {
                    src: o.src.clone(),
                    err: o.err.clone(),
                })
                .collect(),
            zip: state.zip.clone(),
            err: state.err.clone(),
        }
    }
}

/// Point-in-time view of a task, safe to hand to callers.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub status: TaskStatus,
    pub objects: Vec<ObjectInfo>,
    pub zip: Option<String>,
    pub err: Option<Arc<ZiplineError>>,
}

#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub src: String,
    pub err: Option<Arc<ZiplineError>>,
}
