//! Post-index cleanup queue with bounded concurrency
//!
//! Once an item is indexed its source file is deleted and the transcoded
//! directory is pushed to object storage, then removed locally. Tasks run in
//! the background on at most `workers` concurrent tasks; each step logs its
//! own failure and nothing is rolled back.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore, mpsc};
use tracing::{debug, info, warn};

use super::job::JobController;
use super::object_storage::ObjectStorage;

/// Concurrent cleanup tasks when none is configured
pub const DEFAULT_CLEANUP_WORKERS: usize = 2;

/// Pending tasks accepted before `enqueue` waits
const QUEUE_CAPACITY: usize = 256;

/// One indexed item to retire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupTask {
    /// Original file in the source folder
    pub source: PathBuf,
    /// `<destination>/<id>` produced by the transcoder
    pub output_dir: PathBuf,
    /// Object key prefix, e.g. `movies/42`
    pub remote_prefix: String,
}

/// Queued or running tasks, in total and per output directory
struct Pending {
    count: AtomicUsize,
    dirs: Mutex<HashMap<PathBuf, usize>>,
    changed: Notify,
}

impl Pending {
    fn start(&self, output_dir: &Path) {
        self.count.fetch_add(1, Ordering::SeqCst);
        *self.dirs.lock().entry(output_dir.to_path_buf()).or_insert(0) += 1;
    }

    fn finish(&self, output_dir: &Path) {
        {
            let mut dirs = self.dirs.lock();
            if let Some(count) = dirs.get_mut(output_dir) {
                *count -= 1;
                if *count == 0 {
                    dirs.remove(output_dir);
                }
            }
        }
        self.count.fetch_sub(1, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    fn has_dir(&self, output_dir: &Path) -> bool {
        self.dirs.lock().contains_key(output_dir)
    }
}

/// Bounded background queue of [`CleanupTask`]s
pub struct CleanupQueue {
    sender: mpsc::Sender<CleanupTask>,
    pending: Arc<Pending>,
}

impl CleanupQueue {
    /// Start the dispatcher. Without storage the upload step is skipped and
    /// the local output is kept.
    pub fn new(
        workers: usize,
        storage: Option<Arc<dyn ObjectStorage>>,
        jobs: Arc<JobController>,
    ) -> Self {
        let (sender, mut receiver) = mpsc::channel::<CleanupTask>(QUEUE_CAPACITY);
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let pending = Arc::new(Pending {
            count: AtomicUsize::new(0),
            dirs: Mutex::new(HashMap::new()),
            changed: Notify::new(),
        });

        let dispatcher_pending = pending.clone();
        tokio::spawn(async move {
            info!(workers, "Cleanup queue started");

            while let Some(task) = receiver.recv().await {
                // the next task stays in the channel until a worker is free
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    dispatcher_pending.finish(&task.output_dir);
                    break;
                };
                let storage = storage.clone();
                let jobs = jobs.clone();
                let pending = dispatcher_pending.clone();

                tokio::spawn(async move {
                    run_task(&task, storage.as_deref(), &jobs).await;
                    drop(permit);
                    pending.finish(&task.output_dir);
                });
            }

            info!("Cleanup queue stopped");
        });

        Self { sender, pending }
    }

    /// Queue a task, waiting while the queue is full
    pub async fn enqueue(&self, task: CleanupTask) -> Result<()> {
        let Ok(slot) = self.sender.reserve().await else {
            anyhow::bail!("Cleanup queue is closed");
        };

        self.pending.start(&task.output_dir);
        debug!(source = %task.source.display(), "Cleanup task queued");
        slot.send(task);
        Ok(())
    }

    /// Tasks queued or running
    pub fn pending(&self) -> usize {
        self.pending.count.load(Ordering::SeqCst)
    }

    /// Wait until every queued task has finished
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.pending.changed.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Wait until no queued or running task touches `output_dir`
    pub async fn wait_for(&self, output_dir: &Path) {
        loop {
            let notified = self.pending.changed.notified();
            if !self.pending.has_dir(output_dir) {
                return;
            }
            debug!(output = %output_dir.display(), "Waiting for pending cleanup");
            notified.await;
        }
    }
}

async fn run_task(task: &CleanupTask, storage: Option<&dyn ObjectStorage>, jobs: &JobController) {
    if let Err(e) = tokio::fs::remove_file(&task.source).await {
        warn!(source = %task.source.display(), error = %e, "Failed to delete source file");
        jobs.append(format!("Failed to delete {}: {}", task.source.display(), e));
    }

    let Some(storage) = storage else {
        debug!(output = %task.output_dir.display(), "No object storage configured, keeping local output");
        return;
    };

    match storage.upload_directory(&task.remote_prefix, &task.output_dir).await {
        Ok(()) => {
            info!(prefix = %task.remote_prefix, "Uploaded transcoded output");
            if let Err(e) = tokio::fs::remove_dir_all(&task.output_dir).await {
                warn!(output = %task.output_dir.display(), error = %e, "Failed to delete local output");
                jobs.append(format!("Failed to delete {}: {}", task.output_dir.display(), e));
            }
        }
        Err(e) => {
            warn!(prefix = %task.remote_prefix, error = %e, "Upload failed");
            jobs.append(format!("Failed to upload {}: {:#}", task.remote_prefix, e));
        }
    }
}
