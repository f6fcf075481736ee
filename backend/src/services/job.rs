//! Process-wide job slot
//!
//! At most one long-running operation (a scan or an upload) holds the slot
//! at a time. The holder streams human-readable progress into a log buffer
//! that callers poll with [`JobController::snapshot`] or consume with
//! [`JobController::drain`].

use std::sync::Arc;

use chrono::Local;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

/// Date format of [`JobLog::date`]
pub const JOB_LOG_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors returned when starting a job
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum JobError {
    #[error("a job is already running: {0}")]
    AlreadyRunning(String),
}

/// One progress line of the current job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobLog {
    pub job_name: String,
    pub date: String,
    pub message: String,
}

#[derive(Debug, Default)]
struct JobState {
    name: String,
    logs: Vec<JobLog>,
}

/// Proof of holding the job slot. Dropping it releases the slot.
#[derive(Debug)]
pub struct JobGuard {
    _permit: OwnedMutexGuard<()>,
    name: String,
}

impl JobGuard {
    /// Name the slot was acquired with
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release the slot explicitly
    pub fn release(self) {
        debug!(job = %self.name, "Releasing job slot");
    }
}

/// Shared job slot plus its log buffer
#[derive(Debug, Default)]
pub struct JobController {
    slot: Arc<tokio::sync::Mutex<()>>,
    state: Mutex<JobState>,
}

impl JobController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the slot without waiting. `None` when another job holds it.
    pub fn try_acquire(&self, name: &str) -> Option<JobGuard> {
        let permit = self.slot.clone().try_lock_owned().ok()?;
        Some(JobGuard {
            _permit: permit,
            name: name.to_string(),
        })
    }

    /// Take the slot and start a fresh log under `name`
    pub fn try_start(&self, name: &str) -> Result<JobGuard, JobError> {
        let guard = self
            .try_acquire(name)
            .ok_or_else(|| JobError::AlreadyRunning(self.job_name()))?;
        self.reset(name);
        info!(job = name, "Job started");
        Ok(guard)
    }

    /// Set the current name and clear the log
    pub fn reset(&self, name: &str) {
        let mut state = self.state.lock();
        state.name = name.to_string();
        state.logs.clear();
    }

    /// Append a progress line under the current job name
    pub fn append(&self, message: impl Into<String>) {
        let message = message.into();
        let job_name = {
            let mut state = self.state.lock();
            let job_name = state.name.clone();
            state.logs.push(JobLog {
                job_name: job_name.clone(),
                date: Local::now().format(JOB_LOG_DATE_FORMAT).to_string(),
                message: message.clone(),
            });
            job_name
        };
        // emitted after the state lock is released
        info!(job = %job_name, "{}", message);
    }

    /// Copy of the log, oldest first
    pub fn snapshot(&self) -> Vec<JobLog> {
        self.state.lock().logs.clone()
    }

    /// Take the log, leaving it empty
    pub fn drain(&self) -> Vec<JobLog> {
        std::mem::take(&mut self.state.lock().logs)
    }

    /// Name of the current (or last) job
    pub fn job_name(&self) -> String {
        self.state.lock().name.clone()
    }

    /// Whether a job holds the slot right now
    pub fn is_running(&self) -> bool {
        self.slot.try_lock().is_err()
    }
}
