//! Batch upload orchestration.
//!
//! Files are validated on intake, then uploaded strictly one at a time in
//! submission order. Each task moves `pending -> uploading -> completed | error`;
//! a failed task can be retried up to [`MAX_UPLOAD_RETRIES`] times. State changes are
//! published on a broadcast channel so observers never need to poll.

use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{interval_at, Instant};
use uuid::Uuid;

use snapboard_core::constants::MAX_UPLOAD_RETRIES;
use snapboard_core::models::{
    Asset, FileInfo, UploadProgress, UploadState, UploadStatus, UploadTask,
};
use snapboard_core::{AppError, UploadValidator};

use crate::photos::PhotoService;
use crate::session::SessionStore;

pub const DEFAULT_PROGRESS_TICK: Duration = Duration::from_millis(200);
const PROGRESS_STEP: u8 = 10;
/// Simulated progress never passes this until the store answers.
const PROGRESS_CEILING: u8 = 90;
const EVENT_CAPACITY: usize = 256;

/// A file offered for upload, with its content.
#[derive(Debug, Clone)]
pub struct PendingFile {
    pub name: String,
    pub content_type: String,
    pub data: Bytes,
    pub preview: Option<String>,
}

impl PendingFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            data,
            preview: None,
        }
    }

    pub fn with_preview(mut self, preview: impl Into<String>) -> Self {
        self.preview = Some(preview.into());
        self
    }

    pub fn info(&self) -> FileInfo {
        FileInfo {
            name: self.name.clone(),
            size: self.data.len() as u64,
            content_type: self.content_type.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedFile {
    pub name: String,
    /// Starts with the file name.
    pub reason: String,
}

/// Outcome of [`UploadOrchestrator::add_files`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntakeReport {
    pub accepted: Vec<Uuid>,
    pub rejected: Vec<RejectedFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("Upload task {0} not found")]
    TaskNotFound(Uuid),

    #[error("Upload task {id} is {status}; only failed uploads can be retried")]
    NotRetryable { id: Uuid, status: UploadStatus },

    #[error("Upload task {id} has already been retried {max} times")]
    MaxRetriesExceeded { id: Uuid, max: u32 },

    #[error("Upload task {0} is uploading and cannot be removed")]
    TaskInProgress(Uuid),

    #[error("An upload run is already in progress")]
    AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    TaskUpdated(UploadTask),
    /// A run (full batch or single retry) has settled.
    BatchCompleted(UploadProgress),
}

/// Where uploads land and which session remembers them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub owner_id: String,
    pub collection_id: u32,
    pub session_id: String,
}

#[derive(Default)]
struct OrchestratorState {
    tasks: Vec<UploadTask>,
    files: HashMap<Uuid, PendingFile>,
    uploaded: Vec<Asset>,
    is_uploading: bool,
    /// Tasks counted by `overall_progress`: those pending when the current run
    /// started plus any retried since.
    run: HashSet<Uuid>,
}

impl OrchestratorState {
    fn task(&self, id: Uuid) -> Option<&UploadTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    fn task_mut(&mut self, id: Uuid) -> Option<&mut UploadTask> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    fn count(&self, status: UploadStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    fn progress(&self) -> UploadProgress {
        let run_completed = self
            .tasks
            .iter()
            .filter(|t| t.status == UploadStatus::Completed && self.run.contains(&t.id))
            .count();
        let overall_progress = if self.run.is_empty() {
            0.0
        } else {
            run_completed as f64 / self.run.len() as f64 * 100.0
        };
        UploadProgress {
            total: self.tasks.len(),
            completed: self.count(UploadStatus::Completed),
            in_progress: self.count(UploadStatus::Uploading),
            failed: self.count(UploadStatus::Error),
            overall_progress,
        }
    }

    fn begin_run(&mut self, tasks: &[Uuid]) {
        self.is_uploading = true;
        self.run = tasks.iter().copied().collect();
    }
}

/// Drives a batch of uploads for one owner's game.
pub struct UploadOrchestrator {
    photos: Arc<PhotoService>,
    sessions: Arc<dyn SessionStore>,
    validator: UploadValidator,
    target: UploadTarget,
    progress_tick: Duration,
    state: Mutex<OrchestratorState>,
    events: broadcast::Sender<UploadEvent>,
}

impl UploadOrchestrator {
    pub fn new(
        photos: Arc<PhotoService>,
        sessions: Arc<dyn SessionStore>,
        validator: UploadValidator,
        target: UploadTarget,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            photos,
            sessions,
            validator,
            target,
            progress_tick: DEFAULT_PROGRESS_TICK,
            state: Mutex::new(OrchestratorState::default()),
            events,
        }
    }

    pub fn with_progress_tick(mut self, tick: Duration) -> Self {
        self.progress_tick = tick.max(Duration::from_millis(1));
        self
    }

    pub fn target(&self) -> &UploadTarget {
        &self.target
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: UploadEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    /// Validate and enqueue files. Rejected files never become tasks.
    pub async fn add_files(&self, files: Vec<PendingFile>) -> IntakeReport {
        let mut report = IntakeReport::default();
        let mut state = self.state.lock().await;

        for file in files {
            let info = file.info();
            if let Err(e) = self.validator.validate(&info) {
                tracing::warn!(file = %info.name, reason = %e, "Rejected file at intake");
                report.rejected.push(RejectedFile {
                    name: info.name,
                    reason: e.to_string(),
                });
                continue;
            }

            let task = UploadTask::new(info, file.preview.clone());
            report.accepted.push(task.id);
            state.files.insert(task.id, file);
            self.publish(UploadEvent::TaskUpdated(task.clone()));
            state.tasks.push(task);
        }

        tracing::debug!(
            accepted = report.accepted.len(),
            rejected = report.rejected.len(),
            "Files added"
        );
        report
    }

    /// Upload every pending task in submission order. Failures do not stop the run.
    #[tracing::instrument(skip(self), fields(owner_id = %self.target.owner_id, collection_id = self.target.collection_id))]
    pub async fn start_upload(&self) -> Result<UploadProgress, UploadError> {
        let pending: Vec<Uuid> = {
            let mut state = self.state.lock().await;
            if state.is_uploading {
                return Err(UploadError::AlreadyRunning);
            }
            let pending: Vec<Uuid> = state
                .tasks
                .iter()
                .filter(|t| t.status == UploadStatus::Pending)
                .map(|t| t.id)
                .collect();
            state.begin_run(&pending);
            pending
        };

        tracing::info!(tasks = pending.len(), "Starting upload run");
        for id in pending {
            self.run_task(id).await;
        }

        Ok(self.end_run().await)
    }

    /// Re-run a failed upload.
    ///
    /// The task joins the current run's progress instead of starting a new run.
    #[tracing::instrument(skip(self))]
    pub async fn retry(&self, id: Uuid) -> Result<UploadTask, UploadError> {
        {
            let mut state = self.state.lock().await;
            if state.is_uploading {
                return Err(UploadError::AlreadyRunning);
            }
            let task = state.task_mut(id).ok_or(UploadError::TaskNotFound(id))?;
            if task.status != UploadStatus::Error {
                return Err(UploadError::NotRetryable {
                    id,
                    status: task.status,
                });
            }
            if task.retry_count >= MAX_UPLOAD_RETRIES {
                return Err(UploadError::MaxRetriesExceeded {
                    id,
                    max: MAX_UPLOAD_RETRIES,
                });
            }
            task.retry_count += 1;
            task.status = UploadStatus::Pending;
            tracing::info!(task_id = %id, retry = task.retry_count, "Retrying upload");
            state.is_uploading = true;
            state.run.insert(id);
        }

        self.run_task(id).await;
        self.end_run().await;

        let state = self.state.lock().await;
        state.task(id).cloned().ok_or(UploadError::TaskNotFound(id))
    }

    async fn end_run(&self) -> UploadProgress {
        let progress = {
            let mut state = self.state.lock().await;
            state.is_uploading = false;
            state.progress()
        };
        tracing::info!(
            completed = progress.completed,
            failed = progress.failed,
            overall_progress = progress.overall_progress,
            "Upload run finished"
        );
        self.publish(UploadEvent::BatchCompleted(progress.clone()));
        progress
    }

    async fn run_task(&self, id: Uuid) {
        let (file, data) = {
            let mut state = self.state.lock().await;
            let Some(data) = state.files.get(&id).map(|f| f.data.clone()) else {
                return;
            };
            let Some(task) = state.task_mut(id) else {
                return;
            };
            task.status = UploadStatus::Uploading;
            task.progress = 0;
            task.error = None;
            let snapshot = task.clone();
            self.publish(UploadEvent::TaskUpdated(snapshot.clone()));
            (snapshot.file, data)
        };

        let upload = self.photos.upload_photo(
            &self.target.owner_id,
            self.target.collection_id,
            &file,
            data,
        );
        tokio::pin!(upload);
        let mut ticker = interval_at(Instant::now() + self.progress_tick, self.progress_tick);

        let result = loop {
            tokio::select! {
                result = &mut upload => break result,
                _ = ticker.tick() => self.advance_progress(id).await,
            }
        };

        match result {
            Ok(asset) => {
                {
                    let mut state = self.state.lock().await;
                    if let Some(task) = state.task_mut(id) {
                        task.status = UploadStatus::Completed;
                        task.progress = 100;
                        task.asset = Some(asset.clone());
                        self.publish(UploadEvent::TaskUpdated(task.clone()));
                    }
                    state.files.remove(&id);
                    state.uploaded.push(asset.clone());
                }
                tracing::info!(file = %file.name, public_id = %asset.public_id, "Upload completed");
                self.sessions
                    .append(&self.target.session_id, std::slice::from_ref(&asset))
                    .await;
            }
            Err(e) => {
                tracing::warn!(file = %file.name, error = %e, "Upload failed");
                let mut state = self.state.lock().await;
                if let Some(task) = state.task_mut(id) {
                    task.status = UploadStatus::Error;
                    task.error = Some(e.to_string());
                    self.publish(UploadEvent::TaskUpdated(task.clone()));
                }
            }
        }
    }

    async fn advance_progress(&self, id: Uuid) {
        let mut state = self.state.lock().await;
        if let Some(task) = state.task_mut(id) {
            if task.status == UploadStatus::Uploading && task.progress < PROGRESS_CEILING {
                task.progress = (task.progress + PROGRESS_STEP).min(PROGRESS_CEILING);
                self.publish(UploadEvent::TaskUpdated(task.clone()));
            }
        }
    }

    pub async fn get_state(&self) -> UploadState {
        let state = self.state.lock().await;
        UploadState {
            tasks: state.tasks.clone(),
            progress: state.progress(),
            is_uploading: state.is_uploading,
        }
    }

    /// Hand off every uploaded asset and drop the completed tasks.
    pub async fn finish(&self) -> Vec<Asset> {
        let mut state = self.state.lock().await;
        state.tasks.retain(|t| t.status != UploadStatus::Completed);
        let OrchestratorState { tasks, run, .. } = &mut *state;
        run.retain(|id| tasks.iter().any(|t| t.id == *id));
        std::mem::take(&mut state.uploaded)
    }

    /// Drop a task that is not uploading. It no longer counts toward the run.
    pub async fn remove(&self, id: Uuid) -> Result<(), UploadError> {
        let mut state = self.state.lock().await;
        let index = state
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or(UploadError::TaskNotFound(id))?;
        if state.tasks[index].status == UploadStatus::Uploading {
            return Err(UploadError::TaskInProgress(id));
        }
        state.tasks.remove(index);
        state.files.remove(&id);
        state.run.remove(&id);
        Ok(())
    }

    /// Delete an uploaded photo from the store and forget it in this session.
    #[tracing::instrument(skip(self), fields(session_id = %self.target.session_id))]
    pub async fn delete_uploaded(&self, public_id: &str) -> Result<(), AppError> {
        self.photos.delete(public_id).await?;

        {
            let mut state = self.state.lock().await;
            state.uploaded.retain(|a| a.public_id != public_id);
            let removed: Vec<Uuid> = state
                .tasks
                .iter()
                .filter(|t| t.asset.as_ref().is_some_and(|a| a.public_id == public_id))
                .map(|t| t.id)
                .collect();
            state.tasks.retain(|t| !removed.contains(&t.id));
            for id in &removed {
                state.run.remove(id);
            }
        }

        if !self
            .sessions
            .remove_asset(&self.target.session_id, public_id)
            .await
        {
            tracing::debug!(public_id = %public_id, "Deleted photo was not recorded in the session");
        }
        Ok(())
    }

    /// Drop every task. Refused while a run is in progress.
    pub async fn clear(&self) -> Result<(), UploadError> {
        let mut state = self.state.lock().await;
        if state.is_uploading {
            return Err(UploadError::AlreadyRunning);
        }
        state.tasks.clear();
        state.files.clear();
        state.run.clear();
        Ok(())
    }
}
