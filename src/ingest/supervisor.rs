use super::worker::{pause, CameraWorker};
use super::IngestContext;
use crate::db::models::CameraStatus;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A live worker as reported to API clients
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub camera_id: i64,
    pub started_at: DateTime<Utc>,
}

struct WorkerHandle {
    cancel: CancellationToken,
    monitor: JoinHandle<()>,
    started_at: DateTime<Utc>,
}

impl WorkerHandle {
    fn is_live(&self) -> bool {
        !self.monitor.is_finished()
    }
}

/// Owns one ingestion task per camera id
pub struct WorkerSupervisor {
    ctx: Arc<IngestContext>,
    workers: Mutex<HashMap<i64, WorkerHandle>>,
    shutdown: CancellationToken,
}

impl WorkerSupervisor {
    pub fn new(ctx: Arc<IngestContext>) -> Self {
        Self {
            ctx,
            workers: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Start a worker for the camera. Returns `false` if one is already live.
    pub async fn spawn(&self, camera_id: i64) -> bool {
        if self.shutdown.is_cancelled() {
            warn!(
                "Supervisor is shutting down, not starting camera {}",
                camera_id
            );
            return false;
        }

        let mut workers = self.workers.lock().await;
        prune_finished(&mut workers);
        if workers.contains_key(&camera_id) {
            return false;
        }

        let cancel = self.shutdown.child_token();
        let monitor = tokio::spawn(supervise(camera_id, self.ctx.clone(), cancel.clone()));

        workers.insert(
            camera_id,
            WorkerHandle {
                cancel,
                monitor,
                started_at: Utc::now(),
            },
        );
        info!("Spawned ingestion worker for camera {}", camera_id);
        true
    }

    /// Stop the camera's worker and wait for it to exit.
    /// Returns `false` if no worker was registered for the camera.
    pub async fn stop(&self, camera_id: i64) -> bool {
        let handle = {
            let mut workers = self.workers.lock().await;
            workers.remove(&camera_id)
        };

        match handle {
            Some(handle) => {
                handle.cancel.cancel();
                if let Err(e) = handle.monitor.await {
                    error!("Worker monitor for camera {} failed: {}", camera_id, e);
                }
                info!("Stopped ingestion worker for camera {}", camera_id);
                true
            }
            None => false,
        }
    }

    pub async fn is_running(&self, camera_id: i64) -> bool {
        let mut workers = self.workers.lock().await;
        prune_finished(&mut workers);
        workers.contains_key(&camera_id)
    }

    /// Live workers ordered by camera id
    pub async fn running(&self) -> Vec<WorkerStatus> {
        let mut workers = self.workers.lock().await;
        prune_finished(&mut workers);
        let mut running: Vec<WorkerStatus> = workers
            .iter()
            .map(|(camera_id, handle)| WorkerStatus {
                camera_id: *camera_id,
                started_at: handle.started_at,
            })
            .collect();
        running.sort_by_key(|status| status.camera_id);
        running
    }

    /// Stop every worker and wait for all of them
    pub async fn shutdown(&self) {
        info!("Shutting down ingestion workers");
        self.shutdown.cancel();

        let handles: Vec<(i64, WorkerHandle)> = {
            let mut workers = self.workers.lock().await;
            workers.drain().collect()
        };

        let results = join_all(handles.into_iter().map(|(camera_id, handle)| async move {
            (camera_id, handle.monitor.await)
        }))
        .await;

        for (camera_id, result) in results {
            if let Err(e) = result {
                error!("Worker monitor for camera {} failed: {}", camera_id, e);
            }
        }
    }
}

/// Drop handles of workers that exited on their own
fn prune_finished(workers: &mut HashMap<i64, WorkerHandle>) {
    workers.retain(|camera_id, handle| {
        let live = handle.is_live();
        if !live {
            debug!("Forgetting finished worker for camera {}", camera_id);
        }
        live
    });
}

/// Runs a worker to completion, restarting it after a panic when configured
async fn supervise(camera_id: i64, ctx: Arc<IngestContext>, cancel: CancellationToken) {
    loop {
        let worker = CameraWorker::new(camera_id, ctx.clone());
        let task = tokio::spawn(worker.run(cancel.clone()));

        match task.await {
            Ok(()) => break,
            Err(e) if e.is_panic() => {
                error!("Ingestion worker for camera {} panicked: {}", camera_id, e);
                ctx.frames.remove(camera_id);
                if let Err(e) = ctx
                    .registry
                    .set_status(camera_id, CameraStatus::Offline)
                    .await
                {
                    warn!("Failed to mark camera {} offline: {}", camera_id, e);
                }

                if !ctx.settings.restart_on_panic || cancel.is_cancelled() {
                    break;
                }
                if !pause(ctx.settings.offline_backoff, &cancel).await {
                    break;
                }
                info!("Restarting ingestion worker for camera {}", camera_id);
            }
            Err(e) => {
                warn!("Ingestion worker for camera {} aborted: {}", camera_id, e);
                break;
            }
        }
    }
}
