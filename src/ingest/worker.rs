use super::debounce::{IntrusionDebouncer, ZoneHit};
use super::IngestContext;
use crate::capture::{CaptureSession, Frame};
use crate::db::models::{Camera, CameraStatus, NewEvent, ZoneSet, INTRUSION_RULE};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

/// Why a capture session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Cancelled,
    StreamLost,
}

/// Runs the capture and analysis loop for one camera.
///
/// The worker reloads the camera record on every (re)connect attempt and
/// exits when the record is gone or the stop token fires.
pub struct CameraWorker {
    camera_id: i64,
    ctx: Arc<IngestContext>,
}

impl CameraWorker {
    pub fn new(camera_id: i64, ctx: Arc<IngestContext>) -> Self {
        Self { camera_id, ctx }
    }

    /// Reconnect loop. Open failures and dropped streams are retried forever.
    pub async fn run(self, cancel: CancellationToken) {
        info!("Starting ingestion worker for camera {}", self.camera_id);

        while !cancel.is_cancelled() {
            let camera = match self.ctx.registry.camera(self.camera_id).await {
                Ok(Some(camera)) => camera,
                Ok(None) => {
                    info!(
                        "Camera {} is no longer registered, stopping worker",
                        self.camera_id
                    );
                    break;
                }
                Err(e) => {
                    warn!("Failed to load camera {}: {}", self.camera_id, e);
                    self.set_status(CameraStatus::Offline).await;
                    if !pause(self.ctx.settings.offline_backoff, &cancel).await {
                        break;
                    }
                    continue;
                }
            };

            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                opened = self.ctx.capture.open(&camera.source_url) => opened,
            };

            let mut session = match opened {
                Ok(session) => session,
                Err(e) => {
                    warn!(
                        "Failed to open stream for camera {} ({}): {}",
                        self.camera_id, camera.source_url, e
                    );
                    self.set_status(CameraStatus::Offline).await;
                    if !pause(self.ctx.settings.offline_backoff, &cancel).await {
                        break;
                    }
                    continue;
                }
            };

            info!("Camera {} is online", self.camera_id);
            self.set_status(CameraStatus::Online).await;

            let end = self.run_session(&camera, session.as_mut(), &cancel).await;
            session.release();

            if end == SessionEnd::Cancelled {
                break;
            }

            self.set_status(CameraStatus::Offline).await;
            if !pause(self.ctx.settings.reconnect_cooldown, &cancel).await {
                break;
            }
        }

        self.set_status(CameraStatus::Offline).await;
        self.ctx.frames.remove(self.camera_id);
        info!("Ingestion worker for camera {} stopped", self.camera_id);
    }

    /// Frame loop for one open session
    async fn run_session(
        &self,
        camera: &Camera,
        session: &mut dyn CaptureSession,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        let settings = &self.ctx.settings;
        // Zone edits take effect on the next session
        let zones = camera.zone_set();
        let mut debouncer =
            IntrusionDebouncer::new(settings.intrusion_policy, settings.realert_after);
        let mut fps = FpsMeter::new(Instant::now());
        let mut frame_count: u64 = 0;

        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                read = session.read() => read,
            };

            let frame = match read {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Lost stream for camera {}: {}", self.camera_id, e);
                    return SessionEnd::StreamLost;
                }
            };

            frame_count += 1;
            self.ctx.frames.publish(self.camera_id, frame.clone());

            let rate = fps.tick(Instant::now());
            if let Err(e) = self
                .ctx
                .registry
                .heartbeat(self.camera_id, frame.captured_at, rate)
                .await
            {
                warn!(
                    "Failed to record heartbeat for camera {}: {}",
                    self.camera_id, e
                );
            }

            if frame_count % settings.frame_skip == 0 {
                self.process_frame(&frame, &zones, &mut debouncer).await;
            }

            if !pause(settings.frame_interval, cancel).await {
                return SessionEnd::Cancelled;
            }
        }
    }

    async fn process_frame(
        &self,
        frame: &Frame,
        zones: &ZoneSet,
        debouncer: &mut IntrusionDebouncer,
    ) {
        let detections = match self.ctx.detector.detect(frame).await {
            Ok(detections) => detections,
            Err(e) => {
                // Zone occupancy is left as it was
                warn!("Detection failed for camera {}: {}", self.camera_id, e);
                return;
            }
        };

        if zones.is_empty() {
            return;
        }

        let allowed = &self.ctx.settings.object_classes;
        let hits: Vec<ZoneHit> = detections
            .into_iter()
            .filter(|detection| allowed.contains(&detection.class))
            .filter_map(|detection| {
                zones
                    .first_match(detection.bbox.centroid())
                    .map(|(zone_index, _)| ZoneHit {
                        zone_index,
                        detection,
                    })
            })
            .collect();

        debug!(
            "Camera {}: {} detections inside zones",
            self.camera_id,
            hits.len()
        );

        let now = Instant::now();
        for hit in debouncer.admit(hits, now) {
            let zone = zones
                .zones
                .get(hit.zone_index)
                .map(|zone| zone.label(hit.zone_index))
                .unwrap_or_default();
            if self.emit_intrusion(frame, &hit, &zone).await {
                debouncer.confirm(hit.zone_index, now);
            }
        }
    }

    /// Persist the snapshot, then the event referencing it.
    /// Returns `true` once the event is stored.
    async fn emit_intrusion(&self, frame: &Frame, hit: &ZoneHit, zone: &str) -> bool {
        let snapshot_path = match self.ctx.snapshots.save(frame).await {
            Ok(path) => path,
            Err(e) => {
                error!(
                    "Failed to save snapshot for camera {}, dropping intrusion in {}: {}",
                    self.camera_id, zone, e
                );
                return false;
            }
        };

        let event = NewEvent {
            camera_id: self.camera_id,
            timestamp: frame.captured_at,
            rule: INTRUSION_RULE.to_string(),
            object_type: hit.detection.class.to_string(),
            confidence: hit.detection.confidence,
            bbox: hit.detection.bbox.to_pixels(),
            snapshot_path,
        };

        match self.ctx.recorder.record(&event).await {
            Ok(stored) => {
                info!(
                    "Intrusion event {} on camera {} in {}: {} ({:.2})",
                    stored.id, self.camera_id, zone, stored.object_type, stored.confidence
                );
                true
            }
            Err(e) => {
                error!(
                    "Failed to record intrusion event for camera {}: {}",
                    self.camera_id, e
                );
                false
            }
        }
    }

    async fn set_status(&self, status: CameraStatus) {
        if let Err(e) = self.ctx.registry.set_status(self.camera_id, status).await {
            warn!(
                "Failed to set camera {} status to {}: {}",
                self.camera_id, status, e
            );
        }
    }
}

/// Sleep unless the token fires first. Returns `false` when cancelled.
pub(crate) async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = sleep(duration) => true,
    }
}

/// Frames per second over consecutive one second windows
struct FpsMeter {
    window_start: Instant,
    frames: u32,
    rate: f64,
}

impl FpsMeter {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            frames: 0,
            rate: 0.0,
        }
    }

    /// Count one frame and return the rate of the last full window
    fn tick(&mut self, now: Instant) -> f64 {
        self.frames += 1;
        let elapsed = now.duration_since(self.window_start);
        if elapsed >= Duration::from_secs(1) {
            self.rate = self.frames as f64 / elapsed.as_secs_f64();
            self.frames = 0;
            self.window_start = now;
        }
        self.rate
    }
}
