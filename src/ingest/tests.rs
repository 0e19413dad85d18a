#[cfg(test)]
mod tests {
    use crate::analytics::{BoundingBox, Detection, Detector, ObjectClass};
    use crate::capture::{CaptureSession, CaptureSource, Frame};
    use crate::config::{IntrusionPolicy, SnapshotConfig};
    use crate::db::models::{Camera, CameraStatus, Event, NewEvent, ZoneSet};
    use crate::error::Error;
    use crate::ingest::{
        CameraRegistry, CameraWorker, EventRecorder, FileSnapshotStore, IngestContext,
        IngestSettings, LatestFrameCache, SnapshotStore, WorkerSupervisor,
    };
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::task::JoinHandle;
    use tokio::time::sleep;
    use tokio_util::sync::CancellationToken;

    const CAMERA_ID: i64 = 1;
    const SQUARE_ZONE: &str = r#"{"zones": [{"points": [[0, 0], [0, 10], [10, 10], [10, 0]]}]}"#;

    // ---- fakes ----

    #[derive(Default)]
    struct FakeRegistry {
        cameras: Mutex<HashMap<i64, Camera>>,
        statuses: Mutex<Vec<(i64, CameraStatus)>>,
        heartbeats: Mutex<Vec<(i64, DateTime<Utc>, f64)>>,
        /// Status and heartbeat writes fail while set
        fail_writes: AtomicBool,
        /// Number of camera lookups that fail before succeeding
        failing_lookups: AtomicUsize,
        write_attempts: AtomicUsize,
    }

    impl FakeRegistry {
        fn with_camera(camera: Camera) -> Self {
            let registry = Self::default();
            registry.cameras.lock().unwrap().insert(camera.id, camera);
            registry
        }

        fn remove(&self, camera_id: i64) {
            self.cameras.lock().unwrap().remove(&camera_id);
        }

        fn statuses(&self, camera_id: i64) -> Vec<CameraStatus> {
            self.statuses
                .lock()
                .unwrap()
                .iter()
                .filter(|(id, _)| *id == camera_id)
                .map(|(_, status)| *status)
                .collect()
        }

        fn heartbeats(&self) -> Vec<(i64, DateTime<Utc>, f64)> {
            self.heartbeats.lock().unwrap().clone()
        }

        fn write(&self) -> Result<()> {
            self.write_attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(Error::Database("connection reset".to_string()).into());
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CameraRegistry for FakeRegistry {
        async fn camera(&self, camera_id: i64) -> Result<Option<Camera>> {
            let failing = self.failing_lookups.load(Ordering::SeqCst);
            if failing > 0 {
                self.failing_lookups.store(failing - 1, Ordering::SeqCst);
                return Err(Error::Database("pool timed out".to_string()).into());
            }
            Ok(self.cameras.lock().unwrap().get(&camera_id).cloned())
        }

        async fn set_status(&self, camera_id: i64, status: CameraStatus) -> Result<()> {
            self.write()?;
            self.statuses.lock().unwrap().push((camera_id, status));
            Ok(())
        }

        async fn heartbeat(&self, camera_id: i64, at: DateTime<Utc>, fps: f64) -> Result<()> {
            self.write()?;
            self.heartbeats.lock().unwrap().push((camera_id, at, fps));
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeRecorder {
        events: Mutex<Vec<Event>>,
        /// Number of appends that fail before succeeding
        failing_appends: AtomicUsize,
    }

    impl FakeRecorder {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventRecorder for FakeRecorder {
        async fn record(&self, event: &NewEvent) -> Result<Event> {
            let failing = self.failing_appends.load(Ordering::SeqCst);
            if failing > 0 {
                self.failing_appends.store(failing - 1, Ordering::SeqCst);
                return Err(Error::Database("insert failed".to_string()).into());
            }
            let mut events = self.events.lock().unwrap();
            let stored = Event {
                id: events.len() as i64 + 1,
                camera_id: event.camera_id,
                timestamp: event.timestamp,
                rule: event.rule.clone(),
                object_type: event.object_type.clone(),
                confidence: event.confidence,
                bbox: event.bbox,
                snapshot_path: event.snapshot_path.clone(),
            };
            events.push(stored.clone());
            Ok(stored)
        }
    }

    /// What the next `open` call does
    #[derive(Debug, Clone, Copy)]
    enum Script {
        OpenFails,
        /// Serve frames, then fail the read after `Some(n)` of them
        Stream(Option<usize>),
    }

    struct ScriptedCapture {
        scripts: Mutex<VecDeque<Script>>,
        fallback: Script,
        opens: AtomicUsize,
        reads: Arc<AtomicUsize>,
    }

    impl ScriptedCapture {
        fn new(scripts: Vec<Script>, fallback: Script) -> Self {
            Self {
                scripts: Mutex::new(scripts.into()),
                fallback,
                opens: AtomicUsize::new(0),
                reads: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn endless() -> Self {
            Self::new(Vec::new(), Script::Stream(None))
        }

        fn opens(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CaptureSource for ScriptedCapture {
        async fn open(&self, _source: &str) -> Result<Box<dyn CaptureSession>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(self.fallback);

            match script {
                Script::OpenFails => Err(Error::Capture("connection refused".to_string()).into()),
                Script::Stream(remaining) => Ok(Box::new(FakeSession {
                    remaining,
                    reads: self.reads.clone(),
                    released: false,
                })),
            }
        }
    }

    struct FakeSession {
        remaining: Option<usize>,
        reads: Arc<AtomicUsize>,
        released: bool,
    }

    #[async_trait]
    impl CaptureSession for FakeSession {
        async fn read(&mut self) -> Result<Frame> {
            if self.released {
                return Err(Error::Capture("session released".to_string()).into());
            }
            match self.remaining {
                Some(0) => return Err(Error::Capture("end of stream".to_string()).into()),
                Some(ref mut n) => *n -= 1,
                None => {}
            }
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(Frame::solid(20, 20, [90, 120, 150]))
        }

        fn release(&mut self) {
            self.released = true;
        }
    }

    /// Returns the same detections on every call
    struct StubDetector {
        detections: Vec<Detection>,
        calls: AtomicUsize,
        fail_first: usize,
        panic_first: usize,
    }

    impl StubDetector {
        fn returning(detections: Vec<Detection>) -> Self {
            Self {
                detections,
                calls: AtomicUsize::new(0),
                fail_first: 0,
                panic_first: 0,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Detector for StubDetector {
        async fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.panic_first {
                panic!("model crashed");
            }
            if call < self.fail_first {
                return Err(Error::Detection("inference failed".to_string()).into());
            }
            Ok(self.detections.clone())
        }
    }

    #[derive(Default)]
    struct FakeSnapshots {
        saved: AtomicUsize,
        fail: bool,
        fail_first: usize,
    }

    #[async_trait]
    impl SnapshotStore for FakeSnapshots {
        async fn save(&self, _frame: &Frame) -> Result<String> {
            let n = self.saved.fetch_add(1, Ordering::SeqCst);
            if self.fail || n < self.fail_first {
                return Err(Error::Snapshot("disk full".to_string()).into());
            }
            Ok(format!("mem://snapshots/evt_{}.jpg", n))
        }
    }

    // ---- harness ----

    fn camera(zones: Option<&str>) -> Camera {
        Camera {
            id: CAMERA_ID,
            name: "gate".to_string(),
            location: None,
            source_url: "test".to_string(),
            status: CameraStatus::Offline,
            fps: 0.0,
            last_frame_time: None,
            zones: zones.map(|json| serde_json::from_str::<ZoneSet>(json).unwrap()),
            created_at: Utc::now(),
        }
    }

    fn detection(class: ObjectClass, bbox: [f32; 4]) -> Detection {
        Detection {
            class,
            confidence: 0.87,
            bbox: BoundingBox::new(bbox[0], bbox[1], bbox[2], bbox[3]),
        }
    }

    /// Person box whose centroid is (5, 5)
    fn person_at_five() -> Detection {
        detection(ObjectClass::Person, [0.0, 0.0, 10.0, 10.0])
    }

    fn settings(policy: IntrusionPolicy, frame_skip: u64) -> IngestSettings {
        IngestSettings {
            frame_skip,
            intrusion_policy: policy,
            ..IngestSettings::default()
        }
    }

    struct Harness {
        registry: Arc<FakeRegistry>,
        recorder: Arc<FakeRecorder>,
        capture: Arc<ScriptedCapture>,
        detector: Arc<StubDetector>,
        snapshots: Arc<FakeSnapshots>,
        frames: Arc<LatestFrameCache>,
        ctx: Arc<IngestContext>,
    }

    impl Harness {
        fn new(
            registry: FakeRegistry,
            capture: ScriptedCapture,
            detector: StubDetector,
            snapshots: FakeSnapshots,
            settings: IngestSettings,
        ) -> Self {
            let registry = Arc::new(registry);
            let recorder = Arc::new(FakeRecorder::default());
            let capture = Arc::new(capture);
            let detector = Arc::new(detector);
            let snapshots = Arc::new(snapshots);
            let frames = Arc::new(LatestFrameCache::new());

            let ctx = Arc::new(IngestContext {
                registry: registry.clone(),
                recorder: recorder.clone(),
                capture: capture.clone(),
                detector: detector.clone(),
                snapshots: snapshots.clone(),
                frames: frames.clone(),
                settings,
            });

            Self {
                registry,
                recorder,
                capture,
                detector,
                snapshots,
                frames,
                ctx,
            }
        }

        fn start(&self) -> (CancellationToken, JoinHandle<()>) {
            let cancel = CancellationToken::new();
            let worker = CameraWorker::new(CAMERA_ID, self.ctx.clone());
            let handle = tokio::spawn(worker.run(cancel.clone()));
            (cancel, handle)
        }
    }

    async fn stop(cancel: CancellationToken, handle: JoinHandle<()>) {
        cancel.cancel();
        handle.await.unwrap();
    }

    // ---- worker scenarios ----

    #[tokio::test(start_paused = true)]
    async fn test_detection_runs_on_every_nth_frame() {
        let harness = Harness::new(
            FakeRegistry::with_camera(camera(Some(SQUARE_ZONE))),
            ScriptedCapture::new(vec![Script::Stream(Some(12))], Script::OpenFails),
            StubDetector::returning(Vec::new()),
            FakeSnapshots::default(),
            settings(IntrusionPolicy::EveryFrame, 5),
        );

        let (cancel, handle) = harness.start();
        sleep(Duration::from_secs(3)).await;
        stop(cancel, handle).await;

        assert_eq!(harness.capture.reads(), 12);
        // frames 5 and 10
        assert_eq!(harness.detector.calls(), 2);
        assert_eq!(harness.registry.heartbeats().len(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forged_person_in_zone_records_one_event() {
        let harness = Harness::new(
            FakeRegistry::with_camera(camera(Some(SQUARE_ZONE))),
            ScriptedCapture::endless(),
            StubDetector::returning(vec![person_at_five()]),
            FakeSnapshots::default(),
            settings(IntrusionPolicy::PerPresence, 1),
        );

        let (cancel, handle) = harness.start();
        sleep(Duration::from_secs(2)).await;
        stop(cancel, handle).await;

        assert!(harness.detector.calls() > 1);
        let events = harness.recorder.events();
        assert_eq!(events.len(), 1);

        let event = &events[0];
        assert_eq!(event.camera_id, CAMERA_ID);
        assert_eq!(event.rule, "intrusion");
        assert_eq!(event.object_type, "person");
        assert_eq!(event.bbox, [0, 0, 10, 10]);
        assert!((event.confidence - 0.87).abs() < f32::EPSILON);
        assert_eq!(event.snapshot_path, "mem://snapshots/evt_0.jpg");
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_frame_policy_records_each_analysed_frame() {
        let harness = Harness::new(
            FakeRegistry::with_camera(camera(Some(SQUARE_ZONE))),
            ScriptedCapture::new(vec![Script::Stream(Some(10))], Script::OpenFails),
            StubDetector::returning(vec![person_at_five()]),
            FakeSnapshots::default(),
            settings(IntrusionPolicy::EveryFrame, 5),
        );

        let (cancel, handle) = harness.start();
        sleep(Duration::from_secs(3)).await;
        stop(cancel, handle).await;

        assert_eq!(harness.recorder.events().len(), 2);
        assert_eq!(harness.snapshots.saved.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_person_detections_never_record_events() {
        let harness = Harness::new(
            FakeRegistry::with_camera(camera(Some(SQUARE_ZONE))),
            ScriptedCapture::endless(),
            StubDetector::returning(vec![
                detection(ObjectClass::Car, [0.0, 0.0, 10.0, 10.0]),
                detection(ObjectClass::Dog, [2.0, 2.0, 6.0, 6.0]),
            ]),
            FakeSnapshots::default(),
            settings(IntrusionPolicy::EveryFrame, 1),
        );

        let (cancel, handle) = harness.start();
        sleep(Duration::from_secs(2)).await;
        stop(cancel, handle).await;

        assert!(harness.detector.calls() > 0);
        assert!(harness.recorder.events().is_empty());
        assert_eq!(harness.snapshots.saved.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_camera_without_zones_never_records_events() {
        let harness = Harness::new(
            FakeRegistry::with_camera(camera(None)),
            ScriptedCapture::endless(),
            StubDetector::returning(vec![person_at_five()]),
            FakeSnapshots::default(),
            settings(IntrusionPolicy::EveryFrame, 1),
        );

        let (cancel, handle) = harness.start();
        sleep(Duration::from_secs(2)).await;
        stop(cancel, handle).await;

        assert!(harness.detector.calls() > 0);
        assert!(harness.recorder.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_person_outside_zone_is_ignored() {
        let harness = Harness::new(
            FakeRegistry::with_camera(camera(Some(SQUARE_ZONE))),
            ScriptedCapture::endless(),
            StubDetector::returning(vec![detection(ObjectClass::Person, [30.0, 30.0, 50.0, 50.0])]),
            FakeSnapshots::default(),
            settings(IntrusionPolicy::EveryFrame, 1),
        );

        let (cancel, handle) = harness.start();
        sleep(Duration::from_secs(1)).await;
        stop(cancel, handle).await;

        assert!(harness.recorder.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_open_failures_stay_offline_and_retry() {
        let harness = Harness::new(
            FakeRegistry::with_camera(camera(Some(SQUARE_ZONE))),
            ScriptedCapture::new(Vec::new(), Script::OpenFails),
            StubDetector::returning(Vec::new()),
            FakeSnapshots::default(),
            settings(IntrusionPolicy::PerPresence, 5),
        );

        let (cancel, handle) = harness.start();
        sleep(Duration::from_secs(31)).await;

        assert!(!handle.is_finished());
        assert!(harness.capture.opens() >= 6);
        let statuses = harness.registry.statuses(CAMERA_ID);
        assert!(!statuses.is_empty());
        assert!(statuses.iter().all(|s| *s == CameraStatus::Offline));

        stop(cancel, handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_failure_reconnects_once() {
        let harness = Harness::new(
            FakeRegistry::with_camera(camera(Some(SQUARE_ZONE))),
            ScriptedCapture::new(vec![Script::Stream(Some(3))], Script::Stream(None)),
            StubDetector::returning(Vec::new()),
            FakeSnapshots::default(),
            settings(IntrusionPolicy::PerPresence, 5),
        );

        let (cancel, handle) = harness.start();
        sleep(Duration::from_secs(5)).await;

        assert_eq!(
            harness.registry.statuses(CAMERA_ID),
            vec![
                CameraStatus::Online,
                CameraStatus::Offline,
                CameraStatus::Online
            ]
        );
        assert_eq!(harness.capture.opens(), 2);
        assert!(harness.capture.reads() > 3);
        assert!(harness.detector.calls() > 0);

        stop(cancel, handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_detector_failure_does_not_stop_the_worker() {
        let mut detector = StubDetector::returning(vec![person_at_five()]);
        detector.fail_first = 3;

        let harness = Harness::new(
            FakeRegistry::with_camera(camera(Some(SQUARE_ZONE))),
            ScriptedCapture::endless(),
            detector,
            FakeSnapshots::default(),
            settings(IntrusionPolicy::PerPresence, 1),
        );

        let (cancel, handle) = harness.start();
        sleep(Duration::from_secs(2)).await;
        assert!(!handle.is_finished());
        stop(cancel, handle).await;

        assert!(harness.detector.calls() > 3);
        assert_eq!(harness.recorder.events().len(), 1);
        assert_eq!(harness.capture.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_failure_skips_the_event() {
        let snapshots = FakeSnapshots {
            fail: true,
            ..FakeSnapshots::default()
        };

        let harness = Harness::new(
            FakeRegistry::with_camera(camera(Some(SQUARE_ZONE))),
            ScriptedCapture::endless(),
            StubDetector::returning(vec![person_at_five()]),
            snapshots,
            settings(IntrusionPolicy::EveryFrame, 1),
        );

        let (cancel, handle) = harness.start();
        sleep(Duration::from_secs(1)).await;
        assert!(!handle.is_finished());
        stop(cancel, handle).await;

        assert!(harness.snapshots.saved.load(Ordering::SeqCst) > 1);
        assert!(harness.recorder.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_snapshot_does_not_suppress_the_presence() {
        let snapshots = FakeSnapshots {
            fail_first: 1,
            ..FakeSnapshots::default()
        };

        let harness = Harness::new(
            FakeRegistry::with_camera(camera(Some(SQUARE_ZONE))),
            ScriptedCapture::endless(),
            StubDetector::returning(vec![person_at_five()]),
            snapshots,
            settings(IntrusionPolicy::PerPresence, 1),
        );

        let (cancel, handle) = harness.start();
        sleep(Duration::from_secs(2)).await;
        stop(cancel, handle).await;

        // The next frame of the same presence retries and is then debounced
        assert_eq!(harness.snapshots.saved.load(Ordering::SeqCst), 2);
        let events = harness.recorder.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].snapshot_path, "mem://snapshots/evt_1.jpg");
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_append_failure_keeps_the_worker_running() {
        let harness = Harness::new(
            FakeRegistry::with_camera(camera(Some(SQUARE_ZONE))),
            ScriptedCapture::endless(),
            StubDetector::returning(vec![person_at_five()]),
            FakeSnapshots::default(),
            settings(IntrusionPolicy::PerPresence, 1),
        );
        harness.recorder.failing_appends.store(2, Ordering::SeqCst);

        let (cancel, handle) = harness.start();
        sleep(Duration::from_secs(2)).await;
        assert!(!handle.is_finished());
        stop(cancel, handle).await;

        assert_eq!(harness.capture.opens(), 1);
        assert!(harness.capture.reads() > 10);
        assert!(harness.detector.calls() > 10);
        assert_eq!(harness.recorder.events().len(), 1);
        assert_eq!(harness.snapshots.saved.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_write_failures_do_not_end_the_session() {
        let harness = Harness::new(
            FakeRegistry::with_camera(camera(Some(SQUARE_ZONE))),
            ScriptedCapture::endless(),
            StubDetector::returning(vec![person_at_five()]),
            FakeSnapshots::default(),
            settings(IntrusionPolicy::PerPresence, 1),
        );
        harness.registry.fail_writes.store(true, Ordering::SeqCst);

        let (cancel, handle) = harness.start();
        sleep(Duration::from_secs(2)).await;
        assert!(!handle.is_finished());

        assert_eq!(harness.capture.opens(), 1);
        assert!(harness.capture.reads() > 10);
        assert!(harness.detector.calls() > 10);
        assert_eq!(harness.recorder.events().len(), 1);
        assert!(harness.registry.heartbeats().is_empty());
        // online status plus one heartbeat per frame
        assert!(harness.registry.write_attempts.load(Ordering::SeqCst) > 10);

        // Writes recover without a reconnect
        harness.registry.fail_writes.store(false, Ordering::SeqCst);
        sleep(Duration::from_millis(500)).await;
        assert!(!harness.registry.heartbeats().is_empty());
        assert_eq!(harness.capture.opens(), 1);

        stop(cancel, handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_camera_lookup_failure_backs_off_and_recovers() {
        let harness = Harness::new(
            FakeRegistry::with_camera(camera(Some(SQUARE_ZONE))),
            ScriptedCapture::endless(),
            StubDetector::returning(Vec::new()),
            FakeSnapshots::default(),
            IngestSettings::default(),
        );
        harness.registry.failing_lookups.store(2, Ordering::SeqCst);

        let (cancel, handle) = harness.start();
        sleep(Duration::from_secs(4)).await;
        assert_eq!(harness.capture.opens(), 0);
        assert_eq!(
            harness.registry.statuses(CAMERA_ID),
            vec![CameraStatus::Offline]
        );

        sleep(Duration::from_secs(8)).await;
        assert!(!handle.is_finished());
        assert_eq!(harness.capture.opens(), 1);
        assert_eq!(
            harness.registry.statuses(CAMERA_ID).last(),
            Some(&CameraStatus::Online)
        );

        stop(cancel, handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_snapshot_is_a_readable_image() {
        let directory =
            std::env::temp_dir().join(format!("zonewatch-ingest-{}", uuid::Uuid::new_v4()));
        let store = FileSnapshotStore::new(&SnapshotConfig {
            directory,
            prefix: "evt_".to_string(),
            jpeg_quality: 80,
        })
        .unwrap();

        let harness = Harness::new(
            FakeRegistry::with_camera(camera(Some(SQUARE_ZONE))),
            ScriptedCapture::endless(),
            StubDetector::returning(vec![person_at_five()]),
            FakeSnapshots::default(),
            settings(IntrusionPolicy::PerPresence, 1),
        );
        let ctx = Arc::new(IngestContext {
            registry: harness.registry.clone(),
            recorder: harness.recorder.clone(),
            capture: harness.capture.clone(),
            detector: harness.detector.clone(),
            snapshots: Arc::new(store),
            frames: harness.frames.clone(),
            settings: harness.ctx.settings.clone(),
        });

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(CameraWorker::new(CAMERA_ID, ctx).run(cancel.clone()));
        sleep(Duration::from_secs(1)).await;
        stop(cancel, handle).await;

        let events = harness.recorder.events();
        assert_eq!(events.len(), 1);
        let image = image::open(&events[0].snapshot_path).unwrap();
        assert_eq!((image.width(), image.height()), (20, 20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_exits_when_camera_is_deregistered() {
        let harness = Harness::new(
            FakeRegistry::with_camera(camera(Some(SQUARE_ZONE))),
            ScriptedCapture::new(vec![Script::Stream(Some(4))], Script::Stream(None)),
            StubDetector::returning(Vec::new()),
            FakeSnapshots::default(),
            settings(IntrusionPolicy::PerPresence, 5),
        );

        let (_cancel, handle) = harness.start();
        sleep(Duration::from_millis(100)).await;
        harness.registry.remove(CAMERA_ID);

        tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("worker exits after deregistration")
            .unwrap();
        assert_eq!(harness.capture.opens(), 1);
        assert!(harness.frames.latest(CAMERA_ID).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_camera_exits_immediately() {
        let harness = Harness::new(
            FakeRegistry::default(),
            ScriptedCapture::endless(),
            StubDetector::returning(Vec::new()),
            FakeSnapshots::default(),
            IngestSettings::default(),
        );

        let (_cancel, handle) = harness.start();
        handle.await.unwrap();
        assert_eq!(harness.capture.opens(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_marks_offline_and_clears_frame() {
        let harness = Harness::new(
            FakeRegistry::with_camera(camera(Some(SQUARE_ZONE))),
            ScriptedCapture::endless(),
            StubDetector::returning(Vec::new()),
            FakeSnapshots::default(),
            IngestSettings::default(),
        );

        let (cancel, handle) = harness.start();
        sleep(Duration::from_millis(500)).await;
        assert!(harness.frames.latest(CAMERA_ID).is_some());

        stop(cancel, handle).await;

        assert!(harness.frames.latest(CAMERA_ID).is_none());
        assert_eq!(
            harness.registry.statuses(CAMERA_ID).last(),
            Some(&CameraStatus::Offline)
        );
        let heartbeats = harness.registry.heartbeats();
        assert!(heartbeats.iter().all(|(id, _, _)| *id == CAMERA_ID));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_reports_frame_rate() {
        let harness = Harness::new(
            FakeRegistry::with_camera(camera(None)),
            ScriptedCapture::endless(),
            StubDetector::returning(Vec::new()),
            FakeSnapshots::default(),
            IngestSettings::default(),
        );

        let (cancel, handle) = harness.start();
        sleep(Duration::from_secs(3)).await;
        stop(cancel, handle).await;

        let (_, _, fps) = *harness.registry.heartbeats().last().unwrap();
        // 50ms between reads
        assert!(fps > 15.0 && fps < 25.0, "fps was {}", fps);
    }

    // ---- supervisor ----

    #[tokio::test(start_paused = true)]
    async fn test_supervisor_runs_one_worker_per_camera() {
        let harness = Harness::new(
            FakeRegistry::with_camera(camera(Some(SQUARE_ZONE))),
            ScriptedCapture::endless(),
            StubDetector::returning(Vec::new()),
            FakeSnapshots::default(),
            IngestSettings::default(),
        );
        let supervisor = WorkerSupervisor::new(harness.ctx.clone());

        assert!(supervisor.spawn(CAMERA_ID).await);
        assert!(!supervisor.spawn(CAMERA_ID).await);
        sleep(Duration::from_millis(200)).await;

        assert!(supervisor.is_running(CAMERA_ID).await);
        assert_eq!(harness.capture.opens(), 1);
        let running = supervisor.running().await;
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].camera_id, CAMERA_ID);

        assert!(supervisor.stop(CAMERA_ID).await);
        assert!(!supervisor.is_running(CAMERA_ID).await);
        assert!(!supervisor.stop(CAMERA_ID).await);
        assert_eq!(
            harness.registry.statuses(CAMERA_ID).last(),
            Some(&CameraStatus::Offline)
        );

        // A stopped camera can be started again
        assert!(supervisor.spawn(CAMERA_ID).await);
        supervisor.shutdown().await;
        assert!(supervisor.running().await.is_empty());
        assert!(!supervisor.spawn(CAMERA_ID).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervisor_reports_finished_workers_as_stopped() {
        let harness = Harness::new(
            FakeRegistry::default(),
            ScriptedCapture::endless(),
            StubDetector::returning(Vec::new()),
            FakeSnapshots::default(),
            IngestSettings::default(),
        );
        let supervisor = WorkerSupervisor::new(harness.ctx.clone());

        assert!(supervisor.spawn(42).await);
        sleep(Duration::from_millis(100)).await;

        assert!(supervisor.running().await.is_empty());
        assert!(!supervisor.is_running(42).await);
        // The finished handle is gone, so there is nothing left to stop
        assert!(!supervisor.stop(42).await);

        assert!(supervisor.spawn(42).await);
        supervisor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervisor_restarts_panicked_worker() {
        let mut detector = StubDetector::returning(vec![person_at_five()]);
        detector.panic_first = 1;

        let harness = Harness::new(
            FakeRegistry::with_camera(camera(Some(SQUARE_ZONE))),
            ScriptedCapture::endless(),
            detector,
            FakeSnapshots::default(),
            settings(IntrusionPolicy::PerPresence, 1),
        );
        let supervisor = WorkerSupervisor::new(harness.ctx.clone());

        assert!(supervisor.spawn(CAMERA_ID).await);
        sleep(Duration::from_secs(10)).await;

        assert!(supervisor.is_running(CAMERA_ID).await);
        assert_eq!(harness.capture.opens(), 2);
        assert_eq!(harness.recorder.events().len(), 1);

        supervisor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicked_worker_stays_down_without_restart() {
        let mut detector = StubDetector::returning(Vec::new());
        detector.panic_first = 1;

        let mut settings = settings(IntrusionPolicy::PerPresence, 1);
        settings.restart_on_panic = false;

        let harness = Harness::new(
            FakeRegistry::with_camera(camera(Some(SQUARE_ZONE))),
            ScriptedCapture::endless(),
            detector,
            FakeSnapshots::default(),
            settings,
        );
        let supervisor = WorkerSupervisor::new(harness.ctx.clone());

        assert!(supervisor.spawn(CAMERA_ID).await);
        sleep(Duration::from_secs(10)).await;

        assert!(!supervisor.is_running(CAMERA_ID).await);
        assert_eq!(harness.capture.opens(), 1);
        assert_eq!(
            harness.registry.statuses(CAMERA_ID).last(),
            Some(&CameraStatus::Offline)
        );
        assert!(harness.frames.latest(CAMERA_ID).is_none());
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = crate::config::IngestionConfig::default();
        config.frame_skip = 0;
        config.realert_after_secs = 0;
        config.object_classes = vec!["person".to_string(), "Car".to_string()];

        let settings = IngestSettings::from_config(&config).unwrap();
        assert_eq!(settings.frame_skip, 1);
        assert_eq!(settings.realert_after, None);
        assert_eq!(
            settings.object_classes,
            vec![ObjectClass::Person, ObjectClass::Car]
        );

        config.object_classes = vec!["unicorn".to_string()];
        assert!(IngestSettings::from_config(&config).is_err());
    }
}
