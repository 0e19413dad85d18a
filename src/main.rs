use anyhow::Result;
use gstreamer as gst;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use zonewatch::analytics::YoloDetector;
use zonewatch::api::rest::{AppState, RestApi};
use zonewatch::capture::GstCaptureSource;
use zonewatch::config;
use zonewatch::db::DatabaseService;
use zonewatch::ingest::{
    FileSnapshotStore, IngestContext, IngestSettings, LatestFrameCache, WorkerSupervisor,
};

async fn run_app() -> Result<()> {
    // Load configuration, path from the first argument
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = config::load_config(config_path.as_deref())?;

    // Initialize logging, RUST_LOG takes precedence
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.api.log_level.as_str()),
    )
    .init();
    info!("Starting zonewatch");

    // Initialize GStreamer
    gst::init()?;
    info!("GStreamer initialized successfully");

    let db = DatabaseService::new(&config.database).await?;
    if let Err(e) = db.ping().await {
        warn!("Database health check failed, continuing: {}", e);
    }

    let cameras_repo = db.cameras();
    let events_repo = db.events();

    let detector = YoloDetector::load(&config.detector)?;
    info!("Detector model loaded from {:?}", config.detector.model_path);

    let snapshots = FileSnapshotStore::new(&config.snapshots)?;
    let frames = Arc::new(LatestFrameCache::new());

    let ctx = Arc::new(IngestContext {
        registry: Arc::new(cameras_repo.clone()),
        recorder: Arc::new(events_repo.clone()),
        capture: Arc::new(GstCaptureSource::new(&config.capture)),
        detector: Arc::new(detector),
        snapshots: Arc::new(snapshots),
        frames: frames.clone(),
        settings: IngestSettings::from_config(&config.ingestion)?,
    });
    let supervisor = Arc::new(WorkerSupervisor::new(ctx));

    // Pick up cameras registered before the last shutdown
    if config.ingestion.resume_on_startup {
        let cameras = cameras_repo.get_all().await?;
        for camera in &cameras {
            supervisor.spawn(camera.id).await;
        }
        info!("Resumed ingestion for {} cameras", cameras.len());
    }

    let http_server = RestApi::new(
        &config.api,
        AppState {
            db,
            cameras_repo,
            events_repo,
            supervisor: supervisor.clone(),
            frames,
            jpeg_quality: config.snapshots.jpeg_quality,
        },
    )?;

    // Serve until the API fails or a termination signal arrives
    tokio::select! {
        result = http_server.run() => {
            if let Err(e) = result {
                error!("API server stopped: {}", e);
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutting down...");
        }
    }

    supervisor.shutdown().await;
    info!("All ingestion workers stopped");

    Ok(())
}

fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run_app()) {
        eprintln!("Application error: {}", e);
        std::process::exit(1);
    }
}
