use crate::capture::Frame;
use crate::config::SnapshotConfig;
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use log::debug;
use std::path::PathBuf;
use uuid::Uuid;

/// Persists event snapshots and returns where they were written
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Encode and store the frame under a fresh unique name
    async fn save(&self, frame: &Frame) -> Result<String>;
}

/// Writes JPEG snapshots into a local directory
pub struct FileSnapshotStore {
    directory: PathBuf,
    prefix: String,
    quality: u8,
}

impl FileSnapshotStore {
    /// Create the store, making sure the target directory exists
    pub fn new(config: &SnapshotConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.directory).map_err(|e| {
            Error::Snapshot(format!(
                "Failed to create snapshot directory {:?}: {}",
                config.directory, e
            ))
        })?;

        Ok(Self {
            directory: config.directory.clone(),
            prefix: config.prefix.clone(),
            quality: config.jpeg_quality.clamp(1, 100),
        })
    }

    fn next_path(&self) -> PathBuf {
        self.directory
            .join(format!("{}{}.jpg", self.prefix, Uuid::new_v4().simple()))
    }
}

/// Encode an RGB frame as JPEG
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .encode(&frame.data, frame.width, frame.height, ColorType::Rgb8)
        .map_err(|e| Error::Snapshot(format!("Failed to encode JPEG: {}", e)))?;
    Ok(buffer)
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, frame: &Frame) -> Result<String> {
        let path = self.next_path();
        let frame = frame.clone();
        let quality = self.quality;
        let target = path.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let bytes = encode_jpeg(&frame, quality)?;

            // Readers never observe a partially written file
            let partial = target.with_extension("jpg.part");
            std::fs::write(&partial, &bytes).map_err(|e| {
                Error::Snapshot(format!("Failed to write snapshot {:?}: {}", partial, e))
            })?;
            std::fs::rename(&partial, &target).map_err(|e| {
                let _ = std::fs::remove_file(&partial);
                Error::Snapshot(format!("Failed to finalize snapshot {:?}: {}", target, e))
            })?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Internal(format!("Snapshot task failed: {}", e)))??;

        let location = path.to_string_lossy().into_owned();
        debug!("Saved snapshot {}", location);
        Ok(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(name: &str) -> (FileSnapshotStore, PathBuf) {
        let directory = std::env::temp_dir()
            .join(format!("zonewatch-snapshots-{}-{}", name, Uuid::new_v4()));
        let config = SnapshotConfig {
            directory: directory.clone(),
            prefix: "evt_".to_string(),
            jpeg_quality: 85,
        };
        (FileSnapshotStore::new(&config).unwrap(), directory)
    }

    #[tokio::test]
    async fn writes_a_readable_jpeg() {
        let (store, directory) = store_in("readable");
        let frame = Frame::solid(32, 24, [200, 40, 40]);

        let location = store.save(&frame).await.unwrap();
        let path = PathBuf::from(&location);
        assert!(path.starts_with(&directory));
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("evt_"));
        assert_eq!(path.extension().unwrap(), "jpg");

        let decoded = image::open(&path).unwrap();
        assert_eq!(decoded.width(), 32);
        assert_eq!(decoded.height(), 24);
    }

    #[tokio::test]
    async fn every_save_gets_a_new_name() {
        let (store, _) = store_in("unique");
        let frame = Frame::solid(4, 4, [0, 0, 0]);

        let first = store.save(&frame).await.unwrap();
        let second = store.save(&frame).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let (store, directory) = store_in("removed");
        std::fs::remove_dir_all(&directory).unwrap();

        let result = store.save(&Frame::solid(4, 4, [0, 0, 0])).await;
        assert!(result.is_err());
    }

    #[test]
    fn encodes_jpeg_magic() {
        let bytes = encode_jpeg(&Frame::solid(8, 8, [10, 20, 30]), 90).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
}
