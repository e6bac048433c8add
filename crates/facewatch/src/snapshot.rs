//! Background writer for frames containing unknown faces.
//!
//! Snapshots go through a bounded queue to a single writer thread. When the
//! queue is full the oldest pending snapshot is dropped, so submitting never
//! blocks the display loop. Write failures are logged and counted.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// A frame copy waiting to be written, named by its `HH:MM:SS` timestamp.
pub struct Snapshot {
    pub image: RgbImage,
    pub timestamp: String,
}

/// Accepts snapshots without blocking.
pub trait SnapshotSink {
    fn submit(&self, image: RgbImage, timestamp: &str);
}

#[derive(Debug, Default)]
struct Counters {
    written: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Totals since the writer started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotStats {
    pub written: u64,
    pub failed: u64,
    pub dropped: u64,
}

type StoreFn = Box<dyn FnMut(&Snapshot) -> Result<(), image::ImageError> + Send>;

pub struct SnapshotWriter {
    tx: Option<Sender<Snapshot>>,
    // Lets the producer evict the oldest entry when the queue is full.
    evict: Receiver<Snapshot>,
    counters: Arc<Counters>,
    worker: Option<JoinHandle<()>>,
}

impl SnapshotWriter {
    /// Write snapshots as `<dir>/<timestamp>.jpg`.
    pub fn spawn(dir: &Path, capacity: usize) -> std::io::Result<Self> {
        let dir = dir.to_path_buf();
        Self::spawn_with(capacity, move |snapshot| {
            let path = snapshot_path(&dir, &snapshot.timestamp);
            snapshot.image.save_with_format(&path, image::ImageFormat::Jpeg)
        })
    }

    /// Hand snapshots to `store` on the writer thread.
    pub fn spawn_with<F>(capacity: usize, store: F) -> std::io::Result<Self>
    where
        F: FnMut(&Snapshot) -> Result<(), image::ImageError> + Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded::<Snapshot>(capacity.max(1));
        let counters = Arc::new(Counters::default());

        let worker = {
            let rx = rx.clone();
            let counters = Arc::clone(&counters);
            let store: StoreFn = Box::new(store);
            std::thread::Builder::new()
                .name("facewatch-snapshots".into())
                .spawn(move || run_writer(rx, store, &counters))?
        };

        Ok(Self {
            tx: Some(tx),
            evict: rx,
            counters,
            worker: Some(worker),
        })
    }

    pub fn stats(&self) -> SnapshotStats {
        SnapshotStats {
            written: self.counters.written.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting snapshots, flush the queue and join the writer.
    pub fn shutdown(mut self) -> SnapshotStats {
        self.close();
        self.stats()
    }

    fn close(&mut self) {
        // The writer's loop ends once every sender is gone and the queue is drained.
        self.tx = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("snapshot writer thread panicked");
            }
        }
    }
}

impl SnapshotSink for SnapshotWriter {
    fn submit(&self, image: RgbImage, timestamp: &str) {
        let Some(tx) = &self.tx else {
            return;
        };

        let mut snapshot = Snapshot { image, timestamp: timestamp.to_string() };
        loop {
            match tx.try_send(snapshot) {
                Ok(()) => return,
                Err(TrySendError::Full(back)) => {
                    snapshot = back;
                    if let Ok(oldest) = self.evict.try_recv() {
                        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            timestamp = %oldest.timestamp,
                            "snapshot queue full, dropped oldest snapshot"
                        );
                    }
                }
                Err(TrySendError::Disconnected(_)) => {
                    tracing::warn!(timestamp, "snapshot writer stopped, discarding snapshot");
                    return;
                }
            }
        }
    }
}

impl Drop for SnapshotWriter {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_writer(rx: Receiver<Snapshot>, mut store: StoreFn, counters: &Counters) {
    tracing::debug!("snapshot writer started");
    for snapshot in rx.iter() {
        match store(&snapshot) {
            Ok(()) => {
                counters.written.fetch_add(1, Ordering::Relaxed);
                tracing::info!(timestamp = %snapshot.timestamp, "saved unknown-face snapshot");
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    timestamp = %snapshot.timestamp,
                    error = %e,
                    "failed to save unknown-face snapshot"
                );
            }
        }
    }
    tracing::debug!("snapshot writer exiting");
}

/// `<dir>/<timestamp>.jpg`; a later snapshot in the same second overwrites.
pub fn snapshot_path(dir: &Path, timestamp: &str) -> PathBuf {
    dir.join(format!("{timestamp}.jpg"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    fn frame() -> RgbImage {
        RgbImage::from_pixel(16, 16, Rgb([90, 120, 200]))
    }

    #[test]
    fn test_writes_one_jpeg_per_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::spawn(dir.path(), 4).unwrap();

        writer.submit(frame(), "10:00:01");
        writer.submit(frame(), "10:00:02");
        let stats = writer.shutdown();

        assert_eq!(stats, SnapshotStats { written: 2, failed: 0, dropped: 0 });
        let saved = image::open(dir.path().join("10:00:01.jpg")).unwrap();
        assert_eq!((saved.width(), saved.height()), (16, 16));
        assert!(dir.path().join("10:00:02.jpg").exists());
    }

    #[test]
    fn test_same_second_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::spawn(dir.path(), 4).unwrap();

        writer.submit(frame(), "10:00:01");
        writer.submit(frame(), "10:00:01");
        let stats = writer.shutdown();

        assert_eq!(stats.written, 2);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_write_failure_is_counted() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::spawn(&dir.path().join("missing"), 4).unwrap();

        writer.submit(frame(), "10:00:01");
        let stats = writer.shutdown();

        assert_eq!(stats, SnapshotStats { written: 0, failed: 1, dropped: 0 });
    }

    #[test]
    fn test_full_queue_drops_oldest_without_blocking() {
        let (started_tx, started_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (seen_tx, seen_rx) = mpsc::channel::<String>();

        let writer = SnapshotWriter::spawn_with(2, move |snapshot| {
            let _ = started_tx.send(());
            let _ = release_rx.recv();
            let _ = seen_tx.send(snapshot.timestamp.clone());
            Ok(())
        })
        .unwrap();

        // The writer picks up the first snapshot and blocks in `store`.
        writer.submit(frame(), "a");
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let begin = Instant::now();
        for ts in ["b", "c", "d", "e"] {
            writer.submit(frame(), ts);
        }
        assert!(begin.elapsed() < Duration::from_secs(1), "submit must not block");
        assert_eq!(writer.stats().dropped, 2);

        drop(release_tx);
        let stats = writer.shutdown();
        assert_eq!(stats.written, 3);

        let seen: Vec<String> = seen_rx.iter().collect();
        assert_eq!(seen, ["a", "d", "e"]);
    }

    #[test]
    fn test_snapshot_path() {
        assert_eq!(
            snapshot_path(Path::new("unknown_faces"), "12:34:56"),
            PathBuf::from("unknown_faces/12:34:56.jpg")
        );
    }
}
