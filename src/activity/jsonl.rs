//! Append-only JSON Lines activity log.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{ActivityRecord, ActivitySink};
use crate::error::Result;

/// Default number of records buffered between agents and the writer.
pub const DEFAULT_BUFFER: usize = 4096;

/// Writes records to a file from a background task.
///
/// `emit` only enqueues; when the queue is full the record is dropped.
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
    sender: Mutex<Option<mpsc::Sender<ActivityRecord>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    dropped: Arc<AtomicU64>,
}

impl JsonlSink {
    /// Open (or create) `path` for appending and start the writer task.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn open(path: impl AsRef<Path>, buffer: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let (tx, rx) = mpsc::channel(buffer.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let writer = tokio::spawn(write_loop(file, rx, dropped.clone(), path.clone()));

        Ok(Self {
            path,
            sender: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(writer)),
            dropped,
        })
    }

    /// File being written
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop accepting records and wait until everything queued is written
    pub async fn close(&self) {
        drop(self.sender.lock().ok().and_then(|mut s| s.take()));
        let writer = self.writer.lock().ok().and_then(|mut w| w.take());
        if let Some(writer) = writer {
            if let Err(e) = writer.await {
                tracing::warn!("Activity log writer ended abnormally: {}", e);
            }
        }
    }
}

impl ActivitySink for JsonlSink {
    fn emit(&self, record: ActivityRecord) {
        let sent = self
            .sender
            .lock()
            .ok()
            .and_then(|s| s.as_ref().map(|tx| tx.try_send(record).is_ok()))
            .unwrap_or(false);
        if !sent {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

async fn write_loop(
    mut file: tokio::fs::File,
    mut rx: mpsc::Receiver<ActivityRecord>,
    dropped: Arc<AtomicU64>,
    path: PathBuf,
) {
    while let Some(record) = rx.recv().await {
        let mut line = match serde_json::to_vec(&record) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Failed to encode activity record: {}", e);
                dropped.fetch_add(1, Ordering::Relaxed);
                continue;
            },
        };
        line.push(b'\n');
        if let Err(e) = file.write_all(&line).await {
            tracing::warn!("Failed to write activity log {}: {}", path.display(), e);
            dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
    if let Err(e) = file.flush().await {
        tracing::warn!("Failed to flush activity log {}: {}", path.display(), e);
    }
}
