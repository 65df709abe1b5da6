//! Background snapshot writer.
//!
//! The run loop hands owned [`WorldSnapshot`] copies to a writer task over
//! a bounded channel. The task serialises each one to JSON and writes it
//! on the blocking pool, replacing the previous file atomically. It never
//! sees the live session.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use metroline_core::WorldSnapshot;

use crate::error::EngineError;

/// Snapshots queued before new ones are dropped.
const QUEUE_DEPTH: usize = 4;

/// Handle to the writer task.
#[derive(Debug)]
pub struct SnapshotWriter {
    tx: mpsc::Sender<WorldSnapshot>,
    handle: JoinHandle<u64>,
}

impl SnapshotWriter {
    /// Start a writer that saves to `path`.
    pub fn spawn(path: PathBuf) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let handle = tokio::spawn(run(path, rx));
        Self { tx, handle }
    }

    /// Queue a snapshot. Returns `false` if the writer is behind and the
    /// snapshot was dropped.
    pub fn submit(&self, snapshot: WorldSnapshot) -> bool {
        match self.tx.try_send(snapshot) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("snapshot writer is behind, snapshot dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("snapshot writer has stopped, snapshot dropped");
                false
            }
        }
    }

    /// Flush queued snapshots and stop the writer.
    ///
    /// Returns the number of snapshots written.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Writer`] if the writer task panicked.
    pub async fn shutdown(self) -> Result<u64, EngineError> {
        drop(self.tx);
        self.handle.await.map_err(|e| EngineError::Writer {
            message: format!("writer task failed: {e}"),
        })
    }
}

async fn run(path: PathBuf, mut rx: mpsc::Receiver<WorldSnapshot>) -> u64 {
    let mut written = 0_u64;
    while let Some(snapshot) = rx.recv().await {
        let target = path.clone();
        let elapsed = snapshot.clock.elapsed();
        let result = tokio::task::spawn_blocking(move || write_snapshot(&target, &snapshot)).await;
        match result {
            Ok(Ok(())) => {
                written = written.saturating_add(1);
                debug!(path = %path.display(), elapsed, "snapshot written");
            }
            Ok(Err(e)) => warn!(path = %path.display(), error = %e, "snapshot write failed"),
            Err(e) => warn!(error = %e, "snapshot write task failed"),
        }
    }
    info!(written, "snapshot writer stopped");
    written
}

/// Serialise `snapshot` and replace the file at `path` with it.
///
/// # Errors
///
/// Returns [`EngineError::Snapshot`] or [`EngineError::Io`].
pub fn write_snapshot(path: &Path, snapshot: &WorldSnapshot) -> Result<(), EngineError> {
    let bytes = serde_json::to_vec_pretty(snapshot)?;
    let staging = path.with_extension("json.tmp");
    std::fs::write(&staging, bytes)?;
    std::fs::rename(&staging, path)?;
    Ok(())
}

/// Read a snapshot previously written by [`write_snapshot`].
///
/// # Errors
///
/// Returns [`EngineError::Io`] or [`EngineError::Snapshot`].
pub fn read_snapshot(path: &Path) -> Result<WorldSnapshot, EngineError> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
