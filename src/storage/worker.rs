//! Persistence Worker.
//!
//! Writing the seed to the config store can block on flash I/O. Callers of
//! the setter must never wait for that, so writes are handed to a dedicated
//! thread over a bounded channel. Submission uses `try_send` and fails fast
//! when the queue is full.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::{SeedBackend, StorageError};
use crate::seed::cipher::EncryptedSeed;

enum PersistJob {
    Store(EncryptedSeed),
    Flush(mpsc::Sender<()>),
    Shutdown,
}

/// Counters exposed for diagnostics.
#[derive(Debug, Default)]
pub struct WorkerStats {
    persisted: AtomicU64,
    failed: AtomicU64,
}

impl WorkerStats {
    pub fn persisted(&self) -> u64 {
        self.persisted.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Handle to the persistence thread. Dropping it drains the queue and joins.
pub struct PersistWorker {
    sender: SyncSender<PersistJob>,
    handle: Option<JoinHandle<()>>,
    stats: Arc<WorkerStats>,
}

impl PersistWorker {
    /// Spawns the worker. `queue_depth` bounds the number of pending writes.
    pub fn spawn(backend: Box<dyn SeedBackend>, queue_depth: usize) -> Result<Self, StorageError> {
        let (sender, receiver) = mpsc::sync_channel(queue_depth.max(1));
        let stats = Arc::new(WorkerStats::default());
        let worker_stats = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name("mso-seed-persist".into())
            .spawn(move || run(backend, receiver, worker_stats))
            .map_err(|_| StorageError::IoError)?;

        Ok(Self {
            sender,
            handle: Some(handle),
            stats,
        })
    }

    /// Queues `record` for persistence without blocking.
    ///
    /// # Errors
    /// * `StorageError::QueueFull` if the worker is backlogged.
    /// * `StorageError::WorkerGone` if the worker thread has exited.
    pub fn submit(&self, record: EncryptedSeed) -> Result<(), StorageError> {
        match self.sender.try_send(PersistJob::Store(record)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(StorageError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(StorageError::WorkerGone),
        }
    }

    /// Blocks until every job queued before this call has been processed.
    pub fn flush(&self) -> Result<(), StorageError> {
        let (ack_tx, ack_rx) = mpsc::channel();
        self.sender
            .send(PersistJob::Flush(ack_tx))
            .map_err(|_| StorageError::WorkerGone)?;
        ack_rx.recv().map_err(|_| StorageError::WorkerGone)
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Processes remaining jobs and stops the thread.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.sender.send(PersistJob::Shutdown);
            if handle.join().is_err() {
                log::error!("Seed persistence worker panicked");
            }
        }
    }
}

impl Drop for PersistWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(mut backend: Box<dyn SeedBackend>, receiver: Receiver<PersistJob>, stats: Arc<WorkerStats>) {
    log::debug!("Seed persistence worker started (backend '{}')", backend.name());
    while let Ok(job) = receiver.recv() {
        match job {
            PersistJob::Store(record) => match backend.store(&record) {
                Ok(()) => {
                    stats.persisted.fetch_add(1, Ordering::Relaxed);
                    log::info!("PoD seed persisted to '{}'", backend.name());
                }
                Err(e) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    log::error!("Failed to persist PoD seed to '{}': {}", backend.name(), e);
                }
            },
            PersistJob::Flush(ack) => {
                let _ = ack.send(());
            }
            PersistJob::Shutdown => break,
        }
    }
    log::debug!("Seed persistence worker stopped");
}
