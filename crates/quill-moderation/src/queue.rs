use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tracing::warn;

use quill_types::jobs::ModerationJob;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("moderation queue is full")]
    Full,

    #[error("moderation queue is closed")]
    Closed,
}

/// Submission side of the moderation pipeline. `enqueue` never waits for the
/// job to run, and never waits for queue space either.
pub trait JobQueue: Send + Sync {
    fn enqueue(&self, job: ModerationJob) -> Result<(), QueueError>;
}

/// Enqueue from a request handler. Failures are logged, not returned: the
/// request already succeeded and the content simply goes unmoderated.
pub fn submit(queue: &dyn JobQueue, job: ModerationJob) {
    let name = job.name();
    let subject = job.subject_id();
    if let Err(e) = queue.enqueue(job) {
        warn!("Dropped {} job for {}: {}", name, subject, e);
    }
}

/// In-process queue backed by a bounded tokio channel.
#[derive(Clone)]
pub struct ChannelQueue {
    tx: mpsc::Sender<ModerationJob>,
}

/// Consumer side, shared by every worker task. Each job is handed to exactly
/// one `recv` caller.
#[derive(Clone)]
pub struct JobReceiver {
    rx: Arc<Mutex<mpsc::Receiver<ModerationJob>>>,
}

/// Create a queue holding at most `capacity` pending jobs.
pub fn channel(capacity: usize) -> (ChannelQueue, JobReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ChannelQueue { tx },
        JobReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

impl JobQueue for ChannelQueue {
    fn enqueue(&self, job: ModerationJob) -> Result<(), QueueError> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }
}

impl JobReceiver {
    /// Next job, or `None` once every `ChannelQueue` handle is dropped and
    /// the backlog is drained.
    pub async fn recv(&self) -> Option<ModerationJob> {
        self.rx.lock().await.recv().await
    }

    /// Non-blocking variant, used to drain the backlog in tests.
    pub async fn try_recv(&self) -> Option<ModerationJob> {
        self.rx.lock().await.try_recv().ok()
    }
}
