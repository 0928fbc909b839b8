//! Background content moderation: a typed job queue, the classifier oracle,
//! and the worker pool that applies verdicts.

pub mod classifier;
pub mod queue;
pub mod worker;

use thiserror::Error;

pub use classifier::{Classifier, GeminiClassifier, KeywordClassifier, Verdict};
pub use queue::{ChannelQueue, JobQueue, JobReceiver, QueueError};
pub use worker::ModerationWorker;

/// A job that could not be completed. Never surfaced to HTTP callers; the
/// worker logs it and the content stays visible.
#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("classifier request failed: {0}")]
    Classifier(reqwest::Error),

    #[error("classifier returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("classifier misconfigured: {0}")]
    Config(&'static str),

    #[error("classifier returned an unusable verdict: {0}")]
    MalformedVerdict(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("storage task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}
