use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use quill_db::{Deactivatable, ReplyStore};
use quill_types::jobs::{ContentKind, ModerationJob, ReplyPayload};

use crate::ModerationError;
use crate::classifier::Classifier;
use crate::queue::JobReceiver;

/// What a processed job did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Classifier found nothing; no mutation.
    Clean,
    /// Entity deactivated.
    Suppressed,
    /// Positive verdict, but the entity was deleted in the meantime.
    Missing,
    ReplyCreated(Uuid),
    /// Reply created, then deactivated by its own classification.
    ReplySuppressed(Uuid),
    /// Reply already existed for this trigger, or the trigger is gone.
    ReplySkipped,
}

/// Consumes moderation jobs. Holds only the storage capabilities it needs:
/// suppression for posts and comments, and reply creation.
pub struct ModerationWorker {
    classifier: Arc<dyn Classifier>,
    posts: Arc<dyn Deactivatable>,
    comments: Arc<dyn Deactivatable>,
    replies: Arc<dyn ReplyStore>,
}

impl ModerationWorker {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        posts: Arc<dyn Deactivatable>,
        comments: Arc<dyn Deactivatable>,
        replies: Arc<dyn ReplyStore>,
    ) -> Self {
        Self {
            classifier,
            posts,
            comments,
            replies,
        }
    }

    /// Process one job to completion.
    pub async fn handle(&self, job: ModerationJob) -> Result<Outcome, ModerationError> {
        match job {
            ModerationJob::Classify {
                entity_id,
                kind,
                content,
            } => self.classify_and_suppress(kind, entity_id, &content).await,
            ModerationJob::CreateReply(reply) => self.create_reply(reply).await,
        }
    }

    async fn classify_and_suppress(
        &self,
        kind: ContentKind,
        id: Uuid,
        content: &str,
    ) -> Result<Outcome, ModerationError> {
        let verdict = self.classifier.classify(content).await?;
        if !verdict.contains_abusive_content {
            return Ok(Outcome::Clean);
        }

        let store = match kind {
            ContentKind::Post => self.posts.clone(),
            ContentKind::Comment => self.comments.clone(),
        };

        // Run blocking DB update off the async runtime
        let found = tokio::task::spawn_blocking(move || store.deactivate(id)).await??;

        if found {
            info!("Suppressed {} {} after positive verdict", kind.as_str(), id);
            Ok(Outcome::Suppressed)
        } else {
            debug!("{} {} gone before suppression", kind.as_str(), id);
            Ok(Outcome::Missing)
        }
    }

    /// Insert the owner's reply, then classify its text like any other comment.
    async fn create_reply(&self, reply: ReplyPayload) -> Result<Outcome, ModerationError> {
        let store = self.replies.clone();
        let parent_id = reply.parent_id;

        let created = tokio::task::spawn_blocking(move || store.create_reply(&reply)).await??;

        let Some(comment) = created else {
            debug!("Auto-reply for comment {} skipped", parent_id);
            return Ok(Outcome::ReplySkipped);
        };
        info!("Auto-reply {} created under comment {}", comment.id, parent_id);

        match self
            .classify_and_suppress(ContentKind::Comment, comment.id, &comment.content)
            .await
        {
            Ok(Outcome::Suppressed) => Ok(Outcome::ReplySuppressed(comment.id)),
            Ok(_) => Ok(Outcome::ReplyCreated(comment.id)),
            Err(e) => {
                // The reply exists either way; a failed check leaves it visible
                warn!("Auto-reply {} was not classified: {}", comment.id, e);
                Ok(Outcome::ReplyCreated(comment.id))
            }
        }
    }

    /// Pull jobs until the queue closes. A failed job is logged and dropped;
    /// the content it concerned stays active.
    pub async fn run(self: Arc<Self>, jobs: JobReceiver, worker_id: usize) {
        debug!("Moderation worker {} started", worker_id);

        while let Some(job) = jobs.recv().await {
            let name = job.name();
            let subject = job.subject_id();

            match self.handle(job).await {
                Ok(outcome) => debug!("Worker {}: {} {} -> {:?}", worker_id, name, subject, outcome),
                Err(e) => warn!("Worker {}: {} job for {} failed: {}", worker_id, name, subject, e),
            }
        }

        debug!("Moderation worker {} stopped", worker_id);
    }

    /// Start `count` workers sharing one receiver.
    pub fn spawn_pool(self: Arc<Self>, jobs: JobReceiver, count: usize) -> Vec<JoinHandle<()>> {
        (0..count.max(1))
            .map(|worker_id| tokio::spawn(self.clone().run(jobs.clone(), worker_id)))
            .collect()
    }

    /// Process whatever is queued right now and return the outcomes in order.
    pub async fn drain(&self, jobs: &JobReceiver) -> Vec<Result<Outcome, ModerationError>> {
        let mut outcomes = Vec::new();
        while let Some(job) = jobs.try_recv().await {
            outcomes.push(self.handle(job).await);
        }
        outcomes
    }
}
