use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::constants::SUBMISSION_TIMEOUT_SECS;
use crate::errors::{Result, CONTRACT_LIQ_TOO_LARGE, CONTRACT_LIQ_TOO_SMALL};
use crate::storage::AuctionEntry;

/// Work the bot intends to land on chain.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionKind {
    /// Fill a tracked auction
    Bid {
        filler: String,
        entry: AuctionEntry,
    },
    /// Restore a filler's positions after a win
    Unwind { filler: String, pool: String },
    /// Create a liquidation or bad debt auction
    AuctionCreation {
        pool: String,
        user: String,
        auction_type: u32,
        percent: u64,
        bid: Vec<String>,
        lot: Vec<String>,
    },
    /// Assign a defaulted user's debt to the backstop
    BadDebtTransfer { pool: String, user: String },
}

impl SubmissionKind {
    pub fn describe(&self) -> String {
        match self {
            SubmissionKind::Bid { filler, entry } => format!(
                "bid by {} on auction {} type {} in {}",
                filler, entry.user_id, entry.auction_type, entry.pool_id
            ),
            SubmissionKind::Unwind { filler, pool } => {
                format!("unwind of {} in {}", filler, pool)
            }
            SubmissionKind::AuctionCreation {
                pool,
                user,
                auction_type,
                percent,
                ..
            } => format!(
                "auction creation type {} for {} at {}% in {}",
                auction_type, user, percent, pool
            ),
            SubmissionKind::BadDebtTransfer { pool, user } => {
                format!("bad debt transfer for {} in {}", user, pool)
            }
        }
    }

    pub fn pool(&self) -> &str {
        match self {
            SubmissionKind::Bid { entry, .. } => &entry.pool_id,
            SubmissionKind::Unwind { pool, .. } => pool,
            SubmissionKind::AuctionCreation { pool, .. } => pool,
            SubmissionKind::BadDebtTransfer { pool, .. } => pool,
        }
    }
}

#[derive(Debug, Clone)]
struct Submission {
    kind: SubmissionKind,
    retries_remaining: u32,
    delay: Option<Duration>,
    seq: u64,
}

/// Executes submissions. The worker implements this against the chain; the
/// queue only owns retry bookkeeping.
#[async_trait]
pub trait SubmissionHandler: Send + Sync {
    /// Returns Ok(true) to acknowledge, Ok(false) for a retryable failure.
    /// A typed error either mutates the submission (known contract codes),
    /// retries (transient), or consumes it (data errors).
    async fn submit(&self, kind: &SubmissionKind) -> Result<bool>;

    async fn on_drop(&self, kind: &SubmissionKind, reason: &str);
}

/// A prioritized FIFO of submissions with retry-and-drop semantics. One
/// dispatcher per queue; the bot runs a work queue and a bid queue.
#[derive(Clone, Default)]
pub struct SubmissionQueue {
    inner: Arc<QueueInner>,
}

#[derive(Default)]
struct QueueInner {
    entries: Mutex<VecDeque<Submission>>,
    notify: Notify,
    next_seq: AtomicU64,
}

impl SubmissionQueue {
    pub fn new() -> Self {
        SubmissionQueue::default()
    }

    /// Enqueue a submission with a retry budget. A delay postpones the first
    /// attempt without blocking the dispatcher on other entries.
    pub fn add_submission(&self, kind: SubmissionKind, retries: u32, delay_ms: u64) {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
        let submission = Submission {
            kind,
            retries_remaining: retries.max(1),
            delay: (delay_ms > 0).then(|| Duration::from_millis(delay_ms)),
            seq,
        };
        self.inner.entries.lock().unwrap().push_back(submission);
        self.inner.notify.notify_one();
    }

    /// Whether an identical submission is already queued
    pub fn contains(&self, kind: &SubmissionKind) -> bool {
        self.inner
            .entries
            .lock()
            .unwrap()
            .iter()
            .any(|s| &s.kind == kind)
    }

    /// Whether work targeting the same (pool, user) is already queued
    pub fn contains_user_work(&self, pool: &str, user: &str) -> bool {
        self.inner.entries.lock().unwrap().iter().any(|s| match &s.kind {
            SubmissionKind::AuctionCreation {
                pool: queued_pool,
                user: queued_user,
                ..
            }
            | SubmissionKind::BadDebtTransfer {
                pool: queued_pool,
                user: queued_user,
            } => queued_pool == pool && queued_user == user,
            _ => false,
        })
    }

    /// Whether a bid for the same (pool, user, auction type) is already queued
    pub fn contains_auction(&self, entry: &AuctionEntry) -> bool {
        self.inner.entries.lock().unwrap().iter().any(|s| {
            matches!(&s.kind, SubmissionKind::Bid { entry: queued, .. }
                if queued.pool_id == entry.pool_id
                    && queued.user_id == entry.user_id
                    && queued.auction_type == entry.auction_type)
        })
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().unwrap().is_empty()
    }

    /// Process the head submission, if any. Returns false when the queue was
    /// empty.
    pub async fn process_once(&self, handler: &dyn SubmissionHandler) -> bool {
        let mut submission = {
            let mut entries = self.inner.entries.lock().unwrap();
            match entries.pop_front() {
                Some(submission) => submission,
                None => return false,
            }
        };
        if let Some(delay) = submission.delay.take() {
            tokio::time::sleep(delay).await;
        }

        let outcome = tokio::time::timeout(
            Duration::from_secs(SUBMISSION_TIMEOUT_SECS),
            handler.submit(&submission.kind),
        )
        .await;

        match outcome {
            Ok(Ok(true)) => {
                info!("submission acknowledged: {}", submission.kind.describe());
            }
            Ok(Ok(false)) => {
                self.retry_or_drop(submission, handler, "submission failed").await;
            }
            Ok(Err(error)) => match error.contract_code() {
                // the chain tells us which direction the percent missed in
                Some(CONTRACT_LIQ_TOO_SMALL) => {
                    nudge_percent(&mut submission.kind, 1);
                    self.retry_or_drop(submission, handler, "liquidation too small")
                        .await;
                }
                Some(CONTRACT_LIQ_TOO_LARGE) => {
                    nudge_percent(&mut submission.kind, -1);
                    self.retry_or_drop(submission, handler, "liquidation too large")
                        .await;
                }
                _ => {
                    if error.is_transient() {
                        self.retry_or_drop(submission, handler, &error.to_string())
                            .await;
                    } else {
                        // unrecoverable for this submission, consume it
                        warn!(
                            "dropping submission on data error: {}: {}",
                            submission.kind.describe(),
                            error
                        );
                        handler.on_drop(&submission.kind, &error.to_string()).await;
                    }
                }
            },
            Err(_) => {
                self.retry_or_drop(submission, handler, "submission timed out")
                    .await;
            }
        }
        true
    }

    /// Dispatcher loop: one submission at a time, in enqueue order.
    pub async fn run(&self, handler: &dyn SubmissionHandler) {
        loop {
            if !self.process_once(handler).await {
                self.inner.notify.notified().await;
            }
        }
    }

    async fn retry_or_drop(
        &self,
        mut submission: Submission,
        handler: &dyn SubmissionHandler,
        reason: &str,
    ) {
        submission.retries_remaining -= 1;
        if submission.retries_remaining > 0 {
            warn!(
                seq = submission.seq,
                retries_remaining = submission.retries_remaining,
                "retrying submission: {}: {}",
                submission.kind.describe(),
                reason
            );
            self.inner.entries.lock().unwrap().push_back(submission);
            self.inner.notify.notify_one();
        } else {
            warn!("dropping submission: {}", submission.kind.describe());
            handler.on_drop(&submission.kind, reason).await;
        }
    }
}

fn nudge_percent(kind: &mut SubmissionKind, step: i64) {
    if let SubmissionKind::AuctionCreation { percent, .. } = kind {
        *percent = (*percent as i64 + step).clamp(1, 100) as u64;
    }
}
