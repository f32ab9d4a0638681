//! Serial follow-execution queue.
//!
//! Requests are processed strictly FIFO, one at a time: firing follows
//! concurrently trips the platform rate limit faster than backoff can
//! recover from. Rate-limit failures retry with doubling delays under a
//! fixed attempt cap; anything else fails the item and leaves it
//! retryable by the user.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::mpsc;

use crate::client::{BlueskyClient, FollowError, SessionManager};
use crate::domain::models::{FollowState, ProgressStage, Severity, UserMapping};
use crate::error::AppError;
use crate::event::{AppEvent, EventSender};
use crate::service::reporter::ProgressReporter;
use crate::service::resolver::{similarity_ratio, DEFAULT_HANDLE_SUFFIX};

pub const MAX_FOLLOW_ATTEMPTS: u32 = 5;
const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Similarity at or above this selects a mapping for following by default.
pub const DEFAULT_SELECT_THRESHOLD: u32 = 95;

/// One user-selected mapping to follow. `row` is the opaque UI handle
/// echoed back on every state event.
#[derive(Debug, Clone)]
pub struct FollowRequest {
    pub did: String,
    pub row: u64,
}

/// Sending half handed to the presentation layer.
#[derive(Debug, Clone)]
pub struct FollowHandle {
    tx: mpsc::UnboundedSender<FollowRequest>,
}

impl FollowHandle {
    pub fn enqueue(&self, did: impl Into<String>, row: u64) {
        let request = FollowRequest {
            did: did.into(),
            row,
        };
        if self.tx.send(request).is_err() {
            tracing::warn!("[FOLLOW] executor stopped, request discarded");
        }
    }
}

pub struct FollowExecutor {
    client: Arc<dyn BlueskyClient>,
    session: Arc<SessionManager>,
    events: EventSender,
    reporter: Arc<ProgressReporter>,
    rx: mpsc::UnboundedReceiver<FollowRequest>,
    /// DIDs already followed: seeded by `load_followed`, grown only here.
    followed: HashSet<String>,
    processed: usize,
}

impl FollowExecutor {
    pub fn new(
        client: Arc<dyn BlueskyClient>,
        session: Arc<SessionManager>,
        events: EventSender,
        reporter: Arc<ProgressReporter>,
    ) -> (Self, FollowHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                client,
                session,
                events,
                reporter,
                rx,
                followed: HashSet::new(),
                processed: 0,
            },
            FollowHandle { tx },
        )
    }

    /// Seed the followed set from the account's existing follow records.
    /// Failure is non-fatal: the run continues with an empty set.
    pub async fn load_followed(&mut self) {
        let result = match self.session.get().await {
            Ok(session) => self.client.list_followed(&session).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(set) => {
                tracing::info!("[FOLLOW] {} accounts already followed", set.len());
                self.followed = set;
            }
            Err(e) => {
                tracing::warn!("[FOLLOW] could not list followed accounts: {}", e);
                self.events.status(
                    format!("Error retrieving followed users: {}", e),
                    Severity::Error,
                );
            }
        }
    }

    pub fn is_followed(&self, did: &str) -> bool {
        self.followed.contains(did)
    }

    /// Snapshot for the UI's default-selection pass at pipeline start.
    pub fn followed_snapshot(&self) -> HashSet<String> {
        self.followed.clone()
    }

    /// Default-selection heuristic: already followed, or the handle is a
    /// near-exact match for the source username.
    pub fn default_selected(&self, mapping: &UserMapping) -> bool {
        if !mapping.is_resolved() {
            return false;
        }
        if self.followed.contains(&mapping.did) {
            return true;
        }
        let stem = mapping
            .bluesky_handle
            .strip_suffix(DEFAULT_HANDLE_SUFFIX)
            .unwrap_or(&mapping.bluesky_handle);
        similarity_ratio(&mapping.twitter_username, stem) >= DEFAULT_SELECT_THRESHOLD
    }

    /// Drain the queue until every handle is dropped. A later-enqueued
    /// request never starts before an earlier one finishes or fails.
    pub async fn run(mut self) {
        while let Some(request) = self.rx.recv().await {
            self.process_request(request).await;
            self.processed += 1;
            // total stays 0: the queue is open-ended
            self.reporter
                .update(ProgressStage::Follow, self.processed, 0);
        }
        tracing::info!("[FOLLOW] queue closed after {} requests", self.processed);
    }

    async fn process_request(&mut self, request: FollowRequest) {
        // idempotency guard: never re-follow
        if self.followed.contains(&request.did) {
            self.emit_state(&request, FollowState::Followed);
            return;
        }

        self.emit_state(&request, FollowState::Following);
        match self.try_follow(&request.did).await {
            Ok(()) => {
                self.followed.insert(request.did.clone());
                self.emit_state(&request, FollowState::Followed);
            }
            Err(e) => {
                tracing::warn!("[FOLLOW] {} failed: {}", request.did, e);
                self.emit_state(&request, FollowState::Failed);
                self.events
                    .status(format!("Error following user: {}", e), Severity::Error);
            }
        }
    }

    async fn try_follow(&self, did: &str) -> Result<(), AppError> {
        let mut delay = INITIAL_RETRY_DELAY;
        for attempt in 1..=MAX_FOLLOW_ATTEMPTS {
            let session = self.session.get().await?;
            match self.client.create_follow(&session, did).await {
                Ok(()) => return Ok(()),
                Err(FollowError::RateLimited) if attempt < MAX_FOLLOW_ATTEMPTS => {
                    tracing::info!(
                        "[FOLLOW] rate limited, retrying ({}/{}) in {:?}",
                        attempt,
                        MAX_FOLLOW_ATTEMPTS,
                        delay
                    );
                    self.events.status(
                        format!("Rate limited, retrying ({}/{})", attempt, MAX_FOLLOW_ATTEMPTS),
                        Severity::Info,
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(FollowError::RateLimited) => {
                    return Err(AppError::Follow(format!(
                        "rate limited after {} attempts",
                        MAX_FOLLOW_ATTEMPTS
                    )));
                }
                Err(FollowError::Other(e)) => {
                    return Err(AppError::Follow(e.to_string()));
                }
            }
        }
        Err(AppError::Other(anyhow!("follow attempt loop exhausted")))
    }

    fn emit_state(&self, request: &FollowRequest, state: FollowState) {
        self.events.send(AppEvent::FollowProgress {
            row: request.row,
            did: request.did.clone(),
            state,
        });
    }
}
