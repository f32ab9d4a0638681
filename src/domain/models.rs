//! Domain entities shared across the pipeline.

use serde::{Deserialize, Serialize};

// ====== Enums ======

/// Per-mapping follow state machine:
/// `Unfollowed -> Following -> Followed` or `Unfollowed -> Following -> Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FollowState {
    Unfollowed,
    Following,
    Followed,
    Failed,
}

impl FollowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FollowState::Unfollowed => "unfollowed",
            FollowState::Following => "following",
            FollowState::Followed => "followed",
            FollowState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProgressStage {
    Scrape,
    Resolve,
    Follow,
}

impl ProgressStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStage::Scrape => "scrape",
            ProgressStage::Resolve => "resolve",
            ProgressStage::Follow => "follow",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Info,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Error => "error",
        }
    }
}

// ====== Entities ======

/// Top actor-search result from Bluesky. Not yet a confirmed mapping;
/// the fuzzy gate decides whether it is the same person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateAccount {
    pub did: String,
    pub handle: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
}

/// A row in the mapping table. Empty `bluesky_handle`/`did` means the
/// entry is still pending resolution or resolved to no match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserMapping {
    pub twitter_username: String,
    pub bluesky_handle: String,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
    pub did: String,
}

impl UserMapping {
    /// Placeholder (or advisory no-match) mapping with empty target fields.
    pub fn pending(twitter_username: impl Into<String>) -> Self {
        Self {
            twitter_username: twitter_username.into(),
            bluesky_handle: String::new(),
            description: None,
            avatar_url: None,
            did: String::new(),
        }
    }

    /// Fully-populated mapping from an accepted candidate.
    pub fn resolved(twitter_username: impl Into<String>, candidate: &CandidateAccount) -> Self {
        Self {
            twitter_username: twitter_username.into(),
            bluesky_handle: candidate.handle.clone(),
            description: candidate.description.clone(),
            avatar_url: candidate.avatar_url.clone(),
            did: candidate.did.clone(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        !self.did.is_empty() && !self.bluesky_handle.is_empty()
    }
}

/// Latest (current, total) for one pipeline stage.
/// `total == 0` means indeterminate, not "zero work".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressCounters {
    pub current: usize,
    pub total: usize,
}

impl ProgressCounters {
    pub fn is_indeterminate(&self) -> bool {
        self.total == 0
    }
}
