//! Collaborator seams: the browser-driven username scraper and the Bluesky
//! API client live behind traits so the core never touches a driver or an
//! HTTP transport directly.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::domain::models::CandidateAccount;
use crate::error::{AppError, Result};

/// Scrapes a Twitter profile link down to a screen name.
/// `scrape_username` may block for seconds while the page settles.
#[async_trait]
pub trait UsernameScraper: Send + Sync {
    /// Driver startup. An error here is fatal to the run.
    async fn init(&self) -> Result<()>;

    /// `Ok(None)` means the page loaded but exposed no screen name.
    async fn scrape_username(&self, profile_link: &str) -> Result<Option<String>>;
}

/// Follow-creation failure classification. Rate limits trigger backoff;
/// anything else fails the item immediately.
#[derive(Debug, Error)]
pub enum FollowError {
    #[error("rate limited")]
    RateLimited,
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Authenticated-session token handed back by `authenticate`.
#[derive(Debug, Clone)]
pub struct Session {
    /// DID of the signed-in repo (the account follows are written to).
    pub did: String,
    pub access_jwt: String,
    pub authenticated_at: DateTime<Utc>,
}

#[async_trait]
pub trait BlueskyClient: Send + Sync {
    async fn authenticate(&self, login: &str, password: &str) -> Result<Session>;

    /// Top actor-search result for a query, if any.
    async fn search_top_candidate(&self, query: &str) -> Result<Option<CandidateAccount>>;

    async fn create_follow(
        &self,
        session: &Session,
        did: &str,
    ) -> std::result::Result<(), FollowError>;

    async fn list_followed(&self, session: &Session) -> Result<HashSet<String>>;
}

/// Single shared session handle: lazily created, reused, recreated after
/// `invalidate`, and explicitly cleared on every pipeline exit path.
pub struct SessionManager {
    client: Arc<dyn BlueskyClient>,
    login: String,
    password: String,
    slot: Mutex<Option<Session>>,
}

impl SessionManager {
    pub fn new(client: Arc<dyn BlueskyClient>, login: &str, password: &str) -> Self {
        Self {
            client,
            login: login.to_string(),
            password: password.to_string(),
            slot: Mutex::new(None),
        }
    }

    /// Current session, authenticating on first use. Login rejection is
    /// surfaced as a fatal `Auth` error.
    pub async fn get(&self) -> Result<Session> {
        let mut slot = self.slot.lock().await;
        if let Some(session) = slot.as_ref() {
            return Ok(session.clone());
        }

        let session = self
            .client
            .authenticate(&self.login, &self.password)
            .await
            .map_err(|e| AppError::auth(e.to_string()))?;
        tracing::info!("[SESSION] authenticated as {}", session.did);
        *slot = Some(session.clone());
        Ok(session)
    }

    /// Drop the cached session; the next `get` re-authenticates.
    pub async fn invalidate(&self) {
        self.slot.lock().await.take();
    }

    /// Teardown at pipeline completion or fatal error.
    pub async fn close(&self) {
        if self.slot.lock().await.take().is_some() {
            tracing::info!("[SESSION] closed");
        }
    }
}
