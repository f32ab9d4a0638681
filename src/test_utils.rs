//! Scripted collaborator stubs shared by unit and integration tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;

use crate::client::{BlueskyClient, FollowError, Session, UsernameScraper};
use crate::domain::models::CandidateAccount;
use crate::error::{AppError, Result};
use crate::event::AppEvent;

/// Shorthand candidate with only the fields the gate cares about.
pub fn candidate(handle: &str, did: &str) -> CandidateAccount {
    CandidateAccount {
        did: did.to_string(),
        handle: handle.to_string(),
        display_name: None,
        description: Some(format!("{} on Bluesky", handle)),
        avatar_url: None,
    }
}

/// Collect everything currently buffered on an event receiver.
pub fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<AppEvent>) -> Vec<AppEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Scripted `UsernameScraper`: fixed link -> screen-name table, with
/// optional init/per-link failures. Records every scrape call.
#[derive(Default)]
pub struct StubScraper {
    results: HashMap<String, Option<String>>,
    fail_links: HashSet<String>,
    fail_init: bool,
    call_log: Mutex<Vec<String>>,
}

impl StubScraper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(mut self, link: &str, username: Option<&str>) -> Self {
        self.results
            .insert(link.to_string(), username.map(str::to_string));
        self
    }

    pub fn failing_link(mut self, link: &str) -> Self {
        self.fail_links.insert(link.to_string());
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.call_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl UsernameScraper for StubScraper {
    async fn init(&self) -> Result<()> {
        if self.fail_init {
            return Err(AppError::ScraperInit("driver failed to start".into()));
        }
        Ok(())
    }

    async fn scrape_username(&self, profile_link: &str) -> Result<Option<String>> {
        self.call_log.lock().unwrap().push(profile_link.to_string());
        if self.fail_links.contains(profile_link) {
            return Err(AppError::Scrape(format!("navigation failed: {}", profile_link)));
        }
        Ok(self.results.get(profile_link).cloned().flatten())
    }
}

/// Scripted `BlueskyClient`: candidate table, per-DID follow scripts, and
/// shared call logs the tests inspect.
pub struct StubBluesky {
    candidates: HashMap<String, CandidateAccount>,
    fail_search: HashSet<String>,
    fail_auth: bool,
    followed: HashSet<String>,
    rate_limits: Mutex<HashMap<String, usize>>,
    fail_follow: HashSet<String>,
    follow_delays: HashMap<String, Duration>,
    pub auth_calls: Arc<AtomicUsize>,
    pub search_log: Arc<Mutex<Vec<String>>>,
    pub follow_calls: Arc<Mutex<Vec<(String, tokio::time::Instant)>>>,
}

impl StubBluesky {
    pub fn new() -> Self {
        Self {
            candidates: HashMap::new(),
            fail_search: HashSet::new(),
            fail_auth: false,
            followed: HashSet::new(),
            rate_limits: Mutex::new(HashMap::new()),
            fail_follow: HashSet::new(),
            follow_delays: HashMap::new(),
            auth_calls: Arc::new(AtomicUsize::new(0)),
            search_log: Arc::new(Mutex::new(Vec::new())),
            follow_calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_candidate(mut self, query: &str, candidate: CandidateAccount) -> Self {
        self.candidates.insert(query.to_string(), candidate);
        self
    }

    pub fn failing_search(mut self, query: &str) -> Self {
        self.fail_search.insert(query.to_string());
        self
    }

    pub fn failing_auth(mut self) -> Self {
        self.fail_auth = true;
        self
    }

    pub fn already_following(mut self, did: &str) -> Self {
        self.followed.insert(did.to_string());
        self
    }

    /// The first `n` follow attempts for `did` are rejected as rate limits.
    pub fn rate_limited_times(self, did: &str, n: usize) -> Self {
        self.rate_limits.lock().unwrap().insert(did.to_string(), n);
        self
    }

    /// Every follow attempt for `did` fails with a non-rate-limit error.
    pub fn failing_follow(mut self, did: &str) -> Self {
        self.fail_follow.insert(did.to_string());
        self
    }

    pub fn with_follow_delay(mut self, did: &str, delay: Duration) -> Self {
        self.follow_delays.insert(did.to_string(), delay);
        self
    }

    pub fn search_calls(&self) -> Vec<String> {
        self.search_log.lock().unwrap().clone()
    }
}

impl Default for StubBluesky {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlueskyClient for StubBluesky {
    async fn authenticate(&self, login: &str, _password: &str) -> Result<Session> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_auth {
            return Err(AppError::auth(format!("invalid login for {}", login)));
        }
        Ok(Session {
            did: "did:plc:self".into(),
            access_jwt: "stub-jwt".into(),
            authenticated_at: Utc::now(),
        })
    }

    async fn search_top_candidate(&self, query: &str) -> Result<Option<CandidateAccount>> {
        self.search_log.lock().unwrap().push(query.to_string());
        if self.fail_search.contains(query) {
            return Err(AppError::Search(format!("search failed for {}", query)));
        }
        Ok(self.candidates.get(query).cloned())
    }

    async fn create_follow(
        &self,
        _session: &Session,
        did: &str,
    ) -> std::result::Result<(), FollowError> {
        self.follow_calls
            .lock()
            .unwrap()
            .push((did.to_string(), tokio::time::Instant::now()));

        if let Some(delay) = self.follow_delays.get(did) {
            tokio::time::sleep(*delay).await;
        }
        if self.fail_follow.contains(did) {
            return Err(FollowError::Other(anyhow!("record rejected")));
        }

        let mut limits = self.rate_limits.lock().unwrap();
        if let Some(remaining) = limits.get_mut(did) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(FollowError::RateLimited);
            }
        }
        Ok(())
    }

    async fn list_followed(&self, _session: &Session) -> Result<HashSet<String>> {
        Ok(self.followed.clone())
    }
}
