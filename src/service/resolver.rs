//! Identity resolution with read-through caching and the fuzzy acceptance
//! gate.
//!
//! Every collaborator failure here is converted into a status event and an
//! absent result; a single bad link or flaky search never aborts the run.

use std::sync::Arc;

use crate::client::{BlueskyClient, UsernameScraper};
use crate::domain::models::{CandidateAccount, Severity};
use crate::event::EventSender;
use crate::repository::MappingCache;

/// Handles on this suffix are platform-assigned; anything else is a custom
/// domain the user picked themselves.
pub const DEFAULT_HANDLE_SUFFIX: &str = ".bsky.social";

/// Acceptance threshold when the handle sits on the default subdomain.
pub const DEFAULT_DOMAIN_THRESHOLD: u32 = 75;

/// Custom domains get a lower bar: users choose arbitrary handles there.
pub const CUSTOM_DOMAIN_THRESHOLD: u32 = 55;

/// Edit-distance similarity scaled to 0-100, case-insensitive.
pub fn similarity_ratio(a: &str, b: &str) -> u32 {
    let ratio = strsim::normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase());
    (ratio * 100.0).round() as u32
}

/// The fuzzy-match acceptance gate: is this candidate the same person?
pub fn gate_accepts(raw_username: &str, handle: &str) -> bool {
    if handle == raw_username {
        return true;
    }
    let (normalized, threshold) = match handle.strip_suffix(DEFAULT_HANDLE_SUFFIX) {
        Some(stem) => (stem, DEFAULT_DOMAIN_THRESHOLD),
        None => (handle, CUSTOM_DOMAIN_THRESHOLD),
    };
    similarity_ratio(raw_username, normalized) >= threshold
}

pub struct IdentityResolver {
    cache: Arc<MappingCache>,
    scraper: Arc<dyn UsernameScraper>,
    client: Arc<dyn BlueskyClient>,
    events: EventSender,
}

impl IdentityResolver {
    pub fn new(
        cache: Arc<MappingCache>,
        scraper: Arc<dyn UsernameScraper>,
        client: Arc<dyn BlueskyClient>,
        events: EventSender,
    ) -> Self {
        Self {
            cache,
            scraper,
            client,
            events,
        }
    }

    /// Profile link -> screen name, scraping at most once per link.
    /// A successful scrape is cached even when it yields nothing, so
    /// permanently-unresolvable links are never re-driven.
    pub async fn resolve_from_source(&self, profile_link: &str) -> Option<String> {
        if let Some(cached) = self.cache.get_source_link(profile_link).await {
            tracing::debug!("[SCRAPE] cache hit for {}", profile_link);
            return cached;
        }

        match self.scraper.scrape_username(profile_link).await {
            Ok(username) => {
                if let Err(e) = self
                    .cache
                    .put_source_link(profile_link, username.clone())
                    .await
                {
                    tracing::warn!("[SCRAPE] cache write failed: {}", e);
                }
                username
            }
            Err(e) => {
                tracing::warn!("[SCRAPE] {} failed: {}", profile_link, e);
                self.events.status(
                    format!("Error fetching Twitter username: {}", e),
                    Severity::Error,
                );
                None
            }
        }
    }

    /// Screen name -> accepted Bluesky candidate, searching at most once
    /// per name. Gate rejections and empty searches are cached as explicit
    /// no-match markers.
    pub async fn resolve_target(&self, raw_username: &str) -> Option<CandidateAccount> {
        if let Some(cached) = self.cache.get_resolution(raw_username).await {
            tracing::debug!("[RESOLVE] cache hit for {}", raw_username);
            return cached;
        }

        let candidate = match self.client.search_top_candidate(raw_username).await {
            Ok(candidate) => candidate,
            Err(e) => {
                tracing::warn!("[RESOLVE] search for {} failed: {}", raw_username, e);
                self.events.status(
                    format!("Error fetching Bluesky info for {}: {}", raw_username, e),
                    Severity::Error,
                );
                // transport errors are not cached; the name can be retried
                // in a later run
                return None;
            }
        };

        let accepted = candidate.filter(|c| {
            let ok = gate_accepts(raw_username, &c.handle);
            if !ok {
                tracing::info!(
                    "[RESOLVE] rejected {} for {} (below threshold)",
                    c.handle,
                    raw_username
                );
            }
            ok
        });

        if let Err(e) = self
            .cache
            .put_resolution(raw_username, accepted.clone())
            .await
        {
            tracing::warn!("[RESOLVE] cache write failed: {}", e);
        }
        accepted
    }

    /// Fast-path probe for the scrape phase.
    pub async fn has_cached_resolution(&self, raw_username: &str) -> bool {
        self.cache.has_resolution(raw_username).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Severity;
    use crate::event::{AppEvent, EventSender};
    use crate::test_utils::{candidate, drain, StubBluesky, StubScraper};

    // Strings with an exact edit-distance ratio: raw is n copies of 'a',
    // the comparison string flips k of them, giving ratio 100 - k for n=100.
    fn flipped(k: usize) -> String {
        format!("{}{}", "a".repeat(100 - k), "b".repeat(k))
    }

    #[test]
    fn ratio_is_exact_on_constructed_strings() {
        let raw = "a".repeat(100);
        assert_eq!(similarity_ratio(&raw, &flipped(25)), 75);
        assert_eq!(similarity_ratio(&raw, &flipped(45)), 55);
        assert_eq!(similarity_ratio("alice", "alice"), 100);
    }

    #[test]
    fn default_domain_threshold_is_75() {
        let raw = "a".repeat(100);
        let handle = |k: usize| format!("{}{}", flipped(k), DEFAULT_HANDLE_SUFFIX);
        assert!(!gate_accepts(&raw, &handle(26))); // ratio 74
        assert!(gate_accepts(&raw, &handle(25))); // ratio 75
        assert!(gate_accepts(&raw, &handle(24))); // ratio 76
    }

    #[test]
    fn custom_domain_threshold_is_55() {
        let raw = "a".repeat(100);
        // no .bsky.social suffix => the full handle is compared
        assert!(!gate_accepts(&raw, &flipped(46))); // ratio 54
        assert!(gate_accepts(&raw, &flipped(45))); // ratio 55
        assert!(gate_accepts(&raw, &flipped(44))); // ratio 56
        // ratio 74 would fail the default bar but passes the custom one
        assert!(gate_accepts(&raw, &flipped(26)));
    }

    #[test]
    fn default_subdomain_is_stripped_before_comparing() {
        // "alice" vs stem "alice" is an exact match
        assert!(gate_accepts("alice", "alice.bsky.social"));
        // "carol" vs stem "carol2024" is below 75
        assert!(!gate_accepts("carol", "carol2024.bsky.social"));
    }

    async fn resolver_with(
        scraper: StubScraper,
        client: StubBluesky,
    ) -> (
        IdentityResolver,
        Arc<StubScraper>,
        Arc<StubBluesky>,
        tokio::sync::mpsc::UnboundedReceiver<AppEvent>,
        tempfile::TempDir,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let (cache, _) = MappingCache::open(dir.path()).await.unwrap();
        let scraper = Arc::new(scraper);
        let client = Arc::new(client);
        let (events, rx) = EventSender::channel();
        let resolver = IdentityResolver::new(
            Arc::new(cache),
            scraper.clone(),
            client.clone(),
            events,
        );
        (resolver, scraper, client, rx, dir)
    }

    #[tokio::test]
    async fn repeated_links_scrape_at_most_once() {
        let (resolver, scraper, _, _rx, _dir) = resolver_with(
            StubScraper::new().with_result("https://t.co/1", Some("alice")),
            StubBluesky::new(),
        )
        .await;

        assert_eq!(
            resolver.resolve_from_source("https://t.co/1").await,
            Some("alice".into())
        );
        assert_eq!(
            resolver.resolve_from_source("https://t.co/1").await,
            Some("alice".into())
        );
        assert_eq!(scraper.calls(), vec!["https://t.co/1".to_string()]);
    }

    #[tokio::test]
    async fn empty_scrape_results_are_cached() {
        let (resolver, scraper, _, _rx, _dir) = resolver_with(
            StubScraper::new().with_result("https://t.co/dead", None),
            StubBluesky::new(),
        )
        .await;

        assert_eq!(resolver.resolve_from_source("https://t.co/dead").await, None);
        assert_eq!(resolver.resolve_from_source("https://t.co/dead").await, None);
        assert_eq!(scraper.calls().len(), 1);
    }

    #[tokio::test]
    async fn scrape_failure_emits_status_and_is_not_cached() {
        let (resolver, scraper, _, mut rx, _dir) = resolver_with(
            StubScraper::new().failing_link("https://t.co/flaky"),
            StubBluesky::new(),
        )
        .await;

        assert_eq!(resolver.resolve_from_source("https://t.co/flaky").await, None);
        assert_eq!(resolver.resolve_from_source("https://t.co/flaky").await, None);
        // the transport error is retried, not cached
        assert_eq!(scraper.calls().len(), 2);

        let events = drain(&mut rx);
        assert!(events.iter().all(|e| matches!(
            e,
            AppEvent::Status {
                severity: Severity::Error,
                ..
            }
        )));
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn accepted_and_rejected_searches_are_both_cached() {
        let (resolver, _, client, _rx, _dir) = resolver_with(
            StubScraper::new(),
            StubBluesky::new()
                .with_candidate("alice", candidate("alice.bsky.social", "did:plc:1"))
                .with_candidate("carol", candidate("carol2024.bsky.social", "did:plc:2")),
        )
        .await;

        // accepted
        let hit = resolver.resolve_target("alice").await.unwrap();
        assert_eq!(hit.did, "did:plc:1");
        resolver.resolve_target("alice").await.unwrap();

        // rejected by the gate, cached as no-match
        assert_eq!(resolver.resolve_target("carol").await, None);
        assert_eq!(resolver.resolve_target("carol").await, None);
        assert!(resolver.has_cached_resolution("carol").await);

        // no repeat searches for either name
        assert_eq!(
            client.search_calls(),
            vec!["alice".to_string(), "carol".to_string()]
        );
    }

    #[tokio::test]
    async fn search_failure_emits_status_and_returns_absent() {
        let (resolver, _, _, mut rx, _dir) = resolver_with(
            StubScraper::new(),
            StubBluesky::new().failing_search("alice"),
        )
        .await;

        assert_eq!(resolver.resolve_target("alice").await, None);
        assert!(!resolver.has_cached_resolution("alice").await);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            AppEvent::Status {
                severity: Severity::Error,
                ..
            }
        ));
    }
}
