//! Two-phase mapping pipeline: scrape, then resolve.
//!
//! The scrape phase drives the browser collaborator over the export in
//! input order and emits a row per usable entry immediately; names with a
//! cached resolution short-circuit to a full row, everything else gets a
//! placeholder. The resolve phase then authenticates once and fills the
//! placeholders in first-observed order. Scraping and resolving have
//! different failure domains and cost profiles, which is why they never
//! interleave.

use std::path::PathBuf;
use std::sync::Arc;

use crate::client::{BlueskyClient, SessionManager, UsernameScraper};
use crate::domain::models::{ProgressStage, UserMapping};
use crate::error::{AppError, Result};
use crate::event::{AppEvent, EventSender};
use crate::feed::{self, FollowingEntry};
use crate::repository::MappingCache;
use crate::service::reporter::ProgressReporter;
use crate::service::resolver::IdentityResolver;

pub struct MappingPipeline {
    feed_path: PathBuf,
    resolver: IdentityResolver,
    cache: Arc<MappingCache>,
    scraper: Arc<dyn UsernameScraper>,
    session: Arc<SessionManager>,
    reporter: Arc<ProgressReporter>,
    events: EventSender,
}

impl MappingPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        feed_path: PathBuf,
        cache: Arc<MappingCache>,
        scraper: Arc<dyn UsernameScraper>,
        client: Arc<dyn BlueskyClient>,
        session: Arc<SessionManager>,
        reporter: Arc<ProgressReporter>,
        events: EventSender,
    ) -> Self {
        let resolver = IdentityResolver::new(
            cache.clone(),
            scraper.clone(),
            client,
            events.clone(),
        );
        Self {
            feed_path,
            resolver,
            cache,
            scraper,
            session,
            reporter,
            events,
        }
    }

    /// Full run. Fatal setup errors emit a `Fatal` event and stop;
    /// completion emits `Completed` unconditionally. The session is closed
    /// on every exit path.
    pub async fn run(&self) -> Result<()> {
        let result = self.run_inner().await;
        self.session.close().await;
        match result {
            Ok(()) => {
                tracing::info!("[PIPELINE] run complete");
                self.events.send(AppEvent::Completed);
                Ok(())
            }
            Err(e) => {
                tracing::error!("[PIPELINE] fatal: {}", e);
                self.events.fatal(e.to_string());
                Err(e)
            }
        }
    }

    async fn run_inner(&self) -> Result<()> {
        let entries = feed::load_entries(&self.feed_path).await?;
        self.scraper
            .init()
            .await
            .map_err(|e| AppError::ScraperInit(e.to_string()))?;

        let pending = self.scrape_phase(&entries).await;
        self.resolve_phase(pending).await
    }

    /// Phase 1: input order, one progress tick per entry regardless of
    /// outcome. Returns the raw usernames still needing resolution.
    async fn scrape_phase(&self, entries: &[FollowingEntry]) -> Vec<String> {
        let total = entries.len();
        tracing::info!("[SCRAPE] starting over {} entries", total);
        self.reporter.reset(ProgressStage::Scrape, total);

        let mut pending: Vec<String> = Vec::new();
        for (idx, entry) in entries.iter().enumerate() {
            self.process_entry(entry, &mut pending).await;
            self.reporter.update(ProgressStage::Scrape, idx + 1, total);
        }

        tracing::info!(
            "[SCRAPE] done, {} usernames need resolution",
            pending.len()
        );
        pending
    }

    async fn process_entry(&self, entry: &FollowingEntry, pending: &mut Vec<String>) {
        let Some(link) = entry.user_link() else {
            return;
        };
        let Some(raw) = self.resolver.resolve_from_source(link).await else {
            return;
        };

        match self.cache.get_resolution(&raw).await {
            // fast path: a cached resolution yields a full row immediately
            Some(Some(candidate)) => {
                self.events
                    .send(AppEvent::MappingAdded(UserMapping::resolved(&raw, &candidate)));
            }
            // cached no-match marker: advisory row, nothing to resolve
            Some(None) => {
                self.events
                    .send(AppEvent::MappingAdded(UserMapping::pending(&raw)));
            }
            // slow path: placeholder row now, resolution in phase 2
            None => {
                self.events
                    .send(AppEvent::MappingAdded(UserMapping::pending(&raw)));
                if !pending.iter().any(|p| p == &raw) {
                    pending.push(raw);
                }
            }
        }
    }

    /// Phase 2: authenticate once (fatal on failure), then fill
    /// placeholders in first-observed order.
    async fn resolve_phase(&self, pending: Vec<String>) -> Result<()> {
        self.session.get().await?;

        let total = pending.len();
        tracing::info!("[RESOLVE] starting over {} usernames", total);
        self.reporter.reset(ProgressStage::Resolve, total);

        for (idx, raw) in pending.iter().enumerate() {
            let mapping = match self.resolver.resolve_target(raw).await {
                Some(candidate) => UserMapping::resolved(raw, &candidate),
                None => UserMapping::pending(raw),
            };
            self.events.send(AppEvent::MappingResolved(mapping));
            self.reporter.update(ProgressStage::Resolve, idx + 1, total);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventSender;
    use crate::test_utils::{candidate, drain, StubBluesky, StubScraper};
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Harness {
        pipeline: MappingPipeline,
        rx: UnboundedReceiver<AppEvent>,
        _dir: tempfile::TempDir,
    }

    async fn harness(feed_body: Option<&str>, scraper: StubScraper, client: StubBluesky) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let feed_path = dir.path().join("following.json");
        if let Some(body) = feed_body {
            std::fs::write(&feed_path, body).unwrap();
        }

        let (cache, _) = MappingCache::open(&dir.path().join("cache")).await.unwrap();
        let cache = Arc::new(cache);
        let client: Arc<StubBluesky> = Arc::new(client);
        let (events, rx) = EventSender::channel();
        let session = Arc::new(SessionManager::new(client.clone(), "user", "pass"));
        let reporter = Arc::new(ProgressReporter::new(events.clone()));

        let pipeline = MappingPipeline::new(
            feed_path,
            cache,
            Arc::new(scraper),
            client,
            session,
            reporter,
            events,
        );
        Harness {
            pipeline,
            rx,
            _dir: dir,
        }
    }

    fn entry(link: &str) -> String {
        format!(r#"{{"following": {{"accountId": "0", "userLink": "{}"}}}}"#, link)
    }

    #[tokio::test]
    async fn feed_failure_halts_before_any_progress() {
        let mut h = harness(None, StubScraper::new(), StubBluesky::new()).await;

        let err = h.pipeline.run().await.unwrap_err();
        assert!(err.is_fatal());

        let events = drain(&mut h.rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], AppEvent::Fatal { .. }));
    }

    #[tokio::test]
    async fn scraper_init_failure_is_fatal() {
        let feed = format!("[{}]", entry("https://t.co/1"));
        let mut h = harness(
            Some(&feed),
            StubScraper::new().failing_init(),
            StubBluesky::new(),
        )
        .await;

        assert!(h.pipeline.run().await.is_err());
        let events = drain(&mut h.rx);
        assert!(matches!(events.last(), Some(AppEvent::Fatal { .. })));
        assert!(!events
            .iter()
            .any(|e| matches!(e, AppEvent::Progress { .. })));
    }

    #[tokio::test]
    async fn auth_failure_is_fatal_after_scrape_progress() {
        let feed = format!("[{}]", entry("https://t.co/1"));
        let mut h = harness(
            Some(&feed),
            StubScraper::new().with_result("https://t.co/1", Some("alice")),
            StubBluesky::new().failing_auth(),
        )
        .await;

        assert!(h.pipeline.run().await.is_err());
        let events = drain(&mut h.rx);
        // scrape progress happened, then the distinct fatal signal
        assert!(events
            .iter()
            .any(|e| matches!(e, AppEvent::Progress { stage: ProgressStage::Scrape, .. })));
        assert!(matches!(events.last(), Some(AppEvent::Fatal { .. })));
        assert!(!events.iter().any(|e| matches!(e, AppEvent::Completed)));
    }

    #[tokio::test]
    async fn bad_link_is_skipped_and_the_run_continues() {
        let feed = format!(
            "[{},{}]",
            entry("https://t.co/flaky"),
            entry("https://t.co/ok")
        );
        let mut h = harness(
            Some(&feed),
            StubScraper::new()
                .failing_link("https://t.co/flaky")
                .with_result("https://t.co/ok", Some("bob")),
            StubBluesky::new()
                .with_candidate("bob", candidate("bob.bsky.social", "did:plc:b")),
        )
        .await;

        h.pipeline.run().await.unwrap();
        let events = drain(&mut h.rx);

        // an error status for the flaky link, but progress reaches 2/2
        assert!(events
            .iter()
            .any(|e| matches!(e, AppEvent::Status { .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            AppEvent::Progress {
                stage: ProgressStage::Scrape,
                current: 2,
                total: 2
            }
        )));
        assert!(matches!(events.last(), Some(AppEvent::Completed)));
    }

    #[tokio::test]
    async fn placeholder_row_is_overwritten_by_the_resolve_phase() {
        let feed = format!("[{}]", entry("https://t.co/1"));
        let mut h = harness(
            Some(&feed),
            StubScraper::new().with_result("https://t.co/1", Some("alice")),
            StubBluesky::new()
                .with_candidate("alice", candidate("alice.bsky.social", "did:plc:1")),
        )
        .await;

        h.pipeline.run().await.unwrap();
        let events = drain(&mut h.rx);

        let added: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                AppEvent::MappingAdded(m) => Some(m),
                _ => None,
            })
            .collect();
        assert_eq!(added.len(), 1);
        assert!(!added[0].is_resolved());

        let resolved: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                AppEvent::MappingResolved(m) => Some(m),
                _ => None,
            })
            .collect();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].bluesky_handle, "alice.bsky.social");
        assert_eq!(resolved[0].did, "did:plc:1");
    }

    #[tokio::test]
    async fn duplicate_usernames_resolve_once() {
        // two export entries pointing at the same account
        let feed = format!(
            "[{},{}]",
            entry("https://t.co/1"),
            entry("https://t.co/2")
        );
        let mut h = harness(
            Some(&feed),
            StubScraper::new()
                .with_result("https://t.co/1", Some("alice"))
                .with_result("https://t.co/2", Some("alice")),
            StubBluesky::new()
                .with_candidate("alice", candidate("alice.bsky.social", "did:plc:1")),
        )
        .await;

        h.pipeline.run().await.unwrap();
        let events = drain(&mut h.rx);

        let resolve_total = events.iter().find_map(|e| match e {
            AppEvent::Progress {
                stage: ProgressStage::Resolve,
                total,
                ..
            } => Some(*total),
            _ => None,
        });
        assert_eq!(resolve_total, Some(1));
    }
}
