//! Error types for the follow-migration pipeline.
//!
//! Two classes matter at runtime:
//! - fatal setup errors (`Feed`, `ScraperInit`, `Auth`) abort the whole run
//! - everything else is caught at item scope and converted into events

use thiserror::Error;

/// Domain-specific errors for pipeline operations.
#[derive(Debug, Error)]
pub enum AppError {
    /// The following export is missing, unreadable, or not valid JSON
    #[error("Feed error: {0}")]
    Feed(String),

    /// The scrape driver failed to start
    #[error("Scraper initialization failed: {0}")]
    ScraperInit(String),

    /// Bluesky login was rejected
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A single profile link could not be scraped
    #[error("Scrape error: {0}")]
    Scrape(String),

    /// A single actor search failed
    #[error("Search error: {0}")]
    Search(String),

    /// A follow attempt failed (non-rate-limit, or retries exhausted)
    #[error("Follow error: {0}")]
    Follow(String),

    /// Cache file could not be read or written
    #[error("Cache error: {0}")]
    Cache(String),

    /// Generic error with context
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Create a feed error
    pub fn feed(msg: impl Into<String>) -> Self {
        Self::Feed(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Create a cache error
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    /// Fatal errors halt the run; all others become status events.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Feed(_) | Self::ScraperInit(_) | Self::Auth(_)
        )
    }
}

/// Result type alias using AppError.
pub type Result<T> = std::result::Result<T, AppError>;
