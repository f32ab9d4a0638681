//! Application settings loaded from environment variables.

use std::env;
use std::path::PathBuf;

use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct Settings {
    pub bluesky_login: String,
    pub bluesky_password: String,
    /// Directory holding `twitter_cache.json` / `bluesky_cache.json`.
    pub cache_dir: PathBuf,
    /// Directory holding the Twitter export (`following.js` or `following.json`).
    pub data_dir: PathBuf,
}

impl Settings {
    /// Load settings from the environment. Credentials are required;
    /// directories fall back to `cache/` and `data/` in the working dir.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bluesky_login: required_env("BLUESKY_LOGIN")?,
            bluesky_password: required_env("BLUESKY_PASSWORD")?,
            cache_dir: env::var("SKYBRIDGE_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("cache")),
            data_dir: env::var("SKYBRIDGE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
        })
    }
}

fn required_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| AppError::auth(format!("{} must be set", name)))
}
