//! Loading the Twitter "following" export.
//!
//! The export ships as `following.js`, a JSON array behind a JavaScript
//! assignment (`window.YTD.following.part0 = [...]`). Some users convert it
//! to `following.json` by hand; both forms are accepted.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{AppError, Result};

const JS_WRAPPER_PREFIX: &str = "window.YTD.following.part0 = ";

/// One entry in the export. Only the profile link is consumed; entries
/// without one are skipped by the pipeline, not errors.
#[derive(Debug, Clone, Deserialize)]
pub struct FollowingEntry {
    pub following: Option<FollowingRecord>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowingRecord {
    pub account_id: Option<String>,
    pub user_link: Option<String>,
}

impl FollowingEntry {
    pub fn user_link(&self) -> Option<&str> {
        self.following.as_ref()?.user_link.as_deref()
    }
}

/// Strip the JavaScript assignment wrapper if present.
pub fn strip_js_wrapper(text: &str) -> &str {
    text.trim()
        .strip_prefix(JS_WRAPPER_PREFIX)
        .unwrap_or_else(|| text.trim())
}

/// Find the export inside `data_dir`, preferring the converted JSON.
pub fn locate_export(data_dir: &Path) -> Result<PathBuf> {
    let json = data_dir.join("following.json");
    if json.exists() {
        return Ok(json);
    }
    let js = data_dir.join("following.js");
    if js.exists() {
        return Ok(js);
    }
    Err(AppError::feed(format!(
        "no following.js or following.json in {}; copy it from your Twitter data export",
        data_dir.display()
    )))
}

/// Load the ordered entry list. Missing file or invalid JSON is fatal.
pub async fn load_entries(path: &Path) -> Result<Vec<FollowingEntry>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AppError::feed(format!("cannot read {}: {}", path.display(), e)))?;
    let entries = serde_json::from_str(strip_js_wrapper(&text))
        .map_err(|e| AppError::feed(format!("invalid export {}: {}", path.display(), e)))?;
    Ok(entries)
}
