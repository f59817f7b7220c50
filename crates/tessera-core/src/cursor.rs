//! Opaque Pagination Cursors
//!
//! Partition scans and index queries page through large result sets with an
//! opaque cursor: URL-safe base64 over a small JSON object carrying the last
//! seen `added_id` or `created_at`. Clients treat the token as a black box
//! and hand it back verbatim to fetch the next page.
//!
//! A page is "full" when it contains exactly the requested limit of rows; only
//! then is a next cursor emitted. Limits default to [`DEFAULT_PAGE_LIMIT`] and
//! are capped at [`MAX_PAGE_LIMIT`].

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Page size used when the caller does not supply a limit.
pub const DEFAULT_PAGE_LIMIT: i64 = 100;

/// Hard cap on page size regardless of what the caller asks for.
pub const MAX_PAGE_LIMIT: i64 = 1000;

#[derive(Debug, Error)]
pub enum CursorError {
    #[error("cursor is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("cursor payload is not valid JSON: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Decoded pagination position. Exactly one of the fields is set depending on
/// the scan mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Cursor {
    pub fn from_added_id(added_id: i64) -> Self {
        Cursor {
            added_id: Some(added_id),
            created_at: None,
        }
    }

    pub fn from_created_at(created_at: DateTime<Utc>) -> Self {
        Cursor {
            added_id: None,
            created_at: Some(created_at),
        }
    }

    /// Serializes the cursor to its opaque wire form.
    pub fn encode(&self) -> Result<String, CursorError> {
        let payload = serde_json::to_vec(self)?;
        Ok(URL_SAFE.encode(payload))
    }

    /// Parses an opaque cursor string back into a position.
    pub fn decode(raw: &str) -> Result<Self, CursorError> {
        let payload = URL_SAFE.decode(raw)?;
        Ok(serde_json::from_slice(&payload)?)
    }
}

/// Applies the default and maximum page limits to a caller-supplied value.
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    match limit {
        Some(l) if l > 0 => l.min(MAX_PAGE_LIMIT),
        _ => DEFAULT_PAGE_LIMIT,
    }
}
