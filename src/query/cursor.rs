//! Opaque scroll cursors
//!
//! A scroll id carries the sort values of the last hit of a page, the
//! point-in-time id (if one was opened) and an expiration timestamp, encoded
//! as unpadded base64url JSON.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, SearchError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrollCursor {
    pub sort: Vec<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pit_id: Option<String>,

    pub expiration_millis: i64,
}

impl ScrollCursor {
    /// Cursor after `sort`, valid for `keep_alive` from now
    pub fn new(sort: Vec<serde_json::Value>, pit_id: Option<String>, keep_alive: &str) -> Result<Self> {
        let keep_alive = parse_keep_alive(keep_alive)?;
        Ok(Self {
            sort,
            pit_id,
            expiration_millis: Utc::now().timestamp_millis() + keep_alive.as_millis() as i64,
        })
    }

    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(Base64UrlUnpadded::encode_string(&json))
    }

    /// Decode a scroll id; undecodable or expired ids are invalid requests
    pub fn decode(scroll_id: &str) -> Result<Self> {
        let bytes = Base64UrlUnpadded::decode_vec(scroll_id)
            .map_err(|_| SearchError::invalid("scroll id is not valid base64url"))?;
        let cursor: ScrollCursor = serde_json::from_slice(&bytes)
            .map_err(|e| SearchError::invalid(format!("malformed scroll id: {}", e)))?;
        if cursor.is_expired() {
            return Err(SearchError::invalid("scroll id has expired"));
        }
        Ok(cursor)
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp_millis() > self.expiration_millis
    }
}

static KEEP_ALIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)(ms|s|m|h|d)$").expect("keep-alive pattern is valid"));

/// Parse an Elasticsearch-style duration such as `500ms`, `30s`, `5m`, `1h` or `1d`
pub fn parse_keep_alive(keep_alive: &str) -> Result<Duration> {
    let keep_alive = keep_alive.trim();
    let invalid = || SearchError::invalid(format!("invalid keep-alive '{}'", keep_alive));
    let captures = KEEP_ALIVE.captures(keep_alive).ok_or_else(invalid)?;
    let amount: u64 = captures[1].parse().map_err(|_| invalid())?;

    let unit_millis: u64 = match &captures[2] {
        "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        _ => 86_400_000,
    };
    amount
        .checked_mul(unit_millis)
        .map(Duration::from_millis)
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cursor_encode_decode() {
        let cursor = ScrollCursor::new(
            vec![json!(1.25), json!("urn:li:dataset:a")],
            Some("pit-9".to_string()),
            "5m",
        )
        .unwrap();
        let scroll_id = cursor.encode().unwrap();
        assert!(!scroll_id.contains('='));

        let decoded = ScrollCursor::decode(&scroll_id).unwrap();
        assert_eq!(decoded, cursor);
    }

    #[test]
    fn test_expired_cursor_rejected() {
        let cursor = ScrollCursor {
            sort: vec![json!(1)],
            pit_id: None,
            expiration_millis: Utc::now().timestamp_millis() - 1_000,
        };
        let scroll_id = cursor.encode().unwrap();
        assert!(matches!(
            ScrollCursor::decode(&scroll_id),
            Err(SearchError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_garbage_cursor_rejected() {
        assert!(ScrollCursor::decode("not a cursor!").is_err());
        assert!(ScrollCursor::decode(&Base64UrlUnpadded::encode_string(b"[]")).is_err());
    }

    #[test]
    fn test_parse_keep_alive() {
        assert_eq!(parse_keep_alive("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_keep_alive("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_keep_alive("1h").unwrap(), Duration::from_secs(3600));
        assert!(parse_keep_alive("5 minutes").is_err());
        assert!(parse_keep_alive("m").is_err());
    }
}
