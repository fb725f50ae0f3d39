// ABOUTME: Opaque cursor encoding for created_at-ordered pagination
// ABOUTME: base64 of "RFC3339Nano|id" with strict round-trip guarantees

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use octroi_storage::StorageError;

/// Encode a (timestamp, id) pair into an opaque cursor.
pub fn encode_cursor(created_at: DateTime<Utc>, id: &str) -> String {
    let raw = format!(
        "{}|{}",
        created_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
        id
    );
    BASE64.encode(raw)
}

/// Decode an opaque cursor back into its (timestamp, id) pair.
pub fn decode_cursor(cursor: &str) -> Result<(DateTime<Utc>, String), StorageError> {
    let raw = BASE64
        .decode(cursor)
        .map_err(|_| StorageError::InvalidCursor("not valid base64".into()))?;
    let raw =
        String::from_utf8(raw).map_err(|_| StorageError::InvalidCursor("not valid utf-8".into()))?;
    let (ts, id) = raw
        .split_once('|')
        .ok_or_else(|| StorageError::InvalidCursor("missing separator".into()))?;
    let ts = DateTime::parse_from_rfc3339(ts)
        .map_err(|e| StorageError::InvalidCursor(format!("bad timestamp: {e}")))?
        .with_timezone(&Utc);
    Ok((ts, id.to_string()))
}
