//! Presence key layout.
//!
//! - `room_key(doc_id)`: live members (ZSet<userId, expireAtUnix>, score =
//!   logical expiry)
//! - `names_key(doc_id)`: userId → username map (Hash)
//! - `cursor_key(doc_id, user_id)`: cursor/selection blob (String with
//!   physical TTL)
//!
//! Room and names keys share a `{docID:...}` hash tag so the GC script can
//! touch both in one call under cluster slotting.

/// Prefix shared by room and names keys.
pub const ROOM_PREFIX: &str = "presence:room:";

/// Live-member sorted set for a document.
pub fn room_key(doc_id: &str) -> String {
    format!("presence:room:{{docID:{doc_id}}}")
}

/// Username hash for a document.
pub fn names_key(doc_id: &str) -> String {
    format!("presence:room:names:{{docID:{doc_id}}}")
}

/// Cursor blob key for a member of a document.
pub fn cursor_key(doc_id: &str, user_id: u64) -> String {
    format!("presence:cursor:{doc_id}:{user_id}")
}

/// Recover the document id from a room key, skipping names keys and any
/// key that does not carry the expected shape.
pub fn doc_id_from_room_key(key: &str) -> Option<&str> {
    let rest = key.strip_prefix(ROOM_PREFIX)?;
    if rest.starts_with("names:") {
        return None;
    }
    rest.strip_prefix("{docID:")?.strip_suffix('}')
}
