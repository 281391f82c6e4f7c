//! Interaction key layout.
//!
//! Each interaction kind keeps two keys per document: the count (String)
//! and the actor set (Set<userId>). Both carry the same `{docID:...}` hash
//! tag so they always share a cluster slot and one script can mutate the
//! pair; cross-slot transactions are forbidden.

use serde::{Deserialize, Serialize};

/// The three interaction kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Like,
    QuestionMark,
    Share,
}

impl InteractionKind {
    /// Route segment for the HTTP endpoints.
    pub fn as_route(&self) -> &'static str {
        match self {
            InteractionKind::Like => "like",
            InteractionKind::QuestionMark => "question_mark",
            InteractionKind::Share => "share",
        }
    }

    /// Parse a route segment.
    pub fn from_route(segment: &str) -> Option<Self> {
        match segment {
            "like" => Some(InteractionKind::Like),
            "question_mark" => Some(InteractionKind::QuestionMark),
            "share" => Some(InteractionKind::Share),
            _ => None,
        }
    }

    /// Key of the per-document counter.
    pub fn count_key(&self, doc_id: &str) -> String {
        let prefix = match self {
            InteractionKind::Like => "Like",
            InteractionKind::QuestionMark => "QuestionMark",
            InteractionKind::Share => "Share",
        };
        format!("{prefix}:{{docID:{doc_id}}}")
    }

    /// Key of the per-document actor set.
    pub fn actors_key(&self, doc_id: &str) -> String {
        let prefix = match self {
            InteractionKind::Like => "LikedUser",
            InteractionKind::QuestionMark => "QuestionMarkedUser",
            InteractionKind::Share => "SharedUser",
        };
        format!("{prefix}:{{docID:{doc_id}}}")
    }
}

/// All interaction kinds.
pub const ALL_KINDS: [InteractionKind; 3] = [
    InteractionKind::Like,
    InteractionKind::QuestionMark,
    InteractionKind::Share,
];
