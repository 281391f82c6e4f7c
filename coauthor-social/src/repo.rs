//! Source-of-truth repository seam for document interaction stats.

use async_trait::async_trait;

use crate::error::SocialResult;
use crate::keys::InteractionKind;

/// Durable per-document interaction totals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocStats {
    pub doc_id: String,
    pub like_count: u64,
    pub view_count: u64,
    pub share_count: u64,
    pub question_mark_count: u64,
}

impl DocStats {
    /// The stored total for one interaction kind.
    pub fn count_for(&self, kind: InteractionKind) -> u64 {
        match kind {
            InteractionKind::Like => self.like_count,
            InteractionKind::QuestionMark => self.question_mark_count,
            InteractionKind::Share => self.share_count,
        }
    }
}

/// Read access to the durable stats behind the counter cache.
#[async_trait]
pub trait DocStatsRepo: Send + Sync {
    /// Fetch the stats row for a document; `None` when the document is
    /// unknown (which the cache remembers with the empty-value marker).
    async fn get_doc_stats(&self, doc_id: &str) -> SocialResult<Option<DocStats>>;
}
