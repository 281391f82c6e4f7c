//! Edit deltas: ordered retain/insert/delete scripts.
//!
//! A [`Delta`] describes one edit as a walk over the document: retain skips
//! ahead, insert adds text at the cursor, delete removes text at the cursor.
//! All counts are Unicode code points, never bytes or UTF-16 units.
//!
//! Wire format (JSON):
//!
//! ```json
//! [{"kind":"retain","count":5},{"kind":"insert","text":"Hello"}]
//! ```

use serde::{Deserialize, Serialize};

/// Opaque attribute bag carried on retain/insert operations (bold, color,
/// etc.). The engine never interprets attributes; they ride along.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// A single delta operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DeltaOp {
    /// Advance the cursor by `count` code points, optionally stamping
    /// attributes on the retained range.
    Retain {
        count: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attrs: Option<Attributes>,
    },
    /// Insert `text` at the cursor.
    Insert {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attrs: Option<Attributes>,
    },
    /// Remove `count` code points at the cursor.
    Delete { count: usize },
}

/// An ordered edit script. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Delta(Vec<DeltaOp>);

impl Delta {
    /// Create an empty delta.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a retain operation (builder style).
    pub fn retain(mut self, count: usize) -> Self {
        self.0.push(DeltaOp::Retain { count, attrs: None });
        self
    }

    /// Append a retain operation with attributes.
    pub fn retain_with(mut self, count: usize, attrs: Attributes) -> Self {
        self.0.push(DeltaOp::Retain {
            count,
            attrs: Some(attrs),
        });
        self
    }

    /// Append an insert operation.
    pub fn insert(mut self, text: impl Into<String>) -> Self {
        self.0.push(DeltaOp::Insert {
            text: text.into(),
            attrs: None,
        });
        self
    }

    /// Append an insert operation with attributes.
    pub fn insert_with(mut self, text: impl Into<String>, attrs: Attributes) -> Self {
        self.0.push(DeltaOp::Insert {
            text: text.into(),
            attrs: Some(attrs),
        });
        self
    }

    /// Append a delete operation.
    pub fn delete(mut self, count: usize) -> Self {
        self.0.push(DeltaOp::Delete { count });
        self
    }

    /// The operations, in order.
    pub fn ops(&self) -> &[DeltaOp] {
        &self.0
    }

    /// Number of operations in the script.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the script has no operations.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<DeltaOp>> for Delta {
    fn from(ops: Vec<DeltaOp>) -> Self {
        Self(ops)
    }
}

impl IntoIterator for Delta {
    type Item = DeltaOp;
    type IntoIter = std::vec::IntoIter<DeltaOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
