//! Piece-table text buffer.
//!
//! The buffer keeps the initial text in an immutable `original` store and
//! every inserted run in an append-only `add` store; the logical document
//! is the ordered concatenation of pieces referencing slices of the two.
//!
//! Layout after inserting `" collaborative"` at position 5 of
//! `"Hello world"`:
//!
//! ```text
//! original: "Hello world"        add: " collaborative"
//!
//! pieces: [ (original, 0, 5)     "Hello"
//!           (add,      0, 14)    " collaborative"
//!           (original, 5, 6) ]   " world"
//! ```
//!
//! All offsets and lengths are code points.

use crate::delta::{Delta, DeltaOp};
use crate::error::{CollabError, CollabResult};

/// Mutable document content addressed in code points.
///
/// `apply` is the only mutator; a failed apply leaves the buffer unchanged.
pub trait TextBuffer: Send + Sync {
    /// Logical length in code points.
    fn len(&self) -> usize;

    /// Whether the buffer is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply an edit delta.
    fn apply(&mut self, delta: &Delta) -> CollabResult<()>;

    /// Materialize the full document.
    fn text(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PieceSource {
    Original,
    Add,
}

/// A contiguous slice of one of the two backing stores.
#[derive(Debug, Clone, Copy)]
struct Piece {
    source: PieceSource,
    offset: usize,
    length: usize,
}

/// Piece-table implementation of [`TextBuffer`].
#[derive(Debug, Clone)]
pub struct PieceTable {
    original: Vec<char>,
    add: Vec<char>,
    pieces: Vec<Piece>,
}

impl PieceTable {
    /// Create a buffer over the given initial text.
    pub fn new(initial: &str) -> Self {
        let original: Vec<char> = initial.chars().collect();
        let pieces = if original.is_empty() {
            Vec::new()
        } else {
            vec![Piece {
                source: PieceSource::Original,
                offset: 0,
                length: original.len(),
            }]
        };
        Self {
            original,
            add: Vec::new(),
            pieces,
        }
    }

    /// Find the piece index and in-piece offset covering `pos`.
    /// Returns `(pieces.len(), 0)` when `pos` equals the total length.
    fn locate(&self, pos: usize) -> (usize, usize) {
        let mut cur = 0;
        for (i, p) in self.pieces.iter().enumerate() {
            if pos < cur + p.length {
                return (i, pos - cur);
            }
            cur += p.length;
        }
        (self.pieces.len(), 0)
    }

    /// Walk the delta against the current length without mutating, so that
    /// `apply` either performs the whole edit or none of it. Deletes
    /// saturate at the end of the buffer; a cursor past the end fails.
    fn check(&self, delta: &Delta) -> CollabResult<()> {
        let mut pos = 0usize;
        let mut len = self.len();
        for op in delta.ops() {
            match op {
                DeltaOp::Retain { count, .. } => {
                    pos += count;
                    if pos > len {
                        return Err(CollabError::BadPosition { pos, len });
                    }
                }
                DeltaOp::Insert { text, .. } => {
                    let n = text.chars().count();
                    len += n;
                    pos += n;
                }
                DeltaOp::Delete { count } => {
                    len -= (*count).min(len - pos);
                }
            }
        }
        Ok(())
    }

    /// Append `text` to the add store and splice a piece for it in at `pos`.
    /// Returns the inserted length in code points.
    fn insert_at(&mut self, pos: usize, text: &str) -> usize {
        let start = self.add.len();
        self.add.extend(text.chars());
        let length = self.add.len() - start;
        if length == 0 {
            return 0;
        }
        let inserted = Piece {
            source: PieceSource::Add,
            offset: start,
            length,
        };

        let (idx, offset) = self.locate(pos);
        if idx < self.pieces.len() {
            let cur = self.pieces[idx];
            let mut rebuilt = Vec::with_capacity(self.pieces.len() + 2);
            rebuilt.extend_from_slice(&self.pieces[..idx]);
            if offset > 0 {
                rebuilt.push(Piece {
                    source: cur.source,
                    offset: cur.offset,
                    length: offset,
                });
            }
            rebuilt.push(inserted);
            if cur.length > offset {
                rebuilt.push(Piece {
                    source: cur.source,
                    offset: cur.offset + offset,
                    length: cur.length - offset,
                });
            }
            rebuilt.extend_from_slice(&self.pieces[idx + 1..]);
            self.pieces = rebuilt;
        } else {
            self.pieces.push(inserted);
        }
        length
    }

    /// Remove up to `count` code points starting at `pos`, saturating at the
    /// end of the buffer. Whole pieces are dropped; partial overlaps split
    /// into non-empty prefix/suffix pieces.
    fn delete_at(&mut self, pos: usize, count: usize) {
        let mut remain = count;
        let (mut idx, mut offset) = self.locate(pos);
        while remain > 0 && idx < self.pieces.len() {
            let cur = self.pieces[idx];
            let can = cur.length - offset;
            if can == 0 {
                idx += 1;
                offset = 0;
                continue;
            }
            let take = remain.min(can);

            if offset == 0 && take == cur.length {
                self.pieces.remove(idx);
                // idx now addresses the piece after the removed one
            } else {
                let left = offset;
                let right = cur.length - offset - take;
                let mut rebuilt = Vec::with_capacity(self.pieces.len() + 1);
                rebuilt.extend_from_slice(&self.pieces[..idx]);
                if left > 0 {
                    rebuilt.push(Piece {
                        source: cur.source,
                        offset: cur.offset,
                        length: left,
                    });
                }
                if right > 0 {
                    rebuilt.push(Piece {
                        source: cur.source,
                        offset: cur.offset + offset + take,
                        length: right,
                    });
                }
                rebuilt.extend_from_slice(&self.pieces[idx + 1..]);
                self.pieces = rebuilt;
            }
            remain -= take;
        }
    }
}

impl TextBuffer for PieceTable {
    fn len(&self) -> usize {
        self.pieces.iter().map(|p| p.length).sum()
    }

    fn apply(&mut self, delta: &Delta) -> CollabResult<()> {
        self.check(delta)?;
        let mut pos = 0usize;
        for op in delta.ops() {
            match op {
                DeltaOp::Retain { count, .. } => pos += count,
                DeltaOp::Insert { text, .. } => pos += self.insert_at(pos, text),
                DeltaOp::Delete { count } => self.delete_at(pos, *count),
            }
        }
        Ok(())
    }

    fn text(&self) -> String {
        let mut out = String::with_capacity(self.len());
        for p in &self.pieces {
            let store = match p.source {
                PieceSource::Original => &self.original,
                PieceSource::Add => &self.add,
            };
            out.extend(store[p.offset..p.offset + p.length].iter());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn char_len(s: &str) -> usize {
        s.chars().count()
    }

    #[test]
    fn test_initial_text() {
        let pt = PieceTable::new("Hello world");
        assert_eq!(pt.text(), "Hello world");
        assert_eq!(pt.len(), char_len("Hello world"));
    }

    #[test]
    fn test_insert_middle_then_delete() {
        let mut pt = PieceTable::new("Hello world");

        pt.apply(&Delta::new().retain(5).insert(" collaborative"))
            .unwrap();
        assert_eq!(pt.text(), "Hello collaborative world");

        pt.apply(&Delta::new().retain(5).delete(14)).unwrap();
        assert_eq!(pt.text(), "Hello world");
    }

    #[test]
    fn test_insert_at_start_and_end() {
        let mut pt = PieceTable::new("bc");
        pt.apply(&Delta::new().insert("a")).unwrap();
        assert_eq!(pt.text(), "abc");

        pt.apply(&Delta::new().retain(3).insert("d")).unwrap();
        assert_eq!(pt.text(), "abcd");
    }

    #[test]
    fn test_insert_into_empty() {
        let mut pt = PieceTable::new("");
        pt.apply(&Delta::new().insert("hi")).unwrap();
        assert_eq!(pt.text(), "hi");
    }

    #[test]
    fn test_delete_spanning_pieces() {
        let mut pt = PieceTable::new("Hello world");
        pt.apply(&Delta::new().retain(5).insert(" brave")).unwrap();
        assert_eq!(pt.text(), "Hello brave world");

        // "o brave w" spans the original prefix, the added run, and the
        // original suffix
        pt.apply(&Delta::new().retain(4).delete(9)).unwrap();
        assert_eq!(pt.text(), "Hellorld");
    }

    #[test]
    fn test_delete_whole_document() {
        let mut pt = PieceTable::new("abc");
        pt.apply(&Delta::new().delete(3)).unwrap();
        assert_eq!(pt.text(), "");
        assert_eq!(pt.len(), 0);
        assert!(pt.is_empty());
    }

    #[test]
    fn test_delete_saturates_past_end() {
        let mut pt = PieceTable::new("abc");
        pt.apply(&Delta::new().retain(1).delete(10)).unwrap();
        assert_eq!(pt.text(), "a");
    }

    #[test]
    fn test_retain_past_end_fails_without_mutation() {
        let mut pt = PieceTable::new("abc");
        let err = pt
            .apply(&Delta::new().retain(4).insert("x"))
            .unwrap_err();
        assert!(matches!(err, CollabError::BadPosition { pos: 4, len: 3 }));
        assert_eq!(pt.text(), "abc");
    }

    #[test]
    fn test_failed_apply_is_atomic() {
        let mut pt = PieceTable::new("abc");
        // the insert would succeed but the trailing retain walks past the end
        let err = pt
            .apply(&Delta::new().insert("xyz").retain(100))
            .unwrap_err();
        assert!(matches!(err, CollabError::BadPosition { .. }));
        assert_eq!(pt.text(), "abc");
    }

    #[test]
    fn test_counts_are_code_points() {
        let mut pt = PieceTable::new("héllo wörld");
        assert_eq!(pt.len(), 11);

        pt.apply(&Delta::new().retain(5).insert(" ünïcödé")).unwrap();
        assert_eq!(pt.text(), "héllo ünïcödé wörld");

        pt.apply(&Delta::new().retain(5).delete(8)).unwrap();
        assert_eq!(pt.text(), "héllo wörld");
    }

    #[test]
    fn test_length_matches_text_after_every_apply() {
        let mut pt = PieceTable::new("The quick brown fox");
        let edits = vec![
            Delta::new().retain(4).delete(6),
            Delta::new().retain(4).insert("slow "),
            Delta::new().retain(9).insert("lazy "),
            Delta::new().delete(3).insert("A"),
        ];
        for delta in edits {
            pt.apply(&delta).unwrap();
            assert_eq!(pt.len(), pt.text().chars().count());
        }
    }

    #[test]
    fn test_matches_naive_string_edits() {
        // round-trip property: the piece table agrees with edits performed
        // directly on a char vector
        let initial = "collaborative editing";
        let mut pt = PieceTable::new(initial);
        let mut naive: Vec<char> = initial.chars().collect();

        let edits: Vec<(usize, Option<&str>, usize)> = vec![
            (13, Some(" text"), 0),
            (0, Some(">> "), 0),
            (3, None, 5),
            (10, Some("!"), 2),
        ];
        for (pos, insert, delete) in edits {
            let mut delta = Delta::new().retain(pos);
            if let Some(text) = insert {
                delta = delta.insert(text);
                let at = pos;
                for (i, ch) in text.chars().enumerate() {
                    naive.insert(at + i, ch);
                }
            }
            if delete > 0 {
                delta = delta.delete(delete);
                let cursor = pos + insert.map_or(0, |t| t.chars().count());
                for _ in 0..delete.min(naive.len() - cursor) {
                    naive.remove(cursor);
                }
            }
            pt.apply(&delta).unwrap();
            assert_eq!(pt.text(), naive.iter().collect::<String>());
        }
    }

    #[test]
    fn test_empty_insert_is_noop() {
        let mut pt = PieceTable::new("abc");
        pt.apply(&Delta::new().retain(1).insert("")).unwrap();
        assert_eq!(pt.text(), "abc");
    }
}
