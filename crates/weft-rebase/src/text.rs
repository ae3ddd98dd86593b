//! Reference character-sequence datatype.
//!
//! A [`TextChange`] is an ordered list of single-position operations, each
//! applying to the document produced by the operations before it. Rebasing
//! uses classic operational transformation over the operation grid.
//! Concurrent inserts at the same position are ordered by author, then by
//! text, so both rebase directions agree.

use serde::{Deserialize, Serialize};
use weft_types::SessionId;

use crate::error::RebaseError;
use crate::rebaser::ChangeRebaser;

/// A single-position text operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum TextOp {
    Insert {
        pos: usize,
        text: String,
        author: SessionId,
    },
    Delete {
        pos: usize,
        ch: char,
        author: SessionId,
    },
}

impl TextOp {
    fn with_pos(&self, pos: usize) -> Self {
        let mut op = self.clone();
        match &mut op {
            Self::Insert { pos: p, .. } | Self::Delete { pos: p, .. } => *p = pos,
        }
        op
    }
}

/// An edit to a character sequence.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextChange {
    ops: Vec<TextOp>,
}

impl TextChange {
    pub fn from_ops(ops: Vec<TextOp>) -> Self {
        Self { ops }
    }

    /// Insert `text` at character position `pos`.
    pub fn insert(author: SessionId, pos: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() {
            return Self::default();
        }
        Self {
            ops: vec![TextOp::Insert { pos, text, author }],
        }
    }

    /// Delete `len` characters of `doc` starting at `pos`.
    pub fn delete(author: SessionId, doc: &str, pos: usize, len: usize) -> Result<Self, RebaseError> {
        let chars: Vec<char> = doc.chars().collect();
        if pos + len > chars.len() {
            return Err(RebaseError::OutOfBounds {
                pos: pos + len,
                len: chars.len(),
            });
        }
        let ops = chars[pos..pos + len]
            .iter()
            .map(|&ch| TextOp::Delete { pos, ch, author })
            .collect();
        Ok(Self { ops })
    }

    pub fn ops(&self) -> &[TextOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

/// Apply a change to a document.
pub fn apply_text(doc: &str, change: &TextChange) -> Result<String, RebaseError> {
    let mut chars: Vec<char> = doc.chars().collect();
    for op in &change.ops {
        match op {
            TextOp::Insert { pos, text, .. } => {
                if *pos > chars.len() {
                    return Err(RebaseError::OutOfBounds {
                        pos: *pos,
                        len: chars.len(),
                    });
                }
                chars.splice(*pos..*pos, text.chars());
            }
            TextOp::Delete { pos, ch, .. } => {
                let found = *chars.get(*pos).ok_or(RebaseError::OutOfBounds {
                    pos: *pos,
                    len: chars.len(),
                })?;
                if found != *ch {
                    return Err(RebaseError::DeleteMismatch {
                        pos: *pos,
                        expected: *ch,
                        found,
                    });
                }
                chars.remove(*pos);
            }
        }
    }
    Ok(chars.into_iter().collect())
}

/// Transform `op` so it applies after `over`. `None` when `op` is absorbed.
fn transform_op(op: &TextOp, over: &TextOp) -> Option<TextOp> {
    match (op, over) {
        (
            TextOp::Insert {
                pos, text, author, ..
            },
            TextOp::Insert {
                pos: over_pos,
                text: over_text,
                author: over_author,
            },
        ) => {
            let over_first = over_pos < pos
                || (over_pos == pos && (over_author, over_text) < (author, text));
            if over_first {
                Some(op.with_pos(pos + over_text.chars().count()))
            } else {
                Some(op.clone())
            }
        }
        (TextOp::Insert { pos, .. }, TextOp::Delete { pos: over_pos, .. }) => {
            if over_pos < pos {
                Some(op.with_pos(pos - 1))
            } else {
                Some(op.clone())
            }
        }
        (
            TextOp::Delete { pos, .. },
            TextOp::Insert {
                pos: over_pos,
                text,
                ..
            },
        ) => {
            if over_pos <= pos {
                Some(op.with_pos(pos + text.chars().count()))
            } else {
                Some(op.clone())
            }
        }
        (TextOp::Delete { pos, .. }, TextOp::Delete { pos: over_pos, .. }) => {
            if over_pos < pos {
                Some(op.with_pos(pos - 1))
            } else if over_pos == pos {
                None
            } else {
                Some(op.clone())
            }
        }
    }
}

/// Transform two concurrent op lists past each other.
///
/// Returns `(a', b')` where `a'` applies after `b` and `b'` applies after `a`.
fn transform(a: &[TextOp], b: &[TextOp]) -> (Vec<TextOp>, Vec<TextOp>) {
    let mut a: Vec<TextOp> = a.to_vec();
    let mut b_out = Vec::with_capacity(b.len());
    for b_op in b {
        let mut current = Some(b_op.clone());
        let mut next_a = Vec::with_capacity(a.len());
        for a_op in &a {
            match current.take() {
                Some(c) => {
                    if let Some(rebased) = transform_op(a_op, &c) {
                        next_a.push(rebased);
                    }
                    current = transform_op(&c, a_op);
                }
                None => next_a.push(a_op.clone()),
            }
        }
        a = next_a;
        if let Some(c) = current {
            b_out.push(c);
        }
    }
    (a, b_out)
}

/// [`ChangeRebaser`] for [`TextChange`].
#[derive(Clone, Copy, Debug, Default)]
pub struct TextRebaser;

impl ChangeRebaser for TextRebaser {
    type Change = TextChange;

    fn compose(&self, changes: &[TextChange]) -> TextChange {
        TextChange {
            ops: changes.iter().flat_map(|c| c.ops.iter().cloned()).collect(),
        }
    }

    fn invert(&self, change: &TextChange) -> TextChange {
        let mut ops = Vec::new();
        for op in change.ops.iter().rev() {
            match op {
                TextOp::Insert { pos, text, author } => {
                    ops.extend(text.chars().map(|ch| TextOp::Delete {
                        pos: *pos,
                        ch,
                        author: *author,
                    }));
                }
                TextOp::Delete { pos, ch, author } => ops.push(TextOp::Insert {
                    pos: *pos,
                    text: ch.to_string(),
                    author: *author,
                }),
            }
        }
        TextChange { ops }
    }

    fn rebase(&self, change: &TextChange, over: &TextChange) -> TextChange {
        if change.is_empty() || over.is_empty() {
            return change.clone();
        }
        let (rebased, _) = transform(&change.ops, &over.ops);
        TextChange { ops: rebased }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn alice() -> SessionId {
        SessionId::from_u128(1)
    }

    fn bob() -> SessionId {
        SessionId::from_u128(2)
    }

    /// Build a change against `doc` from raw `(insert?, position seed, char)` triples.
    fn build_change(author: SessionId, doc: &str, raw: &[(bool, usize, char)]) -> TextChange {
        let mut current = doc.to_string();
        let mut ops = Vec::new();
        for &(insert, seed, ch) in raw {
            let len = current.chars().count();
            let step = if insert || len == 0 {
                TextChange::insert(author, seed % (len + 1), ch.to_string())
            } else {
                TextChange::delete(author, &current, seed % len, 1).unwrap()
            };
            current = apply_text(&current, &step).unwrap();
            ops.extend(step.ops);
        }
        TextChange::from_ops(ops)
    }

    fn raw_ops() -> impl Strategy<Value = Vec<(bool, usize, char)>> {
        prop::collection::vec((any::<bool>(), 0usize..64, prop::char::range('p', 'z')), 0..6)
    }

    #[test]
    fn insert_and_delete_apply() {
        let doc = apply_text("", &TextChange::insert(alice(), 0, "hello")).unwrap();
        assert_eq!(doc, "hello");
        let del = TextChange::delete(alice(), &doc, 1, 3).unwrap();
        assert_eq!(apply_text(&doc, &del).unwrap(), "ho");
    }

    #[test]
    fn delete_out_of_range_is_rejected() {
        let err = TextChange::delete(alice(), "ab", 1, 5).unwrap_err();
        assert!(matches!(err, RebaseError::OutOfBounds { .. }));
    }

    #[test]
    fn apply_detects_mismatched_delete() {
        let change = TextChange::from_ops(vec![TextOp::Delete {
            pos: 0,
            ch: 'z',
            author: alice(),
        }]);
        let err = apply_text("a", &change).unwrap_err();
        assert_eq!(
            err,
            RebaseError::DeleteMismatch {
                pos: 0,
                expected: 'z',
                found: 'a'
            }
        );
    }

    #[test]
    fn concurrent_inserts_at_same_position_order_by_author() {
        let rebaser = TextRebaser;
        let a = TextChange::insert(alice(), 0, "A");
        let b = TextChange::insert(bob(), 0, "B");

        let via_a = apply_text(&apply_text("", &a).unwrap(), &rebaser.rebase(&b, &a)).unwrap();
        let via_b = apply_text(&apply_text("", &b).unwrap(), &rebaser.rebase(&a, &b)).unwrap();
        assert_eq!(via_a, "AB");
        assert_eq!(via_b, "AB");
    }

    #[test]
    fn concurrent_deletes_of_same_char_collapse() {
        let rebaser = TextRebaser;
        let a = TextChange::delete(alice(), "xyz", 1, 1).unwrap();
        let b = TextChange::delete(bob(), "xyz", 1, 1).unwrap();
        assert!(rebaser.rebase(&a, &b).is_empty());
        assert!(rebaser.rebase(&b, &a).is_empty());
    }

    #[test]
    fn insert_inside_concurrently_deleted_range_survives() {
        let rebaser = TextRebaser;
        let doc = "abcd";
        let del = TextChange::delete(alice(), doc, 1, 2).unwrap();
        let ins = TextChange::insert(bob(), 2, "X");
        let left = apply_text(&apply_text(doc, &del).unwrap(), &rebaser.rebase(&ins, &del)).unwrap();
        let right = apply_text(&apply_text(doc, &ins).unwrap(), &rebaser.rebase(&del, &ins)).unwrap();
        assert_eq!(left, "aXd");
        assert_eq!(right, "aXd");
    }

    #[test]
    fn identity_is_empty() {
        assert!(TextRebaser.identity().is_empty());
    }

    #[test]
    fn serde_roundtrip() {
        let change = TextChange::insert(alice(), 3, "hi");
        let json = serde_json::to_string(&change).unwrap();
        assert!(json.contains("\"op\":\"insert\""));
        let parsed: TextChange = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, change);
    }

    proptest! {
        #[test]
        fn rebase_converges(doc in "[a-e]{0,8}", raw_a in raw_ops(), raw_b in raw_ops()) {
            let rebaser = TextRebaser;
            let a = build_change(alice(), &doc, &raw_a);
            let b = build_change(bob(), &doc, &raw_b);

            let after_a = apply_text(&doc, &a).unwrap();
            let after_b = apply_text(&doc, &b).unwrap();
            let left = apply_text(&after_a, &rebaser.rebase(&b, &a)).unwrap();
            let right = apply_text(&after_b, &rebaser.rebase(&a, &b)).unwrap();
            prop_assert_eq!(left, right);
        }

        #[test]
        fn invert_restores_state(doc in "[a-e]{0,8}", raw in raw_ops()) {
            let rebaser = TextRebaser;
            let change = build_change(alice(), &doc, &raw);
            let after = apply_text(&doc, &change).unwrap();
            let restored = apply_text(&after, &rebaser.invert(&change)).unwrap();
            prop_assert_eq!(restored, doc);
        }

        #[test]
        fn compose_matches_sequential_application(
            doc in "[a-e]{0,8}",
            raw_a in raw_ops(),
            raw_b in raw_ops(),
        ) {
            let rebaser = TextRebaser;
            let a = build_change(alice(), &doc, &raw_a);
            let mid = apply_text(&doc, &a).unwrap();
            let b = build_change(alice(), &mid, &raw_b);

            let sequential = apply_text(&mid, &b).unwrap();
            let composed = apply_text(&doc, &rebaser.compose(&[a, b])).unwrap();
            prop_assert_eq!(sequential, composed);
        }

        #[test]
        fn rebase_over_sequence_matches_rebase_over_composition(
            doc in "[a-e]{0,8}",
            raw_c in raw_ops(),
            raw_a in raw_ops(),
            raw_b in raw_ops(),
        ) {
            let rebaser = TextRebaser;
            let c = build_change(bob(), &doc, &raw_c);
            let a = build_change(alice(), &doc, &raw_a);
            let mid = apply_text(&doc, &a).unwrap();
            let b = build_change(alice(), &mid, &raw_b);
            let end = apply_text(&mid, &b).unwrap();

            let stepwise = rebaser.rebase(&rebaser.rebase(&c, &a), &b);
            let composed = rebaser.rebase(&c, &rebaser.compose(&[a, b]));
            prop_assert_eq!(
                apply_text(&end, &stepwise).unwrap(),
                apply_text(&end, &composed).unwrap()
            );
        }
    }
}
