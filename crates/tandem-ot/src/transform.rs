//! Inclusion transformation for text operations.
//!
//! `transform(op, against, side)` returns the operation that has the effect
//! of `op` on a document where `against` was already applied. Both inputs
//! must be defined on the same document state. For any such pair
//!
//! ```text
//! apply(apply(doc, b), transform(a, b, s)) == apply(apply(doc, a), transform(b, a, s.flip()))
//! ```
//!
//! which is all Jupiter needs for convergence. Everything here is pure.

use tandem_types::ParticipantId;

use crate::Operation;

/// Where `op` lands relative to `against` when both insert at one position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Before,
    After,
}

impl Side {
    /// Tie-break between the authors of two concurrent operations: the
    /// smaller participant id goes first.
    pub fn between(op_source: &ParticipantId, against_source: &ParticipantId) -> Self {
        if op_source < against_source {
            Side::Before
        } else {
            Side::After
        }
    }

    #[must_use]
    pub fn flip(self) -> Self {
        match self {
            Side::Before => Side::After,
            Side::After => Side::Before,
        }
    }
}

/// Transform `op` so it applies after `against`.
pub fn transform(op: &Operation, against: &Operation, side: Side) -> Operation {
    use Operation::{Delete, Insert, NoOp, Split};

    match (op, against) {
        (NoOp, _) => NoOp,
        (_, NoOp) => op.clone(),

        // Each member sees `against` as transformed past the members before it.
        (Split(members), _) => {
            let mut against = against.clone();
            let mut out = Vec::with_capacity(members.len());
            for member in members {
                out.push(transform(member, &against, side));
                against = transform(&against, member, side.flip());
            }
            Operation::split(out)
        }
        (_, Split(others)) => others
            .iter()
            .fold(op.clone(), |acc, other| transform(&acc, other, side)),

        (Insert { position: p1, text }, Insert { position: p2, text: other }) => {
            if p1 < p2 || (p1 == p2 && side == Side::Before) {
                op.clone()
            } else {
                Operation::insert(p1.saturating_add(char_len(other)), text.clone())
            }
        }

        (Insert { position: p1, text }, Delete { position: p2, length: l2 }) => {
            let position = if p1 <= p2 {
                *p1
            } else if *p1 >= p2.saturating_add(*l2) {
                p1 - l2
            } else {
                // Inside the removed range: survives at its start.
                *p2
            };
            Operation::insert(position, text.clone())
        }

        (Delete { position: p1, length: l1 }, Insert { position: p2, text }) => {
            let n = char_len(text);
            if *p2 >= p1.saturating_add(*l1) {
                op.clone()
            } else if p2 <= p1 {
                Operation::delete(p1.saturating_add(n), *l1)
            } else {
                // The insert lands inside the range; delete around it.
                let head = p2 - p1;
                Operation::split([
                    Operation::delete(*p1, head),
                    Operation::delete(p1.saturating_add(n), l1 - head),
                ])
            }
        }

        (Delete { position: p1, length: l1 }, Delete { position: p2, length: l2 }) => {
            if p1.saturating_add(*l1) <= *p2 {
                op.clone()
            } else if *p1 >= p2.saturating_add(*l2) {
                Operation::delete(p1 - l2, *l1)
            } else {
                let overlap = p1.saturating_add(*l1).min(p2.saturating_add(*l2)) - p1.max(p2);
                Operation::delete(*p1.min(p2), l1 - overlap)
            }
        }
    }
}

/// Transform two concurrent operations past each other, breaking ties by
/// their authors. Returns `(op', against')`.
pub fn transform_pair(
    op: &Operation,
    op_source: &ParticipantId,
    against: &Operation,
    against_source: &ParticipantId,
) -> (Operation, Operation) {
    let side = Side::between(op_source, against_source);
    (
        transform(op, against, side),
        transform(against, op, side.flip()),
    )
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
