//! Match records of the chart engine.
//!
//! A complete match is a finished derivation of a rule over a concrete span
//! of the input. A forward match is an in-progress derivation of a
//! substitution rule, with a dot separating completed children from awaited
//! ones. As in Earley's algorithm, forward matches advance from left to
//! right one child at a time.
//!
//! Matches remember the context of their formation. A rule like
//! `&b〈 C → D E 〉&a` produces a complete match only next to a `b` on the
//! left and an `a` on the right; the witnesses that satisfied those
//! expectations are recorded on the match itself (`left_ctx`, `right_ctx`)
//! and consulted whenever the match is placed next to another
//! (see [`crate::compat`]). The context does not extend the span: the match
//! starts where its first child starts and ends where its last child ends.
//!
//! Matches live in per-parse arenas owned by [`crate::chart::Chart`] and
//! reference each other through [`CompleteId`]. They are immutable once
//! inserted; children and context edges form a directed acyclic graph.

use crate::grammar::{ExtId, RuleId};

/// Arena index of a complete match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct CompleteId(pub(crate) u32);

/// Arena index of a forward match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ForwardId(pub(crate) u32);

/// A finished derivation of `rule` over `[start, end)`.
///
/// `children` is empty exactly for terminal matches. `depth` counts the
/// unit-rename chain ending in this match: 1 for terminals and branching
/// matches, `child.depth + 1` for a single-child match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CompleteMatch {
    pub(crate) rule: RuleId,
    pub(crate) ext: ExtId,
    pub(crate) start: usize,
    pub(crate) end: usize,
    pub(crate) depth: u32,
    pub(crate) children: Vec<CompleteId>,
    /// The match that quenched the rule's left expectation, or the witness
    /// inherited from the first child.
    pub(crate) left_ctx: Option<CompleteId>,
    /// The match that quenched the rule's right expectation, or the witness
    /// inherited from the last child.
    pub(crate) right_ctx: Option<CompleteId>,
}

impl CompleteMatch {
    /// A terminal match produced by the scanner.
    pub(crate) fn terminal(rule: RuleId, ext: ExtId, start: usize, end: usize) -> CompleteMatch {
        CompleteMatch {
            rule,
            ext,
            start,
            end,
            depth: 1,
            children: Vec::new(),
            left_ctx: None,
            right_ctx: None,
        }
    }

    pub(crate) fn is_terminal(&self) -> bool {
        self.children.is_empty()
    }
}

/// An in-progress derivation of a substitution rule.
///
/// The dot position is implied by the completed children: the rule's action
/// element at index `dot()` is the next awaited external. `end` advances to
/// the end of each newly fed child; a fresh forward match has `end == start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ForwardMatch {
    pub(crate) rule: RuleId,
    pub(crate) ext: ExtId,
    pub(crate) start: usize,
    pub(crate) end: usize,
    pub(crate) children: Vec<CompleteId>,
    /// The match that quenched the rule's left expectation, or the witness
    /// inherited from the first child.
    pub(crate) left_brother: Option<CompleteId>,
}

impl ForwardMatch {
    /// A forward match with no children yet, at the prediction position.
    pub(crate) fn seed(
        rule: RuleId,
        ext: ExtId,
        start: usize,
        left_brother: Option<CompleteId>,
    ) -> ForwardMatch {
        ForwardMatch {
            rule,
            ext,
            start,
            end: start,
            children: Vec::new(),
            left_brother,
        }
    }

    /// Index of the next awaited action element.
    pub(crate) fn dot(&self) -> usize {
        self.children.len()
    }
}
