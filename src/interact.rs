//! Interaction operations between forward and complete matches.
//!
//! A forward match advances by consuming complete matches, one per awaited
//! action element ([`feed`]), and closes into a complete match once all
//! children are in. A rule without a right expectation closes as soon as
//! the last child arrives; a rule with one either closes on the witness
//! the last child already recorded, or waits to be [`settle`]d against a
//! neighboring complete match.
//!
//! Neither operation signals incompatibility through an error: the
//! saturation loop tries many pairings and most fail, so the outcome is the
//! three-valued [`Interaction`].

use log::trace;

use crate::chart::Chart;
use crate::compat::can_concat;
use crate::grammar::Grammar;
use crate::matches::{CompleteId, CompleteMatch, ForwardMatch};

/// Outcome of offering a complete match to a forward match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Interaction {
    /// The forward match consumed the complete match and awaits more.
    Advanced(ForwardMatch),
    /// The forward match closed into a complete match.
    Closed(CompleteMatch),
    /// The pair is incompatible; nothing was produced.
    Rejected,
}

/// Advance `fm` with the complete match `cm`, closing it when the final
/// child arrives and the right expectation is already answered.
pub(crate) fn feed(
    chart: &Chart,
    grammar: &Grammar,
    fm: &ForwardMatch,
    cm: CompleteId,
) -> Interaction {
    let rule = grammar.substitution(fm.rule);
    debug_assert!(fm.dot() < rule.act.len(), "feed expects an awaiting match");

    let m = chart.complete(cm);
    if rule.act[fm.dot()] != m.ext || m.start != fm.end {
        return Interaction::Rejected;
    }

    let mut left_brother = fm.left_brother;
    if let Some(&last) = fm.children.last() {
        // The new child must concatenate with the previous one.
        if !can_concat(chart, last, cm) {
            return Interaction::Rejected;
        }
    } else if let Some(brother) = left_brother {
        // No child yet: the left witness takes the neighbor role.
        if !can_concat(chart, brother, cm) {
            return Interaction::Rejected;
        }
    } else {
        // A rule without a left demand inherits the first child's witness.
        left_brother = m.left_ctx;
    }

    let mut children = fm.children.clone();
    children.push(cm);
    let advanced = ForwardMatch {
        rule: fm.rule,
        ext: fm.ext,
        start: fm.start,
        end: m.end,
        children,
        left_brother,
    };

    if advanced.dot() < rule.act.len() {
        return Interaction::Advanced(advanced);
    }

    // All children are in. Without a right expectation the match closes
    // here, carrying over whatever witness the last child recorded.
    let inherited = m.right_ctx;
    match &rule.right {
        None => close(chart, &advanced, inherited),
        Some(expectation) => {
            if let Some(witness) = inherited {
                if expectation.admits(chart.complete(witness).ext) {
                    // The inherited witness already answers the expectation;
                    // this derivation does not wait for other neighbors.
                    return close(chart, &advanced, Some(witness));
                }
            }
            Interaction::Advanced(advanced)
        }
    }
}

/// Close a finished forward match against the candidate right-context
/// match `cm`.
pub(crate) fn settle(
    chart: &Chart,
    grammar: &Grammar,
    fm: &ForwardMatch,
    cm: CompleteId,
) -> Interaction {
    let rule = grammar.substitution(fm.rule);
    debug_assert_eq!(fm.dot(), rule.act.len(), "settle expects a finished match");

    let Some(expectation) = &rule.right else {
        return Interaction::Rejected;
    };
    let m = chart.complete(cm);
    if m.start != fm.end || !expectation.admits(m.ext) {
        return Interaction::Rejected;
    }
    let Some(&last) = fm.children.last() else {
        return Interaction::Rejected;
    };
    if !can_concat(chart, last, cm) {
        return Interaction::Rejected;
    }
    close(chart, fm, Some(cm))
}

/// Close a finished forward match whose negative right expectation is
/// answered by the end of the input: there is no neighbor to object.
pub(crate) fn settle_at_boundary(chart: &Chart, fm: &ForwardMatch) -> Interaction {
    close(chart, fm, None)
}

/// Build the complete match for a finished forward match, computing its
/// depth and refusing unit-rename cycles: a single-child match may not
/// reuse an external already present in the child's rename chain.
fn close(chart: &Chart, fm: &ForwardMatch, right_ctx: Option<CompleteId>) -> Interaction {
    let depth = match fm.children.as_slice() {
        [only] => {
            if chart.in_rename_chain(*only, fm.ext) {
                trace!("rename cycle refused at [{}:{}]", fm.start, fm.end);
                return Interaction::Rejected;
            }
            chart.complete(*only).depth + 1
        }
        // Branching resets the chain.
        _ => 1,
    };
    Interaction::Closed(CompleteMatch {
        rule: fm.rule,
        ext: fm.ext,
        start: fm.start,
        end: fm.end,
        depth,
        children: fm.children.clone(),
        left_ctx: fm.left_brother,
        right_ctx,
    })
}
