//! Adjacency between neighboring complete matches.
//!
//! Whether two matches may sit next to each other is not a question about
//! their external names alone: each side may have recorded a context
//! witness, and that witness must actually occur in the neighbor's
//! derivation. The left match demands its recorded right witness, the right
//! match demands its recorded left witness, and both demands are checked
//! against the boundary histories — the chain of matches closing exactly
//! where the left one closes, and the chain starting exactly where the
//! right one starts.
//!
//! When both sides carry a demand, containment is not enough: each witness
//! pins down when its owner was constructed relative to the neighbor's
//! spine, and the two construction orders must agree. [`can_concat`]
//! compares the positions of the demanded matches against the oldest spine
//! members that recorded the same witnesses and rejects crossed orders.

use crate::chart::Chart;
use crate::matches::CompleteId;

/// Whether `left` (closing at some position p) and `right` (starting at p)
/// may be adjacent.
pub(crate) fn can_concat(chart: &Chart, left: CompleteId, right: CompleteId) -> bool {
    debug_assert_eq!(chart.complete(left).end, chart.complete(right).start);

    // What left needs after it, and what right needs before it.
    let left_req = chart.complete(left).right_ctx;
    let right_req = chart.complete(right).left_ctx;

    match (left_req, right_req) {
        (None, None) => true,
        (None, Some(rq)) => chart.history_at_close(left).contains(&rq),
        (Some(lq), None) => chart.history_at_start(right).contains(&lq),
        (Some(lq), Some(rq)) => {
            // Histories run from the newest match (the side itself, index 0)
            // down to a terminal.
            let left_history = chart.history_at_close(left);
            let right_history = chart.history_at_start(right);

            let Some(left_needed) = left_history.iter().position(|&m| m == rq) else {
                return false;
            };
            let Some(right_needed) = right_history.iter().position(|&m| m == lq) else {
                return false;
            };

            // Oldest member on each side that records the same witness as
            // the side itself. Index 0 always qualifies, so these exist.
            let left_oldest = left_history
                .iter()
                .rposition(|&m| chart.complete(m).right_ctx == Some(lq))
                .unwrap_or(0);
            let right_oldest = right_history
                .iter()
                .rposition(|&m| chart.complete(m).left_ctx == Some(rq))
                .unwrap_or(0);

            // Larger index = built earlier. The demanded members and the
            // oldest recorders of each witness fix the relative
            // construction order of the two spines; both sides must agree
            // on which witness came first.
            if left_oldest < left_needed {
                right_needed <= right_oldest
            } else {
                right_oldest < right_needed
            }
        }
    }
}
