//! Single-node relocation on a linked tour.
//!
//! # Algorithm
//!
//! Remove node `i` from between `a = pred(i)` and `c = succ(i)`, close the
//! gap with `(a, c)`, then reinsert `i` between `j` and `d = succ(j)`:
//!
//! ```text
//! delta = -d(a, i) - d(i, c) + d(a, c) - d(j, d) + d(j, i) + d(i, d)
//! ```
//!
//! Both the delta and the splice are O(1).
//!
//! # Reference
//!
//! Or, I. (1976). "Traveling Salesman-Type Combinatorial Problems and Their
//! Relation to the Logistics of Blood Banking". PhD thesis.

use crate::distance::DistanceMatrix;
use crate::models::Tour;

/// Cost change of [`apply_relocate`] for moving `i` behind `j`.
///
/// Only meaningful when `i != j` and `succ(j) != i`; returns 0 for those
/// degenerate pairs.
#[inline]
pub fn relocate_delta(tour: &Tour, distances: &DistanceMatrix, i: usize, j: usize) -> f64 {
    let d = tour.successor(j);
    if i == j || d == i {
        return 0.0;
    }
    let a = tour.predecessor(i);
    let c = tour.successor(i);
    -distances.get(a, i) - distances.get(i, c) + distances.get(a, c) - distances.get(j, d)
        + distances.get(j, i)
        + distances.get(i, d)
}

/// Moves node `i` so that it directly follows `j`.
///
/// Does nothing for the degenerate pairs `i == j` and `succ(j) == i`.
pub fn apply_relocate(tour: &mut Tour, i: usize, j: usize) {
    if i == j || tour.successor(j) == i {
        return;
    }
    let a = tour.predecessor(i);
    let c = tour.successor(i);
    tour.connect(a, c);

    let d = tour.successor(j);
    tour.connect(j, i);
    tour.connect(i, d);
}
