//! Per-node candidate lists.
//!
//! Each node keeps its `k` nearest other nodes, sorted by ascending
//! distance. Local search only pairs a node with members of its own list,
//! which keeps every neighborhood scan at O(k) instead of O(N).

use super::DistanceMatrix;

/// Default candidate list length.
pub const DEFAULT_CANDIDATES: usize = 100;

/// Immutable k-nearest-neighbor lists for every node.
///
/// `k` is capped at `N - 1`. Ties in distance are ordered by node id.
///
/// # Examples
///
/// ```
/// use u_gls::distance::{CandidateIndex, DistanceMatrix};
/// use u_gls::models::Point;
///
/// let points = vec![
///     Point::new(0.0, 0.0),
///     Point::new(5.0, 0.0),
///     Point::new(1.0, 0.0),
///     Point::new(2.0, 0.0),
/// ];
/// let dm = DistanceMatrix::from_points(&points);
/// let index = CandidateIndex::build(&dm, 2);
/// assert_eq!(index.neighbors(0), &[2, 3]);
/// assert_eq!(index.k(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateIndex {
    data: Vec<usize>,
    k: usize,
    size: usize,
}

impl CandidateIndex {
    /// Builds the candidate lists from a distance matrix.
    pub fn build(distances: &DistanceMatrix, k: usize) -> Self {
        let size = distances.size();
        let k = k.min(size.saturating_sub(1));
        let mut data = Vec::with_capacity(size * k);

        let mut others: Vec<usize> = Vec::with_capacity(size.saturating_sub(1));
        for i in 0..size {
            others.clear();
            others.extend((0..size).filter(|&j| j != i));
            others.sort_by(|&a, &b| {
                distances
                    .get(i, a)
                    .total_cmp(&distances.get(i, b))
                    .then(a.cmp(&b))
            });
            data.extend_from_slice(&others[..k]);
        }

        Self { data, k, size }
    }

    /// The candidate list of `node`, nearest first.
    #[inline]
    pub fn neighbors(&self, node: usize) -> &[usize] {
        &self.data[node * self.k..(node + 1) * self.k]
    }

    /// Length of every candidate list.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of nodes indexed.
    pub fn size(&self) -> usize {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Point;

    fn line() -> DistanceMatrix {
        DistanceMatrix::from_points(&[
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(3.0, 0.0),
            Point::new(6.0, 0.0),
        ])
    }

    #[test]
    fn test_sorted_ascending_without_self() {
        let dm = line();
        let index = CandidateIndex::build(&dm, 3);
        assert_eq!(index.neighbors(0), &[1, 2, 3]);
        assert_eq!(index.neighbors(2), &[1, 0, 3]);
        for node in 0..4 {
            assert!(!index.neighbors(node).contains(&node));
            let ds: Vec<f64> = index.neighbors(node).iter().map(|&j| dm.get(node, j)).collect();
            assert!(ds.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn test_k_capped_at_n_minus_one() {
        let index = CandidateIndex::build(&line(), DEFAULT_CANDIDATES);
        assert_eq!(index.k(), 3);
        assert_eq!(index.size(), 4);
        assert_eq!(index.neighbors(3).len(), 3);
    }

    #[test]
    fn test_truncated_lists() {
        let index = CandidateIndex::build(&line(), 1);
        assert_eq!(index.neighbors(0), &[1]);
        assert_eq!(index.neighbors(3), &[2]);
    }

    #[test]
    fn test_ties_ordered_by_id() {
        let dm = DistanceMatrix::from_points(&[
            Point::new(0.0, 0.0),
            Point::new(0.0, 1.0),
            Point::new(1.0, 1.0),
            Point::new(1.0, 0.0),
        ]);
        let index = CandidateIndex::build(&dm, 3);
        assert_eq!(index.neighbors(0), &[1, 3, 2]);
    }
}
