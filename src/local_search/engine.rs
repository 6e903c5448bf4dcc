//! Candidate-restricted local search.
//!
//! Every scan pairs a node only with members of its candidate list, so a
//! full pass costs O(N·k) delta evaluations. Two scan shapes exist:
//!
//! - **all-pairs**: every node against its list; applies one move per pass
//!   (the first improving one, or the best, depending on strategy).
//! - **node-restricted**: one anchor node against its list; applies every
//!   improving move as soon as it is found. The guided perturbation phase
//!   uses this with distorted distances.
//!
//! [`LocalSearch::descend`] alternates all-pairs 2-opt and relocate passes
//! until neither improves, which is a local optimum of both neighborhoods
//! restricted to the candidate lists.

use serde::{Deserialize, Serialize};

use super::relocate::{apply_relocate, relocate_delta};
use super::two_opt::{apply_two_opt, two_opt_delta};
use crate::distance::{CandidateIndex, DistanceMatrix};
use crate::models::Tour;

/// Deltas within this distance of zero do not count as improvements.
pub const IMPROVEMENT_EPSILON: f64 = 1e-8;

/// Which improving move an all-pairs pass applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImprovementStrategy {
    /// Scan the whole neighborhood and apply the single best move.
    #[default]
    BestImprovement,
    /// Apply the first improving move found.
    FirstImprovement,
}

#[inline]
fn is_improving(delta: f64) -> bool {
    delta < -IMPROVEMENT_EPSILON
}

/// Local search over one distance matrix and candidate index.
///
/// The distances may be the true instance distances or a guided matrix;
/// the candidate lists always come from the true distances.
///
/// # Examples
///
/// ```
/// use u_gls::models::{Point, Tour};
/// use u_gls::distance::{CandidateIndex, DistanceMatrix};
/// use u_gls::local_search::LocalSearch;
///
/// let dm = DistanceMatrix::from_points(&[
///     Point::new(0.0, 0.0),
///     Point::new(0.0, 1.0),
///     Point::new(1.0, 1.0),
///     Point::new(1.0, 0.0),
/// ]);
/// let candidates = CandidateIndex::build(&dm, 3);
/// let mut tour = Tour::from_visit_order(&[0, 2, 1, 3]).unwrap();
///
/// let start = tour.cost(&dm);
/// let cost = LocalSearch::new(&dm, &candidates).descend(&mut tour, start);
/// assert!((cost - 4.0).abs() < 1e-10);
/// assert!((tour.cost(&dm) - cost).abs() < 1e-10);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct LocalSearch<'a> {
    distances: &'a DistanceMatrix,
    candidates: &'a CandidateIndex,
    strategy: ImprovementStrategy,
}

impl<'a> LocalSearch<'a> {
    /// Creates a best-improvement search.
    pub fn new(distances: &'a DistanceMatrix, candidates: &'a CandidateIndex) -> Self {
        debug_assert_eq!(distances.size(), candidates.size());
        Self {
            distances,
            candidates,
            strategy: ImprovementStrategy::default(),
        }
    }

    /// Sets the all-pairs improvement strategy.
    pub fn with_strategy(mut self, strategy: ImprovementStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// The distances deltas are evaluated against.
    pub fn distances(&self) -> &'a DistanceMatrix {
        self.distances
    }

    /// One all-pairs 2-opt pass.
    ///
    /// Applies at most one move and returns its delta, or 0 if no pair
    /// improves.
    pub fn two_opt_pass(&self, tour: &mut Tour) -> f64 {
        let best = self.scan_all_pairs(tour, |tour, i, j| {
            if tour.are_adjacent(i, j) {
                None
            } else {
                Some(two_opt_delta(tour, self.distances, i, j))
            }
        });
        match best {
            Some((delta, i, j)) => {
                apply_two_opt(tour, i, j);
                delta
            }
            None => 0.0,
        }
    }

    /// One all-pairs relocate pass.
    ///
    /// Applies at most one move and returns its delta, or 0 if no pair
    /// improves.
    pub fn relocate_pass(&self, tour: &mut Tour) -> f64 {
        let best = self.scan_all_pairs(tour, |tour, i, j| {
            if tour.successor(j) == i {
                None
            } else {
                Some(relocate_delta(tour, self.distances, i, j))
            }
        });
        match best {
            Some((delta, i, j)) => {
                apply_relocate(tour, i, j);
                delta
            }
            None => 0.0,
        }
    }

    fn scan_all_pairs<F>(&self, tour: &Tour, delta_of: F) -> Option<(f64, usize, usize)>
    where
        F: Fn(&Tour, usize, usize) -> Option<f64>,
    {
        let mut best: Option<(f64, usize, usize)> = None;
        for i in 0..tour.len() {
            for &j in self.candidates.neighbors(i) {
                let Some(delta) = delta_of(tour, i, j) else {
                    continue;
                };
                if !is_improving(delta) {
                    continue;
                }
                if best.is_none_or(|(b, _, _)| delta < b) {
                    best = Some((delta, i, j));
                    if self.strategy == ImprovementStrategy::FirstImprovement {
                        return best;
                    }
                }
            }
        }
        best
    }

    /// Greedy 2-opt scan anchored at `node`.
    ///
    /// Applies every improving move against `node`'s candidate list as soon
    /// as it is found, calling `on_move` after each one. Returns the number
    /// of moves applied.
    pub fn two_opt_around<F: FnMut(&Tour)>(
        &self,
        tour: &mut Tour,
        node: usize,
        mut on_move: F,
    ) -> usize {
        let mut applied = 0;
        for &j in self.candidates.neighbors(node) {
            if tour.are_adjacent(node, j) {
                continue;
            }
            if is_improving(two_opt_delta(tour, self.distances, node, j)) {
                apply_two_opt(tour, node, j);
                applied += 1;
                on_move(tour);
            }
        }
        applied
    }

    /// Greedy relocate scan anchored at `node`.
    ///
    /// Same contract as [`two_opt_around`](Self::two_opt_around), moving
    /// `node` behind members of its candidate list.
    pub fn relocate_around<F: FnMut(&Tour)>(
        &self,
        tour: &mut Tour,
        node: usize,
        mut on_move: F,
    ) -> usize {
        let mut applied = 0;
        for &j in self.candidates.neighbors(node) {
            if tour.successor(j) == node {
                continue;
            }
            if is_improving(relocate_delta(tour, self.distances, node, j)) {
                apply_relocate(tour, node, j);
                applied += 1;
                on_move(tour);
            }
        }
        applied
    }

    /// Runs 2-opt and relocate passes until neither improves.
    ///
    /// `cost` is the current tour cost under these distances; the returned
    /// value is that cost plus every applied delta.
    pub fn descend(&self, tour: &mut Tour, mut cost: f64) -> f64 {
        loop {
            let mut improved = false;

            let delta = self.two_opt_pass(tour);
            if delta < 0.0 {
                cost += delta;
                improved = true;
            }

            let delta = self.relocate_pass(tour);
            if delta < 0.0 {
                cost += delta;
                improved = true;
            }

            if !improved {
                return cost;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constructive::nearest_neighbor_tour;
    use crate::models::Point;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn square() -> DistanceMatrix {
        DistanceMatrix::from_points(&[
            Point::new(0.0, 0.0),
            Point::new(0.0, 1.0),
            Point::new(1.0, 1.0),
            Point::new(1.0, 0.0),
        ])
    }

    /// Five hull points and one interior point (node 5). The
    /// nearest-neighbor tour from node 0 crosses itself.
    fn crossing_six() -> DistanceMatrix {
        DistanceMatrix::from_points(&[
            Point::new(5.0, 6.0),
            Point::new(6.0, 1.0),
            Point::new(6.0, 0.0),
            Point::new(3.0, 0.0),
            Point::new(3.0, 6.0),
            Point::new(5.0, 2.0),
        ])
    }

    fn random_points(n: usize, seed: u64) -> DistanceMatrix {
        let mut rng = StdRng::seed_from_u64(seed);
        let points: Vec<Point> = (0..n)
            .map(|_| Point::new(rng.random_range(0.0..100.0), rng.random_range(0.0..100.0)))
            .collect();
        DistanceMatrix::from_points(&points)
    }

    fn assert_local_optimum(search: &LocalSearch<'_>, tour: &Tour) {
        let mut probe = tour.clone();
        assert_eq!(search.two_opt_pass(&mut probe), 0.0);
        assert_eq!(search.relocate_pass(&mut probe), 0.0);
        assert_eq!(&probe, tour);
    }

    #[test]
    fn test_square_nn_tour_is_already_optimal() {
        let dm = square();
        let candidates = CandidateIndex::build(&dm, 100);
        let mut tour =
            nearest_neighbor_tour(&dm, 0, &mut StdRng::seed_from_u64(7)).expect("tour");
        let before = tour.clone();
        assert!((tour.cost(&dm) - 4.0).abs() < 1e-10);

        let search = LocalSearch::new(&dm, &candidates);
        let cost = search.descend(&mut tour, 4.0);
        assert!((cost - 4.0).abs() < 1e-10);
        assert_eq!(tour, before);
    }

    #[test]
    fn test_single_two_opt_uncrosses_nn_tour() {
        let dm = crossing_six();
        let candidates = CandidateIndex::build(&dm, 100);
        let mut tour =
            nearest_neighbor_tour(&dm, 0, &mut StdRng::seed_from_u64(7)).expect("tour");
        assert_eq!(tour.to_visit_order(), vec![0, 4, 5, 1, 2, 3]);
        let before = tour.cost(&dm);

        let search = LocalSearch::new(&dm, &candidates);
        let delta = search.two_opt_pass(&mut tour);
        assert!(delta < 0.0);
        assert!(tour.cost(&dm) < before);
        assert!((tour.cost(&dm) - (before + delta)).abs() < 1e-9);
    }

    #[test]
    fn test_descend_reaches_crossing_free_optimum() {
        let dm = crossing_six();
        let candidates = CandidateIndex::build(&dm, 100);
        let mut tour =
            nearest_neighbor_tour(&dm, 0, &mut StdRng::seed_from_u64(7)).expect("tour");

        let search = LocalSearch::new(&dm, &candidates);
        let start = tour.cost(&dm);
        let cost = search.descend(&mut tour, start);
        let optimum = 16.0 + 2f64.sqrt();
        assert!((cost - optimum).abs() < 1e-9);
        assert!((tour.cost(&dm) - optimum).abs() < 1e-9);
        assert_eq!(tour.to_visit_order(), vec![0, 5, 1, 2, 3, 4]);
    }

    #[test]
    fn test_first_improvement_also_converges() {
        let dm = random_points(40, 3);
        let candidates = CandidateIndex::build(&dm, 8);
        let order: Vec<usize> = (0..40).collect();
        let mut tour = Tour::from_visit_order(&order).expect("valid");

        let search =
            LocalSearch::new(&dm, &candidates).with_strategy(ImprovementStrategy::FirstImprovement);
        let start = tour.cost(&dm);
        let cost = search.descend(&mut tour, start);
        assert!(cost < start);
        assert!((tour.cost(&dm) - cost).abs() < 1e-6);
        assert_local_optimum(&search, &tour);
    }

    #[test]
    fn test_descend_tracked_cost_matches_recomputed() {
        for seed in 0..5 {
            let dm = random_points(60, seed);
            let candidates = CandidateIndex::build(&dm, 10);
            let mut tour =
                nearest_neighbor_tour(&dm, 0, &mut StdRng::seed_from_u64(seed)).expect("tour");
            let search = LocalSearch::new(&dm, &candidates);
            let start = tour.cost(&dm);
            let cost = search.descend(&mut tour, start);
            assert!(tour.is_valid_cycle());
            assert!((tour.cost(&dm) - cost).abs() < 1e-6);
            assert_local_optimum(&search, &tour);
        }
    }

    #[test]
    fn test_around_applies_moves_and_reports_each() {
        let dm = crossing_six();
        let candidates = CandidateIndex::build(&dm, 100);
        let mut tour = Tour::from_visit_order(&[0, 4, 5, 1, 2, 3]).expect("valid");
        let search = LocalSearch::new(&dm, &candidates);

        let mut seen = Vec::new();
        let applied = search.two_opt_around(&mut tour, 0, |t| seen.push(t.cost(&dm)));
        assert_eq!(applied, seen.len());
        assert!(applied >= 1);
        assert!(tour.is_valid_cycle());
        assert!(seen.windows(2).all(|w| w[1] < w[0]));
    }

    #[test]
    fn test_relocate_around_moves_anchor() {
        // 3 at (1.5, 5) sits between 2 and 4 far from its neighbors.
        let dm = DistanceMatrix::from_points(&[
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(2.0, 0.0),
            Point::new(1.5, 5.0),
            Point::new(3.0, 0.0),
            Point::new(1.5, 6.0),
        ]);
        let candidates = CandidateIndex::build(&dm, 5);
        let mut tour = Tour::from_visit_order(&[0, 1, 2, 3, 4, 5]).expect("valid");
        let before = tour.cost(&dm);
        let search = LocalSearch::new(&dm, &candidates);

        let mut calls = 0;
        let applied = search.relocate_around(&mut tour, 3, |_| calls += 1);
        assert!(applied >= 1);
        assert_eq!(applied, calls);
        assert!(tour.is_valid_cycle());
        assert!(tour.cost(&dm) < before);
    }

    #[test]
    fn test_no_moves_on_three_nodes() {
        let dm = DistanceMatrix::from_points(&[
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(0.0, 1.0),
        ]);
        let candidates = CandidateIndex::build(&dm, 100);
        let mut tour = Tour::from_visit_order(&[0, 1, 2]).expect("valid");
        let search = LocalSearch::new(&dm, &candidates);
        let start = tour.cost(&dm);
        let cost = search.descend(&mut tour, start);
        assert!((cost - tour.cost(&dm)).abs() < 1e-12);
        assert!(tour.is_valid_cycle());
    }

    proptest! {
        #[test]
        fn prop_random_moves_keep_single_cycle(
            seed in 0u64..1000,
            moves in proptest::collection::vec((0usize..25, 0usize..25, any::<bool>()), 1..60),
        ) {
            let dm = random_points(25, seed);
            let candidates = CandidateIndex::build(&dm, 6);
            let mut tour = Tour::from_visit_order(&(0..25).collect::<Vec<_>>()).expect("valid");
            let mut tracked = tour.cost(&dm);

            for (i, j, use_two_opt) in moves {
                if i == j {
                    continue;
                }
                if use_two_opt {
                    if tour.are_adjacent(i, j) {
                        continue;
                    }
                    tracked += two_opt_delta(&tour, &dm, i, j);
                    apply_two_opt(&mut tour, i, j);
                } else {
                    if tour.successor(j) == i {
                        continue;
                    }
                    tracked += relocate_delta(&tour, &dm, i, j);
                    apply_relocate(&mut tour, i, j);
                }
                prop_assert!(tour.is_valid_cycle());
            }
            prop_assert!((tour.cost(&dm) - tracked).abs() < 1e-6);

            let search = LocalSearch::new(&dm, &candidates);
            let cost = search.descend(&mut tour, tracked);
            prop_assert!(tour.is_valid_cycle());
            prop_assert!((tour.cost(&dm) - cost).abs() < 1e-6);
            prop_assert_eq!(tour.to_visit_order().len(), 25);
        }
    }
}
