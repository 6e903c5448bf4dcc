//! Guided local search execution loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::config::{GlsConfig, TargetSelection};
use super::guide::{validate_guided, GuideStrategy};
use super::penalty::EdgePenalty;
use crate::distance::{CandidateIndex, DistanceMatrix};
use crate::error::SolveError;
use crate::local_search::LocalSearch;
use crate::models::Tour;

/// Result of a guided local search run.
#[derive(Debug, Clone)]
pub struct GlsResult {
    /// The best tour found.
    pub best: Tour,

    /// True cost of the best tour.
    pub best_cost: f64,

    /// Outer iterations completed.
    pub iterations: usize,

    /// Number of restarts from the incumbent.
    pub restarts: usize,

    /// Whether the time limit ended the run.
    pub timed_out: bool,

    /// Whether cancelled externally.
    pub cancelled: bool,

    /// Incumbent cost after the initial descent and after every outer
    /// iteration.
    pub cost_history: Vec<f64>,
}

impl GlsResult {
    /// Best tour as a visiting order starting at node 0.
    pub fn best_order(&self) -> Vec<usize> {
        self.best.to_visit_order()
    }
}

/// Executes guided local search on one instance.
///
/// The loop:
///
/// 1. Descend from the initial tour to a local optimum; it becomes both the
///    current tour and the incumbent.
/// 2. Per outer iteration, call the guide `perturbation_moves` times. Each
///    call yields guided distances; the gap `guided - true` ranks edges
///    (most negative first, or largest first for guides that raise the
///    edges they target), and the top `targets_per_move` edges are
///    penalized and used as anchors for greedy 2-opt and relocate scans
///    under the guided distances.
/// 3. Descend again under the true distances, recompute the true cost and
///    update the incumbent on strict improvement.
/// 4. Every `restart_interval` iterations, continue from the incumbent.
///
/// Iteration count, cancellation and the time limit are checked only at the
/// top of each outer iteration.
///
/// # Examples
///
/// ```
/// use u_gls::models::{Point, Tour};
/// use u_gls::distance::{CandidateIndex, DistanceMatrix};
/// use u_gls::gls::{GlsConfig, GlsRunner, PenaltyGuide};
///
/// let dm = DistanceMatrix::from_points(&[
///     Point::new(0.0, 0.0),
///     Point::new(1.0, 1.0),
///     Point::new(0.0, 1.0),
///     Point::new(1.0, 0.0),
/// ]);
/// let candidates = CandidateIndex::build(&dm, 3);
/// let initial = Tour::from_visit_order(&[0, 1, 2, 3]).unwrap();
/// let config = GlsConfig::default().with_max_iterations(10);
///
/// let result = GlsRunner::run(&dm, &candidates, initial, &PenaltyGuide::default(), &config)
///     .unwrap();
/// assert!((result.best_cost - 4.0).abs() < 1e-10);
/// assert_eq!(result.iterations, 10);
/// ```
pub struct GlsRunner;

impl GlsRunner {
    /// Runs guided local search.
    pub fn run(
        distances: &DistanceMatrix,
        candidates: &CandidateIndex,
        initial: Tour,
        guide: &dyn GuideStrategy,
        config: &GlsConfig,
    ) -> Result<GlsResult, SolveError> {
        Self::run_with_cancel(distances, candidates, initial, guide, config, None)
    }

    /// Runs guided local search with an optional cancellation token.
    ///
    /// A raised token stops the run at the next outer iteration and returns
    /// the incumbent.
    pub fn run_with_cancel(
        distances: &DistanceMatrix,
        candidates: &CandidateIndex,
        initial: Tour,
        guide: &dyn GuideStrategy,
        config: &GlsConfig,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<GlsResult, SolveError> {
        config.validate().map_err(SolveError::InvalidConfig)?;
        let n = distances.size();
        if candidates.size() != n {
            return Err(SolveError::InvalidConfig(format!(
                "candidate index covers {} nodes, distance matrix has {n}",
                candidates.size()
            )));
        }
        if initial.len() != n {
            return Err(SolveError::InvalidInitialTour {
                expected: n,
                found: initial.len(),
            });
        }

        let started = Instant::now();
        let deadline = started.checked_add(config.time_limit);
        let search = LocalSearch::new(distances, candidates).with_strategy(config.strategy);
        let selection = config.resolve_selection(guide.preferred_selection());
        tracing::debug!("GLS: guide {} with {:?} targets", guide.name(), selection);

        let mut current = initial;
        let start_cost = current.cost(distances);
        search.descend(&mut current, start_cost);
        let mut current_cost = current.cost(distances);

        let mut best = current.clone();
        let mut best_cost = current_cost;
        let mut penalty = EdgePenalty::new(n);

        let mut iterations = 0usize;
        let mut restarts = 0usize;
        let mut timed_out = false;
        let mut cancelled = false;
        let mut cost_history = vec![best_cost];

        loop {
            if iterations >= config.max_iterations {
                break;
            }
            if let Some(ref flag) = cancel {
                if flag.load(Ordering::Relaxed) {
                    cancelled = true;
                    break;
                }
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                timed_out = true;
                break;
            }

            for _ in 0..config.perturbation_moves {
                let order = current.to_visit_order();
                let guided = guide.update_edge_distance(distances, &order, &penalty)?;
                validate_guided(n, &guided)?;

                let mut gap: Vec<f64> = guided
                    .as_slice()
                    .iter()
                    .zip(distances.as_slice())
                    .map(|(g, d)| g - d)
                    .collect();
                let targets = select_targets(&mut gap, n, config.targets_per_move, selection);

                let guided_search = LocalSearch::new(&guided, candidates);
                for (a, b) in targets {
                    penalty.increment(a, b);
                    tracing::trace!(
                        "GLS: perturbing edge ({}, {}) at iteration {}",
                        a,
                        b,
                        iterations
                    );
                    for node in [a, b] {
                        guided_search.two_opt_around(&mut current, node, |tour| {
                            current_cost = tour.cost(distances);
                        });
                        guided_search.relocate_around(&mut current, node, |tour| {
                            current_cost = tour.cost(distances);
                        });
                    }
                }
            }

            search.descend(&mut current, current_cost);
            current_cost = current.cost(distances);

            if current_cost < best_cost {
                tracing::debug!(
                    "GLS: new incumbent {:.6} at iteration {} (previous {:.6})",
                    current_cost,
                    iterations,
                    best_cost
                );
                best = current.clone();
                best_cost = current_cost;
            }

            iterations += 1;
            cost_history.push(best_cost);

            if config.restart_interval > 0 && iterations.is_multiple_of(config.restart_interval) {
                current = best.clone();
                current_cost = best_cost;
                restarts += 1;
            }
        }

        tracing::debug!(
            "GLS: finished after {} iterations in {:.3}s (best {:.6}, penalties {})",
            iterations,
            started.elapsed().as_secs_f64(),
            best_cost,
            penalty.total()
        );

        Ok(GlsResult {
            best,
            best_cost,
            iterations,
            restarts,
            timed_out,
            cancelled,
            cost_history,
        })
    }
}

/// Picks up to `count` distinct off-diagonal edges from the gap buffer.
///
/// Each pick zeroes the chosen entry and its reverse. An edge is never
/// picked twice in one call. Ties go to the lowest row-major index.
fn select_targets(
    gap: &mut [f64],
    n: usize,
    count: usize,
    selection: TargetSelection,
) -> Vec<(usize, usize)> {
    let key = |g: f64| match selection {
        TargetSelection::MostFavored => g,
        TargetSelection::MostPenalized => -g,
    };

    let mut picked: Vec<(usize, usize)> = Vec::with_capacity(count);
    while picked.len() < count {
        let mut best: Option<(f64, usize, usize)> = None;
        for a in 0..n {
            for b in 0..n {
                if a == b || picked.iter().any(|&(x, y)| (x, y) == (a, b) || (x, y) == (b, a)) {
                    continue;
                }
                let k = key(gap[a * n + b]);
                if best.is_none_or(|(bk, _, _)| k < bk) {
                    best = Some((k, a, b));
                }
            }
        }
        let Some((_, a, b)) = best else {
            break;
        };
        gap[a * n + b] = 0.0;
        gap[b * n + a] = 0.0;
        picked.push((a, b));
    }
    picked
}
