//! Guide strategies.
//!
//! A guide turns the true distances, the current local-optimum tour and the
//! edge penalty counts into a *guided* distance matrix of the same shape.
//! The search compares the two matrices to pick which edges to perturb, and
//! runs its perturbation moves against the guided distances. True cost
//! accounting never uses guided values.
//!
//! In-process guides implement [`GuideStrategy`] directly. [`ProcessGuide`]
//! delegates to an external program through a JSON request/response pair,
//! so arbitrary or untrusted strategies cannot take the solver down with
//! them.

use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::config::TargetSelection;
use super::penalty::EdgePenalty;
use crate::distance::DistanceMatrix;
use crate::error::GuideError;

/// Produces guided distances from true distances, tour and penalties.
///
/// Implementations must not depend on mutation of their inputs and must
/// return a matrix with the same dimension as `edge_distance`. The search
/// treats a wrongly shaped or non-finite result as a failed instance.
///
/// Calls run on the solver thread and cannot be interrupted. A strategy
/// that may block or loop forever should run out of process through
/// [`ProcessGuide`].
pub trait GuideStrategy: Send + Sync {
    /// Computes the guided distance matrix.
    fn update_edge_distance(
        &self,
        edge_distance: &DistanceMatrix,
        local_opt_tour: &[usize],
        edge_n_used: &EdgePenalty,
    ) -> Result<DistanceMatrix, GuideError>;

    /// Which end of the gap this guide encodes, if it has a preference.
    ///
    /// Guides that raise the edges they want kicked out return
    /// [`TargetSelection::MostPenalized`]. Used when the search
    /// configuration leaves the selection unset.
    fn preferred_selection(&self) -> Option<TargetSelection> {
        None
    }

    /// Short name used in logs and reports.
    fn name(&self) -> &str {
        "guide"
    }
}

/// Checks a guide result before the search uses it.
pub(crate) fn validate_guided(expected: usize, guided: &DistanceMatrix) -> Result<(), GuideError> {
    if guided.size() != expected {
        return Err(GuideError::ShapeMismatch {
            expected,
            found: guided.size(),
        });
    }
    match guided.first_non_finite() {
        Some((from, to)) => Err(GuideError::NonFinite { from, to }),
        None => Ok(()),
    }
}

/// Mean edge length of the closed tour `order`, or 0 for an empty order.
fn mean_edge_length(distances: &DistanceMatrix, order: &[usize]) -> f64 {
    if order.is_empty() {
        return 0.0;
    }
    let n = order.len();
    let total: f64 = (0..n)
        .map(|k| distances.get(order[k], order[(k + 1) % n]))
        .sum();
    total / n as f64
}

/// Closed-tour edges of `order` with their utility `d / (1 + p)`.
fn tour_utilities(
    distances: &DistanceMatrix,
    order: &[usize],
    penalty: &EdgePenalty,
) -> Vec<(usize, usize, f64)> {
    let n = order.len();
    (0..n)
        .map(|k| {
            let (a, b) = (order[k], order[(k + 1) % n]);
            let utility = distances.get(a, b) / (1.0 + f64::from(penalty.get(a, b)));
            (a, b, utility)
        })
        .collect()
}

fn check_tour(distances: &DistanceMatrix, order: &[usize]) -> Result<(), GuideError> {
    let n = distances.size();
    if order.len() != n || order.iter().any(|&node| node >= n) {
        return Err(GuideError::Failed(format!(
            "tour of {} nodes does not fit a {n}-node matrix",
            order.len()
        )));
    }
    Ok(())
}

/// Returns the true distances unchanged.
///
/// Every gap is zero, so perturbation targets fall back to the tie-break
/// order. Useful as a baseline and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityGuide;

impl GuideStrategy for IdentityGuide {
    fn update_edge_distance(
        &self,
        edge_distance: &DistanceMatrix,
        _local_opt_tour: &[usize],
        _edge_n_used: &EdgePenalty,
    ) -> Result<DistanceMatrix, GuideError> {
        Ok(edge_distance.clone())
    }

    fn name(&self) -> &str {
        "identity"
    }
}

/// Classical GLS guide over the local optimum's edges.
///
/// Every tour edge `e` has utility `u(e) = d(e) / (1 + p(e))` and is raised
/// by `λ · ā · u(e) / u_max`, where `ā` is the mean tour edge length. The
/// max-utility edges get the full `λ · ā`; all other entries keep their
/// true distance. The gap therefore ranks the tour edges by utility, so
/// with [`TargetSelection::MostPenalized`] the search penalizes and kicks
/// out long, rarely penalized edges first. An edge penalized `p` times is
/// raised `1 + p` times less than an unpenalized edge of the same length.
///
/// # Examples
///
/// ```
/// use u_gls::distance::DistanceMatrix;
/// use u_gls::gls::{EdgePenalty, GuideStrategy, PenaltyGuide, TargetSelection};
/// use u_gls::models::Point;
///
/// let d = DistanceMatrix::from_points(&[
///     Point::new(0.0, 0.0),
///     Point::new(0.0, 1.0),
///     Point::new(2.0, 1.0),
///     Point::new(2.0, 0.0),
/// ]);
/// let guide = PenaltyGuide::new(1.0);
/// let guided = guide
///     .update_edge_distance(&d, &[0, 1, 2, 3], &EdgePenalty::new(4))
///     .unwrap();
/// // Mean tour edge is 1.5; the long edges get all of it, the short ones half.
/// assert!((guided.get(1, 2) - 3.5).abs() < 1e-12);
/// assert!((guided.get(0, 1) - 1.75).abs() < 1e-12);
/// assert_eq!(guided.get(0, 2), d.get(0, 2));
/// assert_eq!(guide.preferred_selection(), Some(TargetSelection::MostPenalized));
/// ```
///
/// # Reference
///
/// Voudouris, C. & Tsang, E. (1999). "Guided local search and its
/// application to the traveling salesman problem", *European Journal of
/// Operational Research* 113(2), 469-499.
#[derive(Debug, Clone, Copy)]
pub struct PenaltyGuide {
    lambda: f64,
}

impl PenaltyGuide {
    /// Creates a penalty guide with weight `lambda`.
    pub fn new(lambda: f64) -> Self {
        Self { lambda }
    }

    /// Penalty weight.
    pub fn lambda(&self) -> f64 {
        self.lambda
    }
}

impl Default for PenaltyGuide {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl GuideStrategy for PenaltyGuide {
    fn update_edge_distance(
        &self,
        edge_distance: &DistanceMatrix,
        local_opt_tour: &[usize],
        edge_n_used: &EdgePenalty,
    ) -> Result<DistanceMatrix, GuideError> {
        check_tour(edge_distance, local_opt_tour)?;
        let edges = tour_utilities(edge_distance, local_opt_tour, edge_n_used);
        let max_utility = edges.iter().map(|e| e.2).fold(0.0, f64::max);
        let mut guided = edge_distance.clone();
        if max_utility <= 0.0 {
            return Ok(guided);
        }

        let scale = self.lambda * mean_edge_length(edge_distance, local_opt_tour) / max_utility;
        for (a, b, utility) in edges {
            let value = edge_distance.get(a, b) + scale * utility;
            guided.set(a, b, value);
            guided.set(b, a, value);
        }
        Ok(guided)
    }

    fn preferred_selection(&self) -> Option<TargetSelection> {
        Some(TargetSelection::MostPenalized)
    }

    fn name(&self) -> &str {
        "penalty"
    }
}

/// Raises the tour edges of maximum utility `d / (1 + p)` by `λ · ā`.
///
/// Only edges of the local-optimum tour are candidates. Long edges that
/// have rarely been penalized get raised first. Gentler than
/// [`PenaltyGuide`]: usually a single edge differs from the true
/// distances, so the remaining targets of a round fall back to the
/// tie-break order.
#[derive(Debug, Clone, Copy)]
pub struct UtilityGuide {
    lambda: f64,
}

impl UtilityGuide {
    /// Creates a utility guide with weight `lambda`.
    pub fn new(lambda: f64) -> Self {
        Self { lambda }
    }

    /// Penalty weight.
    pub fn lambda(&self) -> f64 {
        self.lambda
    }
}

impl Default for UtilityGuide {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl GuideStrategy for UtilityGuide {
    fn update_edge_distance(
        &self,
        edge_distance: &DistanceMatrix,
        local_opt_tour: &[usize],
        edge_n_used: &EdgePenalty,
    ) -> Result<DistanceMatrix, GuideError> {
        check_tour(edge_distance, local_opt_tour)?;
        let edges = tour_utilities(edge_distance, local_opt_tour, edge_n_used);
        let max_utility = edges.iter().map(|e| e.2).fold(f64::NEG_INFINITY, f64::max);
        let raise = self.lambda * mean_edge_length(edge_distance, local_opt_tour);

        let mut guided = edge_distance.clone();
        for (a, b, utility) in edges {
            if utility >= max_utility - 1e-12 {
                let value = edge_distance.get(a, b) + raise;
                guided.set(a, b, value);
                guided.set(b, a, value);
            }
        }
        Ok(guided)
    }

    fn preferred_selection(&self) -> Option<TargetSelection> {
        Some(TargetSelection::MostPenalized)
    }

    fn name(&self) -> &str {
        "utility"
    }
}

/// Wraps a closure as a guide.
///
/// # Examples
///
/// ```
/// use u_gls::distance::DistanceMatrix;
/// use u_gls::gls::{EdgePenalty, FnGuide, GuideStrategy};
///
/// let halve = FnGuide::new("halve", |d: &DistanceMatrix, _: &[usize], _: &EdgePenalty| {
///     let mut out = d.clone();
///     for a in 0..d.size() {
///         for b in 0..d.size() {
///             out.set(a, b, d.get(a, b) / 2.0);
///         }
///     }
///     Ok(out)
/// });
///
/// let mut d = DistanceMatrix::new(3);
/// d.set(0, 1, 4.0);
/// let guided = halve
///     .update_edge_distance(&d, &[0, 1, 2], &EdgePenalty::new(3))
///     .unwrap();
/// assert_eq!(guided.get(0, 1), 2.0);
/// assert_eq!(halve.name(), "halve");
/// ```
pub struct FnGuide<F> {
    name: String,
    selection: Option<TargetSelection>,
    f: F,
}

impl<F> FnGuide<F>
where
    F: Fn(&DistanceMatrix, &[usize], &EdgePenalty) -> Result<DistanceMatrix, GuideError>
        + Send
        + Sync,
{
    /// Creates a named closure guide.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            selection: None,
            f,
        }
    }

    /// Declares which end of the gap the closure encodes.
    pub fn with_preferred_selection(mut self, selection: TargetSelection) -> Self {
        self.selection = Some(selection);
        self
    }
}

impl<F> GuideStrategy for FnGuide<F>
where
    F: Fn(&DistanceMatrix, &[usize], &EdgePenalty) -> Result<DistanceMatrix, GuideError>
        + Send
        + Sync,
{
    fn update_edge_distance(
        &self,
        edge_distance: &DistanceMatrix,
        local_opt_tour: &[usize],
        edge_n_used: &EdgePenalty,
    ) -> Result<DistanceMatrix, GuideError> {
        (self.f)(edge_distance, local_opt_tour, edge_n_used)
    }

    fn preferred_selection(&self) -> Option<TargetSelection> {
        self.selection
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// JSON request written to a guide worker's stdin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuideRequest {
    /// True distances, row-major.
    pub edge_distance: Vec<Vec<f64>>,
    /// Current local-optimum tour as a visiting order.
    pub local_opt_tour: Vec<usize>,
    /// Edge penalty counts.
    pub edge_n_used: Vec<Vec<u32>>,
}

/// JSON response read from a guide worker's stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuideResponse {
    /// Guided distances, same shape as the request's `edge_distance`.
    pub updated_edge_distance: Vec<Vec<f64>>,
}

const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(5);
const WORKER_DRAIN_GRACE: Duration = Duration::from_millis(100);

/// Runs a guide as an external program, one process per call.
///
/// The worker receives a [`GuideRequest`] on stdin and must print a
/// [`GuideResponse`] on stdout, then exit with status 0. A worker that
/// fails to start, exits non-zero, prints malformed JSON or outlives the
/// per-call timeout produces [`GuideError::Worker`]; a timed-out worker is
/// killed. The response must arrive within the same timeout, so a worker
/// that leaves a background process holding its stdout also fails. Such a
/// process is not killed, and the thread reading the pipe stays blocked
/// until it exits. Worker stderr is inherited.
#[derive(Debug, Clone)]
pub struct ProcessGuide {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessGuide {
    /// Creates a worker guide for `program` with a 10 s call timeout.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program being run.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn call(&self, request: &GuideRequest) -> Result<GuideResponse, GuideError> {
        let payload =
            serde_json::to_vec(request).map_err(|e| GuideError::Worker(e.to_string()))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| GuideError::Worker(format!("failed to start {}: {e}", self.program)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| GuideError::Worker("worker stdin not captured".into()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| GuideError::Worker("worker stdout not captured".into()))?;

        // Pipe threads are never joined. A grandchild may hold a pipe open
        // past the worker's exit, so every wait on the reader is bounded.
        thread::spawn(move || stdin.write_all(&payload));
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = tx.send(stdout.read_to_end(&mut buf).map(|_| buf));
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = rx.recv_timeout(WORKER_DRAIN_GRACE);
                    return Err(GuideError::Worker(format!(
                        "{} timed out after {:.3}s",
                        self.program,
                        self.timeout.as_secs_f64()
                    )));
                }
                Ok(None) => thread::sleep(WORKER_POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    return Err(GuideError::Worker(e.to_string()));
                }
            }
        };

        let wait = deadline
            .saturating_duration_since(Instant::now())
            .max(WORKER_DRAIN_GRACE);
        let output = match rx.recv_timeout(wait) {
            Ok(read) => read.map_err(|e| GuideError::Worker(e.to_string()))?,
            Err(RecvTimeoutError::Timeout) => {
                return Err(GuideError::Worker(format!(
                    "{} exited but its stdout stayed open",
                    self.program
                )))
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(GuideError::Worker("worker reader thread panicked".into()))
            }
        };

        if !status.success() {
            return Err(GuideError::Worker(format!("{} exited with {status}", self.program)));
        }

        serde_json::from_slice(&output)
            .map_err(|e| GuideError::Worker(format!("malformed response: {e}")))
    }
}

impl GuideStrategy for ProcessGuide {
    fn update_edge_distance(
        &self,
        edge_distance: &DistanceMatrix,
        local_opt_tour: &[usize],
        edge_n_used: &EdgePenalty,
    ) -> Result<DistanceMatrix, GuideError> {
        let request = GuideRequest {
            edge_distance: edge_distance.to_rows(),
            local_opt_tour: local_opt_tour.to_vec(),
            edge_n_used: edge_n_used.to_rows(),
        };
        let response = self.call(&request)?;
        let rows = response.updated_edge_distance;
        DistanceMatrix::from_rows(&rows).ok_or(GuideError::ShapeMismatch {
            expected: edge_distance.size(),
            found: rows.len(),
        })
    }

    fn name(&self) -> &str {
        &self.program
    }
}
