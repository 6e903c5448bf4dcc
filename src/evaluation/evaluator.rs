//! Instance evaluator: solves instances end to end and reports optimality
//! gaps.
//!
//! Each instance is solved on its own thread under a hard wall-clock
//! budget. Any per-instance failure (guide error, malformed guide output,
//! panic, budget overrun) becomes [`FAILURE_GAP`] in the report instead of
//! an error, so one bad instance never aborts a batch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::constructive::nearest_neighbor_tour;
use crate::distance::{CandidateIndex, DEFAULT_CANDIDATES};
use crate::error::SolveError;
use crate::gls::{option_duration_secs, GlsConfig, GlsResult, GlsRunner, GuideStrategy};
use crate::models::TspInstance;

/// Gap reported for an instance that could not be solved.
pub const FAILURE_GAP: f64 = 1e10;

/// Slack added to the search time limit when no hard limit is configured.
pub const HARD_LIMIT_SLACK: Duration = Duration::from_secs(15);

/// Configuration for [`InstanceEvaluator`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use u_gls::evaluation::EvaluatorConfig;
/// use u_gls::gls::GlsConfig;
///
/// let config = EvaluatorConfig::default()
///     .with_gls(GlsConfig::default().with_time_limit(Duration::from_secs(2)))
///     .with_threads(4);
/// assert_eq!(config.hard_budget(), Duration::from_secs(17));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Search configuration applied to every instance.
    pub gls: GlsConfig,

    /// Candidate list length per node (capped at N - 1).
    pub candidate_count: usize,

    /// Start node of the nearest-neighbor construction.
    pub depot: usize,

    /// Seed of each instance's random generator.
    pub seed: u64,

    /// Per-instance wall-clock budget. `None` = search time limit plus
    /// [`HARD_LIMIT_SLACK`].
    #[serde(with = "option_duration_secs")]
    pub hard_time_limit: Option<Duration>,

    /// Number of instances solved concurrently.
    pub threads: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            gls: GlsConfig::default(),
            candidate_count: DEFAULT_CANDIDATES,
            depot: 0,
            seed: 2024,
            hard_time_limit: None,
            threads: 1,
        }
    }
}

impl EvaluatorConfig {
    pub fn with_gls(mut self, gls: GlsConfig) -> Self {
        self.gls = gls;
        self
    }

    pub fn with_candidate_count(mut self, k: usize) -> Self {
        self.candidate_count = k;
        self
    }

    pub fn with_depot(mut self, depot: usize) -> Self {
        self.depot = depot;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_hard_time_limit(mut self, limit: Duration) -> Self {
        self.hard_time_limit = Some(limit);
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Effective per-instance wall-clock budget.
    pub fn hard_budget(&self) -> Duration {
        self.hard_time_limit
            .unwrap_or_else(|| self.gls.time_limit.saturating_add(HARD_LIMIT_SLACK))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.gls.validate()?;
        if self.candidate_count == 0 {
            return Err("candidate_count must be at least 1".into());
        }
        if self.threads == 0 {
            return Err("threads must be at least 1".into());
        }
        Ok(())
    }
}

/// Result of one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceOutcome {
    /// Instance name.
    pub name: String,

    /// Optimality gap in percent, or [`FAILURE_GAP`].
    pub gap: f64,

    /// True cost of the best tour, if the instance was solved.
    pub best_cost: Option<f64>,

    /// Best tour as a visiting order from node 0, if the instance was solved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tour: Option<Vec<usize>>,

    /// Outer iterations performed.
    pub iterations: usize,

    /// Wall-clock time spent on the instance.
    pub elapsed_secs: f64,

    /// Failure description, if the instance was not solved.
    pub error: Option<String>,
}

impl InstanceOutcome {
    fn failed(name: &str, err: &SolveError, elapsed: Duration) -> Self {
        Self {
            name: name.to_string(),
            gap: FAILURE_GAP,
            best_cost: None,
            tour: None,
            iterations: 0,
            elapsed_secs: elapsed.as_secs_f64(),
            error: Some(err.to_string()),
        }
    }

    /// Whether the instance fell back to the failure sentinel.
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Aggregate over a batch of instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Mean gap over all outcomes; [`FAILURE_GAP`] for an empty batch.
    pub mean_gap: f64,

    /// Per-instance outcomes, in input order.
    pub outcomes: Vec<InstanceOutcome>,
}

impl BatchReport {
    /// Builds a report from per-instance outcomes.
    pub fn from_outcomes(outcomes: Vec<InstanceOutcome>) -> Self {
        let mean_gap = if outcomes.is_empty() {
            FAILURE_GAP
        } else {
            outcomes.iter().map(|o| o.gap).sum::<f64>() / outcomes.len() as f64
        };
        Self { mean_gap, outcomes }
    }

    /// Number of instances that fell back to the failure sentinel.
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }
}

/// Drives guided local search over instances and scores a guide.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use u_gls::evaluation::{EvaluatorConfig, InstanceEvaluator};
/// use u_gls::gls::{GlsConfig, PenaltyGuide};
/// use u_gls::models::{Point, TspInstance};
///
/// let square = TspInstance::from_points(
///     "square",
///     vec![
///         Point::new(0.0, 0.0),
///         Point::new(0.0, 1.0),
///         Point::new(1.0, 1.0),
///         Point::new(1.0, 0.0),
///     ],
///     4.0,
/// )
/// .unwrap();
///
/// let config = EvaluatorConfig::default().with_gls(GlsConfig::default().with_max_iterations(20));
/// let evaluator = InstanceEvaluator::new(config);
/// let fitness = evaluator.fitness(&[Arc::new(square)], Arc::new(PenaltyGuide::default()));
/// assert!(fitness.abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InstanceEvaluator {
    config: EvaluatorConfig,
}

impl InstanceEvaluator {
    /// Creates an evaluator.
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    /// The evaluator's configuration.
    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Solves one instance on the calling thread, without a hard budget.
    ///
    /// Builds the candidate lists, constructs a nearest-neighbor tour from
    /// the configured depot and runs [`GlsRunner`].
    pub fn solve_instance(
        &self,
        instance: &TspInstance,
        guide: &dyn GuideStrategy,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<GlsResult, SolveError> {
        self.config.validate().map_err(SolveError::InvalidConfig)?;
        let distances = instance.distances();
        let n = instance.num_nodes();
        if self.config.depot >= n {
            return Err(SolveError::InvalidConfig(format!(
                "depot {} out of range for {n} nodes",
                self.config.depot
            )));
        }

        let candidates = CandidateIndex::build(distances, self.config.candidate_count);
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let initial = nearest_neighbor_tour(distances, self.config.depot, &mut rng).ok_or_else(
            || SolveError::InvalidConfig(format!("no tour from depot {}", self.config.depot)),
        )?;

        GlsRunner::run_with_cancel(
            distances,
            &candidates,
            initial,
            guide,
            &self.config.gls,
            cancel,
        )
    }

    /// Solves one instance on a dedicated thread under the hard budget.
    ///
    /// Never fails: errors, panics and budget overruns are reported as
    /// [`FAILURE_GAP`] with a description.
    ///
    /// On a budget overrun the search is asked to stop and the solver thread
    /// is detached. It keeps running until its next outer-iteration check,
    /// so a batch may briefly hold more than `threads` solver threads, and
    /// an in-process guide that never returns keeps its thread alive for
    /// the life of the process. Strategies that may hang belong behind
    /// [`ProcessGuide`](crate::gls::ProcessGuide), whose worker is killed
    /// at its call timeout.
    pub fn evaluate_instance(
        &self,
        instance: Arc<TspInstance>,
        guide: Arc<dyn GuideStrategy>,
    ) -> InstanceOutcome {
        let started = Instant::now();
        let budget = self.config.hard_budget();
        let cancel = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();

        let worker = {
            let evaluator = self.clone();
            let instance = Arc::clone(&instance);
            let cancel = Arc::clone(&cancel);
            thread::Builder::new()
                .name(format!("gls-{}", instance.name()))
                .spawn(move || {
                    let result = evaluator.solve_instance(&instance, guide.as_ref(), Some(cancel));
                    let _ = tx.send(result);
                })
        };
        if let Err(e) = worker {
            return self.failure(&instance, SolveError::Spawn(e.to_string()), started);
        }

        match rx.recv_timeout(budget) {
            Ok(Ok(result)) => {
                let gap = instance.gap(result.best_cost);
                let elapsed = started.elapsed();
                tracing::info!(
                    "instance {}: gap {:.4}% (cost {:.4}, optimal {:.4}, {} iterations, {:.2}s)",
                    instance.name(),
                    gap,
                    result.best_cost,
                    instance.optimal_cost(),
                    result.iterations,
                    elapsed.as_secs_f64()
                );
                InstanceOutcome {
                    name: instance.name().to_string(),
                    gap,
                    best_cost: Some(result.best_cost),
                    tour: Some(result.best_order()),
                    iterations: result.iterations,
                    elapsed_secs: elapsed.as_secs_f64(),
                    error: None,
                }
            }
            Ok(Err(err)) => self.failure(&instance, err, started),
            Err(RecvTimeoutError::Timeout) => {
                cancel.store(true, Ordering::Relaxed);
                let err = SolveError::BudgetExceeded {
                    seconds: budget.as_secs_f64(),
                };
                self.failure(&instance, err, started)
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.failure(&instance, SolveError::Panicked, started)
            }
        }
    }

    fn failure(&self, instance: &TspInstance, err: SolveError, started: Instant) -> InstanceOutcome {
        tracing::warn!(
            "instance {}: {}; reporting gap {:e}",
            instance.name(),
            err,
            FAILURE_GAP
        );
        InstanceOutcome::failed(instance.name(), &err, started.elapsed())
    }

    /// Evaluates a batch of instances with one guide.
    ///
    /// With the `parallel` feature, up to `threads` instances run at once.
    /// Outcomes keep the input order.
    pub fn evaluate(
        &self,
        instances: &[Arc<TspInstance>],
        guide: Arc<dyn GuideStrategy>,
    ) -> BatchReport {
        let started = Instant::now();
        let outcomes = self.run_batch(instances, &guide);
        let report = BatchReport::from_outcomes(outcomes);
        tracing::info!(
            "guide {}: mean gap {:.4}% over {} instances ({} failed) in {:.2}s",
            guide.name(),
            report.mean_gap,
            report.outcomes.len(),
            report.failures(),
            started.elapsed().as_secs_f64()
        );
        report
    }

    /// Mean gap of `guide` over `instances`; lower is better.
    pub fn fitness(&self, instances: &[Arc<TspInstance>], guide: Arc<dyn GuideStrategy>) -> f64 {
        self.evaluate(instances, guide).mean_gap
    }

    #[cfg(feature = "parallel")]
    fn run_batch(
        &self,
        instances: &[Arc<TspInstance>],
        guide: &Arc<dyn GuideStrategy>,
    ) -> Vec<InstanceOutcome> {
        use rayon::prelude::*;

        if self.config.threads <= 1 {
            return self.run_sequential(instances, guide);
        }
        let run = || -> Vec<InstanceOutcome> {
            instances
                .par_iter()
                .map(|instance| self.evaluate_instance(Arc::clone(instance), Arc::clone(guide)))
                .collect()
        };
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .build()
        {
            Ok(pool) => pool.install(run),
            Err(e) => {
                tracing::warn!("failed to build thread pool ({}); using the global pool", e);
                run()
            }
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn run_batch(
        &self,
        instances: &[Arc<TspInstance>],
        guide: &Arc<dyn GuideStrategy>,
    ) -> Vec<InstanceOutcome> {
        self.run_sequential(instances, guide)
    }

    fn run_sequential(
        &self,
        instances: &[Arc<TspInstance>],
        guide: &Arc<dyn GuideStrategy>,
    ) -> Vec<InstanceOutcome> {
        instances
            .iter()
            .map(|instance| self.evaluate_instance(Arc::clone(instance), Arc::clone(guide)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceMatrix;
    use crate::error::GuideError;
    use crate::gls::{EdgePenalty, FnGuide, IdentityGuide, PenaltyGuide};
    use crate::models::Point;

    fn square() -> Arc<TspInstance> {
        Arc::new(
            TspInstance::from_points(
                "square",
                vec![
                    Point::new(0.0, 0.0),
                    Point::new(0.0, 1.0),
                    Point::new(1.0, 1.0),
                    Point::new(1.0, 0.0),
                ],
                4.0,
            )
            .expect("valid"),
        )
    }

    fn crossing_six() -> Arc<TspInstance> {
        Arc::new(
            TspInstance::from_points(
                "crossing-six",
                vec![
                    Point::new(5.0, 6.0),
                    Point::new(6.0, 1.0),
                    Point::new(6.0, 0.0),
                    Point::new(3.0, 0.0),
                    Point::new(3.0, 6.0),
                    Point::new(5.0, 2.0),
                ],
                16.0 + 2f64.sqrt(),
            )
            .expect("valid"),
        )
    }

    fn quick() -> EvaluatorConfig {
        EvaluatorConfig::default()
            .with_gls(GlsConfig::default().with_max_iterations(20))
            .with_hard_time_limit(Duration::from_secs(30))
    }

    #[test]
    fn test_default_config() {
        let config = EvaluatorConfig::default();
        assert_eq!(config.candidate_count, 100);
        assert_eq!(config.depot, 0);
        assert_eq!(config.seed, 2024);
        assert_eq!(config.threads, 1);
        assert_eq!(config.hard_budget(), Duration::from_secs(25));
        assert!(config.validate().is_ok());
        assert!(config.clone().with_threads(0).validate().is_err());
        assert!(config.with_candidate_count(0).validate().is_err());
    }

    #[test]
    fn test_square_has_zero_gap() {
        let evaluator = InstanceEvaluator::new(quick());
        let outcome = evaluator.evaluate_instance(square(), Arc::new(IdentityGuide));
        assert!(outcome.error.is_none(), "{:?}", outcome.error);
        assert!(outcome.gap.abs() < 1e-9);
        assert_eq!(outcome.best_cost.map(|c| (c - 4.0).abs() < 1e-12), Some(true));
        assert_eq!(outcome.iterations, 20);
        assert_eq!(outcome.tour.as_ref().map(Vec::len), Some(4));
    }

    #[test]
    fn test_crossing_instance_reaches_optimum() {
        let evaluator = InstanceEvaluator::new(quick());
        let result = evaluator
            .solve_instance(&crossing_six(), &PenaltyGuide::default(), None)
            .expect("solve");
        assert!((result.best_cost - (16.0 + 2f64.sqrt())).abs() < 1e-9);
        assert!(result.best.is_valid_cycle());
    }

    #[test]
    fn test_wrong_shape_guide_reports_sentinel() {
        let guide = FnGuide::new("wrong-shape", |_: &DistanceMatrix, _: &[usize], _: &EdgePenalty| {
            Ok(DistanceMatrix::new(2))
        });
        let evaluator = InstanceEvaluator::new(quick());
        let outcome = evaluator.evaluate_instance(crossing_six(), Arc::new(guide));
        assert_eq!(outcome.gap, FAILURE_GAP);
        assert!(outcome.is_failure());
        assert!(outcome.best_cost.is_none());
    }

    #[test]
    fn test_failing_guide_reports_sentinel() {
        let guide = FnGuide::new("failing", |_: &DistanceMatrix, _: &[usize], _: &EdgePenalty| {
            Err(GuideError::Failed("no answer".into()))
        });
        let evaluator = InstanceEvaluator::new(quick());
        let outcome = evaluator.evaluate_instance(square(), Arc::new(guide));
        assert_eq!(outcome.gap, FAILURE_GAP);
        assert!(outcome.error.as_deref().is_some_and(|e| e.contains("no answer")));
    }

    #[test]
    fn test_panicking_guide_reports_sentinel() {
        let guide = FnGuide::new("panics", |_: &DistanceMatrix, _: &[usize], _: &EdgePenalty| {
            panic!("guide blew up")
        });
        let evaluator = InstanceEvaluator::new(quick());
        let outcome = evaluator.evaluate_instance(square(), Arc::new(guide));
        assert_eq!(outcome.gap, FAILURE_GAP);
        assert_eq!(
            outcome.error.as_deref(),
            Some(SolveError::Panicked.to_string().as_str())
        );
    }

    #[test]
    fn test_hard_budget_overrun_reports_sentinel() {
        let guide = FnGuide::new("slow", |d: &DistanceMatrix, _: &[usize], _: &EdgePenalty| {
            thread::sleep(Duration::from_millis(300));
            Ok(d.clone())
        });
        let config = quick().with_hard_time_limit(Duration::from_millis(50));
        let evaluator = InstanceEvaluator::new(config);
        let started = Instant::now();
        let outcome = evaluator.evaluate_instance(square(), Arc::new(guide));
        assert_eq!(outcome.gap, FAILURE_GAP);
        assert!(started.elapsed() < Duration::from_millis(280));
    }

    #[test]
    fn test_soft_time_limit_still_reports_real_gap() {
        let config = quick().with_gls(
            GlsConfig::default()
                .with_max_iterations(1_000_000)
                .with_time_limit(Duration::from_millis(20)),
        );
        let evaluator = InstanceEvaluator::new(config);
        let outcome = evaluator.evaluate_instance(crossing_six(), Arc::new(PenaltyGuide::default()));
        assert!(!outcome.is_failure());
        assert!(outcome.gap < FAILURE_GAP);
        assert!(outcome.gap.abs() < 1e-9);
    }

    #[test]
    fn test_spawn_failure_is_not_a_config_error() {
        let err = SolveError::Spawn("resource temporarily unavailable".into());
        let outcome = InstanceOutcome::failed("a", &err, Duration::ZERO);
        assert_eq!(outcome.gap, FAILURE_GAP);
        assert!(outcome.is_failure());
        let message = outcome.error.unwrap_or_default();
        assert!(message.contains("failed to spawn solver thread"));
        assert!(!message.contains("invalid configuration"));
    }

    #[test]
    fn test_depot_out_of_range() {
        let evaluator = InstanceEvaluator::new(quick().with_depot(10));
        let err = evaluator
            .solve_instance(&square(), &IdentityGuide, None)
            .unwrap_err();
        assert!(matches!(err, SolveError::InvalidConfig(_)));
    }

    #[test]
    fn test_batch_mean_includes_failures() {
        let guide: Arc<dyn GuideStrategy> = Arc::new(FnGuide::new(
            "six-only",
            |d: &DistanceMatrix, _: &[usize], _: &EdgePenalty| {
                if d.size() == 4 {
                    Err(GuideError::Failed("refusing squares".into()))
                } else {
                    Ok(d.clone())
                }
            },
        ));
        let evaluator = InstanceEvaluator::new(quick().with_threads(2));
        let report = evaluator.evaluate(&[square(), crossing_six()], guide);

        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.outcomes[0].name, "square");
        assert_eq!(report.outcomes[1].name, "crossing-six");
        assert_eq!(report.failures(), 1);
        assert!((report.mean_gap - FAILURE_GAP / 2.0).abs() < 1.0);
    }

    #[test]
    fn test_empty_batch_is_failure() {
        let evaluator = InstanceEvaluator::new(quick());
        assert_eq!(evaluator.fitness(&[], Arc::new(IdentityGuide)), FAILURE_GAP);
    }

    #[test]
    fn test_report_serializes() {
        let report = BatchReport::from_outcomes(vec![InstanceOutcome {
            name: "a".into(),
            gap: 1.5,
            best_cost: Some(10.0),
            tour: None,
            iterations: 3,
            elapsed_secs: 0.25,
            error: None,
        }]);
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["mean_gap"], 1.5);
        assert_eq!(json["outcomes"][0]["name"], "a");
        assert!(json["outcomes"][0].get("tour").is_none());
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = quick().with_seed(7);
        let json = serde_json::to_string(&config).expect("serialize");
        let back: EvaluatorConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, config);

        let defaults: EvaluatorConfig = serde_json::from_str("{}").expect("deserialize");
        assert_eq!(defaults, EvaluatorConfig::default());
    }
}
