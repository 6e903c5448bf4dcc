//! End-to-end instance evaluation and guide scoring.

mod evaluator;

pub use evaluator::{
    BatchReport, EvaluatorConfig, InstanceEvaluator, InstanceOutcome, FAILURE_GAP,
    HARD_LIMIT_SLACK,
};
