//! Local search over linked tours.
//!
//! - [`two_opt`](two_opt_delta) — Edge exchange with segment reversal
//! - [`relocate`](relocate_delta) — Single-node reinsertion
//! - [`LocalSearch`] — Candidate-restricted scans and descent to a local optimum

mod engine;
mod relocate;
mod two_opt;

pub use engine::{ImprovementStrategy, LocalSearch, IMPROVEMENT_EPSILON};
pub use relocate::{apply_relocate, relocate_delta};
pub use two_opt::{apply_two_opt, two_opt_delta};
