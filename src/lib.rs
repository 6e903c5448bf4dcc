//! # u-gls
//!
//! Guided local search for the symmetric traveling salesman problem, with
//! pluggable guide strategies and a batch evaluator that scores them.
//!
//! ## Modules
//!
//! - [`models`] — Coordinates, validated instances, and the linked cyclic [`Tour`](models::Tour)
//! - [`distance`] — Distance matrix and per-node candidate lists
//! - [`constructive`] — Nearest-neighbor construction
//! - [`local_search`] — 2-opt and relocate with candidate-restricted scans
//! - [`gls`] — Guided perturbation loop, edge penalties, guide strategies
//! - [`evaluation`] — Per-instance solving with failure isolation, batch gap reports
//! - [`error`] — Data, guide and solve errors

pub mod constructive;
pub mod distance;
pub mod error;
pub mod evaluation;
pub mod gls;
pub mod local_search;
pub mod models;
