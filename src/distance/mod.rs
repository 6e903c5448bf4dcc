//! Distance data.
//!
//! Provides a dense distance matrix and the k-nearest candidate lists that
//! bound every local search neighborhood.

mod candidates;
mod matrix;

pub use candidates::{CandidateIndex, DEFAULT_CANDIDATES};
pub use matrix::DistanceMatrix;
