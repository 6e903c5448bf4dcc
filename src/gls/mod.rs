//! Guided local search.
//!
//! - [`GlsRunner`] — Outer perturb/re-optimize loop with incumbent tracking
//! - [`GuideStrategy`] — Pluggable source of guided distances
//! - [`EdgePenalty`] — Per-edge perturbation counts
//!
//! # References
//!
//! - Voudouris & Tsang (1999), "Guided local search and its application to
//!   the traveling salesman problem"
//! - Arnold & Sörensen (2019), "Knowledge-guided local search for the
//!   vehicle routing problem"

mod config;
mod guide;
mod penalty;
mod runner;

pub use config::{GlsConfig, TargetSelection};
pub(crate) use config::option_duration_secs;
pub use guide::{
    FnGuide, GuideRequest, GuideResponse, GuideStrategy, IdentityGuide, PenaltyGuide,
    ProcessGuide, UtilityGuide,
};
pub use penalty::EdgePenalty;
pub use runner::{GlsResult, GlsRunner};
