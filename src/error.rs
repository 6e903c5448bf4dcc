//! Error types.
//!
//! Errors fall into two tiers. [`DataError`] is raised while loading or
//! validating instance data and aborts a whole batch. [`GuideError`] and
//! [`SolveError`] are scoped to a single instance; the evaluator turns them
//! into the failure sentinel instead of propagating them.

use std::fmt;

/// Malformed instance input, detected at load time.
#[derive(Debug, Clone, PartialEq)]
pub enum DataError {
    /// The instance has fewer nodes than a tour needs.
    TooFewNodes {
        /// Instance name.
        instance: String,
        /// Number of nodes found.
        nodes: usize,
    },
    /// A matrix is not square or does not match the node count.
    ShapeMismatch {
        /// Instance name.
        instance: String,
        /// Expected dimension.
        expected: usize,
        /// Offending row index, or `None` when the row count itself is wrong.
        row: Option<usize>,
        /// Length found.
        found: usize,
    },
    /// Coordinates and distance matrix disagree on the node count.
    CoordinateCountMismatch {
        /// Instance name.
        instance: String,
        /// Number of coordinates.
        coords: usize,
        /// Matrix dimension.
        distances: usize,
    },
    /// A distance is NaN or infinite.
    NonFiniteDistance {
        /// Instance name.
        instance: String,
        /// Row.
        from: usize,
        /// Column.
        to: usize,
    },
    /// A distance is negative.
    NegativeDistance {
        /// Instance name.
        instance: String,
        /// Row.
        from: usize,
        /// Column.
        to: usize,
        /// Offending value.
        value: f64,
    },
    /// `distance(i, i)` is not zero.
    NonZeroDiagonal {
        /// Instance name.
        instance: String,
        /// Node.
        node: usize,
        /// Offending value.
        value: f64,
    },
    /// `distance(a, b) != distance(b, a)`.
    Asymmetric {
        /// Instance name.
        instance: String,
        /// Row.
        from: usize,
        /// Column.
        to: usize,
    },
    /// No reference cost was supplied.
    MissingOptimalCost {
        /// Instance name.
        instance: String,
    },
    /// The reference cost is not a positive finite number.
    InvalidOptimalCost {
        /// Instance name.
        instance: String,
        /// Offending value.
        value: f64,
    },
    /// The instance file could not be read.
    Io(String),
    /// The instance file is not valid JSON for the expected layout.
    Parse(String),
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataError::TooFewNodes { instance, nodes } => {
                write!(f, "instance {instance}: {nodes} nodes, at least 3 required")
            }
            DataError::ShapeMismatch {
                instance,
                expected,
                row: Some(row),
                found,
            } => write!(
                f,
                "instance {instance}: distance row {row} has {found} entries, expected {expected}"
            ),
            DataError::ShapeMismatch {
                instance,
                expected,
                row: None,
                found,
            } => write!(
                f,
                "instance {instance}: distance matrix has {found} rows, expected {expected}"
            ),
            DataError::CoordinateCountMismatch {
                instance,
                coords,
                distances,
            } => write!(
                f,
                "instance {instance}: {coords} coordinates but a {distances}x{distances} distance matrix"
            ),
            DataError::NonFiniteDistance { instance, from, to } => {
                write!(f, "instance {instance}: distance({from}, {to}) is not finite")
            }
            DataError::NegativeDistance {
                instance,
                from,
                to,
                value,
            } => write!(
                f,
                "instance {instance}: distance({from}, {to}) = {value} is negative"
            ),
            DataError::NonZeroDiagonal {
                instance,
                node,
                value,
            } => write!(
                f,
                "instance {instance}: distance({node}, {node}) = {value}, expected 0"
            ),
            DataError::Asymmetric { instance, from, to } => write!(
                f,
                "instance {instance}: distance({from}, {to}) differs from distance({to}, {from})"
            ),
            DataError::MissingOptimalCost { instance } => {
                write!(f, "instance {instance}: missing optimal cost")
            }
            DataError::InvalidOptimalCost { instance, value } => write!(
                f,
                "instance {instance}: optimal cost {value} must be positive and finite"
            ),
            DataError::Io(msg) => write!(f, "failed to read instances: {msg}"),
            DataError::Parse(msg) => write!(f, "failed to parse instances: {msg}"),
        }
    }
}

impl std::error::Error for DataError {}

/// A guide strategy failed or returned a result the engine cannot use.
#[derive(Debug, Clone, PartialEq)]
pub enum GuideError {
    /// The guided matrix does not have the N×N shape of the input.
    ShapeMismatch {
        /// Expected dimension.
        expected: usize,
        /// Dimension (or row length) found.
        found: usize,
    },
    /// The guided matrix contains NaN or an infinity.
    NonFinite {
        /// Row.
        from: usize,
        /// Column.
        to: usize,
    },
    /// The strategy itself reported an error.
    Failed(String),
    /// The out-of-process worker could not produce a response.
    Worker(String),
}

impl fmt::Display for GuideError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuideError::ShapeMismatch { expected, found } => write!(
                f,
                "guided distances have dimension {found}, expected {expected}"
            ),
            GuideError::NonFinite { from, to } => {
                write!(f, "guided distance({from}, {to}) is not finite")
            }
            GuideError::Failed(msg) => write!(f, "guide strategy failed: {msg}"),
            GuideError::Worker(msg) => write!(f, "guide worker failed: {msg}"),
        }
    }
}

impl std::error::Error for GuideError {}

/// A single instance could not be solved.
#[derive(Debug, Clone, PartialEq)]
pub enum SolveError {
    /// The guide strategy failed.
    Guide(GuideError),
    /// The search configuration is invalid.
    InvalidConfig(String),
    /// The starting tour does not cover the instance.
    InvalidInitialTour {
        /// Nodes in the instance.
        expected: usize,
        /// Nodes in the tour.
        found: usize,
    },
    /// The evaluator's hard wall-clock budget ran out.
    BudgetExceeded {
        /// Budget in seconds.
        seconds: f64,
    },
    /// The solving thread panicked.
    Panicked,
    /// The solving thread could not be started.
    Spawn(String),
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveError::Guide(err) => write!(f, "{err}"),
            SolveError::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            SolveError::InvalidInitialTour { expected, found } => write!(
                f,
                "initial tour covers {found} nodes, instance has {expected}"
            ),
            SolveError::BudgetExceeded { seconds } => {
                write!(f, "hard time budget of {seconds:.3}s exceeded")
            }
            SolveError::Panicked => write!(f, "solver thread panicked"),
            SolveError::Spawn(msg) => write!(f, "failed to spawn solver thread: {msg}"),
        }
    }
}

impl std::error::Error for SolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SolveError::Guide(err) => Some(err),
            _ => None,
        }
    }
}

impl From<GuideError> for SolveError {
    fn from(err: GuideError) -> Self {
        SolveError::Guide(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_display_data_error() {
        let err = DataError::MissingOptimalCost {
            instance: "a".into(),
        };
        assert_eq!(err.to_string(), "instance a: missing optimal cost");

        let err = DataError::ShapeMismatch {
            instance: "b".into(),
            expected: 4,
            row: Some(2),
            found: 3,
        };
        assert!(err.to_string().contains("row 2"));
    }

    #[test]
    fn test_solve_error_wraps_guide_error() {
        let err: SolveError = GuideError::ShapeMismatch {
            expected: 5,
            found: 4,
        }
        .into();
        assert!(matches!(err, SolveError::Guide(_)));
        assert!(err.source().is_some());
        assert!(err.to_string().contains("expected 5"));
    }

    #[test]
    fn test_spawn_error_does_not_blame_config() {
        let err = SolveError::Spawn("resource temporarily unavailable".into());
        let message = err.to_string();
        assert!(message.starts_with("failed to spawn solver thread"));
        assert!(!message.contains("configuration"));
        assert!(err.source().is_none());
    }
}
