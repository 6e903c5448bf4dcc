//! Problem instances and their on-disk layout.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::Point;
use crate::distance::DistanceMatrix;
use crate::error::DataError;

/// Tolerance used when validating symmetry and the zero diagonal.
const VALIDATION_TOL: f64 = 1e-9;

/// A validated symmetric TSP instance.
///
/// Holds node coordinates, the distance matrix used for all cost
/// accounting, and the known optimal tour cost used to report gaps.
///
/// # Examples
///
/// ```
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
/// assert_eq!(square.num_nodes(), 4);
/// assert!((square.gap(4.4) - 10.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
pub struct TspInstance {
    name: String,
    points: Vec<Point>,
    distances: DistanceMatrix,
    optimal_cost: f64,
}

impl TspInstance {
    /// Creates an instance from coordinates and an explicit distance matrix.
    ///
    /// `points` may be empty when only distances are known.
    pub fn new(
        name: impl Into<String>,
        points: Vec<Point>,
        distances: DistanceMatrix,
        optimal_cost: f64,
    ) -> Result<Self, DataError> {
        let name = name.into();
        validate_distances(&name, &distances)?;
        if !points.is_empty() && points.len() != distances.size() {
            return Err(DataError::CoordinateCountMismatch {
                instance: name,
                coords: points.len(),
                distances: distances.size(),
            });
        }
        if !optimal_cost.is_finite() || optimal_cost <= 0.0 {
            return Err(DataError::InvalidOptimalCost {
                instance: name,
                value: optimal_cost,
            });
        }
        Ok(Self {
            name,
            points,
            distances,
            optimal_cost,
        })
    }

    /// Creates an instance with Euclidean distances between `points`.
    pub fn from_points(
        name: impl Into<String>,
        points: Vec<Point>,
        optimal_cost: f64,
    ) -> Result<Self, DataError> {
        let distances = DistanceMatrix::from_points(&points);
        Self::new(name, points, distances, optimal_cost)
    }

    /// Instance name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node coordinates (may be empty).
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// True distances.
    pub fn distances(&self) -> &DistanceMatrix {
        &self.distances
    }

    /// Known optimal tour cost.
    pub fn optimal_cost(&self) -> f64 {
        self.optimal_cost
    }

    /// Number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.distances.size()
    }

    /// Percentage by which `cost` exceeds the optimal cost.
    pub fn gap(&self, cost: f64) -> f64 {
        (cost / self.optimal_cost - 1.0) * 100.0
    }
}

fn validate_distances(name: &str, distances: &DistanceMatrix) -> Result<(), DataError> {
    let n = distances.size();
    if n < 3 {
        return Err(DataError::TooFewNodes {
            instance: name.to_string(),
            nodes: n,
        });
    }
    for i in 0..n {
        for j in 0..n {
            let d = distances.get(i, j);
            if !d.is_finite() {
                return Err(DataError::NonFiniteDistance {
                    instance: name.to_string(),
                    from: i,
                    to: j,
                });
            }
            if d < 0.0 {
                return Err(DataError::NegativeDistance {
                    instance: name.to_string(),
                    from: i,
                    to: j,
                    value: d,
                });
            }
        }
        let diag = distances.get(i, i);
        if diag.abs() > VALIDATION_TOL {
            return Err(DataError::NonZeroDiagonal {
                instance: name.to_string(),
                node: i,
                value: diag,
            });
        }
    }
    for i in 0..n {
        for j in (i + 1)..n {
            if (distances.get(i, j) - distances.get(j, i)).abs() > VALIDATION_TOL {
                return Err(DataError::Asymmetric {
                    instance: name.to_string(),
                    from: i,
                    to: j,
                });
            }
        }
    }
    Ok(())
}

/// One entry of an instance batch file.
///
/// `distances` may be omitted, in which case Euclidean distances are
/// computed from `coords`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceFile {
    /// Instance name; defaults to the entry's position in the batch.
    #[serde(default)]
    pub name: Option<String>,
    /// Node coordinates as `[x, y]` pairs.
    #[serde(default)]
    pub coords: Vec<[f64; 2]>,
    /// Explicit distance matrix rows.
    #[serde(default)]
    pub distances: Option<Vec<Vec<f64>>>,
    /// Known optimal tour cost.
    #[serde(default)]
    pub optimal_cost: Option<f64>,
}

impl InstanceFile {
    /// Validates this entry and turns it into an instance.
    pub fn into_instance(self, index: usize) -> Result<TspInstance, DataError> {
        let name = self.name.unwrap_or_else(|| format!("instance-{index}"));
        let optimal_cost = self
            .optimal_cost
            .ok_or_else(|| DataError::MissingOptimalCost {
                instance: name.clone(),
            })?;
        let points: Vec<Point> = self.coords.into_iter().map(Point::from).collect();

        let distances = match self.distances {
            Some(rows) => {
                let n = rows.len();
                if let Some((row, found)) = rows
                    .iter()
                    .enumerate()
                    .find(|(_, r)| r.len() != n)
                    .map(|(i, r)| (i, r.len()))
                {
                    return Err(DataError::ShapeMismatch {
                        instance: name,
                        expected: n,
                        row: Some(row),
                        found,
                    });
                }
                DistanceMatrix::from_rows(&rows).ok_or(DataError::ShapeMismatch {
                    instance: name.clone(),
                    expected: n,
                    row: None,
                    found: n,
                })?
            }
            None => {
                if let Some(pos) = points.iter().position(|p| !p.is_finite()) {
                    return Err(DataError::NonFiniteDistance {
                        instance: name,
                        from: pos,
                        to: pos,
                    });
                }
                DistanceMatrix::from_points(&points)
            }
        };

        TspInstance::new(name, points, distances, optimal_cost)
    }
}

/// Parses a JSON array of [`InstanceFile`] entries.
///
/// Any malformed entry aborts the whole batch.
pub fn parse_instances(json: &str) -> Result<Vec<TspInstance>, DataError> {
    let entries: Vec<InstanceFile> =
        serde_json::from_str(json).map_err(|e| DataError::Parse(e.to_string()))?;
    entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| entry.into_instance(i))
        .collect()
}

/// Reads and parses an instance batch file.
pub fn load_instances(path: impl AsRef<Path>) -> Result<Vec<TspInstance>, DataError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)
        .map_err(|e| DataError::Io(format!("{}: {e}", path.display())))?;
    let instances = parse_instances(&json)?;
    tracing::debug!(
        "loaded {} instances from {}",
        instances.len(),
        path.display()
    );
    Ok(instances)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_points() -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(0.0, 1.0),
            Point::new(1.0, 1.0),
            Point::new(1.0, 0.0),
        ]
    }

    #[test]
    fn test_from_points() {
        let inst = TspInstance::from_points("sq", square_points(), 4.0).expect("valid");
        assert_eq!(inst.name(), "sq");
        assert_eq!(inst.num_nodes(), 4);
        assert_eq!(inst.points().len(), 4);
        assert!((inst.distances().get(0, 2) - 2f64.sqrt()).abs() < 1e-10);
    }

    #[test]
    fn test_gap() {
        let inst = TspInstance::from_points("sq", square_points(), 4.0).expect("valid");
        assert_eq!(inst.gap(4.0), 0.0);
        assert!((inst.gap(5.0) - 25.0).abs() < 1e-10);
    }

    #[test]
    fn test_too_few_nodes() {
        let err = TspInstance::from_points("tiny", square_points()[..2].to_vec(), 2.0)
            .expect_err("too small");
        assert!(matches!(err, DataError::TooFewNodes { nodes: 2, .. }));
    }

    #[test]
    fn test_invalid_optimal_cost() {
        let err = TspInstance::from_points("sq", square_points(), 0.0).expect_err("zero");
        assert!(matches!(err, DataError::InvalidOptimalCost { .. }));
        let err = TspInstance::from_points("sq", square_points(), f64::NAN).expect_err("nan");
        assert!(matches!(err, DataError::InvalidOptimalCost { .. }));
    }

    #[test]
    fn test_asymmetric_rejected() {
        let mut dm = DistanceMatrix::from_points(&square_points());
        dm.set(0, 1, 3.0);
        let err = TspInstance::new("sq", vec![], dm, 4.0).expect_err("asymmetric");
        assert!(matches!(err, DataError::Asymmetric { from: 0, to: 1, .. }));
    }

    #[test]
    fn test_negative_and_diagonal_rejected() {
        let mut dm = DistanceMatrix::from_points(&square_points());
        dm.set(1, 2, -1.0);
        dm.set(2, 1, -1.0);
        let err = TspInstance::new("sq", vec![], dm, 4.0).expect_err("negative");
        assert!(matches!(err, DataError::NegativeDistance { .. }));

        let mut dm = DistanceMatrix::from_points(&square_points());
        dm.set(3, 3, 0.5);
        let err = TspInstance::new("sq", vec![], dm, 4.0).expect_err("diagonal");
        assert!(matches!(err, DataError::NonZeroDiagonal { node: 3, .. }));
    }

    #[test]
    fn test_coordinate_count_mismatch() {
        let dm = DistanceMatrix::from_points(&square_points());
        let err = TspInstance::new("sq", square_points()[..3].to_vec(), dm, 4.0)
            .expect_err("mismatch");
        assert!(matches!(
            err,
            DataError::CoordinateCountMismatch {
                coords: 3,
                distances: 4,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_coords_only() {
        let json = r#"[{"name": "sq", "coords": [[0,0],[0,1],[1,1],[1,0]], "optimal_cost": 4.0}]"#;
        let instances = parse_instances(json).expect("valid");
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].name(), "sq");
        assert!((instances[0].distances().get(0, 1) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_parse_explicit_distances_and_default_name() {
        let json = r#"[{"distances": [[0,1,2],[1,0,1],[2,1,0]], "optimal_cost": 4.0}]"#;
        let instances = parse_instances(json).expect("valid");
        assert_eq!(instances[0].name(), "instance-0");
        assert_eq!(instances[0].distances().get(0, 2), 2.0);
        assert!(instances[0].points().is_empty());
    }

    #[test]
    fn test_parse_missing_optimal_cost() {
        let json = r#"[{"name": "x", "coords": [[0,0],[0,1],[1,1]]}]"#;
        let err = parse_instances(json).expect_err("missing");
        assert_eq!(
            err,
            DataError::MissingOptimalCost {
                instance: "x".into()
            }
        );
    }

    #[test]
    fn test_parse_ragged_distances() {
        let json = r#"[{"name": "x", "distances": [[0,1,2],[1,0],[2,1,0]], "optimal_cost": 3.0}]"#;
        let err = parse_instances(json).expect_err("ragged");
        assert!(matches!(
            err,
            DataError::ShapeMismatch {
                row: Some(1),
                found: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_invalid_json() {
        let err = parse_instances("{not json").expect_err("invalid");
        assert!(matches!(err, DataError::Parse(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_instances("/definitely/not/here.json").expect_err("io");
        assert!(matches!(err, DataError::Io(_)));
    }
}
