//! Nearest-neighbor constructive heuristic.
//!
//! Builds a tour greedily: starting from the depot, always visit the nearest
//! unvisited node, then close the cycle back to the depot.
//!
//! # Complexity
//!
//! O(n²) where n = number of nodes. This is a one-time setup cost before the
//! search starts.
//!
//! # Reference
//!
//! The simplest constructive heuristic for the TSP. Tour quality is
//! typically 20-25% above optimal, which local search then removes.

use rand::Rng;

use crate::distance::DistanceMatrix;
use crate::models::Tour;

/// Distances closer than this to the running minimum count as ties.
const TIE_TOL: f64 = 1e-12;

/// Constructs a tour using the nearest-neighbor heuristic.
///
/// Starting from `depot`, repeatedly appends the nearest unvisited node.
/// When several unvisited nodes are equally near, one of them is chosen
/// uniformly with `rng`; with distinct distances the result does not
/// depend on the RNG at all.
///
/// Returns `None` if the matrix is empty or `depot` is out of range.
///
/// # Examples
///
/// ```
/// use rand::SeedableRng;
/// use rand::rngs::StdRng;
/// use u_gls::models::Point;
/// use u_gls::distance::DistanceMatrix;
/// use u_gls::constructive::nearest_neighbor_tour;
///
/// let points = vec![
///     Point::new(0.0, 0.0),
///     Point::new(3.0, 0.0),
///     Point::new(1.0, 0.0),
///     Point::new(2.0, 0.0),
/// ];
/// let dm = DistanceMatrix::from_points(&points);
/// let mut rng = StdRng::seed_from_u64(42);
///
/// let tour = nearest_neighbor_tour(&dm, 0, &mut rng).unwrap();
/// assert_eq!(tour.to_visit_order(), vec![0, 2, 3, 1]);
/// ```
pub fn nearest_neighbor_tour<R: Rng>(
    distances: &DistanceMatrix,
    depot: usize,
    rng: &mut R,
) -> Option<Tour> {
    let n = distances.size();
    if depot >= n {
        return None;
    }

    let mut visited = vec![false; n];
    visited[depot] = true;
    let mut order = Vec::with_capacity(n);
    order.push(depot);

    let mut current = depot;
    let mut ties: Vec<usize> = Vec::new();

    while order.len() < n {
        let mut best = f64::INFINITY;
        ties.clear();
        for (j, &seen) in visited.iter().enumerate() {
            if seen {
                continue;
            }
            let d = distances.get(current, j);
            if d < best - TIE_TOL {
                best = d;
                ties.clear();
                ties.push(j);
            } else if (d - best).abs() <= TIE_TOL {
                ties.push(j);
            }
        }

        let next = match ties.len() {
            0 => break,
            1 => ties[0],
            len => ties[rng.random_range(0..len)],
        };
        visited[next] = true;
        order.push(next);
        current = next;
    }

    Tour::from_visit_order(&order)
}
