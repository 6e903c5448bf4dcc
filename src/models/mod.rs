//! Domain model types for the symmetric TSP.
//!
//! Provides node coordinates, validated problem instances with their
//! reference costs, and the linked cyclic tour the search mutates.

mod instance;
mod point;
mod tour;

pub use instance::{load_instances, parse_instances, InstanceFile, TspInstance};
pub use point::Point;
pub use tour::Tour;
