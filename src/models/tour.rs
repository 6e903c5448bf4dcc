//! Doubly linked cyclic tour.
//!
//! The tour is an arena of `N` link slots indexed by node id. Slot `v` holds
//! the predecessor and successor of node `v`, so the local search operators
//! can splice and reverse the cycle without any position bookkeeping.

use crate::distance::DistanceMatrix;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Link {
    prev: usize,
    next: usize,
}

/// A Hamiltonian cycle over nodes `0..N`.
///
/// Every node stores exactly one predecessor and one successor. Following
/// successor links from any node visits all `N` nodes once and returns to
/// the start; the operators in [`crate::local_search`] preserve this.
///
/// # Examples
///
/// ```
/// use u_gls::models::Tour;
///
/// let tour = Tour::from_visit_order(&[2, 0, 3, 1]).unwrap();
/// assert_eq!(tour.successor(0), 3);
/// assert_eq!(tour.predecessor(2), 1);
/// // Visit order always starts at node 0.
/// assert_eq!(tour.to_visit_order(), vec![0, 3, 1, 2]);
/// assert!(tour.is_valid_cycle());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tour {
    links: Vec<Link>,
}

impl Tour {
    /// Builds the linked cycle from an explicit visiting order.
    ///
    /// Returns `None` if `order` is empty or is not a permutation of
    /// `0..order.len()`.
    pub fn from_visit_order(order: &[usize]) -> Option<Self> {
        let n = order.len();
        if n == 0 {
            return None;
        }

        let mut seen = vec![false; n];
        for &node in order {
            if node >= n || seen[node] {
                return None;
            }
            seen[node] = true;
        }

        let mut links = vec![Link { prev: 0, next: 0 }; n];
        for (pos, &node) in order.iter().enumerate() {
            let next = order[(pos + 1) % n];
            links[node].next = next;
            links[next].prev = node;
        }
        Some(Self { links })
    }

    /// Returns the visiting sequence starting at node 0.
    pub fn to_visit_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.links.len());
        let mut node = 0;
        for _ in 0..self.links.len() {
            order.push(node);
            node = self.links[node].next;
        }
        order
    }

    /// Number of nodes in the tour.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Always `false`; a tour has at least one node.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Node visited right after `node`.
    #[inline]
    pub fn successor(&self, node: usize) -> usize {
        self.links[node].next
    }

    /// Node visited right before `node`.
    #[inline]
    pub fn predecessor(&self, node: usize) -> usize {
        self.links[node].prev
    }

    /// Returns `true` if `a` and `b` share a tour edge.
    #[inline]
    pub fn are_adjacent(&self, a: usize, b: usize) -> bool {
        self.links[a].next == b || self.links[a].prev == b
    }

    /// Sum of all edge distances, including the closing edge.
    pub fn cost(&self, distances: &DistanceMatrix) -> f64 {
        let mut total = 0.0;
        let mut node = 0;
        for _ in 0..self.links.len() {
            let next = self.links[node].next;
            total += distances.get(node, next);
            node = next;
        }
        total
    }

    /// Checks the single-cycle invariant.
    ///
    /// Predecessor and successor links must mirror each other, and walking
    /// successors from node 0 must visit every node exactly once before
    /// returning to node 0.
    pub fn is_valid_cycle(&self) -> bool {
        let n = self.links.len();
        if n == 0 {
            return false;
        }
        for (node, link) in self.links.iter().enumerate() {
            if link.next >= n || link.prev >= n {
                return false;
            }
            if self.links[link.next].prev != node {
                return false;
            }
        }

        let mut seen = vec![false; n];
        let mut node = 0;
        for _ in 0..n {
            if seen[node] {
                return false;
            }
            seen[node] = true;
            node = self.links[node].next;
        }
        node == 0
    }

    /// Makes `to` the successor of `from`.
    #[inline]
    pub(crate) fn connect(&mut self, from: usize, to: usize) {
        self.links[from].next = to;
        self.links[to].prev = from;
    }

    /// Swaps the predecessor and successor of `node`.
    #[inline]
    pub(crate) fn flip(&mut self, node: usize) {
        let link = &mut self.links[node];
        std::mem::swap(&mut link.prev, &mut link.next);
    }
}
