//! Edge penalty counts.

/// Symmetric N×N count of how often each edge was targeted by perturbation.
///
/// Starts at zero and only grows during one instance's search. Increments
/// saturate instead of overflowing.
///
/// # Examples
///
/// ```
/// use u_gls::gls::EdgePenalty;
///
/// let mut penalty = EdgePenalty::new(4);
/// penalty.increment(1, 3);
/// penalty.increment(3, 1);
/// assert_eq!(penalty.get(1, 3), 2);
/// assert_eq!(penalty.get(3, 1), 2);
/// assert_eq!(penalty.total(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgePenalty {
    data: Vec<u32>,
    size: usize,
}

impl EdgePenalty {
    /// Creates an all-zero penalty matrix for `size` nodes.
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size * size],
            size,
        }
    }

    /// Penalty count of edge `(a, b)`.
    #[inline]
    pub fn get(&self, a: usize, b: usize) -> u32 {
        self.data[a * self.size + b]
    }

    /// Increments the count of edge `(a, b)` and its reverse `(b, a)`.
    #[inline]
    pub fn increment(&mut self, a: usize, b: usize) {
        let ab = a * self.size + b;
        self.data[ab] = self.data[ab].saturating_add(1);
        if a != b {
            let ba = b * self.size + a;
            self.data[ba] = self.data[ba].saturating_add(1);
        }
    }

    /// Clears all counts.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    /// Sum over all entries (both directions of every edge).
    pub fn total(&self) -> u64 {
        self.data.iter().map(|&p| u64::from(p)).sum()
    }

    /// Number of nodes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Row-major view of all counts.
    pub fn as_slice(&self) -> &[u32] {
        &self.data
    }

    /// Copies the counts into nested rows.
    pub fn to_rows(&self) -> Vec<Vec<u32>> {
        if self.size == 0 {
            return Vec::new();
        }
        self.data.chunks(self.size).map(<[u32]>::to_vec).collect()
    }
}
