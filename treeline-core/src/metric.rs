//! Pairwise distance metrics for tree construction.
//!
//! A metric rewrites the Euclidean distance between two points into the
//! weight the spanning tree should use for that pair. Implementations must
//! never return less than the Euclidean distance they are given: the tree
//! traversal prunes subtrees by box distance, and a metric that shrinks
//! distances would make that pruning discard valid candidates.

/// A binary distance functor over original point indices.
pub trait Metric: Sync {
    /// Weight of the edge between points `i` and `j`, given their
    /// Euclidean distance. The result must be `>= euclidean`.
    fn eval(&self, i: usize, j: usize, euclidean: f32) -> f32;
}

/// The identity metric: edge weight is the Euclidean distance.
#[derive(Clone, Copy, Debug, Default)]
pub struct Euclidean;

impl Metric for Euclidean {
    fn eval(&self, _i: usize, _j: usize, euclidean: f32) -> f32 {
        euclidean
    }
}

/// Mutual reachability distance: `max(core[i], core[j], euclidean)`.
///
/// `core` holds each point's distance to its k-th nearest neighbour. Since
/// core distances are non-negative, the result is always at least the
/// Euclidean distance.
#[derive(Clone, Copy, Debug)]
pub struct MutualReachability<'a> {
    core: &'a [f32],
}

impl<'a> MutualReachability<'a> {
    /// Wraps a precomputed core-distance array.
    #[must_use]
    pub fn new(core: &'a [f32]) -> Self {
        Self { core }
    }
}

impl Metric for MutualReachability<'_> {
    fn eval(&self, i: usize, j: usize, euclidean: f32) -> f32 {
        self.core[i].max(self.core[j]).max(euclidean)
    }
}
