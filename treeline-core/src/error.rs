//! Error types for the treeline core library.
//!
//! Every public error variant carries a stable machine-readable code for
//! logging and metrics surfaces.

use thiserror::Error;

/// Errors returned by the clustering engines.
#[derive(Clone, Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum ClusterError {
    /// The search radius must be a non-negative finite number.
    #[error("eps must be non-negative and finite (got {got})")]
    InvalidEps {
        /// The rejected value.
        got: f32,
    },
    /// A core point needs at least one neighbour (itself).
    #[error("core_min_size must be at least 1 (got {got})")]
    InvalidCoreMinSize {
        /// The rejected value.
        got: usize,
    },
    /// Reported clusters must contain at least two points.
    #[error("cluster_min_size must be at least 2 (got {got})")]
    InvalidClusterMinSize {
        /// The rejected value.
        got: usize,
    },
    /// Mutual reachability needs at least one neighbour per point.
    #[error("neighbour count k must be at least 1 (got {got})")]
    InvalidNeighbourCount {
        /// The rejected value.
        got: usize,
    },
    /// A point contained a NaN or infinite coordinate.
    #[error("point {index} has a non-finite coordinate")]
    NonFinitePoint {
        /// Index of the offending point.
        index: usize,
    },
    /// A tree cannot be built over zero points.
    #[error("cannot build a tree over an empty point cloud")]
    EmptyInput,
    /// The input exceeds the engine's 32-bit index space.
    #[error("input has {points} points but at most {max} are supported")]
    InputTooLarge {
        /// Number of points supplied.
        points: usize,
        /// Maximum supported point count.
        max: usize,
    },
    /// The tree is deeper than the fixed traversal stack.
    #[error("tree depth {depth} exceeds the traversal stack limit {limit}")]
    TraversalDepthExceeded {
        /// Depth of the constructed tree.
        depth: usize,
        /// Capacity of the traversal stack.
        limit: usize,
    },
    /// A merge round finished without adding an edge. Indicates a metric
    /// that violates `m(i, j, d) >= d`, or a defect.
    #[error("round {round} stalled with {components} components remaining")]
    Stalled {
        /// The round that made no progress (1-based).
        round: usize,
        /// Components still unmerged when the round ended.
        components: usize,
    },
    /// A synchronisation primitive became poisoned after a panic.
    #[error("lock for {resource} is poisoned")]
    LockPoisoned {
        /// Name of the poisoned resource.
        resource: &'static str,
    },
}

impl ClusterError {
    /// Returns a stable, machine-readable error code for the variant.
    #[must_use]
    pub const fn code(&self) -> ClusterErrorCode {
        match self {
            Self::InvalidEps { .. } => ClusterErrorCode::InvalidEps,
            Self::InvalidCoreMinSize { .. } => ClusterErrorCode::InvalidCoreMinSize,
            Self::InvalidClusterMinSize { .. } => ClusterErrorCode::InvalidClusterMinSize,
            Self::InvalidNeighbourCount { .. } => ClusterErrorCode::InvalidNeighbourCount,
            Self::NonFinitePoint { .. } => ClusterErrorCode::NonFinitePoint,
            Self::EmptyInput => ClusterErrorCode::EmptyInput,
            Self::InputTooLarge { .. } => ClusterErrorCode::InputTooLarge,
            Self::TraversalDepthExceeded { .. } => ClusterErrorCode::TraversalDepthExceeded,
            Self::Stalled { .. } => ClusterErrorCode::Stalled,
            Self::LockPoisoned { .. } => ClusterErrorCode::LockPoisoned,
        }
    }

    /// Returns `true` for errors caused by the caller's arguments rather
    /// than a runtime failure.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidEps { .. }
                | Self::InvalidCoreMinSize { .. }
                | Self::InvalidClusterMinSize { .. }
                | Self::InvalidNeighbourCount { .. }
                | Self::NonFinitePoint { .. }
                | Self::EmptyInput
                | Self::InputTooLarge { .. }
        )
    }
}

/// Machine-readable error codes for [`ClusterError`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum ClusterErrorCode {
    /// The search radius was negative or non-finite.
    InvalidEps,
    /// `core_min_size` was zero.
    InvalidCoreMinSize,
    /// `cluster_min_size` was below two.
    InvalidClusterMinSize,
    /// The neighbour count `k` was zero.
    InvalidNeighbourCount,
    /// A point contained a NaN or infinite coordinate.
    NonFinitePoint,
    /// A tree cannot be built over zero points.
    EmptyInput,
    /// The input exceeds the engine's index space.
    InputTooLarge,
    /// The tree is deeper than the fixed traversal stack.
    TraversalDepthExceeded,
    /// A merge round made no progress.
    Stalled,
    /// A synchronisation primitive became poisoned.
    LockPoisoned,
}

impl ClusterErrorCode {
    /// Returns the symbolic identifier for logging and metrics surfaces.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidEps => "INVALID_EPS",
            Self::InvalidCoreMinSize => "INVALID_CORE_MIN_SIZE",
            Self::InvalidClusterMinSize => "INVALID_CLUSTER_MIN_SIZE",
            Self::InvalidNeighbourCount => "INVALID_NEIGHBOUR_COUNT",
            Self::NonFinitePoint => "NON_FINITE_POINT",
            Self::EmptyInput => "EMPTY_INPUT",
            Self::InputTooLarge => "INPUT_TOO_LARGE",
            Self::TraversalDepthExceeded => "TRAVERSAL_DEPTH_EXCEEDED",
            Self::Stalled => "STALLED",
            Self::LockPoisoned => "LOCK_POISONED",
        }
    }
}

impl std::fmt::Display for ClusterErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convenient alias for results returned by the core API.
pub type Result<T> = core::result::Result<T, ClusterError>;
