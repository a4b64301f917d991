//! Density-based clustering (DBSCAN) driven by tree radius queries.
//!
//! Clusters form in a single sweep: every in-range pair reported by the
//! tree feeds a concurrent union-find. With `core_min_size == 1` the
//! problem degenerates to connected components and every pair is merged.
//! Otherwise a first sweep counts neighbourhoods, and the second sweep
//! merges core points with each other while border points attach to the
//! first core that claims them. No iteration to convergence is needed.

mod union_find;

use std::sync::atomic::{AtomicU32, Ordering};

use tracing::debug;

use crate::{
    bvh::Bvh,
    error::{ClusterError, Result},
    geometry::Point3,
    postprocess::{ClusterSet, extract_clusters},
};

use self::union_find::UnionFind;

/// Parameters for [`dbscan`].
///
/// # Examples
/// ```
/// use treeline_core::DbscanParams;
///
/// let params = DbscanParams::new(0.75)
///     .with_core_min_size(4)
///     .with_cluster_min_size(3);
/// assert_eq!(params.eps(), 0.75);
/// assert_eq!(params.core_min_size(), 4);
/// assert_eq!(params.cluster_min_size(), 3);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DbscanParams {
    eps: f32,
    core_min_size: usize,
    cluster_min_size: usize,
}

impl DbscanParams {
    /// Creates parameters with the given search radius, a core threshold of
    /// one neighbour, and a minimum reported cluster size of two.
    #[must_use]
    pub fn new(eps: f32) -> Self {
        Self {
            eps,
            core_min_size: 1,
            cluster_min_size: 2,
        }
    }

    /// Overrides the number of in-range neighbours (the point itself
    /// included) a point needs to count as core.
    #[must_use]
    pub fn with_core_min_size(mut self, core_min_size: usize) -> Self {
        self.core_min_size = core_min_size;
        self
    }

    /// Overrides the smallest cluster size worth reporting.
    #[must_use]
    pub fn with_cluster_min_size(mut self, cluster_min_size: usize) -> Self {
        self.cluster_min_size = cluster_min_size;
        self
    }

    /// The search radius.
    #[must_use]
    pub fn eps(&self) -> f32 {
        self.eps
    }

    /// Neighbours required for a core point.
    #[must_use]
    pub fn core_min_size(&self) -> usize {
        self.core_min_size
    }

    /// Smallest reported cluster size.
    #[must_use]
    pub fn cluster_min_size(&self) -> usize {
        self.cluster_min_size
    }

    fn validate(&self) -> Result<()> {
        if !self.eps.is_finite() || self.eps < 0.0 {
            return Err(ClusterError::InvalidEps { got: self.eps });
        }
        if self.core_min_size < 1 {
            return Err(ClusterError::InvalidCoreMinSize {
                got: self.core_min_size,
            });
        }
        if self.cluster_min_size < 2 {
            return Err(ClusterError::InvalidClusterMinSize {
                got: self.cluster_min_size,
            });
        }
        Ok(())
    }
}

/// Clusters `points` by density reachability.
///
/// Returns the kept clusters in CSR layout; an empty input produces an
/// empty [`ClusterSet`]. The partition of points into clusters does not
/// depend on thread count; which single core a border point attaches to
/// may vary between runs when it is in range of several.
///
/// # Errors
/// Returns a validation error for a negative or non-finite `eps`, a zero
/// `core_min_size`, a `cluster_min_size` below two, or a non-finite point.
///
/// # Examples
/// ```
/// use treeline_core::{DbscanParams, Point3, dbscan};
///
/// let points = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(0.0, 0.0, 0.5),
///     Point3::new(10.0, 0.0, 0.0),
/// ];
/// let clusters = dbscan(&points, &DbscanParams::new(1.0)).expect("valid input");
/// assert_eq!(clusters.cluster_count(), 1);
/// assert_eq!(clusters.cluster(0), &[0, 1]);
/// ```
pub fn dbscan(points: &[Point3], params: &DbscanParams) -> Result<ClusterSet> {
    params.validate()?;
    if points.is_empty() {
        return Ok(ClusterSet::empty());
    }

    let bvh = Bvh::build(points)?;
    debug!(
        points = points.len(),
        eps = params.eps,
        core_min_size = params.core_min_size,
        "search tree built"
    );

    let stat = UnionFind::new(points.len());
    if params.core_min_size == 1 {
        // Connected components: merge every in-range pair.
        bvh.query_radius(points, params.eps, &|i, j| {
            if i != j {
                stat.union(i, j);
            }
        });
    } else {
        let num_neigh: Vec<AtomicU32> =
            (0..points.len()).map(|_| AtomicU32::new(0)).collect();
        bvh.query_radius(points, params.eps, &|i, _j| {
            num_neigh[i as usize].fetch_add(1, Ordering::Relaxed);
        });
        debug!("neighbourhood counts computed");

        let core_min = u32::try_from(params.core_min_size).unwrap_or(u32::MAX);
        bvh.query_radius(points, params.eps, &|i, j| {
            if i == j || num_neigh[i as usize].load(Ordering::Relaxed) < core_min {
                return;
            }
            if num_neigh[j as usize].load(Ordering::Relaxed) >= core_min {
                stat.union(i, j);
            } else {
                // Border point: the first core to arrive keeps it.
                let _ = stat.claim(j, i);
            }
        });
    }
    stat.flatten();
    debug!("components flattened");

    let labels: Vec<u32> = (0..points.len() as u32).map(|i| stat.get(i)).collect();
    let clusters = extract_clusters(&labels, params.cluster_min_size);
    debug!(clusters = clusters.cluster_count(), "clusters extracted");
    Ok(clusters)
}
