//! Label-array postprocessing into a compressed cluster layout.
//!
//! After cluster formation every point carries the id of its component
//! representative. This pass sorts a permutation of the points by that
//! label, keeps the runs that meet the minimum size, and lays the members
//! out in a CSR-style offsets/indices pair.

use rayon::prelude::*;

/// Clusters in compressed sparse row layout.
///
/// `offsets` has one entry per cluster plus a trailing total; the members
/// of cluster `c` are `indices[offsets[c]..offsets[c + 1]]`. Points that
/// belong to no kept cluster (noise) appear in no slice.
///
/// # Examples
/// ```
/// use treeline_core::{DbscanParams, Point3, dbscan};
///
/// let points = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(0.1, 0.0, 0.0),
///     Point3::new(9.0, 0.0, 0.0),
/// ];
/// let clusters = dbscan(&points, &DbscanParams::new(0.5)).expect("valid input");
/// assert_eq!(clusters.cluster_count(), 1);
/// assert_eq!(clusters.cluster(0), &[0, 1]);
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClusterSet {
    offsets: Vec<usize>,
    indices: Vec<u32>,
}

impl ClusterSet {
    pub(crate) fn empty() -> Self {
        Self {
            offsets: vec![0],
            indices: Vec::new(),
        }
    }

    /// Number of clusters.
    #[must_use]
    pub fn cluster_count(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Returns `true` when no cluster was kept.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cluster_count() == 0
    }

    /// Offsets array; `offsets[cluster_count]` is the total member count.
    #[must_use]
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Member indices of all clusters, grouped per cluster.
    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Members of cluster `cluster`.
    ///
    /// # Panics
    /// Panics when `cluster >= cluster_count()`.
    #[must_use]
    pub fn cluster(&self, cluster: usize) -> &[u32] {
        &self.indices[self.offsets[cluster]..self.offsets[cluster + 1]]
    }

    /// Iterates over the member slices of every cluster.
    pub fn iter(&self) -> impl Iterator<Item = &[u32]> + '_ {
        (0..self.cluster_count()).map(move |c| self.cluster(c))
    }
}

/// Groups `labels` into clusters of at least `min_size` members.
pub(crate) fn extract_clusters(labels: &[u32], min_size: usize) -> ClusterSet {
    let n = labels.len();
    if n == 0 || min_size > n {
        return ClusterSet::empty();
    }

    let mut perm: Vec<u32> = (0..n as u32).collect();
    perm.par_sort_unstable_by_key(|&p| (labels[p as usize], p));
    let sorted: Vec<u32> = perm.par_iter().map(|&p| labels[p as usize]).collect();

    // A position starts a kept run when its label differs from the previous
    // one and the same label still holds min_size - 1 slots later.
    let starts: Vec<usize> = (0..n)
        .into_par_iter()
        .filter(|&i| {
            let first = i == 0 || sorted[i] != sorted[i - 1];
            first && i + min_size - 1 < n && sorted[i + min_size - 1] == sorted[i]
        })
        .collect();

    let runs: Vec<(usize, usize)> = starts
        .par_iter()
        .map(|&start| {
            let mut end = start + min_size;
            while end < n && sorted[end] == sorted[start] {
                end += 1;
            }
            (start, end - start)
        })
        .collect();

    let mut offsets = Vec::with_capacity(runs.len() + 1);
    let mut total = 0;
    offsets.push(0);
    for &(_, size) in &runs {
        total += size;
        offsets.push(total);
    }

    let indices: Vec<u32> = runs
        .par_iter()
        .flat_map_iter(|&(start, size)| perm[start..start + size].iter().copied())
        .collect();

    ClusterSet { offsets, indices }
}
