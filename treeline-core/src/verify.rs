//! Reference checks for clustering results.
//!
//! Both routines rebuild the expected answer by brute force, so they are
//! quadratic in the number of points. They exist for the `--verify` flag
//! and for tests, not for production paths. Failures are reported through
//! `tracing` at warn level and collapse into a `false` return.

use tracing::warn;

use crate::{ClusterSet, DbscanParams, MstParams, Point3, WeightedEdge};

/// Checks a DBSCAN result against a brute-force reachability oracle.
///
/// Verifies CSR well-formedness, that every member of a cluster is a core
/// point or a border next to a core of the same cluster, that each
/// core-connected component lands in exactly one cluster, and that no
/// component with enough core points was dropped. Border points may attach
/// to any in-range core, so their placement is accepted wherever it is
/// consistent.
#[must_use]
pub fn verify_dbscan(points: &[Point3], params: &DbscanParams, clusters: &ClusterSet) -> bool {
    if !csr_well_formed(points.len(), clusters) {
        return false;
    }

    let eps = params.eps();
    let neighbours: Vec<Vec<usize>> = points
        .iter()
        .map(|&p| {
            points
                .iter()
                .enumerate()
                .filter(|(_, &q)| p.distance(q) <= eps)
                .map(|(j, _)| j)
                .collect()
        })
        .collect();
    let is_core: Vec<bool> = neighbours
        .iter()
        .map(|n| n.len() >= params.core_min_size())
        .collect();

    // Core-connected components by sequential union-find.
    let mut parent: Vec<usize> = (0..points.len()).collect();
    for (i, adjacent) in neighbours.iter().enumerate() {
        if !is_core[i] {
            continue;
        }
        for &j in adjacent {
            if is_core[j] {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[ri.max(rj)] = ri.min(rj);
                }
            }
        }
    }

    let mut assignment = vec![None; points.len()];
    for (cluster, members) in clusters.iter().enumerate() {
        for &member in members {
            assignment[member as usize] = Some(cluster);
        }
    }

    // Each cluster must hold the cores of exactly one component, plus
    // borders attached to a core of that cluster.
    let mut component_cluster: Vec<Option<usize>> = vec![None; points.len()];
    for (cluster, members) in clusters.iter().enumerate() {
        let mut cluster_root = None;
        for &member in members {
            let i = member as usize;
            if is_core[i] {
                let root = find(&mut parent, i);
                match cluster_root {
                    None => cluster_root = Some(root),
                    Some(existing) if existing != root => {
                        warn!(cluster, "cluster mixes two core components");
                        return false;
                    }
                    Some(_) => {}
                }
            } else {
                let attached = neighbours[i]
                    .iter()
                    .any(|&j| is_core[j] && assignment[j] == Some(cluster));
                if !attached {
                    warn!(point = i, "clustered point has no core neighbour in its cluster");
                    return false;
                }
            }
        }
        let Some(root) = cluster_root else {
            warn!(cluster, "cluster contains no core point");
            return false;
        };
        if component_cluster[root].is_some() {
            warn!(cluster, "core component split across clusters");
            return false;
        }
        component_cluster[root] = Some(cluster);
    }

    // Every core must land in its component's cluster; a dropped component
    // must genuinely be too small to report even counting only its cores.
    for i in 0..points.len() {
        if !is_core[i] {
            continue;
        }
        let root = find(&mut parent, i);
        match component_cluster[root] {
            Some(cluster) => {
                if assignment[i] != Some(cluster) {
                    warn!(point = i, "core point missing from its component's cluster");
                    return false;
                }
            }
            None => {
                let cores_in_component = (0..points.len())
                    .filter(|&j| is_core[j] && find(&mut parent, j) == root)
                    .count();
                if cores_in_component >= params.cluster_min_size() {
                    warn!(point = i, "component with enough cores was dropped");
                    return false;
                }
            }
        }
    }

    true
}

/// Checks a spanning tree against a brute-force Prim oracle.
///
/// Verifies the edge count, that the edges form a tree over the input,
/// that every weight matches the configured metric for its endpoints, and
/// that the sorted weight sequence equals the optimum (the weight multiset
/// of a minimum spanning tree is unique even under ties).
#[must_use]
pub fn verify_mst(points: &[Point3], params: &MstParams, edges: &[WeightedEdge]) -> bool {
    if points.len() < 2 {
        return edges.is_empty();
    }
    if edges.len() != points.len() - 1 {
        warn!(
            edges = edges.len(),
            expected = points.len() - 1,
            "wrong edge count"
        );
        return false;
    }

    let core = if params.neighbours() > 1 {
        let k = params.neighbours().min(points.len());
        points
            .iter()
            .map(|&p| {
                let mut dists: Vec<f32> = points.iter().map(|&q| p.distance(q)).collect();
                dists.sort_by(f32::total_cmp);
                dists[k - 1]
            })
            .collect()
    } else {
        vec![0.0; points.len()]
    };
    let weight_of = |i: usize, j: usize| core[i].max(core[j]).max(points[i].distance(points[j]));

    let mut parent: Vec<usize> = (0..points.len()).collect();
    for edge in edges {
        let (Ok(source), Ok(target)) = (
            usize::try_from(edge.source()),
            usize::try_from(edge.target()),
        ) else {
            warn!("edge endpoint is negative");
            return false;
        };
        if source >= points.len() || target >= points.len() {
            warn!(source, target, "edge endpoint out of range");
            return false;
        }
        if edge.weight() != weight_of(source, target) {
            warn!(source, target, "edge weight disagrees with the metric");
            return false;
        }
        let (rs, rt) = (find(&mut parent, source), find(&mut parent, target));
        if rs == rt {
            warn!(source, target, "edge closes a cycle");
            return false;
        }
        parent[rs.max(rt)] = rs.min(rt);
    }

    let mut weights: Vec<f32> = edges.iter().map(WeightedEdge::weight).collect();
    weights.sort_by(f32::total_cmp);
    if weights != optimal_weights(points.len(), weight_of) {
        warn!("total weight is not minimal");
        return false;
    }
    true
}

fn csr_well_formed(point_count: usize, clusters: &ClusterSet) -> bool {
    let offsets = clusters.offsets();
    if offsets.first() != Some(&0) {
        warn!("offsets must start at zero");
        return false;
    }
    if offsets.windows(2).any(|w| w[0] > w[1]) {
        warn!("offsets must be non-decreasing");
        return false;
    }
    if offsets.last() != Some(&clusters.indices().len()) {
        warn!("offsets must end at the index count");
        return false;
    }
    let mut seen = vec![false; point_count];
    for &index in clusters.indices() {
        let Some(slot) = seen.get_mut(index as usize) else {
            warn!(index, "cluster index out of range");
            return false;
        };
        if *slot {
            warn!(index, "cluster index repeated");
            return false;
        }
        *slot = true;
    }
    true
}

/// Sorted edge weights of the optimal tree, by Prim's algorithm.
fn optimal_weights(count: usize, weight: impl Fn(usize, usize) -> f32) -> Vec<f32> {
    let mut in_tree = vec![false; count];
    let mut dist = vec![f32::INFINITY; count];
    let mut weights = Vec::with_capacity(count - 1);
    in_tree[0] = true;
    for (j, d) in dist.iter_mut().enumerate().skip(1) {
        *d = weight(0, j);
    }
    for _ in 1..count {
        let mut best = usize::MAX;
        let mut best_dist = f32::INFINITY;
        for (j, &d) in dist.iter().enumerate() {
            if !in_tree[j] && d < best_dist {
                best_dist = d;
                best = j;
            }
        }
        weights.push(best_dist);
        in_tree[best] = true;
        for (j, d) in dist.iter_mut().enumerate() {
            if !in_tree[j] {
                *d = d.min(weight(best, j));
            }
        }
    }
    weights.sort_by(f32::total_cmp);
    weights
}

fn find(parent: &mut [usize], mut v: usize) -> usize {
    while parent[v] != v {
        parent[v] = parent[parent[v]];
        v = parent[v];
    }
    v
}
