//! Parallel Borůvka minimum spanning tree over the BVH.
//!
//! Every round, each current component locates its cheapest edge to any
//! other component by traversing the tree from each of its leaves, then all
//! components merge along the chosen edges simultaneously. Components share
//! an upper bound (radius) on their cheapest outgoing edge so traversals
//! prune against each other's progress within the round.
//!
//! Because components pick edges simultaneously, two components can pick
//! each other; such 2-cycles are broken by keeping the direction from the
//! smaller component id. Longer cycles cannot form: each component picks
//! the strict minimum outgoing edge under [`WeightedEdge`]'s total order,
//! and among equal weights the vertex-pair order rules out any cyclic
//! preference.

use std::cmp::Ordering as CmpOrdering;
use std::sync::{
    Mutex,
    atomic::{AtomicU8, AtomicU32, Ordering},
};

use rayon::prelude::*;
use tracing::debug;

use crate::{
    bvh::{Bvh, MAX_DEPTH},
    error::{ClusterError, Result},
    geometry::Point3,
    metric::{Euclidean, Metric, MutualReachability},
};

/// Label of an internal node whose subtree spans several components.
const UNDETERMINED: u32 = u32::MAX;

/// An edge of the spanning tree, weighted by the configured metric.
///
/// Edges are totally ordered by weight, then by the smaller endpoint, then
/// by the larger one; the order is what makes concurrent minimum selection
/// reproducible.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeightedEdge {
    source: i32,
    target: i32,
    weight: f32,
}

impl WeightedEdge {
    const UNINITIALISED: Self = Self {
        source: -1,
        target: -1,
        weight: f32::INFINITY,
    };

    /// One endpoint, as an original point index.
    #[must_use]
    #[rustfmt::skip]
    pub fn source(&self) -> i32 { self.source }

    /// The other endpoint, as an original point index.
    #[must_use]
    #[rustfmt::skip]
    pub fn target(&self) -> i32 { self.target }

    /// Edge weight under the configured metric.
    #[must_use]
    #[rustfmt::skip]
    pub fn weight(&self) -> f32 { self.weight }

    fn endpoints_ordered(&self) -> (i32, i32) {
        if self.source <= self.target {
            (self.source, self.target)
        } else {
            (self.target, self.source)
        }
    }
}

impl Eq for WeightedEdge {}

impl Ord for WeightedEdge {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        let (lhs_min, lhs_max) = self.endpoints_ordered();
        let (rhs_min, rhs_max) = other.endpoints_ordered();
        self.weight
            .total_cmp(&other.weight)
            .then_with(|| lhs_min.cmp(&rhs_min))
            .then_with(|| lhs_max.cmp(&rhs_max))
    }
}

impl PartialOrd for WeightedEdge {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

/// Parameters for [`minimum_spanning_tree`].
///
/// # Examples
/// ```
/// use treeline_core::MstParams;
///
/// let params = MstParams::new().with_neighbours(4);
/// assert_eq!(params.neighbours(), 4);
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MstParams {
    neighbours: usize,
}

impl Default for MstParams {
    fn default() -> Self {
        Self::new()
    }
}

impl MstParams {
    /// Creates parameters for a plain Euclidean spanning tree.
    #[must_use]
    pub fn new() -> Self {
        Self { neighbours: 1 }
    }

    /// Sets the neighbour count `k` for the mutual reachability metric.
    ///
    /// With `k == 1` the tree uses plain Euclidean distances. Larger values
    /// weight each edge by `max(core[i], core[j], distance)` where `core`
    /// is the distance to a point's k-th nearest neighbour (itself
    /// included). When the cloud holds fewer than `k` points the core
    /// distance degrades to the farthest available neighbour.
    #[must_use]
    pub fn with_neighbours(mut self, k: usize) -> Self {
        self.neighbours = k;
        self
    }

    /// The configured neighbour count.
    #[must_use]
    pub fn neighbours(&self) -> usize {
        self.neighbours
    }

    fn validate(&self) -> Result<()> {
        if self.neighbours < 1 {
            return Err(ClusterError::InvalidNeighbourCount {
                got: self.neighbours,
            });
        }
        Ok(())
    }
}

/// Computes the minimum spanning tree of `points` under the Euclidean or
/// mutual reachability metric.
///
/// Returns exactly `points.len() - 1` edges with original point indices;
/// fewer than two points yield no edges. Given the same input, the result
/// is identical across runs and thread counts.
///
/// # Errors
/// Returns a validation error for `k < 1` or a non-finite point, and
/// [`ClusterError::Stalled`] if a merge round fails to make progress,
/// which indicates a metric returning less than the Euclidean distance.
///
/// # Examples
/// ```
/// use treeline_core::{MstParams, Point3, minimum_spanning_tree};
///
/// let points = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(3.0, 0.0, 0.0),
/// ];
/// let edges = minimum_spanning_tree(&points, &MstParams::new()).expect("valid input");
/// let total: f32 = edges.iter().map(|e| e.weight()).sum();
/// assert_eq!(edges.len(), 2);
/// assert_eq!(total, 3.0);
/// ```
pub fn minimum_spanning_tree(points: &[Point3], params: &MstParams) -> Result<Vec<WeightedEdge>> {
    params.validate()?;
    if points.len() < 2 {
        return Ok(Vec::new());
    }

    let bvh = Bvh::build(points)?;
    debug!(points = points.len(), k = params.neighbours, "search tree built");

    if params.neighbours > 1 {
        let core = core_distances(&bvh, points, params.neighbours);
        Boruvka::new(&bvh, &MutualReachability::new(&core)).run()
    } else {
        Boruvka::new(&bvh, &Euclidean).run()
    }
}

/// Distance from each point to its k-th nearest neighbour, itself included.
fn core_distances(bvh: &Bvh, points: &[Point3], k: usize) -> Vec<f32> {
    let farthest: Vec<AtomicU32> = (0..points.len()).map(|_| AtomicU32::new(0)).collect();
    bvh.query_knn(points, k, &|i, _j, distance| {
        // Non-negative floats order the same as their bit patterns.
        farthest[i as usize].fetch_max(distance.to_bits(), Ordering::Relaxed);
    });
    farthest
        .into_iter()
        .map(|bits| f32::from_bits(bits.into_inner()))
        .collect()
}

struct Boruvka<'a, M> {
    bvh: &'a Bvh,
    metric: &'a M,
    /// Component label per node; leaves carry their component id, internal
    /// nodes carry the common label of their subtree or [`UNDETERMINED`].
    labels: Vec<AtomicU32>,
    /// Per-internal-node arrival counters for the bottom-up label pass.
    arrivals: Vec<AtomicU8>,
    /// Per-component upper bound on the cheapest outgoing edge, as f32
    /// bits so `fetch_min` works.
    radii: Vec<AtomicU32>,
    /// Per-component cheapest outgoing edge found this round.
    best_edges: Vec<Mutex<WeightedEdge>>,
}

impl<'a, M: Metric> Boruvka<'a, M> {
    fn new(bvh: &'a Bvh, metric: &'a M) -> Self {
        let n = bvh.size();
        let labels = (0..2 * n - 1)
            .map(|node| {
                let label = if node < n - 1 { UNDETERMINED } else { node as u32 };
                AtomicU32::new(label)
            })
            .collect();
        Self {
            bvh,
            metric,
            labels,
            arrivals: (0..n - 1).map(|_| AtomicU8::new(0)).collect(),
            radii: (0..n).map(|_| AtomicU32::new(0)).collect(),
            best_edges: (0..n)
                .map(|_| Mutex::new(WeightedEdge::UNINITIALISED))
                .collect(),
        }
    }

    fn run(&self) -> Result<Vec<WeightedEdge>> {
        let n = self.bvh.size();
        let mut edges: Vec<WeightedEdge> = Vec::with_capacity(n - 1);
        let mut components = n;
        let mut round = 0;
        while components > 1 {
            round += 1;
            self.reduce_labels();
            self.reset_round()?;
            self.seed_radii();
            self.find_component_neighbours()?;
            let new_edges = self.merge_components()?;
            if new_edges.is_empty() {
                return Err(ClusterError::Stalled { round, components });
            }
            edges.extend(new_edges);
            components = n - edges.len();
            debug!(round, components, edges = edges.len(), "merge round finished");
        }

        edges.par_iter_mut().for_each(|edge| {
            edge.source = self.bvh.leaf_permutation(edge.source as u32) as i32;
            edge.target = self.bvh.leaf_permutation(edge.target as u32) as i32;
        });
        Ok(edges)
    }

    fn slot(&self, component: u32) -> usize {
        component as usize - (self.bvh.size() - 1)
    }

    fn radius(&self, slot: usize) -> f32 {
        f32::from_bits(self.radii[slot].load(Ordering::Relaxed))
    }

    fn label(&self, node: u32) -> u32 {
        self.labels[node as usize].load(Ordering::Relaxed)
    }

    /// Propagates leaf labels up the tree: an internal node takes its
    /// children's label when they agree and [`UNDETERMINED`] otherwise.
    /// Each leaf climbs until it is first to arrive at a node; the second
    /// arriver sees both finished subtrees and continues.
    fn reduce_labels(&self) {
        let n = self.bvh.size();
        self.arrivals
            .par_iter()
            .for_each(|counter| counter.store(0, Ordering::Relaxed));
        ((n - 1) as u32..(2 * n - 1) as u32)
            .into_par_iter()
            .for_each(|leaf| {
                let Some(mut node) = self.bvh.parent(leaf) else {
                    return;
                };
                loop {
                    if self.arrivals[node as usize].fetch_add(1, Ordering::AcqRel) == 0 {
                        return;
                    }
                    let left = self.labels[self.bvh.left_child(node) as usize]
                        .load(Ordering::Acquire);
                    let right = self.labels[self.bvh.right_child(node) as usize]
                        .load(Ordering::Acquire);
                    let label = if left == right { left } else { UNDETERMINED };
                    self.labels[node as usize].store(label, Ordering::Release);
                    match self.bvh.parent(node) {
                        Some(parent) => node = parent,
                        None => return,
                    }
                }
            });
    }

    fn reset_round(&self) -> Result<()> {
        self.radii
            .par_iter()
            .for_each(|r| r.store(f32::INFINITY.to_bits(), Ordering::Relaxed));
        self.best_edges.par_iter().try_for_each(|cell| {
            *cell.lock().map_err(|_| ClusterError::LockPoisoned {
                resource: "component edge cell",
            })? = WeightedEdge::UNINITIALISED;
            Ok(())
        })
    }

    /// Seeds each component's radius from adjacent leaf pairs. Leaves sit
    /// in Morton order, so a leaf's successor is usually nearby; when the
    /// two straddle a component boundary their distance is a cheap upper
    /// bound on both components' outgoing edges.
    fn seed_radii(&self) {
        let n = self.bvh.size();
        ((n - 1) as u32..(2 * n - 2) as u32)
            .into_par_iter()
            .for_each(|leaf| {
                let next = leaf + 1;
                let label_a = self.label(leaf);
                let label_b = self.label(next);
                if label_a == label_b {
                    return;
                }
                let gap = self
                    .bvh
                    .bounding_volume(leaf)
                    .distance_to_box(self.bvh.bounding_volume(next));
                let bound = self.metric.eval(
                    self.bvh.leaf_permutation(leaf) as usize,
                    self.bvh.leaf_permutation(next) as usize,
                    gap,
                );
                self.radii[self.slot(label_a)].fetch_min(bound.to_bits(), Ordering::AcqRel);
                self.radii[self.slot(label_b)].fetch_min(bound.to_bits(), Ordering::AcqRel);
            });
    }

    /// For every component, finds the cheapest edge leaving it. Each leaf
    /// traverses the tree for the closest leaf in a different component and
    /// the per-component minimum is kept.
    fn find_component_neighbours(&self) -> Result<()> {
        let n = self.bvh.size();
        ((n - 1) as u32..(2 * n - 1) as u32)
            .into_par_iter()
            .try_for_each(|leaf| self.find_best_for_leaf(leaf))
    }

    fn find_best_for_leaf(&self, leaf: u32) -> Result<()> {
        let component = self.label(leaf);
        let slot = self.slot(component);
        let query = self.bvh.bounding_volume(leaf);
        let query_point = self.bvh.leaf_permutation(leaf) as usize;

        let mut best = WeightedEdge {
            source: leaf as i32,
            target: -1,
            weight: f32::INFINITY,
        };

        let mut stack = [0u32; MAX_DEPTH];
        let mut stack_distance = [0.0f32; MAX_DEPTH];
        let mut top = 0usize;
        let mut node = self.bvh.root();
        let mut node_distance = 0.0f32;

        loop {
            let mut traverse_left = false;
            let mut traverse_right = false;
            let mut left = 0u32;
            let mut right = 0u32;
            let mut distance_left = f32::INFINITY;
            let mut distance_right = f32::INFINITY;

            // `<=` rather than `<` against the shared radius: which of two
            // equidistant neighbours wins must be settled by the edge
            // order, so equidistant subtrees cannot be skipped.
            if node_distance <= self.radius(slot) {
                left = self.bvh.left_child(node);
                right = self.bvh.right_child(node);
                distance_left = query.distance_to_box(self.bvh.bounding_volume(left));
                distance_right = query.distance_to_box(self.bvh.bounding_volume(right));

                if self.label(left) != component && distance_left <= self.radius(slot) {
                    if self.bvh.is_leaf(left) {
                        self.consider_leaf(left, distance_left, query_point, slot, &mut best);
                    } else {
                        traverse_left = true;
                    }
                }
                // The radius may already have tightened from the left side.
                if self.label(right) != component && distance_right <= self.radius(slot) {
                    if self.bvh.is_leaf(right) {
                        self.consider_leaf(right, distance_right, query_point, slot, &mut best);
                    } else {
                        traverse_right = true;
                    }
                }
            }

            if !traverse_left && !traverse_right {
                if top == 0 {
                    break;
                }
                top -= 1;
                node = stack[top];
                node_distance = stack_distance[top];
            } else {
                // Descend into the nearer child; park the other if viable.
                node = if traverse_left && (distance_left <= distance_right || !traverse_right) {
                    left
                } else {
                    right
                };
                node_distance = if node == left {
                    distance_left
                } else {
                    distance_right
                };
                if traverse_left && traverse_right {
                    let (parked, parked_distance) = if node == left {
                        (right, distance_right)
                    } else {
                        (left, distance_left)
                    };
                    stack[top] = parked;
                    stack_distance[top] = parked_distance;
                    top += 1;
                }
            }
        }

        if best.weight < f32::INFINITY {
            let mut cell = self.best_edges[slot]
                .lock()
                .map_err(|_| ClusterError::LockPoisoned {
                    resource: "component edge cell",
                })?;
            if best < *cell {
                *cell = best;
            }
        }
        Ok(())
    }

    fn consider_leaf(
        &self,
        candidate: u32,
        distance: f32,
        query_point: usize,
        slot: usize,
        best: &mut WeightedEdge,
    ) {
        let weight = self.metric.eval(
            query_point,
            self.bvh.leaf_permutation(candidate) as usize,
            distance,
        );
        let edge = WeightedEdge {
            source: best.source,
            target: candidate as i32,
            weight,
        };
        if edge < *best {
            *best = edge;
            self.radii[slot].fetch_min(weight.to_bits(), Ordering::AcqRel);
        }
    }

    /// Resolves the merge graph and relabels every leaf with its merged
    /// component. Each representative that loses its identity contributes
    /// its chosen edge, so every merge adds exactly one edge.
    fn merge_components(&self) -> Result<Vec<WeightedEdge>> {
        let n = self.bvh.size();
        let first_leaf = (n - 1) as u32;
        let last = (2 * n - 1) as u32;

        let chosen: Vec<WeightedEdge> = self
            .best_edges
            .par_iter()
            .map(|cell| {
                cell.lock()
                    .map(|edge| *edge)
                    .map_err(|_| ClusterError::LockPoisoned {
                        resource: "component edge cell",
                    })
            })
            .collect::<Result<_>>()?;

        let next_component = |component: u32| -> u32 {
            let edge = chosen[self.slot(component)];
            if edge.target < 0 {
                return component;
            }
            let next = self.label(edge.target as u32);
            let next_edge = chosen[self.slot(next)];
            if next_edge.target < 0 {
                return next;
            }
            let next_next = self.label(next_edge.target as u32);
            if next_next != component {
                // The chosen edge is unidirectional.
                next
            } else {
                // A 2-cycle: both components picked each other. Keep the
                // direction out of the smaller id.
                component.min(next)
            }
        };
        let final_component = |component: u32| -> u32 {
            let mut current = component;
            loop {
                let next = next_component(current);
                if next == current {
                    return current;
                }
                current = next;
            }
        };

        // Read-only resolution pass, then collected in leaf order so the
        // edge order is independent of scheduling.
        let finals: Vec<u32> = (first_leaf..last)
            .into_par_iter()
            .map(|leaf| final_component(self.label(leaf)))
            .collect();

        let new_edges: Vec<WeightedEdge> = (first_leaf..last)
            .into_par_iter()
            .filter_map(|leaf| {
                if self.label(leaf) != leaf {
                    return None;
                }
                let merged = finals[(leaf - first_leaf) as usize];
                (merged != leaf).then(|| chosen[self.slot(leaf)])
            })
            .collect();

        (first_leaf..last).into_par_iter().for_each(|leaf| {
            self.labels[leaf as usize]
                .store(finals[(leaf - first_leaf) as usize], Ordering::Relaxed);
        });

        Ok(new_edges)
    }
}

#[cfg(test)]
mod tests;
