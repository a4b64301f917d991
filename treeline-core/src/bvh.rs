//! Morton-ordered bounding volume hierarchy.
//!
//! The tree is built by quantising points onto a 30-bit Morton curve,
//! parallel-sorting, and median-splitting the sorted range. Internal nodes
//! occupy ids `[0, n-1)` and leaves `[n-1, 2n-1)`, so a node id alone tells
//! a traversal which side of the tree it is on. Leaves appear in Morton
//! order, which the merge engine exploits when seeding its search radii
//! from adjacent leaf pairs.

use std::collections::BinaryHeap;

use rayon::prelude::*;

use crate::{
    error::{ClusterError, Result},
    geometry::{Aabb, Point3},
};

/// Capacity of the fixed traversal stacks.
pub(crate) const MAX_DEPTH: usize = 64;

const INVALID_NODE: u32 = u32::MAX;

/// A binary tree of axis-aligned boxes over a point cloud.
///
/// # Examples
/// ```
/// use treeline_core::{Bvh, Point3};
///
/// let points = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
/// ];
/// let bvh = Bvh::build(&points).expect("finite points must build");
/// assert_eq!(bvh.size(), 3);
/// assert!(!bvh.is_leaf(bvh.root()));
/// ```
#[derive(Debug)]
pub struct Bvh {
    len: usize,
    left: Vec<u32>,
    right: Vec<u32>,
    parent: Vec<u32>,
    bounds: Vec<Aabb>,
    permutation: Vec<u32>,
    depth: usize,
}

impl Bvh {
    /// Builds a tree over `points`.
    ///
    /// # Errors
    /// Returns [`ClusterError::EmptyInput`] for zero points,
    /// [`ClusterError::NonFinitePoint`] when a coordinate is NaN or
    /// infinite, [`ClusterError::InputTooLarge`] when the cloud exceeds the
    /// 32-bit index space, and [`ClusterError::TraversalDepthExceeded`] if
    /// the tree would not fit the fixed traversal stack.
    pub fn build(points: &[Point3]) -> Result<Self> {
        let n = points.len();
        if n == 0 {
            return Err(ClusterError::EmptyInput);
        }
        let max = i32::MAX as usize;
        if n > max {
            return Err(ClusterError::InputTooLarge { points: n, max });
        }
        if let Some(index) = points.iter().position(|p| !p.is_finite()) {
            return Err(ClusterError::NonFinitePoint { index });
        }

        let scene = points
            .par_iter()
            .copied()
            .map(Aabb::from_point)
            .reduce(Aabb::empty, Aabb::union);
        let codes: Vec<u32> = points
            .par_iter()
            .map(|&p| morton_code(p, &scene))
            .collect();

        let mut order: Vec<u32> = (0..n as u32).collect();
        order.par_sort_unstable_by_key(|&i| (codes[i as usize], i));

        if n == 1 {
            return Ok(Self {
                len: 1,
                left: Vec::new(),
                right: Vec::new(),
                parent: vec![INVALID_NODE],
                bounds: vec![Aabb::from_point(points[0])],
                permutation: order,
                depth: 1,
            });
        }

        let (left, right, parent, bounds, depth) = {
            let mut builder = TopologyBuilder {
                points,
                order: &order,
                len: n,
                left: vec![0; n - 1],
                right: vec![0; n - 1],
                parent: vec![INVALID_NODE; 2 * n - 1],
                bounds: vec![Aabb::empty(); 2 * n - 1],
                next_internal: 0,
                depth: 0,
            };
            builder.split(0, n, 1);
            (
                builder.left,
                builder.right,
                builder.parent,
                builder.bounds,
                builder.depth,
            )
        };
        if depth >= MAX_DEPTH {
            return Err(ClusterError::TraversalDepthExceeded {
                depth,
                limit: MAX_DEPTH,
            });
        }

        Ok(Self {
            len: n,
            left,
            right,
            parent,
            bounds,
            permutation: order,
            depth,
        })
    }

    /// Number of points (and leaves) in the tree.
    #[must_use]
    pub fn size(&self) -> usize {
        self.len
    }

    /// Id of the root node. Internal unless the tree holds a single point.
    #[must_use]
    pub fn root(&self) -> u32 {
        0
    }

    /// Returns `true` when `node` is a leaf.
    #[must_use]
    pub fn is_leaf(&self, node: u32) -> bool {
        node as usize >= self.len - 1
    }

    /// Left child of an internal node.
    #[must_use]
    pub fn left_child(&self, node: u32) -> u32 {
        self.left[node as usize]
    }

    /// Right child of an internal node.
    #[must_use]
    pub fn right_child(&self, node: u32) -> u32 {
        self.right[node as usize]
    }

    /// Parent of `node`; the root has no parent.
    #[must_use]
    pub fn parent(&self, node: u32) -> Option<u32> {
        let parent = self.parent[node as usize];
        (parent != INVALID_NODE).then_some(parent)
    }

    /// Bounding box of `node`.
    #[must_use]
    pub fn bounding_volume(&self, node: u32) -> &Aabb {
        &self.bounds[node as usize]
    }

    /// Original point index stored in leaf `node`.
    #[must_use]
    pub fn leaf_permutation(&self, node: u32) -> u32 {
        self.permutation[node as usize - (self.len - 1)]
    }

    /// Maximum number of nodes on a root-to-leaf path.
    #[must_use]
    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    /// Invokes `callback(query_index, primitive_index)` for every ordered
    /// pair of points within `eps` of each other, the query point itself
    /// included. Queries run in parallel; invocation order is unspecified.
    pub fn query_radius<F>(&self, points: &[Point3], eps: f32, callback: &F)
    where
        F: Fn(u32, u32) + Sync,
    {
        (0..points.len() as u32)
            .into_par_iter()
            .for_each(|i| self.radius_query_one(points, i, eps, callback));
    }

    fn radius_query_one<F>(&self, points: &[Point3], i: u32, eps: f32, callback: &F)
    where
        F: Fn(u32, u32),
    {
        let query = points[i as usize];
        let mut stack = [0u32; MAX_DEPTH];
        stack[0] = self.root();
        let mut top = 1;
        while top > 0 {
            top -= 1;
            let node = stack[top];
            if self.bounds[node as usize].distance_to_point(query) > eps {
                continue;
            }
            if self.is_leaf(node) {
                let j = self.leaf_permutation(node);
                if query.distance(points[j as usize]) <= eps {
                    callback(i, j);
                }
            } else {
                stack[top] = self.left[node as usize];
                stack[top + 1] = self.right[node as usize];
                top += 2;
            }
        }
    }

    /// Invokes `callback(query_index, primitive_index, distance)` for each
    /// of the `k` nearest neighbours of every point (the point itself
    /// included at distance zero). When the cloud holds fewer than `k`
    /// points, all of them are reported.
    pub fn query_knn<F>(&self, points: &[Point3], k: usize, callback: &F)
    where
        F: Fn(u32, u32, f32) + Sync,
    {
        if k == 0 {
            return;
        }
        (0..points.len() as u32)
            .into_par_iter()
            .for_each(|i| self.knn_query_one(points, i, k, callback));
    }

    fn knn_query_one<F>(&self, points: &[Point3], i: u32, k: usize, callback: &F)
    where
        F: Fn(u32, u32, f32),
    {
        let query = points[i as usize];
        let mut nearest: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k + 1);
        let mut stack = [0u32; MAX_DEPTH];
        stack[0] = self.root();
        let mut top = 1;
        while top > 0 {
            top -= 1;
            let node = stack[top];
            let bound = nearest_bound(&nearest, k);
            if self.bounds[node as usize].distance_to_point(query) > bound {
                continue;
            }
            if self.is_leaf(node) {
                let index = self.leaf_permutation(node);
                let distance = query.distance(points[index as usize]);
                nearest.push(Candidate { distance, index });
                if nearest.len() > k {
                    nearest.pop();
                }
            } else {
                // Visit the nearer child first so the bound tightens early.
                let left = self.left[node as usize];
                let right = self.right[node as usize];
                let d_left = self.bounds[left as usize].distance_to_point(query);
                let d_right = self.bounds[right as usize].distance_to_point(query);
                let (near, far) = if d_left <= d_right {
                    (left, right)
                } else {
                    (right, left)
                };
                stack[top] = far;
                stack[top + 1] = near;
                top += 2;
            }
        }
        for candidate in nearest {
            callback(i, candidate.index, candidate.distance);
        }
    }
}

/// Neighbour candidate ordered worst-first for the bounded heap.
#[derive(Clone, Copy, Debug)]
struct Candidate {
    distance: f32,
    index: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.distance.to_bits() == other.distance.to_bits() && self.index == other.index
    }
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.index.cmp(&other.index))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

fn nearest_bound(heap: &BinaryHeap<Candidate>, k: usize) -> f32 {
    if heap.len() == k {
        heap.peek().map_or(f32::INFINITY, |c| c.distance)
    } else {
        f32::INFINITY
    }
}

struct TopologyBuilder<'a> {
    points: &'a [Point3],
    order: &'a [u32],
    len: usize,
    left: Vec<u32>,
    right: Vec<u32>,
    parent: Vec<u32>,
    bounds: Vec<Aabb>,
    next_internal: u32,
    depth: usize,
}

impl TopologyBuilder<'_> {
    /// Builds the subtree over sorted leaf slots `[lo, hi)` and returns its
    /// node id. Internal ids are assigned in preorder, so every child id is
    /// larger than its parent's.
    fn split(&mut self, lo: usize, hi: usize, depth: usize) -> u32 {
        self.depth = self.depth.max(depth);
        if hi - lo == 1 {
            let id = (self.len - 1 + lo) as u32;
            let point = self.points[self.order[lo] as usize];
            self.bounds[id as usize] = Aabb::from_point(point);
            return id;
        }
        let id = self.next_internal;
        self.next_internal += 1;
        let mid = lo + (hi - lo) / 2;
        let left = self.split(lo, mid, depth + 1);
        let right = self.split(mid, hi, depth + 1);
        self.left[id as usize] = left;
        self.right[id as usize] = right;
        self.parent[left as usize] = id;
        self.parent[right as usize] = id;
        self.bounds[id as usize] =
            self.bounds[left as usize].union(self.bounds[right as usize]);
        id
    }
}

/// Spreads the low 10 bits of `v` so consecutive bits land 3 apart.
fn expand_bits(mut v: u32) -> u32 {
    v = v.wrapping_mul(0x0001_0001) & 0xFF00_00FF;
    v = v.wrapping_mul(0x0000_0101) & 0x0F00_F00F;
    v = v.wrapping_mul(0x0000_0011) & 0xC30C_30C3;
    v = v.wrapping_mul(0x0000_0005) & 0x4924_9249;
    v
}

fn quantise(value: f32, lo: f32, hi: f32) -> u32 {
    let extent = hi - lo;
    let t = if extent > 0.0 {
        ((value - lo) / extent).clamp(0.0, 1.0)
    } else {
        0.5
    };
    (t * 1023.0) as u32
}

fn morton_code(p: Point3, scene: &Aabb) -> u32 {
    let x = expand_bits(quantise(p.x, scene.min.x, scene.max.x));
    let y = expand_bits(quantise(p.y, scene.min.y, scene.max.y));
    let z = expand_bits(quantise(p.z, scene.min.z, scene.max.z));
    (x << 2) | (y << 1) | z
}
