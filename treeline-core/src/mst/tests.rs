//! Unit tests for the parallel Borůvka implementation.

use rand::{Rng, SeedableRng, rngs::SmallRng};
use rstest::rstest;

use crate::{ClusterError, Point3};

use super::{MstParams, WeightedEdge, minimum_spanning_tree};

fn line(coords: &[f32]) -> Vec<Point3> {
    coords.iter().map(|&x| Point3::new(x, 0.0, 0.0)).collect()
}

fn random_cloud(seed: u64, count: usize) -> Vec<Point3> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            Point3::new(
                rng.gen_range(-5.0..5.0),
                rng.gen_range(-5.0..5.0),
                rng.gen_range(-5.0..5.0),
            )
        })
        .collect()
}

/// Sorted edge weights of a complete-graph MST, by Prim's algorithm.
fn prim_weights(count: usize, weight: impl Fn(usize, usize) -> f32) -> Vec<f32> {
    let mut in_tree = vec![false; count];
    let mut dist = vec![f32::INFINITY; count];
    let mut weights = Vec::with_capacity(count - 1);
    in_tree[0] = true;
    for j in 1..count {
        dist[j] = weight(0, j);
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

/// Asserts the edges form a spanning tree over `count` vertices.
fn assert_spanning_tree(count: usize, edges: &[WeightedEdge]) {
    assert_eq!(edges.len(), count - 1, "a tree has exactly n - 1 edges");
    let mut parent: Vec<usize> = (0..count).collect();
    fn find(parent: &mut [usize], mut v: usize) -> usize {
        while parent[v] != v {
            parent[v] = parent[parent[v]];
            v = parent[v];
        }
        v
    }
    for edge in edges {
        let source = usize::try_from(edge.source()).expect("finalised endpoint");
        let target = usize::try_from(edge.target()).expect("finalised endpoint");
        assert!(source < count && target < count);
        let rs = find(&mut parent, source);
        let rt = find(&mut parent, target);
        assert_ne!(rs, rt, "edge ({source}, {target}) closes a cycle");
        parent[rs.max(rt)] = rs.min(rt);
    }
}

fn canonical_pairs(edges: &[WeightedEdge]) -> Vec<(i32, i32, f32)> {
    let mut pairs: Vec<(i32, i32, f32)> = edges
        .iter()
        .map(|e| {
            (
                e.source().min(e.target()),
                e.source().max(e.target()),
                e.weight(),
            )
        })
        .collect();
    pairs.sort_by(|a, b| a.partial_cmp(b).expect("finite weights"));
    pairs
}

fn brute_core_distances(points: &[Point3], k: usize) -> Vec<f32> {
    points
        .iter()
        .map(|&p| {
            let mut dists: Vec<f32> = points.iter().map(|&q| p.distance(q)).collect();
            dists.sort_by(f32::total_cmp);
            dists[k - 1]
        })
        .collect()
}

#[test]
fn rejects_zero_neighbour_count() {
    let err = minimum_spanning_tree(&line(&[0.0, 1.0]), &MstParams::new().with_neighbours(0))
        .expect_err("k = 0 must be rejected");
    assert_eq!(err, ClusterError::InvalidNeighbourCount { got: 0 });
}

#[rstest]
#[case::empty(Vec::new())]
#[case::single(vec![Point3::new(1.0, 2.0, 3.0)])]
fn fewer_than_two_points_yield_no_edges(#[case] points: Vec<Point3>) {
    let edges = minimum_spanning_tree(&points, &MstParams::new()).expect("valid input");
    assert!(edges.is_empty());
}

#[test]
fn two_points_yield_their_connecting_edge() {
    let points = line(&[0.0, 2.5]);
    let edges = minimum_spanning_tree(&points, &MstParams::new()).expect("valid input");
    assert_eq!(canonical_pairs(&edges), vec![(0, 1, 2.5)]);
}

#[test]
fn collinear_chain_connects_neighbours() {
    let points = line(&[0.0, 1.0, 3.0, 6.0]);
    let edges = minimum_spanning_tree(&points, &MstParams::new()).expect("valid input");
    assert_eq!(
        canonical_pairs(&edges),
        vec![(0, 1, 1.0), (1, 2, 2.0), (2, 3, 3.0)]
    );
}

#[test]
fn two_far_groups_are_joined_by_their_closest_pair() {
    let points = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(0.0, 0.1, 0.0),
        Point3::new(0.2, 0.0, 0.0),
        Point3::new(100.0, 0.0, 0.0),
        Point3::new(100.0, 0.1, 0.0),
        Point3::new(100.3, 0.0, 0.0),
    ];
    let edges = minimum_spanning_tree(&points, &MstParams::new()).expect("valid input");
    assert_spanning_tree(points.len(), &edges);

    let crossing: Vec<&WeightedEdge> = edges
        .iter()
        .filter(|e| (e.source() < 3) != (e.target() < 3))
        .collect();
    assert_eq!(crossing.len(), 1, "exactly one edge joins the two groups");
    // Closest pair across the gap is (2, 3).
    assert_eq!(crossing[0].weight(), points[2].distance(points[3]));
}

#[rstest]
#[case::small(11, 42)]
#[case::medium(100, 7)]
#[case::larger(350, 1234)]
fn matches_sequential_oracle_on_random_clouds(#[case] count: usize, #[case] seed: u64) {
    let points = random_cloud(seed, count);
    let edges = minimum_spanning_tree(&points, &MstParams::new()).expect("valid input");
    assert_spanning_tree(count, &edges);

    let mut weights: Vec<f32> = edges.iter().map(WeightedEdge::weight).collect();
    weights.sort_by(f32::total_cmp);
    let expected = prim_weights(count, |i, j| points[i].distance(points[j]));
    assert_eq!(weights, expected);
}

#[test]
fn lattice_with_tied_weights_still_forms_a_tree() {
    let mut points = Vec::new();
    for x in 0..4 {
        for y in 0..4 {
            for z in 0..2 {
                points.push(Point3::new(x as f32, y as f32, z as f32));
            }
        }
    }
    let edges = minimum_spanning_tree(&points, &MstParams::new()).expect("valid input");
    assert_spanning_tree(points.len(), &edges);
    assert!(edges.iter().all(|e| e.weight() == 1.0));
}

#[test]
fn output_is_identical_across_runs() {
    let points = random_cloud(99, 200);
    let first = minimum_spanning_tree(&points, &MstParams::new()).expect("valid input");
    for _ in 0..10 {
        let again = minimum_spanning_tree(&points, &MstParams::new()).expect("valid input");
        assert_eq!(again, first);
    }
}

#[test]
fn mutual_reachability_weights_honour_core_distances() {
    let points = line(&[0.0, 1.0, 1.5, 3.0, 4.2, 5.0, 7.0, 8.5, 9.0, 10.5]);
    let k = 2;
    let core = brute_core_distances(&points, k);

    let edges = minimum_spanning_tree(&points, &MstParams::new().with_neighbours(k))
        .expect("valid input");
    assert_spanning_tree(points.len(), &edges);

    for edge in &edges {
        let s = usize::try_from(edge.source()).expect("finalised endpoint");
        let t = usize::try_from(edge.target()).expect("finalised endpoint");
        let euclidean = points[s].distance(points[t]);
        assert_eq!(edge.weight(), core[s].max(core[t]).max(euclidean));
    }

    let mut weights: Vec<f32> = edges.iter().map(WeightedEdge::weight).collect();
    weights.sort_by(f32::total_cmp);
    let expected = prim_weights(points.len(), |i, j| {
        core[i].max(core[j]).max(points[i].distance(points[j]))
    });
    assert_eq!(weights, expected);
}

#[test]
fn mutual_reachability_tree_is_at_least_as_heavy_as_euclidean() {
    let points = random_cloud(5, 60);
    let euclidean: f64 = minimum_spanning_tree(&points, &MstParams::new())
        .expect("valid input")
        .iter()
        .map(|e| f64::from(e.weight()))
        .sum();
    let mutual: f64 = minimum_spanning_tree(&points, &MstParams::new().with_neighbours(5))
        .expect("valid input")
        .iter()
        .map(|e| f64::from(e.weight()))
        .sum();
    assert!(mutual >= euclidean);
}

mod edge_order {
    use super::WeightedEdge;

    fn edge(source: i32, target: i32, weight: f32) -> WeightedEdge {
        WeightedEdge {
            source,
            target,
            weight,
        }
    }

    #[test]
    fn weight_dominates() {
        assert!(edge(5, 6, 1.0) < edge(0, 1, 2.0));
    }

    #[test]
    fn endpoint_pair_breaks_weight_ties() {
        assert!(edge(0, 3, 1.0) < edge(1, 2, 1.0));
        assert!(edge(1, 2, 1.0) < edge(1, 3, 1.0));
    }

    #[test]
    fn endpoint_order_is_ignored() {
        assert_eq!(edge(2, 7, 1.0).cmp(&edge(7, 2, 1.0)), std::cmp::Ordering::Equal);
    }

    #[test]
    fn uninitialised_sorts_below_candidates_of_equal_weight() {
        let uninitialised = WeightedEdge::UNINITIALISED;
        assert!(uninitialised < edge(0, -1, f32::INFINITY));
    }
}
