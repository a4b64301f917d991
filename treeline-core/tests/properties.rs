//! Property tests pitting the engines against the sequential oracles.

use proptest::prelude::*;
use treeline_core::{
    DbscanParams, MstParams, Point3, dbscan, minimum_spanning_tree, verify_dbscan, verify_mst,
};

fn arb_point() -> impl Strategy<Value = Point3> {
    (-50.0f32..50.0, -50.0f32..50.0, -50.0f32..50.0)
        .prop_map(|(x, y, z)| Point3::new(x, y, z))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn euclidean_tree_is_optimal(points in prop::collection::vec(arb_point(), 2..64)) {
        let params = MstParams::new();
        let edges = minimum_spanning_tree(&points, &params).expect("valid input");
        prop_assert_eq!(edges.len(), points.len() - 1);
        prop_assert!(verify_mst(&points, &params, &edges));
    }

    #[test]
    fn mutual_reachability_tree_is_optimal(
        points in prop::collection::vec(arb_point(), 2..48),
        k in 2usize..6,
    ) {
        let params = MstParams::new().with_neighbours(k);
        let edges = minimum_spanning_tree(&points, &params).expect("valid input");
        prop_assert!(verify_mst(&points, &params, &edges));
    }

    #[test]
    fn dbscan_satisfies_reachability(
        points in prop::collection::vec(arb_point(), 0..64),
        eps in 0.5f32..30.0,
        core_min_size in 1usize..5,
    ) {
        let params = DbscanParams::new(eps).with_core_min_size(core_min_size);
        let clusters = dbscan(&points, &params).expect("valid input");
        prop_assert!(verify_dbscan(&points, &params, &clusters));
    }
}
