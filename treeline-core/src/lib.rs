//! Parallel spatial clustering over 3D point clouds.
//!
//! Two engines share one spatial index and one concurrency toolkit:
//!
//! - [`minimum_spanning_tree`] computes a Euclidean (or mutual
//!   reachability) minimum spanning tree with parallel Borůvka rounds
//!   against a bounding volume hierarchy.
//! - [`dbscan`] forms density-based clusters from a single radius-query
//!   sweep feeding a lock-free union-find.
//!
//! Results do not depend on thread count: edge selection is governed by a
//! total order on weighted edges, and component merging always keeps the
//! smaller representative. The one documented exception is which single
//! core a DBSCAN border point attaches to when several are in range.

mod bvh;
mod dbscan;
mod error;
mod geometry;
mod metric;
mod mst;
mod postprocess;
mod verify;

pub use crate::{
    bvh::Bvh,
    dbscan::{DbscanParams, dbscan},
    error::{ClusterError, ClusterErrorCode, Result},
    geometry::{Aabb, Point3},
    metric::{Euclidean, Metric, MutualReachability},
    mst::{MstParams, WeightedEdge, minimum_spanning_tree},
    postprocess::ClusterSet,
    verify::{verify_dbscan, verify_mst},
};
