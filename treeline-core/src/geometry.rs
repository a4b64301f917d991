//! Points and axis-aligned bounding boxes.
//!
//! The clustering engines work on 3D single-precision points. Boxes are the
//! bounding volumes stored in the [`crate::Bvh`]; the distance helpers here
//! are the predicates the tree traversals prune with.

/// A point in 3D space.
///
/// # Examples
/// ```
/// use treeline_core::Point3;
///
/// let a = Point3::new(0.0, 0.0, 0.0);
/// let b = Point3::new(3.0, 4.0, 0.0);
/// assert_eq!(a.distance(b), 5.0);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point3 {
    /// X coordinate.
    pub x: f32,
    /// Y coordinate.
    pub y: f32,
    /// Z coordinate.
    pub z: f32,
}

impl Point3 {
    /// Creates a point from its coordinates.
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Returns `true` when every coordinate is finite.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Squared Euclidean distance to `other`.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f32 {
        let dx = f64::from(self.x) - f64::from(other.x);
        let dy = f64::from(self.y) - f64::from(other.y);
        let dz = f64::from(self.z) - f64::from(other.z);
        (dx * dx + dy * dy + dz * dz) as f32
    }

    /// Euclidean distance to `other`.
    ///
    /// Accumulates in `f64` to keep nearly-coincident points well ordered.
    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        let dx = f64::from(self.x) - f64::from(other.x);
        let dy = f64::from(self.y) - f64::from(other.y);
        let dz = f64::from(self.z) - f64::from(other.z);
        (dx * dx + dy * dy + dz * dz).sqrt() as f32
    }
}

/// An axis-aligned bounding box.
///
/// An empty box has `min > max` on every axis and behaves as the identity
/// under [`Aabb::union`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Lower corner.
    pub min: Point3,
    /// Upper corner.
    pub max: Point3,
}

impl Aabb {
    /// The empty box.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            min: Point3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Point3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    /// A degenerate box covering a single point.
    #[must_use]
    pub const fn from_point(p: Point3) -> Self {
        Self { min: p, max: p }
    }

    /// The smallest box containing `self` and `other`.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            min: Point3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: Point3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }

    /// Grows the box to contain `p`.
    pub fn extend(&mut self, p: Point3) {
        *self = self.union(Self::from_point(p));
    }

    /// Distance from `p` to the closest point of the box; zero when `p` is
    /// inside.
    #[must_use]
    pub fn distance_to_point(&self, p: Point3) -> f32 {
        let dx = axis_gap(self.min.x, self.max.x, p.x, p.x);
        let dy = axis_gap(self.min.y, self.max.y, p.y, p.y);
        let dz = axis_gap(self.min.z, self.max.z, p.z, p.z);
        (dx * dx + dy * dy + dz * dz).sqrt() as f32
    }

    /// Distance between the closest points of two boxes; zero when they
    /// overlap. For two degenerate boxes this is exactly
    /// [`Point3::distance`] of their corners.
    #[must_use]
    pub fn distance_to_box(&self, other: &Self) -> f32 {
        let dx = axis_gap(self.min.x, self.max.x, other.min.x, other.max.x);
        let dy = axis_gap(self.min.y, self.max.y, other.min.y, other.max.y);
        let dz = axis_gap(self.min.z, self.max.z, other.min.z, other.max.z);
        (dx * dx + dy * dy + dz * dz).sqrt() as f32
    }
}

/// Separation of `[a_min, a_max]` and `[b_min, b_max]` along one axis.
/// Subtracts in `f64`, matching [`Point3::distance`], so box distances
/// never round above the point distances they bound.
fn axis_gap(a_min: f32, a_max: f32, b_min: f32, b_max: f32) -> f64 {
    (f64::from(b_min) - f64::from(a_max))
        .max(f64::from(a_min) - f64::from(b_max))
        .max(0.0)
}
