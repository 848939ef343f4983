//! Bounding volumes and frustum culling primitives

use crate::foundation::math::{Mat4, Vec3};

/// Axis-Aligned Bounding Box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// An inverted AABB that unions correctly with any point
    pub fn empty() -> Self {
        Self {
            min: Vec3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Vec3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    /// Whether no point has been unioned in yet
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x
    }

    /// Grow the box to contain a point
    pub fn expand_by_point(&mut self, point: Vec3) {
        self.min = self.min.inf(&point);
        self.max = self.max.sup(&point);
    }

    /// Grow the box to contain another box
    pub fn union(&mut self, other: &Aabb) {
        if other.is_empty() {
            return;
        }
        self.expand_by_point(other.min);
        self.expand_by_point(other.max);
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the AABB
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Check if this AABB contains a point
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Transform the eight corners and refit an axis-aligned box around them
    pub fn transformed(&self, matrix: &Mat4) -> Aabb {
        let mut out = Aabb::empty();
        if self.is_empty() {
            return out;
        }
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            out.expand_by_point(matrix.transform_point(&corner.into()).coords);
        }
        out
    }
}

/// Bounding sphere used for fast frustum rejection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// Sphere center
    pub center: Vec3,
    /// Sphere radius
    pub radius: f32,
}

impl BoundingSphere {
    /// Create a new bounding sphere
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Transform the center and scale the radius by the largest axis scale
    pub fn transformed(&self, matrix: &Mat4) -> BoundingSphere {
        let center = matrix.transform_point(&self.center.into()).coords;
        let sx = Vec3::new(matrix.m11, matrix.m21, matrix.m31).magnitude();
        let sy = Vec3::new(matrix.m12, matrix.m22, matrix.m32).magnitude();
        let sz = Vec3::new(matrix.m13, matrix.m23, matrix.m33).magnitude();
        BoundingSphere::new(center, self.radius * sx.max(sy).max(sz))
    }
}

/// Plane defined by normal and distance from origin
#[derive(Debug, Clone, Copy)]
pub struct Plane {
    /// Normal vector (normalized)
    pub normal: Vec3,
    /// Distance from origin along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a new plane, normalizing the input
    pub fn new(normal: Vec3, distance: f32) -> Self {
        let length = normal.magnitude();
        Self {
            normal: normal / length,
            distance: distance / length,
        }
    }

    /// Calculate signed distance from plane to point
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(&point) + self.distance
    }
}

/// View frustum for visibility culling
#[derive(Debug, Clone)]
pub struct Frustum {
    /// Six planes defining the frustum (left, right, bottom, top, near, far)
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extract frustum planes from a view-projection matrix
    ///
    /// Gribb-Hartmann extraction, written for a projection that maps depth
    /// into [0, 1]. Plane normals point into the frustum.
    pub fn from_matrix(vp: &Mat4) -> Self {
        let row = |i: usize| {
            let r = vp.row(i);
            (Vec3::new(r[0], r[1], r[2]), r[3])
        };
        let (r0, d0) = row(0);
        let (r1, d1) = row(1);
        let (r2, d2) = row(2);
        let (r3, d3) = row(3);

        let planes = [
            Plane::new(r3 + r0, d3 + d0), // left
            Plane::new(r3 - r0, d3 - d0), // right
            Plane::new(r3 + r1, d3 + d1), // bottom
            Plane::new(r3 - r1, d3 - d1), // top
            Plane::new(r2, d2),           // near ([0, 1] depth range)
            Plane::new(r3 - r2, d3 - d2), // far
        ];
        Self { planes }
    }

    /// Check if an AABB is inside or intersects the frustum
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        for plane in &self.planes {
            // The AABB corner furthest along the plane normal
            let mut p = aabb.min;
            if plane.normal.x >= 0.0 {
                p.x = aabb.max.x;
            }
            if plane.normal.y >= 0.0 {
                p.y = aabb.max.y;
            }
            if plane.normal.z >= 0.0 {
                p.z = aabb.max.z;
            }
            if plane.distance_to_point(p) < 0.0 {
                return false;
            }
        }
        true
    }

    /// Check if a sphere is inside or intersects the frustum
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        for plane in &self.planes {
            if plane.distance_to_point(sphere.center) < -sphere.radius {
                return false;
            }
        }
        true
    }
}
