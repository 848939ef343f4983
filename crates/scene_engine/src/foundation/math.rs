//! Math utilities and types
//!
//! Provides the fundamental math types used throughout the scene graph and
//! renderer. Types are thin aliases over `nalgebra` so the math library stays
//! an external leaf dependency.

pub use nalgebra::{Matrix3, Matrix4, Quaternion, Unit, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Transform representing position, rotation, and scale
///
/// This is the local-space transform every scene-graph node carries. The
/// node's cached local matrix is recomposed from it whenever the node has
/// `matrix_auto_update` enabled.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a transform with position and rotation
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Default::default()
        }
    }

    /// Compose into a transformation matrix (translation * rotation * scale)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }

    /// Decompose a transformation matrix into position, rotation, and scale
    ///
    /// Assumes the matrix is an affine TRS composition. Shear is not
    /// representable and is folded into the rotation.
    pub fn from_matrix(matrix: &Mat4) -> Self {
        let position = Vec3::new(matrix.m14, matrix.m24, matrix.m34);

        let scale_x = Vec3::new(matrix.m11, matrix.m21, matrix.m31).magnitude();
        let scale_y = Vec3::new(matrix.m12, matrix.m22, matrix.m32).magnitude();
        let scale_z = Vec3::new(matrix.m13, matrix.m23, matrix.m33).magnitude();
        let scale = Vec3::new(scale_x, scale_y, scale_z);

        let rotation_matrix = Matrix3::new(
            matrix.m11 / scale_x,
            matrix.m12 / scale_y,
            matrix.m13 / scale_z,
            matrix.m21 / scale_x,
            matrix.m22 / scale_y,
            matrix.m23 / scale_z,
            matrix.m31 / scale_x,
            matrix.m32 / scale_y,
            matrix.m33 / scale_z,
        );
        let rotation = Quat::from_matrix(&rotation_matrix);

        Self {
            position,
            rotation,
            scale,
        }
    }

    /// Apply this transform to a point
    pub fn transform_point(&self, point: Point3) -> Point3 {
        self.to_matrix().transform_point(&point)
    }

    /// Combine this transform with another (self is the parent)
    pub fn combine(&self, other: &Transform) -> Transform {
        Transform {
            position: self.position + self.rotation * self.scale.component_mul(&other.position),
            rotation: self.rotation * other.rotation,
            scale: self.scale.component_mul(&other.scale),
        }
    }
}

/// Math utility functions
pub mod utils {
    /// Linear interpolation
    pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
        a + (b - a) * t
    }
}

/// Extension trait for Mat4 with projection and view helpers
pub trait Mat4Ext {
    /// Create a perspective projection matrix mapping depth to [0, 1]
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Create an orthographic projection matrix mapping depth to [0, 1]
    fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4;

    /// Create a right-handed look-at view matrix
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        let tan_half_fovy = (fov_y * 0.5).tan();

        let mut result = Mat4::zeros();
        result[(0, 0)] = 1.0 / (aspect * tan_half_fovy);
        result[(1, 1)] = 1.0 / tan_half_fovy;
        result[(2, 2)] = far / (near - far);
        result[(2, 3)] = (near * far) / (near - far);
        result[(3, 2)] = -1.0;

        result
    }

    fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
        let mut result = Mat4::identity();
        result[(0, 0)] = 2.0 / (right - left);
        result[(1, 1)] = 2.0 / (top - bottom);
        result[(2, 2)] = 1.0 / (near - far);
        result[(0, 3)] = (left + right) / (left - right);
        result[(1, 3)] = (bottom + top) / (bottom - top);
        result[(2, 3)] = near / (near - far);

        result
    }

    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        let forward = (target - eye).normalize();
        let right = forward.cross(&up).normalize();
        let camera_up = right.cross(&forward);

        let rotation = Mat4::new(
            right.x, right.y, right.z, 0.0, //
            camera_up.x, camera_up.y, camera_up.z, 0.0, //
            -forward.x, -forward.y, -forward.z, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        );
        let translation = Mat4::new_translation(&-eye);

        rotation * translation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_transform_matrix_round_trip() {
        let transform = Transform {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_axis_angle(&Vec3::y_axis(), 0.7),
            scale: Vec3::new(2.0, 2.0, 2.0),
        };

        let recovered = Transform::from_matrix(&transform.to_matrix());
        assert_relative_eq!(recovered.position, transform.position, epsilon = 1e-5);
        assert_relative_eq!(recovered.scale, transform.scale, epsilon = 1e-5);
        assert_relative_eq!(
            recovered.rotation.angle_to(&transform.rotation),
            0.0,
            epsilon = 1e-4
        );
    }

    #[test]
    fn test_combine_matches_matrix_product() {
        let parent = Transform {
            position: Vec3::new(0.0, 1.0, 0.0),
            rotation: Quat::from_axis_angle(&Vec3::z_axis(), 0.3),
            scale: Vec3::new(1.0, 1.0, 1.0),
        };
        let child = Transform::from_position(Vec3::new(2.0, 0.0, 0.0));

        let combined = parent.combine(&child);
        let product = parent.to_matrix() * child.to_matrix();
        assert_relative_eq!(combined.to_matrix(), product, epsilon = 1e-5);
    }

    #[test]
    fn test_look_at_centers_target() {
        let view = Mat4::look_at(
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::zeros(),
            Vec3::new(0.0, 1.0, 0.0),
        );
        let target_view = view.transform_point(&Point3::origin());
        assert_relative_eq!(target_view.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(target_view.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(target_view.z, -5.0, epsilon = 1e-5);
    }
}
