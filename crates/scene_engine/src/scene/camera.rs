//! Projective cameras
//!
//! A camera is a node payload: its view matrix is the inverse of the owning
//! node's world matrix, so camera placement goes through the same transform
//! contract as every other node.

use crate::foundation::math::{Mat4, Mat4Ext};

/// Projection parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Perspective projection
    Perspective {
        /// Vertical field of view in radians
        fov_y: f32,
        /// Width / height
        aspect: f32,
        /// Near clipping plane distance
        near: f32,
        /// Far clipping plane distance
        far: f32,
    },
    /// Orthographic projection
    Orthographic {
        /// Left plane
        left: f32,
        /// Right plane
        right: f32,
        /// Bottom plane
        bottom: f32,
        /// Top plane
        top: f32,
        /// Near clipping plane distance
        near: f32,
        /// Far clipping plane distance
        far: f32,
    },
}

/// Camera payload for a scene node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Projection parameters
    pub projection: Projection,
    /// Layers this camera renders
    pub layers: super::Layers,
}

impl Camera {
    /// Create a perspective camera
    pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            projection: Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            },
            layers: super::Layers::default(),
        }
    }

    /// Create an orthographic camera
    pub fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Self {
        Self {
            projection: Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            },
            layers: super::Layers::default(),
        }
    }

    /// Projection matrix mapping depth to [0, 1]
    pub fn projection_matrix(&self) -> Mat4 {
        match self.projection {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective(fov_y, aspect, near, far),
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Mat4::orthographic(left, right, bottom, top, near, far),
        }
    }

    /// Update the aspect ratio after a viewport resize
    pub fn set_aspect(&mut self, new_aspect: f32) {
        if let Projection::Perspective { aspect, .. } = &mut self.projection {
            *aspect = new_aspect;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec4;

    #[test]
    fn test_perspective_projects_origin_depth() {
        let camera = Camera::perspective(60.0_f32.to_radians(), 1.0, 0.1, 100.0);
        let projection = camera.projection_matrix();

        // A point on the near plane projects to depth 0
        let near_point = projection * Vec4::new(0.0, 0.0, -0.1, 1.0);
        assert!((near_point.z / near_point.w).abs() < 1e-5);

        // A point on the far plane projects to depth 1
        let far_point = projection * Vec4::new(0.0, 0.0, -100.0, 1.0);
        assert!((far_point.z / far_point.w - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_set_aspect_only_touches_perspective() {
        let mut perspective = Camera::perspective(1.0, 1.0, 0.1, 10.0);
        perspective.set_aspect(2.0);
        assert!(matches!(
            perspective.projection,
            Projection::Perspective { aspect, .. } if (aspect - 2.0).abs() < f32::EPSILON
        ));

        let mut ortho = Camera::orthographic(-1.0, 1.0, -1.0, 1.0, 0.1, 10.0);
        let before = ortho.projection;
        ortho.set_aspect(2.0);
        assert_eq!(ortho.projection, before);
    }
}
