//! Light descriptors and per-frame light collection

use crate::foundation::math::Vec3;

/// Kind-specific light parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    /// Uniform light with no position
    Ambient,
    /// Parallel rays along the node's -Z axis
    Directional,
    /// Omnidirectional light at the node's position
    Point {
        /// Cutoff distance, 0.0 for unbounded
        distance: f32,
        /// Physical falloff exponent
        decay: f32,
    },
    /// Cone of light along the node's -Z axis
    Spot {
        /// Half-angle of the cone in radians
        angle: f32,
        /// Softness of the cone edge (0..1)
        penumbra: f32,
        /// Cutoff distance, 0.0 for unbounded
        distance: f32,
    },
}

/// Light payload for a scene node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    /// Kind-specific parameters
    pub kind: LightKind,
    /// Light color (RGB)
    pub color: [f32; 3],
    /// Scalar intensity multiplier
    pub intensity: f32,
    /// Render this light into the shadow map
    pub cast_shadow: bool,
}

impl Light {
    fn new(kind: LightKind) -> Self {
        Self {
            kind,
            color: [1.0, 1.0, 1.0],
            intensity: 1.0,
            cast_shadow: false,
        }
    }

    /// Create an ambient light
    pub fn ambient() -> Self {
        Self::new(LightKind::Ambient)
    }

    /// Create a directional light
    pub fn directional() -> Self {
        Self::new(LightKind::Directional)
    }

    /// Create a point light
    pub fn point() -> Self {
        Self::new(LightKind::Point {
            distance: 0.0,
            decay: 2.0,
        })
    }

    /// Create a spot light
    pub fn spot(angle: f32) -> Self {
        Self::new(LightKind::Spot {
            angle,
            penumbra: 0.0,
            distance: 0.0,
        })
    }

    /// Set the color (builder style)
    pub fn with_color(mut self, color: [f32; 3]) -> Self {
        self.color = color;
        self
    }

    /// Set the intensity (builder style)
    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity;
        self
    }
}

/// One collected directional light in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectedDirectional {
    /// Direction the light travels
    pub direction: Vec3,
    /// Premultiplied color * intensity
    pub color: [f32; 3],
}

/// One collected point light in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectedPoint {
    /// World-space position
    pub position: Vec3,
    /// Premultiplied color * intensity
    pub color: [f32; 3],
    /// Cutoff distance, 0.0 for unbounded
    pub distance: f32,
    /// Physical falloff exponent
    pub decay: f32,
}

/// One collected spot light in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectedSpot {
    /// World-space position
    pub position: Vec3,
    /// Direction the light travels
    pub direction: Vec3,
    /// Premultiplied color * intensity
    pub color: [f32; 3],
    /// Cosine of the cone half-angle
    pub cos_angle: f32,
    /// Softness of the cone edge
    pub penumbra: f32,
}

/// Lights gathered during scene processing, in visit order
///
/// Rebuilt every frame; the per-type counts feed the program fingerprint so
/// adding a light recompiles only the programs whose light layout changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightingEnvironment {
    /// Summed ambient contribution
    pub ambient: [f32; 3],
    /// Directional lights
    pub directional: Vec<CollectedDirectional>,
    /// Point lights
    pub point: Vec<CollectedPoint>,
    /// Spot lights
    pub spot: Vec<CollectedSpot>,
    /// Whether any collected light casts shadows
    pub shadows: bool,
}

impl LightingEnvironment {
    /// Clear all collected lights for the next frame
    pub fn clear(&mut self) {
        self.ambient = [0.0; 3];
        self.directional.clear();
        self.point.clear();
        self.spot.clear();
        self.shadows = false;
    }

    /// Total number of positional/directional lights
    pub fn len(&self) -> usize {
        self.directional.len() + self.point.len() + self.spot.len()
    }

    /// Whether no lights were collected
    pub fn is_empty(&self) -> bool {
        self.len() == 0 && self.ambient == [0.0; 3]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_premultiply_nothing() {
        let light = Light::point().with_color([1.0, 0.5, 0.0]).with_intensity(2.0);
        assert_eq!(light.color, [1.0, 0.5, 0.0]);
        assert!((light.intensity - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_environment_clear() {
        let mut env = LightingEnvironment::default();
        env.ambient = [0.1, 0.1, 0.1];
        env.directional.push(CollectedDirectional {
            direction: Vec3::new(0.0, -1.0, 0.0),
            color: [1.0, 1.0, 1.0],
        });
        env.clear();
        assert!(env.is_empty());
    }
}
