//! Keyframe tracks and interpolants
//!
//! A track targets one property through a path string and owns parallel
//! key-time and value arrays. Numeric and vector tracks interpolate
//! discretely, linearly, or with a cubic spline; quaternion tracks always
//! interpolate spherically.

use thiserror::Error;

use crate::foundation::math::{Quat, Quaternion, Vec3};

/// Errors raised while constructing animation data
#[derive(Debug, Error, PartialEq)]
pub enum AnimationError {
    /// Key times and values have mismatched lengths
    #[error("track '{path}' has {times} key times but {values} values")]
    MismatchedKeys {
        /// Track target path
        path: String,
        /// Number of key times
        times: usize,
        /// Number of values
        values: usize,
    },

    /// Key times are not strictly increasing
    #[error("track '{path}' has non-monotonic key times")]
    UnsortedTimes {
        /// Track target path
        path: String,
    },

    /// Track has no keys at all
    #[error("track '{path}' is empty")]
    Empty {
        /// Track target path
        path: String,
    },
}

/// Interpolation mode for numeric and vector tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Hold the previous key
    Discrete,
    /// Linear between neighboring keys
    #[default]
    Linear,
    /// Catmull-Rom spline through neighboring keys
    CubicSpline,
}

/// Typed key values of a track
#[derive(Debug, Clone, PartialEq)]
pub enum TrackValues {
    /// One scalar per key
    Scalar(Vec<f32>),
    /// One vector per key
    Vector(Vec<Vec3>),
    /// One unit quaternion per key
    Quaternion(Vec<Quat>),
}

impl TrackValues {
    fn len(&self) -> usize {
        match self {
            Self::Scalar(v) => v.len(),
            Self::Vector(v) => v.len(),
            Self::Quaternion(v) => v.len(),
        }
    }
}

/// One interpolated track sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackSample {
    /// Scalar sample
    Scalar(f32),
    /// Vector sample
    Vector(Vec3),
    /// Quaternion sample
    Quaternion(Quat),
}

/// A keyframe track bound to one property path
///
/// Paths name the target node and property, e.g. `"Arm.rotation"`,
/// `"Face.morph[2]"`.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyframeTrack {
    /// Target path (`"NodeName.property"`)
    pub path: String,
    /// Strictly increasing key times in seconds
    times: Vec<f32>,
    /// Key values, one per time
    values: TrackValues,
    /// Interpolation mode (ignored by quaternion tracks, which slerp)
    pub interpolation: Interpolation,
}

impl KeyframeTrack {
    /// Create a track, validating key layout
    pub fn new(
        path: impl Into<String>,
        times: Vec<f32>,
        values: TrackValues,
        interpolation: Interpolation,
    ) -> Result<Self, AnimationError> {
        let path = path.into();
        if times.is_empty() {
            return Err(AnimationError::Empty { path });
        }
        if times.len() != values.len() {
            return Err(AnimationError::MismatchedKeys {
                path,
                times: times.len(),
                values: values.len(),
            });
        }
        if times.windows(2).any(|w| w[0] >= w[1]) {
            return Err(AnimationError::UnsortedTimes { path });
        }
        Ok(Self {
            path,
            times,
            values,
            interpolation,
        })
    }

    /// Key times
    pub fn times(&self) -> &[f32] {
        &self.times
    }

    /// Time of the last key
    pub fn end_time(&self) -> f32 {
        *self.times.last().unwrap_or(&0.0)
    }

    /// Sample the track at a clip-local time
    ///
    /// Times outside the key range clamp to the first/last key.
    pub fn sample(&self, t: f32) -> TrackSample {
        let (i0, i1, alpha) = self.interval(t);
        match &self.values {
            TrackValues::Scalar(v) => TrackSample::Scalar(self.interp_scalar(v, i0, i1, alpha)),
            TrackValues::Vector(v) => TrackSample::Vector(self.interp_vector(v, i0, i1, alpha)),
            TrackValues::Quaternion(v) => {
                // Quaternion tracks interpolate spherically regardless of mode
                let alpha = match self.interpolation {
                    Interpolation::Discrete => 0.0,
                    _ => alpha,
                };
                TrackSample::Quaternion(slerp(&v[i0], &v[i1], alpha))
            }
        }
    }

    /// Locate the interval containing `t` and the position within it
    fn interval(&self, t: f32) -> (usize, usize, f32) {
        let n = self.times.len();
        if t <= self.times[0] || n == 1 {
            return (0, 0, 0.0);
        }
        if t >= self.times[n - 1] {
            return (n - 1, n - 1, 0.0);
        }
        let i1 = self.times.partition_point(|&key| key <= t);
        let i0 = i1 - 1;
        let span = self.times[i1] - self.times[i0];
        let alpha = if span > 0.0 {
            (t - self.times[i0]) / span
        } else {
            0.0
        };
        (i0, i1, alpha)
    }

    fn interp_scalar(&self, v: &[f32], i0: usize, i1: usize, alpha: f32) -> f32 {
        match self.interpolation {
            Interpolation::Discrete => v[i0],
            Interpolation::Linear => v[i0] + (v[i1] - v[i0]) * alpha,
            Interpolation::CubicSpline => {
                let before = v[i0.saturating_sub(1)];
                let after = v[(i1 + 1).min(v.len() - 1)];
                catmull_rom(before, v[i0], v[i1], after, alpha)
            }
        }
    }

    fn interp_vector(&self, v: &[Vec3], i0: usize, i1: usize, alpha: f32) -> Vec3 {
        match self.interpolation {
            Interpolation::Discrete => v[i0],
            Interpolation::Linear => v[i0] + (v[i1] - v[i0]) * alpha,
            Interpolation::CubicSpline => {
                let before = v[i0.saturating_sub(1)];
                let after = v[(i1 + 1).min(v.len() - 1)];
                Vec3::new(
                    catmull_rom(before.x, v[i0].x, v[i1].x, after.x, alpha),
                    catmull_rom(before.y, v[i0].y, v[i1].y, after.y, alpha),
                    catmull_rom(before.z, v[i0].z, v[i1].z, after.z, alpha),
                )
            }
        }
    }
}

/// Catmull-Rom spline through p1..p2 with neighbors p0/p3
fn catmull_rom(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let t2 = t * t;
    let t3 = t2 * t;
    0.5 * ((2.0 * p1)
        + (-p0 + p2) * t
        + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2
        + (-p0 + 3.0 * p1 - 3.0 * p2 + p3) * t3)
}

/// Shortest-path spherical linear interpolation
pub(super) fn slerp(a: &Quat, b: &Quat, t: f32) -> Quat {
    a.try_slerp(b, t, 1e-6).unwrap_or_else(|| {
        // Antipodal quaternions: negate one side and retry
        let flipped = Quat::new_unchecked(Quaternion::new(
            -b.w, -b.i, -b.j, -b.k,
        ));
        a.try_slerp(&flipped, t, 1e-6).unwrap_or(*a)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_key_validation() {
        assert_eq!(
            KeyframeTrack::new(
                "a.position",
                vec![0.0, 1.0],
                TrackValues::Scalar(vec![0.0]),
                Interpolation::Linear,
            )
            .unwrap_err(),
            AnimationError::MismatchedKeys {
                path: "a.position".to_string(),
                times: 2,
                values: 1
            }
        );

        assert!(matches!(
            KeyframeTrack::new(
                "a.position",
                vec![0.0, 1.0, 0.5],
                TrackValues::Scalar(vec![0.0, 1.0, 2.0]),
                Interpolation::Linear,
            ),
            Err(AnimationError::UnsortedTimes { .. })
        ));
    }

    #[test]
    fn test_linear_scalar_sampling() {
        let track = KeyframeTrack::new(
            "a.morph[0]",
            vec![0.0, 2.0],
            TrackValues::Scalar(vec![0.0, 10.0]),
            Interpolation::Linear,
        )
        .unwrap();

        assert_eq!(track.sample(1.0), TrackSample::Scalar(5.0));
        // Clamped outside the key range
        assert_eq!(track.sample(-1.0), TrackSample::Scalar(0.0));
        assert_eq!(track.sample(5.0), TrackSample::Scalar(10.0));
    }

    #[test]
    fn test_discrete_holds_previous_key() {
        let track = KeyframeTrack::new(
            "a.morph[0]",
            vec![0.0, 1.0, 2.0],
            TrackValues::Scalar(vec![0.0, 5.0, 10.0]),
            Interpolation::Discrete,
        )
        .unwrap();

        assert_eq!(track.sample(0.9), TrackSample::Scalar(0.0));
        assert_eq!(track.sample(1.0), TrackSample::Scalar(5.0));
        assert_eq!(track.sample(1.9), TrackSample::Scalar(5.0));
    }

    #[test]
    fn test_cubic_passes_through_keys() {
        let track = KeyframeTrack::new(
            "a.position",
            vec![0.0, 1.0, 2.0, 3.0],
            TrackValues::Vector(vec![
                Vec3::zeros(),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(2.0, 1.0, 0.0),
                Vec3::new(3.0, 0.0, 0.0),
            ]),
            Interpolation::CubicSpline,
        )
        .unwrap();

        let TrackSample::Vector(at_key) = track.sample(1.0) else {
            panic!("vector track sampled non-vector");
        };
        assert_relative_eq!(at_key, Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_quaternion_track_slerps() {
        let a = Quat::identity();
        let b = Quat::from_axis_angle(&Vec3::y_axis(), std::f32::consts::FRAC_PI_2);
        let track = KeyframeTrack::new(
            "a.rotation",
            vec![0.0, 1.0],
            TrackValues::Quaternion(vec![a, b]),
            Interpolation::Linear,
        )
        .unwrap();

        let TrackSample::Quaternion(half) = track.sample(0.5) else {
            panic!("quaternion track sampled non-quaternion");
        };
        assert_relative_eq!(
            half.angle_to(&Quat::from_axis_angle(
                &Vec3::y_axis(),
                std::f32::consts::FRAC_PI_4
            )),
            0.0,
            epsilon = 1e-5
        );
    }
}
