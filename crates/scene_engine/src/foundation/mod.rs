//! Foundation utilities shared across the engine
//!
//! Contains the math layer the rest of the crate builds on. The actual
//! linear algebra comes from `nalgebra`; this module pins the concrete
//! scalar types and adds the transform/projection helpers the scene graph
//! and renderer depend on.

pub mod math;
