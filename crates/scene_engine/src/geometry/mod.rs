//! Geometry data model
//!
//! CPU-side flat-array representation of per-vertex data consumed by the
//! GPU: typed attribute buffers, an optional index buffer, material groups,
//! and cached bounding volumes. GPU counterparts are created lazily on first
//! render and live until an explicit dispose event.

mod attribute;
mod bounds;
#[allow(clippy::module_inception)]
mod geometry;

pub use attribute::{AttributeData, AttributeError, BufferAttribute, UpdateRange};
pub use bounds::{Aabb, BoundingSphere, Frustum, Plane};
pub use geometry::{BufferGeometry, GeometryError, GeometryGroup};

slotmap::new_key_type! {
    /// Non-owning handle to a [`BufferGeometry`] in the resource store
    pub struct GeometryKey;
}

/// Attribute name used for vertex positions
pub const ATTRIBUTE_POSITION: &str = "position";

/// Attribute name used for vertex normals
pub const ATTRIBUTE_NORMAL: &str = "normal";

/// Attribute name used for texture coordinates
pub const ATTRIBUTE_UV: &str = "uv";

/// Attribute name used for per-vertex colors
pub const ATTRIBUTE_COLOR: &str = "color";
