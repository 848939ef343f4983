//! Typed per-vertex attribute buffers
//!
//! A [`BufferAttribute`] owns a flat numeric array interpreted through
//! `item_size` components per vertex. Every mutation bumps a version counter
//! the GPU resource managers compare against their last-synced version, and
//! partial edits can be narrowed to byte ranges so re-upload stays
//! incremental.

use thiserror::Error;

/// Errors raised by the typed accessors
///
/// These indicate caller bugs (bad index, wrong component arity) and are
/// fatal to the calling code rather than logged diagnostics.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AttributeError {
    /// Vertex index past the end of the buffer
    #[error("vertex index {index} out of bounds (count {count})")]
    IndexOutOfBounds {
        /// Offending vertex index
        index: usize,
        /// Number of vertices in the buffer
        count: usize,
    },

    /// Component offset not covered by the attribute's item size
    #[error("component {component} out of bounds (item size {item_size})")]
    ComponentOutOfBounds {
        /// Offending component offset
        component: usize,
        /// Components per vertex
        item_size: usize,
    },

    /// Storage length is not a multiple of the item size
    #[error("storage length {len} is not a multiple of item size {item_size}")]
    MisalignedStorage {
        /// Flat storage length
        len: usize,
        /// Components per vertex
        item_size: usize,
    },
}

/// Flat typed storage backing an attribute
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeData {
    /// 32-bit float components
    F32(Vec<f32>),
    /// 32-bit unsigned components (wide index buffers)
    U32(Vec<u32>),
    /// 16-bit unsigned components (narrow index buffers, quantized data)
    U16(Vec<u16>),
    /// 8-bit unsigned components (colors, quantized data)
    U8(Vec<u8>),
    /// 16-bit signed components
    I16(Vec<i16>),
    /// 8-bit signed components
    I8(Vec<i8>),
}

impl AttributeData {
    /// Number of scalar components in the flat storage
    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::U32(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::U8(v) => v.len(),
            Self::I16(v) => v.len(),
            Self::I8(v) => v.len(),
        }
    }

    /// Whether the storage holds no components
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size in bytes of one scalar component
    pub fn component_size(&self) -> usize {
        match self {
            Self::F32(_) | Self::U32(_) => 4,
            Self::U16(_) | Self::I16(_) => 2,
            Self::U8(_) | Self::I8(_) => 1,
        }
    }

    /// View the storage as raw bytes for GPU upload
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::F32(v) => bytemuck::cast_slice(v),
            Self::U32(v) => bytemuck::cast_slice(v),
            Self::U16(v) => bytemuck::cast_slice(v),
            Self::U8(v) => v,
            Self::I16(v) => bytemuck::cast_slice(v),
            Self::I8(v) => bytemuck::cast_slice(v),
        }
    }

    fn read(&self, offset: usize) -> f32 {
        match self {
            Self::F32(v) => v[offset],
            Self::U32(v) => v[offset] as f32,
            Self::U16(v) => f32::from(v[offset]),
            Self::U8(v) => f32::from(v[offset]),
            Self::I16(v) => f32::from(v[offset]),
            Self::I8(v) => f32::from(v[offset]),
        }
    }

    fn write(&mut self, offset: usize, value: f32) {
        match self {
            Self::F32(v) => v[offset] = value,
            Self::U32(v) => v[offset] = value as u32,
            Self::U16(v) => v[offset] = value as u16,
            Self::U8(v) => v[offset] = value as u8,
            Self::I16(v) => v[offset] = value as i16,
            Self::I8(v) => v[offset] = value as i8,
        }
    }

    /// Largest value when interpreted as normalized storage
    fn normalization_scale(&self) -> Option<f32> {
        match self {
            Self::F32(_) => None,
            Self::U32(_) => Some(u32::MAX as f32),
            Self::U16(_) => Some(f32::from(u16::MAX)),
            Self::U8(_) => Some(f32::from(u8::MAX)),
            Self::I16(_) => Some(f32::from(i16::MAX)),
            Self::I8(_) => Some(f32::from(i8::MAX)),
        }
    }
}

/// Dirty sub-range pending incremental GPU re-upload, in components
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateRange {
    /// First dirty component
    pub offset: usize,
    /// Number of dirty components
    pub count: usize,
}

/// Per-vertex typed data plus the bookkeeping the GPU sync layer needs
#[derive(Debug, Clone)]
pub struct BufferAttribute {
    data: AttributeData,
    item_size: usize,
    normalized: bool,
    version: u64,
    update_ranges: Vec<UpdateRange>,
}

impl BufferAttribute {
    /// Create an attribute from flat storage and components-per-vertex
    ///
    /// Returns an error when the storage length is not a multiple of
    /// `item_size`.
    pub fn new(data: AttributeData, item_size: usize) -> Result<Self, AttributeError> {
        if item_size == 0 || data.len() % item_size != 0 {
            return Err(AttributeError::MisalignedStorage {
                len: data.len(),
                item_size,
            });
        }
        Ok(Self {
            data,
            item_size,
            normalized: false,
            version: 0,
            update_ranges: Vec::new(),
        })
    }

    /// Float attribute from a flat `f32` slice
    pub fn from_f32(values: &[f32], item_size: usize) -> Result<Self, AttributeError> {
        Self::new(AttributeData::F32(values.to_vec()), item_size)
    }

    /// Mark integer storage as normalized
    ///
    /// Normalized storage is rescaled to [0, 1] (unsigned) or [-1, 1]
    /// (signed) on access through the typed getters/setters.
    pub fn with_normalized(mut self, normalized: bool) -> Self {
        self.normalized = normalized;
        self
    }

    /// Number of vertices (flat length / item size)
    pub fn count(&self) -> usize {
        self.data.len() / self.item_size
    }

    /// Components per vertex
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// Whether integer storage rescales on access
    pub fn normalized(&self) -> bool {
        self.normalized
    }

    /// Monotonically increasing mutation counter
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Underlying typed storage
    pub fn data(&self) -> &AttributeData {
        &self.data
    }

    /// Raw bytes for full GPU upload
    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_bytes()
    }

    /// Size in bytes of one scalar component
    pub fn component_size(&self) -> usize {
        self.data.component_size()
    }

    /// Pending dirty ranges, in components
    pub fn update_ranges(&self) -> &[UpdateRange] {
        &self.update_ranges
    }

    /// Queue a dirty sub-range (in components) for incremental re-upload
    ///
    /// Also bumps the version so the sync layer notices the edit.
    pub fn add_update_range(&mut self, offset: usize, count: usize) {
        self.update_ranges.push(UpdateRange { offset, count });
        self.version += 1;
    }

    /// Clear pending dirty ranges after the sync layer consumed them
    pub fn clear_update_ranges(&mut self) {
        self.update_ranges.clear();
    }

    /// Force a full re-upload on next sync
    pub fn mark_needs_update(&mut self) {
        self.version += 1;
    }

    fn component_offset(&self, index: usize, component: usize) -> Result<usize, AttributeError> {
        if index >= self.count() {
            return Err(AttributeError::IndexOutOfBounds {
                index,
                count: self.count(),
            });
        }
        if component >= self.item_size {
            return Err(AttributeError::ComponentOutOfBounds {
                component,
                item_size: self.item_size,
            });
        }
        Ok(index * self.item_size + component)
    }

    /// Read one component, denormalizing integer storage when flagged
    pub fn component(&self, index: usize, component: usize) -> Result<f32, AttributeError> {
        let offset = self.component_offset(index, component)?;
        let raw = self.data.read(offset);
        if self.normalized {
            if let Some(scale) = self.data.normalization_scale() {
                return Ok((raw / scale).max(-1.0));
            }
        }
        Ok(raw)
    }

    /// Write one component, renormalizing into integer storage when flagged
    ///
    /// Bumps the version counter.
    pub fn set_component(
        &mut self,
        index: usize,
        component: usize,
        value: f32,
    ) -> Result<(), AttributeError> {
        let offset = self.component_offset(index, component)?;
        let stored = if self.normalized {
            match self.data.normalization_scale() {
                Some(scale) => (value * scale).round(),
                None => value,
            }
        } else {
            value
        };
        self.data.write(offset, stored);
        self.version += 1;
        Ok(())
    }

    /// Read the first component of a vertex
    pub fn x(&self, index: usize) -> Result<f32, AttributeError> {
        self.component(index, 0)
    }

    /// Read the second component of a vertex
    pub fn y(&self, index: usize) -> Result<f32, AttributeError> {
        self.component(index, 1)
    }

    /// Read the third component of a vertex
    pub fn z(&self, index: usize) -> Result<f32, AttributeError> {
        self.component(index, 2)
    }

    /// Write the first component of a vertex
    pub fn set_x(&mut self, index: usize, value: f32) -> Result<(), AttributeError> {
        self.set_component(index, 0, value)
    }

    /// Write the second component of a vertex
    pub fn set_y(&mut self, index: usize, value: f32) -> Result<(), AttributeError> {
        self.set_component(index, 1, value)
    }

    /// Write the third component of a vertex
    pub fn set_z(&mut self, index: usize, value: f32) -> Result<(), AttributeError> {
        self.set_component(index, 2, value)
    }

    /// Write the first three components of a vertex
    pub fn set_xyz(&mut self, index: usize, x: f32, y: f32, z: f32) -> Result<(), AttributeError> {
        self.set_component(index, 0, x)?;
        self.set_component(index, 1, y)?;
        self.set_component(index, 2, z)
    }

    /// Read a whole vertex as up to four components
    pub fn vertex(&self, index: usize) -> Result<[f32; 4], AttributeError> {
        let mut out = [0.0; 4];
        for (component, slot) in out.iter_mut().enumerate().take(self.item_size.min(4)) {
            *slot = self.component(index, component)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_misaligned_storage_rejected() {
        let result = BufferAttribute::from_f32(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(
            result.unwrap_err(),
            AttributeError::MisalignedStorage { len: 4, item_size: 3 }
        );
    }

    #[test]
    fn test_index_out_of_bounds_is_an_error() {
        let attribute = BufferAttribute::from_f32(&[0.0; 9], 3).unwrap();
        assert_eq!(
            attribute.x(3).unwrap_err(),
            AttributeError::IndexOutOfBounds { index: 3, count: 3 }
        );
        assert_eq!(
            attribute.component(0, 3).unwrap_err(),
            AttributeError::ComponentOutOfBounds {
                component: 3,
                item_size: 3
            }
        );
    }

    #[test]
    fn test_every_mutation_bumps_version() {
        let mut attribute = BufferAttribute::from_f32(&[0.0; 6], 3).unwrap();
        let before = attribute.version();

        attribute.set_x(0, 1.0).unwrap();
        attribute.set_xyz(1, 1.0, 2.0, 3.0).unwrap();
        assert_eq!(attribute.version(), before + 4);

        attribute.add_update_range(0, 3);
        assert_eq!(attribute.version(), before + 5);
        assert_eq!(attribute.update_ranges(), &[UpdateRange { offset: 0, count: 3 }]);
    }

    #[test]
    fn test_normalized_u8_round_trip_within_one_step() {
        let mut attribute = BufferAttribute::new(AttributeData::U8(vec![0; 4]), 4)
            .unwrap()
            .with_normalized(true);

        attribute.set_x(0, 1.0).unwrap();
        let read = attribute.x(0).unwrap();
        assert!((read - 1.0).abs() <= 1.0 / 255.0);

        attribute.set_y(0, 0.5).unwrap();
        let read = attribute.y(0).unwrap();
        assert!((read - 0.5).abs() <= 1.0 / 255.0);
    }

    #[test]
    fn test_normalized_i8_clamps_lower_bound() {
        let mut attribute = BufferAttribute::new(AttributeData::I8(vec![0; 3]), 3)
            .unwrap()
            .with_normalized(true);

        attribute.set_x(0, -1.0).unwrap();
        let read = attribute.x(0).unwrap();
        assert!((read - -1.0).abs() <= 1.0 / 127.0);
        assert!(read >= -1.0);
    }

    #[test]
    fn test_bytes_round_trip() {
        let attribute = BufferAttribute::from_f32(&[1.0, 2.0], 1).unwrap();
        let bytes = attribute.as_bytes();
        assert_eq!(bytes.len(), 8);
        let back: &[f32] = bytemuck::cast_slice(bytes);
        assert_eq!(back, &[1.0, 2.0]);
    }
}
