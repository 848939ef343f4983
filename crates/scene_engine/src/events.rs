//! Dispose-event channel between CPU resource stores and GPU managers
//!
//! GPU-side records are freed only when the CPU-side owner raises a dispose
//! event; nothing is reclaimed implicitly. Stores queue events here and the
//! renderer drains the queue at the start of each frame, so a dispose issued
//! mid-frame never invalidates a record the current draw loop is using.

use crate::geometry::GeometryKey;
use crate::material::{MaterialKey, TextureKey};

/// Lifecycle signal requesting release of a paired GPU-side resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposeEvent {
    /// A geometry and its attribute buffers were disposed
    Geometry(GeometryKey),
    /// A texture was disposed
    Texture(TextureKey),
    /// A material was disposed; releases its cached program reference
    Material(MaterialKey),
}

/// Queue of pending dispose events
///
/// Delivery is deferred: events accumulate until a consumer drains them.
#[derive(Debug, Default)]
pub struct DisposeQueue {
    pending: Vec<DisposeEvent>,
}

impl DisposeQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event for deferred delivery
    pub fn push(&mut self, event: DisposeEvent) {
        self.pending.push(event);
    }

    /// Take all pending events, leaving the queue empty
    pub fn drain(&mut self) -> Vec<DisposeEvent> {
        std::mem::take(&mut self.pending)
    }

    /// Number of undelivered events
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether there are no undelivered events
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    #[test]
    fn test_drain_empties_queue() {
        let mut queue = DisposeQueue::new();
        let key = GeometryKey::from(KeyData::from_ffi(1));
        queue.push(DisposeEvent::Geometry(key));
        queue.push(DisposeEvent::Geometry(key));
        assert_eq!(queue.len(), 2);

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert!(queue.is_empty());
    }
}
