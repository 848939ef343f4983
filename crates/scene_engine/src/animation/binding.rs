//! Track-path resolution against a scene
//!
//! A track path names its target as `"NodeName.property"`. Resolution turns
//! the path into a node key plus a typed property selector once, so per-frame
//! evaluation never parses strings. Unresolvable paths follow the render
//! loop's soft-failure policy: a diagnostic, and the track stays inactive.

use crate::scene::{NodeKey, Scene};

/// Typed property selector a track writes into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundProperty {
    /// Local position
    Position,
    /// Local rotation
    Rotation,
    /// Local scale
    Scale,
    /// One morph-target influence weight
    MorphInfluence(usize),
}

/// A resolved track target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyBinding {
    /// Target node
    pub node: NodeKey,
    /// Target property on the node
    pub property: BoundProperty,
}

impl PropertyBinding {
    /// Parse and resolve a track path against a scene
    ///
    /// Returns `None` with a diagnostic when the node is missing or the
    /// property name is unknown.
    pub fn resolve(scene: &Scene, path: &str) -> Option<Self> {
        let (name, property) = match path.rsplit_once('.') {
            Some(parts) => parts,
            None => {
                log::warn!("track path '{path}' has no property suffix, track stays inactive");
                return None;
            }
        };

        let property = match parse_property(property) {
            Some(property) => property,
            None => {
                log::warn!("track path '{path}' targets unknown property, track stays inactive");
                return None;
            }
        };

        let node = match scene.get_object_by_name(name) {
            Some(node) => node,
            None => {
                log::warn!("track path '{path}' targets missing node, track stays inactive");
                return None;
            }
        };

        Some(Self { node, property })
    }
}

fn parse_property(name: &str) -> Option<BoundProperty> {
    match name {
        "position" => Some(BoundProperty::Position),
        "rotation" => Some(BoundProperty::Rotation),
        "scale" => Some(BoundProperty::Scale),
        _ => {
            let index = name.strip_prefix("morph[")?.strip_suffix(']')?;
            index.parse().ok().map(BoundProperty::MorphInfluence)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_transform_properties() {
        let mut scene = Scene::new();
        let node = scene.add_group("arm");
        scene.add_child(scene.root(), node);

        let binding = PropertyBinding::resolve(&scene, "arm.position").unwrap();
        assert_eq!(binding.node, node);
        assert_eq!(binding.property, BoundProperty::Position);

        let binding = PropertyBinding::resolve(&scene, "arm.morph[3]").unwrap();
        assert_eq!(binding.property, BoundProperty::MorphInfluence(3));
    }

    #[test]
    fn test_unresolvable_paths_are_none() {
        let scene = Scene::new();
        assert!(PropertyBinding::resolve(&scene, "ghost.position").is_none());
        assert!(PropertyBinding::resolve(&scene, "root.spin").is_none());
        assert!(PropertyBinding::resolve(&scene, "no-property").is_none());
    }
}
