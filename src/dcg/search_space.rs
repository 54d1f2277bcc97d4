//! Candidate groundings proposed for every phrase of one world.

use std::sync::Arc;

use crate::features::{Shape, ShapeTolerances};
use crate::symbols::{Container, Grounding, ObjectColor, Region};
use crate::types::Position;
use crate::world::World;

/// Spatial relation words the search space proposes.
pub const RELATIONS: [&str; 8] = ["front", "back", "left", "right", "near", "far", "top", "bottom"];

/// Largest index and number proposed.
pub const MAX_ORDINAL: u32 = 4;

/// Candidate groundings considered for every phrase of one sentence.
#[derive(Debug, Clone, Default)]
pub struct SearchSpace {
    candidates: Vec<Arc<Grounding>>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything a phrase about `world` could plausibly mean:
    ///
    /// - each object
    /// - each spatial relation, and a region for each relation, both
    ///   robot-relative and anchored on each object
    /// - each object type and color present
    /// - indices and numbers `1..=MAX_ORDINAL`
    /// - one container per object type with at least two members, labelled
    ///   with the shape its members form
    pub fn from_world(world: &World) -> Self {
        let mut space = Self::new();

        for object in world.objects() {
            space.push(Grounding::Object(object.clone()));
        }

        for relation in RELATIONS {
            space.push(Grounding::spatial_relation(relation));
            space.push(Grounding::Region(Region {
                relation: relation.into(),
                object: None,
            }));
            for object in world.objects() {
                space.push(Grounding::Region(Region {
                    relation: relation.into(),
                    object: Some(object.clone()),
                }));
            }
        }

        for object_type in world.object_types() {
            space.push(Grounding::object_type_named(object_type.clone()));

            let members: Vec<_> = world.objects_of_type(&object_type).cloned().collect();
            if members.len() >= 2 {
                let positions: Vec<Position> = members.iter().map(|o| o.position).collect();
                let shape = Shape::classify(&positions, &ShapeTolerances::default())
                    .unwrap_or(Shape::Group);
                space.push(Grounding::Container(Container {
                    shape: shape.as_str().into(),
                    objects: members,
                }));
            }
        }

        for color in world.colors() {
            space.push(Grounding::ObjectColor(ObjectColor { name: color }));
        }

        for n in 1..=MAX_ORDINAL {
            space.push(Grounding::index(n));
            space.push(Grounding::number(n));
        }

        space
    }

    /// Add a candidate unless an equal one is already present.
    pub fn push(&mut self, grounding: Grounding) {
        if !self.candidates.iter().any(|c| **c == grounding) {
            self.candidates.push(Arc::new(grounding));
        }
    }

    pub fn candidates(&self) -> &[Arc<Grounding>] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
