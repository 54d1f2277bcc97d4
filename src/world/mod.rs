//! Read-only world snapshot for one utterance.
//!
//! The world maps object ids to [`Object`]s and carries precomputed total
//! orderings ("blocks sorted by distance from the robot") that sort-index and
//! order-dependent predicates consult. Orderings are computed once at
//! construction for every [`SortCriterion`], both over all objects and per
//! object type, so predicates never sort in the hot path.
//!
//! # Relation to criterion
//!
//! ```text
//! front -> min_x     back   -> max_x
//! left  -> max_y     right  -> min_y
//! near  -> min_distance     far -> max_distance
//! top   -> max_z     bottom -> min_z
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::symbols::Object;
use crate::types::{Axis, Position};

/// A named way of totally ordering objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SortCriterion {
    MinX,
    MaxX,
    MinY,
    MaxY,
    MinZ,
    MaxZ,
    MinAbsY,
    MaxAbsY,
    MinDistance,
    MaxDistance,
}

impl SortCriterion {
    pub const ALL: [SortCriterion; 10] = [
        SortCriterion::MinX,
        SortCriterion::MaxX,
        SortCriterion::MinY,
        SortCriterion::MaxY,
        SortCriterion::MinZ,
        SortCriterion::MaxZ,
        SortCriterion::MinAbsY,
        SortCriterion::MaxAbsY,
        SortCriterion::MinDistance,
        SortCriterion::MaxDistance,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SortCriterion::MinX => "min_x",
            SortCriterion::MaxX => "max_x",
            SortCriterion::MinY => "min_y",
            SortCriterion::MaxY => "max_y",
            SortCriterion::MinZ => "min_z",
            SortCriterion::MaxZ => "max_z",
            SortCriterion::MinAbsY => "min_abs_y",
            SortCriterion::MaxAbsY => "max_abs_y",
            SortCriterion::MinDistance => "min_distance",
            SortCriterion::MaxDistance => "max_distance",
        }
    }

    /// Criterion implied by a spatial relation word, if any.
    pub fn from_relation(relation: &str) -> Option<Self> {
        match relation {
            "front" => Some(SortCriterion::MinX),
            "back" => Some(SortCriterion::MaxX),
            "left" => Some(SortCriterion::MaxY),
            "right" => Some(SortCriterion::MinY),
            "near" => Some(SortCriterion::MinDistance),
            "far" => Some(SortCriterion::MaxDistance),
            "top" => Some(SortCriterion::MaxZ),
            "bottom" => Some(SortCriterion::MinZ),
            _ => None,
        }
    }

    fn key(self, p: &Position) -> f64 {
        match self {
            SortCriterion::MinX | SortCriterion::MaxX => p.axis(Axis::X),
            SortCriterion::MinY | SortCriterion::MaxY => p.axis(Axis::Y),
            SortCriterion::MinZ | SortCriterion::MaxZ => p.axis(Axis::Z),
            SortCriterion::MinAbsY | SortCriterion::MaxAbsY => p.y.abs(),
            SortCriterion::MinDistance | SortCriterion::MaxDistance => p.norm(),
        }
    }

    fn ascending(self) -> bool {
        matches!(
            self,
            SortCriterion::MinX
                | SortCriterion::MinY
                | SortCriterion::MinZ
                | SortCriterion::MinAbsY
                | SortCriterion::MinDistance
        )
    }
}

impl fmt::Display for SortCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortCriterion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortCriterion::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .or_else(|| SortCriterion::from_relation(s))
            .ok_or_else(|| format!("unknown sort criterion '{}'", s))
    }
}

/// Orderings for one criterion: over every object, and per object type.
#[derive(Debug, Clone, Default)]
struct Orderings {
    all: Vec<Arc<str>>,
    by_type: HashMap<Arc<str>, Vec<Arc<str>>>,
}

/// Objects plus their precomputed orderings.
#[derive(Debug, Clone, Default)]
pub struct World {
    objects: BTreeMap<Arc<str>, Object>,
    orderings: HashMap<SortCriterion, Orderings>,
}

impl World {
    /// Build a world and precompute every ordering.
    ///
    /// Ties are broken by object id so orderings are deterministic.
    pub fn new(objects: impl IntoIterator<Item = Object>) -> Self {
        let objects: BTreeMap<Arc<str>, Object> = objects
            .into_iter()
            .map(|o| (o.id.clone(), o))
            .collect();

        let mut world = Self {
            objects,
            orderings: HashMap::new(),
        };

        let types = world.object_types();
        for criterion in SortCriterion::ALL {
            let all = world.compute_ordering(criterion, None);
            let by_type = types
                .iter()
                .map(|t| (t.clone(), world.compute_ordering(criterion, Some(t.as_ref()))))
                .collect();
            world.orderings.insert(criterion, Orderings { all, by_type });
        }

        world
    }

    fn compute_ordering(&self, criterion: SortCriterion, object_type: Option<&str>) -> Vec<Arc<str>> {
        let mut members: Vec<&Object> = self
            .objects
            .values()
            .filter(|o| object_type.is_none_or(|t| o.object_type.as_ref() == t))
            .collect();

        members.sort_by(|a, b| {
            let (ka, kb) = (criterion.key(&a.position), criterion.key(&b.position));
            let ord = if criterion.ascending() {
                ka.total_cmp(&kb)
            } else {
                kb.total_cmp(&ka)
            };
            ord.then_with(|| a.id.cmp(&b.id))
        });

        members.into_iter().map(|o| o.id.clone()).collect()
    }

    /// Replace or add a named ordering computed elsewhere.
    pub fn with_ordering(
        mut self,
        criterion: SortCriterion,
        object_type: Option<&str>,
        ids: Vec<Arc<str>>,
    ) -> Self {
        let entry = self.orderings.entry(criterion).or_default();
        match object_type {
            Some(t) => {
                entry.by_type.insert(Arc::from(t), ids);
            }
            None => entry.all = ids,
        }
        self
    }

    pub fn object(&self, id: &str) -> Option<&Object> {
        self.objects.get(id)
    }

    /// All objects in id order.
    pub fn objects(&self) -> impl Iterator<Item = &Object> {
        self.objects.values()
    }

    pub fn objects_of_type<'a>(&'a self, object_type: &'a str) -> impl Iterator<Item = &'a Object> {
        self.objects
            .values()
            .filter(move |o| o.object_type.as_ref() == object_type)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Distinct object types, sorted.
    pub fn object_types(&self) -> Vec<Arc<str>> {
        let set: BTreeSet<Arc<str>> = self.objects.values().map(|o| o.object_type.clone()).collect();
        set.into_iter().collect()
    }

    /// Distinct object colors, sorted.
    pub fn colors(&self) -> Vec<Arc<str>> {
        let set: BTreeSet<Arc<str>> = self.objects.values().filter_map(|o| o.color.clone()).collect();
        set.into_iter().collect()
    }

    /// Ordering of object ids for a criterion, optionally restricted to one type.
    pub fn ordering(&self, criterion: SortCriterion, object_type: Option<&str>) -> Option<&[Arc<str>]> {
        let orderings = self.orderings.get(&criterion)?;
        match object_type {
            Some(t) => orderings.by_type.get(t).map(Vec::as_slice),
            None => Some(orderings.all.as_slice()),
        }
    }

    /// The `index`-th (one-based) object of an ordering.
    pub fn nth(&self, criterion: SortCriterion, object_type: Option<&str>, index: usize) -> Option<&Object> {
        if index == 0 {
            return None;
        }
        let ids = self.ordering(criterion, object_type)?;
        ids.get(index - 1).and_then(|id| self.object(id))
    }
}
