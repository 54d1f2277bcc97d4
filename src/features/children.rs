//! Predicates relating the candidate to its accepted child groundings.
//!
//! A candidate with no accepted children at all cannot be related to
//! anything, so these predicates report it as inapplicable.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::{Feature, FeatureConfig, FeatureInput, FeatureKind};
use crate::error::ModelResult;
use crate::symbols::Grounding;

/// How a child grounding must relate to the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildRelation {
    /// The child is structurally equal to the candidate
    Equal,
    /// The candidate is a region whose reference object is a child object
    RegionObject,
    /// The candidate is a container holding a child object
    ContainerMember,
}

impl ChildRelation {
    pub fn as_str(self) -> &'static str {
        match self {
            ChildRelation::Equal => "equal",
            ChildRelation::RegionObject => "region_object",
            ChildRelation::ContainerMember => "container_member",
        }
    }

    fn holds(self, candidate: &Grounding, child: &Grounding) -> Option<bool> {
        match self {
            ChildRelation::Equal => Some(candidate == child),
            ChildRelation::RegionObject => {
                let Grounding::Region(region) = candidate else {
                    return None;
                };
                let anchor = region.object.as_ref()?;
                Some(child.as_object().is_some_and(|o| o.id == anchor.id))
            }
            ChildRelation::ContainerMember => {
                let Grounding::Container(container) = candidate else {
                    return None;
                };
                Some(
                    child
                        .as_object()
                        .is_some_and(|o| container.objects.iter().any(|m| m.id == o.id)),
                )
            }
        }
    }
}

impl fmt::Display for ChildRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChildRelation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equal" => Ok(ChildRelation::Equal),
            "region_object" => Ok(ChildRelation::RegionObject),
            "container_member" => Ok(ChildRelation::ContainerMember),
            other => Err(format!("unknown child relation '{}'", other)),
        }
    }
}

/// Fires when some accepted child grounding stands in `relation` to the
/// candidate.
#[derive(Debug, Clone)]
pub struct ChildMatchFeature {
    relation: ChildRelation,
    invert: bool,
}

impl ChildMatchFeature {
    pub const KIND: &'static str = "child_match";

    pub fn new(relation: ChildRelation, invert: bool) -> Self {
        Self { relation, invert }
    }

    pub fn from_config(config: &FeatureConfig) -> ModelResult<Self> {
        Ok(Self::new(
            config.parse_param_or("relation", ChildRelation::Equal)?,
            config.invert,
        ))
    }
}

impl Feature for ChildMatchFeature {
    fn name(&self) -> &'static str {
        Self::KIND
    }

    fn kind(&self) -> FeatureKind {
        FeatureKind::Grounding
    }

    fn invert(&self) -> bool {
        self.invert
    }

    fn decide(&self, input: &FeatureInput<'_>) -> Option<bool> {
        let mut applicable = false;
        for (_, child) in input.child_groundings() {
            match self.relation.holds(input.grounding, child) {
                Some(true) => return Some(true),
                Some(false) => applicable = true,
                None => return None,
            }
        }
        applicable.then_some(false)
    }

    fn config(&self) -> FeatureConfig {
        FeatureConfig::new(Self::KIND)
            .inverted(self.invert)
            .with_param("relation", self.relation.as_str())
    }
}

/// Fires when some accepted child grounding has class `class`.
#[derive(Debug, Clone)]
pub struct ChildClassFeature {
    class: Arc<str>,
    invert: bool,
}

impl ChildClassFeature {
    pub const KIND: &'static str = "child_class";

    pub fn new(class: &str, invert: bool) -> Self {
        Self {
            class: Arc::from(class),
            invert,
        }
    }

    pub fn from_config(config: &FeatureConfig) -> ModelResult<Self> {
        Ok(Self::new(&config.str_param("class")?, config.invert))
    }
}

impl Feature for ChildClassFeature {
    fn name(&self) -> &'static str {
        Self::KIND
    }

    fn kind(&self) -> FeatureKind {
        FeatureKind::Grounding
    }

    fn invert(&self) -> bool {
        self.invert
    }

    fn decide(&self, input: &FeatureInput<'_>) -> Option<bool> {
        let mut children = input.child_groundings().peekable();
        children.peek()?;
        Some(children.any(|(_, g)| g.class_name() == self.class.as_ref()))
    }

    fn config(&self) -> FeatureConfig {
        FeatureConfig::new(Self::KIND)
            .inverted(self.invert)
            .with_param("class", self.class.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::ChildGroundings;
    use crate::features::test_support::{block_world, noun_phrase, object};
    use crate::language::{Phrase, PhraseKind, Word};
    use crate::symbols::Region;
    use crate::types::Outcome;

    fn child(phrase: &Arc<Phrase>, g: Grounding) -> ChildGroundings {
        ChildGroundings::new(phrase.clone(), vec![Arc::new(g)])
    }

    #[test]
    fn test_region_object_relation() {
        let world = block_world();
        let np = Arc::new(noun_phrase(&[("DT", "the"), ("NN", "box")]));
        let pp = Phrase::new(
            PhraseKind::Pp,
            vec![Word::new("IN", "near", 0)],
            vec![np.clone()],
        );
        let region = Grounding::Region(Region {
            relation: "near".into(),
            object: world.object("b0").cloned(),
        });

        let matching = [child(&np, object(&world, "b0"))];
        let other = [child(&np, object(&world, "b1"))];
        let feature = ChildMatchFeature::new(ChildRelation::RegionObject, false);

        let input = FeatureInput::new(Outcome::Compatible, &region, &matching, &pp, &world);
        assert!(feature.value(&input));

        let input = FeatureInput::new(Outcome::Compatible, &region, &other, &pp, &world);
        assert!(!feature.value(&input));
        assert!(ChildMatchFeature::new(ChildRelation::RegionObject, true).value(&input));
    }

    #[test]
    fn test_no_children_is_inapplicable() {
        let world = block_world();
        let np = noun_phrase(&[("NN", "box")]);
        let g = object(&world, "b0");
        let input = FeatureInput::new(Outcome::Compatible, &g, &[], &np, &world);

        assert!(!ChildMatchFeature::new(ChildRelation::Equal, false).value(&input));
        assert!(!ChildMatchFeature::new(ChildRelation::Equal, true).value(&input));
        assert!(!ChildClassFeature::new("object", true).value(&input));
    }

    #[test]
    fn test_child_class_and_equal() {
        let world = block_world();
        let inner = Arc::new(noun_phrase(&[("NN", "box")]));
        let outer = Phrase::new(PhraseKind::Np, vec![], vec![inner.clone()]);
        let g = object(&world, "b0");
        let children = [child(&inner, g.clone())];
        let input = FeatureInput::new(Outcome::Compatible, &g, &children, &outer, &world);

        assert!(ChildMatchFeature::new(ChildRelation::Equal, false).value(&input));
        assert!(ChildClassFeature::new("object", false).value(&input));
        assert!(!ChildClassFeature::new("region", false).value(&input));
    }
}
