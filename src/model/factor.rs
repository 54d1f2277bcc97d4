//! The correspondence graph.
//!
//! Factors live in one flat arena and refer to their children by index. The
//! enumerator pushes children before parents, so walking the arena in order
//! is a valid dependency order: by the time a parent is scored, every child
//! already has its final outcome.

use std::sync::Arc;

use tracing::trace;

use super::{Llm, LlmX};
use crate::features::ChildGroundings;
use crate::language::Phrase;
use crate::symbols::Grounding;
use crate::types::Outcome;
use crate::world::World;

/// Index of a factor in its [`FactorGraph`].
pub type FactorId = usize;

/// Probability reported by a factor that has no model attached.
pub const NEUTRAL_PROBABILITY: f64 = 0.5;

/// One scored hypothesis: "this phrase refers to this grounding".
#[derive(Debug, Clone)]
pub struct Factor {
    pub outcome: Outcome,
    pub grounding: Arc<Grounding>,
    pub phrase: Arc<Phrase>,
    pub children: Vec<FactorId>,
    pub llm: Option<Arc<Llm>>,
    pub outcome_domain: Vec<Outcome>,
    pub context: Option<Arc<Grounding>>,
    /// Highest-probability compatible child, once resolved
    pub solution: Option<FactorId>,
    pub probability: f64,
}

impl Factor {
    pub fn new(grounding: Arc<Grounding>, phrase: Arc<Phrase>, llm: Option<Arc<Llm>>) -> Self {
        Self {
            outcome: Outcome::Unknown,
            grounding,
            phrase,
            children: Vec::new(),
            llm,
            outcome_domain: Outcome::BINARY.to_vec(),
            context: None,
            solution: None,
            probability: 0.0,
        }
    }

    pub fn with_children(mut self, children: Vec<FactorId>) -> Self {
        self.children = children;
        self
    }

    pub fn with_domain(mut self, outcome_domain: Vec<Outcome>) -> Self {
        self.outcome_domain = outcome_domain;
        self
    }

    pub fn with_context(mut self, context: Option<Arc<Grounding>>) -> Self {
        self.context = context;
        self
    }
}

/// Best grounding found for one phrase.
#[derive(Debug, Clone)]
pub struct PhraseGrounding {
    pub phrase: Arc<Phrase>,
    /// `None` when no candidate resolved as compatible
    pub best: Option<(FactorId, Arc<Grounding>, f64)>,
}

/// Arena of factors over one world.
#[derive(Debug, Clone)]
pub struct FactorGraph {
    factors: Vec<Factor>,
    world: Arc<World>,
}

fn same_phrase(a: &Arc<Phrase>, b: &Arc<Phrase>) -> bool {
    Arc::ptr_eq(a, b) || a == b
}

impl FactorGraph {
    pub fn new(world: Arc<World>) -> Self {
        Self {
            factors: Vec::new(),
            world,
        }
    }

    /// Append a factor whose children are already in the graph.
    pub fn push(&mut self, factor: Factor) -> FactorId {
        let id = self.factors.len();
        debug_assert!(
            factor.children.iter().all(|&c| c < id),
            "children must precede their parent"
        );
        self.factors.push(factor);
        id
    }

    pub fn get(&self, id: FactorId) -> Option<&Factor> {
        self.factors.get(id)
    }

    pub fn get_mut(&mut self, id: FactorId) -> Option<&mut Factor> {
        self.factors.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FactorId, &Factor)> {
        self.factors.iter().enumerate()
    }

    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    /// Groundings of the children currently marked compatible, grouped by
    /// child phrase in first-seen order. Missing or unresolved children are
    /// left out.
    pub fn compatible_children(&self, id: FactorId) -> Vec<ChildGroundings> {
        let Some(factor) = self.factors.get(id) else {
            return Vec::new();
        };

        let mut grouped: Vec<ChildGroundings> = Vec::new();
        for &child_id in &factor.children {
            let Some(child) = self.factors.get(child_id) else {
                continue;
            };
            if child.outcome != Outcome::Compatible {
                continue;
            }
            match grouped
                .iter_mut()
                .find(|g| same_phrase(&g.phrase, &child.phrase))
            {
                Some(group) => group.groundings.push(child.grounding.clone()),
                None => grouped.push(ChildGroundings::new(
                    child.phrase.clone(),
                    vec![child.grounding.clone()],
                )),
            }
        }
        grouped
    }

    /// Scoring example for a factor in the graph's current state.
    pub fn example(&self, id: FactorId) -> Option<LlmX> {
        let factor = self.factors.get(id)?;
        Some(
            LlmX::new(
                factor.grounding.clone(),
                self.compatible_children(id),
                factor.phrase.clone(),
                self.world.clone(),
            )
            .with_domain(factor.outcome_domain.clone())
            .with_context(factor.context.clone()),
        )
    }

    /// Assign `outcome` to a factor and return (and cache) its probability.
    ///
    /// A factor with no model scores a neutral 0.5.
    pub fn value(&mut self, id: FactorId, outcome: Outcome) -> f64 {
        let Some(x) = self.example(id) else {
            return 0.0;
        };
        let factor = &mut self.factors[id];
        factor.outcome = outcome;
        factor.probability = match &factor.llm {
            Some(llm) => llm.pygx(outcome, &x),
            None => NEUTRAL_PROBABILITY,
        };
        factor.probability
    }

    /// Score every factor in dependency order, keeping the arg-max outcome.
    pub fn resolve(&mut self) {
        for id in 0..self.factors.len() {
            let Some(x) = self.example(id) else {
                continue;
            };
            let (outcome, probability) = match &self.factors[id].llm {
                Some(llm) => llm.best_outcome(&x),
                None => (Outcome::Compatible, NEUTRAL_PROBABILITY),
            };

            let solution = self.factors[id]
                .children
                .iter()
                .copied()
                .filter(|&c| {
                    self.factors
                        .get(c)
                        .is_some_and(|f| f.outcome == Outcome::Compatible)
                })
                .max_by(|&a, &b| {
                    self.factors[a]
                        .probability
                        .total_cmp(&self.factors[b].probability)
                });

            let factor = &mut self.factors[id];
            factor.outcome = outcome;
            factor.probability = probability;
            factor.solution = solution;
            trace!(
                factor = id,
                grounding = %factor.grounding,
                outcome = %outcome,
                probability,
                "resolved factor"
            );
        }
    }

    /// Per phrase (first-seen order), the most probable compatible grounding.
    pub fn best_groundings(&self) -> Vec<PhraseGrounding> {
        let mut out: Vec<PhraseGrounding> = Vec::new();
        for (id, factor) in self.factors.iter().enumerate() {
            let entry = match out.iter().position(|p| same_phrase(&p.phrase, &factor.phrase)) {
                Some(i) => &mut out[i],
                None => {
                    out.push(PhraseGrounding {
                        phrase: factor.phrase.clone(),
                        best: None,
                    });
                    let last = out.len() - 1;
                    &mut out[last]
                }
            };
            if factor.outcome != Outcome::Compatible {
                continue;
            }
            let better = entry
                .best
                .as_ref()
                .is_none_or(|(_, _, p)| factor.probability > *p);
            if better {
                entry.best = Some((id, factor.grounding.clone(), factor.probability));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_support::{block_world, object};
    use crate::features::{
        ChildMatchFeature, ChildRelation, ConjunctionFeature, Feature, FeatureSet,
        ObjectTypeFeature, OutcomeFeature,
    };
    use crate::language::{PhraseKind, Word};
    use crate::symbols::Region;

    fn phrases() -> (Arc<Phrase>, Arc<Phrase>) {
        let np = Arc::new(Phrase::leaf(
            PhraseKind::Np,
            vec![Word::new("DT", "the", 1), Word::new("NN", "box", 2)],
        ));
        let pp = Arc::new(Phrase::new(
            PhraseKind::Pp,
            vec![Word::new("IN", "near", 0)],
            vec![np.clone()],
        ));
        (np, pp)
    }

    fn child_sensitive_llm() -> Arc<Llm> {
        let compatible: Arc<dyn Feature> = Arc::new(OutcomeFeature::new(Outcome::Compatible, false));
        let anchored: Arc<dyn Feature> =
            Arc::new(ChildMatchFeature::new(ChildRelation::RegionObject, false));
        let is_box: Arc<dyn Feature> = Arc::new(ObjectTypeFeature::new("box", false));
        let features: Vec<Arc<dyn Feature>> = vec![
            Arc::new(ConjunctionFeature::new(vec![compatible.clone(), anchored], false)),
            Arc::new(ConjunctionFeature::new(vec![compatible, is_box], false)),
        ];
        let set = Arc::new(FeatureSet::from_features(features));
        Arc::new(Llm::with_weights(set, vec![3.0, 2.0]).unwrap())
    }

    #[test]
    fn test_incompatible_child_is_excluded() {
        let world = Arc::new(block_world());
        let (np, pp) = phrases();
        let llm = child_sensitive_llm();

        let mut graph = FactorGraph::new(world.clone());
        let child = graph.push(Factor::new(
            Arc::new(object(&world, "b0")),
            np.clone(),
            Some(llm.clone()),
        ));
        let region = Grounding::Region(Region {
            relation: "near".into(),
            object: world.object("b0").cloned(),
        });
        let parent = graph.push(
            Factor::new(Arc::new(region), pp.clone(), Some(llm.clone())).with_children(vec![child]),
        );

        graph.get_mut(child).unwrap().outcome = Outcome::Incompatible;
        assert!(graph.compatible_children(parent).is_empty());
        let excluded = graph.value(parent, Outcome::Compatible);
        // only the bias-free path remains: exp(0) / (exp(0) + exp(0))
        assert!((excluded - 0.5).abs() < 1e-12);

        graph.get_mut(child).unwrap().outcome = Outcome::Compatible;
        let children = graph.compatible_children(parent);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].groundings.len(), 1);
        let included = graph.value(parent, Outcome::Compatible);
        assert!(included > excluded);
    }

    #[test]
    fn test_factor_without_model_is_neutral() {
        let world = Arc::new(block_world());
        let (np, _) = phrases();
        let mut graph = FactorGraph::new(world.clone());
        let id = graph.push(Factor::new(Arc::new(object(&world, "b0")), np, None));
        assert_eq!(graph.value(id, Outcome::Compatible), 0.5);
        assert_eq!(graph.get(id).unwrap().outcome, Outcome::Compatible);
    }

    #[test]
    fn test_resolve_picks_best_per_phrase() {
        let world = Arc::new(block_world());
        let (np, pp) = phrases();
        let llm = child_sensitive_llm();

        let mut graph = FactorGraph::new(world.clone());
        let boxed = graph.push(Factor::new(Arc::new(object(&world, "b0")), np.clone(), Some(llm.clone())));
        let ball = graph.push(Factor::new(Arc::new(object(&world, "s0")), np.clone(), Some(llm.clone())));
        let region = Grounding::Region(Region {
            relation: "near".into(),
            object: world.object("b0").cloned(),
        });
        graph.push(
            Factor::new(Arc::new(region), pp.clone(), Some(llm.clone())).with_children(vec![boxed, ball]),
        );

        graph.resolve();
        assert_eq!(graph.get(boxed).unwrap().outcome, Outcome::Compatible);
        // nothing fires for the ball, so the tie goes to the first outcome
        assert!((graph.get(ball).unwrap().probability - 0.5).abs() < 1e-12);

        let best = graph.best_groundings();
        assert_eq!(best.len(), 2);
        let (id, _, _) = best[0].best.clone().unwrap();
        assert_eq!(id, boxed);
        assert!(best[1].best.is_some());
        assert_eq!(graph.get(2).unwrap().solution, Some(boxed));
    }
}
