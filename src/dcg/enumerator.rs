//! Bottom-up factor graph construction and training-example generation.

use std::sync::Arc;

use tracing::debug;

use super::SearchSpace;
use crate::features::ChildGroundings;
use crate::language::Phrase;
use crate::model::{Factor, FactorGraph, FactorId, Llm, LlmX};
use crate::symbols::Grounding;
use crate::types::Outcome;
use crate::world::World;

/// Builds correspondence graphs and training examples bottom-up over a
/// phrase tree.
#[derive(Debug, Clone)]
pub struct Enumerator {
    llm: Option<Arc<Llm>>,
    outcome_domain: Vec<Outcome>,
}

impl Enumerator {
    pub fn new(llm: Option<Arc<Llm>>) -> Self {
        Self {
            llm,
            outcome_domain: Outcome::BINARY.to_vec(),
        }
    }

    pub fn with_domain(mut self, outcome_domain: Vec<Outcome>) -> Self {
        self.outcome_domain = outcome_domain;
        self
    }

    /// One factor per (phrase, candidate), children pushed before parents.
    ///
    /// Each factor's children are all factors of its phrase's child phrases;
    /// which of them count is decided later by their resolved outcomes.
    pub fn build_graph(&self, root: &Arc<Phrase>, world: Arc<World>, space: &SearchSpace) -> FactorGraph {
        let mut graph = FactorGraph::new(world);
        let mut by_phrase: Vec<(Arc<Phrase>, Vec<FactorId>)> = Vec::new();

        for phrase in root.post_order() {
            let children: Vec<FactorId> = phrase
                .children
                .iter()
                .flat_map(|child| {
                    by_phrase
                        .iter()
                        .filter(move |(p, _)| Arc::ptr_eq(p, child))
                        .flat_map(|(_, ids)| ids.iter().copied())
                })
                .collect();

            let ids = space
                .candidates()
                .iter()
                .map(|candidate| {
                    graph.push(
                        Factor::new(candidate.clone(), phrase.clone(), self.llm.clone())
                            .with_children(children.clone())
                            .with_domain(self.outcome_domain.clone()),
                    )
                })
                .collect();
            by_phrase.push((phrase, ids));
        }

        debug!(
            phrases = by_phrase.len(),
            candidates = space.len(),
            factors = graph.len(),
            "built factor graph"
        );
        graph
    }

    /// Build and resolve in one go.
    pub fn ground(&self, root: &Arc<Phrase>, world: Arc<World>, space: &SearchSpace) -> FactorGraph {
        let mut graph = self.build_graph(root, world, space);
        graph.resolve();
        graph
    }

    /// Labelled examples for every (phrase, candidate) pair of an annotated
    /// sentence.
    ///
    /// `annotated` returns the true groundings of a phrase. They are labelled
    /// `Compatible`, every other candidate `Incompatible`; annotated
    /// groundings missing from `space` are added as candidates for their
    /// phrase. Children are the annotated groundings of the child phrases.
    pub fn examples<F>(
        &self,
        root: &Arc<Phrase>,
        world: &Arc<World>,
        space: &SearchSpace,
        annotated: F,
    ) -> Vec<(Outcome, LlmX)>
    where
        F: Fn(&Arc<Phrase>) -> Vec<Arc<Grounding>>,
    {
        let mut examples = Vec::new();

        for phrase in root.post_order() {
            let truth = annotated(&phrase);
            let children: Vec<ChildGroundings> = phrase
                .children
                .iter()
                .map(|child| ChildGroundings::new(child.clone(), annotated(child)))
                .filter(|c| !c.groundings.is_empty())
                .collect();

            let extra = truth
                .iter()
                .filter(|t| !space.candidates().iter().any(|c| c == *t));
            for candidate in space.candidates().iter().chain(extra) {
                let label = if truth.iter().any(|t| t == candidate) {
                    Outcome::Compatible
                } else {
                    Outcome::Incompatible
                };
                let x = LlmX::new(
                    candidate.clone(),
                    children.clone(),
                    phrase.clone(),
                    world.clone(),
                )
                .with_domain(self.outcome_domain.clone());
                examples.push((label, x));
            }
        }

        examples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_support::block_world;
    use crate::language::{PhraseKind, Word};

    fn sentence() -> (Arc<Phrase>, Arc<Phrase>) {
        let np = Arc::new(Phrase::leaf(
            PhraseKind::Np,
            vec![Word::new("DT", "the", 2), Word::new("NN", "ball", 3)],
        ));
        let vp = Arc::new(Phrase::new(
            PhraseKind::Vp,
            vec![Word::new("VB", "pick", 0), Word::new("RP", "up", 1)],
            vec![np.clone()],
        ));
        (np, vp)
    }

    #[test]
    fn test_graph_is_dependency_ordered() {
        let world = Arc::new(block_world());
        let space = SearchSpace::from_world(&world);
        let (_, root) = sentence();

        let graph = Enumerator::new(None).build_graph(&root, world, &space);
        assert_eq!(graph.len(), 2 * space.len());
        for (id, factor) in graph.iter() {
            assert!(factor.children.iter().all(|&c| c < id));
        }
        let last = graph.get(graph.len() - 1).unwrap();
        assert_eq!(last.children.len(), space.len());
    }

    #[test]
    fn test_examples_label_annotations() {
        let world = Arc::new(block_world());
        let space = SearchSpace::from_world(&world);
        let (np, root) = sentence();
        let ball = Arc::new(Grounding::Object(world.object("s0").cloned().unwrap()));

        let np_key = np.clone();
        let truth = ball.clone();
        let examples = Enumerator::new(None).examples(&root, &world, &space, move |p| {
            if Arc::ptr_eq(p, &np_key) {
                vec![truth.clone()]
            } else {
                Vec::new()
            }
        });

        assert_eq!(examples.len(), 2 * space.len());
        let positives: Vec<_> = examples
            .iter()
            .filter(|(label, _)| *label == Outcome::Compatible)
            .collect();
        assert_eq!(positives.len(), 1);
        assert_eq!(positives[0].1.grounding, ball);

        // parent examples see the annotated child grounding
        let (_, parent) = examples.last().unwrap();
        assert_eq!(parent.children.len(), 1);
        assert!(Arc::ptr_eq(&parent.children[0].phrase, &np));
    }
}
