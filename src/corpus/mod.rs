//! Annotated training corpora.
//!
//! A corpus is one JSON document holding named worlds and sentences over
//! them. Each sentence carries its constituent tree; any phrase may list the
//! groundings it refers to.
//!
//! ```json
//! {
//!   "worlds": {
//!     "table": { "objects": [
//!       { "id": "b0", "type": "box", "color": "red", "position": { "x": 1.0, "y": 0.5, "z": 0.0 } }
//!     ] }
//!   },
//!   "sentences": [
//!     { "world": "table",
//!       "phrase": { "kind": "VP",
//!                   "words": [ { "pos": "VB", "text": "pick", "order": 0 } ],
//!                   "children": [ { "kind": "NP",
//!                                   "words": [ { "pos": "NN", "text": "box", "order": 1 } ],
//!                                   "groundings": [ { "class": "object", "id": "b0" } ] } ] } }
//!   ]
//! }
//! ```
//!
//! Objects inside groundings may be given by `id` alone; loading replaces
//! them with the world's full object. An id the world does not contain is
//! an error, as is a sentence naming an unknown world.
//!
//! Every sentence of one world shares a single `Arc<World>`, which is what
//! the trainer partitions on.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use rand::prelude::*;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dcg::{Enumerator, SearchSpace};
use crate::features::FeatureTemplates;
use crate::language::{Phrase, PhraseKind, Word};
use crate::model::LlmX;
use crate::symbols::{Grounding, Object};
use crate::types::Outcome;
use crate::world::World;

/// Corpus as stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusFile {
    #[serde(default)]
    pub worlds: BTreeMap<String, WorldSpec>,
    #[serde(default)]
    pub sentences: Vec<SentenceSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldSpec {
    #[serde(default)]
    pub objects: Vec<Object>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceSpec {
    pub world: String,
    /// Display text; defaults to the words of the tree
    #[serde(default)]
    pub text: Option<String>,
    pub phrase: PhraseSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhraseSpec {
    pub kind: PhraseKind,
    #[serde(default)]
    pub words: Vec<Word>,
    #[serde(default)]
    pub groundings: Vec<Grounding>,
    #[serde(default)]
    pub children: Vec<PhraseSpec>,
}

/// One loaded sentence: its tree, its world, and the annotations per phrase.
#[derive(Debug, Clone)]
pub struct Sentence {
    pub text: String,
    pub world_name: String,
    pub world: Arc<World>,
    pub root: Arc<Phrase>,
    annotations: Vec<(Arc<Phrase>, Vec<Arc<Grounding>>)>,
}

impl Sentence {
    /// Annotated groundings of a phrase of this sentence's tree.
    pub fn annotated(&self, phrase: &Arc<Phrase>) -> Vec<Arc<Grounding>> {
        self.annotations
            .iter()
            .find(|(p, _)| Arc::ptr_eq(p, phrase))
            .map(|(_, g)| g.clone())
            .unwrap_or_default()
    }

    /// Number of (phrase, grounding) annotations.
    pub fn num_annotations(&self) -> usize {
        self.annotations.iter().map(|(_, g)| g.len()).sum()
    }

    pub fn search_space(&self) -> SearchSpace {
        SearchSpace::from_world(&self.world)
    }

    /// Labelled examples for every (phrase, candidate) pair.
    pub fn examples(&self, enumerator: &Enumerator) -> Vec<(Outcome, LlmX)> {
        enumerator.examples(&self.root, &self.world, &self.search_space(), |p| self.annotated(p))
    }
}

/// Loaded corpus.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub sentences: Vec<Sentence>,
}

impl Corpus {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read corpus {}", path.display()))?;
        let corpus = Self::from_json(&content)
            .with_context(|| format!("Failed to load corpus {}", path.display()))?;
        info!(
            path = %path.display(),
            sentences = corpus.len(),
            "loaded corpus"
        );
        Ok(corpus)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let file: CorpusFile = serde_json::from_str(content).context("Invalid corpus JSON")?;
        Self::from_file(file)
    }

    /// Build worlds once and hydrate every sentence against its world.
    pub fn from_file(file: CorpusFile) -> Result<Self> {
        let worlds: BTreeMap<String, Arc<World>> = file
            .worlds
            .into_iter()
            .map(|(name, spec)| (name, Arc::new(World::new(spec.objects))))
            .collect();

        let mut sentences = Vec::with_capacity(file.sentences.len());
        for (i, spec) in file.sentences.into_iter().enumerate() {
            let Some(world) = worlds.get(&spec.world) else {
                bail!("Sentence {} refers to unknown world {:?}", i, spec.world);
            };
            let mut annotations = Vec::new();
            let root = build_phrase(spec.phrase, world, &mut annotations)
                .with_context(|| format!("Sentence {}", i))?;
            sentences.push(Sentence {
                text: spec.text.unwrap_or_else(|| root.text()),
                world_name: spec.world,
                world: world.clone(),
                root,
                annotations,
            });
        }

        debug!(worlds = worlds.len(), sentences = sentences.len(), "hydrated corpus");
        Ok(Self { sentences })
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    /// Vocabulary of every sentence and world, ready to generate features.
    pub fn templates(&self) -> FeatureTemplates {
        let mut templates = FeatureTemplates::new();
        for sentence in &self.sentences {
            templates.add_phrase(&sentence.root);
            templates.add_world(&sentence.world);
        }
        templates
    }

    /// Labelled examples of all sentences, in sentence order.
    pub fn examples(&self, enumerator: &Enumerator) -> Vec<(Outcome, LlmX)> {
        self.sentences
            .iter()
            .flat_map(|s| s.examples(enumerator))
            .collect()
    }

    /// Shuffle with `seed` and hold out `fraction` of the sentences.
    ///
    /// Returns `(train, heldout)`; each keeps the original sentence order.
    pub fn split(self, fraction: f64, seed: u64) -> (Corpus, Corpus) {
        let n = self.sentences.len();
        let held = ((n as f64) * fraction.clamp(0.0, 1.0)).round() as usize;
        if held == 0 {
            return (self, Corpus::default());
        }

        let mut order: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        order.shuffle(&mut rng);
        let mut heldout_mask = vec![false; n];
        for &i in &order[..held.min(n)] {
            heldout_mask[i] = true;
        }

        let mut train = Vec::with_capacity(n - held);
        let mut heldout = Vec::with_capacity(held);
        for (sentence, is_heldout) in self.sentences.into_iter().zip(heldout_mask) {
            if is_heldout {
                heldout.push(sentence);
            } else {
                train.push(sentence);
            }
        }
        (Corpus { sentences: train }, Corpus { sentences: heldout })
    }
}

fn build_phrase(
    spec: PhraseSpec,
    world: &World,
    annotations: &mut Vec<(Arc<Phrase>, Vec<Arc<Grounding>>)>,
) -> Result<Arc<Phrase>> {
    let children = spec
        .children
        .into_iter()
        .map(|child| build_phrase(child, world, annotations))
        .collect::<Result<Vec<_>>>()?;
    let phrase = Arc::new(Phrase::new(spec.kind, spec.words, children));

    if !spec.groundings.is_empty() {
        let groundings = spec
            .groundings
            .into_iter()
            .map(|g| hydrate(g, world).map(Arc::new))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Phrase {}", phrase))?;
        annotations.push((phrase.clone(), groundings));
    }
    Ok(phrase)
}

fn hydrate_object(object: Object, world: &World) -> Result<Object> {
    match world.object(&object.id) {
        Some(full) => Ok(full.clone()),
        None => bail!("Unknown object id {:?}", object.id),
    }
}

/// Replace id-only objects with the world's copy.
fn hydrate(grounding: Grounding, world: &World) -> Result<Grounding> {
    Ok(match grounding {
        Grounding::Object(o) => Grounding::Object(hydrate_object(o, world)?),
        Grounding::Region(mut r) => {
            r.object = r.object.map(|o| hydrate_object(o, world)).transpose()?;
            Grounding::Region(r)
        }
        Grounding::Container(mut c) => {
            c.objects = c
                .objects
                .into_iter()
                .map(|o| hydrate_object(o, world))
                .collect::<Result<_>>()?;
            Grounding::Container(c)
        }
        Grounding::Constraint(c) => {
            for id in [&c.parent, &c.child] {
                if world.object(id).is_none() {
                    bail!("Constraint refers to unknown object id {:?}", id);
                }
            }
            Grounding::Constraint(c)
        }
        other => other,
    })
}
