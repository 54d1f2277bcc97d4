//! Syntax-only predicates. These read nothing but the phrase.

use std::sync::Arc;

use super::{Comparison, Feature, FeatureConfig, FeatureInput, FeatureKind};
use crate::error::ModelResult;
use crate::language::PhraseKind;

/// Fires when the phrase directly holds `word` (optionally with tag `pos`).
#[derive(Debug, Clone)]
pub struct WordFeature {
    word: Arc<str>,
    pos: Option<Arc<str>>,
    invert: bool,
}

impl WordFeature {
    pub const KIND: &'static str = "word";

    pub fn new(word: &str, pos: Option<&str>, invert: bool) -> Self {
        Self {
            word: Arc::from(word.to_ascii_lowercase()),
            pos: pos.map(Arc::from),
            invert,
        }
    }

    pub fn from_config(config: &FeatureConfig) -> ModelResult<Self> {
        let word = config.str_param("word")?;
        let pos = config.opt_str_param("pos");
        Ok(Self::new(&word, pos.as_deref(), config.invert))
    }
}

impl Feature for WordFeature {
    fn name(&self) -> &'static str {
        Self::KIND
    }

    fn kind(&self) -> FeatureKind {
        FeatureKind::Syntax
    }

    fn invert(&self) -> bool {
        self.invert
    }

    fn decide(&self, input: &FeatureInput<'_>) -> Option<bool> {
        let found = input.phrase.words.iter().any(|w| {
            w.text.eq_ignore_ascii_case(&self.word)
                && self.pos.as_ref().is_none_or(|pos| w.pos == *pos)
        });
        Some(found)
    }

    fn config(&self) -> FeatureConfig {
        FeatureConfig::new(Self::KIND)
            .inverted(self.invert)
            .with_param("word", self.word.as_ref())
            .with_optional_param("pos", self.pos.as_deref())
    }
}

/// Fires when the phrase carries a given tag.
#[derive(Debug, Clone)]
pub struct PhraseTypeFeature {
    phrase_type: PhraseKind,
    invert: bool,
}

impl PhraseTypeFeature {
    pub const KIND: &'static str = "phrase_type";

    pub fn new(phrase_type: PhraseKind, invert: bool) -> Self {
        Self { phrase_type, invert }
    }

    pub fn from_config(config: &FeatureConfig) -> ModelResult<Self> {
        Ok(Self::new(config.parse_param("phrase_type")?, config.invert))
    }
}

impl Feature for PhraseTypeFeature {
    fn name(&self) -> &'static str {
        Self::KIND
    }

    fn kind(&self) -> FeatureKind {
        FeatureKind::Syntax
    }

    fn invert(&self) -> bool {
        self.invert
    }

    fn decide(&self, input: &FeatureInput<'_>) -> Option<bool> {
        Some(input.phrase.kind == self.phrase_type)
    }

    fn config(&self) -> FeatureConfig {
        FeatureConfig::new(Self::KIND)
            .inverted(self.invert)
            .with_param("phrase_type", self.phrase_type.as_str())
    }
}

/// Word count of the phrase compared against a literal.
#[derive(Debug, Clone)]
pub struct NumWordsFeature {
    count: i64,
    comparison: Comparison,
    invert: bool,
}

impl NumWordsFeature {
    pub const KIND: &'static str = "num_words";

    pub fn new(count: i64, comparison: Comparison, invert: bool) -> Self {
        Self {
            count,
            comparison,
            invert,
        }
    }

    pub fn from_config(config: &FeatureConfig) -> ModelResult<Self> {
        Ok(Self::new(
            config.int_param("count")?,
            config.parse_param_or("cmp", Comparison::Eq)?,
            config.invert,
        ))
    }
}

impl Feature for NumWordsFeature {
    fn name(&self) -> &'static str {
        Self::KIND
    }

    fn kind(&self) -> FeatureKind {
        FeatureKind::Syntax
    }

    fn invert(&self) -> bool {
        self.invert
    }

    fn decide(&self, input: &FeatureInput<'_>) -> Option<bool> {
        Some(self.comparison.apply(input.phrase.num_words() as i64, self.count))
    }

    fn config(&self) -> FeatureConfig {
        FeatureConfig::new(Self::KIND)
            .inverted(self.invert)
            .with_param("count", self.count)
            .with_param("cmp", self.comparison.as_str())
    }
}

/// Number of child phrases compared against a literal.
#[derive(Debug, Clone)]
pub struct NumChildPhrasesFeature {
    count: i64,
    comparison: Comparison,
    invert: bool,
}

impl NumChildPhrasesFeature {
    pub const KIND: &'static str = "num_child_phrases";

    pub fn new(count: i64, comparison: Comparison, invert: bool) -> Self {
        Self {
            count,
            comparison,
            invert,
        }
    }

    pub fn from_config(config: &FeatureConfig) -> ModelResult<Self> {
        Ok(Self::new(
            config.int_param("count")?,
            config.parse_param_or("cmp", Comparison::Eq)?,
            config.invert,
        ))
    }
}

impl Feature for NumChildPhrasesFeature {
    fn name(&self) -> &'static str {
        Self::KIND
    }

    fn kind(&self) -> FeatureKind {
        FeatureKind::Syntax
    }

    fn invert(&self) -> bool {
        self.invert
    }

    fn decide(&self, input: &FeatureInput<'_>) -> Option<bool> {
        Some(
            self.comparison
                .apply(input.phrase.children.len() as i64, self.count),
        )
    }

    fn config(&self) -> FeatureConfig {
        FeatureConfig::new(Self::KIND)
            .inverted(self.invert)
            .with_param("count", self.count)
            .with_param("cmp", self.comparison.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_support::{block_world, noun_phrase, object};
    use crate::types::Outcome;

    #[test]
    fn test_word_feature() {
        let world = block_world();
        let phrase = noun_phrase(&[("DT", "the"), ("NN", "Box")]);
        let g = object(&world, "b0");
        let input = FeatureInput::new(Outcome::Compatible, &g, &[], &phrase, &world);

        assert!(WordFeature::new("box", None, false).value(&input));
        assert!(WordFeature::new("box", Some("NN"), false).value(&input));
        assert!(!WordFeature::new("box", Some("VB"), false).value(&input));
        assert!(!WordFeature::new("ball", None, false).value(&input));
        assert!(WordFeature::new("ball", None, true).value(&input));
    }

    #[test]
    fn test_counts_and_tags() {
        let world = block_world();
        let phrase = noun_phrase(&[("DT", "the"), ("NN", "box")]);
        let g = object(&world, "b0");
        let input = FeatureInput::new(Outcome::Compatible, &g, &[], &phrase, &world);

        assert!(PhraseTypeFeature::new(PhraseKind::Np, false).value(&input));
        assert!(!PhraseTypeFeature::new(PhraseKind::Vp, false).value(&input));
        assert!(NumWordsFeature::new(2, Comparison::Eq, false).value(&input));
        assert!(NumWordsFeature::new(3, Comparison::Lt, false).value(&input));
        assert!(NumChildPhrasesFeature::new(0, Comparison::Eq, false).value(&input));
    }

    #[test]
    fn test_config_rebuilds() {
        let feature = WordFeature::new("left", Some("JJ"), true);
        let rebuilt = WordFeature::from_config(&feature.config()).unwrap();
        assert_eq!(feature.signature(), rebuilt.signature());
    }
}
