//! Parsed sentence structure.
//!
//! A [`Phrase`] is an immutable constituent node: a phrase-type tag, the words
//! it directly holds, and its ordered child phrases. Parsing itself happens
//! elsewhere; this module only exposes the read access predicates need, plus
//! the minimum word order used to decide left-to-right precedence between
//! sibling phrases.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::arc_str_serde;

/// Constituent tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PhraseKind {
    Np,
    Vp,
    Pp,
    Adjp,
    Advp,
    Prt,
    S,
    Sbar,
    Whnp,
}

impl PhraseKind {
    pub const ALL: [PhraseKind; 9] = [
        PhraseKind::Np,
        PhraseKind::Vp,
        PhraseKind::Pp,
        PhraseKind::Adjp,
        PhraseKind::Advp,
        PhraseKind::Prt,
        PhraseKind::S,
        PhraseKind::Sbar,
        PhraseKind::Whnp,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PhraseKind::Np => "NP",
            PhraseKind::Vp => "VP",
            PhraseKind::Pp => "PP",
            PhraseKind::Adjp => "ADJP",
            PhraseKind::Advp => "ADVP",
            PhraseKind::Prt => "PRT",
            PhraseKind::S => "S",
            PhraseKind::Sbar => "SBAR",
            PhraseKind::Whnp => "WHNP",
        }
    }
}

impl fmt::Display for PhraseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhraseKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        PhraseKind::ALL
            .into_iter()
            .find(|k| k.as_str() == upper)
            .ok_or_else(|| format!("unknown phrase type '{}'", s))
    }
}

/// A token with its part-of-speech tag and position in the sentence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Word {
    #[serde(with = "arc_str_serde")]
    pub pos: Arc<str>,
    #[serde(with = "arc_str_serde")]
    pub text: Arc<str>,
    pub order: u32,
}

impl Word {
    pub fn new(pos: impl Into<Arc<str>>, text: impl Into<Arc<str>>, order: u32) -> Self {
        Self {
            pos: pos.into(),
            text: text.into(),
            order,
        }
    }
}

/// One node of the constituent tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Phrase {
    pub kind: PhraseKind,
    pub words: Vec<Word>,
    pub children: Vec<Arc<Phrase>>,
}

impl Phrase {
    pub fn new(kind: PhraseKind, words: Vec<Word>, children: Vec<Arc<Phrase>>) -> Self {
        Self {
            kind,
            words,
            children,
        }
    }

    pub fn leaf(kind: PhraseKind, words: Vec<Word>) -> Self {
        Self::new(kind, words, Vec::new())
    }

    /// Leftmost word index spanned by this phrase and its descendants.
    ///
    /// A phrase spanning no words at all reports `u32::MAX` so it never
    /// precedes anything.
    pub fn min_word_order(&self) -> u32 {
        let own = self.words.iter().map(|w| w.order).min().unwrap_or(u32::MAX);
        self.children
            .iter()
            .map(|c| c.min_word_order())
            .fold(own, u32::min)
    }

    /// Number of words held directly by this node.
    pub fn num_words(&self) -> usize {
        self.words.len()
    }

    pub fn has_word(&self, text: &str) -> bool {
        self.words.iter().any(|w| w.text.eq_ignore_ascii_case(text))
    }

    /// Whether `child` is one of this node's direct children.
    pub fn is_child(&self, child: &Phrase) -> bool {
        self.children
            .iter()
            .any(|c| std::ptr::eq(c.as_ref(), child) || c.as_ref() == child)
    }

    /// Every word in the subtree, in sentence order.
    pub fn all_words(&self) -> Vec<&Word> {
        let mut words: Vec<&Word> = self.words.iter().collect();
        for child in &self.children {
            words.extend(child.all_words());
        }
        words.sort_by_key(|w| w.order);
        words
    }

    /// Surface text of the subtree.
    pub fn text(&self) -> String {
        self.all_words()
            .iter()
            .map(|w| w.text.as_ref())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Visit `self` and every descendant, children before parents.
    pub fn post_order(self: &Arc<Self>) -> Vec<Arc<Phrase>> {
        let mut out = Vec::new();
        fn walk(node: &Arc<Phrase>, out: &mut Vec<Arc<Phrase>>) {
            for child in &node.children {
                walk(child, out);
            }
            out.push(node.clone());
        }
        walk(self, &mut out);
        out
    }
}

impl fmt::Display for Phrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(\"{}\")", self.kind, self.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence() -> Arc<Phrase> {
        let det = Phrase::leaf(
            PhraseKind::Np,
            vec![Word::new("DT", "the", 2), Word::new("NN", "box", 3)],
        );
        Arc::new(Phrase::new(
            PhraseKind::Vp,
            vec![Word::new("VB", "pick", 0), Word::new("RP", "up", 1)],
            vec![Arc::new(det)],
        ))
    }

    #[test]
    fn test_min_word_order() {
        let s = sentence();
        assert_eq!(s.min_word_order(), 0);
        assert_eq!(s.children[0].min_word_order(), 2);
        assert_eq!(Phrase::leaf(PhraseKind::Np, vec![]).min_word_order(), u32::MAX);
    }

    #[test]
    fn test_text_and_traversal() {
        let s = sentence();
        assert_eq!(s.text(), "pick up the box");
        let order = s.post_order();
        assert_eq!(order.len(), 2);
        assert_eq!(order[0].kind, PhraseKind::Np);
        assert!(s.is_child(&order[0]));
        assert!(!order[0].is_child(&s));
    }

    #[test]
    fn test_phrase_kind_parse() {
        assert_eq!("np".parse::<PhraseKind>().unwrap(), PhraseKind::Np);
        assert_eq!("SBAR".parse::<PhraseKind>().unwrap(), PhraseKind::Sbar);
        assert!("XP".parse::<PhraseKind>().is_err());
    }
}
