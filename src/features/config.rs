//! Typed feature configuration.
//!
//! A [`FeatureConfig`] is the registry's input and the persistence layer's
//! unit of storage: a kind name, the invert flag, typed key/value parameters
//! and, for composites, nested part configurations.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, ModelResult};

/// One parameter value.
///
/// Values loaded from a model file arrive as `Str`; the typed getters on
/// [`FeatureConfig`] coerce on read.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Str(s) => f.write_str(s),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(x) => write!(f, "{}", x),
            ParamValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Str(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Str(s)
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Int(i)
    }
}

impl From<u32> for ParamValue {
    fn from(i: u32) -> Self {
        ParamValue::Int(i as i64)
    }
}

impl From<usize> for ParamValue {
    fn from(i: usize) -> Self {
        ParamValue::Int(i as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(x: f64) -> Self {
        ParamValue::Float(x)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

/// Parameters keyed by name; ordered so signatures are stable.
pub type FeatureParams = BTreeMap<String, ParamValue>;

/// Everything needed to rebuild a feature through the registry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureConfig {
    pub kind: String,
    pub invert: bool,
    pub params: FeatureParams,
    pub parts: Vec<FeatureConfig>,
}

impl FeatureConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn inverted(mut self, invert: bool) -> Self {
        self.invert = invert;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Set a parameter only when a value is present.
    pub fn with_optional_param(self, key: &str, value: Option<impl Into<ParamValue>>) -> Self {
        match value {
            Some(v) => self.with_param(key, v),
            None => self,
        }
    }

    pub fn with_part(mut self, part: FeatureConfig) -> Self {
        self.parts.push(part);
        self
    }

    pub fn has_param(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    fn missing(&self, key: &str) -> ModelError {
        ModelError::MissingParameter {
            kind: self.kind.clone(),
            param: key.to_string(),
        }
    }

    fn invalid(&self, key: &str, value: &ParamValue) -> ModelError {
        ModelError::InvalidParameter {
            kind: self.kind.clone(),
            param: key.to_string(),
            value: value.to_string(),
        }
    }

    pub fn str_param(&self, key: &str) -> ModelResult<String> {
        self.params
            .get(key)
            .map(|v| v.to_string())
            .ok_or_else(|| self.missing(key))
    }

    pub fn opt_str_param(&self, key: &str) -> Option<String> {
        self.params.get(key).map(|v| v.to_string())
    }

    pub fn int_param(&self, key: &str) -> ModelResult<i64> {
        let value = self.params.get(key).ok_or_else(|| self.missing(key))?;
        match value {
            ParamValue::Int(i) => Ok(*i),
            ParamValue::Str(s) => s.trim().parse().map_err(|_| self.invalid(key, value)),
            _ => Err(self.invalid(key, value)),
        }
    }

    pub fn int_param_or(&self, key: &str, default: i64) -> ModelResult<i64> {
        if self.has_param(key) {
            self.int_param(key)
        } else {
            Ok(default)
        }
    }

    pub fn float_param(&self, key: &str) -> ModelResult<f64> {
        let value = self.params.get(key).ok_or_else(|| self.missing(key))?;
        match value {
            ParamValue::Float(x) => Ok(*x),
            ParamValue::Int(i) => Ok(*i as f64),
            ParamValue::Str(s) => s.trim().parse().map_err(|_| self.invalid(key, value)),
            ParamValue::Bool(_) => Err(self.invalid(key, value)),
        }
    }

    pub fn float_param_or(&self, key: &str, default: f64) -> ModelResult<f64> {
        if self.has_param(key) {
            self.float_param(key)
        } else {
            Ok(default)
        }
    }

    /// Parse a parameter through `FromStr` (enums such as outcomes or shapes).
    pub fn parse_param<T: FromStr>(&self, key: &str) -> ModelResult<T> {
        let value = self.params.get(key).ok_or_else(|| self.missing(key))?;
        value.to_string().parse().map_err(|_| self.invalid(key, value))
    }

    pub fn parse_param_or<T: FromStr>(&self, key: &str, default: T) -> ModelResult<T> {
        if self.has_param(key) {
            self.parse_param(key)
        } else {
            Ok(default)
        }
    }

    /// Canonical text identifying this configuration.
    ///
    /// Two configs with equal signatures build features that always agree,
    /// which is what lets the feature set share leaf evaluations.
    pub fn signature(&self) -> String {
        let mut sig = escape(&self.kind);
        if self.invert {
            sig.push('!');
        }
        sig.push('{');
        let params: Vec<String> = self
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", escape(k), escape(&v.to_string())))
            .collect();
        sig.push_str(&params.join(","));
        sig.push('}');
        if !self.parts.is_empty() {
            let parts: Vec<String> = self.parts.iter().map(|p| p.signature()).collect();
            sig.push('(');
            sig.push_str(&parts.join(";"));
            sig.push(')');
        }
        sig
    }
}

/// Backslash-escape the characters that delimit a signature.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '!' | '{' | '}' | '=' | ',' | '(' | ')' | ';') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl fmt::Display for FeatureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Outcome;

    #[test]
    fn test_typed_getters_coerce_strings() {
        let config = FeatureConfig::new("shape")
            .with_param("min_elements", "2")
            .with_param("tolerance", "0.05")
            .with_param("outcome", "compatible");

        assert_eq!(config.int_param("min_elements").unwrap(), 2);
        assert!((config.float_param("tolerance").unwrap() - 0.05).abs() < 1e-12);
        assert_eq!(config.parse_param::<Outcome>("outcome").unwrap(), Outcome::Compatible);
        assert_eq!(config.int_param_or("absent", 7).unwrap(), 7);
    }

    #[test]
    fn test_missing_and_invalid() {
        let config = FeatureConfig::new("num_words").with_param("count", "many");
        assert!(matches!(
            config.int_param("count"),
            Err(ModelError::InvalidParameter { .. })
        ));
        assert!(matches!(
            config.str_param("literal"),
            Err(ModelError::MissingParameter { .. })
        ));
    }

    #[test]
    fn test_signature_is_canonical() {
        let a = FeatureConfig::new("class_match")
            .with_param("class", "object")
            .with_param("b", 2i64);
        let b = FeatureConfig::new("class_match")
            .with_param("b", "2")
            .with_param("class", "object");
        assert_eq!(a.signature(), b.signature());
        assert_ne!(a.signature(), a.clone().inverted(true).signature());

        let conj = FeatureConfig::new("conjunction").with_part(a.clone());
        assert!(conj.signature().contains(&a.signature()));
    }

    #[test]
    fn test_signature_escapes_delimiters() {
        let packed = FeatureConfig::new("property_match").with_param("key", "color,value=red");
        let split = FeatureConfig::new("property_match")
            .with_param("key", "color")
            .with_param("value", "red");
        assert_ne!(packed.signature(), split.signature());
        assert_eq!(packed.signature(), r"property_match{key=color\,value\=red}");

        let nested = FeatureConfig::new("conjunction")
            .with_part(FeatureConfig::new("word").with_param("word", "a};word{word=b"));
        let two = FeatureConfig::new("conjunction")
            .with_part(FeatureConfig::new("word").with_param("word", "a"))
            .with_part(FeatureConfig::new("word").with_param("word", "b"));
        assert_ne!(nested.signature(), two.signature());
    }
}
