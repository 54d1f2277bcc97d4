//! Core types shared by every stage of the grounding pipeline.
//!
//! Key design decisions:
//! - `Arc<str>` for identifiers and labels, shared between the world, the
//!   candidate groundings built from it, and the factors that reference them
//! - Frozen/immutable by default: nothing here is mutated after construction
//! - Outcomes are a tiny closed enum so that an outcome domain is just a slice

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Serde serialization helpers for Arc<str> fields
pub(crate) mod arc_str_serde {
    use super::*;

    pub fn serialize<S>(arc: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(arc.as_ref())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(s.into())
    }

    pub fn serialize_opt<S>(arc: &Option<Arc<str>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match arc {
            Some(s) => serializer.serialize_some(s.as_ref()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<Arc<str>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        Ok(opt.map(|s| s.into()))
    }

    pub fn serialize_vec<S>(arcs: &[Arc<str>], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(arcs.iter().map(|s| s.as_ref()))
    }

    pub fn deserialize_vec<'de, D>(deserializer: D) -> Result<Vec<Arc<str>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v: Vec<String> = Vec::deserialize(deserializer)?;
        Ok(v.into_iter().map(Arc::from).collect())
    }
}

/// Label a factor is scored against.
///
/// The model normalizes over a small outcome domain, usually
/// [`Outcome::BINARY`]; `Unknown` only appears in three-way domains and as the
/// state of a factor that has not been resolved yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    #[default]
    Unknown,
    Compatible,
    Incompatible,
}

impl Outcome {
    /// The usual two-way domain.
    pub const BINARY: [Outcome; 2] = [Outcome::Compatible, Outcome::Incompatible];

    /// Three-way domain including `Unknown`.
    pub const ALL: [Outcome; 3] = [Outcome::Unknown, Outcome::Compatible, Outcome::Incompatible];

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Unknown => "unknown",
            Outcome::Compatible => "compatible",
            Outcome::Incompatible => "incompatible",
        }
    }

    pub fn is_compatible(self) -> bool {
        matches!(self, Outcome::Compatible)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Outcome::Unknown),
            "compatible" | "true" => Ok(Outcome::Compatible),
            "incompatible" | "false" => Ok(Outcome::Incompatible),
            other => Err(format!("unknown outcome '{}'", other)),
        }
    }
}

/// A point in the robot frame.
///
/// x points forward, y to the robot's left, z up. The robot sits at the origin.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn axis(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    pub fn distance_squared(&self, other: &Position) -> f64 {
        (self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2)
    }

    pub fn norm(&self) -> f64 {
        self.distance_squared(&Position::default()).sqrt()
    }
}

/// Coordinate axis selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_roundtrip_names() {
        for outcome in Outcome::ALL {
            assert_eq!(outcome.as_str().parse::<Outcome>().unwrap(), outcome);
        }
        assert_eq!("true".parse::<Outcome>().unwrap(), Outcome::Compatible);
        assert!("maybe".parse::<Outcome>().is_err());
    }

    #[test]
    fn test_outcome_default_is_unknown() {
        assert_eq!(Outcome::default(), Outcome::Unknown);
        assert!(!Outcome::default().is_compatible());
    }

    #[test]
    fn test_position_distance() {
        let a = Position::new(0.0, 0.0, 0.0);
        let b = Position::new(3.0, 4.0, 0.0);
        assert!((a.distance_squared(&b) - 25.0).abs() < 1e-12);
        assert!((b.norm() - 5.0).abs() < 1e-12);
        assert_eq!(b.axis(Axis::Y), 4.0);
    }
}
