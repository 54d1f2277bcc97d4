//! Geometric shape predicates over containers.
//!
//! # Shapes
//!
//! ```text
//!   row        column       tower        group
//!  (varies y)  (varies x)   (varies z)
//!                             [ ]
//!                  [ ]        [ ]          [ ][ ]
//!  [ ][ ][ ]       [ ]        [ ]           [ ]
//!                  [ ]
//! ```
//!
//! A linear shape holds when the positional spread (population standard
//! deviation) along the two fixed axes is within `deviation`, and, sorted
//! along the varying axis, every consecutive gap is within `adjacency` of the
//! smallest gap. Evenly spaced objects pass; one straggler fails.
//!
//! The gap rule is relative, so on its own it says nothing about how far
//! apart the elements are: two aligned objects at any distance are a row.
//! `max_gap` bounds every consecutive gap absolutely; it is unbounded unless
//! configured.
//!
//! A group is anything that is none of the linear shapes yet stays cohesive:
//! the mean pairwise squared distance is within `deviation` and every member
//! has a neighbour within `adjacency`.

use std::fmt;
use std::str::FromStr;

use super::{Feature, FeatureConfig, FeatureInput, FeatureKind};
use crate::error::ModelResult;
use crate::symbols::Grounding;
use crate::types::{Axis, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Row,
    Column,
    Tower,
    Group,
}

impl Shape {
    pub const ALL: [Shape; 4] = [Shape::Row, Shape::Column, Shape::Tower, Shape::Group];

    pub fn as_str(self) -> &'static str {
        match self {
            Shape::Row => "row",
            Shape::Column => "column",
            Shape::Tower => "tower",
            Shape::Group => "group",
        }
    }

    /// Axis along which a linear shape extends.
    fn varying_axis(self) -> Option<Axis> {
        match self {
            Shape::Row => Some(Axis::Y),
            Shape::Column => Some(Axis::X),
            Shape::Tower => Some(Axis::Z),
            Shape::Group => None,
        }
    }

    /// Whether `positions` form this shape.
    pub fn matches(self, positions: &[Position], tolerances: &ShapeTolerances) -> bool {
        if positions.len() < tolerances.min_elements.max(1) {
            return false;
        }
        match self.varying_axis() {
            Some(axis) => is_linear(positions, axis, tolerances),
            None => {
                let linear = [Shape::Row, Shape::Column, Shape::Tower]
                    .into_iter()
                    .any(|s| s.matches(positions, tolerances));
                !linear && is_cohesive(positions, tolerances)
            }
        }
    }

    /// First shape the positions satisfy, checking linear shapes first.
    pub fn classify(positions: &[Position], tolerances: &ShapeTolerances) -> Option<Shape> {
        Shape::ALL
            .into_iter()
            .find(|s| s.matches(positions, tolerances))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Shape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Shape::ALL
            .into_iter()
            .find(|shape| shape.as_str() == s)
            .ok_or_else(|| format!("unknown shape '{}'", s))
    }
}

/// Geometric tolerances for shape tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeTolerances {
    /// Maximum spread along the fixed axes (and group cohesion bound)
    pub deviation: f64,
    /// Maximum deviation of a gap from the smallest gap (and group
    /// nearest-neighbour bound)
    pub adjacency: f64,
    pub min_elements: usize,
    /// Largest consecutive gap a linear shape may have
    pub max_gap: f64,
}

impl Default for ShapeTolerances {
    fn default() -> Self {
        Self {
            deviation: 0.05,
            adjacency: 0.05,
            min_elements: 2,
            max_gap: f64::INFINITY,
        }
    }
}

fn std_dev(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let n = values.clone().count() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let mean = values.clone().sum::<f64>() / n;
    (values.map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

fn is_linear(positions: &[Position], varying: Axis, tol: &ShapeTolerances) -> bool {
    let fixed_ok = Axis::ALL
        .into_iter()
        .filter(|a| *a != varying)
        .all(|a| std_dev(positions.iter().map(move |p| p.axis(a))) <= tol.deviation);
    if !fixed_ok {
        return false;
    }

    let mut along: Vec<f64> = positions.iter().map(|p| p.axis(varying)).collect();
    along.sort_by(f64::total_cmp);
    let gaps: Vec<f64> = along.windows(2).map(|w| w[1] - w[0]).collect();
    let Some(min_gap) = gaps.iter().copied().reduce(f64::min) else {
        return true;
    };
    gaps.iter().all(|g| g - min_gap <= tol.adjacency && *g <= tol.max_gap)
}

fn is_cohesive(positions: &[Position], tol: &ShapeTolerances) -> bool {
    let n = positions.len();
    if n < 2 {
        return true;
    }

    let mut total = 0.0;
    let mut pairs = 0usize;
    let mut nearest = vec![f64::INFINITY; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d2 = positions[i].distance_squared(&positions[j]);
            total += d2;
            pairs += 1;
            let d = d2.sqrt();
            nearest[i] = nearest[i].min(d);
            nearest[j] = nearest[j].min(d);
        }
    }

    total / pairs as f64 <= tol.deviation && nearest.iter().all(|d| *d <= tol.adjacency)
}

/// Fires when a container's objects form `shape`.
#[derive(Debug, Clone)]
pub struct ShapeFeature {
    shape: Shape,
    tolerances: ShapeTolerances,
    invert: bool,
}

impl ShapeFeature {
    pub const KIND: &'static str = "shape";

    pub fn new(shape: Shape, tolerances: ShapeTolerances, invert: bool) -> Self {
        Self {
            shape,
            tolerances,
            invert,
        }
    }

    pub fn from_config(config: &FeatureConfig) -> ModelResult<Self> {
        let defaults = ShapeTolerances::default();
        let min_elements = config.int_param_or("min_elements", defaults.min_elements as i64)?;
        let tolerances = ShapeTolerances {
            deviation: config.float_param_or("deviation", defaults.deviation)?,
            adjacency: config.float_param_or("adjacency", defaults.adjacency)?,
            min_elements: min_elements.max(0) as usize,
            max_gap: config.float_param_or("max_gap", defaults.max_gap)?,
        };
        Ok(Self::new(config.parse_param("shape")?, tolerances, config.invert))
    }
}

impl Feature for ShapeFeature {
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
        let Grounding::Container(container) = input.grounding else {
            return None;
        };
        let positions: Vec<Position> = container.objects.iter().map(|o| o.position).collect();
        Some(self.shape.matches(&positions, &self.tolerances))
    }

    fn config(&self) -> FeatureConfig {
        FeatureConfig::new(Self::KIND)
            .inverted(self.invert)
            .with_param("shape", self.shape.as_str())
            .with_param("deviation", self.tolerances.deviation)
            .with_param("adjacency", self.tolerances.adjacency)
            .with_param("min_elements", self.tolerances.min_elements)
            .with_optional_param(
                "max_gap",
                self.tolerances.max_gap.is_finite().then_some(self.tolerances.max_gap),
            )
    }
}
