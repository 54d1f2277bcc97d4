//! The closed set of groundable symbols.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{Position, arc_str_serde};

fn empty_str() -> Arc<str> {
    Arc::from("")
}

/// Named properties exposed by every grounding.
pub type Properties = BTreeMap<String, PropertyValue>;

/// A property value - strings and integers are all generic predicates need.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Int(i64),
    Str(String),
}

impl PropertyValue {
    /// Compare against a configured literal. Integers compare numerically
    /// when the literal parses, otherwise textually.
    pub fn matches(&self, literal: &str) -> bool {
        match self {
            PropertyValue::Str(s) => s == literal,
            PropertyValue::Int(i) => match literal.parse::<i64>() {
                Ok(v) => *i == v,
                Err(_) => i.to_string() == literal,
            },
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Int(i) => write!(f, "{}", i),
            PropertyValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Str(s.to_string())
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        PropertyValue::Int(i)
    }
}

/// A physical object in the world.
///
/// Only `id` is required when an object appears inside an annotation; the
/// corpus loader fills in the rest from the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object {
    #[serde(with = "arc_str_serde")]
    pub id: Arc<str>,
    #[serde(rename = "type", with = "arc_str_serde", default = "empty_str")]
    pub object_type: Arc<str>,
    #[serde(
        default,
        serialize_with = "arc_str_serde::serialize_opt",
        deserialize_with = "arc_str_serde::deserialize_opt"
    )]
    pub color: Option<Arc<str>>,
    #[serde(default)]
    pub position: Position,
}

impl Object {
    pub fn new(id: impl Into<Arc<str>>, object_type: impl Into<Arc<str>>, position: Position) -> Self {
        Self {
            id: id.into(),
            object_type: object_type.into(),
            color: None,
            position,
        }
    }

    pub fn with_color(mut self, color: impl Into<Arc<str>>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// A region of space relative to an object (or to the robot when `object`
/// is absent), e.g. "left of the box".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    #[serde(with = "arc_str_serde")]
    pub relation: Arc<str>,
    #[serde(default)]
    pub object: Option<Object>,
}

/// An ordered collection of objects with a shape label
/// (`group`, `row`, `column`, `tower`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    #[serde(with = "arc_str_serde")]
    pub shape: Arc<str>,
    #[serde(default)]
    pub objects: Vec<Object>,
}

/// A relation that must hold between two objects (by id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    #[serde(with = "arc_str_serde")]
    pub relation: Arc<str>,
    #[serde(with = "arc_str_serde")]
    pub parent: Arc<str>,
    #[serde(with = "arc_str_serde")]
    pub child: Arc<str>,
}

/// A bare spatial relation word meaning ("left", "near", ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpatialRelation {
    #[serde(with = "arc_str_serde")]
    pub relation: Arc<str>,
}

/// "the nth <type> from the <relation>" without a concrete object yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectProperty {
    #[serde(rename = "type", with = "arc_str_serde")]
    pub object_type: Arc<str>,
    #[serde(with = "arc_str_serde")]
    pub relation: Arc<str>,
    pub index: u32,
}

/// A description of a set of objects: "the three red blocks".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbstractContainer {
    #[serde(rename = "type", with = "arc_str_serde")]
    pub object_type: Arc<str>,
    #[serde(default)]
    pub number: u32,
    #[serde(default)]
    pub index: u32,
    #[serde(
        default,
        serialize_with = "arc_str_serde::serialize_opt",
        deserialize_with = "arc_str_serde::deserialize_opt"
    )]
    pub color: Option<Arc<str>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectType {
    #[serde(with = "arc_str_serde")]
    pub name: Arc<str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectColor {
    #[serde(with = "arc_str_serde")]
    pub name: Arc<str>,
}

/// An ordinal ("second" -> 2). One-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub value: u32,
}

/// A cardinal ("three" -> 3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Number {
    pub value: u32,
}

/// Escape hatch for symbol kinds without a dedicated variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    #[serde(with = "arc_str_serde")]
    pub class_name: Arc<str>,
    #[serde(default)]
    pub properties: Properties,
}

/// Anything a phrase can be grounded to.
///
/// Immutable once built: the enumerator creates one per candidate and the
/// factors that score it only ever read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum Grounding {
    Object(Object),
    Region(Region),
    Container(Container),
    Constraint(Constraint),
    SpatialRelation(SpatialRelation),
    ObjectProperty(ObjectProperty),
    AbstractContainer(AbstractContainer),
    ObjectType(ObjectType),
    ObjectColor(ObjectColor),
    Index(Index),
    Number(Number),
    Symbol(Symbol),
}

impl Grounding {
    /// Class tag used for predicate dispatch and class-match features.
    pub fn class_name(&self) -> &str {
        match self {
            Grounding::Object(_) => "object",
            Grounding::Region(_) => "region",
            Grounding::Container(_) => "container",
            Grounding::Constraint(_) => "constraint",
            Grounding::SpatialRelation(_) => "spatial_relation",
            Grounding::ObjectProperty(_) => "object_property",
            Grounding::AbstractContainer(_) => "abstract_container",
            Grounding::ObjectType(_) => "object_type",
            Grounding::ObjectColor(_) => "object_color",
            Grounding::Index(_) => "index",
            Grounding::Number(_) => "number",
            Grounding::Symbol(s) => s.class_name.as_ref(),
        }
    }

    /// Flat property view for generic predicates.
    pub fn properties(&self) -> Properties {
        let mut props = Properties::new();
        let mut put = |key: &str, value: PropertyValue| {
            props.insert(key.to_string(), value);
        };

        match self {
            Grounding::Object(o) => {
                put("id", o.id.as_ref().into());
                put("type", o.object_type.as_ref().into());
                if let Some(color) = &o.color {
                    put("color", color.as_ref().into());
                }
            }
            Grounding::Region(r) => {
                put("relation", r.relation.as_ref().into());
                if let Some(object) = &r.object {
                    put("object", object.id.as_ref().into());
                    put("type", object.object_type.as_ref().into());
                }
            }
            Grounding::Container(c) => {
                put("shape", c.shape.as_ref().into());
                put("size", (c.objects.len() as i64).into());
            }
            Grounding::Constraint(c) => {
                put("relation", c.relation.as_ref().into());
                put("parent", c.parent.as_ref().into());
                put("child", c.child.as_ref().into());
            }
            Grounding::SpatialRelation(s) => {
                put("relation", s.relation.as_ref().into());
            }
            Grounding::ObjectProperty(p) => {
                put("type", p.object_type.as_ref().into());
                put("relation", p.relation.as_ref().into());
                put("index", (p.index as i64).into());
            }
            Grounding::AbstractContainer(a) => {
                put("type", a.object_type.as_ref().into());
                put("number", (a.number as i64).into());
                put("index", (a.index as i64).into());
                if let Some(color) = &a.color {
                    put("color", color.as_ref().into());
                }
            }
            Grounding::ObjectType(t) => put("type", t.name.as_ref().into()),
            Grounding::ObjectColor(c) => put("color", c.name.as_ref().into()),
            Grounding::Index(i) => put("index", (i.value as i64).into()),
            Grounding::Number(n) => put("number", (n.value as i64).into()),
            Grounding::Symbol(s) => return s.properties.clone(),
        }

        props
    }

    /// Look up one property by name (a view into [`properties`](Self::properties)).
    pub fn property(&self, key: &str) -> Option<PropertyValue> {
        self.properties().remove(key)
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Grounding::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Object type named by this grounding, for the variants that name one.
    pub fn object_type(&self) -> Option<&str> {
        match self {
            Grounding::Object(o) => Some(o.object_type.as_ref()),
            Grounding::ObjectType(t) => Some(t.name.as_ref()),
            Grounding::AbstractContainer(a) => Some(a.object_type.as_ref()),
            Grounding::ObjectProperty(p) => Some(p.object_type.as_ref()),
            _ => None,
        }
    }

    /// Spatial relation named by this grounding, for the variants that carry one.
    pub fn relation(&self) -> Option<&str> {
        match self {
            Grounding::Region(r) => Some(r.relation.as_ref()),
            Grounding::SpatialRelation(s) => Some(s.relation.as_ref()),
            Grounding::ObjectProperty(p) => Some(p.relation.as_ref()),
            Grounding::Constraint(c) => Some(c.relation.as_ref()),
            _ => None,
        }
    }

    pub fn object(object: Object) -> Self {
        Grounding::Object(object)
    }

    pub fn spatial_relation(relation: impl Into<Arc<str>>) -> Self {
        Grounding::SpatialRelation(SpatialRelation {
            relation: relation.into(),
        })
    }

    pub fn object_type_named(name: impl Into<Arc<str>>) -> Self {
        Grounding::ObjectType(ObjectType { name: name.into() })
    }

    pub fn index(value: u32) -> Self {
        Grounding::Index(Index { value })
    }

    pub fn number(value: u32) -> Self {
        Grounding::Number(Number { value })
    }
}

impl fmt::Display for Grounding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grounding::Object(o) => write!(f, "object({}:{})", o.id, o.object_type),
            Grounding::Region(r) => match &r.object {
                Some(o) => write!(f, "region({} of {})", r.relation, o.id),
                None => write!(f, "region({})", r.relation),
            },
            Grounding::Container(c) => {
                let ids: Vec<_> = c.objects.iter().map(|o| o.id.as_ref()).collect();
                write!(f, "container({}: {})", c.shape, ids.join(", "))
            }
            Grounding::Constraint(c) => {
                write!(f, "constraint({} {} {})", c.parent, c.relation, c.child)
            }
            Grounding::SpatialRelation(s) => write!(f, "spatial_relation({})", s.relation),
            Grounding::ObjectProperty(p) => {
                write!(f, "object_property({} #{} from {})", p.object_type, p.index, p.relation)
            }
            Grounding::AbstractContainer(a) => {
                write!(f, "abstract_container({} x{})", a.object_type, a.number)
            }
            Grounding::ObjectType(t) => write!(f, "object_type({})", t.name),
            Grounding::ObjectColor(c) => write!(f, "object_color({})", c.name),
            Grounding::Index(i) => write!(f, "index({})", i.value),
            Grounding::Number(n) => write!(f, "number({})", n.value),
            Grounding::Symbol(s) => write!(f, "{}", s.class_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(id: &str) -> Object {
        Object::new(id, "block", Position::new(1.0, 0.0, 0.0)).with_color("red")
    }

    #[test]
    fn test_class_names() {
        assert_eq!(Grounding::object(block("b0")).class_name(), "object");
        assert_eq!(Grounding::spatial_relation("left").class_name(), "spatial_relation");
        let custom = Grounding::Symbol(Symbol {
            class_name: "gesture".into(),
            properties: Properties::new(),
        });
        assert_eq!(custom.class_name(), "gesture");
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(Grounding::object(block("b0")), Grounding::object(block("b0")));
        assert_ne!(Grounding::object(block("b0")), Grounding::object(block("b1")));
        assert_ne!(Grounding::index(1), Grounding::number(1));
    }

    #[test]
    fn test_properties() {
        let props = Grounding::object(block("b0")).properties();
        assert_eq!(props["type"], PropertyValue::from("block"));
        assert_eq!(props["color"], PropertyValue::from("red"));

        let container = Grounding::Container(Container {
            shape: "row".into(),
            objects: vec![block("b0"), block("b1")],
        });
        assert_eq!(container.property("size"), Some(PropertyValue::Int(2)));
        assert!(container.property("size").unwrap().matches("2"));
    }

    #[test]
    fn test_serde_tagging() {
        let json = r#"{"class":"object","id":"b0"}"#;
        let g: Grounding = serde_json::from_str(json).unwrap();
        let object = g.as_object().unwrap();
        assert_eq!(object.id.as_ref(), "b0");
        assert_eq!(object.object_type.as_ref(), "");

        let json = r#"{"class":"spatial_relation","relation":"left"}"#;
        let g: Grounding = serde_json::from_str(json).unwrap();
        assert_eq!(g.relation(), Some("left"));
    }
}
