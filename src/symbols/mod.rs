//! Groundable symbols - the things language can refer to.
//!
//! A [`Grounding`] is a closed tagged union: predicates dispatch by matching
//! on the variant instead of probing a class hierarchy. Every variant offers
//! the same three capabilities:
//!
//! | Capability          | Method                    | Used by                          |
//! |---------------------|---------------------------|----------------------------------|
//! | Structural equality | `PartialEq`               | child matching, deduplication    |
//! | Class tag           | [`Grounding::class_name`] | class-match predicates           |
//! | Property map        | [`Grounding::properties`] | generic property predicates      |
//!
//! Kinds without a dedicated variant use [`Symbol`], which carries its class
//! name and properties explicitly.

mod grounding;

pub use grounding::{
    AbstractContainer, Constraint, Container, Grounding, Index, Number, Object, ObjectColor,
    ObjectProperty, ObjectType, Properties, PropertyValue, Region, SpatialRelation, Symbol,
};
