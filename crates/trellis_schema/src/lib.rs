//! Type registry for Trellis.
//!
//! The registry is the resolved, read-only view of the schema graph that
//! validation and execution consult: named types, field definitions,
//! interface/union membership, abstract-type resolution, and scalar
//! coercion. It is built once (via [`SchemaBuilder`]) and shared for the
//! process lifetime; the engine never parses SDL itself.

pub mod registry;
pub mod types;

pub use registry::{RootKind, Schema, SchemaBuilder};
pub use types::{
    AbstractResolver, EnumDef, EnumValueDef, FieldDef, InputObjectDef, InputValueDef,
    InterfaceDef, ObjectDef, ScalarCoercion, ScalarDef, TypeDef, TypePredicate, TypeRef, UnionDef,
};
