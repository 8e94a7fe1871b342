//! Executable-document AST for Trellis.
//!
//! The engine never parses query text itself; the (external) parser hands
//! it an immutable, request-owned document built from these types. This
//! crate also provides the enter/leave visitor dispatch that the
//! validation engine traverses.

pub mod ast;
pub mod visit;

pub use ast::{
    Argument, Definition, Directive, Document, Field, FragmentDefinition, FragmentSpread,
    InlineFragment, OperationDefinition, OperationKind, Selection, SelectionSet, TypeAnnotation,
    Value, VariableDefinition,
};
pub use visit::{walk_document, AstNode, VisitEvent};
