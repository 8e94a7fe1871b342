//! Enter/leave traversal over executable documents.
//!
//! Node kinds form a tagged union dispatched through an explicit match;
//! consumers (the validation rules) are plain observers of the event
//! stream rather than per-node-kind subclasses.

use crate::ast::{
    Definition, Document, Field, FragmentDefinition, FragmentSpread, InlineFragment,
    OperationDefinition, Selection, SelectionSet,
};

/// A borrowed view of one AST node kind.
#[derive(Debug, Clone, Copy)]
pub enum AstNode<'a> {
    Operation(&'a OperationDefinition),
    Fragment(&'a FragmentDefinition),
    SelectionSet(&'a SelectionSet),
    Field(&'a Field),
    FragmentSpread(&'a FragmentSpread),
    InlineFragment(&'a InlineFragment),
}

/// One traversal event.
#[derive(Debug, Clone, Copy)]
pub enum VisitEvent<'a> {
    Enter(AstNode<'a>),
    Leave(AstNode<'a>),
}

/// Walks a document depth-first, feeding every enter/leave event to `f`.
///
/// Definitions are visited in document order; within a selection set,
/// selections are visited in declaration order.
pub fn walk_document<'a>(document: &'a Document, f: &mut impl FnMut(VisitEvent<'a>)) {
    for definition in &document.definitions {
        match definition {
            Definition::Operation(operation) => {
                f(VisitEvent::Enter(AstNode::Operation(operation)));
                walk_selection_set(&operation.selection_set, f);
                f(VisitEvent::Leave(AstNode::Operation(operation)));
            }
            Definition::Fragment(fragment) => {
                f(VisitEvent::Enter(AstNode::Fragment(fragment)));
                walk_selection_set(&fragment.selection_set, f);
                f(VisitEvent::Leave(AstNode::Fragment(fragment)));
            }
        }
    }
}

fn walk_selection_set<'a>(set: &'a SelectionSet, f: &mut impl FnMut(VisitEvent<'a>)) {
    f(VisitEvent::Enter(AstNode::SelectionSet(set)));
    for selection in &set.selections {
        match selection {
            Selection::Field(field) => {
                f(VisitEvent::Enter(AstNode::Field(field)));
                if let Some(sub) = &field.selection_set {
                    walk_selection_set(sub, f);
                }
                f(VisitEvent::Leave(AstNode::Field(field)));
            }
            Selection::FragmentSpread(spread) => {
                f(VisitEvent::Enter(AstNode::FragmentSpread(spread)));
                f(VisitEvent::Leave(AstNode::FragmentSpread(spread)));
            }
            Selection::InlineFragment(inline) => {
                f(VisitEvent::Enter(AstNode::InlineFragment(inline)));
                walk_selection_set(&inline.selection_set, f);
                f(VisitEvent::Leave(AstNode::InlineFragment(inline)));
            }
        }
    }
    f(VisitEvent::Leave(AstNode::SelectionSet(set)));
}
