//! Combined single-pass validation driver.

use crate::error::ValidationError;
use crate::rules::{default_rules, RuleCx};
use rustc_hash::FxHashMap;
use trellis_ast::{walk_document, AstNode, Document, FragmentDefinition, OperationKind, VisitEvent};
use trellis_schema::{registry::RootKind, FieldDef, Schema};

/// Validates a document against the schema, returning errors in arrival
/// order. An empty result means the document may execute.
pub fn validate(document: &Document, schema: &Schema) -> Vec<ValidationError> {
    let fragments: FxHashMap<&str, &FragmentDefinition> = document
        .fragments()
        .map(|fragment| (fragment.name.as_str(), fragment))
        .collect();

    let mut rules = default_rules();
    let mut tracker = TypeTracker::new(schema);
    let mut errors = Vec::new();

    walk_document(document, &mut |event| {
        if let VisitEvent::Enter(node) = event {
            tracker.enter(node);
        }
        let cx = RuleCx {
            schema,
            fragments: &fragments,
            field_def: tracker.current_field(),
        };
        for rule in &mut rules {
            rule.observe(event, &cx, &mut errors);
        }
        if let VisitEvent::Leave(node) = event {
            tracker.leave(node);
        }
    });

    for rule in &mut rules {
        rule.finish(&mut errors);
    }
    errors
}

/// Tracks the composite type surrounding the traversal cursor, so rules
/// can look up the definition of the field being entered without doing
/// their own bookkeeping.
struct TypeTracker<'s> {
    schema: &'s Schema,
    parents: Vec<Option<String>>,
    fields: Vec<Option<&'s FieldDef>>,
}

impl<'s> TypeTracker<'s> {
    fn new(schema: &'s Schema) -> Self {
        Self {
            schema,
            parents: Vec::new(),
            fields: Vec::new(),
        }
    }

    fn current_parent(&self) -> Option<String> {
        self.parents.last().cloned().flatten()
    }

    fn current_field(&self) -> Option<&'s FieldDef> {
        self.fields.last().copied().flatten()
    }

    /// Pushes the parent type a node's children will be checked against;
    /// `None` means "unknown, defer".
    fn enter(&mut self, node: AstNode<'_>) {
        let schema = self.schema;
        match node {
            AstNode::Operation(operation) => {
                let root = match operation.kind {
                    OperationKind::Query => RootKind::Query,
                    OperationKind::Mutation => RootKind::Mutation,
                    OperationKind::Subscription => RootKind::Subscription,
                };
                self.parents.push(schema.root_type(root).map(str::to_owned));
            }
            AstNode::Fragment(fragment) => {
                let next = self.composite_or_none(&fragment.type_condition);
                self.parents.push(next);
            }
            AstNode::InlineFragment(inline) => {
                let next = match &inline.type_condition {
                    Some(condition) => self.composite_or_none(condition),
                    None => self.current_parent(),
                };
                self.parents.push(next);
            }
            AstNode::Field(field) => {
                let parent = self.current_parent();
                let def = parent
                    .as_deref()
                    .and_then(|parent| schema.field_def(parent, &field.name));
                let next = def.and_then(|def| self.composite_or_none(def.ty.innermost()));
                self.fields.push(def);
                self.parents.push(next);
            }
            AstNode::SelectionSet(_) | AstNode::FragmentSpread(_) => {}
        }
    }

    fn leave(&mut self, node: AstNode<'_>) {
        match node {
            AstNode::Operation(_) | AstNode::Fragment(_) | AstNode::InlineFragment(_) => {
                self.parents.pop();
            }
            AstNode::Field(_) => {
                self.parents.pop();
                self.fields.pop();
            }
            AstNode::SelectionSet(_) | AstNode::FragmentSpread(_) => {}
        }
    }

    fn composite_or_none(&self, name: &str) -> Option<String> {
        (self.schema.is_composite(name) == Some(true)).then(|| name.to_owned())
    }
}
