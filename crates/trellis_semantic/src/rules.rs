//! Validation rule visitors.
//!
//! Each rule is a plain observer of the enter/leave event stream. Rules
//! are independent: one rule's failure never changes what another rule
//! sees, and a rule that cannot decide (unknown type, missing field
//! definition) defers judgment instead of erroring.

use crate::error::{codes, ValidationError};
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use trellis_ast::{AstNode, Field, FragmentDefinition, Selection, SelectionSet, VisitEvent};
use trellis_core::Span;
use trellis_schema::{FieldDef, Schema};

/// Shared read-only context handed to every rule per event.
pub struct RuleCx<'a> {
    pub schema: &'a Schema,
    pub fragments: &'a FxHashMap<&'a str, &'a FragmentDefinition>,
    /// Definition of the field being entered, when the event is
    /// `Enter(Field)` and the field resolves against the registry.
    pub field_def: Option<&'a FieldDef>,
}

/// A validation rule observing the combined traversal.
pub trait Rule {
    fn observe(&mut self, event: VisitEvent<'_>, cx: &RuleCx<'_>, errors: &mut Vec<ValidationError>);

    /// Called once after the traversal completes.
    fn finish(&mut self, errors: &mut Vec<ValidationError>) {
        let _ = errors;
    }
}

/// The default rule set, in reporting order.
pub fn default_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(FragmentsOnCompositeTypes),
        Box::new(ScalarLeafs),
        Box::new(KnownFragments),
        Box::new(FieldsConflict::default()),
        Box::new(FragmentCycles::default()),
    ]
}

/// A fragment's type condition must name a composite type.
///
/// Unknown type names are deferred; an inline fragment without a type
/// condition is always valid.
pub struct FragmentsOnCompositeTypes;

impl Rule for FragmentsOnCompositeTypes {
    fn observe(
        &mut self,
        event: VisitEvent<'_>,
        cx: &RuleCx<'_>,
        errors: &mut Vec<ValidationError>,
    ) {
        match event {
            VisitEvent::Enter(AstNode::Fragment(fragment)) => {
                if cx.schema.is_composite(&fragment.type_condition) == Some(false) {
                    errors.push(
                        ValidationError::new(
                            codes::FRAGMENT_ON_NON_COMPOSITE_TYPE,
                            format!(
                                "Fragment \"{}\" cannot condition on non composite type \"{}\".",
                                fragment.name, fragment.type_condition
                            ),
                        )
                        .with_location(fragment.span),
                    );
                }
            }
            VisitEvent::Enter(AstNode::InlineFragment(inline)) => {
                if let Some(condition) = &inline.type_condition {
                    if cx.schema.is_composite(condition) == Some(false) {
                        errors.push(
                            ValidationError::new(
                                codes::INLINE_FRAGMENT_ON_NON_COMPOSITE_TYPE,
                                format!(
                                    "Fragment cannot condition on non composite type \"{condition}\"."
                                ),
                            )
                            .with_location(inline.span),
                        );
                    }
                }
            }
            _ => {}
        }
    }
}

/// Leaf-typed fields must not carry a sub-selection; composite-typed
/// fields must carry one. Directives and arguments on the field are
/// irrelevant to this check.
pub struct ScalarLeafs;

impl Rule for ScalarLeafs {
    fn observe(
        &mut self,
        event: VisitEvent<'_>,
        cx: &RuleCx<'_>,
        errors: &mut Vec<ValidationError>,
    ) {
        let VisitEvent::Enter(AstNode::Field(field)) = event else {
            return;
        };
        let Some(def) = cx.field_def else {
            // Unknown field; some other rule's concern.
            return;
        };
        let type_name = def.ty.innermost();
        if cx.schema.is_leaf(type_name) == Some(true) {
            if field.selection_set.is_some() {
                errors.push(
                    ValidationError::new(
                        codes::NO_SUBSELECTION_ALLOWED,
                        format!(
                            "Field \"{}\" must not have a selection since type \"{type_name}\" has no subfields.",
                            field.name
                        ),
                    )
                    .with_location(field.span),
                );
            }
        } else if cx.schema.is_composite(type_name) == Some(true) && field.selection_set.is_none()
        {
            errors.push(
                ValidationError::new(
                    codes::REQUIRED_SUBSELECTION,
                    format!(
                        "Field \"{}\" of type \"{type_name}\" must have a selection of subfields.",
                        field.name
                    ),
                )
                .with_location(field.span),
            );
        }
    }
}

/// Every fragment spread must name a fragment defined in the document.
pub struct KnownFragments;

impl Rule for KnownFragments {
    fn observe(
        &mut self,
        event: VisitEvent<'_>,
        cx: &RuleCx<'_>,
        errors: &mut Vec<ValidationError>,
    ) {
        if let VisitEvent::Enter(AstNode::FragmentSpread(spread)) = event {
            if !cx.fragments.contains_key(spread.name.as_str()) {
                errors.push(
                    ValidationError::new(
                        codes::UNKNOWN_FRAGMENT,
                        format!("Unknown fragment \"{}\".", spread.name),
                    )
                    .with_location(spread.span),
                );
            }
        }
    }
}

/// Fields sharing a response key in one selection context must be the
/// same field with structurally equal arguments.
///
/// A selection context is the selection set flattened through fragment
/// spreads and inline fragments, so `{ x: barks ...f }` conflicts with
/// `fragment f on Dog { x: owner }` even though the two fields are never
/// literal siblings. Compatible duplicates are merged by the planner;
/// incompatible ones are a validation error here, never a runtime error.
#[derive(Default)]
pub struct FieldsConflict {
    /// Field pairs already reported, by node identity. A conflict living
    /// inside a fragment body is otherwise seen twice: once flattened
    /// into the spreading context and once when the fragment definition
    /// itself is walked.
    reported: FxHashSet<(*const Field, *const Field)>,
}

impl FieldsConflict {
    fn same_arguments(a: &Field, b: &Field) -> bool {
        a.arguments.len() == b.arguments.len()
            && a.arguments.iter().all(|arg| {
                b.arguments
                    .iter()
                    .any(|other| other.name == arg.name && other.value == arg.value)
            })
    }

    fn check_context<'a>(
        &mut self,
        set: &'a SelectionSet,
        fragments: &FxHashMap<&'a str, &'a FragmentDefinition>,
        seen: &mut FxHashMap<&'a str, &'a Field>,
        expanded: &mut FxHashSet<&'a str>,
        errors: &mut Vec<ValidationError>,
    ) {
        for selection in &set.selections {
            match selection {
                Selection::Field(field) => {
                    let key = field.response_key();
                    let Some(first) = seen.get(key).copied() else {
                        seen.insert(key, field);
                        continue;
                    };
                    let message = if first.name != field.name {
                        format!(
                            "Fields \"{key}\" conflict because \"{}\" and \"{}\" are different fields.",
                            first.name, field.name
                        )
                    } else if !Self::same_arguments(first, field) {
                        format!("Fields \"{key}\" conflict because they have differing arguments.")
                    } else {
                        continue;
                    };
                    if self
                        .reported
                        .insert((first as *const Field, field as *const Field))
                    {
                        errors.push(
                            ValidationError::new(codes::FIELDS_CONFLICT, message)
                                .with_location(first.span)
                                .with_location(field.span),
                        );
                    }
                }
                Selection::FragmentSpread(spread) => {
                    // An already-expanded spread is either a duplicate
                    // (harmless to skip) or a cycle (FragmentCycles
                    // reports it).
                    if !expanded.insert(spread.name.as_str()) {
                        continue;
                    }
                    if let Some(fragment) = fragments.get(spread.name.as_str()) {
                        self.check_context(
                            &fragment.selection_set,
                            fragments,
                            seen,
                            expanded,
                            errors,
                        );
                    }
                }
                Selection::InlineFragment(inline) => {
                    self.check_context(&inline.selection_set, fragments, seen, expanded, errors);
                }
            }
        }
    }
}

impl Rule for FieldsConflict {
    fn observe(
        &mut self,
        event: VisitEvent<'_>,
        cx: &RuleCx<'_>,
        errors: &mut Vec<ValidationError>,
    ) {
        let VisitEvent::Enter(AstNode::SelectionSet(set)) = event else {
            return;
        };
        let mut seen = FxHashMap::default();
        let mut expanded = FxHashSet::default();
        self.check_context(set, cx.fragments, &mut seen, &mut expanded, errors);
    }
}

/// Fragment spread graphs must be acyclic.
///
/// Edges are gathered during the traversal; cycle detection runs once in
/// `finish` with a per-document visited set.
#[derive(Default)]
pub struct FragmentCycles {
    current: Option<String>,
    edges: IndexMap<String, Vec<(String, Span)>>,
}

impl Rule for FragmentCycles {
    fn observe(
        &mut self,
        event: VisitEvent<'_>,
        _cx: &RuleCx<'_>,
        _errors: &mut Vec<ValidationError>,
    ) {
        match event {
            VisitEvent::Enter(AstNode::Fragment(fragment)) => {
                self.edges.entry(fragment.name.clone()).or_default();
                self.current = Some(fragment.name.clone());
            }
            VisitEvent::Leave(AstNode::Fragment(_)) => {
                self.current = None;
            }
            VisitEvent::Enter(AstNode::FragmentSpread(spread)) => {
                if let Some(current) = &self.current {
                    self.edges
                        .entry(current.clone())
                        .or_default()
                        .push((spread.name.clone(), spread.span));
                }
            }
            _ => {}
        }
    }

    fn finish(&mut self, errors: &mut Vec<ValidationError>) {
        let mut visited = FxHashSet::default();
        let mut stack = Vec::new();
        for name in self.edges.keys() {
            detect_cycles(name, &self.edges, &mut visited, &mut stack, errors);
        }
    }
}

fn detect_cycles(
    node: &str,
    edges: &IndexMap<String, Vec<(String, Span)>>,
    visited: &mut FxHashSet<String>,
    stack: &mut Vec<String>,
    errors: &mut Vec<ValidationError>,
) {
    if !visited.insert(node.to_string()) {
        return;
    }
    stack.push(node.to_string());
    if let Some(targets) = edges.get(node) {
        for (target, span) in targets {
            if let Some(position) = stack.iter().position(|n| n == target) {
                let via = stack[position + 1..].join(", ");
                let message = if via.is_empty() {
                    format!("Cannot spread fragment \"{target}\" within itself.")
                } else {
                    format!("Cannot spread fragment \"{target}\" within itself via {via}.")
                };
                errors.push(
                    ValidationError::new(codes::FRAGMENT_CYCLE, message).with_location(*span),
                );
            } else if !visited.contains(target.as_str()) {
                detect_cycles(target, edges, visited, stack, errors);
            }
        }
    }
    stack.pop();
}
