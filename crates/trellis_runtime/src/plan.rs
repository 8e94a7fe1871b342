//! Selection planning.
//!
//! Flattens a selection set over a concrete object type into an ordered
//! map keyed by response key: fragments are spread when their type
//! condition matches, `@skip`/`@include` are applied, and fields sharing a
//! response key are merged into one planned field.

use crate::resolver::ResolverArgs;
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value as Json;
use trellis_ast::{Directive, Field, FragmentDefinition, Selection, SelectionSet, Value};
use trellis_schema::{FieldDef, Schema};

/// One response-key slot of a planned selection set.
#[derive(Debug)]
pub struct PlannedField<'a> {
    /// The key this field occupies in the response object.
    pub response_key: &'a str,
    /// Every field node merged into this slot, in document order.
    pub nodes: Vec<&'a Field>,
    /// The schema definition, or `None` for `__typename`.
    pub definition: Option<&'a FieldDef>,
}

/// Flattens `sets` over `object_type` into response-key order.
///
/// Fields keep the position of their first occurrence; later occurrences
/// with the same response key merge their nodes into that slot.
pub fn collect_fields<'a>(
    schema: &'a Schema,
    object_type: &str,
    sets: &[&'a SelectionSet],
    variables: &FxHashMap<String, Json>,
    fragments: &FxHashMap<&'a str, &'a FragmentDefinition>,
) -> IndexMap<&'a str, PlannedField<'a>> {
    let mut planned = IndexMap::new();
    let mut visited = FxHashSet::default();
    for set in sets {
        collect_into(
            schema,
            object_type,
            set,
            variables,
            fragments,
            &mut planned,
            &mut visited,
        );
    }
    planned
}

fn collect_into<'a>(
    schema: &'a Schema,
    object_type: &str,
    set: &'a SelectionSet,
    variables: &FxHashMap<String, Json>,
    fragments: &FxHashMap<&'a str, &'a FragmentDefinition>,
    planned: &mut IndexMap<&'a str, PlannedField<'a>>,
    visited: &mut FxHashSet<&'a str>,
) {
    for selection in &set.selections {
        match selection {
            Selection::Field(field) => {
                if !should_include(&field.directives, variables) {
                    continue;
                }
                let definition = schema.field_def(object_type, &field.name);
                planned
                    .entry(field.response_key())
                    .or_insert_with(|| PlannedField {
                        response_key: field.response_key(),
                        nodes: Vec::new(),
                        definition,
                    })
                    .nodes
                    .push(field);
            }
            Selection::FragmentSpread(spread) => {
                if !should_include(&spread.directives, variables) {
                    continue;
                }
                // Each named fragment is applied at most once per
                // collection, which also keeps unvalidated cyclic
                // documents from recursing forever.
                if !visited.insert(spread.name.as_str()) {
                    continue;
                }
                let Some(fragment) = fragments.get(spread.name.as_str()) else {
                    continue;
                };
                if schema.object_satisfies(object_type, &fragment.type_condition) {
                    collect_into(
                        schema,
                        object_type,
                        &fragment.selection_set,
                        variables,
                        fragments,
                        planned,
                        visited,
                    );
                }
            }
            Selection::InlineFragment(inline) => {
                if !should_include(&inline.directives, variables) {
                    continue;
                }
                let applies = match inline.type_condition.as_deref() {
                    Some(condition) => schema.object_satisfies(object_type, condition),
                    None => true,
                };
                if applies {
                    collect_into(
                        schema,
                        object_type,
                        &inline.selection_set,
                        variables,
                        fragments,
                        planned,
                        visited,
                    );
                }
            }
        }
    }
}

/// Evaluates `@skip` and `@include` against the coerced variables.
pub fn should_include(directives: &[Directive], variables: &FxHashMap<String, Json>) -> bool {
    for directive in directives {
        let condition = directive
            .argument("if")
            .map(|value| resolve_value(value, variables) == Json::Bool(true));
        match directive.name.as_str() {
            "skip" if condition == Some(true) => return false,
            "include" if condition != Some(true) => return false,
            _ => {}
        }
    }
    true
}

/// Converts a document value literal to JSON, substituting variables.
/// Missing variables become null.
pub fn resolve_value(value: &Value, variables: &FxHashMap<String, Json>) -> Json {
    match value {
        Value::Variable(name) => variables.get(name).cloned().unwrap_or(Json::Null),
        Value::Int(i) => Json::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::String(s) => Json::String(s.clone()),
        Value::Boolean(b) => Json::Bool(*b),
        Value::Null => Json::Null,
        Value::Enum(name) => Json::String(name.clone()),
        Value::List(items) => Json::Array(
            items
                .iter()
                .map(|item| resolve_value(item, variables))
                .collect(),
        ),
        Value::Object(entries) => Json::Object(
            entries
                .iter()
                .map(|(key, item)| (key.clone(), resolve_value(item, variables)))
                .collect(),
        ),
    }
}

/// Builds the coerced argument map for one field node: declared defaults
/// first, then the literals and variable substitutions from the document.
pub fn resolve_arguments(
    definition: &FieldDef,
    field: &Field,
    variables: &FxHashMap<String, Json>,
) -> ResolverArgs {
    let mut args = ResolverArgs::new();
    for (name, input) in &definition.arguments {
        if let Some(default) = &input.default_value {
            args.set(name.clone(), default.clone());
        }
    }
    for argument in &field.arguments {
        args.set(argument.name.clone(), resolve_value(&argument.value, variables));
    }
    args
}
