//! Query execution.
//!
//! Executes a validated document against a schema: selections are planned
//! with [`collect_fields`], resolvers run through their middleware chains,
//! and completed values honor the null-propagation contract (a null in
//! non-null position bubbles to the nearest nullable ancestor, or nulls
//! `data` entirely).
//!
//! Mutation root fields run strictly serially; everything else fans out
//! concurrently within a selection set.

use crate::broker::{SubscriptionBroker, SubscriptionStream, TopicKey};
use crate::context::RequestContext;
use crate::plan::{collect_fields, resolve_arguments, resolve_value, PlannedField};
use crate::resolver::{ResolverError, ResolverInfo, ResolverMap};
use crate::response::{codes, ExecutionError, Response};
use futures::future::{join_all, BoxFuture};
use futures::StreamExt;
use rustc_hash::FxHashMap;
use serde_json::{Map as JsonMap, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use trellis_ast::{
    Document, Field, FragmentDefinition, OperationDefinition, OperationKind, SelectionSet,
};
use trellis_core::{PathArena, PathId, Span};
use trellis_schema::{RootKind, Schema, TypeRef};

/// Executor configuration.
#[derive(Debug, Clone, Default)]
pub struct ExecutorConfig {
    /// Run sub-selections beneath mutation root fields serially as well.
    /// Off by default: only the root fields of a mutation are serialized.
    pub serial_mutation_subfields: bool,
    /// Per-field resolver timeout. `None` disables the limit.
    pub field_timeout: Option<Duration>,
    /// Upper bound on list items resolving at once. `None` is unbounded.
    pub list_concurrency: Option<usize>,
}

/// The query executor.
///
/// Holds the resolver map and a pool of path arenas reused across
/// requests. Cheap to share behind an `Arc`.
pub struct Executor {
    config: ExecutorConfig,
    resolvers: Arc<ResolverMap>,
    arenas: Mutex<Vec<PathArena>>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.config)
            .field("resolvers", &self.resolvers)
            .finish()
    }
}

impl Executor {
    /// Creates an executor with default configuration.
    pub fn new(resolvers: ResolverMap) -> Self {
        Self::with_config(resolvers, ExecutorConfig::default())
    }

    /// Creates an executor with configuration.
    pub fn with_config(resolvers: ResolverMap, config: ExecutorConfig) -> Self {
        Self {
            config,
            resolvers: Arc::new(resolvers),
            arenas: Mutex::new(Vec::new()),
        }
    }

    /// Executes one operation of a document.
    ///
    /// The document is validated first; a document that fails validation
    /// produces a response with no `data` and the rule errors. Execution
    /// errors never abort the request: they are collected while null
    /// propagation shapes `data`.
    pub async fn execute(
        &self,
        schema: &Schema,
        document: &Document,
        operation_name: Option<&str>,
        variables: &JsonMap<String, Value>,
        root_value: Value,
        request: &RequestContext,
    ) -> Response {
        let validation_errors = trellis_semantic::validate(document, schema);
        if !validation_errors.is_empty() {
            tracing::debug!(count = validation_errors.len(), "document failed validation");
            return Response::errors(validation_errors.into_iter().map(Into::into).collect());
        }
        let operation = match select_operation(document, operation_name) {
            Ok(operation) => operation,
            Err(response) => return response,
        };
        let coerced = match coerce_variables(operation, variables) {
            Ok(coerced) => coerced,
            Err(error) => return Response::error(error),
        };
        self.execute_operation(schema, document, operation, coerced, root_value, request)
            .await
    }

    /// Starts a subscription.
    ///
    /// The operation must select exactly one subscription root field. Each
    /// event published to the matching broker topic re-executes the
    /// operation with the event payload as the field's root value, and the
    /// resulting response is delivered on the returned stream.
    pub async fn subscribe(
        self: &Arc<Self>,
        schema: Arc<Schema>,
        document: Arc<Document>,
        operation_name: Option<&str>,
        variables: &JsonMap<String, Value>,
        broker: &SubscriptionBroker,
        request: RequestContext,
    ) -> Result<SubscriptionStream, Box<Response>> {
        let validation_errors = trellis_semantic::validate(&document, &schema);
        if !validation_errors.is_empty() {
            return Err(Box::new(Response::errors(
                validation_errors.into_iter().map(Into::into).collect(),
            )));
        }
        let operation = select_operation(&document, operation_name).map_err(Box::new)?;
        if operation.kind != OperationKind::Subscription {
            return Err(Box::new(Response::error(bad_request(
                "Operation is not a subscription.",
            ))));
        }
        let coerced = coerce_variables(operation, variables)
            .map_err(|error| Box::new(Response::error(error)))?;
        let Some(root_type) = schema.root_type(RootKind::Subscription) else {
            return Err(Box::new(Response::error(bad_request(
                "Schema does not define a subscription root type.",
            ))));
        };

        let op_name = operation.name.clone();
        // Planning borrows the document and schema; everything the pump
        // task needs is extracted as owned data before they move.
        let (topic, field_name) = {
            let fragments: FxHashMap<&str, &FragmentDefinition> = document
                .fragments()
                .map(|fragment| (fragment.name.as_str(), fragment))
                .collect();
            let planned = collect_fields(
                &schema,
                root_type,
                &[&operation.selection_set],
                &coerced,
                &fragments,
            );
            if planned.len() != 1 {
                return Err(Box::new(Response::error(bad_request(
                    "Subscriptions must select exactly one root field.",
                ))));
            }
            let field = &planned[0];
            let node = field.nodes[0];
            let Some(definition) = field.definition else {
                return Err(Box::new(Response::error(bad_request(format!(
                    "Unknown subscription field \"{}\".",
                    node.name
                )))));
            };
            let args = resolve_arguments(definition, node, &coerced);
            (
                TopicKey::new(node.name.clone(), &canonical_arguments(&args)),
                node.name.clone(),
            )
        };

        let mut receiver = broker.subscribe(topic).await;
        let (tx, rx) = mpsc::channel(16);
        let executor = Arc::clone(self);
        let shutdown = broker.shutdown_token().clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = request.cancellation().cancelled() => break,
                    event = receiver.recv() => match event {
                        Ok(payload) => {
                            let Some(operation) =
                                document.operations().find(|op| op.name == op_name)
                            else {
                                break;
                            };
                            let mut root = JsonMap::new();
                            root.insert(field_name.clone(), payload);
                            let response = executor
                                .execute_operation(
                                    &schema,
                                    &document,
                                    operation,
                                    coerced.clone(),
                                    Value::Object(root),
                                    &request,
                                )
                                .await;
                            if tx.send(response).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(%field_name, skipped, "subscription consumer lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
            tracing::debug!(%field_name, "subscription stream terminated");
        });
        Ok(SubscriptionStream::new(rx))
    }

    async fn execute_operation(
        &self,
        schema: &Schema,
        document: &Document,
        operation: &OperationDefinition,
        variables: FxHashMap<String, Value>,
        root_value: Value,
        request: &RequestContext,
    ) -> Response {
        let root_kind = match operation.kind {
            OperationKind::Query => RootKind::Query,
            OperationKind::Mutation => RootKind::Mutation,
            OperationKind::Subscription => RootKind::Subscription,
        };
        let Some(root_type) = schema.root_type(root_kind) else {
            return Response::error(bad_request(format!(
                "Schema does not define a {} root type.",
                operation.kind
            )));
        };
        let fragments: FxHashMap<&str, &FragmentDefinition> = document
            .fragments()
            .map(|fragment| (fragment.name.as_str(), fragment))
            .collect();
        let arena = self.checkout_arena();
        let errors = Mutex::new(Vec::new());
        let cancel_reported = AtomicBool::new(false);
        let cx = ExecCtx {
            schema,
            config: &self.config,
            resolvers: &self.resolvers,
            fragments,
            variables,
            arena: &arena,
            errors: &errors,
            request,
            cancel_reported: &cancel_reported,
            serial_subfields: operation.kind == OperationKind::Mutation
                && self.config.serial_mutation_subfields,
        };
        tracing::debug!(kind = %operation.kind, root = root_type, "executing operation");
        let result = execute_selection_set(
            &cx,
            root_type.to_string(),
            vec![&operation.selection_set],
            root_value,
            None,
            operation.kind == OperationKind::Mutation,
        )
        .await;
        let errors = errors.into_inner().expect("error sink lock poisoned");
        self.restore_arena(arena);
        match result {
            Ok(map) => Response::partial(Value::Object(map), errors),
            Err(Propagate) => Response::partial(Value::Null, errors),
        }
    }

    fn checkout_arena(&self) -> PathArena {
        self.arenas
            .lock()
            .expect("arena pool lock poisoned")
            .pop()
            .unwrap_or_else(PathArena::new)
    }

    fn restore_arena(&self, mut arena: PathArena) {
        arena.reset();
        let mut pool = self.arenas.lock().expect("arena pool lock poisoned");
        if pool.len() < 8 {
            pool.push(arena);
        }
    }
}

/// Marker for a null bubbling toward the nearest nullable ancestor.
struct Propagate;

struct ExecCtx<'a> {
    schema: &'a Schema,
    config: &'a ExecutorConfig,
    resolvers: &'a ResolverMap,
    fragments: FxHashMap<&'a str, &'a FragmentDefinition>,
    variables: FxHashMap<String, Value>,
    arena: &'a PathArena,
    errors: &'a Mutex<Vec<ExecutionError>>,
    request: &'a RequestContext,
    cancel_reported: &'a AtomicBool,
    serial_subfields: bool,
}

fn record(cx: &ExecCtx<'_>, error: ExecutionError) {
    cx.errors
        .lock()
        .expect("error sink lock poisoned")
        .push(error);
}

fn materialize(cx: &ExecCtx<'_>, path: PathId) -> Vec<crate::response::PathSegment> {
    cx.arena
        .materialize(path)
        .into_iter()
        .map(Into::into)
        .collect()
}

fn bad_request(message: impl Into<String>) -> ExecutionError {
    ExecutionError::new(message).with_code(codes::BAD_REQUEST)
}

fn execute_selection_set<'a>(
    cx: &'a ExecCtx<'a>,
    object_type: String,
    sets: Vec<&'a SelectionSet>,
    parent: Value,
    parent_path: Option<PathId>,
    serial: bool,
) -> BoxFuture<'a, Result<JsonMap<String, Value>, Propagate>> {
    Box::pin(async move {
        let planned = collect_fields(cx.schema, &object_type, &sets, &cx.variables, &cx.fragments);
        let mut map = JsonMap::new();
        if serial {
            for field in planned.into_values() {
                let (key, result) =
                    execute_field(cx, object_type.clone(), parent.clone(), field, parent_path)
                        .await;
                map.insert(key, result?);
            }
        } else {
            let futures: Vec<_> = planned
                .into_values()
                .map(|field| {
                    execute_field(cx, object_type.clone(), parent.clone(), field, parent_path)
                })
                .collect();
            for (key, result) in join_all(futures).await {
                map.insert(key, result?);
            }
        }
        Ok(map)
    })
}

async fn execute_field<'a>(
    cx: &'a ExecCtx<'a>,
    parent_type: String,
    parent: Value,
    planned: PlannedField<'a>,
    parent_path: Option<PathId>,
) -> (String, Result<Value, Propagate>) {
    let node = planned.nodes[0];
    let key = planned.response_key.to_string();
    let path = cx.arena.field(planned.response_key, parent_path);

    if node.name == "__typename" {
        return (key, Ok(Value::String(parent_type)));
    }

    let Some(definition) = planned.definition else {
        record(
            cx,
            ExecutionError::new(format!(
                "Unknown field \"{}\" on type \"{}\".",
                node.name, parent_type
            ))
            .with_path(materialize(cx, path))
            .with_location(node.span),
        );
        return (key, Ok(Value::Null));
    };

    if cx.request.cancellation().is_cancelled() {
        if !cx.cancel_reported.swap(true, Ordering::SeqCst) {
            record(
                cx,
                ExecutionError::new("Request was cancelled.")
                    .with_code(codes::REQUEST_CANCELLED)
                    .with_path(materialize(cx, path)),
            );
        }
        let result = if definition.ty.is_non_null() {
            Err(Propagate)
        } else {
            Ok(Value::Null)
        };
        return (key, result);
    }

    let args = resolve_arguments(definition, node, &cx.variables);
    let info = ResolverInfo::new(node.name.clone(), parent_type.clone(), definition.ty.clone());
    let Some(chain) = cx.resolvers.chain(&parent_type, &node.name) else {
        record(
            cx,
            ExecutionError::new(format!(
                "No resolver registered for {}.{}.",
                parent_type, node.name
            ))
            .with_path(materialize(cx, path))
            .with_location(node.span),
        );
        let result = if definition.ty.is_non_null() {
            Err(Propagate)
        } else {
            Ok(Value::Null)
        };
        return (key, result);
    };

    let resolved = {
        let future = chain.invoke(&parent, &args, cx.request, &info);
        match cx.config.field_timeout {
            Some(limit) => match tokio::time::timeout(limit, future).await {
                Ok(result) => result,
                Err(_) => Err(ResolverError::Timeout(limit.as_millis())),
            },
            None => future.await,
        }
    };

    let completed = match resolved {
        Ok(value) => {
            let label = format!("{}.{}", parent_type, node.name);
            complete_value(cx, &definition.ty, value, path, &planned.nodes, &label, node.span)
                .await
        }
        Err(error) => {
            tracing::debug!(field = %node.name, %error, "resolver failed");
            let mut recorded = ExecutionError::new(error.to_string())
                .with_path(materialize(cx, path))
                .with_location(node.span);
            if matches!(error, ResolverError::BatchFetch(_)) {
                recorded = recorded.with_code(codes::BATCH_FETCH_FAILED);
            }
            record(cx, recorded);
            Err(Propagate)
        }
    };

    // A bubbling null stops at the first nullable position.
    let result = match completed {
        Ok(value) => Ok(value),
        Err(propagate) => {
            if definition.ty.is_non_null() {
                Err(propagate)
            } else {
                Ok(Value::Null)
            }
        }
    };
    (key, result)
}

fn complete_value<'a>(
    cx: &'a ExecCtx<'a>,
    ty: &'a TypeRef,
    value: Value,
    path: PathId,
    nodes: &'a [&'a Field],
    label: &'a str,
    span: Span,
) -> BoxFuture<'a, Result<Value, Propagate>> {
    Box::pin(async move {
        match ty {
            TypeRef::NonNull(inner) => {
                let completed = complete_value(cx, inner, value, path, nodes, label, span).await?;
                if completed.is_null() {
                    record(
                        cx,
                        ExecutionError::new(format!(
                            "Cannot return null for non-nullable field {label}."
                        ))
                        .with_code(codes::NON_NULL_VIOLATION)
                        .with_path(materialize(cx, path))
                        .with_location(span),
                    );
                    Err(Propagate)
                } else {
                    Ok(completed)
                }
            }
            TypeRef::List(inner) => {
                if value.is_null() {
                    return Ok(Value::Null);
                }
                let Value::Array(items) = value else {
                    record(
                        cx,
                        ExecutionError::new(format!("Expected a list value for {label}."))
                            .with_path(materialize(cx, path))
                            .with_location(span),
                    );
                    return Err(Propagate);
                };
                let futures: Vec<_> = items
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| {
                        let item_path = cx.arena.index(index, Some(path));
                        complete_value(cx, inner, item, item_path, nodes, label, span)
                    })
                    .collect();
                let results = match cx.config.list_concurrency {
                    Some(limit) => {
                        futures::stream::iter(futures)
                            .buffered(limit.max(1))
                            .collect::<Vec<_>>()
                            .await
                    }
                    None => join_all(futures).await,
                };
                let mut completed = Vec::with_capacity(results.len());
                for result in results {
                    match result {
                        Ok(item) => completed.push(item),
                        // A null bubbling out of a non-null item position
                        // nulls the whole list.
                        Err(propagate) => {
                            if inner.is_non_null() {
                                return Err(propagate);
                            }
                            completed.push(Value::Null);
                        }
                    }
                }
                Ok(Value::Array(completed))
            }
            TypeRef::Named(name) => {
                if value.is_null() {
                    return Ok(Value::Null);
                }
                let Some(type_def) = cx.schema.get_type(name) else {
                    panic!("schema type {name} referenced by {label} is not registered");
                };
                if type_def.is_leaf() {
                    return match cx.schema.coerce_leaf(name, value) {
                        Ok(coerced) => Ok(coerced),
                        Err(message) => {
                            record(
                                cx,
                                ExecutionError::new(format!(
                                    "Value for {label} failed {name} coercion: {message}"
                                ))
                                .with_path(materialize(cx, path))
                                .with_location(span),
                            );
                            Err(Propagate)
                        }
                    };
                }
                let concrete = if type_def.is_abstract() {
                    match cx.schema.resolve_abstract(name, &value) {
                        Some(concrete) => concrete,
                        None => {
                            record(
                                cx,
                                ExecutionError::new(format!(
                                    "Abstract type \"{name}\" could not be resolved to a \
                                     concrete type for {label}."
                                ))
                                .with_path(materialize(cx, path))
                                .with_location(span),
                            );
                            return Err(Propagate);
                        }
                    }
                } else {
                    name.clone()
                };
                let sets: Vec<&SelectionSet> = nodes
                    .iter()
                    .filter_map(|node| node.selection_set.as_ref())
                    .collect();
                let map = execute_selection_set(
                    cx,
                    concrete,
                    sets,
                    value,
                    Some(path),
                    cx.serial_subfields,
                )
                .await?;
                Ok(Value::Object(map))
            }
        }
    })
}

fn select_operation<'a>(
    document: &'a Document,
    name: Option<&str>,
) -> Result<&'a OperationDefinition, Response> {
    match name {
        Some(name) => document
            .operations()
            .find(|operation| operation.name.as_deref() == Some(name))
            .ok_or_else(|| {
                Response::error(bad_request(format!("Unknown operation \"{name}\".")))
            }),
        None => {
            let mut operations = document.operations();
            let first = operations.next().ok_or_else(|| {
                Response::error(bad_request("Document contains no operations."))
            })?;
            if operations.next().is_some() {
                return Err(Response::error(bad_request(
                    "Operation name is required when a document defines multiple operations.",
                )));
            }
            Ok(first)
        }
    }
}

fn coerce_variables(
    operation: &OperationDefinition,
    provided: &JsonMap<String, Value>,
) -> Result<FxHashMap<String, Value>, ExecutionError> {
    let mut coerced = FxHashMap::default();
    for definition in &operation.variable_definitions {
        if let Some(value) = provided.get(&definition.name) {
            if value.is_null() && definition.ty.is_non_null() {
                return Err(bad_request(format!(
                    "Variable \"${}\" of non-null type \"{}\" must not be null.",
                    definition.name, definition.ty
                )));
            }
            coerced.insert(definition.name.clone(), value.clone());
        } else if let Some(default) = &definition.default_value {
            coerced.insert(
                definition.name.clone(),
                resolve_value(default, &FxHashMap::default()),
            );
        } else if definition.ty.is_non_null() {
            return Err(bad_request(format!(
                "Variable \"${}\" of required type \"{}\" was not provided.",
                definition.name, definition.ty
            )));
        }
    }
    Ok(coerced)
}

/// Serializes coerced arguments with sorted keys, for topic fingerprints.
fn canonical_arguments(args: &crate::resolver::ResolverArgs) -> Value {
    let mut entries: Vec<_> = args.all().iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    let mut canonical = JsonMap::new();
    for (name, value) in entries {
        canonical.insert(name.clone(), value.clone());
    }
    Value::Object(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trellis_ast::{Definition, Selection};

    fn operation(kind: OperationKind, name: Option<&str>) -> Definition {
        let selection_set = SelectionSet::new(vec![Selection::Field(Field::new("x"))]);
        let mut operation = OperationDefinition::new(kind, selection_set);
        if let Some(name) = name {
            operation = operation.with_name(name);
        }
        Definition::Operation(operation)
    }

    #[test]
    fn anonymous_selection_requires_a_single_operation() {
        let single = Document::new(vec![operation(OperationKind::Query, None)]);
        assert!(select_operation(&single, None).is_ok());

        let double = Document::new(vec![
            operation(OperationKind::Query, Some("A")),
            operation(OperationKind::Query, Some("B")),
        ]);
        assert!(select_operation(&double, None).is_err());
        assert!(select_operation(&double, Some("B")).is_ok());
        assert!(select_operation(&double, Some("C")).is_err());

        let empty = Document::new(Vec::new());
        assert!(select_operation(&empty, None).is_err());
    }

    #[test]
    fn variable_defaults_fill_missing_values() {
        use trellis_ast::{TypeAnnotation, Value as AstValue, VariableDefinition};
        let selection_set = SelectionSet::new(vec![Selection::Field(Field::new("x"))]);
        let operation = OperationDefinition::new(OperationKind::Query, selection_set)
            .with_variable(
                VariableDefinition::new("limit", TypeAnnotation::Named("Int".to_string()))
                    .with_default(AstValue::Int(10)),
            )
            .with_variable(VariableDefinition::new(
                "id",
                TypeAnnotation::NonNull(Box::new(TypeAnnotation::Named("ID".to_string()))),
            ));

        let mut provided = JsonMap::new();
        provided.insert("id".to_string(), json!("abc"));
        let coerced = coerce_variables(&operation, &provided).unwrap();
        assert_eq!(coerced.get("limit"), Some(&json!(10)));
        assert_eq!(coerced.get("id"), Some(&json!("abc")));

        let missing = coerce_variables(&operation, &JsonMap::new()).unwrap_err();
        assert_eq!(missing.code(), Some(codes::BAD_REQUEST));

        let mut null_id = JsonMap::new();
        null_id.insert("id".to_string(), Value::Null);
        assert!(coerce_variables(&operation, &null_id).is_err());
    }

    #[test]
    fn canonical_arguments_sort_keys() {
        let mut args = crate::resolver::ResolverArgs::new();
        args.set("b", json!(2));
        args.set("a", json!(1));
        assert_eq!(canonical_arguments(&args).to_string(), r#"{"a":1,"b":2}"#);
    }
}
