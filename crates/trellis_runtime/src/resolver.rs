//! Field resolvers.
//!
//! Resolvers are registered per `Type.field` in a [`ResolverMap`]; fields
//! without a registration fall back to the default property-access
//! resolver.

use crate::context::RequestContext;
use crate::pipeline::{FieldMiddleware, ResolverChain};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use trellis_schema::TypeRef;

/// Coerced arguments passed to a resolver.
#[derive(Debug, Clone, Default)]
pub struct ResolverArgs {
    args: HashMap<String, Value>,
}

impl ResolverArgs {
    /// Creates new resolver args.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates resolver args from a list of (name, value) pairs.
    pub fn from_pairs(pairs: Vec<(String, Value)>) -> Self {
        Self {
            args: pairs.into_iter().collect(),
        }
    }

    /// Gets an argument by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    /// Gets an argument as a specific type.
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.args
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Gets a required argument, returning an error if not found.
    pub fn require<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T, ResolverError> {
        self.args
            .get(name)
            .ok_or_else(|| ResolverError::MissingArgument(name.to_string()))
            .and_then(|v| {
                serde_json::from_value(v.clone())
                    .map_err(|e| ResolverError::ArgumentParse(name.to_string(), e.to_string()))
            })
    }

    /// Returns all arguments.
    pub fn all(&self) -> &HashMap<String, Value> {
        &self.args
    }

    /// Returns true if empty.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Sets an argument.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.args.insert(name.into(), value);
    }
}

/// Info about the field being resolved.
#[derive(Debug, Clone)]
pub struct ResolverInfo {
    /// The field name being resolved.
    pub field_name: String,
    /// The parent type name.
    pub parent_type: String,
    /// The declared return type of the field.
    pub return_type: TypeRef,
}

impl ResolverInfo {
    /// Creates new resolver info.
    pub fn new(
        field_name: impl Into<String>,
        parent_type: impl Into<String>,
        return_type: TypeRef,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            parent_type: parent_type.into(),
            return_type,
        }
    }
}

/// Result type for resolvers.
pub type ResolverResult = Result<Value, ResolverError>;

/// Future type for async resolvers.
pub type ResolverFuture<'a> = Pin<Box<dyn Future<Output = ResolverResult> + Send + 'a>>;

/// Error from a resolver.
#[derive(Debug, Clone, Error)]
pub enum ResolverError {
    /// The parent value has no property for the field.
    #[error("field not found: {0}")]
    FieldNotFound(String),
    /// Missing required argument.
    #[error("missing required argument: {0}")]
    MissingArgument(String),
    /// Argument parse error.
    #[error("failed to parse argument '{0}': {1}")]
    ArgumentParse(String, String),
    /// The resolver exceeded the configured field timeout.
    #[error("field resolution timed out after {0}ms")]
    Timeout(u128),
    /// A batched fetch the resolver depended on failed.
    #[error(transparent)]
    BatchFetch(#[from] crate::dataloader::BatchError),
    /// Custom error.
    #[error("{0}")]
    Custom(String),
    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Trait for field resolvers.
pub trait Resolver: Send + Sync {
    /// Resolves a field value.
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a RequestContext,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a>;
}

/// A boxed resolver.
pub type BoxedResolver = Box<dyn Resolver>;

/// A sync resolver function.
pub type SyncResolverFn = Arc<
    dyn Fn(&Value, &ResolverArgs, &RequestContext, &ResolverInfo) -> ResolverResult + Send + Sync,
>;

/// A wrapper for sync resolver functions.
pub struct FnResolver {
    func: SyncResolverFn,
}

impl FnResolver {
    /// Creates a new function resolver.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value, &ResolverArgs, &RequestContext, &ResolverInfo) -> ResolverResult
            + Send
            + Sync
            + 'static,
    {
        Self { func: Arc::new(f) }
    }
}

impl Resolver for FnResolver {
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a RequestContext,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        let result = (self.func)(parent, args, ctx, info);
        Box::pin(async move { result })
    }
}

/// An async resolver function type.
pub type AsyncResolverFn = Arc<
    dyn Fn(Value, ResolverArgs, RequestContext, ResolverInfo) -> ResolverFuture<'static>
        + Send
        + Sync,
>;

/// A wrapper for async resolver functions.
pub struct AsyncFnResolver {
    func: AsyncResolverFn,
}

impl AsyncFnResolver {
    /// Creates a new async function resolver.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Value, ResolverArgs, RequestContext, ResolverInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResolverResult> + Send + 'static,
    {
        Self {
            func: Arc::new(move |parent, args, ctx, info| Box::pin(f(parent, args, ctx, info))),
        }
    }
}

impl Resolver for AsyncFnResolver {
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a RequestContext,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        let parent = parent.clone();
        let args = args.clone();
        let ctx = ctx.clone();
        let info = info.clone();
        let func = Arc::clone(&self.func);
        Box::pin(async move { func(parent, args, ctx, info).await })
    }
}

/// Default resolver that accesses properties from the parent object.
///
/// Looks up the field name on the parent object, falling back to its
/// snake_case form so camelCase schema fields can read snake_case data.
pub struct DefaultResolver;

impl Resolver for DefaultResolver {
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        _args: &'a ResolverArgs,
        _ctx: &'a RequestContext,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        let field_name = &info.field_name;
        let result = match parent {
            Value::Object(map) => {
                if let Some(value) = map.get(field_name) {
                    Ok(value.clone())
                } else if let Some(value) = map.get(&to_snake_case(field_name)) {
                    Ok(value.clone())
                } else {
                    Ok(Value::Null)
                }
            }
            Value::Null => Ok(Value::Null),
            _ => Err(ResolverError::FieldNotFound(field_name.clone())),
        };
        Box::pin(async move { result })
    }
}

/// Converts camelCase to snake_case.
fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.extend(c.to_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}

/// Storage for resolvers and field middleware, organized by type and field.
#[derive(Default)]
pub struct ResolverMap {
    /// Resolvers indexed by "TypeName.fieldName".
    resolvers: HashMap<String, BoxedResolver>,
    /// Middleware indexed by "TypeName.fieldName", in registration order.
    middleware: HashMap<String, Vec<Arc<dyn FieldMiddleware>>>,
    /// Default resolver for unregistered fields.
    default_resolver: Option<BoxedResolver>,
}

impl ResolverMap {
    /// Creates a new resolver map with the property-access default.
    pub fn new() -> Self {
        Self {
            resolvers: HashMap::new(),
            middleware: HashMap::new(),
            default_resolver: Some(Box::new(DefaultResolver)),
        }
    }

    /// Registers a resolver for a specific type and field.
    pub fn register<R: Resolver + 'static>(
        &mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        resolver: R,
    ) {
        let key = format!("{}.{}", type_name.into(), field_name.into());
        self.resolvers.insert(key, Box::new(resolver));
    }

    /// Registers a sync function as a resolver.
    pub fn register_fn<F>(
        &mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        f: F,
    ) where
        F: Fn(&Value, &ResolverArgs, &RequestContext, &ResolverInfo) -> ResolverResult
            + Send
            + Sync
            + 'static,
    {
        self.register(type_name, field_name, FnResolver::new(f));
    }

    /// Registers an async function as a resolver.
    pub fn register_async<F, Fut>(
        &mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        f: F,
    ) where
        F: Fn(Value, ResolverArgs, RequestContext, ResolverInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResolverResult> + Send + 'static,
    {
        self.register(type_name, field_name, AsyncFnResolver::new(f));
    }

    /// Appends a middleware to the field's chain. Middleware runs in
    /// registration order, each deciding whether to call the next stage.
    pub fn register_middleware<M: FieldMiddleware + 'static>(
        &mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        middleware: M,
    ) {
        let key = format!("{}.{}", type_name.into(), field_name.into());
        self.middleware
            .entry(key)
            .or_default()
            .push(Arc::new(middleware));
    }

    /// Builds the invocation chain for a field: its registered middleware
    /// in order, terminated by its resolver (or the default resolver).
    /// Returns `None` only when the default resolver has been removed and
    /// the field has no registration.
    pub fn chain(&self, type_name: &str, field_name: &str) -> Option<ResolverChain<'_>> {
        let key = format!("{}.{}", type_name, field_name);
        let resolver = self
            .resolvers
            .get(&key)
            .map(|r| r.as_ref())
            .or(self.default_resolver.as_deref())?;
        let middleware = self.middleware.get(&key).map_or(&[][..], Vec::as_slice);
        Some(ResolverChain::new(middleware, resolver))
    }

    /// Sets the default resolver.
    pub fn set_default<R: Resolver + 'static>(&mut self, resolver: R) {
        self.default_resolver = Some(Box::new(resolver));
    }

    /// Removes the default resolver.
    pub fn remove_default(&mut self) {
        self.default_resolver = None;
    }
}

impl Debug for ResolverMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverMap")
            .field("resolver_count", &self.resolvers.len())
            .field("middleware_count", &self.middleware.len())
            .field("has_default", &self.default_resolver.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trellis_schema::TypeRef;

    fn info(field: &str) -> ResolverInfo {
        ResolverInfo::new(field, "Query", TypeRef::named("String"))
    }

    #[test]
    fn resolver_args_coerce_by_type() {
        let mut args = ResolverArgs::new();
        args.set("id", json!(123));
        args.set("name", json!("test"));

        assert_eq!(args.get_as::<i64>("id"), Some(123));
        assert_eq!(args.get_as::<String>("name"), Some("test".to_string()));
        assert_eq!(args.get_as::<i64>("missing"), None);
        assert!(args.require::<i64>("missing").is_err());
    }

    #[test]
    fn snake_case_conversion() {
        assert_eq!(to_snake_case("firstName"), "first_name");
        assert_eq!(to_snake_case("lastName"), "last_name");
        assert_eq!(to_snake_case("id"), "id");
    }

    #[tokio::test]
    async fn default_resolver_reads_properties() {
        let parent = json!({"name": "Rex", "best_friend": "Milo"});
        let ctx = RequestContext::new();
        let args = ResolverArgs::new();

        let value = DefaultResolver
            .resolve(&parent, &args, &ctx, &info("name"))
            .await
            .unwrap();
        assert_eq!(value, json!("Rex"));

        // camelCase falls back to snake_case.
        let value = DefaultResolver
            .resolve(&parent, &args, &ctx, &info("bestFriend"))
            .await
            .unwrap();
        assert_eq!(value, json!("Milo"));

        let value = DefaultResolver
            .resolve(&parent, &args, &ctx, &info("missing"))
            .await
            .unwrap();
        assert_eq!(value, json!(null));
    }

    #[tokio::test]
    async fn registered_resolver_wins_over_default() {
        let mut map = ResolverMap::new();
        map.register_fn("Query", "hello", |_, _, _, _| Ok(json!("world")));

        let chain = map.chain("Query", "hello").unwrap();
        let parent = json!({"hello": "shadowed"});
        let args = ResolverArgs::new();
        let ctx = RequestContext::new();
        let value = chain
            .invoke(&parent, &args, &ctx, &info("hello"))
            .await
            .unwrap();
        assert_eq!(value, json!("world"));
    }

    #[test]
    fn removing_the_default_makes_unregistered_fields_unresolvable() {
        let mut map = ResolverMap::new();
        map.remove_default();
        assert!(map.chain("Query", "anything").is_none());
    }
}
