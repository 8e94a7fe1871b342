//! Field middleware.
//!
//! A field's chain is an explicit ordered list: each middleware receives a
//! [`Next`] handle and decides whether to call the remaining stages. The
//! terminal stage is always the field's resolver.

use crate::context::RequestContext;
use crate::resolver::{Resolver, ResolverArgs, ResolverFuture, ResolverInfo};
use serde_json::Value;
use std::sync::Arc;

/// A stage wrapped around a field's resolver.
pub trait FieldMiddleware: Send + Sync {
    /// Handles the field. Call `next.run(..)` to continue down the chain,
    /// or return without calling it to short-circuit.
    fn handle<'a>(
        &'a self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a RequestContext,
        info: &'a ResolverInfo,
        next: Next<'a>,
    ) -> ResolverFuture<'a>;
}

/// The remainder of a field's chain.
pub struct Next<'a> {
    remaining: &'a [Arc<dyn FieldMiddleware>],
    resolver: &'a dyn Resolver,
}

impl<'a> Next<'a> {
    /// Runs the rest of the chain.
    pub fn run(
        self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a RequestContext,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        match self.remaining.split_first() {
            Some((stage, remaining)) => stage.handle(
                parent,
                args,
                ctx,
                info,
                Next {
                    remaining,
                    resolver: self.resolver,
                },
            ),
            None => self.resolver.resolve(parent, args, ctx, info),
        }
    }
}

/// A field's full chain: middleware in registration order, then the
/// resolver.
pub struct ResolverChain<'a> {
    middleware: &'a [Arc<dyn FieldMiddleware>],
    resolver: &'a dyn Resolver,
}

impl<'a> ResolverChain<'a> {
    pub(crate) fn new(
        middleware: &'a [Arc<dyn FieldMiddleware>],
        resolver: &'a dyn Resolver,
    ) -> Self {
        Self {
            middleware,
            resolver,
        }
    }

    /// Invokes the chain from the top.
    pub fn invoke(
        &self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a RequestContext,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        Next {
            remaining: self.middleware,
            resolver: self.resolver,
        }
        .run(parent, args, ctx, info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{ResolverError, ResolverMap};
    use serde_json::json;
    use trellis_schema::TypeRef;

    struct Uppercase;

    impl FieldMiddleware for Uppercase {
        fn handle<'a>(
            &'a self,
            parent: &'a Value,
            args: &'a ResolverArgs,
            ctx: &'a RequestContext,
            info: &'a ResolverInfo,
            next: Next<'a>,
        ) -> ResolverFuture<'a> {
            Box::pin(async move {
                let value = next.run(parent, args, ctx, info).await?;
                match value {
                    Value::String(s) => Ok(Value::String(s.to_uppercase())),
                    other => Ok(other),
                }
            })
        }
    }

    struct Deny;

    impl FieldMiddleware for Deny {
        fn handle<'a>(
            &'a self,
            _parent: &'a Value,
            _args: &'a ResolverArgs,
            _ctx: &'a RequestContext,
            _info: &'a ResolverInfo,
            _next: Next<'a>,
        ) -> ResolverFuture<'a> {
            Box::pin(async move { Err(ResolverError::Custom("denied".to_string())) })
        }
    }

    struct Tag(&'static str);

    impl FieldMiddleware for Tag {
        fn handle<'a>(
            &'a self,
            parent: &'a Value,
            args: &'a ResolverArgs,
            ctx: &'a RequestContext,
            info: &'a ResolverInfo,
            next: Next<'a>,
        ) -> ResolverFuture<'a> {
            Box::pin(async move {
                let value = next.run(parent, args, ctx, info).await?;
                match value {
                    Value::String(s) => Ok(Value::String(format!("{}:{}", self.0, s))),
                    other => Ok(other),
                }
            })
        }
    }

    fn info() -> ResolverInfo {
        ResolverInfo::new("greeting", "Query", TypeRef::named("String"))
    }

    #[tokio::test]
    async fn middleware_wraps_the_resolver() {
        let mut map = ResolverMap::new();
        map.register_fn("Query", "greeting", |_, _, _, _| Ok(json!("hello")));
        map.register_middleware("Query", "greeting", Uppercase);

        let chain = map.chain("Query", "greeting").unwrap();
        let parent = Value::Null;
        let args = ResolverArgs::new();
        let ctx = RequestContext::new();
        let value = chain.invoke(&parent, &args, &ctx, &info()).await.unwrap();
        assert_eq!(value, json!("HELLO"));
    }

    #[tokio::test]
    async fn middleware_runs_in_registration_order() {
        let mut map = ResolverMap::new();
        map.register_fn("Query", "greeting", |_, _, _, _| Ok(json!("x")));
        // Outermost first: "a" wraps "b" wraps the resolver.
        map.register_middleware("Query", "greeting", Tag("a"));
        map.register_middleware("Query", "greeting", Tag("b"));

        let chain = map.chain("Query", "greeting").unwrap();
        let parent = Value::Null;
        let args = ResolverArgs::new();
        let ctx = RequestContext::new();
        let value = chain.invoke(&parent, &args, &ctx, &info()).await.unwrap();
        assert_eq!(value, json!("a:b:x"));
    }

    #[tokio::test]
    async fn middleware_can_short_circuit() {
        let mut map = ResolverMap::new();
        map.register_fn("Query", "greeting", |_, _, _, _| {
            panic!("resolver must not run")
        });
        map.register_middleware("Query", "greeting", Deny);

        let chain = map.chain("Query", "greeting").unwrap();
        let parent = Value::Null;
        let args = ResolverArgs::new();
        let ctx = RequestContext::new();
        let result = chain.invoke(&parent, &args, &ctx, &info()).await;
        assert!(matches!(result, Err(ResolverError::Custom(_))));
    }
}
