//! Request-scoped execution context.

use crate::dataloader::LoaderRegistry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Per-request state shared by every resolver invocation.
///
/// Carries opaque request data (authentication, connection handles and the
/// like, stored as JSON), the request's [`LoaderRegistry`], and a
/// cancellation token that resolvers and the executor observe.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    data: HashMap<String, serde_json::Value>,
    loaders: Arc<LoaderRegistry>,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a value in the context.
    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) {
        if let Ok(v) = serde_json::to_value(value) {
            self.data.insert(key.into(), v);
        }
    }

    /// Gets a value from the context.
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// The request's loader registry.
    pub fn loaders(&self) -> &LoaderRegistry {
        &self.loaders
    }

    /// The cancellation token for this request.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Cancels the request. In-flight fields finish; unstarted fields
    /// resolve to an error instead of invoking their resolver.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }
}
