//! Execution runtime for Trellis.
//!
//! This crate turns a validated document and a type registry into a
//! response:
//! - `plan`: Selection planning (fragment flattening, `@skip`/`@include`,
//!   field merging)
//! - `resolver`: Resolver registration and the default property resolver
//! - `pipeline`: Per-field middleware chains
//! - `executor`: Concurrent query / serial mutation execution with
//!   null propagation
//! - `dataloader`: Per-tick batching and caching for backend lookups
//! - `broker`: Subscription topics and per-event re-execution
//! - `context`: Request-scoped state handed to every resolver
//! - `response`: Responses, execution errors, and error paths

pub mod broker;
pub mod context;
pub mod dataloader;
pub mod executor;
pub mod pipeline;
pub mod plan;
pub mod resolver;
pub mod response;

pub use broker::{SubscriptionBroker, SubscriptionStream, TopicKey};
pub use context::RequestContext;
pub use dataloader::{BatchError, LoadResult, Loader, LoaderRegistry};
pub use executor::{Executor, ExecutorConfig};
pub use pipeline::{FieldMiddleware, Next, ResolverChain};
pub use plan::{collect_fields, PlannedField};
pub use resolver::{
    AsyncFnResolver, BoxedResolver, DefaultResolver, FnResolver, Resolver, ResolverArgs,
    ResolverError, ResolverFuture, ResolverInfo, ResolverMap, ResolverResult,
};
pub use response::{codes, ExecutionError, PathSegment, Response};
