//! Request-scoped batching and caching for resolver lookups.
//!
//! A [`Loader`] coalesces every `load` issued during one scheduler tick into
//! a single batched fetch, preventing N+1 queries when sibling fields hit
//! the same backend. Results are cached per key for the rest of the request.

use futures::future::BoxFuture;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tokio::sync::oneshot;

/// An error distributed to every handle waiting on a failed batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// The batched fetch itself failed.
    #[error("batched fetch failed: {0}")]
    Fetch(String),
    /// The loader was dropped before the batch was dispatched.
    #[error("loader dropped before batch dispatch")]
    Dropped,
}

/// The outcome of a single `load`: `Ok(None)` means the fetch succeeded but
/// returned no value for the key.
pub type LoadResult<V> = Result<Option<V>, BatchError>;

type BatchFn<K, V> =
    dyn Fn(Vec<K>) -> BoxFuture<'static, Result<FxHashMap<K, V>, String>> + Send + Sync;

struct PendingBatch<K, V> {
    keys: Vec<K>,
    waiters: FxHashMap<K, Vec<oneshot::Sender<LoadResult<V>>>>,
}

impl<K, V> Default for PendingBatch<K, V> {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            waiters: FxHashMap::default(),
        }
    }
}

struct LoaderState<K, V> {
    cache: FxHashMap<K, LoadResult<V>>,
    batch: Option<PendingBatch<K, V>>,
}

/// A batching, caching loader.
///
/// Cloning is cheap; clones share the same cache and pending batch.
pub struct Loader<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    batch_fn: Arc<BatchFn<K, V>>,
    state: Arc<Mutex<LoaderState<K, V>>>,
}

impl<K, V> Clone for Loader<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            batch_fn: Arc::clone(&self.batch_fn),
            state: Arc::clone(&self.state),
        }
    }
}

impl<K, V> std::fmt::Debug for Loader<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader").finish_non_exhaustive()
    }
}

impl<K, V> Loader<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a loader around a batch function. The function receives the
    /// accumulated unique keys of one tick and returns a map of results; a
    /// key absent from the map loads as `Ok(None)`.
    pub fn new<F, Fut>(batch_fn: F) -> Self
    where
        F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<FxHashMap<K, V>, String>> + Send + 'static,
    {
        Self {
            batch_fn: Arc::new(move |keys| Box::pin(batch_fn(keys))),
            state: Arc::new(Mutex::new(LoaderState {
                cache: FxHashMap::default(),
                batch: None,
            })),
        }
    }

    /// Loads a value by key.
    ///
    /// Cached keys resolve immediately. Otherwise the key joins the current
    /// batch; the first registrant of a batch yields once, so that sibling
    /// resolvers scheduled in the same tick can register their keys, and
    /// then dispatches the whole batch with one call to the batch function.
    pub async fn load(&self, key: K) -> LoadResult<V> {
        let (receiver, dispatch) = {
            let mut state = self.state.lock().expect("loader state lock poisoned");
            if let Some(cached) = state.cache.get(&key) {
                return cached.clone();
            }
            let dispatch = state.batch.is_none();
            let batch = state.batch.get_or_insert_with(PendingBatch::default);
            if !batch.waiters.contains_key(&key) {
                batch.keys.push(key.clone());
                batch.waiters.insert(key.clone(), Vec::new());
            }
            let (tx, rx) = oneshot::channel();
            batch
                .waiters
                .get_mut(&key)
                .expect("waiter slot was just inserted")
                .push(tx);
            (rx, dispatch)
        };

        if dispatch {
            tokio::task::yield_now().await;
            self.dispatch().await;
        }

        match receiver.await {
            Ok(result) => result,
            Err(_) => Err(BatchError::Dropped),
        }
    }

    /// Pre-populates the cache for a key. Primed keys never reach the batch
    /// function.
    pub fn prime(&self, key: K, value: V) {
        let mut state = self.state.lock().expect("loader state lock poisoned");
        state.cache.insert(key, Ok(Some(value)));
    }

    /// Evicts a single key from the cache.
    pub fn clear_key(&self, key: &K) {
        let mut state = self.state.lock().expect("loader state lock poisoned");
        state.cache.remove(key);
    }

    /// Clears the entire cache.
    pub fn clear(&self) {
        let mut state = self.state.lock().expect("loader state lock poisoned");
        state.cache.clear();
    }

    async fn dispatch(&self) {
        let pending = {
            let mut state = self.state.lock().expect("loader state lock poisoned");
            state.batch.take()
        };
        let Some(pending) = pending else {
            return;
        };
        tracing::debug!(keys = pending.keys.len(), "dispatching loader batch");

        let outcome = (self.batch_fn)(pending.keys).await;
        let mut state = self.state.lock().expect("loader state lock poisoned");
        match outcome {
            Ok(mut values) => {
                for (key, waiters) in pending.waiters {
                    let result: LoadResult<V> = Ok(values.remove(&key));
                    for waiter in waiters {
                        let _ = waiter.send(result.clone());
                    }
                    state.cache.insert(key, result);
                }
            }
            Err(message) => {
                // Failures are not cached, so a later tick can retry.
                let error = BatchError::Fetch(message);
                for waiters in pending.waiters.into_values() {
                    for waiter in waiters {
                        let _ = waiter.send(Err(error.clone()));
                    }
                }
            }
        }
    }
}

/// Named, type-erased loaders attached to a request.
#[derive(Default)]
pub struct LoaderRegistry {
    loaders: RwLock<FxHashMap<String, Box<dyn Any + Send + Sync>>>,
}

impl std::fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let loaders = self.loaders.read().expect("loader registry lock poisoned");
        f.debug_struct("LoaderRegistry")
            .field("count", &loaders.len())
            .finish()
    }
}

impl LoaderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a loader under a name, replacing any previous loader with
    /// that name.
    pub fn insert<K, V>(&self, name: impl Into<String>, loader: Loader<K, V>)
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let mut loaders = self.loaders.write().expect("loader registry lock poisoned");
        loaders.insert(name.into(), Box::new(loader));
    }

    /// Fetches a loader by name. Returns `None` if the name is unknown or
    /// was registered with different key/value types.
    pub fn get<K, V>(&self, name: &str) -> Option<Loader<K, V>>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let loaders = self.loaders.read().expect("loader registry lock poisoned");
        loaders
            .get(name)
            .and_then(|any| any.downcast_ref::<Loader<K, V>>())
            .cloned()
    }
}
