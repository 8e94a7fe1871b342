//! Pooled response-path tracking.
//!
//! Every resolved field gets a path segment (field name or list index)
//! chained to its parent. Segments live in a reusable arena so that deep
//! or wide responses do not heap-allocate per field. Segments are
//! addressed by [`PathId`] handles carrying a generation counter;
//! [`PathArena::reset`] bumps the generation, so a handle that outlives a
//! reset is detected instead of silently reading recycled memory.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

const DEFAULT_CHUNK_CAPACITY: u32 = 256;

/// One step in a response path: a field name or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// A response key (field alias or name).
    Field(Arc<str>),
    /// An index into a list value.
    Index(usize),
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Field(name) => write!(f, "{name}"),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// A handle to a pooled path segment.
///
/// Handles are plain indices plus the arena generation they were issued
/// under; they stay valid until the owning arena is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathId {
    chunk: u32,
    slot: u32,
    generation: u32,
}

struct PathSlot {
    segment: PathSegment,
    parent: Option<PathId>,
}

struct Chunk {
    slots: Box<[OnceLock<PathSlot>]>,
    cursor: AtomicU32,
}

impl Chunk {
    fn new(capacity: u32) -> Self {
        let mut slots = Vec::with_capacity(capacity as usize);
        slots.resize_with(capacity as usize, OnceLock::new);
        Self {
            slots: slots.into_boxed_slice(),
            cursor: AtomicU32::new(0),
        }
    }
}

/// A reusable arena of path segments.
///
/// Slot claims are a lock-free atomic bump within the current chunk, so
/// concurrent field fan-out can allocate segments without contention.
/// When a chunk fills up a new one is chained on; `reset` rewinds all
/// cursors without deallocating, amortizing allocation across requests.
pub struct PathArena {
    chunks: RwLock<Vec<Chunk>>,
    current: AtomicUsize,
    generation: AtomicU32,
    chunk_capacity: u32,
}

impl Default for PathArena {
    fn default() -> Self {
        Self::new()
    }
}

impl PathArena {
    /// Creates an arena with the default chunk capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHUNK_CAPACITY)
    }

    /// Creates an arena whose chunks hold `capacity` segments each.
    #[must_use]
    pub fn with_capacity(capacity: u32) -> Self {
        assert!(capacity > 0, "path arena capacity must be non-zero");
        Self {
            chunks: RwLock::new(vec![Chunk::new(capacity)]),
            current: AtomicUsize::new(0),
            generation: AtomicU32::new(0),
            chunk_capacity: capacity,
        }
    }

    /// Returns the current generation counter.
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }

    /// Allocates a field-name segment.
    pub fn field(&self, name: impl Into<Arc<str>>, parent: Option<PathId>) -> PathId {
        self.alloc(PathSegment::Field(name.into()), parent)
    }

    /// Allocates a list-index segment.
    pub fn index(&self, index: usize, parent: Option<PathId>) -> PathId {
        self.alloc(PathSegment::Index(index), parent)
    }

    fn alloc(&self, segment: PathSegment, parent: Option<PathId>) -> PathId {
        let generation = self.generation.load(Ordering::Acquire);
        if let Some(parent) = parent {
            // Chaining to a segment from a previous request is a
            // programming error; fail fast instead of corrupting paths.
            assert_eq!(
                parent.generation, generation,
                "parent path segment outlived an arena reset"
            );
        }
        let (chunk, slot) = self.claim();
        let chunks = self.chunks.read().expect("path arena lock poisoned");
        let stored = chunks[chunk as usize].slots[slot as usize].set(PathSlot { segment, parent });
        debug_assert!(stored.is_ok(), "path slot claimed twice");
        PathId {
            chunk,
            slot,
            generation,
        }
    }

    /// Claims a (chunk, slot) pair, chaining a new chunk when full.
    fn claim(&self) -> (u32, u32) {
        loop {
            {
                let chunks = self.chunks.read().expect("path arena lock poisoned");
                let current = self.current.load(Ordering::Acquire);
                let chunk = &chunks[current];
                let slot = chunk.cursor.fetch_add(1, Ordering::AcqRel);
                if (slot as usize) < chunk.slots.len() {
                    return (current as u32, slot);
                }
                if current + 1 < chunks.len() {
                    // Another claimer may already have advanced; either
                    // way the next iteration sees a fresh chunk.
                    let _ = self.current.compare_exchange(
                        current,
                        current + 1,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    );
                    continue;
                }
            }
            let mut chunks = self.chunks.write().expect("path arena lock poisoned");
            let current = self.current.load(Ordering::Acquire);
            let chunk = &chunks[current];
            // A racing claimer may have advanced to a fresh chunk while
            // this one waited on the write lock; advancing again here
            // would strand that chunk's capacity until the next reset.
            if (chunk.cursor.load(Ordering::Acquire) as usize) < chunk.slots.len() {
                continue;
            }
            if current + 1 >= chunks.len() {
                chunks.push(Chunk::new(self.chunk_capacity));
            }
            self.current.store(current + 1, Ordering::Release);
        }
    }

    /// Copies the segment chain behind `id` out of the pool, root first.
    ///
    /// The returned segments are owned and remain valid across `reset`,
    /// which is how error records keep their paths after the request's
    /// pool is recycled.
    #[must_use]
    pub fn materialize(&self, id: PathId) -> Vec<PathSegment> {
        let generation = self.generation.load(Ordering::Acquire);
        let chunks = self.chunks.read().expect("path arena lock poisoned");
        let mut segments = Vec::new();
        let mut next = Some(id);
        while let Some(id) = next {
            assert_eq!(
                id.generation, generation,
                "path segment read after arena reset"
            );
            let slot = chunks[id.chunk as usize].slots[id.slot as usize]
                .get()
                .expect("path slot read before being claimed");
            segments.push(slot.segment.clone());
            next = slot.parent;
        }
        segments.reverse();
        segments
    }

    /// Returns all segments to a reusable state for the next request.
    ///
    /// Requires exclusive access: callers must have materialized every
    /// path they intend to keep before resetting.
    pub fn reset(&mut self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let chunks = self.chunks.get_mut().expect("path arena lock poisoned");
        for chunk in chunks.iter_mut() {
            for slot in chunk.slots.iter_mut() {
                slot.take();
            }
            *chunk.cursor.get_mut() = 0;
        }
        *self.current.get_mut() = 0;
    }
}

impl std::fmt::Debug for PathArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathArena")
            .field("generation", &self.generation())
            .field("chunk_capacity", &self.chunk_capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_materialize_chain() {
        let arena = PathArena::new();
        let root = arena.field("users", None);
        let item = arena.index(3, Some(root));
        let leaf = arena.field("name", Some(item));

        assert_eq!(
            arena.materialize(leaf),
            vec![
                PathSegment::Field("users".into()),
                PathSegment::Index(3),
                PathSegment::Field("name".into()),
            ]
        );
    }

    #[test]
    fn test_chunk_growth() {
        let arena = PathArena::with_capacity(2);
        let mut last = None;
        for i in 0..10 {
            last = Some(arena.index(i, last));
        }
        let segments = arena.materialize(last.expect("allocated"));
        assert_eq!(segments.len(), 10);
        assert_eq!(segments[9], PathSegment::Index(9));
    }

    #[test]
    fn test_reset_reuses_slots() {
        let mut arena = PathArena::with_capacity(4);
        let before = arena.field("a", None);
        assert_eq!(arena.materialize(before).len(), 1);

        arena.reset();

        let after = arena.field("b", None);
        assert_eq!(
            arena.materialize(after),
            vec![PathSegment::Field("b".into())]
        );
    }

    #[test]
    #[should_panic(expected = "read after arena reset")]
    fn test_stale_handle_detected() {
        let mut arena = PathArena::new();
        let stale = arena.field("a", None);
        arena.reset();
        arena.materialize(stale);
    }

    #[test]
    #[should_panic(expected = "outlived an arena reset")]
    fn test_stale_parent_detected() {
        let mut arena = PathArena::new();
        let stale = arena.field("a", None);
        arena.reset();
        arena.field("b", Some(stale));
    }

    #[test]
    fn test_concurrent_claims() {
        let arena = std::sync::Arc::new(PathArena::with_capacity(8));
        let mut handles = Vec::new();
        for t in 0..4 {
            let arena = std::sync::Arc::clone(&arena);
            handles.push(std::thread::spawn(move || {
                let mut ids = Vec::new();
                for i in 0..64 {
                    ids.push(arena.index(t * 1000 + i, None));
                }
                ids
            }));
        }
        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.join().expect("thread panicked"));
        }
        // Every claim must land in a distinct slot.
        let unique: std::collections::HashSet<_> = all.iter().copied().collect();
        assert_eq!(unique.len(), all.len());
    }

    #[test]
    fn test_contended_growth_fills_every_chunk() {
        // Racing claimers must never advance past a chunk that still has
        // free slots: with the claim count a multiple of the chunk
        // capacity, every chunk ends up exactly full.
        const CAPACITY: usize = 8;
        const TOTAL: usize = 256;
        let arena = std::sync::Arc::new(PathArena::with_capacity(CAPACITY as u32));
        let mut handles = Vec::new();
        for t in 0..4 {
            let arena = std::sync::Arc::clone(&arena);
            handles.push(std::thread::spawn(move || {
                for i in 0..TOTAL / 4 {
                    arena.index(t * 1000 + i, None);
                }
            }));
        }
        for handle in handles {
            handle.join().expect("thread panicked");
        }
        let chunks = arena.chunks.read().expect("path arena lock poisoned");
        assert_eq!(chunks.len(), TOTAL / CAPACITY);
        for chunk in chunks.iter() {
            let claimed = chunk
                .slots
                .iter()
                .filter(|slot| slot.get().is_some())
                .count();
            assert_eq!(claimed, CAPACITY);
        }
    }
}
