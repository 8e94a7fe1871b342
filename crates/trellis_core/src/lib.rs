//! Core utilities for Trellis.
//!
//! This crate provides foundational types used throughout trellis:
//! - `span`: Source location tracking
//! - `path`: Pooled response-path tracking

pub mod path;
pub mod span;

pub use path::{PathArena, PathId, PathSegment};
pub use span::Span;
