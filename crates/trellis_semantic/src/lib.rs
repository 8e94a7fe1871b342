//! Validation engine for Trellis.
//!
//! A query document must validate cleanly against the type registry
//! before any execution is attempted. Validation is a set of independent
//! rule visitors observing one combined enter/leave traversal; every rule
//! reports plain data ([`ValidationError`]), never panics, and defers
//! judgment when it cannot decide (unknown types are some other rule's
//! problem).

pub mod error;
pub mod rules;
pub mod validate;

pub use error::{codes, ValidationError};
pub use validate::validate;
