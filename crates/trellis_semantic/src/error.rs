//! Validation error reporting.

use serde::Serialize;
use thiserror::Error;
use trellis_core::Span;

/// Machine-readable validation rule codes.
pub mod codes {
    pub const FRAGMENT_ON_NON_COMPOSITE_TYPE: &str = "fragmentOnNonCompositeType";
    pub const INLINE_FRAGMENT_ON_NON_COMPOSITE_TYPE: &str = "inlineFragmentOnNonCompositeType";
    pub const NO_SUBSELECTION_ALLOWED: &str = "noSubselectionAllowed";
    pub const REQUIRED_SUBSELECTION: &str = "requiredSubselection";
    pub const FRAGMENT_CYCLE: &str = "fragmentCycle";
    pub const FIELDS_CONFLICT: &str = "fieldsConflict";
    pub const UNKNOWN_FRAGMENT: &str = "unknownFragment";
}

/// A single validation failure: rule code, message, and the source spans
/// of the offending nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{code}: {message}")]
pub struct ValidationError {
    /// Machine-readable rule code (see [`codes`]).
    pub code: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Source locations of the offending AST nodes.
    pub locations: Vec<Span>,
}

impl ValidationError {
    /// Creates a new validation error.
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            locations: Vec::new(),
        }
    }

    /// Attaches a source location.
    pub fn with_location(mut self, span: Span) -> Self {
        self.locations.push(span);
        self
    }
}
