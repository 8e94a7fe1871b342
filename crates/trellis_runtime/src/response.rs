//! Execution results and field errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use trellis_core::Span;
use trellis_semantic::ValidationError;

/// Machine-readable codes attached to execution errors under
/// `extensions.code`.
pub mod codes {
    /// A non-null field resolved to null.
    pub const NON_NULL_VIOLATION: &str = "NON_NULL_VIOLATION";
    /// A batched fetch failed for every key in the batch.
    pub const BATCH_FETCH_FAILED: &str = "BATCH_FETCH_FAILED";
    /// The request was cancelled before execution finished.
    pub const REQUEST_CANCELLED: &str = "REQUEST_CANCELLED";
    /// The request itself was malformed (unknown operation, bad variables).
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
}

/// A step in an error path, as it appears in the `errors[].path` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl From<trellis_core::PathSegment> for PathSegment {
    fn from(segment: trellis_core::PathSegment) -> Self {
        match segment {
            trellis_core::PathSegment::Field(name) => Self::Field(name.as_ref().to_string()),
            trellis_core::PathSegment::Index(index) => Self::Index(index),
        }
    }
}

/// An error raised while executing a field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionError {
    /// The error message.
    pub message: String,
    /// The response path of the field that failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,
    /// Source locations of the field in the document.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub locations: Vec<Span>,
    /// Error extensions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<HashMap<String, Value>>,
}

impl ExecutionError {
    /// Creates a new execution error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            locations: Vec::new(),
            extensions: None,
        }
    }

    /// Adds a response path to the error.
    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = Some(path);
        self
    }

    /// Adds a source location to the error.
    pub fn with_location(mut self, span: Span) -> Self {
        self.locations.push(span);
        self
    }

    /// Adds an extension entry to the error.
    pub fn with_extension(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extensions
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }

    /// Adds an `extensions.code` entry to the error.
    pub fn with_code(self, code: &str) -> Self {
        self.with_extension("code", Value::String(code.to_string()))
    }

    /// Returns the `extensions.code` entry, if any.
    pub fn code(&self) -> Option<&str> {
        self.extensions
            .as_ref()
            .and_then(|ext| ext.get("code"))
            .and_then(Value::as_str)
    }
}

impl From<ValidationError> for ExecutionError {
    fn from(error: ValidationError) -> Self {
        let mut converted = Self::new(error.message).with_code(error.code);
        converted.locations = error.locations;
        converted
    }
}

/// A GraphQL response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// The data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// The errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ExecutionError>>,
    /// Response extensions.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub extensions: Option<HashMap<String, Value>>,
}

impl Response {
    /// Creates a successful response with data.
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: None,
            extensions: None,
        }
    }

    /// Creates an error response with a single error.
    pub fn error(error: ExecutionError) -> Self {
        Self::errors(vec![error])
    }

    /// Creates an error response.
    pub fn errors(errors: Vec<ExecutionError>) -> Self {
        Self {
            data: None,
            errors: Some(errors),
            extensions: None,
        }
    }

    /// Creates a response carrying both data and errors.
    pub fn partial(data: Value, errors: Vec<ExecutionError>) -> Self {
        Self {
            data: Some(data),
            errors: if errors.is_empty() {
                None
            } else {
                Some(errors)
            },
            extensions: None,
        }
    }

    /// Returns true if the response has errors.
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// Returns true if the response has data.
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }
}
