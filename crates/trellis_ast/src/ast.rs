//! Abstract Syntax Tree types for executable documents.

use trellis_core::Span;

/// A complete executable document.
#[derive(Debug, Clone)]
pub struct Document {
    pub definitions: Vec<Definition>,
    pub span: Span,
}

impl Document {
    /// Creates a document from its definitions.
    pub fn new(definitions: Vec<Definition>) -> Self {
        Self {
            definitions,
            span: Span::default(),
        }
    }

    /// Returns the operations defined in this document.
    pub fn operations(&self) -> impl Iterator<Item = &OperationDefinition> {
        self.definitions.iter().filter_map(|def| match def {
            Definition::Operation(op) => Some(op),
            Definition::Fragment(_) => None,
        })
    }

    /// Returns the fragments defined in this document.
    pub fn fragments(&self) -> impl Iterator<Item = &FragmentDefinition> {
        self.definitions.iter().filter_map(|def| match def {
            Definition::Fragment(fragment) => Some(fragment),
            Definition::Operation(_) => None,
        })
    }
}

/// A top-level definition.
#[derive(Debug, Clone)]
pub enum Definition {
    Operation(OperationDefinition),
    Fragment(FragmentDefinition),
}

/// Type of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Query => write!(f, "query"),
            Self::Mutation => write!(f, "mutation"),
            Self::Subscription => write!(f, "subscription"),
        }
    }
}

/// An operation definition (query, mutation, or subscription).
#[derive(Debug, Clone)]
pub struct OperationDefinition {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub variable_definitions: Vec<VariableDefinition>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
    pub span: Span,
}

impl OperationDefinition {
    /// Creates an operation of the given kind.
    pub fn new(kind: OperationKind, selection_set: SelectionSet) -> Self {
        Self {
            kind,
            name: None,
            variable_definitions: Vec::new(),
            directives: Vec::new(),
            selection_set,
            span: Span::default(),
        }
    }

    /// Names the operation.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Declares a variable on the operation.
    pub fn with_variable(mut self, variable: VariableDefinition) -> Self {
        self.variable_definitions.push(variable);
        self
    }
}

/// A variable declared on an operation.
#[derive(Debug, Clone)]
pub struct VariableDefinition {
    pub name: String,
    pub ty: TypeAnnotation,
    pub default_value: Option<Value>,
    pub span: Span,
}

impl VariableDefinition {
    /// Creates a variable definition.
    pub fn new(name: impl Into<String>, ty: TypeAnnotation) -> Self {
        Self {
            name: name.into(),
            ty,
            default_value: None,
            span: Span::default(),
        }
    }

    /// Sets the variable's default value.
    pub fn with_default(mut self, default_value: Value) -> Self {
        self.default_value = Some(default_value);
        self
    }
}

/// A type annotation in variable position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeAnnotation {
    Named(String),
    NonNull(Box<TypeAnnotation>),
    List(Box<TypeAnnotation>),
}

impl TypeAnnotation {
    /// Returns the innermost named type.
    pub fn named(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::NonNull(inner) | Self::List(inner) => inner.named(),
        }
    }

    /// Returns true if the outermost wrapper is non-null.
    pub fn is_non_null(&self) -> bool {
        matches!(self, Self::NonNull(_))
    }
}

impl std::fmt::Display for TypeAnnotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{name}"),
            Self::NonNull(inner) => write!(f, "{inner}!"),
            Self::List(inner) => write!(f, "[{inner}]"),
        }
    }
}

/// A braces-delimited list of selections.
#[derive(Debug, Clone)]
pub struct SelectionSet {
    pub selections: Vec<Selection>,
    pub span: Span,
}

impl SelectionSet {
    /// Creates a selection set from its selections.
    pub fn new(selections: Vec<Selection>) -> Self {
        Self {
            selections,
            span: Span::default(),
        }
    }

    /// Returns true if this selection set selects nothing.
    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }
}

/// A single selection.
#[derive(Debug, Clone)]
pub enum Selection {
    Field(Field),
    FragmentSpread(FragmentSpread),
    InlineFragment(InlineFragment),
}

/// A field selection.
#[derive(Debug, Clone)]
pub struct Field {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: Vec<Argument>,
    pub directives: Vec<Directive>,
    pub selection_set: Option<SelectionSet>,
    pub span: Span,
}

impl Field {
    /// Creates a leaf field selection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            alias: None,
            name: name.into(),
            arguments: Vec::new(),
            directives: Vec::new(),
            selection_set: None,
            span: Span::default(),
        }
    }

    /// Aliases the field.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Adds an argument to the field.
    pub fn with_argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.push(Argument {
            name: name.into(),
            value,
            span: Span::default(),
        });
        self
    }

    /// Adds a directive to the field.
    pub fn with_directive(mut self, directive: Directive) -> Self {
        self.directives.push(directive);
        self
    }

    /// Sets the field's sub-selection.
    pub fn with_selection_set(mut self, selection_set: SelectionSet) -> Self {
        self.selection_set = Some(selection_set);
        self
    }

    /// Returns the response key for this field (alias, or the field name).
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

impl From<Field> for Selection {
    fn from(field: Field) -> Self {
        Self::Field(field)
    }
}

/// A named fragment spread (`...name`).
#[derive(Debug, Clone)]
pub struct FragmentSpread {
    pub name: String,
    pub directives: Vec<Directive>,
    pub span: Span,
}

impl FragmentSpread {
    /// Creates a spread of a named fragment.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            directives: Vec::new(),
            span: Span::default(),
        }
    }

    /// Adds a directive to the spread.
    pub fn with_directive(mut self, directive: Directive) -> Self {
        self.directives.push(directive);
        self
    }
}

impl From<FragmentSpread> for Selection {
    fn from(spread: FragmentSpread) -> Self {
        Self::FragmentSpread(spread)
    }
}

/// An inline fragment (`... on Type { ... }`).
#[derive(Debug, Clone)]
pub struct InlineFragment {
    pub type_condition: Option<String>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
    pub span: Span,
}

impl InlineFragment {
    /// Creates an inline fragment without a type condition.
    pub fn new(selection_set: SelectionSet) -> Self {
        Self {
            type_condition: None,
            directives: Vec::new(),
            selection_set,
            span: Span::default(),
        }
    }

    /// Sets the type condition.
    pub fn on(mut self, type_condition: impl Into<String>) -> Self {
        self.type_condition = Some(type_condition.into());
        self
    }

    /// Adds a directive to the fragment.
    pub fn with_directive(mut self, directive: Directive) -> Self {
        self.directives.push(directive);
        self
    }
}

impl From<InlineFragment> for Selection {
    fn from(inline: InlineFragment) -> Self {
        Self::InlineFragment(inline)
    }
}

/// A named fragment definition.
#[derive(Debug, Clone)]
pub struct FragmentDefinition {
    pub name: String,
    pub type_condition: String,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
    pub span: Span,
}

impl FragmentDefinition {
    /// Creates a named fragment on a type condition.
    pub fn new(
        name: impl Into<String>,
        type_condition: impl Into<String>,
        selection_set: SelectionSet,
    ) -> Self {
        Self {
            name: name.into(),
            type_condition: type_condition.into(),
            directives: Vec::new(),
            selection_set,
            span: Span::default(),
        }
    }
}

/// A directive applied to a selection or definition.
#[derive(Debug, Clone)]
pub struct Directive {
    pub name: String,
    pub arguments: Vec<Argument>,
    pub span: Span,
}

impl Directive {
    /// Creates a directive with no arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
            span: Span::default(),
        }
    }

    /// Adds an argument to the directive.
    pub fn with_argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.push(Argument {
            name: name.into(),
            value,
            span: Span::default(),
        });
        self
    }

    /// Returns the value of an argument by name.
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments
            .iter()
            .find(|arg| arg.name == name)
            .map(|arg| &arg.value)
    }
}

/// A named argument.
#[derive(Debug, Clone)]
pub struct Argument {
    pub name: String,
    pub value: Value,
    pub span: Span,
}

/// A value literal (possibly referencing a variable).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Variable(String),
    Int(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Null,
    Enum(String),
    List(Vec<Value>),
    Object(Vec<(String, Value)>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_key() {
        let field = Field {
            alias: Some("hero".to_string()),
            name: "user".to_string(),
            arguments: Vec::new(),
            directives: Vec::new(),
            selection_set: None,
            span: Span::default(),
        };
        assert_eq!(field.response_key(), "hero");

        let unaliased = Field {
            alias: None,
            ..field
        };
        assert_eq!(unaliased.response_key(), "user");
    }

    #[test]
    fn test_type_annotation_named() {
        let ty = TypeAnnotation::NonNull(Box::new(TypeAnnotation::List(Box::new(
            TypeAnnotation::Named("Int".to_string()),
        ))));
        assert_eq!(ty.named(), "Int");
        assert!(ty.is_non_null());
    }
}
