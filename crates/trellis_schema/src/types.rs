//! Type graph entities.

use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

/// A reference to a type, with non-null and list wrappers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Named(String),
    NonNull(Box<TypeRef>),
    List(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn non_null(inner: TypeRef) -> Self {
        Self::NonNull(Box::new(inner))
    }

    pub fn list(inner: TypeRef) -> Self {
        Self::List(Box::new(inner))
    }

    /// Returns the innermost named type.
    pub fn innermost(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::NonNull(inner) | Self::List(inner) => inner.innermost(),
        }
    }

    /// Returns true if the outermost wrapper is non-null.
    pub fn is_non_null(&self) -> bool {
        matches!(self, Self::NonNull(_))
    }

    /// Strips a single non-null wrapper, if present.
    pub fn unwrap_non_null(&self) -> &TypeRef {
        match self {
            Self::NonNull(inner) => inner,
            other => other,
        }
    }
}

impl std::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{name}"),
            Self::NonNull(inner) => write!(f, "{inner}!"),
            Self::List(inner) => write!(f, "[{inner}]"),
        }
    }
}

/// A scalar coercion function: turns a resolver-produced value into the
/// wire representation, or rejects it with a message.
pub type ScalarCoercion = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

/// A predicate deciding whether a runtime value belongs to a concrete
/// object type. Registered at schema build; checked in order.
#[derive(Clone)]
pub struct TypePredicate {
    pub type_name: String,
    pub matches: Arc<dyn Fn(&Value) -> bool + Send + Sync>,
}

impl TypePredicate {
    pub fn new(
        type_name: impl Into<String>,
        matches: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            matches: Arc::new(matches),
        }
    }
}

impl std::fmt::Debug for TypePredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypePredicate")
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// How an interface or union resolves a runtime value to a concrete type.
///
/// Registered explicitly at schema build; there is no runtime shape
/// probing.
#[derive(Debug, Clone)]
pub enum AbstractResolver {
    /// Read the concrete type name from a field of the value.
    Discriminator(String),
    /// Check a closed, ordered list of concrete-type predicates.
    Predicates(Vec<TypePredicate>),
}

/// A type definition.
#[derive(Debug, Clone)]
pub enum TypeDef {
    Scalar(ScalarDef),
    Object(ObjectDef),
    Interface(InterfaceDef),
    Union(UnionDef),
    Enum(EnumDef),
    InputObject(InputObjectDef),
}

impl TypeDef {
    /// Returns the stable name of this type.
    pub fn name(&self) -> &str {
        match self {
            Self::Scalar(def) => &def.name,
            Self::Object(def) => &def.name,
            Self::Interface(def) => &def.name,
            Self::Union(def) => &def.name,
            Self::Enum(def) => &def.name,
            Self::InputObject(def) => &def.name,
        }
    }

    /// Returns true if this type may carry sub-selections.
    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Interface(_) | Self::Union(_))
    }

    /// Returns true if this type must not carry sub-selections.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Scalar(_) | Self::Enum(_))
    }

    /// Returns true if this type is abstract (interface or union).
    pub fn is_abstract(&self) -> bool {
        matches!(self, Self::Interface(_) | Self::Union(_))
    }
}

/// Scalar type definition.
#[derive(Clone)]
pub struct ScalarDef {
    pub name: String,
    pub description: Option<String>,
    /// Optional coercion applied to leaf results; identity when absent.
    pub coerce: Option<ScalarCoercion>,
}

impl ScalarDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            coerce: None,
        }
    }

    pub fn with_coercion(
        mut self,
        coerce: impl Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        self.coerce = Some(Arc::new(coerce));
        self
    }
}

impl std::fmt::Debug for ScalarDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScalarDef")
            .field("name", &self.name)
            .field("has_coercion", &self.coerce.is_some())
            .finish()
    }
}

/// Object type definition.
#[derive(Debug, Clone)]
pub struct ObjectDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldDef>,
    pub implements: Vec<String>,
}

impl ObjectDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: IndexMap::new(),
            implements: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.implements.push(interface.into());
        self
    }
}

/// Interface type definition.
#[derive(Debug, Clone)]
pub struct InterfaceDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldDef>,
    pub resolver: Option<AbstractResolver>,
}

impl InterfaceDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: IndexMap::new(),
            resolver: None,
        }
    }

    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    pub fn with_resolver(mut self, resolver: AbstractResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }
}

/// Union type definition.
#[derive(Debug, Clone)]
pub struct UnionDef {
    pub name: String,
    pub description: Option<String>,
    pub members: Vec<String>,
    pub resolver: Option<AbstractResolver>,
}

impl UnionDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            members: Vec::new(),
            resolver: None,
        }
    }

    pub fn with_member(mut self, member: impl Into<String>) -> Self {
        self.members.push(member.into());
        self
    }

    pub fn with_resolver(mut self, resolver: AbstractResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }
}

/// Enum type definition.
#[derive(Debug, Clone)]
pub struct EnumDef {
    pub name: String,
    pub description: Option<String>,
    pub values: Vec<EnumValueDef>,
}

impl EnumDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            values: Vec::new(),
        }
    }

    pub fn with_value(mut self, name: impl Into<String>) -> Self {
        self.values.push(EnumValueDef {
            name: name.into(),
            description: None,
        });
        self
    }
}

/// Enum value definition.
#[derive(Debug, Clone)]
pub struct EnumValueDef {
    pub name: String,
    pub description: Option<String>,
}

/// Input object type definition.
#[derive(Debug, Clone)]
pub struct InputObjectDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, InputValueDef>,
}

impl InputObjectDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: IndexMap::new(),
        }
    }

    pub fn with_field(mut self, field: InputValueDef) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }
}

/// Field definition.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub arguments: IndexMap<String, InputValueDef>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            description: None,
            ty,
            arguments: IndexMap::new(),
        }
    }

    pub fn with_argument(mut self, argument: InputValueDef) -> Self {
        self.arguments.insert(argument.name.clone(), argument);
        self
    }
}

/// Input value definition (argument or input field).
#[derive(Debug, Clone)]
pub struct InputValueDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub default_value: Option<Value>,
}

impl InputValueDef {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            description: None,
            ty,
            default_value: None,
        }
    }

    pub fn with_default(mut self, default_value: Value) -> Self {
        self.default_value = Some(default_value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_ref_display() {
        let ty = TypeRef::non_null(TypeRef::list(TypeRef::non_null(TypeRef::named("Int"))));
        assert_eq!(ty.to_string(), "[Int!]!");
        assert_eq!(ty.innermost(), "Int");
        assert!(ty.is_non_null());
        assert!(!ty.unwrap_non_null().is_non_null());
    }

    #[test]
    fn test_type_def_kinds() {
        let object = TypeDef::Object(ObjectDef::new("User"));
        assert!(object.is_composite());
        assert!(!object.is_leaf());
        assert!(!object.is_abstract());

        let scalar = TypeDef::Scalar(ScalarDef::new("Boolean"));
        assert!(scalar.is_leaf());

        let union = TypeDef::Union(UnionDef::new("Pet"));
        assert!(union.is_abstract());
        assert!(union.is_composite());
    }
}
