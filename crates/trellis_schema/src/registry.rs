//! The resolved schema view consulted during validation and execution.

use crate::types::{AbstractResolver, FieldDef, ScalarDef, TypeDef};
use indexmap::IndexMap;
use serde_json::Value;

/// A resolved schema: type-by-name lookup, field lookup, composite-type
/// satisfaction, and abstract-type resolution.
///
/// Built once via [`SchemaBuilder`] and read-only thereafter.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub query_type: Option<String>,
    pub mutation_type: Option<String>,
    pub subscription_type: Option<String>,
    pub types: IndexMap<String, TypeDef>,
}

impl Schema {
    /// Creates a new empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a type by name.
    pub fn get_type(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    /// Gets a field definition on a named type.
    ///
    /// Only object and interface types carry fields.
    pub fn field_def(&self, type_name: &str, field_name: &str) -> Option<&FieldDef> {
        match self.types.get(type_name)? {
            TypeDef::Object(def) => def.fields.get(field_name),
            TypeDef::Interface(def) => def.fields.get(field_name),
            _ => None,
        }
    }

    /// Returns whether the named type is composite; `None` if unknown.
    pub fn is_composite(&self, name: &str) -> Option<bool> {
        self.types.get(name).map(TypeDef::is_composite)
    }

    /// Returns whether the named type is a leaf; `None` if unknown.
    pub fn is_leaf(&self, name: &str) -> Option<bool> {
        self.types.get(name).map(TypeDef::is_leaf)
    }

    /// Returns true if an object type satisfies a composite type
    /// condition: the same type, an implemented interface, or a union
    /// the object belongs to.
    pub fn object_satisfies(&self, object_name: &str, condition: &str) -> bool {
        if object_name == condition {
            return true;
        }
        match self.types.get(condition) {
            Some(TypeDef::Interface(_)) => match self.types.get(object_name) {
                Some(TypeDef::Object(def)) => def.implements.iter().any(|i| i == condition),
                _ => false,
            },
            Some(TypeDef::Union(def)) => def.members.iter().any(|m| m == object_name),
            _ => false,
        }
    }

    /// Returns the concrete object types that can occupy an abstract
    /// type position.
    pub fn possible_types(&self, abstract_name: &str) -> Vec<&str> {
        match self.types.get(abstract_name) {
            Some(TypeDef::Union(def)) => def.members.iter().map(String::as_str).collect(),
            Some(TypeDef::Interface(_)) => self
                .types
                .values()
                .filter_map(|ty| match ty {
                    TypeDef::Object(def)
                        if def.implements.iter().any(|i| i == abstract_name) =>
                    {
                        Some(def.name.as_str())
                    }
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Resolves the concrete type of a runtime value at an abstract-type
    /// position, using the resolver registered at schema build.
    ///
    /// Falls back to a `__typename` property on the value when no
    /// resolver was registered.
    pub fn resolve_abstract(&self, abstract_name: &str, value: &Value) -> Option<String> {
        let resolver = match self.types.get(abstract_name)? {
            TypeDef::Interface(def) => def.resolver.as_ref(),
            TypeDef::Union(def) => def.resolver.as_ref(),
            _ => return None,
        };
        match resolver {
            Some(AbstractResolver::Discriminator(field)) => {
                value.get(field).and_then(Value::as_str).map(str::to_owned)
            }
            Some(AbstractResolver::Predicates(predicates)) => predicates
                .iter()
                .find(|p| (p.matches)(value))
                .map(|p| p.type_name.clone()),
            None => value
                .get("__typename")
                .and_then(Value::as_str)
                .map(str::to_owned),
        }
    }

    /// Applies the coercion registered for a leaf type, identity when
    /// none is registered. Enum types pass through unchanged.
    pub fn coerce_leaf(&self, type_name: &str, value: Value) -> Result<Value, String> {
        match self.types.get(type_name) {
            Some(TypeDef::Scalar(ScalarDef {
                coerce: Some(coerce),
                ..
            })) => coerce(&value),
            _ => Ok(value),
        }
    }

    /// Returns the root type name for an operation kind.
    pub fn root_type(&self, kind: RootKind) -> Option<&str> {
        match kind {
            RootKind::Query => self.query_type.as_deref(),
            RootKind::Mutation => self.mutation_type.as_deref(),
            RootKind::Subscription => self.subscription_type.as_deref(),
        }
    }
}

/// The three root operation positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    Query,
    Mutation,
    Subscription,
}

/// Schema builder.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    /// Creates a new schema builder with the built-in scalars.
    pub fn new() -> Self {
        let mut builder = Self::default();
        for name in ["Int", "Float", "String", "Boolean", "ID"] {
            builder.schema.types.insert(
                name.to_string(),
                TypeDef::Scalar(ScalarDef {
                    name: name.to_string(),
                    description: Some(format!("Built-in {name} scalar")),
                    coerce: None,
                }),
            );
        }
        builder
    }

    /// Sets the query root type.
    pub fn query_type(mut self, name: impl Into<String>) -> Self {
        self.schema.query_type = Some(name.into());
        self
    }

    /// Sets the mutation root type.
    pub fn mutation_type(mut self, name: impl Into<String>) -> Self {
        self.schema.mutation_type = Some(name.into());
        self
    }

    /// Sets the subscription root type.
    pub fn subscription_type(mut self, name: impl Into<String>) -> Self {
        self.schema.subscription_type = Some(name.into());
        self
    }

    /// Adds a type, keyed by its stable name.
    pub fn add_type(mut self, type_def: TypeDef) -> Self {
        self.schema
            .types
            .insert(type_def.name().to_string(), type_def);
        self
    }

    /// Builds the schema.
    pub fn build(self) -> Schema {
        self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldDef, InterfaceDef, ObjectDef, TypePredicate, TypeRef, UnionDef};
    use serde_json::json;

    fn pet_schema() -> Schema {
        SchemaBuilder::new()
            .query_type("Query")
            .add_type(TypeDef::Interface(
                InterfaceDef::new("Named")
                    .with_field(FieldDef::new("name", TypeRef::named("String"))),
            ))
            .add_type(TypeDef::Object(
                ObjectDef::new("Dog")
                    .implements("Named")
                    .with_field(FieldDef::new("name", TypeRef::named("String")))
                    .with_field(FieldDef::new("barks", TypeRef::named("Boolean"))),
            ))
            .add_type(TypeDef::Object(
                ObjectDef::new("Cat")
                    .implements("Named")
                    .with_field(FieldDef::new("name", TypeRef::named("String")))
                    .with_field(FieldDef::new("meows", TypeRef::named("Boolean"))),
            ))
            .add_type(TypeDef::Union(
                UnionDef::new("Pet")
                    .with_member("Dog")
                    .with_member("Cat")
                    .with_resolver(AbstractResolver::Predicates(vec![
                        TypePredicate::new("Dog", |v| v.get("barks").is_some()),
                        TypePredicate::new("Cat", |v| v.get("meows").is_some()),
                    ])),
            ))
            .build()
    }

    #[test]
    fn test_field_lookup() {
        let schema = pet_schema();
        assert!(schema.field_def("Dog", "barks").is_some());
        assert!(schema.field_def("Dog", "meows").is_none());
        assert!(schema.field_def("Pet", "name").is_none());
        assert!(schema.field_def("Named", "name").is_some());
    }

    #[test]
    fn test_object_satisfies() {
        let schema = pet_schema();
        assert!(schema.object_satisfies("Dog", "Dog"));
        assert!(schema.object_satisfies("Dog", "Named"));
        assert!(schema.object_satisfies("Dog", "Pet"));
        assert!(!schema.object_satisfies("Dog", "Cat"));
    }

    #[test]
    fn test_possible_types() {
        let schema = pet_schema();
        assert_eq!(schema.possible_types("Pet"), vec!["Dog", "Cat"]);
        assert_eq!(schema.possible_types("Named"), vec!["Dog", "Cat"]);
        assert!(schema.possible_types("Dog").is_empty());
    }

    #[test]
    fn test_resolve_abstract_predicates() {
        let schema = pet_schema();
        let dog = json!({"name": "Rex", "barks": true});
        assert_eq!(schema.resolve_abstract("Pet", &dog), Some("Dog".into()));
        let cat = json!({"name": "Mia", "meows": true});
        assert_eq!(schema.resolve_abstract("Pet", &cat), Some("Cat".into()));
        let neither = json!({"name": "?"});
        assert_eq!(schema.resolve_abstract("Pet", &neither), None);
    }

    #[test]
    fn test_resolve_abstract_typename_fallback() {
        let schema = pet_schema();
        let value = json!({"__typename": "Cat", "name": "Mia"});
        assert_eq!(schema.resolve_abstract("Named", &value), Some("Cat".into()));
    }

    #[test]
    fn test_coerce_leaf() {
        let schema = SchemaBuilder::new()
            .add_type(TypeDef::Scalar(ScalarDef::new("Upper").with_coercion(
                |v| {
                    v.as_str()
                        .map(|s| Value::String(s.to_uppercase()))
                        .ok_or_else(|| "expected a string".to_string())
                },
            )))
            .build();

        assert_eq!(
            schema.coerce_leaf("Upper", json!("ok")),
            Ok(json!("OK"))
        );
        assert!(schema.coerce_leaf("Upper", json!(1)).is_err());
        // Identity for built-ins without a registered coercion.
        assert_eq!(schema.coerce_leaf("Int", json!(3)), Ok(json!(3)));
    }
}
