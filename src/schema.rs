//! Schema encoding for structured generation.
//!
//! A result type describes its shape declaratively with a [`TypeDescription`]:
//! a named object with ordered fields, each field carrying a [`SchemaType`],
//! an optional description and an optionality flag. [`SchemaEncoder`] turns that
//! description into the JSON Schema document sent with every request.
//!
//! Named types can refer to each other through [`SchemaType::Reference`]. The
//! encoder inlines references, so recursive shapes cannot be expressed; a cycle
//! is reported as [`Error::Schema`] before any network activity happens.
//!
//! ```rust
//! use structured_stream::{SchemaEncoder, SchemaType, TypeDescription};
//!
//! let recipe = TypeDescription::new("Recipe")
//!     .description("A cooking recipe")
//!     .field("title", SchemaType::String, "Name of the dish")
//!     .optional_field("servings", SchemaType::Integer, "How many people it feeds")
//!     .field("steps", SchemaType::array(SchemaType::String), "Ordered steps");
//!
//! let schema = SchemaEncoder::new().encode(&recipe).unwrap();
//! assert_eq!(schema["name"], "Recipe");
//! assert_eq!(schema["required"], serde_json::json!(["title", "steps"]));
//! ```

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashSet};

/// The type of a single field in a [`TypeDescription`].
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaType {
    String,
    Number,
    Integer,
    Boolean,
    /// A string restricted to the listed values.
    Enum(Vec<String>),
    Array(Box<SchemaType>),
    /// An inline nested object.
    Object(TypeDescription),
    /// A named type registered with [`SchemaEncoder::define`].
    Reference(String),
}

impl SchemaType {
    /// Shorthand for `SchemaType::Array(Box::new(items))`.
    pub fn array(items: SchemaType) -> Self {
        SchemaType::Array(Box::new(items))
    }

    /// Shorthand for a reference to a named type.
    pub fn reference(name: impl Into<String>) -> Self {
        SchemaType::Reference(name.into())
    }

    /// String enum from any iterator of values.
    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SchemaType::Enum(values.into_iter().map(Into::into).collect())
    }
}

/// One named field of an object type.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: SchemaType,
    pub description: Option<String>,
    pub optional: bool,
}

/// Declarative description of an object-shaped result type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescription {
    pub name: String,
    pub description: Option<String>,
    pub fields: Vec<Field>,
}

impl TypeDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a required field.
    pub fn field(
        mut self,
        name: impl Into<String>,
        ty: SchemaType,
        description: impl Into<String>,
    ) -> Self {
        self.fields.push(Field {
            name: name.into(),
            ty,
            description: non_empty(description.into()),
            optional: false,
        });
        self
    }

    /// Add a field the model may omit.
    pub fn optional_field(
        mut self,
        name: impl Into<String>,
        ty: SchemaType,
        description: impl Into<String>,
    ) -> Self {
        self.fields.push(Field {
            name: name.into(),
            ty,
            description: non_empty(description.into()),
            optional: true,
        });
        self
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

/// A result type that can be requested from the model.
///
/// `Partial` is the caller-visible projection of an in-progress result: every
/// field optional, absent fields left unset. It is decoded from whatever JSON
/// has been parsed so far, so it must tolerate missing keys
/// (`#[serde(default)]` on the struct, `Option` on every field).
pub trait Generable {
    type Partial: DeserializeOwned + Clone + PartialEq + std::fmt::Debug + Send + 'static;

    /// Shape of the complete value.
    fn type_description() -> TypeDescription;

    /// Named types referenced from [`type_description`](Generable::type_description).
    fn definitions() -> Vec<TypeDescription> {
        Vec::new()
    }
}

/// Encode the JSON Schema of a [`Generable`] type.
pub fn encode_schema<T: Generable>() -> Result<Value> {
    let mut encoder = SchemaEncoder::new();
    for definition in T::definitions() {
        encoder = encoder.define(definition);
    }
    encoder.encode(&T::type_description())
}

/// Converts [`TypeDescription`]s into JSON Schema documents.
///
/// Output is deterministic: the same description always produces the same
/// document. Object property maps are key-ordered and `required` follows the
/// declaration order of the fields.
#[derive(Debug, Clone, Default)]
pub struct SchemaEncoder {
    definitions: BTreeMap<String, TypeDescription>,
}

impl SchemaEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named type that [`SchemaType::Reference`] can point at.
    pub fn define(mut self, description: TypeDescription) -> Self {
        self.definitions
            .insert(description.name.clone(), description);
        self
    }

    /// Encode `root` as a top-level schema document carrying its `name`.
    pub fn encode(&self, root: &TypeDescription) -> Result<Value> {
        let mut visiting = Vec::new();
        let mut schema = self.encode_object(root, &mut visiting)?;
        if let Value::Object(map) = &mut schema {
            map.insert("name".to_string(), Value::String(root.name.clone()));
        }
        Ok(schema)
    }

    fn encode_object(
        &self,
        description: &TypeDescription,
        visiting: &mut Vec<String>,
    ) -> Result<Value> {
        if description.name.trim().is_empty() {
            return Err(Error::schema("object type without a name"));
        }
        if visiting.contains(&description.name) {
            return Err(Error::schema(format!(
                "cyclic reference to '{}' ({})",
                description.name,
                visiting.join(" -> ")
            )));
        }
        visiting.push(description.name.clone());

        let mut properties = Map::new();
        let mut required = Vec::new();
        let mut seen = HashSet::new();

        for field in &description.fields {
            if field.name.is_empty() {
                return Err(Error::schema(format!(
                    "'{}' has a field without a name",
                    description.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(Error::schema(format!(
                    "'{}' declares field '{}' twice",
                    description.name, field.name
                )));
            }

            let mut property = self.encode_type(&field.ty, visiting)?;
            if let (Some(text), Value::Object(map)) = (&field.description, &mut property) {
                map.insert("description".to_string(), Value::String(text.clone()));
            }
            properties.insert(field.name.clone(), property);

            if !field.optional {
                required.push(Value::String(field.name.clone()));
            }
        }

        visiting.pop();

        let mut schema = Map::new();
        schema.insert("type".to_string(), json!("object"));
        if let Some(text) = &description.description {
            schema.insert("description".to_string(), Value::String(text.clone()));
        }
        schema.insert("properties".to_string(), Value::Object(properties));
        schema.insert("required".to_string(), Value::Array(required));
        schema.insert("additionalProperties".to_string(), json!(false));
        Ok(Value::Object(schema))
    }

    fn encode_type(&self, ty: &SchemaType, visiting: &mut Vec<String>) -> Result<Value> {
        match ty {
            SchemaType::String => Ok(json!({"type": "string"})),
            SchemaType::Number => Ok(json!({"type": "number"})),
            SchemaType::Integer => Ok(json!({"type": "integer"})),
            SchemaType::Boolean => Ok(json!({"type": "boolean"})),
            SchemaType::Enum(values) => {
                if values.is_empty() {
                    return Err(Error::schema("enum without values"));
                }
                Ok(json!({"type": "string", "enum": values}))
            }
            SchemaType::Array(items) => {
                let items = self.encode_type(items, visiting)?;
                Ok(json!({"type": "array", "items": items}))
            }
            SchemaType::Object(description) => self.encode_object(description, visiting),
            SchemaType::Reference(name) => {
                let description = self
                    .definitions
                    .get(name)
                    .ok_or_else(|| Error::schema(format!("unknown type reference '{}'", name)))?;
                self.encode_object(description, visiting)
            }
        }
    }
}
