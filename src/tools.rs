//! # Tools
//!
//! A [`Tool`] is a named, schema-described async function the model may call
//! mid-conversation. Tools are registered on a session; when a completed
//! response contains function calls, each call is resolved by exact name in the
//! session's [`ToolRegistry`], its raw argument payload is decoded against the
//! tool's declared parameters, and the handler's result is fed back to the model.
//!
//! ## Defining tools
//!
//! Untyped tools receive the decoded JSON arguments:
//!
//! ```rust
//! use structured_stream::tool;
//! use serde_json::json;
//!
//! let scale = tool("scale_recipe", "Scale ingredient quantities")
//!     .param("factor", "number")
//!     .build(|args| async move {
//!         let factor = args["factor"].as_f64().unwrap_or(1.0);
//!         Ok(json!({"factor": factor}))
//!     });
//! assert_eq!(scale.name(), "scale_recipe");
//! ```
//!
//! Typed tools derive their parameter schema from a [`Generable`] argument type
//! and receive the argument already deserialized; see [`Tool::typed`].
//!
//! ## Parameter notation
//!
//! Parameters passed to [`Tool::new`] or [`ToolBuilder::schema`] are normalized
//! to an object JSON Schema:
//!
//! - **Simple notation**: `{"minutes": "integer", "label": "string"}`
//! - **Extended notation**: `{"label": {"type": "string", "optional": true}}`
//! - **Full JSON Schema**: passed through when it has `type` and `properties`

use crate::schema::{Generable, encode_schema};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type ToolFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;
type ToolHandler = Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>;

/// A callable the model can invoke by name.
#[derive(Clone)]
pub struct Tool {
    name: String,
    description: String,
    /// Object JSON Schema of the arguments
    parameters: Value,
    handler: ToolHandler,
}

impl Tool {
    /// Create a tool from a parameter schema (any supported notation) and a
    /// handler receiving the decoded arguments.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: normalize_parameters(parameters),
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }

    /// Create a tool whose arguments are a [`Generable`] type.
    ///
    /// The parameter schema is encoded from `A`'s type description, so an
    /// invalid description fails here rather than at request time. Arguments
    /// are deserialized into `A` before the handler runs.
    ///
    /// ```rust
    /// use structured_stream::{Generable, SchemaType, Tool, TypeDescription};
    /// use serde::Deserialize;
    /// use serde_json::json;
    ///
    /// #[derive(Deserialize)]
    /// struct TimerArgs {
    ///     minutes: u32,
    /// }
    ///
    /// #[derive(Debug, Clone, PartialEq, Default, Deserialize)]
    /// #[serde(default)]
    /// struct PartialTimerArgs {
    ///     minutes: Option<u32>,
    /// }
    ///
    /// impl Generable for TimerArgs {
    ///     type Partial = PartialTimerArgs;
    ///     fn type_description() -> TypeDescription {
    ///         TypeDescription::new("TimerArgs").field("minutes", SchemaType::Integer, "")
    ///     }
    /// }
    ///
    /// let timer = Tool::typed("start_timer", "Start a kitchen timer", |args: TimerArgs| async move {
    ///     Ok(json!({"started": args.minutes}))
    /// })
    /// .unwrap();
    /// assert_eq!(timer.parameters()["required"], json!(["minutes"]));
    /// ```
    pub fn typed<A, F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: F,
    ) -> Result<Self>
    where
        A: Generable + DeserializeOwned + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let mut parameters = encode_schema::<A>()?;
        // The descriptor carries the tool name; the schema's own name is noise.
        if let Value::Object(map) = &mut parameters {
            map.remove("name");
        }

        let handler = Arc::new(handler);
        Ok(Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Arc::new(move |args| {
                let handler = handler.clone();
                Box::pin(async move {
                    let args: A = serde_json::from_value(args)
                        .map_err(|e| Error::tool(format!("invalid arguments: {}", e)))?;
                    handler(args).await
                })
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    /// Run the handler with already-decoded arguments.
    pub async fn execute(&self, arguments: Value) -> Result<Value> {
        (self.handler)(arguments).await
    }

    /// Decode a raw argument payload and run the handler.
    pub async fn invoke(&self, raw_arguments: &str) -> Result<Value> {
        let arguments = self.decode_arguments(raw_arguments)?;
        self.execute(arguments).await
    }

    /// Parse a raw payload and check it against the declared parameters.
    ///
    /// An empty payload is treated as `{}`. The payload must be an object that
    /// carries every `required` parameter.
    pub fn decode_arguments(&self, raw_arguments: &str) -> Result<Value> {
        let arguments: Value = if raw_arguments.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(raw_arguments)
                .map_err(|e| Error::tool(format!("'{}': arguments are not JSON: {}", self.name, e)))?
        };

        let Some(object) = arguments.as_object() else {
            return Err(Error::tool(format!(
                "'{}': arguments must be a JSON object",
                self.name
            )));
        };

        if let Some(required) = self.parameters.get("required").and_then(Value::as_array) {
            for key in required.iter().filter_map(Value::as_str) {
                if !object.contains_key(key) {
                    return Err(Error::tool(format!(
                        "'{}': missing required argument '{}'",
                        self.name, key
                    )));
                }
            }
        }

        Ok(arguments)
    }

    /// Wire descriptor sent in the request's `tools` array.
    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::function(&self.name, &self.description, self.parameters.clone())
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish()
    }
}

/// Wire encoding of a tool: `{name, description, type: "function", parameters}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub parameters: Value,
}

impl ToolDescriptor {
    pub fn function(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            kind: "function".to_string(),
            parameters,
        }
    }
}

/// Tools of one session, looked up by exact name.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. Names must be unique.
    pub fn register(&mut self, tool: Arc<Tool>) -> Result<()> {
        if self.get(tool.name()).is_some() {
            return Err(Error::tool(format!("tool '{}' already registered", tool.name())));
        }
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Tool>> {
        self.tools.iter()
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor()).collect()
    }
}

impl TryFrom<&[Arc<Tool>]> for ToolRegistry {
    type Error = Error;

    fn try_from(tools: &[Arc<Tool>]) -> Result<Self> {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool.clone())?;
        }
        Ok(registry)
    }
}

fn normalize_parameters(schema: Value) -> Value {
    let Value::Object(obj) = schema else {
        return serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        });
    };

    if obj.contains_key("type") && obj.contains_key("properties") {
        return Value::Object(obj);
    }

    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();

    for (param_name, param_type) in obj {
        match param_type {
            Value::String(type_str) => {
                properties.insert(param_name.clone(), type_to_json_schema(&type_str));
                required.push(param_name);
            }
            Value::Object(mut prop) => {
                let is_optional = prop
                    .remove("optional")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                let is_required = prop.remove("required").and_then(|v| v.as_bool());
                let has_default = prop.contains_key("default");

                properties.insert(param_name.clone(), Value::Object(prop));

                // Explicit required wins, then explicit optional, then a default
                // value makes the parameter optional.
                match is_required {
                    Some(true) => required.push(param_name),
                    Some(false) => {}
                    None if is_optional || has_default => {}
                    None => required.push(param_name),
                }
            }
            _ => {}
        }
    }

    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

fn type_to_json_schema(type_str: &str) -> Value {
    let json_type = match type_str {
        "string" | "str" => "string",
        "integer" | "int" | "i32" | "i64" | "u32" | "u64" => "integer",
        "number" | "float" | "f32" | "f64" => "number",
        "boolean" | "bool" => "boolean",
        "array" | "list" | "vec" => "array",
        "object" | "dict" | "map" => "object",
        // Unknown names fall back to string
        _ => "string",
    };

    serde_json::json!({ "type": json_type })
}

/// Builder for [`Tool`], usually started with [`tool()`].
pub struct ToolBuilder {
    name: String,
    description: String,
    schema: Value,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema: Value::Object(serde_json::Map::new()),
        }
    }

    /// Replace the whole parameter schema.
    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    /// Add one required parameter in simple notation (`"string"`, `"number"`, ...).
    pub fn param(mut self, name: &str, type_str: &str) -> Self {
        if let Value::Object(obj) = &mut self.schema {
            obj.insert(name.to_string(), Value::String(type_str.to_string()));
        } else {
            let mut obj = serde_json::Map::new();
            obj.insert(name.to_string(), Value::String(type_str.to_string()));
            self.schema = Value::Object(obj);
        }
        self
    }

    pub fn build<F, Fut>(self, handler: F) -> Tool
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Tool::new(self.name, self.description, self.schema, handler)
    }
}

/// Start building a tool.
pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder::new(name, description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SchemaType, TypeDescription};
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct ConvertArgs {
        grams: f64,
        unit: String,
    }

    #[derive(Debug, Clone, Default, PartialEq, Deserialize)]
    #[serde(default)]
    struct PartialConvertArgs {
        grams: Option<f64>,
        unit: Option<String>,
    }

    impl Generable for ConvertArgs {
        type Partial = PartialConvertArgs;

        fn type_description() -> TypeDescription {
            TypeDescription::new("ConvertArgs")
                .field("grams", SchemaType::Number, "Weight in grams")
                .field("unit", SchemaType::one_of(["cups", "ounces"]), "")
        }
    }

    fn convert_tool() -> Tool {
        Tool::typed("convert", "Convert grams", |args: ConvertArgs| async move {
            let factor = if args.unit == "ounces" { 0.035 } else { 0.008 };
            Ok(json!({"value": args.grams * factor, "unit": args.unit}))
        })
        .unwrap()
    }

    #[test]
    fn test_type_to_json_schema() {
        assert_eq!(type_to_json_schema("string"), json!({"type": "string"}));
        assert_eq!(type_to_json_schema("i64"), json!({"type": "integer"}));
        assert_eq!(type_to_json_schema("f32"), json!({"type": "number"}));
        assert_eq!(type_to_json_schema("bool"), json!({"type": "boolean"}));
        assert_eq!(type_to_json_schema("mystery"), json!({"type": "string"}));
    }

    #[test]
    fn test_normalize_simple_and_extended() {
        let result = normalize_parameters(json!({
            "minutes": "integer",
            "label": {"type": "string", "optional": true},
            "sound": {"type": "string", "default": "bell"},
            "repeat": {"type": "boolean", "default": false, "required": true}
        }));

        assert_eq!(result["type"], "object");
        assert_eq!(result["properties"]["minutes"]["type"], "integer");
        assert!(result["properties"]["label"].get("optional").is_none());
        assert_eq!(result["required"], json!(["minutes", "repeat"]));
    }

    #[test]
    fn test_normalize_passes_full_schema_through() {
        let schema = json!({
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "required": ["name"]
        });
        assert_eq!(normalize_parameters(schema.clone()), schema);
        assert_eq!(normalize_parameters(json!("nope"))["properties"], json!({}));
    }

    #[test]
    fn test_descriptor_round_trip() {
        let timer = tool("start_timer", "Start a kitchen timer")
            .param("minutes", "integer")
            .build(|_| async { Ok(json!({})) });

        let encoded = serde_json::to_value(timer.descriptor()).unwrap();
        assert_eq!(encoded["type"], "function");

        let decoded: ToolDescriptor = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded.name, "start_timer");
        assert_eq!(decoded.description, "Start a kitchen timer");
        assert_eq!(&decoded.parameters, timer.parameters());
    }

    #[tokio::test]
    async fn test_untyped_invoke() {
        let add = tool("add", "Add two numbers")
            .param("a", "number")
            .param("b", "number")
            .build(|args| async move {
                let a = args["a"].as_f64().unwrap_or(0.0);
                let b = args["b"].as_f64().unwrap_or(0.0);
                Ok(json!({"result": a + b}))
            });

        let result = add.invoke(r#"{"a": 5, "b": 3}"#).await.unwrap();
        assert_eq!(result["result"], 8.0);

        let missing = add.invoke(r#"{"a": 5}"#).await.unwrap_err();
        assert!(missing.to_string().contains("missing required argument 'b'"));

        assert!(add.invoke("[1, 2]").await.is_err());
        assert!(add.invoke("{\"a\": ").await.is_err());
    }

    #[tokio::test]
    async fn test_empty_arguments_are_an_empty_object() {
        let ping = tool("ping", "No arguments").build(|args| async move { Ok(args) });
        assert_eq!(ping.invoke("").await.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_typed_tool() {
        let convert = convert_tool();
        assert!(convert.parameters().get("name").is_none());
        assert_eq!(convert.parameters()["properties"]["unit"]["enum"], json!(["cups", "ounces"]));

        let result = convert
            .invoke(r#"{"grams": 100, "unit": "ounces"}"#)
            .await
            .unwrap();
        assert_eq!(result["unit"], "ounces");

        let wrong_type = convert.invoke(r#"{"grams": "lots", "unit": "cups"}"#).await;
        assert!(matches!(wrong_type, Err(Error::Tool(_))));
    }

    #[test]
    fn test_typed_tool_with_bad_schema_fails_early() {
        struct Broken;
        impl<'de> Deserialize<'de> for Broken {
            fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
                serde::de::IgnoredAny::deserialize(d).map(|_| Broken)
            }
        }
        impl Generable for Broken {
            type Partial = PartialConvertArgs;
            fn type_description() -> TypeDescription {
                TypeDescription::new("Broken").field("x", SchemaType::reference("Missing"), "")
            }
        }

        let result = Tool::typed("broken", "", |_: Broken| async { Ok(json!(null)) });
        assert!(matches!(result, Err(Error::Schema(_))));
    }

    #[test]
    fn test_registry() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(convert_tool())).unwrap();
        assert!(registry.register(Arc::new(convert_tool())).is_err());

        assert_eq!(registry.len(), 1);
        assert!(registry.get("convert").is_some());
        assert!(registry.get("Convert").is_none());
        assert_eq!(registry.descriptors()[0].name, "convert");
    }

    #[test]
    fn test_param_after_non_object_schema() {
        let t = tool("test", "Test tool")
            .schema(json!("string"))
            .param("key", "number")
            .build(|_| async { Ok(json!({})) });

        assert!(t.parameters()["properties"]["key"].is_object());
    }
}
