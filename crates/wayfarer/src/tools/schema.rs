use schemars::gen::SchemaGenerator;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use strum_macros::{Display, EnumString};

/// The primitive parameter types a tool schema can declare
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ParamType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    /// Map a JSON Schema type name, falling back to string for anything unknown
    pub fn from_json_type(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub kind: ParamType,
    pub description: String,
    pub required: bool,
}

/// Parameter schema for a tool, rendered as a JSON-Schema-like object
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolSchema {
    params: Vec<Param>,
}

impl ToolSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter that must always be supplied
    pub fn required<N: Into<String>, D: Into<String>>(
        self,
        name: N,
        kind: ParamType,
        description: D,
    ) -> Self {
        self.param(name.into(), kind, description.into(), true)
    }

    /// Add a parameter that has a default on the handler side
    pub fn optional<N: Into<String>, D: Into<String>>(
        self,
        name: N,
        kind: ParamType,
        description: D,
    ) -> Self {
        self.param(name.into(), kind, description.into(), false)
    }

    fn param(mut self, name: String, kind: ParamType, description: String, required: bool) -> Self {
        let param = Param {
            name,
            kind,
            description,
            required,
        };
        match self.params.iter_mut().find(|p| p.name == param.name) {
            Some(existing) => *existing = param,
            None => self.params.push(param),
        }
        self
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Derive the schema from an argument struct in a single reflection pass.
    ///
    /// Fields that are `Option` or carry `#[serde(default)]` are optional, everything
    /// else is required. Doc comments become parameter descriptions.
    pub fn derive<T: JsonSchema>() -> Self {
        let root = SchemaGenerator::default().into_root_schema_for::<T>();
        match serde_json::to_value(root) {
            Ok(value) => Self::from_json_schema(&value),
            Err(_) => Self::default(),
        }
    }

    /// Reduce an arbitrary JSON Schema object to the supported parameter types
    pub fn from_json_schema(schema: &Value) -> Self {
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut result = Self::default();
        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (name, property) in properties {
                let description = property
                    .get("description")
                    .and_then(Value::as_str)
                    .map(String::from)
                    .unwrap_or_else(|| format!("Parameter {}", name));
                result = result.param(
                    name.clone(),
                    property_type(property),
                    description,
                    required.contains(&name.as_str()),
                );
            }
        }
        result
    }

    pub fn to_value(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.params {
            properties.insert(
                param.name.clone(),
                json!({
                    "type": param.kind,
                    "description": param.description,
                }),
            );
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

fn property_type(property: &Value) -> ParamType {
    match property.get("type") {
        Some(Value::String(name)) => return ParamType::from_json_type(name),
        Some(Value::Array(names)) => {
            if let Some(name) = names.iter().filter_map(Value::as_str).find(|n| *n != "null") {
                return ParamType::from_json_type(name);
            }
        }
        _ => {}
    }

    if property.get("$ref").is_some() {
        return ParamType::Object;
    }

    // Nullable nested types come through as a union with null
    for key in ["anyOf", "oneOf", "allOf"] {
        if let Some(variants) = property.get(key).and_then(Value::as_array) {
            if let Some(variant) = variants
                .iter()
                .find(|v| v.get("type").and_then(Value::as_str) != Some("null"))
            {
                return property_type(variant);
            }
        }
    }

    ParamType::default()
}
