//! Catalog entries and parameter schemas.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::ToolName;
use crate::error::{Error, Result};

/// Semantic type of a tool parameter.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    /// UTF-8 text.
    String,
    /// Any JSON number.
    Number,
    /// JSON number without a fractional part.
    Integer,
    /// `true` or `false`.
    Boolean,
    /// JSON object.
    Object,
    /// JSON array.
    Array,
}

impl ParamType {
    /// Returns `true` when the JSON value conforms to this type.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }

    /// Returns the JSON Schema type keyword.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared parameter of a tool.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ParameterSpec {
    name: String,
    #[serde(rename = "type")]
    ty: ParamType,
    required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl ParameterSpec {
    /// Declares a required parameter.
    #[must_use]
    pub fn required(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
            description: None,
        }
    }

    /// Declares an optional parameter.
    #[must_use]
    pub fn optional(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: false,
            description: None,
        }
    }

    /// Attaches a human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns the parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the semantic type.
    #[must_use]
    pub const fn ty(&self) -> ParamType {
        self.ty
    }

    /// Returns whether callers must supply the parameter.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Externally visible projection of a tool: name, description, and schema.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ToolCatalogEntry {
    name: ToolName,
    description: String,
    #[serde(default)]
    parameters: Vec<ParameterSpec>,
}

impl ToolCatalogEntry {
    /// Creates an entry with no parameters.
    #[must_use]
    pub fn new(name: ToolName, description: impl Into<String>) -> Self {
        Self {
            name,
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    /// Appends a parameter declaration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if the name is blank or already
    /// declared on this entry.
    pub fn with_parameter(mut self, parameter: ParameterSpec) -> Result<Self> {
        if parameter.name.trim().is_empty() {
            return Err(Error::InvalidParameter {
                reason: format!("tool `{}` declares a parameter with an empty name", self.name),
            });
        }
        if self.parameter(&parameter.name).is_some() {
            return Err(Error::InvalidParameter {
                reason: format!(
                    "tool `{}` declares parameter `{}` twice",
                    self.name, parameter.name
                ),
            });
        }
        self.parameters.push(parameter);
        Ok(self)
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &ToolName {
        &self.name
    }

    /// Returns the description used for tool selection.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the ordered parameter declarations.
    #[must_use]
    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    /// Looks up a parameter by name.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|param| param.name == name)
    }

    /// Renders the parameters as a JSON Schema object, the shape expected by
    /// function-calling model APIs.
    #[must_use]
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.parameters {
            let mut property = Map::new();
            property.insert("type".into(), Value::from(param.ty.as_str()));
            if let Some(description) = &param.description {
                property.insert("description".into(), Value::from(description.clone()));
            }
            properties.insert(param.name.clone(), Value::Object(property));
        }

        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|param| param.required)
            .map(|param| param.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}
