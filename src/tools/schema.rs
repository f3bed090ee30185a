//! Declarative tool argument schemas.

use serde_json::{Map, Value, json};

use crate::clinical::core::errors::{ClinicalError, ClinicalResult};

/// Accepted parameter types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamType {
    /// JSON string.
    String,
    /// JSON number.
    Number,
    /// JSON array whose items are all strings.
    StringArray,
}

impl ParamType {
    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::StringArray => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
        }
    }

    fn expectation(self) -> &'static str {
        match self {
            Self::String => "must be a string",
            Self::Number => "must be a number",
            Self::StringArray => "must be an array of strings",
        }
    }

    fn json_schema(self) -> Value {
        match self {
            Self::String => json!({ "type": "string" }),
            Self::Number => json!({ "type": "number" }),
            Self::StringArray => json!({ "type": "array", "items": { "type": "string" } }),
        }
    }
}

/// One declared parameter.
#[derive(Clone, Debug)]
pub struct ParamSpec {
    /// Argument key.
    pub name: String,
    /// Expected type.
    pub param_type: ParamType,
    /// Whether the argument must be present.
    pub required: bool,
    /// Human-readable description.
    pub description: String,
}

/// Ordered parameter list for one tool.
#[derive(Clone, Debug, Default)]
pub struct ToolSchema {
    params: Vec<ParamSpec>,
}

impl ToolSchema {
    /// Schema with no parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a required parameter.
    #[must_use]
    pub fn required(self, name: &str, param_type: ParamType, description: &str) -> Self {
        self.with_param(name, param_type, true, description)
    }

    /// Append an optional parameter.
    #[must_use]
    pub fn optional(self, name: &str, param_type: ParamType, description: &str) -> Self {
        self.with_param(name, param_type, false, description)
    }

    fn with_param(
        mut self,
        name: &str,
        param_type: ParamType,
        required: bool,
        description: &str,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            param_type,
            required,
            description: description.to_string(),
        });
        self
    }

    /// Declared parameters in declaration order.
    #[must_use]
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Validate raw call arguments.
    ///
    /// `null` stands for an empty object and a `null` value for an absent key.
    /// Declared parameters are checked in order before unknown keys.
    ///
    /// # Errors
    /// Returns [`ClinicalError::InvalidArguments`] naming the first offending field.
    pub fn validate(&self, arguments: &Value) -> ClinicalResult<ToolArgs> {
        let empty = Map::new();
        let provided = match arguments {
            Value::Null => &empty,
            Value::Object(map) => map,
            _ => {
                return Err(ClinicalError::invalid_argument(
                    "arguments",
                    "must be an object",
                ));
            }
        };

        let mut accepted = Map::new();
        for spec in &self.params {
            match provided.get(&spec.name).filter(|value| !value.is_null()) {
                None if spec.required => {
                    return Err(ClinicalError::invalid_argument(&spec.name, "is required"));
                }
                None => {}
                Some(value) if !spec.param_type.accepts(value) => {
                    return Err(ClinicalError::invalid_argument(
                        &spec.name,
                        spec.param_type.expectation(),
                    ));
                }
                Some(value) => {
                    accepted.insert(spec.name.clone(), value.clone());
                }
            }
        }

        let unknown = provided
            .keys()
            .filter(|key| !self.params.iter().any(|spec| &spec.name == *key))
            .min();
        if let Some(key) = unknown {
            return Err(ClinicalError::invalid_argument(key, "is not a known argument"));
        }

        Ok(ToolArgs(accepted))
    }

    /// JSON Schema published in tool listings.
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for spec in &self.params {
            let mut schema = spec.param_type.json_schema();
            if let Value::Object(map) = &mut schema {
                map.insert(
                    "description".to_string(),
                    Value::String(spec.description.clone()),
                );
            }
            properties.insert(spec.name.clone(), schema);
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|spec| spec.required)
            .map(|spec| spec.name.as_str())
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}

/// Arguments that passed schema validation.
#[derive(Clone, Debug, Default)]
pub struct ToolArgs(Map<String, Value>);

impl ToolArgs {
    /// Required string argument.
    ///
    /// # Errors
    /// Returns [`ClinicalError::InvalidArguments`] if the argument is absent or not a string.
    pub fn str(&self, name: &str) -> ClinicalResult<&str> {
        self.opt_str(name)
            .ok_or_else(|| ClinicalError::invalid_argument(name, "is required"))
    }

    /// Optional string argument.
    #[must_use]
    pub fn opt_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Required number argument.
    ///
    /// # Errors
    /// Returns [`ClinicalError::InvalidArguments`] if the argument is absent or not a number.
    pub fn number(&self, name: &str) -> ClinicalResult<f64> {
        self.0
            .get(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| ClinicalError::invalid_argument(name, "is required"))
    }

    /// Required string list argument.
    ///
    /// # Errors
    /// Returns [`ClinicalError::InvalidArguments`] if the argument is absent or not a string list.
    pub fn string_list(&self, name: &str) -> ClinicalResult<Vec<String>> {
        let items = self
            .0
            .get(name)
            .and_then(Value::as_array)
            .ok_or_else(|| ClinicalError::invalid_argument(name, "is required"))?;
        items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    ClinicalError::invalid_argument(name, "must be an array of strings")
                })
            })
            .collect()
    }
}
