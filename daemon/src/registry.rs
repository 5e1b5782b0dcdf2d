//! Method registry
//!
//! Pure lookup/dispatch table: method name to handler plus a declarative
//! parameter schema. Descriptors are registered once at startup and constant
//! for the process lifetime. Validation happens here, before any handler
//! sees the params, so handlers only ever receive enumerated, bounds-checked
//! fields.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};

use gateway_common::{GatewayError, ShapeProfile};

use crate::resources::WarmResources;

/// Declared type of a parameter field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Str,
    Int,
    Bool,
    /// Array of strings, or a comma-separated string
    StrList,
}

/// One field in a method's parameter schema.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    /// Inclusive numeric bounds, for `Int` fields
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl FieldSpec {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            min: None,
            max: None,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            min: None,
            max: None,
        }
    }

    /// A bounded optional integer, e.g. `limit: int in [1,500]`.
    pub const fn bounded(name: &'static str, min: i64, max: i64) -> Self {
        Self {
            name,
            kind: FieldKind::Int,
            required: false,
            min: Some(min),
            max: Some(max),
        }
    }
}

/// Standard bound for list limits.
pub const LIMIT_MIN: i64 = 1;
pub const LIMIT_MAX: i64 = 500;

/// Parameter schema for one method. Undeclared fields are ignored, which is
/// how the shared shaping controls ride along inside `params`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParamSpec {
    pub fields: &'static [FieldSpec],
}

impl ParamSpec {
    pub const fn new(fields: &'static [FieldSpec]) -> Self {
        Self { fields }
    }

    /// Validate a params object against this schema.
    pub fn validate(&self, params: &Map<String, Value>) -> Result<(), GatewayError> {
        for field in self.fields {
            let value = params.get(field.name);
            match value {
                None | Some(Value::Null) => {
                    if field.required {
                        return Err(GatewayError::invalid_params(
                            field.name,
                            "required parameter is missing",
                        ));
                    }
                }
                Some(v) => validate_field(field, v)?,
            }
        }
        Ok(())
    }
}

fn validate_field(field: &FieldSpec, value: &Value) -> Result<(), GatewayError> {
    match field.kind {
        FieldKind::Str => match value.as_str() {
            Some(s) if !s.is_empty() => Ok(()),
            Some(_) => Err(GatewayError::invalid_params(field.name, "must not be empty")),
            None => Err(GatewayError::invalid_params(field.name, "expected a string")),
        },
        FieldKind::Bool => value
            .as_bool()
            .map(|_| ())
            .ok_or_else(|| GatewayError::invalid_params(field.name, "expected a boolean")),
        FieldKind::Int => {
            let n = value
                .as_i64()
                .ok_or_else(|| GatewayError::invalid_params(field.name, "expected an integer"))?;
            if let Some(min) = field.min {
                if n < min {
                    return Err(out_of_range(field));
                }
            }
            if let Some(max) = field.max {
                if n > max {
                    return Err(out_of_range(field));
                }
            }
            Ok(())
        }
        FieldKind::StrList => match value {
            Value::String(_) => Ok(()),
            Value::Array(items) if items.iter().all(Value::is_string) => Ok(()),
            _ => Err(GatewayError::invalid_params(
                field.name,
                "expected a string list or comma string",
            )),
        },
    }
}

fn out_of_range(field: &FieldSpec) -> GatewayError {
    GatewayError::invalid_params(
        field.name,
        format!(
            "out of range [{}, {}]",
            field.min.map(|v| v.to_string()).unwrap_or_default(),
            field.max.map(|v| v.to_string()).unwrap_or_default(),
        ),
    )
}

/// Validated params view with typed accessors for handlers.
pub struct Params<'a>(&'a Map<String, Value>);

impl<'a> Params<'a> {
    pub fn new(map: &'a Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn int_or(&self, name: &str, default: i64) -> i64 {
        self.0.get(name).and_then(Value::as_i64).unwrap_or(default)
    }
}

/// Handler seam. Handlers receive the warm resource pool by mutable
/// reference; the single-threaded accept loop guarantees exclusive access.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn call(
        &self,
        resources: &mut WarmResources,
        params: Params<'_>,
    ) -> Result<Value, GatewayError>;
}

/// How a method's result gets shaped: which result key holds the record
/// collection, and the method's field presets.
#[derive(Debug, Clone, Copy)]
pub struct Shaping {
    pub records_key: &'static str,
    pub profile: ShapeProfile,
}

/// Registry entry for one method.
pub struct MethodDescriptor {
    pub name: &'static str,
    pub params: ParamSpec,
    /// Whether the handler may mutate the backing store
    pub mutates: bool,
    pub shaping: Option<Shaping>,
    pub handler: Box<dyn MethodHandler>,
}

#[derive(Default)]
pub struct Registry {
    methods: HashMap<&'static str, MethodDescriptor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: MethodDescriptor) {
        debug_assert!(
            !self.methods.contains_key(descriptor.name),
            "duplicate method: {}",
            descriptor.name
        );
        self.methods.insert(descriptor.name, descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(name)
    }

    pub fn method_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.methods.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SPEC: ParamSpec = ParamSpec::new(&[
        FieldSpec::required("query", FieldKind::Str),
        FieldSpec::bounded("limit", LIMIT_MIN, LIMIT_MAX),
        FieldSpec::optional("since", FieldKind::Str),
    ]);

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn test_missing_required_field_names_field() {
        let err = SPEC.validate(&obj(json!({"limit": 5}))).unwrap_err();
        let details = err.to_object().details.unwrap();
        assert_eq!(details["field"], "query");
    }

    #[test]
    fn test_limit_bounds() {
        assert!(SPEC.validate(&obj(json!({"query": "q", "limit": 1}))).is_ok());
        assert!(SPEC.validate(&obj(json!({"query": "q", "limit": 500}))).is_ok());
        let err = SPEC
            .validate(&obj(json!({"query": "q", "limit": 501})))
            .unwrap_err();
        assert_eq!(err.to_object().details.unwrap()["field"], "limit");
        let err = SPEC
            .validate(&obj(json!({"query": "q", "limit": 0})))
            .unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let err = SPEC
            .validate(&obj(json!({"query": "q", "limit": "ten"})))
            .unwrap_err();
        assert!(err.to_string().contains("integer"));
        let err = SPEC.validate(&obj(json!({"query": 42}))).unwrap_err();
        assert!(err.to_string().contains("string"));
    }

    #[test]
    fn test_undeclared_fields_ignored() {
        // Shaping controls ride along undeclared.
        let params = obj(json!({"query": "q", "minimal": true, "fields": "date,text"}));
        assert!(SPEC.validate(&params).is_ok());
    }

    #[test]
    fn test_null_optional_treated_as_absent() {
        assert!(SPEC
            .validate(&obj(json!({"query": "q", "since": null})))
            .is_ok());
    }
}
