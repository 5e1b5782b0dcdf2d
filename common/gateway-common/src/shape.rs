//! Output shaping
//!
//! Post-processes record collections into size-bounded representations so a
//! token-budgeted consumer pays only for the fields it needs. Shaping is
//! deterministic, never drops or reorders records, and only removes or
//! truncates fields within a record.

use serde_json::{Map, Value};

use crate::error::GatewayError;

/// Marker appended to truncated string fields.
pub const TRUNCATION_MARKER: &str = "...";

/// Implied truncation bounds when `max_text_chars` is not set explicitly.
const COMPACT_MAX_TEXT_CHARS: usize = 200;
const MINIMAL_MAX_TEXT_CHARS: usize = 120;

/// Shaping controls carried inside `params` of record-returning methods.
///
/// Precedence: an explicit `fields` allowlist wins over any preset; otherwise
/// `minimal` selects the method's minimal preset, and `compact` the method's
/// default preset. The daemon always emits compact JSON on the wire, so
/// `compact` only affects field selection and the implied truncation bound.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapingOptions {
    pub minimal: bool,
    pub compact: bool,
    pub fields: Option<Vec<String>>,
    pub max_text_chars: Option<usize>,
}

impl ShapingOptions {
    /// Extract shaping controls from a params object, validating types.
    pub fn from_params(params: &Value) -> Result<Self, GatewayError> {
        let obj = match params {
            Value::Object(obj) => obj,
            _ => return Ok(Self::default()),
        };

        let minimal = read_bool(obj, "minimal")?;
        let compact = read_bool(obj, "compact")?;

        let fields = match obj.get("fields") {
            None | Some(Value::Null) => None,
            Some(v) => parse_fields(v)
                .ok_or_else(|| {
                    GatewayError::invalid_params("fields", "expected a string list or comma string")
                })
                .map(Some)?,
        };

        let max_text_chars = match obj.get("max_text_chars") {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => match n.as_u64() {
                Some(k) => Some(k as usize),
                None => {
                    return Err(GatewayError::invalid_params(
                        "max_text_chars",
                        "expected a non-negative integer",
                    ))
                }
            },
            Some(_) => {
                return Err(GatewayError::invalid_params(
                    "max_text_chars",
                    "expected a non-negative integer",
                ))
            }
        };

        Ok(Self {
            minimal,
            compact,
            fields,
            max_text_chars,
        })
    }

    /// Effective truncation bound, applying the preset-implied defaults.
    fn effective_max_text_chars(&self) -> Option<usize> {
        self.max_text_chars.or(if self.compact {
            Some(COMPACT_MAX_TEXT_CHARS)
        } else if self.minimal {
            Some(MINIMAL_MAX_TEXT_CHARS)
        } else {
            None
        })
    }
}

fn read_bool(obj: &Map<String, Value>, key: &str) -> Result<bool, GatewayError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(GatewayError::invalid_params(key, "expected a boolean")),
    }
}

/// Parse a `fields` allowlist from either a JSON array of strings or a
/// comma-separated string. Empty entries are dropped; an empty list is `None`.
pub fn parse_fields(value: &Value) -> Option<Vec<String>> {
    let items: Vec<String> = match value {
        Value::String(s) => s
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        Value::Array(arr) => {
            let mut out = Vec::with_capacity(arr.len());
            for item in arr {
                match item {
                    Value::String(s) if !s.trim().is_empty() => out.push(s.trim().to_string()),
                    Value::String(_) => {}
                    _ => return None,
                }
            }
            out
        }
        _ => return None,
    };
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

/// Per-method field presets.
///
/// `minimal_fields` is the smallest useful projection; `default_fields` is
/// the method's full default record shape, used by `compact`.
#[derive(Debug, Clone, Copy)]
pub struct ShapeProfile {
    pub minimal_fields: &'static [&'static str],
    pub default_fields: &'static [&'static str],
}

/// Shape a raw result in place: a list of records, or a single record.
///
/// Field projection runs first so truncation never wastes work on a dropped
/// field; truncation then bounds every remaining string field.
pub fn apply(value: Value, profile: &ShapeProfile, opts: &ShapingOptions) -> Value {
    let effective: Option<Vec<&str>> = if let Some(ref fields) = opts.fields {
        Some(fields.iter().map(String::as_str).collect())
    } else if opts.minimal {
        Some(profile.minimal_fields.to_vec())
    } else if opts.compact {
        Some(profile.default_fields.to_vec())
    } else {
        None
    };
    let max_chars = opts.effective_max_text_chars();

    match value {
        Value::Array(records) => Value::Array(
            records
                .into_iter()
                .map(|rec| match rec {
                    Value::Object(obj) => shape_record(obj, effective.as_deref(), max_chars),
                    other => other,
                })
                .collect(),
        ),
        Value::Object(obj) => shape_record(obj, effective.as_deref(), max_chars),
        other => other,
    }
}

fn shape_record(rec: Map<String, Value>, fields: Option<&[&str]>, max_chars: Option<usize>) -> Value {
    let mut out = match fields {
        Some(allow) => {
            let mut projected = Map::new();
            for key in allow {
                if let Some(v) = rec.get(*key) {
                    projected.insert((*key).to_string(), v.clone());
                }
            }
            projected
        }
        None => rec,
    };

    if let Some(k) = max_chars {
        for (_, v) in out.iter_mut() {
            if let Value::String(s) = v {
                if s.chars().count() > k {
                    *v = Value::String(truncate_chars(s, k));
                }
            }
        }
    }

    Value::Object(out)
}

/// First `k` characters plus the truncation marker. Character-based, so
/// multibyte text never splits mid-codepoint.
pub fn truncate_chars(s: &str, k: usize) -> String {
    let mut out: String = s.chars().take(k).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}
