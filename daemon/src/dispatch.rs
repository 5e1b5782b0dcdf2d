//! Request dispatcher
//!
//! `dispatch(Request) -> Response` is total: every failure becomes an error
//! object in the response, nothing propagates past this boundary, and the
//! dispatcher knows nothing about sockets. It is the only component that
//! calls into the warm resources.
//!
//! `bundle` is a pseudo-method composing several registered methods into one
//! response, amortizing the fixed per-call cost of spawning a thin client.

use std::time::Instant;

use serde_json::{Map, Value};

use gateway_common::shape::{self, ShapingOptions};
use gateway_common::{GatewayError, Request, Response, PROTOCOL_VERSION};

use crate::handlers::{
    DEFAULT_MESSAGES_LIMIT, DEFAULT_RECENT_LIMIT, DEFAULT_SEARCH_LIMIT, DEFAULT_UNREAD_LIMIT,
};
use crate::registry::{
    FieldKind, FieldSpec, ParamSpec, Params, Registry, LIMIT_MAX, LIMIT_MIN,
};
use crate::resources::WarmResources;

/// Sections composed when a bundle request does not name any.
const DEFAULT_BUNDLE_SECTIONS: &[&str] = &["unread_count", "unread", "recent"];

/// Shaping controls shared across bundle sections.
const SHAPING_KEYS: &[&str] = &["minimal", "compact", "fields", "max_text_chars"];

const BUNDLE_SPEC: ParamSpec = ParamSpec::new(&[
    FieldSpec::optional("include", FieldKind::StrList),
    FieldSpec::bounded("unread_limit", LIMIT_MIN, LIMIT_MAX),
    FieldSpec::bounded("recent_limit", LIMIT_MIN, LIMIT_MAX),
    FieldSpec::bounded("search_limit", LIMIT_MIN, LIMIT_MAX),
    FieldSpec::bounded("messages_limit", LIMIT_MIN, LIMIT_MAX),
    FieldSpec::optional("query", FieldKind::Str),
    FieldSpec::optional("contact", FieldKind::Str),
    FieldSpec::optional("conversation_id", FieldKind::Int),
]);

pub struct Dispatcher {
    registry: Registry,
}

impl Dispatcher {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Handle one decoded request end to end, timing the call into
    /// `meta.server_ms`.
    pub async fn dispatch(&self, req: &Request, resources: &mut WarmResources) -> Response {
        let started = Instant::now();
        let outcome = self.dispatch_inner(req, resources).await;
        let server_ms = started.elapsed().as_secs_f64() * 1000.0;
        match outcome {
            Ok(result) => Response::success(Some(req.id.clone()), result, server_ms),
            Err(e) => {
                tracing::debug!(method = %req.method, code = %e.code(), "request failed: {}", e);
                Response::failure(Some(req.id.clone()), e.to_object(), server_ms)
            }
        }
    }

    async fn dispatch_inner(
        &self,
        req: &Request,
        resources: &mut WarmResources,
    ) -> Result<Value, GatewayError> {
        if req.version > PROTOCOL_VERSION {
            return Err(GatewayError::Protocol(format!(
                "unsupported protocol version {} (daemon speaks {})",
                req.version, PROTOCOL_VERSION
            )));
        }
        let params = match &req.params {
            Value::Object(map) => map,
            _ => {
                return Err(GatewayError::invalid_params(
                    "params",
                    "params must be an object",
                ))
            }
        };

        if req.method == "bundle" {
            self.bundle(params, resources).await
        } else {
            self.call_method(&req.method, params, resources).await
        }
    }

    /// Look up, validate, invoke, shape.
    async fn call_method(
        &self,
        method: &str,
        params: &Map<String, Value>,
        resources: &mut WarmResources,
    ) -> Result<Value, GatewayError> {
        let descriptor = self
            .registry
            .get(method)
            .ok_or_else(|| GatewayError::MethodNotFound(method.to_string()))?;

        descriptor.params.validate(params)?;

        let raw = descriptor
            .handler
            .call(resources, Params::new(params))
            .await?;

        let shaping = match descriptor.shaping {
            Some(s) => s,
            None => return Ok(raw),
        };
        let opts = ShapingOptions::from_params(&Value::Object(params.clone()))?;
        Ok(shape_result(raw, shaping.records_key, &shaping.profile, &opts))
    }

    /// Compose several methods' results into one object keyed by method
    /// name, each section shaped with the shared options.
    async fn bundle(
        &self,
        params: &Map<String, Value>,
        resources: &mut WarmResources,
    ) -> Result<Value, GatewayError> {
        BUNDLE_SPEC.validate(params)?;

        let sections: Vec<String> = match params.get("include") {
            None | Some(Value::Null) => {
                DEFAULT_BUNDLE_SECTIONS.iter().map(|s| s.to_string()).collect()
            }
            Some(v) => shape::parse_fields(v).ok_or_else(|| {
                GatewayError::invalid_params("include", "expected a list of method names")
            })?,
        };

        let mut out = Map::new();
        for section in &sections {
            if out.contains_key(section) {
                continue;
            }
            if section == "bundle" {
                return Err(GatewayError::invalid_params(
                    "include",
                    "bundle cannot include itself",
                ));
            }
            let descriptor = self
                .registry
                .get(section)
                .ok_or_else(|| GatewayError::MethodNotFound(section.clone()))?;
            if descriptor.mutates {
                return Err(GatewayError::invalid_params(
                    "include",
                    format!("mutating method '{}' cannot be bundled", section),
                ));
            }
            let section_params = section_params(section, params);
            let result = self.call_method(section, &section_params, resources).await?;
            out.insert(section.clone(), result);
        }
        Ok(Value::Object(out))
    }
}

fn shape_result(
    mut raw: Value,
    records_key: &str,
    profile: &gateway_common::ShapeProfile,
    opts: &ShapingOptions,
) -> Value {
    if let Value::Object(ref mut obj) = raw {
        if let Some(records) = obj.remove(records_key) {
            obj.insert(
                records_key.to_string(),
                shape::apply(records, profile, opts),
            );
        }
    }
    raw
}

/// Project bundle-level params onto one section's params, carrying the
/// shared shaping controls along.
fn section_params(section: &str, bundle: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for key in SHAPING_KEYS {
        if let Some(v) = bundle.get(*key) {
            out.insert((*key).to_string(), v.clone());
        }
    }
    let mut copy = |from: &str, to: &str, default: Option<i64>| {
        match bundle.get(from) {
            Some(v) if !v.is_null() => {
                out.insert(to.to_string(), v.clone());
            }
            _ => {
                if let Some(d) = default {
                    out.insert(to.to_string(), Value::from(d));
                }
            }
        };
    };
    match section {
        "unread" => copy("unread_limit", "limit", Some(DEFAULT_UNREAD_LIMIT)),
        "recent" => copy("recent_limit", "limit", Some(DEFAULT_RECENT_LIMIT)),
        "search" => {
            copy("query", "query", None);
            copy("search_limit", "limit", Some(DEFAULT_SEARCH_LIMIT));
        }
        "messages" => {
            copy("contact", "contact", None);
            copy("messages_limit", "limit", Some(DEFAULT_MESSAGES_LIMIT));
        }
        "thread" => copy("conversation_id", "conversation_id", None),
        _ => {}
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::build_registry;
    use crate::store::testutil::seed;
    use gateway_common::ErrorCode;
    use serde_json::json;

    fn fixture(n: i64) -> (Dispatcher, WarmResources) {
        let mut resources = WarmResources::in_memory();
        seed(&mut resources.store, n);
        (Dispatcher::new(build_registry()), resources)
    }

    fn request(method: &str, params: Value) -> Request {
        Request::new(method, params)
    }

    #[tokio::test]
    async fn test_unknown_method_is_method_not_found() {
        let (dispatcher, mut res) = fixture(1);
        let req = request("no_such_method", json!({}));
        let resp = dispatcher.dispatch(&req, &mut res).await;
        assert!(!resp.ok);
        assert!(resp.result.is_none());
        let err = resp.error.unwrap();
        assert_eq!(err.code, ErrorCode::MethodNotFound);
        assert_eq!(resp.id.as_deref(), Some(req.id.as_str()));
    }

    #[tokio::test]
    async fn test_missing_required_param_names_field() {
        let (dispatcher, mut res) = fixture(1);
        let resp = dispatcher
            .dispatch(&request("search", json!({"limit": 5})), &mut res)
            .await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, ErrorCode::InvalidParams);
        assert_eq!(err.details.unwrap()["field"], "query");
    }

    #[tokio::test]
    async fn test_out_of_range_limit_rejected() {
        let (dispatcher, mut res) = fixture(1);
        let resp = dispatcher
            .dispatch(&request("unread", json!({"limit": 501})), &mut res)
            .await;
        assert_eq!(resp.error.unwrap().code, ErrorCode::InvalidParams);
    }

    #[tokio::test]
    async fn test_newer_protocol_version_rejected() {
        let (dispatcher, mut res) = fixture(1);
        let mut req = request("health", json!({}));
        req.version = PROTOCOL_VERSION + 1;
        let resp = dispatcher.dispatch(&req, &mut res).await;
        assert_eq!(resp.error.unwrap().code, ErrorCode::ProtocolError);
    }

    #[tokio::test]
    async fn test_non_object_params_rejected() {
        let (dispatcher, mut res) = fixture(1);
        let mut req = request("health", json!({}));
        req.params = json!([1, 2]);
        let resp = dispatcher.dispatch(&req, &mut res).await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, ErrorCode::InvalidParams);
        assert_eq!(err.details.unwrap()["field"], "params");
    }

    #[tokio::test]
    async fn test_success_envelope_and_timing() {
        let (dispatcher, mut res) = fixture(2);
        let resp = dispatcher
            .dispatch(&request("unread_count", json!({})), &mut res)
            .await;
        assert!(resp.ok);
        assert!(resp.error.is_none());
        assert_eq!(resp.result.unwrap()["count"], 2);
        assert!(resp.meta.server_ms >= 0.0);
        assert_eq!(resp.meta.protocol_version, PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn test_shaping_applied_through_dispatch() {
        let (dispatcher, mut res) = fixture(3);
        let resp = dispatcher
            .dispatch(
                &request("unread", json!({"minimal": true, "max_text_chars": 10})),
                &mut res,
            )
            .await;
        let messages = resp.result.unwrap()["messages"].clone();
        let first = messages[0].as_object().unwrap();
        let keys: Vec<&str> = first.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["date", "contact", "text"]);
        assert!(first["text"].as_str().unwrap().ends_with("..."));
    }

    #[tokio::test]
    async fn test_thread_not_found() {
        let (dispatcher, mut res) = fixture(1);
        let resp = dispatcher
            .dispatch(&request("thread", json!({"conversation_id": 404})), &mut res)
            .await;
        assert_eq!(resp.error.unwrap().code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_mark_read_mutates_store() {
        let (dispatcher, mut res) = fixture(2);
        let resp = dispatcher
            .dispatch(
                &request("mark_read", json!({"contact": "+15550000001"})),
                &mut res,
            )
            .await;
        assert_eq!(resp.result.unwrap()["updated"], 1);
        let resp = dispatcher
            .dispatch(&request("unread_count", json!({})), &mut res)
            .await;
        assert_eq!(resp.result.unwrap()["count"], 1);
    }

    #[tokio::test]
    async fn test_bundle_matches_individual_results() {
        let (dispatcher, mut res) = fixture(5);
        let shared = json!({
            "include": ["unread_count", "unread", "recent"],
            "unread_limit": 3,
            "recent_limit": 2,
            "minimal": true,
        });
        let bundle = dispatcher
            .dispatch(&request("bundle", shared), &mut res)
            .await
            .result
            .unwrap();

        let obj = bundle.as_object().unwrap();
        assert_eq!(obj.len(), 3);

        let unread_count = dispatcher
            .dispatch(&request("unread_count", json!({})), &mut res)
            .await
            .result
            .unwrap();
        let unread = dispatcher
            .dispatch(&request("unread", json!({"limit": 3, "minimal": true})), &mut res)
            .await
            .result
            .unwrap();
        let recent = dispatcher
            .dispatch(&request("recent", json!({"limit": 2, "minimal": true})), &mut res)
            .await
            .result
            .unwrap();

        assert_eq!(obj["unread_count"], unread_count);
        assert_eq!(obj["unread"], unread);
        assert_eq!(obj["recent"], recent);
    }

    #[tokio::test]
    async fn test_bundle_rejects_mutating_section() {
        let (dispatcher, mut res) = fixture(1);
        let resp = dispatcher
            .dispatch(
                &request("bundle", json!({"include": ["unread_count", "mark_read"]})),
                &mut res,
            )
            .await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, ErrorCode::InvalidParams);
        assert_eq!(err.details.unwrap()["field"], "include");
    }

    #[tokio::test]
    async fn test_bundle_unknown_section_is_method_not_found() {
        let (dispatcher, mut res) = fixture(1);
        let resp = dispatcher
            .dispatch(&request("bundle", json!({"include": ["nope"]})), &mut res)
            .await;
        assert_eq!(resp.error.unwrap().code, ErrorCode::MethodNotFound);
    }

    #[tokio::test]
    async fn test_bundle_search_requires_query() {
        let (dispatcher, mut res) = fixture(1);
        let resp = dispatcher
            .dispatch(&request("bundle", json!({"include": ["search"]})), &mut res)
            .await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, ErrorCode::InvalidParams);
        assert_eq!(err.details.unwrap()["field"], "query");
    }
}
