//! Method handlers and registry wiring
//!
//! One handler per registered method. Handlers assume validated params (the
//! registry enforces the schema first) and return raw results; shaping is
//! applied by the dispatcher according to each descriptor's profile.

use async_trait::async_trait;
use serde_json::{json, Value};

use gateway_common::{GatewayError, ShapeProfile, PROTOCOL_VERSION};

use crate::registry::{
    FieldKind, FieldSpec, MethodDescriptor, MethodHandler, ParamSpec, Params, Registry, Shaping,
    LIMIT_MAX, LIMIT_MIN,
};
use crate::resources::WarmResources;

pub const DEFAULT_UNREAD_LIMIT: i64 = 20;
pub const DEFAULT_RECENT_LIMIT: i64 = 10;
pub const DEFAULT_SEARCH_LIMIT: i64 = 20;
pub const DEFAULT_MESSAGES_LIMIT: i64 = 20;

const MESSAGE_PROFILE: ShapeProfile = ShapeProfile {
    minimal_fields: &["date", "contact", "text"],
    default_fields: &["date", "contact", "display_name", "text", "days_old", "conversation_id"],
};

const CONVERSATION_PROFILE: ShapeProfile = ShapeProfile {
    minimal_fields: &["date", "contact", "text"],
    default_fields: &["date", "contact", "display_name", "text", "unread", "conversation_id"],
};

const SEARCH_PROFILE: ShapeProfile = ShapeProfile {
    minimal_fields: &["date", "contact", "text", "match_snippet"],
    default_fields: &["date", "contact", "is_from_me", "text", "match_snippet", "conversation_id"],
};

const CONTACT_PROFILE: ShapeProfile = ShapeProfile {
    minimal_fields: &["date", "text"],
    default_fields: &["date", "is_from_me", "text", "conversation_id"],
};

const LIMIT_ONLY_SPEC: ParamSpec =
    ParamSpec::new(&[FieldSpec::bounded("limit", LIMIT_MIN, LIMIT_MAX)]);

const SEARCH_SPEC: ParamSpec = ParamSpec::new(&[
    FieldSpec::required("query", FieldKind::Str),
    FieldSpec::bounded("limit", LIMIT_MIN, LIMIT_MAX),
    FieldSpec::optional("since", FieldKind::Str),
]);

const MESSAGES_SPEC: ParamSpec = ParamSpec::new(&[
    FieldSpec::required("contact", FieldKind::Str),
    FieldSpec::bounded("limit", LIMIT_MIN, LIMIT_MAX),
]);

const THREAD_SPEC: ParamSpec =
    ParamSpec::new(&[FieldSpec::required("conversation_id", FieldKind::Int)]);

const MARK_READ_SPEC: ParamSpec =
    ParamSpec::new(&[FieldSpec::required("contact", FieldKind::Str)]);

struct Health;

#[async_trait]
impl MethodHandler for Health {
    async fn call(
        &self,
        resources: &mut WarmResources,
        _params: Params<'_>,
    ) -> Result<Value, GatewayError> {
        Ok(json!({
            "pid": std::process::id(),
            "started_at": resources.started_at.to_rfc3339(),
            "protocol_version": PROTOCOL_VERSION,
            "socket": resources.socket_path.display().to_string(),
            "resources": resources.probe_all(),
        }))
    }
}

struct UnreadCount;

#[async_trait]
impl MethodHandler for UnreadCount {
    async fn call(
        &self,
        resources: &mut WarmResources,
        _params: Params<'_>,
    ) -> Result<Value, GatewayError> {
        Ok(json!({ "count": resources.store.unread_count()? }))
    }
}

struct Unread;

#[async_trait]
impl MethodHandler for Unread {
    async fn call(
        &self,
        resources: &mut WarmResources,
        params: Params<'_>,
    ) -> Result<Value, GatewayError> {
        let limit = params.int_or("limit", DEFAULT_UNREAD_LIMIT);
        Ok(json!({ "messages": resources.store.unread_messages(limit)? }))
    }
}

struct Recent;

#[async_trait]
impl MethodHandler for Recent {
    async fn call(
        &self,
        resources: &mut WarmResources,
        params: Params<'_>,
    ) -> Result<Value, GatewayError> {
        let limit = params.int_or("limit", DEFAULT_RECENT_LIMIT);
        Ok(json!({ "conversations": resources.store.recent_conversations(limit)? }))
    }
}

struct Search;

#[async_trait]
impl MethodHandler for Search {
    async fn call(
        &self,
        resources: &mut WarmResources,
        params: Params<'_>,
    ) -> Result<Value, GatewayError> {
        // `query` is required by the schema; absence cannot reach here.
        let query = params.str("query").unwrap_or_default();
        let limit = params.int_or("limit", DEFAULT_SEARCH_LIMIT);
        let results = resources.store.search(query, limit, params.str("since"))?;
        Ok(json!({ "results": results }))
    }
}

struct Messages;

#[async_trait]
impl MethodHandler for Messages {
    async fn call(
        &self,
        resources: &mut WarmResources,
        params: Params<'_>,
    ) -> Result<Value, GatewayError> {
        let contact = params.str("contact").unwrap_or_default();
        let limit = params.int_or("limit", DEFAULT_MESSAGES_LIMIT);
        Ok(json!({ "messages": resources.store.messages_by_contact(contact, limit)? }))
    }
}

struct Thread;

#[async_trait]
impl MethodHandler for Thread {
    async fn call(
        &self,
        resources: &mut WarmResources,
        params: Params<'_>,
    ) -> Result<Value, GatewayError> {
        let id = params.int_or("conversation_id", -1);
        match resources.store.conversation_detail(id)? {
            Some(detail) => Ok(json!({ "conversation": detail })),
            None => Err(GatewayError::NotFound(format!("conversation {}", id))),
        }
    }
}

struct MarkRead;

#[async_trait]
impl MethodHandler for MarkRead {
    async fn call(
        &self,
        resources: &mut WarmResources,
        params: Params<'_>,
    ) -> Result<Value, GatewayError> {
        let contact = params.str("contact").unwrap_or_default();
        let updated = resources.store.mark_read(contact)?;
        Ok(json!({ "contact": contact, "updated": updated }))
    }
}

/// Build the full method table. Registered once at startup; constant for the
/// process lifetime.
pub fn build_registry() -> Registry {
    let mut registry = Registry::new();

    registry.register(MethodDescriptor {
        name: "health",
        params: ParamSpec::default(),
        mutates: false,
        shaping: None,
        handler: Box::new(Health),
    });

    registry.register(MethodDescriptor {
        name: "unread_count",
        params: ParamSpec::default(),
        mutates: false,
        shaping: None,
        handler: Box::new(UnreadCount),
    });

    registry.register(MethodDescriptor {
        name: "unread",
        params: LIMIT_ONLY_SPEC,
        mutates: false,
        shaping: Some(Shaping {
            records_key: "messages",
            profile: MESSAGE_PROFILE,
        }),
        handler: Box::new(Unread),
    });

    registry.register(MethodDescriptor {
        name: "recent",
        params: LIMIT_ONLY_SPEC,
        mutates: false,
        shaping: Some(Shaping {
            records_key: "conversations",
            profile: CONVERSATION_PROFILE,
        }),
        handler: Box::new(Recent),
    });

    registry.register(MethodDescriptor {
        name: "search",
        params: SEARCH_SPEC,
        mutates: false,
        shaping: Some(Shaping {
            records_key: "results",
            profile: SEARCH_PROFILE,
        }),
        handler: Box::new(Search),
    });

    registry.register(MethodDescriptor {
        name: "messages",
        params: MESSAGES_SPEC,
        mutates: false,
        shaping: Some(Shaping {
            records_key: "messages",
            profile: CONTACT_PROFILE,
        }),
        handler: Box::new(Messages),
    });

    registry.register(MethodDescriptor {
        name: "thread",
        params: THREAD_SPEC,
        mutates: false,
        shaping: Some(Shaping {
            records_key: "conversation",
            profile: CONVERSATION_PROFILE,
        }),
        handler: Box::new(Thread),
    });

    registry.register(MethodDescriptor {
        name: "mark_read",
        params: MARK_READ_SPEC,
        mutates: true,
        shaping: None,
        handler: Box::new(MarkRead),
    });

    registry
}
