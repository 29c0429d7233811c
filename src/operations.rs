//! Static registry of the Agent700 operations a work unit can invoke.
//!
//! Each `(resource, verb)` pair maps to exactly one [`OperationSpec`]: HTTP
//! method, path, JSON body and how the response is turned into output items.

use reqwest::Method;
use serde_json::{json, Map, Value};

use crate::{
    auth::Session,
    core::require_field,
    errors::{Error, Result},
    transport::HttpRequest,
    types::UnitParams,
};

const ENTRY_FAILURE_HINT: &str = "Check required parameters and ensure your App Password is valid.";
const CHAT_FAILURE_HINT: &str =
    "Check your App Password and ensure the Agent ID is valid if provided.";
const PATTERN_HINT: &str = "Provide a pattern to match keys (e.g., links.*).";

/// How a raw response becomes output items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// The response body as-is.
    Passthrough,
    /// One item per array element, or the body itself when it is not an array.
    FanOutArray,
    /// Reduced chat payload, see [`simplify_chat`].
    SimplifyChat,
    /// `{"deleted": true, "key": <key>}`, ignoring the body.
    WrapDeleted,
    /// `{"pattern": <pattern>, "result": <body>}`.
    WrapPatternResult,
}

impl ResponseShape {
    pub fn apply(self, raw: Value, params: &UnitParams) -> Vec<Value> {
        match self {
            ResponseShape::Passthrough => vec![raw],
            ResponseShape::FanOutArray => match raw {
                Value::Array(items) => items,
                other => vec![other],
            },
            ResponseShape::SimplifyChat => vec![simplify_chat(&raw)],
            ResponseShape::WrapDeleted => vec![json!({
                "deleted": true,
                "key": params.key.clone().unwrap_or_default(),
            })],
            ResponseShape::WrapPatternResult => vec![json!({
                "pattern": params.pattern.clone().unwrap_or_default(),
                "result": raw,
            })],
        }
    }
}

/// Keep `response`, `finish_reason`, `scrubbed_message`, `error` and the token counts.
///
/// The three string fields and `error` become `null` when missing. `response`
/// and the token counts are only copied when the server sent them.
pub fn simplify_chat(raw: &Value) -> Value {
    let mut out = Map::new();
    if let Some(response) = raw.get("response") {
        out.insert("response".into(), response.clone());
    }
    for field in ["finish_reason", "scrubbed_message", "error"] {
        let value = raw.get(field).cloned().unwrap_or(Value::Null);
        out.insert(field.into(), value);
    }
    for field in ["prompt_tokens", "completion_tokens"] {
        if let Some(value) = raw.get(field) {
            out.insert(field.into(), value.clone());
        }
    }
    Value::Object(out)
}

/// Percent-encode like JavaScript's `encodeURIComponent`.
pub fn encode_uri_component(raw: &str) -> String {
    // urlencoding escapes everything but `A-Za-z0-9-_.~`; the browser encoder also keeps `!'()*`.
    urlencoding::encode(raw)
        .replace("%21", "!")
        .replace("%27", "'")
        .replace("%28", "(")
        .replace("%29", ")")
        .replace("%2A", "*")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    ChatSendMessage,
    EntryGet,
    EntryGetMany,
    EntryCreate,
    EntryUpsert,
    EntryUpdate,
    EntryDelete,
    EntryQuery,
    EntryQueryConstruct,
}

/// Request template for one `(resource, verb)` pair.
#[derive(Debug)]
pub struct OperationSpec {
    pub resource: &'static str,
    pub verb: &'static str,
    pub kind: OperationKind,
    pub method: Method,
    /// Human label used in item errors, e.g. `Entry:Query + Construct`.
    pub label: &'static str,
    /// Remediation for a missing required parameter.
    pub validation_hint: &'static str,
    /// Remediation for any other failure.
    pub failure_hint: &'static str,
}

impl OperationSpec {
    /// Check the parameters this operation requires.
    pub fn validate(&self, params: &UnitParams) -> Result<()> {
        use OperationKind::*;
        match self.kind {
            ChatSendMessage => {
                require_field(params.message.as_deref(), "message", "'Message' is required", true)?;
            }
            EntryGet | EntryCreate | EntryUpsert | EntryUpdate | EntryDelete => {
                require_field(params.key.as_deref(), "key", "'Key' is required", false)?;
            }
            EntryQuery | EntryQueryConstruct => {
                require_field(params.pattern.as_deref(), "pattern", "'Pattern' is required", false)?;
            }
            EntryGetMany => {}
        }
        Ok(())
    }

    /// Path relative to the base URL, including any query string.
    pub fn path(&self, params: &UnitParams) -> String {
        use OperationKind::*;
        let key = || encode_uri_component(params.key.as_deref().unwrap_or_default());
        let pattern = || encode_uri_component(params.pattern.as_deref().unwrap_or_default());
        match self.kind {
            ChatSendMessage => "/api/chat".to_string(),
            EntryGet => format!("/api/alignment-data/by-key/{}", key()),
            EntryGetMany | EntryCreate | EntryUpsert | EntryUpdate => {
                "/api/alignment-data".to_string()
            }
            EntryDelete => format!("/api/alignment-data/{}", key()),
            EntryQuery => format!("/api/alignment-data/by-pattern/{}", pattern()),
            EntryQueryConstruct => format!(
                "/api/alignment-data/by-pattern/{}/construct-json?template={}",
                pattern(),
                encode_uri_component(params.template_or_default())
            ),
        }
    }

    /// JSON body, if the operation sends one.
    pub fn body(&self, params: &UnitParams) -> Option<Value> {
        use OperationKind::*;
        match self.kind {
            ChatSendMessage => {
                let mut body = json!({
                    "messages": [{
                        "role": "user",
                        "content": params.message.clone().unwrap_or_default(),
                    }],
                });
                if let Some(agent_id) = params.agent_id_if_set() {
                    body["agentId"] = Value::String(agent_id.to_string());
                }
                Some(body)
            }
            EntryCreate | EntryUpsert => Some(json!({
                "key": params.key.clone().unwrap_or_default(),
                "value": params.value_or_default(),
            })),
            EntryUpdate => {
                let mut body = json!({
                    "key": params.key.clone().unwrap_or_default(),
                    "value": params.value_or_default(),
                });
                if let Some(new_key) = params.new_key_if_set() {
                    body["newKey"] = Value::String(new_key.to_string());
                }
                Some(body)
            }
            EntryGet | EntryGetMany | EntryDelete | EntryQuery | EntryQueryConstruct => None,
        }
    }

    pub fn shape(&self, params: &UnitParams) -> ResponseShape {
        use OperationKind::*;
        match self.kind {
            ChatSendMessage if params.simplify => ResponseShape::SimplifyChat,
            ChatSendMessage => ResponseShape::Passthrough,
            EntryGetMany | EntryQueryConstruct => ResponseShape::FanOutArray,
            EntryDelete => ResponseShape::WrapDeleted,
            EntryQuery => ResponseShape::WrapPatternResult,
            EntryGet | EntryCreate | EntryUpsert | EntryUpdate => ResponseShape::Passthrough,
        }
    }

    /// Validate and build the authenticated request for one unit.
    pub fn build_request(&self, session: &Session, params: &UnitParams) -> Result<HttpRequest> {
        self.validate(params)?;
        let request = session.request(self.method.clone(), &self.path(params));
        Ok(match self.body(params) {
            Some(body) => request.with_json(body),
            None => request,
        })
    }
}

const fn spec(
    resource: &'static str,
    verb: &'static str,
    kind: OperationKind,
    method: Method,
    label: &'static str,
    validation_hint: &'static str,
) -> OperationSpec {
    let failure_hint = match kind {
        OperationKind::ChatSendMessage => CHAT_FAILURE_HINT,
        _ => ENTRY_FAILURE_HINT,
    };
    OperationSpec {
        resource,
        verb,
        kind,
        method,
        label,
        validation_hint,
        failure_hint,
    }
}

static OPERATIONS: [OperationSpec; 9] = [
    spec(
        "chat",
        "sendMessage",
        OperationKind::ChatSendMessage,
        Method::POST,
        "Chat:Send Message",
        "Provide a non-empty message.",
    ),
    spec(
        "entry",
        "get",
        OperationKind::EntryGet,
        Method::GET,
        "Entry:Get",
        "Provide a key to retrieve.",
    ),
    spec(
        "entry",
        "getMany",
        OperationKind::EntryGetMany,
        Method::GET,
        "Entry:Get Many",
        ENTRY_FAILURE_HINT,
    ),
    spec(
        "entry",
        "create",
        OperationKind::EntryCreate,
        Method::POST,
        "Entry:Create",
        "Provide a key for the new entry.",
    ),
    spec(
        "entry",
        "upsert",
        OperationKind::EntryUpsert,
        Method::POST,
        "Entry:Upsert",
        "Provide a key for the entry.",
    ),
    spec(
        "entry",
        "update",
        OperationKind::EntryUpdate,
        Method::PUT,
        "Entry:Update",
        "Provide the key of the entry to update.",
    ),
    spec(
        "entry",
        "delete",
        OperationKind::EntryDelete,
        Method::DELETE,
        "Entry:Delete",
        "Provide the key of the entry to delete.",
    ),
    spec(
        "entry",
        "query",
        OperationKind::EntryQuery,
        Method::GET,
        "Entry:Query",
        PATTERN_HINT,
    ),
    spec(
        "entry",
        "queryConstruct",
        OperationKind::EntryQueryConstruct,
        Method::GET,
        "Entry:Query + Construct",
        PATTERN_HINT,
    ),
];

/// Lookup over the fixed operation table.
pub struct OperationRegistry;

impl OperationRegistry {
    /// The spec for `(resource, verb)`; the same pair always yields the same static entry.
    pub fn resolve(resource: &str, verb: &str) -> Result<&'static OperationSpec> {
        OPERATIONS
            .iter()
            .find(|op| op.resource == resource && op.verb == verb)
            .ok_or_else(|| Error::UnsupportedOperation {
                resource: resource.to_string(),
                verb: verb.to_string(),
            })
    }

    pub fn all() -> &'static [OperationSpec] {
        &OPERATIONS
    }

    /// Label and hint for a pair the registry does not know.
    pub(crate) fn unsupported(resource: &str, verb: &str) -> (String, &'static str, &'static str) {
        let known_resource = OPERATIONS.iter().any(|op| op.resource == resource);
        let label = match resource {
            "chat" => format!("Chat:{verb}"),
            "entry" => format!("Entry:{verb}"),
            other => format!("{other}:{verb}"),
        };
        if known_resource {
            (
                label,
                "Unsupported operation",
                "Select a valid operation from the list.",
            )
        } else {
            (
                label,
                "Unsupported resource",
                "Select 'Chat' or 'Entry' as the resource.",
            )
        }
    }
}
