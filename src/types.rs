use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Default `template` for `entry.queryConstruct`; placeholders are filled in server-side.
pub const DEFAULT_CONSTRUCT_TEMPLATE: &str = r#"{"key":"{{key}}","value":"{{value}}"}"#;

/// Parameters resolved by the host for one work unit.
///
/// Only the fields the selected operation reads matter; the rest are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default = "default_simplify")]
    pub simplify: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

fn default_simplify() -> bool {
    true
}

impl Default for UnitParams {
    fn default() -> Self {
        Self {
            message: None,
            agent_id: None,
            simplify: true,
            key: None,
            value: None,
            new_key: None,
            pattern: None,
            template: None,
        }
    }
}

impl UnitParams {
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn simplify(mut self, simplify: bool) -> Self {
        self.simplify = simplify;
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn new_key(mut self, new_key: impl Into<String>) -> Self {
        self.new_key = Some(new_key.into());
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// `value`, defaulting to an empty object.
    pub(crate) fn value_or_default(&self) -> Value {
        self.value.clone().unwrap_or_else(|| Value::Object(Map::new()))
    }

    pub(crate) fn template_or_default(&self) -> &str {
        self.template.as_deref().unwrap_or(DEFAULT_CONSTRUCT_TEMPLATE)
    }

    pub(crate) fn agent_id_if_set(&self) -> Option<&str> {
        self.agent_id.as_deref().filter(|s| !s.is_empty())
    }

    pub(crate) fn new_key_if_set(&self) -> Option<&str> {
        self.new_key.as_deref().filter(|s| !s.is_empty())
    }
}

/// One input item of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    /// 0-based position in the batch.
    pub index: usize,
    pub resource: String,
    pub verb: String,
    #[serde(default)]
    pub params: UnitParams,
}

impl WorkUnit {
    pub fn new(
        index: usize,
        resource: impl Into<String>,
        verb: impl Into<String>,
        params: UnitParams,
    ) -> Self {
        Self {
            index,
            resource: resource.into(),
            verb: verb.into(),
            params,
        }
    }

    pub fn chat(index: usize, params: UnitParams) -> Self {
        Self::new(index, "chat", "sendMessage", params)
    }

    pub fn entry(index: usize, verb: impl Into<String>, params: UnitParams) -> Self {
        Self::new(index, "entry", verb, params)
    }
}

/// One output record, correlated to the input item it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemResult {
    Success {
        json: Value,
        /// 0-based index of the originating work unit.
        item: usize,
    },
    Failure {
        error: String,
        item: usize,
        operation: Option<String>,
    },
}

impl ItemResult {
    pub fn item(&self) -> usize {
        match self {
            ItemResult::Success { item, .. } | ItemResult::Failure { item, .. } => *item,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ItemResult::Failure { .. })
    }

    pub fn json(&self) -> Option<&Value> {
        match self {
            ItemResult::Success { json, .. } => Some(json),
            ItemResult::Failure { .. } => None,
        }
    }

    /// Host-facing record. Failures carry the 1-based `itemIndex`.
    pub fn into_json(self) -> Value {
        match self {
            ItemResult::Success { json, .. } => json,
            ItemResult::Failure {
                error,
                item,
                operation,
            } => {
                let mut out = json!({ "error": error, "itemIndex": item + 1 });
                if let Some(op) = operation {
                    out["operation"] = Value::String(op);
                }
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_default_to_simplify_and_empty_value() {
        let params = UnitParams::default();
        assert!(params.simplify);
        assert_eq!(params.value_or_default(), json!({}));
        assert_eq!(
            params.template_or_default(),
            r#"{"key":"{{key}}","value":"{{value}}"}"#
        );
    }

    #[test]
    fn empty_optional_fields_count_as_unset() {
        let params = UnitParams::default().agent_id("").new_key("");
        assert_eq!(params.agent_id_if_set(), None);
        assert_eq!(params.new_key_if_set(), None);
    }

    #[test]
    fn work_unit_deserializes_with_camel_case_params() {
        let unit: WorkUnit = serde_json::from_value(json!({
            "index": 2,
            "resource": "entry",
            "verb": "update",
            "params": { "key": "a", "newKey": "b" }
        }))
        .unwrap();
        assert_eq!(unit.params.new_key.as_deref(), Some("b"));
        assert!(unit.params.simplify);
    }

    #[test]
    fn failure_renders_one_based_item_index() {
        let failure = ItemResult::Failure {
            error: "boom".into(),
            item: 0,
            operation: Some("get".into()),
        };
        assert_eq!(failure.item(), 0);
        assert_eq!(
            failure.into_json(),
            json!({"error": "boom", "itemIndex": 1, "operation": "get"})
        );
    }
}
