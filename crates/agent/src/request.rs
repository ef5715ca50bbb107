use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Body of one agent call. Every call carries a fresh `request_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentRequest {
    pub query: String,
    pub user_id: String,
    pub request_id: Uuid,
    pub session_id: String,
}

impl AgentRequest {
    pub fn new(
        query: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            user_id: user_id.into(),
            request_id: Uuid::new_v4(),
            session_id: session_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AgentResponse {
    /// Missing or falsy values count as a rejected request.
    #[serde(default, deserialize_with = "deserialize_truthy")]
    pub success: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn deserialize_truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(is_truthy(&Value::deserialize(deserializer)?))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_documented_fields() {
        let request = AgentRequest::new("what changed?", "NA", "abc");
        let encoded = serde_json::to_value(&request).expect("request encodes");

        assert_eq!(encoded["query"], "what changed?");
        assert_eq!(encoded["user_id"], "NA");
        assert_eq!(encoded["session_id"], "abc");
        assert_eq!(encoded["request_id"], request.request_id.to_string());
        assert_eq!(encoded.as_object().map(|object| object.len()), Some(4));
    }

    #[test]
    fn each_request_gets_its_own_id() {
        let first = AgentRequest::new("q", "NA", "abc");
        let second = AgentRequest::new("q", "NA", "abc");
        assert_ne!(first.request_id, second.request_id);
    }

    #[test]
    fn success_follows_json_truthiness() {
        let decode = |raw: &str| {
            serde_json::from_str::<AgentResponse>(raw)
                .expect("response decodes")
                .success
        };

        assert!(decode(r#"{"success": true, "note": "queued"}"#));
        assert!(decode(r#"{"success": 1}"#));
        assert!(!decode(r#"{"success": false}"#));
        assert!(!decode(r#"{"success": null}"#));
        assert!(!decode(r#"{"success": ""}"#));
        assert!(!decode(r#"{}"#));
    }

    #[test]
    fn extra_fields_are_kept() {
        let response: AgentResponse =
            serde_json::from_str(r#"{"success": true, "note": "queued"}"#).expect("decodes");
        assert_eq!(response.extra.get("note"), Some(&Value::from("queued")));
    }
}
