use serde_json::Value;

/// Picks the message to show for a failed call: `detail`, then `message`,
/// then the whole body serialized, then `fallback`.
pub fn failure_message(body: &Value, fallback: &str) -> String {
    ["detail", "message"]
        .iter()
        .find_map(|field| body.get(*field).and_then(message_text))
        .unwrap_or_else(|| match body {
            Value::Null => fallback.to_string(),
            other => other.to_string(),
        })
}

fn message_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// The fields an auth endpoint may answer with. Anything of the wrong type
/// is treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthReply {
    pub success: Option<bool>,
    pub access: Option<String>,
    pub refresh: Option<String>,
    pub fullname: Option<String>,
    pub message: Option<String>,
}

impl AuthReply {
    pub fn from_body(body: &Value) -> Self {
        let text = |field: &str| {
            body.get(field)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };

        Self {
            success: body.get("success").and_then(Value::as_bool),
            access: text("access"),
            refresh: text("refresh"),
            fullname: text("fullname"),
            message: text("message"),
        }
    }

    pub fn confirmed(&self) -> bool {
        self.success == Some(true)
    }

    pub fn grants_tokens(&self) -> bool {
        self.confirmed() || self.access.is_some()
    }
}
