use crate::transport::HttpReply;
use serde_json::Value;
use thiserror::Error;

pub const MALFORMED_SNIPPET_LIMIT: usize = 400;
pub const UNEXPECTED_SNIPPET_LIMIT: usize = 600;

const EMPTY_BODY: &str = "<empty response body>";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error(
        "Invalid JSON response (status {status} {status_text}): {decode_error} - body: {body_snippet}"
    )]
    MalformedPayload {
        status: u16,
        status_text: String,
        decode_error: String,
        body_snippet: String,
    },
    #[error(
        "Expected JSON response but received {content_type} (status {status} {status_text}): {body_snippet}"
    )]
    UnexpectedContentType {
        status: u16,
        status_text: String,
        content_type: String,
        body_snippet: String,
    },
}

impl DecodeError {
    pub fn status(&self) -> u16 {
        match self {
            DecodeError::MalformedPayload { status, .. } => *status,
            DecodeError::UnexpectedContentType { status, .. } => *status,
        }
    }

    pub fn body_snippet(&self) -> &str {
        match self {
            DecodeError::MalformedPayload { body_snippet, .. } => body_snippet,
            DecodeError::UnexpectedContentType { body_snippet, .. } => body_snippet,
        }
    }
}

/// Decodes a reply body as JSON, but only when the reply says it is JSON.
///
/// Proxies and gateways answer with HTML error pages, so a non-JSON content
/// type is reported instead of being parsed. Status is left to the caller.
pub fn decode_reply(reply: &HttpReply) -> Result<Value, DecodeError> {
    let content_type = reply.content_type.as_deref().unwrap_or_default();

    if declares_json(content_type) {
        return serde_json::from_str(&reply.body).map_err(|err| DecodeError::MalformedPayload {
            status: reply.status,
            status_text: reply.status_text.clone(),
            decode_error: err.to_string(),
            body_snippet: snippet(&reply.body, MALFORMED_SNIPPET_LIMIT),
        });
    }

    let body_snippet = if reply.body.is_empty() {
        EMPTY_BODY.to_string()
    } else {
        snippet(&reply.body, UNEXPECTED_SNIPPET_LIMIT)
    };

    Err(DecodeError::UnexpectedContentType {
        status: reply.status,
        status_text: reply.status_text.clone(),
        content_type: if content_type.is_empty() {
            "unknown".to_string()
        } else {
            content_type.to_string()
        },
        body_snippet,
    })
}

pub fn declares_json(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    essence == "application/json" || (essence.contains('/') && essence.ends_with("+json"))
}

fn snippet(body: &str, limit: usize) -> String {
    body.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reply(status: u16, content_type: Option<&str>, body: &str) -> HttpReply {
        HttpReply {
            status,
            status_text: "Status".into(),
            content_type: content_type.map(str::to_owned),
            body: body.into(),
        }
    }

    #[test]
    fn json_bodies_decode_regardless_of_status() {
        let ok = decode_reply(&reply(200, Some("application/json"), r#"{"success":true}"#)).unwrap();
        assert_eq!(ok, json!({"success": true}));

        let failed = decode_reply(&reply(
            400,
            Some("application/json; charset=utf-8"),
            r#"{"detail":"nope"}"#,
        ))
        .unwrap();
        assert_eq!(failed["detail"], json!("nope"));
    }

    #[test]
    fn html_gateway_page_is_unexpected_content_type() {
        let page = format!("<!DOCTYPE html><html>{}</html>", "x".repeat(2000));
        let err = decode_reply(&reply(502, Some("text/html"), &page)).unwrap_err();

        match &err {
            DecodeError::UnexpectedContentType {
                status,
                content_type,
                body_snippet,
                ..
            } => {
                assert_eq!(*status, 502);
                assert_eq!(content_type, "text/html");
                assert_eq!(body_snippet.chars().count(), UNEXPECTED_SNIPPET_LIMIT);
                assert!(body_snippet.starts_with("<!DOCTYPE html>"));
            }
            other => panic!("expected UnexpectedContentType, got {other:?}"),
        }
        assert_eq!(err.status(), 502);
    }

    #[test]
    fn unparsable_json_is_malformed_payload() {
        let body = format!("{{\"broken\": {}", "9".repeat(1000));
        let err = decode_reply(&reply(200, Some("application/json"), &body)).unwrap_err();

        match err {
            DecodeError::MalformedPayload {
                status,
                decode_error,
                body_snippet,
                ..
            } => {
                assert_eq!(status, 200);
                assert!(!decode_error.is_empty());
                assert!(body_snippet.chars().count() <= MALFORMED_SNIPPET_LIMIT);
            }
            other => panic!("expected MalformedPayload, got {other:?}"),
        }
    }

    #[test]
    fn missing_content_type_and_empty_body_are_described() {
        let err = decode_reply(&reply(504, None, "")).unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnexpectedContentType {
                status: 504,
                status_text: "Status".into(),
                content_type: "unknown".into(),
                body_snippet: "<empty response body>".into(),
            }
        );
    }

    #[test]
    fn snippets_cut_on_char_boundaries() {
        let body = "é".repeat(700);
        let err = decode_reply(&reply(500, Some("text/plain"), &body)).unwrap_err();
        assert_eq!(err.body_snippet().chars().count(), UNEXPECTED_SNIPPET_LIMIT);
    }

    #[test]
    fn structured_suffix_counts_as_json() {
        assert!(declares_json("application/problem+json"));
        assert!(declares_json("Application/JSON"));
        assert!(!declares_json("text/html; charset=utf-8"));
        assert!(!declares_json("+json"));
    }
}
