use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::mcp::{ToolCallResult, ToolContent};

/// Display-ready search result. All fields optional: the tool reply promises
/// no particular shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// Turn a raw tool reply into result records. Pure and infallible: the worst
/// case is an empty vec, which callers report as "no structured content".
pub fn normalize(reply: &ToolCallResult) -> Vec<ResultRecord> {
    let Some(payload) = find_json_content(&reply.content) else {
        return Vec::new();
    };
    extract_nested_results(payload)
        .iter()
        .map(record_from_value)
        .collect()
}

/// First text item that parses as JSON wins; order in the content list is the
/// server's and is preserved.
fn find_json_content(content: &[ToolContent]) -> Option<Value> {
    for item in content {
        if item.content_type != "text" {
            continue;
        }
        let Some(text) = item.text.as_deref() else {
            continue;
        };
        let trimmed = text.trim();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(value) = serde_json::from_str(trimmed) {
                return Some(value);
            }
        }
    }
    None
}

/// Wrap a lone payload into a sequence, then unwrap one level of the common
/// `{ "results": [...] }` envelope. Deeper nesting is deliberately left alone.
fn extract_nested_results(payload: Value) -> Vec<Value> {
    let mut results = match payload {
        Value::Array(items) => items,
        other => vec![other],
    };

    let nested = results
        .first()
        .and_then(|first| first.get("results"))
        .and_then(|r| r.as_array())
        .cloned();
    if let Some(nested) = nested {
        results = nested;
    }

    results
}

fn record_from_value(value: &Value) -> ResultRecord {
    let title = value.get("title").and_then(string_field);
    let content = value.get("content").and_then(string_field);

    // "links" takes priority over "link"; null and empty strings count as
    // absent, so a blank "links" still falls through to "link".
    let link = value
        .get("links")
        .filter(|v| link_present(v))
        .or_else(|| value.get("link").filter(|v| link_present(v)))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .and_then(|raw| validate_link(&raw));

    ResultRecord {
        title,
        content,
        link,
    }
}

fn link_present(value: &Value) -> bool {
    !value.is_null() && value.as_str() != Some("")
}

fn string_field(value: &Value) -> Option<String> {
    value.as_str().map(|s| s.to_string())
}

/// Only absolute http(s) URLs may reach a clickable surface. A bad link drops
/// the link, never the record.
fn validate_link(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| raw.to_string())
}
