use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use serde_json::{json, Value};

use crate::error::{DocSearchError, Result};
use crate::events::EventLog;
use crate::search::{search_docs, MCP_ENDPOINT};

struct ServerState {
    endpoint: String,
}

/// Build the proxy app. The endpoint is injectable so tests can point the
/// proxy at a local fake server; production uses the fixed constant.
pub fn router(endpoint: &str) -> Router {
    let state = Arc::new(ServerState {
        endpoint: endpoint.to_string(),
    });
    Router::new()
        .route("/api/search", post(handle_search))
        .with_state(state)
}

/// Bind the proxy on localhost and serve until the process exits.
pub async fn serve(port: u16) -> Result<()> {
    let app = router(MCP_ENDPOINT);
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// POST /api/search: run one search and reply with the raw tool result plus
/// the ordered progress log. Every response, success or failure, carries the
/// `events` collected so far.
async fn handle_search(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let mut events = EventLog::new();

    let query = match parse_search_request(&body) {
        Ok(query) => query,
        Err(e) => {
            let (status, message) = status_for(&e);
            events.push(format!("Rejected request: {}", message));
            return (status, error_body(&message, &events));
        }
    };

    match search_docs(&state.endpoint, &query, &mut events).await {
        Ok(reply) => {
            let mut response = match serde_json::to_value(&reply) {
                Ok(value) => value,
                Err(e) => {
                    let (status, message) = status_for(&DocSearchError::Json(e));
                    return (status, error_body(&message, &events));
                }
            };
            response["events"] = json!(events.entries());
            (StatusCode::OK, Json(response))
        }
        Err(e) => {
            let (status, message) = status_for(&e);
            (status, error_body(&message, &events))
        }
    }
}

/// Pull the query string out of the request body, distinguishing unparsable
/// JSON from a missing or mistyped `query` field.
pub fn parse_search_request(body: &[u8]) -> Result<String> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| DocSearchError::Parse("Invalid JSON in request body".to_string()))?;
    match value.get("query") {
        Some(Value::String(query)) => Ok(query.clone()),
        _ => Err(DocSearchError::Parse("Invalid query parameter".to_string())),
    }
}

/// Map an error onto the HTTP contract: 400 for boundary parse failures, 503
/// when the search tool cannot be reached behind a healthy connection, 500
/// for everything else (with the cause folded into the message).
pub fn status_for(err: &DocSearchError) -> (StatusCode, String) {
    match err {
        DocSearchError::Parse(message) => (StatusCode::BAD_REQUEST, message.clone()),
        DocSearchError::ToolUnavailable(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Search tool not available".to_string(),
        ),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

fn error_body(message: &str, events: &EventLog) -> Json<Value> {
    Json(json!({
        "error": message,
        "events": events.entries(),
    }))
}
