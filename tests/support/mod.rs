//! In-process fake MCP servers used to exercise negotiation and the session
//! lifecycle without a network: one speaking the streamable HTTP transport,
//! one speaking the legacy SSE transport.

use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use axum::Router;
use futures::Stream;
use serde_json::{json, Value};
use tokio::sync::mpsc;

pub fn search_tool_descriptor() -> Value {
    json!({
        "name": "microsoft_docs_search",
        "description": "Search Microsoft Learn documentation",
        "inputSchema": {
            "type": "object",
            "properties": { "query": { "type": "string" } },
            "required": ["query"]
        }
    })
}

/// Answer one JSON-RPC request the way a minimal docs-search server would.
/// Notifications get `None` (nothing to send back).
fn rpc_reply(
    tools: &[Value],
    tool_calls: &AtomicUsize,
    malformed_call_reply: bool,
    request: &Value,
) -> Option<Value> {
    let id = request.get("id")?.clone();
    let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("");

    let result = match method {
        "initialize" => json!({
            "protocolVersion": "2025-03-26",
            "serverInfo": { "name": "fake-mcp", "version": "0.0.1" },
            "capabilities": { "tools": {} }
        }),
        "tools/list" => json!({ "tools": tools }),
        "tools/call" => {
            tool_calls.fetch_add(1, Ordering::SeqCst);
            if malformed_call_reply {
                json!({ "content": "not a content list" })
            } else {
                json!({
                    "content": [
                        { "type": "text", "text": "plain prose, not the payload" },
                        {
                            "type": "text",
                            "text": "{\"results\":[{\"title\":\"Getting started\",\"content\":\"An introduction.\",\"link\":\"https://learn.microsoft.com/intro\"}]}"
                        }
                    ]
                })
            }
        }
        _ => {
            return Some(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": "method not found" }
            }));
        }
    };

    Some(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
}

async fn bind_and_serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/mcp", addr)
}

pub struct FakeMcp {
    tools: Vec<Value>,
    malformed_call_reply: bool,
    pub sse_gets: AtomicUsize,
    pub tool_calls: AtomicUsize,
}

impl FakeMcp {
    pub fn sse_get_count(&self) -> usize {
        self.sse_gets.load(Ordering::SeqCst)
    }

    pub fn tool_call_count(&self) -> usize {
        self.tool_calls.load(Ordering::SeqCst)
    }
}

/// Bind a fake streamable-HTTP MCP server on an ephemeral port and return its
/// endpoint URL plus a handle for inspecting what the client did.
pub async fn spawn_fake_mcp(tools: Vec<Value>) -> (String, Arc<FakeMcp>) {
    spawn_streamable(tools, false).await
}

/// A streamable server whose tools/call result does not deserialize.
pub async fn spawn_fake_mcp_malformed() -> (String, Arc<FakeMcp>) {
    spawn_streamable(vec![search_tool_descriptor()], true).await
}

async fn spawn_streamable(tools: Vec<Value>, malformed_call_reply: bool) -> (String, Arc<FakeMcp>) {
    let state = Arc::new(FakeMcp {
        tools,
        malformed_call_reply,
        sse_gets: AtomicUsize::new(0),
        tool_calls: AtomicUsize::new(0),
    });

    let app = Router::new()
        .route(
            "/mcp",
            post(handle_rpc).get(count_sse_probe).delete(handle_close),
        )
        .with_state(state.clone());

    (bind_and_serve(app).await, state)
}

/// A server where both transports fail: POST answers 500, GET answers 404.
pub async fn spawn_unavailable_mcp() -> (String, Arc<FakeMcp>) {
    let state = Arc::new(FakeMcp {
        tools: Vec::new(),
        malformed_call_reply: false,
        sse_gets: AtomicUsize::new(0),
        tool_calls: AtomicUsize::new(0),
    });

    let app = Router::new()
        .route(
            "/mcp",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }).get(count_sse_probe),
        )
        .with_state(state.clone());

    (bind_and_serve(app).await, state)
}

async fn handle_rpc(State(state): State<Arc<FakeMcp>>, Json(request): Json<Value>) -> Response {
    match rpc_reply(
        &state.tools,
        &state.tool_calls,
        state.malformed_call_reply,
        &request,
    ) {
        Some(body) => (
            StatusCode::OK,
            [("Mcp-Session-Id", "fake-session")],
            Json(body),
        )
            .into_response(),
        // Notifications get acknowledged and nothing more.
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn count_sse_probe(State(state): State<Arc<FakeMcp>>) -> StatusCode {
    state.sse_gets.fetch_add(1, Ordering::SeqCst);
    StatusCode::NOT_FOUND
}

async fn handle_close() -> StatusCode {
    StatusCode::OK
}

/// Legacy-only fake: POST to the endpoint is refused so clients must fall
/// back to the SSE transport. The GET stream serves the `endpoint` event and
/// then relays JSON-RPC replies pushed by the message POST handler.
pub struct FakeSseMcp {
    tools: Vec<Value>,
    accept_messages: bool,
    open_streams: Arc<AtomicUsize>,
    sender: Mutex<Option<mpsc::UnboundedSender<Value>>>,
    pub streamable_posts: AtomicUsize,
    pub tool_calls: AtomicUsize,
}

impl FakeSseMcp {
    /// SSE GET streams currently being served. Counts down when the client
    /// side of a stream goes away.
    pub fn open_stream_count(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    pub fn streamable_post_count(&self) -> usize {
        self.streamable_posts.load(Ordering::SeqCst)
    }
}

/// With `accept_messages` false the message endpoint answers 500, so the SSE
/// handshake fails after the stream is established.
pub async fn spawn_fake_sse_mcp(
    tools: Vec<Value>,
    accept_messages: bool,
) -> (String, Arc<FakeSseMcp>) {
    let state = Arc::new(FakeSseMcp {
        tools,
        accept_messages,
        open_streams: Arc::new(AtomicUsize::new(0)),
        sender: Mutex::new(None),
        streamable_posts: AtomicUsize::new(0),
        tool_calls: AtomicUsize::new(0),
    });

    let app = Router::new()
        .route("/mcp", post(refuse_streamable).get(handle_sse_stream))
        .route("/messages", post(handle_sse_message))
        .with_state(state.clone());

    (bind_and_serve(app).await, state)
}

async fn refuse_streamable(State(state): State<Arc<FakeSseMcp>>) -> StatusCode {
    state.streamable_posts.fetch_add(1, Ordering::SeqCst);
    StatusCode::INTERNAL_SERVER_ERROR
}

struct OpenStreamGuard(Arc<AtomicUsize>);

impl Drop for OpenStreamGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct SseFeed {
    rx: mpsc::UnboundedReceiver<Value>,
    _guard: OpenStreamGuard,
    endpoint_sent: bool,
}

async fn handle_sse_stream(
    State(state): State<Arc<FakeSseMcp>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    *state.sender.lock().unwrap() = Some(tx);

    state.open_streams.fetch_add(1, Ordering::SeqCst);
    let feed = SseFeed {
        rx,
        _guard: OpenStreamGuard(state.open_streams.clone()),
        endpoint_sent: false,
    };

    let stream = futures::stream::unfold(feed, |mut feed| async move {
        if !feed.endpoint_sent {
            feed.endpoint_sent = true;
            let event = Event::default().event("endpoint").data("/messages");
            return Some((Ok(event), feed));
        }
        let value = feed.rx.recv().await?;
        let event = Event::default().event("message").data(value.to_string());
        Some((Ok(event), feed))
    });

    // Frequent keep-alives make the server notice a dropped client quickly.
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_millis(50)))
}

async fn handle_sse_message(
    State(state): State<Arc<FakeSseMcp>>,
    Json(request): Json<Value>,
) -> StatusCode {
    if !state.accept_messages {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    if let Some(reply) = rpc_reply(&state.tools, &state.tool_calls, false, &request) {
        let sender = state.sender.lock().unwrap().clone();
        if let Some(sender) = sender {
            let _ = sender.send(reply);
        }
    }
    StatusCode::ACCEPTED
}
