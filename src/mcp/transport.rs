use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use url::Url;

use crate::error::{DocSearchError, Result};

pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";

const SESSION_ID_HEADER: &str = "Mcp-Session-Id";
const PROTOCOL_VERSION_HEADER: &str = "MCP-Protocol-Version";

// How long to wait for a single response before giving up on the stream.
const RESPONSE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Streamable HTTP: one POST per JSON-RPC message.
    Streamable,
    /// Legacy SSE: long-lived GET stream plus a POST message channel.
    Sse,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Streamable => write!(f, "streamable HTTP"),
            TransportKind::Sse => write!(f, "SSE"),
        }
    }
}

pub enum Transport {
    Streamable(StreamableTransport),
    Sse(SseTransport),
}

impl Transport {
    pub fn kind(&self) -> TransportKind {
        match self {
            Transport::Streamable(_) => TransportKind::Streamable,
            Transport::Sse(_) => TransportKind::Sse,
        }
    }

    pub async fn request(&mut self, id: u64, method: &str, params: Option<Value>) -> Result<Value> {
        match self {
            Transport::Streamable(t) => t.request(id, method, params).await,
            Transport::Sse(t) => t.request(id, method, params).await,
        }
    }

    pub async fn notify(&mut self, method: &str, params: Option<Value>) -> Result<()> {
        match self {
            Transport::Streamable(t) => t.notify(method, params).await,
            Transport::Sse(t) => t.notify(method, params).await,
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        match self {
            Transport::Streamable(t) => t.close().await,
            Transport::Sse(t) => t.close().await,
        }
    }
}

fn build_envelope(id: Option<u64>, method: &str, params: Option<Value>) -> Value {
    let mut envelope = json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params.unwrap_or(json!({})),
    });
    if let Some(id) = id {
        envelope["id"] = json!(id);
    }
    envelope
}

/// Pull the `result` out of a JSON-RPC response, or surface the server's error.
fn unwrap_response(response: &Value) -> Result<Value> {
    if let Some(result) = response.get("result") {
        return Ok(result.clone());
    }
    if let Some(error) = response.get("error") {
        return Err(DocSearchError::Protocol(format!("MCP error: {}", error)));
    }
    Err(DocSearchError::Protocol(
        "Response carried neither result nor error".to_string(),
    ))
}

fn is_response_for(value: &Value, id: u64) -> bool {
    value.get("id") == Some(&json!(id))
}

/// Streamable HTTP transport: every JSON-RPC message is a POST to the endpoint,
/// and the answer comes back either as a JSON body or as a short SSE body.
pub struct StreamableTransport {
    http: reqwest::Client,
    endpoint: Url,
    session_id: Option<String>,
}

impl StreamableTransport {
    // Fresh client per transport: protocol state must not leak between
    // transport attempts.
    pub fn new(endpoint: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/event-stream"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            PROTOCOL_VERSION_HEADER,
            HeaderValue::from_static(MCP_PROTOCOL_VERSION),
        );
        let http = reqwest::Client::builder().default_headers(headers).build()?;
        Ok(Self {
            http,
            endpoint: Url::parse(endpoint)?,
            session_id: None,
        })
    }

    pub async fn request(&mut self, id: u64, method: &str, params: Option<Value>) -> Result<Value> {
        let envelope = build_envelope(Some(id), method, params);
        let mut builder = self.http.post(self.endpoint.clone()).json(&envelope);
        if let Some(session_id) = &self.session_id {
            builder = builder.header(SESSION_ID_HEADER, session_id);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DocSearchError::Protocol(format!(
                "HTTP {} from MCP endpoint for '{}'",
                status, method
            )));
        }

        // The server assigns a session on initialize; echo it from then on.
        if let Some(session_id) = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            self.session_id = Some(session_id.to_string());
        }

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("text/event-stream"))
            .unwrap_or(false);

        let value = if is_event_stream {
            read_response_from_stream(response, id).await?
        } else {
            response.json::<Value>().await?
        };
        unwrap_response(&value)
    }

    pub async fn notify(&mut self, method: &str, params: Option<Value>) -> Result<()> {
        let envelope = build_envelope(None, method, params);
        let mut builder = self.http.post(self.endpoint.clone()).json(&envelope);
        if let Some(session_id) = &self.session_id {
            builder = builder.header(SESSION_ID_HEADER, session_id);
        }
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DocSearchError::Protocol(format!(
                "HTTP {} from MCP endpoint for notification '{}'",
                status, method
            )));
        }
        Ok(())
    }

    /// Tell the server the session is over. Servers that never issued a
    /// session id have nothing to delete.
    pub async fn close(&mut self) -> Result<()> {
        let Some(session_id) = self.session_id.take() else {
            return Ok(());
        };
        self.http
            .delete(self.endpoint.clone())
            .header(SESSION_ID_HEADER, session_id)
            .send()
            .await?;
        Ok(())
    }
}

/// Scan an SSE response body until a JSON-RPC response with the given id shows up.
async fn read_response_from_stream(response: reqwest::Response, id: u64) -> Result<Value> {
    let mut stream = response.bytes_stream();
    let mut parser = SseParser::new();
    let chunk_timeout = Duration::from_secs(RESPONSE_TIMEOUT_SECS);

    loop {
        let chunk = match timeout(chunk_timeout, stream.next()).await {
            Ok(Some(chunk)) => chunk?,
            Ok(None) => {
                return Err(DocSearchError::Protocol(
                    "Event stream ended before a response arrived".to_string(),
                ));
            }
            Err(_) => return Err(DocSearchError::Timeout),
        };

        for event in parser.feed(&chunk) {
            if event.name != "message" {
                continue;
            }
            if let Ok(value) = serde_json::from_str::<Value>(&event.data) {
                if is_response_for(&value, id) {
                    return Ok(value);
                }
            }
        }
    }
}

/// Legacy SSE transport. A long-lived GET stream delivers events; the first
/// `endpoint` event names the URL to POST messages to, and responses arrive
/// back on the stream as `message` events.
pub struct SseTransport {
    http: reqwest::Client,
    message_url: Url,
    incoming: mpsc::UnboundedReceiver<Value>,
    reader: JoinHandle<()>,
}

impl SseTransport {
    pub async fn connect(endpoint: &str) -> Result<Self> {
        // Fresh client here too; see StreamableTransport::new.
        let http = reqwest::Client::new();
        let endpoint_url = Url::parse(endpoint)?;

        let response = http
            .get(endpoint_url.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DocSearchError::Protocol(format!(
                "HTTP {} from SSE endpoint",
                status
            )));
        }

        let mut stream = response.bytes_stream();
        let mut parser = SseParser::new();
        let chunk_timeout = Duration::from_secs(RESPONSE_TIMEOUT_SECS);

        // The server must announce the message URL before anything else.
        let message_path = 'outer: loop {
            let chunk = match timeout(chunk_timeout, stream.next()).await {
                Ok(Some(chunk)) => chunk?,
                Ok(None) => {
                    return Err(DocSearchError::Protocol(
                        "SSE stream ended before the endpoint event".to_string(),
                    ));
                }
                Err(_) => return Err(DocSearchError::Timeout),
            };
            for event in parser.feed(&chunk) {
                if event.name == "endpoint" {
                    break 'outer event.data;
                }
            }
        };
        let message_url = endpoint_url.join(message_path.trim())?;

        let (tx, incoming) = mpsc::unbounded_channel();
        let reader = tokio::spawn(async move {
            while let Some(chunk) = stream.next().await {
                let Ok(chunk) = chunk else { break };
                for event in parser.feed(&chunk) {
                    if event.name != "message" {
                        continue;
                    }
                    if let Ok(value) = serde_json::from_str::<Value>(&event.data) {
                        if tx.send(value).is_err() {
                            return;
                        }
                    }
                }
            }
        });

        Ok(Self {
            http,
            message_url,
            incoming,
            reader,
        })
    }

    pub async fn request(&mut self, id: u64, method: &str, params: Option<Value>) -> Result<Value> {
        self.post(build_envelope(Some(id), method, params)).await?;

        let response_timeout = Duration::from_secs(RESPONSE_TIMEOUT_SECS);
        loop {
            match timeout(response_timeout, self.incoming.recv()).await {
                Ok(Some(value)) if is_response_for(&value, id) => {
                    return unwrap_response(&value);
                }
                // Server-initiated messages and other ids are not ours to handle.
                Ok(Some(_)) => continue,
                Ok(None) => {
                    return Err(DocSearchError::Protocol(
                        "SSE stream closed before a response arrived".to_string(),
                    ));
                }
                Err(_) => return Err(DocSearchError::Timeout),
            }
        }
    }

    pub async fn notify(&mut self, method: &str, params: Option<Value>) -> Result<()> {
        self.post(build_envelope(None, method, params)).await
    }

    async fn post(&self, envelope: Value) -> Result<()> {
        let response = self
            .http
            .post(self.message_url.clone())
            .header(CONTENT_TYPE, "application/json")
            .json(&envelope)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DocSearchError::Protocol(format!(
                "HTTP {} from SSE message endpoint",
                status
            )));
        }
        Ok(())
    }

    pub async fn close(&mut self) -> Result<()> {
        self.reader.abort();
        Ok(())
    }
}

impl Drop for SseTransport {
    // The reader owns the long-lived GET stream; a detached task would keep
    // that connection open for the life of the process. Abort on drop so a
    // failed handshake discards the stream along with the transport.
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub name: String,
    pub data: String,
}

/// Incremental server-sent-events parser. Chunks may split lines anywhere, so
/// bytes are buffered until a full line is available; events are dispatched on
/// blank lines per the SSE framing rules.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    event_name: String,
    data: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        let mut events = Vec::new();

        while let Some(newline_pos) = self.buffer.find('\n') {
            let line = self.buffer[..newline_pos].trim_end_matches('\r').to_string();
            self.buffer.drain(..=newline_pos);

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
                continue;
            }
            if line.starts_with(':') {
                // Comment / keep-alive line.
                continue;
            }

            let (field, value) = match line.find(':') {
                Some(colon_pos) => {
                    let value = &line[colon_pos + 1..];
                    // A single leading space after the colon is part of the framing.
                    (&line[..colon_pos], value.strip_prefix(' ').unwrap_or(value))
                }
                None => (line.as_str(), ""),
            };

            match field {
                "event" => self.event_name = value.to_string(),
                "data" => {
                    self.data.push_str(value);
                    self.data.push('\n');
                }
                // id and retry have no meaning for this client.
                _ => {}
            }
        }

        events
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            self.event_name.clear();
            return None;
        }
        let name = if self.event_name.is_empty() {
            "message".to_string()
        } else {
            std::mem::take(&mut self.event_name)
        };
        let mut data = std::mem::take(&mut self.data);
        if data.ends_with('\n') {
            data.pop();
        }
        self.event_name.clear();
        Some(SseEvent { name, data })
    }
}
