use jsonschema::JSONSchema;
use serde_json::{json, Value};

use super::transport::{SseTransport, StreamableTransport, Transport, TransportKind, MCP_PROTOCOL_VERSION};
use super::types::{InitializeResult, McpTool, ToolCallResult, ToolListResponse};
use crate::error::{DocSearchError, Result};
use crate::events::EventLog;

const CLIENT_NAME: &str = "docsearch";
const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One negotiated connection to an MCP server.
///
/// Lifecycle is strictly connect -> (list tools) -> at most one call -> close.
/// Sessions are never pooled or reused across queries.
pub struct McpSession {
    transport: Transport,
    next_id: u64,
}

/// Establish a session, preferring the streamable HTTP transport and falling
/// back to legacy SSE. Servers that only speak the older protocol reject the
/// first attempt, so both failures are logged before giving up.
pub async fn connect(endpoint: &str, events: &mut EventLog) -> Result<McpSession> {
    events.push(format!("Connecting to MCP server at {}", endpoint));

    events.push("Attempting streamable HTTP transport");
    match connect_streamable(endpoint).await {
        Ok(session) => {
            events.push("Connected via streamable HTTP transport");
            return Ok(session);
        }
        Err(e) => events.push(format!("Streamable HTTP transport failed: {}", e)),
    }

    events.push("Falling back to SSE transport");
    match connect_sse(endpoint).await {
        Ok(session) => {
            events.push("Connected via SSE transport");
            Ok(session)
        }
        Err(e) => {
            events.push(format!("SSE transport failed: {}", e));
            Err(DocSearchError::Connection(
                "Could not connect to MCP server with any available transport".to_string(),
            ))
        }
    }
}

async fn connect_streamable(endpoint: &str) -> Result<McpSession> {
    let transport = Transport::Streamable(StreamableTransport::new(endpoint)?);
    initialize(transport).await
}

async fn connect_sse(endpoint: &str) -> Result<McpSession> {
    let transport = Transport::Sse(SseTransport::connect(endpoint).await?);
    initialize(transport).await
}

/// Run the MCP handshake on a freshly constructed transport.
async fn initialize(transport: Transport) -> Result<McpSession> {
    let mut session = McpSession {
        transport,
        next_id: 1,
    };

    let params = json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": {
            "tools": {}
        },
        "clientInfo": {
            "name": CLIENT_NAME,
            "version": CLIENT_VERSION
        }
    });
    let response = session.request("initialize", Some(params)).await?;
    let _init: InitializeResult = serde_json::from_value(response)?;

    session
        .transport
        .notify("notifications/initialized", None)
        .await?;

    Ok(session)
}

impl McpSession {
    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;
        self.transport.request(id, method, params).await
    }

    pub async fn list_tools(&mut self) -> Result<Vec<McpTool>> {
        let response = self.request("tools/list", None).await?;
        let tool_list: ToolListResponse = serde_json::from_value(response)?;
        Ok(tool_list.tools)
    }

    /// Look a tool up by exact name. `None` means the server does not offer it.
    pub async fn find_tool(&mut self, name: &str) -> Result<Option<McpTool>> {
        let tools = self.list_tools().await?;
        Ok(tools.into_iter().find(|tool| tool.name == name))
    }

    pub async fn call_tool(&mut self, tool: &McpTool, arguments: Value) -> Result<ToolCallResult> {
        // Validate against the tool's declared schema before sending anything.
        if !tool.input_schema.is_null() {
            if let Err(validation_errors) = validate_tool_arguments(tool, &arguments) {
                return Err(DocSearchError::Invocation {
                    message: format!("Tool '{}' argument validation failed", tool.name),
                    cause: Some(validation_errors),
                });
            }
        }

        let params = json!({
            "name": tool.name,
            "arguments": arguments,
        });
        let response = self
            .request("tools/call", Some(params))
            .await
            .map_err(|e| DocSearchError::Invocation {
                message: format!("Tool '{}' call failed", tool.name),
                cause: Some(e.to_string()),
            })?;
        // A reply that transports fine but does not deserialize is still an
        // invocation failure from the caller's point of view.
        let result: ToolCallResult =
            serde_json::from_value(response).map_err(|e| DocSearchError::Invocation {
                message: format!("Tool '{}' returned a malformed reply", tool.name),
                cause: Some(e.to_string()),
            })?;
        Ok(result)
    }

    /// Tear the session down. Failures here are logged and swallowed so they
    /// can never mask an error already in flight.
    pub async fn close(&mut self, events: &mut EventLog) {
        if let Err(e) = self.transport.close().await {
            events.push(format!("Failed to close session: {}", e));
        } else {
            events.push("Session closed");
        }
    }
}

fn validate_tool_arguments(tool: &McpTool, arguments: &Value) -> std::result::Result<(), String> {
    let schema = match JSONSchema::compile(&tool.input_schema) {
        Ok(s) => s,
        Err(e) => return Err(format!("Invalid tool schema: {}", e)),
    };

    if let Err(errors) = schema.validate(arguments) {
        let error_messages: Vec<String> = errors
            .map(|e| format!("{}: {}", e.instance_path, e))
            .collect();
        return Err(error_messages.join("; "));
    }

    Ok(())
}
