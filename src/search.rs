use serde_json::json;

use crate::error::{DocSearchError, Result};
use crate::events::EventLog;
use crate::mcp::{connect, ToolCallResult};

/// The one remote endpoint and tool this client talks to.
pub const MCP_ENDPOINT: &str = "https://learn.microsoft.com/api/mcp";
pub const SEARCH_TOOL: &str = "microsoft_docs_search";

/// Run one documentation search end to end: negotiate a session, confirm the
/// search tool exists, invoke it once, and close the session no matter what.
///
/// The returned reply is raw; callers run it through `normalize` (or forward
/// it untouched, as the proxy does). Every step appends to `events`.
pub async fn search_docs(
    endpoint: &str,
    query: &str,
    events: &mut EventLog,
) -> Result<ToolCallResult> {
    events.push(format!("Starting search with query: \"{}\"", query));

    let mut session = connect(endpoint, events).await?;

    events.push("Listing available tools");
    let tool = match session.find_tool(SEARCH_TOOL).await {
        Ok(Some(tool)) => {
            events.push(format!("Tool '{}' is available", SEARCH_TOOL));
            tool
        }
        Ok(None) => {
            // Never invoke a tool the server did not list.
            events.push(format!("Tool '{}' is not available on this server", SEARCH_TOOL));
            session.close(events).await;
            return Err(DocSearchError::ToolUnavailable(format!(
                "server does not offer '{}'",
                SEARCH_TOOL
            )));
        }
        Err(e) => {
            events.push(format!("Failed to list tools: {}", e));
            session.close(events).await;
            return Err(DocSearchError::ToolUnavailable(format!(
                "could not list tools: {}",
                e
            )));
        }
    };

    events.push(format!("Calling tool '{}'", SEARCH_TOOL));
    let result = session.call_tool(&tool, json!({ "query": query })).await;

    // Close even when the call failed, so the original error survives.
    session.close(events).await;

    match result {
        Ok(reply) => {
            events.push("Tool call completed");
            Ok(reply)
        }
        Err(e) => {
            events.push(format!("Tool call failed: {}", e));
            Err(e)
        }
    }
}
