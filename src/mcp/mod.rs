pub mod client;
pub mod transport;
pub mod types;

pub use client::{connect, McpSession};
pub use transport::TransportKind;
pub use types::{McpTool, ToolCallResult, ToolContent};
