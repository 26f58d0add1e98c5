pub mod cli;
pub mod error;
pub mod events;
pub mod mcp;
pub mod normalize;
pub mod search;
pub mod server;
pub mod ui;
