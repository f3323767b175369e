//! MCP Server for the chat archive
//!
//! Exposes search, conversation browsing, activity and statistics as tools.

mod server;

pub use server::run_mcp_server;
