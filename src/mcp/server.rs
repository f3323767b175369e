//! Archive MCP Server implementation

use std::sync::Arc;

use anyhow::Result;
use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use chat_archive_search::core::timeline::statistics;
use chat_archive_search::search::router::validate_query;
use chat_archive_search::{SearchEngine, SearchResults};

use crate::commands::activity::activity_map;
use crate::commands::conversations::{list_rows, messages_of};

/// Parameters for archive_search tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchParams {
    /// Search query; wrap in double quotes for an exact match
    #[schemars(description = "Search query (min 3 chars). Wrap in double quotes for exact substring matching")]
    pub query: String,
}

/// Parameters for archive_conversations tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListParams {
    /// Maximum number of conversations (default: 100)
    #[schemars(description = "Maximum conversations to return (default: 100)")]
    #[serde(default = "default_list_limit")]
    pub limit: usize,
}

fn default_list_limit() -> usize {
    100
}

/// Parameters for archive_messages tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct MessagesParams {
    #[schemars(description = "Conversation id")]
    pub conversation_id: String,
}

#[derive(Debug, Serialize)]
struct SearchResponseJson<'a> {
    mode: &'a chat_archive_search::SearchMode,
    query: &'a str,
    results: &'a [chat_archive_search::SearchHit],
}

impl<'a> From<&'a SearchResults> for SearchResponseJson<'a> {
    fn from(r: &'a SearchResults) -> Self {
        Self {
            mode: &r.mode,
            query: &r.query,
            results: &r.hits,
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let output = serde_json::to_string_pretty(value).map_err(|e| {
        McpError::internal_error(format!("JSON serialization failed: {}", e), None)
    })?;
    Ok(CallToolResult::success(vec![Content::text(output)]))
}

/// Archive MCP Service
///
/// Every request borrows the same engine; nothing is mutated after startup.
#[derive(Clone)]
pub struct ArchiveService {
    engine: Arc<SearchEngine>,
    tool_router: ToolRouter<Self>,
}

impl ArchiveService {
    pub fn new(engine: Arc<SearchEngine>) -> Self {
        Self {
            engine,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl ArchiveService {
    /// Search conversations and messages
    #[tool(description = "Search the chat archive. Semantic (embedding) search when a backend is configured; queries wrapped in double quotes, or any query without a backend, use case-insensitive exact matching. Returns conversation and message hits.")]
    async fn archive_search(
        &self,
        params: Parameters<SearchParams>,
    ) -> Result<CallToolResult, McpError> {
        let query = params.0.query;
        validate_query(&query).map_err(|e| McpError::invalid_params(e.to_string(), None))?;

        // The embedding client blocks, keep it off the async workers
        let engine = Arc::clone(&self.engine);
        let results = tokio::task::spawn_blocking(move || engine.search(&query))
            .await
            .map_err(|e| McpError::internal_error(format!("Search task failed: {}", e), None))?
            .map_err(|e| McpError::internal_error(format!("Search failed: {}", e), None))?;

        to_json(&SearchResponseJson::from(&results))
    }

    /// List conversations, newest groups as exported
    #[tool(description = "List archived conversations with id, title, creation time and a relative time group.")]
    async fn archive_conversations(
        &self,
        params: Parameters<ListParams>,
    ) -> Result<CallToolResult, McpError> {
        // Clamp limit: default 100, max 1000
        let limit = match params.0.limit {
            0 => default_list_limit(),
            n => n.min(1000),
        };
        let rows: Vec<_> = list_rows(self.engine.archive()).into_iter().take(limit).collect();
        to_json(&rows)
    }

    /// Get all messages of one conversation
    #[tool(description = "Get every message (role, text, creation time) of one archived conversation.")]
    async fn archive_messages(
        &self,
        params: Parameters<MessagesParams>,
    ) -> Result<CallToolResult, McpError> {
        let id = &params.0.conversation_id;
        match self.engine.archive().get(id) {
            Some(conv) => to_json(&messages_of(conv)),
            None => Ok(CallToolResult::success(vec![Content::text(format!(
                "Conversation not found: {}",
                id
            ))])),
        }
    }

    /// Messages per day
    #[tool(description = "Number of messages per calendar day across the archive.")]
    async fn archive_activity(&self) -> Result<CallToolResult, McpError> {
        to_json(&activity_map(self.engine.archive()))
    }

    /// Archive statistics
    #[tool(description = "Archive statistics: first and last chat date, shortest, longest and average conversation length, and the three longest conversations.")]
    async fn archive_statistics(&self) -> Result<CallToolResult, McpError> {
        let mut stats = serde_json::to_value(statistics(self.engine.archive())).map_err(|e| {
            McpError::internal_error(format!("JSON serialization failed: {}", e), None)
        })?;
        stats["semantic_search"] = serde_json::json!(self.engine.semantic_enabled());
        to_json(&stats)
    }
}

#[tool_handler]
impl ServerHandler for ArchiveService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Chat archive MCP Server. Provides exact and semantic search over exported conversations.".to_string()
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Run the MCP server
pub async fn run_mcp_server(engine: Arc<SearchEngine>) -> Result<()> {
    use tokio::io::{stdin, stdout};

    let service = ArchiveService::new(engine);
    let transport = (stdin(), stdout());
    let server = service.serve(transport).await?;
    server.waiting().await?;

    Ok(())
}
