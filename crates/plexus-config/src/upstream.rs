use std::collections::HashMap;

use serde::Deserialize;
use url::Url;

/// Descriptor for a single upstream MCP server
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Transport used to reach the upstream
    #[serde(flatten)]
    pub transport: TransportConfig,
    /// Namespace prefix for this upstream's tools (defaults to the upstream id)
    #[serde(default)]
    pub semantic_prefix: Option<String>,
    /// Free-text category appended to every tool's embedding text
    #[serde(default)]
    pub category_description: Option<String>,
}

impl UpstreamConfig {
    /// The namespace prefix, falling back to the upstream id
    pub fn prefix<'a>(&'a self, upstream_id: &'a str) -> &'a str {
        self.semantic_prefix.as_deref().unwrap_or(upstream_id)
    }
}

/// Upstream transport types
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Child process speaking newline-delimited JSON on stdio
    Stdio(StdioConfig),
    /// HTTP endpoint with a long-lived SSE event stream
    Sse(HttpConfig),
    /// Plain HTTP request/response endpoint
    Http(HttpConfig),
}

/// STDIO transport configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StdioConfig {
    /// Command to execute
    pub command: String,
    /// Command arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables for the child process
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// HTTP/SSE transport configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Upstream endpoint URL
    #[serde(alias = "url")]
    pub endpoint: Url,
}
