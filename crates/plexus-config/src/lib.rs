#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod embeddings;
mod env;
mod loader;
mod router;
mod telemetry;
mod upstream;

use indexmap::IndexMap;
use serde::Deserialize;

pub use embeddings::{EmbeddingsConfig, ProviderKind};
pub use env::expand_env;
pub use router::RouterConfig;
pub use telemetry::{LogFormat, TelemetryConfig};
pub use upstream::{HttpConfig, StdioConfig, TransportConfig, UpstreamConfig};

/// Top-level router configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Upstream MCP server descriptors keyed by upstream id
    ///
    /// An empty table is valid: the router serves only the built-in
    /// `search_tools` tool.
    #[serde(default)]
    pub upstreams: IndexMap<String, UpstreamConfig>,
    /// Embedding provider selection
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    /// Router behavior knobs
    #[serde(default)]
    pub router: RouterConfig,
    /// Logging configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
