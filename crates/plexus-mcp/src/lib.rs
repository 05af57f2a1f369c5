#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod catalog;
pub mod error;
pub mod index;
pub mod protocol;
pub mod search;
pub mod server;
pub mod session;
pub mod testing;
pub mod transport;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use plexus_config::Config;
use plexus_embeddings::EmbeddingProvider;

use catalog::{NativeTool, ToolCatalog, UpstreamTools};
use index::ToolIndex;
use search::SearchService;
use session::UpstreamSession;

pub use error::RouterError;
pub use server::serve;

/// Router knobs that survive past startup
pub struct RouterOptions {
    /// Default deadline for proxied tool calls
    pub call_timeout: Duration,
    /// Number of tools returned by `tools/list`, built-in included
    pub list_tools_count: usize,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            list_tools_count: 20,
        }
    }
}

/// An upstream that reached ready during startup, with its namespacing
/// metadata and discovered tools
pub struct ConnectedUpstream {
    pub session: UpstreamSession,
    pub prefix: String,
    pub category_description: Option<String>,
    pub tools: Vec<NativeTool>,
}

/// Shared router state: sessions, catalog, index, and search
///
/// Built once at startup; the catalog and index are immutable afterwards,
/// so the state is shared via `Arc` without further synchronization.
pub struct RouterState {
    sessions: HashMap<String, UpstreamSession>,
    /// prefix → upstream id for every configured upstream, including ones
    /// that failed to start; routing uses this to distinguish "unknown
    /// tool" from "tool on an unavailable upstream"
    prefixes: HashMap<String, String>,
    catalog: Arc<ToolCatalog>,
    index: Arc<ToolIndex>,
    search: SearchService,
    options: RouterOptions,
}

impl RouterState {
    /// Startup sequence: connect every configured upstream concurrently,
    /// aggregate the catalog, and build the semantic index
    ///
    /// Upstreams that fail to start (or miss the startup deadline) are
    /// logged and excluded. Fatal errors: every upstream failed (with at
    /// least one configured), duplicate public names, or an unavailable
    /// embedding provider.
    pub async fn connect(config: &Config, provider: Arc<dyn EmbeddingProvider>) -> Result<Self, RouterError> {
        let startup_timeout = config.router.startup_timeout();

        let startups = config.upstreams.iter().map(|(id, upstream)| {
            let connector = transport::connector_for(&upstream.transport);
            let id = id.clone();
            let prefix = upstream.prefix(&id).to_string();
            let category_description = upstream.category_description.clone();

            async move {
                match tokio::time::timeout(startup_timeout, UpstreamSession::start(id.clone(), connector)).await {
                    Ok(Ok((session, tools))) => Some(ConnectedUpstream {
                        session,
                        prefix,
                        category_description,
                        tools,
                    }),
                    Ok(Err(e)) => {
                        tracing::error!(upstream = %id, error = %e, "upstream failed to start, excluding");
                        None
                    }
                    Err(_) => {
                        tracing::error!(
                            upstream = %id,
                            timeout_secs = startup_timeout.as_secs(),
                            "upstream startup deadline elapsed, excluding"
                        );
                        None
                    }
                }
            }
        });

        let connected: Vec<ConnectedUpstream> = join_all(startups).await.into_iter().flatten().collect();

        if connected.is_empty() && !config.upstreams.is_empty() {
            return Err(RouterError::AllUpstreamsFailed);
        }

        let prefixes = config
            .upstreams
            .iter()
            .map(|(id, upstream)| (upstream.prefix(id).to_string(), id.clone()))
            .collect();

        let options = RouterOptions {
            call_timeout: config.router.call_timeout(),
            list_tools_count: config.router.list_tools_count,
        };

        Self::assemble(connected, prefixes, provider, options).await
    }

    /// Build the catalog, index, and search service over already-connected
    /// upstreams
    ///
    /// `prefixes` must cover every configured upstream, connected or not.
    pub async fn assemble(
        upstreams: Vec<ConnectedUpstream>,
        prefixes: HashMap<String, String>,
        provider: Arc<dyn EmbeddingProvider>,
        options: RouterOptions,
    ) -> Result<Self, RouterError> {
        let mut sessions = HashMap::new();
        let mut sources = Vec::new();

        for upstream in upstreams {
            sources.push(UpstreamTools {
                upstream_id: upstream.session.id().to_string(),
                prefix: upstream.prefix,
                category_description: upstream.category_description,
                tools: upstream.tools,
            });
            sessions.insert(upstream.session.id().to_string(), upstream.session);
        }

        let catalog = Arc::new(ToolCatalog::build(sources)?);
        let index = Arc::new(ToolIndex::build(&catalog, provider.as_ref()).await?);
        let search = SearchService::new(Arc::clone(&catalog), Arc::clone(&index), provider);

        tracing::info!(
            upstreams = sessions.len(),
            tools = catalog.len(),
            "router initialized"
        );

        Ok(Self {
            sessions,
            prefixes,
            catalog,
            index,
            search,
            options,
        })
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn index(&self) -> &ToolIndex {
        &self.index
    }

    pub fn search(&self) -> &SearchService {
        &self.search
    }

    /// Session by upstream id, if it started
    pub fn session(&self, upstream_id: &str) -> Option<&UpstreamSession> {
        self.sessions.get(upstream_id)
    }

    /// Configured upstream id owning the given namespace prefix
    pub fn upstream_for_prefix(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(String::as_str)
    }

    pub fn call_timeout(&self) -> Duration {
        self.options.call_timeout
    }

    pub fn list_tools_count(&self) -> usize {
        self.options.list_tools_count
    }

    /// Stop every session in parallel
    pub async fn shutdown(&self) {
        tracing::info!("stopping upstream sessions");
        join_all(self.sessions.values().map(UpstreamSession::stop)).await;
    }
}
