//! Semantic search over the tool catalog

use std::sync::Arc;

use plexus_embeddings::{EmbeddingProvider, vector};
use serde::Serialize;

use crate::catalog::{SEARCH_TOOL_NAME, ToolCatalog};
use crate::error::RouterError;
use crate::index::ToolIndex;

/// Number of results returned per search
pub const DEFAULT_TOP_K: usize = 10;

/// One search result
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub public_name: String,
    pub description: String,
    /// Cosine similarity in [-1, 1]
    pub similarity: f32,
}

/// Serves `search_tools` queries against the immutable index
pub struct SearchService {
    catalog: Arc<ToolCatalog>,
    index: Arc<ToolIndex>,
    provider: Arc<dyn EmbeddingProvider>,
}

impl SearchService {
    pub fn new(catalog: Arc<ToolCatalog>, index: Arc<ToolIndex>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            catalog,
            index,
            provider,
        }
    }

    /// Rank catalog tools against a natural-language query
    ///
    /// Context strings are appended to the query, one per line, in the
    /// given order. The built-in search tool never appears in results.
    pub async fn search(&self, query: &str, context: &[String]) -> Result<Vec<SearchHit>, RouterError> {
        if query.trim().is_empty() {
            return Err(RouterError::InvalidParams("query must not be empty".to_string()));
        }

        let text = combine_query_and_context(query, context);

        let mut query_vector = self
            .provider
            .embed(&text)
            .await
            .map_err(RouterError::SearchUnavailable)?;
        vector::normalize(&mut query_vector);

        let ranked = self
            .index
            .rank(&query_vector, DEFAULT_TOP_K, |entry| entry.public_name != SEARCH_TOOL_NAME);

        let hits = ranked
            .into_iter()
            .map(|ranked| {
                let description = self
                    .catalog
                    .lookup(&ranked.public_name)
                    .map(|entry| entry.description.clone())
                    .unwrap_or_default();
                SearchHit {
                    public_name: ranked.public_name,
                    description,
                    similarity: ranked.similarity,
                }
            })
            .collect();

        Ok(hits)
    }
}

/// Query text construction: query first, then each context entry on its
/// own line, order preserved
fn combine_query_and_context(query: &str, context: &[String]) -> String {
    if context.is_empty() {
        return query.to_string();
    }
    let mut text = query.to_string();
    for entry in context {
        text.push('\n');
        text.push_str(entry);
    }
    text
}
