//! Semantic tool index
//!
//! Holds one unit vector per catalog entry and ranks them by cosine
//! similarity, which on unit vectors is a plain dot product. Built once
//! after the catalog is finalized; read-only afterwards.

use std::collections::BTreeMap;
use std::collections::VecDeque;

use plexus_embeddings::{EmbeddingProvider, EmbeddingsError, vector};

use crate::catalog::ToolCatalog;
use crate::error::RouterError;

/// One indexed tool
#[derive(Debug)]
pub struct IndexEntry {
    pub public_name: String,
    /// `None` for the built-in search tool
    pub upstream_id: Option<String>,
    vector: Vec<f32>,
}

/// A ranked search hit
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked {
    pub public_name: String,
    pub similarity: f32,
}

/// The embedding index over the catalog
#[derive(Debug)]
pub struct ToolIndex {
    /// Sorted by public name so build results are deterministic
    entries: Vec<IndexEntry>,
}

impl ToolIndex {
    /// Embed every catalog entry and build the index
    ///
    /// Embeddings are computed concurrently; entries are stored sorted by
    /// public name regardless of completion order. Any embedding failure
    /// aborts the build (fatal at startup).
    pub async fn build(catalog: &ToolCatalog, provider: &dyn EmbeddingProvider) -> Result<Self, RouterError> {
        let catalog_entries: Vec<_> = catalog.entries().collect();

        let vectors = futures::future::try_join_all(
            catalog_entries.iter().map(|entry| provider.embed(&entry.embedding_text)),
        )
        .await?;

        let mut entries = Vec::with_capacity(catalog_entries.len());
        for (entry, mut vector) in catalog_entries.into_iter().zip(vectors) {
            if vector.len() != provider.dimension() {
                return Err(RouterError::EmbeddingUnavailable(EmbeddingsError::DimensionMismatch {
                    expected: provider.dimension(),
                    actual: vector.len(),
                }));
            }
            // Providers promise unit vectors; normalize anyway so ranking
            // stays a pure dot product
            vector::normalize(&mut vector);
            entries.push(IndexEntry {
                public_name: entry.public_name.clone(),
                upstream_id: entry.upstream_id.clone(),
                vector,
            });
        }

        entries.sort_by(|a, b| a.public_name.cmp(&b.public_name));

        tracing::debug!(entries = entries.len(), "tool index built");
        Ok(Self { entries })
    }

    /// Top-k entries by cosine similarity to the query vector
    ///
    /// Descending similarity; ties break lexicographically by public name.
    /// `k` larger than the candidate set returns everything. `filter`
    /// restricts the candidates (used to exclude the built-in).
    pub fn rank<F>(&self, query: &[f32], k: usize, filter: F) -> Vec<Ranked>
    where
        F: Fn(&IndexEntry) -> bool,
    {
        let mut ranked: Vec<Ranked> = self
            .entries
            .iter()
            .filter(|entry| filter(entry))
            .map(|entry| Ranked {
                public_name: entry.public_name.clone(),
                similarity: vector::dot(query, &entry.vector),
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.public_name.cmp(&b.public_name))
        });
        ranked.truncate(k);
        ranked
    }

    /// Deterministic diversity-oriented subset for `tools/list`
    ///
    /// Round-robin over upstream ids in sorted order, each turn taking that
    /// upstream's lexicographically smallest not-yet-chosen name. The
    /// built-in (no upstream id) is excluded; the server always lists it
    /// separately.
    pub fn default_subset(&self, n: usize) -> Vec<&str> {
        let mut by_upstream: BTreeMap<&str, VecDeque<&str>> = BTreeMap::new();
        // Entries are sorted by public name, so every queue is already in
        // lexicographic order
        for entry in &self.entries {
            if let Some(ref upstream_id) = entry.upstream_id {
                by_upstream
                    .entry(upstream_id.as_str())
                    .or_default()
                    .push_back(entry.public_name.as_str());
            }
        }

        let mut subset = Vec::with_capacity(n.min(self.entries.len()));
        while subset.len() < n {
            let mut picked_any = false;
            for queue in by_upstream.values_mut() {
                if subset.len() >= n {
                    break;
                }
                if let Some(name) = queue.pop_front() {
                    subset.push(name);
                    picked_any = true;
                }
            }
            if !picked_any {
                break;
            }
        }
        subset
    }

    /// Number of indexed entries (equals the catalog size)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
