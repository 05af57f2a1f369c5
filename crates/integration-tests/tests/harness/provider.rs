//! Deterministic keyword-axis embedding provider
//!
//! Each axis is a keyword set; a text's vector component on an axis is the
//! number of that axis's keywords it contains. Gives tests semantic-style
//! ranking ("open a web page" lands near "navigate to a URL") with fully
//! predictable output.

use async_trait::async_trait;
use plexus_embeddings::{EmbeddingProvider, Result, vector};

pub struct KeywordProvider {
    axes: Vec<Vec<&'static str>>,
}

impl KeywordProvider {
    pub fn new(axes: Vec<Vec<&'static str>>) -> Self {
        Self { axes }
    }

    /// Axes covering the browsing/screenshot split used by the scenarios
    pub fn web_axes() -> Self {
        Self::new(vec![
            vec!["open", "navigate", "url", "web", "page", "browse"],
            vec!["screenshot", "capture", "image", "picture"],
            vec!["issue", "bug", "ticket", "report"],
        ])
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let lower = text.to_lowercase();
        let mut embedding: Vec<f32> = self
            .axes
            .iter()
            .map(|keywords| keywords.iter().filter(|k| lower.contains(**k)).count() as f32)
            .collect();
        vector::normalize(&mut embedding);
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.axes.len()
    }

    fn name(&self) -> &str {
        "keyword"
    }
}
