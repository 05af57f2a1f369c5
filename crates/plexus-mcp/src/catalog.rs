//! Aggregated tool catalog
//!
//! The catalog is the authoritative map from public tool name to the
//! upstream that serves it. It is built once after startup and immutable
//! afterwards, so readers share it without synchronization.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::RouterError;

/// Public name of the built-in semantic search tool
pub const SEARCH_TOOL_NAME: &str = "search_tools";

/// Description advertised for the built-in search tool
pub const SEARCH_TOOL_DESCRIPTION: &str = "IMPORTANT: Use this tool FIRST when the user asks about a specific task \
     or domain (testing, issues, repositories, etc.). This returns the most \
     relevant tools for the user's request, reducing the number of tools you \
     need to consider. Provide a query describing what the user wants to do. \
     Example queries: 'test a web page', 'create a bug report', 'check \
     repository status'.";

/// Input schema of the built-in search tool
pub fn search_tool_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "Query describing what the user wants to do",
            },
            "context": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Optional context strings to enhance the query",
            },
        },
        "required": ["query"],
    })
}

/// A tool as reported by an upstream's `tools/list`
#[derive(Debug, Clone)]
pub struct NativeTool {
    pub name: String,
    pub description: String,
    /// Opaque JSON schema, carried through without interpretation
    pub input_schema: Value,
}

impl NativeTool {
    /// Parse one element of a `tools/list` result
    ///
    /// Tools without a name are dropped; missing descriptions and schemas
    /// get empty defaults.
    pub fn from_wire(tool: &Value) -> Option<Self> {
        let name = tool.get("name").and_then(Value::as_str)?;
        Some(Self {
            name: name.to_string(),
            description: tool
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            input_schema: tool
                .get("inputSchema")
                .cloned()
                .unwrap_or_else(|| serde_json::json!({"type": "object"})),
        })
    }
}

/// Native tools of one upstream together with its namespacing metadata
#[derive(Debug)]
pub struct UpstreamTools {
    pub upstream_id: String,
    pub prefix: String,
    pub category_description: Option<String>,
    pub tools: Vec<NativeTool>,
}

/// One public catalog entry
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    /// Catalog-unique name, `prefix.native_name` (the built-in has no prefix)
    pub public_name: String,
    /// Name the owning upstream knows the tool by
    pub native_name: String,
    pub description: String,
    pub input_schema: Value,
    /// `None` only for the built-in search tool
    pub upstream_id: Option<String>,
    /// Deterministic text the tool's embedding is computed from
    pub embedding_text: String,
}

/// The aggregated, namespaced tool catalog
#[derive(Debug)]
pub struct ToolCatalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl ToolCatalog {
    /// Aggregate native tools into a catalog
    ///
    /// Always inserts the built-in search tool. Fails on duplicate public
    /// names, which is a configuration error severe enough to abort startup.
    pub fn build(sources: Vec<UpstreamTools>) -> Result<Self, RouterError> {
        let mut entries = BTreeMap::new();

        let builtin = built_in_entry();
        entries.insert(builtin.public_name.clone(), builtin);

        for source in sources {
            for tool in source.tools {
                let public_name = format!("{}.{}", source.prefix, tool.name);
                let embedding_text = build_embedding_text(
                    &public_name,
                    &tool.description,
                    source.category_description.as_deref(),
                    &tool.input_schema,
                );

                let entry = CatalogEntry {
                    public_name: public_name.clone(),
                    native_name: tool.name,
                    description: tool.description,
                    input_schema: tool.input_schema,
                    upstream_id: Some(source.upstream_id.clone()),
                    embedding_text,
                };

                if entries.insert(public_name.clone(), entry).is_some() {
                    return Err(RouterError::CatalogConflict { name: public_name });
                }
            }
        }

        tracing::info!(tools = entries.len(), "tool catalog built");
        Ok(Self { entries })
    }

    /// Resolve a public name to its catalog entry
    pub fn lookup(&self, public_name: &str) -> Option<&CatalogEntry> {
        self.entries.get(public_name)
    }

    /// All entries in public-name order (built-in included)
    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    /// Number of entries, built-in included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn built_in_entry() -> CatalogEntry {
    let schema = search_tool_schema();
    let embedding_text = build_embedding_text(SEARCH_TOOL_NAME, SEARCH_TOOL_DESCRIPTION, None, &schema);
    CatalogEntry {
        public_name: SEARCH_TOOL_NAME.to_string(),
        native_name: SEARCH_TOOL_NAME.to_string(),
        description: SEARCH_TOOL_DESCRIPTION.to_string(),
        input_schema: schema,
        upstream_id: None,
        embedding_text,
    }
}

/// Render the frozen embedding-text template
///
/// `{public_name} | {description} | {category} | Parameters: {name} ({type}), …`
/// with empty components skipped. The parameter list covers the schema's
/// required properties in schema order. Identical inputs must produce
/// byte-identical text, so search results are reproducible across runs.
fn build_embedding_text(public_name: &str, description: &str, category: Option<&str>, schema: &Value) -> String {
    let mut parts: Vec<String> = vec![public_name.to_string()];

    if !description.is_empty() {
        parts.push(description.to_string());
    }
    if let Some(category) = category {
        if !category.is_empty() {
            parts.push(category.to_string());
        }
    }

    let required: Vec<String> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(|name| {
                    let param_type = schema
                        .get("properties")
                        .and_then(|p| p.get(name))
                        .and_then(|p| p.get("type"))
                        .and_then(Value::as_str)
                        .unwrap_or("any");
                    format!("{name} ({param_type})")
                })
                .collect()
        })
        .unwrap_or_default();

    if !required.is_empty() {
        parts.push(format!("Parameters: {}", required.join(", ")));
    }

    parts.join(" | ")
}
