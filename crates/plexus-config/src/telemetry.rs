use serde::Deserialize;

/// Logging configuration
///
/// Logs always go to stderr: stdout carries the MCP protocol stream and
/// any stray bytes there would corrupt it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
    /// Log filter directive (overrides `RUST_LOG`)
    #[serde(default)]
    pub log_filter: Option<String>,
}

/// Log output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable single-line format
    #[default]
    Text,
    /// Structured JSON lines
    Json,
}
