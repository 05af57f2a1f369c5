use std::time::Duration;

use serde::Deserialize;

/// Router behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouterConfig {
    /// Deadline in seconds for an upstream to connect, handshake, and list
    /// its tools at startup
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,
    /// Default per-call deadline in seconds for proxied tool calls
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
    /// Number of tools returned by `tools/list` (built-in included)
    #[serde(default = "default_list_tools_count")]
    pub list_tools_count: usize,
}

impl RouterConfig {
    /// Startup deadline as a [`Duration`]
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    /// Per-call deadline as a [`Duration`]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            startup_timeout_secs: default_startup_timeout(),
            call_timeout_secs: default_call_timeout(),
            list_tools_count: default_list_tools_count(),
        }
    }
}

const fn default_startup_timeout() -> u64 {
    60
}

const fn default_call_timeout() -> u64 {
    30
}

const fn default_list_tools_count() -> usize {
    20
}
