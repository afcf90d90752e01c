//! CAD boundary configuration.

use millwork_core::defaults;

/// Connection settings for the CAD MCP bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct CadConfig {
    /// JSON-RPC endpoint of the MCP bridge.
    pub rpc_url: String,
    /// Timeout for metadata calls and scripts that do not ask for one.
    pub timeout_secs: u64,
    /// Timeout for bulk reads (text objects, dimensions, blocks).
    pub long_timeout_secs: u64,
}

impl Default for CadConfig {
    fn default() -> Self {
        Self {
            rpc_url: defaults::CAD_RPC_URL.to_string(),
            timeout_secs: defaults::SCRIPT_TIMEOUT_SECS,
            long_timeout_secs: defaults::SCRIPT_LONG_TIMEOUT_SECS,
        }
    }
}

impl CadConfig {
    /// Load from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `CAD_RPC_URL` | `http://127.0.0.1:8765/mcp` |
    /// | `CAD_TIMEOUT_SECS` | `30` |
    /// | `CAD_LONG_TIMEOUT_SECS` | `120` |
    ///
    /// Both timeouts are clamped to the allowed script window.
    pub fn from_env() -> Self {
        let rpc_url =
            std::env::var("CAD_RPC_URL").unwrap_or_else(|_| defaults::CAD_RPC_URL.to_string());
        let timeout_secs = std::env::var("CAD_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok());
        let long_timeout_secs = std::env::var("CAD_LONG_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::SCRIPT_LONG_TIMEOUT_SECS);

        Self {
            rpc_url,
            timeout_secs: defaults::clamp_script_timeout(timeout_secs),
            long_timeout_secs: defaults::clamp_script_timeout(Some(long_timeout_secs)),
        }
    }

    pub fn with_url(mut self, rpc_url: impl Into<String>) -> Self {
        self.rpc_url = rpc_url.into();
        self
    }
}
