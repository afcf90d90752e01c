//! CAD connector speaking MCP `tools/call` over HTTP JSON-RPC.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::{debug, instrument, warn};

use millwork_core::defaults::clamp_script_timeout;
use millwork_core::{
    BlockInstance, BoundingBox, CadConnector, CadLayer, DimensionAnnotation, DocumentInfo, Error,
    Result, ScriptOutput, TextLabel,
};

use crate::config::CadConfig;
use crate::script;

const TOOL_DOCUMENT_INFO: &str = "get_document_info";
const TOOL_EXECUTE_SCRIPT: &str = "execute_rhinoscript_python_code";

/// A tool result after removing the MCP content wrapper.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolPayload {
    Json(JsonValue),
    Raw(String),
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: ToolCall<'a>,
}

#[derive(Serialize)]
struct ToolCall<'a> {
    name: &'a str,
    arguments: JsonValue,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<JsonValue>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// HTTP JSON-RPC connector to the CAD tool's MCP bridge.
pub struct McpCadConnector {
    client: Client,
    config: CadConfig,
    next_id: AtomicU64,
}

impl McpCadConnector {
    pub fn new(config: CadConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;
        debug!(
            subsystem = "cad",
            component = "mcp",
            rpc_url = %config.rpc_url,
            timeout_secs = config.timeout_secs,
            "Initializing CAD connector"
        );
        Ok(Self {
            client,
            config,
            next_id: AtomicU64::new(1),
        })
    }

    /// Create from environment variables (see [`CadConfig::from_env`]).
    pub fn from_env() -> Result<Self> {
        Self::new(CadConfig::from_env())
    }

    pub fn config(&self) -> &CadConfig {
        &self.config
    }

    /// Invoke one MCP tool and unwrap its content.
    pub async fn call_tool(
        &self,
        tool: &str,
        arguments: JsonValue,
        timeout_secs: u64,
    ) -> Result<ToolPayload> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method: "tools/call",
            params: ToolCall {
                name: tool,
                arguments,
            },
        };

        let response = self
            .client
            .post(&self.config.rpc_url)
            .timeout(Duration::from_secs(timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| boundary_error(tool, timeout_secs, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ExternalBoundary(format!(
                "CAD bridge returned {status} for {tool}: {body}"
            )));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| Error::ExternalBoundary(format!("Malformed CAD bridge response: {e}")))?;

        if let Some(err) = body.error {
            return Err(Error::ExternalBoundary(format!(
                "CAD tool {tool} failed ({}): {}",
                err.code, err.message
            )));
        }
        let result = body
            .result
            .ok_or_else(|| Error::ExternalBoundary(format!("CAD tool {tool} returned no result")))?;
        Ok(unwrap_tool_result(result))
    }

    async fn run_read_script<T: serde::de::DeserializeOwned>(
        &self,
        source: &str,
        what: &str,
        timeout_secs: u64,
    ) -> Result<T> {
        let output = self.execute_script(source, Some(timeout_secs)).await?;
        if !output.success {
            return Err(Error::ExternalBoundary(format!(
                "{what} script failed: {}",
                output.error.unwrap_or_else(|| "unknown error".into())
            )));
        }
        script::parse_json_output(output.output.as_deref(), what)
    }
}

fn boundary_error(tool: &str, timeout_secs: u64, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::ExternalBoundary(format!("CAD tool {tool} timed out after {timeout_secs}s"))
    } else {
        Error::ExternalBoundary(format!("CAD bridge unreachable: {e}"))
    }
}

/// Strip the MCP wrapper: `{content: [{text}]}` or `{result: "<json>"}`.
/// Text that is itself JSON is decoded; anything else is kept raw.
pub fn unwrap_tool_result(result: JsonValue) -> ToolPayload {
    let inner = result
        .pointer("/content/0/text")
        .and_then(JsonValue::as_str)
        .or_else(|| result.get("result").and_then(JsonValue::as_str))
        .map(str::to_string);

    match inner {
        Some(text) => match serde_json::from_str(&text) {
            Ok(value) => ToolPayload::Json(value),
            Err(_) => ToolPayload::Raw(text),
        },
        None => ToolPayload::Json(result),
    }
}

/// Interpret the payload of `execute_rhinoscript_python_code`.
pub fn script_output_from_payload(payload: ToolPayload, execution_time_ms: u64) -> ScriptOutput {
    let ok = |output: String| ScriptOutput {
        success: true,
        output: Some(output),
        error: None,
        execution_time_ms,
    };
    let failed = |error: String| ScriptOutput {
        success: false,
        output: None,
        error: Some(error),
        execution_time_ms,
    };

    match payload {
        ToolPayload::Raw(text) => {
            let lower = text.to_lowercase();
            if lower.starts_with("error") || lower.contains("error:") {
                failed(text)
            } else {
                ok(script::extract_print_output(&text))
            }
        }
        ToolPayload::Json(JsonValue::String(text)) => ok(script::extract_print_output(&text)),
        ToolPayload::Json(value) => match value.get("success").and_then(JsonValue::as_bool) {
            Some(true) => match value.get("result").and_then(JsonValue::as_str) {
                Some(text) => ok(script::extract_print_output(text)),
                None => ok(value.to_string()),
            },
            Some(false) => failed(
                value
                    .get("error")
                    .and_then(JsonValue::as_str)
                    .unwrap_or("Unknown error")
                    .to_string(),
            ),
            // A bare JSON document is what the script printed.
            None => ok(value.to_string()),
        },
    }
}

#[async_trait]
impl CadConnector for McpCadConnector {
    #[instrument(skip(self), fields(subsystem = "cad", component = "mcp", op = "document_info"))]
    async fn document_info(&self) -> Result<DocumentInfo> {
        match self
            .call_tool(TOOL_DOCUMENT_INFO, json!({}), self.config.timeout_secs)
            .await?
        {
            ToolPayload::Json(value) => serde_json::from_value(value).map_err(|e| {
                Error::ExternalBoundary(format!("malformed document info: {e}"))
            }),
            ToolPayload::Raw(text) => {
                let mut info = DocumentInfo::default();
                info.extra.insert("raw".to_string(), JsonValue::String(text));
                Ok(info)
            }
        }
    }

    async fn layers(&self) -> Result<Vec<CadLayer>> {
        self.run_read_script(script::LAYERS_SCRIPT, "layers", self.config.timeout_secs)
            .await
    }

    async fn groups(&self) -> Result<Vec<String>> {
        self.run_read_script(script::GROUPS_SCRIPT, "groups", self.config.timeout_secs)
            .await
    }

    async fn group_bounding_box(&self, group: &str) -> Result<Option<BoundingBox>> {
        self.run_read_script(
            &script::group_bounding_box_script(group),
            "bounding box",
            self.config.timeout_secs,
        )
        .await
    }

    async fn text_objects(&self) -> Result<Vec<TextLabel>> {
        self.run_read_script(
            script::TEXT_OBJECTS_SCRIPT,
            "text objects",
            self.config.long_timeout_secs,
        )
        .await
    }

    async fn dimensions(&self) -> Result<Vec<DimensionAnnotation>> {
        self.run_read_script(
            script::DIMENSIONS_SCRIPT,
            "dimensions",
            self.config.long_timeout_secs,
        )
        .await
    }

    async fn block_instances(&self) -> Result<Vec<BlockInstance>> {
        self.run_read_script(
            script::BLOCK_INSTANCES_SCRIPT,
            "block instances",
            self.config.long_timeout_secs,
        )
        .await
    }

    #[instrument(
        skip(self, source),
        fields(subsystem = "cad", component = "mcp", op = "execute_script", prompt_len = source.len())
    )]
    async fn execute_script(&self, source: &str, timeout_secs: Option<u64>) -> Result<ScriptOutput> {
        let timeout = clamp_script_timeout(timeout_secs.or(Some(self.config.timeout_secs)));
        let start = Instant::now();

        let payload = self
            .call_tool(TOOL_EXECUTE_SCRIPT, json!({ "code": source }), timeout)
            .await?;
        let elapsed = start.elapsed().as_millis() as u64;
        let output = script_output_from_payload(payload, elapsed);

        if output.success {
            debug!(
                duration_ms = elapsed,
                response_len = output.output.as_ref().map_or(0, String::len),
                "Script executed"
            );
        } else {
            warn!(
                duration_ms = elapsed,
                error = output.error.as_deref().unwrap_or_default(),
                "Script reported failure"
            );
        }
        Ok(output)
    }
}
