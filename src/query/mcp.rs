//! Tool server over stdio (newline-delimited JSON-RPC 2.0).
//!
//! stdout carries protocol frames only; logs go to stderr.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use super::{tool_definitions, QueryInterface};

const PROTOCOL_VERSION: &str = "2024-11-05";

const INSTRUCTIONS: &str = "\
Hybrid code search over the project's indexed source.\n\
\n\
1) get_file_structure for layout\n\
2) search_code for candidate locations (lexical + semantic)\n\
3) search_by_symbol when a function or class name is known\n\
4) get_similar_patterns to find code resembling a snippet\n\
\n\
Call reindex after editing files so results reflect the change.";

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[serde(rename = "jsonrpc")]
    _jsonrpc: String,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

impl JsonRpcResponse {
    fn result(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError { code, message }),
        }
    }
}

/// Serve requests from stdin until it closes.
pub async fn run(interface: &mut QueryInterface) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    info!("Tool server listening on stdio");

    while let Some(line) = lines.next_line().await? {
        if let Some(reply) = handle_message(interface, &line).await {
            stdout.write_all(reply.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }
    debug!("stdin closed, stopping tool server");
    Ok(())
}

/// Handle one frame, returning the serialized reply if one is due.
pub async fn handle_message(interface: &mut QueryInterface, line: &str) -> Option<String> {
    if line.trim().is_empty() {
        return None;
    }

    let response = match serde_json::from_str::<JsonRpcRequest>(line) {
        Ok(req) => {
            // Notifications have no id and get no response
            req.id.as_ref()?;
            handle_request(interface, req).await
        }
        Err(err) => JsonRpcResponse::error(None, -32700, format!("parse error: {}", err)),
    };
    serde_json::to_string(&response).ok()
}

async fn handle_request(interface: &mut QueryInterface, req: JsonRpcRequest) -> JsonRpcResponse {
    match req.method.as_str() {
        "initialize" => JsonRpcResponse::result(
            req.id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION")
                },
                "instructions": INSTRUCTIONS
            }),
        ),
        "ping" => JsonRpcResponse::result(req.id, json!({})),
        "tools/list" => JsonRpcResponse::result(req.id, json!({ "tools": tool_definitions() })),
        "tools/call" => {
            let name = req
                .params
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let args = req.params.get("arguments").unwrap_or(&Value::Null);
            debug!(tool = name, "Tool call");
            let response = interface.call_tool(name, args).await;
            match serde_json::to_value(&response) {
                Ok(value) => JsonRpcResponse::result(req.id, value),
                Err(e) => JsonRpcResponse::error(req.id, -32603, format!("internal error: {}", e)),
            }
        }
        other => JsonRpcResponse::error(req.id, -32601, format!("method not found: {}", other)),
    }
}
