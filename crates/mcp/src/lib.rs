#![forbid(unsafe_code)]

pub mod dispatch;
pub mod paper_search;
pub mod runtime;
pub mod section_assembler;
pub mod tools_impl;

use std::io::{BufRead, Write};

use serde_json::{Value, json};

pub use runtime::ToolRuntime;

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "review_mcp";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Runs the newline-delimited JSON-RPC request/response loop over the given reader/writer,
/// dispatching `tools/call` against `runtime`. Exits when the reader reaches EOF.
pub fn run_stdio_loop(
    runtime: &mut ToolRuntime,
    input: impl BufRead,
    mut output: impl Write,
) -> Result<(), std::io::Error> {
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let request: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(_) => continue,
        };

        let method = request.get("method").and_then(Value::as_str).unwrap_or_default();
        let id = request.get("id").cloned();

        if method == "notifications/initialized" {
            continue;
        }

        let response = match method {
            "initialize" => json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION },
                },
            }),
            "tools/call" => {
                let params = request.get("params").cloned().unwrap_or(Value::Null);
                let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
                let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
                let result = dispatch::dispatch(runtime, name, &arguments);
                json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "content": [{ "type": "text", "text": result.to_string() }],
                    },
                })
            }
            other => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": format!("method not found: {other}") },
            }),
        };

        writeln!(output, "{response}")?;
        output.flush()?;
    }

    Ok(())
}
