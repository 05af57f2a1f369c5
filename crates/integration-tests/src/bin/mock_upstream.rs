//! Minimal MCP server used as a real child-process upstream in tests
//!
//! Each CLI argument of the form `name=description` declares one tool.
//! Tool behavior mirrors the in-process mock: `never` hangs, `fail`
//! returns an error, anything else echoes its name and arguments.

use std::io::{BufRead, Write};

use serde_json::Value;

fn main() {
    let tools: Vec<(String, String)> = std::env::args()
        .skip(1)
        .filter_map(|arg| {
            arg.split_once('=')
                .map(|(name, description)| (name.to_string(), description.to_string()))
        })
        .collect();

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut stdout = stdout.lock();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        let Ok(message) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        let Some(method) = message.get("method").and_then(Value::as_str) else {
            continue;
        };
        let Some(id) = message.get("id").cloned() else {
            continue; // notification
        };

        let reply = match method {
            "initialize" => serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "mock-upstream", "version": "0.0.0"},
                },
            }),
            "tools/list" => {
                let tool_list: Vec<Value> = tools
                    .iter()
                    .map(|(name, description)| {
                        serde_json::json!({
                            "name": name,
                            "description": description,
                            "inputSchema": {
                                "type": "object",
                                "properties": {"url": {"type": "string"}},
                                "required": ["url"],
                            },
                        })
                    })
                    .collect();
                serde_json::json!({"jsonrpc": "2.0", "id": id, "result": {"tools": tool_list}})
            }
            "tools/call" => {
                let name = message["params"]["name"].as_str().unwrap_or("");
                match name {
                    "never" => continue,
                    "fail" => serde_json::json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": {"code": -32050, "message": "boom", "data": {"detail": "broken"}},
                    }),
                    _ => serde_json::json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "result": {
                            "content": [{"type": "text", "text": name}],
                            "isError": false,
                            "arguments": message["params"]["arguments"],
                        },
                    }),
                }
            }
            _ => continue,
        };

        let Ok(encoded) = serde_json::to_string(&reply) else {
            continue;
        };
        if writeln!(stdout, "{encoded}").is_err() || stdout.flush().is_err() {
            break;
        }
    }
}
