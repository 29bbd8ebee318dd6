// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Type conversions between the MCP wire protocol and `wave-tools` types.
//!
//! Turns MCP server descriptors into `wave_tools::Tool` implementations
//! the engine's registry can dispatch like any other tool.
use serde_json::Value;
use wave_tools::{ToolOutput, ToolOutputPart, ToolSchema};

/// Builds the registry name an MCP-provided tool is exposed under:
/// `mcp__<server>__<tool>`.
pub fn namespaced_tool_name(server: &str, tool: &str) -> String {
    format!("mcp__{server}__{tool}")
}

/// Converts one entry of a `tools/list` response into a [`ToolSchema`].
pub fn mcp_tool_to_schema(server: &str, mcp_tool: &Value) -> Option<ToolSchema> {
    let name = mcp_tool.get("name")?.as_str()?.to_string();
    let description = mcp_tool
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let parameters = mcp_tool
        .get("inputSchema")
        .cloned()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    Some(ToolSchema {
        name: namespaced_tool_name(server, &name),
        description,
        parameters,
    })
}

/// Converts a `tools/call` result (MCP `content` array + `isError`) into a
/// [`ToolOutput`]. Unknown content block types degrade to their raw JSON
/// text rather than being dropped, so nothing silently disappears.
pub fn call_result_to_output(call_id: &str, result: &Value) -> ToolOutput {
    let is_error = result
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let parts: Vec<ToolOutputPart> = result
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| blocks.iter().filter_map(content_block_to_part).collect())
        .unwrap_or_default();

    if parts.is_empty() {
        if is_error {
            ToolOutput::err(call_id, "MCP tool call failed with no content")
        } else {
            ToolOutput::ok(call_id, "")
        }
    } else {
        let mut out = ToolOutput::with_parts(call_id, parts);
        out.is_error = is_error;
        out
    }
}

fn content_block_to_part(block: &Value) -> Option<ToolOutputPart> {
    match block.get("type").and_then(Value::as_str) {
        Some("text") => Some(ToolOutputPart::Text(
            block.get("text").and_then(Value::as_str)?.to_string(),
        )),
        Some("image") => {
            let data = block.get("data").and_then(Value::as_str)?;
            let mime = block
                .get("mimeType")
                .and_then(Value::as_str)
                .unwrap_or("application/octet-stream");
            Some(ToolOutputPart::Image(format!(
                "data:{mime};base64,{data}"
            )))
        }
        _ => Some(ToolOutputPart::Text(block.to_string())),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn namespaced_tool_name_matches_convention() {
        assert_eq!(namespaced_tool_name("github", "create_issue"), "mcp__github__create_issue");
    }

    #[test]
    fn mcp_tool_to_schema_extracts_fields() {
        let raw = json!({
            "name": "create_issue",
            "description": "Opens a GitHub issue",
            "inputSchema": {"type": "object", "properties": {"title": {"type": "string"}}}
        });
        let schema = mcp_tool_to_schema("github", &raw).unwrap();
        assert_eq!(schema.name, "mcp__github__create_issue");
        assert_eq!(schema.description, "Opens a GitHub issue");
        assert!(schema.parameters.get("properties").is_some());
    }

    #[test]
    fn mcp_tool_to_schema_missing_name_returns_none() {
        let raw = json!({"description": "no name"});
        assert!(mcp_tool_to_schema("github", &raw).is_none());
    }

    #[test]
    fn call_result_to_output_text_success() {
        let result = json!({"content": [{"type": "text", "text": "done"}], "isError": false});
        let out = call_result_to_output("c1", &result);
        assert!(!out.is_error);
        assert_eq!(out.content, "done");
    }

    #[test]
    fn call_result_to_output_marks_error() {
        let result = json!({"content": [{"type": "text", "text": "boom"}], "isError": true});
        let out = call_result_to_output("c1", &result);
        assert!(out.is_error);
    }

    #[test]
    fn call_result_to_output_image_block() {
        let result = json!({
            "content": [{"type": "image", "data": "AAAA", "mimeType": "image/png"}]
        });
        let out = call_result_to_output("c1", &result);
        assert!(out.has_images());
    }

    #[test]
    fn call_result_to_output_empty_content_is_ok_empty_text() {
        let result = json!({"content": []});
        let out = call_result_to_output("c1", &result);
        assert!(!out.is_error);
        assert_eq!(out.content, "");
    }
}
