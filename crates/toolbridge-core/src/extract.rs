//! Tool-call extraction from model output
//!
//! Models request tools with a two-line text convention:
//!
//! ```text
//! TOOL: tool_name
//! PARAMETERS: {"param1": "value1"}
//! ```
//!
//! Extraction is lenient on purpose: a call with malformed parameter JSON
//! still comes back (with empty arguments) so the model's intent survives,
//! and models that only narrate tool use fall back to a substring match.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use toolbridge_mcp::McpTool;

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
}

/// Matches the marker pair up to the opening brace of the parameter object
static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"TOOL:\s*([\w\-]+)\s*[\n\r]+\s*PARAMETERS:\s*`*(\{)").unwrap()
});

/// Extract tool calls from model text, in document order.
///
/// `known_tools` is only consulted by the narrated-use fallback; the
/// primary scan accepts any name matching the marker charset. Pure
/// function of its inputs.
pub fn extract_tool_calls(text: &str, known_tools: &[McpTool]) -> Vec<ToolCall> {
    let mut calls = Vec::new();
    let mut search_from = 0;

    while let Some(caps) = MARKER_RE.captures(&text[search_from..]) {
        let Some(brace) = caps.get(2) else { break };
        let name = caps[1].to_string();

        let json_start = search_from + brace.start();
        let span = balanced_object_span(&text[json_start..]);
        let raw = &text[json_start..json_start + span];

        // Models sometimes wrap the object in markdown fences
        let cleaned = raw.trim_matches('`').trim();

        let arguments = match serde_json::from_str::<Value>(cleaned) {
            Ok(Value::Object(map)) => Value::Object(map),
            // Malformed parameters still signal intent to call the tool
            _ => Value::Object(Map::new()),
        };

        calls.push(ToolCall { name, arguments });
        search_from = json_start + span;
    }

    // Fallback: some models narrate tool use instead of emitting the
    // convention. Only when nothing matched and a tool list was supplied.
    if calls.is_empty() && !known_tools.is_empty() {
        let lowered = text.to_lowercase();
        for tool in known_tools {
            let mention = format!("use the {} tool", tool.name.to_lowercase());
            if lowered.contains(&mention) {
                calls.push(ToolCall {
                    name: tool.name.clone(),
                    arguments: Value::Object(Map::new()),
                });
            }
        }
    }

    calls
}

/// Length of the brace-balanced `{...}` span at the start of `s`, string
/// literals accounted for. Returns the whole remainder when the braces
/// never close; the downstream parse failure degrades that call to empty
/// arguments.
fn balanced_object_span(s: &str) -> usize {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return i + c.len_utf8();
                }
            }
            _ => {}
        }
    }

    s.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(name: &str) -> McpTool {
        McpTool {
            name: name.to_string(),
            description: format!("The {} tool", name),
            input_schema: Value::Null,
        }
    }

    #[test]
    fn test_extracts_well_formed_call() {
        let text = "Let me check.\nTOOL: search\nPARAMETERS: {\"query\": \"rust\"}\nDone.";
        let calls = extract_tool_calls(text, &[]);

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "search");
        assert_eq!(calls[0].arguments, json!({"query": "rust"}));
    }

    #[test]
    fn test_extracts_multiple_calls_in_document_order() {
        let text = "TOOL: first\nPARAMETERS: {\"a\": 1}\n\nsome text\n\nTOOL: second\nPARAMETERS: {\"b\": 2}";
        let calls = extract_tool_calls(text, &[]);

        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "first");
        assert_eq!(calls[1].name, "second");
    }

    #[test]
    fn test_multiline_nested_parameters() {
        let text = "TOOL: write\nPARAMETERS: {\n  \"file\": \"a.txt\",\n  \"meta\": {\"mode\": \"append\"}\n}";
        let calls = extract_tool_calls(text, &[]);

        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].arguments,
            json!({"file": "a.txt", "meta": {"mode": "append"}})
        );
    }

    #[test]
    fn test_braces_inside_strings_do_not_end_the_span() {
        let text = "TOOL: echo\nPARAMETERS: {\"text\": \"closing } brace\"}";
        let calls = extract_tool_calls(text, &[]);

        assert_eq!(calls[0].arguments, json!({"text": "closing } brace"}));
    }

    #[test]
    fn test_invalid_json_degrades_to_empty_arguments() {
        let text = "TOOL: search\nPARAMETERS: {\"query\": oops}";
        let calls = extract_tool_calls(text, &[]);

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "search");
        assert_eq!(calls[0].arguments, json!({}));
    }

    #[test]
    fn test_unclosed_object_degrades_to_empty_arguments() {
        let text = "TOOL: search\nPARAMETERS: {\"query\": \"rust\"";
        let calls = extract_tool_calls(text, &[]);

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments, json!({}));
    }

    #[test]
    fn test_strips_markdown_backticks() {
        let text = "TOOL: search\nPARAMETERS: `{\"query\": \"rust\"}`";
        let calls = extract_tool_calls(text, &[]);

        assert_eq!(calls[0].arguments, json!({"query": "rust"}));
    }

    #[test]
    fn test_hyphenated_tool_names() {
        let text = "TOOL: file-upload\nPARAMETERS: {}";
        let calls = extract_tool_calls(text, &[]);

        assert_eq!(calls[0].name, "file-upload");
    }

    #[test]
    fn test_fallback_on_narrated_use() {
        let tools = vec![tool("search")];
        let calls = extract_tool_calls("I would use the Search tool for this.", &tools);

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "search");
        assert_eq!(calls[0].arguments, json!({}));
    }

    #[test]
    fn test_fallback_skipped_when_convention_matched() {
        let tools = vec![tool("search"), tool("fetch")];
        let text = "Use the fetch tool? No - TOOL: search\nPARAMETERS: {}";
        let calls = extract_tool_calls(text, &tools);

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "search");
    }

    #[test]
    fn test_no_calls_in_plain_text() {
        let tools = vec![tool("search")];
        assert!(extract_tool_calls("The answer is 4.", &tools).is_empty());
    }
}
