//! Query orchestration loop
//!
//! Drives one conversation: stream a model turn, scan it for tool calls,
//! execute them in order against the session, feed the results back, and
//! repeat until the model stops asking for tools or the turn budget runs
//! out. The budget guarantees termination no matter what the model does.

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use toolbridge_mcp::{McpTool, ToolSession};

use crate::error::Result;
use crate::extract::{extract_tool_calls, ToolCall};
use crate::formatting::{format_tool_result, validate_tool_args};
use crate::provider::{LanguageModel, Message};

/// Maximum number of model turns per query
pub const MAX_TURNS: usize = 10;

/// Progress events emitted while a query runs
#[derive(Debug, Clone, PartialEq)]
pub enum QueryEvent {
    /// A chunk of model output text
    Chunk(String),
    /// A tool is about to run
    ToolCall { name: String, arguments: Value },
    /// A tool finished, successfully or not
    ToolResult {
        name: String,
        success: bool,
        text: String,
    },
    /// Out-of-band notice, e.g. the turn budget was reached
    Notice(String),
}

/// Render the tool catalog injected into the first user turn.
///
/// The layout is load-bearing: existing prompts teach models this exact
/// format, so it must not drift.
pub fn render_tool_info(tools: &[McpTool]) -> String {
    let mut info = String::from("\n\nAvailable tools:\n");

    for tool in tools {
        info.push_str(&format!("- {}: {}\n", tool.name, tool.description));

        if let Some(properties) = tool.input_schema.get("properties").and_then(Value::as_object) {
            info.push_str("  Parameters:\n");
            let required = tool.input_schema.get("required").and_then(Value::as_array);
            for (param_name, details) in properties {
                let is_required = required
                    .map(|r| r.iter().any(|v| v.as_str() == Some(param_name)))
                    .unwrap_or(false);
                let req_tag = if is_required { " (required)" } else { "" };
                let description = details
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                info.push_str(&format!("    - {}{}: {}\n", param_name, req_tag, description));
            }
        }
    }

    info.push_str("\nTo call a tool, use this format in your response:\n");
    info.push_str("TOOL: tool_name\n");
    info.push_str("PARAMETERS: {\"param1\": \"value1\", \"param2\": \"value2\"}\n");

    info
}

/// The orchestration loop for one query.
///
/// Owns nothing: it borrows the model and session for the duration of
/// `run`, so a client can reuse both across queries. Conversation state
/// lives inside `run` and is exclusively owned by that invocation.
pub struct QueryLoop<'a> {
    llm: &'a dyn LanguageModel,
    session: &'a dyn ToolSession,
    max_turns: usize,
}

impl<'a> QueryLoop<'a> {
    pub fn new(llm: &'a dyn LanguageModel, session: &'a dyn ToolSession) -> Self {
        Self {
            llm,
            session,
            max_turns: MAX_TURNS,
        }
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Run the loop, forwarding progress over `events` as it happens.
    ///
    /// A dropped receiver cancels the query: the next send fails, the
    /// loop returns, and the session stays usable for the next query.
    /// Tool execution failures are recoverable - they become error-tagged
    /// conversation turns the model can react to. Only a model-stream
    /// failure aborts the query.
    pub async fn run(&self, query: &str, events: mpsc::Sender<QueryEvent>) -> Result<()> {
        let tools = self.session.available_tools()?.to_vec();
        let tool_info = render_tool_info(&tools);

        let mut conversation = vec![Message::user(query)];
        let mut turn_count = 0;

        loop {
            turn_count += 1;
            if turn_count > self.max_turns {
                let notice = format!("Reached maximum number of turns ({}).", self.max_turns);
                info!(turns = self.max_turns, "Turn budget exhausted");
                let _ = events.send(QueryEvent::Notice(notice)).await;
                return Ok(());
            }

            // Tool instructions ride along on the first turn only
            let info = (turn_count == 1).then_some(tool_info.as_str());

            if turn_count > 1 {
                // Visual separation between turns in the chunk stream
                if events.send(QueryEvent::Chunk("\n\n".to_string())).await.is_err() {
                    return Ok(());
                }
            }

            let mut stream = self.llm.generate_streaming(&conversation, info).await?;
            let mut model_text = String::new();

            while let Some(item) = stream.next().await {
                match item {
                    Ok(chunk) => {
                        model_text.push_str(&chunk);
                        if events.send(QueryEvent::Chunk(chunk)).await.is_err() {
                            debug!("Query receiver dropped, cancelling");
                            return Ok(());
                        }
                    }
                    Err(e) => {
                        // The adapter already surfaced a visible chunk
                        warn!(error = %e, "Model stream failed");
                        return Err(e);
                    }
                }
            }

            conversation.push(Message::model(model_text.clone()));

            let calls = extract_tool_calls(&model_text, &tools);
            if calls.is_empty() {
                return Ok(());
            }

            // Strictly sequential, in document order: each result may
            // change how the model should read the next one
            for call in calls {
                let event = QueryEvent::ToolCall {
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                };
                if events.send(event).await.is_err() {
                    return Ok(());
                }

                let (success, text) = self.execute_call(&tools, &call).await;

                let tagged = if success {
                    format!("TOOL RESULT: {}\n{}", call.name, text)
                } else {
                    format!("TOOL ERROR: {}\n{}", call.name, text)
                };
                conversation.push(Message::tool_result(tagged));

                let event = QueryEvent::ToolResult {
                    name: call.name,
                    success,
                    text,
                };
                if events.send(event).await.is_err() {
                    return Ok(());
                }
            }
        }
    }

    /// Execute one call; failures are data here, not errors
    async fn execute_call(&self, tools: &[McpTool], call: &ToolCall) -> (bool, String) {
        let Some(tool) = tools.iter().find(|t| t.name == call.name) else {
            return (false, format!("Tool not found: {}", call.name));
        };

        let arguments = match validate_tool_args(tool, &call.arguments) {
            Ok(args) => args,
            Err(e) => return (false, e.to_string()),
        };

        match self.session.call_tool(&call.name, arguments).await {
            Ok(result) => {
                let text = format_tool_result(&result);
                let failed = result
                    .get("isError")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                (!failed, text)
            }
            Err(e) => (
                false,
                format!("Error executing tool '{}': {}", call.name, e),
            ),
        }
    }
}
