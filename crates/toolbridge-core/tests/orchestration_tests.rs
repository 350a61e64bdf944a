//! Orchestration loop integration tests
//!
//! Drive the loop with a scripted language model and an in-memory tool
//! session - no network, no subprocess.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use toolbridge_core::provider::{LanguageModel, Message, Role, TextStream};
use toolbridge_core::{Error, QueryEvent, QueryLoop, Result};
use toolbridge_mcp::{McpError, McpTool, ToolSession};

/// Language model that replies from a fixed script, one entry per turn
struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    repeat_last: bool,
    /// (messages, tool_info present) per generation request
    requests: Mutex<Vec<(Vec<Message>, bool)>>,
}

impl ScriptedModel {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
            repeat_last: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A model that emits the same reply forever
    fn repeating(reply: &str) -> Self {
        let mut model = Self::new(&[reply]);
        model.repeat_last = true;
        model
    }

    fn next_reply(&self) -> String {
        let mut replies = self.replies.lock().unwrap();
        if self.repeat_last && replies.len() == 1 {
            replies.front().cloned().unwrap()
        } else {
            replies.pop_front().unwrap_or_default()
        }
    }

    fn record(&self, messages: &[Message], tool_info: Option<&str>) {
        self.requests
            .lock()
            .unwrap()
            .push((messages.to_vec(), tool_info.is_some()));
    }

    fn requests(&self) -> Vec<(Vec<Message>, bool)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, messages: &[Message], tool_info: Option<&str>) -> Result<String> {
        self.record(messages, tool_info);
        Ok(self.next_reply())
    }

    async fn generate_streaming(
        &self,
        messages: &[Message],
        tool_info: Option<&str>,
    ) -> Result<TextStream> {
        self.record(messages, tool_info);
        let reply = self.next_reply();
        Ok(Box::pin(futures::stream::iter(vec![Ok(reply)])))
    }
}

/// Model whose stream fails partway through, after surfacing the error
/// as a visible chunk the way real adapters do
struct FailingModel;

#[async_trait]
impl LanguageModel for FailingModel {
    fn name(&self) -> &str {
        "failing"
    }

    async fn generate(&self, _: &[Message], _: Option<&str>) -> Result<String> {
        Err(Error::Provider("backend down".to_string()))
    }

    async fn generate_streaming(&self, _: &[Message], _: Option<&str>) -> Result<TextStream> {
        Ok(Box::pin(futures::stream::iter(vec![
            Ok("partial".to_string()),
            Ok("\n[Error in LLM streaming: backend down]".to_string()),
            Err(Error::Provider("backend down".to_string())),
        ])))
    }
}

/// In-memory tool session with one canned result
struct MockSession {
    tools: Vec<McpTool>,
    result: Value,
    fail: bool,
    calls: Mutex<Vec<(String, Value)>>,
}

impl MockSession {
    fn new(tools: Vec<McpTool>, result: Value) -> Self {
        Self {
            tools,
            result,
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn failing(tools: Vec<McpTool>) -> Self {
        let mut session = Self::new(tools, Value::Null);
        session.fail = true;
        session
    }

    fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolSession for MockSession {
    fn available_tools(&self) -> std::result::Result<&[McpTool], McpError> {
        Ok(&self.tools)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> std::result::Result<Value, McpError> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments));
        if self.fail {
            return Err(McpError::Server("boom".to_string()));
        }
        Ok(self.result.clone())
    }
}

fn tool(name: &str, schema: Value) -> McpTool {
    McpTool {
        name: name.to_string(),
        description: format!("The {} tool", name),
        input_schema: schema,
    }
}

async fn run_query(
    llm: &dyn LanguageModel,
    session: &dyn ToolSession,
    query: &str,
) -> (Result<()>, Vec<QueryEvent>) {
    let (tx, mut rx) = mpsc::channel(256);
    let result = QueryLoop::new(llm, session).run(query, tx).await;

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (result, events)
}

fn chunks(events: &[QueryEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            QueryEvent::Chunk(text) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_plain_answer_completes_in_one_turn() {
    let model = ScriptedModel::new(&["4"]);
    let session = MockSession::new(vec![tool("add", Value::Null)], json!({"content": "4"}));

    let (result, events) = run_query(&model, &session, "What is 2+2?").await;

    assert!(result.is_ok());
    assert_eq!(events, vec![QueryEvent::Chunk("4".to_string())]);
    assert!(session.calls().is_empty());
    assert_eq!(model.requests().len(), 1);
}

#[tokio::test]
async fn test_tool_call_round_trip() {
    let model = ScriptedModel::new(&[
        "TOOL: add\nPARAMETERS: {\"a\": 2, \"b\": 2}",
        "The answer is 4.",
    ]);
    let session = MockSession::new(
        vec![tool("add", Value::Null)],
        json!({"content": [{"type": "text", "text": "4"}]}),
    );

    let (result, events) = run_query(&model, &session, "What is 2+2?").await;

    assert!(result.is_ok());
    assert_eq!(session.calls(), vec![("add".to_string(), json!({"a": 2, "b": 2}))]);

    // Tool call and result surfaced as events, in order
    let tool_events: Vec<_> = events
        .iter()
        .filter(|e| !matches!(e, QueryEvent::Chunk(_)))
        .collect();
    assert_eq!(
        tool_events[0],
        &QueryEvent::ToolCall {
            name: "add".to_string(),
            arguments: json!({"a": 2, "b": 2}),
        }
    );
    assert_eq!(
        tool_events[1],
        &QueryEvent::ToolResult {
            name: "add".to_string(),
            success: true,
            text: "4".to_string(),
        }
    );

    assert!(chunks(&events).ends_with("The answer is 4."));

    // Second turn saw the tagged tool result but not the tool catalog
    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].1, "tool info should be attached on turn 1");
    assert!(!requests[1].1, "tool info must not repeat on later turns");
    let (turn2_messages, _) = &requests[1];
    let tagged = turn2_messages
        .iter()
        .find(|m| m.role == Role::Tool)
        .expect("turn 2 should carry a tool result message");
    assert_eq!(tagged.content, "TOOL RESULT: add\n4");
}

#[tokio::test]
async fn test_turn_cap_terminates_at_ten() {
    let model = ScriptedModel::repeating("TOOL: ping\nPARAMETERS: {}");
    let session = MockSession::new(vec![tool("ping", Value::Null)], json!({"content": "pong"}));

    let (result, events) = run_query(&model, &session, "keep pinging").await;

    assert!(result.is_ok());

    let tool_calls = events
        .iter()
        .filter(|e| matches!(e, QueryEvent::ToolCall { .. }))
        .count();
    assert_eq!(tool_calls, 10);
    assert_eq!(session.calls().len(), 10);

    match events.last().unwrap() {
        QueryEvent::Notice(text) => {
            assert!(text.contains("Reached maximum number of turns (10)"));
        }
        other => panic!("expected turn-cap notice, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_tool_is_recoverable() {
    let model = ScriptedModel::new(&["TOOL: nope\nPARAMETERS: {}", "I could not do that."]);
    let session = MockSession::new(vec![tool("add", Value::Null)], json!({"content": "4"}));

    let (result, events) = run_query(&model, &session, "try something").await;

    assert!(result.is_ok());
    assert!(session.calls().is_empty());

    let failure = events
        .iter()
        .find_map(|e| match e {
            QueryEvent::ToolResult { success: false, text, .. } => Some(text.clone()),
            _ => None,
        })
        .expect("failed tool result event");
    assert!(failure.contains("Tool not found: nope"));

    // The model saw the error-tagged message and produced a final turn
    let (turn2_messages, _) = &model.requests()[1];
    let tagged = turn2_messages.iter().find(|m| m.role == Role::Tool).unwrap();
    assert!(tagged.content.starts_with("TOOL ERROR: nope\n"));
}

#[tokio::test]
async fn test_validation_failure_skips_execution() {
    let schema = json!({
        "properties": {"q": {"type": "string"}},
        "required": ["q"]
    });
    let model = ScriptedModel::new(&["TOOL: search\nPARAMETERS: {}", "Sorry."]);
    let session = MockSession::new(vec![tool("search", schema)], json!({"content": "hits"}));

    let (result, events) = run_query(&model, &session, "find it").await;

    assert!(result.is_ok());
    // The call was never executed
    assert!(session.calls().is_empty());

    let failure = events
        .iter()
        .find_map(|e| match e {
            QueryEvent::ToolResult { success: false, text, .. } => Some(text.clone()),
            _ => None,
        })
        .unwrap();
    assert!(failure.contains("Missing required field: q"));
}

#[tokio::test]
async fn test_tool_execution_error_is_recoverable() {
    let model = ScriptedModel::new(&["TOOL: add\nPARAMETERS: {\"a\": 1}", "It failed."]);
    let session = MockSession::failing(vec![tool("add", Value::Null)]);

    let (result, events) = run_query(&model, &session, "add things").await;

    assert!(result.is_ok(), "tool failures must not abort the loop");
    assert_eq!(session.calls().len(), 1);

    let failure = events
        .iter()
        .find_map(|e| match e {
            QueryEvent::ToolResult { success: false, text, .. } => Some(text.clone()),
            _ => None,
        })
        .unwrap();
    assert!(failure.contains("Error executing tool 'add'"));
    assert!(chunks(&events).ends_with("It failed."));
}

#[tokio::test]
async fn test_mid_stream_failure_propagates_after_visible_chunk() {
    let session = MockSession::new(vec![tool("add", Value::Null)], json!({"content": "4"}));

    let (result, events) = run_query(&FailingModel, &session, "hello").await;

    assert!(matches!(result, Err(Error::Provider(_))));

    // Partial text and the visible error chunk both reached the caller
    let streamed = chunks(&events);
    assert!(streamed.starts_with("partial"));
    assert!(streamed.contains("[Error in LLM streaming: backend down]"));
}

#[tokio::test]
async fn test_sequential_execution_in_document_order() {
    let model = ScriptedModel::new(&[
        "TOOL: first\nPARAMETERS: {\"n\": 1}\nTOOL: second\nPARAMETERS: {\"n\": 2}",
        "Both done.",
    ]);
    let session = MockSession::new(
        vec![tool("first", Value::Null), tool("second", Value::Null)],
        json!({"content": "ok"}),
    );

    let (result, _) = run_query(&model, &session, "do both").await;

    assert!(result.is_ok());
    let calls = session.calls();
    assert_eq!(calls[0].0, "first");
    assert_eq!(calls[1].0, "second");
}

#[tokio::test]
async fn test_dropped_receiver_cancels_quietly() {
    let model = ScriptedModel::repeating("TOOL: ping\nPARAMETERS: {}");
    let session = MockSession::new(vec![tool("ping", Value::Null)], json!({"content": "pong"}));

    let (tx, rx) = mpsc::channel(1);
    drop(rx);

    let result = QueryLoop::new(&model, &session).run("ping forever", tx).await;
    assert!(result.is_ok(), "cancellation is not an error");
}
