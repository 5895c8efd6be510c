//! End-to-end agent loop scenarios using a scripted provider.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::watch;

use picobot::agent::AgentLoop;
use picobot::config::Config;
use picobot::error::{PicoError, Result};
use picobot::hub::{Hub, InboundMessage};
use picobot::memory::{EmbedProvider, FileMemory, PersistentMemory};
use picobot::providers::{ChatOptions, LLMProvider, LLMResponse, LLMToolCall, ToolDefinition};
use picobot::session::{Message, Role, SessionManager};
use picobot::tools::{EchoTool, Tool, ToolRegistry};

enum ScriptStep {
    Reply(LLMResponse),
    Fail(String),
}

/// Provider that replays a fixed script and records every request.
struct ScriptedProvider {
    script: Mutex<VecDeque<ScriptStep>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn replies(replies: Vec<LLMResponse>) -> Self {
        Self::new(replies.into_iter().map(ScriptStep::Reply).collect())
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn request(&self, index: usize) -> Vec<Message> {
        self.seen.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn chat(
        &self,
        messages: Vec<Message>,
        _tools: Vec<ToolDefinition>,
        _model: Option<&str>,
        _options: ChatOptions,
    ) -> Result<LLMResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(messages);
        match self.script.lock().unwrap().pop_front() {
            Some(ScriptStep::Reply(r)) => Ok(r),
            Some(ScriptStep::Fail(e)) => Err(PicoError::Provider(e)),
            None => Ok(LLMResponse::text("")),
        }
    }

    fn default_model(&self) -> &str {
        "scripted"
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Tool that always fails, for error-surfacing tests.
struct BoomTool;

#[async_trait]
impl Tool for BoomTool {
    fn name(&self) -> &str {
        "boom"
    }
    fn description(&self) -> &str {
        "Always fails"
    }
    fn parameters(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }
    async fn execute(&self, _args: serde_json::Value) -> Result<String> {
        Err(PicoError::Tool("boom".to_string()))
    }
}

/// Embedder where any text mentioning "password" shares a direction.
struct StubEmbedder;

impl EmbedProvider for StubEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; 4];
        if text.to_lowercase().contains("password") {
            v[0] = 1.0;
        } else {
            v[1] = 1.0;
        }
        Ok(v)
    }
}

struct Fixture {
    hub: Arc<Hub>,
    sessions: Arc<SessionManager>,
    file_memory: Arc<FileMemory>,
    provider: Arc<ScriptedProvider>,
    agent: AgentLoop,
    shutdown: watch::Sender<bool>,
    _workspace: TempDir,
}

fn fixture(provider: ScriptedProvider, tools: ToolRegistry) -> Fixture {
    fixture_with(provider, tools, None, 100, 10)
}

fn fixture_with(
    provider: ScriptedProvider,
    tools: ToolRegistry,
    persistent: Option<Arc<PersistentMemory>>,
    hub_buffer: usize,
    max_iterations: usize,
) -> Fixture {
    let workspace = TempDir::new().unwrap();
    let mut config = Config::default();
    config.agents.defaults.workspace = workspace.path().to_string_lossy().to_string();
    config.agents.defaults.max_tool_iterations = max_iterations;

    let hub = Arc::new(Hub::with_transports(hub_buffer, &["telegram", "ntfy"]));
    let sessions = Arc::new(SessionManager::new(workspace.path()).unwrap());
    let file_memory = Arc::new(FileMemory::new(workspace.path()).unwrap());
    let provider = Arc::new(provider);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let agent = AgentLoop::new(
        &config,
        Arc::clone(&hub),
        Arc::clone(&provider) as Arc<dyn LLMProvider>,
        Arc::new(tools),
        Arc::clone(&sessions),
        Arc::clone(&file_memory),
        persistent,
        shutdown_rx,
    );

    Fixture {
        hub,
        sessions,
        file_memory,
        provider,
        agent,
        shutdown: shutdown_tx,
        _workspace: workspace,
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn remember_shortcut_replies_without_llm() {
    let f = fixture(ScriptedProvider::replies(vec![]), ToolRegistry::new());

    let msg = InboundMessage::new("telegram", "user1", "42", "remember to buy milk");
    f.agent.handle_message(&msg).await;

    // The canned reply goes back on the originating transport.
    let reply = f.hub.consume_outbound().await.unwrap();
    assert_eq!(reply.channel, "telegram");
    assert_eq!(reply.chat_id, "42");
    assert_eq!(reply.content, "OK, I've remembered that.");

    // The note landed in today's file.
    let today = f.file_memory.read_today().unwrap();
    assert!(today.trim_end().ends_with("buy milk"));

    // The turn is still recorded in the session.
    let session = f.sessions.get_or_create("telegram:42").await;
    assert_eq!(session.history.len(), 2);
    assert_eq!(session.history[0].role, Role::User);
    assert_eq!(session.history[1].role, Role::Assistant);

    // No provider call was made.
    assert_eq!(f.provider.call_count(), 0);
}

#[tokio::test]
async fn pure_chat_single_provider_call() {
    let f = fixture(
        ScriptedProvider::replies(vec![LLMResponse::text("hi")]),
        ToolRegistry::new(),
    );

    let msg = InboundMessage::new("telegram", "user1", "7", "hello");
    f.agent.handle_message(&msg).await;

    assert_eq!(f.provider.call_count(), 1);
    let reply = f.hub.consume_outbound().await.unwrap();
    assert_eq!(reply.content, "hi");

    // The request carried the system prompt and the user message.
    let request = f.provider.request(0);
    assert_eq!(request[0].role, Role::System);
    assert_eq!(request.last().unwrap().content, "hello");
}

#[tokio::test]
async fn tool_call_then_reply() {
    let mut tools = ToolRegistry::new();
    tools.register(Box::new(EchoTool));

    let f = fixture(
        ScriptedProvider::replies(vec![
            LLMResponse::with_tools(
                "",
                vec![LLMToolCall::new("call_1", "echo", json!({"text": "ok"}))],
            ),
            LLMResponse::text("ok"),
        ]),
        tools,
    );

    let msg = InboundMessage::new("telegram", "u", "1", "run echo");
    f.agent.handle_message(&msg).await;

    assert_eq!(f.provider.call_count(), 2);
    let reply = f.hub.consume_outbound().await.unwrap();
    assert_eq!(reply.content, "ok");

    // The second request contains user, assistant (with tool calls), tool.
    let second = f.provider.request(1);
    let roles: Vec<Role> = second.iter().map(|m| m.role).collect();
    assert!(roles.contains(&Role::User));
    assert!(roles.contains(&Role::Tool));
    let assistant_with_tools = second
        .iter()
        .find(|m| m.has_tool_calls())
        .expect("assistant message with tool calls");
    assert_eq!(
        assistant_with_tools.tool_calls.as_ref().unwrap()[0].name,
        "echo"
    );
    let tool_msg = second.iter().find(|m| m.role == Role::Tool).unwrap();
    assert_eq!(tool_msg.content, "ok");
    assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
}

#[tokio::test]
async fn tool_error_is_surfaced_and_iteration_continues() {
    let mut tools = ToolRegistry::new();
    tools.register(Box::new(BoomTool));

    let f = fixture(
        ScriptedProvider::replies(vec![
            LLMResponse::with_tools("", vec![LLMToolCall::new("call_1", "boom", json!({}))]),
            LLMResponse::text("recovered"),
        ]),
        tools,
    );

    let msg = InboundMessage::new("telegram", "u", "1", "go");
    f.agent.handle_message(&msg).await;

    let reply = f.hub.consume_outbound().await.unwrap();
    assert_eq!(reply.content, "recovered");

    // The model saw the formatted tool error on the next turn.
    let second = f.provider.request(1);
    let tool_msg = second.iter().find(|m| m.role == Role::Tool).unwrap();
    assert!(tool_msg.content.starts_with("(tool error) "));
    assert!(tool_msg.content.contains("boom"));
}

#[tokio::test]
async fn provider_failure_yields_apology_and_keeps_user_turn() {
    let f = fixture(
        ScriptedProvider::new(vec![ScriptStep::Fail("rate limited".to_string())]),
        ToolRegistry::new(),
    );

    let msg = InboundMessage::new("ntfy", "u", "topic", "hello");
    f.agent.handle_message(&msg).await;

    let reply = f.hub.consume_outbound().await.unwrap();
    assert_eq!(
        reply.content,
        "Sorry, I encountered an error while processing your request."
    );

    let session = f.sessions.get_or_create("ntfy:topic").await;
    assert_eq!(session.history[0].role, Role::User);
    assert_eq!(session.history[0].content, "hello");
}

#[tokio::test]
async fn empty_response_falls_back_to_last_tool_result() {
    let mut tools = ToolRegistry::new();
    tools.register(Box::new(EchoTool));

    let f = fixture(
        ScriptedProvider::replies(vec![
            LLMResponse::with_tools(
                "",
                vec![LLMToolCall::new("c1", "echo", json!({"text": "tool says hi"}))],
            ),
            LLMResponse::text(""),
        ]),
        tools,
    );

    let msg = InboundMessage::new("telegram", "u", "1", "go");
    f.agent.handle_message(&msg).await;

    let reply = f.hub.consume_outbound().await.unwrap();
    assert_eq!(reply.content, "tool says hi");
}

#[tokio::test]
async fn empty_response_without_tools_uses_canned_fallback() {
    let f = fixture(
        ScriptedProvider::replies(vec![LLMResponse::text("")]),
        ToolRegistry::new(),
    );

    let msg = InboundMessage::new("telegram", "u", "1", "go");
    f.agent.handle_message(&msg).await;

    let reply = f.hub.consume_outbound().await.unwrap();
    assert_eq!(
        reply.content,
        "I've completed processing but have no response to give."
    );
}

#[tokio::test]
async fn provider_calls_bounded_by_max_iterations() {
    let mut tools = ToolRegistry::new();
    tools.register(Box::new(EchoTool));

    // Always ask for another tool call; the loop must stop at the cap.
    let steps: Vec<ScriptStep> = (0..10)
        .map(|i| {
            ScriptStep::Reply(LLMResponse::with_tools(
                "",
                vec![LLMToolCall::new(
                    &format!("call_{}", i),
                    "echo",
                    json!({"text": format!("r{}", i)}),
                )],
            ))
        })
        .collect();

    let f = fixture_with(ScriptedProvider::new(steps), tools, None, 100, 3);

    let msg = InboundMessage::new("telegram", "u", "1", "loop forever");
    f.agent.handle_message(&msg).await;

    assert_eq!(f.provider.call_count(), 3);
    // Reply falls back to the last tool result.
    let reply = f.hub.consume_outbound().await.unwrap();
    assert_eq!(reply.content, "r2");
}

#[tokio::test]
async fn full_outbound_queue_never_stalls_the_loop() {
    let f = fixture_with(
        ScriptedProvider::replies(vec![LLMResponse::text("hi")]),
        ToolRegistry::new(),
        None,
        1,
        10,
    );

    // Fill the single-slot outbound queue.
    f.hub
        .try_publish_outbound(picobot::hub::OutboundMessage::new("telegram", "x", "filler"))
        .unwrap();

    let msg = InboundMessage::new("telegram", "u", "1", "hello");
    let done = tokio::time::timeout(Duration::from_secs(1), f.agent.handle_message(&msg)).await;
    assert!(done.is_ok(), "handle_message must not block on a full queue");

    // The reply was dropped; only the filler remains.
    let first = f.hub.consume_outbound().await.unwrap();
    assert_eq!(first.content, "filler");
}

#[tokio::test]
async fn trimmed_history_is_archived_to_persistent_memory() {
    let workspace = TempDir::new().unwrap();
    let persistent = Arc::new(
        PersistentMemory::open(
            &workspace.path().join("memory.db"),
            Arc::new(StubEmbedder),
            0.0,
            0,
        )
        .unwrap(),
    );

    let f = fixture_with(
        ScriptedProvider::replies(vec![LLMResponse::text("ok")]),
        ToolRegistry::new(),
        Some(Arc::clone(&persistent)),
        100,
        10,
    );

    // Pre-fill the session past the trim limit: alternating user/assistant.
    for i in 0..52 {
        let m = if i % 2 == 0 {
            Message::user(&format!("u{}", i))
        } else {
            Message::assistant(&format!("a{}", i))
        };
        f.sessions.append("telegram:9", m).await;
    }

    let msg = InboundMessage::new("telegram", "u", "9", "one more");
    f.agent.handle_message(&msg).await;

    // 52 + 2 new = 54 messages; 4 trimmed (u0, a1, u2, a3); only the two
    // assistant turns are archived.
    assert_eq!(persistent.len().unwrap(), 2);

    let session = f.sessions.get_or_create("telegram:9").await;
    assert!(session.history.len() <= 50);
}

#[tokio::test]
async fn recalled_memories_reach_the_system_prompt() {
    let workspace = TempDir::new().unwrap();
    let persistent = Arc::new(
        PersistentMemory::open(
            &workspace.path().join("memory.db"),
            Arc::new(StubEmbedder),
            0.0,
            0,
        )
        .unwrap(),
    );
    persistent
        .store_history(
            "telegram5",
            "assistant",
            "the password is 42",
            "2026-01-01T00:00:00Z",
        )
        .unwrap();

    let f = fixture_with(
        ScriptedProvider::replies(vec![LLMResponse::text("it is 42")]),
        ToolRegistry::new(),
        Some(persistent),
        100,
        10,
    );

    let msg = InboundMessage::new("telegram", "u", "5", "what is the password");
    f.agent.handle_message(&msg).await;

    let request = f.provider.request(0);
    let system = &request[0].content;
    assert!(system.contains("Relevant memories:"));
    assert!(system.contains("the password is 42 (persistent)"));
}

#[tokio::test]
async fn process_direct_returns_reply_without_session() {
    let f = fixture(
        ScriptedProvider::replies(vec![LLMResponse::text("direct hi")]),
        ToolRegistry::new(),
    );

    let reply = f
        .agent
        .process_direct("hello there", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(reply, "direct hi");

    // No session was created or persisted.
    assert_eq!(f.sessions.count().await, 0);

    // The provider saw channel cli / chat direct in the system prompt.
    let request = f.provider.request(0);
    assert!(request[0].content.contains("Channel: cli"));
    assert!(request[0].content.contains("Chat ID: direct"));
}

#[tokio::test]
async fn process_direct_supports_tool_calls() {
    let mut tools = ToolRegistry::new();
    tools.register(Box::new(EchoTool));

    let f = fixture(
        ScriptedProvider::replies(vec![
            LLMResponse::with_tools(
                "",
                vec![LLMToolCall::new("c1", "echo", json!({"text": "echoed"}))],
            ),
            LLMResponse::text("done"),
        ]),
        tools,
    );

    let reply = f
        .agent
        .process_direct("use the tool", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(reply, "done");
    assert_eq!(f.provider.call_count(), 2);
}

#[tokio::test]
async fn process_direct_reports_exhausted_iterations() {
    let mut tools = ToolRegistry::new();
    tools.register(Box::new(EchoTool));

    let steps: Vec<ScriptStep> = (0..5)
        .map(|i| {
            ScriptStep::Reply(LLMResponse::with_tools(
                "",
                vec![LLMToolCall::new(
                    &format!("c{}", i),
                    "echo",
                    json!({"text": "again"}),
                )],
            ))
        })
        .collect();
    let f = fixture_with(ScriptedProvider::new(steps), tools, None, 100, 2);

    let reply = f
        .agent
        .process_direct("never stop", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(reply, "Max iterations reached without final response");
    assert_eq!(f.provider.call_count(), 2);
}

#[tokio::test]
async fn session_history_flows_into_next_turn() {
    let f = fixture(
        ScriptedProvider::replies(vec![
            LLMResponse::text("first reply"),
            LLMResponse::text("second reply"),
        ]),
        ToolRegistry::new(),
    );

    f.agent
        .handle_message(&InboundMessage::new("telegram", "u", "1", "first"))
        .await;
    f.agent
        .handle_message(&InboundMessage::new("telegram", "u", "1", "second"))
        .await;

    // The second request replays the first turn from the session.
    let second = f.provider.request(1);
    let contents: Vec<&str> = second.iter().map(|m| m.content.as_str()).collect();
    assert!(contents.contains(&"first"));
    assert!(contents.contains(&"first reply"));
    assert_eq!(*contents.last().unwrap(), "second");
}

#[tokio::test]
async fn agent_loop_run_exits_on_shutdown() {
    let Fixture {
        agent, shutdown, ..
    } = fixture(ScriptedProvider::replies(vec![]), ToolRegistry::new());

    let agent = Arc::new(agent);
    let run_agent = Arc::clone(&agent);
    let handle = tokio::spawn(async move { run_agent.run().await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    shutdown.send(true).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
    assert!(result.is_ok(), "agent loop should exit promptly on shutdown");
}
