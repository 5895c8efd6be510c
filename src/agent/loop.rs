//! The agent loop: consumes inbound messages, runs the tool-calling
//! iteration against the provider, and emits replies.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::watch;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::error::{PicoError, Result};
use crate::hub::{Hub, InboundMessage, OutboundMessage};
use crate::memory::{FileMemory, MemoryItem, PersistentMemory};
use crate::providers::{ChatOptions, LLMProvider};
use crate::session::{Message, Role, SessionManager, ToolCall};
use crate::tools::ToolRegistry;

use super::ContextBuilder;

static REMEMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^remember(?:\s+to)?\s+(.+)$").expect("valid regex"));

const REMEMBER_ACK: &str = "OK, I've remembered that.";
const PROVIDER_ERROR_REPLY: &str =
    "Sorry, I encountered an error while processing your request.";
const NO_RESPONSE_FALLBACK: &str = "I've completed processing but have no response to give.";
const MAX_ITERATIONS_REPLY: &str = "Max iterations reached without final response";

/// The core processing loop.
///
/// Single consumer of the hub's inbound queue; processing is strictly
/// sequential per message. Collaborators are passed in at construction and
/// referenced one-way.
pub struct AgentLoop {
    hub: Arc<Hub>,
    provider: Arc<dyn LLMProvider>,
    tools: Arc<ToolRegistry>,
    sessions: Arc<SessionManager>,
    context: ContextBuilder,
    file_memory: Arc<FileMemory>,
    persistent: Option<Arc<PersistentMemory>>,
    model: String,
    max_iterations: usize,
    options: ChatOptions,
    shutdown: watch::Receiver<bool>,
}

impl AgentLoop {
    /// Assemble the loop from its collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &Config,
        hub: Arc<Hub>,
        provider: Arc<dyn LLMProvider>,
        tools: Arc<ToolRegistry>,
        sessions: Arc<SessionManager>,
        file_memory: Arc<FileMemory>,
        persistent: Option<Arc<PersistentMemory>>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let defaults = &config.agents.defaults;
        let options = ChatOptions::new()
            .with_max_tokens(defaults.max_tokens)
            .with_temperature(defaults.temperature);
        Self {
            context: ContextBuilder::new(config.workspace_path()),
            hub,
            provider,
            tools,
            sessions,
            file_memory,
            persistent,
            model: defaults.model.clone(),
            max_iterations: defaults.max_tool_iterations.max(1),
            options,
            shutdown,
        }
    }

    /// Replace the context builder (e.g. to install a ranker).
    pub fn with_context_builder(mut self, context: ContextBuilder) -> Self {
        self.context = context;
        self
    }

    fn model(&self) -> Option<&str> {
        if self.model.is_empty() {
            None
        } else {
            Some(self.model.as_str())
        }
    }

    /// Run until the shutdown signal fires or the inbound queue closes.
    /// The in-flight message is finished before exiting.
    pub async fn run(&self) {
        info!("Agent loop started");
        let mut shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Agent loop received shutdown signal");
                        break;
                    }
                }
                msg = self.hub.consume_inbound() => {
                    let Some(msg) = msg else {
                        info!("Inbound queue closed, stopping agent loop");
                        break;
                    };
                    let request_id = uuid::Uuid::new_v4();
                    let span = info_span!(
                        "request",
                        request_id = %request_id,
                        channel = %msg.channel,
                        chat_id = %msg.chat_id,
                        sender = %msg.sender_id,
                    );
                    self.handle_message(&msg).instrument(span).await;
                }
            }
        }
        info!("Agent loop stopped");
    }

    /// Process one inbound message end to end.
    pub async fn handle_message(&self, msg: &InboundMessage) {
        info!("Processing message");
        let session_key = msg.session_key();

        // Explicit remember requests skip the LLM entirely.
        if let Some(caps) = REMEMBER_RE.captures(msg.content.trim()) {
            let note = caps[1].to_string();
            if let Err(e) = self.file_memory.append_today(&note) {
                error!(error = %e, "Failed to append to today's note");
            }
            self.reply(msg, REMEMBER_ACK);
            self.sessions
                .append(&session_key, Message::user(&msg.content))
                .await;
            self.sessions
                .append(&session_key, Message::assistant(REMEMBER_ACK))
                .await;
            self.sessions.save(&session_key).await;
            return;
        }

        // Stateful tools (message, cron) learn where the turn came from.
        self.set_tool_context(&msg.channel, &msg.chat_id);

        let session = self.sessions.get_or_create(&session_key).await;
        let memory_context = self.file_memory.get_memory_context().unwrap_or_default();
        let memories = self.recall_memories(msg);

        let messages = self.context.build_messages(
            &session.history,
            &msg.content,
            &msg.channel,
            &msg.chat_id,
            &memory_context,
            &memories,
        );

        let final_content = self.tool_loop(messages).await;

        self.sessions
            .append(&session_key, Message::user(&msg.content))
            .await;
        self.sessions
            .append(&session_key, Message::assistant(&final_content))
            .await;

        // Archive trimmed overflow into persistent memory before the save
        // discards it; user turns are not archived.
        let trimmed = self.sessions.trim_all().await;
        if let Some(persistent) = &self.persistent {
            let memory_key = format!("{}{}", msg.channel, msg.chat_id);
            for m in trimmed.iter().filter(|m| m.role != Role::User) {
                if let Err(e) = persistent.store_history(
                    &memory_key,
                    &m.role.to_string(),
                    &m.content,
                    &m.timestamp,
                ) {
                    warn!(error = %e, "Failed to store trimmed history");
                }
            }
        }
        self.sessions.save(&session_key).await;

        self.reply(msg, &final_content);
    }

    /// Process a message synchronously outside the hub, for CLI use.
    ///
    /// Builds the full context with `channel="cli"`, `chat_id="direct"`, runs
    /// the tool loop under the given deadline, and skips session persistence.
    pub async fn process_direct(&self, content: &str, timeout: Duration) -> Result<String> {
        self.set_tool_context("cli", "direct");
        tokio::time::timeout(timeout, self.direct_inner(content))
            .await
            .map_err(|_| PicoError::Provider("direct processing timed out".to_string()))?
    }

    async fn direct_inner(&self, content: &str) -> Result<String> {
        let memory_context = self.file_memory.get_memory_context().unwrap_or_default();
        let mut messages =
            self.context
                .build_messages(&[], content, "cli", "direct", &memory_context, &[]);

        let tool_defs = self.tools.definitions();
        let mut last_tool_result = String::new();

        for _ in 0..self.max_iterations {
            let resp = self
                .provider
                .chat(
                    messages.clone(),
                    tool_defs.clone(),
                    self.model(),
                    self.options.clone(),
                )
                .await?;

            if !resp.has_tool_calls() {
                if !resp.content.is_empty() {
                    return Ok(resp.content);
                }
                if !last_tool_result.is_empty() {
                    return Ok(last_tool_result);
                }
                return Ok(resp.content);
            }

            let calls: Vec<ToolCall> = resp
                .tool_calls
                .iter()
                .map(|tc| ToolCall::new(&tc.id, &tc.name, tc.arguments.clone()))
                .collect();
            messages.push(Message::assistant_with_tools(&resp.content, calls));

            for tc in &resp.tool_calls {
                let result = match self.tools.execute(&tc.name, tc.arguments.clone()).await {
                    Ok(r) => r,
                    Err(e) => format!("(tool error) {}", e),
                };
                last_tool_result = result.clone();
                messages.push(Message::tool_result(&tc.id, &result));
            }
        }

        Ok(MAX_ITERATIONS_REPLY.to_string())
    }

    /// The provider/tool iteration. Returns the reply text, falling back to
    /// the last tool result or a canned message when the model yields nothing.
    async fn tool_loop(&self, mut messages: Vec<Message>) -> String {
        let tool_defs = self.tools.definitions();
        let mut final_content = String::new();
        let mut last_tool_result = String::new();
        let mut iteration = 0;

        while iteration < self.max_iterations {
            iteration += 1;
            let resp = match self
                .provider
                .chat(
                    messages.clone(),
                    tool_defs.clone(),
                    self.model(),
                    self.options.clone(),
                )
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    error!(error = %e, "Provider error");
                    final_content = PROVIDER_ERROR_REPLY.to_string();
                    break;
                }
            };

            if !resp.has_tool_calls() {
                final_content = resp.content;
                break;
            }

            let calls: Vec<ToolCall> = resp
                .tool_calls
                .iter()
                .map(|tc| ToolCall::new(&tc.id, &tc.name, tc.arguments.clone()))
                .collect();
            messages.push(Message::assistant_with_tools(&resp.content, calls));

            for tc in &resp.tool_calls {
                let result = match self.tools.execute(&tc.name, tc.arguments.clone()).await {
                    Ok(r) => r,
                    Err(e) => format!("(tool error) {}", e),
                };
                last_tool_result = result.clone();
                messages.push(Message::tool_result(&tc.id, &result));
            }
        }

        if final_content.is_empty() && !last_tool_result.is_empty() {
            last_tool_result
        } else if final_content.is_empty() {
            NO_RESPONSE_FALLBACK.to_string()
        } else {
            final_content
        }
    }

    fn recall_memories(&self, msg: &InboundMessage) -> Vec<MemoryItem> {
        let Some(persistent) = &self.persistent else {
            return Vec::new();
        };
        let memory_key = format!("{}{}", msg.channel, msg.chat_id);
        match persistent.query_history(&memory_key, &msg.content, 0) {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "Failed to query persistent memory");
                Vec::new()
            }
        }
    }

    fn set_tool_context(&self, channel: &str, chat_id: &str) {
        for tool in self.tools.iter() {
            if let Some(aware) = tool.as_context_aware() {
                aware.set_context(channel, chat_id);
            }
        }
    }

    /// Non-blocking reply emission; a full queue drops the message with a log
    /// entry rather than stalling the loop.
    fn reply(&self, msg: &InboundMessage, content: &str) {
        let outbound = OutboundMessage::reply_to(msg, content);
        if self.hub.try_publish_outbound(outbound).is_err() {
            warn!("Outbound queue full, dropping message");
        }
    }
}
