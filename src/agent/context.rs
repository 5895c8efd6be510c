//! Context builder: assembles the system prompt and message list for a turn.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;

use crate::memory::{MemoryItem, Ranker};
use crate::session::Message;
use crate::skills::SkillsLoader;

/// Bootstrap files prepended to every system prompt, in this order.
const BOOTSTRAP_FILES: [&str; 4] = ["SOUL.md", "AGENTS.md", "USER.md", "TOOLS.md"];

const IDENTITY: &str = "You are Picobot, a helpful assistant.\n\n";

const MEMORY_TOOL_REMINDER: &str = "Always be helpful, accurate, and concise. If you decide \
something should be remembered, call the tool 'write_memory' with JSON arguments: \
{\"target\": \"today\"|\"long\", \"content\": \"...\", \"append\": true|false}. Use a tool \
call rather than plain chat text when writing memory.\n\n";

const SKILLS_HEADER: &str = "# Skills\n\nThe following skills extend your capabilities. To use \
a skill, read it using read_skill tool.\n\n";

/// Builds the ordered LLM message list for one turn from session history,
/// workspace bootstrap files, skills, and recalled memories.
pub struct ContextBuilder {
    workspace: PathBuf,
    skills: SkillsLoader,
    ranker: Option<Arc<dyn Ranker>>,
    top_k: usize,
}

impl ContextBuilder {
    /// Create a builder rooted at the given workspace.
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        let workspace = workspace.into();
        let skills = SkillsLoader::new(&workspace);
        Self {
            workspace,
            skills,
            ranker: None,
            top_k: 10,
        }
    }

    /// Install a memory ranker selecting `top_k` items per turn.
    ///
    /// Without a ranker, retrieved memories keep the retriever's order.
    pub fn with_ranker(mut self, ranker: Arc<dyn Ranker>, top_k: usize) -> Self {
        self.ranker = Some(ranker);
        self.top_k = top_k;
        self
    }

    /// Build the full message list: system prompt, replayed history, then the
    /// current user message.
    pub fn build_messages(
        &self,
        history: &[Message],
        current_message: &str,
        channel: &str,
        chat_id: &str,
        memory_context: &str,
        memories: &[MemoryItem],
    ) -> Vec<Message> {
        let mut system = String::from(IDENTITY);

        let ws = self.workspace.display();
        let now = Local::now().format("%Y-%m-%d %H:%M (%A)");
        system.push_str(&format!(
            "## Current Time\n{now}\n\n\
             ## Workspace\n\
             Your workspace is at: {ws}\n\
             - Memory files: {ws}/memory/MEMORY.md\n\
             - Daily notes: {ws}/memory/YYYY-MM-DD.md\n\
             - Custom skills: {ws}/skills/{{skill-name}}/SKILL.md\n\n\
             IMPORTANT: For normal conversation, just respond with text - do not call the message tool!\n\
             Only use the 'message' tool when you need to send a message to a specific chat channel.\n\n\
             ## Current Session\n\
             Channel: {channel}\n\
             Chat ID: {chat_id}\n"
        ));
        system.push_str("\n\n");

        // Workspace bootstrap files: persona, instructions, user profile,
        // tool documentation. Missing files are skipped silently.
        for name in BOOTSTRAP_FILES {
            let Ok(data) = std::fs::read_to_string(self.workspace.join(name)) else {
                continue;
            };
            let content = data.trim();
            if !content.is_empty() {
                system.push_str(&format!("## {}\n\n{}", name, content));
            }
        }

        system.push_str(MEMORY_TOOL_REMINDER);

        let skills_summary = self.skills.build_skills_summary();
        if !skills_summary.is_empty() {
            system.push_str(SKILLS_HEADER);
            system.push_str(&skills_summary);
            system.push('\n');
        }

        if !memory_context.is_empty() {
            system.push_str("Memory:\n");
            system.push_str(memory_context);
        }

        let selected = match (&self.ranker, memories.is_empty()) {
            (Some(ranker), false) => ranker.rank(current_message, memories.to_vec(), self.top_k),
            _ => memories.to_vec(),
        };
        if !selected.is_empty() {
            system.push_str("Relevant memories:\n");
            for m in &selected {
                system.push_str(&format!("- {} ({})\n", m.text, m.kind));
            }
        }

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(&system));

        // Replay history as plain role/content pairs.
        for h in history {
            messages.push(Message {
                role: h.role,
                content: h.content.clone(),
                timestamp: h.timestamp.clone(),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        messages.push(Message::user(current_message));
        messages
    }
}
