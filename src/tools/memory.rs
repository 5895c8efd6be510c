//! Memory tool: lets the model write to the workspace memory files.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{PicoError, Result};
use crate::memory::FileMemory;

use super::Tool;

/// Writes to today's note or the long-term `MEMORY.md`.
pub struct WriteMemoryTool {
    memory: Arc<FileMemory>,
}

impl WriteMemoryTool {
    /// Create the tool over a file memory store.
    pub fn new(memory: Arc<FileMemory>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for WriteMemoryTool {
    fn name(&self) -> &str {
        "write_memory"
    }

    fn description(&self) -> &str {
        "Write a note to memory. target 'today' appends to today's note; \
         target 'long' writes the long-term MEMORY.md (append or overwrite)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "target": {
                    "type": "string",
                    "enum": ["today", "long"],
                    "description": "Which memory surface to write"
                },
                "content": {
                    "type": "string",
                    "description": "The note content"
                },
                "append": {
                    "type": "boolean",
                    "description": "For target 'long': append instead of overwrite. Default true."
                }
            },
            "required": ["target", "content"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let target = args
            .get("target")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PicoError::Tool("missing 'target' parameter".to_string()))?;
        let content = args
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PicoError::Tool("missing 'content' parameter".to_string()))?;
        let append = args.get("append").and_then(|v| v.as_bool()).unwrap_or(true);

        match target {
            "today" => {
                self.memory
                    .append_today(content)
                    .map_err(|e| PicoError::Tool(format!("writing today note: {}", e)))?;
                Ok("Saved to today's note.".to_string())
            }
            "long" => {
                let new_content = if append {
                    let existing = self
                        .memory
                        .read_long_term()
                        .map_err(|e| PicoError::Tool(format!("reading long-term memory: {}", e)))?;
                    if existing.is_empty() {
                        content.to_string()
                    } else {
                        format!("{}\n{}", existing.trim_end(), content)
                    }
                } else {
                    content.to_string()
                };
                self.memory
                    .write_long_term(&new_content)
                    .map_err(|e| PicoError::Tool(format!("writing long-term memory: {}", e)))?;
                Ok("Saved to long-term memory.".to_string())
            }
            other => Err(PicoError::Tool(format!(
                "unknown target '{}', expected 'today' or 'long'",
                other
            ))),
        }
    }
}
