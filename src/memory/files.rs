//! File-backed workspace memory
//!
//! Two read surfaces under `{workspace}/memory/`:
//! - `MEMORY.md`: long-term notes, read and written as a whole.
//! - `{YYYY-MM-DD}.md`: today's appendable note (UTC date), each appended
//!   line prefixed with an RFC3339 timestamp.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use chrono::{Duration, SecondsFormat, Utc};

use crate::error::Result;

/// Separator used when joining long-term and daily memory for the prompt.
const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Markdown note store under the workspace memory directory.
pub struct FileMemory {
    memory_dir: PathBuf,
}

impl FileMemory {
    /// Create a store rooted at `{workspace}/memory`, creating the directory
    /// if needed.
    pub fn new(workspace: impl Into<PathBuf>) -> Result<Self> {
        let memory_dir = workspace.into().join("memory");
        std::fs::create_dir_all(&memory_dir)?;
        Ok(Self { memory_dir })
    }

    /// Read `MEMORY.md`. A missing file reads as empty.
    pub fn read_long_term(&self) -> Result<String> {
        self.read_optional(self.memory_dir.join("MEMORY.md"))
    }

    /// Overwrite `MEMORY.md` with the given content.
    pub fn write_long_term(&self, content: &str) -> Result<()> {
        std::fs::create_dir_all(&self.memory_dir)?;
        std::fs::write(self.memory_dir.join("MEMORY.md"), content)?;
        Ok(())
    }

    /// Read today's note file. A missing file reads as empty.
    pub fn read_today(&self) -> Result<String> {
        self.read_optional(self.today_path())
    }

    /// Append a timestamped line to today's note file.
    pub fn append_today(&self, text: &str) -> Result<()> {
        std::fs::create_dir_all(&self.memory_dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.today_path())?;
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        writeln!(file, "[{}] {}", stamp, text)?;
        Ok(())
    }

    /// Join the last `days` daily notes (newest first) with `\n---\n`.
    pub fn get_recent(&self, days: i64) -> Result<String> {
        let days = days.max(1);
        let mut parts = Vec::new();
        for i in 0..days {
            let date = Utc::now() - Duration::days(i);
            let path = self
                .memory_dir
                .join(format!("{}.md", date.format("%Y-%m-%d")));
            match std::fs::read_to_string(&path) {
                Ok(content) => parts.push(content),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(parts.join("\n---\n"))
    }

    /// Combined long-term memory and today's notes for the system prompt.
    ///
    /// Returns `long + "\n\n---\n\n" + today`, omitting either side if empty,
    /// and `""` if both are empty.
    pub fn get_memory_context(&self) -> Result<String> {
        let long_term = self.read_long_term()?;
        let today = self.read_today()?;
        Ok(match (long_term.is_empty(), today.is_empty()) {
            (true, true) => String::new(),
            (true, false) => today,
            (false, true) => long_term,
            (false, false) => format!("{}{}{}", long_term, CONTEXT_SEPARATOR, today),
        })
    }

    fn today_path(&self) -> PathBuf {
        self.memory_dir
            .join(format!("{}.md", Utc::now().format("%Y-%m-%d")))
    }

    fn read_optional(&self, path: PathBuf) -> Result<String> {
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }
}
