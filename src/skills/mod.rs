//! Workspace skills
//!
//! A skill is a directory `{workspace}/skills/{name}/` containing a
//! `SKILL.md`. Only the name and description are advertised to the model in
//! the system prompt; the body is loaded on demand by external tooling.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// A discovered skill, summarized for the prompt index.
#[derive(Debug, Clone)]
pub struct Skill {
    /// Skill name (directory name unless overridden by frontmatter).
    pub name: String,
    /// Short description from frontmatter, or the first body line.
    pub description: String,
    /// Absolute path to `SKILL.md`.
    pub path: PathBuf,
}

static FRONTMATTER_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^name:\s*(.+)$").expect("valid regex"));
static FRONTMATTER_DESC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^description:\s*(.+)$").expect("valid regex"));

/// Discovers skills under `{workspace}/skills/`.
pub struct SkillsLoader {
    skills_dir: PathBuf,
}

impl SkillsLoader {
    /// Create a loader for the given workspace.
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            skills_dir: workspace.into().join("skills"),
        }
    }

    /// Load every skill that has a readable `SKILL.md`, sorted by name.
    pub fn load_all(&self) -> Vec<Skill> {
        let mut skills = Vec::new();
        let Ok(entries) = std::fs::read_dir(&self.skills_dir) else {
            return skills;
        };

        for entry in entries.flatten() {
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            let skill_file = dir.join("SKILL.md");
            let Ok(content) = std::fs::read_to_string(&skill_file) else {
                continue;
            };
            let dir_name = entry.file_name().to_string_lossy().to_string();
            skills.push(parse_skill(&dir_name, &skill_file, &content));
        }

        skills.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(count = skills.len(), "Loaded skills");
        skills
    }

    /// Build the `<skills>` XML index for the system prompt.
    ///
    /// Returns `""` when no skills are present.
    pub fn build_skills_summary(&self) -> String {
        let skills = self.load_all();
        if skills.is_empty() {
            return String::new();
        }

        let mut out = String::from("<skills>\n");
        for skill in &skills {
            out.push_str(" <skill>\n");
            out.push_str(&format!("  <name>{}</name>\n", escape_xml(&skill.name)));
            out.push_str(&format!(
                "  <description>{}</description>\n",
                escape_xml(&skill.description)
            ));
            out.push_str(" </skill>\n");
        }
        out.push_str("</skills>\n");
        out
    }
}

/// Parse a `SKILL.md`: YAML-ish frontmatter `name:`/`description:` lines win;
/// otherwise the directory name and the first non-heading body line.
fn parse_skill(dir_name: &str, path: &Path, content: &str) -> Skill {
    let (frontmatter, body) = split_frontmatter(content);

    let name = frontmatter
        .and_then(|fm| FRONTMATTER_NAME_RE.captures(fm))
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| dir_name.to_string());

    let description = frontmatter
        .and_then(|fm| FRONTMATTER_DESC_RE.captures(fm))
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| first_body_line(body));

    Skill {
        name,
        description,
        path: path.to_path_buf(),
    }
}

fn split_frontmatter(content: &str) -> (Option<&str>, &str) {
    let Some(rest) = content.strip_prefix("---") else {
        return (None, content);
    };
    match rest.find("\n---") {
        Some(end) => {
            let body_start = rest[end + 4..].find('\n').map(|i| end + 4 + i + 1);
            (
                Some(&rest[..end]),
                body_start.map(|i| &rest[i..]).unwrap_or(""),
            )
        }
        None => (None, content),
    }
}

fn first_body_line(body: &str) -> String {
    body.lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .unwrap_or("")
        .to_string()
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
