//! Portable plan documents.
//!
//! A document names everything: database ids never appear in it. Two
//! encodings are supported:
//!
//! - Markdown with YAML front matter. The front matter holds plan fields,
//!   tasks and facts. One blank line follows the closing `---`, and
//!   everything after it is the plan content, unmodified.
//! - JSON, the same structure serialized with serde_json.

use crate::types::{FactLinkKind, Status, ValidationError, validate_name, validate_priority};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const FRONT_MATTER_DELIMITER: &str = "---";

/// A plan with its tasks and facts, identified by names only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub plan: PlanDoc,
    #[serde(default)]
    pub tasks: Vec<TaskDoc>,
    #[serde(default)]
    pub facts: Vec<FactDoc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanDoc {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskDoc {
    pub name: String,

    /// Unset means pending
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,

    /// Unset means DEFAULT_PRIORITY
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,

    /// Name of the parent task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub acceptance_criteria: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,

    /// Names of tasks that block this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<String>,

    /// Names of tasks this one blocks
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<String>,
}

impl TaskDoc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FactDoc {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<FactLinkDoc>,
}

/// A fact-to-task link by task name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FactLinkDoc {
    pub task: String,
    pub kind: FactLinkKind,
}

/// The YAML block at the top of a markdown document.
#[derive(Debug, Serialize, Deserialize)]
struct FrontMatter {
    plan: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    description: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    completed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tasks: Vec<TaskDoc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    facts: Vec<FactDoc>,
}

impl Document {
    /// Check names and priorities before anything touches the store.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name(&self.plan.name)?;

        let mut seen = HashSet::new();
        for task in &self.tasks {
            validate_name(&task.name)?;
            if let Some(priority) = task.priority {
                validate_priority(priority)?;
            }
            if !seen.insert(task.name.as_str()) {
                return Err(ValidationError::DuplicateName(task.name.clone()));
            }
        }

        let mut seen = HashSet::new();
        for fact in &self.facts {
            validate_name(&fact.name)?;
            if !seen.insert(fact.name.as_str()) {
                return Err(ValidationError::DuplicateName(fact.name.clone()));
            }
        }

        Ok(())
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Failed to parse JSON plan document")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize plan document")
    }
}

/// Parse a markdown document with YAML front matter.
pub fn parse_markdown(text: &str) -> Result<Document> {
    let (yaml, body) = split_front_matter(text)?;
    let front: FrontMatter = serde_yaml::from_str(yaml).context("Front matter is not a valid plan header")?;

    Ok(Document {
        plan: PlanDoc {
            name: front.plan,
            description: front.description,
            completed: front.completed,
            content: strip_separator(body).to_string(),
        },
        tasks: front.tasks,
        facts: front.facts,
    })
}

/// Render a document as markdown with YAML front matter.
pub fn render_markdown(doc: &Document) -> Result<String> {
    let front = FrontMatter {
        plan: doc.plan.name.clone(),
        description: doc.plan.description.clone(),
        completed: doc.plan.completed,
        tasks: doc.tasks.clone(),
        facts: doc.facts.clone(),
    };
    let yaml = serde_yaml::to_string(&front).context("Failed to serialize front matter")?;

    let mut out = String::with_capacity(yaml.len() + doc.plan.content.len() + 16);
    out.push_str(FRONT_MATTER_DELIMITER);
    out.push('\n');
    out.push_str(&yaml);
    out.push_str(FRONT_MATTER_DELIMITER);
    out.push('\n');
    if !doc.plan.content.is_empty() {
        out.push('\n');
        out.push_str(&doc.plan.content);
    }
    Ok(out)
}

/// Drop the single blank line that separates front matter from the body.
/// Everything after it is plan content, byte for byte.
fn strip_separator(body: &str) -> &str {
    body.strip_prefix("\r\n")
        .or_else(|| body.strip_prefix('\n'))
        .unwrap_or(body)
}

/// Split `---\n<yaml>\n---\n<body>` into its yaml and body parts.
fn split_front_matter(text: &str) -> Result<(&str, &str)> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = text.split_inclusive('\n');

    let first = lines.next().unwrap_or_default();
    if first.trim_end() != FRONT_MATTER_DELIMITER {
        eyre::bail!("Plan document must start with a '---' front matter line");
    }

    let yaml_start = first.len();
    let mut offset = yaml_start;
    for line in lines {
        if line.trim_end() == FRONT_MATTER_DELIMITER {
            let yaml = &text[yaml_start..offset];
            let body = &text[offset + line.len()..];
            return Ok((yaml, body));
        }
        offset += line.len();
    }

    eyre::bail!("Front matter is not closed with a '---' line")
}
