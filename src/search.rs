//! Full-text search over plan, task and fact text.
//!
//! The index is an FTS5 table kept current by triggers, so no write path has
//! to remember to update it.

use eyre::Result;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::ValidationError;

pub(crate) const SCHEMA: &str = r#"
    CREATE VIRTUAL TABLE IF NOT EXISTS search_index USING fts5(
        kind UNINDEXED,
        entity_id UNINDEXED,
        plan_id UNINDEXED,
        name,
        description,
        content
    );

    CREATE TRIGGER IF NOT EXISTS plans_search_ai AFTER INSERT ON plans BEGIN
        INSERT INTO search_index (kind, entity_id, plan_id, name, description, content)
        VALUES ('plan', NEW.id, NEW.id, NEW.name, NEW.description, NEW.content);
    END;
    CREATE TRIGGER IF NOT EXISTS plans_search_au AFTER UPDATE OF name, description, content ON plans BEGIN
        DELETE FROM search_index WHERE kind = 'plan' AND entity_id = OLD.id;
        INSERT INTO search_index (kind, entity_id, plan_id, name, description, content)
        VALUES ('plan', NEW.id, NEW.id, NEW.name, NEW.description, NEW.content);
    END;
    CREATE TRIGGER IF NOT EXISTS plans_search_ad AFTER DELETE ON plans BEGIN
        DELETE FROM search_index WHERE kind = 'plan' AND entity_id = OLD.id;
    END;

    CREATE TRIGGER IF NOT EXISTS tasks_search_ai AFTER INSERT ON tasks BEGIN
        INSERT INTO search_index (kind, entity_id, plan_id, name, description, content)
        VALUES ('task', NEW.id, NEW.plan_id, NEW.name, NEW.description, NEW.content);
    END;
    CREATE TRIGGER IF NOT EXISTS tasks_search_au AFTER UPDATE OF name, description, content ON tasks BEGIN
        DELETE FROM search_index WHERE kind = 'task' AND entity_id = OLD.id;
        INSERT INTO search_index (kind, entity_id, plan_id, name, description, content)
        VALUES ('task', NEW.id, NEW.plan_id, NEW.name, NEW.description, NEW.content);
    END;
    CREATE TRIGGER IF NOT EXISTS tasks_search_ad AFTER DELETE ON tasks BEGIN
        DELETE FROM search_index WHERE kind = 'task' AND entity_id = OLD.id;
    END;

    CREATE TRIGGER IF NOT EXISTS facts_search_ai AFTER INSERT ON facts BEGIN
        INSERT INTO search_index (kind, entity_id, plan_id, name, description, content)
        VALUES ('fact', NEW.id, NEW.plan_id, NEW.name, NEW.description, NEW.content);
    END;
    CREATE TRIGGER IF NOT EXISTS facts_search_au AFTER UPDATE OF name, description, content ON facts BEGIN
        DELETE FROM search_index WHERE kind = 'fact' AND entity_id = OLD.id;
        INSERT INTO search_index (kind, entity_id, plan_id, name, description, content)
        VALUES ('fact', NEW.id, NEW.plan_id, NEW.name, NEW.description, NEW.content);
    END;
    CREATE TRIGGER IF NOT EXISTS facts_search_ad AFTER DELETE ON facts BEGIN
        DELETE FROM search_index WHERE kind = 'fact' AND entity_id = OLD.id;
    END;
"#;

/// Which table a search hit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Plan,
    Task,
    Fact,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Plan => "plan",
            EntityKind::Task => "task",
            EntityKind::Fact => "fact",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plan" => Ok(EntityKind::Plan),
            "task" => Ok(EntityKind::Task),
            "fact" => Ok(EntityKind::Fact),
            other => Err(ValidationError::UnknownKind(other.to_string())),
        }
    }
}

/// A ranked search result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub kind: EntityKind,
    pub id: i64,
    pub plan_id: i64,
    pub name: String,
    /// bm25 rank; lower is a better match
    pub rank: f64,
}

/// Turn free text into an FTS5 prefix query: every term must match as a prefix.
/// Returns None if no terms remain.
pub(crate) fn fts_query(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split_whitespace()
        .map(|w| w.chars().filter(|c| *c != '"').collect::<String>())
        .filter(|w| !w.is_empty())
        .map(|w| format!("\"{}\"*", w))
        .collect();
    if terms.is_empty() {
        return None;
    }
    Some(terms.join(" "))
}

pub(crate) fn search(conn: &Connection, query: &str, plan_id: Option<i64>, limit: usize) -> Result<Vec<SearchHit>> {
    let Some(fts) = fts_query(query) else {
        return Ok(Vec::new());
    };
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);

    let mut stmt = conn.prepare(
        r#"
        SELECT kind, entity_id, plan_id, name, rank
        FROM search_index
        WHERE search_index MATCH ?1
          AND (?2 IS NULL OR plan_id = ?2)
        ORDER BY rank
        LIMIT ?3
        "#,
    )?;

    let hits = stmt
        .query_map(params![fts, plan_id, limit], |row| {
            Ok(SearchHit {
                kind: crate::storage::parse_enum(row, 0)?,
                id: row.get(1)?,
                plan_id: row.get(2)?,
                name: row.get(3)?,
                rank: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    log::debug!("search {:?} returned {} hit(s)", query, hits.len());
    Ok(hits)
}
