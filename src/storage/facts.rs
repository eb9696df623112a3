//! Fact rows and their advisory links to tasks.

use super::{parse_enum, parse_timestamp, timestamp};
use crate::types::{Fact, FactLink, FactLinkKind, FactUpdate};
use chrono::Utc;
use eyre::Result;
use rusqlite::{Connection, OptionalExtension, params};

const FACT_SELECT: &str =
    "SELECT id, plan_id, name, description, content, created_at, updated_at FROM facts";

/// Full fact state written by the sync engine.
#[derive(Debug, Clone)]
pub(crate) struct FactRecord<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub content: &'a str,
}

pub(crate) fn insert(conn: &Connection, plan_id: i64, name: &str, description: &str, content: &str) -> Result<Fact> {
    let now = Utc::now();
    conn.execute(
        r#"
        INSERT INTO facts (plan_id, name, description, content, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?5)
        "#,
        params![plan_id, name, description, content, timestamp(&now)],
    )?;

    Ok(Fact {
        id: conn.last_insert_rowid(),
        plan_id,
        name: name.to_string(),
        description: description.to_string(),
        content: content.to_string(),
        created_at: now,
        updated_at: now,
    })
}

pub(crate) fn get(conn: &Connection, id: i64) -> Result<Option<Fact>> {
    let sql = format!("{} WHERE id = ?1", FACT_SELECT);
    Ok(conn.query_row(&sql, params![id], row_to_fact).optional()?)
}

pub(crate) fn get_by_name(conn: &Connection, plan_id: i64, name: &str) -> Result<Option<Fact>> {
    let sql = format!("{} WHERE plan_id = ?1 AND name = ?2", FACT_SELECT);
    Ok(conn.query_row(&sql, params![plan_id, name], row_to_fact).optional()?)
}

pub(crate) fn get_by_plan(conn: &Connection, plan_id: i64) -> Result<Vec<Fact>> {
    let sql = format!("{} WHERE plan_id = ?1 ORDER BY id ASC", FACT_SELECT);
    let mut stmt = conn.prepare(&sql)?;
    let facts = stmt
        .query_map(params![plan_id], row_to_fact)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(facts)
}

pub(crate) fn update(conn: &Connection, id: i64, changes: &FactUpdate) -> Result<Option<Fact>> {
    let Some(existing) = get(conn, id)? else {
        return Ok(None);
    };

    let updated = Fact {
        description: changes.description.clone().unwrap_or(existing.description),
        content: changes.content.clone().unwrap_or(existing.content),
        updated_at: Utc::now(),
        ..existing
    };
    write(conn, &updated)?;
    Ok(Some(updated))
}

/// Create or update the fact keyed by (plan_id, name). The bool is true when created.
pub(crate) fn upsert(conn: &Connection, plan_id: i64, record: &FactRecord<'_>) -> Result<(Fact, bool)> {
    match get_by_name(conn, plan_id, record.name)? {
        Some(existing) => {
            let updated = Fact {
                description: record.description.to_string(),
                content: record.content.to_string(),
                updated_at: Utc::now(),
                ..existing
            };
            write(conn, &updated)?;
            Ok((updated, false))
        }
        None => {
            let fact = insert(conn, plan_id, record.name, record.description, record.content)?;
            Ok((fact, true))
        }
    }
}

/// Delete the fact row only. Callers remove its links first.
pub(crate) fn delete(conn: &Connection, id: i64) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM facts WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

pub(crate) fn insert_link(conn: &Connection, fact_id: i64, task_id: i64, kind: FactLinkKind) -> Result<FactLink> {
    let now = Utc::now();
    conn.execute(
        r#"
        INSERT INTO fact_links (fact_id, task_id, kind, created_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT (fact_id, task_id, kind) DO NOTHING
        "#,
        params![fact_id, task_id, kind.as_str(), timestamp(&now)],
    )?;

    let link = conn.query_row(
        r#"
        SELECT fact_id, task_id, kind, created_at FROM fact_links
        WHERE fact_id = ?1 AND task_id = ?2 AND kind = ?3
        "#,
        params![fact_id, task_id, kind.as_str()],
        row_to_link,
    )?;
    Ok(link)
}

pub(crate) fn delete_link(conn: &Connection, fact_id: i64, task_id: i64, kind: FactLinkKind) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM fact_links WHERE fact_id = ?1 AND task_id = ?2 AND kind = ?3",
        params![fact_id, task_id, kind.as_str()],
    )?;
    Ok(deleted > 0)
}

pub(crate) fn links_for_fact(conn: &Connection, fact_id: i64) -> Result<Vec<FactLink>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT fact_id, task_id, kind, created_at FROM fact_links
        WHERE fact_id = ?1 ORDER BY task_id ASC, kind ASC
        "#,
    )?;
    let links = stmt
        .query_map(params![fact_id], row_to_link)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(links)
}

pub(crate) fn delete_links_for_fact(conn: &Connection, fact_id: i64) -> Result<usize> {
    Ok(conn.execute("DELETE FROM fact_links WHERE fact_id = ?1", params![fact_id])?)
}

pub(crate) fn delete_links_for_task(conn: &Connection, task_id: i64) -> Result<usize> {
    Ok(conn.execute("DELETE FROM fact_links WHERE task_id = ?1", params![task_id])?)
}

pub(crate) fn delete_links_for_plan(conn: &Connection, plan_id: i64) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM fact_links WHERE fact_id IN (SELECT id FROM facts WHERE plan_id = ?1)",
        params![plan_id],
    )?;
    Ok(deleted)
}

fn write(conn: &Connection, fact: &Fact) -> Result<()> {
    conn.execute(
        "UPDATE facts SET description = ?2, content = ?3, updated_at = ?4 WHERE id = ?1",
        params![fact.id, fact.description, fact.content, timestamp(&fact.updated_at)],
    )?;
    Ok(())
}

fn row_to_fact(row: &rusqlite::Row) -> rusqlite::Result<Fact> {
    Ok(Fact {
        id: row.get(0)?,
        plan_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        content: row.get(4)?,
        created_at: parse_timestamp(row, 5)?,
        updated_at: parse_timestamp(row, 6)?,
    })
}

fn row_to_link(row: &rusqlite::Row) -> rusqlite::Result<FactLink> {
    Ok(FactLink {
        fact_id: row.get(0)?,
        task_id: row.get(1)?,
        kind: parse_enum(row, 2)?,
        created_at: parse_timestamp(row, 3)?,
    })
}
