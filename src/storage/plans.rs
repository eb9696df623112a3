//! Plan rows.

use super::{parse_timestamp, timestamp};
use crate::types::{Plan, PlanUpdate};
use chrono::Utc;
use eyre::Result;
use rusqlite::{Connection, OptionalExtension, params};

const PLAN_SELECT: &str =
    "SELECT id, name, description, content, completed, created_at, updated_at FROM plans";

/// Full plan state written by the sync engine.
#[derive(Debug, Clone)]
pub(crate) struct PlanRecord<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub content: &'a str,
    pub completed: bool,
}

pub(crate) fn insert(conn: &Connection, name: &str, description: &str, content: &str) -> Result<Plan> {
    let now = Utc::now();
    conn.execute(
        r#"
        INSERT INTO plans (name, description, content, completed, created_at, updated_at)
        VALUES (?1, ?2, ?3, 0, ?4, ?4)
        "#,
        params![name, description, content, timestamp(&now)],
    )?;

    Ok(Plan {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        description: description.to_string(),
        content: content.to_string(),
        completed: false,
        created_at: now,
        updated_at: now,
    })
}

pub(crate) fn get(conn: &Connection, id: i64) -> Result<Option<Plan>> {
    let sql = format!("{} WHERE id = ?1", PLAN_SELECT);
    Ok(conn.query_row(&sql, params![id], row_to_plan).optional()?)
}

pub(crate) fn get_by_name(conn: &Connection, name: &str) -> Result<Option<Plan>> {
    let sql = format!("{} WHERE name = ?1", PLAN_SELECT);
    Ok(conn.query_row(&sql, params![name], row_to_plan).optional()?)
}

pub(crate) fn list(conn: &Connection) -> Result<Vec<Plan>> {
    let sql = format!("{} ORDER BY id ASC", PLAN_SELECT);
    let mut stmt = conn.prepare(&sql)?;
    let plans = stmt.query_map([], row_to_plan)?.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(plans)
}

/// Apply a partial update. Returns None if the plan does not exist.
pub(crate) fn update(conn: &Connection, id: i64, changes: &PlanUpdate) -> Result<Option<Plan>> {
    let Some(existing) = get(conn, id)? else {
        return Ok(None);
    };

    let updated = Plan {
        description: changes.description.clone().unwrap_or(existing.description),
        content: changes.content.clone().unwrap_or(existing.content),
        completed: changes.completed.unwrap_or(existing.completed),
        updated_at: Utc::now(),
        ..existing
    };
    write(conn, &updated)?;
    Ok(Some(updated))
}

/// Create or update the plan keyed by name. The bool is true when created.
pub(crate) fn upsert(conn: &Connection, record: &PlanRecord<'_>) -> Result<(Plan, bool)> {
    match get_by_name(conn, record.name)? {
        Some(existing) => {
            let updated = Plan {
                description: record.description.to_string(),
                content: record.content.to_string(),
                completed: record.completed,
                updated_at: Utc::now(),
                ..existing
            };
            write(conn, &updated)?;
            Ok((updated, false))
        }
        None => {
            let mut plan = insert(conn, record.name, record.description, record.content)?;
            if record.completed {
                plan.completed = true;
                write(conn, &plan)?;
            }
            Ok((plan, true))
        }
    }
}

/// Delete the plan row only. Callers clear tasks and facts first.
pub(crate) fn delete(conn: &Connection, id: i64) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM plans WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

fn write(conn: &Connection, plan: &Plan) -> Result<()> {
    conn.execute(
        r#"
        UPDATE plans SET description = ?2, content = ?3, completed = ?4, updated_at = ?5
        WHERE id = ?1
        "#,
        params![
            plan.id,
            plan.description,
            plan.content,
            plan.completed,
            timestamp(&plan.updated_at),
        ],
    )?;
    Ok(())
}

fn row_to_plan(row: &rusqlite::Row) -> rusqlite::Result<Plan> {
    Ok(Plan {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        content: row.get(3)?,
        completed: row.get(4)?,
        created_at: parse_timestamp(row, 5)?,
        updated_at: parse_timestamp(row, 6)?,
    })
}
