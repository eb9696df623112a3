//! Dependency edge rows. An edge (blocker, blocked) means "blocker blocks blocked".

use super::{parse_enum, parse_timestamp, timestamp};
use crate::types::{Dependency, DependencyKind};
use chrono::Utc;
use eyre::Result;
use rusqlite::{Connection, OptionalExtension, params};

/// Insert an edge. Returns false if the ordered pair already existed.
/// Other constraint violations, such as a self-loop, are errors.
pub(crate) fn insert(conn: &Connection, blocker_id: i64, blocked_id: i64, kind: DependencyKind) -> Result<bool> {
    let inserted = conn.execute(
        r#"
        INSERT INTO dependencies (blocker_id, blocked_id, kind, created_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT (blocker_id, blocked_id) DO NOTHING
        "#,
        params![blocker_id, blocked_id, kind.as_str(), timestamp(&Utc::now())],
    )?;
    Ok(inserted > 0)
}

pub(crate) fn get(conn: &Connection, blocker_id: i64, blocked_id: i64) -> Result<Option<Dependency>> {
    let edge = conn
        .query_row(
            r#"
            SELECT blocker_id, blocked_id, kind, created_at
            FROM dependencies WHERE blocker_id = ?1 AND blocked_id = ?2
            "#,
            params![blocker_id, blocked_id],
            row_to_dependency,
        )
        .optional()?;
    Ok(edge)
}

pub(crate) fn delete(conn: &Connection, blocker_id: i64, blocked_id: i64) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM dependencies WHERE blocker_id = ?1 AND blocked_id = ?2",
        params![blocker_id, blocked_id],
    )?;
    Ok(deleted > 0)
}

/// Ids of the tasks that `task_id` blocks (outgoing edges).
pub(crate) fn dependents_of(conn: &Connection, task_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare_cached(
        "SELECT blocked_id FROM dependencies WHERE blocker_id = ?1 ORDER BY blocked_id ASC",
    )?;
    let ids = stmt
        .query_map(params![task_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

/// Every edge whose endpoints belong to the plan.
pub(crate) fn for_plan(conn: &Connection, plan_id: i64) -> Result<Vec<Dependency>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT d.blocker_id, d.blocked_id, d.kind, d.created_at
        FROM dependencies d
        JOIN tasks t ON t.id = d.blocked_id
        WHERE t.plan_id = ?1
        ORDER BY d.blocker_id ASC, d.blocked_id ASC
        "#,
    )?;
    let edges = stmt
        .query_map(params![plan_id], row_to_dependency)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(edges)
}

/// Remove every edge touching the task, in either direction.
pub(crate) fn delete_for_task(conn: &Connection, task_id: i64) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM dependencies WHERE blocker_id = ?1 OR blocked_id = ?1",
        params![task_id],
    )?;
    Ok(deleted)
}

pub(crate) fn delete_for_plan(conn: &Connection, plan_id: i64) -> Result<usize> {
    let deleted = conn.execute(
        r#"
        DELETE FROM dependencies
        WHERE blocker_id IN (SELECT id FROM tasks WHERE plan_id = ?1)
           OR blocked_id IN (SELECT id FROM tasks WHERE plan_id = ?1)
        "#,
        params![plan_id],
    )?;
    Ok(deleted)
}

fn row_to_dependency(row: &rusqlite::Row) -> rusqlite::Result<Dependency> {
    Ok(Dependency {
        blocker_id: row.get(0)?,
        blocked_id: row.get(1)?,
        kind: parse_enum(row, 2)?,
        created_at: parse_timestamp(row, 3)?,
    })
}
