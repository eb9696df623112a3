//! Task rows and their status history.
//!
//! No graph logic lives here: existence of the owning plan, parent rules and
//! transition legality are checked by callers.

use super::{parse_enum, parse_timestamp, timestamp};
use crate::store::StoreError;
use crate::types::{Status, StatusChange, Task, TaskFields, TaskUpdate, ValidationError};
use chrono::{DateTime, Utc};
use eyre::Result;
use rusqlite::{Connection, OptionalExtension, params};

/// Column list shared with the graph queries, which alias `tasks` as `t`.
pub(crate) const TASK_COLUMNS: &str = "t.id, t.plan_id, t.parent_id, t.name, t.description, t.content, \
     t.acceptance_criteria, t.status, t.priority, t.completed, t.status_changed_at, t.created_at, t.updated_at";

/// Full task state written by the sync engine.
#[derive(Debug, Clone)]
pub(crate) struct TaskRecord<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub content: &'a str,
    pub acceptance_criteria: &'a str,
    pub status: Status,
    pub priority: i64,
}

pub(crate) fn insert(conn: &Connection, plan_id: i64, name: &str, fields: &TaskFields) -> Result<Task> {
    let now = Utc::now();
    conn.execute(
        r#"
        INSERT INTO tasks (plan_id, parent_id, name, description, content, acceptance_criteria,
                           status, priority, completed, status_changed_at, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, 0, ?8, ?8, ?8)
        "#,
        params![
            plan_id,
            fields.parent_id,
            name,
            fields.description,
            fields.content,
            fields.acceptance_criteria,
            fields.priority,
            timestamp(&now),
        ],
    )?;

    Ok(Task {
        id: conn.last_insert_rowid(),
        plan_id,
        parent_id: fields.parent_id,
        name: name.to_string(),
        description: fields.description.clone(),
        content: fields.content.clone(),
        acceptance_criteria: fields.acceptance_criteria.clone(),
        status: Status::Pending,
        priority: fields.priority,
        completed: false,
        status_changed_at: now,
        created_at: now,
        updated_at: now,
    })
}

pub(crate) fn get(conn: &Connection, id: i64) -> Result<Option<Task>> {
    let sql = format!("SELECT {} FROM tasks t WHERE t.id = ?1", TASK_COLUMNS);
    Ok(conn.query_row(&sql, params![id], row_to_task).optional()?)
}

pub(crate) fn get_by_name(conn: &Connection, plan_id: i64, name: &str) -> Result<Option<Task>> {
    let sql = format!("SELECT {} FROM tasks t WHERE t.plan_id = ?1 AND t.name = ?2", TASK_COLUMNS);
    Ok(conn.query_row(&sql, params![plan_id, name], row_to_task).optional()?)
}

/// All tasks of a plan in creation order.
pub(crate) fn get_by_plan(conn: &Connection, plan_id: i64) -> Result<Vec<Task>> {
    let sql = format!("SELECT {} FROM tasks t WHERE t.plan_id = ?1 ORDER BY t.id ASC", TASK_COLUMNS);
    query_tasks(conn, &sql, params![plan_id])
}

pub(crate) fn with_status(conn: &Connection, plan_id: i64, status: Status) -> Result<Vec<Task>> {
    let sql = format!(
        "SELECT {} FROM tasks t WHERE t.plan_id = ?1 AND t.status = ?2 ORDER BY t.priority ASC, t.id ASC",
        TASK_COLUMNS
    );
    query_tasks(conn, &sql, params![plan_id, status.as_str()])
}

pub(crate) fn children(conn: &Connection, parent_id: i64) -> Result<Vec<Task>> {
    let sql = format!("SELECT {} FROM tasks t WHERE t.parent_id = ?1 ORDER BY t.id ASC", TASK_COLUMNS);
    query_tasks(conn, &sql, params![parent_id])
}

/// Apply a partial update. Returns None if the task does not exist.
pub(crate) fn update(conn: &Connection, id: i64, changes: &TaskUpdate) -> Result<Option<Task>> {
    if changes.is_empty() {
        return Err(eyre::eyre!(StoreError::Validation(ValidationError::EmptyUpdate)));
    }
    let Some(existing) = get(conn, id)? else {
        return Ok(None);
    };

    let updated = Task {
        name: changes.name.clone().unwrap_or(existing.name),
        description: changes.description.clone().unwrap_or(existing.description),
        content: changes.content.clone().unwrap_or(existing.content),
        acceptance_criteria: changes
            .acceptance_criteria
            .clone()
            .unwrap_or(existing.acceptance_criteria),
        priority: changes.priority.unwrap_or(existing.priority),
        parent_id: changes.parent_id.unwrap_or(existing.parent_id),
        updated_at: Utc::now(),
        ..existing
    };
    write(conn, &updated)?;
    Ok(Some(updated))
}

/// Persist a status change. Legality is the caller's concern.
pub(crate) fn write_status(conn: &Connection, id: i64, status: Status, at: DateTime<Utc>) -> Result<bool> {
    let changed = conn.execute(
        r#"
        UPDATE tasks SET status = ?2, completed = ?3, status_changed_at = ?4, updated_at = ?4
        WHERE id = ?1
        "#,
        params![id, status.as_str(), status == Status::Completed, timestamp(&at)],
    )?;
    Ok(changed > 0)
}

pub(crate) fn set_parent(conn: &Connection, id: i64, parent_id: Option<i64>) -> Result<()> {
    conn.execute(
        "UPDATE tasks SET parent_id = ?2 WHERE id = ?1",
        params![id, parent_id],
    )?;
    Ok(())
}

/// Create or update the task keyed by (plan_id, name). The bool is true when created.
///
/// `status_changed_at` only moves when the status actually differs.
pub(crate) fn upsert(conn: &Connection, plan_id: i64, record: &TaskRecord<'_>) -> Result<(Task, bool)> {
    match get_by_name(conn, plan_id, record.name)? {
        Some(existing) => {
            let now = Utc::now();
            let status_changed_at = if existing.status != record.status {
                now.max(existing.status_changed_at)
            } else {
                existing.status_changed_at
            };
            let updated = Task {
                description: record.description.to_string(),
                content: record.content.to_string(),
                acceptance_criteria: record.acceptance_criteria.to_string(),
                status: record.status,
                completed: record.status == Status::Completed,
                priority: record.priority,
                status_changed_at,
                updated_at: now,
                ..existing
            };
            write(conn, &updated)?;
            Ok((updated, false))
        }
        None => {
            let fields = TaskFields {
                description: record.description.to_string(),
                content: record.content.to_string(),
                acceptance_criteria: record.acceptance_criteria.to_string(),
                priority: record.priority,
                parent_id: None,
            };
            let mut task = insert(conn, plan_id, record.name, &fields)?;
            if record.status != Status::Pending {
                write_status(conn, task.id, record.status, task.status_changed_at)?;
                task.status = record.status;
                task.completed = record.status == Status::Completed;
            }
            Ok((task, true))
        }
    }
}

/// Delete the task row only. Callers remove edges, links, history and children first.
pub(crate) fn delete(conn: &Connection, id: i64) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

pub(crate) fn record_status_change(conn: &Connection, change: &StatusChange) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO status_history (task_id, from_status, to_status, changed_at)
        VALUES (?1, ?2, ?3, ?4)
        "#,
        params![
            change.task_id,
            change.from.as_str(),
            change.to.as_str(),
            timestamp(&change.changed_at),
        ],
    )?;
    Ok(())
}

/// Status audit trail for a task, oldest first.
pub(crate) fn status_history(conn: &Connection, task_id: i64) -> Result<Vec<StatusChange>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT task_id, from_status, to_status, changed_at
        FROM status_history WHERE task_id = ?1
        ORDER BY id ASC
        "#,
    )?;
    let history = stmt
        .query_map(params![task_id], |row| {
            Ok(StatusChange {
                task_id: row.get(0)?,
                from: parse_enum(row, 1)?,
                to: parse_enum(row, 2)?,
                changed_at: parse_timestamp(row, 3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(history)
}

pub(crate) fn delete_status_history(conn: &Connection, task_id: i64) -> Result<usize> {
    Ok(conn.execute("DELETE FROM status_history WHERE task_id = ?1", params![task_id])?)
}

pub(crate) fn query_tasks(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(sql)?;
    let tasks = stmt.query_map(params, row_to_task)?.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tasks)
}

fn write(conn: &Connection, task: &Task) -> Result<()> {
    conn.execute(
        r#"
        UPDATE tasks SET parent_id = ?2, name = ?3, description = ?4, content = ?5,
            acceptance_criteria = ?6, status = ?7, priority = ?8, completed = ?9,
            status_changed_at = ?10, updated_at = ?11
        WHERE id = ?1
        "#,
        params![
            task.id,
            task.parent_id,
            task.name,
            task.description,
            task.content,
            task.acceptance_criteria,
            task.status.as_str(),
            task.priority,
            task.completed,
            timestamp(&task.status_changed_at),
            timestamp(&task.updated_at),
        ],
    )?;
    Ok(())
}

/// Convert a row selected with `TASK_COLUMNS` to a Task.
pub(crate) fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        plan_id: row.get(1)?,
        parent_id: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        content: row.get(5)?,
        acceptance_criteria: row.get(6)?,
        status: parse_enum(row, 7)?,
        priority: row.get(8)?,
        completed: row.get(9)?,
        status_changed_at: parse_timestamp(row, 10)?,
        created_at: parse_timestamp(row, 11)?,
        updated_at: parse_timestamp(row, 12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Storage, plans};

    fn setup() -> (Storage, i64) {
        let storage = Storage::open_in_memory().unwrap();
        let plan = plans::insert(storage.conn(), "plan", "", "").unwrap();
        (storage, plan.id)
    }

    fn record(name: &str, status: Status) -> TaskRecord<'_> {
        TaskRecord {
            name,
            description: "",
            content: "",
            acceptance_criteria: "",
            status,
            priority: 100,
        }
    }

    #[test]
    fn test_insert_and_get() {
        let (storage, plan_id) = setup();
        let fields = TaskFields::new().with_priority(7).with_description("do it");
        let task = insert(storage.conn(), plan_id, "t1", &fields).unwrap();

        assert_eq!(task.status, Status::Pending);
        assert!(!task.completed);

        let stored = get(storage.conn(), task.id).unwrap().unwrap();
        assert_eq!(stored, task);
        assert!(get_by_name(storage.conn(), plan_id, "t1").unwrap().is_some());
        assert!(get_by_name(storage.conn(), plan_id, "t2").unwrap().is_none());
    }

    #[test]
    fn test_names_unique_within_plan_only() {
        let (storage, plan_id) = setup();
        let other = plans::insert(storage.conn(), "other", "", "").unwrap();

        insert(storage.conn(), plan_id, "same", &TaskFields::new()).unwrap();
        insert(storage.conn(), other.id, "same", &TaskFields::new()).unwrap();
        assert!(insert(storage.conn(), plan_id, "same", &TaskFields::new()).is_err());
    }

    #[test]
    fn test_update_empty_fails() {
        let (storage, plan_id) = setup();
        let task = insert(storage.conn(), plan_id, "t", &TaskFields::new()).unwrap();
        assert!(update(storage.conn(), task.id, &TaskUpdate::default()).is_err());
    }

    #[test]
    fn test_update_merges_fields() {
        let (storage, plan_id) = setup();
        let task = insert(
            storage.conn(),
            plan_id,
            "t",
            &TaskFields::new().with_description("keep me"),
        )
        .unwrap();

        let changes = TaskUpdate {
            priority: Some(3),
            ..Default::default()
        };
        let updated = update(storage.conn(), task.id, &changes).unwrap().unwrap();
        assert_eq!(updated.priority, 3);
        assert_eq!(updated.description, "keep me");
        assert_eq!(updated.status_changed_at, task.status_changed_at);
    }

    #[test]
    fn test_upsert_creates_then_updates() {
        let (storage, plan_id) = setup();
        let (created, was_created) = upsert(storage.conn(), plan_id, &record("t", Status::Pending)).unwrap();
        assert!(was_created);

        let (updated, was_created) = upsert(storage.conn(), plan_id, &record("t", Status::Pending)).unwrap();
        assert!(!was_created);
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.status_changed_at, created.status_changed_at);
    }

    #[test]
    fn test_upsert_status_change_moves_timestamp() {
        let (storage, plan_id) = setup();
        let (created, _) = upsert(storage.conn(), plan_id, &record("t", Status::Pending)).unwrap();
        let (updated, _) = upsert(storage.conn(), plan_id, &record("t", Status::Completed)).unwrap();

        assert!(updated.completed);
        assert!(updated.status_changed_at >= created.status_changed_at);

        let stored = get(storage.conn(), created.id).unwrap().unwrap();
        assert_eq!(stored.status, Status::Completed);
        assert!(stored.completed);
    }

    #[test]
    fn test_upsert_new_with_status() {
        let (storage, plan_id) = setup();
        let (task, _) = upsert(storage.conn(), plan_id, &record("t", Status::Skipped)).unwrap();
        let stored = get(storage.conn(), task.id).unwrap().unwrap();
        assert_eq!(stored.status, Status::Skipped);
        assert!(!stored.completed);
    }

    #[test]
    fn test_status_history_roundtrip() {
        let (storage, plan_id) = setup();
        let task = insert(storage.conn(), plan_id, "t", &TaskFields::new()).unwrap();
        let change = StatusChange {
            task_id: task.id,
            from: Status::Pending,
            to: Status::InProgress,
            changed_at: Utc::now(),
        };
        record_status_change(storage.conn(), &change).unwrap();

        let history = status_history(storage.conn(), task.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from, Status::Pending);
        assert_eq!(history[0].to, Status::InProgress);

        assert_eq!(delete_status_history(storage.conn(), task.id).unwrap(), 1);
    }

    #[test]
    fn test_with_status_and_children() {
        let (storage, plan_id) = setup();
        let parent = insert(storage.conn(), plan_id, "parent", &TaskFields::new()).unwrap();
        let child = insert(
            storage.conn(),
            plan_id,
            "child",
            &TaskFields::new().with_parent(parent.id).with_priority(1),
        )
        .unwrap();

        let kids = children(storage.conn(), parent.id).unwrap();
        assert_eq!(kids.len(), 1);
        assert_eq!(kids[0].id, child.id);

        let pending = with_status(storage.conn(), plan_id, Status::Pending).unwrap();
        assert_eq!(pending[0].id, child.id);
        assert_eq!(pending.len(), 2);
    }
}
