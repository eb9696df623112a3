//! Dependency graph over the tasks of a plan.
//!
//! Edges point from blocker to blocked. The graph restricted to one plan is
//! kept acyclic: every single insertion first runs a breadth-first
//! reachability check from the blocked task, and a bulk import checks its
//! full edge set with one topological pass.

use crate::storage::edges;
use crate::storage::tasks::{self, TASK_COLUMNS};
use crate::store::StoreError;
use crate::types::{Dependency, DependencyKind, Task, ValidationError};
use eyre::Result;
use rusqlite::{Connection, params};
use std::collections::{HashMap, HashSet, VecDeque};

/// Statuses that still hold back dependents, as an SQL list.
const OUTSTANDING: &str = "('pending', 'in_progress', 'failed', 'blocked')";

/// Add "blocker blocks blocked". Re-adding an existing edge returns it unchanged.
pub(crate) fn add_dependency(conn: &Connection, blocker_id: i64, blocked_id: i64) -> Result<Dependency> {
    if blocker_id == blocked_id {
        return Err(eyre::eyre!(StoreError::SelfDependency(blocker_id)));
    }

    let blocker = tasks::get(conn, blocker_id)?
        .ok_or_else(|| eyre::eyre!(StoreError::TaskNotFound(blocker_id.to_string())))?;
    let blocked = tasks::get(conn, blocked_id)?
        .ok_or_else(|| eyre::eyre!(StoreError::TaskNotFound(blocked_id.to_string())))?;

    if blocker.plan_id != blocked.plan_id {
        return Err(eyre::eyre!(StoreError::Validation(
            ValidationError::CrossPlanDependency
        )));
    }

    if let Some(existing) = edges::get(conn, blocker_id, blocked_id)? {
        return Ok(existing);
    }

    if would_create_cycle(conn, blocker_id, blocked_id)? {
        return Err(eyre::eyre!(StoreError::CycleDetected {
            blocker: blocker_id,
            blocked: blocked_id
        }));
    }

    edges::insert(conn, blocker_id, blocked_id, DependencyKind::Blocks)?;
    log::debug!("dependency added: {} blocks {}", blocker.name, blocked.name);

    edges::get(conn, blocker_id, blocked_id)?
        .ok_or_else(|| eyre::eyre!("dependency {} -> {} missing after insert", blocker_id, blocked_id))
}

/// Delete the edge if present.
pub(crate) fn remove_dependency(conn: &Connection, blocker_id: i64, blocked_id: i64) -> Result<bool> {
    let removed = edges::delete(conn, blocker_id, blocked_id)?;
    if removed {
        log::debug!("dependency removed: {} -> {}", blocker_id, blocked_id);
    }
    Ok(removed)
}

/// Check if adding blocker -> blocked would close a cycle.
///
/// Walks outgoing "blocks" edges breadth-first from `blocked`; if `blocker`
/// is reachable the new edge would complete a loop. The visited set bounds
/// the walk even on a graph that is already damaged.
pub(crate) fn would_create_cycle(conn: &Connection, blocker_id: i64, blocked_id: i64) -> Result<bool> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([blocked_id]);

    while let Some(node) = queue.pop_front() {
        if node == blocker_id {
            return Ok(true);
        }
        if visited.insert(node) {
            for next in edges::dependents_of(conn, node)? {
                if !visited.contains(&next) {
                    queue.push_back(next);
                }
            }
        }
    }

    Ok(false)
}

/// Check a whole edge set at once. Returns the first edge, in input order,
/// that cannot be placed in a topological order, or None if the set is acyclic.
///
/// Kahn's algorithm over the given pairs only, so it costs O(V + E) with no
/// queries. Import uses it to validate a plan's edges before writing them.
pub(crate) fn find_cycle(pairs: &[(i64, i64)]) -> Option<(i64, i64)> {
    let mut out: HashMap<i64, Vec<i64>> = HashMap::new();
    let mut in_degree: HashMap<i64, usize> = HashMap::new();
    for &(blocker, blocked) in pairs {
        out.entry(blocker).or_default().push(blocked);
        in_degree.entry(blocker).or_default();
        *in_degree.entry(blocked).or_default() += 1;
    }

    let mut queue: VecDeque<i64> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(node, _)| *node)
        .collect();
    while let Some(node) = queue.pop_front() {
        for next in out.get(&node).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(next) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(*next);
                }
            }
        }
    }

    pairs
        .iter()
        .copied()
        .find(|(blocker, blocked)| in_degree[blocker] > 0 && in_degree[blocked] > 0)
}

/// Tasks that currently block `task_id`.
pub(crate) fn get_blocking(conn: &Connection, task_id: i64) -> Result<Vec<Task>> {
    let sql = format!(
        r#"
        SELECT {} FROM tasks t
        JOIN dependencies d ON d.blocker_id = t.id
        WHERE d.blocked_id = ?1
        ORDER BY t.id ASC
        "#,
        TASK_COLUMNS
    );
    tasks::query_tasks(conn, &sql, params![task_id])
}

/// Tasks currently blocked by `task_id`.
pub(crate) fn get_blocked(conn: &Connection, task_id: i64) -> Result<Vec<Task>> {
    let sql = format!(
        r#"
        SELECT {} FROM tasks t
        JOIN dependencies d ON d.blocked_id = t.id
        WHERE d.blocker_id = ?1
        ORDER BY t.id ASC
        "#,
        TASK_COLUMNS
    );
    tasks::query_tasks(conn, &sql, params![task_id])
}

/// Remove every edge touching the task. Run before the task row goes away.
pub(crate) fn delete_task_edges(conn: &Connection, task_id: i64) -> Result<usize> {
    edges::delete_for_task(conn, task_id)
}

/// Pending tasks whose blockers are all completed or skipped, by (priority, id).
pub(crate) fn get_ready(conn: &Connection, plan_id: i64) -> Result<Vec<Task>> {
    let sql = format!(
        r#"
        SELECT {} FROM tasks t
        WHERE t.plan_id = ?1
          AND t.status = 'pending'
          AND NOT EXISTS (
              SELECT 1 FROM dependencies d
              JOIN tasks blocker ON blocker.id = d.blocker_id
              WHERE d.blocked_id = t.id
                AND blocker.status IN {}
          )
        ORDER BY t.priority ASC, t.id ASC
        "#,
        TASK_COLUMNS, OUTSTANDING
    );
    tasks::query_tasks(conn, &sql, params![plan_id])
}

/// The single best task to work on next.
pub(crate) fn get_next(conn: &Connection, plan_id: i64) -> Result<Option<Task>> {
    Ok(get_ready(conn, plan_id)?.into_iter().next())
}

/// Unfinished tasks that still wait on at least one outstanding blocker.
pub(crate) fn get_waiting(conn: &Connection, plan_id: i64) -> Result<Vec<Task>> {
    let sql = format!(
        r#"
        SELECT {} FROM tasks t
        WHERE t.plan_id = ?1
          AND t.status IN ('pending', 'in_progress', 'blocked')
          AND EXISTS (
              SELECT 1 FROM dependencies d
              JOIN tasks blocker ON blocker.id = d.blocker_id
              WHERE d.blocked_id = t.id
                AND blocker.status IN {}
          )
        ORDER BY t.priority ASC, t.id ASC
        "#,
        TASK_COLUMNS, OUTSTANDING
    );
    tasks::query_tasks(conn, &sql, params![plan_id])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::transition;
    use crate::storage::{Storage, plans};
    use crate::types::{Status, TaskFields};

    fn setup(priorities: &[i64]) -> (Storage, i64, Vec<i64>) {
        let storage = Storage::open_in_memory().unwrap();
        let plan = plans::insert(storage.conn(), "plan", "", "").unwrap();
        let ids = priorities
            .iter()
            .enumerate()
            .map(|(i, p)| {
                tasks::insert(
                    storage.conn(),
                    plan.id,
                    &format!("t{}", i),
                    &TaskFields::new().with_priority(*p),
                )
                .unwrap()
                .id
            })
            .collect();
        (storage, plan.id, ids)
    }

    fn ids(tasks: &[Task]) -> Vec<i64> {
        tasks.iter().map(|t| t.id).collect()
    }

    #[test]
    fn test_cycle_check_on_chain() {
        let (storage, _, t) = setup(&[1, 1, 1, 1]);
        add_dependency(storage.conn(), t[0], t[1]).unwrap();
        add_dependency(storage.conn(), t[1], t[2]).unwrap();
        add_dependency(storage.conn(), t[2], t[3]).unwrap();

        assert!(would_create_cycle(storage.conn(), t[3], t[0]).unwrap());
        assert!(would_create_cycle(storage.conn(), t[2], t[1]).unwrap());
        assert!(!would_create_cycle(storage.conn(), t[0], t[3]).unwrap());
    }

    #[test]
    fn test_cycle_check_on_diamond() {
        let (storage, plan_id, t) = setup(&[1, 1, 1, 1]);
        add_dependency(storage.conn(), t[0], t[1]).unwrap();
        add_dependency(storage.conn(), t[0], t[2]).unwrap();
        add_dependency(storage.conn(), t[1], t[3]).unwrap();
        add_dependency(storage.conn(), t[2], t[3]).unwrap();

        let err = add_dependency(storage.conn(), t[3], t[0]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::CycleDetected { .. })
        ));
        assert_eq!(edges::for_plan(storage.conn(), plan_id).unwrap().len(), 4);
    }

    #[test]
    fn test_find_cycle() {
        assert_eq!(find_cycle(&[]), None);
        assert_eq!(find_cycle(&[(1, 2), (1, 3), (2, 4), (3, 4)]), None);
        assert_eq!(find_cycle(&[(1, 2), (2, 3), (3, 1)]), Some((1, 2)));
        assert_eq!(find_cycle(&[(5, 1), (1, 2), (2, 1)]), Some((1, 2)));
    }

    #[test]
    fn test_ready_ordering_and_release() {
        let (storage, plan_id, t) = setup(&[10, 5, 5]);
        assert_eq!(ids(&get_ready(storage.conn(), plan_id).unwrap()), vec![t[1], t[2], t[0]]);

        add_dependency(storage.conn(), t[0], t[1]).unwrap();
        assert_eq!(ids(&get_ready(storage.conn(), plan_id).unwrap()), vec![t[2], t[0]]);
        assert_eq!(ids(&get_waiting(storage.conn(), plan_id).unwrap()), vec![t[1]]);

        transition(storage.conn(), t[0], Status::InProgress).unwrap();
        transition(storage.conn(), t[0], Status::Failed).unwrap();
        assert_eq!(ids(&get_ready(storage.conn(), plan_id).unwrap()), vec![t[2]]);

        transition(storage.conn(), t[0], Status::Pending).unwrap();
        transition(storage.conn(), t[0], Status::InProgress).unwrap();
        transition(storage.conn(), t[0], Status::Completed).unwrap();
        assert_eq!(ids(&get_ready(storage.conn(), plan_id).unwrap()), vec![t[1], t[2]]);
        assert_eq!(get_next(storage.conn(), plan_id).unwrap().unwrap().id, t[1]);
    }

    #[test]
    fn test_skipped_blocker_releases() {
        let (storage, plan_id, t) = setup(&[1, 2]);
        add_dependency(storage.conn(), t[0], t[1]).unwrap();
        transition(storage.conn(), t[0], Status::Skipped).unwrap();
        assert_eq!(ids(&get_ready(storage.conn(), plan_id).unwrap()), vec![t[1]]);
    }

    #[test]
    fn test_blocking_and_blocked_lists() {
        let (storage, _, t) = setup(&[1, 1, 1]);
        add_dependency(storage.conn(), t[0], t[2]).unwrap();
        add_dependency(storage.conn(), t[1], t[2]).unwrap();

        assert_eq!(ids(&get_blocking(storage.conn(), t[2]).unwrap()), vec![t[0], t[1]]);
        assert_eq!(ids(&get_blocked(storage.conn(), t[0]).unwrap()), vec![t[2]]);
        assert!(get_blocking(storage.conn(), t[0]).unwrap().is_empty());

        assert_eq!(delete_task_edges(storage.conn(), t[2]).unwrap(), 2);
        assert!(get_blocked(storage.conn(), t[0]).unwrap().is_empty());
    }

    #[test]
    fn test_remove_missing_edge_is_noop() {
        let (storage, _, t) = setup(&[1, 1]);
        assert!(!remove_dependency(storage.conn(), t[0], t[1]).unwrap());
    }
}
