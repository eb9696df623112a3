//! Task lifecycle: named triggers and the single checked transition path.
//!
//! Every status write outside of document sync goes through [`transition`],
//! which enforces [`Status::can_transition_to`] and appends to the audit trail.

use crate::storage::tasks;
use crate::store::StoreError;
use crate::types::{Status, StatusChange, Task};
use chrono::Utc;
use eyre::Result;
use rusqlite::Connection;
use std::fmt;

/// Named events that move a task between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// pending -> in_progress
    Start,
    /// pending -> skipped
    Skip,
    /// in_progress -> completed
    Complete,
    /// in_progress -> failed
    Fail,
    /// in_progress -> blocked
    Block,
    /// blocked -> in_progress
    Unblock,
    /// failed -> pending
    Retry,
}

impl Trigger {
    /// The state a task lands in when this trigger fires.
    pub fn target(&self) -> Status {
        match self {
            Trigger::Start | Trigger::Unblock => Status::InProgress,
            Trigger::Skip => Status::Skipped,
            Trigger::Complete => Status::Completed,
            Trigger::Fail => Status::Failed,
            Trigger::Block => Status::Blocked,
            Trigger::Retry => Status::Pending,
        }
    }

    /// The state a task must be in for this trigger to apply.
    pub fn source(&self) -> Status {
        match self {
            Trigger::Start | Trigger::Skip => Status::Pending,
            Trigger::Complete | Trigger::Fail | Trigger::Block => Status::InProgress,
            Trigger::Unblock => Status::Blocked,
            Trigger::Retry => Status::Failed,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Trigger::Start => "start",
            Trigger::Skip => "skip",
            Trigger::Complete => "complete",
            Trigger::Fail => "fail",
            Trigger::Block => "block",
            Trigger::Unblock => "unblock",
            Trigger::Retry => "retry",
        };
        f.write_str(name)
    }
}

/// Move a task to `to`, or fail with `InvalidTransition` leaving it untouched.
pub(crate) fn transition(conn: &Connection, task_id: i64, to: Status) -> Result<Task> {
    let task = tasks::get(conn, task_id)?
        .ok_or_else(|| eyre::eyre!(StoreError::TaskNotFound(task_id.to_string())))?;

    if !task.status.can_transition_to(&to) {
        return Err(eyre::eyre!(StoreError::InvalidTransition {
            from: task.status,
            to
        }));
    }

    // Never let the clock run backwards on status_changed_at.
    let changed_at = Utc::now().max(task.status_changed_at);
    tasks::write_status(conn, task_id, to, changed_at)?;
    tasks::record_status_change(
        conn,
        &StatusChange {
            task_id,
            from: task.status,
            to,
            changed_at,
        },
    )?;

    log::debug!("task {} {} -> {}", task_id, task.status, to);

    Ok(Task {
        status: to,
        completed: to == Status::Completed,
        status_changed_at: changed_at,
        updated_at: changed_at,
        ..task
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Storage, plans};
    use crate::types::TaskFields;

    const TRIGGERS: [Trigger; 7] = [
        Trigger::Start,
        Trigger::Skip,
        Trigger::Complete,
        Trigger::Fail,
        Trigger::Block,
        Trigger::Unblock,
        Trigger::Retry,
    ];

    fn setup() -> (Storage, i64) {
        let storage = Storage::open_in_memory().unwrap();
        let plan = plans::insert(storage.conn(), "p", "", "").unwrap();
        let task = tasks::insert(storage.conn(), plan.id, "t", &TaskFields::new()).unwrap();
        (storage, task.id)
    }

    #[test]
    fn test_triggers_match_transition_table() {
        for trigger in TRIGGERS {
            assert!(
                trigger.source().can_transition_to(&trigger.target()),
                "{} is not in the transition table",
                trigger
            );
        }
    }

    #[test]
    fn test_transition_updates_mirror_and_history() {
        let (storage, id) = setup();

        let started = transition(storage.conn(), id, Status::InProgress).unwrap();
        assert_eq!(started.status, Status::InProgress);
        assert!(!started.completed);

        let done = transition(storage.conn(), id, Status::Completed).unwrap();
        assert!(done.completed);
        assert!(done.status_changed_at >= started.status_changed_at);

        let stored = tasks::get(storage.conn(), id).unwrap().unwrap();
        assert_eq!(stored.status, Status::Completed);
        assert!(stored.completed);

        let history = tasks::status_history(storage.conn(), id).unwrap();
        let pairs: Vec<(Status, Status)> = history.iter().map(|c| (c.from, c.to)).collect();
        assert_eq!(
            pairs,
            vec![
                (Status::Pending, Status::InProgress),
                (Status::InProgress, Status::Completed)
            ]
        );
    }

    #[test]
    fn test_illegal_transition_leaves_task_untouched() {
        let (storage, id) = setup();
        let before = tasks::get(storage.conn(), id).unwrap().unwrap();

        let err = transition(storage.conn(), id, Status::Completed).unwrap_err();
        match err.downcast_ref::<StoreError>() {
            Some(StoreError::InvalidTransition { from, to }) => {
                assert_eq!(*from, Status::Pending);
                assert_eq!(*to, Status::Completed);
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let after = tasks::get(storage.conn(), id).unwrap().unwrap();
        assert_eq!(before, after);
        assert!(tasks::status_history(storage.conn(), id).unwrap().is_empty());
    }

    #[test]
    fn test_transition_missing_task() {
        let storage = Storage::open_in_memory().unwrap();
        let err = transition(storage.conn(), 99, Status::InProgress).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::TaskNotFound(_))
        ));
    }
}
