//! High-level store API for taskplan.

use crate::document::Document;
use crate::graph;
use crate::lifecycle::{self, Trigger};
use crate::search::{self, SearchHit};
use crate::storage::{Storage, edges, facts, plans, tasks};
use crate::sync::{self, ImportResult, PreviewResult};
use crate::types::{
    Dependency, Fact, FactLink, FactLinkKind, FactUpdate, Plan, PlanUpdate, Status, StatusChange, Task, TaskFields,
    TaskUpdate, ValidationError, validate_name, validate_priority,
};
use eyre::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

/// Errors that can occur during store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Plan not found.
    PlanNotFound(String),
    /// Task not found.
    TaskNotFound(String),
    /// Fact not found.
    FactNotFound(String),
    /// Validation error.
    Validation(ValidationError),
    /// The status table does not allow this move.
    InvalidTransition { from: Status, to: Status },
    /// A task cannot block itself.
    SelfDependency(i64),
    /// Adding this edge would create a cycle.
    CycleDetected { blocker: i64, blocked: i64 },
    /// An import failed and was rolled back. The cause follows in the chain.
    SyncFailure { plan: String },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::PlanNotFound(id) => write!(f, "plan not found: {}", id),
            StoreError::TaskNotFound(id) => write!(f, "task not found: {}", id),
            StoreError::FactNotFound(id) => write!(f, "fact not found: {}", id),
            StoreError::Validation(e) => write!(f, "validation error: {}", e),
            StoreError::InvalidTransition { from, to } => {
                write!(f, "invalid status transition from {} to {}", from, to)
            }
            StoreError::SelfDependency(id) => write!(f, "task {} cannot depend on itself", id),
            StoreError::CycleDetected { blocker, blocked } => {
                write!(f, "{} blocking {} would create a cycle", blocker, blocked)
            }
            StoreError::SyncFailure { plan } => write!(f, "import of plan '{}' failed; nothing was changed", plan),
        }
    }
}

impl std::error::Error for StoreError {}

fn invalid(e: ValidationError) -> eyre::Report {
    eyre::eyre!(StoreError::Validation(e))
}

/// The main taskplan store.
pub struct Store {
    storage: Storage,
}

impl Store {
    /// Initialize a new store in the given directory.
    pub fn init(root: &Path) -> Result<Self> {
        let storage = Storage::init(root)?;
        Ok(Self { storage })
    }

    /// Open an existing store.
    pub fn open(root: &Path) -> Result<Self> {
        let storage = Storage::open(root)?;
        Ok(Self { storage })
    }

    /// A store that lives only as long as the handle.
    pub fn open_in_memory() -> Result<Self> {
        let storage = Storage::open_in_memory()?;
        Ok(Self { storage })
    }

    fn conn(&self) -> &Connection {
        self.storage.conn()
    }

    /// Run `f` in a transaction, committing only if it succeeds.
    fn write<T>(&mut self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let tx = self.storage.transaction()?;
        let out = f(&tx)?;
        tx.commit().context("Failed to commit transaction")?;
        Ok(out)
    }

    // ---- plans ----

    /// Create a new plan.
    pub fn create_plan(&mut self, name: &str, description: &str, content: &str) -> Result<Plan> {
        validate_name(name).map_err(invalid)?;
        self.write(|conn| {
            if plans::get_by_name(conn, name)?.is_some() {
                return Err(invalid(ValidationError::DuplicateName(name.to_string())));
            }
            plans::insert(conn, name, description, content).context("Failed to persist plan")
        })
    }

    pub fn get_plan(&self, id: i64) -> Result<Option<Plan>> {
        plans::get(self.conn(), id)
    }

    pub fn get_plan_by_name(&self, name: &str) -> Result<Option<Plan>> {
        plans::get_by_name(self.conn(), name)
    }

    /// All plans in creation order.
    pub fn list_plans(&self) -> Result<Vec<Plan>> {
        plans::list(self.conn())
    }

    /// Update a plan's description, content or completed flag.
    pub fn update_plan(&mut self, id: i64, changes: &PlanUpdate) -> Result<Plan> {
        if changes.is_empty() {
            return Err(invalid(ValidationError::EmptyUpdate));
        }
        self.write(|conn| {
            plans::update(conn, id, changes)?.ok_or_else(|| eyre::eyre!(StoreError::PlanNotFound(id.to_string())))
        })
    }

    /// Delete a plan and everything it owns. Returns false if it did not exist.
    pub fn delete_plan(&mut self, id: i64) -> Result<bool> {
        self.write(|conn| {
            if plans::get(conn, id)?.is_none() {
                return Ok(false);
            }

            let mut removed = 0;
            for task in tasks::get_by_plan(conn, id)? {
                if task.parent_id.is_none() {
                    removed += delete_task_tree(conn, task.id)?;
                }
            }
            facts::delete_links_for_plan(conn, id)?;
            for fact in facts::get_by_plan(conn, id)? {
                facts::delete(conn, fact.id)?;
            }
            let deleted = plans::delete(conn, id)?;
            log::info!("deleted plan {} with {} task(s)", id, removed);
            Ok(deleted)
        })
    }

    // ---- tasks ----

    /// Create a pending task in a plan.
    pub fn create_task(&mut self, plan_id: i64, name: &str, fields: TaskFields) -> Result<Task> {
        validate_name(name).map_err(invalid)?;
        validate_priority(fields.priority).map_err(invalid)?;

        self.write(|conn| {
            if plans::get(conn, plan_id)?.is_none() {
                return Err(eyre::eyre!(StoreError::PlanNotFound(plan_id.to_string())));
            }
            if tasks::get_by_name(conn, plan_id, name)?.is_some() {
                return Err(invalid(ValidationError::DuplicateName(name.to_string())));
            }
            if let Some(parent_id) = fields.parent_id {
                check_parent(conn, plan_id, None, parent_id)?;
            }
            tasks::insert(conn, plan_id, name, &fields).context("Failed to persist task")
        })
    }

    pub fn get_task(&self, id: i64) -> Result<Option<Task>> {
        tasks::get(self.conn(), id)
    }

    pub fn get_task_by_name(&self, plan_id: i64, name: &str) -> Result<Option<Task>> {
        tasks::get_by_name(self.conn(), plan_id, name)
    }

    /// All tasks of a plan in creation order.
    pub fn tasks(&self, plan_id: i64) -> Result<Vec<Task>> {
        tasks::get_by_plan(self.conn(), plan_id)
    }

    /// Tasks of a plan in one status, by (priority, id).
    pub fn tasks_with_status(&self, plan_id: i64, status: Status) -> Result<Vec<Task>> {
        tasks::with_status(self.conn(), plan_id, status)
    }

    pub fn children(&self, parent_id: i64) -> Result<Vec<Task>> {
        tasks::children(self.conn(), parent_id)
    }

    /// Update a task's fields. Status is changed only through transitions.
    pub fn update_task(&mut self, id: i64, changes: &TaskUpdate) -> Result<Task> {
        if changes.is_empty() {
            return Err(invalid(ValidationError::EmptyUpdate));
        }
        if let Some(name) = &changes.name {
            validate_name(name).map_err(invalid)?;
        }
        if let Some(priority) = changes.priority {
            validate_priority(priority).map_err(invalid)?;
        }

        self.write(|conn| {
            let existing =
                tasks::get(conn, id)?.ok_or_else(|| eyre::eyre!(StoreError::TaskNotFound(id.to_string())))?;

            if let Some(name) = &changes.name {
                if *name != existing.name && tasks::get_by_name(conn, existing.plan_id, name)?.is_some() {
                    return Err(invalid(ValidationError::DuplicateName(name.clone())));
                }
            }
            if let Some(Some(parent_id)) = changes.parent_id {
                check_parent(conn, existing.plan_id, Some(id), parent_id)?;
            }

            tasks::update(conn, id, changes)?.ok_or_else(|| eyre::eyre!(StoreError::TaskNotFound(id.to_string())))
        })
    }

    /// Delete a task with its subtasks, edges, links and history.
    pub fn delete_task(&mut self, id: i64) -> Result<bool> {
        self.write(|conn| Ok(delete_task_tree(conn, id)? > 0))
    }

    // ---- status ----

    /// Move a task to `status` if the transition table allows it.
    pub fn set_status(&mut self, id: i64, status: Status) -> Result<Task> {
        self.write(|conn| lifecycle::transition(conn, id, status))
    }

    /// Fire a named trigger. The task must be in the trigger's source state.
    pub fn apply(&mut self, id: i64, trigger: Trigger) -> Result<Task> {
        self.write(|conn| {
            let task = tasks::get(conn, id)?.ok_or_else(|| eyre::eyre!(StoreError::TaskNotFound(id.to_string())))?;
            if task.status != trigger.source() {
                return Err(eyre::eyre!(StoreError::InvalidTransition {
                    from: task.status,
                    to: trigger.target()
                }));
            }
            lifecycle::transition(conn, id, trigger.target())
        })
    }

    pub fn start(&mut self, id: i64) -> Result<Task> {
        self.apply(id, Trigger::Start)
    }

    pub fn complete(&mut self, id: i64) -> Result<Task> {
        self.apply(id, Trigger::Complete)
    }

    pub fn fail(&mut self, id: i64) -> Result<Task> {
        self.apply(id, Trigger::Fail)
    }

    pub fn block(&mut self, id: i64) -> Result<Task> {
        self.apply(id, Trigger::Block)
    }

    pub fn unblock(&mut self, id: i64) -> Result<Task> {
        self.apply(id, Trigger::Unblock)
    }

    pub fn skip(&mut self, id: i64) -> Result<Task> {
        self.apply(id, Trigger::Skip)
    }

    pub fn retry(&mut self, id: i64) -> Result<Task> {
        self.apply(id, Trigger::Retry)
    }

    /// Status changes of a task, oldest first.
    pub fn status_history(&self, task_id: i64) -> Result<Vec<StatusChange>> {
        tasks::status_history(self.conn(), task_id)
    }

    // ---- dependencies ----

    /// Record that `blocker_id` must finish before `blocked_id` can start.
    pub fn add_dependency(&mut self, blocker_id: i64, blocked_id: i64) -> Result<Dependency> {
        self.write(|conn| graph::add_dependency(conn, blocker_id, blocked_id))
    }

    pub fn remove_dependency(&mut self, blocker_id: i64, blocked_id: i64) -> Result<bool> {
        self.write(|conn| graph::remove_dependency(conn, blocker_id, blocked_id))
    }

    /// Tasks that block `task_id`.
    pub fn blocking(&self, task_id: i64) -> Result<Vec<Task>> {
        graph::get_blocking(self.conn(), task_id)
    }

    /// Tasks blocked by `task_id`.
    pub fn blocked(&self, task_id: i64) -> Result<Vec<Task>> {
        graph::get_blocked(self.conn(), task_id)
    }

    /// Every edge within a plan.
    pub fn dependencies(&self, plan_id: i64) -> Result<Vec<Dependency>> {
        edges::for_plan(self.conn(), plan_id)
    }

    /// Pending tasks with no outstanding blockers, by (priority, id).
    pub fn ready(&self, plan_id: i64) -> Result<Vec<Task>> {
        graph::get_ready(self.conn(), plan_id)
    }

    pub fn next(&self, plan_id: i64) -> Result<Option<Task>> {
        graph::get_next(self.conn(), plan_id)
    }

    /// Unfinished tasks still waiting on a blocker.
    pub fn blocked_tasks(&self, plan_id: i64) -> Result<Vec<Task>> {
        graph::get_waiting(self.conn(), plan_id)
    }

    // ---- facts ----

    pub fn create_fact(&mut self, plan_id: i64, name: &str, description: &str, content: &str) -> Result<Fact> {
        validate_name(name).map_err(invalid)?;
        self.write(|conn| {
            if plans::get(conn, plan_id)?.is_none() {
                return Err(eyre::eyre!(StoreError::PlanNotFound(plan_id.to_string())));
            }
            if facts::get_by_name(conn, plan_id, name)?.is_some() {
                return Err(invalid(ValidationError::DuplicateName(name.to_string())));
            }
            facts::insert(conn, plan_id, name, description, content).context("Failed to persist fact")
        })
    }

    pub fn get_fact(&self, id: i64) -> Result<Option<Fact>> {
        facts::get(self.conn(), id)
    }

    pub fn get_fact_by_name(&self, plan_id: i64, name: &str) -> Result<Option<Fact>> {
        facts::get_by_name(self.conn(), plan_id, name)
    }

    pub fn facts(&self, plan_id: i64) -> Result<Vec<Fact>> {
        facts::get_by_plan(self.conn(), plan_id)
    }

    pub fn update_fact(&mut self, id: i64, changes: &FactUpdate) -> Result<Fact> {
        if changes.is_empty() {
            return Err(invalid(ValidationError::EmptyUpdate));
        }
        self.write(|conn| {
            facts::update(conn, id, changes)?.ok_or_else(|| eyre::eyre!(StoreError::FactNotFound(id.to_string())))
        })
    }

    pub fn delete_fact(&mut self, id: i64) -> Result<bool> {
        self.write(|conn| {
            facts::delete_links_for_fact(conn, id)?;
            facts::delete(conn, id)
        })
    }

    /// Attach a fact to a task of the same plan. Linking twice is a no-op.
    pub fn link_fact(&mut self, fact_id: i64, task_id: i64, kind: FactLinkKind) -> Result<FactLink> {
        self.write(|conn| {
            let fact =
                facts::get(conn, fact_id)?.ok_or_else(|| eyre::eyre!(StoreError::FactNotFound(fact_id.to_string())))?;
            let task =
                tasks::get(conn, task_id)?.ok_or_else(|| eyre::eyre!(StoreError::TaskNotFound(task_id.to_string())))?;
            if fact.plan_id != task.plan_id {
                return Err(invalid(ValidationError::CrossPlanLink));
            }
            facts::insert_link(conn, fact_id, task_id, kind)
        })
    }

    pub fn unlink_fact(&mut self, fact_id: i64, task_id: i64, kind: FactLinkKind) -> Result<bool> {
        self.write(|conn| facts::delete_link(conn, fact_id, task_id, kind))
    }

    pub fn fact_links(&self, fact_id: i64) -> Result<Vec<FactLink>> {
        facts::links_for_fact(self.conn(), fact_id)
    }

    // ---- sync ----

    /// Make the store match `doc`: upsert by name, delete orphans, replace
    /// edges and links. All or nothing.
    pub fn import(&mut self, doc: &Document) -> Result<ImportResult> {
        doc.validate().map_err(invalid)?;
        let plan = doc.plan.name.clone();

        let tx = self.storage.transaction()?;
        let result = sync::import(&tx, doc).wrap_err_with(|| StoreError::SyncFailure { plan: plan.clone() })?;
        tx.commit()
            .wrap_err_with(|| StoreError::SyncFailure { plan })?;
        Ok(result)
    }

    /// Counts of what `import(doc)` would do, without changing anything.
    pub fn preview(&self, doc: &Document) -> Result<PreviewResult> {
        doc.validate().map_err(invalid)?;
        sync::preview(self.conn(), doc)
    }

    /// The document form of a stored plan.
    pub fn export(&self, plan_id: i64) -> Result<Document> {
        sync::export(self.conn(), plan_id)
    }

    /// Full-text search, optionally within one plan.
    pub fn search(&self, query: &str, plan_id: Option<i64>, limit: usize) -> Result<Vec<SearchHit>> {
        search::search(self.conn(), query, plan_id, limit)
    }
}

/// Parent rules: same plan, not self, one level of nesting only.
fn check_parent(conn: &Connection, plan_id: i64, child_id: Option<i64>, parent_id: i64) -> Result<()> {
    if child_id == Some(parent_id) {
        return Err(invalid(ValidationError::SelfParent));
    }
    let parent =
        tasks::get(conn, parent_id)?.ok_or_else(|| eyre::eyre!(StoreError::TaskNotFound(parent_id.to_string())))?;
    if parent.plan_id != plan_id {
        return Err(invalid(ValidationError::ParentInOtherPlan));
    }
    if parent.parent_id.is_some() {
        return Err(invalid(ValidationError::NestingTooDeep));
    }
    if let Some(child_id) = child_id {
        if !tasks::children(conn, child_id)?.is_empty() {
            return Err(invalid(ValidationError::NestingTooDeep));
        }
    }
    Ok(())
}

/// Delete a task and its subtasks along with their links, edges and history.
/// Returns the number of task rows removed; zero if the task does not exist.
pub(crate) fn delete_task_tree(conn: &Connection, task_id: i64) -> Result<usize> {
    let mut deleted = 0;
    for child in tasks::children(conn, task_id)? {
        deleted += delete_task_tree(conn, child.id)?;
    }

    facts::delete_links_for_task(conn, task_id)?;
    graph::delete_task_edges(conn, task_id)?;
    tasks::delete_status_history(conn, task_id)?;
    if tasks::delete(conn, task_id)? {
        deleted += 1;
    }
    Ok(deleted)
}
