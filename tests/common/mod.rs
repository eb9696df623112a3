//! Shared test infrastructure for taskplan integration tests.
//!
//! Provides TestEnv helper for consistent test setup/teardown.

#![allow(dead_code)]

use taskplan::{Dependency, Document, PlanDoc, Plan, Status, Store, StoreError, Task, TaskDoc, TaskFields};
use tempfile::TempDir;

/// Test environment with automatic cleanup. Starts with one empty plan.
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub store: Store,
    pub plan: Plan,
}

impl TestEnv {
    /// Create a new test environment with an initialized store.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut store = Store::init(temp_dir.path()).expect("Failed to init store");
        let plan = store.create_plan("test-plan", "", "").expect("Failed to create plan");
        Self { temp_dir, store, plan }
    }

    /// Create a task with default priority.
    pub fn create_task(&mut self, name: &str) -> Task {
        self.store
            .create_task(self.plan.id, name, TaskFields::new())
            .expect("Failed to create task")
    }

    /// Create a task with specified priority.
    pub fn create_task_with_priority(&mut self, name: &str, priority: i64) -> Task {
        self.store
            .create_task(self.plan.id, name, TaskFields::new().with_priority(priority))
            .expect("Failed to create task")
    }

    /// `blocker` must finish before `blocked` can start.
    pub fn add_dep(&mut self, blocker: &Task, blocked: &Task) -> Dependency {
        self.store
            .add_dependency(blocker.id, blocked.id)
            .expect("Failed to add dependency")
    }

    /// Start then complete a task.
    pub fn finish(&mut self, task: &Task) -> Task {
        self.store.start(task.id).expect("Failed to start task");
        self.store.complete(task.id).expect("Failed to complete task")
    }

    /// Reload a task by id.
    pub fn reload(&self, task: &Task) -> Task {
        self.store
            .get_task(task.id)
            .expect("Failed to get task")
            .expect("Task vanished")
    }

    /// Names of ready tasks in scheduling order.
    pub fn ready_names(&self) -> Vec<String> {
        self.store
            .ready(self.plan.id)
            .expect("Failed to get ready tasks")
            .into_iter()
            .map(|t| t.name)
            .collect()
    }

    /// Assert that a task is in the ready list.
    pub fn assert_ready(&self, task: &Task) {
        let ready = self.ready_names();
        assert!(
            ready.contains(&task.name),
            "Expected task {} to be ready, but it wasn't. Ready tasks: {:?}",
            task.name,
            ready
        );
    }

    /// Assert that a task is NOT in the ready list.
    pub fn assert_not_ready(&self, task: &Task) {
        let ready = self.ready_names();
        assert!(
            !ready.contains(&task.name),
            "Expected task {} to NOT be ready, but it was",
            task.name
        );
    }

    /// Assert that a task is waiting on an outstanding blocker.
    pub fn assert_waiting(&self, task: &Task) {
        let waiting = self.store.blocked_tasks(self.plan.id).expect("Failed to get blocked tasks");
        assert!(
            waiting.iter().any(|t| t.id == task.id),
            "Expected task {} to be waiting, but it wasn't",
            task.name
        );
    }

    /// Get ready tasks count.
    pub fn ready_count(&self) -> usize {
        self.ready_names().len()
    }

    /// Get all tasks count.
    pub fn total_count(&self) -> usize {
        self.store.tasks(self.plan.id).expect("Failed to list tasks").len()
    }

    /// Get tasks by status.
    pub fn count_by_status(&self, status: Status) -> usize {
        self.store
            .tasks_with_status(self.plan.id, status)
            .expect("Failed to list tasks")
            .len()
    }

    pub fn edge_count(&self) -> usize {
        self.store.dependencies(self.plan.id).expect("Failed to list edges").len()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// A document for plan `plan` naming the given tasks, all defaults.
pub fn document(plan: &str, tasks: &[&str]) -> Document {
    Document {
        plan: PlanDoc {
            name: plan.to_string(),
            ..Default::default()
        },
        tasks: tasks.iter().map(|name| TaskDoc::new(*name)).collect(),
        facts: Vec::new(),
    }
}

/// Unwrap the StoreError carried by a report, if any.
pub fn store_error(err: &eyre::Report) -> Option<&StoreError> {
    err.downcast_ref::<StoreError>()
}

/// Find a StoreError anywhere in the cause chain.
pub fn cause_in_chain(err: &eyre::Report, pred: impl Fn(&StoreError) -> bool) -> bool {
    err.chain()
        .filter_map(|e| e.downcast_ref::<StoreError>())
        .any(pred)
}
