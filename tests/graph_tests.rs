//! Integration tests for graph operations.
//!
//! Tests dependency management, cycle detection, and ready work calculation.

mod common;

use common::{TestEnv, store_error};
use taskplan::{Status, StoreError, TaskFields, ValidationError};

// =============================================================================
// Ready Work Calculation Tests
// =============================================================================

#[test]
fn test_ready_empty_plan() {
    let env = TestEnv::new();
    assert!(env.store.ready(env.plan.id).unwrap().is_empty());
    assert!(env.store.next(env.plan.id).unwrap().is_none());
}

#[test]
fn test_ready_multiple_independent_tasks() {
    let mut env = TestEnv::new();
    let t1 = env.create_task("Task 1");
    let t2 = env.create_task("Task 2");
    let t3 = env.create_task("Task 3");

    env.assert_ready(&t1);
    env.assert_ready(&t2);
    env.assert_ready(&t3);
    assert_eq!(env.ready_count(), 3);
}

#[test]
fn test_next_prefers_lower_priority_value() {
    let mut env = TestEnv::new();
    env.create_task_with_priority("T1", 10);
    let t2 = env.create_task_with_priority("T2", 5);

    assert_eq!(env.ready_names(), vec!["T2", "T1"]);
    assert_eq!(env.store.next(env.plan.id).unwrap().unwrap().id, t2.id);
}

#[test]
fn test_priority_ties_break_by_creation_order() {
    let mut env = TestEnv::new();
    env.create_task_with_priority("b", 1);
    env.create_task_with_priority("a", 1);
    env.create_task_with_priority("c", 0);

    assert_eq!(env.ready_names(), vec!["c", "b", "a"]);
}

#[test]
fn test_dependency_overrides_priority() {
    let mut env = TestEnv::new();
    let t1 = env.create_task_with_priority("T1", 10);
    let t2 = env.create_task_with_priority("T2", 5);
    env.add_dep(&t1, &t2);

    assert_eq!(env.ready_names(), vec!["T1"]);
    env.assert_waiting(&t2);

    env.finish(&t1);
    assert_eq!(env.ready_names(), vec!["T2"]);
}

#[test]
fn test_ready_chain_of_dependencies() {
    let mut env = TestEnv::new();
    let a = env.create_task("A");
    let b = env.create_task("B");
    let c = env.create_task("C");
    env.add_dep(&a, &b);
    env.add_dep(&b, &c);

    assert_eq!(env.ready_names(), vec!["A"]);
    env.finish(&a);
    assert_eq!(env.ready_names(), vec!["B"]);
    env.finish(&b);
    assert_eq!(env.ready_names(), vec!["C"]);
}

#[test]
fn test_ready_requires_all_blockers_released() {
    let mut env = TestEnv::new();
    let a = env.create_task("A");
    let b = env.create_task("B");
    let c = env.create_task("C");
    env.add_dep(&a, &c);
    env.add_dep(&b, &c);

    env.finish(&a);
    env.assert_not_ready(&c);

    env.store.skip(b.id).unwrap();
    env.assert_ready(&c);
}

#[test]
fn test_in_progress_and_blocked_blockers_hold_dependents() {
    let mut env = TestEnv::new();
    let a = env.create_task("A");
    let b = env.create_task("B");
    env.add_dep(&a, &b);

    env.store.start(a.id).unwrap();
    env.assert_not_ready(&b);

    env.store.block(a.id).unwrap();
    env.assert_not_ready(&b);

    env.store.unblock(a.id).unwrap();
    env.store.fail(a.id).unwrap();
    env.assert_not_ready(&b);
}

#[test]
fn test_started_task_leaves_ready_list() {
    let mut env = TestEnv::new();
    let a = env.create_task("A");
    env.store.start(a.id).unwrap();
    env.assert_not_ready(&a);
    assert_eq!(env.count_by_status(Status::InProgress), 1);
}

// =============================================================================
// Cycle Detection Tests
// =============================================================================

#[test]
fn test_two_node_cycle_rejected() {
    let mut env = TestEnv::new();
    let a = env.create_task("A");
    let b = env.create_task("B");
    env.add_dep(&a, &b);

    let err = env.store.add_dependency(b.id, a.id).unwrap_err();
    match store_error(&err) {
        Some(StoreError::CycleDetected { blocker, blocked }) => {
            assert_eq!(*blocker, b.id);
            assert_eq!(*blocked, a.id);
        }
        other => panic!("expected cycle error, got {:?}", other),
    }
    assert_eq!(env.edge_count(), 1);
}

#[test]
fn test_long_cycle_rejected_and_edges_unchanged() {
    let mut env = TestEnv::new();
    let tasks: Vec<_> = (0..6).map(|i| env.create_task(&format!("t{}", i))).collect();
    for pair in tasks.windows(2) {
        env.add_dep(&pair[0], &pair[1]);
    }
    let before = env.store.dependencies(env.plan.id).unwrap();

    let err = env.store.add_dependency(tasks[5].id, tasks[0].id).unwrap_err();
    assert!(matches!(store_error(&err), Some(StoreError::CycleDetected { .. })));
    assert_eq!(env.store.dependencies(env.plan.id).unwrap(), before);
}

#[test]
fn test_self_dependency_rejected() {
    let mut env = TestEnv::new();
    let a = env.create_task("A");

    let err = env.store.add_dependency(a.id, a.id).unwrap_err();
    assert!(matches!(store_error(&err), Some(StoreError::SelfDependency(id)) if *id == a.id));
    assert_eq!(env.edge_count(), 0);
}

#[test]
fn test_transitive_shortcut_allowed() {
    let mut env = TestEnv::new();
    let a = env.create_task("A");
    let b = env.create_task("B");
    let c = env.create_task("C");
    env.add_dep(&a, &b);
    env.add_dep(&b, &c);

    // a -> c is redundant but not a cycle
    env.add_dep(&a, &c);
    assert_eq!(env.edge_count(), 3);
}

#[test]
fn test_duplicate_dependency_is_idempotent() {
    let mut env = TestEnv::new();
    let a = env.create_task("A");
    let b = env.create_task("B");

    let first = env.add_dep(&a, &b);
    let second = env.add_dep(&a, &b);
    assert_eq!(first, second);
    assert_eq!(env.edge_count(), 1);
}

#[test]
fn test_cross_plan_dependency_rejected() {
    let mut env = TestEnv::new();
    let a = env.create_task("A");
    let other = env.store.create_plan("other", "", "").unwrap();
    let b = env.store.create_task(other.id, "B", TaskFields::new()).unwrap();

    let err = env.store.add_dependency(a.id, b.id).unwrap_err();
    assert!(matches!(
        store_error(&err),
        Some(StoreError::Validation(ValidationError::CrossPlanDependency))
    ));
}

#[test]
fn test_dependency_on_missing_task() {
    let mut env = TestEnv::new();
    let a = env.create_task("A");

    let err = env.store.add_dependency(a.id, 9999).unwrap_err();
    assert!(matches!(store_error(&err), Some(StoreError::TaskNotFound(_))));
}

// =============================================================================
// Edge Removal and Queries
// =============================================================================

#[test]
fn test_remove_dependency_releases_task() {
    let mut env = TestEnv::new();
    let a = env.create_task("A");
    let b = env.create_task("B");
    env.add_dep(&a, &b);
    env.assert_not_ready(&b);

    assert!(env.store.remove_dependency(a.id, b.id).unwrap());
    env.assert_ready(&b);
    assert!(!env.store.remove_dependency(a.id, b.id).unwrap());
}

#[test]
fn test_removed_edge_can_be_reversed() {
    let mut env = TestEnv::new();
    let a = env.create_task("A");
    let b = env.create_task("B");
    env.add_dep(&a, &b);
    env.store.remove_dependency(a.id, b.id).unwrap();

    env.add_dep(&b, &a);
    assert_eq!(env.ready_names(), vec!["B"]);
}

#[test]
fn test_blocking_and_blocked_queries() {
    let mut env = TestEnv::new();
    let a = env.create_task("A");
    let b = env.create_task("B");
    let c = env.create_task("C");
    env.add_dep(&a, &c);
    env.add_dep(&b, &c);

    let blocking: Vec<_> = env.store.blocking(c.id).unwrap().into_iter().map(|t| t.name).collect();
    assert_eq!(blocking, vec!["A", "B"]);

    let blocked: Vec<_> = env.store.blocked(a.id).unwrap().into_iter().map(|t| t.name).collect();
    assert_eq!(blocked, vec!["C"]);
}

#[test]
fn test_deleting_blocker_releases_dependent() {
    let mut env = TestEnv::new();
    let a = env.create_task("A");
    let b = env.create_task("B");
    env.add_dep(&a, &b);

    env.store.delete_task(a.id).unwrap();
    env.assert_ready(&b);
    assert_eq!(env.edge_count(), 0);
}
