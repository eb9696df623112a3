//! Document synchronization: import, preview and export.
//!
//! Import is upsert-plus-orphan-deletion keyed by names. It runs against
//! whatever connection it is handed; [`crate::Store::import`] hands it a
//! transaction so a failure anywhere leaves the store untouched.

use crate::document::{Document, FactDoc, FactLinkDoc, PlanDoc, TaskDoc};
use crate::graph;
use crate::storage::facts::{self, FactRecord};
use crate::storage::plans::{self, PlanRecord};
use crate::storage::tasks::{self, TaskRecord};
use crate::storage::edges;
use crate::store::{StoreError, delete_task_tree};
use crate::types::{DEFAULT_PRIORITY, DependencyKind, Status};
use eyre::Result;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Outcome of an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    /// Plan id, stable across re-imports
    pub id: i64,
    pub name: String,
    pub tasks_imported: usize,
    pub tasks_deleted: usize,
    pub facts_imported: usize,
    pub facts_deleted: usize,
}

/// What an import would do, computed without writing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewResult {
    pub plan_exists: bool,
    pub tasks_created: usize,
    pub tasks_updated: usize,
    pub tasks_deleted: usize,
    pub facts_created: usize,
    pub facts_updated: usize,
    pub facts_deleted: usize,
}

pub(crate) fn import(conn: &Connection, doc: &Document) -> Result<ImportResult> {
    let (plan, _) = plans::upsert(
        conn,
        &PlanRecord {
            name: &doc.plan.name,
            description: &doc.plan.description,
            content: &doc.plan.content,
            completed: doc.plan.completed,
        },
    )?;

    let task_ids = upsert_tasks(conn, plan.id, &doc.tasks)?;
    assign_parents(conn, &doc.tasks, &task_ids)?;
    let tasks_deleted = delete_orphan_tasks(conn, plan.id, &task_ids)?;

    let fact_ids = upsert_facts(conn, plan.id, &doc.facts)?;
    let facts_deleted = delete_orphan_facts(conn, plan.id, &fact_ids)?;

    let edge_count = replace_edges(conn, plan.id, &doc.tasks, &task_ids)?;
    replace_fact_links(conn, plan.id, &doc.facts, &fact_ids, &task_ids)?;

    log::info!(
        "imported plan '{}': {} task(s), {} deleted, {} fact(s), {} deleted, {} edge(s)",
        plan.name,
        task_ids.len(),
        tasks_deleted,
        fact_ids.len(),
        facts_deleted,
        edge_count
    );

    Ok(ImportResult {
        id: plan.id,
        name: plan.name,
        tasks_imported: doc.tasks.len(),
        tasks_deleted,
        facts_imported: doc.facts.len(),
        facts_deleted,
    })
}

/// Upsert every task and return the name -> id table for the rest of the pass.
fn upsert_tasks<'d>(conn: &Connection, plan_id: i64, docs: &'d [TaskDoc]) -> Result<HashMap<&'d str, i64>> {
    let mut ids = HashMap::with_capacity(docs.len());
    for doc in docs {
        let record = TaskRecord {
            name: &doc.name,
            description: &doc.description,
            content: &doc.content,
            acceptance_criteria: &doc.acceptance_criteria,
            status: doc.status.unwrap_or(Status::Pending),
            priority: doc.priority.unwrap_or(DEFAULT_PRIORITY),
        };
        let (task, _) = tasks::upsert(conn, plan_id, &record)?;
        ids.insert(doc.name.as_str(), task.id);
    }
    Ok(ids)
}

/// Resolve parent names. Unknown, self, or too-deep parents are dropped.
///
/// Depth is judged on resolved parents: a task whose own parent was dropped
/// is a root and can still take children.
fn assign_parents(conn: &Connection, docs: &[TaskDoc], ids: &HashMap<&str, i64>) -> Result<()> {
    let mut resolved: HashMap<&str, Option<&str>> = HashMap::with_capacity(docs.len());
    for doc in docs {
        let parent = match doc.parent.as_deref() {
            None => None,
            Some(parent) if parent == doc.name => {
                log::warn!("task '{}' names itself as parent; ignoring", doc.name);
                None
            }
            Some(parent) if !ids.contains_key(parent) => {
                log::warn!("task '{}' has unknown parent '{}'; ignoring", doc.name, parent);
                None
            }
            Some(parent) => Some(parent),
        };
        resolved.insert(doc.name.as_str(), parent);
    }

    for doc in docs {
        let parent_id = match resolved[doc.name.as_str()] {
            None => None,
            Some(parent) if resolved.get(parent).copied().flatten().is_some() => {
                log::warn!("parent '{}' of '{}' is itself nested; ignoring", parent, doc.name);
                None
            }
            Some(parent) => Some(ids[parent]),
        };
        tasks::set_parent(conn, ids[doc.name.as_str()], parent_id)?;
    }
    Ok(())
}

fn delete_orphan_tasks(conn: &Connection, plan_id: i64, keep: &HashMap<&str, i64>) -> Result<usize> {
    let orphans: Vec<_> = tasks::get_by_plan(conn, plan_id)?
        .into_iter()
        .filter(|task| !keep.contains_key(task.name.as_str()))
        .collect();

    let mut deleted = 0;
    for orphan in orphans {
        log::debug!("deleting orphan task '{}'", orphan.name);
        // A parent deleted earlier in this loop takes its children with it.
        deleted += delete_task_tree(conn, orphan.id)?;
    }
    Ok(deleted)
}

fn upsert_facts<'d>(conn: &Connection, plan_id: i64, docs: &'d [FactDoc]) -> Result<HashMap<&'d str, i64>> {
    let mut ids = HashMap::with_capacity(docs.len());
    for doc in docs {
        let record = FactRecord {
            name: &doc.name,
            description: &doc.description,
            content: &doc.content,
        };
        let (fact, _) = facts::upsert(conn, plan_id, &record)?;
        ids.insert(doc.name.as_str(), fact.id);
    }
    Ok(ids)
}

fn delete_orphan_facts(conn: &Connection, plan_id: i64, keep: &HashMap<&str, i64>) -> Result<usize> {
    let mut deleted = 0;
    for fact in facts::get_by_plan(conn, plan_id)? {
        if keep.contains_key(fact.name.as_str()) {
            continue;
        }
        log::debug!("deleting orphan fact '{}'", fact.name);
        facts::delete_links_for_fact(conn, fact.id)?;
        if facts::delete(conn, fact.id)? {
            deleted += 1;
        }
    }
    Ok(deleted)
}

/// Drop every edge of the plan and rebuild from the documents' name lists.
fn replace_edges(conn: &Connection, plan_id: i64, docs: &[TaskDoc], ids: &HashMap<&str, i64>) -> Result<usize> {
    edges::delete_for_plan(conn, plan_id)?;

    let mut wanted = Vec::new();
    for doc in docs {
        let this = ids[doc.name.as_str()];
        for name in &doc.blocked_by {
            match ids.get(name.as_str()) {
                Some(&blocker) => wanted.push((blocker, this)),
                None => log::debug!("dropping unresolved blocker '{}' of '{}'", name, doc.name),
            }
        }
        for name in &doc.blocks {
            match ids.get(name.as_str()) {
                Some(&blocked) => wanted.push((this, blocked)),
                None => log::debug!("dropping unresolved dependent '{}' of '{}'", name, doc.name),
            }
        }
    }

    let mut seen = HashSet::new();
    wanted.retain(|&(blocker, blocked)| blocker != blocked && seen.insert((blocker, blocked)));

    // Both endpoints come from this plan's name table, so only acyclicity
    // is left to check, once for the whole set.
    if let Some((blocker, blocked)) = graph::find_cycle(&wanted) {
        return Err(eyre::eyre!(StoreError::CycleDetected { blocker, blocked }));
    }
    for &(blocker, blocked) in &wanted {
        edges::insert(conn, blocker, blocked, DependencyKind::Blocks)?;
    }
    Ok(wanted.len())
}

fn replace_fact_links(
    conn: &Connection,
    plan_id: i64,
    docs: &[FactDoc],
    fact_ids: &HashMap<&str, i64>,
    task_ids: &HashMap<&str, i64>,
) -> Result<()> {
    facts::delete_links_for_plan(conn, plan_id)?;
    for doc in docs {
        let fact_id = fact_ids[doc.name.as_str()];
        for link in &doc.links {
            match task_ids.get(link.task.as_str()) {
                Some(&task_id) => {
                    facts::insert_link(conn, fact_id, task_id, link.kind)?;
                }
                None => log::debug!("dropping link from '{}' to unknown task '{}'", doc.name, link.task),
            }
        }
    }
    Ok(())
}

pub(crate) fn preview(conn: &Connection, doc: &Document) -> Result<PreviewResult> {
    let Some(plan) = plans::get_by_name(conn, &doc.plan.name)? else {
        return Ok(PreviewResult {
            plan_exists: false,
            tasks_created: doc.tasks.len(),
            facts_created: doc.facts.len(),
            ..Default::default()
        });
    };

    let existing_tasks: HashSet<String> = tasks::get_by_plan(conn, plan.id)?
        .into_iter()
        .map(|t| t.name)
        .collect();
    let existing_facts: HashSet<String> = facts::get_by_plan(conn, plan.id)?
        .into_iter()
        .map(|f| f.name)
        .collect();

    let (tasks_created, tasks_updated, tasks_deleted) =
        partition(&existing_tasks, doc.tasks.iter().map(|t| t.name.as_str()));
    let (facts_created, facts_updated, facts_deleted) =
        partition(&existing_facts, doc.facts.iter().map(|f| f.name.as_str()));

    Ok(PreviewResult {
        plan_exists: true,
        tasks_created,
        tasks_updated,
        tasks_deleted,
        facts_created,
        facts_updated,
        facts_deleted,
    })
}

/// Count (created, updated, deleted) for incoming names against existing ones.
fn partition<'a>(existing: &HashSet<String>, incoming: impl Iterator<Item = &'a str>) -> (usize, usize, usize) {
    let incoming: HashSet<&str> = incoming.collect();
    let updated = incoming.iter().filter(|name| existing.contains(**name)).count();
    let created = incoming.len() - updated;
    let deleted = existing.iter().filter(|name| !incoming.contains(name.as_str())).count();
    (created, updated, deleted)
}

pub(crate) fn export(conn: &Connection, plan_id: i64) -> Result<Document> {
    let plan = plans::get(conn, plan_id)?
        .ok_or_else(|| eyre::eyre!(StoreError::PlanNotFound(plan_id.to_string())))?;
    let plan_tasks = tasks::get_by_plan(conn, plan_id)?;
    let names: HashMap<i64, &str> = plan_tasks.iter().map(|t| (t.id, t.name.as_str())).collect();

    let mut task_docs = Vec::with_capacity(plan_tasks.len());
    for task in &plan_tasks {
        let blocked_by = graph::get_blocking(conn, task.id)?.into_iter().map(|t| t.name).collect();
        let blocks = graph::get_blocked(conn, task.id)?.into_iter().map(|t| t.name).collect();
        task_docs.push(TaskDoc {
            name: task.name.clone(),
            status: Some(task.status),
            priority: Some(task.priority),
            parent: task
                .parent_id
                .and_then(|id| names.get(&id))
                .map(|name| name.to_string()),
            description: task.description.clone(),
            acceptance_criteria: task.acceptance_criteria.clone(),
            content: task.content.clone(),
            blocked_by,
            blocks,
        });
    }

    let mut fact_docs = Vec::new();
    for fact in facts::get_by_plan(conn, plan_id)? {
        let links = facts::links_for_fact(conn, fact.id)?
            .into_iter()
            .filter_map(|link| {
                names.get(&link.task_id).map(|name| FactLinkDoc {
                    task: name.to_string(),
                    kind: link.kind,
                })
            })
            .collect();
        fact_docs.push(FactDoc {
            name: fact.name,
            description: fact.description,
            content: fact.content,
            links,
        });
    }

    Ok(Document {
        plan: PlanDoc {
            name: plan.name,
            description: plan.description,
            completed: plan.completed,
            content: plan.content,
        },
        tasks: task_docs,
        facts: fact_docs,
    })
}
