//! taskplan: plans, tasks and facts with a dependency graph on SQLite.
//!
//! Tasks move through a fixed status table, block each other through an
//! acyclic dependency graph, and are scheduled by (priority, id) once every
//! blocker is completed or skipped. Whole plans can be imported from and
//! exported to name-keyed documents (markdown with YAML front matter, or JSON).
//!
//! # Example
//!
//! ```no_run
//! use taskplan::{Store, TaskFields};
//! use std::path::Path;
//!
//! // Initialize a new store
//! let mut store = Store::init(Path::new(".")).unwrap();
//! let plan = store.create_plan("auth", "Login rework", "").unwrap();
//!
//! // Create tasks
//! let design = store.create_task(plan.id, "design", TaskFields::new().with_priority(10)).unwrap();
//! let build = store.create_task(plan.id, "build", TaskFields::new().with_priority(5)).unwrap();
//!
//! // design must finish before build can start
//! store.add_dependency(design.id, build.id).unwrap();
//!
//! let ready = store.ready(plan.id).unwrap();
//! assert_eq!(ready.len(), 1);
//! assert_eq!(ready[0].id, design.id);
//!
//! store.start(design.id).unwrap();
//! store.complete(design.id).unwrap();
//! assert_eq!(store.next(plan.id).unwrap().unwrap().id, build.id);
//! ```

mod graph;
mod lifecycle;
mod search;
mod storage;
mod store;
mod sync;
mod types;

pub mod config;
pub mod document;

// Re-export public API
pub use config::Config;
pub use document::{Document, FactDoc, FactLinkDoc, PlanDoc, TaskDoc, parse_markdown, render_markdown};
pub use lifecycle::Trigger;
pub use search::{EntityKind, SearchHit};
pub use storage::{DB_FILE, STORE_DIR};
pub use store::{Store, StoreError};
pub use sync::{ImportResult, PreviewResult};
pub use types::{
    DEFAULT_PRIORITY, Dependency, DependencyKind, Fact, FactLink, FactLinkKind, FactUpdate, MAX_NAME_LEN, Plan,
    PlanUpdate, Status, StatusChange, Task, TaskFields, TaskUpdate, ValidationError,
};
