//! CLI argument parsing for taskplan.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "tp",
    about = "Plans, tasks and facts with a dependency graph",
    version = env!("GIT_DESCRIBE"),
    after_help = "Logs are written to: ~/.local/share/taskplan/logs/taskplan.log"
)]
pub struct Cli {
    /// Directory holding the .taskplan store (default: current directory)
    #[arg(short = 'd', long, global = true, env = "TASKPLAN_DIR")]
    pub dir: Option<PathBuf>,

    /// Directory for the log file
    #[arg(long, global = true, env = "TASKPLAN_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Initialize a new taskplan store
    Init,

    /// Manage plans
    #[command(subcommand)]
    Plan(PlanCommand),

    /// Manage tasks
    #[command(subcommand)]
    Task(TaskCommand),

    /// Start a pending task
    Start { plan: String, task: String },

    /// Complete an in-progress task
    Complete { plan: String, task: String },

    /// Mark an in-progress task as failed
    Fail { plan: String, task: String },

    /// Mark an in-progress task as blocked
    Block { plan: String, task: String },

    /// Resume a blocked task
    Unblock { plan: String, task: String },

    /// Skip a pending task
    Skip { plan: String, task: String },

    /// Send a failed task back to pending
    Retry { plan: String, task: String },

    /// Manage dependencies between tasks
    #[command(subcommand)]
    Dep(DepCommand),

    /// Show tasks that are ready to work on
    Ready { plan: String },

    /// Show the single best task to work on
    Next { plan: String },

    /// Manage facts
    #[command(subcommand)]
    Fact(FactCommand),

    /// Show a task's status history
    History { plan: String, task: String },

    /// Import a plan document (.md with YAML front matter, or .json)
    Import {
        file: PathBuf,

        /// Show what would change without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Export a plan as a document
    Export {
        plan: String,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Emit JSON instead of markdown
        #[arg(long)]
        json: bool,
    },

    /// Search plans, tasks and facts
    Search {
        query: String,

        /// Restrict to one plan
        #[arg(short, long)]
        plan: Option<String>,

        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand)]
pub enum PlanCommand {
    /// Create a plan
    Create {
        name: String,

        #[arg(short = 'D', long, default_value = "")]
        description: String,
    },

    /// List plans
    List,

    /// Show a plan and its tasks
    Show { name: String },

    /// Mark a plan completed
    Complete { name: String },

    /// Delete a plan with all of its tasks and facts
    Delete { name: String },
}

#[derive(Subcommand)]
pub enum TaskCommand {
    /// Add a task to a plan
    Add {
        plan: String,
        name: String,

        /// Priority (lower runs first)
        #[arg(short, long, default_value = "100")]
        priority: i64,

        /// Parent task name
        #[arg(long)]
        parent: Option<String>,

        #[arg(short = 'D', long, default_value = "")]
        description: String,

        #[arg(short = 'a', long, default_value = "")]
        acceptance: String,
    },

    /// List tasks of a plan
    List {
        plan: String,

        /// Filter by status (pending, in_progress, completed, failed, blocked, skipped)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show a task
    Show { plan: String, name: String },

    /// Update a task's fields
    Update {
        plan: String,
        name: String,

        #[arg(long)]
        rename: Option<String>,

        #[arg(short, long)]
        priority: Option<i64>,

        #[arg(short = 'D', long)]
        description: Option<String>,

        #[arg(short = 'a', long)]
        acceptance: Option<String>,

        /// New parent task name
        #[arg(long, conflicts_with = "no_parent")]
        parent: Option<String>,

        /// Detach from the current parent
        #[arg(long)]
        no_parent: bool,
    },

    /// Delete a task and its subtasks
    Delete { plan: String, name: String },
}

#[derive(Subcommand)]
pub enum DepCommand {
    /// BLOCKER must finish before BLOCKED can start
    Add {
        plan: String,
        blocker: String,
        blocked: String,
    },

    /// Remove a dependency
    Remove {
        plan: String,
        blocker: String,
        blocked: String,
    },
}

#[derive(Subcommand)]
pub enum FactCommand {
    /// Record a fact
    Add {
        plan: String,
        name: String,

        #[arg(short, long, default_value = "")]
        content: String,

        #[arg(short = 'D', long, default_value = "")]
        description: String,
    },

    /// List facts of a plan
    List { plan: String },

    /// Show a fact and its links
    Show { plan: String, name: String },

    /// Delete a fact
    Delete { plan: String, name: String },

    /// Link a fact to a task
    Link {
        plan: String,
        fact: String,
        task: String,

        /// informs, discovered_during, blocks, required_context
        #[arg(short, long, default_value = "informs")]
        kind: String,
    },
}
