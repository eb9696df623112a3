//! taskplan CLI - plans, tasks and facts with a dependency graph.

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::Path;
use taskplan::{
    Config, Document, Fact, FactLinkKind, Plan, PlanUpdate, Status, Store, StoreError, Task, TaskFields, TaskUpdate,
    Trigger, parse_markdown, render_markdown,
};

mod cli;

use cli::{Cli, Command, DepCommand, FactCommand, PlanCommand, TaskCommand};

fn setup_logging(config: &Config) -> Result<()> {
    fs::create_dir_all(&config.log_dir).context("Failed to create log directory")?;

    let log_file = config.log_file();

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn format_status(status: &Status) -> ColoredString {
    match status {
        Status::Pending => "pending".normal(),
        Status::InProgress => "in_progress".yellow(),
        Status::Completed => "completed".green(),
        Status::Failed => "failed".red(),
        Status::Blocked => "blocked".magenta(),
        Status::Skipped => "skipped".dimmed(),
    }
}

fn find_plan(store: &Store, name: &str) -> Result<Plan> {
    store
        .get_plan_by_name(name)?
        .ok_or_else(|| eyre::eyre!(StoreError::PlanNotFound(name.to_string())))
}

fn find_task(store: &Store, plan: &Plan, name: &str) -> Result<Task> {
    store
        .get_task_by_name(plan.id, name)?
        .ok_or_else(|| eyre::eyre!(StoreError::TaskNotFound(format!("{}/{}", plan.name, name))))
}

fn find_fact(store: &Store, plan: &Plan, name: &str) -> Result<Fact> {
    store
        .get_fact_by_name(plan.id, name)?
        .ok_or_else(|| eyre::eyre!(StoreError::FactNotFound(format!("{}/{}", plan.name, name))))
}

fn print_task_line(task: &Task) {
    println!(
        "  {} P{} {}",
        format_status(&task.status),
        task.priority,
        task.name.cyan()
    );
}

fn read_document(path: &Path) -> Result<Document> {
    let text = fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
    if path.extension().is_some_and(|ext| ext == "json") {
        Document::from_json(&text)
    } else {
        parse_markdown(&text)
    }
}

fn run_trigger(store: &mut Store, plan: &str, task: &str, trigger: Trigger) -> Result<()> {
    let plan = find_plan(store, plan)?;
    let task = find_task(store, &plan, task)?;
    let task = store
        .apply(task.id, trigger)
        .context(format!("Failed to {} task", trigger))?;

    println!(
        "{} {}: {}",
        "✓".green(),
        task.name.cyan(),
        format_status(&task.status)
    );
    Ok(())
}

fn run_plan(store: &mut Store, command: PlanCommand) -> Result<()> {
    match command {
        PlanCommand::Create { name, description } => {
            let plan = store
                .create_plan(&name, &description, "")
                .context("Failed to create plan")?;
            println!("{} Created plan: {}", "✓".green(), plan.name.cyan());
        }

        PlanCommand::List => {
            let plans = store.list_plans().context("Failed to list plans")?;
            if plans.is_empty() {
                println!("{}", "No plans found".dimmed());
            }
            for plan in plans {
                let marker = if plan.completed { "✓".green() } else { "·".normal() };
                println!("{} {} {}", marker, plan.name.cyan(), plan.description.dimmed());
            }
        }

        PlanCommand::Show { name } => {
            let plan = find_plan(store, &name)?;
            println!("{}: {}", "Plan".bold(), plan.name.cyan());
            if !plan.description.is_empty() {
                println!("{}: {}", "Description".bold(), plan.description);
            }
            println!("{}: {}", "Completed".bold(), plan.completed);
            println!("{}: {}", "Created".bold(), plan.created_at);

            let tasks = store.tasks(plan.id)?;
            println!("{}: {}", "Tasks".bold(), tasks.len());
            for task in &tasks {
                print_task_line(task);
            }
        }

        PlanCommand::Complete { name } => {
            let plan = find_plan(store, &name)?;
            let changes = PlanUpdate {
                completed: Some(true),
                ..Default::default()
            };
            store.update_plan(plan.id, &changes).context("Failed to complete plan")?;
            println!("{} Completed plan: {}", "✓".green(), plan.name.cyan());
        }

        PlanCommand::Delete { name } => {
            let plan = find_plan(store, &name)?;
            store.delete_plan(plan.id).context("Failed to delete plan")?;
            println!("{} Deleted plan: {}", "✓".green(), plan.name.cyan());
        }
    }
    Ok(())
}

fn run_task(store: &mut Store, command: TaskCommand) -> Result<()> {
    match command {
        TaskCommand::Add {
            plan,
            name,
            priority,
            parent,
            description,
            acceptance,
        } => {
            let plan = find_plan(store, &plan)?;
            let mut fields = TaskFields::new()
                .with_priority(priority)
                .with_description(description)
                .with_acceptance_criteria(acceptance);
            if let Some(parent) = parent {
                fields = fields.with_parent(find_task(store, &plan, &parent)?.id);
            }

            let task = store
                .create_task(plan.id, &name, fields)
                .context("Failed to create task")?;
            println!("{} Created: {} P{}", "✓".green(), task.name.cyan(), task.priority);
        }

        TaskCommand::List { plan, status } => {
            let plan = find_plan(store, &plan)?;
            let tasks = match status {
                Some(s) => {
                    let status: Status = s.parse().map_err(|e| eyre::eyre!(StoreError::Validation(e)))?;
                    store.tasks_with_status(plan.id, status)?
                }
                None => store.tasks(plan.id)?,
            };

            if tasks.is_empty() {
                println!("{}", "No tasks found".dimmed());
            }
            for task in &tasks {
                print_task_line(task);
            }
        }

        TaskCommand::Show { plan, name } => {
            let plan = find_plan(store, &plan)?;
            let task = find_task(store, &plan, &name)?;

            println!("{}: {}", "Task".bold(), task.name.cyan());
            println!("{}: {}", "Status".bold(), format_status(&task.status));
            println!("{}: P{}", "Priority".bold(), task.priority);
            if let Some(parent_id) = task.parent_id {
                if let Some(parent) = store.get_task(parent_id)? {
                    println!("{}: {}", "Parent".bold(), parent.name);
                }
            }
            if !task.description.is_empty() {
                println!("{}: {}", "Description".bold(), task.description);
            }
            if !task.acceptance_criteria.is_empty() {
                println!("{}: {}", "Acceptance".bold(), task.acceptance_criteria);
            }
            let names = |tasks: Vec<Task>| tasks.into_iter().map(|t| t.name).collect::<Vec<_>>().join(", ");
            let blocking = store.blocking(task.id)?;
            if !blocking.is_empty() {
                println!("{}: {}", "Blocked by".bold(), names(blocking));
            }
            let blocked = store.blocked(task.id)?;
            if !blocked.is_empty() {
                println!("{}: {}", "Blocks".bold(), names(blocked));
            }
            println!("{}: {}", "Status changed".bold(), task.status_changed_at);
            println!("{}: {}", "Created".bold(), task.created_at);
            println!("{}: {}", "Updated".bold(), task.updated_at);
        }

        TaskCommand::Update {
            plan,
            name,
            rename,
            priority,
            description,
            acceptance,
            parent,
            no_parent,
        } => {
            let plan = find_plan(store, &plan)?;
            let task = find_task(store, &plan, &name)?;
            let parent_id = match (parent, no_parent) {
                (Some(parent), _) => Some(Some(find_task(store, &plan, &parent)?.id)),
                (None, true) => Some(None),
                (None, false) => None,
            };

            let changes = TaskUpdate {
                name: rename,
                description,
                content: None,
                acceptance_criteria: acceptance,
                priority,
                parent_id,
            };
            let task = store.update_task(task.id, &changes).context("Failed to update task")?;
            println!("{} Updated: {}", "✓".green(), task.name.cyan());
        }

        TaskCommand::Delete { plan, name } => {
            let plan = find_plan(store, &plan)?;
            let task = find_task(store, &plan, &name)?;
            store.delete_task(task.id).context("Failed to delete task")?;
            println!("{} Deleted: {}", "✓".green(), task.name.cyan());
        }
    }
    Ok(())
}

fn run_dep(store: &mut Store, command: DepCommand) -> Result<()> {
    match command {
        DepCommand::Add { plan, blocker, blocked } => {
            let plan = find_plan(store, &plan)?;
            let blocker = find_task(store, &plan, &blocker)?;
            let blocked = find_task(store, &plan, &blocked)?;
            store
                .add_dependency(blocker.id, blocked.id)
                .context("Failed to add dependency")?;
            println!(
                "{} {} now blocks {}",
                "✓".green(),
                blocker.name.cyan(),
                blocked.name.cyan()
            );
        }

        DepCommand::Remove { plan, blocker, blocked } => {
            let plan = find_plan(store, &plan)?;
            let blocker = find_task(store, &plan, &blocker)?;
            let blocked = find_task(store, &plan, &blocked)?;
            if store.remove_dependency(blocker.id, blocked.id)? {
                println!("{} Removed dependency", "✓".green());
            } else {
                println!("{}", "No such dependency".dimmed());
            }
        }
    }
    Ok(())
}

fn run_fact(store: &mut Store, command: FactCommand) -> Result<()> {
    match command {
        FactCommand::Add {
            plan,
            name,
            content,
            description,
        } => {
            let plan = find_plan(store, &plan)?;
            let fact = store
                .create_fact(plan.id, &name, &description, &content)
                .context("Failed to create fact")?;
            println!("{} Recorded: {}", "✓".green(), fact.name.cyan());
        }

        FactCommand::List { plan } => {
            let plan = find_plan(store, &plan)?;
            let facts = store.facts(plan.id)?;
            if facts.is_empty() {
                println!("{}", "No facts found".dimmed());
            }
            for fact in facts {
                println!("  {} {}", fact.name.cyan(), fact.description.dimmed());
            }
        }

        FactCommand::Show { plan, name } => {
            let plan = find_plan(store, &plan)?;
            let fact = find_fact(store, &plan, &name)?;
            println!("{}: {}", "Fact".bold(), fact.name.cyan());
            if !fact.description.is_empty() {
                println!("{}: {}", "Description".bold(), fact.description);
            }
            if !fact.content.is_empty() {
                println!("{}:\n{}", "Content".bold(), fact.content);
            }
            for link in store.fact_links(fact.id)? {
                if let Some(task) = store.get_task(link.task_id)? {
                    println!("  {} {}", link.kind.to_string().dimmed(), task.name.cyan());
                }
            }
        }

        FactCommand::Delete { plan, name } => {
            let plan = find_plan(store, &plan)?;
            let fact = find_fact(store, &plan, &name)?;
            store.delete_fact(fact.id).context("Failed to delete fact")?;
            println!("{} Deleted: {}", "✓".green(), fact.name.cyan());
        }

        FactCommand::Link { plan, fact, task, kind } => {
            let plan = find_plan(store, &plan)?;
            let fact = find_fact(store, &plan, &fact)?;
            let task = find_task(store, &plan, &task)?;
            let kind: FactLinkKind = kind.parse().map_err(|e| eyre::eyre!(StoreError::Validation(e)))?;
            store
                .link_fact(fact.id, task.id, kind)
                .context("Failed to link fact")?;
            println!(
                "{} {} {} {}",
                "✓".green(),
                fact.name.cyan(),
                kind,
                task.name.cyan()
            );
        }
    }
    Ok(())
}

fn run(cli: Cli, config: &Config) -> Result<()> {
    let store_dir = config.root();

    match cli.command {
        Command::Init => {
            Store::init(store_dir).context("Failed to initialize taskplan store")?;
            println!("{} Initialized taskplan store in {}", "✓".green(), store_dir.display());
            Ok(())
        }
        command => {
            let mut store = Store::open(store_dir).context("Failed to open store")?;
            run_command(&mut store, command)
        }
    }
}

fn run_command(store: &mut Store, command: Command) -> Result<()> {
    match command {
        // Opens no store, so run() handles it
        Command::Init => {}
        Command::Plan(command) => run_plan(store, command)?,
        Command::Task(command) => run_task(store, command)?,

        Command::Start { plan, task } => run_trigger(store, &plan, &task, Trigger::Start)?,
        Command::Complete { plan, task } => run_trigger(store, &plan, &task, Trigger::Complete)?,
        Command::Fail { plan, task } => run_trigger(store, &plan, &task, Trigger::Fail)?,
        Command::Block { plan, task } => run_trigger(store, &plan, &task, Trigger::Block)?,
        Command::Unblock { plan, task } => run_trigger(store, &plan, &task, Trigger::Unblock)?,
        Command::Skip { plan, task } => run_trigger(store, &plan, &task, Trigger::Skip)?,
        Command::Retry { plan, task } => run_trigger(store, &plan, &task, Trigger::Retry)?,

        Command::Dep(command) => run_dep(store, command)?,
        Command::Fact(command) => run_fact(store, command)?,

        Command::Ready { plan } => {
            let plan = find_plan(store, &plan)?;
            let tasks = store.ready(plan.id).context("Failed to get ready tasks")?;

            if tasks.is_empty() {
                println!("{}", "No ready tasks".dimmed());
            } else {
                println!("{} {} task(s) ready to work on:", "→".blue(), tasks.len());
                for task in &tasks {
                    println!("  P{} {}", task.priority, task.name.cyan());
                }
            }

            let waiting = store.blocked_tasks(plan.id)?;
            if !waiting.is_empty() {
                println!("{} {} task(s) waiting on blockers", "⊘".red(), waiting.len());
            }
        }

        Command::Next { plan } => {
            let plan = find_plan(store, &plan)?;
            match store.next(plan.id).context("Failed to get next task")? {
                Some(task) => println!("{} P{} {}", "→".blue(), task.priority, task.name.cyan()),
                None => println!("{}", "Nothing ready".dimmed()),
            }
        }

        Command::History { plan, task } => {
            let plan = find_plan(store, &plan)?;
            let task = find_task(store, &plan, &task)?;
            let history = store.status_history(task.id)?;
            if history.is_empty() {
                println!("{}", "No status changes".dimmed());
            }
            for change in history {
                println!(
                    "  {} {} → {}",
                    change.changed_at.to_rfc3339().dimmed(),
                    format_status(&change.from),
                    format_status(&change.to)
                );
            }
        }

        Command::Import { file, dry_run } => {
            let doc = read_document(&file)?;
            if dry_run {
                let preview = store.preview(&doc).context("Failed to preview import")?;
                let verb = if preview.plan_exists { "update" } else { "create" };
                println!("{} Would {} plan {}", "→".blue(), verb, doc.plan.name.cyan());
                println!(
                    "  tasks: {} new, {} updated, {} deleted",
                    preview.tasks_created, preview.tasks_updated, preview.tasks_deleted
                );
                println!(
                    "  facts: {} new, {} updated, {} deleted",
                    preview.facts_created, preview.facts_updated, preview.facts_deleted
                );
            } else {
                let result = store.import(&doc).context("Failed to import plan")?;
                println!(
                    "{} Imported {}: {} task(s), {} deleted; {} fact(s), {} deleted",
                    "✓".green(),
                    result.name.cyan(),
                    result.tasks_imported,
                    result.tasks_deleted,
                    result.facts_imported,
                    result.facts_deleted
                );
            }
        }

        Command::Export { plan, output, json } => {
            let plan = find_plan(store, &plan)?;
            let doc = store.export(plan.id).context("Failed to export plan")?;
            let text = if json { doc.to_json()? } else { render_markdown(&doc)? };

            match output {
                Some(path) => {
                    fs::write(&path, text).context(format!("Failed to write {}", path.display()))?;
                    println!("{} Exported {} to {}", "✓".green(), plan.name.cyan(), path.display());
                }
                None => print!("{}", text),
            }
        }

        Command::Search { query, plan, limit } => {
            let plan_id = match plan {
                Some(name) => Some(find_plan(store, &name)?.id),
                None => None,
            };
            let hits = store.search(&query, plan_id, limit).context("Search failed")?;
            if hits.is_empty() {
                println!("{}", "No matches".dimmed());
            }
            for hit in hits {
                println!("  {} {}", hit.kind.to_string().dimmed(), hit.name.cyan());
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::new(cli.dir.clone(), cli.log_dir.clone());

    setup_logging(&config).context("Failed to setup logging")?;
    info!("Command: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = run(cli, &config) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
