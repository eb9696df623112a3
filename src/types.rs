//! Core data types for the taskplan graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Priority assigned when none is given. Lower values are scheduled first.
pub const DEFAULT_PRIORITY: i64 = 100;

/// Maximum length of a plan, task, or fact name.
pub const MAX_NAME_LEN: usize = 200;

/// Top-level container of tasks and facts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    /// Database-local identifier
    pub id: i64,

    /// Globally unique, portable name
    pub name: String,

    /// One-line summary
    #[serde(default)]
    pub description: String,

    /// Free-form body (markdown)
    #[serde(default)]
    pub content: String,

    /// Whether the plan as a whole is done
    #[serde(default)]
    pub completed: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A schedulable unit of work belonging to one plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Database-local identifier, also the scheduling tie-break
    pub id: i64,

    /// Owning plan
    pub plan_id: i64,

    /// Optional parent task in the same plan (depth is capped at 2)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,

    /// Unique within the plan
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub acceptance_criteria: String,

    /// Current lifecycle state
    pub status: Status,

    /// Lower value = scheduled earlier
    pub priority: i64,

    /// Mirror of `status == Completed`
    pub completed: bool,

    /// Last time `status` changed
    pub status_changed_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A named piece of plan-scoped knowledge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fact {
    pub id: i64,
    pub plan_id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Task lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    InProgress,
    Completed,
    Failed,
    Blocked,
    Skipped,
}

impl Status {
    pub const ALL: [Status; 6] = [
        Status::Pending,
        Status::InProgress,
        Status::Completed,
        Status::Failed,
        Status::Blocked,
        Status::Skipped,
    ];

    /// Check if a status transition is valid.
    pub fn can_transition_to(&self, target: &Status) -> bool {
        use Status::*;
        matches!(
            (self, target),
            (Pending, InProgress)
                | (Pending, Skipped)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Blocked)
                | (Blocked, InProgress)
                | (Failed, Pending)
        )
    }

    /// Returns true if a blocker in this state no longer holds back its dependents.
    pub fn releases_dependents(&self) -> bool {
        matches!(self, Status::Completed | Status::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::InProgress => "in_progress",
            Status::Completed => "completed",
            Status::Failed => "failed",
            Status::Blocked => "blocked",
            Status::Skipped => "skipped",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownStatus(s.to_string()))
    }
}

/// A directed "blocks" edge between two tasks of the same plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dependency {
    /// Task that must finish first
    pub blocker_id: i64,

    /// Task held back until the blocker finishes
    pub blocked_id: i64,

    pub kind: DependencyKind,

    pub created_at: DateTime<Utc>,
}

/// Dependency edge tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// blocked_id can't be ready until blocker_id is completed or skipped
    Blocks,
}

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Blocks => "blocks",
        }
    }
}

impl FromStr for DependencyKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blocks" => Ok(DependencyKind::Blocks),
            other => Err(ValidationError::UnknownKind(other.to_string())),
        }
    }
}

/// Advisory link between a fact and a task. No scheduling weight.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FactLink {
    pub fact_id: i64,
    pub task_id: i64,
    pub kind: FactLinkKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactLinkKind {
    Informs,
    DiscoveredDuring,
    Blocks,
    RequiredContext,
}

impl FactLinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactLinkKind::Informs => "informs",
            FactLinkKind::DiscoveredDuring => "discovered_during",
            FactLinkKind::Blocks => "blocks",
            FactLinkKind::RequiredContext => "required_context",
        }
    }
}

impl fmt::Display for FactLinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FactLinkKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "informs" => Ok(FactLinkKind::Informs),
            "discovered_during" => Ok(FactLinkKind::DiscoveredDuring),
            "blocks" => Ok(FactLinkKind::Blocks),
            "required_context" => Ok(FactLinkKind::RequiredContext),
            other => Err(ValidationError::UnknownKind(other.to_string())),
        }
    }
}

/// One entry of a task's status audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusChange {
    pub task_id: i64,
    pub from: Status,
    pub to: Status,
    pub changed_at: DateTime<Utc>,
}

/// Optional fields for creating a task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskFields {
    pub description: String,
    pub content: String,
    pub acceptance_criteria: String,
    pub priority: i64,
    pub parent_id: Option<i64>,
}

impl Default for TaskFields {
    fn default() -> Self {
        Self {
            description: String::new(),
            content: String::new(),
            acceptance_criteria: String::new(),
            priority: DEFAULT_PRIORITY,
            parent_id: None,
        }
    }
}

impl TaskFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_acceptance_criteria(mut self, criteria: impl Into<String>) -> Self {
        self.acceptance_criteria = criteria.into();
        self
    }

    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

/// Partial update of a task. Status is changed through the state machine only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub acceptance_criteria: Option<String>,
    pub priority: Option<i64>,
    /// `Some(None)` detaches the task from its parent
    pub parent_id: Option<Option<i64>>,
}

impl TaskUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.content.is_none()
            && self.acceptance_criteria.is_none()
            && self.priority.is_none()
            && self.parent_id.is_none()
    }
}

/// Partial update of a plan. The name is the sync identity and is not editable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanUpdate {
    pub description: Option<String>,
    pub content: Option<String>,
    pub completed: Option<bool>,
}

impl PlanUpdate {
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.content.is_none() && self.completed.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactUpdate {
    pub description: Option<String>,
    pub content: Option<String>,
}

impl FactUpdate {
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.content.is_none()
    }
}

/// Validation errors for plans, tasks, facts and documents.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyName,
    NameTooLong,
    InvalidCharacters,
    InvalidPriority(i64),
    NestingTooDeep,
    SelfParent,
    ParentInOtherPlan,
    CrossPlanDependency,
    CrossPlanLink,
    EmptyUpdate,
    DuplicateName(String),
    UnknownStatus(String),
    UnknownKind(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyName => write!(f, "name cannot be empty"),
            ValidationError::NameTooLong => write!(f, "name exceeds {} characters", MAX_NAME_LEN),
            ValidationError::InvalidCharacters => write!(f, "name contains control characters"),
            ValidationError::InvalidPriority(p) => write!(f, "priority must be non-negative, got {}", p),
            ValidationError::NestingTooDeep => write!(f, "tasks may only be nested one level deep"),
            ValidationError::SelfParent => write!(f, "a task cannot be its own parent"),
            ValidationError::ParentInOtherPlan => write!(f, "parent task belongs to a different plan"),
            ValidationError::CrossPlanDependency => {
                write!(f, "dependencies must connect tasks of the same plan")
            }
            ValidationError::CrossPlanLink => write!(f, "facts can only link to tasks of the same plan"),
            ValidationError::EmptyUpdate => write!(f, "no fields to update"),
            ValidationError::DuplicateName(name) => write!(f, "duplicate name '{}'", name),
            ValidationError::UnknownStatus(s) => write!(f, "unknown status '{}'", s),
            ValidationError::UnknownKind(s) => write!(f, "unknown kind '{}'", s),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Names: required, at most MAX_NAME_LEN chars, no control characters.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::NameTooLong);
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(ValidationError::InvalidCharacters);
    }
    Ok(())
}

pub fn validate_priority(priority: i64) -> Result<(), ValidationError> {
    if priority < 0 {
        return Err(ValidationError::InvalidPriority(priority));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use Status::*;

        assert!(Pending.can_transition_to(&InProgress));
        assert!(Pending.can_transition_to(&Skipped));
        assert!(InProgress.can_transition_to(&Completed));
        assert!(InProgress.can_transition_to(&Failed));
        assert!(InProgress.can_transition_to(&Blocked));
        assert!(Blocked.can_transition_to(&InProgress));
        assert!(Failed.can_transition_to(&Pending));

        // Terminal states go nowhere
        for target in Status::ALL {
            assert!(!Completed.can_transition_to(&target));
            assert!(!Skipped.can_transition_to(&target));
        }

        // Same status is not a transition
        for status in Status::ALL {
            assert!(!status.can_transition_to(&status));
        }

        assert!(!Pending.can_transition_to(&Completed));
        assert!(!Blocked.can_transition_to(&Completed));
        assert!(!Failed.can_transition_to(&InProgress));
    }

    #[test]
    fn test_transition_table_size() {
        let legal = Status::ALL
            .iter()
            .flat_map(|from| Status::ALL.iter().map(move |to| (from, to)))
            .filter(|(from, to)| from.can_transition_to(to))
            .count();
        assert_eq!(legal, 7);
    }

    #[test]
    fn test_releases_dependents() {
        assert!(Status::Completed.releases_dependents());
        assert!(Status::Skipped.releases_dependents());
        assert!(!Status::Pending.releases_dependents());
        assert!(!Status::InProgress.releases_dependents());
        assert!(!Status::Failed.releases_dependents());
        assert!(!Status::Blocked.releases_dependents());
    }

    #[test]
    fn test_status_str_roundtrip() {
        for status in Status::ALL {
            assert_eq!(status.as_str().parse::<Status>().unwrap(), status);
        }
        assert_eq!(
            "done".parse::<Status>(),
            Err(ValidationError::UnknownStatus("done".to_string()))
        );
    }

    #[test]
    fn test_status_serde_matches_as_str() {
        let json = serde_json::to_string(&Status::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn test_fact_link_kind_parse() {
        assert_eq!(
            "discovered_during".parse::<FactLinkKind>().unwrap(),
            FactLinkKind::DiscoveredDuring
        );
        assert!("related".parse::<FactLinkKind>().is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("Valid name").is_ok());
        assert_eq!(validate_name(""), Err(ValidationError::EmptyName));
        assert_eq!(validate_name("   "), Err(ValidationError::EmptyName));
        assert_eq!(validate_name(&"x".repeat(201)), Err(ValidationError::NameTooLong));
        assert!(validate_name(&"x".repeat(200)).is_ok());
        assert_eq!(validate_name("bad\nname"), Err(ValidationError::InvalidCharacters));
    }

    #[test]
    fn test_validate_priority() {
        assert!(validate_priority(0).is_ok());
        assert!(validate_priority(DEFAULT_PRIORITY).is_ok());
        assert_eq!(validate_priority(-1), Err(ValidationError::InvalidPriority(-1)));
    }

    #[test]
    fn test_task_fields_builder() {
        let fields = TaskFields::new()
            .with_priority(5)
            .with_description("desc")
            .with_acceptance_criteria("tests pass")
            .with_parent(3);
        assert_eq!(fields.priority, 5);
        assert_eq!(fields.description, "desc");
        assert_eq!(fields.acceptance_criteria, "tests pass");
        assert_eq!(fields.parent_id, Some(3));
        assert_eq!(TaskFields::default().priority, DEFAULT_PRIORITY);
    }

    #[test]
    fn test_update_is_empty() {
        assert!(TaskUpdate::default().is_empty());
        assert!(
            !TaskUpdate {
                parent_id: Some(None),
                ..Default::default()
            }
            .is_empty()
        );
        assert!(PlanUpdate::default().is_empty());
        assert!(FactUpdate::default().is_empty());
    }
}
