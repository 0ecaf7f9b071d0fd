use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::auth::CurrentUser;
use crate::resource::{Creatable, Field, Resource, SortKey};
use crate::state::AppState;
use crate::store::Repository;

/// Represents the priority of a task.
/// Corresponds to the `task_priority` SQL enum.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "task_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// Low priority.
    Low,
    /// Medium priority.
    #[default]
    Medium,
    /// High priority.
    High,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }
}

/// Represents the status of a task.
/// Corresponds to the `task_status` SQL enum.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task has not been finished.
    Incomplete,
    /// Task is currently being worked on.
    #[default]
    InProgress,
    /// Task is completed.
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Incomplete => "incomplete",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        }
    }
}

/// Input structure for creating a task.
/// Contains validation rules for its fields.
#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskInput {
    /// The title of the task.
    /// Must be between 1 and 40 characters.
    #[serde(deserialize_with = "crate::models::trimmed::string")]
    #[validate(length(min = 1, max = 40))]
    pub title: String,

    /// Must be between 1 and 1000 characters.
    #[serde(deserialize_with = "crate::models::trimmed::string")]
    #[validate(length(min = 1, max = 1000))]
    pub description: String,

    /// When the task is due or happened. Defaults to the creation time.
    pub date: Option<DateTime<Utc>>,

    /// Defaults to `medium`.
    pub priority: Option<TaskPriority>,

    /// Defaults to `in_progress`.
    pub status: Option<TaskStatus>,
}

/// Partial update of a task. Absent fields keep their value.
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskPatch {
    #[serde(default, deserialize_with = "crate::models::trimmed::option")]
    #[validate(length(min = 1, max = 40))]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "crate::models::trimmed::option")]
    #[validate(length(min = 1, max = 1000))]
    pub description: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub priority: Option<TaskPriority>,
    pub status: Option<TaskStatus>,
}

/// A validated task ready for insertion, bound to its owner.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub priority: TaskPriority,
    pub status: TaskStatus,
}

/// Represents a task entity as stored in the database and returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique identifier for the task (UUID v4).
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    /// Identifier of the user who owns the task.
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Creates a new `Task` from a draft.
    /// Sets `created_at`, `updated_at` to the current time, and `id` to a new UUID.
    pub fn new(draft: NewTask) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: draft.title,
            description: draft.description,
            date: draft.date,
            priority: draft.priority,
            status: draft.status,
            user_id: draft.user_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, patch: TaskPatch) {
        if let Some(title) = patch.title {
            self.title = title.trim().to_string();
        }
        if let Some(description) = patch.description {
            self.description = description.trim().to_string();
        }
        if let Some(date) = patch.date {
            self.date = date;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        self.updated_at = Utc::now();
    }
}

const TASK_FIELDS: &[Field] = &[
    Field::new("title", "title").filterable().sortable(),
    Field::new("priority", "priority").filterable().sortable(),
    Field::new("status", "status").filterable().sortable(),
    Field::new("date", "date").sortable(),
    Field::new("createdAt", "created_at").sortable(),
];

impl Resource for Task {
    type Draft = NewTask;
    type Patch = TaskPatch;

    const NAME: &'static str = "Task";
    const TABLE: &'static str = "tasks";
    const SCOPE_COLUMN: &'static str = "user_id";
    const FIELDS: &'static [Field] = TASK_FIELDS;
    const DEFAULT_SORT: &'static str = "-date";

    fn id(&self) -> Uuid {
        self.id
    }

    fn scope_id(&self) -> Uuid {
        self.user_id
    }

    /// Tasks are private to their owner, admins included.
    fn scope_for(actor: &CurrentUser) -> Option<Uuid> {
        Some(actor.id)
    }

    fn filter_value(&self, field: &str) -> Option<String> {
        match field {
            "title" => Some(self.title.clone()),
            "priority" => Some(self.priority.as_str().to_string()),
            "status" => Some(self.status.as_str().to_string()),
            _ => None,
        }
    }

    fn sort_key(&self, field: &str) -> SortKey {
        match field {
            "title" => SortKey::Text(self.title.clone()),
            "priority" => SortKey::Rank(self.priority as u8),
            "status" => SortKey::Rank(self.status as u8),
            "date" => SortKey::Time(self.date),
            "createdAt" => SortKey::Time(self.created_at),
            _ => SortKey::Missing,
        }
    }

    fn repository(state: &AppState) -> &dyn Repository<Self> {
        state.tasks.as_ref()
    }
}

impl Creatable for Task {
    type Input = TaskInput;

    fn draft(input: TaskInput, actor: &CurrentUser) -> NewTask {
        NewTask {
            user_id: actor.id,
            title: input.title.trim().to_string(),
            description: input.description.trim().to_string(),
            date: input.date.unwrap_or_else(Utc::now),
            priority: input.priority.unwrap_or_default(),
            status: input.status.unwrap_or_default(),
        }
    }
}
