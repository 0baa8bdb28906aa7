pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{MissionError, Result, TaskFilter, TaskRecord, TaskStatus, UserProfile};

/// Persistence for profiles and tasks.
///
/// `update_task` only edits descriptive fields. Status changes go through
/// `archive_task`, `commit_completion` and `mark_overdue_unfinished`, each of
/// which checks the stored status before writing.
#[async_trait]
pub trait MissionStore: Send + Sync {
    /// Fails with `Duplicate` if the id is taken.
    async fn create_profile(&self, profile: &UserProfile) -> Result<()>;

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>>;

    async fn save_profile(&self, profile: &UserProfile) -> Result<()>;

    async fn insert_task(&self, task: &TaskRecord) -> Result<()>;

    async fn get_task(&self, task_id: &str) -> Result<Option<TaskRecord>>;

    /// Writes title, description, cadence, priority and dates only.
    async fn update_task(&self, task: &TaskRecord) -> Result<()>;

    /// Move a `working` or `unfinished` task to `archived`. Archiving an
    /// archived task is a no-op; a done task fails with `AlreadyCompleted`.
    async fn archive_task(&self, task_id: &str) -> Result<()>;

    /// Returns whether a task was removed.
    async fn delete_task(&self, task_id: &str) -> Result<bool>;

    /// Tasks of one user matching `filter`, newest first.
    async fn list_tasks(&self, user_id: &str, filter: &TaskFilter) -> Result<Vec<TaskRecord>>;

    /// Persist a completed task and the credited profile together.
    ///
    /// Only a stored task that is still `working` is accepted. Otherwise
    /// nothing is written and the error is `AlreadyCompleted` for a done task
    /// or `NotCompletable` for an archived or unfinished one.
    async fn commit_completion(&self, task: &TaskRecord, profile: &UserProfile) -> Result<()>;

    /// Flip every `working` task whose end date is before `now` to
    /// `unfinished`. Returns how many changed.
    async fn mark_overdue_unfinished(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Error for a completion that found the stored task in `status`.
pub(crate) fn completion_conflict(task_id: &str, status: Option<TaskStatus>) -> MissionError {
    match status {
        None => MissionError::task_not_found(task_id),
        Some(TaskStatus::Done) => MissionError::AlreadyCompleted(task_id.to_string()),
        Some(other) => MissionError::NotCompletable {
            task_id: task_id.to_string(),
            status: other.as_str().to_string(),
        },
    }
}
