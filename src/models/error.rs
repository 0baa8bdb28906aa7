use thiserror::Error;

#[derive(Error, Debug)]
pub enum MissionError {
    #[error("Task already completed: {0}")]
    AlreadyCompleted(String),

    #[error("Not authorized to modify task {task_id} as {user_id}")]
    NotAuthorized { task_id: String, user_id: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Task {task_id} cannot be completed while {status}")]
    NotCompletable { task_id: String, status: String },

    #[error("Invalid task status: {0}")]
    InvalidStatus(String),

    #[error("Duplicate {kind}: {id}")]
    Duplicate { kind: &'static str, id: String },

    #[error("Storage error: {0}")]
    StoreError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl MissionError {
    pub fn task_not_found(id: impl Into<String>) -> Self {
        MissionError::NotFound { kind: "Task", id: id.into() }
    }

    pub fn profile_not_found(id: impl Into<String>) -> Self {
        MissionError::NotFound { kind: "User", id: id.into() }
    }
}

pub type Result<T> = std::result::Result<T, MissionError>;
