use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// How often a mission recurs. Determines its base reward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Daily,
    Weekly,
    Monthly,
    /// Stored label this build does not recognize. Earns no base points.
    #[serde(other)]
    Unknown,
}

impl Cadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cadence::Daily => "daily",
            Cadence::Weekly => "weekly",
            Cadence::Monthly => "monthly",
            Cadence::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "daily" | "day" => Some(Cadence::Daily),
            "weekly" | "week" => Some(Cadence::Weekly),
            "monthly" | "month" => Some(Cadence::Monthly),
            _ => None,
        }
    }

    /// Like `from_str`, but maps unrecognized labels to `Unknown`.
    pub fn from_label(s: &str) -> Self {
        Self::from_str(s).unwrap_or(Cadence::Unknown)
    }

    pub fn all() -> [Cadence; 3] {
        [Cadence::Daily, Cadence::Weekly, Cadence::Monthly]
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Working,
    Done,
    Archived,
    Unfinished,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Working => "working",
            TaskStatus::Done => "done",
            TaskStatus::Archived => "archived",
            TaskStatus::Unfinished => "unfinished",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "working" => Some(TaskStatus::Working),
            "done" => Some(TaskStatus::Done),
            "archived" => Some(TaskStatus::Archived),
            "unfinished" => Some(TaskStatus::Unfinished),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub cadence: Cadence,
    pub priority: Priority,
    pub status: TaskStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Set once, when the task is completed.
    pub points_awarded: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub cadence: Cadence,
    pub priority: Option<Priority>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: DateTime<Utc>,
}

/// Partial edit of a task's descriptive fields; `None` keeps the current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub cadence: Option<Cadence>,
    pub priority: Option<Priority>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    pub cadence: Option<Cadence>,
    pub status: Option<TaskStatus>,
}

impl TaskFilter {
    pub fn matches(&self, task: &TaskRecord) -> bool {
        self.cadence.map_or(true, |c| task.cadence == c)
            && self.status.map_or(true, |s| task.status == s)
    }
}

impl TaskRecord {
    pub fn new(id: String, user_id: String, new_task: NewTask, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            title: new_task.title,
            description: new_task.description,
            cadence: new_task.cadence,
            priority: new_task.priority.unwrap_or_default(),
            status: TaskStatus::Working,
            start_date: new_task.start_date.unwrap_or(now),
            end_date: new_task.end_date,
            completed_at: None,
            points_awarded: 0,
            created_at: now,
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    /// Still open and past its end date.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Working && self.end_date < now
    }

    pub fn apply_update(&mut self, update: TaskUpdate) {
        if let Some(title) = update.title.filter(|t| !t.trim().is_empty()) {
            self.title = title;
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        if let Some(cadence) = update.cadence {
            self.cadence = cadence;
        }
        if let Some(priority) = update.priority {
            self.priority = priority;
        }
        if let Some(end_date) = update.end_date {
            self.end_date = end_date;
        }
    }

    pub fn mark_done(&mut self, now: DateTime<Utc>, points_awarded: u64) {
        self.status = TaskStatus::Done;
        self.completed_at = Some(now);
        self.points_awarded = points_awarded;
    }
}

/// Random 16-hex-digit identifier for tasks.
pub fn new_task_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}
