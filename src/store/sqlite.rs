use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::DatabaseSettings;
use crate::models::{
    Cadence, MissionError, Priority, Result, TaskFilter, TaskRecord, TaskStatus, UserProfile,
};
use super::{completion_conflict, MissionStore};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        level INTEGER NOT NULL DEFAULT 1,
        xp INTEGER NOT NULL DEFAULT 0,
        total_points INTEGER NOT NULL DEFAULT 0,
        streak INTEGER NOT NULL DEFAULT 0,
        last_active_date INTEGER NOT NULL,
        created_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS tasks (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id),
        title TEXT NOT NULL,
        description TEXT,
        cadence TEXT NOT NULL,
        priority TEXT NOT NULL DEFAULT 'medium',
        status TEXT NOT NULL DEFAULT 'working',
        start_date INTEGER NOT NULL,
        end_date INTEGER NOT NULL,
        completed_at INTEGER,
        points_awarded INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_tasks_user ON tasks(user_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_due ON tasks(status, end_date)",
];

const TASK_COLUMNS: &str = "id, user_id, title, description, cadence, priority, status, \
     start_date, end_date, completed_at, points_awarded, created_at";

const USER_COLUMNS: &str = "id, name, email, level, xp, total_points, streak, last_active_date, created_at";

/// SQLite-backed store. Timestamps are kept as UTC milliseconds.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

fn to_millis(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_millis()
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| MissionError::StoreError(format!("timestamp out of range: {}", millis)))
}

fn to_db_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_db_int(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn profile_from_row(row: &SqliteRow) -> Result<UserProfile> {
    Ok(UserProfile {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        level: u32::try_from(row.try_get::<i64, _>("level")?).unwrap_or(1),
        xp: from_db_int(row.try_get("xp")?),
        total_points: from_db_int(row.try_get("total_points")?),
        streak: u32::try_from(row.try_get::<i64, _>("streak")?).unwrap_or(0),
        last_active_date: from_millis(row.try_get("last_active_date")?)?,
        created_at: from_millis(row.try_get("created_at")?)?,
    })
}

fn task_from_row(row: &SqliteRow) -> Result<TaskRecord> {
    let cadence: String = row.try_get("cadence")?;
    let priority: String = row.try_get("priority")?;
    let status: String = row.try_get("status")?;
    let completed_at: Option<i64> = row.try_get("completed_at")?;

    Ok(TaskRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        cadence: Cadence::from_str(&cadence).unwrap_or_else(|| {
            warn!("Task has unrecognized cadence '{}'; it earns no base points", cadence);
            Cadence::Unknown
        }),
        priority: Priority::from_str(&priority).unwrap_or_default(),
        status: TaskStatus::from_str(&status).ok_or(MissionError::InvalidStatus(status))?,
        start_date: from_millis(row.try_get("start_date")?)?,
        end_date: from_millis(row.try_get("end_date")?)?,
        completed_at: completed_at.map(from_millis).transpose()?,
        points_awarded: from_db_int(row.try_get("points_awarded")?),
        created_at: from_millis(row.try_get("created_at")?)?,
    })
}

impl SqliteStore {
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&settings.url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(settings.connect_timeout_seconds))
            .connect_with(options)
            .await?;

        info!("Connected to database {}", settings.url);
        Self::from_pool(pool).await
    }

    /// Private in-memory database. A single connection, since every sqlite
    /// memory connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn task_status(&self, task_id: &str) -> Result<Option<TaskStatus>> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM tasks WHERE id = ?")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(status.as_deref().and_then(TaskStatus::from_str))
    }
}

#[async_trait]
impl MissionStore for SqliteStore {
    async fn create_profile(&self, profile: &UserProfile) -> Result<()> {
        if self.get_profile(&profile.id).await?.is_some() {
            return Err(MissionError::Duplicate { kind: "User", id: profile.id.clone() });
        }

        sqlx::query(&format!(
            "INSERT INTO users ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            USER_COLUMNS
        ))
        .bind(&profile.id)
        .bind(&profile.name)
        .bind(&profile.email)
        .bind(i64::from(profile.level))
        .bind(to_db_int(profile.xp))
        .bind(to_db_int(profile.total_points))
        .bind(i64::from(profile.streak))
        .bind(to_millis(profile.last_active_date))
        .bind(to_millis(profile.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(profile_from_row).transpose()
    }

    async fn save_profile(&self, profile: &UserProfile) -> Result<()> {
        let result = sqlx::query(
            "UPDATE users SET name = ?, email = ?, level = ?, xp = ?, total_points = ?, \
             streak = ?, last_active_date = ? WHERE id = ?",
        )
        .bind(&profile.name)
        .bind(&profile.email)
        .bind(i64::from(profile.level))
        .bind(to_db_int(profile.xp))
        .bind(to_db_int(profile.total_points))
        .bind(i64::from(profile.streak))
        .bind(to_millis(profile.last_active_date))
        .bind(&profile.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MissionError::profile_not_found(&profile.id));
        }
        Ok(())
    }

    async fn insert_task(&self, task: &TaskRecord) -> Result<()> {
        if self.get_task(&task.id).await?.is_some() {
            return Err(MissionError::Duplicate { kind: "Task", id: task.id.clone() });
        }

        sqlx::query(&format!(
            "INSERT INTO tasks ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            TASK_COLUMNS
        ))
        .bind(&task.id)
        .bind(&task.user_id)
        .bind(&task.title)
        .bind(task.description.as_deref())
        .bind(task.cadence.as_str())
        .bind(task.priority.as_str())
        .bind(task.status.as_str())
        .bind(to_millis(task.start_date))
        .bind(to_millis(task.end_date))
        .bind(task.completed_at.map(to_millis))
        .bind(to_db_int(task.points_awarded))
        .bind(to_millis(task.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<TaskRecord>> {
        let row = sqlx::query(&format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS))
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(task_from_row).transpose()
    }

    async fn update_task(&self, task: &TaskRecord) -> Result<()> {
        let result = sqlx::query(
            "UPDATE tasks SET title = ?, description = ?, cadence = ?, priority = ?, \
             start_date = ?, end_date = ? WHERE id = ?",
        )
        .bind(&task.title)
        .bind(task.description.as_deref())
        .bind(task.cadence.as_str())
        .bind(task.priority.as_str())
        .bind(to_millis(task.start_date))
        .bind(to_millis(task.end_date))
        .bind(&task.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MissionError::task_not_found(&task.id));
        }
        Ok(())
    }

    async fn archive_task(&self, task_id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'archived' WHERE id = ? AND status IN ('working', 'unfinished')",
        )
        .bind(task_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        match self.task_status(task_id).await? {
            None => Err(MissionError::task_not_found(task_id)),
            Some(TaskStatus::Done) => Err(MissionError::AlreadyCompleted(task_id.to_string())),
            Some(_) => Ok(()),
        }
    }

    async fn delete_task(&self, task_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_tasks(&self, user_id: &str, filter: &TaskFilter) -> Result<Vec<TaskRecord>> {
        let mut sql = format!("SELECT {} FROM tasks WHERE user_id = ?", TASK_COLUMNS);
        if filter.cadence.is_some() {
            sql.push_str(" AND cadence = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        sql.push_str(" ORDER BY created_at DESC, id ASC");

        let mut query = sqlx::query(&sql).bind(user_id);
        if let Some(cadence) = filter.cadence {
            query = query.bind(cadence.as_str());
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(task_from_row).collect()
    }

    async fn commit_completion(&self, task: &TaskRecord, profile: &UserProfile) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            "UPDATE tasks SET status = ?, completed_at = ?, points_awarded = ? \
             WHERE id = ? AND status = 'working'",
        )
        .bind(task.status.as_str())
        .bind(task.completed_at.map(to_millis))
        .bind(to_db_int(task.points_awarded))
        .bind(&task.id)
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            let status: Option<String> = sqlx::query_scalar("SELECT status FROM tasks WHERE id = ?")
                .bind(&task.id)
                .fetch_optional(&mut *tx)
                .await?;
            tx.rollback().await?;
            let status = status.as_deref().and_then(TaskStatus::from_str);
            return Err(completion_conflict(&task.id, status));
        }

        let credited = sqlx::query(
            "UPDATE users SET level = ?, xp = ?, total_points = ?, streak = ?, \
             last_active_date = ? WHERE id = ?",
        )
        .bind(i64::from(profile.level))
        .bind(to_db_int(profile.xp))
        .bind(to_db_int(profile.total_points))
        .bind(i64::from(profile.streak))
        .bind(to_millis(profile.last_active_date))
        .bind(&profile.id)
        .execute(&mut *tx)
        .await?;

        if credited.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(MissionError::profile_not_found(&profile.id));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn mark_overdue_unfinished(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'unfinished' WHERE status = 'working' AND end_date < ?",
        )
        .bind(to_millis(now))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
