use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::models::{MissionError, Result, TaskFilter, TaskRecord, TaskStatus, UserProfile};
use super::{completion_conflict, MissionStore};

/// Map-backed store for tests and the `simulate` command.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    profiles: RwLock<HashMap<String, UserProfile>>,
    tasks: RwLock<HashMap<String, TaskRecord>>,
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| MissionError::StoreError("in-memory store lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| MissionError::StoreError("in-memory store lock poisoned".to_string()))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MissionStore for InMemoryStore {
    async fn create_profile(&self, profile: &UserProfile) -> Result<()> {
        let mut profiles = write(&self.profiles)?;
        if profiles.contains_key(&profile.id) {
            return Err(MissionError::Duplicate { kind: "User", id: profile.id.clone() });
        }
        profiles.insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Ok(read(&self.profiles)?.get(user_id).cloned())
    }

    async fn save_profile(&self, profile: &UserProfile) -> Result<()> {
        let mut profiles = write(&self.profiles)?;
        match profiles.get_mut(&profile.id) {
            Some(existing) => {
                *existing = profile.clone();
                Ok(())
            }
            None => Err(MissionError::profile_not_found(&profile.id)),
        }
    }

    async fn insert_task(&self, task: &TaskRecord) -> Result<()> {
        let mut tasks = write(&self.tasks)?;
        if tasks.contains_key(&task.id) {
            return Err(MissionError::Duplicate { kind: "Task", id: task.id.clone() });
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<TaskRecord>> {
        Ok(read(&self.tasks)?.get(task_id).cloned())
    }

    async fn update_task(&self, task: &TaskRecord) -> Result<()> {
        let mut tasks = write(&self.tasks)?;
        let existing = tasks
            .get_mut(&task.id)
            .ok_or_else(|| MissionError::task_not_found(&task.id))?;

        existing.title = task.title.clone();
        existing.description = task.description.clone();
        existing.cadence = task.cadence;
        existing.priority = task.priority;
        existing.start_date = task.start_date;
        existing.end_date = task.end_date;
        Ok(())
    }

    async fn archive_task(&self, task_id: &str) -> Result<()> {
        let mut tasks = write(&self.tasks)?;
        let existing = tasks
            .get_mut(task_id)
            .ok_or_else(|| MissionError::task_not_found(task_id))?;

        match existing.status {
            TaskStatus::Done => Err(MissionError::AlreadyCompleted(task_id.to_string())),
            _ => {
                existing.status = TaskStatus::Archived;
                Ok(())
            }
        }
    }

    async fn delete_task(&self, task_id: &str) -> Result<bool> {
        Ok(write(&self.tasks)?.remove(task_id).is_some())
    }

    async fn list_tasks(&self, user_id: &str, filter: &TaskFilter) -> Result<Vec<TaskRecord>> {
        let tasks = read(&self.tasks)?;
        let mut matching: Vec<TaskRecord> = tasks
            .values()
            .filter(|t| t.is_owned_by(user_id) && filter.matches(t))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matching)
    }

    async fn commit_completion(&self, task: &TaskRecord, profile: &UserProfile) -> Result<()> {
        // Both locks held so readers never see one write without the other
        let mut tasks = write(&self.tasks)?;
        let mut profiles = write(&self.profiles)?;

        let stored_task = match tasks.get_mut(&task.id) {
            Some(stored) if stored.status == TaskStatus::Working => stored,
            stored => return Err(completion_conflict(&task.id, stored.map(|t| t.status))),
        };
        let stored_profile = profiles
            .get_mut(&profile.id)
            .ok_or_else(|| MissionError::profile_not_found(&profile.id))?;

        *stored_task = task.clone();
        *stored_profile = profile.clone();
        Ok(())
    }

    async fn mark_overdue_unfinished(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tasks = write(&self.tasks)?;
        let mut changed = 0;
        for task in tasks.values_mut().filter(|t| t.is_overdue(now)) {
            task.status = TaskStatus::Unfinished;
            changed += 1;
        }
        Ok(changed)
    }
}
