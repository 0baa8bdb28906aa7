use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::models::{
    new_task_id, MissionError, NewTask, ProfileSummary, Result, TaskFilter, TaskRecord,
    TaskStatus, TaskUpdate, UserProfile,
};
use crate::scoring::{Clock, GamificationEngine, LevelProgress, StreakTransition};
use crate::store::MissionStore;

/// What a successful completion returns to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionReceipt {
    pub task: TaskRecord,
    pub user: ProfileSummary,
    pub points_awarded: u64,
    pub leveled_up: bool,
    pub transition: StreakTransition,
}

type UserLocks = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

fn lock_map(locks: &UserLocks) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
    match locks.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Exclusive access to one user's tasks and profile. Removes the user's
/// entry from the lock map on drop unless another caller is waiting on it.
struct UserGuard<'a> {
    locks: &'a UserLocks,
    user_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserGuard<'_> {
    fn drop(&mut self) {
        // Release first so the map holds the only remaining reference
        self.guard.take();
        let mut locks = lock_map(self.locks);
        let idle = locks
            .get(&self.user_id)
            .map_or(false, |lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(&self.user_id);
        }
    }
}

/// Task handling on top of a store: ownership checks, completion with
/// rewards, and the overdue sweep.
pub struct MissionService<S: MissionStore> {
    store: Arc<S>,
    engine: GamificationEngine,
    clock: Arc<dyn Clock>,
    user_locks: UserLocks,
}

impl<S: MissionStore> MissionService<S> {
    pub fn new(store: Arc<S>, engine: GamificationEngine, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            engine,
            clock,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn engine(&self) -> &GamificationEngine {
        &self.engine
    }

    /// Task and profile mutations for one user run one at a time.
    async fn lock_user(&self, user_id: &str) -> UserGuard<'_> {
        // Clone under the map lock so eviction in `UserGuard::drop` sees it
        let lock = lock_map(&self.user_locks)
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;

        UserGuard {
            locks: &self.user_locks,
            user_id: user_id.to_string(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn tracked_users(&self) -> usize {
        lock_map(&self.user_locks).len()
    }

    pub async fn register_user(&self, id: &str, name: &str, email: &str) -> Result<UserProfile> {
        let profile = UserProfile::new(id.to_string(), name.to_string(), email.to_string(), self.clock.now());
        self.store.create_profile(&profile).await?;
        info!("Registered user {}", id);
        Ok(profile)
    }

    pub async fn profile(&self, user_id: &str) -> Result<UserProfile> {
        self.store
            .get_profile(user_id)
            .await?
            .ok_or_else(|| MissionError::profile_not_found(user_id))
    }

    pub async fn level_progress(&self, user_id: &str) -> Result<LevelProgress> {
        let profile = self.profile(user_id).await?;
        Ok(self.engine.levels().progress(profile.total_points))
    }

    pub async fn create_task(&self, user_id: &str, new_task: NewTask) -> Result<TaskRecord> {
        self.profile(user_id).await?;
        let task = TaskRecord::new(new_task_id(), user_id.to_string(), new_task, self.clock.now());
        self.store.insert_task(&task).await?;
        info!("Created {} task {} for {}", task.cadence.as_str(), task.id, user_id);
        Ok(task)
    }

    pub async fn list_tasks(&self, user_id: &str, filter: &TaskFilter) -> Result<Vec<TaskRecord>> {
        self.store.list_tasks(user_id, filter).await
    }

    /// Load a task and make sure `user_id` owns it.
    async fn owned_task(&self, user_id: &str, task_id: &str) -> Result<TaskRecord> {
        let task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| MissionError::task_not_found(task_id))?;

        if !task.is_owned_by(user_id) {
            warn!("User {} tried to modify task {} owned by {}", user_id, task_id, task.user_id);
            return Err(MissionError::NotAuthorized {
                task_id: task_id.to_string(),
                user_id: user_id.to_string(),
            });
        }
        Ok(task)
    }

    /// Reload a task after a write so callers see the stored status.
    async fn reload_task(&self, task_id: &str) -> Result<TaskRecord> {
        self.store
            .get_task(task_id)
            .await?
            .ok_or_else(|| MissionError::task_not_found(task_id))
    }

    /// Edit descriptive fields. Never changes status or rewards.
    pub async fn update_task(&self, user_id: &str, task_id: &str, update: TaskUpdate) -> Result<TaskRecord> {
        let _guard = self.lock_user(user_id).await;

        let mut task = self.owned_task(user_id, task_id).await?;
        task.apply_update(update);
        self.store.update_task(&task).await?;
        self.reload_task(task_id).await
    }

    /// Archive a task that has not been completed.
    pub async fn archive_task(&self, user_id: &str, task_id: &str) -> Result<TaskRecord> {
        let _guard = self.lock_user(user_id).await;

        self.owned_task(user_id, task_id).await?;
        self.store.archive_task(task_id).await?;
        info!("Archived task {}", task_id);
        self.reload_task(task_id).await
    }

    pub async fn delete_task(&self, user_id: &str, task_id: &str) -> Result<()> {
        let _guard = self.lock_user(user_id).await;

        self.owned_task(user_id, task_id).await?;
        if !self.store.delete_task(task_id).await? {
            return Err(MissionError::task_not_found(task_id));
        }
        info!("Deleted task {}", task_id);
        Ok(())
    }

    /// Complete a task and credit its owner.
    ///
    /// The task and profile are committed together, and only while the stored
    /// task is still `working`. A done task yields `AlreadyCompleted`, an
    /// archived or unfinished one `NotCompletable`; neither awards anything.
    pub async fn complete_task(&self, user_id: &str, task_id: &str) -> Result<CompletionReceipt> {
        let _guard = self.lock_user(user_id).await;

        let mut task = self.owned_task(user_id, task_id).await?;
        match task.status {
            TaskStatus::Working => {}
            TaskStatus::Done => return Err(MissionError::AlreadyCompleted(task_id.to_string())),
            other => {
                return Err(MissionError::NotCompletable {
                    task_id: task_id.to_string(),
                    status: other.as_str().to_string(),
                })
            }
        }

        let profile = self.profile(user_id).await?;
        let now = self.clock.now();
        let outcome = self.engine.apply_completion(profile, task.cadence, now);

        task.mark_done(now, outcome.points_awarded);
        self.store.commit_completion(&task, &outcome.profile).await?;

        info!(
            "User {} completed {} (+{} points, total {}, level {}, streak {})",
            user_id,
            task_id,
            outcome.points_awarded,
            outcome.profile.total_points,
            outcome.profile.level,
            outcome.profile.streak
        );

        Ok(CompletionReceipt {
            task,
            user: outcome.profile.summary(),
            points_awarded: outcome.points_awarded,
            leveled_up: outcome.leveled_up,
            transition: outcome.transition,
        })
    }

    /// Mark every still-working task past its end date as unfinished.
    pub async fn sweep_overdue(&self) -> Result<u64> {
        let now = self.clock.now();
        let changed = self.store.mark_overdue_unfinished(now).await?;
        info!("Marked {} overdue tasks as unfinished", changed);
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Cadence;
    use crate::scoring::FixedClock;
    use crate::store::InMemoryStore;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 10, 0, 0).unwrap()
    }

    async fn service() -> (MissionService<InMemoryStore>, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(start()));
        let service = MissionService::new(
            Arc::new(InMemoryStore::new()),
            GamificationEngine::default(),
            clock.clone(),
        );
        service.register_user("u1", "Ada", "ada@example.com").await.unwrap();
        service.register_user("u2", "Bob", "bob@example.com").await.unwrap();
        (service, clock)
    }

    fn mission(cadence: Cadence, days: i64) -> NewTask {
        NewTask {
            title: "Read".to_string(),
            description: None,
            cadence,
            priority: None,
            start_date: None,
            end_date: start() + Duration::days(days),
        }
    }

    #[tokio::test]
    async fn test_complete_awards_points() {
        let (service, _) = service().await;
        let task = service.create_task("u1", mission(Cadence::Daily, 1)).await.unwrap();

        let receipt = service.complete_task("u1", &task.id).await.unwrap();
        assert_eq!(receipt.points_awarded, 10);
        assert_eq!(receipt.task.status, TaskStatus::Done);
        assert_eq!(receipt.task.points_awarded, 10);
        assert_eq!(receipt.task.completed_at, Some(start()));
        assert_eq!(receipt.user.streak, 1);
        assert_eq!(receipt.transition, StreakTransition::Started);

        let profile = service.profile("u1").await.unwrap();
        assert_eq!(profile.total_points, 10);
    }

    #[tokio::test]
    async fn test_second_completion_rejected() {
        let (service, _) = service().await;
        let task = service.create_task("u1", mission(Cadence::Weekly, 7)).await.unwrap();
        service.complete_task("u1", &task.id).await.unwrap();

        let err = service.complete_task("u1", &task.id).await.unwrap_err();
        assert!(matches!(err, MissionError::AlreadyCompleted(_)));
        assert_eq!(service.profile("u1").await.unwrap().total_points, 30);
    }

    #[tokio::test]
    async fn test_foreign_task_rejected() {
        let (service, _) = service().await;
        let task = service.create_task("u1", mission(Cadence::Daily, 1)).await.unwrap();

        let err = service.complete_task("u2", &task.id).await.unwrap_err();
        assert!(matches!(err, MissionError::NotAuthorized { .. }));
        let err = service.archive_task("u2", &task.id).await.unwrap_err();
        assert!(matches!(err, MissionError::NotAuthorized { .. }));
    }

    #[tokio::test]
    async fn test_missing_task_and_user() {
        let (service, _) = service().await;
        let err = service.complete_task("u1", "nope").await.unwrap_err();
        assert!(matches!(err, MissionError::NotFound { kind: "Task", .. }));

        let err = service.create_task("ghost", mission(Cadence::Daily, 1)).await.unwrap_err();
        assert!(matches!(err, MissionError::NotFound { kind: "User", .. }));
    }

    #[tokio::test]
    async fn test_unfinished_and_archived_tasks_earn_nothing() {
        let (service, clock) = service().await;
        let overdue = service.create_task("u1", mission(Cadence::Daily, 1)).await.unwrap();
        let archived = service.create_task("u1", mission(Cadence::Monthly, 30)).await.unwrap();
        service.archive_task("u1", &archived.id).await.unwrap();

        clock.advance(Duration::days(2));
        assert_eq!(service.sweep_overdue().await.unwrap(), 1);

        let err = service.complete_task("u1", &overdue.id).await.unwrap_err();
        assert!(matches!(err, MissionError::NotCompletable { .. }));
        let err = service.complete_task("u1", &archived.id).await.unwrap_err();
        assert!(matches!(err, MissionError::NotCompletable { .. }));
        assert_eq!(service.profile("u1").await.unwrap().total_points, 0);
    }

    #[tokio::test]
    async fn test_week_of_dailies_earns_bonus() {
        let (service, clock) = service().await;
        let mut last = None;
        for _ in 0..7 {
            let task = service.create_task("u1", mission(Cadence::Daily, 30)).await.unwrap();
            last = Some(service.complete_task("u1", &task.id).await.unwrap());
            clock.advance(Duration::days(1));
        }

        let receipt = last.unwrap();
        assert_eq!(receipt.user.streak, 7);
        assert_eq!(receipt.points_awarded, 60);
        assert_eq!(receipt.task.points_awarded, 60);
        assert_eq!(receipt.user.total_points, 7 * 10 + 50);
    }

    #[tokio::test]
    async fn test_concurrent_completions_credit_once_each() {
        let (service, _) = service().await;
        let service = Arc::new(service);
        let first = service.create_task("u1", mission(Cadence::Daily, 1)).await.unwrap();
        let second = service.create_task("u1", mission(Cadence::Weekly, 7)).await.unwrap();

        let mut handles = Vec::new();
        for task_id in [first.id.clone(), first.id.clone(), second.id.clone()] {
            let service = service.clone();
            handles.push(tokio::spawn(async move { service.complete_task("u1", &task_id).await }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 2);
        assert_eq!(service.profile("u1").await.unwrap().total_points, 40);
    }

    #[tokio::test]
    async fn test_stale_edit_after_completion_does_not_reward_twice() {
        let (service, _) = service().await;
        let task = service.create_task("u1", mission(Cadence::Monthly, 30)).await.unwrap();
        let mut stale = service.store().get_task(&task.id).await.unwrap().unwrap();

        service.complete_task("u1", &task.id).await.unwrap();

        stale.title = "Budget review".to_string();
        service.store().update_task(&stale).await.unwrap();

        let err = service.complete_task("u1", &task.id).await.unwrap_err();
        assert!(matches!(err, MissionError::AlreadyCompleted(_)));

        let stored = service.store().get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Done);
        assert_eq!(stored.title, "Budget review");
        assert_eq!(service.profile("u1").await.unwrap().total_points, 100);
    }

    #[tokio::test]
    async fn test_edits_keep_completed_status() {
        let (service, _) = service().await;
        let task = service.create_task("u1", mission(Cadence::Weekly, 7)).await.unwrap();
        service.complete_task("u1", &task.id).await.unwrap();

        let edited = service
            .update_task("u1", &task.id, TaskUpdate { title: Some("Long run".to_string()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(edited.status, TaskStatus::Done);
        assert_eq!(edited.points_awarded, 30);

        let err = service.archive_task("u1", &task.id).await.unwrap_err();
        assert!(matches!(err, MissionError::AlreadyCompleted(_)));
        assert_eq!(service.profile("u1").await.unwrap().total_points, 30);
    }

    #[tokio::test]
    async fn test_user_locks_are_released() {
        let (service, _) = service().await;
        let task = service.create_task("u1", mission(Cadence::Daily, 1)).await.unwrap();

        let err = service.complete_task("ghost", &task.id).await.unwrap_err();
        assert!(matches!(err, MissionError::NotAuthorized { .. }));
        let err = service.complete_task("ghost", "no-such-task").await.unwrap_err();
        assert!(matches!(err, MissionError::NotFound { .. }));
        assert_eq!(service.tracked_users(), 0);

        service.complete_task("u1", &task.id).await.unwrap();
        service.archive_task("u1", &task.id).await.unwrap_err();
        assert_eq!(service.tracked_users(), 0);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let (service, _) = service().await;
        let task = service.create_task("u1", mission(Cadence::Daily, 1)).await.unwrap();

        let updated = service
            .update_task("u1", &task.id, TaskUpdate { title: Some("Run".to_string()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(updated.title, "Run");

        service.delete_task("u1", &task.id).await.unwrap();
        let tasks = service.list_tasks("u1", &TaskFilter::default()).await.unwrap();
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn test_level_progress() {
        let (service, _) = service().await;
        let task = service.create_task("u1", mission(Cadence::Monthly, 30)).await.unwrap();
        service.complete_task("u1", &task.id).await.unwrap();

        let progress = service.level_progress("u1").await.unwrap();
        assert_eq!(progress.level, 1);
        assert_eq!(progress.points_into_level, 100);
        assert_eq!(progress.points_to_next_level, 400);
    }
}
