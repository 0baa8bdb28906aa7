use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::{Cadence, UserProfile};
use super::{
    level::LevelCurve,
    points::RewardTable,
    streak::{StreakEngine, StreakTransition},
};

/// Result of crediting one task completion to a profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionOutcome {
    pub profile: UserProfile,
    /// Base reward plus any streak bonus earned by this completion.
    pub points_awarded: u64,
    pub base_points: u64,
    pub streak_bonus: u64,
    pub previous_level: u32,
    pub leveled_up: bool,
    pub transition: StreakTransition,
}

/// Applies completion events to profiles. Holds only immutable configuration,
/// so a single instance can be shared across requests.
#[derive(Debug, Clone, Default)]
pub struct GamificationEngine {
    rewards: RewardTable,
    levels: LevelCurve,
    streaks: StreakEngine,
}

impl GamificationEngine {
    pub fn new(rewards: RewardTable, levels: LevelCurve, streaks: StreakEngine) -> Self {
        Self {
            rewards,
            levels,
            streaks,
        }
    }

    pub fn rewards(&self) -> &RewardTable {
        &self.rewards
    }

    pub fn levels(&self) -> &LevelCurve {
        &self.levels
    }

    pub fn streaks(&self) -> &StreakEngine {
        &self.streaks
    }

    /// Credit a completed task of `cadence` at `now`.
    ///
    /// The caller must already have checked that the task belongs to the
    /// profile and has not been completed before; nothing here re-checks.
    pub fn apply_completion(&self, profile: UserProfile, cadence: Cadence, now: DateTime<Utc>) -> CompletionOutcome {
        let base_points = self.rewards.base_points(cadence);
        self.apply_base_points(profile, base_points, now)
    }

    /// Same as [`apply_completion`](Self::apply_completion) for a raw cadence
    /// label. Unknown labels earn no base points but still count as activity.
    pub fn apply_completion_label(&self, profile: UserProfile, label: &str, now: DateTime<Utc>) -> CompletionOutcome {
        let base_points = self.rewards.base_points_for_label(label);
        self.apply_base_points(profile, base_points, now)
    }

    fn apply_base_points(&self, mut profile: UserProfile, base_points: u64, now: DateTime<Utc>) -> CompletionOutcome {
        let previous_level = profile.level;
        profile.credit(base_points);

        let update = self.streaks.evaluate(profile.last_active_date, profile.streak, now);
        profile.streak = update.streak;
        profile.last_active_date = update.last_active_date;
        profile.credit(update.bonus_points);

        if update.bonus_points > 0 {
            info!(
                "User {} reached a {}-day streak: +{} bonus points",
                profile.id, profile.streak, update.bonus_points
            );
        }

        profile.level = self.levels.level_for(profile.total_points);
        let leveled_up = profile.level > previous_level;
        if leveled_up {
            info!("User {} leveled up: {} -> {}", profile.id, previous_level, profile.level);
        }

        let points_awarded = base_points + update.bonus_points;
        debug!(
            "Completion for {}: +{} points ({} base, {} bonus), streak {} ({})",
            profile.id,
            points_awarded,
            base_points,
            update.bonus_points,
            profile.streak,
            update.transition.as_str()
        );

        CompletionOutcome {
            profile,
            points_awarded,
            base_points,
            streak_bonus: update.bonus_points,
            previous_level,
            leveled_up,
            transition: update.transition,
        }
    }
}
