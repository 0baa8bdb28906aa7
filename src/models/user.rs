use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// Account record carrying the gamification counters.
///
/// `level` is always derived from `total_points`; only the scoring engine
/// writes `xp`, `total_points`, `level`, `streak` and `last_active_date`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub level: u32,
    /// Working point counter, credited alongside `total_points`.
    pub xp: u64,
    pub total_points: u64,
    pub streak: u32,
    pub last_active_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// The slice of a profile returned to clients after a completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileSummary {
    pub level: u32,
    pub xp: u64,
    pub total_points: u64,
    pub streak: u32,
}

impl UserProfile {
    /// Account-creation defaults: no points, level 1, no streak.
    pub fn new(id: String, name: String, email: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            email,
            level: 1,
            xp: 0,
            total_points: 0,
            streak: 0,
            last_active_date: now,
            created_at: now,
        }
    }

    pub fn summary(&self) -> ProfileSummary {
        ProfileSummary {
            level: self.level,
            xp: self.xp,
            total_points: self.total_points,
            streak: self.streak,
        }
    }

    /// Credit points to both counters.
    pub fn credit(&mut self, points: u64) {
        self.xp = self.xp.saturating_add(points);
        self.total_points = self.total_points.saturating_add(points);
    }
}
