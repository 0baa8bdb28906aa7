use serde::{Deserialize, Serialize};

pub const DEFAULT_POINTS_PER_LEVEL: u64 = 500;

/// Linear level curve: one level per `points_per_level` points, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelCurve {
    points_per_level: u64,
}

impl Default for LevelCurve {
    fn default() -> Self {
        Self::new(DEFAULT_POINTS_PER_LEVEL)
    }
}

/// Position inside the current level, as shown on a progress bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelProgress {
    pub level: u32,
    pub points_into_level: u64,
    pub points_per_level: u64,
    pub points_to_next_level: u64,
    pub fraction: f64,
}

impl LevelCurve {
    /// A zero step is treated as 1 so the curve stays total.
    pub fn new(points_per_level: u64) -> Self {
        Self {
            points_per_level: points_per_level.max(1),
        }
    }

    pub fn points_per_level(&self) -> u64 {
        self.points_per_level
    }

    pub fn level_for(&self, total_points: u64) -> u32 {
        let level = total_points / self.points_per_level + 1;
        u32::try_from(level).unwrap_or(u32::MAX)
    }

    /// Points needed to reach `level`.
    pub fn threshold_for(&self, level: u32) -> u64 {
        u64::from(level.saturating_sub(1)).saturating_mul(self.points_per_level)
    }

    pub fn progress(&self, total_points: u64) -> LevelProgress {
        let points_into_level = total_points % self.points_per_level;
        LevelProgress {
            level: self.level_for(total_points),
            points_into_level,
            points_per_level: self.points_per_level,
            points_to_next_level: self.points_per_level - points_into_level,
            fraction: points_into_level as f64 / self.points_per_level as f64,
        }
    }
}

/// Level on the default 500-point curve.
pub fn calculate_level(total_points: u64) -> u32 {
    LevelCurve::default().level_for(total_points)
}
