use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::clock::DayCalendar;

pub const DEFAULT_BONUS_INTERVAL_DAYS: u32 = 7;
pub const DEFAULT_BONUS_POINTS: u64 = 50;

/// Which rule fired for a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreakTransition {
    /// Active on the previous calendar day; streak grows by one.
    Extended,
    /// One or more days were missed; a new chain of length 1 starts.
    Reset,
    /// Same day as the last activity with no streak yet.
    Started,
    /// Already credited today.
    Unchanged,
    /// `now` is on an earlier day than the last activity.
    ClockSkew,
}

impl StreakTransition {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreakTransition::Extended => "extended",
            StreakTransition::Reset => "reset",
            StreakTransition::Started => "started",
            StreakTransition::Unchanged => "unchanged",
            StreakTransition::ClockSkew => "clock_skew",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreakUpdate {
    pub transition: StreakTransition,
    pub streak: u32,
    pub bonus_points: u64,
    pub last_active_date: DateTime<Utc>,
}

/// Day-granularity streak rules with a periodic bonus.
#[derive(Debug, Clone)]
pub struct StreakEngine {
    bonus_interval: u32,
    bonus_points: u64,
    calendar: DayCalendar,
}

impl Default for StreakEngine {
    fn default() -> Self {
        Self::new(DEFAULT_BONUS_INTERVAL_DAYS, DEFAULT_BONUS_POINTS, DayCalendar::utc())
    }
}

impl StreakEngine {
    pub fn new(bonus_interval: u32, bonus_points: u64, calendar: DayCalendar) -> Self {
        Self {
            bonus_interval,
            bonus_points,
            calendar,
        }
    }

    pub fn calendar(&self) -> &DayCalendar {
        &self.calendar
    }

    /// True when reaching `streak` earns the bonus.
    pub fn is_bonus_day(&self, streak: u32) -> bool {
        self.bonus_interval > 0 && streak > 0 && streak % self.bonus_interval == 0
    }

    pub fn evaluate(&self, last_active: DateTime<Utc>, streak: u32, now: DateTime<Utc>) -> StreakUpdate {
        let diff_days = self.calendar.days_between(last_active, now);

        let (transition, streak, bonus_points) = match diff_days {
            d if d < 0 => {
                warn!(
                    "Completion at {} precedes last activity at {}; streak left at {}",
                    now, last_active, streak
                );
                // Never move the last-active marker backwards
                return StreakUpdate {
                    transition: StreakTransition::ClockSkew,
                    streak,
                    bonus_points: 0,
                    last_active_date: last_active,
                };
            }
            0 if streak == 0 => (StreakTransition::Started, 1, 0),
            0 => (StreakTransition::Unchanged, streak, 0),
            1 => {
                let extended = streak.saturating_add(1);
                let bonus = if self.is_bonus_day(extended) { self.bonus_points } else { 0 };
                (StreakTransition::Extended, extended, bonus)
            }
            _ => (StreakTransition::Reset, 1, 0),
        };

        StreakUpdate {
            transition,
            streak,
            bonus_points,
            last_active_date: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap() + Duration::days(n)
    }

    #[test]
    fn test_consecutive_day_increments() {
        let update = StreakEngine::default().evaluate(day(0), 3, day(1));
        assert_eq!(update.transition, StreakTransition::Extended);
        assert_eq!(update.streak, 4);
        assert_eq!(update.bonus_points, 0);
        assert_eq!(update.last_active_date, day(1));
    }

    #[test]
    fn test_seventh_day_earns_bonus() {
        let update = StreakEngine::default().evaluate(day(0), 6, day(1));
        assert_eq!(update.streak, 7);
        assert_eq!(update.bonus_points, 50);

        let update = StreakEngine::default().evaluate(day(0), 13, day(1));
        assert_eq!(update.streak, 14);
        assert_eq!(update.bonus_points, 50);
    }

    #[test]
    fn test_gap_resets_to_one_without_bonus() {
        let update = StreakEngine::default().evaluate(day(0), 10, day(5));
        assert_eq!(update.transition, StreakTransition::Reset);
        assert_eq!(update.streak, 1);
        assert_eq!(update.bonus_points, 0);
    }

    #[test]
    fn test_long_jump_never_stacks_bonus() {
        let update = StreakEngine::default().evaluate(day(0), 6, day(8));
        assert_eq!(update.streak, 1);
        assert_eq!(update.bonus_points, 0);
    }

    #[test]
    fn test_same_day_keeps_streak_and_refreshes_timestamp() {
        let later = day(0) + Duration::hours(5);
        let update = StreakEngine::default().evaluate(day(0), 2, later);
        assert_eq!(update.transition, StreakTransition::Unchanged);
        assert_eq!(update.streak, 2);
        assert_eq!(update.last_active_date, later);
    }

    #[test]
    fn test_same_day_with_zero_streak_starts_chain() {
        let update = StreakEngine::default().evaluate(day(0), 0, day(0));
        assert_eq!(update.transition, StreakTransition::Started);
        assert_eq!(update.streak, 1);
        assert_eq!(update.bonus_points, 0);
    }

    #[test]
    fn test_clock_skew_is_a_no_op() {
        let update = StreakEngine::default().evaluate(day(3), 4, day(1));
        assert_eq!(update.transition, StreakTransition::ClockSkew);
        assert_eq!(update.streak, 4);
        assert_eq!(update.bonus_points, 0);
        assert_eq!(update.last_active_date, day(3));
    }

    #[test]
    fn test_bonus_can_be_disabled() {
        let engine = StreakEngine::new(0, 50, DayCalendar::utc());
        let update = engine.evaluate(day(0), 6, day(1));
        assert_eq!(update.streak, 7);
        assert_eq!(update.bonus_points, 0);
    }

    #[test]
    fn test_first_day_of_a_month_after_month_end() {
        let last = Utc.with_ymd_and_hms(2024, 2, 29, 22, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap();
        let update = StreakEngine::default().evaluate(last, 1, now);
        assert_eq!(update.transition, StreakTransition::Extended);
        assert_eq!(update.streak, 2);
    }
}
