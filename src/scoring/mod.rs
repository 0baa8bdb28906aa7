pub mod clock;
pub mod points;
pub mod level;
pub mod streak;
pub mod engine;

pub use clock::{Clock, DayCalendar, FixedClock, SystemClock};
pub use points::RewardTable;
pub use level::{calculate_level, LevelCurve, LevelProgress};
pub use streak::{StreakEngine, StreakTransition, StreakUpdate};
pub use engine::{CompletionOutcome, GamificationEngine};
