use serde::{Deserialize, Serialize};
use config::{Config, ConfigError, File};
use std::path::Path;

use crate::scoring::{DayCalendar, GamificationEngine, LevelCurve, RewardTable, StreakEngine};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub app: AppSettings,
    pub rewards: RewardTable,
    pub streak: StreakSettings,
    pub leveling: LevelSettings,
    pub database: DatabaseSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    pub name: String,
    pub version: String,
    pub log_level: String,
    pub environment: Environment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreakSettings {
    /// Every streak length divisible by this earns the bonus. 0 disables it.
    pub bonus_interval_days: u32,
    pub bonus_points: u64,
    /// Offset from UTC of the zone whose midnight separates calendar days.
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelSettings {
    pub points_per_level: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app: AppSettings {
                name: "Mission Engine".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                log_level: "info".to_string(),
                environment: Environment::Development,
            },
            rewards: RewardTable::default(),
            streak: StreakSettings {
                bonus_interval_days: 7,
                bonus_points: 50,
                utc_offset_minutes: 0,
            },
            leveling: LevelSettings {
                points_per_level: 500,
            },
            database: DatabaseSettings {
                url: "sqlite://missions.db".to_string(),
                max_connections: 5,
                connect_timeout_seconds: 30,
            },
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("MISSION_ENGINE").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Like `new`, but falls back to the defaults and hands back the error
    /// that forced the fallback so the caller can report it.
    pub fn new_or_default() -> (Self, Option<ConfigError>) {
        Self::or_default(Self::new())
    }

    fn or_default(loaded: Result<Self, ConfigError>) -> (Self, Option<ConfigError>) {
        match loaded {
            Ok(settings) => (settings, None),
            Err(e) => (Settings::default(), Some(e)),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::from(path.as_ref()))
            .build()?;

        s.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        self.rewards.validate()?;

        if self.leveling.points_per_level == 0 {
            return Err("Points per level must be positive".to_string());
        }

        // Offsets beyond +-24h are rejected by chrono::FixedOffset
        if self.streak.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(format!(
                "UTC offset must be within +-24h, got {} minutes",
                self.streak.utc_offset_minutes
            ));
        }

        if self.database.max_connections == 0 {
            return Err("Database needs at least one connection".to_string());
        }

        Ok(())
    }

    pub fn calendar(&self) -> DayCalendar {
        DayCalendar::from_offset_minutes(self.streak.utc_offset_minutes)
    }

    /// Build the scoring engine described by these settings.
    pub fn engine(&self) -> GamificationEngine {
        GamificationEngine::new(
            self.rewards.clone(),
            LevelCurve::new(self.leveling.points_per_level),
            StreakEngine::new(
                self.streak.bonus_interval_days,
                self.streak.bonus_points,
                self.calendar(),
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.rewards.daily, 10);
        assert_eq!(settings.streak.bonus_interval_days, 7);
        assert_eq!(settings.leveling.points_per_level, 500);
    }

    #[test]
    fn test_rejects_zero_points_per_level() {
        let mut settings = Settings::default();
        settings.leveling.points_per_level = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_offset() {
        let mut settings = Settings::default();
        settings.streak.utc_offset_minutes = 24 * 60;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_broken_file_falls_back_with_error() {
        let dir = std::env::temp_dir().join(format!("mission_engine_cfg_{}", rand::random::<u32>()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.toml");
        std::fs::write(&path, "[rewards\ndaily = \"ten\"\n").unwrap();

        let (settings, error) = Settings::or_default(Settings::from_file(&path));
        assert!(error.is_some());
        assert_eq!(settings.rewards.daily, 10);

        let (_, error) = Settings::or_default(Ok(Settings::default()));
        assert!(error.is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_from_file_overrides_defaults() {
        let dir = std::env::temp_dir().join(format!("mission_engine_cfg_{}", rand::random::<u32>()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.toml");
        std::fs::write(&path, "[rewards]\ndaily = 15\n\n[streak]\nbonus_points = 75\n").unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.rewards.daily, 15);
        assert_eq!(settings.rewards.weekly, 30);
        assert_eq!(settings.streak.bonus_points, 75);
        assert_eq!(settings.streak.bonus_interval_days, 7);

        std::fs::remove_dir_all(&dir).ok();
    }
}
