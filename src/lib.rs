pub mod models;
pub mod config;
pub mod scoring;
pub mod store;
pub mod service;

pub use models::{Cadence, MissionError, Result, TaskRecord, TaskStatus, UserProfile};
pub use config::Settings;

// Re-export commonly used types
pub use scoring::{calculate_level, CompletionOutcome, GamificationEngine, RewardTable};
pub use service::{CompletionReceipt, MissionService};
