pub mod missions;

pub use missions::{CompletionReceipt, MissionService};
