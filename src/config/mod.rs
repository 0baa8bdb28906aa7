pub mod settings;

pub use settings::*;
pub use crate::scoring::points::RewardTable;
