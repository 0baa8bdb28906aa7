use serde::{Deserialize, Serialize};

use crate::models::Cadence;

/// Base reward per cadence. Handed to the engine once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardTable {
    pub daily: u64,
    pub weekly: u64,
    pub monthly: u64,
}

impl Default for RewardTable {
    fn default() -> Self {
        Self {
            daily: 10,
            weekly: 30,
            monthly: 100,
        }
    }
}

impl RewardTable {
    pub fn base_points(&self, cadence: Cadence) -> u64 {
        match cadence {
            Cadence::Daily => self.daily,
            Cadence::Weekly => self.weekly,
            Cadence::Monthly => self.monthly,
            Cadence::Unknown => 0,
        }
    }

    /// Unknown labels are worth nothing rather than an error.
    pub fn base_points_for_label(&self, label: &str) -> u64 {
        Cadence::from_str(label)
            .map(|cadence| self.base_points(cadence))
            .unwrap_or(0)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.daily == 0 && self.weekly == 0 && self.monthly == 0 {
            return Err("Reward table awards no points for any cadence".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rewards() {
        let table = RewardTable::default();
        assert_eq!(table.base_points(Cadence::Daily), 10);
        assert_eq!(table.base_points(Cadence::Weekly), 30);
        assert_eq!(table.base_points(Cadence::Monthly), 100);
    }

    #[test]
    fn test_unknown_label_is_worth_zero() {
        let table = RewardTable::default();
        assert_eq!(table.base_points_for_label("weekly"), 30);
        assert_eq!(table.base_points_for_label("yearly"), 0);
        assert_eq!(table.base_points_for_label(""), 0);
        assert_eq!(table.base_points(Cadence::Unknown), 0);
    }

    #[test]
    fn test_alternate_table() {
        let table = RewardTable { daily: 1, weekly: 2, monthly: 3 };
        assert_eq!(table.base_points(Cadence::Monthly), 3);
        assert!(table.validate().is_ok());
        assert!(RewardTable { daily: 0, weekly: 0, monthly: 0 }.validate().is_err());
    }
}
