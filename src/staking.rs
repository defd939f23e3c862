//! Validator stake bookkeeping and round-robin selection
//!
//! The roster keeps validators in the order their first stake arrived; that
//! order is the eligibility order for block production. Selection rotates
//! through the roster by height and is deterministic on every node, so no
//! coordination messages are needed. Stake amounts weight membership only,
//! not selection probability.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Stake {
    pub validator: String,
    pub amount: u64,
}

#[derive(Default)]
pub struct StakingManager {
    stakes: HashMap<String, u64>,
    roster: Vec<String>,
}

impl StakingManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds stake to a validator, appending it to the roster on first stake.
    /// Appending shifts round-robin assignments for future heights only.
    pub fn process_stake(&mut self, validator: &str, amount: u64) {
        let entry = self.stakes.entry(validator.to_string()).or_insert(0);
        if *entry == 0 && !self.roster.contains(&validator.to_string()) {
            self.roster.push(validator.to_string());
        }
        *entry = entry.saturating_add(amount);
    }

    pub fn get_stake(&self, validator: &str) -> u64 {
        self.stakes.get(validator).copied().unwrap_or(0)
    }

    /// Snapshot of the active set in roster order.
    pub fn active_validators(&self) -> Vec<Stake> {
        self.roster
            .iter()
            .map(|v| Stake {
                validator: v.clone(),
                amount: self.get_stake(v),
            })
            .collect()
    }

    /// The validator expected to produce the block after `height`. Returns
    /// None while the roster is empty.
    pub fn select_validator(&self, height: u64) -> Option<&str> {
        if self.roster.is_empty() {
            return None;
        }
        let index = ((height + 1) % self.roster.len() as u64) as usize;
        Some(self.roster[index].as_str())
    }
}
