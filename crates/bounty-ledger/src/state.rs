use crate::balance::{Balances, Debit};
use crate::clients::ClientRegistry;
use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::referral::ReferralGraph;
use crate::tasks::TaskCatalog;
use crate::tracking::TaskTracking;
use crate::types::{Amount, UserId};
use crate::withdrawal::WithdrawalBook;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Every durable map the engine owns. Saved and loaded as one document;
/// keys missing from an older file take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerState {
    pub balances: Balances,
    pub referrals: ReferralGraph,
    pub banned: BTreeSet<UserId>,
    pub tasks: TaskCatalog,
    pub clients: ClientRegistry,
    pub withdrawals: WithdrawalBook,
    pub tracking: TaskTracking,
}

impl LedgerState {
    pub fn is_banned(&self, user: UserId) -> bool {
        self.banned.contains(&user)
    }

    pub(crate) fn ensure_not_banned(&self, user: UserId) -> Result<()> {
        if self.is_banned(user) {
            return Err(LedgerError::Banned(user));
        }
        Ok(())
    }

    /// Returns true if the user was not already banned.
    pub fn ban(&mut self, config: &LedgerConfig, user: UserId) -> Result<bool> {
        if user == config.operator_id {
            return Err(LedgerError::Validation("the operator cannot be banned".into()));
        }
        let added = self.banned.insert(user);
        if added {
            warn!(user = %user, "🚫 User banned");
        }
        Ok(added)
    }

    /// Returns true if the user was banned.
    pub fn unban(&mut self, user: UserId) -> bool {
        let removed = self.banned.remove(&user);
        if removed {
            info!(user = %user, "User unbanned");
        }
        removed
    }

    /// Drops the operator from the ban list, e.g. after loading a file
    /// written under a different operator id.
    pub fn strip_operator(&mut self, operator: UserId) {
        if self.banned.remove(&operator) {
            warn!(operator = %operator, "Operator found in ban list, removed");
        }
    }

    pub fn credit(&mut self, config: &LedgerConfig, user: UserId, amount: Amount) -> Result<Amount> {
        self.balances.credit(user, amount, &config.limits)
    }

    pub fn debit(&mut self, user: UserId, amount: Amount) -> Debit {
        self.balances.debit(user, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_cannot_be_banned() {
        let config = LedgerConfig::default();
        let mut state = LedgerState::default();

        assert!(matches!(
            state.ban(&config, config.operator_id),
            Err(LedgerError::Validation(_))
        ));
        assert!(state.ban(&config, UserId::new(50)).unwrap());
        assert!(!state.ban(&config, UserId::new(50)).unwrap());
        assert!(state.is_banned(UserId::new(50)));
        assert!(state.unban(UserId::new(50)));
        assert!(!state.unban(UserId::new(50)));
    }

    #[test]
    fn test_strip_operator() {
        let mut state = LedgerState::default();
        state.banned.insert(UserId::new(1));
        state.banned.insert(UserId::new(2));
        state.strip_operator(UserId::new(1));
        assert_eq!(state.banned.len(), 1);
    }

    #[test]
    fn test_missing_sections_default() {
        let state: LedgerState = serde_json::from_str(r#"{"balances": {"5": 250}}"#).unwrap();
        assert_eq!(state.balances.get(UserId::new(5)), Amount::from_cents(250));
        assert!(state.tasks.is_empty());
        assert!(state.withdrawals.is_empty());
    }
}
