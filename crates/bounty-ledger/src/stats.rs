use crate::state::LedgerState;
use crate::types::Amount;
use serde::Serialize;

/// Operator dashboard figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub total_users: usize,
    pub banned_users: usize,
    /// Users with an account who are not banned.
    pub active_users: usize,
    pub total_tasks: usize,
    pub client_tasks: usize,
    pub total_balance: Amount,
    pub pending_withdrawals: usize,
    pub referrals: usize,
    pub pending_submissions: usize,
}

impl LedgerStats {
    pub fn collect(state: &LedgerState) -> Self {
        let active_users = state
            .balances
            .users()
            .filter(|u| !state.is_banned(*u))
            .count();
        Self {
            total_users: state.balances.len(),
            banned_users: state.banned.len(),
            active_users,
            total_tasks: state.tasks.len(),
            client_tasks: state.clients.len(),
            total_balance: state.balances.total(),
            pending_withdrawals: state.withdrawals.pending_count(),
            referrals: state.referrals.len(),
            pending_submissions: state.tasks.pending_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::types::{Section, UserId};

    #[test]
    fn test_stats_collection() {
        let config = LedgerConfig::default();
        let mut state = LedgerState::default();
        state
            .register_referral(&config, UserId::new(10), UserId::new(20))
            .unwrap();
        state.ban(&config, UserId::new(20)).unwrap();
        state.add_task(Section::WatchAds, "Ad ₹1").unwrap();
        state
            .create_client_task("Acme", &["https://a.test".to_string()])
            .unwrap();

        let stats = LedgerStats::collect(&state);
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.banned_users, 1);
        assert_eq!(stats.active_users, 1);
        assert_eq!(stats.total_tasks, 2);
        assert_eq!(stats.client_tasks, 1);
        assert_eq!(stats.total_balance, Amount::from_units(10));
        assert_eq!(stats.referrals, 1);
        assert_eq!(stats.pending_withdrawals, 0);
    }
}
