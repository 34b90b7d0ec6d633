use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::state::LedgerState;
use crate::types::{Amount, UserId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

/// Referred user → referrer. One edge per referred user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferralGraph(BTreeMap<UserId, UserId>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferralBonus {
    pub referred: UserId,
    pub referrer: UserId,
    pub bonus: Amount,
    pub referred_balance: Amount,
    pub referrer_balance: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferralReset {
    Reset { previous_referrer: UserId },
    NotReferred,
}

impl ReferralGraph {
    pub fn referrer_of(&self, user: UserId) -> Option<UserId> {
        self.0.get(&user).copied()
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.0.contains_key(&user)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn referred_by(&self, referrer: UserId) -> usize {
        self.0.values().filter(|r| **r == referrer).count()
    }

    fn record(&mut self, referred: UserId, referrer: UserId) -> Result<()> {
        if self.0.contains_key(&referred) {
            return Err(LedgerError::Duplicate(format!(
                "user {referred} was already referred"
            )));
        }
        self.0.insert(referred, referrer);
        Ok(())
    }

    pub fn reset(&mut self, user: UserId) -> ReferralReset {
        match self.0.remove(&user) {
            Some(previous_referrer) => ReferralReset::Reset { previous_referrer },
            None => ReferralReset::NotReferred,
        }
    }

    /// Referrers ordered by number of referred users, most first.
    pub fn leaderboard(&self) -> Vec<(UserId, usize)> {
        let mut counts: HashMap<UserId, usize> = HashMap::new();
        for referrer in self.0.values() {
            *counts.entry(*referrer).or_default() += 1;
        }
        let mut board: Vec<_> = counts.into_iter().collect();
        board.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        board
    }
}

impl LedgerState {
    /// Credits the bonus to both users and records the edge. A user who
    /// already holds a balance entry counts as onboarded and cannot be
    /// referred.
    pub fn register_referral(
        &mut self,
        config: &LedgerConfig,
        new_user: UserId,
        referrer: UserId,
    ) -> Result<ReferralBonus> {
        if new_user == referrer {
            return Err(LedgerError::Validation("users cannot refer themselves".into()));
        }
        self.ensure_not_banned(new_user)?;
        if self.referrals.contains(new_user) {
            return Err(LedgerError::Duplicate(format!(
                "user {new_user} was already referred"
            )));
        }
        if self.balances.contains(new_user) {
            return Err(LedgerError::Duplicate(format!(
                "user {new_user} is already onboarded"
            )));
        }

        let bonus = config.referral_bonus;
        let referrer_balance = self.balances.credit(referrer, bonus, &config.limits)?;
        let referred_balance = self.balances.credit(new_user, bonus, &config.limits)?;
        self.referrals.record(new_user, referrer)?;

        info!(
            referrer = %referrer,
            referred = %new_user,
            bonus = %bonus,
            "🤝 Referral registered"
        );

        Ok(ReferralBonus {
            referred: new_user,
            referrer,
            bonus,
            referred_balance,
            referrer_balance,
        })
    }

    pub fn reset_referral(&mut self, user: UserId) -> ReferralReset {
        let outcome = self.referrals.reset(user);
        match outcome {
            ReferralReset::Reset { previous_referrer } => info!(
                user = %user,
                previous_referrer = %previous_referrer,
                "🔄 Referral reset"
            ),
            ReferralReset::NotReferred => info!(user = %user, "Referral reset skipped, no edge"),
        }
        outcome
    }
}
