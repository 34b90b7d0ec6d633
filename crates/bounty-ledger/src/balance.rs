use crate::error::{LedgerError, Result};
use crate::types::{Amount, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Bounds applied to every money-accepting entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountLimits {
    /// Largest single amount accepted by `validate`.
    #[serde(with = "crate::config::decimal")]
    pub max_amount: Amount,
    /// Ceiling no balance may exceed after a credit.
    #[serde(with = "crate::config::decimal")]
    pub max_balance: Amount,
}

impl Default for AmountLimits {
    fn default() -> Self {
        Self {
            max_amount: Amount::from_units(1_000_000),
            max_balance: Amount::from_units(100_000_000),
        }
    }
}

impl AmountLimits {
    /// Rejects non-finite, negative and oversized amounts, then rounds to
    /// two decimal places.
    pub fn validate(&self, value: f64) -> Result<Amount> {
        if !value.is_finite() {
            return Err(LedgerError::Validation("invalid amount format".into()));
        }
        if value < 0.0 {
            return Err(LedgerError::Validation("amount cannot be negative".into()));
        }
        let amount = Amount::from_decimal(value);
        if amount > self.max_amount {
            return Err(LedgerError::Validation(format!(
                "amount too large (max: {})",
                self.max_amount
            )));
        }
        Ok(amount)
    }

    pub fn parse(&self, raw: &str) -> Result<Amount> {
        let value: f64 = raw
            .trim()
            .parse()
            .map_err(|_| LedgerError::Validation(format!("invalid amount format: {raw}")))?;
        self.validate(value)
    }
}

/// Outcome of a floor-at-zero debit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Debit {
    pub removed: Amount,
    pub balance: Amount,
}

impl Debit {
    /// True when the balance was smaller than the requested amount.
    pub fn clamped(&self, requested: Amount) -> bool {
        self.removed < requested
    }
}

/// User → balance map. Accounts are created on first credit and never
/// deleted; a zeroed account keeps its entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balances(BTreeMap<UserId, Amount>);

impl Balances {
    pub fn get(&self, user: UserId) -> Amount {
        self.0.get(&user).copied().unwrap_or(Amount::ZERO)
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

    pub fn total(&self) -> Amount {
        self.0.values().copied().sum()
    }

    pub fn users(&self) -> impl Iterator<Item = UserId> + '_ {
        self.0.keys().copied()
    }

    pub fn credit(&mut self, user: UserId, amount: Amount, limits: &AmountLimits) -> Result<Amount> {
        let current = self.get(user);
        let new_balance = current
            .checked_add(amount)
            .filter(|b| *b <= limits.max_balance)
            .ok_or_else(|| {
                LedgerError::Validation(format!(
                    "balance for {} would exceed {}",
                    user, limits.max_balance
                ))
            })?;

        self.0.insert(user, new_balance);

        info!(
            user = %user,
            amount = %amount,
            balance_before = %current,
            balance_after = %new_balance,
            "💰 Balance credited"
        );
        Ok(new_balance)
    }

    /// Subtracts up to `amount`, clamping at zero. Unknown users are left
    /// without an account.
    pub fn debit(&mut self, user: UserId, amount: Amount) -> Debit {
        let Some(current) = self.0.get_mut(&user) else {
            debug!(user = %user, amount = %amount, "Debit on unknown account ignored");
            return Debit {
                removed: Amount::ZERO,
                balance: Amount::ZERO,
            };
        };

        let before = *current;
        *current = before.saturating_sub(amount);
        let debit = Debit {
            removed: before.saturating_sub(*current),
            balance: *current,
        };

        info!(
            user = %user,
            amount = %amount,
            balance_before = %before,
            balance_after = %debit.balance,
            clamped = debit.clamped(amount),
            "💸 Balance debited"
        );
        debit
    }

    /// Returns previously held funds. Not subject to the balance ceiling.
    pub fn refund(&mut self, user: UserId, amount: Amount) -> Amount {
        let entry = self.0.entry(user).or_insert(Amount::ZERO);
        let before = *entry;
        *entry = before.saturating_add(amount);

        info!(
            user = %user,
            amount = %amount,
            balance_before = %before,
            balance_after = %*entry,
            "↩️ Balance refunded"
        );
        *entry
    }

    /// Strict debit used by the withdrawal workflow.
    pub fn withdraw(&mut self, user: UserId, amount: Amount) -> Result<Amount> {
        let available = self.get(user);
        let remaining = available
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance {
                needed: amount,
                available,
            })?;
        self.0.insert(user, remaining);

        info!(
            user = %user,
            amount = %amount,
            balance_before = %available,
            balance_after = %remaining,
            "🔒 Withdrawal amount held"
        );
        Ok(remaining)
    }
}
