use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::state::LedgerState;
use crate::types::{Amount, UserId, WithdrawalMethod};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
}

impl WithdrawalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WithdrawalStatus::Pending)
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Approved => "approved",
            WithdrawalStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Fee schedule and minimums for payouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WithdrawalPolicy {
    /// Local units debited per requested USD.
    #[serde(with = "crate::config::decimal")]
    pub usd_rate: Amount,
    pub paypal_tax_bps: u32,
    pub fee_bps: u32,
    #[serde(with = "crate::config::decimal")]
    pub min_local: Amount,
    #[serde(with = "crate::config::decimal")]
    pub min_usd: Amount,
}

impl Default for WithdrawalPolicy {
    fn default() -> Self {
        Self {
            usd_rate: Amount::from_units(83),
            paypal_tax_bps: 700,
            fee_bps: 200,
            min_local: Amount::from_units(15),
            min_usd: Amount::from_units(2),
        }
    }
}

/// Amounts for one payout. `requested`, `fee` and `final_amount` are in the
/// method's unit (USD for PayPal); `debited` is always in the balance unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawalQuote {
    pub requested: Amount,
    pub debited: Amount,
    pub fee: Amount,
    pub final_amount: Amount,
}

impl WithdrawalPolicy {
    pub fn minimum(&self, method: WithdrawalMethod) -> Amount {
        if method.is_usd() {
            self.min_usd
        } else {
            self.min_local
        }
    }

    pub fn quote(&self, method: WithdrawalMethod, requested: Amount) -> WithdrawalQuote {
        let (debited, bps) = if method.is_usd() {
            (requested.convert(self.usd_rate), self.paypal_tax_bps)
        } else {
            (requested, self.fee_bps)
        };
        let fee = requested.basis_points(bps);
        WithdrawalQuote {
            requested,
            debited,
            fee,
            final_amount: requested.saturating_sub(fee),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub method: WithdrawalMethod,
    pub payout_id: String,
    pub requested: Amount,
    pub debited: Amount,
    pub fee: Amount,
    pub final_amount: Amount,
    pub requested_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    pub status: WithdrawalStatus,
}

impl WithdrawalRequest {
    fn transition(&mut self, to: WithdrawalStatus) -> Result<()> {
        if self.status.is_terminal() {
            return Err(LedgerError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.resolved_at = Some(Utc::now());
        Ok(())
    }
}

/// One live record per user; a resolved record is replaced by the next request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WithdrawalBook(BTreeMap<UserId, WithdrawalRequest>);

impl WithdrawalBook {
    pub fn get(&self, user: UserId) -> Option<&WithdrawalRequest> {
        self.0.get(&user)
    }

    pub fn pending(&self) -> impl Iterator<Item = (UserId, &WithdrawalRequest)> + '_ {
        self.0
            .iter()
            .filter(|(_, r)| r.status == WithdrawalStatus::Pending)
            .map(|(u, r)| (*u, r))
    }

    pub fn pending_count(&self) -> usize {
        self.pending().count()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn record_mut(&mut self, user: UserId) -> Result<&mut WithdrawalRequest> {
        self.0
            .get_mut(&user)
            .ok_or_else(|| LedgerError::NotFound(format!("no withdrawal request for user {user}")))
    }
}

impl LedgerState {
    pub fn request_withdrawal(
        &mut self,
        config: &LedgerConfig,
        user: UserId,
        method: WithdrawalMethod,
        payout_id: &str,
        requested: Amount,
    ) -> Result<WithdrawalRequest> {
        self.ensure_not_banned(user)?;

        let payout_id = payout_id.trim();
        if payout_id.is_empty() {
            return Err(LedgerError::Validation("payout id cannot be empty".into()));
        }
        if self
            .withdrawals
            .get(user)
            .is_some_and(|r| r.status == WithdrawalStatus::Pending)
        {
            return Err(LedgerError::WithdrawalPending(user));
        }

        let policy = &config.withdrawal;
        let minimum = policy.minimum(method);
        if requested < minimum {
            return Err(LedgerError::Validation(format!(
                "minimum {} withdrawal is {}",
                method.display_name(),
                minimum
            )));
        }

        let quote = policy.quote(method, requested);
        let remaining = self.balances.withdraw(user, quote.debited)?;

        let request = WithdrawalRequest {
            method,
            payout_id: payout_id.to_string(),
            requested: quote.requested,
            debited: quote.debited,
            fee: quote.fee,
            final_amount: quote.final_amount,
            requested_at: Utc::now(),
            resolved_at: None,
            status: WithdrawalStatus::Pending,
        };
        self.withdrawals.0.insert(user, request.clone());

        info!(
            user = %user,
            method = %method,
            requested = %quote.requested,
            debited = %quote.debited,
            fee = %quote.fee,
            final_amount = %quote.final_amount,
            balance_after = %remaining,
            "🏧 Withdrawal requested"
        );
        Ok(request)
    }

    pub fn approve_withdrawal(&mut self, user: UserId) -> Result<WithdrawalRequest> {
        let request = self.withdrawals.record_mut(user)?;
        request.transition(WithdrawalStatus::Approved)?;

        info!(
            user = %user,
            method = %request.method,
            final_amount = %request.final_amount,
            "✅ Withdrawal approved"
        );
        Ok(request.clone())
    }

    /// Rejects a pending request and refunds exactly what was debited.
    pub fn reject_withdrawal(&mut self, user: UserId) -> Result<(WithdrawalRequest, Amount)> {
        let request = self.withdrawals.record_mut(user)?;
        request.transition(WithdrawalStatus::Rejected)?;
        let request = request.clone();

        let balance = self.balances.refund(user, request.debited);
        warn!(
            user = %user,
            refunded = %request.debited,
            balance_after = %balance,
            "❌ Withdrawal rejected, amount refunded"
        );
        Ok((request, balance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funded(user: UserId, units: u64) -> (LedgerConfig, LedgerState) {
        let config = LedgerConfig::default();
        let mut state = LedgerState::default();
        state
            .balances
            .credit(user, Amount::from_units(units), &config.limits)
            .unwrap();
        (config, state)
    }

    #[test]
    fn test_local_quote() {
        let policy = WithdrawalPolicy::default();
        let quote = policy.quote(WithdrawalMethod::Upi, Amount::from_units(50));
        assert_eq!(quote.debited, Amount::from_units(50));
        assert_eq!(quote.fee, Amount::from_units(1));
        assert_eq!(quote.final_amount, Amount::from_units(49));
    }

    #[test]
    fn test_paypal_quote() {
        let policy = WithdrawalPolicy::default();
        let quote = policy.quote(WithdrawalMethod::PayPal, Amount::from_units(2));
        assert_eq!(quote.debited, Amount::from_units(166));
        assert_eq!(quote.fee, Amount::from_cents(14));
        assert_eq!(quote.final_amount, Amount::from_cents(186));
    }

    #[test]
    fn test_minimum_boundary() {
        let user = UserId::new(7);
        let (config, mut state) = funded(user, 100);

        let below = state.request_withdrawal(
            &config,
            user,
            WithdrawalMethod::AmazonPay,
            "a@b.c",
            Amount::from_cents(1499),
        );
        assert!(matches!(below, Err(LedgerError::Validation(_))));
        assert_eq!(state.balances.get(user), Amount::from_units(100));

        let exact = state
            .request_withdrawal(
                &config,
                user,
                WithdrawalMethod::AmazonPay,
                "a@b.c",
                Amount::from_units(15),
            )
            .unwrap();
        assert_eq!(exact.status, WithdrawalStatus::Pending);
        assert_eq!(state.balances.get(user), Amount::from_units(85));
    }

    #[test]
    fn test_second_request_while_pending() {
        let user = UserId::new(7);
        let (config, mut state) = funded(user, 100);
        state
            .request_withdrawal(&config, user, WithdrawalMethod::Upi, "x@upi", Amount::from_units(20))
            .unwrap();

        let err = state
            .request_withdrawal(&config, user, WithdrawalMethod::Upi, "x@upi", Amount::from_units(20))
            .unwrap_err();
        assert_eq!(err, LedgerError::WithdrawalPending(user));

        state.approve_withdrawal(user).unwrap();
        // A resolved record is replaced by the next request.
        state
            .request_withdrawal(&config, user, WithdrawalMethod::Upi, "x@upi", Amount::from_units(20))
            .unwrap();
        assert_eq!(state.balances.get(user), Amount::from_units(60));
    }

    #[test]
    fn test_insufficient_balance_does_not_debit() {
        let user = UserId::new(7);
        let (config, mut state) = funded(user, 100);

        let err = state
            .request_withdrawal(&config, user, WithdrawalMethod::PayPal, "p@p.com", Amount::from_units(2))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(state.balances.get(user), Amount::from_units(100));
        assert!(state.withdrawals.is_empty());
    }

    #[test]
    fn test_reject_refunds_and_is_terminal() {
        let user = UserId::new(7);
        let (config, mut state) = funded(user, 100);
        state
            .request_withdrawal(&config, user, WithdrawalMethod::Upi, "x@upi", Amount::from_units(50))
            .unwrap();

        let (record, balance) = state.reject_withdrawal(user).unwrap();
        assert_eq!(record.status, WithdrawalStatus::Rejected);
        assert!(record.resolved_at.is_some());
        assert_eq!(balance, Amount::from_units(100));

        assert_eq!(
            state.approve_withdrawal(user).unwrap_err(),
            LedgerError::InvalidTransition {
                from: WithdrawalStatus::Rejected,
                to: WithdrawalStatus::Approved
            }
        );
        assert!(matches!(
            state.reject_withdrawal(UserId::new(99)),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn test_empty_payout_id() {
        let user = UserId::new(7);
        let (config, mut state) = funded(user, 100);
        assert!(matches!(
            state.request_withdrawal(&config, user, WithdrawalMethod::Upi, "  ", Amount::from_units(20)),
            Err(LedgerError::Validation(_))
        ));
    }
}
