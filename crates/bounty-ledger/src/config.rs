use crate::balance::AmountLimits;
use crate::links::LinkConfig;
use crate::types::{Amount, UserId};
use crate::withdrawal::WithdrawalPolicy;
use serde::{Deserialize, Serialize};

/// Engine-level settings. Embedded as the `[ledger]` table of the node config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// The operator account; never bannable.
    pub operator_id: UserId,
    #[serde(with = "decimal")]
    pub referral_bonus: Amount,
    /// Task rewards at or above this are credited on completion.
    #[serde(with = "decimal")]
    pub auto_credit_threshold: Amount,
    pub limits: AmountLimits,
    pub withdrawal: WithdrawalPolicy,
    pub links: LinkConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            operator_id: UserId::new(1),
            referral_bonus: Amount::from_units(5),
            auto_credit_threshold: Amount::from_cents(10),
            limits: AmountLimits::default(),
            withdrawal: WithdrawalPolicy::default(),
            links: LinkConfig::default(),
        }
    }
}

/// Amounts appear as plain decimals (`5.0`) in config files.
pub(crate) mod decimal {
    use crate::types::Amount;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(amount.to_decimal())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let value = f64::deserialize(deserializer)?;
        if !value.is_finite() || value < 0.0 {
            return Err(D::Error::custom(format!("invalid amount: {value}")));
        }
        Ok(Amount::from_decimal(value))
    }
}
