use crate::error::LedgerError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const AMOUNT_DECIMALS: u32 = 2;
pub const CENTS_PER_UNIT: u64 = 100; // 10^2

/// Monetary amount in hundredths of the currency unit.
///
/// Balances are unsigned, so a negative balance is unrepresentable. Rates and
/// percentages are applied with half-up rounding to the nearest hundredth.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Self = Self(0);

    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    pub const fn from_units(units: u64) -> Self {
        Self(units.saturating_mul(CENTS_PER_UNIT))
    }

    /// Rounds to two decimal places. Non-finite and non-positive inputs map
    /// to zero; use [`crate::AmountLimits::validate`] at entry points.
    pub fn from_decimal(value: f64) -> Self {
        if !value.is_finite() || value <= 0.0 {
            return Self::ZERO;
        }
        Self((value * CENTS_PER_UNIT as f64).round() as u64)
    }

    pub fn to_decimal(&self) -> f64 {
        self.0 as f64 / CENTS_PER_UNIT as f64
    }

    pub fn cents(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// `self × bps / 10_000`, e.g. 200 bps is 2%.
    pub fn basis_points(&self, bps: u32) -> Self {
        let scaled = (self.0 as u128 * bps as u128 + 5_000) / 10_000;
        Self(u64::try_from(scaled).unwrap_or(u64::MAX))
    }

    /// Converts into another unit at `rate` target units per source unit.
    pub fn convert(&self, rate: Amount) -> Self {
        let scaled = (self.0 as u128 * rate.0 as u128 + 50) / CENTS_PER_UNIT as u128;
        Self(u64::try_from(scaled).unwrap_or(u64::MAX))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:02}",
            self.0 / CENTS_PER_UNIT,
            self.0 % CENTS_PER_UNIT
        )
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, a| acc.saturating_add(a))
    }
}

/// Chat-platform user identity. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(u64);

impl UserId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id: u64 = s
            .trim()
            .parse()
            .map_err(|_| LedgerError::Validation(format!("invalid user id format: {s}")))?;
        if id == 0 {
            return Err(LedgerError::Validation("invalid user id: 0".into()));
        }
        Ok(Self(id))
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// The three task sections. Every section is once-per-user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    WatchAds,
    AppDownloads,
    Promotional,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::WatchAds, Section::AppDownloads, Section::Promotional];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::WatchAds => "watch_ads",
            Section::AppDownloads => "app_downloads",
            Section::Promotional => "promotional",
        }
    }

    /// Short alias used inside tracking-link payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Section::WatchAds => "watchads",
            Section::AppDownloads => "appdownload",
            Section::Promotional => "promo",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Section::WatchAds => "Watch Ads",
            Section::AppDownloads => "App Downloads",
            Section::Promotional => "Promotional",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Section {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "watch" | "watch_ads" | "watchads" | "watch-ads" => Ok(Section::WatchAds),
            "app" | "app_downloads" | "appdownload" | "app-download" | "app-downloads" => {
                Ok(Section::AppDownloads)
            }
            "promo" | "promotional" => Ok(Section::Promotional),
            other => Err(LedgerError::NotFound(format!("unknown task section: {other}"))),
        }
    }
}

/// Stable task identity, never reused after removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `<section>:<task id>`, the key of completion and tracking records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskKey {
    pub section: Section,
    pub task: TaskId,
}

impl TaskKey {
    pub fn new(section: Section, task: TaskId) -> Self {
        Self { section, task }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.section, self.task)
    }
}

impl FromStr for TaskKey {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (section, task) = s
            .split_once(':')
            .ok_or_else(|| LedgerError::Validation(format!("malformed task key: {s}")))?;
        let task = task
            .parse::<u64>()
            .map_err(|_| LedgerError::Validation(format!("malformed task key: {s}")))?;
        Ok(Self::new(section.parse()?, TaskId::new(task)))
    }
}

impl TryFrom<String> for TaskKey {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TaskKey> for String {
    fn from(key: TaskKey) -> Self {
        key.to_string()
    }
}

/// Date-sequenced client identifier, e.g. `C20261019001`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// `C` + `YYYYMMDD` + the sequence zero-padded to three digits.
    pub fn dated(date: NaiveDate, sequence: u64) -> Self {
        Self(format!("C{}{:03}", date.format("%Y%m%d"), sequence))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ClientId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(LedgerError::Validation(format!("malformed client id: {s}")));
        }
        Ok(Self(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalMethod {
    Upi,
    #[serde(rename = "amazon")]
    AmazonPay,
    GooglePlay,
    PayPal,
}

impl WithdrawalMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalMethod::Upi => "upi",
            WithdrawalMethod::AmazonPay => "amazon",
            WithdrawalMethod::GooglePlay => "googleplay",
            WithdrawalMethod::PayPal => "paypal",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            WithdrawalMethod::Upi => "UPI",
            WithdrawalMethod::AmazonPay => "Amazon Pay",
            WithdrawalMethod::GooglePlay => "Google Play Gift Card",
            WithdrawalMethod::PayPal => "PayPal",
        }
    }

    /// PayPal amounts are requested in USD; everything else in the balance unit.
    pub fn is_usd(&self) -> bool {
        matches!(self, WithdrawalMethod::PayPal)
    }
}

impl fmt::Display for WithdrawalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WithdrawalMethod {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upi" => Ok(WithdrawalMethod::Upi),
            "amazon" | "amazonpay" | "amazon_pay" => Ok(WithdrawalMethod::AmazonPay),
            "googleplay" | "google_play" | "play" => Ok(WithdrawalMethod::GooglePlay),
            "paypal" => Ok(WithdrawalMethod::PayPal),
            other => Err(LedgerError::Validation(format!(
                "unknown withdrawal method: {other}"
            ))),
        }
    }
}
