pub mod autosave;
pub mod balance;
pub mod clients;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod links;
pub mod referral;
pub mod state;
pub mod stats;
pub mod storage;
pub mod tasks;
pub mod tracking;
pub mod types;
pub mod withdrawal;

pub use autosave::{Autosave, DEFAULT_AUTOSAVE_INTERVAL};
pub use balance::{AmountLimits, Balances, Debit};
pub use clients::{ClientReferral, ClientTask, RemovedClient};
pub use config::LedgerConfig;
pub use engine::{LinkOutcome, RewardEngine, DEFAULT_SAVE_TIMEOUT};
pub use error::{LedgerError, Result};
pub use events::{EngineEvent, EventBus};
pub use links::{DeepLink, LinkBuilder, LinkConfig};
pub use referral::{ReferralBonus, ReferralReset};
pub use state::LedgerState;
pub use stats::LedgerStats;
pub use storage::{
    FileStateStore, LoadSource, MemoryStateStore, PersistenceError, SaveReport, StateStore,
};
pub use tasks::{CompletionStatus, PendingSubmission, Task, TaskCompletion, TaskKind};
pub use tracking::{EngagementOutcome, TaskEngagement};
pub use types::{Amount, ClientId, Section, TaskId, TaskKey, UserId, WithdrawalMethod};
pub use withdrawal::{WithdrawalPolicy, WithdrawalQuote, WithdrawalRequest, WithdrawalStatus};
