pub mod cli;
pub mod config;
pub mod logging;
pub mod notify;

pub use cli::{execute, OperatorCommand};
pub use config::{LoggingConfig, NodeConfig, StorageConfig};
pub use notify::{spawn_pump, LogNotifier, Notifier};
