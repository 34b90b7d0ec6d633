use bounty_ledger::{
    Amount, FileStateStore, LedgerConfig, LedgerState, LoadSource, PersistenceError,
    RewardEngine, Section, StateStore, UserId, WithdrawalMethod, DEFAULT_SAVE_TIMEOUT,
};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn store_in(dir: &TempDir) -> FileStateStore {
    FileStateStore::open(
        dir.path().join("bounty_data.json"),
        dir.path().join("bounty_data_backup.json"),
    )
    .unwrap()
}

fn populated_state() -> LedgerState {
    let config = LedgerConfig::default();
    let mut state = LedgerState::default();
    state
        .register_referral(&config, UserId::new(100), UserId::new(200))
        .unwrap();
    state
        .credit(&config, UserId::new(300), Amount::from_units(120))
        .unwrap();
    state.ban(&config, UserId::new(666)).unwrap();
    state
        .add_task(Section::WatchAds, "Watch ad - https://x.test ₹5")
        .unwrap();
    state.add_task(Section::AppDownloads, "Install app").unwrap();
    state
        .complete_task(&config, UserId::new(100), Section::WatchAds, 0)
        .unwrap();
    state
        .complete_task(&config, UserId::new(100), Section::AppDownloads, 0)
        .unwrap();
    let client = state
        .create_client_task("Acme", &["https://a.test".to_string()])
        .unwrap();
    state
        .record_client_referral(&client.client_id, UserId::new(100), "Asha", "link1")
        .unwrap();
    let task = state.tasks.section(Section::WatchAds)[0].id;
    state
        .record_task_engagement(UserId::new(300), "Ravi", Section::WatchAds, task, "video")
        .unwrap();
    state
        .request_withdrawal(
            &config,
            UserId::new(300),
            WithdrawalMethod::Upi,
            "ravi@upi",
            Amount::from_units(20),
        )
        .unwrap();
    state
}

#[test]
fn test_save_load_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    let state = populated_state();

    let report = store.save(&state).unwrap();
    assert_eq!(report.accounts, 3);

    let (loaded, source) = store.load_with_source();
    assert_eq!(source, LoadSource::Primary);
    assert_eq!(loaded, state);
}

#[test]
fn test_document_layout() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    store.save(&populated_state()).unwrap();

    let doc: serde_json::Value =
        serde_json::from_slice(&fs::read(store.primary_path()).unwrap()).unwrap();
    assert_eq!(doc["version"], 1);
    assert_eq!(doc["integrity_check"], 3);
    for key in [
        "balances",
        "referrals",
        "banned",
        "tasks",
        "clients",
        "withdrawals",
        "tracking",
    ] {
        assert!(doc["state"].get(key).is_some(), "missing {key}");
    }
    assert_eq!(doc["state"]["balances"]["300"], 10000);
}

#[test]
fn test_corrupt_primary_falls_back_to_backup() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);

    let first = populated_state();
    store.save(&first).unwrap();
    let mut second = first.clone();
    second
        .credit(&LedgerConfig::default(), UserId::new(400), Amount::from_units(1))
        .unwrap();
    store.save(&second).unwrap();

    fs::write(store.primary_path(), b"{\"version\": 1, \"state\": ").unwrap();

    let (loaded, source) = store.load_with_source();
    assert_eq!(source, LoadSource::Backup);
    assert_eq!(loaded, first);
}

#[test]
fn test_both_files_corrupt_loads_default() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    fs::write(store.primary_path(), b"not json").unwrap();
    fs::write(store.backup_path(), b"[]").unwrap();

    let (loaded, source) = store.load_with_source();
    assert_eq!(source, LoadSource::Default);
    assert_eq!(loaded, LedgerState::default());
}

#[test]
fn test_missing_files_load_default() {
    let dir = TempDir::new().unwrap();
    let (loaded, source) = store_in(&dir).load_with_source();
    assert_eq!(source, LoadSource::Default);
    assert!(loaded.balances.is_empty());
}

#[test]
fn test_failed_save_leaves_primary_intact() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    let state = populated_state();
    store.save(&state).unwrap();
    let before = fs::read(store.primary_path()).unwrap();

    // A directory where the temporary file should go blocks the write.
    fs::create_dir(store.temp_path()).unwrap();

    let mut changed = state.clone();
    changed
        .credit(&LedgerConfig::default(), UserId::new(999), Amount::from_units(1))
        .unwrap();
    let err = store.save(&changed).unwrap_err();
    assert!(matches!(err, PersistenceError::Io(_)));

    assert_eq!(fs::read(store.primary_path()).unwrap(), before);
    assert_eq!(store.load(), state);
}

#[test]
fn test_unreadable_primary_never_replaces_backup() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);

    let first = populated_state();
    store.save(&first).unwrap();
    store.save(&first).unwrap();
    fs::write(store.primary_path(), b"garbage").unwrap();
    assert_eq!(store.load_with_source().1, LoadSource::Backup);

    // The next save fails after its backup rotation would have run.
    fs::create_dir(store.temp_path()).unwrap();
    assert!(store.save(&first).is_err());

    let (loaded, source) = store.load_with_source();
    assert_eq!(source, LoadSource::Primary);
    assert_eq!(loaded, first);
    // The primary was restored from the untouched backup.
    assert_eq!(
        fs::read(store.backup_path()).unwrap(),
        fs::read(store.primary_path()).unwrap()
    );
}

#[test]
fn test_second_writer_is_refused() {
    let dir = TempDir::new().unwrap();
    let first = store_in(&dir);

    let err = FileStateStore::open(first.primary_path(), first.backup_path())
        .err()
        .unwrap();
    assert!(matches!(err, PersistenceError::Locked(_)));
    assert!(err.to_string().contains("bounty_data.json"));

    drop(first);
    let second = store_in(&dir);
    second.save(&populated_state()).unwrap();
}

#[tokio::test]
async fn test_locked_store_keeps_running_engine_authoritative() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn StateStore> = Arc::new(store_in(&dir));
    let daemon = RewardEngine::open(LedgerConfig::default(), store, DEFAULT_SAVE_TIMEOUT);
    daemon.credit(UserId::new(5), 10.0).await.unwrap();

    // A one-shot command cannot open the same file behind the daemon's back.
    assert!(FileStateStore::open(
        dir.path().join("bounty_data.json"),
        dir.path().join("bounty_data_backup.json"),
    )
    .is_err());

    daemon.persist().await.unwrap();
    assert_eq!(daemon.balance(UserId::new(5)).await, Amount::from_units(10));
}

#[test]
fn test_old_document_without_sections_loads() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    fs::write(
        store.primary_path(),
        br#"{"version": 1, "saved_at": "2026-01-01T00:00:00Z", "integrity_check": 1,
            "state": {"balances": {"42": 500}}}"#,
    )
    .unwrap();

    let (loaded, source) = store.load_with_source();
    assert_eq!(source, LoadSource::Primary);
    assert_eq!(loaded.balances.get(UserId::new(42)), Amount::from_units(5));
    assert!(loaded.tasks.is_empty());
    assert!(loaded.clients.is_empty());
}

#[tokio::test]
async fn test_engine_survives_restart() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn StateStore> = Arc::new(store_in(&dir));

    {
        let engine = RewardEngine::open(LedgerConfig::default(), store.clone(), DEFAULT_SAVE_TIMEOUT);
        engine.register_referral(UserId::new(100), UserId::new(200)).await.unwrap();
        engine.add_task(Section::Promotional, "Share ₹2").await.unwrap();
        engine.allocate_client_id().await;
    }

    let engine = RewardEngine::open(LedgerConfig::default(), store, DEFAULT_SAVE_TIMEOUT);
    assert_eq!(engine.balance(UserId::new(200)).await, Amount::from_units(5));
    assert_eq!(engine.tasks(Section::Promotional).await.len(), 1);

    // The client sequence continues after a restart.
    let next = engine.allocate_client_id().await;
    assert!(next.as_str().ends_with("002"));

    // A referred user cannot be onboarded again after a restart.
    assert!(engine
        .register_referral(UserId::new(100), UserId::new(300))
        .await
        .is_err());
}
