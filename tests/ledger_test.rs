use battlestream::config::Config;
use battlestream::db::init_db;
use battlestream::domain::{AccountKind, NewEntry, Song};
use battlestream::{
    AccountId, BattleEngine, BattleSpec, EngineError, EntryReason, ManualClock, Repository,
    SongId, TimeMs,
};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

async fn setup_engine() -> (BattleEngine, Arc<ManualClock>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();

    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));

    let mut env = HashMap::new();
    env.insert("DATABASE_PATH".to_string(), db_path);
    env.insert("SIGNUP_BONUS".to_string(), "50".to_string());
    let config = Config::from_env_map(env).unwrap();

    let clock = Arc::new(ManualClock::new(TimeMs::new(1_700_000_000_000)));
    let engine = BattleEngine::bootstrap(repo, config, clock.clone())
        .await
        .expect("engine bootstrap failed");
    (engine, clock, temp_dir)
}

#[tokio::test]
async fn test_concurrent_debits_never_overdraw() {
    let (engine, _clock, _temp) = setup_engine().await;
    let artist = AccountId::new("artist-a");
    assert_ok!(engine.ledger.open_account(&artist, AccountKind::Artist).await);
    assert_ok!(engine.ledger.top_up(&artist, 100).await);

    let results = join_all((0..25).map(|_| {
        engine
            .ledger
            .append(NewEntry::debit(artist.clone(), 10, EntryReason::EntryFee))
    }))
    .await;

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let refused = results
        .iter()
        .filter(|r| matches!(r, Err(EngineError::InsufficientFunds { .. })))
        .count();
    assert_eq!(succeeded, 10);
    assert_eq!(refused, 15);

    assert_eq!(engine.ledger.balance_of(&artist).await.unwrap(), 0);
    assert_eq!(engine.ledger.folded_balance(&artist).await.unwrap(), 0);
}

#[tokio::test]
async fn test_balance_is_fold_of_entries() {
    let (engine, _clock, _temp) = setup_engine().await;
    let fan = AccountId::new("fan-1");
    let account = assert_ok!(engine.ledger.open_account(&fan, AccountKind::Listener).await);
    assert_eq!(account.balance, 50);

    assert_ok!(engine.ledger.top_up(&fan, 30).await);
    assert_ok!(
        engine
            .ledger
            .append(NewEntry::debit(fan.clone(), 70, EntryReason::EntryFee))
            .await
    );
    assert_err!(
        engine
            .ledger
            .append(NewEntry::debit(fan.clone(), 11, EntryReason::EntryFee))
            .await
    );

    let entries = engine.ledger.entries(&fan, 100).await.unwrap();
    let fold: i64 = entries.iter().map(|e| e.amount).sum();
    assert_eq!(entries.len(), 3);
    assert_eq!(fold, 10);
    assert_eq!(engine.ledger.balance_of(&fan).await.unwrap(), fold);
    assert_eq!(engine.ledger.folded_balance(&fan).await.unwrap(), fold);

    // newest first
    assert_eq!(entries[0].reason, EntryReason::EntryFee);
    assert_eq!(entries[2].reason, EntryReason::SignupBonus);
}

#[tokio::test]
async fn test_malformed_entries_are_rejected() {
    let (engine, _clock, _temp) = setup_engine().await;
    let fan = AccountId::new("fan-1");
    assert_ok!(engine.ledger.open_account(&fan, AccountKind::Listener).await);

    // a refund with a negative amount is not a credit
    let bad = NewEntry::credit(fan.clone(), -5, EntryReason::Refund);
    assert!(matches!(
        engine.ledger.append(bad).await,
        Err(EngineError::InvalidSpec(_))
    ));
    let zero = NewEntry::credit(fan.clone(), 0, EntryReason::TopUp);
    assert_err!(engine.ledger.append(zero).await);
    assert_eq!(engine.ledger.balance_of(&fan).await.unwrap(), 50);
}

#[tokio::test]
async fn test_settlement_is_idempotent_in_the_ledger() {
    let (engine, clock, _temp) = setup_engine().await;
    let a = AccountId::new("artist-a");
    let b = AccountId::new("artist-b");
    for artist in [&a, &b] {
        assert_ok!(engine.ledger.open_account(artist, AccountKind::Artist).await);
        assert_ok!(engine.ledger.top_up(artist, 500).await);
    }

    let spec = BattleSpec {
        name: "Rematch".to_string(),
        duration_secs: 30,
        entry_fee: 500,
        scheduled_at: None,
        songs: vec![Song {
            id: SongId::new("s1"),
            title: "Anthem".to_string(),
            artist_id: a.clone(),
            duration_secs: 200,
        }],
        team_name: None,
    };
    let battle = assert_ok!(engine.lifecycle.create(&a, spec).await);
    assert_ok!(engine.lifecycle.join(&battle.id, &b, Some("Visitors")).await);
    assert_ok!(engine.lifecycle.start(&battle.id).await);

    clock.advance_secs(30);
    let (first, second) = tokio::join!(
        engine.lifecycle.end(&battle.id),
        engine.lifecycle.end(&battle.id)
    );
    // exactly one completion wins; the other sees the terminal state
    assert!(first.is_ok() != second.is_ok());

    let once = assert_ok!(engine.settlement.settle(&battle.id).await);
    let twice = assert_ok!(engine.settlement.settle(&battle.id).await);
    assert_eq!(once, twice);
    assert_eq!(once.entries.len(), 3);

    let platform = engine.config.platform_account.clone();
    assert_eq!(engine.ledger.balance_of(&platform).await.unwrap(), 300);
    assert_eq!(engine.ledger.balance_of(&a).await.unwrap(), 350);
    assert_eq!(engine.ledger.balance_of(&b).await.unwrap(), 350);
    for account in [&a, &b, &platform] {
        assert_eq!(
            engine.ledger.balance_of(account).await.unwrap(),
            engine.ledger.folded_balance(account).await.unwrap()
        );
    }
}

#[tokio::test]
async fn test_cancel_scheduled_battle_refunds_creator_only() {
    let (engine, _clock, _temp) = setup_engine().await;
    let a = AccountId::new("artist-a");
    assert_ok!(engine.ledger.open_account(&a, AccountKind::Artist).await);
    assert_ok!(engine.ledger.top_up(&a, 250).await);

    let spec = BattleSpec {
        name: "Never Happened".to_string(),
        duration_secs: 30,
        entry_fee: 250,
        scheduled_at: Some(TimeMs::new(1_800_000_000_000)),
        songs: vec![Song {
            id: SongId::new("s1"),
            title: "Anthem".to_string(),
            artist_id: a.clone(),
            duration_secs: 200,
        }],
        team_name: None,
    };
    let battle = assert_ok!(engine.lifecycle.create(&a, spec).await);
    assert_eq!(engine.ledger.balance_of(&a).await.unwrap(), 0);

    let cancelled = assert_ok!(engine.lifecycle.cancel(&battle.id, None).await);
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("cancelled"));
    assert_eq!(engine.ledger.balance_of(&a).await.unwrap(), 250);

    // a second cancel is illegal and refunds nothing more
    assert_err!(engine.lifecycle.cancel(&battle.id, None).await);
    assert_eq!(engine.ledger.balance_of(&a).await.unwrap(), 250);
}
