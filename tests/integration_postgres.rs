//! PostgreSQL Integration Tests
//!
//! Run the ledger against a real database. Skipped when `DATABASE_URL` is
//! not set. Every test creates its own uniquely named accounts so tests can
//! share one database and run in parallel.

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;

use coin_shop::domain::{Balance, Catalog, LedgerError, NewAccount, RecordKind};
use coin_shop::jobs::reconcile_balances;
use coin_shop::ledger::{HistoryService, LedgerEngine, PurchaseCommand, TransferCommand};
use coin_shop::store::{AccountStore, LedgerStore, PgStore, StoreError};

mod common;

use common::{app_with, login, send, try_pg_store, unique_name};

async fn open_account(store: &PgStore, prefix: &str, coins: i64) -> coin_shop::domain::Account {
    store
        .create_account(NewAccount::new(
            unique_name(prefix),
            String::new(),
            Balance::new(coins).unwrap(),
        ))
        .await
        .unwrap()
}

fn engine_over(store: &Arc<PgStore>) -> LedgerEngine {
    LedgerEngine::new(store.clone(), Arc::new(Catalog::merch()))
}

#[tokio::test]
async fn test_duplicate_username_is_conflict() {
    let Some(store) = try_pg_store().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let name = unique_name("dup");
    let first = NewAccount::new(name.clone(), String::new(), Balance::new(10).unwrap());
    let second = NewAccount::new(name, String::new(), Balance::new(10).unwrap());

    store.create_account(first).await.unwrap();
    let err = store.create_account(second).await.unwrap_err();
    assert!(err.is_conflict(), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_transfer_commits_balances_and_record() {
    let Some(store) = try_pg_store().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let engine = engine_over(&store);

    let alice = open_account(&store, "alice", 1000).await;
    let bob = open_account(&store, "bob", 1000).await;

    let record = engine
        .transfer(TransferCommand::new(alice.id, bob.username.clone(), 500))
        .await
        .unwrap();

    assert_eq!(record.kind, RecordKind::Transfer);
    assert_eq!(store.get_balance(alice.id).await.unwrap().value(), 500);
    assert_eq!(store.get_balance(bob.id).await.unwrap().value(), 1500);

    let sent = store
        .records_for(alice.id, Some(RecordKind::Transfer))
        .await
        .unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to_account_id, Some(bob.id));
    assert_eq!(sent[0].amount.value(), 500);
}

#[tokio::test]
async fn test_rejected_transfer_leaves_no_trace() {
    let Some(store) = try_pg_store().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let engine = engine_over(&store);

    let alice = open_account(&store, "alice", 100).await;
    let bob = open_account(&store, "bob", 0).await;

    let err = engine
        .transfer(TransferCommand::new(alice.id, bob.username.clone(), 101))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

    assert_eq!(store.get_balance(alice.id).await.unwrap().value(), 100);
    assert_eq!(store.get_balance(bob.id).await.unwrap().value(), 0);
    assert!(store.records_for(alice.id, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_uncommitted_unit_is_rolled_back() {
    let Some(store) = try_pg_store().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let alice = open_account(&store, "alice", 300).await;

    let mut unit = store.begin(&[alice.id]).await.unwrap();
    assert_eq!(unit.adjust_balance(alice.id, -100).await.unwrap().value(), 200);
    unit.rollback().await.unwrap();

    assert_eq!(store.get_balance(alice.id).await.unwrap().value(), 300);
}

#[tokio::test]
async fn test_begin_with_missing_account_fails() {
    let Some(store) = try_pg_store().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let alice = open_account(&store, "alice", 300).await;
    let ghost = uuid::Uuid::new_v4();

    let result = store.begin(&[alice.id, ghost]).await;
    assert!(matches!(result, Err(StoreError::NotFound { .. })));
}

#[tokio::test]
async fn test_owned_items_empty_vs_unknown_account() {
    let Some(store) = try_pg_store().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let alice = open_account(&store, "alice", 100).await;
    assert!(store.owned_items(alice.id).await.unwrap().is_empty());

    let result = store.owned_items(uuid::Uuid::new_v4()).await;
    assert!(matches!(result, Err(StoreError::NotFound { .. })));
}

#[tokio::test]
async fn test_purchase_and_history() {
    let Some(store) = try_pg_store().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let engine = engine_over(&store);
    let history = HistoryService::new(store.clone(), Arc::new(Catalog::merch()));

    let alice = open_account(&store, "alice", 1000).await;
    let bob = open_account(&store, "bob", 1000).await;

    engine
        .purchase(PurchaseCommand::new(alice.id, "cup"))
        .await
        .unwrap();
    engine
        .purchase(PurchaseCommand::new(alice.id, "cup"))
        .await
        .unwrap();
    engine
        .transfer(TransferCommand::new(bob.id, alice.username.clone(), 30))
        .await
        .unwrap();
    engine
        .transfer(TransferCommand::new(alice.id, bob.username.clone(), 70))
        .await
        .unwrap();

    let view = history.user_view(alice.id).await.unwrap();
    assert_eq!(view.balance.value(), 1000 - 40 + 30 - 70);
    assert_eq!(view.inventory.len(), 1);
    assert_eq!(view.inventory[0].name, "cup");
    assert_eq!(view.inventory[0].quantity, 2);
    assert_eq!(view.received.len(), 1);
    assert_eq!(view.received[0].counterparty, bob.username);
    assert_eq!(view.received[0].amount, 30);
    assert_eq!(view.sent.len(), 1);
    assert_eq!(view.sent[0].counterparty, bob.username);
    assert_eq!(view.sent[0].amount, 70);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_withdrawals_never_overdraw() {
    let Some(store) = try_pg_store().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let engine = engine_over(&store);

    let alice = open_account(&store, "alice", 1000).await;
    let bob = open_account(&store, "bob", 0).await;

    let mut handles = Vec::new();
    for _ in 0..60 {
        let engine = engine.clone();
        let to = bob.username.clone();
        let from = alice.id;
        handles.push(tokio::spawn(async move {
            engine.transfer(TransferCommand::new(from, to, 20)).await
        }));
    }

    let mut ok = 0;
    let mut insufficient = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(LedgerError::InsufficientFunds { .. }) => insufficient += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(ok, 50);
    assert_eq!(insufficient, 10);
    assert_eq!(store.get_balance(alice.id).await.unwrap().value(), 0);
    assert_eq!(store.get_balance(bob.id).await.unwrap().value(), 1000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposing_transfers_do_not_deadlock() {
    let Some(store) = try_pg_store().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let engine = engine_over(&store);

    let alice = open_account(&store, "alice", 1000).await;
    let bob = open_account(&store, "bob", 1000).await;

    let mut handles = Vec::new();
    for i in 0..100 {
        let engine = engine.clone();
        let (from, to) = if i % 2 == 0 {
            (alice.id, bob.username.clone())
        } else {
            (bob.id, alice.username.clone())
        };
        handles.push(tokio::spawn(async move {
            engine.transfer(TransferCommand::new(from, to, 7)).await
        }));
    }

    let all = join_all(handles);
    tokio::time::timeout(std::time::Duration::from_secs(30), all)
        .await
        .expect("transfers deadlocked");

    let total = store.get_balance(alice.id).await.unwrap().value()
        + store.get_balance(bob.id).await.unwrap().value();
    assert_eq!(total, 2000);

    let report = reconcile_balances(store.as_ref()).await.unwrap();
    assert!(
        report
            .discrepancies
            .iter()
            .all(|d| d.account_id != alice.id && d.account_id != bob.id),
        "ledger disagrees with balances: {:?}",
        report.discrepancies
    );
}

async fn join_all<T>(handles: Vec<tokio::task::JoinHandle<T>>) {
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn test_api_over_postgres() {
    let Some(store) = try_pg_store().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let app = app_with(store);

    let alice_name = unique_name("alice");
    let bob_name = unique_name("bob");
    let alice = login(&app, &alice_name, "password1").await;
    let bob = login(&app, &bob_name, "password2").await;

    // Same credentials log in again without provisioning twice
    login(&app, &alice_name, "password1").await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/sendCoin",
        Some(&alice),
        Some(json!({ "toUser": bob_name, "amount": 250 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "GET", "/api/buy/hoody", Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, info) = send(&app, "GET", "/api/info", Some(&bob), None).await;
    assert_eq!(info["coins"], 1000 + 250 - 300);
    assert_eq!(info["inventory"], json!([{ "type": "hoody", "quantity": 1 }]));
    assert_eq!(
        info["coinHistory"]["received"],
        json!([{ "fromUser": alice_name, "amount": 250 }])
    );
}
