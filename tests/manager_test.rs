//! Wallet manager lifecycle against scripted providers: single-flight
//! updates, refresh throttling, pending reconciliation and the full
//! Cardano send pipeline.

mod common;

use std::sync::Arc;

use multiwallet::chains::TransferIntent;
use multiwallet::fee::Fee;
use multiwallet::{Amount, WalletError};

use common::{asset, cardano_manager, test_token, utxo, ScriptedCardano};

fn seeded_provider() -> Arc<ScriptedCardano> {
    let provider = Arc::new(ScriptedCardano::new("mock-cardano"));
    provider
        .utxos
        .lock()
        .expect("utxos lock")
        .push(utxo(&"aa".repeat(32), 10_000_000, vec![]));
    provider
        .hashes
        .lock()
        .expect("hashes lock")
        .push("11".repeat(32));
    provider
}

#[tokio::test]
async fn update_replaces_balances_wholesale() {
    common::init_logger();
    let provider = seeded_provider();
    let manager = cardano_manager(provider.clone(), vec![]);

    let summary = manager.update().await.expect("update");
    assert!(!summary.is_empty);
    let coin = summary
        .balances
        .iter()
        .find(|b| matches!(b.kind, multiwallet::AmountKind::Coin))
        .expect("coin balance");
    assert_eq!(coin.value, Some(10_000_000));

    let wallet = manager.wallet().await;
    assert_eq!(wallet.total_unspent_coin(), 10_000_000);
}

#[tokio::test]
async fn concurrent_updates_issue_network_calls_once() {
    common::init_logger();
    let provider = seeded_provider();
    let manager = cardano_manager(provider.clone(), vec![]);

    let (first, second) = tokio::join!(manager.update(), manager.update());
    let first = first.expect("first update");
    let second = second.expect("second update");

    // one refresh = protocol parameters + utxos + tx hashes
    assert_eq!(provider.call_count(), 3);
    assert_eq!(first.balances.len(), second.balances.len());
    assert_eq!(first.pending.len(), second.pending.len());
}

#[tokio::test]
async fn refresh_within_cooldown_serves_cached_state() {
    common::init_logger();
    let provider = seeded_provider();
    let manager = cardano_manager(provider.clone(), vec![]);

    manager.update().await.expect("first update");
    let after_first = provider.call_count();

    manager.update().await.expect("throttled update");
    assert_eq!(provider.call_count(), after_first);

    // clearing the throttle forces a real refresh
    manager.set_needs_update().await;
    manager.update().await.expect("forced update");
    assert_eq!(provider.call_count(), after_first * 2);
}

#[tokio::test]
async fn failed_refresh_surfaces_the_provider_error() {
    common::init_logger();
    let provider = Arc::new(ScriptedCardano::new("mock-cardano"));
    provider.fail.store(true, std::sync::atomic::Ordering::SeqCst);
    let manager = cardano_manager(provider.clone(), vec![]);

    let err = manager.update().await.expect_err("providers are down");
    assert!(matches!(err, WalletError::Network(_)));
    let text = err.to_string();
    assert!(text.contains("mock-cardano"), "error should name the provider: {}", text);
}

#[tokio::test]
async fn send_appends_pending_and_update_reconciles_it() {
    common::init_logger();
    let provider = seeded_provider();
    let manager = cardano_manager(provider.clone(), vec![]);
    manager.update().await.expect("update");

    let source = manager.wallet().await.default_address().to_string();
    let mut intent = TransferIntent {
        amount: Amount::coin(2_000_000, 6),
        fee: Fee::new(Amount::coin(0, 6)),
        source,
        destination: format!("61{}", "11".repeat(28)),
        change_address: None,
        contract_address: None,
        params: None,
    };
    let schedule = manager.estimate_fee(&intent).await.expect("fee");
    intent.fee = schedule.normal().clone();

    let pending = manager.send(intent).await.expect("send");
    assert_eq!(pending.hash, "cafe0123");
    assert_eq!(provider.submitted.lock().expect("submitted").len(), 1);
    assert_eq!(manager.summary().await.pending.len(), 1);

    // provider later reports the hash as confirmed (different casing)
    provider
        .hashes
        .lock()
        .expect("hashes lock")
        .push("CAFE0123".to_string());
    manager.set_needs_update().await;
    manager.update().await.expect("reconciling update");

    assert!(manager.summary().await.pending.is_empty());
}

#[tokio::test]
async fn send_with_token_spends_the_bundle_minimum() {
    common::init_logger();
    let token = test_token();
    let provider = Arc::new(ScriptedCardano::new("mock-cardano"));
    provider.utxos.lock().expect("utxos lock").push(utxo(
        &"aa".repeat(32),
        10_000_000,
        vec![asset(&token.contract_address, 50)],
    ));
    provider
        .hashes
        .lock()
        .expect("hashes lock")
        .push("11".repeat(32));

    let manager = cardano_manager(provider.clone(), vec![token.clone()]);
    manager.update().await.expect("update");

    let summary = manager.summary().await;
    let held = summary
        .balances
        .iter()
        .find(|b| b.as_token().is_some())
        .expect("token balance");
    assert_eq!(held.value, Some(50));

    let source = manager.wallet().await.default_address().to_string();
    let mut intent = TransferIntent {
        amount: Amount::token(token, 50),
        fee: Fee::new(Amount::coin(0, 6)),
        source,
        destination: format!("61{}", "11".repeat(28)),
        change_address: None,
        contract_address: None,
        params: None,
    };
    let schedule = manager.estimate_fee(&intent).await.expect("fee");
    intent.fee = schedule.normal().clone();

    let pending = manager.send(intent).await.expect("send");
    assert_eq!(pending.hash, "cafe0123");
}

#[tokio::test]
async fn validation_collects_every_violation() {
    common::init_logger();
    let provider = seeded_provider();
    let manager = cardano_manager(provider.clone(), vec![]);
    manager.update().await.expect("update");

    let source = manager.wallet().await.default_address().to_string();
    // amount over balance and over total, fee never loaded
    let intent = TransferIntent {
        amount: Amount::coin(50_000_000, 6),
        fee: Fee::new(Amount::not_loaded(multiwallet::AmountKind::Coin, 6)),
        source,
        destination: format!("61{}", "11".repeat(28)),
        change_address: None,
        contract_address: None,
        params: None,
    };

    let err = manager.send(intent).await.expect_err("invalid send");
    match err {
        WalletError::Validation(violations) => {
            assert!(violations.len() >= 2, "got {:?}", violations);
            assert!(violations.contains(&multiwallet::SendViolation::AmountExceedsBalance));
            assert!(violations.contains(&multiwallet::SendViolation::FeeNotLoaded));
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    // nothing reached the network
    assert!(provider.submitted.lock().expect("submitted").is_empty());
}
