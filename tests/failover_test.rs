//! Failover behavior of the multi-provider layer: strict ordering, sticky
//! cursor, authoritative short-circuit, exhaustion and reset.

mod common;

use std::sync::{Arc, Mutex};

use multiwallet::network::{MultiProvider, NamedProvider, ProviderError};

struct Endpoint {
    name: String,
}

impl Endpoint {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
        })
    }
}

impl NamedProvider for Endpoint {
    fn name(&self) -> &str {
        &self.name
    }
}

fn three_endpoints() -> MultiProvider<Endpoint> {
    MultiProvider::new(vec![
        Endpoint::new("alpha"),
        Endpoint::new("beta"),
        Endpoint::new("gamma"),
    ])
    .expect("providers")
}

#[tokio::test]
async fn exhaustion_reports_last_provider_and_resets_cursor() {
    common::init_logger();
    let multi = three_endpoints();
    let tried = Mutex::new(Vec::new());

    let result: Result<(), _> = multi
        .request(|p| {
            tried.lock().expect("tried lock").push(p.name().to_string());
            async { Err(ProviderError::Timeout) }
        })
        .await;

    let err = result.expect_err("all providers fail");
    match err {
        ProviderError::Exhausted { provider, source } => {
            assert_eq!(provider, "gamma");
            assert_eq!(*source, ProviderError::Timeout);
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }

    assert_eq!(
        *tried.lock().expect("tried lock"),
        vec!["alpha", "beta", "gamma"]
    );
    // the next request starts from the head of the list again
    assert_eq!(multi.current_index(), 0);
}

#[tokio::test]
async fn successful_provider_stays_selected() {
    common::init_logger();
    let multi = three_endpoints();

    // alpha fails once, beta answers
    let result = multi
        .request(|p| {
            let works = p.name() != "alpha";
            async move {
                if works {
                    Ok(42u32)
                } else {
                    Err(ProviderError::Status(503))
                }
            }
        })
        .await;
    assert_eq!(result.expect("beta answers"), 42);
    assert_eq!(multi.current_index(), 1);

    // the follow-up request goes straight to beta
    let tried = Mutex::new(Vec::new());
    let result = multi
        .request(|p| {
            tried.lock().expect("tried lock").push(p.name().to_string());
            async { Ok(1u32) }
        })
        .await;
    assert_eq!(result.expect("sticky provider"), 1);
    assert_eq!(*tried.lock().expect("tried lock"), vec!["beta"]);
}

#[tokio::test]
async fn authoritative_errors_bypass_failover() {
    common::init_logger();
    let multi = three_endpoints();
    let tried = Mutex::new(Vec::new());

    let result: Result<(), _> = multi
        .request(|p| {
            tried.lock().expect("tried lock").push(p.name().to_string());
            async { Err(ProviderError::AccountNotFound) }
        })
        .await;

    assert_eq!(result.expect_err("authoritative"), ProviderError::AccountNotFound);
    // only the first provider was consulted; ledger truth does not change
    // across providers
    assert_eq!(*tried.lock().expect("tried lock"), vec!["alpha"]);
    assert_eq!(multi.current_index(), 0);
}

#[tokio::test]
async fn recovery_after_reset_tries_the_full_chain_again() {
    common::init_logger();
    let multi = three_endpoints();

    let failed: Result<(), _> = multi
        .request(|_| async { Err(ProviderError::Timeout) })
        .await;
    assert!(failed.is_err());

    let tried = Mutex::new(Vec::new());
    let result = multi
        .request(|p| {
            tried.lock().expect("tried lock").push(p.name().to_string());
            let works = p.name() == "beta";
            async move {
                if works {
                    Ok("answer")
                } else {
                    Err(ProviderError::Timeout)
                }
            }
        })
        .await;

    assert_eq!(result.expect("beta answers"), "answer");
    assert_eq!(*tried.lock().expect("tried lock"), vec!["alpha", "beta"]);
}
