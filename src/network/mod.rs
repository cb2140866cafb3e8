//! Multi-provider network layer
//!
//! Wraps an ordered, fixed list of interchangeable RPC providers for one
//! ledger and implements linear failover: providers are tried strictly one
//! at a time, never raced, so a state-mutating call (broadcast in
//! particular) is never issued twice concurrently.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by a chain RPC provider.
///
/// Everything except `AccountNotFound` is considered recoverable and drives
/// the failover loop; `AccountNotFound` is ledger truth and retrying against
/// another provider cannot change it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("account does not exist on the ledger")]
    AccountNotFound,

    #[error("request timed out")]
    Timeout,

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("all providers failed, last tried {provider}: {source}")]
    Exhausted {
        provider: String,
        #[source]
        source: Box<ProviderError>,
    },
}

impl ProviderError {
    /// Authoritative errors bypass failover entirely.
    pub fn is_authoritative(&self) -> bool {
        matches!(self, ProviderError::AccountNotFound)
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("provider list must not be empty")]
pub struct EmptyProviderList;

/// Every provider carries a diagnostic name (host or service label) used to
/// annotate exhaustion errors.
pub trait NamedProvider {
    fn name(&self) -> &str;
}

/// Ordered failover over interchangeable providers.
///
/// The cursor is sticky: a provider that keeps working keeps being used.
/// On a recoverable failure the cursor moves to the next provider; once the
/// list is exhausted the cursor resets to 0 and the last error is
/// propagated with the last-tried provider's name attached.
pub struct MultiProvider<P: ?Sized> {
    providers: Vec<Arc<P>>,
    cursor: AtomicUsize,
}

impl<P: NamedProvider + ?Sized> MultiProvider<P> {
    pub fn new(providers: Vec<Arc<P>>) -> Result<Self, EmptyProviderList> {
        if providers.is_empty() {
            return Err(EmptyProviderList);
        }
        Ok(Self {
            providers,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Index of the provider the next request will start from.
    pub fn current_index(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }

    /// Issue `call` with ordered failover, one provider at a time.
    pub async fn request<T, F, Fut>(&self, mut call: F) -> Result<T, ProviderError>
    where
        F: FnMut(Arc<P>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut index = self.cursor.load(Ordering::SeqCst).min(self.providers.len() - 1);
        let mut last_error = None;

        while index < self.providers.len() {
            let provider = self.providers[index].clone();
            match call(provider.clone()).await {
                Ok(value) => {
                    self.cursor.store(index, Ordering::SeqCst);
                    return Ok(value);
                }
                Err(err) if err.is_authoritative() => {
                    return Err(err);
                }
                Err(err) => {
                    log::warn!(
                        "provider {} failed ({}), moving to next provider",
                        provider.name(),
                        err
                    );
                    last_error = Some((provider.name().to_string(), err));
                    index += 1;
                    self.cursor.store(index, Ordering::SeqCst);
                }
            }
        }

        self.cursor.store(0, Ordering::SeqCst);
        let (provider, source) = last_error.expect("failover loop ran at least once");
        Err(ProviderError::Exhausted {
            provider,
            source: Box::new(source),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        name: String,
    }

    impl NamedProvider for Fixed {
        fn name(&self) -> &str {
            &self.name
        }
    }

    #[test]
    fn rejects_empty_provider_list() {
        let providers: Vec<Arc<Fixed>> = Vec::new();
        assert!(MultiProvider::new(providers).is_err());
    }

    #[test]
    fn classifies_authoritative_errors() {
        assert!(ProviderError::AccountNotFound.is_authoritative());
        assert!(!ProviderError::Timeout.is_authoritative());
        assert!(!ProviderError::Status(502).is_authoritative());
    }
}
