use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use kv3600_core::cluster::{NodeAddress, RegistrationTransport};
use kv3600_core::config::RegistrationConfig;
use kv3600_core::error::KvError;

/// Why a follower could not join the cluster.
#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("registration failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: KvError },

    #[error("registration rejected by leader: {reason}")]
    Rejected { reason: String },

    #[error("registration cancelled by shutdown")]
    Cancelled,
}

impl RegistrationError {
    /// Cancellation is a clean exit, everything else is fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

/// Follower-side client announcing this node to the leader.
pub struct RegistrationClient {
    transport: Arc<dyn RegistrationTransport>,
    config: RegistrationConfig,
}

impl RegistrationClient {
    /// Create a new registration client.
    pub fn new(transport: Arc<dyn RegistrationTransport>, config: RegistrationConfig) -> Self {
        Self { transport, config }
    }

    /// Register `own` with the leader.
    ///
    /// Transport failures and timeouts are retried with exponential backoff up
    /// to `max_attempts`. A rejection ends the attempt immediately. Returns the
    /// number of attempts used.
    pub async fn register(
        &self,
        own: &NodeAddress,
        shutdown: &CancellationToken,
    ) -> Result<u32, RegistrationError> {
        let max_attempts = self.config.max_attempts.max(1);
        let timeout = self.config.timeout();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let outcome = tokio::select! {
                _ = shutdown.cancelled() => return Err(RegistrationError::Cancelled),
                outcome = tokio::time::timeout(timeout, self.transport.register_follower(own)) => outcome,
            };

            let error = match outcome {
                Ok(Ok(response)) if response.successful => {
                    tracing::info!(address = %own, attempt, "Registered with leader");
                    return Ok(attempt);
                }
                Ok(Ok(response)) => {
                    let reason = response
                        .reason
                        .unwrap_or_else(|| "no reason given".to_string());
                    tracing::error!(address = %own, reason = %reason, "Leader rejected registration");
                    return Err(RegistrationError::Rejected { reason });
                }
                Ok(Err(e)) => e,
                Err(_) => KvError::Timeout(timeout),
            };

            if attempt >= max_attempts {
                tracing::error!(address = %own, attempts = attempt, error = %error, "Registration retries exhausted");
                return Err(RegistrationError::Exhausted {
                    attempts: attempt,
                    last_error: error,
                });
            }

            let backoff = self.config.backoff_after(attempt);
            tracing::warn!(
                address = %own,
                attempt,
                max_attempts,
                backoff = ?backoff,
                error = %error,
                "Registration attempt failed, retrying"
            );

            tokio::select! {
                _ = shutdown.cancelled() => return Err(RegistrationError::Cancelled),
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }

    /// Remove `own` from the leader's registry. Single attempt.
    pub async fn deregister(&self, own: &NodeAddress) -> kv3600_core::Result<()> {
        let timeout = self.config.timeout();
        let response = tokio::time::timeout(timeout, self.transport.deregister_follower(own))
            .await
            .map_err(|_| KvError::Timeout(timeout))??;

        if response.successful {
            tracing::info!(address = %own, "Deregistered from leader");
            Ok(())
        } else {
            Err(KvError::Rejected(
                response.reason.unwrap_or_else(|| "no reason given".to_string()),
            ))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::time::Duration;

    use kv3600_core::rpc::RegistrationResponse;
    use tokio_test::assert_ok;

    /// Scripted leader answers, consumed in order. Once the script runs out
    /// every call gets `fallback`.
    pub(crate) enum Reply {
        Accept,
        Reject(&'static str),
        Fail,
        Hang,
    }

    pub(crate) struct ScriptedTransport {
        script: Mutex<VecDeque<Reply>>,
        fallback: fn() -> Reply,
        pub(crate) registrations: Mutex<Vec<NodeAddress>>,
        pub(crate) deregistrations: Mutex<Vec<NodeAddress>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(script: Vec<Reply>, fallback: fn() -> Reply) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback,
                registrations: Mutex::new(Vec::new()),
                deregistrations: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn registration_count(&self) -> usize {
            self.registrations.lock().unwrap().len()
        }

        fn next(&self) -> Reply {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(self.fallback)
        }
    }

    type Answer = Pin<Box<dyn Future<Output = kv3600_core::Result<RegistrationResponse>> + Send>>;

    fn answer(reply: Reply) -> Answer {
        Box::pin(async move {
            match reply {
                Reply::Accept => Ok(RegistrationResponse::accepted()),
                Reply::Reject(reason) => Ok(RegistrationResponse::rejected(reason)),
                Reply::Fail => Err(KvError::Transport("connection refused".into())),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(RegistrationResponse::accepted())
                }
            }
        })
    }

    impl RegistrationTransport for ScriptedTransport {
        fn register_follower(
            &self,
            address: &NodeAddress,
        ) -> Pin<Box<dyn Future<Output = kv3600_core::Result<RegistrationResponse>> + Send + '_>>
        {
            self.registrations.lock().unwrap().push(address.clone());
            answer(self.next())
        }

        fn deregister_follower(
            &self,
            address: &NodeAddress,
        ) -> Pin<Box<dyn Future<Output = kv3600_core::Result<RegistrationResponse>> + Send + '_>>
        {
            self.deregistrations.lock().unwrap().push(address.clone());
            answer(self.next())
        }
    }

    pub(crate) fn fast_config(max_attempts: u32) -> RegistrationConfig {
        RegistrationConfig {
            timeout_ms: 50,
            backoff_base_ms: 10,
            backoff_multiplier: 2,
            max_attempts,
            max_backoff_ms: 1000,
        }
    }

    fn own() -> NodeAddress {
        NodeAddress::new("127.0.0.1", "41000")
    }

    #[tokio::test]
    async fn test_register_first_attempt() {
        let transport = Arc::new(ScriptedTransport::new(vec![], || Reply::Accept));
        let client = RegistrationClient::new(transport.clone(), fast_config(5));

        let attempts = client.register(&own(), &CancellationToken::new()).await.unwrap();
        assert_eq!(attempts, 1);
        assert_eq!(transport.registrations.lock().unwrap()[0], own());
    }

    #[tokio::test]
    async fn test_register_retries_transport_failures() {
        let transport = Arc::new(ScriptedTransport::new(
            vec![Reply::Fail, Reply::Hang],
            || Reply::Accept,
        ));
        let client = RegistrationClient::new(transport.clone(), fast_config(5));

        let attempts = client.register(&own(), &CancellationToken::new()).await.unwrap();
        assert_eq!(attempts, 3);
        assert_eq!(transport.registration_count(), 3);
    }

    #[tokio::test]
    async fn test_register_exhausts_retries() {
        let transport = Arc::new(ScriptedTransport::new(vec![Reply::Hang], || Reply::Fail));
        let client = RegistrationClient::new(transport.clone(), fast_config(4));

        let err = client
            .register(&own(), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            RegistrationError::Exhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 4);
                assert!(last_error.is_transport());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(transport.registration_count(), 4);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new(
            vec![Reply::Reject("invalid address: port must not be empty")],
            || Reply::Accept,
        ));
        let client = RegistrationClient::new(transport.clone(), fast_config(5));

        let err = client
            .register(&own(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::Rejected { ref reason } if reason.contains("port")));
        assert!(err.is_fatal());
        assert_eq!(transport.registration_count(), 1);
    }

    #[tokio::test]
    async fn test_register_cancelled_during_backoff() {
        let transport = Arc::new(ScriptedTransport::new(vec![], || Reply::Fail));
        let config = RegistrationConfig {
            backoff_base_ms: 60_000,
            ..fast_config(5)
        };
        let client = RegistrationClient::new(transport, config);

        let shutdown = CancellationToken::new();
        let canceller = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let err = client.register(&own(), &shutdown).await.unwrap_err();
        assert!(matches!(err, RegistrationError::Cancelled));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_deregister() {
        let transport = Arc::new(ScriptedTransport::new(
            vec![Reply::Accept, Reply::Fail],
            || Reply::Accept,
        ));
        let client = RegistrationClient::new(transport.clone(), fast_config(5));

        assert_ok!(client.deregister(&own()).await);
        // Deregistration is not retried.
        assert!(client.deregister(&own()).await.unwrap_err().is_transport());
        assert_eq!(transport.deregistrations.lock().unwrap().len(), 2);
    }
}
