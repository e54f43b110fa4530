use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum PushTransportError {
    #[error("push delivery request failed: {0}")]
    Transport(String),
    #[error("push delivery endpoint responded with status {0}")]
    Status(u16),
    #[error("push delivery endpoint returned an invalid payload: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenOutcome {
    pub token: String,
    pub success: bool,
    #[serde(default)]
    pub error_code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TokenFailure {
    pub token: String,
    pub cause: String,
}

/// Per-batch delivery outcome. Failures never propagate past the
/// dispatcher; callers read the report if they care.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub success_count: usize,
    pub failures: Vec<TokenFailure>,
}

pub type PushTransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<TokenOutcome>, PushTransportError>> + Send + 'a>>;

/// Transport seam for notification delivery; the HTTP relay is the
/// production implementation, tests substitute fakes.
pub trait PushTransport: Send + Sync {
    fn send_batch<'a>(
        &'a self,
        tokens: &'a [String],
        title: &'a str,
        body: &'a str,
    ) -> PushTransportFuture<'a>;
}

#[derive(Debug, Serialize)]
struct PushDeliveryRequest<'a> {
    tokens: &'a [String],
    title: &'a str,
    body: &'a str,
    data: PushDeliveryData<'a>,
}

#[derive(Debug, Serialize)]
struct PushDeliveryData<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct PushDeliveryResponse {
    results: Vec<TokenOutcome>,
}

#[derive(Clone)]
pub struct HttpPushTransport {
    client: reqwest::Client,
    endpoint: Option<String>,
    auth_token: Option<String>,
}

impl HttpPushTransport {
    pub fn new(endpoint: Option<String>, auth_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            auth_token,
        }
    }

    async fn deliver(
        &self,
        tokens: &[String],
        title: &str,
        body: &str,
    ) -> Result<Vec<TokenOutcome>, PushTransportError> {
        let Some(endpoint) = self.endpoint.as_deref() else {
            info!("push delivery endpoint not configured; simulated delivery");
            return Ok(tokens
                .iter()
                .map(|token| TokenOutcome {
                    token: token.clone(),
                    success: true,
                    error_code: None,
                })
                .collect());
        };

        let request = PushDeliveryRequest {
            tokens,
            title,
            body,
            data: PushDeliveryData { title, body },
        };

        let mut builder = self.client.post(endpoint).json(&request);
        if let Some(auth_token) = self.auth_token.as_deref() {
            builder = builder.bearer_auth(auth_token);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| PushTransportError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PushTransportError::Status(status.as_u16()));
        }

        let parsed: PushDeliveryResponse = response
            .json()
            .await
            .map_err(|err| PushTransportError::InvalidPayload(err.to_string()))?;

        Ok(parsed.results)
    }
}

impl PushTransport for HttpPushTransport {
    fn send_batch<'a>(
        &'a self,
        tokens: &'a [String],
        title: &'a str,
        body: &'a str,
    ) -> PushTransportFuture<'a> {
        Box::pin(self.deliver(tokens, title, body))
    }
}

/// Best-effort fan-out of one notification to every device endpoint.
#[derive(Clone)]
pub struct PushDispatcher {
    transport: Arc<dyn PushTransport>,
}

impl PushDispatcher {
    pub fn new(transport: Arc<dyn PushTransport>) -> Self {
        Self { transport }
    }

    pub async fn dispatch(&self, tokens: &[String], title: &str, body: &str) -> DispatchReport {
        if tokens.is_empty() {
            debug!("no push tokens provided, skipping notification");
            return DispatchReport::default();
        }

        match self.transport.send_batch(tokens, title, body).await {
            Ok(outcomes) => {
                let mut report = DispatchReport::default();
                for outcome in outcomes {
                    if outcome.success {
                        report.success_count += 1;
                    } else {
                        let cause = outcome
                            .error_code
                            .unwrap_or_else(|| "UNKNOWN_ERROR".to_string());
                        warn!(token = %outcome.token, cause = %cause, "push delivery failed for token");
                        report.failures.push(TokenFailure {
                            token: outcome.token,
                            cause,
                        });
                    }
                }
                info!(
                    success_count = report.success_count,
                    failure_count = report.failures.len(),
                    "push notification batch dispatched"
                );
                report
            }
            Err(err) => {
                error!("push notification batch failed: {err}");
                DispatchReport {
                    success_count: 0,
                    failures: tokens
                        .iter()
                        .map(|token| TokenFailure {
                            token: token.clone(),
                            cause: err.to_string(),
                        })
                        .collect(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{
        DispatchReport, PushDispatcher, PushTransport, PushTransportError, PushTransportFuture,
        TokenOutcome,
    };

    struct RecordingTransport {
        calls: AtomicUsize,
        result: Result<Vec<TokenOutcome>, PushTransportError>,
    }

    impl RecordingTransport {
        fn new(result: Result<Vec<TokenOutcome>, PushTransportError>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                result,
            })
        }
    }

    impl PushTransport for RecordingTransport {
        fn send_batch<'a>(
            &'a self,
            _tokens: &'a [String],
            _title: &'a str,
            _body: &'a str,
        ) -> PushTransportFuture<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = match &self.result {
                Ok(outcomes) => Ok(outcomes.clone()),
                Err(err) => Err(PushTransportError::Transport(err.to_string())),
            };
            Box::pin(async move { result })
        }
    }

    fn outcome(token: &str, success: bool, error_code: Option<&str>) -> TokenOutcome {
        TokenOutcome {
            token: token.to_string(),
            success,
            error_code: error_code.map(ToString::to_string),
        }
    }

    #[tokio::test]
    async fn empty_token_set_makes_no_transport_call() {
        let transport = RecordingTransport::new(Ok(Vec::new()));
        let dispatcher = PushDispatcher::new(transport.clone());

        let report: DispatchReport = dispatcher.dispatch(&[], "title", "body").await;

        assert_eq!(report.success_count, 0);
        assert!(report.failures.is_empty());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn mixed_outcomes_are_counted_and_reported_per_token() {
        let transport = RecordingTransport::new(Ok(vec![
            outcome("tok-1", true, None),
            outcome("tok-2", false, Some("UNREGISTERED")),
            outcome("tok-3", true, None),
        ]));
        let dispatcher = PushDispatcher::new(transport.clone());
        let tokens: Vec<String> = ["tok-1", "tok-2", "tok-3"]
            .iter()
            .map(ToString::to_string)
            .collect();

        let report = dispatcher.dispatch(&tokens, "title", "body").await;

        assert_eq!(report.success_count, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].token, "tok-2");
        assert_eq!(report.failures[0].cause, "UNREGISTERED");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn whole_batch_transport_error_is_absorbed() {
        let transport = RecordingTransport::new(Err(PushTransportError::Transport(
            "connection refused".to_string(),
        )));
        let dispatcher = PushDispatcher::new(transport);
        let tokens = vec!["tok-1".to_string(), "tok-2".to_string()];

        let report = dispatcher.dispatch(&tokens, "title", "body").await;

        assert_eq!(report.success_count, 0);
        assert_eq!(report.failures.len(), 2);
    }
}
