// Shared transport for gateway clients: timeouts, retry with exponential backoff,
// and mapping of HTTP failures to readable messages.

use crate::config::GatewayHttpConfig;
use crate::error::GatewayError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

pub const USER_AGENT: &str = "StarRouterRent/2.0";

/// Result of one HTTP attempt, before retry classification.
#[derive(Debug, Clone)]
pub enum Attempt {
    Transport(String),
    Response { status: u16, body: String },
}

/// Maps a non-success HTTP status to the provider's wording.
pub type MessageFn = fn(u16) -> String;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &GatewayHttpConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            backoff_base: cfg.backoff_base,
        }
    }

    /// 1x, 2x, 4x ... the base delay.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(1u32 << attempt.min(16))
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 451
}

pub fn build_client(cfg: &GatewayHttpConfig) -> Result<reqwest::Client, GatewayError> {
    reqwest::Client::builder()
        .use_rustls_tls()
        .connect_timeout(cfg.connect_timeout)
        .timeout(cfg.timeout)
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| GatewayError::Network(e.to_string()))
}

/// Converts a reqwest send result into an [`Attempt`].
pub async fn into_attempt(result: Result<reqwest::Response, reqwest::Error>) -> Attempt {
    match result {
        Ok(resp) => {
            let status = resp.status().as_u16();
            match resp.text().await {
                Ok(body) => Attempt::Response { status, body },
                Err(e) => Attempt::Transport(e.to_string()),
            }
        }
        Err(e) => Attempt::Transport(e.to_string()),
    }
}

/// Runs `op` until it yields a 2xx body, a non-retryable status, or the retry budget is spent.
pub async fn with_retries<F, Fut>(
    desc: &str,
    policy: &RetryPolicy,
    messages: MessageFn,
    mut op: F,
) -> Result<String, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Attempt>,
{
    let mut attempt: u32 = 0;
    loop {
        let outcome = op().await;
        let retry_reason = match &outcome {
            Attempt::Response { status, body } if (200..300).contains(status) => {
                debug!(desc, status, "gateway response");
                return Ok(body.clone());
            }
            Attempt::Response { status, .. } if is_retryable_status(*status) => format!("HTTP {status}"),
            Attempt::Response { status, .. } => return Err(GatewayError::Gateway(messages(*status))),
            Attempt::Transport(e) => e.clone(),
        };

        if attempt >= policy.max_retries {
            return Err(match outcome {
                Attempt::Transport(e) => GatewayError::Network(e),
                Attempt::Response { status, .. } => GatewayError::Gateway(messages(status)),
            });
        }

        let delay = policy.delay_for(attempt);
        warn!(
            desc,
            attempt = attempt + 1,
            max_retries = policy.max_retries,
            reason = %retry_reason,
            next_delay_ms = delay.as_millis() as u64,
            "retrying gateway call"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Length check plus xor-fold, so the comparison time does not depend on where bytes differ.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Strips `api_key` values from a URL before it is logged.
pub fn redact_url(url: &str) -> String {
    match url.split_once('?') {
        None => url.to_string(),
        Some((base, query)) => {
            let redacted: Vec<String> = query
                .split('&')
                .map(|pair| match pair.split_once('=') {
                    Some(("api_key", _)) => "api_key=***".to_string(),
                    _ => pair.to_string(),
                })
                .collect();
            format!("{}?{}", base, redacted.join("&"))
        }
    }
}
