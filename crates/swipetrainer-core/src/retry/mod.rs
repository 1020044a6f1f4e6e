//! Bounded retry for best-effort image downloads.
//!
//! Swipe confirmation is never retried here: a confirmation timeout is
//! terminal for its iteration.

mod policy;

pub use policy::RetryPolicy;

use std::future::Future;
use std::time::Duration;

/// Why an attempt is worth repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    Connect,
    Timeout,
    RateLimited,
    ServerError,
}

impl RetryReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry {
        reason: RetryReason,
        retry_after: Option<Duration>,
    },
    DoNotRetry,
}

/// One scheduled retry, reported to the caller before sleeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAttempt {
    pub attempt: u32,
    pub delay: Duration,
    pub reason: RetryReason,
}

/// Read `Retry-After` as delta-seconds or an HTTP date.
pub fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let raw = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let when = httpdate::parse_http_date(raw).ok()?;
    Some(
        when.duration_since(std::time::SystemTime::now())
            .unwrap_or(Duration::ZERO),
    )
}

/// Decide whether an image request result is transient.
///
/// Client errors other than 429 are final: the URL will not start working.
pub fn classify_fetch(result: &Result<reqwest::Response, reqwest::Error>) -> RetryDecision {
    match result {
        Ok(resp) => {
            let status = resp.status();
            let reason = if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                RetryReason::RateLimited
            } else if status.is_server_error() {
                RetryReason::ServerError
            } else {
                return RetryDecision::DoNotRetry;
            };
            RetryDecision::Retry {
                reason,
                retry_after: parse_retry_after(resp.headers()),
            }
        }
        Err(err) if err.is_timeout() => RetryDecision::Retry {
            reason: RetryReason::Timeout,
            retry_after: None,
        },
        Err(err) if err.is_connect() => RetryDecision::Retry {
            reason: RetryReason::Connect,
            retry_after: None,
        },
        Err(_) => RetryDecision::DoNotRetry,
    }
}

/// Run `operation` until it succeeds, `classify` says stop, or the policy is
/// exhausted. The last result is returned as is.
pub async fn retry_with_backoff<T, E, Op, Fut, Classify, OnRetry>(
    policy: &RetryPolicy,
    mut operation: Op,
    mut classify: Classify,
    mut on_retry: OnRetry,
) -> Result<T, E>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Classify: FnMut(&Result<T, E>) -> RetryDecision,
    OnRetry: FnMut(RetryAttempt),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = operation(attempt).await;
        if attempt >= max_attempts {
            return result;
        }
        let RetryDecision::Retry {
            reason,
            retry_after,
        } = classify(&result)
        else {
            return result;
        };

        let delay = policy.with_jitter(retry_after.unwrap_or_else(|| policy.backoff_delay(attempt)));
        on_retry(RetryAttempt {
            attempt,
            delay,
            reason,
        });
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
