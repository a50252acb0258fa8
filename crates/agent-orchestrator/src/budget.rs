//! Call Budget
//!
//! One cancellation token and one optional deadline shared by every external
//! call made while serving a request.

use std::future::Future;
use std::time::Duration;

use agent_core::{AgentError, Result};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::RetryPolicy;

/// Cancellation + deadline + per-call timeout for one request
#[derive(Clone, Debug)]
pub struct CallBudget {
    token: CancellationToken,
    deadline: Option<Instant>,
    request_timeout: Duration,
    call_timeout: Duration,
}

impl CallBudget {
    pub fn new(token: CancellationToken, call_timeout: Duration) -> Self {
        Self {
            token,
            deadline: None,
            request_timeout: Duration::ZERO,
            call_timeout,
        }
    }

    /// Stop all calls once `timeout` has elapsed from now. A timeout too
    /// large to represent as an instant means no deadline.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        if self.deadline.is_some() {
            self.request_timeout = timeout.unwrap_or_default();
        }
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Time a call may take: the per-call timeout, capped by the deadline
    pub fn remaining(&self) -> Duration {
        match self.deadline {
            Some(deadline) => self
                .call_timeout
                .min(deadline.saturating_duration_since(Instant::now())),
            None => self.call_timeout,
        }
    }

    /// Fail fast if cancelled or out of time
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(AgentError::Timeout(self.request_timeout));
        }
        Ok(())
    }

    /// Run one external call under the budget
    pub async fn run<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        let limit = self.remaining();

        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(AgentError::Cancelled),
            outcome = tokio::time::timeout(limit, call) => {
                outcome.unwrap_or(Err(AgentError::Timeout(limit)))
            }
        }
    }

    /// Run a call, retrying retryable failures per `policy`
    pub async fn run_with_retry<T, F, Fut>(
        &self,
        policy: &RetryPolicy,
        what: &str,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            self.pause(policy.delay_before(attempt)).await?;

            match self.run(call()).await {
                Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                    tracing::warn!(call = %what, attempt, error = %e, "Retrying call");
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    async fn pause(&self, delay: Duration) -> Result<()> {
        if delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(AgentError::Cancelled),
            () = tokio::time::sleep(delay.min(self.remaining())) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_call_times_out() {
        let budget = CallBudget::new(CancellationToken::new(), Duration::from_millis(20));
        let err = budget
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let token = CancellationToken::new();
        let budget = CallBudget::new(token.clone(), Duration::from_secs(5));
        token.cancel();
        let err = budget.run(async { Ok(1) }).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_mid_call() {
        let token = CancellationToken::new();
        let budget = CallBudget::new(token.clone(), Duration::from_secs(5));
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });
        let err = budget
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_retry_only_retryable_errors() {
        let budget = CallBudget::new(CancellationToken::new(), Duration::from_secs(1));
        let policy = RetryPolicy::attempts(3, 1);

        let attempts = &AtomicU32::new(0);
        let value = budget
            .run_with_retry(&policy, "flaky", || async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(AgentError::RateLimited("busy".into()))
                } else {
                    Ok("done")
                }
            })
            .await
            .unwrap();
        assert_eq!(value, "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        let attempts = &AtomicU32::new(0);
        let err = budget
            .run_with_retry(&policy, "broken", || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(AgentError::Parse("bad".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Parse(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_deadline_fails_fast() {
        let budget = CallBudget::new(CancellationToken::new(), Duration::from_secs(1))
            .with_request_timeout(Some(Duration::from_millis(1)));
        tokio::time::sleep(Duration::from_millis(5)).await;
        let err = budget.check().unwrap_err();
        assert!(matches!(err, AgentError::Timeout(t) if t == Duration::from_millis(1)));
    }

    #[tokio::test]
    async fn test_unrepresentable_deadline_means_none() {
        let budget = CallBudget::new(CancellationToken::new(), Duration::from_secs(1))
            .with_request_timeout(Some(Duration::from_secs(u64::MAX)));
        assert!(budget.check().is_ok());
        assert_eq!(budget.remaining(), Duration::from_secs(1));
        assert_eq!(budget.run(async { Ok(7) }).await.unwrap(), 7);
    }
}
