//! Circuit-breaker wrapper for the remediation executor.
//!
//! `GuardedExecutor` short-circuits calls to a failing collaborator. An open
//! circuit surfaces as an ordinary task failure (`Error::CircuitOpen`) at the
//! dispatch boundary; the engine never treats it as an automatic run abort.
//! The breaker itself stays interface-thin: consecutive-failure threshold,
//! cooldown, half-open retry.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::collab::{RemediationExecutor, RemediationOutcome};
use crate::core::task::RemediationTask;
use crate::error::{Error, Result};
use crate::wlog_warn;

/// Default consecutive failures before the circuit opens.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Default cooldown before a half-open retry is allowed.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// A [`RemediationExecutor`] that wraps another executor behind a circuit breaker.
pub struct GuardedExecutor<E> {
    inner: Arc<E>,
    service: String,
    failure_threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerInner>,
}

impl<E: RemediationExecutor> GuardedExecutor<E> {
    pub fn new(inner: Arc<E>, service: &str) -> Self {
        Self::with_settings(inner, service, DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOLDOWN)
    }

    pub fn with_settings(
        inner: Arc<E>,
        service: &str,
        failure_threshold: u32,
        cooldown: Duration,
    ) -> Self {
        Self {
            inner,
            service: service.to_string(),
            failure_threshold,
            cooldown,
            state: Mutex::new(BreakerInner {
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Current breaker state.
    pub async fn state(&self) -> BreakerState {
        let inner = self.state.lock().await;
        match inner.opened_at {
            None => BreakerState::Closed,
            Some(at) if at.elapsed() >= self.cooldown => BreakerState::HalfOpen,
            Some(_) => BreakerState::Open,
        }
    }
}

#[async_trait]
impl<E: RemediationExecutor> RemediationExecutor for GuardedExecutor<E> {
    async fn apply(&self, task: &RemediationTask) -> Result<RemediationOutcome> {
        {
            let inner = self.state.lock().await;
            if let Some(at) = inner.opened_at {
                if at.elapsed() < self.cooldown {
                    return Err(Error::CircuitOpen {
                        service: self.service.clone(),
                    });
                }
                // Cooldown elapsed: fall through as a half-open probe call.
            }
        }

        match self.inner.apply(task).await {
            Ok(outcome) => {
                let mut inner = self.state.lock().await;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                Ok(outcome)
            }
            Err(err) => {
                let mut inner = self.state.lock().await;
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    if inner.opened_at.is_none() {
                        wlog_warn!(
                            "Circuit opened for {} after {} consecutive failures",
                            self.service,
                            inner.consecutive_failures
                        );
                    }
                    inner.opened_at = Some(Instant::now());
                }
                Err(err)
            }
        }
    }

    async fn undo(&self, token: &str) -> Result<()> {
        // Rollback is best-effort already; undo calls bypass the breaker.
        self.inner.undo(token).await
    }
}
