//! Token bucket admission control for outbound API requests
//!
//! The bucket starts full, gains `tokens_per_period` tokens at the end of each
//! replenishment period (never beyond `token_limit`) and hands out one token per
//! admitted request. Callers that find the bucket empty join a bounded FIFO
//! queue and are served oldest-first as tokens arrive. Once the queue is full,
//! further callers are denied immediately with a suggested retry delay instead
//! of piling up.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

use crate::metrics;
use crate::shutdown::{Cancelled, ShutdownCoordinator};

/// Wait applied by callers when a denied lease carries no retry hint.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Token bucket configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterOptions {
    /// Maximum number of tokens the bucket can hold
    pub token_limit: u32,
    /// Tokens added at the end of every replenishment period
    pub tokens_per_period: u32,
    /// Length of one replenishment period
    pub replenishment_period: Duration,
    /// Maximum number of callers allowed to wait for a token
    pub queue_limit: usize,
}

impl Default for RateLimiterOptions {
    fn default() -> Self {
        Self {
            token_limit: 1,
            tokens_per_period: 1,
            replenishment_period: Duration::from_secs(1),
            queue_limit: 60,
        }
    }
}

impl RateLimiterOptions {
    /// Check the options describe a bucket that can ever admit a request.
    pub fn validate(&self) -> Result<(), RateLimitError> {
        if self.token_limit == 0 {
            return Err(RateLimitError::InvalidOptions(
                "token limit must be at least 1".to_string(),
            ));
        }
        if self.tokens_per_period == 0 {
            return Err(RateLimitError::InvalidOptions(
                "tokens per period must be at least 1".to_string(),
            ));
        }
        if self.replenishment_period.is_zero() {
            return Err(RateLimitError::InvalidOptions(
                "replenishment period must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of one admission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lease {
    /// A token was consumed; the caller may issue its request.
    Granted,
    /// No token was consumed; the caller should wait and try again.
    Denied {
        /// Suggested delay before the next attempt
        retry_after: Option<Duration>,
    },
}

impl Lease {
    /// Whether the lease allows the caller to proceed
    pub fn is_acquired(&self) -> bool {
        matches!(self, Lease::Granted)
    }

    /// Retry hint attached to a denied lease
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Lease::Granted => None,
            Lease::Denied { retry_after } => *retry_after,
        }
    }
}

/// Rate limiter errors
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// Options that can never admit a request
    #[error("invalid rate limiter options: {0}")]
    InvalidOptions(String),
}

struct BucketState {
    tokens: u32,
    last_replenish: Instant,
    queue: VecDeque<u64>,
    next_ticket: u64,
}

/// Shared token bucket rate limiter
///
/// Safe to share behind an [`Arc`](std::sync::Arc) between any number of
/// concurrent callers; all bookkeeping happens under one short-lived lock that
/// is never held across an await point.
pub struct RateLimiter {
    options: RateLimiterOptions,
    state: Mutex<BucketState>,
    queue_advanced: Notify,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("options", &self.options)
            .field("available_tokens", &self.available_tokens())
            .field("queued", &self.queued())
            .finish()
    }
}

impl RateLimiter {
    /// Create a limiter whose bucket starts full.
    pub fn new(options: RateLimiterOptions) -> Result<Self, RateLimitError> {
        options.validate()?;
        Ok(Self {
            state: Mutex::new(BucketState {
                tokens: options.token_limit,
                last_replenish: Instant::now(),
                queue: VecDeque::new(),
                next_ticket: 0,
            }),
            options,
            queue_advanced: Notify::new(),
        })
    }

    /// Configuration this limiter was built with
    pub fn options(&self) -> &RateLimiterOptions {
        &self.options
    }

    /// Tokens available right now, after accounting for elapsed periods
    pub fn available_tokens(&self) -> u32 {
        let mut state = self.lock();
        self.replenish(&mut state, Instant::now());
        state.tokens
    }

    /// Number of callers currently waiting in the queue
    pub fn queued(&self) -> usize {
        self.lock().queue.len()
    }

    /// Take a token if one is free right now, without queueing.
    pub fn try_acquire(&self) -> Lease {
        let mut state = self.lock();
        let now = Instant::now();
        self.replenish(&mut state, now);

        if state.queue.is_empty() && state.tokens > 0 {
            state.tokens -= 1;
            return Lease::Granted;
        }

        let position = state.queue.len() + 1;
        Lease::Denied {
            retry_after: Some(self.estimate_wait(&state, position, now)),
        }
    }

    /// Wait for a token.
    ///
    /// Returns [`Lease::Granted`] once a token has been consumed on behalf of
    /// the caller, or [`Lease::Denied`] straight away when the wait queue is
    /// full. A denial never consumes a token, so callers can simply retry.
    ///
    /// # Errors
    /// Returns [`Cancelled`] if shutdown is requested while waiting; the
    /// caller's queue slot is released.
    pub async fn acquire(&self, shutdown: &ShutdownCoordinator) -> Result<Lease, Cancelled> {
        shutdown.check()?;
        let started = Instant::now();

        let ticket = {
            let mut state = self.lock();
            let now = Instant::now();
            self.replenish(&mut state, now);

            if state.queue.is_empty() && state.tokens > 0 {
                state.tokens -= 1;
                trace!(remaining = state.tokens, "Rate limit token granted immediately");
                metrics::record_admission_granted(Duration::ZERO);
                return Ok(Lease::Granted);
            }

            if state.queue.len() >= self.options.queue_limit {
                let position = state.queue.len() + 1;
                let retry_after = self.estimate_wait(&state, position, now);
                debug!(
                    queued = state.queue.len(),
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Rate limit queue full, denying admission"
                );
                metrics::record_admission_denied();
                return Ok(Lease::Denied {
                    retry_after: Some(retry_after),
                });
            }

            let ticket = state.next_ticket;
            state.next_ticket += 1;
            state.queue.push_back(ticket);
            trace!(ticket, queued = state.queue.len(), "Waiting for rate limit token");
            ticket
        };

        let mut slot = QueueSlot {
            limiter: self,
            ticket,
            armed: true,
        };

        loop {
            let advanced = self.queue_advanced.notified();
            tokio::pin!(advanced);
            advanced.as_mut().enable();

            let deadline = {
                let mut state = self.lock();
                let now = Instant::now();
                self.replenish(&mut state, now);

                if state.queue.front() == Some(&ticket) && state.tokens > 0 {
                    state.tokens -= 1;
                    state.queue.pop_front();
                    slot.armed = false;
                    drop(state);

                    self.queue_advanced.notify_waiters();
                    let waited = started.elapsed();
                    trace!(ticket, waited_ms = waited.as_millis() as u64, "Rate limit token granted");
                    metrics::record_admission_granted(waited);
                    return Ok(Lease::Granted);
                }

                state.last_replenish + self.options.replenishment_period
            };

            // The slot guard removes the ticket if this future is dropped here.
            shutdown
                .guard(async {
                    tokio::select! {
                        () = sleep_until(deadline) => {}
                        () = &mut advanced => {}
                    }
                })
                .await?;
        }
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Credit whole periods elapsed since the last replenishment.
    ///
    /// A full bucket accrues nothing, so the period clock restarts at `now`
    /// and the next token is always a whole period away from the last grant.
    fn replenish(&self, state: &mut BucketState, now: Instant) {
        if state.tokens >= self.options.token_limit {
            state.last_replenish = now;
            return;
        }

        let period = self.options.replenishment_period.as_nanos();
        let elapsed = now.saturating_duration_since(state.last_replenish).as_nanos();
        let periods = elapsed / period;
        if periods == 0 {
            return;
        }

        let added = u32::try_from(periods)
            .unwrap_or(u32::MAX)
            .saturating_mul(self.options.tokens_per_period);
        state.tokens = state
            .tokens
            .saturating_add(added)
            .min(self.options.token_limit);

        if state.tokens == self.options.token_limit {
            state.last_replenish = now;
        } else {
            let remainder = u64::try_from(elapsed % period).unwrap_or(0);
            state.last_replenish = now - Duration::from_nanos(remainder);
        }
    }

    /// Time until `position` callers (counting from the queue head) can be served.
    fn estimate_wait(&self, state: &BucketState, position: usize, now: Instant) -> Duration {
        let position = u64::try_from(position).unwrap_or(u64::MAX);
        let missing = position.saturating_sub(u64::from(state.tokens));
        if missing == 0 {
            return Duration::ZERO;
        }

        let per_period = u64::from(self.options.tokens_per_period);
        let periods = missing.div_ceil(per_period);
        let periods = u32::try_from(periods).unwrap_or(u32::MAX);
        let ready_at = state.last_replenish + self.options.replenishment_period * periods;
        ready_at.saturating_duration_since(now)
    }

    fn abandon(&self, ticket: u64) {
        let mut state = self.lock();
        if let Some(index) = state.queue.iter().position(|queued| *queued == ticket) {
            state.queue.remove(index);
        }
        drop(state);
        self.queue_advanced.notify_waiters();
    }
}

/// Releases a queued ticket when its waiter goes away without a token.
struct QueueSlot<'a> {
    limiter: &'a RateLimiter,
    ticket: u64,
    armed: bool,
}

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            trace!(ticket = self.ticket, "Abandoning rate limit queue slot");
            self.limiter.abandon(self.ticket);
        }
    }
}
