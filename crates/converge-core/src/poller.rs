//! Interval-based state refresh loop
//!
//! The poller knows nothing about HTTP. It calls a refresh function, sorts the
//! reported status into pending/target, and stops on success, on a status it
//! does not know, on a failed refresh, on timeout, or on cancellation.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;

/// Timing and state sets for one wait
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollSpec {
    /// Statuses meaning "still working"
    #[serde(default)]
    pub pending: BTreeSet<String>,

    /// Statuses meaning "done"
    #[serde(default)]
    pub target: BTreeSet<String>,

    /// Overall budget
    #[serde(with = "secs")]
    pub timeout: Duration,

    /// Wait before the first refresh
    #[serde(with = "secs", default)]
    pub initial_delay: Duration,

    /// Interval between refreshes
    #[serde(with = "secs", default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// Floor for the interval
    #[serde(with = "secs", default = "default_min_poll_interval")]
    pub min_poll_interval: Duration,

    /// Interval growth factor; 1.0 keeps a fixed interval
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Ceiling for the interval when backing off
    #[serde(with = "secs", default = "default_max_poll_interval")]
    pub max_poll_interval: Duration,
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}
fn default_min_poll_interval() -> Duration {
    Duration::from_secs(1)
}
fn default_backoff_multiplier() -> f64 {
    1.0
}
fn default_max_poll_interval() -> Duration {
    Duration::from_secs(30)
}

/// Default budget for a wait
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Budget used for attach/detach races
pub const RACE_RETRY_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Cap for deadlines that do not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

fn deadline_after(start: Instant, budget: Duration) -> Instant {
    start
        .checked_add(budget)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

impl Default for PollSpec {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl PollSpec {
    /// Wait spec with the given budget and default timings, no state sets
    ///
    /// Default intervals longer than `timeout` are shortened to fit it.
    pub fn new(timeout: Duration) -> Self {
        let poll_interval = default_poll_interval().min(timeout);
        Self {
            pending: BTreeSet::new(),
            target: BTreeSet::new(),
            timeout,
            initial_delay: Duration::ZERO,
            poll_interval,
            min_poll_interval: default_min_poll_interval().min(poll_interval),
            backoff_multiplier: default_backoff_multiplier(),
            max_poll_interval: default_max_poll_interval(),
        }
    }

    /// Fixed-backoff spec used while riding out attach/detach races
    pub fn attach_detach_race() -> Self {
        Self::new(RACE_RETRY_TIMEOUT).with_poll_interval(Duration::from_secs(10))
    }

    pub fn pending<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending = states.into_iter().map(Into::into).collect();
        self
    }

    pub fn target<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target = states.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        if self.min_poll_interval > interval {
            self.min_poll_interval = interval;
        }
        self
    }

    pub fn with_min_poll_interval(mut self, interval: Duration) -> Self {
        self.min_poll_interval = interval;
        self
    }

    /// Grow the interval by `multiplier` after each tick, up to `max`
    pub fn with_backoff(mut self, multiplier: f64, max: Duration) -> Self {
        self.backoff_multiplier = multiplier;
        self.max_poll_interval = max;
        self
    }

    /// Reject overlapping state sets and inconsistent timings
    pub fn validate(&self) -> Result<()> {
        if let Some(state) = self.pending.intersection(&self.target).next() {
            return Err(EngineError::InvalidSpec(format!(
                "state {:?} is both pending and target",
                state
            )));
        }
        if self.timeout.is_zero() {
            return Err(EngineError::InvalidSpec("timeout must be positive".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(EngineError::InvalidSpec(
                "poll interval must be positive".into(),
            ));
        }
        if self.poll_interval > self.timeout {
            return Err(EngineError::InvalidSpec(format!(
                "poll interval {:?} exceeds timeout {:?}",
                self.poll_interval, self.timeout
            )));
        }
        if self.min_poll_interval > self.poll_interval {
            return Err(EngineError::InvalidSpec(format!(
                "minimum poll interval {:?} exceeds poll interval {:?}",
                self.min_poll_interval, self.poll_interval
            )));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(EngineError::InvalidSpec(format!(
                "backoff multiplier {} must be finite and >= 1.0",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }

    /// Interval to use after a tick slept for `current`
    pub fn next_interval(&self, current: Duration) -> Duration {
        let next = if self.backoff_multiplier > 1.0 {
            let ceiling = self.max_poll_interval.max(self.poll_interval);
            Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff_multiplier)
                .map_or(ceiling, |grown| grown.min(ceiling))
        } else {
            current
        };
        next.max(self.min_poll_interval)
    }
}

/// Result of one refresh call
#[derive(Debug)]
pub enum Refresh<T> {
    /// Snapshot with its status label
    Observed { state: T, status: String },
    /// Terminal regardless of status label
    Settled(T),
    /// Failure classified as retryable; counts as a pending tick
    Transient(EngineError),
    /// Failure that ends the wait
    Failed(EngineError),
}

impl<T> Refresh<T> {
    pub fn observed(state: T, status: impl Into<String>) -> Self {
        Refresh::Observed {
            state,
            status: status.into(),
        }
    }
}

/// Caller-side bounds on a wait
#[derive(Debug, Clone, Default)]
pub struct WaitContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl WaitContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Upper bound that applies on top of every spec's timeout
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(deadline_after(Instant::now(), timeout))
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Budget available to a wait that asks for `timeout`
    pub fn budget(&self, timeout: Duration) -> Duration {
        match self.deadline {
            Some(deadline) => timeout.min(deadline.saturating_duration_since(Instant::now())),
            None => timeout,
        }
    }
}

/// Poll `refresh` until it reports a target status
///
/// `endpoint` only labels log lines and errors.
pub async fn poll<T, F, Fut>(
    endpoint: &str,
    spec: &PollSpec,
    ctx: &WaitContext,
    mut refresh: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Refresh<T>>,
{
    spec.validate()?;

    let started = Instant::now();
    let budget = ctx.budget(spec.timeout);
    let deadline = deadline_after(started, budget);
    let mut last_status: Option<String> = None;
    let mut last_error: Option<String> = None;
    let mut interval = spec.poll_interval.max(spec.min_poll_interval);
    let mut attempt: u32 = 0;

    let timed_out = |last_status: Option<String>, last_error: Option<String>| {
        EngineError::Timeout {
            endpoint: endpoint.to_string(),
            last_status,
            last_error,
            elapsed: started.elapsed(),
            budget,
        }
    };
    let cancelled = |last_status: Option<String>| EngineError::Cancelled {
        endpoint: endpoint.to_string(),
        last_status,
    };

    if !spec.initial_delay.is_zero() {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(cancelled(last_status)),
            _ = sleep_until(deadline) => return Err(timed_out(last_status, last_error)),
            _ = sleep(spec.initial_delay) => {}
        }
    }

    loop {
        attempt += 1;
        let tick = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(cancelled(last_status)),
            tick = refresh() => tick,
            _ = sleep_until(deadline) => return Err(timed_out(last_status, last_error)),
        };

        match tick {
            Refresh::Observed { state, status } => {
                tracing::debug!(endpoint, attempt, status = %status, "Refreshed state");
                if spec.target.contains(&status) {
                    tracing::info!(endpoint, attempt, status = %status, "Reached target state");
                    return Ok(state);
                }
                if !spec.pending.contains(&status) {
                    return Err(EngineError::UnexpectedState {
                        endpoint: endpoint.to_string(),
                        state: status,
                        pending: spec.pending.iter().cloned().collect(),
                        target: spec.target.iter().cloned().collect(),
                    });
                }
                last_status = Some(status);
                last_error = None;
            }
            Refresh::Settled(state) => {
                tracing::info!(endpoint, attempt, "Settled");
                return Ok(state);
            }
            Refresh::Transient(err) => {
                tracing::warn!(endpoint, attempt, error = %err, "Transient error, polling again");
                last_error = Some(err.to_string());
            }
            Refresh::Failed(err) => return Err(err),
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(timed_out(last_status, last_error));
        }
        let nap = interval.min(deadline - now);
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(cancelled(last_status)),
            _ = sleep(nap) => {}
        }
        interval = spec.next_interval(interval);
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
