//! Bounded readiness waits.
//!
//! A [`Waiter`] repeatedly invokes a [`ReadinessProbe`] on a fixed cadence until the
//! probe reports [`Readiness::Ready`] or the [`WaitPolicy`] deadline elapses. Probes
//! answer with a tri-state result so that "not there yet" and "something is broken"
//! are never confused: the former is retried, the latter ends the wait immediately.
//!
//! ```
//! use std::time::Duration;
//! use winprovision::{Readiness, WaitPolicy, Waiter};
//!
//! let policy = WaitPolicy::new(Duration::from_millis(200), Duration::from_millis(10)).unwrap();
//! let mut calls = 0;
//! let outcome = Waiter::new("counter reaches 3", policy)
//!     .wait(|| {
//!         calls += 1;
//!         if calls == 3 {
//!             Readiness::Ready(calls)
//!         } else {
//!             Readiness::<i32, String>::NotReadyYet
//!         }
//!     })
//!     .unwrap();
//! assert_eq!(outcome.into_result().unwrap(), 3);
//! ```

use crate::errors::AutomationError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// How long and how often to probe.
///
/// Serialized as `{ "timeout_seconds": f64, "poll_interval_seconds": f64 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WaitPolicySeconds", into = "WaitPolicySeconds")]
pub struct WaitPolicy {
    timeout: Duration,
    poll_interval: Duration,
}

impl WaitPolicy {
    /// Build a policy. The poll interval must be non-zero.
    pub fn new(timeout: Duration, poll_interval: Duration) -> Result<Self, AutomationError> {
        if poll_interval.is_zero() {
            return Err(AutomationError::InvalidArgument(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            timeout,
            poll_interval,
        })
    }

    pub fn from_secs_f64(timeout: f64, poll_interval: f64) -> Result<Self, AutomationError> {
        let to_duration = |label: &str, value: f64| {
            Duration::try_from_secs_f64(value).map_err(|e| {
                AutomationError::InvalidArgument(format!("invalid {label} '{value}': {e}"))
            })
        };
        Self::new(
            to_duration("timeout_seconds", timeout)?,
            to_duration("poll_interval_seconds", poll_interval)?,
        )
    }

    /// Const constructor for built-in defaults.
    ///
    /// # Panics
    /// When `poll_interval_ms` is zero.
    pub const fn from_millis(timeout_ms: u64, poll_interval_ms: u64) -> Self {
        assert!(poll_interval_ms > 0, "poll interval must be greater than zero");
        Self {
            timeout: Duration::from_millis(timeout_ms),
            poll_interval: Duration::from_millis(poll_interval_ms),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Same cadence, different budget.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Delay before the next probe, never sleeping past the deadline.
    fn next_delay(&self, elapsed: Duration) -> Duration {
        self.poll_interval.min(self.timeout.saturating_sub(elapsed))
    }
}

#[derive(Serialize, Deserialize)]
struct WaitPolicySeconds {
    timeout_seconds: f64,
    poll_interval_seconds: f64,
}

impl TryFrom<WaitPolicySeconds> for WaitPolicy {
    type Error = AutomationError;

    fn try_from(raw: WaitPolicySeconds) -> Result<Self, Self::Error> {
        WaitPolicy::from_secs_f64(raw.timeout_seconds, raw.poll_interval_seconds)
    }
}

impl From<WaitPolicy> for WaitPolicySeconds {
    fn from(policy: WaitPolicy) -> Self {
        Self {
            timeout_seconds: policy.timeout.as_secs_f64(),
            poll_interval_seconds: policy.poll_interval.as_secs_f64(),
        }
    }
}

/// What a single probe call observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness<T, E> {
    /// The condition does not hold yet; try again after the poll interval.
    NotReadyYet,
    /// The condition holds; the wait ends with this value.
    Ready(T),
    /// A genuine failure; the wait ends with this error.
    Fault(E),
}

impl<T, E> From<Option<T>> for Readiness<T, E> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Readiness::Ready(value),
            None => Readiness::NotReadyYet,
        }
    }
}

/// Something the waiter can poll.
///
/// Any `FnMut() -> Readiness<T, E>` is a probe; see [`crate::probe`] for adapters
/// from booleans, options and results.
pub trait ReadinessProbe {
    type Output;
    type Error;

    fn probe(&mut self) -> Readiness<Self::Output, Self::Error>;
}

impl<F, T, E> ReadinessProbe for F
where
    F: FnMut() -> Readiness<T, E>,
{
    type Output = T;
    type Error = E;

    fn probe(&mut self) -> Readiness<T, E> {
        self()
    }
}

/// Terminal result of a wait that did not fault.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome<T> {
    Ready {
        value: T,
        elapsed: Duration,
        attempts: u32,
    },
    TimedOut {
        condition: String,
        elapsed: Duration,
        timeout: Duration,
        attempts: u32,
    },
}

impl<T> WaitOutcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, WaitOutcome::Ready { .. })
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, WaitOutcome::TimedOut { .. })
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            WaitOutcome::Ready { elapsed, .. } | WaitOutcome::TimedOut { elapsed, .. } => *elapsed,
        }
    }

    /// Number of probe invocations made.
    pub fn attempts(&self) -> u32 {
        match self {
            WaitOutcome::Ready { attempts, .. } | WaitOutcome::TimedOut { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn ready(self) -> Option<T> {
        match self {
            WaitOutcome::Ready { value, .. } => Some(value),
            WaitOutcome::TimedOut { .. } => None,
        }
    }

    /// Treat a timeout as a hard failure.
    pub fn into_result(self) -> Result<T, AutomationError> {
        match self {
            WaitOutcome::Ready { value, .. } => Ok(value),
            WaitOutcome::TimedOut {
                condition,
                elapsed,
                timeout,
                ..
            } => Err(AutomationError::Timeout {
                condition,
                elapsed,
                timeout,
            }),
        }
    }
}

/// A single bounded wait for one named condition.
#[derive(Debug, Clone)]
pub struct Waiter {
    condition: String,
    policy: WaitPolicy,
}

impl Waiter {
    pub fn new(condition: impl Into<String>, policy: WaitPolicy) -> Self {
        Self {
            condition: condition.into(),
            policy,
        }
    }

    /// Poll on the calling thread until ready, faulted or timed out.
    #[instrument(level = "debug", skip(self, probe), fields(condition = %self.condition))]
    pub fn wait<P>(&self, mut probe: P) -> Result<WaitOutcome<P::Output>, P::Error>
    where
        P: ReadinessProbe,
        P::Error: Display,
    {
        let start = std::time::Instant::now();
        let mut attempts = 0u32;
        loop {
            let elapsed = start.elapsed();
            if elapsed >= self.policy.timeout {
                return Ok(self.timed_out(elapsed, attempts));
            }
            attempts += 1;
            match probe.probe() {
                Readiness::Ready(value) => return Ok(self.ready(value, start.elapsed(), attempts)),
                Readiness::Fault(e) => return Err(self.faulted(e, attempts)),
                Readiness::NotReadyYet => debug!(attempt = attempts, "not ready yet"),
            }
            std::thread::sleep(self.policy.next_delay(start.elapsed()));
        }
    }

    /// Same as [`Waiter::wait`] but sleeps on the tokio timer between probes.
    #[instrument(level = "debug", skip(self, probe), fields(condition = %self.condition))]
    pub async fn wait_async<P>(&self, mut probe: P) -> Result<WaitOutcome<P::Output>, P::Error>
    where
        P: ReadinessProbe,
        P::Error: Display,
    {
        let start = tokio::time::Instant::now();
        let mut attempts = 0u32;
        loop {
            let elapsed = start.elapsed();
            if elapsed >= self.policy.timeout {
                return Ok(self.timed_out(elapsed, attempts));
            }
            attempts += 1;
            match probe.probe() {
                Readiness::Ready(value) => return Ok(self.ready(value, start.elapsed(), attempts)),
                Readiness::Fault(e) => return Err(self.faulted(e, attempts)),
                Readiness::NotReadyYet => debug!(attempt = attempts, "not ready yet"),
            }
            tokio::time::sleep(self.policy.next_delay(start.elapsed())).await;
        }
    }

    fn ready<T>(&self, value: T, elapsed: Duration, attempts: u32) -> WaitOutcome<T> {
        info!(
            "{} ready after {:?} ({} attempts)",
            self.condition, elapsed, attempts
        );
        WaitOutcome::Ready {
            value,
            elapsed,
            attempts,
        }
    }

    fn timed_out<T>(&self, elapsed: Duration, attempts: u32) -> WaitOutcome<T> {
        warn!(
            "gave up waiting for {} after {:?} ({} attempts, timeout {:?})",
            self.condition, elapsed, attempts, self.policy.timeout
        );
        WaitOutcome::TimedOut {
            condition: self.condition.clone(),
            elapsed,
            timeout: self.policy.timeout,
            attempts,
        }
    }

    fn faulted<E: Display>(&self, error: E, attempts: u32) -> E {
        warn!(
            "probe for {} faulted on attempt {}: {}",
            self.condition, attempts, error
        );
        error
    }
}

/// Wait for `condition`, treating a timeout as an error.
pub fn wait_for<P>(
    condition: impl Into<String>,
    policy: WaitPolicy,
    probe: P,
) -> Result<P::Output, AutomationError>
where
    P: ReadinessProbe,
    P::Error: Display + Into<AutomationError>,
{
    Waiter::new(condition, policy)
        .wait(probe)
        .map_err(Into::into)?
        .into_result()
}

/// Async flavour of [`wait_for`].
pub async fn wait_for_async<P>(
    condition: impl Into<String>,
    policy: WaitPolicy,
    probe: P,
) -> Result<P::Output, AutomationError>
where
    P: ReadinessProbe,
    P::Error: Display + Into<AutomationError>,
{
    Waiter::new(condition, policy)
        .wait_async(probe)
        .await
        .map_err(Into::into)?
        .into_result()
}
