use std::convert::Infallible;
use std::time::{Duration, Instant};
use winprovision::probe::{absorb_errors, blocking, fallible, present, transient_when, until};
use winprovision::{
    wait_for, wait_for_async, AutomationError, Readiness, WaitOutcome, WaitPolicy, Waiter,
};

fn policy(timeout_ms: u64, poll_ms: u64) -> WaitPolicy {
    WaitPolicy::new(
        Duration::from_millis(timeout_ms),
        Duration::from_millis(poll_ms),
    )
    .unwrap()
}

#[test]
fn test_zero_poll_interval_is_rejected() {
    let err = WaitPolicy::new(Duration::from_secs(10), Duration::ZERO).unwrap_err();
    assert!(matches!(err, AutomationError::InvalidArgument(_)));
    assert!(WaitPolicy::from_secs_f64(10.0, 0.0).is_err());
    assert!(WaitPolicy::from_secs_f64(-1.0, 1.0).is_err());
}

#[test]
fn test_always_false_times_out_within_bounds() {
    let _ = tracing_subscriber::fmt::try_init();
    let started = Instant::now();

    let outcome = Waiter::new("never", policy(200, 50))
        .wait(until(|| false))
        .unwrap();

    let elapsed = started.elapsed();
    assert!(outcome.is_timed_out());
    assert!(outcome.elapsed() >= Duration::from_millis(200));
    assert!(elapsed >= Duration::from_millis(200));
    // at most one poll interval of overshoot, plus scheduling slack
    assert!(elapsed < Duration::from_millis(200 + 50 + 150), "{elapsed:?}");
    assert!((1..=5).contains(&outcome.attempts()), "{}", outcome.attempts());
}

#[test]
fn test_ready_on_third_call() {
    let mut calls = 0;
    let outcome = Waiter::new("third call", policy(2_000, 10))
        .wait(present(|| {
            calls += 1;
            (calls == 3).then_some("done")
        }))
        .unwrap();

    assert_eq!(outcome.attempts(), 3);
    assert_eq!(outcome.ready(), Some("done"));
    assert_eq!(calls, 3);
}

#[test]
fn test_ready_immediately_does_not_sleep() {
    let started = Instant::now();
    wait_for("already there", policy(5_000, 1_000), until(|| true)).unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[test]
fn test_zero_timeout_never_probes() {
    let mut calls = 0;
    let outcome = Waiter::new("nothing", policy(0, 10))
        .wait(until(|| {
            calls += 1;
            true
        }))
        .unwrap();

    assert!(outcome.is_timed_out());
    assert_eq!(outcome.attempts(), 0);
    assert_eq!(calls, 0);
}

#[test]
fn test_fault_ends_wait_immediately() {
    let mut calls = 0;
    let started = Instant::now();

    let err = Waiter::new("broken", policy(5_000, 100))
        .wait(fallible(|| -> Result<Option<()>, String> {
            calls += 1;
            Err("access denied".to_string())
        }))
        .unwrap_err();

    assert_eq!(err, "access denied");
    assert_eq!(calls, 1);
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[test]
fn test_absorbed_errors_are_retried_until_ready() {
    let mut calls = 0;
    let outcome = Waiter::new("flaky", policy(2_000, 10))
        .wait(absorb_errors(|| -> Result<Option<u32>, String> {
            calls += 1;
            match calls {
                1 | 2 => Err(format!("lookup failed #{calls}")),
                3 => Ok(None),
                _ => Ok(Some(calls)),
            }
        }))
        .unwrap();

    assert_eq!(outcome.ready(), Some(4));
}

#[test]
fn test_absorbed_errors_end_in_timeout_not_error() {
    let outcome = Waiter::new("always failing", policy(50, 10))
        .wait(absorb_errors(|| -> Result<Option<()>, String> {
            Err("still failing".to_string())
        }))
        .unwrap();

    assert!(outcome.is_timed_out());
}

#[test]
fn test_only_transient_errors_are_retried() {
    let mut calls = 0;
    let err = Waiter::new("picky", policy(2_000, 10))
        .wait(transient_when(
            || -> Result<Option<()>, AutomationError> {
                calls += 1;
                if calls < 3 {
                    Err(AutomationError::ElementNotFound("button|Next".to_string()))
                } else {
                    Err(AutomationError::PlatformError("COM server died".to_string()))
                }
            },
            |e| matches!(e, AutomationError::ElementNotFound(_)),
        ))
        .unwrap_err();

    assert!(matches!(err, AutomationError::PlatformError(_)));
    assert_eq!(calls, 3);
}

#[test]
fn test_wait_for_turns_timeout_into_error() {
    let err = wait_for("never", policy(30, 10), until(|| false)).unwrap_err();
    match err {
        AutomationError::Timeout {
            condition, timeout, ..
        } => {
            assert_eq!(condition, "never");
            assert_eq!(timeout, Duration::from_millis(30));
        }
        other => panic!("expected Timeout, got {other:?}"),
    }
}

#[test]
fn test_closure_probe_with_custom_readiness() {
    let mut readings = vec![Readiness::NotReadyYet, Readiness::Ready(7)].into_iter();
    let outcome = Waiter::new("scripted", policy(1_000, 5))
        .wait(move || readings.next().unwrap_or(Readiness::<i32, Infallible>::NotReadyYet))
        .unwrap();

    assert!(matches!(outcome, WaitOutcome::Ready { value: 7, attempts: 2, .. }));
}

// The scenarios below run on tokio's paused clock, so the timings are exact.

#[tokio::test(start_paused = true)]
async fn test_async_always_false_times_out_after_two_polls() {
    let mut calls = 0;
    let outcome = Waiter::new("never", policy(10_000, 5_000))
        .wait_async(until(|| {
            calls += 1;
            false
        }))
        .await
        .unwrap();

    match outcome {
        WaitOutcome::TimedOut {
            elapsed, attempts, ..
        } => {
            assert_eq!(attempts, 2);
            assert!(elapsed >= Duration::from_secs(10));
            assert!(elapsed < Duration::from_secs(11));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(calls, 2);
}

#[tokio::test(start_paused = true)]
async fn test_async_ready_on_second_call() {
    let mut calls = 0;
    let started = tokio::time::Instant::now();

    wait_for_async(
        "second call",
        policy(10_000, 5_000),
        until(|| {
            calls += 1;
            calls == 2
        }),
    )
    .await
    .unwrap();

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn test_async_transient_error_then_ready() {
    let mut calls = 0;
    let outcome = Waiter::new("flaky", policy(10_000, 5_000))
        .wait_async(absorb_errors(|| -> Result<Option<&'static str>, String> {
            calls += 1;
            if calls == 1 {
                Err("window handle went stale".to_string())
            } else {
                Ok(Some("ready"))
            }
        }))
        .await
        .unwrap();

    assert_eq!(outcome.attempts(), 2);
    assert!(outcome.elapsed() >= Duration::from_secs(5));
    assert_eq!(outcome.ready(), Some("ready"));
}

#[tokio::test(start_paused = true)]
async fn test_async_last_sleep_is_clamped_to_deadline() {
    let outcome = Waiter::new("never", policy(12_000, 5_000))
        .wait_async(until(|| false))
        .await
        .unwrap();

    // probes at 0, 5 and 10s; the last sleep is 2s, not 5s
    assert_eq!(outcome.attempts(), 3);
    assert!(outcome.elapsed() < Duration::from_secs(13));
}

#[test]
fn test_policy_serde_uses_seconds() {
    let policy = WaitPolicy::from_secs_f64(900.0, 5.0).unwrap();
    let json = serde_json::to_value(policy).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"timeout_seconds": 900.0, "poll_interval_seconds": 5.0})
    );

    let parsed: WaitPolicy =
        serde_json::from_str(r#"{"timeout_seconds": 0.5, "poll_interval_seconds": 0.1}"#).unwrap();
    assert_eq!(parsed, policy_ms(500, 100));

    let rejected =
        serde_json::from_str::<WaitPolicy>(r#"{"timeout_seconds": 1, "poll_interval_seconds": 0}"#);
    assert!(rejected.is_err());
}

fn policy_ms(timeout_ms: u64, poll_ms: u64) -> WaitPolicy {
    WaitPolicy::from_millis(timeout_ms, poll_ms)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_probe_does_not_stall_other_tasks() {
    let ticker = tokio::spawn(async {
        let mut ticks = 0u32;
        while ticks < 5 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            ticks += 1;
        }
        ticks
    });

    let mut calls = 0;
    let outcome = Waiter::new("slow sampler", policy(2_000, 10))
        .wait_async(blocking(until(|| {
            // stands in for a CPU sample that sleeps between two refreshes
            std::thread::sleep(Duration::from_millis(20));
            calls += 1;
            calls == 3
        })))
        .await
        .unwrap();

    assert_eq!(outcome.attempts(), 3);
    assert_eq!(ticker.await.unwrap(), 5);
}
