use super::mock::{screenshot_with, MockBackend, Scripted, INSTALLER_PID, START_BUTTON};
use crate::{AutomationError, Desktop, Selector, WaitPolicy};
use regex::Regex;
use std::sync::Arc;

const FAST: WaitPolicy = WaitPolicy::from_millis(2_000, 100);

#[tokio::test(start_paused = true)]
async fn test_wait_for_window_filters_by_process() {
    let backend = Arc::new(
        MockBackend::new()
            .window(Scripted::new("window", "MetaEditor").owned_by(1))
            .window(Scripted::new("window", "MetaTrader 5 Setup").appears_after(3)),
    );
    let desktop = Desktop::with_backend(backend.clone());
    let title = Regex::new(".*Meta.*").unwrap();

    let outcome = desktop
        .wait_for_window(&title, Some(INSTALLER_PID), FAST)
        .await
        .unwrap();

    assert_eq!(outcome.attempts(), 4);
    let window = outcome.into_result().unwrap();
    assert_eq!(window.name_or_empty(), "MetaTrader 5 Setup");
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_window_times_out_as_outcome() {
    let backend = Arc::new(MockBackend::new());
    let desktop = Desktop::with_backend(backend);
    let title = Regex::new("^Nothing$").unwrap();

    let outcome = desktop.wait_for_window(&title, None, FAST).await.unwrap();

    assert!(outcome.is_timed_out());
    // 2s at 100ms: t = 0, 0.1, ..., 1.9
    assert_eq!(outcome.attempts(), 20);
}

#[tokio::test(start_paused = true)]
async fn test_locator_waits_until_enabled() {
    let backend = Arc::new(
        MockBackend::new().element(Scripted::new("button", "Next").enabled_after(2)),
    );
    let desktop = Desktop::with_backend(backend.clone());

    let outcome = desktop
        .locator("button|Next")
        .unwrap()
        .with_policy(FAST)
        .wait_ready_outcome()
        .await
        .unwrap();

    assert_eq!(outcome.attempts(), 3);
    assert!(outcome.into_result().unwrap().is_enabled().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_button_name_matches_label_with_arrow() {
    let backend = Arc::new(MockBackend::new().element(Scripted::new("button", "Next >")));
    let desktop = Desktop::with_backend(backend);

    let button = desktop
        .locator(Selector::button("Next"))
        .unwrap()
        .with_policy(FAST)
        .wait_ready()
        .await
        .unwrap();

    assert_eq!(button.name_or_empty(), "Next >");
}

#[tokio::test(start_paused = true)]
async fn test_locator_wait_only_needs_existence() {
    let backend = Arc::new(
        MockBackend::new().element(Scripted::new("button", "Next").enabled_after(10)),
    );
    let desktop = Desktop::with_backend(backend);

    let element = desktop
        .locator(Selector::button("Next"))
        .unwrap()
        .with_policy(FAST)
        .wait()
        .await
        .unwrap();

    assert!(!element.is_enabled().unwrap());
    assert!(matches!(
        element.click(),
        Err(AutomationError::ElementNotEnabled(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_locator_fault_ends_wait_on_first_attempt() {
    let backend = Arc::new(
        MockBackend::new()
            .element(Scripted::new("button", "Next"))
            .failing_lookups("automation server unavailable"),
    );
    let desktop = Desktop::with_backend(backend.clone());
    let started = tokio::time::Instant::now();

    let err = desktop
        .locator("button|Next")
        .unwrap()
        .with_policy(FAST)
        .wait_ready()
        .await
        .unwrap_err();

    assert!(matches!(err, AutomationError::PlatformError(_)), "{err:?}");
    assert_eq!(backend.probes(), 1);
    assert_eq!(started.elapsed(), std::time::Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_locator_hard_wait_reports_selector_in_timeout() {
    let backend = Arc::new(MockBackend::new());
    let desktop = Desktop::with_backend(backend);

    let err = desktop
        .locator("button|Finish")
        .unwrap()
        .with_policy(FAST)
        .wait_ready()
        .await
        .unwrap_err();

    match err {
        AutomationError::Timeout { condition, .. } => {
            assert_eq!(condition, "button|Finish to be visible and enabled")
        }
        other => panic!("expected Timeout, got {other:?}"),
    }
}

#[test]
fn test_invalid_selector_is_rejected_up_front() {
    let desktop = Desktop::with_backend(Arc::new(MockBackend::new()));

    assert!(matches!(
        desktop.locator("").err(),
        Some(AutomationError::InvalidSelector(_))
    ));
    assert!(matches!(
        desktop.locator("window >> ").err(),
        Some(AutomationError::InvalidSelector(_))
    ));
}

#[test]
fn test_nested_locator_appends_to_chain() {
    let desktop = Desktop::with_backend(Arc::new(MockBackend::new()));
    let nested = desktop
        .locator("window|MetaTrader 5 Setup")
        .unwrap()
        .locator("button|Next");

    assert_eq!(
        nested.selector_string(),
        "window|MetaTrader 5 Setup >> button|Next"
    );
    assert!(nested.find().unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_cpu_idle_returns_the_settled_sample() {
    let backend = Arc::new(MockBackend::new().cpu_samples(&[Some(60.0), Some(9.0), Some(4.0)]));
    let desktop = Desktop::with_backend(backend);

    let outcome = desktop
        .wait_for_cpu_idle(INSTALLER_PID, 5.0, FAST)
        .await
        .unwrap();

    assert_eq!(outcome.attempts(), 3);
    assert_eq!(outcome.ready(), Some(4.0));
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_unknown_process_times_out() {
    let desktop = Desktop::with_backend(Arc::new(MockBackend::new()));

    let outcome = desktop.wait_for_process(7, FAST).await.unwrap();

    assert!(outcome.is_timed_out());
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_image_rejects_bad_confidence_before_capturing() {
    let blank = screenshot_with(20, 20, None);
    let backend = Arc::new(MockBackend::new().screen(blank.clone(), blank, 0));
    let desktop = Desktop::with_backend(backend.clone());
    let template = image::GrayImage::from_raw(4, 4, START_BUTTON.to_vec()).unwrap();

    for confidence in [-1.0, 0.0, f32::NAN] {
        let err = desktop
            .wait_for_image("Start button", &template, confidence, FAST)
            .await
            .unwrap_err();
        assert!(matches!(err, AutomationError::InvalidArgument(_)), "{err:?}");
    }
    assert_eq!(backend.probes(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_screen_probe_runs_on_multi_threaded_runtime() {
    let screen = screenshot_with(20, 20, Some((START_BUTTON.as_slice(), 4, 8, 2)));
    let backend = Arc::new(MockBackend::new().screen(screenshot_with(20, 20, None), screen, 1));
    let desktop = Desktop::with_backend(backend);
    let template = image::GrayImage::from_raw(4, 4, START_BUTTON.to_vec()).unwrap();

    let outcome = desktop
        .wait_for_image("Start button", &template, 0.9, WaitPolicy::from_millis(2_000, 10))
        .await
        .unwrap();

    assert_eq!(outcome.attempts(), 2);
    let found = outcome.ready().unwrap();
    assert_eq!((found.x, found.y), (8, 2));
}
