//! End-to-end runs of the orchestrator against the in-memory browser

use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::time::Duration;

use lesson_capture::anomaly::QUARANTINE_MESSAGE;
use lesson_capture::{
    ArtifactFormat, ArtifactStore, ErrorEntry, ErrorLog, Orchestrator, ProgressLog, RunMode,
    TerminationReason,
};
use tempfile::TempDir;

mod common;
use common::{FakeLauncher, catalog, encode, lesson_page, test_config, url_for};

fn store_for(dir: &TempDir) -> ArtifactStore {
    ArtifactStore::new(dir.path().join("screenshots"), ArtifactFormat::Png)
}

fn set(ids: &[i64]) -> BTreeSet<i64> {
    ids.iter().copied().collect()
}

#[tokio::test]
async fn captures_missing_items_and_rerun_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new();
    let config = test_config(&dir).format(ArtifactFormat::Jpeg).build().unwrap();

    let summary = Orchestrator::new(config.clone(), catalog(&[1, 2, 3]), launcher.clone())
        .run(RunMode::Missing)
        .await
        .unwrap();

    assert_eq!(summary.produced, 3);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.iterations, 1);
    assert_eq!(summary.reason, TerminationReason::NothingMissing);
    assert_eq!(summary.remaining_missing, 0);

    let store = store_for(&dir);
    assert_eq!(store.list_ids().await.unwrap(), set(&[1, 2, 3]));
    for id in 1..=3 {
        assert!(dir.path().join(format!("screenshots/{id}.jpg")).is_file());
    }
    assert_eq!(
        common::read_to_string(&config.progress_log_path()),
        "1\n2\n3\n"
    );
    assert_eq!(
        launcher.state.visited_urls(),
        vec![url_for(1), url_for(2), url_for(3)]
    );
    assert!(common::read_to_string(&config.error_log_path()).is_empty());
    assert_eq!(launcher.state.launches.load(Ordering::SeqCst), 1);
    assert_eq!(launcher.state.closes.load(Ordering::SeqCst), 1);

    launcher.state.reset_navigations();
    let rerun = Orchestrator::new(config.clone(), catalog(&[1, 2, 3]), launcher.clone())
        .run(RunMode::Missing)
        .await
        .unwrap();

    assert_eq!(launcher.state.navigation_count(), 0);
    assert_eq!(rerun.iterations, 0);
    assert_eq!(rerun.produced, 0);
    assert_eq!(rerun.reason, TerminationReason::NothingMissing);
    assert_eq!(
        common::read_to_string(&config.progress_log_path()),
        "1\n2\n3\n"
    );
}

#[tokio::test]
async fn force_recaptures_existing_artifacts_once() {
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new();
    let config = test_config(&dir).build().unwrap();

    Orchestrator::new(config.clone(), catalog(&[1, 2, 3]), launcher.clone())
        .run(RunMode::Missing)
        .await
        .unwrap();
    launcher.state.reset_navigations();

    let forced = test_config(&dir).force(true).build().unwrap();
    let summary = Orchestrator::new(forced, catalog(&[1, 2, 3]), launcher.clone())
        .run(RunMode::Missing)
        .await
        .unwrap();

    assert_eq!(summary.reason, TerminationReason::ForcedPassComplete);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.produced, 3);
    assert_eq!(launcher.state.navigation_count(), 3);
    for id in 1..=3 {
        assert_eq!(launcher.state.navigations_to(&url_for(id)), 1);
    }

    // Cleared before the pass, so each id appears exactly once
    assert_eq!(
        common::read_to_string(&config.progress_log_path()),
        "1\n2\n3\n"
    );
}

#[tokio::test]
async fn forced_format_switch_leaves_one_artifact_per_id() {
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new();

    let png = test_config(&dir).build().unwrap();
    Orchestrator::new(png, catalog(&[1, 2]), launcher.clone())
        .run(RunMode::Missing)
        .await
        .unwrap();

    let jpeg = test_config(&dir)
        .format(ArtifactFormat::Jpeg)
        .force(true)
        .build()
        .unwrap();
    let summary = Orchestrator::new(jpeg, catalog(&[1, 2]), launcher.clone())
        .run(RunMode::Missing)
        .await
        .unwrap();

    assert_eq!(summary.produced, 2);
    let mut names: Vec<String> = std::fs::read_dir(dir.path().join("screenshots"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["1.jpg", "2.jpg"]);
}

#[tokio::test]
async fn negative_ids_complete_and_stay_complete() {
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new();
    let config = test_config(&dir).build().unwrap();

    let first = Orchestrator::new(config.clone(), catalog(&[-3, 4]), launcher.clone())
        .run(RunMode::Missing)
        .await
        .unwrap();
    assert_eq!(first.reason, TerminationReason::NothingMissing);
    assert_eq!(first.produced, 2);
    assert_eq!(first.remaining_missing, 0);

    launcher.state.reset_navigations();
    let second = Orchestrator::new(config, catalog(&[-3, 4]), launcher.clone())
        .run(RunMode::Missing)
        .await
        .unwrap();
    assert_eq!(second.reason, TerminationReason::NothingMissing);
    assert_eq!(second.iterations, 0);
    assert_eq!(launcher.state.navigation_count(), 0);
}

#[tokio::test]
async fn request_jitter_paces_each_capture() {
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new();
    let paced = test_config(&dir).request_delay_ms(40, 60).build().unwrap();

    let started = std::time::Instant::now();
    let summary = Orchestrator::new(paced, catalog(&[1, 2, 3]), launcher.clone())
        .run(RunMode::Missing)
        .await
        .unwrap();

    assert_eq!(summary.produced, 3);
    // One lane, so the three pauses run back to back
    assert!(started.elapsed() >= Duration::from_millis(120));
}

#[tokio::test]
async fn persistent_failure_is_bounded_and_logged_once_per_iteration() {
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new();
    launcher.state.fail_always(&url_for(2));
    let config = test_config(&dir).max_attempts(2).build().unwrap();

    let summary = Orchestrator::new(config.clone(), catalog(&[1, 2, 3]), launcher.clone())
        .run(RunMode::Missing)
        .await
        .unwrap();

    // Iteration 1 captures 1 and 3; iteration 2 retries 2 alone and makes no progress
    assert_eq!(summary.iterations, 2);
    assert_eq!(summary.reason, TerminationReason::Stuck);
    assert_eq!(summary.produced, 2);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.remaining_missing, 1);
    assert_eq!(launcher.state.navigations_to(&url_for(2)), 4);

    // One entry per exhausted retry controller run
    let raw = common::read_to_string(&config.error_log_path());
    assert_eq!(raw.lines().count(), 2);
    let errors = ErrorLog::new(config.error_log_path()).load().await.unwrap();
    assert_eq!(errors.len(), 1);
    let entry = &errors[&2];
    assert_eq!(entry.target_url, url_for(2));
    assert!(entry.message.contains("ERR_CONNECTION_RESET"), "{}", entry.message);
    assert!(!store_for(&dir).exists(2));
}

#[tokio::test]
async fn transient_failure_recovers_within_attempt_budget() {
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new();
    launcher.state.fail_times(&url_for(2), 1);
    let config = test_config(&dir).max_attempts(2).build().unwrap();

    let summary = Orchestrator::new(config.clone(), catalog(&[1, 2, 3]), launcher.clone())
        .run(RunMode::Missing)
        .await
        .unwrap();

    assert_eq!(summary.produced, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(launcher.state.navigations_to(&url_for(2)), 2);
    assert!(ErrorLog::new(config.error_log_path()).load_ids().await.unwrap().is_empty());
}

#[tokio::test]
async fn terminal_status_skips_remaining_attempts() {
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new();
    launcher.state.respond_with_status(&url_for(1), 404);
    let config = test_config(&dir)
        .max_attempts(3)
        .terminal_statuses(vec![404])
        .build()
        .unwrap();

    let summary = Orchestrator::new(config.clone(), catalog(&[1]), launcher.clone())
        .run(RunMode::Missing)
        .await
        .unwrap();

    assert_eq!(summary.reason, TerminationReason::Stuck);
    assert_eq!(launcher.state.navigations_to(&url_for(1)), 1);
    let errors = ErrorLog::new(config.error_log_path()).load().await.unwrap();
    assert_eq!(errors[&1].message, "HTTP error: 404");
}

#[tokio::test]
async fn http_errors_are_retried_by_default() {
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new();
    launcher.state.respond_with_status(&url_for(1), 503);
    let config = test_config(&dir).max_attempts(3).build().unwrap();

    Orchestrator::new(config, catalog(&[1]), launcher.clone())
        .run(RunMode::Missing)
        .await
        .unwrap();

    assert_eq!(launcher.state.navigations_to(&url_for(1)), 3);
}

#[tokio::test]
async fn in_flight_operations_never_exceed_budget() {
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new();
    launcher.state.set_navigation_delay(Duration::from_millis(30));
    let ids: Vec<i64> = (1..=12).collect();
    let config = test_config(&dir)
        .pool_size(4)
        .semaphore_budget(2)
        .build()
        .unwrap();

    let summary = Orchestrator::new(config, catalog(&ids), launcher.clone())
        .run(RunMode::Missing)
        .await
        .unwrap();

    assert_eq!(summary.produced, 12);
    let peak = launcher.state.max_in_flight.load(Ordering::SeqCst);
    assert!(peak >= 1);
    assert!(peak <= 2, "peak in-flight {peak} exceeded budget");
    assert_eq!(launcher.state.launches.load(Ordering::SeqCst), 4);
    assert_eq!(launcher.state.closes.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn resumes_from_artifacts_already_on_disk() {
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new();
    let config = test_config(&dir).build().unwrap();

    // A previous run died after writing 1 and 2 but before logging them
    let store = store_for(&dir);
    store.ensure_dir().await.unwrap();
    for id in [1, 2] {
        store
            .write(id, encode(&lesson_page(), ArtifactFormat::Png))
            .await
            .unwrap();
    }

    let summary = Orchestrator::new(config.clone(), catalog(&[1, 2, 3]), launcher.clone())
        .run(RunMode::Missing)
        .await
        .unwrap();

    assert_eq!(summary.produced, 1);
    assert_eq!(launcher.state.navigation_count(), 1);
    assert_eq!(launcher.state.navigations_to(&url_for(3)), 1);

    let logged = ProgressLog::new(config.progress_log_path()).load().await.unwrap();
    assert_eq!(logged, set(&[1, 2, 3]));
}

#[tokio::test]
async fn skip_errors_leaves_known_bad_ids_alone() {
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new();
    let config = test_config(&dir).skip_errors(true).build().unwrap();

    ErrorLog::new(config.error_log_path())
        .append(&ErrorEntry::new(2, url_for(2), "timeout"))
        .await
        .unwrap();

    let summary = Orchestrator::new(config, catalog(&[1, 2, 3]), launcher.clone())
        .run(RunMode::Missing)
        .await
        .unwrap();

    assert_eq!(summary.reason, TerminationReason::NothingMissing);
    assert_eq!(summary.produced, 2);
    assert_eq!(launcher.state.navigations_to(&url_for(2)), 0);
    assert_eq!(store_for(&dir).list_ids().await.unwrap(), set(&[1, 3]));
}

#[tokio::test]
async fn retry_errors_only_touches_logged_ids() {
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new();
    let config = test_config(&dir).build().unwrap();

    let errors = ErrorLog::new(config.error_log_path());
    errors
        .append(&ErrorEntry::new(2, url_for(2), "timeout"))
        .await
        .unwrap();
    // Unknown to the catalog; rebuilt from the recorded URL
    let orphan_url = format!("{}/classroom/public-lesson/legacy-9/run/4/", common::BASE_URL);
    errors
        .append(&ErrorEntry::new(99, &orphan_url, "timeout"))
        .await
        .unwrap();

    let summary = Orchestrator::new(config, catalog(&[1, 2, 3]), launcher.clone())
        .run(RunMode::RetryErrors)
        .await
        .unwrap();

    assert_eq!(summary.produced, 2);
    assert_eq!(launcher.state.navigation_count(), 2);
    assert_eq!(launcher.state.navigations_to(&url_for(2)), 1);
    assert_eq!(launcher.state.navigations_to(&orphan_url), 1);
    assert_eq!(store_for(&dir).list_ids().await.unwrap(), set(&[2, 99]));
}

#[tokio::test]
async fn explicit_ids_restrict_the_run() {
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new();
    let config = test_config(&dir).build().unwrap();

    Orchestrator::new(config, catalog(&[1, 2, 3, 4]), launcher.clone())
        .run(RunMode::Ids(vec![3, 1, 3]))
        .await
        .unwrap();

    assert_eq!(launcher.state.navigation_count(), 2);
    assert_eq!(store_for(&dir).list_ids().await.unwrap(), set(&[1, 3]));
}

#[tokio::test]
async fn total_limit_caps_dispatched_items() {
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new();
    let ids: Vec<i64> = (1..=10).collect();
    let config = test_config(&dir)
        .batch_size(3)
        .total_limit(Some(5))
        .build()
        .unwrap();

    let summary = Orchestrator::new(config, catalog(&ids), launcher.clone())
        .run(RunMode::Missing)
        .await
        .unwrap();

    assert_eq!(summary.reason, TerminationReason::LimitReached);
    assert_eq!(summary.iterations, 2);
    assert_eq!(summary.produced, 5);
    assert_eq!(summary.remaining_missing, 5);
    assert_eq!(launcher.state.navigation_count(), 5);
}

#[tokio::test]
async fn failed_lane_launch_loses_only_its_sub_batch() {
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new();
    launcher.state.fail_lane(1);
    let config = test_config(&dir).pool_size(2).build().unwrap();

    let summary = Orchestrator::new(config.clone(), catalog(&[1, 2, 3, 4]), launcher.clone())
        .run(RunMode::Missing)
        .await
        .unwrap();

    // [1,2] + lost [3,4], then [3] + lost [4], then [4] on lane 0 alone
    assert_eq!(summary.iterations, 3);
    assert_eq!(summary.failed, 3);
    assert_eq!(summary.produced, 4);
    assert_eq!(summary.reason, TerminationReason::NothingMissing);
    assert!(ErrorLog::new(config.error_log_path()).load_ids().await.unwrap().is_empty());
}

#[tokio::test]
async fn challenge_pages_are_quarantined() {
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new();
    launcher.state.serve_challenge(&url_for(2));
    let config = test_config(&dir).anomaly_check(true).build().unwrap();

    let summary = Orchestrator::new(config.clone(), catalog(&[1, 2, 3]), launcher.clone())
        .run(RunMode::Missing)
        .await
        .unwrap();

    // Without skip-errors the quarantined id stays missing and is retried once
    assert_eq!(summary.reason, TerminationReason::Stuck);
    assert_eq!(summary.iterations, 2);
    assert_eq!(summary.quarantined, 2);
    assert_eq!(summary.produced, 2);
    assert_eq!(summary.remaining_missing, 1);

    let store = store_for(&dir);
    assert!(!store.exists(2));
    assert!(dir.path().join("screenshots/captcha_2.png").is_file());

    let errors = ErrorLog::new(config.error_log_path()).load().await.unwrap();
    assert_eq!(errors[&2].message, QUARANTINE_MESSAGE);
}

#[tokio::test]
async fn quarantined_ids_are_excluded_with_skip_errors() {
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new();
    launcher.state.serve_challenge(&url_for(2));
    let config = test_config(&dir)
        .anomaly_check(true)
        .skip_errors(true)
        .build()
        .unwrap();

    let summary = Orchestrator::new(config, catalog(&[1, 2, 3]), launcher.clone())
        .run(RunMode::Missing)
        .await
        .unwrap();

    assert_eq!(summary.reason, TerminationReason::NothingMissing);
    assert_eq!(summary.quarantined, 1);
    assert_eq!(launcher.state.navigations_to(&url_for(2)), 1);
}

#[tokio::test]
async fn watermarked_jpeg_artifacts_are_written() {
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new();
    let config = test_config(&dir)
        .format(ArtifactFormat::Jpeg)
        .watermark(Some(lesson_capture::WatermarkSpec::default()))
        .build()
        .unwrap();

    Orchestrator::new(config, catalog(&[5]), launcher)
        .run(RunMode::Missing)
        .await
        .unwrap();

    let bytes = std::fs::read(dir.path().join("screenshots/5.jpg")).unwrap();
    let decoded = image::load_from_memory(&bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (400, 300));
}

#[tokio::test]
async fn missing_set_reports_without_capturing() {
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new();
    let config = test_config(&dir).build().unwrap();

    let store = store_for(&dir);
    store.ensure_dir().await.unwrap();
    store
        .write(2, encode(&lesson_page(), ArtifactFormat::Png))
        .await
        .unwrap();

    let orchestrator = Orchestrator::new(config, catalog(&[3, 1, 2]), launcher.clone());
    let missing: Vec<i64> = orchestrator
        .missing_set()
        .await
        .unwrap()
        .into_iter()
        .map(|item| item.id)
        .collect();

    assert_eq!(missing, vec![1, 3]);
    assert_eq!(launcher.state.launches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn retry_controller_stops_at_max_attempts() {
    use lesson_capture::capture_engine::{CaptureContext, NoOpProgress, capture_with_retry};
    use lesson_capture::{BrowserLauncher, BrowserSession, ItemOutcome};
    use std::sync::Arc;

    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new();
    launcher.state.fail_always(&url_for(8));
    let config = test_config(&dir).max_attempts(3).build().unwrap();
    let ctx = CaptureContext::from_config(&config, Arc::new(NoOpProgress));

    let mut session = launcher.launch(0).await.unwrap();
    let item = common::items(&[8]).remove(0);
    let outcome = capture_with_retry(session.page(), &item, &ctx).await.unwrap();
    session.close().await;

    assert!(matches!(outcome, ItemOutcome::Failed { attempts: 3, .. }), "{outcome:?}");
    assert_eq!(launcher.state.navigations_to(&url_for(8)), 3);
    assert_eq!(common::read_to_string(&config.error_log_path()).lines().count(), 1);
    assert_eq!(ctx.limiter.available(), 2);
}
