// End-to-end runs of the sync engine against an in-memory bucket

use std::collections::HashSet;
use std::time::Duration;

use bucketsync::sync::{DiffStrategy, FailureLedger, LockManager, LOCK_FILE};
use bucketsync::SyncError;

use crate::common::{key_of, Fixture};

#[tokio::test]
async fn test_first_run_uploads_everything_then_nothing() {
    let fixture = Fixture::new();
    let a = fixture.write_old("a.txt", b"alpha");
    let b = fixture.write_old("nested/b.txt", b"beta");

    let outcome = fixture.engine().run().await.unwrap();
    assert_eq!(outcome.strategy, DiffStrategy::Checksum);
    assert_eq!(outcome.report.uploaded.len(), 2);
    assert_eq!(fixture.store.get(&key_of(&a)).unwrap(), b"alpha");
    assert_eq!(fixture.store.get(&key_of(&b)).unwrap(), b"beta");

    let engine = fixture.engine();
    assert!(engine.state().has_prior_successful_sync());
    assert!(!engine.lock_manager().is_held());

    let second = engine.run().await.unwrap();
    assert!(matches!(second.strategy, DiffStrategy::Timestamp { .. }));
    assert!(second.selected.is_empty());
}

#[tokio::test]
async fn test_modified_file_alone_is_pushed_next_run() {
    let fixture = Fixture::new();
    fixture.write_old("a.txt", b"alpha");
    fixture.write_old("b.txt", b"beta");
    fixture.engine().run().await.unwrap();

    let b = fixture.write_new("b.txt", b"beta v2");
    let outcome = fixture.engine().run().await.unwrap();

    assert_eq!(outcome.selected.len(), 1);
    assert_eq!(outcome.selected[0].local_path(), b.as_path());
    assert_eq!(fixture.store.get(&key_of(&b)).unwrap(), b"beta v2");
}

#[tokio::test]
async fn test_run_refuses_while_locked() {
    let fixture = Fixture::new();
    fixture.write_old("a.txt", b"alpha");

    let lock = LockManager::new(fixture.state.path().join(LOCK_FILE));
    let guard = lock.acquire().unwrap();

    let engine = fixture.engine();
    let err = engine.run().await.unwrap_err();
    assert!(err.is_lock_held());
    assert!(fixture.store.is_empty());
    assert!(engine.state().last_started_at().unwrap().is_none());

    drop(guard);
    assert!(engine.run().await.is_ok());
}

#[tokio::test]
async fn test_missing_root_is_fatal_and_releases_lock() {
    let fixture = Fixture::new();
    let configuration = bucketsync::sync::Configuration::new(
        fixture.root().join("does-not-exist"),
        fixture.store.clone(),
    )
    .with_state_dir(fixture.state.path());

    let engine = fixture.engine_with(configuration);
    let err = engine.run().await.unwrap_err();
    assert!(matches!(err, SyncError::PathMissing(_)));
    assert!(!engine.lock_manager().is_held());
    assert!(engine.state().last_started_at().unwrap().is_none());
}

#[tokio::test]
async fn test_listing_failure_aborts_without_completion() {
    let fixture = Fixture::new();
    fixture.write_old("a.txt", b"alpha");
    fixture.store.fail_listing(true);

    let engine = fixture.engine();
    let err = engine.run().await.unwrap_err();
    assert!(matches!(err, SyncError::RemoteListing { .. }));
    assert!(!engine.lock_manager().is_held());
    assert!(!engine.state().has_prior_successful_sync());
    assert!(engine.state().has_unfinished_run().unwrap());
    assert!(fixture.store.is_empty());

    // The unfinished run means the next attempt repeats the checksum diff
    fixture.store.fail_listing(false);
    let outcome = engine.run().await.unwrap();
    assert_eq!(outcome.strategy, DiffStrategy::Checksum);
    assert_eq!(outcome.report.uploaded.len(), 1);
}

#[tokio::test]
async fn test_upload_failure_still_completes_and_is_not_retried() {
    let fixture = Fixture::new();
    let good = fixture.write_old("good.txt", b"good");
    let bad = fixture.write_old("bad.txt", b"bad");
    fixture.store.fail_uploads_of(&key_of(&bad));

    let outcome = fixture.engine().run().await.unwrap();
    assert_eq!(outcome.report.uploaded, vec![good.to_string_lossy().to_string()]);
    assert_eq!(outcome.report.failed.len(), 1);
    assert!(fixture.display.contains("ERROR: Could not push"));

    let engine = fixture.engine();
    assert!(engine.state().has_prior_successful_sync());

    fixture.store.clear_upload_failures();
    let next = engine.run().await.unwrap();
    assert!(next.selected.is_empty());
    assert!(fixture.store.get(&key_of(&bad)).is_none());
}

#[tokio::test]
async fn test_failure_ledger_retries_failed_upload() {
    let fixture = Fixture::new();
    fixture.write_old("good.txt", b"good");
    let bad = fixture.write_old("bad.txt", b"bad");
    fixture.store.fail_uploads_of(&key_of(&bad));

    let configuration = fixture.configuration().with_failure_ledger(true);
    let outcome = fixture.engine_with(configuration.clone()).run().await.unwrap();
    assert_eq!(outcome.report.failed.len(), 1);

    let ledger = FailureLedger::new(fixture.state.path());
    assert_eq!(ledger.load().unwrap().len(), 1);

    fixture.store.clear_upload_failures();
    let retry = fixture.engine_with(configuration).run().await.unwrap();
    assert!(matches!(retry.strategy, DiffStrategy::Timestamp { .. }));
    assert_eq!(retry.selected.len(), 1);
    assert_eq!(retry.selected[0].local_path(), bad.as_path());
    assert_eq!(fixture.store.get(&key_of(&bad)).unwrap(), b"bad");
    assert!(!ledger.path().exists());
}

#[tokio::test]
async fn test_dry_run_touches_nothing() {
    let fixture = Fixture::new();
    fixture.write_old("a.txt", b"alpha");

    let configuration = fixture.configuration().with_dry_run(true);
    let engine = fixture.engine_with(configuration);
    let outcome = engine.run().await.unwrap();

    assert!(outcome.dry_run);
    assert_eq!(outcome.selected.len(), 1);
    assert!(fixture.store.is_empty());
    assert!(engine.state().last_started_at().unwrap().is_none());
    assert!(!engine.state().has_prior_successful_sync());
    assert!(fixture.display.contains("Would push"));
}

#[tokio::test]
async fn test_filter_limits_uploads() {
    let fixture = Fixture::new();
    let page = fixture.write_old("site/index.html", b"<h1>");
    fixture.write_old("site/.git/HEAD", b"ref");
    fixture.write_old("site/notes.tmp", b"tmp");

    let configuration = fixture
        .configuration()
        .with_filter(Some("!.git !*.tmp".to_string()));
    let outcome = fixture.engine_with(configuration).run().await.unwrap();

    assert_eq!(outcome.report.uploaded, vec![page.to_string_lossy().to_string()]);
    assert_eq!(fixture.store.len(), 1);
}

#[tokio::test]
async fn test_sequential_uploads_follow_diff_order() {
    let fixture = Fixture::new();
    for name in ["c.txt", "a.txt", "b.txt"] {
        fixture.write_old(name, name.as_bytes());
    }

    let configuration = fixture.configuration().with_jobs(1);
    let outcome = fixture.engine_with(configuration).run().await.unwrap();

    let selected: Vec<_> = outcome.selected.iter().map(|r| r.path().to_string()).collect();
    assert_eq!(outcome.report.uploaded, selected);
}

#[tokio::test]
async fn test_unreachable_bucket_fails_before_any_state_change() {
    let fixture = Fixture::new();
    fixture.write_old("a.txt", b"alpha");
    fixture.engine().run().await.unwrap();

    let engine = fixture.engine();
    let completed = engine.state().last_completed_at().unwrap();
    let started = engine.state().last_started_at().unwrap();

    fixture.write_new("a.txt", b"alpha v2");
    fixture.store.set_unreachable(true);

    let err = engine.run().await.unwrap_err();
    assert!(matches!(err, SyncError::ConfigurationInvalid(_)));
    assert!(err.to_string().contains("Can't find the bucket backups"));
    assert!(!engine.lock_manager().is_held());
    assert_eq!(engine.state().last_completed_at().unwrap(), completed);
    assert_eq!(engine.state().last_started_at().unwrap(), started);

    // The change is still picked up once the bucket is back
    fixture.store.set_unreachable(false);
    let outcome = engine.run().await.unwrap();
    assert_eq!(outcome.selected.len(), 1);
    assert!(outcome.report.is_clean());
}

#[tokio::test]
async fn test_abandoned_run_releases_lock_and_stays_unfinished() {
    let fixture = Fixture::new();
    fixture.write_old("a.txt", b"alpha");
    fixture.store.stall_uploads(true);

    let engine = fixture.engine();
    let mut run = Box::pin(engine.run());

    // Wait until the run is stuck inside its upload
    loop {
        tokio::select! {
            _ = &mut run => panic!("run finished while uploads were stalled"),
            _ = tokio::time::sleep(Duration::from_millis(10)) => {
                if fixture.display.contains("Pushing") {
                    break;
                }
            }
        }
    }
    assert!(engine.lock_manager().is_held());
    drop(run);

    assert!(!engine.lock_manager().is_held());
    assert!(engine.state().has_unfinished_run().unwrap());
    assert!(!engine.state().completed_path().exists());

    fixture.store.stall_uploads(false);
    let outcome = engine.run().await.unwrap();
    assert_eq!(outcome.strategy, DiffStrategy::Checksum);
    assert_eq!(outcome.report.uploaded.len(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn test_non_utf8_file_name_is_skipped_without_failures() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let fixture = Fixture::new();
    let plain = fixture.write_old("good.txt", b"good");
    let accented = fixture.write_old("naïve café.txt", b"cafe");
    let bad = fixture.root().join(OsStr::from_bytes(b"bad\xff.txt"));
    std::fs::write(&bad, b"bad").unwrap();

    let outcome = fixture.engine().run().await.unwrap();
    assert_eq!(outcome.selected.len(), 2);
    assert!(outcome.report.is_clean());
    assert_eq!(outcome.report.uploaded.len(), 2);

    let keys: HashSet<String> = fixture.store.keys().into_iter().collect();
    let expected: HashSet<String> = [key_of(&plain), key_of(&accented)].into_iter().collect();
    assert_eq!(keys, expected);
    assert_eq!(fixture.store.get(&key_of(&accented)).unwrap(), b"cafe");
}
