// Tests for sync state markers and the timestamp strategy

use std::time::{Duration, SystemTime};

use bucketsync::sync::{modified_since, DiffStrategy, FileFilter, SyncStateTracker};

use crate::common::Fixture;

#[test]
fn test_no_changes_after_completion() {
    let fixture = Fixture::new();
    fixture.write_old("a.txt", b"a");
    fixture.write_old("dir/b.txt", b"b");

    let state = SyncStateTracker::new(fixture.state.path());
    state.record_start().unwrap();
    let cutoff = state.record_completion().unwrap();

    let changed = modified_since(fixture.root(), &FileFilter::allow_all(), cutoff).unwrap();
    assert!(changed.is_empty());
}

#[test]
fn test_single_modified_file_is_selected() {
    let fixture = Fixture::new();
    fixture.write_old("a.txt", b"a");
    fixture.write_old("dir/b.txt", b"b");

    let state = SyncStateTracker::new(fixture.state.path());
    state.record_start().unwrap();
    let cutoff = state.record_completion().unwrap();

    let modified = fixture.write_new("dir/b.txt", b"b, edited");

    let changed = modified_since(fixture.root(), &FileFilter::allow_all(), cutoff).unwrap();
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].local_path(), modified.as_path());
    assert!(changed[0].checksum().is_none());
}

#[test]
fn test_directories_never_selected() {
    let fixture = Fixture::new();
    let cutoff = chrono::Utc::now() - chrono::Duration::hours(2);

    // Fresh directories have mtimes after the cutoff
    std::fs::create_dir_all(fixture.root().join("new/deeper")).unwrap();
    fixture.write_new("new/deeper/file.txt", b"x");

    let changed = modified_since(fixture.root(), &FileFilter::allow_all(), cutoff).unwrap();
    assert_eq!(changed.len(), 1);
    assert!(changed[0].path().ends_with("new/deeper/file.txt"));
}

#[test]
fn test_mtime_equal_to_cutoff_is_not_newer() {
    let fixture = Fixture::new();
    let at = SystemTime::now() - Duration::from_secs(30);
    crate::common::write_with_mtime(&fixture.root().join("same.txt"), b"x", at);

    let cutoff = chrono::DateTime::<chrono::Utc>::from(at);
    let changed = modified_since(fixture.root(), &FileFilter::allow_all(), cutoff).unwrap();
    assert!(changed.is_empty());
}

#[test]
fn test_timestamp_strategy_applies_filter() {
    let fixture = Fixture::new();
    fixture.write_new("page.html", b"<p>");
    fixture.write_new("scratch.tmp", b"tmp");

    let filter = FileFilter::parse("!*.tmp").unwrap();
    let cutoff = chrono::Utc::now() - chrono::Duration::hours(1);
    let changed = modified_since(fixture.root(), &filter, cutoff).unwrap();

    assert_eq!(changed.len(), 1);
    assert!(changed[0].path().ends_with("page.html"));
}

#[test]
fn test_unfinished_run_after_success_keeps_timestamp_strategy() {
    let fixture = Fixture::new();
    let state = SyncStateTracker::new(fixture.state.path());

    let first = state.record_start().unwrap();
    state.record_completion().unwrap();
    state.record_start().unwrap();

    assert!(state.has_unfinished_run().unwrap());
    assert_eq!(
        DiffStrategy::select(&state).unwrap(),
        DiffStrategy::Timestamp { since: first }
    );
}
