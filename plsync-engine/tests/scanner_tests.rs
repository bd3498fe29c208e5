//! Integration tests for the window scanner and the release scanner

mod helpers;

use chrono::{DateTime, FixedOffset};
use helpers::{entry, ids, now, track, undated, work, MockProvider};
use plsync_common::time::TimeWindow;
use plsync_engine::provider::{CollectionEntry, ProviderError, TrackItem};
use plsync_engine::releases::scan_releases;
use plsync_engine::scanner::{scan_all, scan_window};

// ============================================================================
// Window scanner
// ============================================================================

#[tokio::test]
async fn test_window_cutoff_is_inclusive() {
    let provider = MockProvider::new();
    provider.set_collection(
        "src",
        vec![
            entry("a", "2024-06-14T09:00:00Z"),
            entry("b", "2024-06-08T12:00:00Z"),
            entry("c", "2024-06-08T11:59:59Z"),
            entry("d", "2024-06-01T00:00:00Z"),
        ],
    );
    let window = TimeWindow::trailing_days(&now(), 7);

    let scan = scan_window(&provider, "src", &window).await.unwrap();

    assert_eq!(scan.identities(), ids(&["a", "b"]));
    assert!(scan.reached_cutoff);
    assert_eq!(scan.pages, 1);
}

#[tokio::test]
async fn test_scan_stops_at_first_out_of_window_page() {
    let provider = MockProvider::new();
    let rows: Vec<CollectionEntry> = (0..250)
        .map(|i| {
            let added_at = if i < 150 {
                "2024-06-14T00:00:00Z"
            } else {
                "2024-05-01T00:00:00Z"
            };
            entry(&format!("t{}", i), added_at)
        })
        .collect();
    provider.set_collection("src", rows);
    let window = TimeWindow::trailing_days(&now(), 7);

    let scan = scan_window(&provider, "src", &window).await.unwrap();

    assert_eq!(scan.tracks.len(), 150);
    assert_eq!(scan.tracks[0].uri, "t0");
    // The third page is never requested
    assert_eq!(
        provider.page_requests("src"),
        vec![None, Some("100".to_string())]
    );
}

#[tokio::test]
async fn test_scan_reads_every_page_when_all_in_window() {
    let provider = MockProvider::new();
    provider.set_collection(
        "src",
        (0..230)
            .map(|i| entry(&format!("t{}", i), "2024-06-14T00:00:00Z"))
            .collect(),
    );
    let window = TimeWindow::trailing_days(&now(), 7);

    let scan = scan_window(&provider, "src", &window).await.unwrap();

    assert_eq!(scan.tracks.len(), 230);
    assert_eq!(scan.pages, 3);
    assert!(!scan.reached_cutoff);
}

#[tokio::test]
async fn test_malformed_entries_skipped_and_undated_kept() {
    let provider = MockProvider::new();
    provider.set_collection(
        "src",
        vec![
            entry("a", "2024-06-14T09:00:00Z"),
            CollectionEntry {
                track: None,
                added_at: Some("2024-06-14T08:00:00Z".to_string()),
            },
            CollectionEntry {
                track: Some(TrackItem {
                    uri: String::new(),
                    ..track("x")
                }),
                added_at: Some("2024-06-14T07:00:00Z".to_string()),
            },
            entry("bad-date", "last tuesday"),
            undated("u"),
            entry("b", "2024-06-13T09:00:00Z"),
        ],
    );
    let window = TimeWindow::trailing_days(&now(), 7);

    let scan = scan_window(&provider, "src", &window).await.unwrap();

    assert_eq!(scan.identities(), ids(&["a", "u", "b"]));
    assert_eq!(scan.skipped, 3);
    assert_eq!(scan.undated, 1);
}

#[tokio::test]
async fn test_repeated_identity_scanned_once() {
    let provider = MockProvider::new();
    provider.set_collection(
        "src",
        vec![
            entry("a", "2024-06-14T09:00:00Z"),
            entry("a", "2024-06-12T09:00:00Z"),
        ],
    );
    let window = TimeWindow::trailing_days(&now(), 7);

    let scan = scan_window(&provider, "src", &window).await.unwrap();
    assert_eq!(scan.identities(), ids(&["a"]));
}

#[tokio::test]
async fn test_offsets_normalized_into_window_zone() {
    let provider = MockProvider::new();
    provider.set_collection(
        "src",
        vec![
            // 12:00Z exactly
            entry("a", "2024-06-08T14:00:00+02:00"),
            // 11:30Z
            entry("b", "2024-06-08T13:30:00+02:00"),
        ],
    );
    let tokyo_now: DateTime<FixedOffset> = now().with_timezone(&FixedOffset::east_opt(9 * 3600).unwrap());
    let window = TimeWindow::trailing_days(&tokyo_now, 7);

    let scan = scan_window(&provider, "src", &window).await.unwrap();
    assert_eq!(scan.identities(), ids(&["a"]));
}

#[tokio::test]
async fn test_scan_error_propagates() {
    let provider = MockProvider::new();
    provider.fail_collection("src", ProviderError::Api(500, "boom".to_string()));
    let window = TimeWindow::trailing_days(&now(), 7);

    let result = scan_window(&provider, "src", &window).await;
    assert_eq!(result, Err(ProviderError::Api(500, "boom".to_string())));
}

#[tokio::test]
async fn test_scan_all_reads_whole_collection() {
    let provider = MockProvider::new();
    provider.set_collection(
        "dest",
        (0..250)
            .map(|i| entry(&format!("t{}", i), "2020-01-01T00:00:00Z"))
            .collect(),
    );

    let all = scan_all(&provider, "dest").await.unwrap();
    assert_eq!(all.len(), 250);
    assert!(all.contains("t249"));
}

// ============================================================================
// Release scanner
// ============================================================================

#[tokio::test]
async fn test_failing_artist_is_skipped() {
    let provider = MockProvider::new();
    for i in 1..=20 {
        let artist = format!("ar{}", i);
        let album = format!("al{}", i);
        let uri = format!("r{}", i);
        provider.add_artist(&artist, vec![(work(&album, Some("2024-06-10")), vec![uri.as_str()])]);
    }
    provider.fail_artist("ar7");
    let window = TimeWindow::trailing_days(&now(), 30);

    let scan = scan_releases(&provider, &window).await.unwrap();

    assert_eq!(scan.artists_total, 20);
    assert_eq!(scan.artists_checked, 19);
    assert_eq!(scan.artists_failed, 1);
    assert_eq!(scan.releases.len(), 19);
    assert!(scan.release("r7").is_none());
    assert!(scan.release("r8").is_some());
}

#[tokio::test]
async fn test_release_date_precision_and_invalid_dates() {
    let provider = MockProvider::new();
    provider.add_artist(
        "ar1",
        vec![
            (work("year", Some("2024")), vec!["y1"]),
            (work("month", Some("2024-06")), vec!["m1", "m2"]),
            (work("inside", Some("2024-05-17")), vec!["d1"]),
            (work("cutoff-day", Some("2024-05-16")), vec!["d0"]),
            (work("garbage", Some("soon")), vec!["g1"]),
            (work("missing", None), vec!["n1"]),
        ],
    );
    // Cutoff is 2024-05-16T12:00; dates compare at midnight
    let window = TimeWindow::trailing_days(&now(), 30);

    let scan = scan_releases(&provider, &window).await.unwrap();

    assert_eq!(scan.identities(), ids(&["m1", "m2", "d1"]));
    assert_eq!(scan.invalid_dates, 2);
    assert_eq!(scan.release("m1").unwrap().album, "Album month");
    // Tracks are only fetched for works inside the window
    assert_eq!(provider.work_requests(), ids(&["month", "inside"]));
}

#[tokio::test]
async fn test_shared_release_reported_once() {
    let provider = MockProvider::new();
    provider.add_artist("ar1", vec![(work("collab-a", Some("2024-06-01")), vec!["shared", "solo-a"])]);
    provider.add_artist("ar2", vec![(work("collab-b", Some("2024-06-01")), vec!["shared"])]);
    let window = TimeWindow::trailing_days(&now(), 30);

    let scan = scan_releases(&provider, &window).await.unwrap();
    assert_eq!(scan.identities(), ids(&["shared", "solo-a"]));
}

#[tokio::test]
async fn test_artist_listing_failure_fails_scan() {
    let provider = MockProvider::new();
    provider.fail_artist_listing(ProviderError::RateLimited);
    let window = TimeWindow::trailing_days(&now(), 30);

    let result = scan_releases(&provider, &window).await;
    assert_eq!(result.err(), Some(ProviderError::RateLimited));
}

#[tokio::test]
async fn test_followed_artists_paginated() {
    let provider = MockProvider::new();
    for i in 0..120 {
        provider.add_artist(&format!("ar{}", i), Vec::new());
    }

    let artists = plsync_engine::releases::followed_artists(&provider)
        .await
        .unwrap();
    assert_eq!(artists.len(), 120);
    assert_eq!(artists[119].id, "ar119");
}
