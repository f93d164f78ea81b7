//! End-to-end result streams over a synchronous catalog.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;

use common::{Catalog, Recorder, TestHarness, ThreadedCatalog};
use mediaweave::{keys, BrokerError, Media, OperationOptions, OperationPhase, TypeFilter};

// ---------------------------------------------------------------------------
// Paging
// ---------------------------------------------------------------------------

#[test]
fn browse_delivers_items_then_one_terminator() {
    let h = TestHarness::new();
    h.register(Arc::new(Catalog::new("catalog", 12)));
    let recorder = Recorder::new();

    let id = h
        .broker
        .browse(
            "catalog",
            None,
            &[keys::TITLE],
            OperationOptions::default().with_count(5),
            recorder.callback(),
        )
        .unwrap();
    h.broker.run_pending();

    assert_eq!(recorder.ids(), vec!["0", "1", "2", "3", "4"]);
    assert_eq!(recorder.remaining(), vec![4, 3, 2, 1, 0]);
    let items = recorder.items();
    assert_eq!(items.len(), 6);
    assert!(items[5].is_terminator());
    assert_eq!(items[5].error, None);
    assert!(items.iter().all(|item| item.operation_id == id));
    assert_eq!(h.broker.operation_phase(id), OperationPhase::Finished);
}

#[test]
fn skip_pages_through_children() {
    let h = TestHarness::new();
    h.register(Arc::new(Catalog::new("catalog", 12)));

    let first = h
        .broker
        .browse_sync("catalog", None, &[keys::TITLE], OperationOptions::default().with_count(5))
        .unwrap();
    let second = h
        .broker
        .browse_sync(
            "catalog",
            None,
            &[keys::TITLE],
            OperationOptions::default().with_skip(5).with_count(5),
        )
        .unwrap();
    let last = h
        .broker
        .browse_sync(
            "catalog",
            None,
            &[keys::TITLE],
            OperationOptions::default().with_skip(10).with_count(5),
        )
        .unwrap();

    let ids = |page: &[Media]| page.iter().map(|m| m.id().unwrap().to_string()).collect::<Vec<_>>();
    assert_eq!(ids(&first), vec!["0", "1", "2", "3", "4"]);
    assert_eq!(ids(&second), vec!["5", "6", "7", "8", "9"]);
    assert_eq!(ids(&last), vec!["10", "11"]);
}

#[test]
fn skip_past_the_end_yields_only_the_terminator() {
    let h = TestHarness::new();
    h.register(Arc::new(Catalog::new("catalog", 12)));
    let recorder = Recorder::new();

    h.broker
        .browse(
            "catalog",
            None,
            &[keys::TITLE],
            OperationOptions::default().with_skip(40).with_count(5),
            recorder.callback(),
        )
        .unwrap();
    h.broker.run_pending();

    let items = recorder.items();
    assert_eq!(items.len(), 1);
    assert!(items[0].is_terminator());
}

#[test]
fn results_are_tagged_with_their_source() {
    let h = TestHarness::new();
    h.register(Arc::new(Catalog::new("catalog", 3)));

    let items = h
        .broker
        .browse_sync("catalog", None, &[keys::TITLE], OperationOptions::default())
        .unwrap();
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|m| m.source() == Some("catalog")));
}

// ---------------------------------------------------------------------------
// Search and query
// ---------------------------------------------------------------------------

#[test]
fn search_and_query_reach_their_slots() {
    let h = TestHarness::new();
    let catalog = h.register(Arc::new(Catalog::new("catalog", 12)));

    let found = h
        .broker
        .search_sync("catalog", Some("track"), &[keys::TITLE], OperationOptions::default().with_count(3))
        .unwrap();
    assert_eq!(found.len(), 3);

    let queried = h
        .broker
        .query_sync(
            "catalog",
            "artist:\"Artist 1\"",
            &[keys::TITLE],
            OperationOptions::default().with_count(2),
        )
        .unwrap();
    assert_eq!(queried.len(), 2);

    let operations: Vec<_> = catalog.calls().into_iter().map(|c| c.operation).collect();
    assert_eq!(
        operations,
        vec![mediaweave::Operation::Search, mediaweave::Operation::Query]
    );
}

#[test]
fn supported_filters_reach_the_source() {
    let h = TestHarness::new();
    h.register(Arc::new(Catalog::new("catalog", 4)));

    let mut options = OperationOptions::default().with_count(2);
    assert!(options.set_type_filter(TypeFilter::AUDIO));
    options.set_key_filter(keys::ARTIST, "Artist 1");

    let items = h
        .broker
        .browse_sync("catalog", None, &[keys::TITLE], options)
        .unwrap();
    assert_eq!(items.len(), 2);
}

#[test]
fn unsupported_filter_fails_before_dispatch() {
    let h = TestHarness::new();
    let catalog = h.register(Arc::new(Catalog::new("catalog", 4)));

    let mut options = OperationOptions::default();
    options.set_range_filter(keys::DURATION, Some(60.into()), None);

    let err = h
        .broker
        .browse("catalog", None, &[keys::TITLE], options, |_| {})
        .unwrap_err();
    assert_matches!(err, BrokerError::CapabilityMismatch { unsupported, .. } => {
        assert_eq!(unsupported, vec!["range filter 'duration'".to_string()]);
    });
    assert!(catalog.calls().is_empty());
    assert!(h.broker.operations().is_empty());
}

// ---------------------------------------------------------------------------
// Providers on other threads
// ---------------------------------------------------------------------------

#[test]
fn results_from_another_thread_are_collected_in_order() {
    let h = TestHarness::new();
    h.register(Arc::new(ThreadedCatalog { size: 6 }));

    let items = h
        .broker
        .browse_sync("threaded", None, &[keys::TITLE], OperationOptions::default())
        .unwrap();
    let ids: Vec<_> = items.iter().map(|m| m.id().unwrap().to_string()).collect();
    assert_eq!(ids, vec!["0", "1", "2", "3", "4", "5"]);
}

#[tokio::test]
async fn async_source_streams_through_collect() {
    let h = TestHarness::new();
    h.register(Arc::new(common::AsyncCatalog {
        size: 4,
        delay: std::time::Duration::from_millis(5),
    }));

    let items = h
        .broker
        .browse_collect("async", None, &[keys::TITLE], OperationOptions::default())
        .await
        .unwrap();
    assert_eq!(items.len(), 4);
    assert_eq!(items[3].id(), Some("3"));
    assert!(h.broker.operations().is_empty());
}

#[test]
fn query_collect_runs_on_a_plain_executor() {
    let h = TestHarness::new();
    h.register(Arc::new(Catalog::new("catalog", 12)));

    let items = tokio_test::block_on(h.broker.query_collect(
        "catalog",
        "artist:\"Artist 2\"",
        &[keys::TITLE],
        OperationOptions::default().with_count(4),
    ))
    .unwrap();
    assert_eq!(items.len(), 4);
    assert!(h.broker.operations().is_empty());
}
