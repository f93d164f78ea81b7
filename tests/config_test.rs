//! Integration tests for configuration files driving a broker.

mod common;

use std::io::Write;
use std::sync::Arc;

use assert_matches::assert_matches;
use tempfile::NamedTempFile;

use common::{Augmenter, Catalog, TestHarness};
use mediaweave::config::{load_config, load_config_or_default};
use mediaweave::{keys, BrokerError, Operation};

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

const CONFIG: &str = r#"
[broker]
idle_relay = true
sync_timeout_secs = 5

[logging]
filter = "mediaweave=debug"

[sources.low]
rank = 10

[sources.catalog]
auto_split_threshold = 3

[sources.off]
enabled = false
"#;

#[test]
fn config_file_shapes_the_broker() {
    let file = write_config(CONFIG);
    let config = load_config(file.path()).unwrap();
    assert!(config.broker.idle_relay);
    assert_eq!(config.logging.filter, "mediaweave=debug");

    let h = TestHarness::with_config(config);
    let catalog = h.register(Arc::new(Catalog::new("catalog", 20)));
    h.register(Arc::new(Augmenter::new("high", vec![keys::ALBUM])));
    h.register(Arc::new(Augmenter::new("low", vec![keys::ALBUM])));

    let order: Vec<String> = h
        .broker
        .registry()
        .sources_supporting(Operation::Resolve)
        .iter()
        .map(|s| s.id().to_string())
        .collect();
    assert_eq!(order[0], "low");

    assert_eq!(h.broker.auto_split_threshold("catalog"), Some(3));
    let items = h
        .broker
        .browse_sync(
            "catalog",
            None,
            &[keys::TITLE],
            mediaweave::OperationOptions::default().with_count(7),
        )
        .unwrap();
    assert_eq!(items.len(), 7);
    assert_eq!(
        catalog.chunks(),
        vec![(0, Some(3)), (3, Some(3)), (6, Some(1))]
    );
}

#[test]
fn disabled_source_cannot_register() {
    let file = write_config(CONFIG);
    let config = load_config(file.path()).unwrap();
    let h = TestHarness::with_config(config);

    let err = h
        .broker
        .register_source(Arc::new(Catalog::new("off", 1)))
        .unwrap_err();
    assert_matches!(err, BrokerError::Validation(_));
}

#[test]
fn invalid_config_file_is_reported_with_its_path() {
    let file = write_config("[logging]\nfilter = \"  \"\n");
    let err = load_config(file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("Logging filter cannot be empty"));
}

#[test]
fn explicit_path_wins_over_defaults() {
    let file = write_config("[broker]\nsync_timeout_secs = 0\n");
    let config = load_config_or_default(Some(file.path())).unwrap();
    assert_eq!(config.broker.sync_timeout(), None);
}
