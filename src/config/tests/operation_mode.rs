//! Tests for operation mode determination.

use rstest::rstest;

use crate::RadarConfig;
use crate::config::OperationMode;

#[rstest]
fn serve_is_the_default_mode() {
    assert_eq!(
        RadarConfig::default().operation_mode(),
        OperationMode::Serve,
        "should serve when no watch URL is set"
    );
}

#[rstest]
fn watch_url_selects_watch_mode() {
    let config = RadarConfig {
        watch_url: Some("http://localhost:3000".to_owned()),
        ..Default::default()
    };

    assert_eq!(
        config.operation_mode(),
        OperationMode::Watch,
        "should watch when watch_url is set"
    );
}

#[rstest]
fn serve_fields_do_not_affect_mode() {
    let config = RadarConfig {
        backend: "api".to_owned(),
        favorites: Some("octo/widgets".to_owned()),
        ..Default::default()
    };

    assert_eq!(config.operation_mode(), OperationMode::Serve);
}
