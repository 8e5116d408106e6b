//! Tracing subscriber installation tests
//!
//! Kept in their own test binary: the global subscriber can be set once
//! per process.

use ivd_common::config::LoggingConfig;
use ivd_common::logging::init_tracing;
use ivd_common::Error;

#[test]
fn test_second_install_is_a_logging_error() {
    let config = LoggingConfig::default();

    let guard = init_tracing(&config).expect("first install should succeed");
    assert!(guard.is_none(), "no file configured, no writer guard");

    let second = init_tracing(&config);
    assert!(matches!(second, Err(Error::Logging(_))));
}
