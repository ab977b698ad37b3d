//! Process-wide context ordering.
//!
//! Runs as its own test binary so the global context starts empty. Keep a
//! single test here: tests in one binary share the process.

use una::{ConfigError, ProcessAbiContext};

#[test]
fn test_queries_fail_until_setup() {
    assert_eq!(una::context().unwrap_err(), ConfigError::NotSetUp);
    assert_eq!(una::context::type_info().unwrap_err(), ConfigError::NotSetUp);

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    let ctx = una::setup().unwrap();
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    let ctx = una::install(ProcessAbiContext::detect()).unwrap();

    assert_eq!(una::context().unwrap(), ctx);
    assert_eq!(una::context::type_info().unwrap(), ctx.type_info());
    assert_eq!(
        una::install(ProcessAbiContext::detect()).unwrap_err(),
        ConfigError::AlreadySetUp
    );
}
