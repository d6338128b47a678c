//! Test logging helpers.
//!
//! Every test in this crate follows the same shape:
//!
//! ```ignore
//! fn init_test(name: &str) {
//!     lockstep::test_utils::init_test_logging();
//!     lockstep::test_phase!(name);
//! }
//!
//! #[test]
//! fn advance_moves_clock() {
//!     init_test("advance_moves_clock");
//!     // ...
//!     lockstep::assert_with_log!(now == Tick::new(3), "now after advance", Tick::new(3), now);
//!     lockstep::test_complete!("advance_moves_clock");
//! }
//! ```
//!
//! Output is captured by the test harness and only shown for failing tests.
//! Set `RUST_LOG` (for example `RUST_LOG=lockstep=trace`) to see scheduler
//! events.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_TEST_FILTER: &str = "lockstep=debug";

/// Installs a global test subscriber once per process.
///
/// Safe to call from every test; only the first call has an effect. If some
/// other subscriber was installed first, that one is kept.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_TEST_FILTER));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

#[doc(hidden)]
pub fn log_phase(name: &str) {
    tracing::info!(test = name, phase = "start", "test phase");
}

#[doc(hidden)]
pub fn log_complete(name: &str) {
    tracing::info!(test = name, phase = "complete", "test complete");
}

#[doc(hidden)]
pub fn log_assertion(passed: bool, message: &str, expected: &str, actual: &str) {
    if passed {
        tracing::debug!(assertion = message, expected, actual, "assertion passed");
    } else {
        tracing::error!(assertion = message, expected, actual, "assertion failed");
    }
}

/// Logs the start of a named test.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        $crate::test_utils::log_phase($name)
    };
}

/// Logs the successful end of a named test.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        $crate::test_utils::log_complete($name)
    };
}

/// Asserts a condition, logging the expected and actual values either way.
///
/// `expected` and `actual` are only borrowed.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {{
        let passed: bool = $cond;
        let expected = &$expected;
        let actual = &$actual;
        $crate::test_utils::log_assertion(
            passed,
            $msg,
            &format!("{:?}", expected),
            &format!("{:?}", actual),
        );
        assert!(
            passed,
            "{}: expected {:?}, actual {:?}",
            $msg, expected, actual
        );
    }};
}
