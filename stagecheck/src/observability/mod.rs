//! Observability utilities.

mod logging;
mod timer;

pub use logging::{init_logging, init_test_logging, LogFormat, LoggingInitError, DEFAULT_FILTER};
pub use timer::SpanTimer;
