//! Observability for osmstream
//!
//! Structured, synchronous JSON logging. The streaming core never fails an
//! operation because of logging; every log call is best-effort.

mod logger;

pub use logger::{Logger, Severity};
