//! Process-wide tracing setup shared by the server binary and tests.

pub mod tracing;

pub use self::tracing::{init, init_for_tests};
