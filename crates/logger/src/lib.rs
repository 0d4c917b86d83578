//! Process-wide tracing setup shared by the Upbeat binaries.

mod subscriber;

pub use subscriber::{LogFormat, init_tracing, init_tracing_with};
