//! Failsafe mechanisms for reads against the metrics service

mod retry;

pub use retry::{RetryPolicy, with_retry};
