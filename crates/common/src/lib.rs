//! Common utilities shared across Tillgrid crates.
//!
//! Currently holds the resilience layer: the retry strategy used by the
//! HTTP transport. Kept separate from the client crate so the backoff
//! invariant is testable without any network machinery in scope.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod retry;

pub use retry::{RetryConfigError, RetryStrategy};
