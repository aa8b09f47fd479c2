//! # Tillgrid Client
//!
//! Client-side data-access layer for the Tillgrid POS admin platform.
//!
//! This crate provides:
//! - A resilient HTTP client with typed verbs (`get`/`post`/`put`/`delete`)
//!   and a multipart upload variant
//! - A composable interceptor pipeline for request and response transforms
//! - Exponential-backoff retry for network-class failures
//! - Standardized response envelope normalization and a typed error taxonomy
//! - An optimistic update manager that applies local edits immediately,
//!   debounces and coalesces writes per logical key, and rolls back on
//!   failure
//!
//! # Architecture
//!
//! - Credential reads go through the [`TokenProvider`] seam; the only writer
//!   inside the core is the 401-eviction path
//! - Any received HTTP response is terminal; only pre-response failures retry
//! - One [`optimistic::UpdateManager`] per client, with explicit teardown

pub mod auth;
pub mod client;
pub mod interceptor;
pub mod optimistic;
pub mod request;
pub mod upload;

mod transport;

// Re-export commonly used items
pub use auth::{AuthEvent, AuthEvents, MemoryTokenStore, TokenProvider};
pub use client::{Client, ClientBuilder, ClientConfig};
pub use interceptor::{
    InterceptorPipeline, RequestInterceptor, RequestLogging, ResponseInterceptor, SlowResponseFlag,
};
pub use optimistic::{
    ApplyFn, CommitFn, UpdateClass, UpdateManager, UpdateManagerConfig, UpdateTicket,
};
pub use request::{RequestBuilder, RequestDescriptor};
// Re-export the wire contracts for downstream convenience
pub use tillgrid_domain::{
    ApiError, EnvelopeStatus, FieldError, ResponseEnvelope, ResponseMeta, Result,
};
pub use upload::{UploadPart, UploadRequest};
