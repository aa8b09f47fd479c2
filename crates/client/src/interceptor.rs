//! Composable request/response interceptor pipeline

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tillgrid_domain::{ResponseEnvelope, Result};
use tracing::{debug, warn};

use crate::request::RequestDescriptor;

/// Transform applied to every outgoing request descriptor
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    async fn intercept(&self, request: RequestDescriptor) -> Result<RequestDescriptor>;
}

/// Transform applied to every normalized response envelope
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    async fn intercept(&self, envelope: ResponseEnvelope) -> Result<ResponseEnvelope>;
}

/// Ordered, mutable chains of request and response transforms.
///
/// Execution is strict registration order, one transform awaited at a time.
/// An error from any transform propagates to the caller; there is no other
/// way to short-circuit the chain. Built-in interceptors are ordinary
/// entries with no privileged position.
#[derive(Default)]
pub struct InterceptorPipeline {
    request: RwLock<Vec<Arc<dyn RequestInterceptor>>>,
    response: RwLock<Vec<Arc<dyn ResponseInterceptor>>>,
}

impl InterceptorPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a request transform to the chain
    pub fn add_request_interceptor(&self, interceptor: Arc<dyn RequestInterceptor>) {
        self.request.write().push(interceptor);
    }

    /// Append a response transform to the chain
    pub fn add_response_interceptor(&self, interceptor: Arc<dyn ResponseInterceptor>) {
        self.response.write().push(interceptor);
    }

    pub(crate) async fn run_request_chain(
        &self,
        mut request: RequestDescriptor,
    ) -> Result<RequestDescriptor> {
        // snapshot the chain so a transform may register interceptors
        // without deadlocking the pipeline
        let chain: Vec<_> = self.request.read().clone();
        for interceptor in chain {
            request = interceptor.intercept(request).await?;
        }
        Ok(request)
    }

    pub(crate) async fn run_response_chain(
        &self,
        mut envelope: ResponseEnvelope,
    ) -> Result<ResponseEnvelope> {
        let chain: Vec<_> = self.response.read().clone();
        for interceptor in chain {
            envelope = interceptor.intercept(envelope).await?;
        }
        Ok(envelope)
    }
}

/// Logs every outgoing request; installed at startup as an ordinary entry
pub struct RequestLogging;

#[async_trait]
impl RequestInterceptor for RequestLogging {
    async fn intercept(&self, request: RequestDescriptor) -> Result<RequestDescriptor> {
        debug!(method = %request.method, url = %request.url, "outgoing request");
        Ok(request)
    }
}

/// Flags responses whose reported server time exceeds a threshold
pub struct SlowResponseFlag {
    threshold: Duration,
}

impl SlowResponseFlag {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }
}

#[async_trait]
impl ResponseInterceptor for SlowResponseFlag {
    async fn intercept(&self, envelope: ResponseEnvelope) -> Result<ResponseEnvelope> {
        if let Some(elapsed_ms) = envelope.meta.as_ref().and_then(|meta| meta.response_time_ms) {
            if u128::from(elapsed_ms) > self.threshold.as_millis() {
                warn!(
                    response_time_ms = elapsed_ms,
                    threshold_ms = self.threshold.as_millis() as u64,
                    "slow response"
                );
            }
        }
        Ok(envelope)
    }
}
