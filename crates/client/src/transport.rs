//! Network execution with retry and failure classification
//!
//! The transport is the only component that performs I/O. It retries
//! network-class failures (connection refused, DNS, timeout) with
//! exponential backoff; any received HTTP response is an application
//! decision and therefore terminal, never retried.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client as ReqwestClient, StatusCode};
use serde_json::Value;
use tillgrid_common::RetryStrategy;
use tillgrid_domain::{ApiError, EnvelopeStatus, ResponseEnvelope, Result};
use tracing::debug;

use crate::auth::{AuthEvent, AuthEvents, TokenProvider};
use crate::interceptor::InterceptorPipeline;
use crate::request::RequestDescriptor;
use crate::upload::UploadRequest;

pub(crate) struct Transport {
    http: ReqwestClient,
    retry: RetryStrategy,
    pipeline: Arc<InterceptorPipeline>,
    tokens: Arc<dyn TokenProvider>,
    auth_events: Arc<AuthEvents>,
}

impl Transport {
    pub(crate) fn new(
        timeout: Duration,
        retry: RetryStrategy,
        pipeline: Arc<InterceptorPipeline>,
        tokens: Arc<dyn TokenProvider>,
        auth_events: Arc<AuthEvents>,
    ) -> Result<Self> {
        let http = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ApiError::Config(format!("failed to build HTTP client: {err}")))?;

        Ok(Self { http, retry, pipeline, tokens, auth_events })
    }

    /// Send a descriptor through the full pipeline: request chain, retried
    /// network call, status classification, response chain.
    pub(crate) async fn send(&self, descriptor: RequestDescriptor) -> Result<ResponseEnvelope> {
        let descriptor = self.pipeline.run_request_chain(descriptor).await?;

        let response = self
            .retry
            .execute(
                "http request",
                || {
                    let descriptor = &descriptor;
                    async move { self.execute_once(descriptor).await }
                },
                ApiError::is_retryable,
            )
            .await?;

        self.classify(response).await
    }

    /// Multipart variant: same retry and classification, the form is rebuilt
    /// from the buffered upload on every attempt.
    pub(crate) async fn send_multipart(
        &self,
        descriptor: RequestDescriptor,
        upload: UploadRequest,
    ) -> Result<ResponseEnvelope> {
        let descriptor = self.pipeline.run_request_chain(descriptor).await?;

        let response = self
            .retry
            .execute(
                "http upload",
                || {
                    let descriptor = &descriptor;
                    let upload = &upload;
                    async move {
                        let mut request =
                            self.http.request(descriptor.method.clone(), descriptor.url.clone());
                        for (name, value) in &descriptor.headers {
                            request = request.header(name.as_str(), value.as_str());
                        }
                        request = request.multipart(upload.to_form()?);

                        debug!(method = %descriptor.method, url = %descriptor.url, "sending multipart request");
                        request.send().await.map_err(classify_transport_error)
                    }
                },
                ApiError::is_retryable,
            )
            .await?;

        self.classify(response).await
    }

    /// One network attempt, materialized fresh from the descriptor
    async fn execute_once(&self, descriptor: &RequestDescriptor) -> Result<reqwest::Response> {
        let mut request = self.http.request(descriptor.method.clone(), descriptor.url.clone());
        for (name, value) in &descriptor.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &descriptor.body {
            request = request.json(body);
        }

        debug!(method = %descriptor.method, url = %descriptor.url, "sending HTTP request");
        request.send().await.map_err(classify_transport_error)
    }

    /// An HTTP response was received - from here on everything is terminal
    async fn classify(&self, response: reqwest::Response) -> Result<ResponseEnvelope> {
        let status = response.status();
        debug!(%status, "received HTTP response");

        if status.is_success() {
            let body: Value = response.json().await.map_err(|err| {
                ApiError::MalformedEnvelope(format!("failed to parse response body: {err}"))
            })?;
            let envelope = ResponseEnvelope::from_value(body)?;
            let envelope = self.pipeline.run_response_chain(envelope).await?;

            return match envelope.status {
                EnvelopeStatus::Error => Err(ApiError::RequestFailed {
                    message: envelope.message_or("request rejected"),
                    errors: envelope.field_errors(),
                }),
                EnvelopeStatus::Success | EnvelopeStatus::Warning => Ok(envelope),
            };
        }

        // Non-2xx: use the envelope when the server sent one, synthesize a
        // minimal one otherwise.
        let reason = status.canonical_reason().unwrap_or("unknown");
        let body = response.text().await.unwrap_or_default();
        let envelope = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|value| ResponseEnvelope::from_value(value).ok())
            .unwrap_or_else(|| {
                ResponseEnvelope::error(format!("HTTP {}: {}", status.as_u16(), reason))
            });

        match status {
            StatusCode::UNAUTHORIZED => {
                // notify once per evicted credential, however many requests
                // raced into the same 401
                if self.tokens.clear().is_some() {
                    self.auth_events.emit(AuthEvent::Unauthorized);
                }
                Err(ApiError::Unauthorized(envelope.message_or("credential rejected")))
            }
            StatusCode::TOO_MANY_REQUESTS => Err(ApiError::RateLimited(
                "Too many requests. Please try again shortly.".to_string(),
            )),
            _ => Err(ApiError::RequestFailed {
                message: envelope.message_or(&format!("HTTP {}: {}", status.as_u16(), reason)),
                errors: envelope.field_errors(),
            }),
        }
    }
}

fn classify_transport_error(err: reqwest::Error) -> ApiError {
    if err.is_builder() {
        ApiError::Config(format!("failed to build request: {err}"))
    } else {
        // connect, DNS, timeout - no HTTP response was received
        ApiError::Network(err.to_string())
    }
}
