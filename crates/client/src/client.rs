//! Client facade: typed verbs over the transport
//!
//! Thin surface over the request builder, interceptor pipeline, and
//! transport. Each verb returns the envelope's `data` deserialized into the
//! caller's type, or a typed error from the taxonomy in `tillgrid-domain`.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tillgrid_common::RetryStrategy;
use tillgrid_domain::{ApiError, EnvelopeStatus, ResponseEnvelope, Result};
use tokio::sync::broadcast;
use tracing::{instrument, warn};

use crate::auth::{AuthEvent, AuthEvents, MemoryTokenStore, TokenProvider};
use crate::interceptor::{
    InterceptorPipeline, RequestInterceptor, RequestLogging, ResponseInterceptor, SlowResponseFlag,
};
use crate::optimistic::{UpdateManager, UpdateManagerConfig};
use crate::request::{RequestBuilder, RequestDescriptor};
use crate::transport::Transport;
use crate::upload::UploadRequest;

/// Configuration for the client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL for the API (e.g. "https://api.tillgrid.io/v1")
    pub base_url: String,
    /// Timeout applied to each network attempt
    pub timeout: Duration,
    /// Retry strategy for network-class failures
    pub retry: RetryStrategy,
    /// Threshold for the built-in slow-response flag
    pub slow_response_threshold: Duration,
    /// Debounce defaults for the optimistic update manager
    pub update_manager: UpdateManagerConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.tillgrid.io/v1".to_string(),
            timeout: Duration::from_secs(30),
            retry: RetryStrategy::default(),
            slow_response_threshold: Duration::from_millis(3000),
            update_manager: UpdateManagerConfig::default(),
        }
    }
}

/// HTTP client for the Tillgrid API
pub struct Client {
    request_builder: RequestBuilder,
    transport: Transport,
    pipeline: Arc<InterceptorPipeline>,
    tokens: Arc<dyn TokenProvider>,
    auth_events: Arc<AuthEvents>,
    updates: UpdateManager,
}

impl Client {
    /// Create a new client
    ///
    /// # Errors
    ///
    /// Returns error if the base URL is invalid or the HTTP client cannot be
    /// constructed.
    pub fn new(config: ClientConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let pipeline = Arc::new(InterceptorPipeline::new());
        // default interceptors are ordinary chain entries
        pipeline.add_request_interceptor(Arc::new(RequestLogging));
        pipeline
            .add_response_interceptor(Arc::new(SlowResponseFlag::new(config.slow_response_threshold)));

        let auth_events = Arc::new(AuthEvents::new());
        let request_builder = RequestBuilder::new(&config.base_url)?;
        let transport = Transport::new(
            config.timeout,
            config.retry.clone(),
            pipeline.clone(),
            tokens.clone(),
            auth_events.clone(),
        )?;

        Ok(Self {
            request_builder,
            transport,
            pipeline,
            tokens,
            auth_events,
            updates: UpdateManager::new(config.update_manager),
        })
    }

    /// Create a builder for fluent configuration
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Execute a GET request
    #[instrument(skip(self), fields(path = %path))]
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let descriptor = self.descriptor(Method::GET, path, query, None)?;
        self.execute(descriptor).await
    }

    /// Execute a POST request
    #[instrument(skip(self, body), fields(path = %path))]
    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let body = Self::to_body(body)?;
        let descriptor = self.descriptor(Method::POST, path, &[], Some(body))?;
        self.execute(descriptor).await
    }

    /// Execute a PUT request
    #[instrument(skip(self, body), fields(path = %path))]
    pub async fn put<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let body = Self::to_body(body)?;
        let descriptor = self.descriptor(Method::PUT, path, &[], Some(body))?;
        self.execute(descriptor).await
    }

    /// Execute a DELETE request
    #[instrument(skip(self), fields(path = %path))]
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let descriptor = self.descriptor(Method::DELETE, path, &[], None)?;
        self.execute(descriptor).await
    }

    /// Execute a multipart upload.
    ///
    /// No JSON content-type default; credential attachment and the retry and
    /// error classification of the final response are the same as for the
    /// JSON verbs.
    #[instrument(skip(self, upload), fields(path = %path))]
    pub async fn upload<T: DeserializeOwned>(&self, path: &str, upload: UploadRequest) -> Result<T> {
        let descriptor = self.request_builder.build_multipart(
            Method::POST,
            path,
            self.tokens.token().as_deref(),
        )?;
        let envelope = self.transport.send_multipart(descriptor, upload).await?;
        Self::extract(envelope)
    }

    /// Append a request transform to the interceptor chain
    pub fn add_request_interceptor(&self, interceptor: Arc<dyn RequestInterceptor>) {
        self.pipeline.add_request_interceptor(interceptor);
    }

    /// Append a response transform to the interceptor chain
    pub fn add_response_interceptor(&self, interceptor: Arc<dyn ResponseInterceptor>) {
        self.pipeline.add_response_interceptor(interceptor);
    }

    /// Subscribe to auth lifecycle events ("unauthorized")
    pub fn subscribe_auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.auth_events.subscribe()
    }

    /// The optimistic update manager bound to this client's lifetime
    pub fn update_manager(&self) -> &UpdateManager {
        &self.updates
    }

    fn descriptor(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<RequestDescriptor> {
        self.request_builder.build(
            method,
            path,
            query,
            Vec::new(),
            body,
            self.tokens.token().as_deref(),
        )
    }

    async fn execute<T: DeserializeOwned>(&self, descriptor: RequestDescriptor) -> Result<T> {
        let envelope = self.transport.send(descriptor).await?;
        Self::extract(envelope)
    }

    fn to_body<B: Serialize>(body: &B) -> Result<Value> {
        serde_json::to_value(body)
            .map_err(|err| ApiError::Config(format!("failed to serialize body: {err}")))
    }

    fn extract<T: DeserializeOwned>(envelope: ResponseEnvelope) -> Result<T> {
        if envelope.status == EnvelopeStatus::Warning {
            warn!(
                message = envelope.message.as_deref().unwrap_or_default(),
                "server returned a warning"
            );
        }
        // absent data deserializes from null (e.g. delete endpoints)
        let data = envelope.data.unwrap_or(Value::Null);
        serde_json::from_value(data).map_err(|err| {
            ApiError::MalformedEnvelope(format!("failed to deserialize data: {err}"))
        })
    }
}

/// Builder for the client
#[derive(Default)]
pub struct ClientBuilder {
    config: Option<ClientConfig>,
    tokens: Option<Arc<dyn TokenProvider>>,
}

impl ClientBuilder {
    /// Set the client configuration
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the token provider
    pub fn tokens(mut self, tokens: Arc<dyn TokenProvider>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Build the client
    ///
    /// # Errors
    ///
    /// Returns error if client creation fails.
    pub fn build(self) -> Result<Client> {
        let config = self.config.unwrap_or_default();
        let tokens = self.tokens.unwrap_or_else(|| Arc::new(MemoryTokenStore::new()));
        Client::new(config, tokens)
    }
}
