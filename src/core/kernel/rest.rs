use crate::core::errors::ClientError;
use crate::core::kernel::codec::{DefaultSerializer, Serializer};
use crate::core::kernel::interceptor::{InterceptorChain, RequestInterceptor};
use crate::core::kernel::request::{Body, HttpRequest, HttpResponse, OutgoingRequest, RawResponse};
use crate::core::kernel::transport::{self, Transport, TransportSettings};
use crate::core::types::{ClientProperty, TransportKind, TransportSelector};
use http::Method;
use reqwest::Url;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::RuntimeFlavor;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, instrument, warn};

const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Collects client configuration until [`HttpClientBuilder::build`] freezes it.
///
/// A builder is meant to be driven by one configuring thread. Every setter
/// validates its input immediately; nothing is deferred to request time.
pub struct HttpClientBuilder {
    base_uri: Option<Url>,
    transport: TransportSelector,
    buffered: bool,
    max_retries: u32,
    settings: TransportSettings,
    interceptors: InterceptorChain,
    serializer: Arc<dyn Serializer>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            base_uri: None,
            transport: TransportSelector::Network,
            buffered: true,
            max_retries: 0,
            settings: TransportSettings::default(),
            interceptors: InterceptorChain::new(),
            serializer: Arc::new(DefaultSerializer),
        }
    }
}

impl HttpClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request target: scheme, host, port and path prefix
    pub fn base_uri(&mut self, uri: &str) -> Result<&mut Self, ClientError> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(ClientError::Configuration("baseUri must not be empty".to_string()));
        }
        let parsed = Url::parse(uri)
            .map_err(|e| ClientError::Configuration(format!("Invalid baseUri '{}': {}", uri, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.cannot_be_a_base() {
            return Err(ClientError::Configuration(format!(
                "baseUri '{}' must be an absolute http or https URI",
                uri
            )));
        }
        self.base_uri = Some(parsed);
        Ok(self)
    }

    pub fn property(&mut self, property: ClientProperty) -> &mut Self {
        debug!(property = property.key(), "setting client property");
        match property {
            ClientProperty::Buffered(buffered) => self.buffered = buffered,
            ClientProperty::SocketPath(Some(path)) => {
                self.transport = TransportSelector::UnixSocket(path);
            }
            ClientProperty::SocketPath(None) => self.transport = TransportSelector::Network,
            ClientProperty::ConnectTimeout(timeout) => self.settings.connect_timeout = timeout,
            ClientProperty::ReadTimeout(timeout) => self.settings.read_timeout = timeout,
            ClientProperty::MaxRetries(retries) => self.max_retries = retries,
            ClientProperty::UserAgent(user_agent) => self.settings.user_agent = user_agent,
            ClientProperty::SystemProxy(enabled) => self.settings.system_proxy = enabled,
            ClientProperty::TrustStore(path) => self.settings.trust_store = path,
        }
        self
    }

    /// String-keyed form of [`HttpClientBuilder::property`]; unknown keys fail
    pub fn property_str(&mut self, key: &str, value: &str) -> Result<&mut Self, ClientError> {
        let property = ClientProperty::parse(key, value)?;
        Ok(self.property(property))
    }

    /// Lower priorities run earlier, in both hook phases
    pub fn register_request_interceptor(
        &mut self,
        priority: i32,
        interceptor: Arc<dyn RequestInterceptor>,
    ) -> &mut Self {
        debug!(priority, interceptor = interceptor.name(), "registering interceptor");
        self.interceptors.register(priority, interceptor);
        self
    }

    pub fn serializer(&mut self, serializer: Arc<dyn Serializer>) -> &mut Self {
        self.serializer = serializer;
        self
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// Freeze the current configuration into a new client.
    ///
    /// The builder stays usable; later changes do not reach clients that
    /// were already built.
    pub fn build(&self) -> Result<HttpClient, ClientError> {
        let base_uri = self
            .base_uri
            .clone()
            .ok_or_else(|| ClientError::Configuration("baseUri is required".to_string()))?;
        let transport = transport::connect(&self.transport, &self.settings)?;
        let interceptors = self.interceptors.sorted();

        debug!(
            base_uri = %base_uri,
            transport = %transport.kind(),
            buffered = self.buffered,
            interceptors = interceptors.len(),
            serializer = self.serializer.name(),
            "built HTTP client"
        );

        Ok(HttpClient {
            inner: Arc::new(ClientInner {
                base_uri,
                buffered: self.buffered,
                max_retries: self.max_retries,
                interceptors,
                transport,
                serializer: Arc::clone(&self.serializer),
            }),
        })
    }
}

impl fmt::Debug for HttpClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClientBuilder")
            .field("base_uri", &self.base_uri.as_ref().map(Url::as_str))
            .field("transport", &self.transport)
            .field("buffered", &self.buffered)
            .field("max_retries", &self.max_retries)
            .field("interceptors", &self.interceptors.len())
            .finish_non_exhaustive()
    }
}

struct ClientInner {
    base_uri: Url,
    buffered: bool,
    max_retries: u32,
    interceptors: InterceptorChain,
    transport: Arc<dyn Transport>,
    serializer: Arc<dyn Serializer>,
}

/// An immutable HTTP client. Cheap to clone; clones share one transport.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_uri", &self.inner.base_uri.as_str())
            .field("transport", &self.inner.transport.kind())
            .field("buffered", &self.inner.buffered)
            .field("interceptors", &self.inner.interceptors.len())
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    pub fn base_uri(&self) -> &Url {
        &self.inner.base_uri
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.inner.transport.kind()
    }

    pub fn is_buffered(&self) -> bool {
        self.inner.buffered
    }

    pub fn max_retries(&self) -> u32 {
        self.inner.max_retries
    }

    pub fn serializer(&self) -> &Arc<dyn Serializer> {
        &self.inner.serializer
    }

    /// Interceptor priorities in execution order
    pub fn interceptor_priorities(&self) -> Vec<i32> {
        self.inner.interceptors.iter().map(|entry| entry.priority()).collect()
    }

    /// Start a request rooted at the base URI
    pub fn create_request(&self, method: Method) -> HttpRequest {
        HttpRequest::new(
            method,
            self.inner.base_uri.clone(),
            Arc::clone(&self.inner.serializer),
        )
    }

    /// Run `request` through the interceptors and the transport.
    ///
    /// Before-hooks run once, then the request is sent (with retries for
    /// transport failures when configured and the body is replayable), then
    /// after-hooks run once with the final outcome. The value returned by
    /// the last after-hook is the result. The response body is read into
    /// memory before the after-hooks see it.
    #[instrument(
        skip(self, request),
        fields(method = %request.method(), uri = %request.uri(), transport = %self.transport_kind())
    )]
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        self.run(request, ResponseMode::Buffered).await
    }

    /// Like [`HttpClient::execute`], but the response is returned once its
    /// head arrives. Read the body with [`HttpResponse::stream_body`].
    ///
    /// Retries cover failures up to the response head; a failure while the
    /// body streams surfaces as an item of the body stream.
    #[instrument(
        skip(self, request),
        fields(method = %request.method(), uri = %request.uri(), transport = %self.transport_kind())
    )]
    pub async fn execute_streaming(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        self.run(request, ResponseMode::Streaming).await
    }

    /// Blocking form of [`HttpClient::execute`].
    ///
    /// Outside a runtime the request runs on a private single-threaded
    /// runtime. On a worker of a multi-threaded runtime (including
    /// `spawn_blocking` threads) the call blocks in place on that runtime.
    /// A current-thread runtime cannot be blocked from inside and is refused.
    pub fn execute_blocking(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(self.execute(request)))
            }
            Ok(_) => Err(ClientError::InvalidRequest(
                "execute_blocking cannot be called from a current-thread runtime; use execute"
                    .to_string(),
            )),
            Err(_) => {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| {
                        ClientError::Transport(format!("Failed to start I/O runtime: {}", e))
                    })?;
                runtime.block_on(self.execute(request))
            }
        }
    }

    async fn run(
        &self,
        mut request: HttpRequest,
        mode: ResponseMode,
    ) -> Result<HttpResponse, ClientError> {
        let outcome = match self.inner.interceptors.before_request(&mut request) {
            Ok(()) => self.send(&mut request, mode).await,
            Err(e) => Err(e),
        };
        self.inner
            .interceptors
            .after_response(&request, outcome)
            .map(|response| response.with_serializer(Arc::clone(&self.inner.serializer)))
    }

    async fn send(
        &self,
        request: &mut HttpRequest,
        mode: ResponseMode,
    ) -> Result<HttpResponse, ClientError> {
        let mut body = request.take_body();
        if self.inner.buffered {
            body = body.buffer().await?;
        }

        let raw = match body.try_clone() {
            Some(replay) => {
                request.set_body(replay);
                self.send_replayable(request, body, mode).await
            }
            None => {
                if self.inner.max_retries > 0 {
                    debug!("request body is streamed; retries disabled for this request");
                }
                self.exchange(request.to_outgoing(body), mode).await
            }
        }?;

        Ok(HttpResponse::from_raw(raw, Arc::clone(&self.inner.serializer)))
    }

    /// One transport round trip. Buffered mode reads the body here, inside
    /// the retry loop.
    async fn exchange(
        &self,
        outgoing: OutgoingRequest,
        mode: ResponseMode,
    ) -> Result<RawResponse, ClientError> {
        let raw = self.inner.transport.send(outgoing).await?;
        match mode {
            ResponseMode::Buffered => raw.buffer().await,
            ResponseMode::Streaming => Ok(raw),
        }
    }

    async fn send_replayable(
        &self,
        request: &HttpRequest,
        first_body: Body,
        mode: ResponseMode,
    ) -> Result<RawResponse, ClientError> {
        if self.inner.max_retries == 0 {
            return self.exchange(request.to_outgoing(first_body), mode).await;
        }

        let strategy = ExponentialBackoff::from_millis(2)
            .factor(50)
            .max_delay(MAX_BACKOFF)
            .map(jitter)
            .take(self.inner.max_retries as usize);
        let attempts = AtomicU32::new(0);

        let result = RetryIf::spawn(
            strategy,
            || {
                let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
                let outgoing = request.replay_outgoing();
                async move {
                    if attempt > 1 {
                        debug!(attempt, "retrying request");
                    }
                    match outgoing {
                        Some(outgoing) => self.exchange(outgoing, mode).await,
                        None => Err(ClientError::InvalidRequest(
                            "request body cannot be replayed".to_string(),
                        )),
                    }
                }
            },
            ClientError::is_transport,
        )
        .await;

        if let Err(e) = &result {
            if e.is_transport() {
                warn!(
                    attempts = attempts.load(Ordering::Relaxed),
                    error = %e,
                    "request failed after retries"
                );
            }
        }
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseMode {
    Buffered,
    Streaming,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct Noop;

    impl RequestInterceptor for Noop {}

    #[test]
    fn test_build_requires_base_uri() {
        let err = HttpClientBuilder::new().build().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("baseUri"));
    }

    #[test]
    fn test_base_uri_validation() {
        let mut builder = HttpClientBuilder::new();
        assert!(builder.base_uri("").is_err());
        assert!(builder.base_uri("not a uri").is_err());
        assert!(builder.base_uri("mailto:someone@example.com").is_err());
        assert!(builder.base_uri("https://example.com").is_ok());
    }

    #[test]
    fn test_unknown_property_fails_fast() {
        let mut builder = HttpClientBuilder::new();
        let err = builder.property_str("keepAliveStrategy", "x").unwrap_err();
        assert!(err.is_configuration());
        assert!(builder.property_str("buffered", "false").is_ok());
    }

    #[test]
    fn test_transport_selection_is_last_write_wins() {
        let mut builder = HttpClientBuilder::new();
        builder.base_uri("http://localhost").unwrap();
        builder
            .property(ClientProperty::SocketPath(Some(PathBuf::from("/tmp/a.sock"))))
            .property_str("socketPath", "")
            .unwrap();
        assert_eq!(builder.transport_kind(), TransportKind::Network);

        builder.property_str("socketPath", "/tmp/b.sock").unwrap();
        let client = builder.build().unwrap();
        assert_eq!(client.transport_kind(), TransportKind::UnixSocket);
    }

    #[test]
    fn test_built_clients_are_independent() {
        let mut builder = HttpClientBuilder::new();
        builder
            .base_uri("https://example.com")
            .unwrap()
            .register_request_interceptor(20, Arc::new(Noop))
            .register_request_interceptor(10, Arc::new(Noop));
        let first = builder.build().unwrap();

        builder.register_request_interceptor(5, Arc::new(Noop));
        let second = builder.build().unwrap();

        assert_eq!(first.interceptor_priorities(), vec![10, 20]);
        assert_eq!(second.interceptor_priorities(), vec![5, 10, 20]);
    }

    #[test]
    fn test_create_request_is_rooted_at_base_uri() {
        let mut builder = HttpClientBuilder::new();
        builder.base_uri("https://objectstorage.example.com/20160918").unwrap();
        let client = builder.build().unwrap();

        let mut request = client.create_request(Method::GET);
        request.append_path_part("n");
        assert_eq!(
            request.uri().as_str(),
            "https://objectstorage.example.com/20160918/n"
        );
        assert!(client.is_buffered());
        assert_eq!(client.serializer().name(), "default");
    }

    #[tokio::test]
    async fn test_blocking_rejected_inside_runtime() {
        let mut builder = HttpClientBuilder::new();
        builder.base_uri("http://localhost").unwrap();
        let client = builder.build().unwrap();
        let err = client
            .execute_blocking(client.create_request(Method::GET))
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequest(_)));
        assert!(err.to_string().contains("current-thread"));
    }

    #[tokio::test]
    async fn test_before_hook_error_reaches_after_hooks() {
        struct Deny;
        impl RequestInterceptor for Deny {
            fn before_request(&self, _request: &mut HttpRequest) -> Result<(), ClientError> {
                Err(ClientError::Auth("denied".to_string()))
            }
        }
        struct Substitute;
        impl RequestInterceptor for Substitute {
            fn after_response(
                &self,
                _request: &HttpRequest,
                outcome: Result<HttpResponse, ClientError>,
            ) -> Result<HttpResponse, ClientError> {
                match outcome {
                    Err(ClientError::Auth(_)) => Ok(HttpResponse::new(http::StatusCode::UNAUTHORIZED, "")),
                    other => other,
                }
            }
        }

        let mut builder = HttpClientBuilder::new();
        builder
            .base_uri("http://127.0.0.1:9")
            .unwrap()
            .register_request_interceptor(1, Arc::new(Deny))
            .register_request_interceptor(2, Arc::new(Substitute));
        let client = builder.build().unwrap();
        let response = client
            .execute(client.create_request(Method::GET))
            .await
            .unwrap();
        assert_eq!(response.status(), http::StatusCode::UNAUTHORIZED);
    }
}
