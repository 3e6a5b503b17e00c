/// Kernel - the transport layer behind every generated SDK client
///
/// This module holds everything between an SDK call and the wire: the
/// client builder, the frozen client, the interceptor chain, the two
/// transports, payload serializers and the callback bridge for
/// asynchronous SDK calls.
///
/// # Architecture
///
/// ## Client
/// - `HttpClientBuilder`: validates options and interceptors, freezes them
/// - `HttpClient`: immutable, cloneable, safe to share between tasks
/// - `HttpRequest` / `HttpResponse`: request construction and typed decoding
///
/// ## Transport
/// - `NetworkTransport`: pooled TCP/TLS via reqwest
/// - `UnixSocketTransport`: HTTP/1.1 over a Unix domain socket via hyper
///
/// ## Interceptors
/// - `RequestInterceptor`: before/after hooks, run in ascending priority
/// - `SigningInterceptor`: adapts an SDK `Signer`
/// - `MetricsInterceptor` / `TracingInterceptor`: instrumentation
///
/// ## Serialization
/// - `Serializer`: object-safe contract, typed via `SerializerExt`
/// - `DefaultSerializer` / `ManagedSerializer`: the two strategies
///
/// ## Async bridge
/// - `AsyncHandlerSink`: at-most-once completion of an SDK callback pair
/// - `Single`: lazily started single-value future
///
/// # Usage
///
/// ## Signed client
/// ```rust,no_run
/// use cloudsdk_http::core::kernel::*;
/// use secrecy::Secret;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let signer = Arc::new(HmacSigner::new(
///     "ocid1.key".to_string(),
///     Secret::new("secret".to_string()),
/// ));
/// let client = HttpClient::builder()
///     .base_uri("https://objectstorage.example.com/20160918")?
///     .property_str("readTimeout", "10000")?
///     .register_request_interceptor(SIGNING_PRIORITY, Arc::new(SigningInterceptor::new(signer)))
///     .build()?;
///
/// let mut request = client.create_request(http::Method::GET);
/// request.append_path_part("n");
/// let _namespace: String = client.execute(request).await?.error_for_status()?.json()?;
/// # Ok(())
/// # }
/// ```
///
/// ## Unix domain socket
/// ```rust,no_run
/// use cloudsdk_http::core::kernel::HttpClient;
/// use cloudsdk_http::core::types::{ClientProperty, TransportKind};
///
/// # fn example() -> Result<(), cloudsdk_http::ClientError> {
/// let client = HttpClient::builder()
///     .base_uri("http://localhost")?
///     .property(ClientProperty::SocketPath(Some("/var/run/agent.sock".into())))
///     .build()?;
/// assert_eq!(client.transport_kind(), TransportKind::UnixSocket);
/// # Ok(())
/// # }
/// ```
pub mod bridge;
pub mod codec;
pub mod interceptor;
pub mod metrics;
pub mod request;
pub mod rest;
pub mod signer;
pub mod transport;

// Re-export key types for convenience
pub use bridge::{AsyncHandlerSink, Single};
pub use codec::{
    DefaultSerializer, ManagedSerializer, ObjectMapper, ObjectMapperBuilder, Serializer,
    SerializerExt, TypeAdapter,
};
pub use interceptor::{
    InterceptorChain, PrioritizedInterceptor, RequestInterceptor, METRICS_PRIORITY,
    SIGNING_PRIORITY, TRACING_PRIORITY,
};
pub use metrics::{MetricsInterceptor, MetricsSnapshot, RequestMetrics, TracingInterceptor};
pub use request::{
    Body, HttpRequest, HttpResponse, OutgoingRequest, RawResponse, ResponseBody, ResponseStream,
};
pub use rest::{HttpClient, HttpClientBuilder};
pub use signer::{HmacSigner, SignatureResult, Signer, SigningInterceptor, SigningRequest};
pub use transport::{NetworkTransport, Transport, TransportSettings, UnixSocketTransport};
