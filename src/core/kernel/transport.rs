use crate::core::errors::ClientError;
use crate::core::kernel::request::{Body, OutgoingRequest, RawResponse, ResponseBody};
use crate::core::types::{TransportKind, TransportSelector, DEFAULT_TIMEOUT};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream, TryStreamExt};
use http::header::{HeaderValue, HOST, USER_AGENT};
use http::Uri;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::client::conn::http1::SendRequest;
use hyper_util::rt::TokioIo;
use reqwest::Client;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixStream;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Puts one request on the wire and returns once the response head arrives.
///
/// The body is handed back as a stream; the caller decides whether to read
/// it into memory.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    fn kind(&self) -> TransportKind;

    async fn send(&self, request: OutgoingRequest) -> Result<RawResponse, ClientError>;
}

/// Connection settings shared by every transport kind
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub connect_timeout: Duration,
    /// Upper bound for sending the request and reading the full response
    pub read_timeout: Duration,
    pub user_agent: String,
    pub system_proxy: bool,
    /// PEM bundle of extra root certificates for TLS
    pub trust_store: Option<PathBuf>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_TIMEOUT,
            read_timeout: DEFAULT_TIMEOUT,
            user_agent: format!("cloudsdk-http/{}", env!("CARGO_PKG_VERSION")),
            system_proxy: true,
            trust_store: None,
        }
    }
}

/// Resolve a selector into the one transport a client will use
pub(crate) fn connect(
    selector: &TransportSelector,
    settings: &TransportSettings,
) -> Result<Arc<dyn Transport>, ClientError> {
    Ok(match selector {
        TransportSelector::Network => Arc::new(NetworkTransport::new(settings)?),
        TransportSelector::UnixSocket(path) => {
            Arc::new(UnixSocketTransport::new(path.clone(), settings))
        }
    })
}

/// TCP/TLS transport backed by a pooled `reqwest::Client`
#[derive(Debug, Clone)]
pub struct NetworkTransport {
    client: Client,
}

impl NetworkTransport {
    pub fn new(settings: &TransportSettings) -> Result<Self, ClientError> {
        let mut builder = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.read_timeout)
            .user_agent(settings.user_agent.as_str());
        if !settings.system_proxy {
            builder = builder.no_proxy();
        }
        if let Some(path) = &settings.trust_store {
            for certificate in load_trust_store(path)? {
                builder = builder.add_root_certificate(certificate);
            }
        }
        let client = builder.build().map_err(|e| {
            ClientError::Configuration(format!("Failed to build HTTP client: {}", e))
        })?;
        Ok(Self { client })
    }
}

fn load_trust_store(path: &Path) -> Result<Vec<reqwest::Certificate>, ClientError> {
    let pem = std::fs::read(path).map_err(|e| {
        ClientError::Configuration(format!(
            "Failed to read trust store {}: {}",
            path.display(),
            e
        ))
    })?;
    let certificates = reqwest::Certificate::from_pem_bundle(&pem).map_err(|e| {
        ClientError::Configuration(format!("Invalid trust store {}: {}", path.display(), e))
    })?;
    if certificates.is_empty() {
        return Err(ClientError::Configuration(format!(
            "Trust store {} contains no certificates",
            path.display()
        )));
    }
    debug!(path = %path.display(), certificates = certificates.len(), "loaded trust store");
    Ok(certificates)
}

#[async_trait]
impl Transport for NetworkTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Network
    }

    #[instrument(skip(self, request), fields(method = %request.method, uri = %request.url))]
    async fn send(&self, request: OutgoingRequest) -> Result<RawResponse, ClientError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        builder = match request.body {
            Body::Empty => builder,
            Body::Bytes(bytes) => builder.body(bytes),
            Body::Stream { stream, .. } => builder.body(reqwest::Body::wrap_stream(stream)),
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Transport(format!("Request timed out: {}", e))
            } else {
                ClientError::Transport(format!("Request failed: {}", e))
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        debug!(status = %status, length = ?response.content_length(), "response head received");

        let body = response.bytes_stream().map_err(|e| {
            if e.is_timeout() {
                ClientError::Transport(format!("Timed out reading response body: {}", e))
            } else {
                ClientError::Transport(format!("Failed to read response body: {}", e))
            }
        });
        Ok(RawResponse {
            status,
            headers,
            body: ResponseBody::Streaming(Box::pin(body)),
        })
    }
}

type RequestBody = BoxBody<Bytes, io::Error>;

/// HTTP/1.1 over a Unix domain socket.
///
/// Each request opens its own connection to the socket; nothing is ever
/// sent over TCP. The `Host` header is taken from the client's base URI.
#[derive(Debug, Clone)]
pub struct UnixSocketTransport {
    path: PathBuf,
    connect_timeout: Duration,
    read_timeout: Duration,
    user_agent: String,
}

impl UnixSocketTransport {
    pub fn new(path: PathBuf, settings: &TransportSettings) -> Self {
        Self {
            path,
            connect_timeout: settings.connect_timeout,
            read_timeout: settings.read_timeout,
            user_agent: settings.user_agent.clone(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&self) -> Result<UnixStream, ClientError> {
        match tokio::time::timeout(self.connect_timeout, UnixStream::connect(&self.path)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(ClientError::Transport(format!(
                "Failed to connect to unix socket {}: {}",
                self.path.display(),
                e
            ))),
            Err(_) => Err(ClientError::Transport(format!(
                "Timed out connecting to unix socket {}",
                self.path.display()
            ))),
        }
    }

    fn to_http_request(&self, request: OutgoingRequest) -> Result<http::Request<RequestBody>, ClientError> {
        let target = match request.url.query() {
            Some(query) => format!("{}?{}", request.url.path(), query),
            None => request.url.path().to_string(),
        };
        let uri: Uri = target.parse().map_err(|e| {
            ClientError::InvalidRequest(format!("Invalid request target '{}': {}", target, e))
        })?;

        let body: RequestBody = match request.body {
            Body::Empty => Full::new(Bytes::new()).map_err(|never| match never {}).boxed(),
            Body::Bytes(bytes) => Full::new(bytes).map_err(|never| match never {}).boxed(),
            Body::Stream { stream, .. } => StreamBody::new(stream.map_ok(Frame::data)).boxed(),
        };

        let mut http_request = http::Request::new(body);
        *http_request.method_mut() = request.method;
        *http_request.uri_mut() = uri;
        *http_request.headers_mut() = request.headers;

        let headers = http_request.headers_mut();
        if !headers.contains_key(HOST) {
            let host = match (request.url.host_str(), request.url.port()) {
                (Some(host), Some(port)) => format!("{}:{}", host, port),
                (Some(host), None) => host.to_string(),
                (None, _) => "localhost".to_string(),
            };
            let value = HeaderValue::from_str(&host).map_err(|e| {
                ClientError::InvalidRequest(format!("Invalid host '{}': {}", host, e))
            })?;
            headers.insert(HOST, value);
        }
        if !headers.contains_key(USER_AGENT) {
            let value = HeaderValue::from_str(&self.user_agent).map_err(|e| {
                ClientError::Configuration(format!("Invalid user agent: {}", e))
            })?;
            headers.insert(USER_AGENT, value);
        }
        Ok(http_request)
    }
}

#[async_trait]
impl Transport for UnixSocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::UnixSocket
    }

    #[instrument(skip(self, request), fields(method = %request.method, socket = %self.path.display()))]
    async fn send(&self, request: OutgoingRequest) -> Result<RawResponse, ClientError> {
        let http_request = self.to_http_request(request)?;
        let stream = self.open().await?;

        let (mut sender, connection) =
            hyper::client::conn::http1::handshake::<_, RequestBody>(TokioIo::new(stream))
                .await
                .map_err(|e| ClientError::Transport(format!("HTTP handshake failed: {}", e)))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(error = %e, "unix socket connection closed with error");
            }
        });

        let deadline = Instant::now() + self.read_timeout;
        let response = tokio::time::timeout_at(deadline, sender.send_request(http_request))
            .await
            .map_err(|_| self.timed_out())?
            .map_err(|e| ClientError::Transport(format!("Request failed: {}", e)))?;
        let (parts, body) = response.into_parts();
        debug!(status = %parts.status, "response head received");

        Ok(RawResponse {
            status: parts.status,
            headers: parts.headers,
            body: ResponseBody::Streaming(Box::pin(self.body_stream(body, sender, deadline))),
        })
    }
}

impl UnixSocketTransport {
    fn timed_out(&self) -> ClientError {
        ClientError::Transport(format!(
            "Request timed out after {:?} on unix socket {}",
            self.read_timeout,
            self.path.display()
        ))
    }

    /// Data frames of `body`, each read before the request's deadline.
    ///
    /// The sender rides along so the connection stays open until the body
    /// is done.
    fn body_stream(
        &self,
        body: Incoming,
        sender: SendRequest<RequestBody>,
        deadline: Instant,
    ) -> impl futures_util::Stream<Item = Result<Bytes, ClientError>> + Send + 'static {
        let transport = self.clone();
        stream::try_unfold(
            (body, sender, transport),
            move |(mut body, sender, transport)| async move {
                loop {
                    let frame = tokio::time::timeout_at(deadline, body.frame())
                        .await
                        .map_err(|_| transport.timed_out())?;
                    match frame {
                        None => return Ok(None),
                        Some(Err(e)) => {
                            return Err(ClientError::Transport(format!(
                                "Failed to read response body: {}",
                                e
                            )))
                        }
                        Some(Ok(frame)) => {
                            if let Ok(data) = frame.into_data() {
                                return Ok(Some((data, (body, sender, transport))));
                            }
                        }
                    }
                }
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, Method};
    use reqwest::Url;

    #[test]
    fn test_selector_resolves_to_one_transport() {
        let settings = TransportSettings::default();
        let network = connect(&TransportSelector::Network, &settings).unwrap();
        assert_eq!(network.kind(), TransportKind::Network);

        let uds = connect(
            &TransportSelector::UnixSocket(PathBuf::from("/tmp/test.sock")),
            &settings,
        )
        .unwrap();
        assert_eq!(uds.kind(), TransportKind::UnixSocket);
    }

    #[test]
    fn test_unix_request_uses_origin_form_and_base_host() {
        let transport =
            UnixSocketTransport::new(PathBuf::from("/tmp/test.sock"), &TransportSettings::default());
        let request = OutgoingRequest {
            method: Method::GET,
            url: Url::parse("http://objectstorage:8080/n/ns?limit=1").unwrap(),
            headers: HeaderMap::new(),
            body: Body::Empty,
        };
        let http_request = transport.to_http_request(request).unwrap();
        assert_eq!(http_request.uri(), "/n/ns?limit=1");
        assert_eq!(http_request.headers()[HOST], "objectstorage:8080");
        assert!(http_request.headers()[USER_AGENT]
            .to_str()
            .unwrap()
            .starts_with("cloudsdk-http/"));
    }

    #[tokio::test]
    async fn test_missing_socket_is_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let transport = UnixSocketTransport::new(
            dir.path().join("absent.sock"),
            &TransportSettings::default(),
        );
        let err = transport
            .send(OutgoingRequest {
                method: Method::GET,
                url: Url::parse("http://localhost/").unwrap(),
                headers: HeaderMap::new(),
                body: Body::Empty,
            })
            .await
            .unwrap_err();
        assert!(err.is_transport());
        assert!(err.to_string().contains("absent.sock"));
    }
}
