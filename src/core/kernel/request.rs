use crate::core::errors::ClientError;
use crate::core::kernel::codec::{DefaultSerializer, Serializer, SerializerExt};
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use http::{Extensions, HeaderMap, Method, StatusCode};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

/// Streamed request body chunks
pub type BodyStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + Sync>>;

/// Request payload
#[derive(Default)]
pub enum Body {
    #[default]
    Empty,
    Bytes(Bytes),
    /// Read lazily while sending; not replayable
    Stream {
        stream: BodyStream,
        content_length: Option<u64>,
    },
}

impl Body {
    pub fn from_stream<S>(stream: S, content_length: Option<u64>) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + Sync + 'static,
    {
        Self::Stream {
            stream: Box::pin(stream),
            content_length,
        }
    }

    /// Whether the body can be sent more than once
    pub fn is_replayable(&self) -> bool {
        !matches!(self, Self::Stream { .. })
    }

    pub fn try_clone(&self) -> Option<Self> {
        match self {
            Self::Empty => Some(Self::Empty),
            Self::Bytes(bytes) => Some(Self::Bytes(bytes.clone())),
            Self::Stream { .. } => None,
        }
    }

    /// The in-memory content, if there is any
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Empty => Some(&[]),
            Self::Bytes(bytes) => Some(bytes),
            Self::Stream { .. } => None,
        }
    }

    /// Read a streamed body fully into memory
    pub async fn buffer(self) -> Result<Self, ClientError> {
        match self {
            Self::Stream { mut stream, .. } => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(|e| {
                        ClientError::Transport(format!("Failed to read request body: {}", e))
                    })?;
                    buf.extend_from_slice(&chunk);
                }
                Ok(Self::Bytes(buf.freeze()))
            }
            other => Ok(other),
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Self::Stream { content_length, .. } => f
                .debug_struct("Stream")
                .field("content_length", content_length)
                .finish_non_exhaustive(),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Bytes(Bytes::from(text))
    }
}

/// An outgoing request, created by [`HttpClient::create_request`].
///
/// Interceptors receive it mutably before it is sent, so signers can add
/// headers and instrumentation can stash state in [`HttpRequest::extensions_mut`].
///
/// [`HttpClient::create_request`]: crate::core::kernel::HttpClient::create_request
pub struct HttpRequest {
    method: Method,
    base: Url,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Body,
    extensions: Extensions,
    serializer: Arc<dyn Serializer>,
}

impl HttpRequest {
    pub fn new(method: Method, base: Url, serializer: Arc<dyn Serializer>) -> Self {
        let path = base.path().to_string();
        Self {
            method,
            base,
            path,
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: Body::Empty,
            extensions: Extensions::new(),
            serializer,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Append an already-encoded path segment, normalizing the slash between
    /// the current path and the new part
    pub fn append_path_part(&mut self, encoded_part: &str) -> &mut Self {
        let slash_left = self.path.ends_with('/');
        let slash_right = encoded_part.starts_with('/');
        match (slash_left, slash_right) {
            (true, true) => self.path.push_str(&encoded_part[1..]),
            (false, false) => {
                self.path.push('/');
                self.path.push_str(encoded_part);
            }
            _ => self.path.push_str(encoded_part),
        }
        self
    }

    pub fn query(&mut self, name: &str, value: &str) -> &mut Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    /// The full target: base URI, appended path and query
    pub fn uri(&self) -> Url {
        let mut url = self.base.clone();
        url.set_path(&self.path);
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        url
    }

    /// Path and query as sent on the request line
    pub fn path_and_query(&self) -> String {
        let url = self.uri();
        match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        }
    }

    /// Add a header value; repeated names keep every value
    pub fn header(&mut self, name: &str, value: &str) -> Result<&mut Self, ClientError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ClientError::InvalidRequest(format!("Invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ClientError::InvalidRequest(format!("Invalid value for header {}: {}", name, e)))?;
        self.headers.append(name, value);
        Ok(self)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body_bytes(&mut self, bytes: impl Into<Bytes>) -> &mut Self {
        self.body = Body::Bytes(bytes.into());
        self
    }

    /// Encode `value` with the client's serializer
    pub fn body_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<&mut Self, ClientError> {
        let encoded = self.serializer.encode(value)?;
        if !self.headers.contains_key(CONTENT_TYPE) {
            self.headers
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        self.body = Body::Bytes(Bytes::from(encoded));
        Ok(self)
    }

    pub fn body_stream<S>(&mut self, stream: S, content_length: Option<u64>) -> &mut Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + Sync + 'static,
    {
        self.body = Body::from_stream(stream, content_length);
        self
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub(crate) fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    pub(crate) fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Copy the request, if its body can be replayed
    pub fn try_clone(&self) -> Option<Self> {
        Some(Self {
            method: self.method.clone(),
            base: self.base.clone(),
            path: self.path.clone(),
            query: self.query.clone(),
            headers: self.headers.clone(),
            body: self.body.try_clone()?,
            extensions: self.extensions.clone(),
            serializer: Arc::clone(&self.serializer),
        })
    }

    /// Snapshot handed to a transport
    pub(crate) fn to_outgoing(&self, body: Body) -> OutgoingRequest {
        let mut headers = self.headers.clone();
        if let Body::Stream {
            content_length: Some(length),
            ..
        } = &body
        {
            if !headers.contains_key(CONTENT_LENGTH) {
                headers.insert(CONTENT_LENGTH, HeaderValue::from(*length));
            }
        }
        OutgoingRequest {
            method: self.method.clone(),
            url: self.uri(),
            headers,
            body,
        }
    }

    /// Snapshot with a copy of the current body, if it can be replayed
    pub(crate) fn replay_outgoing(&self) -> Option<OutgoingRequest> {
        self.body.try_clone().map(|body| self.to_outgoing(body))
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("uri", &self.uri().as_str())
            .field("headers", &self.headers)
            .field("body", &self.body)
            .finish_non_exhaustive()
    }
}

/// What a [`Transport`](crate::core::kernel::Transport) puts on the wire
#[derive(Debug)]
pub struct OutgoingRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Body,
}

/// Streamed response body chunks
pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

/// Response payload: read into memory, or still arriving
pub enum ResponseBody {
    Full(Bytes),
    Streaming(ResponseStream),
}

impl ResponseBody {
    /// Read the remaining chunks into memory
    pub async fn collect(self) -> Result<Bytes, ClientError> {
        match self {
            Self::Full(bytes) => Ok(bytes),
            Self::Streaming(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }

    pub fn into_stream(self) -> ResponseStream {
        match self {
            Self::Full(bytes) if bytes.is_empty() => Box::pin(futures_util::stream::empty()),
            Self::Full(bytes) => Box::pin(futures_util::stream::once(async move { Ok(bytes) })),
            Self::Streaming(stream) => stream,
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(bytes) => write!(f, "Full({} bytes)", bytes.len()),
            Self::Streaming(_) => write!(f, "Streaming"),
        }
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        Self::Full(bytes)
    }
}

/// A response as returned by a transport, once its head has arrived
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl RawResponse {
    pub(crate) async fn buffer(self) -> Result<Self, ClientError> {
        let body = self.body.collect().await?;
        Ok(Self {
            status: self.status,
            headers: self.headers,
            body: ResponseBody::Full(body),
        })
    }
}

/// A response from [`HttpClient::execute`] (body in memory) or
/// [`HttpClient::execute_streaming`] (body read on demand).
///
/// [`HttpClient::execute`]: crate::core::kernel::HttpClient::execute
/// [`HttpClient::execute_streaming`]: crate::core::kernel::HttpClient::execute_streaming
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody,
    serializer: Arc<dyn Serializer>,
}

impl HttpResponse {
    /// Build a response from scratch, e.g. to substitute one in an interceptor.
    ///
    /// The client that returns it decodes it with its own serializer.
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: ResponseBody::Full(body.into()),
            serializer: Arc::new(DefaultSerializer),
        }
    }

    pub(crate) fn from_raw(raw: RawResponse, serializer: Arc<dyn Serializer>) -> Self {
        Self {
            status: raw.status,
            headers: raw.headers,
            body: raw.body,
            serializer,
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub(crate) fn with_serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.body, ResponseBody::Streaming(_))
    }

    /// The body, or `None` while it is still streamed
    pub fn body(&self) -> Option<&Bytes> {
        match &self.body {
            ResponseBody::Full(bytes) => Some(bytes),
            ResponseBody::Streaming(_) => None,
        }
    }

    fn full_body(&self) -> Result<&Bytes, ClientError> {
        self.body().ok_or_else(|| {
            ClientError::InvalidRequest(
                "response body is streamed; read it with stream_body or buffer it first".to_string(),
            )
        })
    }

    /// Consume the response as a stream of body chunks
    pub fn stream_body(self) -> ResponseStream {
        self.body.into_stream()
    }

    /// Read a streamed body into memory; a no-op for buffered responses
    pub async fn buffer(self) -> Result<Self, ClientError> {
        let body = self.body.collect().await?;
        Ok(Self {
            body: ResponseBody::Full(body),
            ..self
        })
    }

    pub fn text(&self) -> Result<String, ClientError> {
        String::from_utf8(self.full_body()?.to_vec())
            .map_err(|e| ClientError::Serialization(format!("Response body is not UTF-8: {}", e)))
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        self.serializer.decode(self.full_body()?)
    }

    pub fn json_list<T: DeserializeOwned>(&self) -> Result<Vec<T>, ClientError> {
        self.serializer.decode_list(self.full_body()?)
    }

    /// Turn a non-success status into [`ClientError::Api`].
    ///
    /// The message is the body for buffered responses and the status reason
    /// for streamed ones, whose body is left unread.
    pub fn error_for_status(self) -> Result<Self, ClientError> {
        if self.status.is_success() {
            return Ok(self);
        }
        let message = match &self.body {
            ResponseBody::Full(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            ResponseBody::Streaming(_) => self
                .status
                .canonical_reason()
                .unwrap_or_default()
                .to_string(),
        };
        Err(ClientError::Api {
            status: self.status.as_u16(),
            message,
        })
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("serializer", &self.serializer.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn request(base: &str) -> HttpRequest {
        HttpRequest::new(
            Method::GET,
            Url::parse(base).unwrap(),
            Arc::new(DefaultSerializer),
        )
    }

    #[test]
    fn test_append_path_part_normalizes_slashes() {
        let mut req = request("https://objectstorage.example.com/20160918");
        req.append_path_part("n").append_path_part("/ns").append_path_part("b/");
        req.append_path_part("/bucket");
        assert_eq!(
            req.uri().as_str(),
            "https://objectstorage.example.com/20160918/n/ns/b/bucket"
        );

        let mut root = request("https://example.com/");
        root.append_path_part("/echo");
        assert_eq!(root.uri().path(), "/echo");
    }

    #[test]
    fn test_query_is_appended() {
        let mut req = request("https://example.com/");
        req.append_path_part("o").query("limit", "10").query("prefix", "a b");
        assert_eq!(req.path_and_query(), "/o?limit=10&prefix=a+b");
    }

    #[test]
    fn test_headers_keep_every_value() {
        let mut req = request("https://example.com/");
        req.header("x-tag", "a").unwrap().header("x-tag", "b").unwrap();
        assert_eq!(req.headers().get_all("x-tag").iter().count(), 2);

        let err = req.header("bad header", "v").unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequest(_)));
    }

    #[test]
    fn test_body_json_sets_content_type() {
        let mut req = request("https://example.com/");
        req.body_json(&serde_json::json!({"name": "bucket"})).unwrap();
        assert_eq!(req.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(req.body().as_bytes(), Some(&br#"{"name":"bucket"}"#[..]));
    }

    #[test]
    fn test_stream_body_is_not_replayable() {
        let mut req = request("https://example.com/");
        req.body_stream(stream::iter(vec![Ok(Bytes::from_static(b"abc"))]), Some(3));
        assert!(!req.body().is_replayable());
        assert!(req.try_clone().is_none());

        req.body_bytes("abc");
        let copy = req.try_clone().unwrap();
        assert_eq!(copy.body().as_bytes(), Some(&b"abc"[..]));
    }

    #[tokio::test]
    async fn test_buffered_stream_replays_identical_bytes() {
        let chunks = vec![
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"buffered ")),
            Ok(Bytes::from_static(b"world")),
        ];
        let body = Body::from_stream(stream::iter(chunks), None)
            .buffer()
            .await
            .unwrap();
        let first = body.try_clone().unwrap();
        let second = body.try_clone().unwrap();
        assert_eq!(first.as_bytes(), Some(&b"hello buffered world"[..]));
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[tokio::test]
    async fn test_buffer_surfaces_read_failure_as_transport_error() {
        let chunks = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "source closed")),
        ];
        let err = Body::from_stream(stream::iter(chunks), None)
            .buffer()
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn test_response_helpers() {
        let response = HttpResponse::new(StatusCode::OK, r#"[{"a":1},{"a":2}]"#);
        let items: Vec<serde_json::Value> = response.json_list().unwrap();
        assert_eq!(items.len(), 2);

        let failed = HttpResponse::new(StatusCode::NOT_FOUND, "no such bucket");
        match failed.error_for_status() {
            Err(ClientError::Api { status, message }) => {
                assert_eq!(status, 404);
                assert_eq!(message, "no such bucket");
            }
            other => panic!("expected API error, got {:?}", other.map(|r| r.status())),
        }
    }

    #[tokio::test]
    async fn test_streamed_response_is_read_on_demand() {
        let chunks: Vec<Result<Bytes, ClientError>> =
            vec![Ok(Bytes::from_static(b"[1,")), Ok(Bytes::from_static(b"2]"))];
        let response = HttpResponse::from_raw(
            RawResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: ResponseBody::Streaming(Box::pin(stream::iter(chunks))),
            },
            Arc::new(DefaultSerializer),
        );
        assert!(response.is_streaming());
        assert!(response.body().is_none());
        assert!(matches!(
            response.json::<Vec<u8>>().unwrap_err(),
            ClientError::InvalidRequest(_)
        ));

        let buffered = response.buffer().await.unwrap();
        assert!(!buffered.is_streaming());
        assert_eq!(buffered.json::<Vec<u8>>().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_stream_body_of_buffered_response() {
        let chunks: Vec<Bytes> = HttpResponse::new(StatusCode::OK, "whole")
            .stream_body()
            .map(Result::unwrap)
            .collect()
            .await;
        assert_eq!(chunks, vec![Bytes::from_static(b"whole")]);
    }

    #[tokio::test]
    async fn test_stream_failure_is_kept() {
        let chunks: Vec<Result<Bytes, ClientError>> = vec![
            Ok(Bytes::from_static(b"part")),
            Err(ClientError::Transport("connection reset".to_string())),
        ];
        let err = ResponseBody::Streaming(Box::pin(stream::iter(chunks)))
            .collect()
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }
}
