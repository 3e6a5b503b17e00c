#![allow(dead_code)]

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Map, Value};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};

/// A request as seen by a test server
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

#[derive(Default)]
struct ServerState {
    requests: Mutex<Vec<RecordedRequest>>,
    fail_first: AtomicUsize,
}

/// In-process HTTP/1.1 echo server.
///
/// Every request is answered with a JSON document describing it:
/// `{"method", "path", "headers", "body"}`. Paths of the form `/status/<code>`
/// answer with that status, `/raw/<text>` answers with the text verbatim and
/// `/bytes/<n>` answers with `n` bytes of `x`.
/// The first `fail_first` requests are read fully and then dropped without
/// a response.
pub struct TestServer {
    pub addr: Option<SocketAddr>,
    pub socket_path: Option<PathBuf>,
    state: Arc<ServerState>,
    _dir: Option<TempDir>,
}

impl TestServer {
    pub async fn tcp(fail_first: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(ServerState {
            fail_first: AtomicUsize::new(fail_first),
            ..ServerState::default()
        });
        let server_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                serve(stream, Arc::clone(&server_state));
            }
        });
        Self {
            addr: Some(addr),
            socket_path: None,
            state,
            _dir: None,
        }
    }

    pub async fn unix(fail_first: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let state = Arc::new(ServerState {
            fail_first: AtomicUsize::new(fail_first),
            ..ServerState::default()
        });
        let server_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                serve(stream, Arc::clone(&server_state));
            }
        });
        Self {
            addr: None,
            socket_path: Some(path),
            state,
            _dir: Some(dir),
        }
    }

    pub fn base_uri(&self) -> String {
        match self.addr {
            Some(addr) => format!("http://{}", addr),
            None => "http://localhost".to_string(),
        }
    }

    pub fn socket_path_str(&self) -> String {
        self.socket_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    }

    pub fn hits(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

/// Accepts connections and never answers on them
pub struct SilentServer {
    pub addr: Option<SocketAddr>,
    pub socket_path: Option<PathBuf>,
    held: Arc<Mutex<usize>>,
    _dir: Option<TempDir>,
}

impl SilentServer {
    pub async fn tcp() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let held = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&held);
        tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                open.push(stream);
                *counter.lock().unwrap() += 1;
            }
        });
        Self {
            addr: Some(addr),
            socket_path: None,
            held,
            _dir: None,
        }
    }

    pub async fn unix() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silent.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let held = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&held);
        tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                open.push(stream);
                *counter.lock().unwrap() += 1;
            }
        });
        Self {
            addr: None,
            socket_path: Some(path),
            held,
            _dir: Some(dir),
        }
    }

    pub fn base_uri(&self) -> String {
        match self.addr {
            Some(addr) => format!("http://{}", addr),
            None => "http://localhost".to_string(),
        }
    }

    pub fn socket_path_str(&self) -> String {
        self.socket_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    }

    /// Connections accepted so far
    pub fn connections(&self) -> usize {
        *self.held.lock().unwrap()
    }
}

/// A TCP port with nothing listening on it
pub async fn closed_port_uri() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

fn serve<S>(stream: S, state: Arc<ServerState>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let service = service_fn(move |request| handle(Arc::clone(&state), request));
        let _ = http1::Builder::new()
            .serve_connection(TokioIo::new(stream), service)
            .await;
    });
}

async fn handle(
    state: Arc<ServerState>,
    request: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, io::Error> {
    let (parts, body) = request.into_parts();
    let body = body
        .collect()
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
        .to_bytes();
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_default();
    let headers: Vec<(String, String)> = parts
        .headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();

    state.requests.lock().unwrap().push(RecordedRequest {
        method: parts.method.to_string(),
        path: path.clone(),
        headers: headers.clone(),
        body: body.clone(),
    });

    if state
        .fail_first
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
    {
        return Err(io::Error::new(io::ErrorKind::Other, "injected failure"));
    }

    if let Some(size) = path.strip_prefix("/bytes/").and_then(|n| n.parse::<usize>().ok()) {
        return Ok(Response::new(Full::new(Bytes::from(vec![b'x'; size]))));
    }

    if let Some(text) = path.strip_prefix("/raw/") {
        return Ok(Response::new(Full::new(Bytes::from(text.to_string()))));
    }

    let status = path
        .strip_prefix("/status/")
        .and_then(|code| code.parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::OK);

    let mut header_map = Map::new();
    for (name, value) in &headers {
        let merged = match header_map.get(name) {
            Some(Value::String(existing)) => format!("{}, {}", existing, value),
            _ => value.clone(),
        };
        header_map.insert(name.clone(), Value::String(merged));
    }
    let echo = json!({
        "method": parts.method.as_str(),
        "path": path,
        "headers": header_map,
        "body": String::from_utf8_lossy(&body),
    });

    let mut response = Response::new(Full::new(Bytes::from(echo.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    Ok(response)
}
