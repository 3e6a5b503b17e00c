use crate::core::errors::ClientError;
use crate::core::kernel::interceptor::RequestInterceptor;
use crate::core::kernel::request::{HttpRequest, HttpResponse};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Request counters shared between a [`MetricsInterceptor`] and whoever
/// exports them
#[derive(Debug, Default)]
pub struct RequestMetrics {
    requests: AtomicU64,
    failures: AtomicU64,
    error_responses: AtomicU64,
    total_latency_micros: AtomicU64,
    max_latency_micros: AtomicU64,
}

/// Point-in-time copy of [`RequestMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests: u64,
    /// Requests that ended in an error instead of a response
    pub failures: u64,
    /// Responses with a 4xx or 5xx status
    pub error_responses: u64,
    pub total_latency: Duration,
    pub max_latency: Duration,
}

impl MetricsSnapshot {
    pub fn average_latency(&self) -> Duration {
        if self.requests == 0 {
            Duration::ZERO
        } else {
            self.total_latency / u32::try_from(self.requests).unwrap_or(u32::MAX)
        }
    }
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, latency: Duration, outcome: &Result<HttpResponse, ClientError>) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.total_latency_micros.fetch_add(micros, Ordering::Relaxed);
        self.max_latency_micros.fetch_max(micros, Ordering::Relaxed);
        match outcome {
            Ok(response) if response.status().is_client_error() || response.status().is_server_error() => {
                self.error_responses.fetch_add(1, Ordering::Relaxed);
            }
            Ok(_) => {}
            Err(_) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            error_responses: self.error_responses.load(Ordering::Relaxed),
            total_latency: Duration::from_micros(self.total_latency_micros.load(Ordering::Relaxed)),
            max_latency: Duration::from_micros(self.max_latency_micros.load(Ordering::Relaxed)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RequestStart(Instant);

/// Times each request from its before-hook to its after-hook
#[derive(Debug, Clone)]
pub struct MetricsInterceptor {
    metrics: Arc<RequestMetrics>,
}

impl MetricsInterceptor {
    pub fn new(metrics: Arc<RequestMetrics>) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> &Arc<RequestMetrics> {
        &self.metrics
    }
}

impl RequestInterceptor for MetricsInterceptor {
    fn name(&self) -> &str {
        "metrics"
    }

    fn before_request(&self, request: &mut HttpRequest) -> Result<(), ClientError> {
        request.extensions_mut().insert(RequestStart(Instant::now()));
        Ok(())
    }

    fn after_response(
        &self,
        request: &HttpRequest,
        outcome: Result<HttpResponse, ClientError>,
    ) -> Result<HttpResponse, ClientError> {
        // A before-hook that failed earlier in the chain means no start mark
        let latency = request
            .extensions()
            .get::<RequestStart>()
            .map_or(Duration::ZERO, |start| start.0.elapsed());
        self.metrics.record(latency, &outcome);
        outcome
    }
}

/// Logs one event per request outcome
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingInterceptor;

impl RequestInterceptor for TracingInterceptor {
    fn name(&self) -> &str {
        "tracing"
    }

    fn before_request(&self, request: &mut HttpRequest) -> Result<(), ClientError> {
        debug!(method = %request.method(), uri = %request.uri(), "sending request");
        Ok(())
    }

    fn after_response(
        &self,
        request: &HttpRequest,
        outcome: Result<HttpResponse, ClientError>,
    ) -> Result<HttpResponse, ClientError> {
        match &outcome {
            Ok(response) => debug!(
                method = %request.method(),
                uri = %request.uri(),
                status = %response.status(),
                bytes = response.body().map(|body| body.len()),
                streaming = response.is_streaming(),
                "request completed"
            ),
            Err(e) => warn!(
                method = %request.method(),
                uri = %request.uri(),
                error = %e,
                "request failed"
            ),
        }
        outcome
    }
}
