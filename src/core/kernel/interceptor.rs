use crate::core::errors::ClientError;
use crate::core::kernel::request::{HttpRequest, HttpResponse};
use std::fmt;
use std::sync::Arc;

/// Priority of the request signer; runs before instrumentation so that it
/// sees unsigned requests and instrumentation sees the final headers
pub const SIGNING_PRIORITY: i32 = 100;
pub const METRICS_PRIORITY: i32 = 1000;
pub const TRACING_PRIORITY: i32 = 1100;

/// Pre/post hooks around every request a client executes
///
/// Hooks run sequentially on the task that called `execute`, in ascending
/// priority order for both phases.
pub trait RequestInterceptor: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Observe or mutate the request before any byte is sent.
    ///
    /// An error aborts the send; the remaining before-hooks are skipped and
    /// the error is handed to the after-hooks.
    fn before_request(&self, _request: &mut HttpRequest) -> Result<(), ClientError> {
        Ok(())
    }

    /// Observe the outcome and return the outcome for the next hook.
    ///
    /// The default passes `outcome` through untouched. Returning `Ok` for an
    /// `Err` input replaces the error with a substitute response.
    fn after_response(
        &self,
        _request: &HttpRequest,
        outcome: Result<HttpResponse, ClientError>,
    ) -> Result<HttpResponse, ClientError> {
        outcome
    }
}

#[derive(Clone)]
pub struct PrioritizedInterceptor {
    priority: i32,
    interceptor: Arc<dyn RequestInterceptor>,
}

impl PrioritizedInterceptor {
    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn interceptor(&self) -> &Arc<dyn RequestInterceptor> {
        &self.interceptor
    }
}

impl fmt::Debug for PrioritizedInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrioritizedInterceptor")
            .field("priority", &self.priority)
            .field("interceptor", &self.interceptor.name())
            .finish()
    }
}

/// Interceptors in registration order until [`InterceptorChain::sorted`]
/// freezes them into execution order
#[derive(Clone, Default, Debug)]
pub struct InterceptorChain {
    entries: Vec<PrioritizedInterceptor>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, priority: i32, interceptor: Arc<dyn RequestInterceptor>) {
        self.entries.push(PrioritizedInterceptor {
            priority,
            interceptor,
        });
    }

    /// An independent copy ordered by ascending priority.
    ///
    /// The sort is stable, so equal priorities keep registration order.
    pub fn sorted(&self) -> Self {
        let mut entries = self.entries.clone();
        entries.sort_by_key(PrioritizedInterceptor::priority);
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PrioritizedInterceptor> {
        self.entries.iter()
    }

    pub(crate) fn before_request(&self, request: &mut HttpRequest) -> Result<(), ClientError> {
        for entry in &self.entries {
            entry.interceptor.before_request(request).map_err(|e| {
                tracing::debug!(
                    interceptor = entry.interceptor.name(),
                    priority = entry.priority,
                    error = %e,
                    "before-request hook failed"
                );
                e
            })?;
        }
        Ok(())
    }

    pub(crate) fn after_response(
        &self,
        request: &HttpRequest,
        outcome: Result<HttpResponse, ClientError>,
    ) -> Result<HttpResponse, ClientError> {
        self.entries.iter().fold(outcome, |outcome, entry| {
            entry.interceptor.after_response(request, outcome)
        })
    }
}
