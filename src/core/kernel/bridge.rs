use crate::core::errors::ClientError;
use crate::core::traits::AsyncHandler;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::trace;

type Outcome<T> = Result<T, ClientError>;

enum SinkState<T> {
    Pending(oneshot::Sender<Outcome<T>>),
    Completed,
}

/// [`AsyncHandler`] that forwards the first terminal callback to a
/// single-value receiver and ignores every later one
pub struct AsyncHandlerSink<T> {
    state: Mutex<SinkState<T>>,
}

impl<T> AsyncHandlerSink<T> {
    pub fn new(sender: oneshot::Sender<Outcome<T>>) -> Self {
        Self {
            state: Mutex::new(SinkState::Pending(sender)),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            SinkState::Completed
        )
    }

    /// Returns whether this call was the one that completed the sink
    fn complete(&self, outcome: Outcome<T>) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match std::mem::replace(&mut *state, SinkState::Completed) {
            SinkState::Pending(sender) => {
                if sender.send(outcome).is_err() {
                    trace!("subscriber went away before completion; result dropped");
                }
                true
            }
            SinkState::Completed => {
                trace!("ignoring callback on completed handler");
                false
            }
        }
    }
}

impl<T> fmt::Debug for AsyncHandlerSink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncHandlerSink")
            .field("completed", &self.is_completed())
            .finish()
    }
}

impl<Req, T: Send> AsyncHandler<Req, T> for AsyncHandlerSink<T> {
    fn on_success(&self, _request: &Req, response: T) {
        self.complete(Ok(response));
    }

    fn on_error(&self, _request: &Req, error: ClientError) {
        self.complete(Err(error));
    }
}

type Registration<T> = Box<dyn FnOnce(Arc<AsyncHandlerSink<T>>) + Send>;

enum SingleState<T> {
    Idle(Registration<T>),
    Waiting(oneshot::Receiver<Outcome<T>>),
    Done,
}

/// A future that resolves with exactly one value or error delivered through
/// an [`AsyncHandlerSink`].
///
/// Nothing happens until the first poll: only then is the registration
/// closure called with a fresh handler, typically to start an SDK call with
/// it. Dropping the `Single` stops delivery but does not cancel the call.
///
/// ```rust
/// use cloudsdk_http::core::kernel::Single;
/// use cloudsdk_http::core::traits::AsyncHandler;
///
/// # async fn example() {
/// let single = Single::<String>::create(|handler| {
///     std::thread::spawn(move || handler.on_success(&"GetNamespace", "ns".to_string()));
/// });
/// assert_eq!(single.await.unwrap(), "ns");
/// # }
/// ```
pub struct Single<T> {
    state: SingleState<T>,
}

impl<T: Send + 'static> Single<T> {
    pub fn create<F>(register: F) -> Self
    where
        F: FnOnce(Arc<AsyncHandlerSink<T>>) + Send + 'static,
    {
        Self {
            state: SingleState::Idle(Box::new(register)),
        }
    }
}

impl<T> fmt::Debug for Single<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            SingleState::Idle(_) => "idle",
            SingleState::Waiting(_) => "waiting",
            SingleState::Done => "done",
        };
        f.debug_struct("Single").field("state", &state).finish()
    }
}

impl<T> Future for Single<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        loop {
            match std::mem::replace(&mut this.state, SingleState::Done) {
                SingleState::Idle(register) => {
                    let (sender, receiver) = oneshot::channel();
                    register(Arc::new(AsyncHandlerSink::new(sender)));
                    this.state = SingleState::Waiting(receiver);
                }
                SingleState::Waiting(mut receiver) => {
                    return match Pin::new(&mut receiver).poll(cx) {
                        Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
                        Poll::Ready(Err(_)) => Poll::Ready(Err(ClientError::Transport(
                            "async handler was dropped without completing".to_string(),
                        ))),
                        Poll::Pending => {
                            this.state = SingleState::Waiting(receiver);
                            Poll::Pending
                        }
                    };
                }
                SingleState::Done => {
                    return Poll::Ready(Err(ClientError::InvalidRequest(
                        "Single polled after completion".to_string(),
                    )))
                }
            }
        }
    }
}
