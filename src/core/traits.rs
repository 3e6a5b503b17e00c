use crate::core::errors::ClientError;

/// Callback pair used by SDK clients for asynchronous calls.
///
/// An SDK invokes exactly one of the two methods per call in the normal case,
/// but implementations must tolerate repeated or mixed delivery.
pub trait AsyncHandler<Req, Res>: Send + Sync {
    fn on_success(&self, request: &Req, response: Res);

    fn on_error(&self, request: &Req, error: ClientError);
}
