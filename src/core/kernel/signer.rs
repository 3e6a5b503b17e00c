use crate::core::errors::ClientError;
use crate::core::kernel::interceptor::RequestInterceptor;
use crate::core::kernel::request::HttpRequest;
use base64::engine::general_purpose;
use base64::Engine;
use hmac::{Hmac, Mac};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use secrecy::{ExposeSecret, Secret};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Result type for signing operations: headers to set on the request
pub type SignatureResult = Result<Vec<(String, String)>, ClientError>;

/// The parts of a request a signer may cover
#[derive(Debug, Clone, Copy)]
pub struct SigningRequest<'a> {
    pub method: &'a Method,
    /// Path and query exactly as sent on the request line
    pub path_and_query: &'a str,
    pub headers: &'a HeaderMap,
    /// `None` when the body is streamed and cannot be read ahead of sending
    pub body: Option<&'a [u8]>,
}

/// Signer trait for request authentication
///
/// The wrapped SDK supplies its own implementation; this crate only decides
/// when it runs (see [`SigningInterceptor`]).
pub trait Signer: Send + Sync {
    /// Compute the authentication headers for a request
    fn sign_request(&self, request: &SigningRequest<'_>) -> SignatureResult;
}

/// HMAC-SHA256 signer for development endpoints and tests.
///
/// Signs `method\npath?query\ntimestamp\nbody-sha256` with a shared secret
/// and sends the result base64-encoded in `x-signature`.
pub struct HmacSigner {
    key_id: String,
    secret: Secret<String>,
}

impl HmacSigner {
    pub const KEY_ID_HEADER: &'static str = "x-key-id";
    pub const TIMESTAMP_HEADER: &'static str = "x-timestamp";
    pub const CONTENT_SHA256_HEADER: &'static str = "x-content-sha256";
    pub const SIGNATURE_HEADER: &'static str = "x-signature";
    pub const UNSIGNED_PAYLOAD: &'static str = "UNSIGNED-PAYLOAD";

    pub fn new(key_id: String, secret: Secret<String>) -> Self {
        Self { key_id, secret }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Base64 SHA-256 of the body, or the unsigned marker for streamed bodies
    pub fn content_digest(body: Option<&[u8]>) -> String {
        body.map_or_else(
            || Self::UNSIGNED_PAYLOAD.to_string(),
            |bytes| general_purpose::STANDARD.encode(Sha256::digest(bytes)),
        )
    }

    pub fn string_to_sign(method: &Method, path_and_query: &str, timestamp: i64, digest: &str) -> String {
        format!(
            "{}\n{}\n{}\n{}",
            method.as_str().to_ascii_lowercase(),
            path_and_query,
            timestamp,
            digest
        )
    }

    pub fn signature(&self, string_to_sign: &str) -> Result<String, ClientError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|e| ClientError::Auth(format!("Invalid signing secret: {}", e)))?;
        mac.update(string_to_sign.as_bytes());
        Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Sign with a fixed timestamp (milliseconds since the epoch)
    pub fn sign_at(&self, request: &SigningRequest<'_>, timestamp: i64) -> SignatureResult {
        let digest = Self::content_digest(request.body);
        let string_to_sign =
            Self::string_to_sign(request.method, request.path_and_query, timestamp, &digest);
        let signature = self.signature(&string_to_sign)?;

        Ok(vec![
            (Self::KEY_ID_HEADER.to_string(), self.key_id.clone()),
            (Self::TIMESTAMP_HEADER.to_string(), timestamp.to_string()),
            (Self::CONTENT_SHA256_HEADER.to_string(), digest),
            (Self::SIGNATURE_HEADER.to_string(), signature),
        ])
    }
}

impl fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacSigner")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl Signer for HmacSigner {
    fn sign_request(&self, request: &SigningRequest<'_>) -> SignatureResult {
        self.sign_at(request, chrono::Utc::now().timestamp_millis())
    }
}

/// Runs a [`Signer`] as a before-request hook and sets the headers it
/// returns, replacing any earlier values
pub struct SigningInterceptor {
    signer: Arc<dyn Signer>,
}

impl SigningInterceptor {
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        Self { signer }
    }
}

impl RequestInterceptor for SigningInterceptor {
    fn name(&self) -> &str {
        "signing"
    }

    fn before_request(&self, request: &mut HttpRequest) -> Result<(), ClientError> {
        let path_and_query = request.path_and_query();
        let headers = self.signer.sign_request(&SigningRequest {
            method: request.method(),
            path_and_query: &path_and_query,
            headers: request.headers(),
            body: request.body().as_bytes(),
        })?;

        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ClientError::Auth(format!("Signer produced invalid header name '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|e| ClientError::Auth(format!("Signer produced invalid value for {}: {}", name, e)))?;
            request.headers_mut().insert(name, value);
        }
        Ok(())
    }
}
