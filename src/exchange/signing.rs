use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signature, Signer, Verifier, VerifyingKey};

use crate::config::Credentials;
use crate::error::{ClientError, Result};

pub const HEADER_API_KEY: &str = "x-api-key";
pub const HEADER_SIGNATURE: &str = "x-signature";
pub const HEADER_TIMESTAMP: &str = "x-timestamp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            other => Err(ClientError::Validation(format!(
                "unsupported method {}, expected GET or POST",
                other
            ))),
        }
    }
}

/// Field order of the canonical message. Fields are concatenated with no
/// separators; the server rebuilds the same bytes to verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageLayout {
    /// `api_key || timestamp || path || method || body`
    #[default]
    Brokerage,
    /// `timestamp || method || path || body`
    TimestampMethodPath,
}

impl MessageLayout {
    pub fn canonical_message(
        &self,
        api_key: &str,
        timestamp: u64,
        method: HttpMethod,
        path: &str,
        body: &str,
    ) -> String {
        match self {
            MessageLayout::Brokerage => {
                format!("{}{}{}{}{}", api_key, timestamp, path, method.as_str(), body)
            }
            MessageLayout::TimestampMethodPath => {
                format!("{}{}{}{}", timestamp, method.as_str(), path, body)
            }
        }
    }
}

impl FromStr for MessageLayout {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "brokerage" => Ok(MessageLayout::Brokerage),
            "timestamp-method-path" => Ok(MessageLayout::TimestampMethodPath),
            other => Err(ClientError::Configuration(format!(
                "unknown message layout {}",
                other
            ))),
        }
    }
}

/// A request whose signature already covers method, path, timestamp and body.
/// Fields are read-only so nothing can drift from what was signed.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    method: HttpMethod,
    path: String,
    body: String,
    timestamp: u64,
    signature: Signature,
    headers: BTreeMap<String, String>,
}

impl SignedRequest {
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn signature(&self) -> [u8; 64] {
        self.signature.to_bytes()
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

pub struct SignedRequestBuilder {
    credentials: Credentials,
    layout: MessageLayout,
}

impl SignedRequestBuilder {
    pub fn new(credentials: Credentials, layout: MessageLayout) -> Self {
        Self {
            credentials,
            layout,
        }
    }

    pub fn layout(&self) -> MessageLayout {
        self.layout
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn now_ts() -> Result<u64> {
        unix_seconds(chrono::Utc::now().timestamp())
    }

    /// Sign a request stamped with the current Unix time.
    pub fn build(&self, method: HttpMethod, path: &str, body: &str) -> Result<SignedRequest> {
        self.build_at(method, path, body, Self::now_ts()?)
    }

    pub fn build_at(
        &self,
        method: HttpMethod,
        path: &str,
        body: &str,
        timestamp: u64,
    ) -> Result<SignedRequest> {
        validate(method, path, body)?;

        let api_key = self.credentials.api_key();
        let message = self
            .layout
            .canonical_message(api_key, timestamp, method, path, body);
        let signature = self
            .credentials
            .signing_key()
            .try_sign(message.as_bytes())
            .map_err(|e| ClientError::Signing(e.to_string()))?;

        let mut headers = BTreeMap::new();
        headers.insert(HEADER_API_KEY.to_string(), api_key.to_string());
        headers.insert(
            HEADER_SIGNATURE.to_string(),
            STANDARD.encode(signature.to_bytes()),
        );
        headers.insert(HEADER_TIMESTAMP.to_string(), timestamp.to_string());

        Ok(SignedRequest {
            method,
            path: path.to_string(),
            body: body.to_string(),
            timestamp,
            signature,
            headers,
        })
    }
}

fn unix_seconds(ts: i64) -> Result<u64> {
    u64::try_from(ts).map_err(|_| {
        ClientError::Signing(format!("system clock is before the Unix epoch ({})", ts))
    })
}

fn validate(method: HttpMethod, path: &str, body: &str) -> Result<()> {
    if path.is_empty() {
        return Err(ClientError::Validation("path is empty".to_string()));
    }
    if !path.starts_with('/') {
        return Err(ClientError::Validation(format!(
            "path must start with '/': {}",
            path
        )));
    }
    if body.is_empty() {
        return Ok(());
    }
    if method == HttpMethod::Get {
        return Err(ClientError::Validation("GET request cannot carry a body".to_string()));
    }
    serde_json::from_str::<serde_json::Value>(body)
        .map_err(|e| ClientError::Validation(format!("body is not valid JSON: {}", e)))?;
    Ok(())
}

/// Rebuild the canonical message from the emitted headers and check the
/// signature the way the server does.
pub fn verify_signed_request(
    request: &SignedRequest,
    verifying_key: &VerifyingKey,
    layout: MessageLayout,
) -> Result<()> {
    let api_key = request
        .header(HEADER_API_KEY)
        .ok_or_else(|| ClientError::Signing(format!("missing {} header", HEADER_API_KEY)))?;
    let timestamp: u64 = request
        .header(HEADER_TIMESTAMP)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| ClientError::Signing(format!("bad {} header", HEADER_TIMESTAMP)))?;
    let encoded = request
        .header(HEADER_SIGNATURE)
        .ok_or_else(|| ClientError::Signing(format!("missing {} header", HEADER_SIGNATURE)))?;

    let raw = STANDARD
        .decode(encoded)
        .map_err(|e| ClientError::Signing(format!("signature is not base64: {}", e)))?;
    let bytes: [u8; 64] = raw
        .try_into()
        .map_err(|_| ClientError::Signing("signature must be 64 bytes".to_string()))?;
    let signature = Signature::from_bytes(&bytes);

    let message = layout.canonical_message(
        api_key,
        timestamp,
        request.method(),
        request.path(),
        request.body(),
    );
    verifying_key
        .verify(message.as_bytes(), &signature)
        .map_err(|e| ClientError::Signing(format!("signature does not verify: {}", e)))
}
