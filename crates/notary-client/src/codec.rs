//! Notarization request and response.
//!
//! The client asks a notary what certificate it observes for a target by
//! posting to `/target/{host}+{port}`:
//!
//! ```text
//! POST /target/www.example.com+443 HTTP/1.1
//! Host: notary.example
//! Content-Type: application/x-www-form-urlencoded
//!
//! fingerprint=AB%3ACD%3A...&ip=93.184.216.34
//! ```
//!
//! A `200 OK` response carries the certificates the notary has observed:
//!
//! ```json
//! {
//!     "fingerprintList": [{ "fingerprint": "AB:CD:...", "timestamp": { "start": "...", "finish": "..." } }],
//!     "signature": "..."
//! }
//! ```

use std::net::IpAddr;
use std::time::Duration;

use http_body_util::{BodyExt as _, Full};
use hyper::body::Bytes;
use hyper::header::{CONTENT_TYPE, HOST};
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use notary_config::{Fingerprint, Verdict};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt as _;

use crate::ExchangeError;
use crate::tls::SecureChannel;

/// The notary could not determine which certificate the target presents.
pub const STATUS_INCONCLUSIVE: StatusCode = StatusCode::SEE_OTHER;

/// The notary observes a different certificate.
pub const STATUS_DISAGREEMENT: StatusCode = StatusCode::CONFLICT;

/// A server whose certificate is being checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    /// Address the client resolved for `host`.
    pub ip: IpAddr,
    /// Fingerprint of the certificate the client was presented.
    pub fingerprint: Fingerprint,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16, ip: IpAddr, fingerprint: Fingerprint) -> Self {
        Self {
            host: host.into(),
            port,
            ip,
            fingerprint,
        }
    }

    pub fn from_certificate(host: impl Into<String>, port: u16, ip: IpAddr, der: &[u8]) -> Self {
        Self::new(host, port, ip, Fingerprint::sha1_of_der(der))
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Serialize)]
struct NotarizationForm<'a> {
    fingerprint: &'a str,
    ip: String,
}

pub fn build_request(notary_host: &str, target: &Target) -> Result<Request<Full<Bytes>>, ExchangeError> {
    let body = serde_urlencoded::to_string(NotarizationForm {
        fingerprint: target.fingerprint.as_str(),
        ip: target.ip.to_string(),
    })
    .map_err(|e| ExchangeError::Request(e.into()))?;

    Request::builder()
        .method(Method::POST)
        .uri(format!("/target/{}+{}", target.host, target.port))
        .header(HOST, notary_host)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Full::new(Bytes::from(body)))
        .map_err(|e| ExchangeError::Request(e.into()))
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotaryResponse {
    pub fingerprint_list: Vec<Observation>,
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Observation {
    /// `None` for a blank entry, which matches nothing.
    #[serde(default, deserialize_with = "blank_as_none")]
    pub fingerprint: Option<Fingerprint>,
    /// Observation period, kept as sent by the notary.
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<Fingerprint>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.and_then(|value| Fingerprint::new(&value).ok()))
}

/// Maps a response status to a verdict.
///
/// `None` means the verdict depends on the response body.
pub fn verdict_for_status(status: StatusCode) -> Option<Verdict> {
    match status {
        StatusCode::OK => None,
        STATUS_INCONCLUSIVE => Some(Verdict::VerificationInconclusive),
        STATUS_DISAGREEMENT => Some(Verdict::VerificationFailure),
        _ => Some(Verdict::ConnectivityFailure),
    }
}

/// Succeeds when the notary has observed the presented certificate.
pub fn check_fingerprint_list(observations: &[Observation], presented: &Fingerprint) -> Verdict {
    for observation in observations {
        trace!(observed = ?observation.fingerprint, %presented, "Checking observation");

        if observation.fingerprint.as_ref() == Some(presented) {
            return Verdict::VerificationSuccess;
        }
    }

    Verdict::VerificationFailure
}

/// Sends the notarization request for `target` and reduces the response to a verdict.
///
/// The channel is consumed: it is shut down once the response is read, and
/// closed on drop when anything fails.
pub async fn exchange(channel: SecureChannel, target: &Target, timeout: Duration) -> Result<Verdict, ExchangeError> {
    tokio::time::timeout(timeout, exchange_impl(channel, target))
        .await
        .map_err(|_| ExchangeError::Timeout(timeout))?
}

async fn exchange_impl(channel: SecureChannel, target: &Target) -> Result<Verdict, ExchangeError> {
    let request = build_request(&channel.server_host, target)?;

    let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(channel.stream)).await?;

    let connection_fut = async { connection.without_shutdown().await.map_err(ExchangeError::Http) };

    let request_fut = async move {
        let response = sender.send_request(request).await?;
        let status = response.status();

        // Read the whole response even when the status alone decides, so that
        // the connection terminates cleanly.
        let body = response.into_body().collect().await.map_err(ExchangeError::Body)?.to_bytes();

        debug!(%status, body_len = body.len(), "Notary replied");

        if let Some(verdict) = verdict_for_status(status) {
            return Ok::<_, ExchangeError>(verdict);
        }

        let reply: NotaryResponse = serde_json::from_slice(&body)?;

        debug!(observations = reply.fingerprint_list.len(), "Received notary observations");

        Ok(check_fingerprint_list(&reply.fingerprint_list, &target.fingerprint))
    };

    let (parts, verdict) = futures::try_join!(connection_fut, request_fut)?;

    if let Err(error) = parts.io.into_inner().shutdown().await {
        debug!(%error, "TLS shutdown failed");
    }

    Ok(verdict)
}
