//! TLS sessions with notaries.
//!
//! Notaries use self-signed certificates, so no chain validation happens.
//! Instead the SHA-1 fingerprint of the presented certificate must match one
//! of the fingerprints configured for the notary. Handshake signatures are
//! still checked, so that the peer proves possession of the private key.

use std::sync::Arc;
use std::time::Duration;

use notary_config::{Fingerprint, NotaryConf};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::{DigitallySignedStruct, SignatureScheme, pki_types};
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use crate::ChannelError;
use crate::channel::{DialedStream, ErasedStream};

/// An authenticated channel to one of the endpoints of a notary.
pub struct SecureChannel {
    pub stream: TlsStream<ErasedStream>,
    pub server_host: String,
    pub fingerprint: Fingerprint,
}

impl std::fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureChannel")
            .field("server_host", &self.server_host)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

/// Runs the TLS handshake over `dialed` and pins the presented certificate.
///
/// Returns `Ok(None)` when the certificate matches none of the configured
/// endpoints. The stream is closed in that case, as well as on error.
pub async fn authenticate_channel(
    conf: &NotaryConf,
    dialed: DialedStream,
    handshake_timeout: Duration,
) -> Result<Option<SecureChannel>, ChannelError> {
    let DialedStream { stream, server_host } = dialed;

    let server_name =
        pki_types::ServerName::try_from(server_host.clone()).map_err(|source| ChannelError::InvalidServerName {
            host: server_host.clone(),
            source,
        })?;

    let connector = TlsConnector::from(client_config()?);

    let tls_stream = tokio::time::timeout(handshake_timeout, connector.connect(server_name, stream))
        .await
        .map_err(|_| ChannelError::Timeout {
            operation: "TLS handshake",
            timeout: handshake_timeout,
        })?
        .map_err(|source| ChannelError::Handshake {
            host: server_host.clone(),
            source,
        })?;

    let presented = {
        let (_, session) = tls_stream.get_ref();

        let end_entity = session
            .peer_certificates()
            .and_then(|certificates| certificates.first())
            .ok_or_else(|| ChannelError::NoPeerCertificate {
                host: server_host.clone(),
            })?;

        Fingerprint::sha1_of_der(end_entity.as_ref())
    };

    if is_pinned(conf, &presented) {
        Ok(Some(SecureChannel {
            stream: tls_stream,
            server_host,
            fingerprint: presented,
        }))
    } else {
        warn!(host = %server_host, %presented, "Notary certificate does not match any pinned fingerprint");
        Ok(None)
    }
}

fn is_pinned(conf: &NotaryConf, presented: &Fingerprint) -> bool {
    let mut pinned = false;

    for endpoint in &conf.physical_notaries {
        let matches = endpoint.is_pinned_to(presented);

        debug!(
            host = %endpoint.host,
            expected = endpoint.sha1_fingerprint.as_ref().map_or("<none>", Fingerprint::as_str),
            %presented,
            matches,
            "Comparing certificate fingerprints"
        );

        pinned |= matches;
    }

    pinned
}

/// Client configuration accepting any certificate whose handshake signatures verify.
///
/// Callers are responsible for pinning the presented certificate.
pub fn client_config() -> Result<Arc<rustls::ClientConfig>, rustls::Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let config = rustls::ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(PinnedByFingerprint { provider }))
        .with_no_client_auth();

    Ok(Arc::new(config))
}

/// Accepts any certificate at the X.509 level; pinning happens after the handshake.
#[derive(Debug)]
struct PinnedByFingerprint {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for PinnedByFingerprint {
    fn verify_server_cert(
        &self,
        _: &pki_types::CertificateDer<'_>,
        _: &[pki_types::CertificateDer<'_>],
        _: &pki_types::ServerName<'_>,
        _: &[u8],
        _: pki_types::UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &pki_types::CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &pki_types::CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}
