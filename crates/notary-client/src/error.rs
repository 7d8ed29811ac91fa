use std::io;
use std::time::Duration;

use notary_config::{BundleError, Destination};

/// Failure to obtain a channel to a notary.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("notary {notary} has no endpoint")]
    NoEndpoints { notary: String },
    #[error("failed to connect to {destination}")]
    Dial {
        destination: Destination,
        #[source]
        source: io::Error,
    },
    #[error("failed to open a tunnel to {target} through {relay}")]
    Tunnel {
        relay: Destination,
        target: Destination,
        #[source]
        source: io::Error,
    },
    #[error("invalid server name `{host}`")]
    InvalidServerName {
        host: String,
        #[source]
        source: rustls::pki_types::InvalidDnsNameError,
    },
    #[error("TLS configuration")]
    TlsConfig(#[from] rustls::Error),
    #[error("TLS handshake with {host} failed")]
    Handshake {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("{host} presented no certificate")]
    NoPeerCertificate { host: String },
    #[error("{operation} timed out after {timeout:?}")]
    Timeout { operation: &'static str, timeout: Duration },
}

/// Failure while exchanging the notarization request over an authenticated channel.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("failed to build the notarization request")]
    Request(#[source] anyhow::Error),
    #[error("HTTP exchange failed")]
    Http(#[from] hyper::Error),
    #[error("failed to read the response body")]
    Body(#[source] hyper::Error),
    #[error("malformed notary response")]
    Json(#[from] serde_json::Error),
    #[error("exchange timed out after {0:?}")]
    Timeout(Duration),
}

/// A bundle fetched during an update uses a schema version this client does not understand.
#[derive(Debug, thiserror::Error)]
#[error("notary bundle refused")]
pub struct UpdateError(#[source] BundleError);

impl UpdateError {
    pub(crate) fn new(source: BundleError) -> Self {
        debug_assert!(source.is_schema_version());
        Self(source)
    }

    pub fn bundle_error(&self) -> &BundleError {
        &self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConsultError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

/// Displays an error followed by all of its sources, like `{:#}` does for `anyhow::Error`.
pub(crate) struct ErrorChain<'a>(pub(crate) &'a (dyn std::error::Error + 'static));

impl std::fmt::Display for ErrorChain<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)?;

        let mut source = self.0.source();
        while let Some(cause) = source {
            write!(f, ": {cause}")?;
            source = cause.source();
        }

        Ok(())
    }
}
