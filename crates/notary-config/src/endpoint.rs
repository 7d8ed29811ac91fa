use crate::{Destination, Fingerprint};

/// Port on which notaries accept bounced connections relayed by another notary.
pub const BOUNCE_PORT: u16 = 4242;

/// One network-reachable instance of a logical notary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalNotary {
    pub host: String,
    /// Plaintext port, used when this notary relays traffic for another one.
    pub http_port: u16,
    /// Port accepting TLS directly.
    pub ssl_port: u16,
    /// Expected fingerprint of the certificate this endpoint presents.
    ///
    /// An endpoint without a fingerprint can never be trusted.
    pub sha1_fingerprint: Option<Fingerprint>,
    pub http_proxy: Option<Destination>,
    pub ssl_proxy: Option<Destination>,
}

impl PhysicalNotary {
    pub fn new(host: impl Into<String>, http_port: u16, ssl_port: u16, sha1_fingerprint: Option<Fingerprint>) -> Self {
        Self {
            host: host.into(),
            http_port,
            ssl_port,
            sha1_fingerprint,
            http_proxy: None,
            ssl_proxy: None,
        }
    }

    pub fn http_destination(&self) -> Destination {
        Destination::new(self.host.clone(), self.http_port)
    }

    pub fn ssl_destination(&self) -> Destination {
        Destination::new(self.host.clone(), self.ssl_port)
    }

    pub fn bounce_destination(&self) -> Destination {
        Destination::new(self.host.clone(), BOUNCE_PORT)
    }

    /// Returns true when this endpoint is configured with exactly `presented`.
    pub fn is_pinned_to(&self, presented: &Fingerprint) -> bool {
        self.sha1_fingerprint.as_ref() == Some(presented)
    }
}
