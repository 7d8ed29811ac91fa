use url::Url;

use crate::{BundleVersion, Destination, PhysicalNotary};

/// Immutable configuration snapshot of a logical notary.
///
/// Destination lists always enumerate every physical endpoint, in configuration
/// order. Only the first endpoint supplies proxy settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotaryConf {
    pub name: String,
    /// Advisory metadata.
    pub region: Option<String>,
    /// Whether this notary participates in verification.
    pub enabled: bool,
    /// Preferred notary marker, ordering is left to callers.
    pub priority: bool,
    /// Where an up-to-date bundle for this notary can be fetched.
    pub bundle_location: Option<Url>,
    /// Schema version of the bundle this configuration was built from.
    pub version: BundleVersion,
    pub physical_notaries: Vec<PhysicalNotary>,
}

impl NotaryConf {
    pub fn new(name: impl Into<String>, physical_notaries: Vec<PhysicalNotary>) -> Self {
        Self {
            name: name.into(),
            region: None,
            enabled: true,
            priority: false,
            bundle_location: None,
            version: BundleVersion::V1,
            physical_notaries,
        }
    }

    pub fn http_destinations(&self) -> Vec<Destination> {
        self.physical_notaries
            .iter()
            .map(PhysicalNotary::http_destination)
            .collect()
    }

    pub fn ssl_destinations(&self) -> Vec<Destination> {
        self.physical_notaries
            .iter()
            .map(PhysicalNotary::ssl_destination)
            .collect()
    }

    pub fn bounced_destinations(&self) -> Vec<Destination> {
        self.physical_notaries
            .iter()
            .map(PhysicalNotary::bounce_destination)
            .collect()
    }

    pub fn http_proxy(&self) -> Option<&Destination> {
        self.physical_notaries.first()?.http_proxy.as_ref()
    }

    pub fn ssl_proxy(&self) -> Option<&Destination> {
        self.physical_notaries.first()?.ssl_proxy.as_ref()
    }

    /// Returns true when the bundle location uses a secure transport.
    pub fn has_secure_bundle_location(&self) -> bool {
        self.bundle_location
            .as_ref()
            .is_some_and(|url| url.scheme() == "https")
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "test code can panic on errors")]

    use crate::Fingerprint;

    use super::*;

    fn endpoint(host: &str, fingerprint: Option<&str>) -> PhysicalNotary {
        PhysicalNotary::new(host, 80, 443, fingerprint.map(|fp| Fingerprint::new(fp).unwrap()))
    }

    #[test]
    fn destination_lists_follow_endpoint_order() {
        let conf = NotaryConf::new("n", vec![endpoint("a", None), endpoint("b", None)]);

        assert_eq!(
            conf.ssl_destinations(),
            vec![Destination::new("a", 443), Destination::new("b", 443)]
        );
        assert_eq!(
            conf.http_destinations(),
            vec![Destination::new("a", 80), Destination::new("b", 80)]
        );
        assert_eq!(
            conf.bounced_destinations(),
            vec![Destination::new("a", 4242), Destination::new("b", 4242)]
        );
    }

    #[test]
    fn proxies_come_from_first_endpoint() {
        let mut first = endpoint("a", None);
        first.ssl_proxy = Some(Destination::new("proxy", 3128));
        let mut second = endpoint("b", None);
        second.http_proxy = Some(Destination::new("other", 8080));

        let conf = NotaryConf::new("n", vec![first, second]);

        assert_eq!(conf.ssl_proxy(), Some(&Destination::new("proxy", 3128)));
        assert_eq!(conf.http_proxy(), None);
    }

    #[test]
    fn empty_notary_has_no_proxy() {
        let conf = NotaryConf::new("n", Vec::new());

        assert_eq!(conf.ssl_proxy(), None);
        assert_eq!(conf.http_proxy(), None);
    }

    #[test]
    fn secure_bundle_location_requires_https() {
        let mut conf = NotaryConf::new("n", Vec::new());
        assert!(!conf.has_secure_bundle_location());

        conf.bundle_location = Some(Url::parse("http://notary.example/n.notary").unwrap());
        assert!(!conf.has_secure_bundle_location());

        conf.bundle_location = Some(Url::parse("https://notary.example/n.notary").unwrap());
        assert!(conf.has_secure_bundle_location());
    }
}
