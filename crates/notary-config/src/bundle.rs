//! Notary bundles.
//!
//! A bundle is a JSON document describing a notary, published at a stable URL
//! so that clients can pick up endpoint or certificate changes.
//!
//! Version 0 (or no `version` field at all) is the legacy single-endpoint
//! schema:
//!
//! ```json
//! { "host": "notary.example", "ssl_port": 443, "http_port": 80, "certificate": "AB:CD:..." }
//! ```
//!
//! Version 1 lists any number of endpoints:
//!
//! ```json
//! {
//!     "version": 1,
//!     "name": "Example Notary",
//!     "region": "eu",
//!     "bundle_location": "https://notary.example/example.notary",
//!     "hosts": [{ "host": "notary.example", "http_port": 80, "ssl_port": 443, "certificate": "AB:CD:..." }]
//! }
//! ```

use serde::Deserialize;
use url::Url;

use crate::{Fingerprint, NotaryConf, PhysicalNotary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BundleVersion {
    V0,
    V1,
}

impl BundleVersion {
    pub fn as_u32(self) -> u32 {
        match self {
            BundleVersion::V0 => 0,
            BundleVersion::V1 => 1,
        }
    }
}

impl TryFrom<i64> for BundleVersion {
    type Error = BundleError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(BundleVersion::V0),
            1 => Ok(BundleVersion::V1),
            unsupported => Err(BundleError::UnsupportedVersion(unsupported)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("malformed notary bundle")]
    Json(#[from] serde_json::Error),
    #[error("unsupported notary bundle version: {0}")]
    UnsupportedVersion(i64),
    #[error("notary bundle version is not an integer: {0}")]
    InvalidVersion(serde_json::Value),
    #[error("invalid bundle location `{url}`")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

impl BundleError {
    /// Returns true for errors caused by a schema version this client does not understand.
    pub fn is_schema_version(&self) -> bool {
        matches!(self, BundleError::UnsupportedVersion(_) | BundleError::InvalidVersion(_))
    }
}

#[derive(Deserialize)]
struct LegacyBundle {
    host: String,
    ssl_port: u16,
    http_port: u16,
    certificate: String,
}

#[derive(Deserialize)]
struct BundleV1 {
    name: String,
    #[serde(default)]
    bundle_location: Option<String>,
    #[serde(default)]
    region: Option<String>,
    hosts: Vec<BundleHost>,
}

#[derive(Deserialize)]
struct BundleHost {
    host: String,
    http_port: u16,
    ssl_port: u16,
    certificate: String,
}

impl NotaryConf {
    /// Builds a notary configuration from a bundle document.
    ///
    /// Notaries created from a bundle are enabled and carry no priority.
    pub fn from_bundle(document: &str) -> Result<Self, BundleError> {
        let document: serde_json::Value = serde_json::from_str(document)?;

        match bundle_version(&document)? {
            BundleVersion::V0 => {
                let bundle: LegacyBundle = serde_json::from_value(document)?;
                Ok(from_legacy(bundle))
            }
            BundleVersion::V1 => {
                let bundle: BundleV1 = serde_json::from_value(document)?;
                from_v1(bundle)
            }
        }
    }
}

fn bundle_version(document: &serde_json::Value) -> Result<BundleVersion, BundleError> {
    match document.get("version") {
        None | Some(serde_json::Value::Null) => Ok(BundleVersion::V0),
        Some(version) => match integral_version(version) {
            Some(version) => BundleVersion::try_from(version),
            None => Err(BundleError::InvalidVersion(version.clone())),
        },
    }
}

/// Integral numbers are accepted even when written as floats (`1.0`).
fn integral_version(version: &serde_json::Value) -> Option<i64> {
    if let Some(version) = version.as_i64() {
        return Some(version);
    }

    let version = version.as_f64()?;

    if version.fract() != 0.0 || version.abs() > f64::from(u32::MAX) {
        return None;
    }

    #[allow(clippy::cast_possible_truncation, reason = "integral and within u32 range")]
    let version = version as i64;

    Some(version)
}

fn from_legacy(bundle: LegacyBundle) -> NotaryConf {
    let endpoint = physical_notary(bundle.host.clone(), bundle.http_port, bundle.ssl_port, &bundle.certificate);

    NotaryConf {
        version: BundleVersion::V0,
        ..NotaryConf::new(bundle.host, vec![endpoint])
    }
}

fn from_v1(bundle: BundleV1) -> Result<NotaryConf, BundleError> {
    let bundle_location = bundle
        .bundle_location
        .map(|url| Url::parse(&url).map_err(|source| BundleError::InvalidUrl { url, source }))
        .transpose()?;

    let physical_notaries = bundle
        .hosts
        .into_iter()
        .map(|host| physical_notary(host.host, host.http_port, host.ssl_port, &host.certificate))
        .collect();

    Ok(NotaryConf {
        region: bundle.region,
        bundle_location,
        version: BundleVersion::V1,
        ..NotaryConf::new(bundle.name, physical_notaries)
    })
}

fn physical_notary(host: String, http_port: u16, ssl_port: u16, certificate: &str) -> PhysicalNotary {
    let fingerprint = Fingerprint::new(certificate)
        .inspect_err(|_| warn!(%host, "Bundle endpoint has no certificate fingerprint, it will never be trusted"))
        .ok();

    PhysicalNotary::new(host, http_port, ssl_port, fingerprint)
}
