use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha1::{Digest as _, Sha1};

/// Hex SHA-1 digest of a DER-encoded certificate.
///
/// Notaries publish digests as uppercase colon-separated pairs
/// (`AB:CD:...`). Values are trimmed and ASCII-uppercased on construction, so
/// comparison is insensitive to the case used in a configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("empty certificate fingerprint")]
pub struct InvalidFingerprint;

impl Fingerprint {
    pub fn new(value: &str) -> Result<Self, InvalidFingerprint> {
        let value = value.trim();

        if value.is_empty() {
            return Err(InvalidFingerprint);
        }

        Ok(Self(value.to_ascii_uppercase()))
    }

    /// Computes the fingerprint of a DER-encoded certificate.
    pub fn sha1_of_der(der: &[u8]) -> Self {
        let digest = Sha1::digest(der);

        let mut out = String::with_capacity(digest.len() * 3);

        for (idx, byte) in digest.iter().enumerate() {
            if idx != 0 {
                out.push(':');
            }
            let _ = write!(out, "{byte:02X}");
        }

        Self(out)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = InvalidFingerprint;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = InvalidFingerprint;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.0
    }
}
