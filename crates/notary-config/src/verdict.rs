use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of consulting a single notary.
///
/// Trust policy (how many notaries must agree) belongs to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// The notary observed the same certificate.
    VerificationSuccess,
    /// The notary answered and none of its observations match.
    VerificationFailure,
    /// The notary could not complete the check.
    VerificationInconclusive,
    /// The notary could not be reached, authenticated or understood.
    ConnectivityFailure,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::VerificationSuccess => "VERIFICATION_SUCCESS",
            Verdict::VerificationFailure => "VERIFICATION_FAILURE",
            Verdict::VerificationInconclusive => "VERIFICATION_INCONCLUSIVE",
            Verdict::ConnectivityFailure => "CONNECTIVITY_FAILURE",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "test code can panic on errors")]

    use super::*;

    #[test]
    fn serde_and_display_agree() {
        for verdict in [
            Verdict::VerificationSuccess,
            Verdict::VerificationFailure,
            Verdict::VerificationInconclusive,
            Verdict::ConnectivityFailure,
        ] {
            let json = serde_json::to_string(&verdict).unwrap();
            assert_eq!(json, format!("\"{verdict}\""));
        }
    }
}
