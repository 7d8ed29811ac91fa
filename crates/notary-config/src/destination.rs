use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A `host:port` pair a notary channel can be dialed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Destination {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid destination `{value}`: {reason}")]
pub struct InvalidDestination {
    value: String,
    reason: &'static str,
}

impl Destination {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Destination {
    type Err = InvalidDestination;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| InvalidDestination {
            value: s.to_owned(),
            reason,
        };

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            rest.split_once("]:").ok_or_else(|| invalid("unterminated IPv6 host"))?
        } else {
            s.rsplit_once(':').ok_or_else(|| invalid("missing port"))?
        };

        if host.is_empty() {
            return Err(invalid("empty host"));
        }

        let port = port.parse().map_err(|_| invalid("bad port value"))?;

        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for Destination {
    type Error = InvalidDestination;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Destination> for String {
    fn from(value: Destination) -> Self {
        value.to_string()
    }
}
