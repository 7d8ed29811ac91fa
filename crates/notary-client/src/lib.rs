//! Notary consultation client.
//!
//! Asks independent notaries whether the certificate presented by a server is
//! the one they observe too. Each notary channel is authenticated by pinning
//! the notary certificate fingerprint, and may be relayed through another
//! notary so that the consulted notary does not learn who is asking.

#[macro_use]
extern crate tracing;

mod error;
mod events;
mod fetch;
mod notary;

pub mod channel;
pub mod codec;
pub mod tls;

pub use channel::{ChannelPlan, Connector, TcpConnector, Timeouts};
pub use codec::Target;
pub use error::{ChannelError, ExchangeError, UpdateError};
pub use events::{EventSink, NoopSink, NotaryEvent};
pub use fetch::{BundleFetcher, ReqwestFetcher};
pub use notary::{LogicalNotary, NotaryContext, UpdateOutcome};
pub use notary_config::{Fingerprint, NotaryConf, Verdict};
