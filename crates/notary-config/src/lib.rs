//! Configuration model of a logical notary.
//!
//! A logical notary is a named trust oracle backed by one or more physical
//! endpoints. This crate holds the immutable configuration snapshot
//! ([`NotaryConf`]), the parsing of remote configuration bundles, the transport
//! representation used by settings storage ([`dto`]), and the four-valued
//! [`Verdict`] produced by a consultation. It performs no I/O.

#[macro_use]
extern crate tracing;

mod bundle;
mod destination;
mod endpoint;
mod fingerprint;
mod notary;
mod verdict;

pub mod dto;

pub use bundle::{BundleError, BundleVersion};
pub use destination::{Destination, InvalidDestination};
pub use endpoint::{BOUNCE_PORT, PhysicalNotary};
pub use fingerprint::{Fingerprint, InvalidFingerprint};
pub use notary::NotaryConf;
pub use verdict::Verdict;
