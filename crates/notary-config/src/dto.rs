//! Transport representation of a notary, as exchanged with settings storage.
//!
//! This is kept as close as possible to the stored JSON and is not trying to
//! be smart: conversion to and from [`NotaryConf`] is where validation happens.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{BundleError, BundleVersion, Destination, Fingerprint, NotaryConf, PhysicalNotary};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotaryRecord {
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub priority: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_location: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Bundle schema version the notary was created from.
    #[serde(default)]
    pub version: i64,
    pub physical_notaries: Vec<PhysicalNotaryRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalNotaryRecord {
    pub host: String,
    pub http_port: u16,
    pub ssl_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Fingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_proxy: Option<Destination>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_proxy: Option<Destination>,
}

impl NotaryConf {
    pub fn to_record(&self) -> NotaryRecord {
        NotaryRecord {
            name: self.name.clone(),
            enabled: self.enabled,
            priority: self.priority,
            bundle_location: self.bundle_location.clone(),
            region: self.region.clone(),
            version: i64::from(self.version.as_u32()),
            physical_notaries: self.physical_notaries.iter().map(PhysicalNotaryRecord::from).collect(),
        }
    }

    pub fn from_record(record: NotaryRecord) -> Result<Self, BundleError> {
        Ok(Self {
            name: record.name,
            region: record.region,
            enabled: record.enabled,
            priority: record.priority,
            bundle_location: record.bundle_location,
            version: BundleVersion::try_from(record.version)?,
            physical_notaries: record.physical_notaries.into_iter().map(PhysicalNotary::from).collect(),
        })
    }
}

impl From<&PhysicalNotary> for PhysicalNotaryRecord {
    fn from(endpoint: &PhysicalNotary) -> Self {
        Self {
            host: endpoint.host.clone(),
            http_port: endpoint.http_port,
            ssl_port: endpoint.ssl_port,
            certificate: endpoint.sha1_fingerprint.clone(),
            http_proxy: endpoint.http_proxy.clone(),
            ssl_proxy: endpoint.ssl_proxy.clone(),
        }
    }
}

impl From<PhysicalNotaryRecord> for PhysicalNotary {
    fn from(record: PhysicalNotaryRecord) -> Self {
        Self {
            host: record.host,
            http_port: record.http_port,
            ssl_port: record.ssl_port,
            sha1_fingerprint: record.certificate,
            http_proxy: record.http_proxy,
            ssl_proxy: record.ssl_proxy,
        }
    }
}
