use anyhow::Context as _;
use camino::Utf8Path;
use notary_client::NotaryConf;

use crate::config::dto::ConfFile;

/// Adds the notary described by the bundle at `bundle_path`, replacing any notary with the same name.
#[instrument(skip(conf_file))]
pub fn import_bundle(conf_file: &mut ConfFile, bundle_path: &Utf8Path) -> anyhow::Result<NotaryConf> {
    let document =
        std::fs::read_to_string(bundle_path).with_context(|| format!("failed to read bundle at {bundle_path}"))?;

    let conf = NotaryConf::from_bundle(&document).with_context(|| format!("invalid bundle at {bundle_path}"))?;

    info!(
        name = %conf.name,
        version = conf.version.as_u32(),
        endpoints = conf.physical_notaries.len(),
        "Importing notary"
    );

    conf_file.upsert_notary(conf.to_record());

    Ok(conf)
}
