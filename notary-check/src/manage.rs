use notary_config::dto::NotaryRecord;

use crate::config::dto::ConfFile;

pub fn find_notary<'a>(conf_file: &'a mut ConfFile, name: &str) -> anyhow::Result<&'a mut NotaryRecord> {
    conf_file
        .notaries
        .iter_mut()
        .find(|record| record.name == name)
        .ok_or_else(|| anyhow::anyhow!("no notary named `{name}`"))
}

pub fn set_enabled(conf_file: &mut ConfFile, name: &str, enabled: bool) -> anyhow::Result<()> {
    find_notary(conf_file, name)?.enabled = enabled;
    Ok(())
}

pub fn set_priority(conf_file: &mut ConfFile, name: &str, priority: bool) -> anyhow::Result<()> {
    find_notary(conf_file, name)?.priority = priority;
    Ok(())
}

/// Removes the notary named `name`, and the bounce setting pointing to it.
pub fn remove(conf_file: &mut ConfFile, name: &str) -> anyhow::Result<NotaryRecord> {
    let position = conf_file
        .notaries
        .iter()
        .position(|record| record.name == name)
        .ok_or_else(|| anyhow::anyhow!("no notary named `{name}`"))?;

    if conf_file.bounce_notary.as_deref() == Some(name) {
        conf_file.bounce_notary = None;
    }

    Ok(conf_file.notaries.remove(position))
}

pub fn set_bounce(conf_file: &mut ConfFile, name: Option<&str>) -> anyhow::Result<()> {
    if let Some(name) = name {
        find_notary(conf_file, name)?;
    }

    conf_file.bounce_notary = name.map(str::to_owned);

    Ok(())
}

/// One line per notary, for display.
pub fn describe(record: &NotaryRecord, bounce: Option<&str>) -> String {
    let mut flags = Vec::new();

    if !record.enabled {
        flags.push("disabled");
    }
    if record.priority {
        flags.push("priority");
    }
    if bounce == Some(record.name.as_str()) {
        flags.push("bounce");
    }

    let endpoints = record
        .physical_notaries
        .iter()
        .map(|endpoint| format!("{}:{}", endpoint.host, endpoint.ssl_port))
        .collect::<Vec<_>>()
        .join(", ");

    let mut line = format!("{} [{}]", record.name, endpoints);

    if !flags.is_empty() {
        line.push_str(&format!(" ({})", flags.join(", ")));
    }

    if let Some(region) = &record.region {
        line.push_str(&format!(" region={region}"));
    }

    line
}
