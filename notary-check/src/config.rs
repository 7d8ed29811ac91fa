use std::fs::File;
use std::io::BufReader;
use std::time::Duration;

use anyhow::Context as _;
use camino::{Utf8Path, Utf8PathBuf};
use notary_client::Timeouts;
use notary_config::dto::NotaryRecord;
use serde::{Deserialize, Serialize};
use tap::prelude::*;

const CONFIG_PATH_ENV: &str = "NOTARY_CHECK_CONFIG_PATH";

#[derive(Debug, Clone)]
pub struct Conf {
    pub log_file: Option<Utf8PathBuf>,
    pub verbosity_profile: dto::VerbosityProfile,
    pub timeouts: Timeouts,
    pub bounce_notary: Option<String>,
    pub notaries: Vec<NotaryRecord>,
    pub debug: dto::DebugConf,
}

impl Conf {
    pub fn from_conf_file(conf_file: &dto::ConfFile, conf_path: &Utf8Path) -> anyhow::Result<Self> {
        let log_file = conf_file.log_file.as_deref().map(|path| {
            let base = conf_path.parent().unwrap_or(Utf8Path::new("."));
            normalize_path(path, base)
        });

        let timeouts = conf_file.timeouts.clone().unwrap_or_default().to_timeouts();

        if let Some(bounce) = &conf_file.bounce_notary {
            anyhow::ensure!(
                conf_file.notaries.iter().any(|record| record.name == *bounce),
                "bounce notary `{bounce}` is not a configured notary"
            );
        }

        Ok(Conf {
            log_file,
            verbosity_profile: conf_file.verbosity_profile.unwrap_or_default(),
            timeouts,
            bounce_notary: conf_file.bounce_notary.clone(),
            notaries: conf_file.notaries.clone(),
            debug: conf_file.debug.clone().unwrap_or_default(),
        })
    }
}

/// Path of the configuration file, unless overridden on the command line.
pub fn default_conf_path() -> anyhow::Result<Utf8PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Ok(Utf8PathBuf::from(path));
    }

    let config_dir = dirs_next::config_dir()
        .context("no configuration directory on this system")?
        .pipe(Utf8PathBuf::from_path_buf)
        .map_err(|path| anyhow::anyhow!("non UTF-8 configuration directory: {}", path.display()))?;

    Ok(config_dir.join("notary-check").join("notary-check.json"))
}

fn normalize_path(path: &Utf8Path, base: &Utf8Path) -> Utf8PathBuf {
    if path.is_absolute() {
        path.to_owned()
    } else {
        base.join(path)
    }
}

pub fn save_config(conf_path: &Utf8Path, conf: &dto::ConfFile) -> anyhow::Result<()> {
    if let Some(parent) = conf_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("failed to create directory {parent}"))?;
    }

    let json = serde_json::to_string_pretty(conf).context("failed JSON serialization of configuration")?;
    std::fs::write(conf_path, json).with_context(|| format!("failed to write file at {conf_path}"))?;

    Ok(())
}

fn load_conf_file(conf_path: &Utf8Path) -> anyhow::Result<Option<dto::ConfFile>> {
    match File::open(conf_path) {
        Ok(file) => BufReader::new(file)
            .pipe(serde_json::from_reader)
            .map(Some)
            .with_context(|| format!("invalid config file at {conf_path}")),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(anyhow::anyhow!(e).context(format!("couldn't open config file at {conf_path}"))),
    }
}

pub fn load_conf_file_or_generate_new(conf_path: &Utf8Path) -> anyhow::Result<dto::ConfFile> {
    let conf_file = match load_conf_file(conf_path).context("failed to load configuration")? {
        Some(conf_file) => conf_file,
        None => {
            let defaults = dto::ConfFile::generate_new();
            save_config(conf_path, &defaults).context("failed to save configuration")?;
            defaults
        }
    };

    Ok(conf_file)
}

pub mod dto {
    use super::*;

    /// Source of truth for the notary-check configuration
    ///
    /// This struct represents the JSON file used for configuration as close as possible
    /// and is not trying to be too smart.
    #[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct ConfFile {
        /// Verbosity profile
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub verbosity_profile: Option<VerbosityProfile>,

        /// Folder and prefix for log files, nothing is written to disk when unset
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub log_file: Option<Utf8PathBuf>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub timeouts: Option<TimeoutsConf>,

        /// Name of the notary relaying requests to the other notaries
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub bounce_notary: Option<String>,

        #[serde(default)]
        pub notaries: Vec<NotaryRecord>,

        /// (Unstable) Unsafe debug options for developers
        #[serde(default, rename = "__debug__", skip_serializing_if = "Option::is_none")]
        pub debug: Option<DebugConf>,

        /// Other unofficial options.
        /// This field is useful so that we can deserialize
        /// and then losslessly serialize back all root keys of the config file.
        #[serde(flatten)]
        pub rest: serde_json::Map<String, serde_json::Value>,
    }

    impl ConfFile {
        pub fn generate_new() -> Self {
            Self {
                verbosity_profile: None,
                log_file: None,
                timeouts: None,
                bounce_notary: None,
                notaries: Vec::new(),
                debug: None,
                rest: serde_json::Map::new(),
            }
        }

        /// Inserts `record`, replacing any notary with the same name.
        pub fn upsert_notary(&mut self, record: NotaryRecord) {
            match self.notaries.iter_mut().find(|existing| existing.name == record.name) {
                Some(existing) => *existing = record,
                None => self.notaries.push(record),
            }
        }
    }

    #[derive(PartialEq, Eq, Debug, Default, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct TimeoutsConf {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub connect_secs: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub handshake_secs: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub exchange_secs: Option<u64>,
    }

    impl TimeoutsConf {
        pub fn to_timeouts(&self) -> Timeouts {
            let defaults = Timeouts::default();

            Timeouts {
                connect: self.connect_secs.map_or(defaults.connect, Duration::from_secs),
                handshake: self.handshake_secs.map_or(defaults.handshake, Duration::from_secs),
                exchange: self.exchange_secs.map_or(defaults.exchange, Duration::from_secs),
            }
        }
    }

    /// Verbosity profile (pre-defined tracing directives)
    #[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize, Deserialize, Default)]
    pub enum VerbosityProfile {
        /// The default profile, mostly info records
        #[default]
        Default,
        /// Recommended profile for developers
        Debug,
        /// Show all traces
        All,
        /// Only show warnings and errors
        Quiet,
    }

    impl VerbosityProfile {
        pub fn to_log_filter(self) -> &'static str {
            match self {
                VerbosityProfile::Default => "info",
                VerbosityProfile::Debug => "info,notary_check=debug,notary_client=debug,notary_config=debug",
                VerbosityProfile::All => "trace",
                VerbosityProfile::Quiet => "warn",
            }
        }
    }

    /// Unsafe debug options that should only ever be used at development stage
    ///
    /// These options might change or get removed without further notice.
    #[derive(PartialEq, Eq, Debug, Clone, Default, Serialize, Deserialize)]
    pub struct DebugConf {
        /// Directives string in the same form as the RUST_LOG environment variable
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub log_directives: Option<String>,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "test code can panic on errors")]

    use super::*;

    fn utf8_dir(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_owned()).unwrap()
    }

    #[test]
    fn missing_file_is_generated() {
        let dir = tempfile::tempdir().unwrap();
        let path = utf8_dir(&dir).join("nested").join("notary-check.json");

        let conf_file = load_conf_file_or_generate_new(&path).unwrap();

        assert_eq!(conf_file, dto::ConfFile::generate_new());
        assert!(path.exists());
    }

    #[test]
    fn unknown_root_keys_survive_a_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = utf8_dir(&dir).join("notary-check.json");
        std::fs::write(
            &path,
            r#"{
                "VerbosityProfile": "Debug",
                "Timeouts": { "ConnectSecs": 3 },
                "BounceNotary": "relay",
                "Notaries": [
                    {"name": "relay", "enabled": true, "physical_notaries": []}
                ],
                "SomethingElse": { "Kept": true }
            }"#,
        )
        .unwrap();

        let conf_file = load_conf_file_or_generate_new(&path).unwrap();
        assert_eq!(conf_file.rest["SomethingElse"], serde_json::json!({ "Kept": true }));

        save_config(&path, &conf_file).unwrap();
        let reloaded = load_conf_file_or_generate_new(&path).unwrap();
        assert_eq!(reloaded, conf_file);

        let conf = Conf::from_conf_file(&reloaded, &path).unwrap();
        assert_eq!(conf.verbosity_profile, dto::VerbosityProfile::Debug);
        assert_eq!(conf.timeouts.connect, Duration::from_secs(3));
        assert_eq!(conf.timeouts.exchange, Timeouts::default().exchange);
        assert_eq!(conf.bounce_notary.as_deref(), Some("relay"));
    }

    #[test]
    fn unknown_bounce_notary_is_rejected() {
        let mut conf_file = dto::ConfFile::generate_new();
        conf_file.bounce_notary = Some("nowhere".to_owned());

        assert!(Conf::from_conf_file(&conf_file, Utf8Path::new("/etc/notary-check.json")).is_err());
    }

    #[test]
    fn relative_log_file_is_next_to_the_config() {
        let mut conf_file = dto::ConfFile::generate_new();
        conf_file.log_file = Some(Utf8PathBuf::from("logs/check"));

        let conf = Conf::from_conf_file(&conf_file, Utf8Path::new("/etc/notary-check/notary-check.json")).unwrap();

        assert_eq!(conf.log_file, Some(Utf8PathBuf::from("/etc/notary-check/logs/check")));
    }

    #[test]
    fn upsert_replaces_by_name() {
        let record = |name: &str, enabled| NotaryRecord {
            name: name.to_owned(),
            enabled,
            priority: false,
            bundle_location: None,
            region: None,
            version: 1,
            physical_notaries: Vec::new(),
        };

        let mut conf_file = dto::ConfFile::generate_new();
        conf_file.upsert_notary(record("a", true));
        conf_file.upsert_notary(record("b", true));
        conf_file.upsert_notary(record("a", false));

        assert_eq!(conf_file.notaries, vec![record("a", false), record("b", true)]);
    }
}
