use std::sync::Arc;

use futures::future::join_all;
use notary_client::{LogicalNotary, NotaryContext, NotaryEvent, UpdateError, UpdateOutcome};
use tokio::sync::broadcast;

use crate::config::dto::ConfFile;

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug)]
pub struct NotaryUpdate {
    /// Name held before the update.
    pub notary: String,
    pub outcome: Result<UpdateOutcome, UpdateError>,
}

/// Refreshes every configured notary from its bundle location and writes the results back into `conf_file`.
///
/// Renames are propagated to the bounce notary setting. Notaries failing to
/// update keep their previous configuration.
pub async fn update_all(conf_file: &mut ConfFile, ctx: NotaryContext) -> anyhow::Result<Vec<NotaryUpdate>> {
    let (events_tx, mut events_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    let ctx = ctx.with_events(Arc::new(events_tx));

    let notaries = conf_file
        .notaries
        .iter()
        .map(|record| LogicalNotary::from_record(record.clone(), ctx.clone()))
        .collect::<Result<Vec<_>, _>>()?;

    let updates = join_all(notaries.iter().map(|notary| async move {
        NotaryUpdate {
            notary: notary.name(),
            outcome: notary.update().await,
        }
    }))
    .await;

    // Positions are stable, names may not be.
    for (record, notary) in conf_file.notaries.iter_mut().zip(&notaries) {
        *record = notary.to_record();
    }

    while let Ok(NotaryEvent::Updated { previous_name, name }) = events_rx.try_recv() {
        if previous_name == name {
            continue;
        }

        info!(%previous_name, %name, "Notary renamed by its bundle");

        if conf_file.bounce_notary.as_deref() == Some(previous_name.as_str()) {
            conf_file.bounce_notary = Some(name);
        }
    }

    Ok(updates)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "test code can panic on errors")]

    use std::collections::HashMap;

    use notary_client::{NoopSink, TcpConnector, Timeouts};
    use notary_config::dto::NotaryRecord;
    use url::Url;

    use super::*;

    struct StaticBundles(HashMap<String, String>);

    #[async_trait::async_trait]
    impl notary_client::BundleFetcher for StaticBundles {
        async fn fetch(&self, location: &Url) -> anyhow::Result<String> {
            match self.0.get(location.as_str()) {
                Some(document) => Ok(document.clone()),
                None => anyhow::bail!("404 Not Found"),
            }
        }
    }

    fn ctx(bundles: &[(&str, &str)]) -> NotaryContext {
        let bundles = bundles
            .iter()
            .map(|(location, document)| ((*location).to_owned(), (*document).to_owned()))
            .collect();

        NotaryContext {
            timeouts: Timeouts::default(),
            connector: Arc::new(TcpConnector),
            fetcher: Arc::new(StaticBundles(bundles)),
            events: Arc::new(NoopSink),
        }
    }

    fn record(name: &str, location: Option<&str>) -> NotaryRecord {
        NotaryRecord {
            name: name.to_owned(),
            enabled: true,
            priority: true,
            bundle_location: location.map(|location| Url::parse(location).unwrap()),
            region: None,
            version: 1,
            physical_notaries: Vec::new(),
        }
    }

    const RENAMED: &str = r#"{
        "version": 1,
        "name": "relay-2",
        "bundle_location": "https://relay.example/relay.notary",
        "hosts": [{"host": "relay.example", "http_port": 80, "ssl_port": 443, "certificate": "AA:BB"}]
    }"#;

    #[tokio::test]
    async fn updated_records_are_written_back_in_place() {
        let mut conf_file = ConfFile::generate_new();
        conf_file.notaries = vec![
            record("plain", None),
            record("relay", Some("https://relay.example/relay.notary")),
            record("gone", Some("https://gone.example/gone.notary")),
        ];
        conf_file.bounce_notary = Some("relay".to_owned());

        let updates = update_all(
            &mut conf_file,
            ctx(&[("https://relay.example/relay.notary", RENAMED)]),
        )
        .await
        .unwrap();

        let outcomes: Vec<_> = updates
            .iter()
            .map(|update| (update.notary.as_str(), *update.outcome.as_ref().unwrap()))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                ("plain", UpdateOutcome::NotApplicable),
                ("relay", UpdateOutcome::Updated),
                ("gone", UpdateOutcome::Aborted),
            ]
        );

        let names: Vec<_> = conf_file.notaries.iter().map(|record| record.name.as_str()).collect();
        assert_eq!(names, vec!["plain", "relay-2", "gone"]);

        let relay = &conf_file.notaries[1];
        assert!(relay.priority);
        assert_eq!(relay.physical_notaries.len(), 1);

        assert_eq!(conf_file.bounce_notary.as_deref(), Some("relay-2"));
    }

    #[tokio::test]
    async fn unknown_schema_is_reported_per_notary() {
        let mut conf_file = ConfFile::generate_new();
        conf_file.notaries = vec![record("future", Some("https://future.example/future.notary"))];

        let updates = update_all(
            &mut conf_file,
            ctx(&[("https://future.example/future.notary", r#"{"version": 9}"#)]),
        )
        .await
        .unwrap();

        assert!(updates[0].outcome.is_err());
        assert_eq!(conf_file.notaries, vec![record("future", Some("https://future.example/future.notary"))]);
    }
}
