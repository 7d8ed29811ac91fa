use std::sync::Arc;

use notary_config::dto::NotaryRecord;
use notary_config::{BundleError, NotaryConf, Verdict};
use parking_lot::RwLock;

use crate::UpdateError;
use crate::channel::{ChannelPlan, Connector, TcpConnector, Timeouts, establish_channel};
use crate::codec::{Target, exchange};
use crate::error::{ConsultError, ErrorChain};
use crate::events::{EventSink, NoopSink, NotaryEvent};
use crate::fetch::{BundleFetcher, ReqwestFetcher};
use crate::tls::authenticate_channel;

/// Collaborators shared by logical notaries.
#[derive(Clone)]
pub struct NotaryContext {
    pub timeouts: Timeouts,
    pub connector: Arc<dyn Connector>,
    pub fetcher: Arc<dyn BundleFetcher>,
    pub events: Arc<dyn EventSink>,
}

impl NotaryContext {
    /// Plain TCP connections, bundles fetched over HTTPS, no event sink.
    pub fn new(timeouts: Timeouts) -> Result<Self, reqwest::Error> {
        let fetcher = ReqwestFetcher::new(timeouts.exchange)?;

        Ok(Self {
            timeouts,
            connector: Arc::new(TcpConnector),
            fetcher: Arc::new(fetcher),
            events: Arc::new(NoopSink),
        })
    }

    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn BundleFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }
}

impl std::fmt::Debug for NotaryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotaryContext")
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

/// Result of [`LogicalNotary::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// No https bundle location is configured.
    NotApplicable,
    /// The bundle could not be fetched or parsed; the configuration is unchanged.
    Aborted,
    /// The fetched bundle is older than the current configuration.
    Stale,
    Updated,
}

/// Shared handle on a logical notary.
///
/// Cloning is cheap. The configuration is replaced as a whole on every change,
/// so in-flight consultations keep working on the snapshot they started with.
#[derive(Clone)]
pub struct LogicalNotary {
    inner: Arc<Inner>,
}

struct Inner {
    conf: RwLock<Arc<NotaryConf>>,
    ctx: NotaryContext,
}

impl LogicalNotary {
    pub fn new(conf: NotaryConf, ctx: NotaryContext) -> Self {
        Self {
            inner: Arc::new(Inner {
                conf: RwLock::new(Arc::new(conf)),
                ctx,
            }),
        }
    }

    pub fn from_record(record: NotaryRecord, ctx: NotaryContext) -> Result<Self, BundleError> {
        Ok(Self::new(NotaryConf::from_record(record)?, ctx))
    }

    /// Current configuration snapshot.
    pub fn conf(&self) -> Arc<NotaryConf> {
        Arc::clone(&self.inner.conf.read())
    }

    pub fn name(&self) -> String {
        self.inner.conf.read().name.clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.conf.read().enabled
    }

    pub fn is_priority(&self) -> bool {
        self.inner.conf.read().priority
    }

    pub fn region(&self) -> Option<String> {
        self.inner.conf.read().region.clone()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.modify(|conf| conf.enabled = enabled);
    }

    pub fn set_priority(&self, priority: bool) {
        self.modify(|conf| conf.priority = priority);
    }

    pub fn set_region(&self, region: Option<String>) {
        self.modify(|conf| conf.region = region);
    }

    pub fn to_record(&self) -> NotaryRecord {
        self.conf().to_record()
    }

    fn modify(&self, f: impl FnOnce(&mut NotaryConf)) {
        let mut guard = self.inner.conf.write();
        let mut conf = NotaryConf::clone(&guard);
        f(&mut conf);
        *guard = Arc::new(conf);
    }

    /// Asks this notary whether it observes the same certificate as the one presented by `target`.
    ///
    /// When `bounce` is set, the request is relayed through that notary.
    /// Never fails: problems reaching or authenticating the notary yield
    /// [`Verdict::ConnectivityFailure`].
    #[instrument(skip_all, fields(notary = %self.name(), %target, bounced = bounce.is_some()))]
    pub async fn check_validity(&self, target: &Target, bounce: Option<&LogicalNotary>) -> Verdict {
        let conf = self.conf();
        let bounce_conf = bounce.map(LogicalNotary::conf);

        let verdict = match self.consult(&conf, bounce_conf.as_deref(), target).await {
            Ok(verdict) => verdict,
            Err(error) => {
                warn!(error = %ErrorChain(&error), "Notary consultation failed");
                Verdict::ConnectivityFailure
            }
        };

        info!(%verdict, "Notary consulted");

        verdict
    }

    async fn consult(
        &self,
        conf: &NotaryConf,
        bounce: Option<&NotaryConf>,
        target: &Target,
    ) -> Result<Verdict, ConsultError> {
        let ctx = &self.inner.ctx;

        let plan = ChannelPlan::new(conf, bounce)?;
        let dialed = establish_channel(&plan, ctx.connector.as_ref(), ctx.timeouts.connect).await?;

        let Some(channel) = authenticate_channel(conf, dialed, ctx.timeouts.handshake).await? else {
            return Ok(Verdict::ConnectivityFailure);
        };

        let verdict = exchange(channel, target, ctx.timeouts.exchange).await?;

        Ok(verdict)
    }

    /// Refreshes this notary from its bundle location.
    ///
    /// Fetch and parse problems are logged and reported as
    /// [`UpdateOutcome::Aborted`]. A bundle using an unknown schema version is an error.
    #[instrument(skip_all, fields(notary = %self.name()))]
    pub async fn update(&self) -> Result<UpdateOutcome, UpdateError> {
        let current = self.conf();

        let Some(location) = current.bundle_location.as_ref().filter(|_| current.has_secure_bundle_location()) else {
            debug!(location = ?current.bundle_location, "No secure bundle location");
            return Ok(UpdateOutcome::NotApplicable);
        };

        let document = match self.inner.ctx.fetcher.fetch(location).await {
            Ok(document) => document,
            Err(error) => {
                error!(%location, error = format!("{error:#}"), "Failed to fetch notary bundle");
                return Ok(UpdateOutcome::Aborted);
            }
        };

        let fetched = match NotaryConf::from_bundle(&document) {
            Ok(fetched) => fetched,
            Err(error) if error.is_schema_version() => return Err(UpdateError::new(error)),
            Err(error) => {
                error!(%location, error = %ErrorChain(&error), "Invalid notary bundle");
                return Ok(UpdateOutcome::Aborted);
            }
        };

        let previous_name = {
            let mut guard = self.inner.conf.write();

            if fetched.version < guard.version {
                info!(fetched = fetched.version.as_u32(), held = guard.version.as_u32(), "Ignoring stale bundle");
                return Ok(UpdateOutcome::Stale);
            }

            let updated = NotaryConf {
                name: fetched.name.clone(),
                bundle_location: fetched.bundle_location,
                version: fetched.version,
                physical_notaries: fetched.physical_notaries,
                ..NotaryConf::clone(&guard)
            };

            std::mem::replace(&mut *guard, Arc::new(updated)).name.clone()
        };

        info!(name = %fetched.name, "Notary updated");

        self.inner.ctx.events.notify(NotaryEvent::Updated {
            previous_name,
            name: fetched.name,
        });

        Ok(UpdateOutcome::Updated)
    }
}

impl std::fmt::Debug for LogicalNotary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogicalNotary").field("conf", &self.conf()).finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "test code can panic on errors")]

    use async_trait::async_trait;
    use notary_config::{BundleVersion, Fingerprint, PhysicalNotary};
    use tokio::sync::broadcast;
    use url::Url;

    use super::*;

    struct StaticBundle(anyhow::Result<&'static str>);

    #[async_trait]
    impl BundleFetcher for StaticBundle {
        async fn fetch(&self, _: &Url) -> anyhow::Result<String> {
            match &self.0 {
                Ok(document) => Ok((*document).to_owned()),
                Err(error) => Err(anyhow::anyhow!("{error}")),
            }
        }
    }

    fn ctx(bundle: anyhow::Result<&'static str>, events: Arc<dyn EventSink>) -> NotaryContext {
        NotaryContext {
            timeouts: Timeouts::default(),
            connector: Arc::new(TcpConnector),
            fetcher: Arc::new(StaticBundle(bundle)),
            events,
        }
    }

    fn held_conf(location: &str) -> NotaryConf {
        let mut conf = NotaryConf::new(
            "Old name",
            vec![PhysicalNotary::new("old.notary.example", 80, 443, Some(Fingerprint::new("00:11").unwrap()))],
        );
        conf.bundle_location = Some(Url::parse(location).unwrap());
        conf.enabled = false;
        conf.priority = true;
        conf.region = Some("eu".to_owned());
        conf
    }

    const FRESH_BUNDLE: &str = r#"{
        "version": 1,
        "name": "New name",
        "bundle_location": "https://notary.example/new.notary",
        "region": "us",
        "hosts": [
            {"host": "a.notary.example", "http_port": 80, "ssl_port": 443, "certificate": "AA:01"},
            {"host": "b.notary.example", "http_port": 80, "ssl_port": 443, "certificate": "BB:02"}
        ]
    }"#;

    #[tokio::test]
    async fn update_replaces_endpoints_and_keeps_policy() {
        let (tx, mut rx) = broadcast::channel(4);
        let notary = LogicalNotary::new(held_conf("https://notary.example/old.notary"), ctx(Ok(FRESH_BUNDLE), Arc::new(tx)));
        let before = notary.conf();

        assert_eq!(notary.update().await.unwrap(), UpdateOutcome::Updated);

        let after = notary.conf();
        assert_eq!(after.name, "New name");
        assert_eq!(after.physical_notaries.len(), 2);
        assert_eq!(
            after.bundle_location.as_ref().map(Url::as_str),
            Some("https://notary.example/new.notary")
        );
        assert!(!after.enabled);
        assert!(after.priority);
        assert_eq!(after.region.as_deref(), Some("eu"));

        // Snapshots taken earlier are untouched.
        assert_eq!(before.name, "Old name");

        assert_eq!(
            rx.try_recv().unwrap(),
            NotaryEvent::Updated {
                previous_name: "Old name".to_owned(),
                name: "New name".to_owned(),
            }
        );
    }

    #[tokio::test]
    async fn older_bundle_is_ignored() {
        let (tx, mut rx) = broadcast::channel(4);
        let legacy = r#"{"host":"legacy.example","ssl_port":443,"http_port":80,"certificate":"AA"}"#;
        let notary = LogicalNotary::new(held_conf("https://notary.example/old.notary"), ctx(Ok(legacy), Arc::new(tx)));
        let before = notary.conf();

        assert_eq!(notary.update().await.unwrap(), UpdateOutcome::Stale);
        assert_eq!(*notary.conf(), *before);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn same_version_bundle_is_applied() {
        let legacy = r#"{"host":"legacy.example","ssl_port":443,"http_port":80,"certificate":"AA"}"#;
        let mut conf = held_conf("https://notary.example/old.notary");
        conf.version = BundleVersion::V0;
        let notary = LogicalNotary::new(conf, ctx(Ok(legacy), Arc::new(NoopSink)));

        assert_eq!(notary.update().await.unwrap(), UpdateOutcome::Updated);
        assert_eq!(notary.name(), "legacy.example");
        assert_eq!(notary.conf().bundle_location, None);
    }

    #[tokio::test]
    async fn insecure_location_is_not_updated() {
        let notary = LogicalNotary::new(
            held_conf("http://notary.example/old.notary"),
            ctx(Ok(FRESH_BUNDLE), Arc::new(NoopSink)),
        );

        assert_eq!(notary.update().await.unwrap(), UpdateOutcome::NotApplicable);
        assert_eq!(notary.name(), "Old name");
    }

    #[tokio::test]
    async fn fetch_and_parse_failures_abort() {
        let unreachable = LogicalNotary::new(
            held_conf("https://notary.example/old.notary"),
            ctx(Err(anyhow::anyhow!("connection refused")), Arc::new(NoopSink)),
        );
        assert_eq!(unreachable.update().await.unwrap(), UpdateOutcome::Aborted);

        let garbage = LogicalNotary::new(
            held_conf("https://notary.example/old.notary"),
            ctx(Ok("<html>"), Arc::new(NoopSink)),
        );
        assert_eq!(garbage.update().await.unwrap(), UpdateOutcome::Aborted);
        assert_eq!(garbage.name(), "Old name");
    }

    #[tokio::test]
    async fn unknown_schema_version_is_an_error() {
        let notary = LogicalNotary::new(
            held_conf("https://notary.example/old.notary"),
            ctx(Ok(r#"{"version":2,"name":"N","hosts":[]}"#), Arc::new(NoopSink)),
        );
        let before = notary.conf();

        let error = notary.update().await.unwrap_err();

        assert!(matches!(error.bundle_error(), BundleError::UnsupportedVersion(2)));
        assert_eq!(*notary.conf(), *before);
    }

    #[test]
    fn setters_swap_the_snapshot() {
        let notary = LogicalNotary::new(held_conf("https://notary.example/old.notary"), ctx(Ok(""), Arc::new(NoopSink)));
        let before = notary.conf();

        notary.set_enabled(true);
        notary.set_priority(false);
        notary.set_region(None);

        assert!(notary.is_enabled());
        assert!(!notary.is_priority());
        assert_eq!(notary.region(), None);
        assert!(!before.enabled);

        let record = notary.to_record();
        assert!(record.enabled);
        assert_eq!(record.name, "Old name");
    }
}
