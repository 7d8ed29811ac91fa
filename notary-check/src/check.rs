use std::fmt;

use anyhow::Context as _;
use futures::future::join_all;
use notary_client::{LogicalNotary, NotaryContext, Target, Verdict};
use notary_config::Destination;

use crate::config::Conf;
use crate::target::fetch_target;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consultation {
    pub notary: String,
    pub verdict: Verdict,
}

/// Overall decision, by majority of the notaries that answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Trusted,
    Untrusted,
    /// No notary could tell.
    Undecided,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Trusted => f.write_str("trusted"),
            Decision::Untrusted => f.write_str("untrusted"),
            Decision::Undecided => f.write_str("undecided"),
        }
    }
}

#[derive(Debug)]
pub struct Report {
    pub target: Target,
    pub consultations: Vec<Consultation>,
}

impl Report {
    pub fn decision(&self) -> Decision {
        decide(self.consultations.iter().map(|consultation| consultation.verdict))
    }
}

pub fn decide(verdicts: impl IntoIterator<Item = Verdict>) -> Decision {
    let (successes, failures) = verdicts
        .into_iter()
        .fold((0usize, 0usize), |(successes, failures), verdict| match verdict {
            Verdict::VerificationSuccess => (successes + 1, failures),
            Verdict::VerificationFailure => (successes, failures + 1),
            Verdict::VerificationInconclusive | Verdict::ConnectivityFailure => (successes, failures),
        });

    if successes == 0 && failures == 0 {
        Decision::Undecided
    } else if successes > failures {
        Decision::Trusted
    } else {
        Decision::Untrusted
    }
}

pub fn load_notaries(conf: &Conf, ctx: &NotaryContext) -> anyhow::Result<Vec<LogicalNotary>> {
    conf.notaries
        .iter()
        .map(|record| {
            LogicalNotary::from_record(record.clone(), ctx.clone())
                .with_context(|| format!("invalid notary record `{}`", record.name))
        })
        .collect()
}

/// Enabled notaries, priority ones first, configuration order otherwise.
pub fn consultation_order(notaries: &[LogicalNotary]) -> Vec<&LogicalNotary> {
    let mut ordered: Vec<&LogicalNotary> = notaries.iter().filter(|notary| notary.is_enabled()).collect();
    ordered.sort_by_key(|notary| !notary.is_priority());
    ordered
}

/// Consults every enabled notary concurrently.
///
/// The bounce notary itself, when it is also consulted, is reached directly.
pub async fn consult_all(target: &Target, notaries: &[LogicalNotary], bounce: Option<&LogicalNotary>) -> Vec<Consultation> {
    let ordered = consultation_order(notaries);

    let checks = ordered.iter().map(|notary| async move {
        let bounce = bounce.filter(|bounce| bounce.name() != notary.name());

        Consultation {
            notary: notary.name(),
            verdict: notary.check_validity(target, bounce).await,
        }
    });

    join_all(checks).await
}

pub async fn check(conf: &Conf, ctx: &NotaryContext, destination: &Destination, use_bounce: bool) -> anyhow::Result<Report> {
    let notaries = load_notaries(conf, ctx)?;
    anyhow::ensure!(
        notaries.iter().any(LogicalNotary::is_enabled),
        "no enabled notary, import a bundle first"
    );

    let bounce = match (&conf.bounce_notary, use_bounce) {
        (Some(name), true) => Some(
            notaries
                .iter()
                .find(|notary| notary.name() == *name)
                .with_context(|| format!("bounce notary `{name}` not found"))?,
        ),
        _ => None,
    };

    let target = fetch_target(destination, ctx.timeouts.connect).await?;

    let consultations = consult_all(&target, &notaries, bounce).await;

    Ok(Report { target, consultations })
}
