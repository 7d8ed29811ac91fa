#![allow(clippy::print_stdout, clippy::print_stderr, reason = "command line tool")]

#[macro_use]
extern crate tracing;

use std::env;
use std::future::Future;
use std::time::Duration;

use anyhow::Context as _;
use camino::{Utf8Path, Utf8PathBuf};
use notary_check::check::Decision;
use notary_check::config::{self, Conf, dto::ConfFile};
use notary_check::log::LoggerGuard;
use notary_check::{check, import, manage, target, update};
use notary_client::{NotaryContext, Timeouts};
use seahorse::{App, Command, Context, Flag, FlagType};
use tokio::runtime;

fn main() {
    let app = App::new(env!("CARGO_PKG_NAME"))
        .description(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .usage(generate_usage())
        .command(check_command())
        .command(import_command())
        .command(update_command())
        .command(list_command())
        .command(enable_command())
        .command(disable_command())
        .command(priority_command())
        .command(bounce_command())
        .command(remove_command());

    app.run(env::args().collect());
}

fn generate_usage() -> String {
    format!(
        "{command} [action]\n\
        \n\
        \tExample: import a notary bundle, then check a server certificate\n\
        \n\
        \t  {command} import ./notary.example.notary\n\
        \t  {command} check www.example.com\n\
        \n\
        The configuration file location can be overridden with the `--config` flag\n\
        or the NOTARY_CHECK_CONFIG_PATH environment variable.",
        command = env!("CARGO_PKG_NAME"),
    )
}

fn run<T, F: Future<Output = anyhow::Result<T>>>(f: F) -> anyhow::Result<T> {
    let rt = runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("runtime build failed")?;

    let res = rt.block_on(f);

    if let Err(e) = &res {
        error!(error = format!("{e:#}"), "Command failed");
    }

    rt.shutdown_timeout(Duration::from_millis(100));

    res
}

fn exit(res: anyhow::Result<()>) -> ! {
    match res {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("{e:?}");
            std::process::exit(1);
        }
    }
}

fn apply_common_flags(cmd: Command) -> Command {
    cmd.flag(Flag::new("config", FlagType::String).description("Path of the configuration file"))
}

/// Loaded configuration, with logging initialized from it.
struct Session {
    conf_path: Utf8PathBuf,
    conf_file: ConfFile,
    conf: Conf,
    _logger: LoggerGuard,
}

impl Session {
    fn open(c: &Context) -> anyhow::Result<Self> {
        let conf_path = match c.string_flag("config") {
            Ok(path) => Utf8PathBuf::from(path),
            Err(_) => config::default_conf_path()?,
        };

        let conf_file = config::load_conf_file_or_generate_new(&conf_path)?;
        let conf = Conf::from_conf_file(&conf_file, &conf_path).context("invalid configuration")?;

        let logger = notary_check::log::init(
            conf.log_file.as_deref(),
            conf.verbosity_profile.to_log_filter(),
            conf.debug.log_directives.as_deref(),
        )
        .context("failed to setup logger")?;

        debug!(%conf_path, "Configuration loaded");

        Ok(Self {
            conf_path,
            conf_file,
            conf,
            _logger: logger,
        })
    }

    fn save(&self) -> anyhow::Result<()> {
        config::save_config(&self.conf_path, &self.conf_file)?;
        info!(conf_path = %self.conf_path, "Configuration saved");
        Ok(())
    }
}

fn single_arg<'a>(c: &'a Context, what: &str) -> anyhow::Result<&'a str> {
    match c.args.as_slice() {
        [arg] => Ok(arg.as_str()),
        [] => anyhow::bail!("missing {what}"),
        _ => anyhow::bail!("expected exactly one {what}"),
    }
}

// check

const CHECK_SUBCOMMAND: &str = "check";

fn check_command() -> Command {
    let usage = format!(
        r##"{command} {subcommand} <HOST[:PORT]>

Fetches the certificate presented by HOST (port 443 by default) and asks every
enabled notary whether it observes the same certificate. Priority notaries are
listed first. Requests go through the bounce notary when one is configured.

Exits with a non-zero status unless a majority of the notaries that answered
vouch for the certificate.

Example:

    {command} {subcommand} www.example.com:443 --timeout 5s"##,
        command = env!("CARGO_PKG_NAME"),
        subcommand = CHECK_SUBCOMMAND,
    );

    let cmd = Command::new(CHECK_SUBCOMMAND)
        .description("Check a server certificate against the notaries")
        .alias("c")
        .usage(usage)
        .action(check_action)
        .flag(Flag::new("timeout", FlagType::String).description("Timeout for each network step (e.g.: 5s)"))
        .flag(Flag::new("no-bounce", FlagType::Bool).description("Contact every notary directly"));

    apply_common_flags(cmd)
}

struct CheckArgs {
    destination: notary_config::Destination,
    timeout: Option<Duration>,
    use_bounce: bool,
}

impl CheckArgs {
    fn parse(c: &Context) -> anyhow::Result<Self> {
        let destination = target::parse_destination(single_arg(c, "<HOST[:PORT]>")?)?;

        let timeout = c
            .string_flag("timeout")
            .ok()
            .map(|timeout| humantime::parse_duration(&timeout).context("invalid value for timeout"))
            .transpose()?;

        Ok(Self {
            destination,
            timeout,
            use_bounce: !c.bool_flag("no-bounce"),
        })
    }
}

fn check_action(c: &Context) {
    let res = CheckArgs::parse(c).and_then(|args| {
        let session = Session::open(c)?;

        let timeouts = match args.timeout {
            Some(timeout) => Timeouts {
                connect: timeout,
                handshake: timeout,
                exchange: timeout,
            },
            None => session.conf.timeouts,
        };

        run(async {
            let ctx = NotaryContext::new(timeouts).context("failed to build HTTP client")?;

            let report = check::check(&session.conf, &ctx, &args.destination, args.use_bounce).await?;

            println!("{} ({}) {}", report.target, report.target.ip, report.target.fingerprint);
            for consultation in &report.consultations {
                println!("  {}: {}", consultation.notary, consultation.verdict);
            }

            let decision = report.decision();
            println!("{decision}");

            match decision {
                Decision::Trusted => Ok::<_, anyhow::Error>(()),
                Decision::Untrusted | Decision::Undecided => {
                    anyhow::bail!("certificate of {} is {decision}", report.target)
                }
            }
        })
    });

    exit(res);
}

// import

const IMPORT_SUBCOMMAND: &str = "import";

fn import_command() -> Command {
    let usage = format!(
        r##"{command} {subcommand} <BUNDLE FILE>...

Adds the notaries described by the bundle files to the configuration.
A notary already configured under the same name is replaced."##,
        command = env!("CARGO_PKG_NAME"),
        subcommand = IMPORT_SUBCOMMAND,
    );

    let cmd = Command::new(IMPORT_SUBCOMMAND)
        .description("Import notary bundles")
        .alias("i")
        .usage(usage)
        .action(import_action);

    apply_common_flags(cmd)
}

fn import_action(c: &Context) {
    let res = (|| -> anyhow::Result<()> {
        anyhow::ensure!(!c.args.is_empty(), "missing <BUNDLE FILE>");

        let mut session = Session::open(c)?;

        for bundle_path in &c.args {
            let conf = import::import_bundle(&mut session.conf_file, Utf8Path::new(bundle_path))?;
            println!("Imported {}", conf.name);
        }

        session.save()
    })();

    exit(res);
}

// update

const UPDATE_SUBCOMMAND: &str = "update";

fn update_command() -> Command {
    let usage = format!(
        r##"{command} {subcommand}

Refreshes every notary having an https bundle location, then saves the configuration."##,
        command = env!("CARGO_PKG_NAME"),
        subcommand = UPDATE_SUBCOMMAND,
    );

    let cmd = Command::new(UPDATE_SUBCOMMAND)
        .description("Refresh notaries from their bundle location")
        .alias("u")
        .usage(usage)
        .action(update_action);

    apply_common_flags(cmd)
}

fn update_action(c: &Context) {
    let res = Session::open(c).and_then(|mut session| {
        let ctx = NotaryContext::new(session.conf.timeouts).context("failed to build HTTP client")?;

        let updates = run(update::update_all(&mut session.conf_file, ctx))?;

        let mut refused = 0usize;

        for update in &updates {
            match &update.outcome {
                Ok(outcome) => println!("{}: {outcome:?}", update.notary),
                Err(e) => {
                    refused += 1;
                    println!("{}: {e}: {}", update.notary, e.bundle_error());
                }
            }
        }

        session.save()?;

        anyhow::ensure!(refused == 0, "{refused} notary bundle(s) refused");

        Ok(())
    });

    exit(res);
}

// list

fn list_command() -> Command {
    let cmd = Command::new("list")
        .description("List configured notaries")
        .alias("ls")
        .usage(format!("{} list", env!("CARGO_PKG_NAME")))
        .action(list_action);

    apply_common_flags(cmd)
}

fn list_action(c: &Context) {
    let res = Session::open(c).map(|session| {
        let bounce = session.conf_file.bounce_notary.as_deref();

        for record in &session.conf_file.notaries {
            println!("{}", manage::describe(record, bounce));
        }
    });

    exit(res);
}

// enable, disable, priority, bounce, remove

fn named_notary_command(name: &str, description: &str, action: fn(&Context)) -> Command {
    let cmd = Command::new(name)
        .description(description)
        .usage(format!("{} {name} <NOTARY NAME>", env!("CARGO_PKG_NAME")))
        .action(action);

    apply_common_flags(cmd)
}

fn edit_named_notary(c: &Context, edit: impl FnOnce(&mut ConfFile, &str) -> anyhow::Result<()>) {
    let res = single_arg(c, "<NOTARY NAME>").and_then(|name| {
        let mut session = Session::open(c)?;
        edit(&mut session.conf_file, name)?;
        session.save()
    });

    exit(res);
}

fn enable_command() -> Command {
    named_notary_command("enable", "Consult this notary during checks", |c| {
        edit_named_notary(c, |conf_file, name| manage::set_enabled(conf_file, name, true));
    })
}

fn disable_command() -> Command {
    named_notary_command("disable", "Stop consulting this notary during checks", |c| {
        edit_named_notary(c, |conf_file, name| manage::set_enabled(conf_file, name, false));
    })
}

fn priority_command() -> Command {
    let cmd = named_notary_command("priority", "Consult this notary first", |c| {
        let priority = !c.bool_flag("clear");
        edit_named_notary(c, |conf_file, name| manage::set_priority(conf_file, name, priority));
    });

    cmd.flag(Flag::new("clear", FlagType::Bool).description("Remove the priority marker instead"))
}

fn bounce_command() -> Command {
    let cmd = Command::new("bounce")
        .description("Relay requests to the other notaries through this notary")
        .usage(format!("{} bounce <NOTARY NAME> | --clear", env!("CARGO_PKG_NAME")))
        .action(bounce_action)
        .flag(Flag::new("clear", FlagType::Bool).description("Contact every notary directly"));

    apply_common_flags(cmd)
}

fn bounce_action(c: &Context) {
    let res = (|| -> anyhow::Result<()> {
        let name = if c.bool_flag("clear") {
            None
        } else {
            Some(single_arg(c, "<NOTARY NAME>")?)
        };

        let mut session = Session::open(c)?;
        manage::set_bounce(&mut session.conf_file, name)?;
        session.save()
    })();

    exit(res);
}

fn remove_command() -> Command {
    named_notary_command("remove", "Remove this notary from the configuration", |c| {
        edit_named_notary(c, |conf_file, name| {
            let removed = manage::remove(conf_file, name)?;
            println!("Removed {}", removed.name);
            Ok(())
        });
    })
}
