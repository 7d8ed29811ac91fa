use std::io;

use anyhow::Context as _;
use camino::Utf8Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

const MAX_LOG_FILES: usize = 10;
const LOG_FILE_PREFIX: &str = "notary-check";

pub struct LoggerGuard {
    _file_guard: Option<WorkerGuard>,
    _stdio_guard: WorkerGuard,
}

/// Logs to stderr, and to rolling files when `log_file` is set.
///
/// `log_file` is either a folder, or a folder followed by a file name prefix.
pub fn init(
    log_file: Option<&Utf8Path>,
    log_filter: &str,
    debug_filtering_directives: Option<&str>,
) -> anyhow::Result<LoggerGuard> {
    let (file_layer, file_guard) = match log_file {
        Some(path) => {
            let (folder, prefix) = if path.is_dir() {
                (path, LOG_FILE_PREFIX)
            } else {
                (
                    path.parent().context("invalid log path (parent)")?,
                    path.file_name().context("invalid log path (file_name)")?,
                )
            };

            let file_appender = rolling::Builder::new()
                .rotation(rolling::Rotation::DAILY)
                .filename_prefix(prefix)
                .filename_suffix("log")
                .max_log_files(MAX_LOG_FILES)
                .build(folder)
                .context("couldn’t create file appender")?;
            let (file_non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);
            let file_layer = fmt::layer().with_writer(file_non_blocking).with_ansi(false);

            (Some(file_layer), Some(file_guard))
        }
        None => (None, None),
    };

    // Standard output is reserved for results.
    let (non_blocking_stdio, stdio_guard) = tracing_appender::non_blocking(io::stderr());
    let stdio_layer = fmt::layer().with_writer(non_blocking_stdio);

    let mut env_filter =
        EnvFilter::try_new(log_filter).context("invalid built-in filtering directives (this is a bug)")?;

    // Optionally add additional debugging filtering directives
    for directive in debug_filtering_directives
        .into_iter()
        .flat_map(|directives| directives.split(','))
    {
        let directive = directive
            .parse()
            .with_context(|| format!("invalid log directive `{directive}` (debug option)"))?;
        env_filter = env_filter.add_directive(directive);
    }

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stdio_layer)
        .with(env_filter)
        .try_init()
        .context("failed to install the global subscriber")?;

    Ok(LoggerGuard {
        _file_guard: file_guard,
        _stdio_guard: stdio_guard,
    })
}
