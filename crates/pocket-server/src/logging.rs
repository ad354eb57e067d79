//! Tracing setup
//!
//! Console output plus a daily rolling JSON file under `<log_dir>/<service>/`.

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str =
    "pocket_server=info,pocket_relay=info,pocket_broker=info,tower_http=info";

/// Install the global subscriber
///
/// Keep the returned guard alive for the whole process, dropping it stops
/// the file writer.
pub fn init(service: &str, log_dir: &Path) -> anyhow::Result<WorkerGuard> {
    let dir = log_dir.join(service);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Unable to create log directory {}", dir.display()))?;

    let appender = RollingFileAppender::new(Rotation::DAILY, &dir, format!("{service}.log"));
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().json().with_writer(writer).with_ansi(false))
        .try_init()
        .context("Unable to install the tracing subscriber")?;

    Ok(guard)
}
