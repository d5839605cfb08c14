//! ---
//! ret_section: "14-licensing-system"
//! ret_subsection: "module"
//! ret_type: "source"
//! ret_scope: "code"
//! ret_description: "Shared configuration, logging, and licensing glue."
//! ret_version: "v0.1.0"
//! ret_owner: "tbd"
//! ---
use std::path::Path;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "RET_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

/// Writer guards for the process lifetime: file first, console second.
static GUARDS: OnceCell<(WorkerGuard, WorkerGuard)> = OnceCell::new();

/// Console log formats.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Filter directive chosen from `RET_LOG`, then `RUST_LOG`, then `info`.
///
/// An unparsable directive falls through to the next source; the rejected
/// value is returned so it can be reported once logging is up.
fn resolve_directive(ret_log: Option<&str>, rust_log: Option<&str>) -> (String, Option<String>) {
    let mut rejected = None;
    for candidate in [ret_log, rust_log].into_iter().flatten() {
        if EnvFilter::try_new(candidate).is_ok() {
            return (candidate.to_owned(), rejected);
        }
        rejected.get_or_insert_with(|| candidate.to_owned());
    }
    (DEFAULT_DIRECTIVE.to_owned(), rejected)
}

/// Name of the daily log file, before the appender adds the date suffix.
fn log_file_name(service_name: &str, config: &LoggingConfig) -> String {
    let prefix = config
        .file_prefix
        .as_deref()
        .map(str::trim)
        .filter(|prefix| !prefix.is_empty())
        .unwrap_or(service_name);
    format!("{prefix}.log")
}

/// Install the global subscriber: console on stderr, daily JSON file in
/// `config.directory`.
///
/// Only the first call in a process installs anything; later calls keep the
/// existing subscriber.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    let directory: &Path = &config.directory;
    std::fs::create_dir_all(directory)
        .with_context(|| format!("unable to create log directory {}", directory.display()))?;

    let (directive, rejected) = resolve_directive(
        std::env::var(LOG_ENV).ok().as_deref(),
        std::env::var("RUST_LOG").ok().as_deref(),
    );
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("invalid log directive `{directive}`"))?;

    let (file_writer, file_guard) =
        tracing_appender::non_blocking(daily(directory, log_file_name(service_name, config)));
    let (console_writer, console_guard) = tracing_appender::non_blocking(std::io::stderr());

    let console_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .json()
            .with_writer(console_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(console_writer)
            .boxed(),
    };
    let file_layer = fmt::layer()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .json()
        .with_current_span(false)
        .with_writer(file_writer)
        .boxed();

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .is_ok();
    if !installed {
        debug!(service = %service_name, "tracing already initialised, keeping existing subscriber");
        return Ok(());
    }
    let _ = GUARDS.set((file_guard, console_guard));

    if let Some(rejected) = rejected {
        error!(directive = %rejected, fallback = %directive, "ignoring invalid log directive");
    }
    info!(
        service = %service_name,
        log_dir = %directory.display(),
        format = ?config.format,
        filter = %directive,
        "tracing initialised"
    );
    Ok(())
}

/// License context attached to lifecycle events.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    pub license_id: Option<&'a str>,
    pub tier: Option<&'a str>,
    /// Client company.
    pub client: Option<&'a str>,
}

impl<'a> LogContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_license_id(mut self, license_id: &'a str) -> Self {
        self.license_id = Some(license_id);
        self
    }

    pub fn with_tier(mut self, tier: &'a str) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn with_client(mut self, client: &'a str) -> Self {
        self.client = Some(client);
        self
    }
}

/// High-level outcome used when emitting lifecycle log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEventOutcome {
    Success,
    Fault,
}

impl SystemEventOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            SystemEventOutcome::Success => "success",
            SystemEventOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardized lifecycle event (`license.issue`, `license.import`, ...).
pub fn log_system_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: SystemEventOutcome,
) {
    let default_context = LogContext::default();
    let ctx = context.unwrap_or(&default_context);
    let license_id = ctx.license_id.unwrap_or("");
    let tier = ctx.tier.unwrap_or("");
    let client = ctx.client.unwrap_or("");
    match outcome {
        SystemEventOutcome::Success => info!(
            event,
            outcome = outcome.as_str(),
            license_id,
            tier,
            client,
            message = %message
        ),
        SystemEventOutcome::Fault => error!(
            event,
            outcome = outcome.as_str(),
            license_id,
            tier,
            client,
            message = %message
        ),
    }
}
