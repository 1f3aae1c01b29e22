#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `servo`: calibrate, plan and drive a servo from the command line.

mod cli;
mod commands;
mod error_fmt;
mod rt;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use servo_config::Logging;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::{Cli, FILE_GUARD, JSON_MODE};
use crate::commands::Context;
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = color_eyre::install() {
        eprintln!("warning: failed to install error hooks: {e}");
    }

    let code = match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if JSON_MODE.get().copied().unwrap_or(false) {
                println!("{}", format_error_json(&err));
            } else {
                eprintln!("{}", humanize(&err));
            }
            tracing::error!(error = %err, "command failed");
            ExitCode::from(u8::try_from(exit_code_for_error(&err)).unwrap_or(1))
        }
    };
    flush_file_log();
    code
}

/// Statics are never dropped, so the file writer's guard is released by hand
/// to flush buffered records before the process exits.
fn flush_file_log() {
    if let Ok(mut guard) = FILE_GUARD.lock() {
        drop(guard.take());
    }
}

fn run(cli: &Cli) -> eyre::Result<()> {
    let settings = commands::load_settings(cli.config.as_deref())?;
    init_tracing(cli, &settings.logging)?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        if let Err(e) = ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed)) {
            tracing::warn!(error = %e, "failed to install Ctrl-C handler");
        }
    }

    let servo_name = cli.servo.clone().unwrap_or_else(|| settings.servo.name.clone());
    let ctx = Context {
        settings,
        params_path: cli.params.clone(),
        servo_name,
        json: cli.json,
        stop,
    };
    commands::run(cli, &ctx)
}

/// Console logs go to stderr (JSON lines with --json). `[logging].file` adds
/// a JSON file sink, optionally rotated.
fn init_tracing(cli: &Cli, logging: &Logging) -> eyre::Result<()> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    if cli.json {
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_filter(console_filter)
                .boxed(),
        );
    } else {
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(console_filter)
                .boxed(),
        );
    }

    if let Some(file) = &logging.file {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .ok_or_else(|| eyre::eyre!("invalid configuration: logging.file has no file name"))?;
        let appender = match logging.rotation.as_deref().unwrap_or("never") {
            "never" => tracing_appender::rolling::never(dir, name),
            "daily" => tracing_appender::rolling::daily(dir, name),
            "hourly" => tracing_appender::rolling::hourly(dir, name),
            other => eyre::bail!("invalid configuration: logging.rotation {other:?}"),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        if let Ok(mut slot) = FILE_GUARD.lock() {
            *slot = Some(guard);
        }
        let level = logging.level.as_deref().unwrap_or(&cli.log_level);
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(EnvFilter::new(level))
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| eyre::eyre!("init tracing: {e}"))
}
