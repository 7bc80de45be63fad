mod cli;
mod decode;
mod error_fmt;
mod simulate;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::{Result, WrapErr};
use extruder_config::{Config, ThermistorTable};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE, LAST_SAFETY};
use crate::error_fmt::{ConfigLoad, exit_code_for_error, format_error_json, humanize};
use crate::simulate::SimulateOpts;

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    // Pretty reports only for humans.
    if !cli.json {
        let _ = color_eyre::install();
    }

    if let Err(err) = run(cli) {
        let json = JSON_MODE.get().copied().unwrap_or(false);
        if json {
            eprintln!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        tracing::error!(error = %format!("{err:#}"), "exiting");
        std::process::exit(exit_code_for_error(&err));
    }
}

fn run(cli: Cli) -> Result<()> {
    // `decode` works on a bare stream; everything else needs the config.
    if let Commands::Decode { commands } = &cli.cmd {
        init_tracing(&cli, None)?;
        let n = decode::run_decode(commands, cli.json)?;
        tracing::info!(commands = n, "decoded");
        return Ok(());
    }

    let cfg = load_config(&cli.config)?;
    let _ = LAST_SAFETY.set(cfg.safety.clone());
    init_tracing(&cli, Some(&cfg.logging))?;
    let table = load_table(cli.table.as_deref())?;
    tracing::info!(
        config = %cli.config.display(),
        zones = cfg.zones.len(),
        table_rows = table.len(),
        "configuration loaded"
    );

    match cli.cmd {
        Commands::Simulate {
            slices,
            slice_ms,
            commands,
            target,
            zone,
            pause_at,
            resume_at,
            open_sensor_at,
            report_every,
        } => {
            let shutdown = Arc::new(AtomicBool::new(false));
            {
                let flag = Arc::clone(&shutdown);
                ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
                    .wrap_err("installing Ctrl-C handler")?;
            }
            let opts = SimulateOpts {
                slices,
                slice_ms,
                commands,
                target,
                zone,
                pause_at,
                resume_at,
                open_sensor_at,
                report_every,
            };
            let summary = simulate::run_simulate(&cfg, &table, &opts, cli.json, &shutdown)?;
            tracing::info!(
                slices = summary.slices,
                dispatched = summary.dispatched,
                "simulation finished"
            );
            Ok(())
        }
        Commands::SelfCheck => simulate::self_check(&cfg, &table, cli.json),
        Commands::Decode { .. } => Ok(()),
    }
}

fn load_config(path: &Path) -> Result<Config> {
    let ctx = || ConfigLoad(path.display().to_string());
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading {}", path.display()))
        .wrap_err_with(ctx)?;
    let cfg = extruder_config::load_toml(&text).wrap_err_with(ctx)?;
    cfg.validate().wrap_err_with(ctx)?;
    Ok(cfg)
}

fn load_table(path: Option<&Path>) -> Result<ThermistorTable> {
    match path {
        Some(p) => extruder_config::load_table_csv(p)
            .wrap_err_with(|| ConfigLoad(p.display().to_string())),
        None => Ok(extruder_config::default_thermistor_table()),
    }
}

/// Console layer filtered by RUST_LOG or `--log-level`; optional JSON file
/// layer from `[logging]`.
fn init_tracing(cli: &Cli, logging: Option<&extruder_config::Logging>) -> Result<()> {
    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .wrap_err_with(|| format!("invalid --log-level '{}'", cli.log_level))?;

    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    let console = if cli.json {
        console.json().boxed()
    } else {
        console.compact().boxed()
    };

    let file_layer = match logging.and_then(|l| l.file.as_deref().map(|f| (l, f))) {
        Some((l, file)) => {
            let path = Path::new(file);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file has no file name: {file}"))?;
            let appender = match l.rotation.as_deref() {
                Some("daily") => tracing_appender::rolling::daily(dir, name),
                Some("hourly") => tracing_appender::rolling::hourly(dir, name),
                None | Some("never") => tracing_appender::rolling::never(dir, name),
                Some(other) => {
                    return Err(eyre::eyre!("unknown logging.rotation '{other}'"))
                        .wrap_err_with(|| ConfigLoad(cli.config.display().to_string()));
                }
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            let level = l.level.as_deref().unwrap_or("info");
            let filter = EnvFilter::try_new(level)
                .wrap_err_with(|| format!("invalid logging.level '{level}'"))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(filter),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console.with_filter(console_filter))
        .with(file_layer)
        .try_init()
        .wrap_err("installing tracing subscriber")?;
    Ok(())
}
