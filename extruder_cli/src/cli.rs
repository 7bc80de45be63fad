//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();
/// Safety limits of the loaded config, reported alongside sensor faults.
pub static LAST_SAFETY: OnceLock<extruder_config::Safety> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "extruder", version, about = "Extruder control core CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/extruder.toml")]
    pub config: PathBuf,

    /// Optional thermistor table CSV (strict `raw,celsius` header)
    #[arg(long, value_name = "FILE")]
    pub table: Option<PathBuf>,

    /// Output JSON lines instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the control core against the simulated board
    Simulate {
        /// Number of slices to run
        #[arg(long, default_value_t = 2_000)]
        slices: u32,
        /// Simulated milliseconds per slice
        #[arg(long, value_name = "MS", default_value_t = 50)]
        slice_ms: u32,
        /// Binary command stream to feed the dispatcher
        #[arg(long, value_name = "FILE")]
        commands: Option<PathBuf>,
        /// Target temperature for `--zone`
        #[arg(long, value_name = "CELSIUS", allow_negative_numbers = true)]
        target: Option<i16>,
        /// Zone index the target and fault injection apply to
        #[arg(long, default_value_t = 0)]
        zone: usize,
        /// Pause command dispatch at this slice
        #[arg(long, value_name = "SLICE")]
        pause_at: Option<u32>,
        /// Resume command dispatch at this slice
        #[arg(long, value_name = "SLICE")]
        resume_at: Option<u32>,
        /// Pin the zone's sensor at full scale from this slice on
        #[arg(long, value_name = "SLICE")]
        open_sensor_at: Option<u32>,
        /// Print status every N slices (0 = summary only)
        #[arg(long, value_name = "N", default_value_t = 20)]
        report_every: u32,
    },
    /// Dump a binary command stream
    Decode {
        /// Binary command stream
        #[arg(long, value_name = "FILE")]
        commands: PathBuf,
    },
    /// Load config and tables, build every zone and run one slice
    SelfCheck,
}
