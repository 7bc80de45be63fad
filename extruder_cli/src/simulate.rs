//! Closed-loop run of the control core against the simulated board.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use eyre::{Result, WrapErr};
use extruder_config::{Config, SensorKind, ThermistorTable};
use extruder_core::error::ControlError;
use extruder_core::{ControlContext, HeaterStatus, SliceOutcome};
use extruder_hardware::{
    ADC_MAX, EepromImage, SensorModel, SimulatedBoard, SimulatedSteppers, ThermalParams,
};
use extruder_traits::{Clock, ManualClock};

#[derive(Debug, Clone)]
pub struct SimulateOpts {
    pub slices: u32,
    pub slice_ms: u32,
    pub commands: Option<PathBuf>,
    pub target: Option<i16>,
    pub zone: usize,
    pub pause_at: Option<u32>,
    pub resume_at: Option<u32>,
    pub open_sensor_at: Option<u32>,
    pub report_every: u32,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SimSummary {
    pub slices: u32,
    pub dispatched: u32,
    pub rejected: u32,
    pub bytes_fed: usize,
    pub interrupted: bool,
}

/// Simulated hardware wired up the way `cfg` describes it.
pub struct Rig {
    pub clock: ManualClock,
    pub board: SimulatedBoard,
    pub ctx: ControlContext<SimulatedSteppers>,
}

/// Lay the table into an EEPROM image at every thermistor zone's offset, give
/// each zone a simulated heated block and build the control context.
pub fn build_rig(cfg: &Config, table: &ThermistorTable) -> Result<Rig> {
    let rows: Vec<(i16, i16)> = table.rows().iter().map(|r| (r.raw, r.celsius)).collect();
    let board = SimulatedBoard::new();
    let mut image = EepromImage::new(0);

    for z in &cfg.zones {
        let model = match z.sensor {
            SensorKind::Thermistor => {
                if usize::from(z.table_len) != rows.len() {
                    tracing::warn!(
                        zone = %z.name,
                        table_len = z.table_len,
                        rows = rows.len(),
                        "zone table_len differs from the provisioned table"
                    );
                }
                image.write_table(z.table_offset, &rows);
                SensorModel::Thermistor(rows.clone())
            }
            SensorKind::Thermocouple => SensorModel::Thermocouple,
        };
        board.add_channel(z.input_pin, z.output_pin, model, ThermalParams::default());
    }

    let clock = ManualClock::new();
    let ctx = ControlContext::from_config(
        cfg,
        &image,
        SimulatedSteppers::default(),
        Arc::new(clock.clone()),
    )?;
    Ok(Rig { clock, board, ctx })
}

pub fn run_simulate(
    cfg: &Config,
    table: &ThermistorTable,
    opts: &SimulateOpts,
    json: bool,
    shutdown: &AtomicBool,
) -> Result<SimSummary> {
    let Rig {
        clock,
        board,
        mut ctx,
    } = build_rig(cfg, table)?;

    if let Some(t) = opts.target {
        ctx.set_target_temperature(opts.zone, t)?;
    }
    let stream = match &opts.commands {
        Some(path) => std::fs::read(path)
            .wrap_err_with(|| format!("reading command stream {}", path.display()))?,
        None => Vec::new(),
    };

    let mut analog = board.analog();
    let mut heaters = board.heaters();
    let mut summary = SimSummary::default();

    for slice in 0..opts.slices {
        if shutdown.load(Ordering::Relaxed) {
            tracing::info!(slice, "interrupted");
            summary.interrupted = true;
            break;
        }
        if opts.pause_at == Some(slice) {
            ctx.pause_commands(true);
        }
        if opts.resume_at == Some(slice) {
            ctx.pause_commands(false);
        }
        if opts.open_sensor_at == Some(slice) {
            if let Some(z) = ctx.zone(opts.zone) {
                board.force_raw(z.sensor().pin(), Some(ADC_MAX));
            }
        }

        // Transport stand-in: hand over as much of the stream as fits.
        let room = ctx.dispatcher().queue().remaining();
        let n = room.min(stream.len() - summary.bytes_fed);
        if n > 0 {
            ctx.dispatcher_mut()
                .enqueue(&stream[summary.bytes_fed..summary.bytes_fed + n])?;
            summary.bytes_fed += n;
        }

        let report = ctx.run_slice(&mut analog, &mut heaters)?;
        match &report.commands {
            SliceOutcome::Dispatched(_) => summary.dispatched += 1,
            SliceOutcome::Rejected(_) => summary.rejected += 1,
            _ => {}
        }
        summary.slices = slice + 1;

        if opts.report_every > 0 && slice % opts.report_every == 0 {
            print_status(&ctx, &report.heaters, clock.millis(), json);
        }

        clock.advance_ms(u64::from(opts.slice_ms));
        board.advance_ms(opts.slice_ms);
    }

    print_summary(&ctx, &summary, json);

    if let Some(z) = ctx.zones().iter().find(|z| z.fault().is_some()) {
        if let Some(fault) = z.fault() {
            return Err(eyre::Report::new(ControlError::Sensor(fault.clone())))
                .wrap_err(format!("zone '{}'", z.name()));
        }
    }
    if let Some(fault) = ctx.dispatcher().fault() {
        return Err(ControlError::Protocol(fault.clone()).into());
    }
    Ok(summary)
}

fn print_status(
    ctx: &ControlContext<SimulatedSteppers>,
    statuses: &[HeaterStatus],
    now_ms: u32,
    json: bool,
) {
    if json {
        let zones: Vec<_> = ctx
            .zones()
            .iter()
            .map(|z| {
                serde_json::json!({
                    "name": z.name(),
                    "celsius": z.current_temperature(),
                    "target": z.target_temperature(),
                    "duty": z.last_duty(),
                    "reached": z.has_reached_target(),
                    "fault": z.fault().map(ToString::to_string),
                })
            })
            .collect();
        let fired = statuses.iter().filter(|s| s.fired()).count();
        println!(
            "{}",
            serde_json::json!({
                "t_ms": now_ms,
                "zones": zones,
                "fired": fired,
                "mode": ctx.dispatcher().mode().to_string(),
                "paused": ctx.is_command_thread_paused(),
                "queued": ctx.dispatcher().queue().len(),
            })
        );
    } else {
        let zones: Vec<String> = ctx
            .zones()
            .iter()
            .map(|z| {
                format!(
                    "{}={}C/{}C duty={}{}",
                    z.name(),
                    z.current_temperature(),
                    z.target_temperature(),
                    z.last_duty(),
                    if z.fault().is_some() { " FAULT" } else { "" }
                )
            })
            .collect();
        println!(
            "t={:.1}s {} cmd={}{}",
            f64::from(now_ms) / 1000.0,
            zones.join(" "),
            ctx.dispatcher().mode(),
            if ctx.is_command_thread_paused() { " (paused)" } else { "" }
        );
    }
}

fn print_summary(ctx: &ControlContext<SimulatedSteppers>, s: &SimSummary, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "summary": {
                    "slices": s.slices,
                    "dispatched": s.dispatched,
                    "rejected": s.rejected,
                    "bytes_fed": s.bytes_fed,
                    "interrupted": s.interrupted,
                    "reached": ctx.zones().iter().map(|z| z.has_reached_target()).collect::<Vec<_>>(),
                }
            })
        );
    } else {
        println!(
            "done: slices={} dispatched={} rejected={} bytes_fed={}{}",
            s.slices,
            s.dispatched,
            s.rejected,
            s.bytes_fed,
            if s.interrupted { " (interrupted)" } else { "" }
        );
    }
}

/// Build every zone and run one slice, failing on the first problem.
pub fn self_check(cfg: &Config, table: &ThermistorTable, json: bool) -> Result<()> {
    let Rig { board, mut ctx, .. } = build_rig(cfg, table)?;
    let report = ctx.run_slice(&mut board.analog(), &mut board.heaters())?;
    for (z, status) in ctx.zones().iter().zip(&report.heaters) {
        if let HeaterStatus::Faulted(fault) = status {
            return Err(eyre::Report::new(ControlError::Sensor(fault.clone())))
                .wrap_err(format!("zone '{}'", z.name()));
        }
    }
    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "zones": ctx.zones().iter().map(|z| serde_json::json!({
                    "name": z.name(),
                    "tool": z.tool(),
                    "strategy": z.strategy_name(),
                    "celsius": z.current_temperature(),
                })).collect::<Vec<_>>(),
            })
        );
    } else {
        for z in ctx.zones() {
            println!(
                "{}: tool={} strategy={} reads {}C",
                z.name(),
                z.tool(),
                z.strategy_name(),
                z.current_temperature()
            );
        }
        println!("ok: {} zone(s)", ctx.zones().len());
    }
    Ok(())
}
