//! Human-readable error descriptions and structured JSON error formatting.

use std::fmt;

use crate::cli::LAST_SAFETY;
use extruder_core::error::{BuildError, ControlError, ProtocolFault, SensorFault};

/// Context attached to anything that goes wrong while loading or validating
/// the TOML config or the thermistor CSV.
#[derive(Debug)]
pub struct ConfigLoad(pub String);

impl fmt::Display for ConfigLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid configuration in {}", self.0)
    }
}

fn sensor_fault(err: &eyre::Report) -> Option<&SensorFault> {
    err.downcast_ref::<SensorFault>().or_else(|| {
        match err.downcast_ref::<ControlError>() {
            Some(ControlError::Sensor(f)) => Some(f),
            _ => None,
        }
    })
}

fn protocol_fault(err: &eyre::Report) -> Option<&ProtocolFault> {
    err.downcast_ref::<ProtocolFault>().or_else(|| {
        match err.downcast_ref::<ControlError>() {
            Some(ControlError::Protocol(f)) => Some(f),
            _ => None,
        }
    })
}

fn is_config_error(err: &eyre::Report) -> bool {
    err.downcast_ref::<ConfigLoad>().is_some()
        || err.downcast_ref::<BuildError>().is_some()
        || matches!(err.downcast_ref::<ControlError>(), Some(ControlError::Config(_)))
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingSensor => {
                "What happened: A heater zone was built without a sensor.\nLikely causes: The zone's sensor kind could not be constructed.\nHow to fix: Check the [[zones]] sensor and pin settings.".to_string()
            }
            BuildError::MissingPins => {
                "What happened: A heater zone has no output pin.\nLikely causes: output_pin missing from the zone.\nHow to fix: Set input_pin and output_pin for every [[zones]] entry.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
            BuildError::InvalidTable(msg) => format!(
                "What happened: The thermistor table is unusable ({msg}).\nLikely causes: Calibration storage holds a different table length or was never written.\nHow to fix: Check table_offset/table_len, or pass a valid --table CSV."
            ),
        };
    }

    if let Some(fault) = sensor_fault(err) {
        return match fault {
            SensorFault::Saturated { raw } => format!(
                "What happened: Sensor reading pinned at the ADC limit (raw {raw}).\nLikely causes: Open or shorted thermistor, or a loose connector.\nHow to fix: Check the sensor wiring; the heater stays off until the fault is cleared."
            ),
            SensorFault::Implausible { celsius } => format!(
                "What happened: Sensor reported an implausible {celsius} C.\nLikely causes: Wrong sensor kind or table for this zone, or a damaged sensor.\nHow to fix: Verify the zone's sensor settings and the [safety] plausible range."
            ),
            SensorFault::ReadFailed(msg) => format!(
                "What happened: Sensor read failed ({msg}).\nLikely causes: ADC not responding.\nHow to fix: Check the analog input pin and re-run with --log-level=debug."
            ),
        };
    }

    if let Some(fault) = protocol_fault(err) {
        return match fault {
            ProtocolFault::UnknownOpcode(op) => format!(
                "What happened: The command stream contains unknown opcode {op}.\nLikely causes: Stream is misaligned or was produced for a different firmware.\nHow to fix: Regenerate the command file; use `extruder decode` to find the offending byte."
            ),
            ProtocolFault::PayloadStalled { opcode, waited_ms } => format!(
                "What happened: Opcode {opcode} never received its full payload (waited {waited_ms} ms).\nLikely causes: Truncated command stream.\nHow to fix: Check the command file ends on a command boundary."
            ),
            ProtocolFault::QueueOverflow { capacity, attempted } => format!(
                "What happened: {attempted} bytes did not fit the {capacity}-byte command queue.\nLikely causes: Producer ignored the free space.\nHow to fix: Raise commands.queue_capacity or send smaller chunks."
            ),
        };
    }

    if let Some(ce) = err.downcast_ref::<ControlError>() {
        return format!(
            "What happened: {ce}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
        );
    }

    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if err.downcast_ref::<ConfigLoad>().is_some() {
        if lower.contains("raw,celsius") {
            return "Invalid headers in thermistor CSV. Expected 'raw,celsius'.".to_string();
        }
        return format!(
            "What happened: Configuration could not be loaded.\nLikely causes: File missing, TOML syntax error, or a value failed validation.\nHow to fix: Edit the config and try again. Details: {msg}"
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 2 config, 3 sensor fault, 4 protocol fault, 1 anything else.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if is_config_error(err) {
        2
    } else if sensor_fault(err).is_some() {
        3
    } else if protocol_fault(err).is_some() {
        4
    } else {
        1
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if is_config_error(err) {
        return "Config";
    }
    if let Some(f) = sensor_fault(err) {
        return match f {
            SensorFault::ReadFailed(_) => "SensorReadFailed",
            SensorFault::Saturated { .. } => "SensorSaturated",
            SensorFault::Implausible { .. } => "SensorImplausible",
        };
    }
    if let Some(f) = protocol_fault(err) {
        return match f {
            ProtocolFault::UnknownOpcode(_) => "UnknownOpcode",
            ProtocolFault::PayloadStalled { .. } => "PayloadStalled",
            ProtocolFault::QueueOverflow { .. } => "QueueOverflow",
        };
    }
    "Error"
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let msg = humanize(err);
    let reason = reason_name(err);

    let details = match sensor_fault(err) {
        Some(SensorFault::Implausible { celsius }) => LAST_SAFETY.get().map(|s| {
            json!({
                "celsius": celsius,
                "min_plausible_c": s.min_plausible_c,
                "max_plausible_c": s.max_plausible_c,
            })
        }),
        Some(SensorFault::Saturated { raw }) => Some(json!({ "raw": raw })),
        _ => match protocol_fault(err) {
            Some(ProtocolFault::UnknownOpcode(op)) => Some(json!({ "opcode": op })),
            _ => None,
        },
    };

    let obj = if let Some(d) = details {
        json!({ "reason": reason, "details": d, "message": msg })
    } else {
        json!({ "reason": reason, "message": msg })
    };
    obj.to_string()
}
