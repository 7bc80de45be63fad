#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and thermistor table parsing for the extruder controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Thermistor table CSV loader enforces headers and checks that the
//!   breakpoints are strictly increasing and evenly spaced, which the
//!   sampler relies on to find a bracket without scanning.
use serde::Deserialize;

/// Largest raw value a 10-bit ADC produces.
pub const ADC_MAX: u16 = 1023;

/// Thermistor table CSV schema.
///
/// Expected headers:
/// raw,celsius
///
/// Example:
/// raw,celsius
/// 0,300
/// 64,231
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct TableRow {
    pub raw: i16,
    pub celsius: i16,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    #[default]
    Thermistor,
    Thermocouple,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    #[default]
    Pid,
    BangBang,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ZoneCfg {
    pub name: String,
    /// Tool index this zone answers for in WAIT_FOR_TOOL.
    #[serde(default)]
    pub tool: u8,
    #[serde(default)]
    pub sensor: SensorKind,
    pub input_pin: u8,
    pub output_pin: u8,
    /// Byte offset of the thermistor table in calibration storage.
    #[serde(default)]
    pub table_offset: u16,
    /// Number of breakpoints in the thermistor table.
    #[serde(default = "default_table_len")]
    pub table_len: u16,
    /// Start with control disabled.
    #[serde(default)]
    pub disabled: bool,
}

fn default_table_len() -> u16 {
    20
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PidCfg {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Ceiling on the drive the integral term alone may contribute.
    pub integral_drive_max: f32,
}

impl Default for PidCfg {
    fn default() -> Self {
        Self {
            kp: 5.0,
            ki: 0.1,
            kd: 100.0,
            integral_drive_max: 110.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BangBangCfg {
    pub high_duty: u8,
    pub low_duty: u8,
}

impl Default for BangBangCfg {
    fn default() -> Self {
        Self {
            high_duty: 255,
            low_duty: 64,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ControlCfg {
    pub mode: ControlMode,
    /// Minimum time between two fired heater ticks (ms).
    pub update_interval_ms: u32,
    pub pid: PidCfg,
    pub bang_bang: BangBangCfg,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            mode: ControlMode::Pid,
            update_interval_ms: 200,
            pid: PidCfg::default(),
            bang_bang: BangBangCfg::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Safety {
    /// Readings below this are treated as a sensor fault (°C).
    pub min_plausible_c: i16,
    /// Readings above this are treated as a sensor fault (°C).
    pub max_plausible_c: i16,
    /// Treat an averaged raw value pinned at 0 or ADC max as a fault.
    pub fault_on_saturated_adc: bool,
}

impl Default for Safety {
    fn default() -> Self {
        Self {
            min_plausible_c: -20,
            max_plausible_c: 300,
            fault_on_saturated_adc: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CommandsCfg {
    /// Bytes the command queue can hold.
    pub queue_capacity: usize,
    /// Report a stalled payload after this long waiting (0 disables).
    pub incomplete_timeout_ms: u32,
}

impl Default for CommandsCfg {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            incomplete_timeout_ms: 0,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub control: ControlCfg,
    pub zones: Vec<ZoneCfg>,
    #[serde(default)]
    pub safety: Safety,
    #[serde(default)]
    pub commands: CommandsCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// A validated thermistor table: strictly increasing raw values at one spacing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThermistorTable {
    rows: Vec<TableRow>,
}

impl ThermistorTable {
    pub fn from_rows(rows: Vec<TableRow>) -> eyre::Result<Self> {
        if rows.len() < 2 {
            eyre::bail!("thermistor table requires at least two rows, got {}", rows.len());
        }
        let step = i32::from(rows[1].raw) - i32::from(rows[0].raw);
        for i in 1..rows.len() {
            let d = i32::from(rows[i].raw) - i32::from(rows[i - 1].raw);
            if d == 0 {
                eyre::bail!(
                    "thermistor table has duplicate raw values at index {} and {}",
                    i - 1,
                    i
                );
            }
            if d < 0 {
                eyre::bail!("thermistor table raw values must be strictly increasing");
            }
            if d != step {
                eyre::bail!(
                    "thermistor table raw values must be evenly spaced: step {} at index {}, expected {}",
                    d,
                    i,
                    step
                );
            }
        }
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Spacing between adjacent raw breakpoints.
    pub fn step(&self) -> i32 {
        i32::from(self.rows[1].raw) - i32::from(self.rows[0].raw)
    }

    /// Serialize to the calibration storage layout: per entry a little-endian
    /// i16 raw followed by a little-endian i16 temperature.
    pub fn to_storage_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.rows.len() * 4);
        for r in &self.rows {
            out.extend_from_slice(&r.raw.to_le_bytes());
            out.extend_from_slice(&r.celsius.to_le_bytes());
        }
        out
    }
}

impl TryFrom<Vec<TableRow>> for ThermistorTable {
    type Error = eyre::Report;
    fn try_from(rows: Vec<TableRow>) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

impl TryFrom<&[TableRow]> for ThermistorTable {
    type Error = eyre::Report;
    fn try_from(rows: &[TableRow]) -> Result<Self, Self::Error> {
        Self::from_rows(rows.to_vec())
    }
}

pub fn load_table_csv(path: &std::path::Path) -> eyre::Result<ThermistorTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open thermistor table CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["raw", "celsius"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "thermistor table CSV must have headers 'raw,celsius', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<TableRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }

    ThermistorTable::try_from(rows)
}

/// Builtin 100k NTC table, 20 entries evenly spaced over the 10-bit ADC range.
pub fn default_thermistor_table() -> ThermistorTable {
    const CELSIUS: [i16; 20] = [
        300, 254, 225, 205, 190, 177, 166, 156, 147, 139, 131, 123, 115, 107, 98, 88, 76, 61, 38,
        0,
    ];
    let rows = CELSIUS
        .iter()
        .enumerate()
        .map(|(i, &celsius)| TableRow {
            raw: (i as i16) * 53,
            celsius,
        })
        .collect();
    ThermistorTable { rows }
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Control
        if self.control.update_interval_ms == 0 {
            eyre::bail!("control.update_interval_ms must be >= 1");
        }
        if self.control.update_interval_ms > 60_000 {
            eyre::bail!("control.update_interval_ms is unreasonably large (>60s)");
        }
        let pid = &self.control.pid;
        for (name, v) in [
            ("kp", pid.kp),
            ("ki", pid.ki),
            ("kd", pid.kd),
            ("integral_drive_max", pid.integral_drive_max),
        ] {
            if !v.is_finite() {
                eyre::bail!("control.pid.{name} must be finite");
            }
            if v.is_sign_negative() {
                eyre::bail!("control.pid.{name} must be >= 0");
            }
        }
        let bb = &self.control.bang_bang;
        if bb.low_duty > bb.high_duty {
            eyre::bail!("control.bang_bang.low_duty must be <= high_duty");
        }

        // Zones
        if self.zones.is_empty() {
            eyre::bail!("at least one [[zones]] entry is required");
        }
        for (i, z) in self.zones.iter().enumerate() {
            if z.name.trim().is_empty() {
                eyre::bail!("zones[{i}].name must not be empty");
            }
            if z.input_pin == z.output_pin {
                eyre::bail!("zones[{i}].input_pin and output_pin must differ");
            }
            if z.sensor == SensorKind::Thermistor && z.table_len < 2 {
                eyre::bail!("zones[{i}].table_len must be >= 2");
            }
            if self.zones[..i].iter().any(|o| o.output_pin == z.output_pin) {
                eyre::bail!("zones[{i}].output_pin is already driven by another zone");
            }
            if self.zones[..i].iter().any(|o| o.tool == z.tool) {
                eyre::bail!("zones[{i}].tool is already claimed by another zone");
            }
        }

        // Safety
        if self.safety.min_plausible_c >= self.safety.max_plausible_c {
            eyre::bail!("safety.min_plausible_c must be < safety.max_plausible_c");
        }

        // Commands
        if self.commands.queue_capacity < 17 {
            eyre::bail!("commands.queue_capacity must hold the largest command (>= 17)");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_is_valid() {
        let t = default_thermistor_table();
        let again = ThermistorTable::from_rows(t.rows().to_vec()).expect("valid");
        assert_eq!(again.len(), 20);
        assert_eq!(again.step(), 53);
        assert!(i32::from(again.rows()[19].raw) <= i32::from(ADC_MAX));
    }

    #[test]
    fn storage_layout_is_little_endian_pairs() {
        let t = ThermistorTable::from_rows(vec![
            TableRow { raw: 0, celsius: 300 },
            TableRow { raw: 512, celsius: -5 },
        ])
        .unwrap();
        let bytes = t.to_storage_bytes();
        assert_eq!(bytes, vec![0, 0, 0x2C, 0x01, 0x00, 0x02, 0xFB, 0xFF]);
    }
}
