use std::{collections::BTreeSet, fmt, path::Path, str::FromStr};

use anyhow::{anyhow, Result};
use serde_json::Value;

use crate::message::{Message, RawRecord};

pub mod dataflash;
pub mod modes;
pub mod planner;

pub use dataflash::DataflashReader;
pub use modes::Vehicle;
pub use planner::PlannerReader;

use modes::normalize_mode_name;

/// A format reader: yields records in file order, `None` at end of stream.
pub trait LogSource {
    fn next_record(&mut self) -> Result<Option<RawRecord>>;
}

#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Use the record index instead of the embedded TimeUS/TimeMS.
    pub no_timestamps: bool,
    /// Read the Mission Planner text format instead of binary Dataflash.
    pub planner: bool,
    pub mode: Option<ModeFilter>,
}

/// One `--mode` entry.
#[derive(Debug, Clone, PartialEq)]
enum ModeEntry {
    Number(u8),
    /// Normalized name, see [`normalize_mode_name`].
    Name(String),
}

/// `--mode` selection: a list of flight mode names or numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeFilter {
    text: String,
    modes: Vec<ModeEntry>,
}

impl FromStr for ModeFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let modes: Vec<ModeEntry> = s
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(|m| match m.parse::<u8>() {
                Ok(number) => ModeEntry::Number(number),
                Err(_) => ModeEntry::Name(normalize_mode_name(m)),
            })
            .collect();

        if modes.is_empty() {
            anyhow::bail!("empty mode selection '{}'", s);
        }

        Ok(Self {
            text: s.trim().to_string(),
            modes,
        })
    }
}

impl fmt::Display for ModeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl ModeFilter {
    /// Whether a MODE record switches into one of the selected modes.
    ///
    /// Text logs name the mode and are compared by name. Binary logs only carry
    /// the mode number, so names are looked up in the vehicle's mode table,
    /// which fails when the vehicle type is not known yet.
    pub fn matches(&self, mode_record: &RawRecord, vehicle: Option<Vehicle>) -> Result<bool> {
        let values: Vec<&Value> = ["Mode", "ModeNum"]
            .iter()
            .filter_map(|key| mode_record.fields.get(*key))
            .collect();
        let names: Vec<String> = values
            .iter()
            .filter_map(|v| v.as_str())
            .map(normalize_mode_name)
            .collect();
        let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();

        for entry in &self.modes {
            let selected = match entry {
                ModeEntry::Number(number) => numbers.contains(&f64::from(*number)),
                ModeEntry::Name(name) if !names.is_empty() => names.contains(name),
                ModeEntry::Name(name) => {
                    let vehicle = vehicle.ok_or_else(|| {
                        anyhow!(
                            "cannot select mode '{}': the vehicle type is unknown \
                             (no firmware MSG or VER record before the first MODE), use mode numbers",
                            name
                        )
                    })?;
                    let number = vehicle
                        .mode_number(name)
                        .ok_or_else(|| anyhow!("{} has no flight mode '{}'", vehicle, name))?;
                    numbers.contains(&f64::from(number))
                }
            };

            if selected {
                return Ok(true);
            }
        }

        Ok(false)
    }
}

// GPS epoch (1980-01-06) in unix seconds, and the GPS-UTC leap second offset.
const GPS_UNIX_EPOCH: f64 = 315_964_800.0;
const GPS_LEAP_SECONDS: f64 = 18.0;
const SECONDS_PER_WEEK: f64 = 604_800.0;
const GPS_FIX_3D: f64 = 3.0;

/// Places records on a time axis.
#[derive(Debug, Default)]
struct Clock {
    no_timestamps: bool,
    records: u64,
    last_time: f64,
    utc_offset: Option<f64>,
}

impl Clock {
    fn new(no_timestamps: bool) -> Self {
        Self {
            no_timestamps,
            ..Default::default()
        }
    }

    fn stamp(&mut self, record: &RawRecord) -> f64 {
        let index = self.records;
        self.records += 1;

        if self.no_timestamps {
            return index as f64;
        }

        if let Some(us) = record.number("TimeUS") {
            self.last_time = us / 1.0e6;
        } else if let Some(ms) = record.number("TimeMS") {
            self.last_time = ms / 1.0e3;
        }

        if self.utc_offset.is_none() && record.msg_type == "GPS" {
            self.sync_gps(record);
        }

        self.last_time
    }

    fn sync_gps(&mut self, record: &RawRecord) {
        let status = record.number("Status").unwrap_or(0.0);
        let (Some(week), Some(week_ms)) = (record.number("GWk"), record.number("GMS")) else {
            return;
        };

        if status < GPS_FIX_3D || week <= 0.0 {
            return;
        }

        let utc = GPS_UNIX_EPOCH + week * SECONDS_PER_WEEK + week_ms / 1000.0 - GPS_LEAP_SECONDS;
        let offset = utc - self.last_time;
        log::debug!(
            "GPS time base found at boot time {:.3}s, UTC offset {:.3}s",
            self.last_time,
            offset
        );
        self.utc_offset = Some(offset);
    }
}

/// A log opened for graphing. Applies the clock and the mode filter on top of
/// a format reader.
pub struct LogStream {
    source: Box<dyn LogSource>,
    clock: Clock,
    mode: Option<ModeFilter>,
    vehicle: Option<Vehicle>,
    in_selected_mode: bool,
    mode_records: usize,
    passed: usize,
    finished: bool,
}

impl LogStream {
    pub fn new(source: Box<dyn LogSource>, options: &ReadOptions) -> Self {
        Self {
            source,
            clock: Clock::new(options.no_timestamps),
            mode: options.mode.clone(),
            vehicle: None,
            in_selected_mode: false,
            mode_records: 0,
            passed: 0,
            finished: false,
        }
    }

    /// Next record whose type is in `types` (all types when empty), logged in a
    /// selected mode, or `None` at end of stream.
    pub fn read_match(&mut self, types: &BTreeSet<String>) -> Result<Option<Message>> {
        while let Some(record) = self.source.next_record()? {
            let timestamp = self.clock.stamp(&record);

            if let Some(filter) = &self.mode {
                if self.vehicle.is_none() {
                    self.vehicle = Vehicle::detect(&record);
                    if let Some(vehicle) = self.vehicle {
                        log::debug!("Vehicle type {}", vehicle);
                    }
                }
                if record.msg_type == "MODE" {
                    self.mode_records += 1;
                    self.in_selected_mode = filter.matches(&record, self.vehicle)?;
                }
                if !self.in_selected_mode {
                    continue;
                }
                self.passed += 1;
            }

            if !types.is_empty() && !types.contains(&record.msg_type) {
                continue;
            }

            return Ok(Some(Message::from_record(record, timestamp)));
        }

        if let (Some(filter), false) = (&self.mode, self.finished) {
            if self.passed == 0 {
                log::warn!(
                    "Mode filter '{}' passed no records ({} MODE records in the log)",
                    filter,
                    self.mode_records
                );
            }
        }
        self.finished = true;

        Ok(None)
    }

    /// The vehicle type announced by the log so far. Only tracked with a mode filter.
    pub fn vehicle(&self) -> Option<Vehicle> {
        self.vehicle
    }

    /// Seconds to add to a timestamp to get unix time, once GPS time is known.
    pub fn utc_offset(&self) -> Option<f64> {
        if self.clock.no_timestamps {
            None
        } else {
            self.clock.utc_offset
        }
    }
}

pub fn open_log(path: &Path, options: &ReadOptions) -> Result<LogStream> {
    let source: Box<dyn LogSource> = if options.planner {
        Box::new(PlannerReader::open(path)?)
    } else {
        Box::new(DataflashReader::open(path)?)
    };

    Ok(LogStream::new(source, options))
}
