//! Sensor registry: room/sensor mapping plus per-sensor running state.
//!
//! The mapping is loaded once at data-manager startup from a whitespace
//! separated text file (`datamgr_parse_sensor_data` in the original), and
//! mutated afterwards only by the running-average bookkeeping.

use crate::error::RegistryError;
use std::io::BufRead;
use std::path::Path;

/// Default running-average window length (`RUN_AVG_LENGTH` in the original).
pub const RUN_AVG_LENGTH: usize = 5;

/// Per-sensor state: the room it's installed in plus a ring of its most
/// recent readings.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub sensor_id: u16,
    pub room_id: u16,
    window: [f64; RUN_AVG_LENGTH],
    filled: usize,
}

impl RegistryEntry {
    fn new(sensor_id: u16, room_id: u16) -> Self {
        Self {
            sensor_id,
            room_id,
            window: [0.0; RUN_AVG_LENGTH],
            filled: 0,
        }
    }

    /// Push a new value into the ring, shifting older ones back.
    /// Mirrors the original's shift-and-insert loop in `datamgr.c`.
    fn push(&mut self, value: f64) {
        for i in (1..RUN_AVG_LENGTH).rev() {
            self.window[i] = self.window[i - 1];
        }
        self.window[0] = value;
        if self.filled < RUN_AVG_LENGTH {
            self.filled += 1;
        }
    }

    fn average(&self) -> f64 {
        self.window.iter().sum::<f64>() / RUN_AVG_LENGTH as f64
    }

    /// Whether this sensor has enough history to compute a meaningful
    /// average yet. The first `RUN_AVG_LENGTH - 1` readings never alert.
    fn has_full_window(&self) -> bool {
        self.filled >= RUN_AVG_LENGTH
    }
}

/// Outcome of feeding one reading through the registry.
#[derive(Debug, PartialEq)]
pub enum Observation {
    /// Sensor unknown to the registry; caller should request a connection drop.
    UnknownSensor,
    /// Sensor known, not enough history yet to evaluate the running average.
    Warming,
    /// Sensor known, running average computed and within range.
    InRange(f64),
    /// Sensor known, running average computed and outside `[min, max]`.
    OutOfRange(f64),
}

pub struct Registry {
    entries: Vec<RegistryEntry>,
}

impl Registry {
    /// Load `<room_id> <sensor_id>` pairs from a text file. Blank lines are
    /// skipped; any other malformed line is an error (matching the original's
    /// `sscanf("%hu %hu", ...)` which fails the whole parse on a bad line).
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let file = std::fs::File::open(path).map_err(|source| RegistryError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = std::io::BufReader::new(file);

        let mut entries = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| RegistryError::Open {
                path: path.to_path_buf(),
                source,
            })?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let mut tokens = trimmed.split_whitespace();
            let room_id = tokens
                .next()
                .and_then(|t| t.parse::<u16>().ok())
                .ok_or_else(|| RegistryError::MalformedLine {
                    line_no: idx + 1,
                    text: line.clone(),
                })?;
            let sensor_id = tokens
                .next()
                .and_then(|t| t.parse::<u16>().ok())
                .ok_or_else(|| RegistryError::MalformedLine {
                    line_no: idx + 1,
                    text: line.clone(),
                })?;
            entries.push(RegistryEntry::new(sensor_id, room_id));
        }
        entries.sort_by_key(|e| e.sensor_id);

        Ok(Self { entries })
    }

    #[cfg(test)]
    fn from_entries(pairs: &[(u16, u16)]) -> Self {
        let mut entries: Vec<_> = pairs
            .iter()
            .map(|&(sensor_id, room_id)| RegistryEntry::new(sensor_id, room_id))
            .collect();
        entries.sort_by_key(|e| e.sensor_id);
        Self { entries }
    }

    fn find_mut(&mut self, sensor_id: u16) -> Option<&mut RegistryEntry> {
        self.entries
            .binary_search_by_key(&sensor_id, |e| e.sensor_id)
            .ok()
            .map(|idx| &mut self.entries[idx])
    }

    /// Feed one reading's value into the sensor's running window and report
    /// whether it warrants an out-of-range alert, per `[min_temp, max_temp]`.
    pub fn observe(&mut self, sensor_id: u16, value: f64, min_temp: f64, max_temp: f64) -> Observation {
        let entry = match self.find_mut(sensor_id) {
            Some(e) => e,
            None => return Observation::UnknownSensor,
        };

        entry.push(value);

        if !entry.has_full_window() {
            return Observation::Warming;
        }

        let avg = entry.average();
        if avg < min_temp || avg > max_temp {
            Observation::OutOfRange(avg)
        } else {
            Observation::InRange(avg)
        }
    }
}
