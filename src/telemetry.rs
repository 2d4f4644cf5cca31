//! Telemetry source boundary.
//!
//! Readings arrive as JSON lines, one `Reading` per line, oldest first.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use crate::error::TelemetryError;
use crate::models::Reading;

pub fn load_jsonl(path: &Path) -> Result<Vec<Reading>, TelemetryError> {
    let file = File::open(path)?;
    parse_jsonl(BufReader::new(file))
}

/// Parses readings and rejects any whose timestamp goes backwards.
/// Blank lines are skipped.
pub fn parse_jsonl<R: BufRead>(input: R) -> Result<Vec<Reading>, TelemetryError> {
    let mut readings: Vec<Reading> = Vec::new();

    for (idx, line) in input.lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }

        let reading: Reading = serde_json::from_str(&line)
            .map_err(|source| TelemetryError::Parse { line: line_no, source })?;

        if let Some(prev) = readings.last() {
            if reading.timestamp < prev.timestamp {
                return Err(TelemetryError::OutOfOrder { line: line_no });
            }
        }
        readings.push(reading);
    }

    Ok(readings)
}
