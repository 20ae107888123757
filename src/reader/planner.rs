use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use super::LogSource;
use crate::message::{LogValue, RawRecord};

struct TextFormat {
    format: Vec<char>,
    labels: Vec<String>,
}

fn parse_text_value(fmt_char: char, text: &str) -> Option<LogValue> {
    match fmt_char {
        'n' | 'N' | 'Z' | 'a' => Some(LogValue::Str(text.to_string())),
        // flight modes are written by name
        'M' => Some(
            text.parse()
                .map(LogValue::UInt)
                .unwrap_or_else(|_| LogValue::Str(text.to_string())),
        ),
        'f' | 'd' | 'c' | 'C' | 'e' | 'E' | 'L' => text.parse().ok().map(LogValue::Double),
        'b' | 'h' | 'i' | 'q' => text
            .parse()
            .ok()
            .map(LogValue::Int)
            .or_else(|| text.parse().ok().map(LogValue::Double)),
        'B' | 'H' | 'I' | 'Q' => text
            .parse()
            .ok()
            .map(LogValue::UInt)
            .or_else(|| text.parse().ok().map(LogValue::Double)),
        // unknown format chars: numbers if they look like one
        _ => text
            .parse()
            .ok()
            .map(LogValue::Double)
            .or_else(|| Some(LogValue::Str(text.to_string()))),
    }
}

/// Reader for the Mission Planner text rendition of Dataflash logs (`.log`).
pub struct PlannerReader {
    lines: BufReader<File>,
    line_no: usize,
    formats: HashMap<String, TextFormat>,
}

impl PlannerReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed opening file {}", path.display()))?;

        Ok(Self {
            lines: BufReader::new(file),
            line_no: 0,
            formats: HashMap::new(),
        })
    }

    fn define(&mut self, parts: &[&str]) {
        // FMT, type, length, name, format, labels...
        let [_, _, _, name, format, labels @ ..] = parts else {
            log::debug!("line {}: short FMT line, skipping", self.line_no);
            return;
        };

        self.formats.insert(
            name.to_string(),
            TextFormat {
                format: format.chars().collect(),
                labels: labels.iter().map(|s| s.to_string()).collect(),
            },
        );
    }

    fn decode(&self, name: &str, values: &[&str]) -> Option<RawRecord> {
        let Some(fmt) = self.formats.get(name) else {
            log::debug!("line {}: no FMT for {}, skipping", self.line_no, name);
            return None;
        };

        if values.len() != fmt.labels.len() {
            log::debug!(
                "line {}: {} has {} values, FMT has {} columns, skipping",
                self.line_no,
                name,
                values.len(),
                fmt.labels.len()
            );
            return None;
        }

        let mut fields = Map::new();
        for (idx, (label, text)) in fmt.labels.iter().zip(values).enumerate() {
            let fmt_char = fmt.format.get(idx).copied().unwrap_or('?');
            let Some(value) = parse_text_value(fmt_char, text) else {
                log::debug!(
                    "line {}: bad value '{}' for {}.{}, skipping",
                    self.line_no,
                    text,
                    name,
                    label
                );
                return None;
            };
            fields.insert(label.clone(), Value::from(value));
        }

        Some(RawRecord {
            msg_type: name.to_string(),
            fields,
        })
    }
}

impl LogSource for PlannerReader {
    fn next_record(&mut self) -> Result<Option<RawRecord>> {
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if self.lines.read_until(b'\n', &mut buf)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let line = String::from_utf8_lossy(&buf);
            let parts: Vec<&str> = line.split(',').map(str::trim).collect();

            match parts.as_slice() {
                [""] => continue,
                ["FMT", ..] => self.define(&parts),
                [name, values @ ..] => {
                    if let Some(record) = self.decode(name, values) {
                        return Ok(Some(record));
                    }
                }
                [] => continue,
            }
        }
    }
}
