use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, Read, Seek},
    path::Path,
};

use anyhow::{anyhow, Context, Result};
use binrw::{binread, BinRead};
use serde_json::Map;

use super::LogSource;
use crate::message::{LogValue, RawRecord};

const FMT_MSG_ID: u8 = 128;

#[binread]
#[br(little, magic = b"\xA3\x95")]
struct PacketHeader {
    msg_id: u8,
}

#[binread]
#[br(little)] // FMT message
#[derive(Debug, Clone)]
pub struct FmtPacket {
    pub type_id: u8,
    length: u8,
    #[br(map = |bytes: [u8; 4]| sanitize_str(&bytes))]
    pub name: String,
    #[br(map = |bytes: [u8; 16]| sanitize_str(&bytes))]
    format_str: String,
    #[br(map = |bytes: [u8; 64]| sanitize_str(&bytes))]
    labels: String,
}

fn sanitize_str(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .to_string()
}

// we use u64 to be compatible with seek() and current_position() math.
fn field_length(fmt_char: char) -> Result<u64> {
    match fmt_char {
        'b' | 'B' | 'M' => Ok(1),
        'h' | 'c' | 'H' | 'C' => Ok(2),
        'i' | 'L' | 'I' | 'E' | 'e' | 'f' | 'n' => Ok(4),

        'q' | 'Q' | 'd' => Ok(8),
        'N' => Ok(16),
        'Z' | 'a' => Ok(64),

        _ => Err(anyhow!("unexpected format char: {}", fmt_char)),
    }
}

fn read_str<const N: usize>(reader: &mut impl Read) -> Result<LogValue> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(LogValue::Str(sanitize_str(&buf)))
}

fn parse_value(reader: &mut (impl Read + Seek), fmt_char: char) -> Result<LogValue> {
    match fmt_char {
        // signed ints
        'b' => Ok(LogValue::Int(i8::read_le(reader)? as i64)),
        'h' => Ok(LogValue::Int(i16::read_le(reader)? as i64)),
        'i' => Ok(LogValue::Int(i32::read_le(reader)? as i64)),
        'q' => Ok(LogValue::Int(i64::read_le(reader)?)),

        // unsigned ints
        'B' | 'M' => Ok(LogValue::UInt(u8::read_le(reader)? as u64)),
        'H' => Ok(LogValue::UInt(u16::read_le(reader)? as u64)),
        'I' => Ok(LogValue::UInt(u32::read_le(reader)? as u64)),
        'Q' => Ok(LogValue::UInt(u64::read_le(reader)?)),

        // scaled ints: centi-units and degrees * 1e7
        'c' => Ok(LogValue::Double(i16::read_le(reader)? as f64 * 0.01)),
        'C' => Ok(LogValue::Double(u16::read_le(reader)? as f64 * 0.01)),
        'e' => Ok(LogValue::Double(i32::read_le(reader)? as f64 * 0.01)),
        'E' => Ok(LogValue::Double(u32::read_le(reader)? as f64 * 0.01)),
        'L' => Ok(LogValue::Double(i32::read_le(reader)? as f64 * 1.0e-7)),

        // floats
        'f' => Ok(LogValue::Float(f32::read_le(reader)?)),
        'd' => Ok(LogValue::Double(f64::read_le(reader)?)),

        // Strings, fixed width
        'n' => read_str::<4>(reader),
        'N' => read_str::<16>(reader),
        'Z' => read_str::<64>(reader),

        // int16[32], kept as text
        'a' => {
            let mut values = Vec::with_capacity(32);
            for _ in 0..32 {
                values.push(i16::read_le(reader)?);
            }
            Ok(LogValue::Str(format!("{:?}", values)))
        }

        _ => Err(anyhow!("Unknown format char: {}", fmt_char)),
    }
}

pub enum ArduFrame {
    /// A FMT record was read and its definition registered.
    ArduDefinition,
    ArduMessage(RawRecord),
    Eof,
}

pub struct ArduDefinition {
    pub ardu_fmt: FmtPacket,
    pub labels: Vec<String>,
}

/// Reader for binary ArduPilot Dataflash logs (`.bin`).
pub struct DataflashReader {
    file: BufReader<File>,
    file_size: u64,
    definitions: HashMap<u8, ArduDefinition>,
}

impl DataflashReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed opening file {}", path.display()))?;
        let file_size = file.metadata()?.len();

        Ok(Self {
            file: BufReader::new(file),
            file_size,
            definitions: HashMap::new(),
        })
    }

    pub fn read(&mut self) -> Result<ArduFrame> {
        let file = &mut self.file;

        let header = match PacketHeader::read(file) {
            Ok(h) => h,
            Err(binrw::Error::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(ArduFrame::Eof)
            }
            Err(e) => {
                log::warn!("Unexpected error, but likely EOF: {}", e);
                return Ok(ArduFrame::Eof);
            }
        };

        if header.msg_id == FMT_MSG_ID {
            let ardu_fmt = match FmtPacket::read(file) {
                Ok(fmt) => fmt,
                Err(e) => {
                    log::warn!("Truncated FMT record, stopping: {}", e);
                    return Ok(ArduFrame::Eof);
                }
            };

            let labels: Vec<String> = ardu_fmt
                .labels
                .split(',')
                .map(|s| s.trim().to_string())
                .collect();

            log::trace!(
                "FMT {} id={} len={} format={}",
                ardu_fmt.name,
                ardu_fmt.type_id,
                ardu_fmt.length,
                ardu_fmt.format_str
            );

            self.definitions
                .insert(ardu_fmt.type_id, ArduDefinition { ardu_fmt, labels });

            return Ok(ArduFrame::ArduDefinition);
        }

        let Some(definition) = self.definitions.get(&header.msg_id) else {
            log::warn!(
                "Unknown msg ID {} at position {}, stopping",
                header.msg_id,
                file.stream_position()?
            );
            return Ok(ArduFrame::Eof);
        };

        let mut fields = Map::new();

        for (idx, c) in definition.ardu_fmt.format_str.chars().enumerate() {
            let val = match parse_value(file, c) {
                Ok(v) => v,
                Err(e) => {
                    let current_pos = file.stream_position()?;
                    let field_len = field_length(c)?;

                    if current_pos + field_len > self.file_size {
                        // an incomplete file, which is ok.
                        log::warn!(
                            "file is incomplete, but read ok otherwise. Current position: {}. Expecting field of length: {}. File size: {}",
                            current_pos,
                            field_len,
                            self.file_size
                        );
                        return Ok(ArduFrame::Eof);
                    }

                    // something happened that can't be "excused" by an unexpected EOF
                    return Err(e.context(format!(
                        "decoding {} field {}",
                        definition.ardu_fmt.name, idx
                    )));
                }
            };

            let label = definition
                .labels
                .get(idx)
                .cloned()
                .unwrap_or_else(|| format!("field{}", idx));

            log::trace!("{}.{} = {}", definition.ardu_fmt.name, label, val);
            fields.insert(label, val.into());
        }

        Ok(ArduFrame::ArduMessage(RawRecord {
            msg_type: definition.ardu_fmt.name.clone(),
            fields,
        }))
    }
}

impl LogSource for DataflashReader {
    fn next_record(&mut self) -> Result<Option<RawRecord>> {
        loop {
            match self.read()? {
                ArduFrame::Eof => return Ok(None),
                ArduFrame::ArduDefinition => continue,
                ArduFrame::ArduMessage(record) => return Ok(Some(record)),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;
    use std::io::Write;

    pub(crate) fn padded<const N: usize>(s: &str) -> [u8; N] {
        let mut buf = [0u8; N];
        buf[..s.len()].copy_from_slice(s.as_bytes());
        buf
    }

    /// Builds Dataflash bytes in memory for tests.
    #[derive(Default)]
    pub(crate) struct LogBuilder {
        pub(crate) bytes: Vec<u8>,
    }

    impl LogBuilder {
        pub(crate) fn fmt(mut self, type_id: u8, name: &str, format: &str, labels: &str) -> Self {
            self.bytes.extend_from_slice(&[0xA3, 0x95, FMT_MSG_ID, type_id, 0]);
            self.bytes.extend_from_slice(&padded::<4>(name));
            self.bytes.extend_from_slice(&padded::<16>(format));
            self.bytes.extend_from_slice(&padded::<64>(labels));
            self
        }

        pub(crate) fn msg(mut self, type_id: u8, payload: &[&[u8]]) -> Self {
            self.bytes.extend_from_slice(&[0xA3, 0x95, type_id]);
            for part in payload {
                self.bytes.extend_from_slice(part);
            }
            self
        }

        pub(crate) fn write(&self) -> tempfile::NamedTempFile {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            file.write_all(&self.bytes).unwrap();
            file.flush().unwrap();
            file
        }
    }

    pub(crate) fn att(time_us: u64, roll: f32, pitch: f32) -> Vec<Vec<u8>> {
        vec![
            time_us.to_le_bytes().to_vec(),
            roll.to_le_bytes().to_vec(),
            pitch.to_le_bytes().to_vec(),
        ]
    }

    pub(crate) fn att_log() -> LogBuilder {
        LogBuilder::default().fmt(10, "ATT", "Qff", "TimeUS,Roll,Pitch")
    }

    fn records(path: &Path) -> Vec<RawRecord> {
        let mut reader = DataflashReader::open(path).unwrap();
        std::iter::from_fn(|| reader.next_record().unwrap()).collect()
    }

    pub(crate) fn refs(parts: &[Vec<u8>]) -> Vec<&[u8]> {
        parts.iter().map(Vec::as_slice).collect()
    }

    #[test]
    fn test_reads_defined_messages() {
        let log = att_log()
            .msg(10, &refs(&att(1_000, 0.5, -0.25)))
            .msg(10, &refs(&att(2_000, 0.75, 0.0)))
            .write();

        let recs = records(log.path());
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].msg_type, "ATT");
        assert_eq!(recs[0].fields["TimeUS"], json!(1_000u64));
        assert_relative_eq!(recs[0].number("Pitch").unwrap(), -0.25);
        assert_relative_eq!(recs[1].number("Roll").unwrap(), 0.75);
    }

    #[test]
    fn test_fmt_frames_register_definitions() {
        let log = att_log().msg(10, &refs(&att(1_000, 0.5, 0.5))).write();
        let mut reader = DataflashReader::open(log.path()).unwrap();

        assert!(matches!(reader.read().unwrap(), ArduFrame::ArduDefinition));
        assert_eq!(reader.definitions[&10].labels, vec!["TimeUS", "Roll", "Pitch"]);
        assert!(matches!(reader.read().unwrap(), ArduFrame::ArduMessage(r) if r.msg_type == "ATT"));
        assert!(matches!(reader.read().unwrap(), ArduFrame::Eof));
    }

    #[test]
    fn test_scaled_and_string_fields() {
        let log = LogBuilder::default()
            .fmt(20, "GPS", "QBLLe", "TimeUS,Status,Lat,Lng,Alt")
            .fmt(21, "MODE", "QMn", "TimeUS,Mode,Name")
            .msg(
                20,
                &[
                    &5u64.to_le_bytes(),
                    &[3u8],
                    &556_000_000i32.to_le_bytes(),
                    &(-121_000_000i32).to_le_bytes(),
                    &12_345i32.to_le_bytes(),
                ],
            )
            .msg(21, &[&6u64.to_le_bytes(), &[5u8], b"LOIT"])
            .write();

        let recs = records(log.path());
        assert_eq!(recs.len(), 2);
        assert_relative_eq!(recs[0].number("Lat").unwrap(), 55.6, epsilon = 1e-9);
        assert_relative_eq!(recs[0].number("Lng").unwrap(), -12.1, epsilon = 1e-9);
        assert_relative_eq!(recs[0].number("Alt").unwrap(), 123.45, epsilon = 1e-9);
        assert_eq!(recs[1].fields["Mode"], json!(5));
        assert_eq!(recs[1].fields["Name"], json!("LOIT"));
    }

    #[test]
    fn test_truncated_file_ends_stream() {
        let mut builder = att_log()
            .msg(10, &refs(&att(1_000, 0.5, 0.5)))
            .msg(10, &refs(&att(2_000, 0.5, 0.5)));
        // chop the last float in half
        builder.bytes.truncate(builder.bytes.len() - 2);
        let log = builder.write();

        let recs = records(log.path());
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].fields["TimeUS"], json!(1_000u64));
    }

    #[test]
    fn test_garbage_and_unknown_ids_end_stream() {
        let mut builder = att_log().msg(10, &refs(&att(1_000, 0.5, 0.5)));
        builder.bytes.extend_from_slice(&[0xA3, 0x95, 99, 1, 2, 3]);
        let log = builder.write();
        assert_eq!(records(log.path()).len(), 1);

        let log = LogBuilder {
            bytes: b"not a dataflash log".to_vec(),
        }
        .write();
        assert!(records(log.path()).is_empty());
    }

    #[test]
    fn test_missing_file() {
        let err = DataflashReader::open(Path::new("/nonexistent/flight.bin"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("Failed opening file"));
    }
}
