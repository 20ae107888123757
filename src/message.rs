use serde_json::{json, Map, Value};

/// A single decoded field value, before it is stored on a record.
#[derive(Debug, Clone, PartialEq)]
pub enum LogValue {
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    Str(String),
}

impl std::fmt::Display for LogValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogValue::Int(v) => write!(f, "{}", v),
            LogValue::UInt(v) => write!(f, "{}", v),
            LogValue::Float(v) => write!(f, "{:4}", v),
            LogValue::Double(v) => write!(f, "{:6}", v),
            LogValue::Str(v) => write!(f, "\"{}\"", v),
        }
    }
}

impl From<LogValue> for Value {
    fn from(value: LogValue) -> Self {
        use LogValue::*;
        match value {
            Int(v) => json!(v),
            UInt(v) => json!(v),
            // json has no NaN / inf
            Float(v) if v.is_finite() => json!(v),
            Double(v) if v.is_finite() => json!(v),
            Float(_) | Double(_) => Value::Null,
            Str(v) => json!(v),
        }
    }
}

/// A record as it comes out of a format reader, not yet placed on the clock.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub msg_type: String,
    pub fields: Map<String, Value>,
}

impl RawRecord {
    pub fn number(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(Value::as_f64)
    }
}

/// A decoded, timestamped log record.
#[derive(Debug, Clone)]
pub struct Message {
    msg_type: String,
    timestamp: f64,
    fields: Map<String, Value>,
}

impl Message {
    pub fn new(msg_type: impl Into<String>, timestamp: f64, fields: Map<String, Value>) -> Self {
        Self {
            msg_type: msg_type.into(),
            timestamp,
            fields,
        }
    }

    pub(crate) fn from_record(record: RawRecord, timestamp: f64) -> Self {
        Self {
            msg_type: record.msg_type,
            timestamp,
            fields: record.fields,
        }
    }

    pub fn msg_type(&self) -> &str {
        &self.msg_type
    }

    /// Seconds since boot, or the record index for logs read without timestamps.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}
