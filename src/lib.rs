//! Graph fields of ArduPilot Dataflash logs.
//!
//! Fields are selected with `MSGNAME.fieldname[:modifier,...]` tokens, read
//! from binary (`.bin`) or Mission Planner text (`.log`) logs and drawn as
//! time-series charts with up to two y-axes.

pub mod error;
pub mod field_spec;
pub mod message;
pub mod pipeline;
pub mod plot;
pub mod reader;
pub mod series;

pub use error::GraphError;
pub use field_spec::{Axis, FieldSpec};
pub use message::Message;
pub use pipeline::{accumulate_file, process_log_file, GraphOptions};
pub use series::{Series, SeriesAccumulator};
