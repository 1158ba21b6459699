use std::io::Write;

use serde::Serialize;

use crate::domain::ids::{Location, ProcessKey, ProductSerial, ResourceKey, SinkKey, SourceKey, StateKey};

/// Who a log record is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogActor {
    Resource(ResourceKey),
    Source(SourceKey),
    Sink(SinkKey),
}

/// Which state machine (or lifecycle marker) the record refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogState {
    Process(ProcessKey),
    Machine(StateKey),
    Arrival,
    Exit,
}

/// Coarse classification of the state, used directly by the KPI replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStateType {
    Production,
    Transport,
    Setup,
    Breakdown,
    ProcessBreakdown,
    Source,
    Sink,
}

impl LogStateType {
    pub fn as_str(self) -> &'static str {
        match self {
            LogStateType::Production => "Production",
            LogStateType::Transport => "Transport",
            LogStateType::Setup => "Setup",
            LogStateType::Breakdown => "Breakdown",
            LogStateType::ProcessBreakdown => "ProcessBreakdown",
            LogStateType::Source => "Source",
            LogStateType::Sink => "Sink",
        }
    }
}

/// What happened to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogActivity {
    CreatedState,
    StartState,
    EndState,
    StartInterrupt,
    EndInterrupt,
    CreatedProduct,
    FinishedProduct,
    Truncated,
}

impl LogActivity {
    pub fn as_str(self) -> &'static str {
        match self {
            LogActivity::CreatedState => "created state",
            LogActivity::StartState => "start state",
            LogActivity::EndState => "end state",
            LogActivity::StartInterrupt => "start interrupt",
            LogActivity::EndInterrupt => "end interrupt",
            LogActivity::CreatedProduct => "created product",
            LogActivity::FinishedProduct => "finished product",
            LogActivity::Truncated => "truncated",
        }
    }
}

/// One immutable history entry. Entities are referenced by key/serial, not
/// name; rendering to strings happens only on export.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventRecord {
    pub time: f64,
    pub actor: LogActor,
    pub state: LogState,
    pub state_type: LogStateType,
    pub activity: LogActivity,
    pub product: Option<ProductSerial>,
    pub expected_end: Option<f64>,
    pub target_location: Option<Location>,
}

/// Append-only event history of one run.
#[derive(Debug, Default)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    pub fn new() -> Self {
        EventLog::default()
    }

    pub fn push(&mut self, record: EventRecord) {
        debug_assert!(
            self.records.last().is_none_or(|last| last.time <= record.time),
            "event log time went backwards"
        );
        self.records.push(record);
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A rendered event-log row, ready for CSV or table output.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EventRow {
    #[serde(rename = "Time")]
    pub time: f64,
    #[serde(rename = "Resource")]
    pub resource: String,
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "State Type")]
    pub state_type: String,
    #[serde(rename = "Activity")]
    pub activity: String,
    #[serde(rename = "Product")]
    pub product: String,
    #[serde(rename = "Expected End Time")]
    pub expected_end: String,
    #[serde(rename = "Target Location")]
    pub target_location: String,
}

/// Streams rendered rows as `;`-separated CSV.
pub fn write_csv<W: Write>(rows: &[EventRow], writer: W) -> csv::Result<()> {
    let mut wtr = csv::WriterBuilder::new().delimiter(b';').from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}
