use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("File not found or could not be read: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse system model JSON: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("Invalid configuration in {kind} '{id}': {reason}")]
    Config { kind: &'static str, id: String, reason: String },

    /// An engine invariant was violated mid-run. This indicates a bug in the
    /// simulation core, not in the model; the context is enough to replay the
    /// run up to the failure.
    #[error("Simulation invariant violated at t={time} (seed {seed}, event #{event_index}): {reason}")]
    Invariant { time: f64, seed: u64, event_index: u64, reason: String },

    #[error("Failed to write event log: {0}")]
    EventLogExport(#[from] csv::Error),
}

impl Error {
    pub fn config(kind: &'static str, id: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Config { kind, id: id.into(), reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
