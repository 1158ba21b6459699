use crate::domain::ids::{ProcessKey, TimeModelKey};

/// Declarative description of one state machine attached to a resource.
/// The runtime bookkeeping (pause timers, pending wakeups) lives on the
/// resource; these specs are immutable for the whole run.
#[derive(Debug, Clone)]
pub struct StateSpec {
    pub id: String,
    pub kind: StateKind,
}

#[derive(Debug, Clone)]
pub enum StateKind {
    /// Loops `sample(ttf) -> down for sample(repair) -> back`. Preempts all
    /// running activities of the resource.
    Breakdown { time_model: TimeModelKey, repair_time_model: TimeModelKey },
    /// Same loop, but pauses and blocks only the matching process.
    ProcessBreakdown { time_model: TimeModelKey, repair_time_model: TimeModelKey, process: ProcessKey },
    /// One directed setup transition. A missing direction means the
    /// configuration switches freely without setup time.
    Setup { time_model: TimeModelKey, origin: ProcessKey, target: ProcessKey },
}

impl StateSpec {
    pub fn is_breakdown(&self) -> bool {
        matches!(self.kind, StateKind::Breakdown { .. } | StateKind::ProcessBreakdown { .. })
    }

    /// The process a process breakdown pins down, if any.
    pub fn affected_process(&self) -> Option<ProcessKey> {
        match self.kind {
            StateKind::ProcessBreakdown { process, .. } => Some(process),
            _ => None,
        }
    }
}
