use crate::domain::ids::{AuxiliaryKey, EntityRef, TimeModelKey};

/// Lot formation policy of a production process. Members of one lot share
/// process, setup configuration and target queue, and the whole lot runs as
/// one activity with a single duration draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LotPolicy {
    pub max_lot_size: usize,
}

/// What a process is, beyond its duration. The set of kinds is closed; new
/// kinds mean a new wire-format revision.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessKind {
    /// Transforms a product at a processing resource.
    Production,
    /// Moves a product between locations.
    Transport,
    /// A production process advertised under a capability tag; matched by
    /// required-capability plan steps of the same tag.
    Capability { capability: String },
    /// A plan-side placeholder matched against `Capability` processes by tag.
    RequiredCapability { capability: String },
    /// A transport process restricted to declared origin/target pairs.
    LinkTransport { links: Vec<(EntityRef, EntityRef)> },
}

#[derive(Debug, Clone)]
pub struct Process {
    pub id: String,
    pub kind: ProcessKind,
    pub time_model: Option<TimeModelKey>,
    pub lot: Option<LotPolicy>,
    /// Tool copies that must be held for the duration of each activity.
    pub tools: Vec<AuxiliaryKey>,
}

impl Process {
    pub fn is_transport(&self) -> bool {
        matches!(self.kind, ProcessKind::Transport | ProcessKind::LinkTransport { .. })
    }

    /// The capability this process offers, if any.
    pub fn offered_capability(&self) -> Option<&str> {
        match &self.kind {
            ProcessKind::Capability { capability } => Some(capability),
            _ => None,
        }
    }

    /// For link transport: whether the process may carry a product from
    /// `origin` to `target`.
    pub fn serves_link(&self, origin: EntityRef, target: EntityRef) -> bool {
        match &self.kind {
            ProcessKind::LinkTransport { links } => links.iter().any(|(from, to)| *from == origin && *to == target),
            ProcessKind::Transport => true,
            _ => false,
        }
    }
}
