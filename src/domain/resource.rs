use crate::domain::controller::{ControlPolicy, ControllerKind};
use crate::domain::ids::{
    ActivityId, AuxiliaryKey, EntityRef, Location, ProcessKey, ProductKey, QueueKey, RequestId, ReservationId, StateKey,
};
use crate::domain::scheduler::EventId;

/// One process offered by a resource, with its declared concurrency bound
/// and the number of activities currently using it.
#[derive(Debug, Clone)]
pub struct ResourceProcess {
    pub process: ProcessKey,
    pub capacity: u32,
    pub active: u32,
}

/// Where a transport request delivers its product.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub target: EntityRef,
    pub target_queue: QueueKey,
    pub reservation: ReservationId,
    pub origin_queue: QueueKey,
    /// The production step waiting at the destination; `None` when the
    /// product is headed for its sink.
    pub dest_process: Option<ProcessKey>,
}

#[derive(Debug, Clone)]
pub enum RequestKind {
    /// The product waits in one of this resource's input queues.
    Production,
    /// Fetch the product and deliver it into the reserved slot.
    Transport(Delivery),
}

/// An order to perform one process on one product at this resource. Created
/// by the router, consumed by the resource's controller.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub product: ProductKey,
    pub process: ProcessKey,
    pub kind: RequestKind,
    pub created_at: f64,
}

/// Resume point of a running activity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActivityPhase {
    Production,
    /// Empty travel towards the product; `loaded_duration` was drawn at
    /// dispatch so the whole trip is committed to one pair of samples.
    TransportToPickup { loaded_duration: f64 },
    TransportLoaded,
}

/// A dispatched activity. A lot is one activity with several requests.
#[derive(Debug, Clone)]
pub struct Activity {
    pub id: ActivityId,
    pub process: ProcessKey,
    pub requests: Vec<Request>,
    pub phase: ActivityPhase,
    pub started_at: f64,
    pub expected_end: f64,
    /// The pending wakeup that advances this activity (pickup or end).
    pub wakeup: EventId,
    /// When that wakeup fires; differs from `expected_end` during the
    /// empty-travel phase of a transport.
    pub wakeup_at: f64,
    /// Remaining duration until the cancelled wakeup while paused by a
    /// breakdown.
    pub paused_remaining: Option<f64>,
    /// Output-queue slots reserved for the results, one per lot member.
    pub outputs: Vec<(QueueKey, ReservationId)>,
    /// Tool copies held for the duration, with the storage they came from.
    pub tools: Vec<(AuxiliaryKey, QueueKey)>,
}

impl Activity {
    pub fn is_paused(&self) -> bool {
        self.paused_remaining.is_some()
    }
}

/// An in-flight setup transition.
#[derive(Debug, Clone)]
pub struct SetupRun {
    pub state: StateKey,
    pub target: ProcessKey,
    pub end_event: EventId,
    pub expected_end: f64,
    pub paused_remaining: Option<f64>,
}

/// An actor that executes processes: machine, work center or transport
/// vehicle. Owns its controller state (pending requests, running
/// activities) and the runtime side of its state machines.
#[derive(Debug, Clone)]
pub struct Resource {
    pub id: String,
    /// Declaration order; the deterministic tiebreak for routing.
    pub index: usize,
    pub capacity: u32,
    pub location: Location,
    pub input_location: Location,
    pub output_location: Location,
    pub controller: ControllerKind,
    pub policy: ControlPolicy,
    pub processes: Vec<ResourceProcess>,
    pub states: Vec<StateKey>,
    pub input_queues: Vec<QueueKey>,
    pub output_queues: Vec<QueueKey>,

    pub pending: Vec<Request>,
    pub running: Vec<Activity>,

    /// Current process configuration; changes freely unless a setup state
    /// covers the transition.
    pub current_setup: Option<ProcessKey>,
    pub active_setup: Option<SetupRun>,

    /// Breakdown states currently holding the whole resource down.
    pub down: Vec<StateKey>,
    /// Processes currently pinned by a process breakdown.
    pub process_down: Vec<ProcessKey>,

    /// Coalesces controller wakeups scheduled for the current instant.
    pub wake_scheduled: bool,
}

impl Resource {
    pub fn is_down(&self) -> bool {
        !self.down.is_empty()
    }

    pub fn is_process_down(&self, process: ProcessKey) -> bool {
        self.process_down.contains(&process)
    }

    pub fn in_setup(&self) -> bool {
        self.active_setup.is_some()
    }

    pub fn provides(&self, process: ProcessKey) -> bool {
        self.processes.iter().any(|p| p.process == process)
    }

    pub fn process_slot(&self, process: ProcessKey) -> Option<&ResourceProcess> {
        self.processes.iter().find(|p| p.process == process)
    }

    pub fn process_slot_mut(&mut self, process: ProcessKey) -> Option<&mut ResourceProcess> {
        self.processes.iter_mut().find(|p| p.process == process)
    }

    /// Whether another activity may start at all (capacity and composite
    /// state permitting; per-request checks happen in the controller).
    pub fn can_dispatch(&self) -> bool {
        !self.is_down() && !self.in_setup() && (self.running.len() as u32) < self.capacity
    }

    pub fn activity(&self, id: ActivityId) -> Option<&Activity> {
        self.running.iter().find(|a| a.id == id)
    }

    pub fn activity_mut(&mut self, id: ActivityId) -> Option<&mut Activity> {
        self.running.iter_mut().find(|a| a.id == id)
    }

    pub fn take_activity(&mut self, id: ActivityId) -> Option<Activity> {
        let idx = self.running.iter().position(|a| a.id == id)?;
        Some(self.running.remove(idx))
    }

    /// Whether switching to `target` needs a setup transition, given the
    /// declared setup states. Returns the matching state when it does.
    pub fn setup_needed<'a>(
        &self,
        target: ProcessKey,
        states: impl Iterator<Item = (StateKey, &'a crate::domain::state::StateSpec)>,
    ) -> Option<StateKey> {
        let current = self.current_setup?;
        if current == target {
            return None;
        }
        for (key, spec) in states {
            if let crate::domain::state::StateKind::Setup { origin, target: to, .. } = spec.kind
                && origin == current
                && to == target
            {
                return Some(key);
            }
        }
        None
    }
}
