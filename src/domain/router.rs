use rand::Rng;
use rand_pcg::Pcg64;

use crate::domain::ids::{ProcessKey, QueueKey, ResourceKey};

/// System-wide routing policy. Each product inherits the policy of its
/// source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingPolicy {
    Random,
    ShortestQueue,
    Fifo,
}

/// One feasible target for a product's next required process: the resource,
/// the specific process that matched (relevant for capability matches), and
/// the input queue a slot can be reserved on.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub resource: ResourceKey,
    pub process: ProcessKey,
    pub queue: QueueKey,
    /// `occupancy + reserved` of the input queue at decision time.
    pub load: usize,
    /// Declaration order of the resource; ties and FIFO order use it.
    pub index: usize,
}

/// Picks among feasible candidates. The candidate list is already filtered
/// (no full targets reach this point, per the deadlock-avoidance contract).
pub fn choose(policy: RoutingPolicy, candidates: &[Candidate], rng: &mut Pcg64) -> Option<usize> {
    if candidates.is_empty() {
        return None;
    }
    match policy {
        RoutingPolicy::Random => Some(rng.random_range(0..candidates.len())),
        RoutingPolicy::ShortestQueue => {
            let mut best = 0usize;
            for (i, c) in candidates.iter().enumerate().skip(1) {
                let b = &candidates[best];
                if c.load < b.load || (c.load == b.load && c.index < b.index) {
                    best = i;
                }
            }
            Some(best)
        }
        RoutingPolicy::Fifo => {
            let mut best = 0usize;
            for (i, c) in candidates.iter().enumerate().skip(1) {
                if c.index < candidates[best].index {
                    best = i;
                }
            }
            Some(best)
        }
    }
}
