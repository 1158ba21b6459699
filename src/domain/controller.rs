use crate::domain::ids::ProcessKey;
use crate::domain::resource::Request;

/// Controller flavor of a resource. Pipeline controllers sequence
/// stationary processing; transport controllers sequence pickup/delivery
/// trips and may use the distance-based policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerKind {
    Pipeline,
    Transport,
}

/// Sequencing policy: which of the currently executable requests runs next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlPolicy {
    Fifo,
    Lifo,
    Spt,
    SptTransport,
}

/// Inputs the policies need beyond the request list itself. Kept as
/// closures so selection stays a pure function over the pending pipeline
/// and is testable without an engine.
pub struct SelectionCtx<'a> {
    /// Mean duration of a process's time model (SPT).
    pub mean_duration: &'a dyn Fn(ProcessKey) -> f64,
    /// Empty-travel plus loaded-travel distance of a transport request
    /// (SPT_transport).
    pub trip_distance: &'a dyn Fn(&Request) -> f64,
}

/// Picks the index of the next request to dispatch among those marked
/// executable. Returns `None` when nothing is executable (the resource goes
/// to standby). The pending list is in arrival order, so FIFO is the first
/// executable entry and LIFO the last; SPT breaks ties FIFO by scanning in
/// arrival order with a strict `<`.
pub fn select_next(policy: ControlPolicy, pending: &[Request], executable: &[bool], ctx: &SelectionCtx) -> Option<usize> {
    debug_assert_eq!(pending.len(), executable.len());
    let mut candidates = pending.iter().enumerate().filter(|(i, _)| executable[*i]);

    match policy {
        ControlPolicy::Fifo => candidates.next().map(|(i, _)| i),
        ControlPolicy::Lifo => candidates.last().map(|(i, _)| i),
        ControlPolicy::Spt => {
            let mut best: Option<(usize, f64)> = None;
            for (i, req) in candidates {
                let mean = (ctx.mean_duration)(req.process);
                if best.is_none_or(|(_, b)| mean < b) {
                    best = Some((i, mean));
                }
            }
            best.map(|(i, _)| i)
        }
        ControlPolicy::SptTransport => {
            let mut best: Option<(usize, f64)> = None;
            for (i, req) in candidates {
                let dist = (ctx.trip_distance)(req);
                if best.is_none_or(|(_, b)| dist < b) {
                    best = Some((i, dist));
                }
            }
            best.map(|(i, _)| i)
        }
    }
}
