use crate::domain::ids::{ActivityId, ResourceKey, SourceKey, StateKey};

/// The closed set of wakeups the driver dispatches on. Every suspended
/// activity is represented by one of these variants plus the state stored on
/// its resource; there are no coroutines and no threads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimEvent {
    /// A source's inter-arrival clock fired: mint a product, place it, route
    /// its first step, rearm the clock.
    SourceTick(SourceKey),
    /// One of the source's output queues freed a slot; place deferred
    /// products.
    SourceRetry(SourceKey),
    /// Re-offer the products parked on the router wait list.
    RouterWake,
    /// Re-evaluate the pending requests of one resource.
    ControllerWake(ResourceKey),
    /// A setup transition finished; the resource switches configuration.
    SetupEnd { resource: ResourceKey },
    /// A transport resource reached the product it is fetching.
    TransportPickup { resource: ResourceKey, activity: ActivityId },
    /// A production or transport activity ran to completion.
    ActivityEnd { resource: ResourceKey, activity: ActivityId },
    /// A breakdown state machine trips: the resource (or one process) goes
    /// down and running work is paused.
    BreakdownBegin { resource: ResourceKey, state: StateKey },
    /// The matching repair finished: resume paused work, rearm the machine.
    RepairEnd { resource: ResourceKey, state: StateKey },
}
