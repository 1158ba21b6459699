use std::collections::VecDeque;

use crate::domain::ids::{Location, ProductKey, QueueKey, TimeModelKey};
use crate::domain::router::RoutingPolicy;

/// Generates products of one type on an inter-arrival clock. The clock is
/// self-rearming: each tick draws the next gap from the source's time model.
/// When every output queue is full the freshly minted product is deferred
/// and placed as soon as a slot frees; the clock itself is never stretched.
#[derive(Debug, Clone)]
pub struct Source {
    pub id: String,
    pub index: usize,
    pub product_type: String,
    /// Index into the engine's product spec table for this type.
    pub spec: usize,
    pub location: Location,
    pub time_model: TimeModelKey,
    pub routing: RoutingPolicy,
    pub output_queues: Vec<QueueKey>,
    /// Minted but not yet placed (output queues were full).
    pub deferred: VecDeque<ProductKey>,
    /// Set when a one-shot schedule ran out of arrivals.
    pub exhausted: bool,
    pub retry_scheduled: bool,
}

/// Terminates products of one type.
#[derive(Debug, Clone)]
pub struct Sink {
    pub id: String,
    pub index: usize,
    pub product_type: String,
    pub location: Location,
    pub input_queues: Vec<QueueKey>,
    pub consumed: u64,
}
