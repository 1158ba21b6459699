use slotmap::new_key_type;

new_key_type! {
    pub struct TimeModelKey;
    pub struct ProcessKey;
    pub struct StateKey;
    pub struct QueueKey;
    pub struct NodeKey;
    pub struct ResourceKey;
    pub struct ProductKey;
    pub struct SourceKey;
    pub struct SinkKey;
    pub struct AuxiliaryKey;
}

/// Planar position of a resource, queue, source or sink.
pub type Location = [f64; 2];

/// A promise of one queue slot, owned by exactly one request. Monotone per
/// run; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReservationId(pub u64);

/// An order for one process step on one product at one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

/// One dispatched activity on a resource (a lot counts as one activity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActivityId(pub u64);

/// Stable serial of a product, kept valid after the product itself is
/// destroyed at a sink (the event log refers to products by serial).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProductSerial(pub u64);

/// Any entity that can own a queue or be the endpoint of a transport link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    Resource(ResourceKey),
    Source(SourceKey),
    Sink(SinkKey),
    Node(NodeKey),
}
