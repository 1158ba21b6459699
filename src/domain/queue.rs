use std::collections::VecDeque;

use crate::domain::ids::{EntityRef, Location, ProductKey, ReservationId};

/// Outcome of a reservation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved,
    Full,
}

/// A bounded buffer of product handles with reservation slots.
///
/// Two counters guard admission: `occupancy` (products physically held) and
/// the number of outstanding reservations (slots promised to in-flight
/// requests). `occupancy + reserved` never exceeds the capacity; capacity 0
/// means unbounded. Reservations survive across event steps and are released
/// on commit, cancellation or re-route.
#[derive(Debug, Clone)]
pub struct Store {
    pub id: String,
    pub capacity: usize,
    /// Physical position of the queue, inherited from its owner at build
    /// time. Transport legs measure distances against this.
    pub location: Location,
    /// The source, resource or sink this queue belongs to.
    pub owner: Option<EntityRef>,
    items: VecDeque<ProductKey>,
    reservations: Vec<ReservationId>,
}

impl Store {
    pub fn new(id: String, capacity: usize) -> Self {
        Store {
            id,
            capacity,
            location: [0.0, 0.0],
            owner: None,
            items: VecDeque::new(),
            reservations: Vec::new(),
        }
    }

    pub fn occupancy(&self) -> usize {
        self.items.len()
    }

    pub fn reserved(&self) -> usize {
        self.reservations.len()
    }

    /// Load counted by the `shortest_queue` routing policy.
    pub fn load(&self) -> usize {
        self.occupancy() + self.reserved()
    }

    pub fn has_space(&self) -> bool {
        self.capacity == 0 || self.load() < self.capacity
    }

    /// Promises one slot to `rid`.
    pub fn reserve(&mut self, rid: ReservationId) -> ReserveOutcome {
        if !self.has_space() {
            return ReserveOutcome::Full;
        }
        self.reservations.push(rid);
        ReserveOutcome::Reserved
    }

    pub fn holds_reservation(&self, rid: ReservationId) -> bool {
        self.reservations.contains(&rid)
    }

    /// Atomically turns the promised slot into an occupied one. Fails when
    /// the reservation is unknown; the caller escalates that to a fatal
    /// invariant error.
    pub fn commit(&mut self, rid: ReservationId, product: ProductKey) -> Result<(), ReservationId> {
        let idx = self.reservations.iter().position(|r| *r == rid).ok_or(rid)?;
        self.reservations.swap_remove(idx);
        self.items.push_back(product);
        Ok(())
    }

    /// Cancels a promised slot.
    pub fn release(&mut self, rid: ReservationId) -> Result<(), ReservationId> {
        let idx = self.reservations.iter().position(|r| *r == rid).ok_or(rid)?;
        self.reservations.swap_remove(idx);
        Ok(())
    }

    /// Direct put without a prior reservation (sources filling their output
    /// queue). Fails when full.
    pub fn put(&mut self, product: ProductKey) -> Result<(), ()> {
        if !self.has_space() {
            return Err(());
        }
        self.items.push_back(product);
        Ok(())
    }

    /// Removes a specific product (controllers lift items out of FIFO order;
    /// the sequencing policy, not the queue, decides who leaves next).
    pub fn take(&mut self, product: ProductKey) -> bool {
        if let Some(idx) = self.items.iter().position(|p| *p == product) {
            self.items.remove(idx);
            true
        } else {
            false
        }
    }

    pub fn pop_front(&mut self) -> Option<ProductKey> {
        self.items.pop_front()
    }

    pub fn contains(&self, product: ProductKey) -> bool {
        self.items.contains(&product)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProductKey> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn products(n: usize) -> Vec<ProductKey> {
        let mut arena: SlotMap<ProductKey, ()> = SlotMap::with_key();
        (0..n).map(|_| arena.insert(())).collect()
    }

    #[test]
    fn test_capacity_bounds_occupancy_plus_reserved() {
        let p = products(3);
        let mut q = Store::new("Q1".into(), 2);

        assert_eq!(q.reserve(ReservationId(1)), ReserveOutcome::Reserved);
        assert!(q.put(p[0]).is_ok());
        assert_eq!(q.reserve(ReservationId(2)), ReserveOutcome::Full);
        assert!(q.put(p[1]).is_err());

        q.commit(ReservationId(1), p[1]).unwrap();
        assert_eq!(q.occupancy(), 2);
        assert_eq!(q.reserved(), 0);
        assert_eq!(q.reserve(ReservationId(3)), ReserveOutcome::Full);
    }

    #[test]
    fn test_zero_capacity_is_unbounded() {
        let p = products(100);
        let mut q = Store::new("Q".into(), 0);
        for (i, key) in p.iter().enumerate() {
            assert_eq!(q.reserve(ReservationId(i as u64)), ReserveOutcome::Reserved);
            assert!(q.put(*key).is_ok());
        }
        assert_eq!(q.occupancy(), 100);
        assert_eq!(q.reserved(), 100);
    }

    #[test]
    fn test_release_frees_the_slot() {
        let p = products(1);
        let mut q = Store::new("Q".into(), 1);
        q.reserve(ReservationId(7));
        assert!(q.put(p[0]).is_err());
        q.release(ReservationId(7)).unwrap();
        assert!(q.put(p[0]).is_ok());
    }

    #[test]
    fn test_unknown_reservation_is_an_error() {
        let p = products(1);
        let mut q = Store::new("Q".into(), 4);
        assert_eq!(q.commit(ReservationId(9), p[0]), Err(ReservationId(9)));
        assert_eq!(q.release(ReservationId(9)), Err(ReservationId(9)));
    }

    #[test]
    fn test_take_removes_out_of_order() {
        let p = products(3);
        let mut q = Store::new("Q".into(), 0);
        for key in &p {
            q.put(*key).unwrap();
        }
        assert!(q.take(p[1]));
        assert!(!q.take(p[1]));
        assert_eq!(q.pop_front(), Some(p[0]));
        assert_eq!(q.pop_front(), Some(p[2]));
    }
}
