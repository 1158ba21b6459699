use crate::domain::ids::{Location, QueueKey};

/// A typed tool (fixture, carrier, gauge) with a finite number of copies
/// spread over named storages. Activities of processes that depend on the
/// tool hold one copy for their duration and return it to the storage
/// nearest their resource.
#[derive(Debug, Clone)]
pub struct Auxiliary {
    pub id: String,
    /// (storage queue, copies currently available there).
    pub storages: Vec<(QueueKey, u32)>,
}

impl Auxiliary {
    pub fn total_available(&self) -> u32 {
        self.storages.iter().map(|(_, n)| *n).sum()
    }

    /// Takes one copy from the storage nearest to `at`. Returns the storage
    /// it came from, or `None` when every storage is empty.
    pub fn acquire_nearest(&mut self, at: Location, storage_location: impl Fn(QueueKey) -> Location) -> Option<QueueKey> {
        let mut best: Option<(usize, f64)> = None;
        for (i, (queue, available)) in self.storages.iter().enumerate() {
            if *available == 0 {
                continue;
            }
            let loc = storage_location(*queue);
            let dx = loc[0] - at[0];
            let dy = loc[1] - at[1];
            let dist = (dx * dx + dy * dy).sqrt();
            if best.is_none_or(|(_, b)| dist < b) {
                best = Some((i, dist));
            }
        }
        let (idx, _) = best?;
        self.storages[idx].1 -= 1;
        Some(self.storages[idx].0)
    }

    /// Returns one copy to the storage nearest to `at`.
    pub fn release_nearest(&mut self, at: Location, storage_location: impl Fn(QueueKey) -> Location) {
        let mut best: Option<(usize, f64)> = None;
        for (i, (queue, _)) in self.storages.iter().enumerate() {
            let loc = storage_location(*queue);
            let dx = loc[0] - at[0];
            let dy = loc[1] - at[1];
            let dist = (dx * dx + dy * dy).sqrt();
            if best.is_none_or(|(_, b)| dist < b) {
                best = Some((i, dist));
            }
        }
        if let Some((idx, _)) = best {
            self.storages[idx].1 += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_acquire_prefers_nearest_stocked_storage() {
        let mut queues: SlotMap<QueueKey, Location> = SlotMap::with_key();
        let near = queues.insert([1.0, 0.0]);
        let far = queues.insert([10.0, 0.0]);
        let mut aux = Auxiliary { id: "JIG".into(), storages: vec![(far, 2), (near, 1)] };

        let locate = |q: QueueKey| queues[q];
        assert_eq!(aux.acquire_nearest([0.0, 0.0], locate), Some(near));
        // Near storage now empty; the far one serves.
        assert_eq!(aux.acquire_nearest([0.0, 0.0], locate), Some(far));
        assert_eq!(aux.total_available(), 1);

        aux.release_nearest([0.0, 0.0], locate);
        assert_eq!(aux.storages.iter().find(|(q, _)| *q == near).unwrap().1, 1);
    }

    #[test]
    fn test_acquire_exhausted_returns_none() {
        let mut queues: SlotMap<QueueKey, Location> = SlotMap::with_key();
        let only = queues.insert([0.0, 0.0]);
        let mut aux = Auxiliary { id: "JIG".into(), storages: vec![(only, 0)] };
        assert_eq!(aux.acquire_nearest([0.0, 0.0], |q| queues[q]), None);
    }
}
