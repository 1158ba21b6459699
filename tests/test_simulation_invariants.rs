mod fixtures;

use prodsim::domain::event_log::LogActivity;
use prodsim::Runner;

/// Two runs with identical configuration and seed must be bit-identical.
#[test]
fn test_identical_seeds_replay_identically() {
    let mut first = Runner::initialize(fixtures::single_machine_line(7), None).unwrap();
    let mut second = Runner::initialize(fixtures::single_machine_line(7), None).unwrap();
    first.run(120.0).unwrap();
    second.run(120.0).unwrap();

    assert_eq!(first.event_log(), second.event_log(), "event logs diverged between identical runs");

    let (a, b) = (first.results(), second.results());
    assert_eq!(a.throughput, b.throughput);
    assert_eq!(format!("{:?}", a.time_in_state), format!("{:?}", b.time_in_state));
}

#[test]
fn test_different_seeds_diverge() {
    let mut first = Runner::initialize(fixtures::single_machine_line(0), None).unwrap();
    let mut second = Runner::initialize(fixtures::single_machine_line(1), None).unwrap();
    first.run(120.0).unwrap();
    second.run(120.0).unwrap();
    assert_ne!(first.event_log(), second.event_log(), "different seeds should explore different sample paths");
}

#[test]
fn test_seed_override_beats_configuration_seed() {
    let mut from_config = Runner::initialize(fixtures::single_machine_line(3), None).unwrap();
    let mut overridden = Runner::initialize(fixtures::single_machine_line(999), Some(3)).unwrap();
    from_config.run(60.0).unwrap();
    overridden.run(60.0).unwrap();
    assert_eq!(from_config.event_log(), overridden.event_log());
}

/// Event-log times never decrease, across a sweep of seeds.
#[test]
fn test_log_times_are_monotone() {
    for seed in 0..8 {
        let mut runner = Runner::initialize(fixtures::single_machine_line(seed), None).unwrap();
        let records = runner.run(90.0).unwrap();
        let mut last = 0.0_f64;
        for record in records {
            assert!(record.time >= last, "seed {seed}: log time went backwards ({} after {last})", record.time);
            last = record.time;
        }
    }
}

/// Outstanding reservations equal the summed reserved slots of every queue
/// at the end of a run, across a sweep of seeds.
#[test]
fn test_reservation_conservation() {
    for seed in 0..8 {
        let mut runner = Runner::initialize(fixtures::single_machine_line(seed), None).unwrap();
        runner.run(90.0).unwrap();
        let engine = runner.engine();
        assert_eq!(
            engine.total_reserved(),
            engine.active_reservations,
            "seed {seed}: reservation ledger and queue slots disagree"
        );
    }
}

/// PR + SB + ST + UD partitions the horizon for every resource.
#[test]
fn test_time_in_state_partitions_horizon() {
    for seed in 0..8 {
        let mut runner = Runner::initialize(fixtures::single_machine_line(seed), None).unwrap();
        runner.run(90.0).unwrap();
        let kpis = runner.results();
        for (resource, times) in &kpis.time_in_state {
            assert!(
                (times.total() - 90.0).abs() < 1e-6,
                "seed {seed}: state times of {resource} sum to {} instead of the horizon",
                times.total()
            );
        }
    }
}

/// Bounded queues never exceed occupancy + reserved = capacity.
#[test]
fn test_bounded_queues_respect_capacity() {
    for seed in 0..8 {
        let mut runner = Runner::initialize(fixtures::bounded_parallel_machines(seed), None).unwrap();
        runner.run(30.0).unwrap();
        for store in runner.engine().stores.values() {
            if store.capacity > 0 {
                assert!(
                    store.occupancy() + store.reserved() <= store.capacity,
                    "seed {seed}: queue '{}' holds {} + {} over capacity {}",
                    store.id,
                    store.occupancy(),
                    store.reserved(),
                    store.capacity
                );
            }
        }
    }
}

/// Every product that finished was created first, and the per-product
/// lifecycle shows up exactly once in the log.
#[test]
fn test_product_lifecycle_is_consistent() {
    let mut runner = Runner::initialize(fixtures::single_machine_line(5), None).unwrap();
    let records = runner.run(120.0).unwrap();

    let mut created = std::collections::HashSet::new();
    let mut finished = std::collections::HashSet::new();
    for record in records {
        match record.activity {
            LogActivity::CreatedProduct => {
                assert!(created.insert(record.product.unwrap()), "product created twice");
            }
            LogActivity::FinishedProduct => {
                let serial = record.product.unwrap();
                assert!(created.contains(&serial), "product finished before creation");
                assert!(finished.insert(serial), "product finished twice");
            }
            _ => {}
        }
    }
    assert!(finished.len() <= created.len());
    assert!(!created.is_empty(), "no products were created at all");
}

/// The base configuration fixture runs clean end to end.
#[test]
fn test_base_configuration_runs() {
    let mut runner = Runner::from_path("data/base_configuration.json", Some(24)).unwrap();
    runner.run(200.0).unwrap();
    let kpis = runner.results();

    assert!(kpis.throughput.get("Product_1").copied().unwrap_or(0) > 0, "no Product_1 finished");
    assert!(kpis.throughput.get("Product_2").copied().unwrap_or(0) > 0, "no Product_2 finished");
    for times in kpis.time_in_state.values() {
        assert!((times.total() - 200.0).abs() < 1e-6);
    }

    let engine = runner.engine();
    assert_eq!(engine.total_reserved(), engine.active_reservations);
}

/// A runner is single-shot.
#[test]
fn test_runner_refuses_second_run() {
    let mut runner = Runner::initialize(fixtures::single_machine_line(0), None).unwrap();
    runner.run(10.0).unwrap();
    assert!(runner.run(20.0).is_err());
}
