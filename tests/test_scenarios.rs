mod fixtures;

use prodsim::api::process_dto::ProcessDto;
use prodsim::api::auxiliary_dto::AuxiliaryDto;
use prodsim::domain::event_log::LogActivity;
use prodsim::Runner;

/// Single machine, single product type, transport in between: products flow
/// and the machine splits its time between producing and waiting.
#[test]
fn test_single_machine_line_produces() {
    let mut runner = Runner::initialize(fixtures::single_machine_line(0), None).unwrap();
    runner.run(60.0).unwrap();
    let kpis = runner.results();

    let finished = kpis.throughput.get("Widget").copied().unwrap_or(0);
    // Exponential(1.5) arrivals against a ~1.0 machine over 60 time units.
    assert!(finished > 10, "implausibly few products finished: {finished}");
    assert!(finished < 60, "more products finished than arrivals allow: {finished}");

    let m1 = &kpis.time_in_state["M1"];
    assert!(m1.productive > 0.0, "the machine never produced");
    assert!(m1.standby > 0.0, "an M/M/1-style line at this load must idle sometimes");
    assert!(kpis.total_wip > 0.0);
    assert!(kpis.throughput_time.get("Widget").copied().unwrap_or(0.0) > 1.0, "throughput time cannot beat the raw process time");
}

/// Deterministic failures: up 200, down 10, horizon 1000 puts the machine
/// into repair for exactly 40 time units.
#[test]
fn test_breakdowns_produce_expected_downtime() {
    let mut runner = Runner::initialize(fixtures::breakdown_line(0), None).unwrap();
    runner.run(1000.0).unwrap();
    let kpis = runner.results();

    let m1 = &kpis.time_in_state["M1"];
    assert!((m1.down - 40.0).abs() < 1e-6, "expected 4 repairs of 10 each, saw {} down time", m1.down);
    assert!((m1.total() - 1000.0).abs() < 1e-6);

    // Work keeps flowing around the outages.
    assert!(kpis.throughput["Widget"] > 900);
}

/// Under FIFO the alternating product mix forces a changeover for nearly
/// every activity; SPT collapses onto the short process and almost never
/// changes over.
#[test]
fn test_setup_time_fifo_versus_spt() {
    let mut fifo = Runner::initialize(fixtures::setup_work_center("FIFO", 0), None).unwrap();
    fifo.run(50.0).unwrap();
    let st_fifo = fifo.results().time_in_state["WC1"].setup;

    let mut spt = Runner::initialize(fixtures::setup_work_center("SPT", 0), None).unwrap();
    spt.run(50.0).unwrap();
    let st_spt = spt.results().time_in_state["WC1"].setup;

    assert!(st_fifo > 0.1 * 50.0, "FIFO changeovers should dominate: setup time was only {st_fifo}");
    assert!(st_spt < st_fifo, "SPT must spend less time in setup than FIFO ({st_spt} vs {st_fifo})");
}

/// Overloaded bounded buffers: the router keeps parking and re-offering
/// products without deadlocking, and both machines stay saturated.
#[test]
fn test_bounded_buffers_reroute_without_deadlock() {
    let mut runner = Runner::initialize(fixtures::bounded_parallel_machines(0), None).unwrap();
    runner.run(30.0).unwrap();
    let kpis = runner.results();

    // Two machines at 1.0 per part, saturated nearly the whole horizon.
    let finished = kpis.throughput["Widget"];
    assert!(finished >= 45, "parallel machines underproduced: {finished}");
    assert!(finished <= 60);

    let pr_a = kpis.time_in_state["MA"].productive;
    let pr_b = kpis.time_in_state["MB"].productive;
    assert!(pr_a > 25.0 && pr_b > 25.0, "both machines should be near-saturated (PR {pr_a} / {pr_b})");
}

/// All-zero process durations: the clock advances only through
/// inter-arrival times and every created product finishes immediately.
#[test]
fn test_zero_duration_processes_flow_through() {
    let mut dto = fixtures::single_machine_line(2);
    dto.time_model_data = vec![
        fixtures::function_model("arrivals", "exponential", 1.5, 0.0),
        fixtures::constant_model("milling", 0.0),
        fixtures::constant_model("moves", 0.0),
    ];
    let mut runner = Runner::initialize(dto, None).unwrap();
    let records = runner.run(30.0).unwrap();

    let created = records.iter().filter(|r| r.activity == LogActivity::CreatedProduct).count();
    let finished = records.iter().filter(|r| r.activity == LogActivity::FinishedProduct).count();
    assert!(created > 0);
    assert_eq!(created, finished, "with zero durations nothing may stay in flight");
}

/// Lot formation: three compatible requests run as one activity with one
/// duration draw, so the cell beats its single-part rate.
#[test]
fn test_lot_formation_batches_throughput() {
    let mut dto = fixtures::single_machine_line(0);
    dto.time_model_data = vec![
        fixtures::constant_model("arrivals", 0.2),
        fixtures::constant_model("milling", 1.0),
        fixtures::constant_model("moves", 0.0),
    ];
    dto.product_data = vec![fixtures::linear_product("Widget", &["P1"], None)];
    dto.resource_data.truncate(1);
    dto.process_data = vec![ProcessDto {
        lot_dependency: true,
        max_lot_size: Some(3),
        ..fixtures::production_process("P1", "milling")
    }];

    let mut runner = Runner::initialize(dto, None).unwrap();
    runner.run(20.0).unwrap();
    let finished = runner.results().throughput["Widget"];

    // One part per time unit without lots; with lots of 3 the cell clears
    // nearly three per unit once the backlog builds.
    assert!(finished > 25, "lot formation had no effect: {finished} finished");
    assert!(finished <= 60);
}

/// A single tool copy serializes a two-slot machine: effective concurrency
/// is one activity at a time.
#[test]
fn test_tool_dependency_limits_concurrency() {
    let mut dto = fixtures::single_machine_line(0);
    dto.time_model_data = vec![
        fixtures::constant_model("arrivals", 0.1),
        fixtures::constant_model("milling", 1.0),
        fixtures::constant_model("moves", 0.0),
    ];
    dto.product_data = vec![fixtures::linear_product("Widget", &["P1"], None)];
    dto.resource_data.truncate(1);
    dto.resource_data[0].capacity = 2;
    dto.queue_data.push(fixtures::queue("TOOL_CRIB", 0));
    dto.process_data = vec![ProcessDto {
        tool_dependencies: vec!["JIG".to_string()],
        ..fixtures::production_process("P1", "milling")
    }];
    dto.auxiliary_data = vec![AuxiliaryDto {
        id: "JIG".to_string(),
        description: String::new(),
        storages: vec!["TOOL_CRIB".to_string()],
        quantity_in_storages: vec![1],
        relevant_processes: vec![],
    }];

    let mut runner = Runner::initialize(dto, None).unwrap();
    runner.run(20.0).unwrap();
    let finished = runner.results().throughput["Widget"];

    assert!(finished >= 15, "the tool should still circulate: {finished}");
    assert!(finished <= 22, "a single jig cannot support two concurrent activities: {finished}");
}

/// A plan step naming a required capability matches any resource process
/// tagged with that capability, not a process id.
#[test]
fn test_required_capability_matches_tagged_process() {
    let mut dto = fixtures::empty_model("capability_matching", 0);
    dto.time_model_data = vec![
        fixtures::function_model("arrivals", "exponential", 1.5, 0.0),
        fixtures::constant_model("drilling_time", 2.0),
    ];
    dto.process_data = vec![
        fixtures::capability_process("CP_FAST", "drilling_time", "drilling"),
        fixtures::capability_process("CP_SLOW", "drilling_time", "drilling"),
        fixtures::required_capability("NEEDS_DRILL", "drilling"),
    ];
    dto.queue_data = vec![
        fixtures::queue("SOQ", 0),
        fixtures::queue("IQ_A", 0),
        fixtures::queue("OQ_A", 0),
        fixtures::queue("IQ_B", 0),
        fixtures::queue("OQ_B", 0),
        fixtures::queue("SIQ", 0),
    ];
    dto.resource_data = vec![
        fixtures::machine("MA", "FIFO", &["CP_FAST"], "IQ_A", "OQ_A"),
        fixtures::machine("MB", "FIFO", &["CP_SLOW"], "IQ_B", "OQ_B"),
    ];
    dto.product_data = vec![fixtures::linear_product("Widget", &["NEEDS_DRILL"], None)];
    dto.source_data = vec![fixtures::source("S1", "Widget", "arrivals", "shortest_queue", "SOQ")];
    dto.sink_data = vec![fixtures::sink("K1", "Widget", "SIQ")];

    let mut runner = Runner::initialize(dto, None).unwrap();
    runner.run(60.0).unwrap();
    let kpis = runner.results();

    assert!(kpis.throughput["Widget"] > 10, "capability routing produced nothing");
    // Both drill stations must have been matched through the tag.
    assert!(kpis.time_in_state["MA"].productive > 0.0);
    assert!(kpis.time_in_state["MB"].productive > 0.0);
}

/// A link transport process only carries moves along its declared pairs.
#[test]
fn test_link_transport_serves_declared_moves() {
    let mut dto = fixtures::empty_model("link_transport", 0);
    dto.time_model_data = vec![
        fixtures::function_model("arrivals", "exponential", 2.0, 0.0),
        fixtures::constant_model("work", 0.5),
        fixtures::constant_model("hop", 0.2),
    ];
    dto.process_data = vec![
        fixtures::production_process("P1", "work"),
        fixtures::link_transport_process("LT", "hop", &[("S1", "M1"), ("M1", "K1")]),
    ];
    dto.queue_data = vec![fixtures::queue("SOQ", 0), fixtures::queue("IQ", 0), fixtures::queue("OQ", 0), fixtures::queue("SIQ", 0)];
    dto.resource_data = vec![fixtures::machine("M1", "FIFO", &["P1"], "IQ", "OQ"), fixtures::transporter("TR1", "LT")];
    dto.product_data = vec![fixtures::linear_product("Widget", &["P1"], Some("LT"))];
    dto.source_data = vec![fixtures::source("S1", "Widget", "arrivals", "random", "SOQ")];
    dto.sink_data = vec![fixtures::sink("K1", "Widget", "SIQ")];

    let mut runner = Runner::initialize(dto, None).unwrap();
    runner.run(60.0).unwrap();
    let kpis = runner.results();

    assert!(kpis.throughput["Widget"] > 10, "link transport should carry the declared moves");
    assert!(kpis.time_in_state["TR1"].productive > 0.0);
}

/// A process-specific breakdown pins only the matching process; the other
/// process on the same resource keeps running.
#[test]
fn test_process_breakdown_blocks_only_matching_process() {
    let mut dto = fixtures::empty_model("process_breakdown", 0);
    dto.time_model_data = vec![
        fixtures::constant_model("arrivals_a", 1.0),
        fixtures::constant_model("arrivals_b", 1.0),
        fixtures::constant_model("work", 0.4),
        fixtures::constant_model("pb_ttf", 50.0),
        fixtures::constant_model("pb_repair", 25.0),
    ];
    dto.process_data = vec![fixtures::production_process("PA", "work"), fixtures::production_process("PB", "work")];
    dto.state_data = vec![fixtures::process_breakdown_state("PBD", "pb_ttf", "pb_repair", "PA")];
    dto.queue_data = vec![
        fixtures::queue("SOQ_A", 0),
        fixtures::queue("SOQ_B", 0),
        fixtures::queue("IQ", 0),
        fixtures::queue("OQ", 0),
        fixtures::queue("SIQ_A", 0),
        fixtures::queue("SIQ_B", 0),
    ];
    let mut wc = fixtures::machine("WC1", "FIFO", &["PA", "PB"], "IQ", "OQ");
    wc.capacity = 2;
    wc.state_ids = vec!["PBD".to_string()];
    dto.resource_data = vec![wc];
    dto.product_data = vec![fixtures::linear_product("part_a", &["PA"], None), fixtures::linear_product("part_b", &["PB"], None)];
    dto.source_data = vec![
        fixtures::source("SA", "part_a", "arrivals_a", "FIFO", "SOQ_A"),
        fixtures::source("SB", "part_b", "arrivals_b", "FIFO", "SOQ_B"),
    ];
    dto.sink_data = vec![fixtures::sink("KA", "part_a", "SIQ_A"), fixtures::sink("KB", "part_b", "SIQ_B")];

    let mut runner = Runner::initialize(dto, None).unwrap();
    runner.run(150.0).unwrap();
    let kpis = runner.results();

    // Up 50, down 25: a third of the horizon blocks PA.
    let (finished_a, finished_b) = (kpis.throughput["part_a"], kpis.throughput["part_b"]);
    assert!(finished_b > 140, "the unaffected process must keep its full rate: {finished_b}");
    assert!(finished_a > 90, "the pinned process still runs while the machine is up: {finished_a}");
    assert!(finished_a < finished_b, "the pinned process cannot outproduce the free one ({finished_a} vs {finished_b})");
}

/// Precedence-graph plans execute each node after its predecessors.
#[test]
fn test_dag_plan_runs_all_nodes_in_order() {
    let mut dto = fixtures::single_machine_line(1);
    dto.time_model_data.push(fixtures::constant_model("finishing", 0.2));
    dto.process_data.push(fixtures::production_process("P2", "finishing"));
    dto.process_data.push(fixtures::production_process("P3", "finishing"));
    dto.resource_data[0].process_ids = vec!["P1".to_string(), "P2".to_string(), "P3".to_string()];
    // P1 and P2 both gate P3.
    dto.product_data = vec![fixtures::dag_product("Widget", &[("P1", &["P3"]), ("P2", &["P3"]), ("P3", &[])], Some("TP"))];

    let mut runner = Runner::initialize(dto, None).unwrap();
    let records = runner.run(80.0).unwrap();

    assert!(!records.is_empty());

    // For every product reaching the join step, P3 must start only after
    // both P1 and P2 ended.
    let mut last_p1_end: std::collections::HashMap<String, f64> = Default::default();
    let mut last_p2_end: std::collections::HashMap<String, f64> = Default::default();
    let mut checked = 0;
    let rows = runner.event_log();
    for row in &rows {
        if row.activity == "end state" && row.state == "P1" {
            last_p1_end.insert(row.product.clone(), row.time);
        }
        if row.activity == "end state" && row.state == "P2" {
            last_p2_end.insert(row.product.clone(), row.time);
        }
        if row.activity == "start state" && row.state == "P3" {
            let p1 = last_p1_end.get(&row.product).copied();
            let p2 = last_p2_end.get(&row.product).copied();
            assert!(p1.is_some() && p2.is_some(), "P3 started before both predecessors ended for {}", row.product);
            assert!(row.time >= p1.unwrap() && row.time >= p2.unwrap());
            checked += 1;
        }
    }
    assert!(checked > 0, "no product reached the join step");
}
