#![allow(dead_code)]

//! DTO builders shared by the integration suites. Each scenario is a small
//! factory description assembled from these helpers.

use std::collections::BTreeMap;

use prodsim::api::process_dto::ProcessDto;
use prodsim::api::product_dto::{ProcessPlanDto, ProductDto};
use prodsim::api::queue_dto::QueueDto;
use prodsim::api::resource_dto::ResourceDto;
use prodsim::api::source_sink_dto::{SinkDto, SourceDto};
use prodsim::api::state_dto::StateDto;
use prodsim::api::system_model_dto::SystemModelDto;
use prodsim::api::time_model_dto::{FunctionTimeModelDto, TimeModelDto};

pub fn function_model(id: &str, distribution: &str, location: f64, scale: f64) -> TimeModelDto {
    TimeModelDto::Function(FunctionTimeModelDto {
        id: id.to_string(),
        description: String::new(),
        distribution_function: distribution.to_string(),
        location,
        scale,
        batch_size: 100,
    })
}

pub fn constant_model(id: &str, duration: f64) -> TimeModelDto {
    function_model(id, "constant", duration, 0.0)
}

pub fn queue(id: &str, capacity: i64) -> QueueDto {
    QueueDto { id: id.to_string(), description: String::new(), capacity }
}

pub fn production_process(id: &str, time_model: &str) -> ProcessDto {
    ProcessDto {
        id: id.to_string(),
        description: String::new(),
        kind: "ProductionProcesses".to_string(),
        time_model_id: Some(time_model.to_string()),
        capability: None,
        lot_dependency: false,
        max_lot_size: None,
        tool_dependencies: vec![],
        links: vec![],
    }
}

pub fn transport_process(id: &str, time_model: &str) -> ProcessDto {
    ProcessDto { kind: "TransportProcesses".to_string(), ..production_process(id, time_model) }
}

pub fn capability_process(id: &str, time_model: &str, capability: &str) -> ProcessDto {
    ProcessDto {
        kind: "CapabilityProcess".to_string(),
        capability: Some(capability.to_string()),
        ..production_process(id, time_model)
    }
}

pub fn required_capability(id: &str, capability: &str) -> ProcessDto {
    ProcessDto {
        kind: "RequiredCapabilityProcess".to_string(),
        time_model_id: None,
        capability: Some(capability.to_string()),
        ..production_process(id, "unused")
    }
}

pub fn link_transport_process(id: &str, time_model: &str, links: &[(&str, &str)]) -> ProcessDto {
    ProcessDto {
        kind: "LinkTransportProcess".to_string(),
        links: links.iter().map(|(a, b)| [a.to_string(), b.to_string()]).collect(),
        ..production_process(id, time_model)
    }
}

pub fn process_breakdown_state(id: &str, ttf_model: &str, repair_model: &str, process: &str) -> StateDto {
    StateDto {
        id: id.to_string(),
        description: String::new(),
        kind: "ProcessBreakDownState".to_string(),
        time_model_id: ttf_model.to_string(),
        repair_time_model_id: Some(repair_model.to_string()),
        process_id: Some(process.to_string()),
        origin_setup: None,
        target_setup: None,
    }
}

pub fn breakdown_state(id: &str, ttf_model: &str, repair_model: &str) -> StateDto {
    StateDto {
        id: id.to_string(),
        description: String::new(),
        kind: "BreakDownState".to_string(),
        time_model_id: ttf_model.to_string(),
        repair_time_model_id: Some(repair_model.to_string()),
        process_id: None,
        origin_setup: None,
        target_setup: None,
    }
}

pub fn setup_state(id: &str, time_model: &str, origin: &str, target: &str) -> StateDto {
    StateDto {
        id: id.to_string(),
        description: String::new(),
        kind: "SetupState".to_string(),
        time_model_id: time_model.to_string(),
        repair_time_model_id: None,
        process_id: None,
        origin_setup: Some(origin.to_string()),
        target_setup: Some(target.to_string()),
    }
}

pub fn machine(id: &str, policy: &str, processes: &[&str], input: &str, output: &str) -> ResourceDto {
    ResourceDto {
        id: id.to_string(),
        description: String::new(),
        capacity: 1,
        location: [5.0, 0.0],
        input_location: None,
        output_location: None,
        controller: "PipelineController".to_string(),
        control_policy: policy.to_string(),
        process_ids: processes.iter().map(|p| p.to_string()).collect(),
        process_capacities: vec![],
        state_ids: vec![],
        input_queues: vec![input.to_string()],
        output_queues: vec![output.to_string()],
    }
}

pub fn transporter(id: &str, process: &str) -> ResourceDto {
    ResourceDto {
        id: id.to_string(),
        description: String::new(),
        capacity: 1,
        location: [0.0, 0.0],
        input_location: None,
        output_location: None,
        controller: "TransportController".to_string(),
        control_policy: "SPT_transport".to_string(),
        process_ids: vec![process.to_string()],
        process_capacities: vec![],
        state_ids: vec![],
        input_queues: vec![],
        output_queues: vec![],
    }
}

pub fn linear_product(id: &str, steps: &[&str], transport: Option<&str>) -> ProductDto {
    ProductDto {
        id: id.to_string(),
        description: String::new(),
        processes: ProcessPlanDto::List(steps.iter().map(|p| p.to_string()).collect()),
        transport_process: transport.map(|t| t.to_string()),
    }
}

pub fn dag_product(id: &str, adjacency: &[(&str, &[&str])], transport: Option<&str>) -> ProductDto {
    let mut graph = BTreeMap::new();
    for (node, successors) in adjacency {
        graph.insert(node.to_string(), successors.iter().map(|s| s.to_string()).collect());
    }
    ProductDto {
        id: id.to_string(),
        description: String::new(),
        processes: ProcessPlanDto::Precedence(graph),
        transport_process: transport.map(|t| t.to_string()),
    }
}

pub fn source(id: &str, product_type: &str, time_model: &str, heuristic: &str, output: &str) -> SourceDto {
    SourceDto {
        id: id.to_string(),
        description: String::new(),
        location: [0.0, 0.0],
        product_type: product_type.to_string(),
        time_model_id: time_model.to_string(),
        routing_heuristic: heuristic.to_string(),
        output_queues: vec![output.to_string()],
    }
}

pub fn sink(id: &str, product_type: &str, input: &str) -> SinkDto {
    SinkDto {
        id: id.to_string(),
        description: String::new(),
        location: [15.0, 0.0],
        product_type: product_type.to_string(),
        input_queues: vec![input.to_string()],
    }
}

pub fn empty_model(id: &str, seed: u64) -> SystemModelDto {
    SystemModelDto {
        id: id.to_string(),
        seed,
        time_model_data: vec![],
        state_data: vec![],
        process_data: vec![],
        queue_data: vec![],
        node_data: vec![],
        resource_data: vec![],
        product_data: vec![],
        sink_data: vec![],
        source_data: vec![],
        auxiliary_data: vec![],
        scenario_data: None,
        valid_configuration: true,
        reconfiguration_cost: 0.0,
    }
}

/// One source, one machine, one transport vehicle, one sink. The classic
/// smallest line.
pub fn single_machine_line(seed: u64) -> SystemModelDto {
    let mut dto = empty_model("single_machine_line", seed);
    dto.time_model_data = vec![
        function_model("arrivals", "exponential", 1.5, 0.0),
        function_model("milling", "normal", 1.0, 0.1),
        function_model("moves", "normal", 0.3, 0.2),
    ];
    dto.process_data = vec![production_process("P1", "milling"), transport_process("TP", "moves")];
    dto.queue_data = vec![queue("SOQ", 0), queue("IQ", 0), queue("OQ", 0), queue("SIQ", 0)];
    dto.resource_data = vec![machine("M1", "FIFO", &["P1"], "IQ", "OQ"), transporter("TR1", "TP")];
    dto.product_data = vec![linear_product("Widget", &["P1"], Some("TP"))];
    dto.source_data = vec![source("S1", "Widget", "arrivals", "random", "SOQ")];
    dto.sink_data = vec![sink("K1", "Widget", "SIQ")];
    dto
}

/// A work center with two processes and directed setups between them, fed
/// by one source per product type. `policy` decides the sequencing.
pub fn setup_work_center(policy: &str, seed: u64) -> SystemModelDto {
    let mut dto = empty_model("setup_work_center", seed);
    dto.time_model_data = vec![
        constant_model("arrivals_a", 0.1),
        constant_model("arrivals_b", 0.1),
        constant_model("work_a", 0.2),
        constant_model("work_b", 0.4),
        constant_model("changeover_ab", 0.2),
        constant_model("changeover_ba", 0.3),
    ];
    dto.process_data = vec![production_process("PA", "work_a"), production_process("PB", "work_b")];
    dto.state_data = vec![
        setup_state("ST_AB", "changeover_ab", "PA", "PB"),
        setup_state("ST_BA", "changeover_ba", "PB", "PA"),
    ];
    dto.queue_data = vec![queue("SOQ_A", 0), queue("SOQ_B", 0), queue("IQ", 0), queue("OQ", 0), queue("SIQ_A", 0), queue("SIQ_B", 0)];
    let mut wc = machine("WC1", policy, &["PA", "PB"], "IQ", "OQ");
    wc.state_ids = vec!["ST_AB".to_string(), "ST_BA".to_string()];
    dto.resource_data = vec![wc];
    dto.product_data = vec![linear_product("housing_a", &["PA"], None), linear_product("housing_b", &["PB"], None)];
    dto.source_data = vec![
        source("SA", "housing_a", "arrivals_a", "FIFO", "SOQ_A"),
        source("SB", "housing_b", "arrivals_b", "FIFO", "SOQ_B"),
    ];
    dto.sink_data = vec![sink("KA", "housing_a", "SIQ_A"), sink("KB", "housing_b", "SIQ_B")];
    dto
}

/// One machine with deterministic failures: down for 10 time units after
/// every 200 up.
pub fn breakdown_line(seed: u64) -> SystemModelDto {
    let mut dto = empty_model("breakdown_line", seed);
    dto.time_model_data = vec![
        constant_model("arrivals", 1.0),
        constant_model("work", 0.5),
        constant_model("failures", 200.0),
        constant_model("repairs", 10.0),
    ];
    dto.process_data = vec![production_process("P1", "work")];
    dto.state_data = vec![breakdown_state("BS1", "failures", "repairs")];
    dto.queue_data = vec![queue("SOQ", 0), queue("IQ", 0), queue("OQ", 0), queue("SIQ", 0)];
    let mut m1 = machine("M1", "FIFO", &["P1"], "IQ", "OQ");
    m1.state_ids = vec!["BS1".to_string()];
    dto.resource_data = vec![m1];
    dto.product_data = vec![linear_product("Widget", &["P1"], None)];
    dto.source_data = vec![source("S1", "Widget", "arrivals", "random", "SOQ")];
    dto.sink_data = vec![sink("K1", "Widget", "SIQ")];
    dto
}

/// Two parallel machines with tightly bounded input buffers behind an
/// overloading source; routing must keep re-offering without deadlock.
pub fn bounded_parallel_machines(seed: u64) -> SystemModelDto {
    let mut dto = empty_model("bounded_parallel_machines", seed);
    dto.time_model_data = vec![constant_model("arrivals", 0.25), constant_model("work", 1.0)];
    dto.process_data = vec![production_process("P1", "work")];
    dto.queue_data = vec![queue("SOQ", 0), queue("IQ_A", 2), queue("IQ_B", 2), queue("OQ_A", 0), queue("OQ_B", 0), queue("SIQ", 0)];
    dto.resource_data = vec![
        machine("MA", "FIFO", &["P1"], "IQ_A", "OQ_A"),
        machine("MB", "FIFO", &["P1"], "IQ_B", "OQ_B"),
    ];
    dto.product_data = vec![linear_product("Widget", &["P1"], None)];
    dto.source_data = vec![source("S1", "Widget", "arrivals", "shortest_queue", "SOQ")];
    dto.sink_data = vec![sink("K1", "Widget", "SIQ")];
    dto
}
