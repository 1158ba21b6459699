use std::collections::{HashMap, HashSet};

use crate::api::process_dto::ProcessDto;
use crate::api::product_dto::{ProcessPlanDto, ProductDto};
use crate::api::system_model_dto::SystemModelDto;
use crate::api::time_model_dto::TimeModelDto;
use crate::error::{Error, Result};

const DISTRIBUTIONS: [&str; 4] = ["constant", "normal", "lognormal", "exponential"];
const METRICS: [&str; 2] = ["manhattan", "euclidean"];
const STATE_TYPES: [&str; 3] = ["BreakDownState", "ProcessBreakDownState", "SetupState"];
const PROCESS_TYPES: [&str; 5] = [
    "ProductionProcesses",
    "TransportProcesses",
    "CapabilityProcess",
    "RequiredCapabilityProcess",
    "LinkTransportProcess",
];
const CONTROLLERS: [&str; 2] = ["PipelineController", "TransportController"];
const CONTROL_POLICIES: [&str; 4] = ["FIFO", "LIFO", "SPT", "SPT_transport"];
const ROUTING_HEURISTICS: [&str; 3] = ["random", "shortest_queue", "FIFO"];

/// Checks a parsed configuration for semantic consistency before anything
/// is built: unique ids, resolvable references, known enum values, sane
/// capacities, reachable processes and acyclic plans. The first violation
/// is returned with the offending record's kind and id.
pub fn validate(dto: &SystemModelDto) -> Result<()> {
    let time_models = unique_ids("time_model_data", dto.time_model_data.iter().map(|m| m.id()))?;
    let states = unique_ids("state_data", dto.state_data.iter().map(|s| s.id.as_str()))?;
    let processes = unique_ids("process_data", dto.process_data.iter().map(|p| p.id.as_str()))?;
    let queues = unique_ids("queue_data", dto.queue_data.iter().map(|q| q.id.as_str()))?;
    let nodes = unique_ids("node_data", dto.node_data.iter().map(|n| n.id.as_str()))?;
    let resources = unique_ids("resource_data", dto.resource_data.iter().map(|r| r.id.as_str()))?;
    let products = unique_ids("product_data", dto.product_data.iter().map(|p| p.id.as_str()))?;
    let sinks = unique_ids("sink_data", dto.sink_data.iter().map(|s| s.id.as_str()))?;
    let sources = unique_ids("source_data", dto.source_data.iter().map(|s| s.id.as_str()))?;
    let auxiliaries = unique_ids("auxiliary_data", dto.auxiliary_data.iter().map(|a| a.id.as_str()))?;

    for model in &dto.time_model_data {
        validate_time_model(model)?;
    }

    for state in &dto.state_data {
        let id = state.id.as_str();
        if !STATE_TYPES.contains(&state.kind.as_str()) {
            return Err(Error::config("state_data", id, format!("unknown state type '{}'", state.kind)));
        }
        require("state_data", id, &time_models, &state.time_model_id, "time_model_id")?;
        match state.kind.as_str() {
            "BreakDownState" | "ProcessBreakDownState" => {
                let repair = state.repair_time_model_id.as_deref().ok_or_else(|| {
                    Error::config("state_data", id, "breakdown states need a repair_time_model_id")
                })?;
                require("state_data", id, &time_models, repair, "repair_time_model_id")?;
                if state.kind == "ProcessBreakDownState" {
                    let process = state
                        .process_id
                        .as_deref()
                        .ok_or_else(|| Error::config("state_data", id, "process breakdown states need a process_id"))?;
                    require("state_data", id, &processes, process, "process_id")?;
                }
            }
            "SetupState" => {
                let origin = state
                    .origin_setup
                    .as_deref()
                    .ok_or_else(|| Error::config("state_data", id, "setup states need an origin_setup"))?;
                let target = state
                    .target_setup
                    .as_deref()
                    .ok_or_else(|| Error::config("state_data", id, "setup states need a target_setup"))?;
                require("state_data", id, &processes, origin, "origin_setup")?;
                require("state_data", id, &processes, target, "target_setup")?;
            }
            _ => unreachable!(),
        }
    }

    let link_endpoints: HashSet<&str> = resources
        .iter()
        .chain(sources.iter())
        .chain(sinks.iter())
        .chain(nodes.iter())
        .copied()
        .collect();

    for process in &dto.process_data {
        validate_process(process, &time_models, &auxiliaries, &link_endpoints)?;
    }

    for queue in &dto.queue_data {
        if queue.capacity < 0 {
            return Err(Error::config("queue_data", &queue.id, format!("capacity must be >= 0, got {}", queue.capacity)));
        }
    }

    for resource in &dto.resource_data {
        let id = resource.id.as_str();
        if resource.capacity < 1 {
            return Err(Error::config("resource_data", id, format!("capacity must be >= 1, got {}", resource.capacity)));
        }
        if !CONTROLLERS.contains(&resource.controller.as_str()) {
            return Err(Error::config("resource_data", id, format!("unknown controller '{}'", resource.controller)));
        }
        if !CONTROL_POLICIES.contains(&resource.control_policy.as_str()) {
            return Err(Error::config("resource_data", id, format!("unknown control_policy '{}'", resource.control_policy)));
        }
        if resource.control_policy == "SPT_transport" && resource.controller != "TransportController" {
            return Err(Error::config("resource_data", id, "SPT_transport requires a TransportController"));
        }
        if resource.process_ids.is_empty() {
            return Err(Error::config("resource_data", id, "a resource must provide at least one process"));
        }
        for process in &resource.process_ids {
            require("resource_data", id, &processes, process, "process_ids")?;
        }
        if !resource.process_capacities.is_empty() {
            if resource.process_capacities.len() != resource.process_ids.len() {
                return Err(Error::config(
                    "resource_data",
                    id,
                    format!(
                        "process_capacities has {} entries for {} processes",
                        resource.process_capacities.len(),
                        resource.process_ids.len()
                    ),
                ));
            }
            if let Some(bad) = resource.process_capacities.iter().find(|c| **c < 1) {
                return Err(Error::config("resource_data", id, format!("process capacity must be >= 1, got {bad}")));
            }
        }
        for state in &resource.state_ids {
            require("resource_data", id, &states, state, "state_ids")?;
        }
        for queue in resource.input_queues.iter().chain(resource.output_queues.iter()) {
            require("resource_data", id, &queues, queue, "queues")?;
        }
        // Anything that transforms products needs somewhere to take them
        // from and somewhere to put the results.
        let provides_stationary = resource.process_ids.iter().any(|p| {
            dto.process_data
                .iter()
                .find(|record| record.id == *p)
                .is_some_and(|record| !matches!(record.kind.as_str(), "TransportProcesses" | "LinkTransportProcess"))
        });
        if provides_stationary && (resource.input_queues.is_empty() || resource.output_queues.is_empty()) {
            return Err(Error::config("resource_data", id, "a processing resource needs input and output queues"));
        }
    }

    let provided: HashSet<&str> = dto
        .resource_data
        .iter()
        .flat_map(|r| r.process_ids.iter().map(String::as_str))
        .collect();
    let provided_capabilities: HashSet<&str> = dto
        .process_data
        .iter()
        .filter(|p| p.kind == "CapabilityProcess" && provided.contains(p.id.as_str()))
        .filter_map(|p| p.capability.as_deref())
        .collect();
    let process_by_id: HashMap<&str, &ProcessDto> = dto.process_data.iter().map(|p| (p.id.as_str(), p)).collect();

    for product in &dto.product_data {
        validate_product(product, &process_by_id, &provided, &provided_capabilities)?;
    }

    for sink in &dto.sink_data {
        let id = sink.id.as_str();
        require("sink_data", id, &products, &sink.product_type, "product_type")?;
        if sink.input_queues.is_empty() {
            return Err(Error::config("sink_data", id, "a sink needs at least one input queue"));
        }
        for queue in &sink.input_queues {
            require("sink_data", id, &queues, queue, "input_queues")?;
        }
    }

    let sink_types: HashSet<&str> = dto.sink_data.iter().map(|s| s.product_type.as_str()).collect();

    for source in &dto.source_data {
        let id = source.id.as_str();
        require("source_data", id, &products, &source.product_type, "product_type")?;
        require("source_data", id, &time_models, &source.time_model_id, "time_model_id")?;
        if !ROUTING_HEURISTICS.contains(&source.routing_heuristic.as_str()) {
            return Err(Error::config("source_data", id, format!("unknown routing_heuristic '{}'", source.routing_heuristic)));
        }
        if source.output_queues.is_empty() {
            return Err(Error::config("source_data", id, "a source needs at least one output queue"));
        }
        for queue in &source.output_queues {
            require("source_data", id, &queues, queue, "output_queues")?;
        }
        if !sink_types.contains(source.product_type.as_str()) {
            return Err(Error::config("source_data", id, format!("no sink accepts product type '{}'", source.product_type)));
        }
    }

    for aux in &dto.auxiliary_data {
        let id = aux.id.as_str();
        if aux.storages.is_empty() {
            return Err(Error::config("auxiliary_data", id, "an auxiliary needs at least one storage"));
        }
        if aux.quantity_in_storages.len() != aux.storages.len() {
            return Err(Error::config(
                "auxiliary_data",
                id,
                format!("{} quantities for {} storages", aux.quantity_in_storages.len(), aux.storages.len()),
            ));
        }
        if let Some(bad) = aux.quantity_in_storages.iter().find(|q| **q < 0) {
            return Err(Error::config("auxiliary_data", id, format!("storage quantity must be >= 0, got {bad}")));
        }
        for queue in &aux.storages {
            require("auxiliary_data", id, &queues, queue, "storages")?;
        }
        for process in &aux.relevant_processes {
            require("auxiliary_data", id, &processes, process, "relevant_processes")?;
        }
    }

    Ok(())
}

fn unique_ids<'a>(kind: &'static str, ids: impl Iterator<Item = &'a str>) -> Result<HashSet<&'a str>> {
    let mut seen = HashSet::new();
    for id in ids {
        if id.is_empty() {
            return Err(Error::config(kind, id, "empty ID"));
        }
        if !seen.insert(id) {
            return Err(Error::config(kind, id, "duplicate ID"));
        }
    }
    Ok(seen)
}

fn require(kind: &'static str, id: &str, known: &HashSet<&str>, reference: &str, field: &str) -> Result<()> {
    if known.contains(reference) {
        Ok(())
    } else {
        Err(Error::config(kind, id, format!("{field} references unknown id '{reference}'")))
    }
}

fn validate_time_model(model: &TimeModelDto) -> Result<()> {
    match model {
        TimeModelDto::Function(dto) => {
            let id = dto.id.as_str();
            if !DISTRIBUTIONS.contains(&dto.distribution_function.as_str()) {
                return Err(Error::config(
                    "time_model_data",
                    id,
                    format!("unknown distribution_function '{}'", dto.distribution_function),
                ));
            }
            if dto.batch_size < 1 {
                return Err(Error::config("time_model_data", id, "batch_size must be >= 1"));
            }
            if dto.scale < 0.0 {
                return Err(Error::config("time_model_data", id, format!("scale must be >= 0, got {}", dto.scale)));
            }
            match dto.distribution_function.as_str() {
                "exponential" if dto.location <= 0.0 => {
                    Err(Error::config("time_model_data", id, "an exponential model needs a positive mean (location)"))
                }
                "lognormal" if dto.scale == 0.0 => {
                    Err(Error::config("time_model_data", id, "a lognormal model needs a positive scale"))
                }
                _ => Ok(()),
            }
        }
        TimeModelDto::Sample(dto) => {
            if dto.samples.is_empty() {
                return Err(Error::config("time_model_data", &dto.id, "samples must not be empty"));
            }
            Ok(())
        }
        TimeModelDto::Schedule(dto) => {
            if dto.schedule.is_empty() {
                return Err(Error::config("time_model_data", &dto.id, "schedule must not be empty"));
            }
            if dto.absolute && dto.cyclic {
                return Err(Error::config("time_model_data", &dto.id, "an absolute schedule cannot be cyclic"));
            }
            Ok(())
        }
        TimeModelDto::Distance(dto) => {
            let id = dto.id.as_str();
            if !METRICS.contains(&dto.metric.as_str()) {
                return Err(Error::config("time_model_data", id, format!("unknown metric '{}'", dto.metric)));
            }
            if dto.speed <= 0.0 {
                return Err(Error::config("time_model_data", id, format!("speed must be > 0, got {}", dto.speed)));
            }
            if dto.reaction_time < 0.0 {
                return Err(Error::config("time_model_data", id, "reaction_time must be >= 0"));
            }
            Ok(())
        }
    }
}

fn validate_process(
    process: &ProcessDto,
    time_models: &HashSet<&str>,
    auxiliaries: &HashSet<&str>,
    link_endpoints: &HashSet<&str>,
) -> Result<()> {
    let id = process.id.as_str();
    if !PROCESS_TYPES.contains(&process.kind.as_str()) {
        return Err(Error::config("process_data", id, format!("unknown process type '{}'", process.kind)));
    }

    // Only the plan-side placeholder lives without a duration.
    if process.kind != "RequiredCapabilityProcess" {
        let model = process
            .time_model_id
            .as_deref()
            .ok_or_else(|| Error::config("process_data", id, format!("{} needs a time_model_id", process.kind)))?;
        if !time_models.contains(model) {
            return Err(Error::config("process_data", id, format!("time_model_id references unknown id '{model}'")));
        }
    }

    if matches!(process.kind.as_str(), "CapabilityProcess" | "RequiredCapabilityProcess") && process.capability.is_none() {
        return Err(Error::config("process_data", id, format!("{} needs a capability tag", process.kind)));
    }

    if process.lot_dependency {
        match process.max_lot_size {
            Some(n) if n >= 1 => {}
            Some(n) => return Err(Error::config("process_data", id, format!("max_lot_size must be >= 1, got {n}"))),
            None => return Err(Error::config("process_data", id, "lot_dependency needs a max_lot_size")),
        }
    }

    for aux in &process.tool_dependencies {
        if !auxiliaries.contains(aux.as_str()) {
            return Err(Error::config("process_data", id, format!("tool_dependencies references unknown id '{aux}'")));
        }
    }

    if process.kind == "LinkTransportProcess" {
        if process.links.is_empty() {
            return Err(Error::config("process_data", id, "a link transport process needs links"));
        }
        for [from, to] in &process.links {
            for endpoint in [from, to] {
                if !link_endpoints.contains(endpoint.as_str()) {
                    return Err(Error::config("process_data", id, format!("link endpoint '{endpoint}' is unknown")));
                }
            }
        }
    }

    Ok(())
}

fn validate_product(
    product: &ProductDto,
    process_by_id: &HashMap<&str, &ProcessDto>,
    provided: &HashSet<&str>,
    provided_capabilities: &HashSet<&str>,
) -> Result<()> {
    let id = product.id.as_str();

    let plan_processes: Vec<&str> = match &product.processes {
        ProcessPlanDto::List(list) => list.iter().map(String::as_str).collect(),
        ProcessPlanDto::Precedence(map) => {
            // Every successor must itself be a node of the graph.
            for (node, successors) in map {
                for succ in successors {
                    if !map.contains_key(succ) {
                        return Err(Error::config(
                            "product_data",
                            id,
                            format!("precedence successor '{succ}' of '{node}' is not a node"),
                        ));
                    }
                }
            }
            check_acyclic(id, map)?;
            map.keys().map(String::as_str).collect()
        }
    };

    if plan_processes.is_empty() {
        return Err(Error::config("product_data", id, "a product needs at least one process"));
    }

    for process in plan_processes {
        let Some(dto) = process_by_id.get(process) else {
            return Err(Error::config("product_data", id, format!("plan references unknown process '{process}'")));
        };
        // Every step must be executable somewhere.
        let reachable = match dto.kind.as_str() {
            "RequiredCapabilityProcess" => dto.capability.as_deref().is_some_and(|c| provided_capabilities.contains(c)),
            _ => provided.contains(process),
        };
        if !reachable {
            return Err(Error::config("product_data", id, format!("no resource provides process '{process}'")));
        }
    }

    if let Some(transport) = product.transport_process.as_deref() {
        let Some(dto) = process_by_id.get(transport) else {
            return Err(Error::config("product_data", id, format!("transport_process references unknown process '{transport}'")));
        };
        if !matches!(dto.kind.as_str(), "TransportProcesses" | "LinkTransportProcess") {
            return Err(Error::config("product_data", id, format!("transport_process '{transport}' is not a transport")));
        }
        if !provided.contains(transport) {
            return Err(Error::config("product_data", id, format!("no resource provides transport process '{transport}'")));
        }
    }

    Ok(())
}

/// Kahn's algorithm over the precedence map; anything left unprocessed sits
/// on a cycle.
fn check_acyclic(product_id: &str, map: &std::collections::BTreeMap<String, Vec<String>>) -> Result<()> {
    let mut indegree: HashMap<&str, usize> = map.keys().map(|k| (k.as_str(), 0)).collect();
    for successors in map.values() {
        for succ in successors {
            *indegree.get_mut(succ.as_str()).expect("successors checked above") += 1;
        }
    }

    let mut ready: Vec<&str> = indegree.iter().filter(|(_, d)| **d == 0).map(|(k, _)| *k).collect();
    let mut processed = 0usize;
    while let Some(node) = ready.pop() {
        processed += 1;
        for succ in &map[node] {
            let d = indegree.get_mut(succ.as_str()).expect("successors checked above");
            *d -= 1;
            if *d == 0 {
                ready.push(succ.as_str());
            }
        }
    }

    if processed != map.len() {
        return Err(Error::config("product_data", product_id, "process precedence contains a cycle"));
    }
    Ok(())
}
