use std::collections::HashMap;

use crate::api::product_dto::ProcessPlanDto;
use crate::api::system_model_dto::SystemModelDto;
use crate::api::time_model_dto::TimeModelDto;
use crate::domain::auxiliary::Auxiliary;
use crate::domain::controller::{ControlPolicy, ControllerKind};
use crate::domain::engine::Engine;
use crate::domain::ids::{AuxiliaryKey, EntityRef, ProcessKey, QueueKey, StateKey, TimeModelKey};
use crate::domain::process::{LotPolicy, Process, ProcessKind};
use crate::domain::product::{ProductSpec, Requirement};
use crate::domain::queue::Store;
use crate::domain::resource::{Resource, ResourceProcess};
use crate::domain::rng::stream;
use crate::domain::router::RoutingPolicy;
use crate::domain::source::{Sink, Source};
use crate::domain::state::{StateKind, StateSpec};
use crate::domain::time_model::{DistributionFunction, Metric, TimeModel};
use crate::error::{Error, Result};

/// Turns a validated configuration into a ready-to-run engine: id strings
/// become typed arena keys, every cross-reference is resolved once, and the
/// provider/watcher tables the hot path relies on are precomputed.
pub fn build(dto: &SystemModelDto, seed_override: Option<u64>) -> Result<Engine> {
    let seed = seed_override.unwrap_or(dto.seed);
    let mut engine = Engine::new(seed, stream(seed, "__router__"));

    // --- Time models ---
    let mut model_keys: HashMap<&str, TimeModelKey> = HashMap::new();
    for model in &dto.time_model_data {
        let built = build_time_model(model, seed)?;
        let key = engine.models.insert(built);
        model_keys.insert(model.id(), key);
    }

    // --- Queues and nodes ---
    let mut queue_keys: HashMap<&str, QueueKey> = HashMap::new();
    for queue in &dto.queue_data {
        let key = engine.stores.insert(Store::new(queue.id.clone(), queue.capacity as usize));
        queue_keys.insert(&queue.id, key);
    }
    let mut node_refs: HashMap<&str, EntityRef> = HashMap::new();
    for node in &dto.node_data {
        let key = engine.nodes.insert(node.location);
        node_refs.insert(&node.id, EntityRef::Node(key));
    }

    // --- Auxiliaries ---
    let mut auxiliary_keys: HashMap<&str, AuxiliaryKey> = HashMap::new();
    for aux in &dto.auxiliary_data {
        let storages = aux
            .storages
            .iter()
            .zip(aux.quantity_in_storages.iter())
            .map(|(queue, quantity)| (queue_keys[queue.as_str()], *quantity as u32))
            .collect();
        let key = engine.auxiliaries.insert(Auxiliary { id: aux.id.clone(), storages });
        auxiliary_keys.insert(&aux.id, key);
    }

    // --- Processes (links patched once the endpoints exist) ---
    let mut process_keys: HashMap<&str, ProcessKey> = HashMap::new();
    for process in &dto.process_data {
        let kind = match process.kind.as_str() {
            "ProductionProcesses" => ProcessKind::Production,
            "TransportProcesses" => ProcessKind::Transport,
            "CapabilityProcess" => ProcessKind::Capability { capability: process.capability.clone().unwrap_or_default() },
            "RequiredCapabilityProcess" => {
                ProcessKind::RequiredCapability { capability: process.capability.clone().unwrap_or_default() }
            }
            "LinkTransportProcess" => ProcessKind::LinkTransport { links: Vec::new() },
            other => return Err(Error::config("process_data", &process.id, format!("unknown process type '{other}'"))),
        };
        let lot = process.lot_dependency.then(|| LotPolicy { max_lot_size: process.max_lot_size.unwrap_or(1) });
        let tools = process.tool_dependencies.iter().map(|a| auxiliary_keys[a.as_str()]).collect();
        let key = engine.processes.insert(Process {
            id: process.id.clone(),
            kind,
            time_model: process.time_model_id.as_deref().map(|m| model_keys[m]),
            lot,
            tools,
        });
        process_keys.insert(&process.id, key);
    }

    // Auxiliaries may also declare which processes need them.
    for aux in &dto.auxiliary_data {
        let aux_key = auxiliary_keys[aux.id.as_str()];
        for process in &aux.relevant_processes {
            let process_key = process_keys[process.as_str()];
            let tools = &mut engine.processes[process_key].tools;
            if !tools.contains(&aux_key) {
                tools.push(aux_key);
            }
        }
    }

    // --- States ---
    let mut state_keys: HashMap<&str, StateKey> = HashMap::new();
    for state in &dto.state_data {
        let kind = match state.kind.as_str() {
            "BreakDownState" => StateKind::Breakdown {
                time_model: model_keys[state.time_model_id.as_str()],
                repair_time_model: model_keys[state.repair_time_model_id.as_deref().expect("validated")],
            },
            "ProcessBreakDownState" => StateKind::ProcessBreakdown {
                time_model: model_keys[state.time_model_id.as_str()],
                repair_time_model: model_keys[state.repair_time_model_id.as_deref().expect("validated")],
                process: process_keys[state.process_id.as_deref().expect("validated")],
            },
            "SetupState" => StateKind::Setup {
                time_model: model_keys[state.time_model_id.as_str()],
                origin: process_keys[state.origin_setup.as_deref().expect("validated")],
                target: process_keys[state.target_setup.as_deref().expect("validated")],
            },
            other => return Err(Error::config("state_data", &state.id, format!("unknown state type '{other}'"))),
        };
        let key = engine.state_specs.insert(StateSpec { id: state.id.clone(), kind });
        state_keys.insert(&state.id, key);
    }

    // --- Resources ---
    let mut resource_refs: HashMap<&str, EntityRef> = HashMap::new();
    for (index, resource) in dto.resource_data.iter().enumerate() {
        let controller = match resource.controller.as_str() {
            "TransportController" => ControllerKind::Transport,
            _ => ControllerKind::Pipeline,
        };
        let policy = match resource.control_policy.as_str() {
            "LIFO" => ControlPolicy::Lifo,
            "SPT" => ControlPolicy::Spt,
            "SPT_transport" => ControlPolicy::SptTransport,
            _ => ControlPolicy::Fifo,
        };
        let processes = resource
            .process_ids
            .iter()
            .enumerate()
            .map(|(i, p)| ResourceProcess {
                process: process_keys[p.as_str()],
                capacity: resource.process_capacities.get(i).copied().unwrap_or(resource.capacity) as u32,
                active: 0,
            })
            .collect();
        let key = engine.resources.insert(Resource {
            id: resource.id.clone(),
            index,
            capacity: resource.capacity as u32,
            location: resource.location,
            input_location: resource.input_location.unwrap_or(resource.location),
            output_location: resource.output_location.unwrap_or(resource.location),
            controller,
            policy,
            processes,
            states: resource.state_ids.iter().map(|s| state_keys[s.as_str()]).collect(),
            input_queues: resource.input_queues.iter().map(|q| queue_keys[q.as_str()]).collect(),
            output_queues: resource.output_queues.iter().map(|q| queue_keys[q.as_str()]).collect(),
            pending: Vec::new(),
            running: Vec::new(),
            current_setup: None,
            active_setup: None,
            down: Vec::new(),
            process_down: Vec::new(),
            wake_scheduled: false,
        });
        engine.resource_order.push(key);
        resource_refs.insert(&resource.id, EntityRef::Resource(key));
    }

    // --- Product specs ---
    let mut spec_index: HashMap<&str, usize> = HashMap::new();
    for product in &dto.product_data {
        let (requirements, successors) = match &product.processes {
            ProcessPlanDto::List(list) => {
                let reqs = list.iter().map(|p| Requirement::Process(process_keys[p.as_str()])).collect();
                (reqs, None)
            }
            ProcessPlanDto::Precedence(map) => {
                // Node order is the sorted key order of the map.
                let order: Vec<&str> = map.keys().map(String::as_str).collect();
                let index_of: HashMap<&str, usize> = order.iter().enumerate().map(|(i, k)| (*k, i)).collect();
                let reqs = order.iter().map(|p| Requirement::Process(process_keys[*p])).collect();
                let succ = order
                    .iter()
                    .map(|node| map[*node].iter().map(|s| index_of[s.as_str()]).collect())
                    .collect();
                (reqs, Some(succ))
            }
        };
        spec_index.insert(&product.id, engine.product_specs.len());
        engine.product_specs.push(ProductSpec {
            type_id: product.id.clone(),
            requirements,
            successors,
            transport_process: product.transport_process.as_deref().map(|p| process_keys[p]),
            minted: 0,
        });
    }

    // --- Sources and sinks ---
    let mut source_refs: HashMap<&str, EntityRef> = HashMap::new();
    for (index, source) in dto.source_data.iter().enumerate() {
        let routing = match source.routing_heuristic.as_str() {
            "shortest_queue" => RoutingPolicy::ShortestQueue,
            "FIFO" => RoutingPolicy::Fifo,
            _ => RoutingPolicy::Random,
        };
        let key = engine.sources.insert(Source {
            id: source.id.clone(),
            index,
            product_type: source.product_type.clone(),
            spec: spec_index[source.product_type.as_str()],
            location: source.location,
            time_model: model_keys[source.time_model_id.as_str()],
            routing,
            output_queues: source.output_queues.iter().map(|q| queue_keys[q.as_str()]).collect(),
            deferred: Default::default(),
            exhausted: false,
            retry_scheduled: false,
        });
        engine.source_order.push(key);
        source_refs.insert(&source.id, EntityRef::Source(key));
    }
    let mut sink_refs: HashMap<&str, EntityRef> = HashMap::new();
    for (index, sink) in dto.sink_data.iter().enumerate() {
        let key = engine.sinks.insert(Sink {
            id: sink.id.clone(),
            index,
            product_type: sink.product_type.clone(),
            location: sink.location,
            input_queues: sink.input_queues.iter().map(|q| queue_keys[q.as_str()]).collect(),
            consumed: 0,
        });
        engine.sink_order.push(key);
        sink_refs.insert(&sink.id, EntityRef::Sink(key));
    }

    // --- Queue ownership and physical positions ---
    // Later assignments override earlier ones so a shared queue sits at the
    // most specific position: sink < source < resource input < resource
    // output (products are picked up from output queues).
    for sink in engine.sink_order.clone() {
        let (queues, location, entity) = {
            let s = &engine.sinks[sink];
            (s.input_queues.clone(), s.location, EntityRef::Sink(sink))
        };
        for queue in queues {
            engine.stores[queue].owner = Some(entity);
            engine.stores[queue].location = location;
        }
    }
    for source in engine.source_order.clone() {
        let (queues, location, entity) = {
            let s = &engine.sources[source];
            (s.output_queues.clone(), s.location, EntityRef::Source(source))
        };
        for queue in queues {
            engine.stores[queue].owner = Some(entity);
            engine.stores[queue].location = location;
        }
    }
    for resource in engine.resource_order.clone() {
        let (inputs, outputs, in_loc, out_loc) = {
            let r = &engine.resources[resource];
            (r.input_queues.clone(), r.output_queues.clone(), r.input_location, r.output_location)
        };
        for queue in inputs {
            engine.stores[queue].owner = Some(EntityRef::Resource(resource));
            engine.stores[queue].location = in_loc;
        }
        for queue in outputs {
            engine.stores[queue].owner = Some(EntityRef::Resource(resource));
            engine.stores[queue].location = out_loc;
        }
    }

    // --- Link transport endpoints ---
    let entity_of = |id: &str| -> Option<EntityRef> {
        resource_refs
            .get(id)
            .or_else(|| source_refs.get(id))
            .or_else(|| sink_refs.get(id))
            .or_else(|| node_refs.get(id))
            .copied()
    };
    for process in &dto.process_data {
        if process.kind != "LinkTransportProcess" {
            continue;
        }
        let key = process_keys[process.id.as_str()];
        let resolved: Vec<(EntityRef, EntityRef)> = process
            .links
            .iter()
            .map(|[from, to]| {
                let from = entity_of(from).ok_or_else(|| Error::config("process_data", &process.id, format!("link endpoint '{from}' is unknown")))?;
                let to = entity_of(to).ok_or_else(|| Error::config("process_data", &process.id, format!("link endpoint '{to}' is unknown")))?;
                Ok((from, to))
            })
            .collect::<Result<_>>()?;
        engine.processes[key].kind = ProcessKind::LinkTransport { links: resolved };
    }

    // --- Provider and watcher tables ---
    build_lookup_tables(&mut engine);

    Ok(engine)
}

fn build_lookup_tables(engine: &mut Engine) {
    for resource in engine.resource_order.clone() {
        let provided: Vec<ProcessKey> = engine.resources[resource].processes.iter().map(|p| p.process).collect();
        for process in provided {
            engine.providers_by_process.entry(process).or_default().push((resource, process));
            if let Some(capability) = engine.processes[process].offered_capability() {
                engine
                    .providers_by_capability
                    .entry(capability.to_string())
                    .or_default()
                    .push((resource, process));
            }
            for aux in engine.processes[process].tools.clone() {
                let watchers = engine.auxiliary_watchers.entry(aux).expect("auxiliary key is live").or_default();
                if !watchers.contains(&resource) {
                    watchers.push(resource);
                }
            }
        }
        for queue in engine.resources[resource].output_queues.clone() {
            engine.queue_watchers.entry(queue).expect("queue key is live").or_default().push(resource);
        }
    }
    for source in engine.source_order.clone() {
        for queue in engine.sources[source].output_queues.clone() {
            engine.source_watchers.entry(queue).expect("queue key is live").or_default().push(source);
        }
    }
}

fn build_time_model(dto: &TimeModelDto, seed: u64) -> Result<TimeModel> {
    Ok(match dto {
        TimeModelDto::Function(f) => {
            let dist = match f.distribution_function.as_str() {
                "constant" => DistributionFunction::Constant,
                "normal" => DistributionFunction::Normal,
                "lognormal" => DistributionFunction::Lognormal,
                "exponential" => DistributionFunction::Exponential,
                other => {
                    return Err(Error::config("time_model_data", &f.id, format!("unknown distribution_function '{other}'")));
                }
            };
            TimeModel::function(f.id.clone(), dist, f.location, f.scale, f.batch_size, stream(seed, &f.id))
        }
        TimeModelDto::Sample(s) => TimeModel::sample_list(s.id.clone(), s.samples.clone(), s.randomize, stream(seed, &s.id)),
        TimeModelDto::Schedule(s) => TimeModel::schedule(s.id.clone(), s.schedule.clone(), s.absolute, s.cyclic, stream(seed, &s.id)),
        TimeModelDto::Distance(d) => {
            let metric = match d.metric.as_str() {
                "manhattan" => Metric::Manhattan,
                "euclidean" => Metric::Euclidean,
                other => return Err(Error::config("time_model_data", &d.id, format!("unknown metric '{other}'"))),
            };
            TimeModel::distance(d.id.clone(), d.speed, d.reaction_time, metric, stream(seed, &d.id))
        }
    })
}
