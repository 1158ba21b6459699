use std::collections::{HashMap, VecDeque};

use rand_pcg::Pcg64;
use slotmap::{SecondaryMap, SlotMap};

use crate::domain::auxiliary::Auxiliary;
use crate::domain::controller::{select_next, SelectionCtx};
use crate::domain::event_log::{EventLog, EventRecord, LogActivity, LogActor, LogState, LogStateType};
use crate::domain::events::SimEvent;
use crate::domain::ids::{
    ActivityId, AuxiliaryKey, EntityRef, Location, NodeKey, ProcessKey, ProductKey, ProductSerial, QueueKey, RequestId,
    ReservationId, ResourceKey, SinkKey, SourceKey, StateKey, TimeModelKey,
};
use crate::domain::kpi::ProductInfo;
use crate::domain::process::{Process, ProcessKind};
use crate::domain::product::{Product, ProductSpec, Requirement};
use crate::domain::queue::{ReserveOutcome, Store};
use crate::domain::resource::{Activity, ActivityPhase, Delivery, Request, RequestKind, Resource, SetupRun};
use crate::domain::router::{choose, Candidate};
use crate::domain::scheduler::EventQueue;
use crate::domain::source::{Sink, Source};
use crate::domain::state::{StateKind, StateSpec};
use crate::domain::time_model::{SampleCtx, TimeModel};
use crate::error::{Error, Result};

/// Tunables that are not part of the model itself.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Hard cap on processed events; guards degenerate configurations such
    /// as a zero inter-arrival source feeding an unbounded queue.
    pub max_events: u64,
    /// After this many failed routing attempts for one product a warning is
    /// logged (the product keeps waiting).
    pub starvation_warn_after: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions { max_events: 50_000_000, starvation_warn_after: 1_000 }
    }
}

/// The simulation driver. Owns every component for the duration of a run
/// and dispatches the popped wakeups; everything is single-threaded and
/// cooperative, so no activity observes another mid-mutation.
pub struct Engine {
    pub seed: u64,
    pub clock: f64,
    pub horizon: f64,
    pub options: EngineOptions,

    pub events: EventQueue,
    pub models: SlotMap<TimeModelKey, TimeModel>,
    pub processes: SlotMap<ProcessKey, Process>,
    pub state_specs: SlotMap<StateKey, StateSpec>,
    pub stores: SlotMap<QueueKey, Store>,
    pub resources: SlotMap<ResourceKey, Resource>,
    pub products: SlotMap<ProductKey, Product>,
    pub sources: SlotMap<SourceKey, Source>,
    pub sinks: SlotMap<SinkKey, Sink>,
    pub auxiliaries: SlotMap<AuxiliaryKey, Auxiliary>,
    /// Plain link-transport endpoints that are neither resource, source nor
    /// sink.
    pub nodes: SlotMap<NodeKey, Location>,

    pub product_specs: Vec<ProductSpec>,
    /// Per-serial name/type records, kept after products are destroyed.
    pub product_infos: Vec<ProductInfo>,
    pub log: EventLog,

    /// Declaration orders; every deterministic tie-break runs over these.
    pub resource_order: Vec<ResourceKey>,
    pub sink_order: Vec<SinkKey>,
    pub source_order: Vec<SourceKey>,

    /// Resolved provider tables: which (resource, process) pairs serve a
    /// process id or a capability tag.
    pub providers_by_process: HashMap<ProcessKey, Vec<(ResourceKey, ProcessKey)>>,
    pub providers_by_capability: HashMap<String, Vec<(ResourceKey, ProcessKey)>>,

    /// Resources to wake when a queue frees a slot (those producing into it).
    pub queue_watchers: SecondaryMap<QueueKey, Vec<ResourceKey>>,
    /// Sources to wake when one of their output queues frees a slot.
    pub source_watchers: SecondaryMap<QueueKey, Vec<SourceKey>>,
    /// Resources blocked on a tool type.
    pub auxiliary_watchers: SecondaryMap<AuxiliaryKey, Vec<ResourceKey>>,

    router_rng: Pcg64,
    router_waitlist: VecDeque<ProductKey>,
    router_wake_scheduled: bool,

    next_reservation: u64,
    next_request: u64,
    next_activity: u64,
    next_serial: u64,
    /// Outstanding reservations; must equal the summed `reserved` of all
    /// stores at any instant.
    pub active_reservations: u64,
    pub event_index: u64,
}

impl Engine {
    pub fn new(seed: u64, router_rng: Pcg64) -> Self {
        Engine {
            seed,
            clock: 0.0,
            horizon: 0.0,
            options: EngineOptions::default(),
            events: EventQueue::new(),
            models: SlotMap::with_key(),
            processes: SlotMap::with_key(),
            state_specs: SlotMap::with_key(),
            stores: SlotMap::with_key(),
            resources: SlotMap::with_key(),
            products: SlotMap::with_key(),
            sources: SlotMap::with_key(),
            sinks: SlotMap::with_key(),
            auxiliaries: SlotMap::with_key(),
            nodes: SlotMap::with_key(),
            product_specs: Vec::new(),
            product_infos: Vec::new(),
            log: EventLog::new(),
            resource_order: Vec::new(),
            sink_order: Vec::new(),
            source_order: Vec::new(),
            providers_by_process: HashMap::new(),
            providers_by_capability: HashMap::new(),
            queue_watchers: SecondaryMap::new(),
            source_watchers: SecondaryMap::new(),
            auxiliary_watchers: SecondaryMap::new(),
            router_rng,
            router_waitlist: VecDeque::new(),
            router_wake_scheduled: false,
            next_reservation: 0,
            next_request: 0,
            next_activity: 0,
            next_serial: 0,
            active_reservations: 0,
            event_index: 0,
        }
    }

    // --- Run loop ---

    /// Runs the simulation until the horizon. Arms the initial wakeups on
    /// the first call.
    pub fn run(&mut self, horizon: f64) -> Result<()> {
        self.horizon = horizon;
        self.arm_initial_events()?;

        while let Some((time, event)) = self.events.pop() {
            if time >= horizon {
                break;
            }
            if self.event_index >= self.options.max_events {
                log::warn!(
                    "Event cap of {} reached at t={}; stopping early. The configuration likely generates unbounded work.",
                    self.options.max_events,
                    self.clock
                );
                break;
            }
            debug_assert!(time >= self.clock, "clock would move backwards");
            self.clock = time;
            self.event_index += 1;
            self.handle(event)?;
        }

        self.truncate_in_flight();
        Ok(())
    }

    fn arm_initial_events(&mut self) -> Result<()> {
        // Every state machine announces itself at t=0, then the stochastic
        // clocks are armed.
        for key in self.resource_order.clone() {
            let (processes, states): (Vec<ProcessKey>, Vec<StateKey>) = {
                let res = &self.resources[key];
                (res.processes.iter().map(|p| p.process).collect(), res.states.clone())
            };
            for process in processes {
                let state_type = self.process_state_type(process);
                self.push_record(LogActor::Resource(key), LogState::Process(process), state_type, LogActivity::CreatedState, None, None, None);
            }
            for state in states {
                let (state_type, ttf_model) = match self.state_specs[state].kind {
                    StateKind::Breakdown { time_model, .. } => (LogStateType::Breakdown, Some(time_model)),
                    StateKind::ProcessBreakdown { time_model, .. } => (LogStateType::ProcessBreakdown, Some(time_model)),
                    StateKind::Setup { .. } => (LogStateType::Setup, None),
                };
                self.push_record(LogActor::Resource(key), LogState::Machine(state), state_type, LogActivity::CreatedState, None, None, None);

                if let Some(ttf_model) = ttf_model {
                    let ttf = self.sample_duration(ttf_model)?;
                    self.events.schedule_at(self.clock + ttf, SimEvent::BreakdownBegin { resource: key, state });
                }
            }
        }

        for key in self.source_order.clone() {
            self.push_record(LogActor::Source(key), LogState::Arrival, LogStateType::Source, LogActivity::CreatedState, None, None, None);
            let model = self.sources[key].time_model;
            let ctx = SampleCtx::at(self.clock);
            match self.models[model].sample(&ctx) {
                Some(gap) => {
                    self.events.schedule_at(self.clock + gap, SimEvent::SourceTick(key));
                }
                None => self.sources[key].exhausted = true,
            }
        }

        for key in self.sink_order.clone() {
            self.push_record(LogActor::Sink(key), LogState::Exit, LogStateType::Sink, LogActivity::CreatedState, None, None, None);
        }

        Ok(())
    }

    /// Logs every in-flight activity and setup as truncated at the horizon.
    fn truncate_in_flight(&mut self) {
        self.clock = self.horizon;
        for key in self.resource_order.clone() {
            let running: Vec<(ProcessKey, Vec<ProductKey>)> = self.resources[key]
                .running
                .iter()
                .map(|a| (a.process, a.requests.iter().map(|r| r.product).collect()))
                .collect();
            for (process, members) in running {
                let state_type = self.process_state_type(process);
                for product in members {
                    let serial = self.products.get(product).map(|p| p.serial);
                    self.push_record(LogActor::Resource(key), LogState::Process(process), state_type, LogActivity::Truncated, serial, None, None);
                }
            }
            if let Some(setup) = self.resources[key].active_setup.clone() {
                self.push_record(LogActor::Resource(key), LogState::Machine(setup.state), LogStateType::Setup, LogActivity::Truncated, None, None, None);
            }
        }
    }

    fn handle(&mut self, event: SimEvent) -> Result<()> {
        match event {
            SimEvent::SourceTick(source) => self.on_source_tick(source),
            SimEvent::SourceRetry(source) => self.on_source_retry(source),
            SimEvent::RouterWake => self.on_router_wake(),
            SimEvent::ControllerWake(resource) => {
                self.resources[resource].wake_scheduled = false;
                self.try_dispatch(resource)
            }
            SimEvent::SetupEnd { resource } => self.on_setup_end(resource),
            SimEvent::TransportPickup { resource, activity } => self.on_transport_pickup(resource, activity),
            SimEvent::ActivityEnd { resource, activity } => self.on_activity_end(resource, activity),
            SimEvent::BreakdownBegin { resource, state } => self.on_breakdown_begin(resource, state),
            SimEvent::RepairEnd { resource, state } => self.on_repair_end(resource, state),
        }
    }

    // --- Sources ---

    fn on_source_tick(&mut self, source: SourceKey) -> Result<()> {
        let product = self.mint_product(source);
        self.place_or_defer(source, product)?;

        // Rearm the inter-arrival clock.
        let model = self.sources[source].time_model;
        let ctx = SampleCtx::at(self.clock);
        match self.models[model].sample(&ctx) {
            Some(gap) => {
                self.events.schedule_at(self.clock + gap, SimEvent::SourceTick(source));
            }
            None => {
                self.sources[source].exhausted = true;
                log::debug!("Source '{}' exhausted its arrival schedule at t={}", self.sources[source].id, self.clock);
            }
        }
        Ok(())
    }

    fn mint_product(&mut self, source: SourceKey) -> ProductKey {
        let spec_idx = self.sources[source].spec;
        let serial = ProductSerial(self.next_serial);
        self.next_serial += 1;

        let spec = &mut self.product_specs[spec_idx];
        let name = format!("{}_{}", spec.type_id, spec.minted);
        spec.minted += 1;

        let product = Product {
            serial,
            name: name.clone(),
            product_type: spec.type_id.clone(),
            plan: spec.build_plan(),
            transport_process: spec.transport_process,
            routing: self.sources[source].routing,
            location: None,
            created_at: self.clock,
            steps_completed: 0,
            active_node: None,
            route_retries: 0,
        };
        self.product_infos.push(ProductInfo { name, product_type: product.product_type.clone() });
        let key = self.products.insert(product);

        self.push_record(LogActor::Source(source), LogState::Arrival, LogStateType::Source, LogActivity::CreatedProduct, Some(serial), None, None);
        key
    }

    /// Places a fresh product into the source's output queue, or defers it
    /// until a slot frees.
    fn place_or_defer(&mut self, source: SourceKey, product: ProductKey) -> Result<()> {
        let queues = self.sources[source].output_queues.clone();
        for queue in queues {
            if self.stores[queue].put(product).is_ok() {
                self.products[product].location = Some(queue);
                return self.route_product(product);
            }
        }
        log::debug!("Source '{}' output full at t={}; deferring product", self.sources[source].id, self.clock);
        self.sources[source].deferred.push_back(product);
        Ok(())
    }

    fn on_source_retry(&mut self, source: SourceKey) -> Result<()> {
        self.sources[source].retry_scheduled = false;
        while let Some(product) = self.sources[source].deferred.front().copied() {
            let queues = self.sources[source].output_queues.clone();
            let mut placed = false;
            for queue in queues {
                if self.stores[queue].put(product).is_ok() {
                    self.sources[source].deferred.pop_front();
                    self.products[product].location = Some(queue);
                    self.route_product(product)?;
                    placed = true;
                    break;
                }
            }
            if !placed {
                break;
            }
        }
        Ok(())
    }

    // --- Routing ---

    fn on_router_wake(&mut self) -> Result<()> {
        self.router_wake_scheduled = false;
        // One pass over the parked products; whoever fails again re-parks.
        let mut waiting: Vec<ProductKey> = self.router_waitlist.drain(..).collect();
        for product in waiting.drain(..) {
            if self.products.contains_key(product) {
                self.route_product(product)?;
            }
        }
        Ok(())
    }

    /// Routes a product's next required process (or its trip to the sink).
    /// Reserves the target input slot before anything else happens; parks
    /// the product when no candidate is feasible.
    pub fn route_product(&mut self, product: ProductKey) -> Result<()> {
        if self.products[product].plan.is_finished() {
            return self.route_to_sink(product);
        }

        let node = match self.products[product].plan.next_ready() {
            Some(node) => node,
            None => {
                return Err(self.invariant(format!(
                    "product '{}' has unfinished plan but no ready node",
                    self.products[product].name
                )));
            }
        };

        let requirement = self.products[product].plan.requirement(node).clone();
        let providers = self.resolve_providers(&requirement);

        // Feasibility filter: a candidate must offer a reservable input slot.
        let mut candidates: Vec<Candidate> = Vec::new();
        for (resource, process) in &providers {
            let res = &self.resources[*resource];
            let mut best_queue: Option<(QueueKey, usize)> = None;
            for queue in &res.input_queues {
                let store = &self.stores[*queue];
                // A product already waiting in one of the target's input
                // queues makes that target free to take.
                let already_there = self.products[product].location == Some(*queue);
                if store.has_space() || already_there {
                    let load = if already_there { 0 } else { store.load() };
                    if best_queue.is_none_or(|(_, l)| load < l) {
                        best_queue = Some((*queue, load));
                    }
                }
            }
            if let Some((queue, load)) = best_queue {
                candidates.push(Candidate { resource: *resource, process: *process, queue, load, index: res.index });
            }
        }

        let policy = self.products[product].routing;
        match choose(policy, &candidates, &mut self.router_rng) {
            Some(idx) => {
                let chosen = candidates[idx];
                self.products[product].route_retries = 0;
                self.dispatch_to_target(product, node, EntityRef::Resource(chosen.resource), Some(chosen.process), chosen.queue)
            }
            None => self.park_product(product),
        }
    }

    fn route_to_sink(&mut self, product: ProductKey) -> Result<()> {
        let ptype = self.products[product].product_type.clone();
        for sink in self.sink_order.clone() {
            if self.sinks[sink].product_type != ptype {
                continue;
            }
            for queue in self.sinks[sink].input_queues.clone() {
                if self.stores[queue].has_space() {
                    self.products[product].route_retries = 0;
                    return self.dispatch_to_target(product, usize::MAX, EntityRef::Sink(sink), None, queue);
                }
            }
        }
        self.park_product(product)
    }

    fn park_product(&mut self, product: ProductKey) -> Result<()> {
        let p = &mut self.products[product];
        p.route_retries += 1;
        if p.route_retries == self.options.starvation_warn_after {
            log::warn!(
                "Product '{}' found no feasible target after {} attempts at t={}; it keeps waiting.",
                p.name,
                p.route_retries,
                self.clock
            );
        }
        self.router_waitlist.push_back(product);
        Ok(())
    }

    /// Enumerates (resource, process) pairs serving a plan requirement.
    fn resolve_providers(&self, requirement: &Requirement) -> Vec<(ResourceKey, ProcessKey)> {
        match requirement {
            Requirement::Capability(cap) => self.providers_by_capability.get(cap).cloned().unwrap_or_default(),
            Requirement::Process(key) => match &self.processes[*key].kind {
                ProcessKind::RequiredCapability { capability } => {
                    self.providers_by_capability.get(capability).cloned().unwrap_or_default()
                }
                _ => self.providers_by_process.get(key).cloned().unwrap_or_default(),
            },
        }
    }

    /// Commits a routing decision: reserves the slot and hands the work to a
    /// transport (or directly to the destination controller when the product
    /// is already in place or the type has no transport process).
    fn dispatch_to_target(
        &mut self,
        product: ProductKey,
        node: usize,
        target: EntityRef,
        dest_process: Option<ProcessKey>,
        target_queue: QueueKey,
    ) -> Result<()> {
        self.products[product].active_node = if node == usize::MAX { None } else { Some(node) };

        // Already sitting in an input queue of the destination: no transport,
        // no reservation, straight into the pending pipeline.
        if let EntityRef::Resource(dest) = target
            && self.products[product].location.is_some_and(|q| self.resources[dest].input_queues.contains(&q))
        {
            let request = self.new_request(product, dest_process.expect("production dispatch without process"), RequestKind::Production);
            self.resources[dest].pending.push(request);
            self.wake_controller(dest);
            return Ok(());
        }

        let reservation = ReservationId(self.next_reservation);
        self.next_reservation += 1;
        if self.stores[target_queue].reserve(reservation) == ReserveOutcome::Full {
            // The feasibility filter ran in this same event step; a full
            // queue here means the engine lost track of a slot.
            return Err(self.invariant(format!("reservation on queue '{}' failed right after feasibility check", self.stores[target_queue].id)));
        }
        self.active_reservations += 1;

        let origin_queue = match self.products[product].location {
            Some(q) => q,
            None => {
                return Err(self.invariant(format!("product '{}' routed while not in any queue", self.products[product].name)));
            }
        };

        let delivery = Delivery { target, target_queue, reservation, origin_queue, dest_process };

        match self.products[product].transport_process {
            None => {
                // No transport modeled for this type: the move is immediate.
                if !self.stores[origin_queue].take(product) {
                    return Err(self.invariant(format!("product '{}' missing from its origin queue", self.products[product].name)));
                }
                self.notify_queue_freed(origin_queue);
                self.deliver(product, &delivery)
            }
            Some(transport) => self.dispatch_transport(product, transport, delivery),
        }
    }

    fn dispatch_transport(&mut self, product: ProductKey, transport: ProcessKey, delivery: Delivery) -> Result<()> {
        let origin_owner = self.stores[delivery.origin_queue].owner;
        let providers = self.providers_by_process.get(&transport).cloned().unwrap_or_default();

        let mut candidates: Vec<Candidate> = Vec::new();
        for (resource, process) in providers {
            let serves = match origin_owner {
                Some(origin) => self.processes[process].serves_link(origin, delivery.target),
                None => true,
            };
            if !serves {
                continue;
            }
            let res = &self.resources[resource];
            candidates.push(Candidate {
                resource,
                process,
                queue: delivery.target_queue,
                load: res.pending.len() + res.running.len(),
                index: res.index,
            });
        }

        let policy = self.products[product].routing;
        match choose(policy, &candidates, &mut self.router_rng) {
            Some(idx) => {
                let carrier = candidates[idx].resource;
                let process = candidates[idx].process;
                let request = self.new_request(product, process, RequestKind::Transport(delivery));
                self.resources[carrier].pending.push(request);
                self.wake_controller(carrier);
                Ok(())
            }
            None => {
                // No carrier can serve this move; give the slot back and park.
                self.release_reservation(delivery.target_queue, delivery.reservation)?;
                log::warn!(
                    "No transport resource serves the move of product '{}' at t={}; waiting.",
                    self.products[product].name,
                    self.clock
                );
                self.park_product(product)
            }
        }
    }

    fn new_request(&mut self, product: ProductKey, process: ProcessKey, kind: RequestKind) -> Request {
        let id = RequestId(self.next_request);
        self.next_request += 1;
        Request { id, product, process, kind, created_at: self.clock }
    }

    /// Moves a product into its reserved destination slot and triggers what
    /// comes after the move (controller handoff or sink consumption).
    fn deliver(&mut self, product: ProductKey, delivery: &Delivery) -> Result<()> {
        if self.stores[delivery.target_queue].commit(delivery.reservation, product).is_err() {
            return Err(self.invariant(format!(
                "reservation {:?} unknown on queue '{}'",
                delivery.reservation, self.stores[delivery.target_queue].id
            )));
        }
        self.active_reservations -= 1;
        self.products[product].location = Some(delivery.target_queue);

        match delivery.target {
            EntityRef::Resource(dest) => {
                let process = delivery.dest_process.ok_or_else(|| self.invariant("delivery to a resource without a destination process".into()))?;
                let request = self.new_request(product, process, RequestKind::Production);
                self.resources[dest].pending.push(request);
                self.wake_controller(dest);
                Ok(())
            }
            EntityRef::Sink(sink) => self.finish_product(sink, delivery.target_queue, product),
            _ => Err(self.invariant("delivery target is neither resource nor sink".into())),
        }
    }

    fn finish_product(&mut self, sink: SinkKey, queue: QueueKey, product: ProductKey) -> Result<()> {
        let serial = self.products[product].serial;
        self.push_record(LogActor::Sink(sink), LogState::Exit, LogStateType::Sink, LogActivity::FinishedProduct, Some(serial), None, None);

        if !self.stores[queue].take(product) {
            return Err(self.invariant("finished product missing from sink queue".into()));
        }
        self.notify_queue_freed(queue);
        self.sinks[sink].consumed += 1;
        self.products.remove(product);
        Ok(())
    }

    // --- Controller dispatch ---

    /// Evaluates the pending pipeline of one resource and starts setups or
    /// activities until nothing more is executable.
    pub fn try_dispatch(&mut self, resource: ResourceKey) -> Result<()> {
        self.reroute_invalidated(resource)?;

        loop {
            if !self.resources[resource].can_dispatch() {
                return Ok(());
            }

            let executable = self.executable_mask(resource);
            let selected = {
                let res = &self.resources[resource];
                let processes = &self.processes;
                let models = &self.models;
                let stores = &self.stores;
                let mean = |p: ProcessKey| {
                    processes[p].time_model.map(|m| models[m].mean()).unwrap_or(0.0)
                };
                let trip = |req: &Request| match &req.kind {
                    RequestKind::Transport(d) => {
                        let origin = stores[d.origin_queue].location;
                        let target = stores[d.target_queue].location;
                        let m = crate::domain::time_model::Metric::Euclidean;
                        m.distance(res.location, origin) + m.distance(origin, target)
                    }
                    RequestKind::Production => 0.0,
                };
                let ctx = SelectionCtx { mean_duration: &mean, trip_distance: &trip };
                select_next(res.policy, &res.pending, &executable, &ctx)
            };

            let Some(idx) = selected else {
                // Nothing executable: the resource is on standby until the
                // next wakeup.
                return Ok(());
            };

            let process = self.resources[resource].pending[idx].process;
            let needs_setup = {
                let res = &self.resources[resource];
                res.setup_needed(process, res.states.iter().map(|s| (*s, &self.state_specs[*s])))
            };
            if let Some(setup_state) = needs_setup {
                self.start_setup(resource, setup_state, process)?;
                return Ok(());
            }

            self.start_activity(resource, idx)?;
        }
    }

    /// Transport requests whose target reservation vanished are sent back to
    /// the router before selection.
    fn reroute_invalidated(&mut self, resource: ResourceKey) -> Result<()> {
        let mut invalid: Vec<usize> = Vec::new();
        for (i, req) in self.resources[resource].pending.iter().enumerate() {
            if let RequestKind::Transport(d) = &req.kind
                && !self.stores[d.target_queue].holds_reservation(d.reservation)
            {
                invalid.push(i);
            }
        }
        for i in invalid.into_iter().rev() {
            let req = self.resources[resource].pending.remove(i);
            log::debug!("Re-routing product after its reservation was withdrawn (request {:?})", req.id);
            self.route_product(req.product)?;
        }
        Ok(())
    }

    fn executable_mask(&self, resource: ResourceKey) -> Vec<bool> {
        let res = &self.resources[resource];
        res.pending
            .iter()
            .map(|req| {
                let Some(slot) = res.process_slot(req.process) else {
                    return false;
                };
                if slot.active >= slot.capacity {
                    return false;
                }
                if res.is_process_down(req.process) {
                    return false;
                }
                // A configuration change requires the pipeline to drain first.
                let needs_setup = res
                    .setup_needed(req.process, res.states.iter().map(|s| (*s, &self.state_specs[*s])))
                    .is_some();
                if needs_setup && !res.running.is_empty() {
                    return false;
                }
                // Tool copies for every declared dependency.
                let tools_ok = self.processes[req.process].tools.iter().all(|aux| self.auxiliaries[*aux].total_available() > 0);
                if !tools_ok {
                    return false;
                }
                match &req.kind {
                    // The result needs somewhere to go.
                    RequestKind::Production => res.output_queues.iter().any(|q| self.stores[*q].has_space()),
                    RequestKind::Transport(d) => self.stores[d.origin_queue].contains(req.product),
                }
            })
            .collect()
    }

    fn start_setup(&mut self, resource: ResourceKey, state: StateKey, target: ProcessKey) -> Result<()> {
        let model = match self.state_specs[state].kind {
            StateKind::Setup { time_model, .. } => time_model,
            _ => return Err(self.invariant("setup started from a non-setup state".into())),
        };
        let duration = self.sample_duration(model)?;
        let expected_end = self.clock + duration;
        let end_event = self.events.schedule_at(expected_end, SimEvent::SetupEnd { resource });

        self.push_record(LogActor::Resource(resource), LogState::Machine(state), LogStateType::Setup, LogActivity::StartState, None, Some(expected_end), None);
        self.resources[resource].active_setup = Some(SetupRun { state, target, end_event, expected_end, paused_remaining: None });
        Ok(())
    }

    fn on_setup_end(&mut self, resource: ResourceKey) -> Result<()> {
        let setup = self.resources[resource]
            .active_setup
            .take()
            .ok_or_else(|| self.invariant("setup finished on a resource without an active setup".into()))?;
        self.resources[resource].current_setup = Some(setup.target);
        self.push_record(LogActor::Resource(resource), LogState::Machine(setup.state), LogStateType::Setup, LogActivity::EndState, None, None, None);
        self.wake_controller(resource);
        Ok(())
    }

    fn start_activity(&mut self, resource: ResourceKey, idx: usize) -> Result<()> {
        let request = self.resources[resource].pending.remove(idx);
        match request.kind {
            RequestKind::Production => self.start_production(resource, request),
            RequestKind::Transport(_) => self.start_transport(resource, request),
        }
    }

    fn start_production(&mut self, resource: ResourceKey, request: Request) -> Result<()> {
        let process = request.process;

        // Destination of the results: the least loaded output queue with
        // space.
        let out_queue = {
            let res = &self.resources[resource];
            let mut best: Option<(QueueKey, usize)> = None;
            for queue in &res.output_queues {
                let store = &self.stores[*queue];
                if store.has_space() {
                    let load = store.load();
                    if best.is_none_or(|(_, l)| load < l) {
                        best = Some((*queue, load));
                    }
                }
            }
            match best {
                Some((q, _)) => q,
                None => return Err(self.invariant("production dispatched without output space".into())),
            }
        };

        // Lot formation: pull compatible pending requests into this activity.
        let mut requests = vec![request];
        if let Some(lot) = self.processes[process].lot {
            let mut extra: Vec<usize> = Vec::new();
            for (i, req) in self.resources[resource].pending.iter().enumerate() {
                if requests.len() + extra.len() >= lot.max_lot_size {
                    break;
                }
                if req.process == process && matches!(req.kind, RequestKind::Production) {
                    extra.push(i);
                }
            }
            for i in extra.into_iter().rev() {
                requests.push(self.resources[resource].pending.remove(i));
            }
            // Keep lot members in arrival order.
            requests.sort_by_key(|r| r.id);
        }

        // One shared target queue; one reservation per member.
        let mut outputs: Vec<(QueueKey, ReservationId)> = Vec::new();
        let mut kept: Vec<Request> = Vec::new();
        for req in requests.drain(..) {
            let rid = ReservationId(self.next_reservation);
            self.next_reservation += 1;
            if self.stores[out_queue].reserve(rid) == ReserveOutcome::Reserved {
                self.active_reservations += 1;
                outputs.push((out_queue, rid));
                kept.push(req);
            } else {
                // The lot outgrew the queue; the member stays pending.
                self.resources[resource].pending.push(req);
            }
        }
        // Push-backs above may have disturbed arrival order.
        self.resources[resource].pending.sort_by_key(|r| r.id);
        let requests = kept;
        if requests.is_empty() {
            return Err(self.invariant("production activity lost all members to a full output queue".into()));
        }

        // Tool copies are held per activity, one per declared dependency.
        let mut tools: Vec<(AuxiliaryKey, QueueKey)> = Vec::new();
        let tool_deps = self.processes[process].tools.clone();
        let at = self.resources[resource].location;
        for aux in tool_deps {
            let stores = &self.stores;
            let storage = self.auxiliaries[aux].acquire_nearest(at, |q| stores[q].location);
            match storage {
                Some(q) => tools.push((aux, q)),
                None => return Err(self.invariant("tool availability changed within one event step".into())),
            }
        }

        // The whole lot runs on a single draw.
        let model = self.processes[process]
            .time_model
            .ok_or_else(|| self.invariant(format!("process '{}' has no time model", self.processes[process].id)))?;
        let duration = self.sample_duration(model)?;
        let expected_end = self.clock + duration;

        // Members leave their input queues the moment work starts.
        for req in &requests {
            let queue = self.products[req.product]
                .location
                .ok_or_else(|| self.invariant("production started for a product outside any queue".into()))?;
            if !self.stores[queue].take(req.product) {
                return Err(self.invariant("product missing from its input queue at activity start".into()));
            }
            self.products[req.product].location = None;
            self.notify_queue_freed(queue);
        }

        let id = ActivityId(self.next_activity);
        self.next_activity += 1;
        let wakeup = self.events.schedule_at(expected_end, SimEvent::ActivityEnd { resource, activity: id });

        let state_type = self.process_state_type(process);
        for req in &requests {
            let serial = self.products[req.product].serial;
            self.push_record(LogActor::Resource(resource), LogState::Process(process), state_type, LogActivity::StartState, Some(serial), Some(expected_end), None);
        }

        if let Some(slot) = self.resources[resource].process_slot_mut(process) {
            slot.active += 1;
        }
        self.resources[resource].current_setup = Some(process);
        self.resources[resource].running.push(Activity {
            id,
            process,
            requests,
            phase: ActivityPhase::Production,
            started_at: self.clock,
            expected_end,
            wakeup,
            wakeup_at: expected_end,
            paused_remaining: None,
            outputs,
            tools,
        });
        Ok(())
    }

    fn start_transport(&mut self, resource: ResourceKey, request: Request) -> Result<()> {
        let RequestKind::Transport(delivery) = &request.kind else {
            return Err(self.invariant("transport start on a non-transport request".into()));
        };
        let process = request.process;
        let model = self.processes[process]
            .time_model
            .ok_or_else(|| self.invariant(format!("transport process '{}' has no time model", self.processes[process].id)))?;

        let origin_loc = self.stores[delivery.origin_queue].location;
        let target_loc = self.stores[delivery.target_queue].location;
        let here = self.resources[resource].location;

        let empty_leg = self
            .models[model]
            .sample(&SampleCtx::leg(self.clock, here, origin_loc))
            .ok_or_else(|| self.invariant("transport model failed to produce an empty-leg duration".into()))?;
        let loaded_leg = self
            .models[model]
            .sample(&SampleCtx::leg(self.clock, origin_loc, target_loc))
            .ok_or_else(|| self.invariant("transport model failed to produce a loaded-leg duration".into()))?;

        let expected_end = self.clock + empty_leg + loaded_leg;
        let id = ActivityId(self.next_activity);
        self.next_activity += 1;
        let wakeup = self.events.schedule_at(self.clock + empty_leg, SimEvent::TransportPickup { resource, activity: id });

        let serial = self.products[request.product].serial;
        self.push_record(
            LogActor::Resource(resource),
            LogState::Process(process),
            LogStateType::Transport,
            LogActivity::StartState,
            Some(serial),
            Some(expected_end),
            Some(target_loc),
        );

        if let Some(slot) = self.resources[resource].process_slot_mut(process) {
            slot.active += 1;
        }
        self.resources[resource].running.push(Activity {
            id,
            process,
            requests: vec![request],
            phase: ActivityPhase::TransportToPickup { loaded_duration: loaded_leg },
            started_at: self.clock,
            expected_end,
            wakeup,
            wakeup_at: self.clock + empty_leg,
            paused_remaining: None,
            outputs: Vec::new(),
            tools: Vec::new(),
        });
        Ok(())
    }

    fn on_transport_pickup(&mut self, resource: ResourceKey, activity: ActivityId) -> Result<()> {
        let (loaded, product, origin_queue) = {
            let act = self.resources[resource]
                .activity(activity)
                .ok_or_else(|| self.invariant("pickup fired for an unknown activity".into()))?;
            let ActivityPhase::TransportToPickup { loaded_duration } = act.phase else {
                return Err(self.invariant("pickup fired outside the empty-travel phase".into()));
            };
            let req = &act.requests[0];
            let RequestKind::Transport(d) = &req.kind else {
                return Err(self.invariant("transport activity without a delivery".into()));
            };
            (loaded_duration, req.product, d.origin_queue)
        };

        if !self.stores[origin_queue].take(product) {
            return Err(self.invariant("product vanished from its origin queue before pickup".into()));
        }
        self.notify_queue_freed(origin_queue);
        self.products[product].location = None;

        let pickup_at = self.stores[origin_queue].location;
        self.resources[resource].location = pickup_at;

        let expected_end = self.clock + loaded;
        let wakeup = self.events.schedule_at(expected_end, SimEvent::ActivityEnd { resource, activity });
        let act = self.resources[resource].activity_mut(activity).expect("activity checked above");
        act.phase = ActivityPhase::TransportLoaded;
        act.expected_end = expected_end;
        act.wakeup = wakeup;
        act.wakeup_at = expected_end;
        Ok(())
    }

    fn on_activity_end(&mut self, resource: ResourceKey, activity: ActivityId) -> Result<()> {
        let act = self.resources[resource]
            .take_activity(activity)
            .ok_or_else(|| self.invariant("activity end fired for an unknown activity".into()))?;

        if let Some(slot) = self.resources[resource].process_slot_mut(act.process) {
            slot.active = slot.active.saturating_sub(1);
        }

        match act.phase {
            ActivityPhase::Production => self.complete_production(resource, act)?,
            ActivityPhase::TransportLoaded => self.complete_transport(resource, act)?,
            ActivityPhase::TransportToPickup { .. } => {
                return Err(self.invariant("activity ended while still fetching its product".into()));
            }
        }

        self.wake_controller(resource);
        Ok(())
    }

    fn complete_production(&mut self, resource: ResourceKey, act: Activity) -> Result<()> {
        let state_type = self.process_state_type(act.process);

        // Results move into the reserved output slots.
        for (req, (queue, rid)) in act.requests.iter().zip(act.outputs.iter()) {
            if self.stores[*queue].commit(*rid, req.product).is_err() {
                return Err(self.invariant(format!("output reservation {rid:?} unknown on queue '{}'", self.stores[*queue].id)));
            }
            self.active_reservations -= 1;
            self.products[req.product].location = Some(*queue);
        }

        // Tools return to the nearest storage; whoever waits on them wakes.
        let at = self.resources[resource].location;
        for (aux, _) in &act.tools {
            let stores = &self.stores;
            self.auxiliaries[*aux].release_nearest(at, |q| stores[q].location);
            for watcher in self.auxiliary_watchers.get(*aux).cloned().unwrap_or_default() {
                self.wake_controller(watcher);
            }
        }

        for req in &act.requests {
            let serial = self.products[req.product].serial;
            self.push_record(LogActor::Resource(resource), LogState::Process(act.process), state_type, LogActivity::EndState, Some(serial), None, None);
        }

        // Advance every member's plan and send it on its way.
        for req in &act.requests {
            let product = req.product;
            let node = self.products[product].active_node.take();
            if let Some(node) = node {
                self.products[product].plan.complete(node);
            }
            self.products[product].steps_completed += 1;
            self.route_product(product)?;
        }
        Ok(())
    }

    fn complete_transport(&mut self, resource: ResourceKey, act: Activity) -> Result<()> {
        let req = act.requests.into_iter().next().ok_or_else(|| self.invariant("transport activity without request".into()))?;
        let RequestKind::Transport(delivery) = &req.kind else {
            return Err(self.invariant("transport completion on a non-transport request".into()));
        };

        let target_loc = self.stores[delivery.target_queue].location;
        self.resources[resource].location = target_loc;

        let serial = self.products[req.product].serial;
        self.push_record(
            LogActor::Resource(resource),
            LogState::Process(act.process),
            LogStateType::Transport,
            LogActivity::EndState,
            Some(serial),
            None,
            Some(target_loc),
        );

        self.deliver(req.product, delivery)
    }

    // --- Breakdowns ---

    fn on_breakdown_begin(&mut self, resource: ResourceKey, state: StateKey) -> Result<()> {
        let spec = self.state_specs[state].clone();
        match spec.kind {
            StateKind::Breakdown { repair_time_model, .. } => {
                let first = self.resources[resource].down.is_empty();
                self.resources[resource].down.push(state);
                self.push_record(LogActor::Resource(resource), LogState::Machine(state), LogStateType::Breakdown, LogActivity::StartState, None, None, None);
                if first {
                    self.pause_all(resource)?;
                }
                let repair = self.sample_duration(repair_time_model)?;
                self.events.schedule_at(self.clock + repair, SimEvent::RepairEnd { resource, state });
                Ok(())
            }
            StateKind::ProcessBreakdown { repair_time_model, process, .. } => {
                self.resources[resource].process_down.push(process);
                self.push_record(LogActor::Resource(resource), LogState::Machine(state), LogStateType::ProcessBreakdown, LogActivity::StartState, None, None, None);
                if !self.resources[resource].is_down() {
                    self.pause_matching(resource, process)?;
                }
                let repair = self.sample_duration(repair_time_model)?;
                self.events.schedule_at(self.clock + repair, SimEvent::RepairEnd { resource, state });
                Ok(())
            }
            StateKind::Setup { .. } => Err(self.invariant("breakdown fired for a setup state".into())),
        }
    }

    fn on_repair_end(&mut self, resource: ResourceKey, state: StateKey) -> Result<()> {
        let spec = self.state_specs[state].clone();
        match spec.kind {
            StateKind::Breakdown { time_model, .. } => {
                let res = &mut self.resources[resource];
                if let Some(pos) = res.down.iter().position(|s| *s == state) {
                    res.down.remove(pos);
                }
                self.push_record(LogActor::Resource(resource), LogState::Machine(state), LogStateType::Breakdown, LogActivity::EndState, None, None, None);

                if !self.resources[resource].is_down() {
                    self.resume_paused(resource)?;
                }

                let ttf = self.sample_duration(time_model)?;
                self.events.schedule_at(self.clock + ttf, SimEvent::BreakdownBegin { resource, state });
                self.wake_controller(resource);
                Ok(())
            }
            StateKind::ProcessBreakdown { time_model, process, .. } => {
                let res = &mut self.resources[resource];
                if let Some(pos) = res.process_down.iter().position(|p| *p == process) {
                    res.process_down.remove(pos);
                }
                self.push_record(LogActor::Resource(resource), LogState::Machine(state), LogStateType::ProcessBreakdown, LogActivity::EndState, None, None, None);

                if !self.resources[resource].is_down() && !self.resources[resource].is_process_down(process) {
                    self.resume_matching(resource, process)?;
                }

                let ttf = self.sample_duration(time_model)?;
                self.events.schedule_at(self.clock + ttf, SimEvent::BreakdownBegin { resource, state });
                self.wake_controller(resource);
                Ok(())
            }
            StateKind::Setup { .. } => Err(self.invariant("repair fired for a setup state".into())),
        }
    }

    /// Pauses every running activity and the active setup. Remaining
    /// durations are saved and resumed after repair.
    fn pause_all(&mut self, resource: ResourceKey) -> Result<()> {
        let ids: Vec<ActivityId> = self.resources[resource].running.iter().filter(|a| !a.is_paused()).map(|a| a.id).collect();
        for id in ids {
            self.pause_activity(resource, id);
        }
        let clock = self.clock;
        if let Some(setup) = &mut self.resources[resource].active_setup
            && setup.paused_remaining.is_none()
        {
            let remaining = (setup.expected_end - clock).max(0.0);
            setup.paused_remaining = Some(remaining);
            let event = setup.end_event;
            self.events.cancel(event);
        }
        Ok(())
    }

    fn pause_matching(&mut self, resource: ResourceKey, process: ProcessKey) -> Result<()> {
        let ids: Vec<ActivityId> = self.resources[resource]
            .running
            .iter()
            .filter(|a| !a.is_paused() && a.process == process)
            .map(|a| a.id)
            .collect();
        for id in ids {
            self.pause_activity(resource, id);
        }
        Ok(())
    }

    fn pause_activity(&mut self, resource: ResourceKey, id: ActivityId) {
        let clock = self.clock;
        let mut interrupt: Option<(ProcessKey, Option<ProductKey>)> = None;
        if let Some(act) = self.resources[resource].activity_mut(id) {
            let remaining = (act.wakeup_at - clock).max(0.0);
            act.paused_remaining = Some(remaining);
            let wakeup = act.wakeup;
            let product = act.requests.first().map(|r| r.product);
            let process = act.process;
            self.events.cancel(wakeup);
            interrupt = Some((process, product));
        }
        if let Some((process, product)) = interrupt {
            let serial = product.and_then(|p| self.products.get(p)).map(|p| p.serial);
            let state_type = self.process_state_type(process);
            self.push_record(LogActor::Resource(resource), LogState::Process(process), state_type, LogActivity::StartInterrupt, serial, None, None);
        }
    }

    fn resume_paused(&mut self, resource: ResourceKey) -> Result<()> {
        let blocked: Vec<ProcessKey> = self.resources[resource].process_down.clone();
        let ids: Vec<ActivityId> = self.resources[resource]
            .running
            .iter()
            .filter(|a| a.is_paused() && !blocked.contains(&a.process))
            .map(|a| a.id)
            .collect();
        for id in ids {
            self.resume_activity(resource, id)?;
        }

        let clock = self.clock;
        let mut rearm: Option<f64> = None;
        if let Some(setup) = &mut self.resources[resource].active_setup
            && let Some(remaining) = setup.paused_remaining.take()
        {
            setup.expected_end = clock + remaining;
            rearm = Some(setup.expected_end);
        }
        if let Some(at) = rearm {
            let event = self.events.schedule_at(at, SimEvent::SetupEnd { resource });
            if let Some(setup) = &mut self.resources[resource].active_setup {
                setup.end_event = event;
            }
        }
        Ok(())
    }

    fn resume_matching(&mut self, resource: ResourceKey, process: ProcessKey) -> Result<()> {
        let ids: Vec<ActivityId> = self.resources[resource]
            .running
            .iter()
            .filter(|a| a.is_paused() && a.process == process)
            .map(|a| a.id)
            .collect();
        for id in ids {
            self.resume_activity(resource, id)?;
        }
        Ok(())
    }

    fn resume_activity(&mut self, resource: ResourceKey, id: ActivityId) -> Result<()> {
        if self.resources[resource].activity(id).is_none() {
            return Err(self.invariant("resumed an unknown activity".into()));
        }
        let clock = self.clock;
        let (process, product, at, phase) = {
            let act = self.resources[resource].activity_mut(id).expect("presence checked above");
            let remaining = act.paused_remaining.take().expect("resumed an activity that was not paused");
            act.wakeup_at = clock + remaining;
            act.expected_end = match act.phase {
                ActivityPhase::TransportToPickup { loaded_duration } => act.wakeup_at + loaded_duration,
                _ => act.wakeup_at,
            };
            (act.process, act.requests.first().map(|r| r.product), act.wakeup_at, act.phase)
        };

        let event = match phase {
            ActivityPhase::TransportToPickup { .. } => self.events.schedule_at(at, SimEvent::TransportPickup { resource, activity: id }),
            _ => self.events.schedule_at(at, SimEvent::ActivityEnd { resource, activity: id }),
        };
        if let Some(act) = self.resources[resource].activity_mut(id) {
            act.wakeup = event;
        }

        let serial = product.and_then(|p| self.products.get(p)).map(|p| p.serial);
        let state_type = self.process_state_type(process);
        self.push_record(LogActor::Resource(resource), LogState::Process(process), state_type, LogActivity::EndInterrupt, serial, None, None);
        Ok(())
    }

    // --- Wakeup plumbing ---

    /// Signals every party interested in `queue` gaining a free slot.
    fn notify_queue_freed(&mut self, queue: QueueKey) {
        for watcher in self.queue_watchers.get(queue).cloned().unwrap_or_default() {
            self.wake_controller(watcher);
        }
        for source in self.source_watchers.get(queue).cloned().unwrap_or_default() {
            if !self.sources[source].retry_scheduled && !self.sources[source].deferred.is_empty() {
                self.sources[source].retry_scheduled = true;
                self.events.schedule_at(self.clock, SimEvent::SourceRetry(source));
            }
        }
        if !self.router_waitlist.is_empty() && !self.router_wake_scheduled {
            self.router_wake_scheduled = true;
            self.events.schedule_at(self.clock, SimEvent::RouterWake);
        }
    }

    fn wake_controller(&mut self, resource: ResourceKey) {
        if !self.resources[resource].wake_scheduled {
            self.resources[resource].wake_scheduled = true;
            self.events.schedule_at(self.clock, SimEvent::ControllerWake(resource));
        }
    }

    // --- Helpers ---

    fn process_state_type(&self, process: ProcessKey) -> LogStateType {
        if self.processes[process].is_transport() {
            LogStateType::Transport
        } else {
            LogStateType::Production
        }
    }

    fn sample_duration(&mut self, model: TimeModelKey) -> Result<f64> {
        let ctx = SampleCtx::at(self.clock);
        self.models[model]
            .sample(&ctx)
            .ok_or_else(|| self.invariant(format!("time model '{}' produced no duration", self.models[model].id)))
    }

    fn release_reservation(&mut self, queue: QueueKey, rid: ReservationId) -> Result<()> {
        if self.stores[queue].release(rid).is_err() {
            return Err(self.invariant(format!("released unknown reservation {rid:?} on queue '{}'", self.stores[queue].id)));
        }
        self.active_reservations -= 1;
        self.notify_queue_freed(queue);
        Ok(())
    }

    fn invariant(&self, reason: String) -> Error {
        Error::Invariant { time: self.clock, seed: self.seed, event_index: self.event_index, reason }
    }

    fn push_record(
        &mut self,
        actor: LogActor,
        state: LogState,
        state_type: LogStateType,
        activity: LogActivity,
        product: Option<ProductSerial>,
        expected_end: Option<f64>,
        target_location: Option<[f64; 2]>,
    ) {
        self.log.push(EventRecord { time: self.clock, actor, state, state_type, activity, product, expected_end, target_location });
    }

    /// Sum of outstanding reservations over every store; used by the
    /// conservation checks in the test suite.
    pub fn total_reserved(&self) -> u64 {
        self.stores.values().map(|s| s.reserved() as u64).sum()
    }
}
