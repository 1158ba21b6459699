use std::path::Path;

use crate::api::system_model_dto::SystemModelDto;
use crate::domain::engine::{Engine, EngineOptions};
use crate::domain::event_log::{EventRecord, EventRow, LogActor, LogState};
use crate::domain::kpi::{compute, Kpis};
use crate::error::{Error, Result};
use crate::loader::{build::build, parser::parse_system_model, validate::validate};

/// The run facade: validate + build, run to a horizon, read results.
///
/// A runner is single-shot; rebuild it (same configuration, same seed) to
/// replay a run.
pub struct Runner {
    engine: Engine,
    dto: SystemModelDto,
    ran: bool,
}

impl Runner {
    /// Validates the configuration and resolves it into an engine. `seed`
    /// overrides the configuration's seed when given.
    pub fn initialize(dto: SystemModelDto, seed: Option<u64>) -> Result<Runner> {
        validate(&dto)?;
        let engine = build(&dto, seed)?;
        log::info!(
            "System model '{}' initialized: {} resources, {} sources, {} sinks, seed {}.",
            dto.id,
            engine.resources.len(),
            engine.sources.len(),
            engine.sinks.len(),
            engine.seed
        );
        Ok(Runner { engine, dto, ran: false })
    }

    pub fn from_path(path: impl AsRef<Path>, seed: Option<u64>) -> Result<Runner> {
        let dto = parse_system_model(path)?;
        Runner::initialize(dto, seed)
    }

    pub fn with_options(mut self, options: EngineOptions) -> Runner {
        self.engine.options = options;
        self
    }

    /// Advances the simulation to `horizon` and returns the raw event
    /// records.
    pub fn run(&mut self, horizon: f64) -> Result<&[EventRecord]> {
        if self.ran {
            return Err(Error::Invariant {
                time: self.engine.clock,
                seed: self.engine.seed,
                event_index: self.engine.event_index,
                reason: "a runner is single-shot; build a new one to run again".into(),
            });
        }
        self.ran = true;
        self.engine.run(horizon)?;
        log::info!(
            "Run complete at t={}: {} events processed, {} log records.",
            self.engine.clock,
            self.engine.event_index,
            self.engine.log.len()
        );
        Ok(self.engine.log.records())
    }

    /// Derives the KPI set from the event log.
    pub fn results(&self) -> Kpis {
        let resources: Vec<_> = self
            .engine
            .resource_order
            .iter()
            .map(|key| (*key, self.engine.resources[*key].id.clone()))
            .collect();
        compute(self.engine.log.records(), self.engine.horizon, &self.engine.product_infos, &resources)
    }

    /// Renders the event log into rows with resolved names.
    pub fn event_log(&self) -> Vec<EventRow> {
        self.engine.log.records().iter().map(|r| self.render(r)).collect()
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn configuration(&self) -> &SystemModelDto {
        &self.dto
    }

    fn render(&self, record: &EventRecord) -> EventRow {
        let resource = match record.actor {
            LogActor::Resource(key) => self.engine.resources[key].id.clone(),
            LogActor::Source(key) => self.engine.sources[key].id.clone(),
            LogActor::Sink(key) => self.engine.sinks[key].id.clone(),
        };
        let state = match record.state {
            LogState::Process(key) => self.engine.processes[key].id.clone(),
            LogState::Machine(key) => self.engine.state_specs[key].id.clone(),
            LogState::Arrival | LogState::Exit => resource.clone(),
        };
        let product = record
            .product
            .map(|serial| self.engine.product_infos[serial.0 as usize].name.clone())
            .unwrap_or_default();
        EventRow {
            time: record.time,
            resource,
            state,
            state_type: record.state_type.as_str().to_string(),
            activity: record.activity.as_str().to_string(),
            product,
            expected_end: record.expected_end.map(|t| t.to_string()).unwrap_or_default(),
            target_location: record.target_location.map(|[x, y]| format!("[{x}, {y}]")).unwrap_or_default(),
        }
    }
}
