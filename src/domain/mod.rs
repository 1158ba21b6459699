pub mod auxiliary;
pub mod controller;
pub mod engine;
pub mod event_log;
pub mod events;
pub mod ids;
pub mod kpi;
pub mod process;
pub mod product;
pub mod queue;
pub mod resource;
pub mod rng;
pub mod router;
pub mod scheduler;
pub mod source;
pub mod state;
pub mod time_model;
