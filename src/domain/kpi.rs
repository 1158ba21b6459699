use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::domain::event_log::{EventRecord, LogActivity, LogActor, LogStateType};
use crate::domain::ids::{ProductSerial, ResourceKey};

/// Name and type of a product, indexed by serial. Outlives the product
/// itself so KPIs can be computed after sinks destroyed the instances.
#[derive(Debug, Clone)]
pub struct ProductInfo {
    pub name: String,
    pub product_type: String,
}

/// Absolute time one resource spent in each composite state over the run.
/// The four buckets partition the horizon.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StateTimes {
    pub productive: f64,
    pub standby: f64,
    pub setup: f64,
    pub down: f64,
}

impl StateTimes {
    pub fn total(&self) -> f64 {
        self.productive + self.standby + self.setup + self.down
    }

    /// Share of the horizon, in percent, as (PR, SB, ST, UD).
    pub fn shares(&self, horizon: f64) -> (f64, f64, f64, f64) {
        if horizon <= 0.0 {
            return (0.0, 0.0, 0.0, 0.0);
        }
        (
            100.0 * self.productive / horizon,
            100.0 * self.standby / horizon,
            100.0 * self.setup / horizon,
            100.0 * self.down / horizon,
        )
    }
}

/// The KPI set surfaced after a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Kpis {
    pub horizon: f64,
    /// Finished products per product type.
    pub throughput: BTreeMap<String, u64>,
    /// Time-weighted average WIP per product type.
    pub wip: BTreeMap<String, f64>,
    pub total_wip: f64,
    /// Mean creation-to-finish time per product type, over finished products.
    pub throughput_time: BTreeMap<String, f64>,
    /// Per-resource composite state times.
    pub time_in_state: BTreeMap<String, StateTimes>,
}

/// One row of the flat KPI export: a metric name, the entity it refers to
/// and the value.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct KpiRow {
    #[serde(rename = "Metric")]
    pub metric: &'static str,
    #[serde(rename = "Entity")]
    pub entity: String,
    #[serde(rename = "Value")]
    pub value: f64,
}

impl Kpis {
    /// Flattens the KPI set into export rows, in a stable order.
    pub fn rows(&self) -> Vec<KpiRow> {
        let mut rows = Vec::new();
        for (product_type, count) in &self.throughput {
            rows.push(KpiRow { metric: "throughput", entity: product_type.clone(), value: *count as f64 });
        }
        for (product_type, wip) in &self.wip {
            rows.push(KpiRow { metric: "wip", entity: product_type.clone(), value: *wip });
        }
        rows.push(KpiRow { metric: "wip", entity: "total".to_string(), value: self.total_wip });
        for (product_type, time) in &self.throughput_time {
            rows.push(KpiRow { metric: "throughput_time", entity: product_type.clone(), value: *time });
        }
        for (resource, times) in &self.time_in_state {
            let (pr, sb, st, ud) = times.shares(self.horizon);
            rows.push(KpiRow { metric: "time_share_pr", entity: resource.clone(), value: pr });
            rows.push(KpiRow { metric: "time_share_sb", entity: resource.clone(), value: sb });
            rows.push(KpiRow { metric: "time_share_st", entity: resource.clone(), value: st });
            rows.push(KpiRow { metric: "time_share_ud", entity: resource.clone(), value: ud });
        }
        rows
    }
}

/// Streams KPI rows as `;`-separated CSV.
pub fn write_kpi_csv<W: std::io::Write>(kpis: &Kpis, writer: W) -> csv::Result<()> {
    let mut wtr = csv::WriterBuilder::new().delimiter(b';').from_writer(writer);
    for row in kpis.rows() {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

#[derive(Default)]
struct Replay {
    last_time: f64,
    production: u32,
    setup: u32,
    down: u32,
    times: StateTimes,
}

impl Replay {
    fn advance(&mut self, to: f64) {
        let dt = to - self.last_time;
        if dt > 0.0 {
            // Composite priority: DOWN > SETUP > PRODUCTIVE > STANDBY.
            if self.down > 0 {
                self.times.down += dt;
            } else if self.setup > 0 {
                self.times.setup += dt;
            } else if self.production > 0 {
                self.times.productive += dt;
            } else {
                self.times.standby += dt;
            }
            self.last_time = to;
        } else {
            self.last_time = self.last_time.max(to);
        }
    }
}

/// Derives every KPI from the event log alone. `resources` lists each
/// resource's key and display name in declaration order.
pub fn compute(
    records: &[EventRecord],
    horizon: f64,
    products: &[ProductInfo],
    resources: &[(ResourceKey, String)],
) -> Kpis {
    let mut kpis = Kpis { horizon, ..Kpis::default() };

    let mut replays: HashMap<ResourceKey, Replay> = resources.iter().map(|(k, _)| (*k, Replay::default())).collect();

    // WIP integration state, per type and total.
    let mut wip_now: BTreeMap<&str, f64> = BTreeMap::new();
    let mut wip_acc: BTreeMap<&str, f64> = BTreeMap::new();
    let mut wip_last: f64 = 0.0;
    let mut total_now: f64 = 0.0;
    let mut total_acc: f64 = 0.0;

    let mut created_at: HashMap<ProductSerial, f64> = HashMap::new();
    let mut cycle_sum: BTreeMap<&str, f64> = BTreeMap::new();
    let mut cycle_count: BTreeMap<&str, u64> = BTreeMap::new();

    for record in records {
        let t = record.time.min(horizon);

        match record.activity {
            LogActivity::CreatedProduct | LogActivity::FinishedProduct => {
                let serial = record.product.expect("product lifecycle record without product");
                let ptype = products[serial.0 as usize].product_type.as_str();

                // Integrate WIP up to this instant before the count changes.
                let dt = t - wip_last;
                if dt > 0.0 {
                    for (ty, n) in &wip_now {
                        *wip_acc.entry(*ty).or_insert(0.0) += n * dt;
                    }
                    total_acc += total_now * dt;
                    wip_last = t;
                }

                if record.activity == LogActivity::CreatedProduct {
                    *wip_now.entry(ptype).or_insert(0.0) += 1.0;
                    total_now += 1.0;
                    created_at.insert(serial, t);
                } else {
                    *wip_now.entry(ptype).or_insert(0.0) -= 1.0;
                    total_now -= 1.0;
                    *kpis.throughput.entry(ptype.to_string()).or_insert(0) += 1;
                    if let Some(start) = created_at.get(&serial) {
                        *cycle_sum.entry(ptype).or_insert(0.0) += t - start;
                        *cycle_count.entry(ptype).or_insert(0) += 1;
                    }
                }
            }
            _ => {}
        }

        if let LogActor::Resource(key) = record.actor
            && let Some(replay) = replays.get_mut(&key)
        {
            replay.advance(t);
            match (record.activity, record.state_type) {
                (LogActivity::StartState, LogStateType::Production | LogStateType::Transport) => replay.production += 1,
                (LogActivity::EndState | LogActivity::Truncated, LogStateType::Production | LogStateType::Transport) => {
                    replay.production = replay.production.saturating_sub(1);
                }
                (LogActivity::StartState, LogStateType::Setup) => replay.setup += 1,
                (LogActivity::EndState | LogActivity::Truncated, LogStateType::Setup) => {
                    replay.setup = replay.setup.saturating_sub(1);
                }
                (LogActivity::StartState, LogStateType::Breakdown | LogStateType::ProcessBreakdown) => replay.down += 1,
                (LogActivity::EndState, LogStateType::Breakdown | LogStateType::ProcessBreakdown) => {
                    replay.down = replay.down.saturating_sub(1);
                }
                _ => {}
            }
        }
    }

    // Close every integration out to the horizon.
    let dt = horizon - wip_last;
    if dt > 0.0 {
        for (ty, n) in &wip_now {
            *wip_acc.entry(*ty).or_insert(0.0) += n * dt;
        }
        total_acc += total_now * dt;
    }

    if horizon > 0.0 {
        for (ty, acc) in wip_acc {
            kpis.wip.insert(ty.to_string(), acc / horizon);
        }
        kpis.total_wip = total_acc / horizon;
    }

    for (ty, sum) in cycle_sum {
        let n = cycle_count[ty];
        if n > 0 {
            kpis.throughput_time.insert(ty.to_string(), sum / n as f64);
        }
    }

    for (key, name) in resources {
        let mut replay = replays.remove(key).unwrap_or_default();
        replay.advance(horizon);
        kpis.time_in_state.insert(name.clone(), replay.times);
    }

    kpis
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event_log::{LogActivity, LogActor, LogState, LogStateType};
    use slotmap::SlotMap;

    fn record(
        time: f64,
        actor: LogActor,
        state_type: LogStateType,
        activity: LogActivity,
        product: Option<ProductSerial>,
    ) -> EventRecord {
        EventRecord {
            time,
            actor,
            state: LogState::Arrival,
            state_type,
            activity,
            product,
            expected_end: None,
            target_location: None,
        }
    }

    #[test]
    fn test_time_in_state_partitions_horizon() {
        let mut arena: SlotMap<ResourceKey, ()> = SlotMap::with_key();
        let m1 = arena.insert(());
        let actor = LogActor::Resource(m1);

        let records = vec![
            record(1.0, actor, LogStateType::Production, LogActivity::StartState, None),
            record(3.0, actor, LogStateType::Breakdown, LogActivity::StartState, None),
            record(4.0, actor, LogStateType::Breakdown, LogActivity::EndState, None),
            record(6.0, actor, LogStateType::Production, LogActivity::EndState, None),
        ];
        let kpis = compute(&records, 10.0, &[], &[(m1, "M1".to_string())]);
        let t = &kpis.time_in_state["M1"];

        assert!((t.down - 1.0).abs() < 1e-9);
        assert!((t.productive - 4.0).abs() < 1e-9, "productive was {}", t.productive);
        assert!((t.standby - 5.0).abs() < 1e-9);
        assert!((t.total() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_setup_outranks_production_but_not_down() {
        let mut arena: SlotMap<ResourceKey, ()> = SlotMap::with_key();
        let m1 = arena.insert(());
        let actor = LogActor::Resource(m1);

        let records = vec![
            record(0.0, actor, LogStateType::Setup, LogActivity::StartState, None),
            record(2.0, actor, LogStateType::Setup, LogActivity::EndState, None),
        ];
        let kpis = compute(&records, 4.0, &[], &[(m1, "M1".to_string())]);
        let t = &kpis.time_in_state["M1"];
        assert!((t.setup - 2.0).abs() < 1e-9);
        assert!((t.standby - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_wip_and_throughput_from_lifecycle_records() {
        let mut sources: SlotMap<crate::domain::ids::SourceKey, ()> = SlotMap::with_key();
        let mut sinks: SlotMap<crate::domain::ids::SinkKey, ()> = SlotMap::with_key();
        let src = LogActor::Source(sources.insert(()));
        let snk = LogActor::Sink(sinks.insert(()));

        let products = vec![
            ProductInfo { name: "A_0".into(), product_type: "A".into() },
            ProductInfo { name: "A_1".into(), product_type: "A".into() },
        ];
        let records = vec![
            record(0.0, src, LogStateType::Source, LogActivity::CreatedProduct, Some(ProductSerial(0))),
            record(2.0, src, LogStateType::Source, LogActivity::CreatedProduct, Some(ProductSerial(1))),
            record(4.0, snk, LogStateType::Sink, LogActivity::FinishedProduct, Some(ProductSerial(0))),
        ];
        let kpis = compute(&records, 10.0, &products, &[]);

        assert_eq!(kpis.throughput["A"], 1);
        // WIP: 1 product over [0,2), 2 over [2,4), 1 over [4,10) -> (2+4+6)/10.
        assert!((kpis.wip["A"] - 1.2).abs() < 1e-9);
        assert!((kpis.total_wip - 1.2).abs() < 1e-9);
        assert!((kpis.throughput_time["A"] - 4.0).abs() < 1e-9);
    }
}
