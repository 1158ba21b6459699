use rand::Rng;
use rand_distr::{Distribution, Exp, LogNormal, Normal};
use rand_pcg::Pcg64;

use crate::domain::ids::Location;

/// Distance metric used by distance-based time models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Manhattan,
    Euclidean,
}

impl Metric {
    pub fn distance(self, from: Location, to: Location) -> f64 {
        let dx = from[0] - to[0];
        let dy = from[1] - to[1];
        match self {
            Metric::Manhattan => dx.abs() + dy.abs(),
            Metric::Euclidean => (dx * dx + dy * dy).sqrt(),
        }
    }
}

/// Distribution family of a function time model. The set is closed (§6 of
/// the wire format); unknown names are rejected during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributionFunction {
    Constant,
    Normal,
    Lognormal,
    Exponential,
}

/// Per-call context for sampling. `origin`/`target` are only set for
/// transport legs; distance models need both.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleCtx {
    pub now: f64,
    pub origin: Option<Location>,
    pub target: Option<Location>,
}

impl SampleCtx {
    pub fn at(now: f64) -> Self {
        SampleCtx { now, origin: None, target: None }
    }

    pub fn leg(now: f64, origin: Location, target: Location) -> Self {
        SampleCtx { now, origin: Some(origin), target: Some(target) }
    }
}

#[derive(Debug, Clone)]
enum TimeModelKind {
    /// Draws from a parameterized distribution, pre-drawing `batch_size`
    /// values at a time to amortize distribution setup.
    Function { dist: DistributionFunction, location: f64, scale: f64, batch_size: usize, buffer: Vec<f64> },
    /// Cycles through a fixed list, or draws from it at random.
    Sample { samples: Vec<f64>, randomize: bool, cursor: usize },
    /// Relative deltas (cyclic or one-shot) or absolute timestamps.
    Schedule { entries: Vec<f64>, absolute: bool, cyclic: bool, cursor: usize },
    /// `reaction_time + distance(origin, target) / speed`.
    Distance { speed: f64, reaction_time: f64, metric: Metric },
}

/// A deterministic duration sampler. Each model owns an independent random
/// stream derived from the run seed and the model id, so two runs with the
/// same seed replay the exact same draw sequence.
#[derive(Debug, Clone)]
pub struct TimeModel {
    pub id: String,
    kind: TimeModelKind,
    rng: Pcg64,
    clamp_warned: bool,
}

impl TimeModel {
    pub fn function(
        id: String,
        dist: DistributionFunction,
        location: f64,
        scale: f64,
        batch_size: usize,
        rng: Pcg64,
    ) -> Self {
        TimeModel {
            id,
            kind: TimeModelKind::Function {
                dist,
                location,
                scale,
                batch_size: batch_size.max(1),
                buffer: Vec::new(),
            },
            rng,
            clamp_warned: false,
        }
    }

    pub fn sample_list(id: String, samples: Vec<f64>, randomize: bool, rng: Pcg64) -> Self {
        TimeModel { id, kind: TimeModelKind::Sample { samples, randomize, cursor: 0 }, rng, clamp_warned: false }
    }

    pub fn schedule(id: String, entries: Vec<f64>, absolute: bool, cyclic: bool, rng: Pcg64) -> Self {
        TimeModel { id, kind: TimeModelKind::Schedule { entries, absolute, cyclic, cursor: 0 }, rng, clamp_warned: false }
    }

    pub fn distance(id: String, speed: f64, reaction_time: f64, metric: Metric, rng: Pcg64) -> Self {
        TimeModel { id, kind: TimeModelKind::Distance { speed, reaction_time, metric }, rng, clamp_warned: false }
    }

    /// Draws the next duration. Returns `None` when a one-shot schedule is
    /// exhausted or when a distance model is sampled without locations (the
    /// caller decides whether that is the end of a source or an engine bug).
    pub fn sample(&mut self, ctx: &SampleCtx) -> Option<f64> {
        let raw = match &mut self.kind {
            TimeModelKind::Function { dist, location, scale, batch_size, buffer } => {
                if buffer.is_empty() {
                    Self::refill(&mut self.rng, *dist, *location, *scale, *batch_size, buffer);
                }
                buffer.pop()
            }
            TimeModelKind::Sample { samples, randomize, cursor } => {
                if samples.is_empty() {
                    return None;
                }
                if *randomize {
                    let i = self.rng.random_range(0..samples.len());
                    Some(samples[i])
                } else {
                    let v = samples[*cursor % samples.len()];
                    *cursor += 1;
                    Some(v)
                }
            }
            TimeModelKind::Schedule { entries, absolute, cyclic, cursor } => {
                if *cursor >= entries.len() {
                    if !*cyclic {
                        return None;
                    }
                    *cursor = 0;
                }
                let v = entries[*cursor];
                *cursor += 1;
                if *absolute { Some(v - ctx.now) } else { Some(v) }
            }
            TimeModelKind::Distance { speed, reaction_time, metric } => {
                let (origin, target) = (ctx.origin?, ctx.target?);
                Some(*reaction_time + metric.distance(origin, target) / *speed)
            }
        };

        raw.map(|v| self.clamp(v))
    }

    /// Expected duration of one draw, used by SPT sequencing. Distance models
    /// report their reaction time (distance depends on the call site).
    pub fn mean(&self) -> f64 {
        match &self.kind {
            TimeModelKind::Function { dist, location, scale, .. } => match dist {
                DistributionFunction::Constant => *location,
                DistributionFunction::Normal => *location,
                DistributionFunction::Exponential => *location,
                DistributionFunction::Lognormal => (*location + scale * scale / 2.0).exp(),
            },
            TimeModelKind::Sample { samples, .. } => {
                if samples.is_empty() {
                    0.0
                } else {
                    samples.iter().sum::<f64>() / samples.len() as f64
                }
            }
            TimeModelKind::Schedule { entries, .. } => {
                if entries.is_empty() {
                    0.0
                } else {
                    entries.iter().sum::<f64>() / entries.len() as f64
                }
            }
            TimeModelKind::Distance { reaction_time, .. } => *reaction_time,
        }
    }

    fn refill(
        rng: &mut Pcg64,
        dist: DistributionFunction,
        location: f64,
        scale: f64,
        batch_size: usize,
        buffer: &mut Vec<f64>,
    ) {
        buffer.reserve(batch_size);
        match dist {
            DistributionFunction::Constant => {
                buffer.extend(std::iter::repeat_n(location, batch_size));
            }
            DistributionFunction::Normal => {
                // Scale 0 degenerates to a constant; rand_distr rejects it.
                if scale == 0.0 {
                    buffer.extend(std::iter::repeat_n(location, batch_size));
                } else {
                    let normal = Normal::new(location, scale)
                        .expect("normal parameters were validated at load time");
                    buffer.extend(normal.sample_iter(rng).take(batch_size));
                }
            }
            DistributionFunction::Lognormal => {
                let lognormal = LogNormal::new(location, scale)
                    .expect("lognormal parameters were validated at load time");
                buffer.extend(lognormal.sample_iter(rng).take(batch_size));
            }
            DistributionFunction::Exponential => {
                // `location` is the mean inter-event time, not the rate.
                let exp = Exp::new(1.0 / location)
                    .expect("exponential parameters were validated at load time");
                buffer.extend(exp.sample_iter(rng).take(batch_size));
            }
        }
        // Popping from the back must replay the draw order.
        buffer.reverse();
    }

    /// Negative draws (truncated normal tail, absurd schedules) are clamped
    /// to zero and reported once per model.
    fn clamp(&mut self, value: f64) -> f64 {
        if value < 0.0 {
            if !self.clamp_warned {
                log::warn!("Time model '{}' produced a negative duration ({value}); clamping to 0 from now on.", self.id);
                self.clamp_warned = true;
            }
            0.0
        } else {
            value
        }
    }
}
