use crate::config::Config;
use crate::executor::worker::WorkerId;

/// What the elastic controller should do on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingDecision {
    Hold,
    /// Stop this idle worker.
    Retire(WorkerId),
    /// Spawn this many additional workers.
    Grow(usize),
}

/// Load observed by the controller at the start of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSnapshot {
    pub workers: usize,
    pub queued_tasks: usize,
    /// Some idle worker, if any is currently waiting for work.
    pub idle_worker: Option<WorkerId>,
}

/// Resize rules: retire at most one idle worker per tick, grow enough to
/// cover the backlog in one go.
#[derive(Debug, Clone)]
pub struct ElasticPolicy {
    pub min_workers: usize,
    pub max_workers: usize,
    pub retire_floor: f64,
}

impl From<&Config> for ElasticPolicy {
    fn from(config: &Config) -> Self {
        Self {
            min_workers: config.lower_threshold(),
            max_workers: config.upper_threshold(),
            retire_floor: config.retire_floor,
        }
    }
}

impl ElasticPolicy {
    /// Worker count at or below which nobody is retired.
    pub fn floor(&self) -> usize {
        let fraction = (self.max_workers as f64 * self.retire_floor).ceil() as usize;
        fraction.max(self.min_workers)
    }

    pub fn decide(&self, load: &LoadSnapshot) -> ScalingDecision {
        if load.workers > load.queued_tasks && load.workers > self.floor() {
            if let Some(id) = load.idle_worker {
                return ScalingDecision::Retire(id);
            }
        }

        if load.queued_tasks > load.workers && load.workers < self.max_workers {
            let missing = load.queued_tasks - load.workers;
            let headroom = self.max_workers - load.workers;
            return ScalingDecision::Grow(missing.min(headroom));
        }

        ScalingDecision::Hold
    }
}
