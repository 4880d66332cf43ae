use crate::error::{Error, Result};
use std::time::Duration;

/// How queued tasks are ordered for dequeue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueMode {
    /// Strict submission order, no retries.
    Fifo,
    /// Highest priority first, ties in submission order.
    Priority,
}

impl Default for QueueMode {
    fn default() -> Self {
        QueueMode::Fifo
    }
}

impl QueueMode {
    pub fn name(&self) -> &'static str {
        match self {
            QueueMode::Fifo => "fifo",
            QueueMode::Priority => "priority",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub num_threads: Option<usize>,
    pub min_threads: usize,
    pub max_threads: Option<usize>,
    pub queue_mode: QueueMode,

    /// Polling interval of the elastic controller. Zero keeps the pool at a
    /// fixed size.
    pub elastic_tick: Duration,

    /// Fraction of the upper threshold below which idle workers are never
    /// retired.
    pub retire_floor: f64,

    pub thread_name_prefix: String,
    pub stack_size: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_threads: None,
            min_threads: 1,
            max_threads: None,
            queue_mode: QueueMode::default(),
            elastic_tick: Duration::ZERO,
            retire_floor: 0.2,
            thread_name_prefix: "heapwell-worker".to_string(),
            stack_size: Some(2 * 1024 * 1024),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(max) = self.max_threads {
            if self.min_threads > max {
                return Err(Error::config(format!(
                    "min_threads ({}) exceeds max_threads ({})",
                    self.min_threads, max
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.retire_floor) {
            return Err(Error::config("retire_floor must be in [0, 1]"));
        }

        if self.thread_name_prefix.is_empty() {
            return Err(Error::config("thread_name_prefix must not be empty"));
        }

        if self.stack_size == Some(0) {
            return Err(Error::config("stack_size must be > 0"));
        }

        Ok(())
    }

    pub fn is_elastic(&self) -> bool {
        !self.elastic_tick.is_zero()
    }

    /// Upper bound on the worker count: the hardware thread count, lowered
    /// by `max_threads` when set. Never below one or below `min_threads`.
    pub fn upper_threshold(&self) -> usize {
        let hardware = num_cpus::get().max(1);
        self.max_threads
            .map_or(hardware, |max| max.min(hardware))
            .max(1)
            .max(self.lower_threshold())
    }

    pub fn lower_threshold(&self) -> usize {
        self.min_threads.max(1)
    }

    /// Requested worker count clamped into `[lower, upper]`.
    pub fn worker_threads(&self) -> usize {
        let requested = self.num_threads.unwrap_or_else(num_cpus::get);
        requested.clamp(self.lower_threshold(), self.upper_threshold())
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn num_threads(mut self, n: usize) -> Self {
        self.config.num_threads = Some(n);
        self
    }

    pub fn min_threads(mut self, n: usize) -> Self {
        self.config.min_threads = n;
        self
    }

    pub fn max_threads(mut self, n: usize) -> Self {
        self.config.max_threads = Some(n);
        self
    }

    pub fn queue_mode(mut self, mode: QueueMode) -> Self {
        self.config.queue_mode = mode;
        self
    }

    pub fn elastic_tick(mut self, tick: Duration) -> Self {
        self.config.elastic_tick = tick;
        self
    }

    pub fn retire_floor(mut self, floor: f64) -> Self {
        self.config.retire_floor = floor;
        self
    }

    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
