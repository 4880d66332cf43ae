//! Process-wide pool with configure-then-get semantics.
//!
//! Several parts of a program may each want to configure "the" pool. The
//! manager settles who wins with a [`Precedence`] level plus two tiebreaks,
//! so that configuration order does not matter.

use crate::config::{Config, QueueMode};
use crate::error::{Error, Result};
use crate::executor::ThreadPool;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, OnceLock};

static GLOBAL_MANAGER: OnceLock<PoolManager> = OnceLock::new();

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Precedence {
    #[default]
    Low,
    Medium,
    High,
}

struct Installed {
    config: Config,
    precedence: Precedence,
    pool: Arc<ThreadPool>,
}

impl Installed {
    /// Whether `config` at `precedence` should replace this configuration.
    fn yields_to(&self, config: &Config, precedence: Precedence) -> bool {
        if precedence != self.precedence {
            return precedence > self.precedence;
        }

        let (current, requested) = (self.config.queue_mode, config.queue_mode);
        if current != requested {
            return requested == QueueMode::Priority;
        }

        // same level and mode: a fixed pool wins over an elastic one
        self.config.is_elastic() && !config.is_elastic()
    }
}

#[derive(Default)]
struct ManagerState {
    installed: Option<Installed>,
    fallback: Option<Arc<ThreadPool>>,
}

pub struct PoolManager {
    state: Mutex<ManagerState>,
}

impl PoolManager {
    /// A standalone manager. Most code wants [`PoolManager::global`].
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ManagerState::default()),
        }
    }

    pub fn global() -> &'static PoolManager {
        GLOBAL_MANAGER.get_or_init(PoolManager::new)
    }

    /// Install a pool built from `config` unless the current one takes
    /// precedence. Returns whether the configuration was applied.
    ///
    /// A replaced pool keeps serving whoever still holds it and drains when
    /// the last handle goes away.
    pub fn configure(&self, config: Config, precedence: Precedence) -> Result<bool> {
        let replaced = {
            let mut state = self.state.lock();
            if let Some(current) = &state.installed {
                if !current.yields_to(&config, precedence) {
                    tracing::debug!(
                        current = ?current.precedence,
                        requested = ?precedence,
                        "pool configuration rejected"
                    );
                    return Ok(false);
                }
            }

            let pool = Arc::new(ThreadPool::new(config.clone())?);
            tracing::info!(
                ?precedence,
                mode = config.queue_mode.name(),
                elastic = config.is_elastic(),
                "pool configured"
            );
            state.installed.replace(Installed {
                config,
                precedence,
                pool,
            })
        };

        // may be the last handle, and dropping a pool waits for it to drain
        drop(replaced);
        Ok(true)
    }

    /// The configured pool.
    pub fn pool(&self) -> Result<Arc<ThreadPool>> {
        self.state
            .lock()
            .installed
            .as_ref()
            .map(|installed| installed.pool.clone())
            .ok_or(Error::NotInitialized)
    }

    /// The configured pool, or a default FIFO pool sized to the machine
    /// when nothing was configured. The fallback does not count as a
    /// configuration.
    pub fn pool_or_default(&self) -> Result<Arc<ThreadPool>> {
        let mut state = self.state.lock();
        if let Some(installed) = &state.installed {
            return Ok(installed.pool.clone());
        }
        if let Some(fallback) = &state.fallback {
            return Ok(fallback.clone());
        }

        let pool = Arc::new(ThreadPool::new(Config::default())?);
        state.fallback = Some(pool.clone());
        Ok(pool)
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().installed.is_some()
    }

    /// Precedence of the current configuration.
    pub fn precedence(&self) -> Option<Precedence> {
        self.state
            .lock()
            .installed
            .as_ref()
            .map(|installed| installed.precedence)
    }

    /// Forget the configuration so the next `configure` always wins.
    pub fn reset(&self) {
        let (installed, fallback) = {
            let mut state = self.state.lock();
            (state.installed.take(), state.fallback.take())
        };
        drop(installed);
        drop(fallback);
    }
}

impl Default for PoolManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PoolManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PoolManager")
            .field(
                "precedence",
                &state.installed.as_ref().map(|installed| installed.precedence),
            )
            .field(
                "mode",
                &state.installed.as_ref().map(|installed| installed.config.queue_mode),
            )
            .field("fallback", &state.fallback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn config(mode: QueueMode, tick_ms: u64) -> Config {
        Config::builder()
            .num_threads(1)
            .max_threads(2)
            .queue_mode(mode)
            .elastic_tick(Duration::from_millis(tick_ms))
            .build()
            .unwrap()
    }

    #[test]
    fn test_global_is_singleton() {
        assert!(std::ptr::eq(PoolManager::global(), PoolManager::global()));
    }

    #[test]
    fn test_first_configuration_wins() {
        let manager = PoolManager::new();
        assert!(!manager.is_initialized());
        assert!(manager
            .configure(config(QueueMode::Fifo, 0), Precedence::High)
            .unwrap());
        assert!(manager.is_initialized());
        assert_eq!(manager.precedence(), Some(Precedence::High));
    }

    #[test]
    fn test_higher_precedence_overrides() {
        let manager = PoolManager::new();
        assert!(manager
            .configure(config(QueueMode::Fifo, 1000), Precedence::Low)
            .unwrap());
        assert!(manager
            .configure(config(QueueMode::Priority, 0), Precedence::High)
            .unwrap());
        assert_eq!(manager.pool().unwrap().mode(), QueueMode::Priority);
    }

    #[test]
    fn test_lower_precedence_rejected() {
        let manager = PoolManager::new();
        assert!(manager
            .configure(config(QueueMode::Priority, 0), Precedence::High)
            .unwrap());
        assert!(!manager
            .configure(config(QueueMode::Fifo, 1000), Precedence::Low)
            .unwrap());
        assert_eq!(manager.precedence(), Some(Precedence::High));
        assert_eq!(manager.pool().unwrap().mode(), QueueMode::Priority);
    }

    #[test]
    fn test_priority_mode_wins_at_same_level() {
        let manager = PoolManager::new();
        manager
            .configure(config(QueueMode::Fifo, 0), Precedence::Medium)
            .unwrap();
        assert!(manager
            .configure(config(QueueMode::Priority, 0), Precedence::Medium)
            .unwrap());
        assert!(!manager
            .configure(config(QueueMode::Fifo, 0), Precedence::Medium)
            .unwrap());
    }

    #[test]
    fn test_fixed_overrides_elastic_at_same_level() {
        let manager = PoolManager::new();
        assert!(manager
            .configure(config(QueueMode::Fifo, 1000), Precedence::Medium)
            .unwrap());
        assert!(manager
            .configure(config(QueueMode::Fifo, 0), Precedence::Medium)
            .unwrap());
        assert!(!manager.pool().unwrap().is_elastic());

        // and not the other way round
        assert!(!manager
            .configure(config(QueueMode::Fifo, 1000), Precedence::Medium)
            .unwrap());
    }

    #[test]
    fn test_pool_before_configure() {
        let manager = PoolManager::new();
        assert!(matches!(manager.pool(), Err(Error::NotInitialized)));
    }

    #[test]
    fn test_default_pool_fallback() {
        let manager = PoolManager::new();
        let first = manager.pool_or_default().unwrap();
        let second = manager.pool_or_default().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!manager.is_initialized());
        assert_eq!(first.mode(), QueueMode::Fifo);
    }

    #[test]
    fn test_pool_reused_after_rejection() {
        let manager = PoolManager::new();
        manager
            .configure(config(QueueMode::Fifo, 0), Precedence::Medium)
            .unwrap();
        let first = manager.pool().unwrap();
        assert!(!manager
            .configure(config(QueueMode::Priority, 1000), Precedence::Low)
            .unwrap());
        let second = manager.pool().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_concurrent_configuration() {
        let manager = Arc::new(PoolManager::new());
        let handles: Vec<_> = [
            (QueueMode::Priority, 1000, Precedence::High),
            (QueueMode::Fifo, 0, Precedence::Low),
        ]
        .into_iter()
        .map(|(mode, tick, precedence)| {
            let manager = manager.clone();
            thread::spawn(move || manager.configure(config(mode, tick), precedence).unwrap())
        })
        .collect();

        let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.iter().any(|&applied| applied));
        assert_eq!(manager.precedence(), Some(Precedence::High));
    }

    #[test]
    fn test_reset() {
        let manager = PoolManager::new();
        manager
            .configure(config(QueueMode::Priority, 0), Precedence::High)
            .unwrap();
        manager.reset();
        assert!(!manager.is_initialized());
        assert!(manager
            .configure(config(QueueMode::Fifo, 0), Precedence::Low)
            .unwrap());
    }
}
