//! Task ordering and pool sizing.
//!
//! Holds the generic locked heap, the pool's FIFO-or-priority task container,
//! and the rules the elastic controller uses to grow and shrink the pool.

pub mod elastic;
pub mod priority;
pub(crate) mod queue;

pub use elastic::{ElasticPolicy, LoadSnapshot, ScalingDecision};
pub use priority::{Comparator, Completable, NaturalOrder, OrderBy, PriorityQueue, Reversed};
