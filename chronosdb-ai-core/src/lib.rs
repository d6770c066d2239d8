//! ChronosDB AI Layer: adaptive scheduling, self-learning query
//! optimization, anomaly detection/self-healing, and temporal index
//! optimization for a single-node relational database.
//!
//! The execution engine itself (parser, executors, storage, WAL, catalog)
//! is out of scope; [`engine_hooks::EngineServices`] is the only boundary
//! this crate depends on, and [`observer::ObserverRegistry`] is the only
//! coupling point the engine needs to drive.

pub mod clock;
pub mod constants;
pub mod engine_hooks;
pub mod error;
pub mod immune;
pub mod learning;
pub mod manager;
pub mod metrics;
pub mod observer;
pub mod scheduler;
pub mod temporal;
pub mod worker_pool;

pub use constants::AiConfig;
pub use engine_hooks::{DmlEvent, DmlOperation, EngineServices, IndexInfo, RecoveryResult};
pub use error::{Error, Result};
pub use manager::{AiManager, AiStatus};
pub use observer::{Observer, ObserverRegistry};
