//! Tessera Engine
//!
//! The engine is the glue between an ingress transport and the tessera data
//! plane. It owns startup — parsing and validating the shard map, opening one
//! connection pool per backend, running migrations, wiring the shard router,
//! index registry, plugin registry, and notifier — and exposes the full set
//! of operations as plain async methods on [`Engine`]:
//!
//! - cell writes (persist → index → notify) and reads
//! - partition scans and index queries
//! - plugin administration
//! - liveness/readiness probes and operator counters
//!
//! HTTP routing, request middleware, and metric export are deliberately not
//! here; an outer adaptor maps requests onto [`Engine`] methods and
//! [`EngineError::kind`] onto status codes.
//!
//! ## Startup sequence
//!
//! 1. Validate the shard map: contiguous backend ranges covering exactly
//!    `{0 … num_shards-1}`, no overlaps, no gaps ([`ShardMap`]).
//! 2. Connect and ping every backend; any failure aborts.
//! 3. Create cell tables and the checkpoint table per backend range, the
//!    plugins table on the first backend, and index tables per definition.
//! 4. Register cell stores and index stores per shard; reload plugins.
//!
//! After bootstrap the router and index registry are effectively read-only;
//! only plugin mutations take locks.

pub mod bootstrap;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod health;
pub mod index_config;
pub mod metrics;
pub mod shard_config;

pub use bootstrap::{bootstrap, bootstrap_from_paths, Backend};
pub use config::EngineConfig;
pub use coordinator::Engine;
pub use error::{ConfigError, EngineError, ErrorKind};
pub use health::{check_backends, BackendHealth, BackendPinger, ReadinessReport};
pub use index_config::IndexConfig;
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use shard_config::{BackendConfig, ShardMap};
