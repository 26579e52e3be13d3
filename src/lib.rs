//! vpsa-relay: forwards storage-array telemetry to metric and log sinks.
//!
//! This library polls a storage-array management API for performance
//! counters and its append-only event log, then relays them to a metrics
//! time-series sink and a log-aggregation sink with checkpointed,
//! crash-safe resume for the log stream.
//!
//! # Example
//!
//! ```ignore
//! use vpsa_relay::{run_cycle, Config, error::CycleError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), CycleError> {
//!     let config = Config::from_file("config.yaml")?;
//!     let stats = run_cycle(&config).await?;
//!     println!("Shipped {} records", stats.records_shipped);
//!     Ok(())
//! }
//! ```

pub mod checkpoint;
pub mod config;
pub mod cycle;
pub mod error;
pub mod forwarder;
pub mod shipper;
pub mod sink;
pub mod source;
pub mod telemetry;

// Re-export main types
pub use config::Config;
pub use cycle::{run_cycle, CycleStats, Orchestrator};
