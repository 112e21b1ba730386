//! Job execution for rtrain.
//!
//! [`trainer::Trainer`] is the worker loop. It is embedded in the `rtraind`
//! server and also ships as the standalone `rtrain-worker` binary; claims
//! are atomic, so any number of workers may share one database.

pub mod config;
pub mod progress;
pub mod trainer;

pub use config::WorkerConfig;
pub use trainer::Trainer;
