//! Campaign launch, send workers and the delivery ledger
//!
//! [`LaunchOrchestrator`] turns a campaign into one queued job per eligible
//! subscriber. [`WorkerPool`] runs a fixed number of workers, each settling
//! jobs through a shared [`Dispatcher`]: send through the capacity-limited
//! transport, append to the [`Ledger`], bump the campaign counters and
//! complete the campaign once every job is terminal. [`Engine`] bundles all
//! of it for the HTTP layer and the binary.

mod audience;
mod config;
pub mod control;
mod engine;
mod error;
pub mod ledger;
mod launch;
mod opens;
pub mod render;
mod worker;
mod worker_pool;

pub use audience::AudienceResolver;
pub use config::WorkerConfig;
pub use engine::{Engine, EngineParts};
pub use error::{ControlError, DeliveryError, LaunchError, Result};
pub use launch::{LaunchOrchestrator, LaunchReport};
pub use ledger::{
    AppendOutcome, FileLedger, Ledger, LedgerConfig, LedgerError, MemoryLedger,
};
pub use opens::{OpenOutcome, record_open};
pub use worker::{Dispatcher, JobOutcome};
pub use worker_pool::WorkerPool;
