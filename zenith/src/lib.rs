pub mod config;
pub mod controller;

pub use config::{StoreConfig, locate_config};
pub use controller::{SHUTDOWN_BROADCAST, Zenith};
