//! HTTP surface of the dispatch engine
//!
//! # Endpoints
//!
//! - **`POST /api/campaigns/{id}/launch`** - launch a campaign
//! - **`POST /api/campaigns/{id}/pause`**, **`/resume`** - stop and restart consumption
//! - **`GET /api/campaigns`**, **`GET /api/campaigns/{id}`** - status and counters
//! - **`GET /api/deliveries/{key}`** - ledger records of one tracking key
//! - **`GET /track/open/{key}`** - the open-tracking pixel, always a 1x1 GIF
//!   and never held back by the request timeout
//! - **`GET /health/live`**, **`GET /health/ready`** - liveness and readiness probes

mod checker;
mod config;
mod error;
mod handlers;
mod pixel;
mod server;

pub use checker::{HealthChecker, HealthStatus};
pub use config::{ApiConfig, HealthConfig};
pub use error::ApiError;
pub use pixel::TRANSPARENT_GIF;
pub use server::{ApiServer, AppState, router};
