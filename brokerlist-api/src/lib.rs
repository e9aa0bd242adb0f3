//! Brokerlist API - HTTP Layer
//!
//! Axum server over the ranking engine and cache manager. Exposes the admin
//! cache endpoint, cached rankings, health checks and Prometheus metrics.
//!
//! All handlers share one [`AppState`] built at startup.

pub mod auth;
pub mod config;
pub mod error;
pub mod macros;
pub mod routes;
pub mod seed;
pub mod state;
pub mod telemetry;

pub use auth::{authorize_admin, bearer_token, AdminToken};
pub use config::{ApiConfig, LogFormat};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::create_api_router;
pub use seed::{AvailabilityRow, SeedData};
pub use state::AppState;
