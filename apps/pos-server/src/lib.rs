//! # Tavola POS Server
//!
//! JSON over HTTP on top of the `tavola-db` services. Handlers translate
//! requests into service calls and results into the response envelope:
//!
//! ```text
//! { "success": true,  "data": {...},   "message": "Checkout complete" }
//! { "success": true,  "config": {...}, "message": "Redirect to payment gateway" }
//! { "success": false, "code": "CONFLICT", "reason": "ALREADY_PAID", "message": "already paid" }
//! ```

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::{ConfigError, ServerConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::router;
pub use state::AppState;
