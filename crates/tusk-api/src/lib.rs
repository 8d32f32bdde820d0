//! Tusk API Library
//!
//! HTTP adapter for the upload protocol engine: header codec, routes,
//! error mapping and application setup. Everything protocol-relevant
//! happens in `tusk-services`; this crate only translates.

pub mod constants;
pub mod error;
pub mod handlers;
pub mod headers;
pub mod setup;
pub mod state;
pub mod telemetry;

// Re-exports
pub use error::ErrorResponse;
pub use setup::{build_router, initialize_app, start_server};
pub use state::AppState;
