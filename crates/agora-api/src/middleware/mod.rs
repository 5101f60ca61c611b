//! HTTP middleware
//!
//! Authentication lives in [`crate::auth::middleware`]; this module holds
//! the cross-cutting layers applied to every route.

pub mod metrics;
pub mod security_headers;

pub use metrics::metrics_middleware;
pub use security_headers::security_headers_middleware;
