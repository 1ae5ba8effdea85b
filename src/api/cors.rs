//! CORS policy for the HTTP surface.

use tower_http::cors::{Any, CorsLayer};

/// Permissive CORS for the admin/query endpoints. This service has no
/// cookie-based auth to protect, so an allow-any origin policy is the
/// simplest correct default; tighten at the reverse proxy if needed.
pub fn permissive_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}
