use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use crate::server::admin::{
    block_license_handler, deactivate_activation_handler, delete_license_handler,
    extend_license_handler, generate_license_handler, get_license_handler,
    list_activations_handler, list_licenses_handler, login_handler, logout_handler,
    stats_handler, unblock_license_handler,
};
use crate::server::client_api::{activate_handler, validate_handler};
use crate::server::handlers::{health_handler, license_info_handler, AppState};
use crate::server::logging::request_logging_middleware;

/// Build the application router for the license server.
///
/// # Routes
///
/// ## Client endpoints
/// - `POST /activate` - Bind a license to a device
/// - `POST /validate` - Check a device's license
/// - `GET /info/{license_key}` - Public display info
/// - `GET /health` - Liveness check
///
/// ## Admin endpoints (bearer session required except for login)
/// - `POST /admin/login`, `POST /admin/logout`
/// - `GET /admin/stats`
/// - `POST /admin/generate`
/// - `GET /admin/licenses`, `GET|DELETE /admin/licenses/{license_key}`
/// - `POST /admin/block`, `POST /admin/unblock`, `POST /admin/extend`
/// - `GET /admin/activations`, `DELETE /admin/activation/{id}`
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Client endpoints
        .route("/activate", post(activate_handler))
        .route("/validate", post(validate_handler))
        .route("/info/:license_key", get(license_info_handler))
        .route("/health", get(health_handler))
        // Admin endpoints
        .route("/admin/login", post(login_handler))
        .route("/admin/logout", post(logout_handler))
        .route("/admin/stats", get(stats_handler))
        .route("/admin/generate", post(generate_license_handler))
        .route("/admin/licenses", get(list_licenses_handler))
        .route(
            "/admin/licenses/:license_key",
            get(get_license_handler).delete(delete_license_handler),
        )
        .route("/admin/block", post(block_license_handler))
        .route("/admin/unblock", post(unblock_license_handler))
        .route("/admin/extend", post(extend_license_handler))
        .route("/admin/activations", get(list_activations_handler))
        .route(
            "/admin/activation/:activation_id",
            delete(deactivate_activation_handler),
        )
        .layer(middleware::from_fn(request_logging_middleware))
        .with_state(state)
}
