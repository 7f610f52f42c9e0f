//! SCLMS Server: The HTTP surface of the authentication core.
//!
//! [`router`] wires the handlers behind the authentication gate; the
//! binary in `main.rs` adds configuration, the database and a listener.

pub mod config;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod state;

use axum::Router;
use axum::middleware;
use axum::routing::{get, patch, post};
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, auth, two_factor};

pub use crate::config::ServerArgs;
pub use crate::error::ApiError;
pub use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route(
            "/change-password",
            post(auth::change_password).put(auth::change_password),
        )
        .route("/profile", get(auth::profile));

    let two_factor_routes = Router::new()
        .route("/setup", post(two_factor::setup))
        .route("/enable", post(two_factor::enable))
        .route("/disable", post(two_factor::disable))
        .route("/verify", post(two_factor::verify));

    let admin_routes = Router::new()
        .route("/users/{id}/unlock", patch(admin::unlock_account))
        .route("/users/{id}/reset-password", patch(admin::reset_password))
        .route(
            "/security-policy",
            get(admin::get_policy).put(admin::update_policy),
        );

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/auth", auth_routes)
        .nest("/api/2fa", two_factor_routes)
        .nest("/api/admin", admin_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            gate::authentication_gate,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
