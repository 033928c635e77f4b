pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod services;
pub mod state;
pub mod utils;

use axum::{
    http::{header, Method},
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

/// Builds the HTTP router. Every `/api` route except login and health requires
/// a bearer token.
pub fn app(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/auth/login", post(handlers::login))
        .route("/api/health", get(handlers::health));

    let reseller_routes = Router::new()
        .route("/api/lines", get(handlers::list_lines))
        .route("/api/mag-devices", get(handlers::list_mag_devices))
        .route("/api/enigma-devices", get(handlers::list_enigma_devices))
        .route("/api/payments", get(handlers::list_payments))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_principal,
        ));

    Router::new()
        .merge(public_routes)
        .merge(reseller_routes)
        .layer(
            ServiceBuilder::new()
                .layer(axum_middleware::from_fn(middleware::request_id))
                .layer(TraceLayer::new_for_http())
                .layer(axum_middleware::from_fn(middleware::log_error_responses))
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods([Method::GET, Method::POST])
                        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
                ),
        )
        .with_state(state)
}
