//! Admin API subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP request
//!     → TraceLayer
//!     → auth.rs (token check)
//!     → handlers.rs
//!         push: body → Proposal(admin) → reconciliation controller → receipt
//!         read: registry snapshot / engine session stats
//! ```
//!
//! # Design Decisions
//! - A push is a complete replacement set, never a delta
//! - The handler waits for the commit so the response reports the generation
//! - `POST /` mirrors `POST /admin/destinations` for older clients

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::reconcile::ReconcileHandle;
use crate::relay::RelayEngine;
use self::auth::admin_auth_middleware;
use self::handlers::*;

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub handle: ReconcileHandle,
    pub engine: Arc<RelayEngine>,
    pub token: Arc<str>,
}

impl AdminState {
    pub fn new(handle: ReconcileHandle, engine: Arc<RelayEngine>, token: impl Into<Arc<str>>) -> Self {
        Self {
            handle,
            engine,
            token: token.into(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/", post(push_destinations))
        .route("/admin/destinations", get(get_destinations).post(push_destinations))
        .route("/admin/status", get(get_status))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
