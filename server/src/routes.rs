//! Route definitions for the identity oracle API

use axum::{
    routing::{get, post},
    Router,
};

use crate::app_state::AppState;
use crate::handlers::*;

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

// Oracle identity and registration routes
pub fn oracle_routes() -> Router<AppState> {
    Router::new()
        .route("/oracle/id", get(oracle_identity))
        .route("/oracle/register", post(register))
        .route("/oracle/addXPub", post(add_xpub))
        .route("/oracle/user", post(find_user))
        .route("/oracle/updateIdentity", post(update_identity))
}

// Identity attestation routes
pub fn identity_routes() -> Router<AppState> {
    Router::new()
        .route("/identity/verifyPubKey", post(verify_pub_key))
        .route("/identity/verifyXPub", post(verify_xpub))
        .route("/identity/verifyAdmin", post(verify_admin))
}

pub fn transfer_routes() -> Router<AppState> {
    Router::new().route("/transfer/approve", post(approve_transfer))
}

/// All API routes bound to `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(oracle_routes())
        .merge(identity_routes())
        .merge(transfer_routes())
        .with_state(state)
}
