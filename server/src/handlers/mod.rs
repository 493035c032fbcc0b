//! HTTP handlers for the identity oracle.

mod health;
mod oracle;
mod transfers;
mod verify;

pub use health::health_check;
pub use oracle::{add_xpub, find_user, oracle_identity, register, update_identity};
pub use transfers::approve_transfer;
pub use verify::{verify_admin, verify_pub_key, verify_xpub};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, warn};
use validator::ValidationErrors;

use crate::error::OracleError;
use crate::keys::KeyError;
use crate::models::{ApiResponse, AttestationResponse};
use crate::oracle::{Attestation, Oracle};

/// Signature algorithm reported with signed attestations (ECDSA secp256k1).
pub const ALGORITHM_ECDSA_SECP256K1: u32 = 1;

/// A failed request, rendered as an `ApiResponse` with `success: false`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body: ApiResponse<()> = ApiResponse::failure(self.message);
        (self.status, Json(body)).into_response()
    }
}

impl From<OracleError> for ApiError {
    fn from(err: OracleError) -> Self {
        let status = match &err {
            OracleError::NotFound { .. } => StatusCode::NOT_FOUND,
            OracleError::InsufficientHeaders { .. } => StatusCode::SERVICE_UNAVAILABLE,
            OracleError::KeySetExists => StatusCode::CONFLICT,
            err if err.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %err, "request failed");
            return Self::new(status, "internal server error");
        }
        warn!(error = %err, status = status.as_u16(), "request refused");
        Self::new(status, err.to_string())
    }
}

impl From<KeyError> for ApiError {
    fn from(err: KeyError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(err: ValidationErrors) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Validation error: {err}"),
        )
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>, ApiError> {
    hex::decode(value.trim())
        .map_err(|err| ApiError::from(OracleError::InvalidRequest(format!("{field}: {err}"))))
}

/// Signs a successful attestation; rejections carry only the description.
fn attestation_response(oracle: &Oracle, attestation: Attestation) -> AttestationResponse {
    match attestation {
        Attestation::Signed {
            sig_hash,
            expiration,
        } => AttestationResponse {
            approved: sig_hash.approved,
            status: None,
            signature: Some(hex::encode(oracle.sign(&sig_hash))),
            algorithm: Some(ALGORITHM_ECDSA_SECP256K1),
            block_height: Some(sig_hash.block_height),
            description: sig_hash.description,
            expiration,
        },
        Attestation::Rejected { description } => AttestationResponse {
            approved: false,
            status: Some("rejected".to_string()),
            description,
            algorithm: None,
            signature: None,
            block_height: None,
            expiration: None,
        },
    }
}
