use axum::{extract::State, Json};
use validator::Validate;

use super::{attestation_response, ApiResult};
use crate::app_state::AppState;
use crate::error::OracleError;
use crate::keys::{ExtendedKey, ExtendedKeys, RawAddress};
use crate::models::{
    ApiResponse, AttestationResponse, VerifyAdminRequest, VerifyPubKeyRequest, VerifyXPubRequest,
};
use crate::oracle::{AdminCertificateRequest, AdminTarget};

pub async fn verify_pub_key(
    State(state): State<AppState>,
    Json(payload): Json<VerifyPubKeyRequest>,
) -> ApiResult<AttestationResponse> {
    payload.validate()?;
    let xpub: ExtendedKey = payload.xpub.parse()?;

    let cancel = state.request_token();
    let attestation = state
        .oracle
        .verify_pub_key(&cancel, &payload.entity, &xpub, payload.index)
        .await?;
    Ok(Json(ApiResponse::ok(attestation_response(
        &state.oracle,
        attestation,
    ))))
}

pub async fn verify_xpub(
    State(state): State<AppState>,
    Json(payload): Json<VerifyXPubRequest>,
) -> ApiResult<AttestationResponse> {
    payload.validate()?;
    let xpubs: ExtendedKeys = payload.xpubs.parse()?;

    let cancel = state.request_token();
    let attestation = state
        .oracle
        .verify_xpub(&cancel, &payload.entity, &xpubs)
        .await?;
    Ok(Json(ApiResponse::ok(attestation_response(
        &state.oracle,
        attestation,
    ))))
}

pub async fn verify_admin(
    State(state): State<AppState>,
    Json(payload): Json<VerifyAdminRequest>,
) -> ApiResult<AttestationResponse> {
    payload.validate()?;
    let xpubs: ExtendedKeys = payload.xpubs.parse()?;
    let target = match (payload.entity, payload.entity_contract) {
        (Some(entity), None) => AdminTarget::Entity(entity),
        (None, Some(contract)) => {
            AdminTarget::Contract(RawAddress::decode(&contract, state.oracle.network())?)
        }
        _ => {
            return Err(OracleError::InvalidRequest(
                "exactly one of entity and entity_contract is required".to_string(),
            )
            .into())
        }
    };

    let request = AdminCertificateRequest {
        xpubs,
        index: payload.index,
        target,
        expiration: payload.expiration,
    };
    let cancel = state.request_token();
    let attestation = state
        .oracle
        .create_admin_certificate(&cancel, &request)
        .await?;
    Ok(Json(ApiResponse::ok(attestation_response(
        &state.oracle,
        attestation,
    ))))
}
