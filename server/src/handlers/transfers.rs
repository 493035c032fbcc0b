use axum::{extract::State, Json};
use validator::Validate;

use super::{attestation_response, ApiResult};
use crate::app_state::AppState;
use crate::keys::{ExtendedKeys, InstrumentId, RawAddress};
use crate::models::{ApiResponse, AttestationResponse, TransferApproveRequest};
use crate::oracle::TransferRequest;

pub async fn approve_transfer(
    State(state): State<AppState>,
    Json(payload): Json<TransferApproveRequest>,
) -> ApiResult<AttestationResponse> {
    payload.validate()?;
    let request = TransferRequest {
        contract: RawAddress::decode(&payload.contract, state.oracle.network())?,
        instrument: payload.instrument_id.parse::<InstrumentId>()?,
        xpubs: payload.xpubs.parse::<ExtendedKeys>()?,
        index: payload.index,
        expiration: payload.expiration,
    };

    let cancel = state.request_token();
    let attestation = state
        .oracle
        .create_receive_signature(&cancel, &request)
        .await?;
    Ok(Json(ApiResponse::ok(attestation_response(
        &state.oracle,
        attestation,
    ))))
}
