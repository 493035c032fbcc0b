use axum::{extract::State, Json};
use validator::Validate;

use super::{decode_hex, ApiResult};
use crate::app_state::AppState;
use crate::keys::{ExtendedKeys, PublicKey};
use crate::models::{
    AddXPubRequest, ApiResponse, FindUserRequest, KeySetResponse, OracleIdentityResponse,
    RegisterRequest, RegisterResponse, UpdateIdentityRequest, UserIdResponse,
};
use crate::oracle::Decision;

pub async fn oracle_identity(State(state): State<AppState>) -> Json<ApiResponse<OracleIdentityResponse>> {
    let identity = state.oracle.identity();
    let network = state.oracle.network();
    Json(ApiResponse::ok(OracleIdentityResponse {
        public_key: identity.public_key.to_string(),
        contract_address: identity.contract_address.map(|address| address.encode(network)),
    }))
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<RegisterResponse> {
    payload.validate()?;
    let public_key: PublicKey = payload.public_key.parse()?;
    let signature = decode_hex("signature", &payload.signature)?;

    let cancel = state.request_token();
    let decision = state
        .oracle
        .register(&cancel, &payload.entity, public_key, &signature)
        .await?;

    Ok(Json(ApiResponse::ok(match decision {
        Decision::Accepted(user_id) => RegisterResponse {
            approved: true,
            status: "registered".to_string(),
            description: String::new(),
            user_id: Some(user_id),
        },
        Decision::Rejected { description } => RegisterResponse {
            approved: false,
            status: "rejected".to_string(),
            description,
            user_id: None,
        },
    })))
}

pub async fn add_xpub(
    State(state): State<AppState>,
    Json(payload): Json<AddXPubRequest>,
) -> ApiResult<KeySetResponse> {
    payload.validate()?;
    let xpubs: ExtendedKeys = payload.xpubs.parse()?;
    let signature = decode_hex("signature", &payload.signature)?;

    let cancel = state.request_token();
    let key_set = state
        .oracle
        .add_key_set(
            &cancel,
            payload.user_id,
            xpubs,
            payload.required_signers,
            &signature,
        )
        .await?;

    Ok(Json(ApiResponse::ok(KeySetResponse {
        id: key_set.id,
        user_id: key_set.user_id,
        required_signers: key_set.required_signers,
    })))
}

pub async fn find_user(
    State(state): State<AppState>,
    Json(payload): Json<FindUserRequest>,
) -> ApiResult<UserIdResponse> {
    payload.validate()?;
    let xpubs: ExtendedKeys = payload.xpubs.parse()?;

    let cancel = state.request_token();
    let user_id = state.oracle.find_user_id(&cancel, &xpubs).await?;
    Ok(Json(ApiResponse::ok(UserIdResponse { user_id })))
}

pub async fn update_identity(
    State(state): State<AppState>,
    Json(payload): Json<UpdateIdentityRequest>,
) -> ApiResult<RegisterResponse> {
    payload.validate()?;
    let signature = decode_hex("signature", &payload.signature)?;

    let cancel = state.request_token();
    let decision = state
        .oracle
        .update_identity(&cancel, payload.user_id, &payload.entity, &signature)
        .await?;

    Ok(Json(ApiResponse::ok(match decision {
        Decision::Accepted(()) => RegisterResponse {
            approved: true,
            status: "updated".to_string(),
            description: String::new(),
            user_id: Some(payload.user_id),
        },
        Decision::Rejected { description } => RegisterResponse {
            approved: false,
            status: "rejected".to_string(),
            description,
            user_id: None,
        },
    })))
}
