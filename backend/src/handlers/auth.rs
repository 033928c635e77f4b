use axum::{
    extract::{ConnectInfo, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use validator::Validate;

use crate::{
    error::AppError,
    services::{LoginOutcome, LoginRequest},
    state::AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct LoginPayload {
    #[validate(length(min = 1, max = 64))]
    pub username: String,
    #[validate(length(min = 1, max = 256))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResellerSummary {
    pub id: i64,
    pub display_name: String,
    pub role_level: i32,
    pub member_group_id: i64,
    pub balance_credits: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: i64,
    pub reseller: ResellerSummary,
}

impl From<LoginOutcome> for LoginResponse {
    fn from(outcome: LoginOutcome) -> Self {
        Self {
            access_token: outcome.token,
            token_type: "Bearer".to_string(),
            expires_at: outcome.expires_at,
            reseller: ResellerSummary {
                id: outcome.principal.id,
                display_name: outcome.principal.display_name,
                role_level: outcome.principal.role_level,
                member_group_id: outcome.principal.member_group_id,
                balance_credits: outcome.balance_credits,
            },
        }
    }
}

pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<LoginResponse>, AppError> {
    payload.validate()?;

    let outcome = state
        .authenticator
        .authenticate(LoginRequest {
            username: payload.username,
            password: payload.password,
            source_address: peer.ip().to_string(),
        })
        .await?;

    Ok(Json(outcome.into()))
}
