use axum::{Json, extract::State, http::StatusCode};
use kcd_server_domain::{
    account::{AccountService, UserId},
    app::AppState,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiJson, MyServiceError};

#[derive(Deserialize)]
pub struct CredentialsRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    message: String,
    user_id: UserId,
}

#[derive(Serialize)]
pub struct JsonUser {
    id: UserId,
    username: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    token: String,
    user: JsonUser,
}

pub async fn register(
    State(app): State<AppState>,
    ApiJson(req): ApiJson<CredentialsRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), MyServiceError> {
    let user_id = app
        .account_service
        .register(&req.username, &req.password)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully!".to_string(),
            user_id,
        }),
    ))
}

pub async fn login(
    State(app): State<AppState>,
    ApiJson(req): ApiJson<CredentialsRequest>,
) -> Result<Json<LoginResponse>, MyServiceError> {
    let (token, user) = app
        .account_service
        .login(&req.username, &req.password)
        .await?;
    Ok(Json(LoginResponse {
        token,
        user: JsonUser {
            id: user.id,
            username: user.username,
        },
    }))
}
