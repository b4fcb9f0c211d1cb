//! Account endpoints: availability checks, captcha, registration, login,
//! password change and token upkeep.

use super::AppState;
use crate::auth::{PasswordChange, Registration};
use crate::response::{ApiResponse, ApiResult};
use hyper::{Body, Request};
use std::sync::Arc;

pub async fn exist_email(req: Request<Body>, state: Arc<AppState>) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let exists = state
        .accounts
        .exist_email(params.require("user_email")?)
        .await?;
    Ok(ApiResponse::success(exists))
}

pub async fn exist_username(req: Request<Body>, state: Arc<AppState>) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let exists = state
        .accounts
        .exist_username(params.require("user_name")?)
        .await?;
    Ok(ApiResponse::success(exists))
}

pub async fn generate_captcha(req: Request<Body>, state: Arc<AppState>) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    state.captcha.issue(params.require("user_email")?).await?;
    Ok(ApiResponse::ok())
}

pub async fn register(req: Request<Body>, state: Arc<AppState>) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let registration = Registration {
        username: params.require("user_name")?.to_string(),
        email: params.require("user_email")?.to_string(),
        password: params.require("user_password")?.to_string(),
        captcha: params.require("captcha")?.to_string(),
    };
    let token = state.accounts.register(registration).await?;
    Ok(ApiResponse::success(token))
}

pub async fn login(req: Request<Body>, state: Arc<AppState>) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let token = state
        .accounts
        .login(
            params.require("user_email")?,
            params.require("user_password")?,
        )
        .await?;
    Ok(ApiResponse::success(token))
}

pub async fn modify_password(req: Request<Body>, state: Arc<AppState>) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let change = PasswordChange {
        email: params.require("user_email")?.to_string(),
        old_password: params.require("user_password_old")?.to_string(),
        new_password: params.require("user_password_new")?.to_string(),
        captcha: params.require("captcha")?.to_string(),
    };
    state.accounts.change_password(change).await?;
    Ok(ApiResponse::ok())
}

pub async fn check_token(req: Request<Body>, state: Arc<AppState>) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    state.guard.authenticate(params.token()).await?;
    Ok(ApiResponse::ok())
}

/// A fresh token with a full validity window.
pub async fn update_token(req: Request<Body>, state: Arc<AppState>) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let principal = state.guard.authenticate(params.token()).await?;
    let token = state.accounts.refresh(&principal)?;
    Ok(ApiResponse::success(token))
}
