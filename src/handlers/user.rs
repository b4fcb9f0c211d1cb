//! User center.

use super::AppState;
use crate::auth::models::ProfileUpdate;
use crate::response::{ApiResponse, ApiResult};
use crate::validation::parse_date;
use hyper::{Body, Request};
use std::sync::Arc;

pub async fn edit_info(req: Request<Body>, state: Arc<AppState>) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let principal = state.guard.authenticate(params.token()).await?;

    let birthday = match params.non_empty("birthday") {
        Some(value) => Some(parse_date(&value)?),
        None => None,
    };
    let update = ProfileUpdate {
        username: params.non_empty("username"),
        gender: params.non_empty("gender"),
        birthday,
        region: params.non_empty("region"),
        introduction: params.non_empty("introduction"),
    };

    let profile = state.accounts.edit_profile(&principal, update).await?;
    Ok(ApiResponse::success(profile))
}

pub async fn edit_profile_picture(
    req: Request<Body>,
    state: Arc<AppState>,
) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let principal = state.guard.authenticate(params.token()).await?;
    let url = state
        .accounts
        .set_profile_picture(&principal, params.file("profile_photo")?)
        .await?;
    Ok(ApiResponse::success(url))
}

pub async fn query_user(req: Request<Body>, state: Arc<AppState>) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let principal = state.guard.authenticate(params.token()).await?;
    let profile = state.accounts.profile(&principal).await?;
    Ok(ApiResponse::success(profile))
}
