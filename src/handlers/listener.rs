//! Listener features: public lookups and search, song lists, comments and
//! follows.

use super::AppState;
use crate::errors::AppError;
use crate::response::{ApiResponse, ApiResult};
use crate::validation::parse_id;
use hyper::{Body, Request};
use std::sync::Arc;

pub async fn query_producer_by_id(
    req: Request<Body>,
    state: Arc<AppState>,
) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let producer_id = parse_id(params.require("producer_pid")?, "producer")?;
    let producer = state.accounts.producer_by_id(producer_id).await?;
    Ok(ApiResponse::success(producer))
}

pub async fn query_songs_by_album(
    req: Request<Body>,
    state: Arc<AppState>,
) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let album_id = parse_id(params.require("album_aid")?, "album")?;
    let songs = state.catalog.songs_of_album(album_id).await?;
    Ok(ApiResponse::success(songs))
}

pub async fn query_songs_by_producer(
    req: Request<Body>,
    state: Arc<AppState>,
) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let producer_id = parse_id(params.require("producer_pid")?, "producer")?;
    let songs = state.catalog.songs_by_producer(producer_id).await?;
    Ok(ApiResponse::success(songs))
}

/// Substring search over song, album and producer names. An optional
/// `limit` keeps only the most played hits.
pub async fn query_songs_by_condition(
    req: Request<Body>,
    state: Arc<AppState>,
) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let condition = params.require("condition")?;
    let limit = match params.non_empty("limit") {
        Some(raw) => Some(
            raw.parse::<usize>()
                .map_err(|_| AppError::bad_request("invalid parameter limit"))?,
        ),
        None => None,
    };
    let songs = state.catalog.search_songs(condition, limit).await?;
    Ok(ApiResponse::success(songs))
}

pub async fn query_producers_by_condition(
    req: Request<Body>,
    state: Arc<AppState>,
) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let producers = state
        .catalog
        .search_producers(params.non_empty("name"), params.non_empty("ptype"))
        .await?;
    Ok(ApiResponse::success(producers))
}

pub async fn add_play_back(req: Request<Body>, state: Arc<AppState>) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let song_id = parse_id(params.require("song_sid")?, "song")?;
    state.catalog.add_play_back(song_id).await?;
    Ok(ApiResponse::ok())
}

pub async fn query_song_by_id(req: Request<Body>, state: Arc<AppState>) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let song_id = parse_id(params.require("song_sid")?, "song")?;
    let song = state.catalog.song(song_id).await?;
    Ok(ApiResponse::success(song))
}

/// New song list, optionally with a `cover_picture`.
pub async fn create_song_list(req: Request<Body>, state: Arc<AppState>) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let principal = state.guard.authenticate(params.token()).await?;
    let title = params.require("songlist_title")?.to_string();
    let list = state
        .catalog
        .create_song_list(&principal, title, params.optional_file("cover_picture"))
        .await?;
    Ok(ApiResponse::success(list))
}

pub async fn modify_song_list(req: Request<Body>, state: Arc<AppState>) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let principal = state.guard.authenticate(params.token()).await?;
    let list_id = parse_id(params.require("songlist_slid")?, "song list")?;
    let list = state
        .catalog
        .modify_song_list(
            &principal,
            list_id,
            params.non_empty("songlist_title"),
            params.optional_file("songlist_cover"),
        )
        .await?;
    Ok(ApiResponse::success(list))
}

/// The caller's own lists with their songs, or just one when
/// `songlist_slid` is given.
pub async fn query_song_lists(req: Request<Body>, state: Arc<AppState>) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let principal = state.guard.authenticate(params.token()).await?;
    let mut views = state.catalog.song_lists(&principal).await?;

    if let Some(raw) = params.non_empty("songlist_slid") {
        let list_id = parse_id(&raw, "song list")?;
        views.retain(|view| view.list.id == list_id);
        if views.is_empty() {
            return Err(AppError::NotFound("song list"));
        }
    }
    Ok(ApiResponse::success(views))
}

pub async fn add_song_to_list(req: Request<Body>, state: Arc<AppState>) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let principal = state.guard.authenticate(params.token()).await?;
    let list_id = parse_id(params.require("songlist_slid")?, "song list")?;
    let song_id = parse_id(params.require("song_sid")?, "song")?;
    state
        .catalog
        .add_song_to_list(&principal, list_id, song_id)
        .await?;
    Ok(ApiResponse::ok())
}

pub async fn drop_song_from_list(
    req: Request<Body>,
    state: Arc<AppState>,
) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let principal = state.guard.authenticate(params.token()).await?;
    let list_id = parse_id(params.require("songlist_slid")?, "song list")?;
    let song_id = parse_id(params.require("song_sid")?, "song")?;
    state
        .catalog
        .drop_song_from_list(&principal, list_id, song_id)
        .await?;
    Ok(ApiResponse::ok())
}

pub async fn create_comment(req: Request<Body>, state: Arc<AppState>) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let principal = state.guard.authenticate(params.token()).await?;
    let song_id = parse_id(params.require("song_sid")?, "song")?;
    let content = params.require("content")?.to_string();
    let comment = state.catalog.comment(&principal, song_id, content).await?;
    Ok(ApiResponse::success(comment))
}

pub async fn drop_comment(req: Request<Body>, state: Arc<AppState>) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let principal = state.guard.authenticate(params.token()).await?;
    let comment_id = parse_id(params.require("song_comment_scid")?, "comment")?;
    state.catalog.drop_comment(&principal, comment_id).await?;
    Ok(ApiResponse::ok())
}

pub async fn query_comments(req: Request<Body>, state: Arc<AppState>) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let song_id = parse_id(params.require("song_sid")?, "song")?;
    let comments = state.catalog.comments(song_id).await?;
    Ok(ApiResponse::success(comments))
}

pub async fn follow_producer(req: Request<Body>, state: Arc<AppState>) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let principal = state.guard.authenticate(params.token()).await?;
    let producer_id = parse_id(params.require("producer_pid")?, "producer")?;
    state.catalog.follow(&principal, producer_id).await?;
    Ok(ApiResponse::ok())
}

pub async fn cancel_follow_producer(
    req: Request<Body>,
    state: Arc<AppState>,
) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let principal = state.guard.authenticate(params.token()).await?;
    let producer_id = parse_id(params.require("producer_pid")?, "producer")?;
    state.catalog.unfollow(&principal, producer_id).await?;
    Ok(ApiResponse::ok())
}
