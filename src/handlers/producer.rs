//! Producer center. Everything but `applyProducer` requires the producer
//! extension.

use super::AppState;
use crate::auth::models::ProducerApplication;
use crate::catalog::{AlbumDraft, CollaborationStatus, SongDraft};
use crate::request::Params;
use crate::response::{ApiResponse, ApiResult};
use crate::validation::{parse_date, parse_id};
use hyper::{Body, Request};
use std::sync::Arc;

fn album_draft(params: &Params) -> ApiResult<AlbumDraft> {
    let release_date = match params.non_empty("album_release_date") {
        Some(value) => Some(parse_date(&value)?),
        None => None,
    };
    Ok(AlbumDraft {
        name: params.non_empty("album_name"),
        album_type: params.non_empty("album_type"),
        release_date,
        introduction: params.non_empty("album_introduction"),
    })
}

fn song_draft(params: &Params) -> SongDraft {
    SongDraft {
        name: params.non_empty("song_name"),
        song_type: params.non_empty("song_type"),
        version: params.non_empty("song_version"),
        language: params.non_empty("song_language"),
        music_style: params.non_empty("music_style"),
        metadata: params.non_empty("song_metadata"),
        introduction: params.non_empty("song_introduction"),
    }
}

/// Listener to producer upgrade.
pub async fn apply(req: Request<Body>, state: Arc<AppState>) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let principal = state.guard.authenticate(params.token()).await?;
    let application = ProducerApplication {
        ptype: params.non_empty("ptype"),
        title: params.non_empty("title"),
        authentication: params.non_empty("authentication"),
    };
    let producer = state
        .accounts
        .apply_producer(&principal, application)
        .await?;
    Ok(ApiResponse::success(producer))
}

pub async fn query_producer(req: Request<Body>, state: Arc<AppState>) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let principal = state.guard.authenticate(params.token()).await?;
    let producer = state.accounts.producer(&principal)?;
    Ok(ApiResponse::success(producer))
}

pub async fn create_album(req: Request<Body>, state: Arc<AppState>) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let (_, producer) = state.guard.authenticate_producer(params.token()).await?;
    let album = state
        .catalog
        .create_album(&producer, album_draft(&params)?)
        .await?;
    Ok(ApiResponse::success(album))
}

pub async fn modify_album(req: Request<Body>, state: Arc<AppState>) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let (_, producer) = state.guard.authenticate_producer(params.token()).await?;
    let album_id = parse_id(params.require("album_id")?, "album")?;
    let album = state
        .catalog
        .modify_album(&producer, album_id, album_draft(&params)?)
        .await?;
    Ok(ApiResponse::success(album))
}

pub async fn upload_album_cover(
    req: Request<Body>,
    state: Arc<AppState>,
) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let (_, producer) = state.guard.authenticate_producer(params.token()).await?;
    let album_id = parse_id(params.require("album_id")?, "album")?;
    let url = state
        .catalog
        .set_album_cover(&producer, album_id, params.file("album_cover")?)
        .await?;
    Ok(ApiResponse::success(url))
}

pub async fn query_albums(req: Request<Body>, state: Arc<AppState>) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let (_, producer) = state.guard.authenticate_producer(params.token()).await?;
    let albums = state.catalog.albums_of(&producer).await?;
    Ok(ApiResponse::success(albums))
}

pub async fn create_song(req: Request<Body>, state: Arc<AppState>) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let (_, producer) = state.guard.authenticate_producer(params.token()).await?;
    let album_id = parse_id(params.require("album_id")?, "album")?;
    let song = state
        .catalog
        .create_song(&producer, album_id, song_draft(&params))
        .await?;
    Ok(ApiResponse::success(song))
}

pub async fn modify_song(req: Request<Body>, state: Arc<AppState>) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let (_, producer) = state.guard.authenticate_producer(params.token()).await?;
    let song_id = parse_id(params.require("song_id")?, "song")?;
    let song = state
        .catalog
        .modify_song(&producer, song_id, song_draft(&params))
        .await?;
    Ok(ApiResponse::success(song))
}

pub async fn upload_song_audio(
    req: Request<Body>,
    state: Arc<AppState>,
) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let (_, producer) = state.guard.authenticate_producer(params.token()).await?;
    let song_id = parse_id(params.require("song_id")?, "song")?;
    let url = state
        .catalog
        .upload_song_audio(&producer, song_id, params.file("audio_file")?)
        .await?;
    Ok(ApiResponse::success(url))
}

pub async fn upload_song_lyrics(
    req: Request<Body>,
    state: Arc<AppState>,
) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let (_, producer) = state.guard.authenticate_producer(params.token()).await?;
    let song_id = parse_id(params.require("song_id")?, "song")?;
    let url = state
        .catalog
        .upload_song_lyrics(&producer, song_id, params.file("lyrics_file")?)
        .await?;
    Ok(ApiResponse::success(url))
}

pub async fn query_songs(req: Request<Body>, state: Arc<AppState>) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let (_, producer) = state.guard.authenticate_producer(params.token()).await?;
    let songs = state.catalog.songs_of(&producer).await?;
    Ok(ApiResponse::success(songs))
}

pub async fn query_fans(req: Request<Body>, state: Arc<AppState>) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let (_, producer) = state.guard.authenticate_producer(params.token()).await?;
    let fans = state.catalog.fans(&producer).await?;
    Ok(ApiResponse::success(fans))
}

/// Invite `producer_pid` to be credited on the caller's song `song_sid`.
pub async fn create_collaboration(
    req: Request<Body>,
    state: Arc<AppState>,
) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let (_, producer) = state.guard.authenticate_producer(params.token()).await?;
    let song_id = parse_id(params.require("song_sid")?, "song")?;
    let invitee_id = parse_id(params.require("producer_pid")?, "producer")?;
    let collaboration = state
        .catalog
        .invite_collaborator(&producer, song_id, invitee_id, params.non_empty("role"))
        .await?;
    Ok(ApiResponse::success(collaboration))
}

/// `confirm=y` accepts a pending invitation; anything else rejects it.
pub async fn handle_collaboration(
    req: Request<Body>,
    state: Arc<AppState>,
) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let (_, producer) = state.guard.authenticate_producer(params.token()).await?;
    let song_id = parse_id(params.require("song_sid")?, "collaboration")?;
    let confirm = params.get("confirm") == Some("y");
    state
        .catalog
        .answer_collaboration(&producer, song_id, confirm)
        .await?;
    Ok(ApiResponse::ok())
}

/// Invitations addressed to the caller. An unknown `collaboration_status`
/// lists all of them.
pub async fn query_collaborations(
    req: Request<Body>,
    state: Arc<AppState>,
) -> ApiResult<ApiResponse> {
    let params = state.params(req).await?;
    let (_, producer) = state.guard.authenticate_producer(params.token()).await?;
    let status = params
        .get("collaboration_status")
        .and_then(CollaborationStatus::from_code);
    let collaborations = state.catalog.collaborations(&producer, status).await?;
    Ok(ApiResponse::success(collaborations))
}
