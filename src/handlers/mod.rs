//! HTTP endpoints.
//!
//! Handlers only translate parameters into service calls and results into
//! envelopes. Authorization happens through [`AppState::guard`] before any
//! service is touched.

pub mod account;
pub mod listener;
pub mod producer;
pub mod user;

use crate::auth::{AccountService, AuthGuard, CaptchaService, JwtConfig, TokenCodec};
use crate::catalog::CatalogService;
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::database::Repositories;
use crate::email::{EmailError, MailTemplates, Mailer};
use crate::request::Params;
use crate::response::ApiResult;
use crate::router::{Route, Router};
use crate::upload::{MediaUploader, ObjectStore};
use hyper::{Body, Request};
use std::sync::Arc;

/// Everything a handler can reach.
pub struct AppState {
    pub guard: AuthGuard,
    pub accounts: AccountService,
    pub catalog: CatalogService,
    pub captcha: Arc<CaptchaService>,
    pub max_body_bytes: usize,
}

impl AppState {
    /// Wire services from configuration and the chosen collaborators.
    pub fn build(
        config: &AppConfig,
        repos: Repositories,
        mailer: Arc<dyn Mailer>,
        store: Arc<dyn ObjectStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EmailError> {
        let codec = Arc::new(TokenCodec::new(
            JwtConfig::new(
                config.auth.jwt_secret.clone(),
                chrono::Duration::hours(config.auth.token_validity_hours),
            ),
            repos.users.clone(),
            clock.clone(),
        ));
        let captcha = Arc::new(CaptchaService::new(
            repos.captchas.clone(),
            mailer,
            MailTemplates::new(config.email.from_name.clone())?,
            clock.clone(),
            config.captcha.length,
            chrono::Duration::minutes(config.captcha.validity_minutes),
        ));
        let uploader = Arc::new(MediaUploader::new(
            store,
            std::time::Duration::from_secs(config.storage.timeout_secs),
        ));

        Ok(Self {
            guard: AuthGuard::new(codec.clone()),
            accounts: AccountService::new(
                repos.users.clone(),
                captcha.clone(),
                codec,
                uploader.clone(),
                clock.clone(),
            ),
            catalog: CatalogService::new(repos.catalog, repos.users, uploader, clock),
            captcha,
            max_body_bytes: config.server.max_body_bytes,
        })
    }

    /// Parse the parameters of `req` under the configured body limit.
    pub async fn params(&self, req: Request<Body>) -> ApiResult<Params> {
        Params::from_request(req, self.max_body_bytes).await
    }
}

/// The full endpoint table.
pub fn routes(state: Arc<AppState>) -> Router<AppState> {
    Router::new(state)
        // account
        .route(Route::get("/api/existEmail/", account::exist_email))
        .route(Route::get("/api/existUserName/", account::exist_username))
        .route(Route::get("/api/generateCaptcha/", account::generate_captcha))
        .route(Route::post("/api/userRegister/", account::register))
        .route(Route::post("/api/userLogin/", account::login))
        .route(Route::post("/api/userModifyPassword/", account::modify_password))
        .route(Route::get("/api/checkJwtToken/", account::check_token))
        .route(Route::get("/api/updateJwtToken/", account::update_token))
        // user center
        .route(Route::post("/api/editUserInfo/", user::edit_info))
        .route(Route::post("/api/editUserProfilePicture/", user::edit_profile_picture))
        .route(Route::get("/api/queryUser/", user::query_user))
        // producer center
        .route(Route::post("/api/applyProducer/", producer::apply))
        .route(Route::get("/api/queryProducer/", producer::query_producer))
        .route(Route::post("/api/createAlbum/", producer::create_album))
        .route(Route::post("/api/modifyAlbum/", producer::modify_album))
        .route(Route::post("/api/uploadAlbumCover/", producer::upload_album_cover))
        .route(Route::get("/api/queryAlbumOfProducer/", producer::query_albums))
        .route(Route::post("/api/createSong/", producer::create_song))
        .route(Route::post("/api/modifySong/", producer::modify_song))
        .route(Route::post("/api/uploadSongAudio/", producer::upload_song_audio))
        .route(Route::post("/api/uploadSongLyrics/", producer::upload_song_lyrics))
        .route(Route::get("/api/querySongOfProducer/", producer::query_songs))
        .route(Route::get("/api/queryFansOfProducer/", producer::query_fans))
        .route(Route::post("/api/createSongCollaboration/", producer::create_collaboration))
        .route(Route::post("/api/handleSongCollaboration/", producer::handle_collaboration))
        .route(Route::get("/api/querySongCollaboration/", producer::query_collaborations))
        // listener
        .route(Route::get("/api/queryProducerById/", listener::query_producer_by_id))
        .route(Route::get("/api/querySongById/", listener::query_song_by_id))
        .route(Route::get("/api/querySongByAlbum/", listener::query_songs_by_album))
        .route(Route::get("/api/querySongByProducer/", listener::query_songs_by_producer))
        .route(Route::get("/api/querySongByCondition/", listener::query_songs_by_condition))
        .route(Route::get("/api/queryProducerByCondition/", listener::query_producers_by_condition))
        .route(Route::post("/api/addPlayBack/", listener::add_play_back))
        .route(Route::post("/api/createSongList/", listener::create_song_list))
        .route(Route::post("/api/modifySongList/", listener::modify_song_list))
        .route(Route::get("/api/querySongList/", listener::query_song_lists))
        .route(Route::post("/api/addSongToSongList/", listener::add_song_to_list))
        .route(Route::post("/api/dropSongFromSongList/", listener::drop_song_from_list))
        .route(Route::post("/api/createSongComment/", listener::create_comment))
        .route(Route::post("/api/dropSongComment/", listener::drop_comment))
        .route(Route::get("/api/querySongComment/", listener::query_comments))
        .route(Route::post("/api/followProducer/", listener::follow_producer))
        .route(Route::post("/api/cancelFollowProducer/", listener::cancel_follow_producer))
}
