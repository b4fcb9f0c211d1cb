//! Database module - repository interfaces over the relational store.
//!
//! Services only see the async repository traits below. Two backends are
//! provided: the in-process [`MemoryStore`] and, with the `sqlite` feature,
//! `SqliteStore`. Both enforce email uniqueness inside the store itself so
//! that concurrent registrations cannot both succeed.

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use crate::auth::models::{CaptchaRecord, Principal, Producer, UserRecord};
use crate::catalog::models::{
    Album, CollaborationStatus, CollaborationView, Fan, ProducerSummary, Song, SongCollaboration,
    SongComment, SongFilter, SongList, SongSummary,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by repository backends.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    /// A uniqueness constraint rejected the write.
    #[error("{0}")]
    Conflict(String),

    #[error("Record not found")]
    NotFound,

    #[error("Unsupported database url: {0}")]
    Unsupported(String),
}

/// Credential store: user accounts and their producer extension.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new account. Fails with `Conflict` when the email is taken.
    async fn insert_user(&self, user: UserRecord) -> Result<(), DatabaseError>;

    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, DatabaseError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, DatabaseError>;

    async fn email_exists(&self, email: &str) -> Result<bool, DatabaseError>;

    async fn username_exists(&self, username: &str) -> Result<bool, DatabaseError>;

    /// Resolve a principal by id *and* email; both must match the live record.
    async fn find_principal(&self, id: Uuid, email: &str)
        -> Result<Option<Principal>, DatabaseError>;

    /// Overwrite the profile and credential columns of an existing account.
    /// The producer link is left as stored; only `attach_producer` sets it.
    async fn update_user(&self, user: &UserRecord) -> Result<(), DatabaseError>;

    /// Link a new producer row to the user. Fails with `Conflict` when the
    /// user already has one; the link is never replaced.
    async fn attach_producer(&self, user_id: Uuid, producer: Producer) -> Result<(), DatabaseError>;

    async fn find_producer(&self, id: Uuid) -> Result<Option<Producer>, DatabaseError>;
}

/// Captcha table, keyed by email.
#[async_trait]
pub trait CaptchaRepository: Send + Sync {
    /// Create or overwrite the record for `record.email`.
    async fn upsert_captcha(&self, record: CaptchaRecord) -> Result<(), DatabaseError>;

    /// Atomically delete the record for `email` if it matches `code` and is
    /// still live at `now`. Returns whether a record was consumed.
    async fn take_captcha(
        &self,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;
}

/// Songs, albums, song lists, comments, follows and collaborations.
///
/// The `*_owned` lookups filter on the resource id and the owner in one
/// query, so a resource owned by someone else is indistinguishable from a
/// missing one.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn insert_album(&self, album: &Album) -> Result<(), DatabaseError>;
    async fn find_album_owned(&self, id: Uuid, producer_id: Uuid)
        -> Result<Option<Album>, DatabaseError>;
    async fn find_album(&self, id: Uuid) -> Result<Option<Album>, DatabaseError>;
    async fn update_album(&self, album: &Album) -> Result<(), DatabaseError>;
    async fn albums_of_producer(&self, producer_id: Uuid) -> Result<Vec<Album>, DatabaseError>;

    async fn insert_song(&self, song: &Song) -> Result<(), DatabaseError>;
    async fn find_song(&self, id: Uuid) -> Result<Option<Song>, DatabaseError>;
    async fn find_song_owned(&self, id: Uuid, producer_id: Uuid)
        -> Result<Option<Song>, DatabaseError>;
    /// Rewrite the descriptive columns of a song. The play counter is left
    /// as stored; only `increment_play_back` moves it.
    async fn update_song(&self, song: &Song) -> Result<(), DatabaseError>;
    async fn songs_of_producer(&self, producer_id: Uuid) -> Result<Vec<Song>, DatabaseError>;
    /// Returns whether the song exists.
    async fn increment_play_back(&self, song_id: Uuid) -> Result<bool, DatabaseError>;
    /// Songs joined with their album and producer name.
    async fn song_summaries(&self, filter: SongFilter) -> Result<Vec<SongSummary>, DatabaseError>;
    /// Producers whose name contains `name` (case-insensitive) and whose
    /// `ptype` equals `ptype`. `None` disables a condition.
    async fn search_producers(
        &self,
        name: Option<String>,
        ptype: Option<String>,
    ) -> Result<Vec<ProducerSummary>, DatabaseError>;

    async fn insert_song_list(&self, list: &SongList) -> Result<(), DatabaseError>;
    async fn find_song_list_owned(&self, id: Uuid, owner_id: Uuid)
        -> Result<Option<SongList>, DatabaseError>;
    async fn update_song_list(&self, list: &SongList) -> Result<(), DatabaseError>;
    async fn song_lists_of_user(&self, owner_id: Uuid) -> Result<Vec<SongList>, DatabaseError>;
    /// `Conflict` when the song is already in the list.
    async fn add_song_to_list(
        &self,
        list_id: Uuid,
        song_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;
    /// Returns whether a membership row was removed.
    async fn remove_song_from_list(&self, list_id: Uuid, song_id: Uuid)
        -> Result<bool, DatabaseError>;
    async fn songs_in_list(&self, list_id: Uuid) -> Result<Vec<Song>, DatabaseError>;

    async fn insert_comment(&self, comment: &SongComment) -> Result<(), DatabaseError>;
    async fn find_comment_owned(&self, id: Uuid, author_id: Uuid)
        -> Result<Option<SongComment>, DatabaseError>;
    async fn delete_comment(&self, id: Uuid) -> Result<(), DatabaseError>;
    async fn comments_of_song(&self, song_id: Uuid) -> Result<Vec<SongComment>, DatabaseError>;

    /// `Conflict` on a duplicate follow.
    async fn follow_producer(
        &self,
        user_id: Uuid,
        producer_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;
    async fn unfollow_producer(&self, user_id: Uuid, producer_id: Uuid)
        -> Result<bool, DatabaseError>;
    async fn fans_of_producer(&self, producer_id: Uuid) -> Result<Vec<Fan>, DatabaseError>;

    /// `Conflict` when the producer is already invited to the song.
    async fn insert_collaboration(
        &self,
        collaboration: &SongCollaboration,
    ) -> Result<(), DatabaseError>;
    /// Settle the pending invitation of `producer_id` on `song_id`. Returns
    /// whether a pending record was found.
    async fn decide_collaboration(
        &self,
        song_id: Uuid,
        producer_id: Uuid,
        status: CollaborationStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;
    /// Invitations addressed to `producer_id`, optionally by status.
    async fn collaborations_of_producer(
        &self,
        producer_id: Uuid,
        status: Option<CollaborationStatus>,
    ) -> Result<Vec<CollaborationView>, DatabaseError>;
}

/// The repositories a running service is wired with.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub captchas: Arc<dyn CaptchaRepository>,
    pub catalog: Arc<dyn CatalogRepository>,
}

impl Repositories {
    /// Back every repository with one in-process store.
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            users: store.clone(),
            captchas: store.clone(),
            catalog: store,
        }
    }

    /// Open the store named by `url`: `memory`, or a SQLite file path.
    pub async fn connect(url: &str) -> Result<Self, DatabaseError> {
        if url == "memory" {
            return Ok(Self::memory());
        }

        Self::open_sqlite(url).await
    }

    #[cfg(feature = "sqlite")]
    async fn open_sqlite(url: &str) -> Result<Self, DatabaseError> {
        let path = url.strip_prefix("sqlite:").unwrap_or(url);
        let store = Arc::new(SqliteStore::open(path).await?);
        Ok(Self {
            users: store.clone(),
            captchas: store.clone(),
            catalog: store,
        })
    }

    #[cfg(not(feature = "sqlite"))]
    async fn open_sqlite(url: &str) -> Result<Self, DatabaseError> {
        Err(DatabaseError::Unsupported(url.to_string()))
    }
}
