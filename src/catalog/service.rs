//! Producer and listener operations on albums, songs, song lists, comments
//! and follows.
//!
//! Callers pass an already authenticated principal (or producer). Every
//! mutation of an owned resource re-fetches it filtered by id *and* owner;
//! see [`owned`].

use crate::auth::guard::owned;
use crate::auth::models::{Principal, Producer};
use crate::catalog::models::{
    Album, AlbumDraft, CollaborationStatus, CollaborationView, Fan, ProducerSongs,
    ProducerSummary, Song, SongCollaboration, SongComment, SongDraft, SongFilter, SongList,
    SongListView, SongSummary,
};
use crate::clock::Clock;
use crate::database::{CatalogRepository, UserRepository};
use crate::errors::AppError;
use crate::response::ApiResult;
use crate::upload::{
    MediaUploader, UploadedFile, ALBUM_COVER_FOLDER, AUDIO_EXTENSIONS, IMAGE_EXTENSIONS,
    LYRICS_EXTENSIONS, SONG_AUDIO_FOLDER, SONG_LYRICS_FOLDER,
};
use std::sync::Arc;
use uuid::Uuid;

const SONG_LIST_COVER_FOLDER: &str = "songList/cover";

fn required(value: Option<String>, name: &str) -> ApiResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::bad_request(format!("missing parameter {}", name)))
}

pub struct CatalogService {
    catalog: Arc<dyn CatalogRepository>,
    users: Arc<dyn UserRepository>,
    uploader: Arc<MediaUploader>,
    clock: Arc<dyn Clock>,
}

impl CatalogService {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        users: Arc<dyn UserRepository>,
        uploader: Arc<MediaUploader>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            users,
            uploader,
            clock,
        }
    }

    // ---- albums (producer only) ----

    pub async fn create_album(&self, producer: &Producer, draft: AlbumDraft) -> ApiResult<Album> {
        let now = self.clock.now();
        let mut album = Album {
            id: Uuid::new_v4(),
            producer_id: producer.id,
            name: required(draft.name.clone(), "album_name")?,
            album_type: None,
            release_date: None,
            introduction: None,
            cover_url: None,
            created_at: now,
            updated_at: now,
        };
        album.apply(draft, now);
        self.catalog.insert_album(&album).await?;
        Ok(album)
    }

    pub async fn modify_album(
        &self,
        producer: &Producer,
        album_id: Uuid,
        draft: AlbumDraft,
    ) -> ApiResult<Album> {
        let mut album = self.owned_album(producer, album_id).await?;
        album.apply(draft, self.clock.now());
        self.catalog.update_album(&album).await?;
        Ok(album)
    }

    pub async fn set_album_cover(
        &self,
        producer: &Producer,
        album_id: Uuid,
        file: &UploadedFile,
    ) -> ApiResult<String> {
        let mut album = self.owned_album(producer, album_id).await?;
        let url = self
            .uploader
            .store(file, IMAGE_EXTENSIONS, ALBUM_COVER_FOLDER)
            .await?;
        album.cover_url = Some(url.clone());
        album.updated_at = self.clock.now();
        self.catalog.update_album(&album).await?;
        Ok(url)
    }

    pub async fn albums_of(&self, producer: &Producer) -> ApiResult<Vec<Album>> {
        Ok(self.catalog.albums_of_producer(producer.id).await?)
    }

    async fn owned_album(&self, producer: &Producer, album_id: Uuid) -> ApiResult<Album> {
        owned(
            self.catalog.find_album_owned(album_id, producer.id).await?,
            "album",
        )
    }

    // ---- songs (producer only, except lookups) ----

    /// Create a song inside one of the producer's own albums.
    pub async fn create_song(
        &self,
        producer: &Producer,
        album_id: Uuid,
        draft: SongDraft,
    ) -> ApiResult<Song> {
        let album = self.owned_album(producer, album_id).await?;
        let now = self.clock.now();
        let mut song = Song {
            id: Uuid::new_v4(),
            producer_id: producer.id,
            album_id: album.id,
            name: required(draft.name.clone(), "song_name")?,
            song_type: None,
            version: None,
            language: None,
            music_style: None,
            metadata: None,
            introduction: None,
            audio_url: None,
            lyrics_url: None,
            play_back: 0,
            created_at: now,
            updated_at: now,
        };
        song.apply(draft, now);
        self.catalog.insert_song(&song).await?;
        Ok(song)
    }

    pub async fn modify_song(
        &self,
        producer: &Producer,
        song_id: Uuid,
        draft: SongDraft,
    ) -> ApiResult<Song> {
        let mut song = self.owned_song(producer, song_id).await?;
        song.apply(draft, self.clock.now());
        self.catalog.update_song(&song).await?;
        Ok(song)
    }

    pub async fn upload_song_audio(
        &self,
        producer: &Producer,
        song_id: Uuid,
        file: &UploadedFile,
    ) -> ApiResult<String> {
        let mut song = self.owned_song(producer, song_id).await?;
        let url = self
            .uploader
            .store(file, AUDIO_EXTENSIONS, SONG_AUDIO_FOLDER)
            .await?;
        song.audio_url = Some(url.clone());
        song.updated_at = self.clock.now();
        self.catalog.update_song(&song).await?;
        Ok(url)
    }

    pub async fn upload_song_lyrics(
        &self,
        producer: &Producer,
        song_id: Uuid,
        file: &UploadedFile,
    ) -> ApiResult<String> {
        let mut song = self.owned_song(producer, song_id).await?;
        let url = self
            .uploader
            .store(file, LYRICS_EXTENSIONS, SONG_LYRICS_FOLDER)
            .await?;
        song.lyrics_url = Some(url.clone());
        song.updated_at = self.clock.now();
        self.catalog.update_song(&song).await?;
        Ok(url)
    }

    pub async fn songs_of(&self, producer: &Producer) -> ApiResult<Vec<Song>> {
        Ok(self.catalog.songs_of_producer(producer.id).await?)
    }

    /// Public lookup.
    pub async fn song(&self, song_id: Uuid) -> ApiResult<Song> {
        self.catalog
            .find_song(song_id)
            .await?
            .ok_or(AppError::NotFound("song"))
    }

    async fn owned_song(&self, producer: &Producer, song_id: Uuid) -> ApiResult<Song> {
        owned(
            self.catalog.find_song_owned(song_id, producer.id).await?,
            "song",
        )
    }

    /// Count one play. Public.
    pub async fn add_play_back(&self, song_id: Uuid) -> ApiResult<()> {
        if !self.catalog.increment_play_back(song_id).await? {
            return Err(AppError::NotFound("song"));
        }
        Ok(())
    }

    // ---- public listings and search ----

    pub async fn songs_of_album(&self, album_id: Uuid) -> ApiResult<Vec<SongSummary>> {
        let album = self
            .catalog
            .find_album(album_id)
            .await?
            .ok_or(AppError::NotFound("album"))?;
        Ok(self.catalog.song_summaries(SongFilter::Album(album.id)).await?)
    }

    /// Songs a producer uploaded, and songs they are a confirmed collaborator on.
    pub async fn songs_by_producer(&self, producer_id: Uuid) -> ApiResult<ProducerSongs> {
        let producer = self.producer(producer_id).await?;
        Ok(ProducerSongs {
            producer_upload: self
                .catalog
                .song_summaries(SongFilter::Producer(producer.id))
                .await?,
            collaborate: self
                .catalog
                .song_summaries(SongFilter::Collaborator(producer.id))
                .await?,
        })
    }

    /// Songs whose own, album or producer name contains `condition`, most
    /// played first, at most `limit` of them.
    pub async fn search_songs(
        &self,
        condition: &str,
        limit: Option<usize>,
    ) -> ApiResult<Vec<SongSummary>> {
        let mut songs = self
            .catalog
            .song_summaries(SongFilter::Matching(condition.to_string()))
            .await?;
        songs.sort_by(|a, b| b.play_back.cmp(&a.play_back));
        if let Some(limit) = limit {
            songs.truncate(limit);
        }
        Ok(songs)
    }

    pub async fn search_producers(
        &self,
        name: Option<String>,
        ptype: Option<String>,
    ) -> ApiResult<Vec<ProducerSummary>> {
        Ok(self.catalog.search_producers(name, ptype).await?)
    }

    async fn producer(&self, producer_id: Uuid) -> ApiResult<Producer> {
        self.users
            .find_producer(producer_id)
            .await?
            .ok_or(AppError::NotFound("producer"))
    }

    // ---- producer center: fans and joint releases ----

    pub async fn fans(&self, producer: &Producer) -> ApiResult<Vec<Fan>> {
        Ok(self.catalog.fans_of_producer(producer.id).await?)
    }

    /// Invite another producer onto one of the caller's songs. Inviting
    /// oneself looks the same as inviting an unknown producer.
    pub async fn invite_collaborator(
        &self,
        producer: &Producer,
        song_id: Uuid,
        invitee_id: Uuid,
        role: Option<String>,
    ) -> ApiResult<SongCollaboration> {
        let song = self.owned_song(producer, song_id).await?;
        if invitee_id == producer.id {
            return Err(AppError::NotFound("producer"));
        }
        let invitee = self.producer(invitee_id).await?;

        let now = self.clock.now();
        let collaboration = SongCollaboration {
            song_id: song.id,
            producer_id: invitee.id,
            role,
            status: CollaborationStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.catalog.insert_collaboration(&collaboration).await?;
        tracing::info!(
            "Producer {} invited {} onto song {}",
            producer.id,
            invitee.id,
            song.id
        );
        Ok(collaboration)
    }

    /// Confirm or reject a pending invitation addressed to the caller.
    pub async fn answer_collaboration(
        &self,
        producer: &Producer,
        song_id: Uuid,
        confirm: bool,
    ) -> ApiResult<()> {
        let status = if confirm {
            CollaborationStatus::Confirmed
        } else {
            CollaborationStatus::Rejected
        };
        if !self
            .catalog
            .decide_collaboration(song_id, producer.id, status, self.clock.now())
            .await?
        {
            return Err(AppError::NotFound("collaboration"));
        }
        Ok(())
    }

    pub async fn collaborations(
        &self,
        producer: &Producer,
        status: Option<CollaborationStatus>,
    ) -> ApiResult<Vec<CollaborationView>> {
        Ok(self
            .catalog
            .collaborations_of_producer(producer.id, status)
            .await?)
    }

    // ---- song lists ----

    /// Create a list. The optional cover is validated and stored before the
    /// list is, so a rejected cover leaves nothing behind.
    pub async fn create_song_list(
        &self,
        principal: &Principal,
        title: String,
        cover: Option<&UploadedFile>,
    ) -> ApiResult<SongList> {
        let title = required(Some(title), "title")?;
        let cover_picture_url = match cover {
            Some(file) => Some(self.store_list_cover(file).await?),
            None => None,
        };

        let now = self.clock.now();
        let list = SongList {
            id: Uuid::new_v4(),
            owner_id: principal.id,
            title,
            cover_picture_url,
            created_at: now,
            updated_at: now,
        };
        self.catalog.insert_song_list(&list).await?;
        Ok(list)
    }

    /// Rename and/or re-cover an owned list in one write.
    pub async fn modify_song_list(
        &self,
        principal: &Principal,
        list_id: Uuid,
        title: Option<String>,
        cover: Option<&UploadedFile>,
    ) -> ApiResult<SongList> {
        let mut list = self.owned_list(principal, list_id).await?;
        if let Some(file) = cover {
            list.cover_picture_url = Some(self.store_list_cover(file).await?);
        }
        if let Some(title) = title.filter(|t| !t.is_empty()) {
            list.title = title;
        }
        list.updated_at = self.clock.now();
        self.catalog.update_song_list(&list).await?;
        Ok(list)
    }

    async fn store_list_cover(&self, file: &UploadedFile) -> ApiResult<String> {
        Ok(self
            .uploader
            .store(file, IMAGE_EXTENSIONS, SONG_LIST_COVER_FOLDER)
            .await?)
    }

    /// The caller's own lists, each with its songs.
    pub async fn song_lists(&self, principal: &Principal) -> ApiResult<Vec<SongListView>> {
        let lists = self.catalog.song_lists_of_user(principal.id).await?;
        let mut views = Vec::with_capacity(lists.len());
        for list in lists {
            let songs = self.catalog.songs_in_list(list.id).await?;
            views.push(SongListView { list, songs });
        }
        Ok(views)
    }

    pub async fn add_song_to_list(
        &self,
        principal: &Principal,
        list_id: Uuid,
        song_id: Uuid,
    ) -> ApiResult<()> {
        let list = self.owned_list(principal, list_id).await?;
        let song = self.song(song_id).await?;
        self.catalog
            .add_song_to_list(list.id, song.id, self.clock.now())
            .await?;
        Ok(())
    }

    pub async fn drop_song_from_list(
        &self,
        principal: &Principal,
        list_id: Uuid,
        song_id: Uuid,
    ) -> ApiResult<()> {
        let list = self.owned_list(principal, list_id).await?;
        if !self.catalog.remove_song_from_list(list.id, song_id).await? {
            return Err(AppError::NotFound("record"));
        }
        Ok(())
    }

    async fn owned_list(&self, principal: &Principal, list_id: Uuid) -> ApiResult<SongList> {
        owned(
            self.catalog
                .find_song_list_owned(list_id, principal.id)
                .await?,
            "song list",
        )
    }

    // ---- comments ----

    pub async fn comment(
        &self,
        principal: &Principal,
        song_id: Uuid,
        text: String,
    ) -> ApiResult<SongComment> {
        let song = self.song(song_id).await?;
        let comment = SongComment {
            id: Uuid::new_v4(),
            song_id: song.id,
            author_id: principal.id,
            comment: required(Some(text), "comment")?,
            likes: 0,
            released_at: self.clock.now(),
        };
        self.catalog.insert_comment(&comment).await?;
        Ok(comment)
    }

    pub async fn drop_comment(&self, principal: &Principal, comment_id: Uuid) -> ApiResult<()> {
        let comment = owned(
            self.catalog
                .find_comment_owned(comment_id, principal.id)
                .await?,
            "comment",
        )?;
        self.catalog.delete_comment(comment.id).await?;
        Ok(())
    }

    /// Public lookup, newest first.
    pub async fn comments(&self, song_id: Uuid) -> ApiResult<Vec<SongComment>> {
        let song = self.song(song_id).await?;
        Ok(self.catalog.comments_of_song(song.id).await?)
    }

    // ---- follows ----

    pub async fn follow(&self, principal: &Principal, producer_id: Uuid) -> ApiResult<()> {
        if principal.role.producer().map(|p| p.id) == Some(producer_id) {
            return Err(AppError::not_acceptable(
                "user can not follow himself / herself",
            ));
        }
        self.producer(producer_id).await?;
        self.catalog
            .follow_producer(principal.id, producer_id, self.clock.now())
            .await?;
        Ok(())
    }

    pub async fn unfollow(&self, principal: &Principal, producer_id: Uuid) -> ApiResult<()> {
        if !self
            .catalog
            .unfollow_producer(principal.id, producer_id)
            .await?
        {
            return Err(AppError::NotFound("record"));
        }
        Ok(())
    }
}
