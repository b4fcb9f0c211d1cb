//! In-process store backing every repository trait.
//!
//! All tables live behind one `RwLock`, so each repository call is a single
//! critical section. Uniqueness checks and the matching insert happen under
//! the same write guard.

use super::{CaptchaRepository, CatalogRepository, DatabaseError, UserRepository};
use crate::auth::models::{CaptchaRecord, Principal, Producer, UserRecord};
use crate::catalog::models::{
    Album, CollaborationStatus, CollaborationView, Fan, ProducerSummary, Song, SongCollaboration,
    SongComment, SongFilter, SongList, SongSummary,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, UserRecord>,
    emails: HashMap<String, Uuid>,
    producers: HashMap<Uuid, Producer>,
    captchas: HashMap<String, CaptchaRecord>,
    albums: Vec<Album>,
    songs: Vec<Song>,
    song_lists: Vec<SongList>,
    // (list, song, added at)
    list_entries: Vec<(Uuid, Uuid, DateTime<Utc>)>,
    comments: Vec<SongComment>,
    // (user, producer) -> followed at
    follows: HashMap<(Uuid, Uuid), DateTime<Utc>>,
    collaborations: Vec<SongCollaboration>,
}

impl Tables {
    /// The account a producer row belongs to.
    fn account_of(&self, producer_id: Uuid) -> Option<&UserRecord> {
        self.users
            .values()
            .find(|u| u.producer_id == Some(producer_id))
    }

    fn summarize(&self, song: &Song) -> Option<SongSummary> {
        let album = self.albums.iter().find(|a| a.id == song.album_id)?;
        let account = self.account_of(song.producer_id)?;
        Some(SongSummary {
            song_id: song.id,
            song_name: song.name.clone(),
            play_back: song.play_back,
            album_id: album.id,
            album_name: album.name.clone(),
            album_cover_url: album.cover_url.clone(),
            producer_id: song.producer_id,
            producer_name: account.username.clone(),
        })
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Memory-resident store. Cheap to construct; state is lost on drop.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn replace<T: Clone>(rows: &mut [T], row: &T, same: impl Fn(&T) -> bool) -> Result<(), DatabaseError> {
    match rows.iter_mut().find(|r| same(r)) {
        Some(slot) => {
            *slot = row.clone();
            Ok(())
        }
        None => Err(DatabaseError::NotFound),
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert_user(&self, user: UserRecord) -> Result<(), DatabaseError> {
        let mut tables = self.tables.write().await;
        if tables.emails.contains_key(&user.email) {
            return Err(DatabaseError::Conflict("Email has been registered".to_string()));
        }
        tables.emails.insert(user.email.clone(), user.id);
        tables.users.insert(user.id, user);
        Ok(())
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, DatabaseError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables
            .emails
            .get(email)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn email_exists(&self, email: &str) -> Result<bool, DatabaseError> {
        Ok(self.tables.read().await.emails.contains_key(email))
    }

    async fn username_exists(&self, username: &str) -> Result<bool, DatabaseError> {
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .any(|u| u.username == username))
    }

    async fn find_principal(
        &self,
        id: Uuid,
        email: &str,
    ) -> Result<Option<Principal>, DatabaseError> {
        let tables = self.tables.read().await;
        let user = match tables.users.get(&id) {
            Some(user) if user.email == email => user,
            _ => return Ok(None),
        };
        let producer = user
            .producer_id
            .and_then(|pid| tables.producers.get(&pid))
            .cloned();
        Ok(Some(user.to_principal(producer)))
    }

    async fn update_user(&self, user: &UserRecord) -> Result<(), DatabaseError> {
        let mut tables = self.tables.write().await;
        let (old_email, producer_id) = match tables.users.get(&user.id) {
            Some(existing) => (existing.email.clone(), existing.producer_id),
            None => return Err(DatabaseError::NotFound),
        };
        if old_email != user.email {
            if tables.emails.contains_key(&user.email) {
                return Err(DatabaseError::Conflict("Email has been registered".to_string()));
            }
            tables.emails.remove(&old_email);
            tables.emails.insert(user.email.clone(), user.id);
        }
        // The producer link is owned by attach_producer
        let mut row = user.clone();
        row.producer_id = producer_id;
        tables.users.insert(user.id, row);
        Ok(())
    }

    async fn attach_producer(&self, user_id: Uuid, producer: Producer) -> Result<(), DatabaseError> {
        let mut tables = self.tables.write().await;
        let user = tables.users.get_mut(&user_id).ok_or(DatabaseError::NotFound)?;
        if user.producer_id.is_some() {
            return Err(DatabaseError::Conflict("producer has been register".to_string()));
        }
        user.producer_id = Some(producer.id);
        user.updated_at = producer.created_at;
        tables.producers.insert(producer.id, producer);
        Ok(())
    }

    async fn find_producer(&self, id: Uuid) -> Result<Option<Producer>, DatabaseError> {
        Ok(self.tables.read().await.producers.get(&id).cloned())
    }
}

#[async_trait]
impl CaptchaRepository for MemoryStore {
    async fn upsert_captcha(&self, record: CaptchaRecord) -> Result<(), DatabaseError> {
        self.tables
            .write()
            .await
            .captchas
            .insert(record.email.clone(), record);
        Ok(())
    }

    async fn take_captcha(
        &self,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let mut tables = self.tables.write().await;
        let matches = tables
            .captchas
            .get(email)
            .map(|record| record.accepts(email, code, now))
            .unwrap_or(false);
        if matches {
            tables.captchas.remove(email);
        }
        Ok(matches)
    }
}

#[async_trait]
impl CatalogRepository for MemoryStore {
    async fn insert_album(&self, album: &Album) -> Result<(), DatabaseError> {
        self.tables.write().await.albums.push(album.clone());
        Ok(())
    }

    async fn find_album_owned(
        &self,
        id: Uuid,
        producer_id: Uuid,
    ) -> Result<Option<Album>, DatabaseError> {
        Ok(self
            .tables
            .read()
            .await
            .albums
            .iter()
            .find(|a| a.id == id && a.producer_id == producer_id)
            .cloned())
    }

    async fn find_album(&self, id: Uuid) -> Result<Option<Album>, DatabaseError> {
        Ok(self
            .tables
            .read()
            .await
            .albums
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn update_album(&self, album: &Album) -> Result<(), DatabaseError> {
        let mut tables = self.tables.write().await;
        replace(&mut tables.albums, album, |a| a.id == album.id)
    }

    async fn albums_of_producer(&self, producer_id: Uuid) -> Result<Vec<Album>, DatabaseError> {
        Ok(self
            .tables
            .read()
            .await
            .albums
            .iter()
            .filter(|a| a.producer_id == producer_id)
            .cloned()
            .collect())
    }

    async fn insert_song(&self, song: &Song) -> Result<(), DatabaseError> {
        self.tables.write().await.songs.push(song.clone());
        Ok(())
    }

    async fn find_song(&self, id: Uuid) -> Result<Option<Song>, DatabaseError> {
        Ok(self
            .tables
            .read()
            .await
            .songs
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn find_song_owned(
        &self,
        id: Uuid,
        producer_id: Uuid,
    ) -> Result<Option<Song>, DatabaseError> {
        Ok(self
            .tables
            .read()
            .await
            .songs
            .iter()
            .find(|s| s.id == id && s.producer_id == producer_id)
            .cloned())
    }

    async fn update_song(&self, song: &Song) -> Result<(), DatabaseError> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .songs
            .iter_mut()
            .find(|s| s.id == song.id)
            .ok_or(DatabaseError::NotFound)?;
        let play_back = slot.play_back;
        *slot = song.clone();
        slot.play_back = play_back;
        Ok(())
    }

    async fn songs_of_producer(&self, producer_id: Uuid) -> Result<Vec<Song>, DatabaseError> {
        Ok(self
            .tables
            .read()
            .await
            .songs
            .iter()
            .filter(|s| s.producer_id == producer_id)
            .cloned()
            .collect())
    }

    async fn increment_play_back(&self, song_id: Uuid) -> Result<bool, DatabaseError> {
        let mut tables = self.tables.write().await;
        match tables.songs.iter_mut().find(|s| s.id == song_id) {
            Some(song) => {
                song.play_back += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn song_summaries(&self, filter: SongFilter) -> Result<Vec<SongSummary>, DatabaseError> {
        let tables = self.tables.read().await;
        let summaries = tables
            .songs
            .iter()
            .filter_map(|song| tables.summarize(song))
            .filter(|row| match &filter {
                SongFilter::Album(album_id) => row.album_id == *album_id,
                SongFilter::Producer(producer_id) => row.producer_id == *producer_id,
                SongFilter::Collaborator(producer_id) => tables.collaborations.iter().any(|c| {
                    c.song_id == row.song_id
                        && c.producer_id == *producer_id
                        && c.status == CollaborationStatus::Confirmed
                }),
                SongFilter::Matching(text) => {
                    contains_ignore_case(&row.song_name, text)
                        || contains_ignore_case(&row.album_name, text)
                        || contains_ignore_case(&row.producer_name, text)
                }
            })
            .collect();
        Ok(summaries)
    }

    async fn search_producers(
        &self,
        name: Option<String>,
        ptype: Option<String>,
    ) -> Result<Vec<ProducerSummary>, DatabaseError> {
        let tables = self.tables.read().await;
        let mut found: Vec<(DateTime<Utc>, ProducerSummary)> = tables
            .producers
            .values()
            .filter(|p| ptype.is_none() || p.ptype == ptype)
            .filter_map(|p| {
                let account = tables.account_of(p.id)?;
                if let Some(name) = &name {
                    if !contains_ignore_case(&account.username, name) {
                        return None;
                    }
                }
                Some((
                    p.created_at,
                    ProducerSummary {
                        producer_id: p.id,
                        name: account.username.clone(),
                        profile_picture_url: account.profile_picture_url.clone(),
                        ptype: p.ptype.clone(),
                    },
                ))
            })
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found.into_iter().map(|(_, summary)| summary).collect())
    }

    async fn insert_song_list(&self, list: &SongList) -> Result<(), DatabaseError> {
        self.tables.write().await.song_lists.push(list.clone());
        Ok(())
    }

    async fn find_song_list_owned(
        &self,
        id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<SongList>, DatabaseError> {
        Ok(self
            .tables
            .read()
            .await
            .song_lists
            .iter()
            .find(|l| l.id == id && l.owner_id == owner_id)
            .cloned())
    }

    async fn update_song_list(&self, list: &SongList) -> Result<(), DatabaseError> {
        let mut tables = self.tables.write().await;
        replace(&mut tables.song_lists, list, |l| l.id == list.id)
    }

    async fn song_lists_of_user(&self, owner_id: Uuid) -> Result<Vec<SongList>, DatabaseError> {
        Ok(self
            .tables
            .read()
            .await
            .song_lists
            .iter()
            .filter(|l| l.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn add_song_to_list(
        &self,
        list_id: Uuid,
        song_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let mut tables = self.tables.write().await;
        if tables
            .list_entries
            .iter()
            .any(|(l, s, _)| *l == list_id && *s == song_id)
        {
            return Err(DatabaseError::Conflict("record already exists".to_string()));
        }
        tables.list_entries.push((list_id, song_id, at));
        Ok(())
    }

    async fn remove_song_from_list(
        &self,
        list_id: Uuid,
        song_id: Uuid,
    ) -> Result<bool, DatabaseError> {
        let mut tables = self.tables.write().await;
        let before = tables.list_entries.len();
        tables
            .list_entries
            .retain(|(l, s, _)| !(*l == list_id && *s == song_id));
        Ok(tables.list_entries.len() != before)
    }

    async fn songs_in_list(&self, list_id: Uuid) -> Result<Vec<Song>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables
            .list_entries
            .iter()
            .filter(|(l, _, _)| *l == list_id)
            .filter_map(|(_, s, _)| tables.songs.iter().find(|song| song.id == *s))
            .cloned()
            .collect())
    }

    async fn insert_comment(&self, comment: &SongComment) -> Result<(), DatabaseError> {
        self.tables.write().await.comments.push(comment.clone());
        Ok(())
    }

    async fn find_comment_owned(
        &self,
        id: Uuid,
        author_id: Uuid,
    ) -> Result<Option<SongComment>, DatabaseError> {
        Ok(self
            .tables
            .read()
            .await
            .comments
            .iter()
            .find(|c| c.id == id && c.author_id == author_id)
            .cloned())
    }

    async fn delete_comment(&self, id: Uuid) -> Result<(), DatabaseError> {
        let mut tables = self.tables.write().await;
        let before = tables.comments.len();
        tables.comments.retain(|c| c.id != id);
        if tables.comments.len() == before {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    async fn comments_of_song(&self, song_id: Uuid) -> Result<Vec<SongComment>, DatabaseError> {
        let mut comments: Vec<SongComment> = self
            .tables
            .read()
            .await
            .comments
            .iter()
            .filter(|c| c.song_id == song_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| b.released_at.cmp(&a.released_at));
        Ok(comments)
    }

    async fn follow_producer(
        &self,
        user_id: Uuid,
        producer_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let mut tables = self.tables.write().await;
        if tables.follows.contains_key(&(user_id, producer_id)) {
            return Err(DatabaseError::Conflict("record already exists".to_string()));
        }
        tables.follows.insert((user_id, producer_id), at);
        Ok(())
    }

    async fn unfollow_producer(
        &self,
        user_id: Uuid,
        producer_id: Uuid,
    ) -> Result<bool, DatabaseError> {
        Ok(self
            .tables
            .write()
            .await
            .follows
            .remove(&(user_id, producer_id))
            .is_some())
    }

    async fn fans_of_producer(&self, producer_id: Uuid) -> Result<Vec<Fan>, DatabaseError> {
        let tables = self.tables.read().await;
        let mut fans: Vec<Fan> = tables
            .follows
            .iter()
            .filter(|((_, producer), _)| *producer == producer_id)
            .filter_map(|((user, _), at)| {
                tables.users.get(user).map(|u| Fan {
                    user_id: u.id,
                    username: u.username.clone(),
                    profile_picture_url: u.profile_picture_url.clone(),
                    follow_time: *at,
                })
            })
            .collect();
        fans.sort_by(|a, b| a.follow_time.cmp(&b.follow_time));
        Ok(fans)
    }

    async fn insert_collaboration(
        &self,
        collaboration: &SongCollaboration,
    ) -> Result<(), DatabaseError> {
        let mut tables = self.tables.write().await;
        if tables.collaborations.iter().any(|c| {
            c.song_id == collaboration.song_id && c.producer_id == collaboration.producer_id
        }) {
            return Err(DatabaseError::Conflict(
                "song-collaboration already exists".to_string(),
            ));
        }
        tables.collaborations.push(collaboration.clone());
        Ok(())
    }

    async fn decide_collaboration(
        &self,
        song_id: Uuid,
        producer_id: Uuid,
        status: CollaborationStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let mut tables = self.tables.write().await;
        match tables.collaborations.iter_mut().find(|c| {
            c.song_id == song_id
                && c.producer_id == producer_id
                && c.status == CollaborationStatus::Pending
        }) {
            Some(record) => {
                record.status = status;
                record.updated_at = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn collaborations_of_producer(
        &self,
        producer_id: Uuid,
        status: Option<CollaborationStatus>,
    ) -> Result<Vec<CollaborationView>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables
            .collaborations
            .iter()
            .filter(|c| c.producer_id == producer_id)
            .filter(|c| status.map_or(true, |s| c.status == s))
            .filter_map(|c| {
                let song = tables.songs.iter().find(|s| s.id == c.song_id)?;
                Some(CollaborationView {
                    collaboration: c.clone(),
                    song_name: song.name.clone(),
                    song_version: song.version.clone(),
                })
            })
            .collect())
    }
}
