//! Albums, songs, song lists and comments.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub id: Uuid,
    pub producer_id: Uuid,
    pub name: String,
    pub album_type: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub introduction: Option<String>,
    pub cover_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Album fields supplied on create or modify. `None` means "not supplied".
#[derive(Debug, Clone, Default)]
pub struct AlbumDraft {
    pub name: Option<String>,
    pub album_type: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub introduction: Option<String>,
}

impl Album {
    pub fn apply(&mut self, draft: AlbumDraft, now: DateTime<Utc>) {
        if let Some(name) = draft.name {
            self.name = name;
        }
        if draft.album_type.is_some() {
            self.album_type = draft.album_type;
        }
        if draft.release_date.is_some() {
            self.release_date = draft.release_date;
        }
        if draft.introduction.is_some() {
            self.introduction = draft.introduction;
        }
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub id: Uuid,
    pub producer_id: Uuid,
    pub album_id: Uuid,
    pub name: String,
    pub song_type: Option<String>,
    pub version: Option<String>,
    pub language: Option<String>,
    pub music_style: Option<String>,
    /// Free-form credits (lyricist, composer, mixing...) as a JSON string.
    pub metadata: Option<String>,
    pub introduction: Option<String>,
    pub audio_url: Option<String>,
    pub lyrics_url: Option<String>,
    pub play_back: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct SongDraft {
    pub name: Option<String>,
    pub song_type: Option<String>,
    pub version: Option<String>,
    pub language: Option<String>,
    pub music_style: Option<String>,
    pub metadata: Option<String>,
    pub introduction: Option<String>,
}

impl Song {
    pub fn apply(&mut self, draft: SongDraft, now: DateTime<Utc>) {
        if let Some(name) = draft.name {
            self.name = name;
        }
        if draft.song_type.is_some() {
            self.song_type = draft.song_type;
        }
        if draft.version.is_some() {
            self.version = draft.version;
        }
        if draft.language.is_some() {
            self.language = draft.language;
        }
        if draft.music_style.is_some() {
            self.music_style = draft.music_style;
        }
        if draft.metadata.is_some() {
            self.metadata = draft.metadata;
        }
        if draft.introduction.is_some() {
            self.introduction = draft.introduction;
        }
        self.updated_at = now;
    }
}

/// A user's playlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongList {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub cover_picture_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A song list together with the songs collected into it.
#[derive(Debug, Clone, Serialize)]
pub struct SongListView {
    #[serde(flatten)]
    pub list: SongList,
    pub songs: Vec<Song>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongComment {
    pub id: Uuid,
    pub song_id: Uuid,
    pub author_id: Uuid,
    pub comment: String,
    pub likes: i64,
    pub released_at: DateTime<Utc>,
}

/// Public listing row: a song with its album and producer name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongSummary {
    pub song_id: Uuid,
    pub song_name: String,
    pub play_back: i64,
    pub album_id: Uuid,
    pub album_name: String,
    pub album_cover_url: Option<String>,
    pub producer_id: Uuid,
    pub producer_name: String,
}

/// Which songs a summary listing covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SongFilter {
    Album(Uuid),
    /// Uploaded by the producer.
    Producer(Uuid),
    /// Confirmed collaborations of the producer on other producers' songs.
    Collaborator(Uuid),
    /// Song, album or producer name contains the text, ignoring case.
    Matching(String),
}

/// Songs of one producer, split by how the producer is credited.
#[derive(Debug, Clone, Serialize)]
pub struct ProducerSongs {
    pub producer_upload: Vec<SongSummary>,
    pub collaborate: Vec<SongSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerSummary {
    pub producer_id: Uuid,
    pub name: String,
    pub profile_picture_url: Option<String>,
    pub ptype: Option<String>,
}

/// A user following a producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fan {
    pub user_id: Uuid,
    pub username: String,
    pub profile_picture_url: Option<String>,
    pub follow_time: DateTime<Utc>,
}

/// State of a joint-release invitation. Only `Pending` can change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollaborationStatus {
    #[serde(rename = "p")]
    Pending,
    #[serde(rename = "c")]
    Confirmed,
    #[serde(rename = "r")]
    Rejected,
}

impl CollaborationStatus {
    pub fn code(self) -> &'static str {
        match self {
            CollaborationStatus::Pending => "p",
            CollaborationStatus::Confirmed => "c",
            CollaborationStatus::Rejected => "r",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "p" => Some(CollaborationStatus::Pending),
            "c" => Some(CollaborationStatus::Confirmed),
            "r" => Some(CollaborationStatus::Rejected),
            _ => None,
        }
    }
}

/// Invitation of `producer_id` to be credited on someone else's song.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongCollaboration {
    pub song_id: Uuid,
    pub producer_id: Uuid,
    pub role: Option<String>,
    pub status: CollaborationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollaborationView {
    #[serde(flatten)]
    pub collaboration: SongCollaboration,
    pub song_name: String,
    pub song_version: Option<String>,
}
