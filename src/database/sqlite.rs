//! SQLite database backend implementation.
//!
//! Every repository call is one `Connection::call` on the background
//! connection thread. Email uniqueness, the one-producer-per-user link and
//! duplicate follows/list entries are enforced by table constraints.
//!
//! Timestamps are stored as fixed-width RFC 3339 text (UTC, nanoseconds), so
//! lexical order equals chronological order.

use super::{CaptchaRepository, CatalogRepository, DatabaseError, UserRepository};
use crate::auth::models::{CaptchaRecord, Principal, Producer, UserRecord};
use crate::catalog::models::{
    Album, CollaborationStatus, CollaborationView, Fan, ProducerSummary, Song, SongCollaboration,
    SongComment, SongFilter, SongList, SongSummary,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{self, params, types::Type, ErrorCode, OptionalExtension, Row};
use tokio_rusqlite::Connection;
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS producers (
    id TEXT PRIMARY KEY,
    ptype TEXT,
    title TEXT,
    authentication TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    producer_id TEXT UNIQUE REFERENCES producers(id),
    phone TEXT,
    profile_picture_url TEXT,
    gender TEXT,
    birthday TEXT,
    region TEXT,
    introduction TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS captchas (
    email TEXT PRIMARY KEY,
    code TEXT NOT NULL,
    expires_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS albums (
    id TEXT PRIMARY KEY,
    producer_id TEXT NOT NULL REFERENCES producers(id),
    name TEXT NOT NULL,
    album_type TEXT,
    release_date TEXT,
    introduction TEXT,
    cover_url TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS songs (
    id TEXT PRIMARY KEY,
    producer_id TEXT NOT NULL REFERENCES producers(id),
    album_id TEXT NOT NULL REFERENCES albums(id),
    name TEXT NOT NULL,
    song_type TEXT,
    version TEXT,
    language TEXT,
    music_style TEXT,
    metadata TEXT,
    introduction TEXT,
    audio_url TEXT,
    lyrics_url TEXT,
    play_back INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS song_lists (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL REFERENCES users(id),
    title TEXT NOT NULL,
    cover_picture_url TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS song_list_entries (
    list_id TEXT NOT NULL REFERENCES song_lists(id),
    song_id TEXT NOT NULL REFERENCES songs(id),
    added_at TEXT NOT NULL,
    PRIMARY KEY (list_id, song_id)
);
CREATE TABLE IF NOT EXISTS song_comments (
    id TEXT PRIMARY KEY,
    song_id TEXT NOT NULL REFERENCES songs(id),
    author_id TEXT NOT NULL REFERENCES users(id),
    comment TEXT NOT NULL,
    likes INTEGER NOT NULL DEFAULT 0,
    released_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS follows (
    user_id TEXT NOT NULL REFERENCES users(id),
    producer_id TEXT NOT NULL REFERENCES producers(id),
    followed_at TEXT NOT NULL,
    PRIMARY KEY (user_id, producer_id)
);
CREATE TABLE IF NOT EXISTS collaborations (
    song_id TEXT NOT NULL REFERENCES songs(id),
    producer_id TEXT NOT NULL REFERENCES producers(id),
    role TEXT,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (song_id, producer_id)
);
"#;

const USER_COLUMNS: &str = "id, username, email, password_hash, producer_id, phone, \
     profile_picture_url, gender, birthday, region, introduction, created_at, updated_at";
const PRODUCER_COLUMNS: &str = "id, ptype, title, authentication, created_at, updated_at";
const ALBUM_COLUMNS: &str =
    "id, producer_id, name, album_type, release_date, introduction, cover_url, created_at, updated_at";
const SONG_COLUMNS: &str = "id, producer_id, album_id, name, song_type, version, language, \
     music_style, metadata, introduction, audio_url, lyrics_url, play_back, created_at, updated_at";
const LIST_COLUMNS: &str = "id, owner_id, title, cover_picture_url, created_at, updated_at";
const COMMENT_COLUMNS: &str = "id, song_id, author_id, comment, likes, released_at";
const SUMMARY_SELECT: &str = "SELECT s.id, s.name, s.play_back, a.id, a.name, a.cover_url, \
     s.producer_id, u.username FROM songs s \
     JOIN albums a ON a.id = s.album_id \
     JOIN users u ON u.producer_id = s.producer_id";

/// SQLite-backed store.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path)
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;
        conn.call(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

        Ok(Self { conn })
    }
}

/// Map a driver error, turning constraint violations into `Conflict(message)`.
fn write_error(err: tokio_rusqlite::Error, message: &str) -> DatabaseError {
    match err {
        tokio_rusqlite::Error::Rusqlite(inner)
            if inner.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) =>
        {
            DatabaseError::Conflict(message.to_string())
        }
        other => DatabaseError::QueryError(other.to_string()),
    }
}

fn query_error(err: tokio_rusqlite::Error) -> DatabaseError {
    DatabaseError::QueryError(err.to_string())
}

fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn day(date: &Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

fn conversion<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text).map_err(|e| conversion(idx, e))
}

fn opt_uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| Uuid::parse_str(&t).map_err(|e| conversion(idx, e)))
        .transpose()
}

fn time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion(idx, e))
}

fn date_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| NaiveDate::parse_from_str(&t, "%Y-%m-%d").map_err(|e| conversion(idx, e)))
        .transpose()
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: uuid_at(row, 0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        producer_id: opt_uuid_at(row, 4)?,
        phone: row.get(5)?,
        profile_picture_url: row.get(6)?,
        gender: row.get(7)?,
        birthday: date_at(row, 8)?,
        region: row.get(9)?,
        introduction: row.get(10)?,
        created_at: time_at(row, 11)?,
        updated_at: time_at(row, 12)?,
    })
}

fn producer_from_row(row: &Row<'_>) -> rusqlite::Result<Producer> {
    Ok(Producer {
        id: uuid_at(row, 0)?,
        ptype: row.get(1)?,
        title: row.get(2)?,
        authentication: row.get(3)?,
        created_at: time_at(row, 4)?,
        updated_at: time_at(row, 5)?,
    })
}

fn album_from_row(row: &Row<'_>) -> rusqlite::Result<Album> {
    Ok(Album {
        id: uuid_at(row, 0)?,
        producer_id: uuid_at(row, 1)?,
        name: row.get(2)?,
        album_type: row.get(3)?,
        release_date: date_at(row, 4)?,
        introduction: row.get(5)?,
        cover_url: row.get(6)?,
        created_at: time_at(row, 7)?,
        updated_at: time_at(row, 8)?,
    })
}

fn song_from_row(row: &Row<'_>) -> rusqlite::Result<Song> {
    Ok(Song {
        id: uuid_at(row, 0)?,
        producer_id: uuid_at(row, 1)?,
        album_id: uuid_at(row, 2)?,
        name: row.get(3)?,
        song_type: row.get(4)?,
        version: row.get(5)?,
        language: row.get(6)?,
        music_style: row.get(7)?,
        metadata: row.get(8)?,
        introduction: row.get(9)?,
        audio_url: row.get(10)?,
        lyrics_url: row.get(11)?,
        play_back: row.get(12)?,
        created_at: time_at(row, 13)?,
        updated_at: time_at(row, 14)?,
    })
}

fn list_from_row(row: &Row<'_>) -> rusqlite::Result<SongList> {
    Ok(SongList {
        id: uuid_at(row, 0)?,
        owner_id: uuid_at(row, 1)?,
        title: row.get(2)?,
        cover_picture_url: row.get(3)?,
        created_at: time_at(row, 4)?,
        updated_at: time_at(row, 5)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<SongComment> {
    Ok(SongComment {
        id: uuid_at(row, 0)?,
        song_id: uuid_at(row, 1)?,
        author_id: uuid_at(row, 2)?,
        comment: row.get(3)?,
        likes: row.get(4)?,
        released_at: time_at(row, 5)?,
    })
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<SongSummary> {
    Ok(SongSummary {
        song_id: uuid_at(row, 0)?,
        song_name: row.get(1)?,
        play_back: row.get(2)?,
        album_id: uuid_at(row, 3)?,
        album_name: row.get(4)?,
        album_cover_url: row.get(5)?,
        producer_id: uuid_at(row, 6)?,
        producer_name: row.get(7)?,
    })
}

fn status_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<CollaborationStatus> {
    let code: String = row.get(idx)?;
    CollaborationStatus::from_code(&code)
        .ok_or_else(|| rusqlite::Error::InvalidColumnType(idx, "status".to_string(), Type::Text))
}

fn collaboration_from_row(row: &Row<'_>) -> rusqlite::Result<CollaborationView> {
    Ok(CollaborationView {
        collaboration: SongCollaboration {
            song_id: uuid_at(row, 0)?,
            producer_id: uuid_at(row, 1)?,
            role: row.get(2)?,
            status: status_at(row, 3)?,
            created_at: time_at(row, 4)?,
            updated_at: time_at(row, 5)?,
        },
        song_name: row.get(6)?,
        song_version: row.get(7)?,
    })
}

/// `%text%` for a `LIKE ... ESCAPE '\'` match. SQLite's LIKE ignores ASCII case.
fn like_pattern(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

enum Attach {
    Done,
    MissingUser,
    AlreadyProducer,
}

#[async_trait]
impl UserRepository for SqliteStore {
    async fn insert_user(&self, user: UserRecord) -> Result<(), DatabaseError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO users ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                        USER_COLUMNS
                    ),
                    params![
                        user.id.to_string(),
                        user.username,
                        user.email,
                        user.password_hash,
                        user.producer_id.map(|p| p.to_string()),
                        user.phone,
                        user.profile_picture_url,
                        user.gender,
                        day(&user.birthday),
                        user.region,
                        user.introduction,
                        ts(&user.created_at),
                        ts(&user.updated_at),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| write_error(e, "Email has been registered"))
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, DatabaseError> {
        self.conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                        params![id.to_string()],
                        user_from_row,
                    )
                    .optional()?;
                Ok(user)
            })
            .await
            .map_err(query_error)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, DatabaseError> {
        let email = email.to_string();
        self.conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
                        params![email],
                        user_from_row,
                    )
                    .optional()?;
                Ok(user)
            })
            .await
            .map_err(query_error)
    }

    async fn email_exists(&self, email: &str) -> Result<bool, DatabaseError> {
        let email = email.to_string();
        self.conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM users WHERE email = ?1",
                    params![email],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(query_error)
    }

    async fn username_exists(&self, username: &str) -> Result<bool, DatabaseError> {
        let username = username.to_string();
        self.conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM users WHERE username = ?1",
                    params![username],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(query_error)
    }

    async fn find_principal(
        &self,
        id: Uuid,
        email: &str,
    ) -> Result<Option<Principal>, DatabaseError> {
        let email = email.to_string();
        self.conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM users WHERE id = ?1 AND email = ?2",
                            USER_COLUMNS
                        ),
                        params![id.to_string(), email],
                        user_from_row,
                    )
                    .optional()?;
                let Some(user) = user else {
                    return Ok(None);
                };
                let producer = match user.producer_id {
                    Some(pid) => conn
                        .query_row(
                            &format!("SELECT {} FROM producers WHERE id = ?1", PRODUCER_COLUMNS),
                            params![pid.to_string()],
                            producer_from_row,
                        )
                        .optional()?,
                    None => None,
                };
                Ok(Some(user.to_principal(producer)))
            })
            .await
            .map_err(query_error)
    }

    async fn update_user(&self, user: &UserRecord) -> Result<(), DatabaseError> {
        let user = user.clone();
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE users SET username = ?2, email = ?3, password_hash = ?4, \
                     phone = ?5, profile_picture_url = ?6, gender = ?7, birthday = ?8, \
                     region = ?9, introduction = ?10, updated_at = ?11 WHERE id = ?1",
                    params![
                        user.id.to_string(),
                        user.username,
                        user.email,
                        user.password_hash,
                        user.phone,
                        user.profile_picture_url,
                        user.gender,
                        day(&user.birthday),
                        user.region,
                        user.introduction,
                        ts(&user.updated_at),
                    ],
                )?;
                Ok(changed)
            })
            .await
            .map_err(|e| write_error(e, "Email has been registered"))?;
        if changed == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    async fn attach_producer(&self, user_id: Uuid, producer: Producer) -> Result<(), DatabaseError> {
        let outcome = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let current: Option<Option<String>> = tx
                    .query_row(
                        "SELECT producer_id FROM users WHERE id = ?1",
                        params![user_id.to_string()],
                        |row| row.get(0),
                    )
                    .optional()?;
                match current {
                    None => return Ok(Attach::MissingUser),
                    Some(Some(_)) => return Ok(Attach::AlreadyProducer),
                    Some(None) => {}
                }
                tx.execute(
                    &format!(
                        "INSERT INTO producers ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        PRODUCER_COLUMNS
                    ),
                    params![
                        producer.id.to_string(),
                        producer.ptype,
                        producer.title,
                        producer.authentication,
                        ts(&producer.created_at),
                        ts(&producer.updated_at),
                    ],
                )?;
                tx.execute(
                    "UPDATE users SET producer_id = ?2, updated_at = ?3 WHERE id = ?1",
                    params![
                        user_id.to_string(),
                        producer.id.to_string(),
                        ts(&producer.created_at)
                    ],
                )?;
                tx.commit()?;
                Ok(Attach::Done)
            })
            .await
            .map_err(|e| write_error(e, "producer has been register"))?;

        match outcome {
            Attach::Done => Ok(()),
            Attach::MissingUser => Err(DatabaseError::NotFound),
            Attach::AlreadyProducer => Err(DatabaseError::Conflict(
                "producer has been register".to_string(),
            )),
        }
    }

    async fn find_producer(&self, id: Uuid) -> Result<Option<Producer>, DatabaseError> {
        self.conn
            .call(move |conn| {
                let producer = conn
                    .query_row(
                        &format!("SELECT {} FROM producers WHERE id = ?1", PRODUCER_COLUMNS),
                        params![id.to_string()],
                        producer_from_row,
                    )
                    .optional()?;
                Ok(producer)
            })
            .await
            .map_err(query_error)
    }
}

#[async_trait]
impl CaptchaRepository for SqliteStore {
    async fn upsert_captcha(&self, record: CaptchaRecord) -> Result<(), DatabaseError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO captchas (email, code, expires_at) VALUES (?1, ?2, ?3) \
                     ON CONFLICT(email) DO UPDATE SET code = excluded.code, expires_at = excluded.expires_at",
                    params![record.email, record.code, ts(&record.expires_at)],
                )?;
                Ok(())
            })
            .await
            .map_err(query_error)
    }

    async fn take_captcha(
        &self,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let (email, code) = (email.to_string(), code.to_string());
        self.conn
            .call(move |conn| {
                let removed = conn.execute(
                    "DELETE FROM captchas WHERE email = ?1 AND code = ?2 AND expires_at > ?3",
                    params![email, code, ts(&now)],
                )?;
                Ok(removed == 1)
            })
            .await
            .map_err(query_error)
    }
}

#[async_trait]
impl CatalogRepository for SqliteStore {
    async fn insert_album(&self, album: &Album) -> Result<(), DatabaseError> {
        let album = album.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO albums ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                        ALBUM_COLUMNS
                    ),
                    params![
                        album.id.to_string(),
                        album.producer_id.to_string(),
                        album.name,
                        album.album_type,
                        day(&album.release_date),
                        album.introduction,
                        album.cover_url,
                        ts(&album.created_at),
                        ts(&album.updated_at),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| write_error(e, "record already exists"))
    }

    async fn find_album_owned(
        &self,
        id: Uuid,
        producer_id: Uuid,
    ) -> Result<Option<Album>, DatabaseError> {
        self.conn
            .call(move |conn| {
                let album = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM albums WHERE id = ?1 AND producer_id = ?2",
                            ALBUM_COLUMNS
                        ),
                        params![id.to_string(), producer_id.to_string()],
                        album_from_row,
                    )
                    .optional()?;
                Ok(album)
            })
            .await
            .map_err(query_error)
    }

    async fn find_album(&self, id: Uuid) -> Result<Option<Album>, DatabaseError> {
        self.conn
            .call(move |conn| {
                let album = conn
                    .query_row(
                        &format!("SELECT {} FROM albums WHERE id = ?1", ALBUM_COLUMNS),
                        params![id.to_string()],
                        album_from_row,
                    )
                    .optional()?;
                Ok(album)
            })
            .await
            .map_err(query_error)
    }

    async fn update_album(&self, album: &Album) -> Result<(), DatabaseError> {
        let album = album.clone();
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE albums SET name = ?2, album_type = ?3, release_date = ?4, \
                     introduction = ?5, cover_url = ?6, updated_at = ?7 WHERE id = ?1",
                    params![
                        album.id.to_string(),
                        album.name,
                        album.album_type,
                        day(&album.release_date),
                        album.introduction,
                        album.cover_url,
                        ts(&album.updated_at),
                    ],
                )?;
                Ok(changed)
            })
            .await
            .map_err(query_error)?;
        if changed == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    async fn albums_of_producer(&self, producer_id: Uuid) -> Result<Vec<Album>, DatabaseError> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM albums WHERE producer_id = ?1 ORDER BY created_at",
                    ALBUM_COLUMNS
                ))?;
                let albums = stmt
                    .query_map(params![producer_id.to_string()], album_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(albums)
            })
            .await
            .map_err(query_error)
    }

    async fn insert_song(&self, song: &Song) -> Result<(), DatabaseError> {
        let song = song.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO songs ({}) VALUES \
                         (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                        SONG_COLUMNS
                    ),
                    params![
                        song.id.to_string(),
                        song.producer_id.to_string(),
                        song.album_id.to_string(),
                        song.name,
                        song.song_type,
                        song.version,
                        song.language,
                        song.music_style,
                        song.metadata,
                        song.introduction,
                        song.audio_url,
                        song.lyrics_url,
                        song.play_back,
                        ts(&song.created_at),
                        ts(&song.updated_at),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| write_error(e, "record already exists"))
    }

    async fn find_song(&self, id: Uuid) -> Result<Option<Song>, DatabaseError> {
        self.conn
            .call(move |conn| {
                let song = conn
                    .query_row(
                        &format!("SELECT {} FROM songs WHERE id = ?1", SONG_COLUMNS),
                        params![id.to_string()],
                        song_from_row,
                    )
                    .optional()?;
                Ok(song)
            })
            .await
            .map_err(query_error)
    }

    async fn find_song_owned(
        &self,
        id: Uuid,
        producer_id: Uuid,
    ) -> Result<Option<Song>, DatabaseError> {
        self.conn
            .call(move |conn| {
                let song = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM songs WHERE id = ?1 AND producer_id = ?2",
                            SONG_COLUMNS
                        ),
                        params![id.to_string(), producer_id.to_string()],
                        song_from_row,
                    )
                    .optional()?;
                Ok(song)
            })
            .await
            .map_err(query_error)
    }

    async fn update_song(&self, song: &Song) -> Result<(), DatabaseError> {
        let song = song.clone();
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE songs SET album_id = ?2, name = ?3, song_type = ?4, version = ?5, \
                     language = ?6, music_style = ?7, metadata = ?8, introduction = ?9, \
                     audio_url = ?10, lyrics_url = ?11, updated_at = ?12 WHERE id = ?1",
                    params![
                        song.id.to_string(),
                        song.album_id.to_string(),
                        song.name,
                        song.song_type,
                        song.version,
                        song.language,
                        song.music_style,
                        song.metadata,
                        song.introduction,
                        song.audio_url,
                        song.lyrics_url,
                        ts(&song.updated_at),
                    ],
                )?;
                Ok(changed)
            })
            .await
            .map_err(query_error)?;
        if changed == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    async fn songs_of_producer(&self, producer_id: Uuid) -> Result<Vec<Song>, DatabaseError> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM songs WHERE producer_id = ?1 ORDER BY created_at",
                    SONG_COLUMNS
                ))?;
                let songs = stmt
                    .query_map(params![producer_id.to_string()], song_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(songs)
            })
            .await
            .map_err(query_error)
    }

    async fn increment_play_back(&self, song_id: Uuid) -> Result<bool, DatabaseError> {
        self.conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE songs SET play_back = play_back + 1 WHERE id = ?1",
                    params![song_id.to_string()],
                )?;
                Ok(changed > 0)
            })
            .await
            .map_err(query_error)
    }

    async fn song_summaries(&self, filter: SongFilter) -> Result<Vec<SongSummary>, DatabaseError> {
        let (condition, arg) = match filter {
            SongFilter::Album(id) => ("s.album_id = ?1", id.to_string()),
            SongFilter::Producer(id) => ("s.producer_id = ?1", id.to_string()),
            SongFilter::Collaborator(id) => (
                "s.id IN (SELECT song_id FROM collaborations WHERE producer_id = ?1 AND status = 'c')",
                id.to_string(),
            ),
            SongFilter::Matching(text) => (
                "(s.name LIKE ?1 ESCAPE '\\' OR a.name LIKE ?1 ESCAPE '\\' \
                 OR u.username LIKE ?1 ESCAPE '\\')",
                like_pattern(&text),
            ),
        };
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE {} ORDER BY s.created_at",
                    SUMMARY_SELECT, condition
                ))?;
                let rows = stmt
                    .query_map(params![arg], summary_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(query_error)
    }

    async fn search_producers(
        &self,
        name: Option<String>,
        ptype: Option<String>,
    ) -> Result<Vec<ProducerSummary>, DatabaseError> {
        let pattern = name.as_deref().map(like_pattern);
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT p.id, u.username, u.profile_picture_url, p.ptype \
                     FROM producers p JOIN users u ON u.producer_id = p.id \
                     WHERE (?1 IS NULL OR u.username LIKE ?1 ESCAPE '\\') \
                     AND (?2 IS NULL OR p.ptype = ?2) ORDER BY p.created_at",
                )?;
                let rows = stmt
                    .query_map(params![pattern, ptype], |row| {
                        Ok(ProducerSummary {
                            producer_id: uuid_at(row, 0)?,
                            name: row.get(1)?,
                            profile_picture_url: row.get(2)?,
                            ptype: row.get(3)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(query_error)
    }

    async fn insert_song_list(&self, list: &SongList) -> Result<(), DatabaseError> {
        let list = list.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO song_lists ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        LIST_COLUMNS
                    ),
                    params![
                        list.id.to_string(),
                        list.owner_id.to_string(),
                        list.title,
                        list.cover_picture_url,
                        ts(&list.created_at),
                        ts(&list.updated_at),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| write_error(e, "record already exists"))
    }

    async fn find_song_list_owned(
        &self,
        id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<SongList>, DatabaseError> {
        self.conn
            .call(move |conn| {
                let list = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM song_lists WHERE id = ?1 AND owner_id = ?2",
                            LIST_COLUMNS
                        ),
                        params![id.to_string(), owner_id.to_string()],
                        list_from_row,
                    )
                    .optional()?;
                Ok(list)
            })
            .await
            .map_err(query_error)
    }

    async fn update_song_list(&self, list: &SongList) -> Result<(), DatabaseError> {
        let list = list.clone();
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE song_lists SET title = ?2, cover_picture_url = ?3, updated_at = ?4 \
                     WHERE id = ?1",
                    params![
                        list.id.to_string(),
                        list.title,
                        list.cover_picture_url,
                        ts(&list.updated_at),
                    ],
                )?;
                Ok(changed)
            })
            .await
            .map_err(query_error)?;
        if changed == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    async fn song_lists_of_user(&self, owner_id: Uuid) -> Result<Vec<SongList>, DatabaseError> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM song_lists WHERE owner_id = ?1 ORDER BY created_at",
                    LIST_COLUMNS
                ))?;
                let lists = stmt
                    .query_map(params![owner_id.to_string()], list_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(lists)
            })
            .await
            .map_err(query_error)
    }

    async fn add_song_to_list(
        &self,
        list_id: Uuid,
        song_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO song_list_entries (list_id, song_id, added_at) VALUES (?1, ?2, ?3)",
                    params![list_id.to_string(), song_id.to_string(), ts(&at)],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| write_error(e, "record already exists"))
    }

    async fn remove_song_from_list(
        &self,
        list_id: Uuid,
        song_id: Uuid,
    ) -> Result<bool, DatabaseError> {
        self.conn
            .call(move |conn| {
                let removed = conn.execute(
                    "DELETE FROM song_list_entries WHERE list_id = ?1 AND song_id = ?2",
                    params![list_id.to_string(), song_id.to_string()],
                )?;
                Ok(removed > 0)
            })
            .await
            .map_err(query_error)
    }

    async fn songs_in_list(&self, list_id: Uuid) -> Result<Vec<Song>, DatabaseError> {
        self.conn
            .call(move |conn| {
                let columns = SONG_COLUMNS
                    .split(", ")
                    .map(|c| format!("s.{}", c.trim()))
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM song_list_entries e JOIN songs s ON s.id = e.song_id \
                     WHERE e.list_id = ?1 ORDER BY e.added_at",
                    columns
                ))?;
                let songs = stmt
                    .query_map(params![list_id.to_string()], song_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(songs)
            })
            .await
            .map_err(query_error)
    }

    async fn insert_comment(&self, comment: &SongComment) -> Result<(), DatabaseError> {
        let comment = comment.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO song_comments ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        COMMENT_COLUMNS
                    ),
                    params![
                        comment.id.to_string(),
                        comment.song_id.to_string(),
                        comment.author_id.to_string(),
                        comment.comment,
                        comment.likes,
                        ts(&comment.released_at),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| write_error(e, "record already exists"))
    }

    async fn find_comment_owned(
        &self,
        id: Uuid,
        author_id: Uuid,
    ) -> Result<Option<SongComment>, DatabaseError> {
        self.conn
            .call(move |conn| {
                let comment = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM song_comments WHERE id = ?1 AND author_id = ?2",
                            COMMENT_COLUMNS
                        ),
                        params![id.to_string(), author_id.to_string()],
                        comment_from_row,
                    )
                    .optional()?;
                Ok(comment)
            })
            .await
            .map_err(query_error)
    }

    async fn delete_comment(&self, id: Uuid) -> Result<(), DatabaseError> {
        let removed = self
            .conn
            .call(move |conn| {
                let removed = conn.execute(
                    "DELETE FROM song_comments WHERE id = ?1",
                    params![id.to_string()],
                )?;
                Ok(removed)
            })
            .await
            .map_err(query_error)?;
        if removed == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    async fn comments_of_song(&self, song_id: Uuid) -> Result<Vec<SongComment>, DatabaseError> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM song_comments WHERE song_id = ?1 ORDER BY released_at DESC",
                    COMMENT_COLUMNS
                ))?;
                let comments = stmt
                    .query_map(params![song_id.to_string()], comment_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(comments)
            })
            .await
            .map_err(query_error)
    }

    async fn follow_producer(
        &self,
        user_id: Uuid,
        producer_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO follows (user_id, producer_id, followed_at) VALUES (?1, ?2, ?3)",
                    params![user_id.to_string(), producer_id.to_string(), ts(&at)],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| write_error(e, "record already exists"))
    }

    async fn unfollow_producer(
        &self,
        user_id: Uuid,
        producer_id: Uuid,
    ) -> Result<bool, DatabaseError> {
        self.conn
            .call(move |conn| {
                let removed = conn.execute(
                    "DELETE FROM follows WHERE user_id = ?1 AND producer_id = ?2",
                    params![user_id.to_string(), producer_id.to_string()],
                )?;
                Ok(removed > 0)
            })
            .await
            .map_err(query_error)
    }

    async fn fans_of_producer(&self, producer_id: Uuid) -> Result<Vec<Fan>, DatabaseError> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT u.id, u.username, u.profile_picture_url, f.followed_at \
                     FROM follows f JOIN users u ON u.id = f.user_id \
                     WHERE f.producer_id = ?1 ORDER BY f.followed_at",
                )?;
                let fans = stmt
                    .query_map(params![producer_id.to_string()], |row| {
                        Ok(Fan {
                            user_id: uuid_at(row, 0)?,
                            username: row.get(1)?,
                            profile_picture_url: row.get(2)?,
                            follow_time: time_at(row, 3)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(fans)
            })
            .await
            .map_err(query_error)
    }

    async fn insert_collaboration(
        &self,
        collaboration: &SongCollaboration,
    ) -> Result<(), DatabaseError> {
        let c = collaboration.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO collaborations \
                     (song_id, producer_id, role, status, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        c.song_id.to_string(),
                        c.producer_id.to_string(),
                        c.role,
                        c.status.code(),
                        ts(&c.created_at),
                        ts(&c.updated_at),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| write_error(e, "song-collaboration already exists"))
    }

    async fn decide_collaboration(
        &self,
        song_id: Uuid,
        producer_id: Uuid,
        status: CollaborationStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        self.conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE collaborations SET status = ?3, updated_at = ?4 \
                     WHERE song_id = ?1 AND producer_id = ?2 AND status = 'p'",
                    params![
                        song_id.to_string(),
                        producer_id.to_string(),
                        status.code(),
                        ts(&at)
                    ],
                )?;
                Ok(changed > 0)
            })
            .await
            .map_err(query_error)
    }

    async fn collaborations_of_producer(
        &self,
        producer_id: Uuid,
        status: Option<CollaborationStatus>,
    ) -> Result<Vec<CollaborationView>, DatabaseError> {
        let status = status.map(|s| s.code());
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT c.song_id, c.producer_id, c.role, c.status, c.created_at, \
                     c.updated_at, s.name, s.version \
                     FROM collaborations c JOIN songs s ON s.id = c.song_id \
                     WHERE c.producer_id = ?1 AND (?2 IS NULL OR c.status = ?2) \
                     ORDER BY c.created_at",
                )?;
                let rows = stmt
                    .query_map(params![producer_id.to_string(), status], collaboration_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(query_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::{ProducerApplication, Role};
    use chrono::Duration;
    use tempfile::NamedTempFile;

    async fn store() -> (SqliteStore, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        let store = SqliteStore::open(file.path().to_str().unwrap()).await.unwrap();
        (store, file)
    }

    #[tokio::test]
    async fn test_user_round_trip_and_unique_email() {
        let (store, _file) = store().await;
        let user = UserRecord::new("alice".into(), "a@x.com".into(), "hash".into(), Utc::now());
        store.insert_user(user.clone()).await.unwrap();

        let found = store.find_user_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(found.created_at, user.created_at);
        assert!(store.username_exists("alice").await.unwrap());

        let dup = UserRecord::new("bob".into(), "a@x.com".into(), "hash".into(), Utc::now());
        let err = store.insert_user(dup).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_producer_link() {
        let (store, _file) = store().await;
        let user = UserRecord::new("alice".into(), "a@x.com".into(), "hash".into(), Utc::now());
        let id = user.id;
        store.insert_user(user).await.unwrap();

        let producer = Producer::from_application(ProducerApplication::default(), Utc::now());
        store.attach_producer(id, producer.clone()).await.unwrap();
        let principal = store.find_principal(id, "a@x.com").await.unwrap().unwrap();
        assert_eq!(principal.role, Role::Producer(producer));

        let again = Producer::from_application(ProducerApplication::default(), Utc::now());
        assert!(matches!(
            store.attach_producer(id, again).await,
            Err(DatabaseError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_captcha_upsert_and_take() {
        let (store, _file) = store().await;
        let now = Utc::now();
        let record = |code: &str| CaptchaRecord {
            email: "a@x.com".into(),
            code: code.into(),
            expires_at: now + Duration::minutes(30),
        };
        store.upsert_captcha(record("AAAAAA")).await.unwrap();
        store.upsert_captcha(record("BBBBBB")).await.unwrap();

        assert!(!store.take_captcha("a@x.com", "AAAAAA", now).await.unwrap());
        assert!(!store
            .take_captcha("a@x.com", "BBBBBB", now + Duration::minutes(30))
            .await
            .unwrap());
        assert!(store.take_captcha("a@x.com", "BBBBBB", now).await.unwrap());
        assert!(!store.take_captcha("a@x.com", "BBBBBB", now).await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_update_keeps_producer_link() {
        let (store, _file) = store().await;
        let user = UserRecord::new("alice".into(), "a@x.com".into(), "hash".into(), Utc::now());
        let id = user.id;
        store.insert_user(user).await.unwrap();

        let mut stale = store.find_user(id).await.unwrap().unwrap();
        let producer = Producer::from_application(ProducerApplication::default(), Utc::now());
        store.attach_producer(id, producer.clone()).await.unwrap();

        stale.region = Some("Porto".into());
        store.update_user(&stale).await.unwrap();

        let principal = store.find_principal(id, "a@x.com").await.unwrap().unwrap();
        assert_eq!(principal.role, Role::Producer(producer));
        let stored = store.find_user(id).await.unwrap().unwrap();
        assert_eq!(stored.region.as_deref(), Some("Porto"));
    }

    #[tokio::test]
    async fn test_search_and_play_count() {
        let (store, _file) = store().await;
        let now = Utc::now();
        let user = UserRecord::new("Nightjar".into(), "n@x.com".into(), "hash".into(), now);
        let id = user.id;
        store.insert_user(user).await.unwrap();
        let producer = Producer::from_application(
            ProducerApplication {
                ptype: Some("band".into()),
                ..Default::default()
            },
            now,
        );
        store.attach_producer(id, producer.clone()).await.unwrap();

        let album = Album {
            id: Uuid::new_v4(),
            producer_id: producer.id,
            name: "Dusk_Tapes".into(),
            album_type: None,
            release_date: None,
            introduction: None,
            cover_url: None,
            created_at: now,
            updated_at: now,
        };
        store.insert_album(&album).await.unwrap();
        let song = Song {
            id: Uuid::new_v4(),
            producer_id: producer.id,
            album_id: album.id,
            name: "Low Tide".into(),
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
        store.insert_song(&song).await.unwrap();

        assert!(store.increment_play_back(song.id).await.unwrap());
        let mut renamed = song.clone();
        renamed.name = "High Tide".into();
        store.update_song(&renamed).await.unwrap();

        let hits = store
            .song_summaries(SongFilter::Matching("nightJAR".into()))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].song_name, "High Tide");
        assert_eq!(hits[0].play_back, 1);
        assert_eq!(hits[0].producer_name, "Nightjar");

        // `_` is literal, not a wildcard
        assert_eq!(
            store
                .song_summaries(SongFilter::Matching("k_t".into()))
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(store
            .song_summaries(SongFilter::Matching("h_t".into()))
            .await
            .unwrap()
            .is_empty());

        let producers = store
            .search_producers(Some("night".into()), Some("band".into()))
            .await
            .unwrap();
        assert_eq!(producers.len(), 1);
        assert_eq!(producers[0].producer_id, producer.id);
        assert!(store
            .search_producers(None, Some("choir".into()))
            .await
            .unwrap()
            .is_empty());
    }
}
