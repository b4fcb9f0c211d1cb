//! Music catalog: albums and songs owned by producers, joint releases
//! between producers, and the listener side (song lists, comments, follows,
//! public search).

pub mod models;
pub mod service;

pub use models::{
    Album, AlbumDraft, CollaborationStatus, CollaborationView, Fan, ProducerSongs,
    ProducerSummary, Song, SongCollaboration, SongComment, SongDraft, SongFilter, SongList,
    SongListView, SongSummary,
};
pub use service::CatalogService;
