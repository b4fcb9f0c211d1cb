mod common;

use common::{id_of, Part, TestApp};
use serde_json::json;

#[tokio::test]
async fn listener_cannot_use_producer_center() {
    let app = TestApp::new();
    let token = app.register("lena", "lena@example.com").await;

    let resp = app
        .post(
            "/api/createAlbum/",
            &[("encode_jwt", token.as_str()), ("album_name", "Debut")],
        )
        .await;
    assert_eq!(resp.code, 401);
    assert_eq!(resp.message, "producer authority required");

    let resp = app
        .get("/api/queryProducer/", &[("encode_jwt", token.as_str())])
        .await;
    assert_eq!(resp.code, 401);

    // Missing token still wins over the role check
    let resp = app
        .post("/api/createAlbum/", &[("album_name", "Debut")])
        .await;
    assert_eq!(resp.code, 401);
    assert_eq!(resp.message, "no jwt token");
}

#[tokio::test]
async fn producer_upgrade_applies_to_existing_token() {
    let app = TestApp::new();
    let token = app.register("milo", "milo@example.com").await;

    let resp = app
        .post(
            "/api/applyProducer/",
            &[("encode_jwt", token.as_str()), ("ptype", "solo")],
        )
        .await;
    assert_eq!(resp.code, 200);
    let producer_id = id_of(&resp);

    // The same token now resolves to a producer
    let resp = app
        .get("/api/queryProducer/", &[("encode_jwt", token.as_str())])
        .await;
    assert_eq!(resp.code, 200);
    assert_eq!(id_of(&resp), producer_id);

    let resp = app
        .post("/api/applyProducer/", &[("encode_jwt", token.as_str())])
        .await;
    assert_eq!(resp.code, 409);
    assert_eq!(resp.message, "producer has been register");

    let resp = app
        .get("/api/queryProducerById/", &[("producer_pid", producer_id.as_str())])
        .await;
    assert_eq!(resp.obj.unwrap()["ptype"], json!("solo"));
}

#[tokio::test]
async fn albums_and_songs_are_owner_scoped() {
    let app = TestApp::new();
    let (owner, _) = app.register_producer("nia", "nia@example.com").await;
    let (intruder, _) = app.register_producer("oz", "oz@example.com").await;

    let resp = app
        .post(
            "/api/createAlbum/",
            &[
                ("encode_jwt", owner.as_str()),
                ("album_name", "Night Drive"),
                ("album_release_date", "2023-05-01"),
            ],
        )
        .await;
    assert_eq!(resp.code, 200, "{}", resp.message);
    let album_id = id_of(&resp);

    let resp = app
        .post(
            "/api/createAlbum/",
            &[
                ("encode_jwt", owner.as_str()),
                ("album_name", "Bad Date"),
                ("album_release_date", "01/05/2023"),
            ],
        )
        .await;
    assert_eq!(resp.code, 406);
    assert_eq!(resp.message, "invalid date format");

    // Someone else's album looks exactly like a missing one
    let resp = app
        .post(
            "/api/modifyAlbum/",
            &[
                ("encode_jwt", intruder.as_str()),
                ("album_id", album_id.as_str()),
                ("album_name", "Stolen"),
            ],
        )
        .await;
    assert_eq!(resp.code, 404);
    assert_eq!(resp.message, "album not found");

    let resp = app
        .post(
            "/api/modifyAlbum/",
            &[
                ("encode_jwt", owner.as_str()),
                ("album_id", "not-a-uuid"),
                ("album_name", "Renamed"),
            ],
        )
        .await;
    assert_eq!(resp.code, 404);

    let resp = app
        .post(
            "/api/createSong/",
            &[
                ("encode_jwt", intruder.as_str()),
                ("album_id", album_id.as_str()),
                ("song_name", "Sneaky"),
            ],
        )
        .await;
    assert_eq!(resp.code, 404);

    let resp = app
        .post(
            "/api/createSong/",
            &[
                ("encode_jwt", owner.as_str()),
                ("album_id", album_id.as_str()),
                ("song_name", "Tail Lights"),
                ("song_language", "en"),
            ],
        )
        .await;
    assert_eq!(resp.code, 200, "{}", resp.message);
    let song_id = id_of(&resp);

    let resp = app
        .post(
            "/api/modifySong/",
            &[
                ("encode_jwt", intruder.as_str()),
                ("song_id", song_id.as_str()),
                ("song_name", "Mine now"),
            ],
        )
        .await;
    assert_eq!(resp.code, 404);
    assert_eq!(resp.message, "song not found");

    let resp = app
        .get("/api/querySongOfProducer/", &[("encode_jwt", owner.as_str())])
        .await;
    assert_eq!(resp.obj.unwrap().as_array().unwrap().len(), 1);
    let resp = app
        .get("/api/querySongOfProducer/", &[("encode_jwt", intruder.as_str())])
        .await;
    assert_eq!(resp.obj.unwrap().as_array().unwrap().len(), 0);

    let resp = app
        .get("/api/querySongById/", &[("song_sid", song_id.as_str())])
        .await;
    assert_eq!(resp.obj.unwrap()["name"], json!("Tail Lights"));
}

#[tokio::test]
async fn uploads_check_extensions() {
    let app = TestApp::new();
    let (token, _) = app.register_producer("pia", "pia@example.com").await;

    let album = app
        .post(
            "/api/createAlbum/",
            &[("encode_jwt", token.as_str()), ("album_name", "Demo")],
        )
        .await;
    let album_id = id_of(&album);
    let song = app
        .post(
            "/api/createSong/",
            &[
                ("encode_jwt", token.as_str()),
                ("album_id", album_id.as_str()),
                ("song_name", "Take One"),
            ],
        )
        .await;
    let song_id = id_of(&song);

    let form = [("encode_jwt", token.as_str()), ("song_id", song_id.as_str())];
    let resp = app
        .post_multipart(
            "/api/uploadSongAudio/",
            &form,
            &[Part {
                field: "audio_file",
                filename: "take-one.exe",
                data: b"MZ",
            }],
        )
        .await;
    assert_eq!(resp.code, 406);
    assert_eq!(resp.message, "invalid file extension");

    let resp = app
        .post_multipart("/api/uploadSongAudio/", &form, &[])
        .await;
    assert_eq!(resp.code, 406);

    let resp = app
        .post_multipart(
            "/api/uploadSongAudio/",
            &form,
            &[Part {
                field: "audio_file",
                filename: "Take-One.MP3",
                data: b"ID3fake-audio",
            }],
        )
        .await;
    assert_eq!(resp.code, 200, "{}", resp.message);
    let url = resp.obj.unwrap().as_str().unwrap().to_string();
    assert!(url.starts_with("http://media.test/song/audio/"));
    assert!(url.ends_with(".mp3"));

    let resp = app
        .get("/api/querySongById/", &[("song_sid", song_id.as_str())])
        .await;
    assert_eq!(resp.obj.unwrap()["audio_url"], json!(url));

    let resp = app
        .post_multipart(
            "/api/editUserProfilePicture/",
            &[("encode_jwt", token.as_str())],
            &[Part {
                field: "profile_photo",
                filename: "me.png",
                data: b"\x89PNG",
            }],
        )
        .await;
    assert_eq!(resp.code, 200, "{}", resp.message);
    assert!(resp
        .obj
        .unwrap()
        .as_str()
        .unwrap()
        .starts_with("http://media.test/user/profilePhoto/"));
}

#[tokio::test]
async fn song_lists_are_private() {
    let app = TestApp::new();
    let (producer, _) = app.register_producer("quinn", "quinn@example.com").await;
    let listener = app.register("rosa", "rosa@example.com").await;
    let other = app.register("sam", "sam@example.com").await;

    let album = app
        .post(
            "/api/createAlbum/",
            &[("encode_jwt", producer.as_str()), ("album_name", "Waves")],
        )
        .await;
    let song = app
        .post(
            "/api/createSong/",
            &[
                ("encode_jwt", producer.as_str()),
                ("album_id", id_of(&album).as_str()),
                ("song_name", "Undertow"),
            ],
        )
        .await;
    let song_id = id_of(&song);

    let resp = app
        .post(
            "/api/createSongList/",
            &[("encode_jwt", listener.as_str()), ("songlist_title", "Favourites")],
        )
        .await;
    assert_eq!(resp.code, 200, "{}", resp.message);
    let list_id = id_of(&resp);

    let entry = [
        ("encode_jwt", listener.as_str()),
        ("songlist_slid", list_id.as_str()),
        ("song_sid", song_id.as_str()),
    ];
    assert_eq!(app.post("/api/addSongToSongList/", &entry).await.code, 200);
    let resp = app.post("/api/addSongToSongList/", &entry).await;
    assert_eq!(resp.code, 409);
    assert_eq!(resp.message, "record already exists");

    let resp = app
        .get("/api/querySongList/", &[("encode_jwt", listener.as_str())])
        .await;
    let lists = resp.obj.unwrap();
    assert_eq!(lists.as_array().unwrap().len(), 1);
    assert_eq!(lists[0]["title"], json!("Favourites"));
    assert_eq!(lists[0]["songs"][0]["name"], json!("Undertow"));

    // Another user sees nothing and can touch nothing
    let resp = app
        .get("/api/querySongList/", &[("encode_jwt", other.as_str())])
        .await;
    assert_eq!(resp.obj, Some(json!([])));

    let resp = app
        .post(
            "/api/modifySongList/",
            &[
                ("encode_jwt", other.as_str()),
                ("songlist_slid", list_id.as_str()),
                ("songlist_title", "Hijacked"),
            ],
        )
        .await;
    assert_eq!(resp.code, 404);
    assert_eq!(resp.message, "song list not found");

    let foreign_drop = [
        ("encode_jwt", other.as_str()),
        ("songlist_slid", list_id.as_str()),
        ("song_sid", song_id.as_str()),
    ];
    assert_eq!(app.post("/api/dropSongFromSongList/", &foreign_drop).await.code, 404);

    let drop = [
        ("encode_jwt", listener.as_str()),
        ("songlist_slid", list_id.as_str()),
        ("song_sid", song_id.as_str()),
    ];
    assert_eq!(app.post("/api/dropSongFromSongList/", &drop).await.code, 200);
    let resp = app.post("/api/dropSongFromSongList/", &drop).await;
    assert_eq!(resp.code, 404);
    assert_eq!(resp.message, "record not found");
}

#[tokio::test]
async fn comments_are_deleted_by_their_author_only() {
    let app = TestApp::new();
    let (producer, _) = app.register_producer("tao", "tao@example.com").await;
    let author = app.register("uma", "uma@example.com").await;
    let other = app.register("vic", "vic@example.com").await;

    let album = app
        .post(
            "/api/createAlbum/",
            &[("encode_jwt", producer.as_str()), ("album_name", "Echoes")],
        )
        .await;
    let song = app
        .post(
            "/api/createSong/",
            &[
                ("encode_jwt", producer.as_str()),
                ("album_id", id_of(&album).as_str()),
                ("song_name", "Ripple"),
            ],
        )
        .await;
    let song_id = id_of(&song);

    let resp = app
        .post(
            "/api/createSongComment/",
            &[
                ("encode_jwt", author.as_str()),
                ("song_sid", song_id.as_str()),
                ("content", "lovely bridge"),
            ],
        )
        .await;
    assert_eq!(resp.code, 200, "{}", resp.message);
    let comment_id = id_of(&resp);

    let resp = app
        .get("/api/querySongComment/", &[("song_sid", song_id.as_str())])
        .await;
    assert_eq!(resp.obj.unwrap()[0]["comment"], json!("lovely bridge"));

    let resp = app
        .post(
            "/api/dropSongComment/",
            &[
                ("encode_jwt", other.as_str()),
                ("song_comment_scid", comment_id.as_str()),
            ],
        )
        .await;
    assert_eq!(resp.code, 404);
    assert_eq!(resp.message, "comment not found");

    let resp = app
        .post(
            "/api/dropSongComment/",
            &[
                ("encode_jwt", author.as_str()),
                ("song_comment_scid", comment_id.as_str()),
            ],
        )
        .await;
    assert_eq!(resp.code, 200);

    let resp = app
        .get("/api/querySongComment/", &[("song_sid", song_id.as_str())])
        .await;
    assert_eq!(resp.obj, Some(json!([])));
}

#[tokio::test]
async fn follow_rules() {
    let app = TestApp::new();
    let (star, star_id) = app.register_producer("wes", "wes@example.com").await;
    let fan = app.register("xia", "xia@example.com").await;

    let resp = app
        .post(
            "/api/followProducer/",
            &[("encode_jwt", star.as_str()), ("producer_pid", star_id.as_str())],
        )
        .await;
    assert_eq!(resp.code, 406);
    assert_eq!(resp.message, "user can not follow himself / herself");

    let follow = [("encode_jwt", fan.as_str()), ("producer_pid", star_id.as_str())];
    assert_eq!(app.post("/api/followProducer/", &follow).await.code, 200);
    assert_eq!(app.post("/api/followProducer/", &follow).await.code, 409);

    assert_eq!(app.post("/api/cancelFollowProducer/", &follow).await.code, 200);
    let resp = app.post("/api/cancelFollowProducer/", &follow).await;
    assert_eq!(resp.code, 404);

    let resp = app
        .post(
            "/api/followProducer/",
            &[
                ("encode_jwt", fan.as_str()),
                ("producer_pid", "00000000-0000-0000-0000-000000000000"),
            ],
        )
        .await;
    assert_eq!(resp.code, 404);
    assert_eq!(resp.message, "producer not found");
}

#[tokio::test]
async fn profile_editing() {
    let app = TestApp::new();
    let token = app.register("yara", "yara@example.com").await;

    let resp = app
        .post(
            "/api/editUserInfo/",
            &[("encode_jwt", token.as_str()), ("birthday", "1999/01/01")],
        )
        .await;
    assert_eq!(resp.code, 406);
    assert_eq!(resp.message, "invalid date format");

    let resp = app
        .post(
            "/api/editUserInfo/",
            &[
                ("encode_jwt", token.as_str()),
                ("birthday", "1999-01-01"),
                ("region", "Lisbon"),
                ("username", ""),
            ],
        )
        .await;
    assert_eq!(resp.code, 200, "{}", resp.message);

    let resp = app
        .get("/api/queryUser/", &[("encode_jwt", token.as_str())])
        .await;
    let profile = resp.obj.unwrap();
    assert_eq!(profile["username"], json!("yara"));
    assert_eq!(profile["birthday"], json!("1999-01-01"));
    assert_eq!(profile["region"], json!("Lisbon"));
    assert_eq!(profile["is_producer"], json!(false));
    assert!(profile.get("password_hash").is_none());
}

#[tokio::test]
async fn producer_link_survives_account_writes() {
    let app = TestApp::new();
    let email = "pia@example.com";
    let (token, producer_id) = app.register_producer("pia", email).await;

    let resp = app
        .post(
            "/api/editUserInfo/",
            &[("encode_jwt", token.as_str()), ("region", "Oslo")],
        )
        .await;
    assert_eq!(resp.code, 200, "{}", resp.message);

    let photo = [Part {
        field: "profile_photo",
        filename: "me.png",
        data: b"png",
    }];
    let resp = app
        .post_multipart(
            "/api/editUserProfilePicture/",
            &[("encode_jwt", token.as_str())],
            &photo,
        )
        .await;
    assert_eq!(resp.code, 200, "{}", resp.message);

    let captcha = app.captcha_for(email).await;
    let resp = app
        .post(
            "/api/userModifyPassword/",
            &[
                ("user_email", email),
                ("user_password_old", common::PASSWORD),
                ("user_password_new", "another2025"),
                ("captcha", captcha.as_str()),
            ],
        )
        .await;
    assert_eq!(resp.code, 200, "{}", resp.message);

    let resp = app
        .get("/api/queryProducer/", &[("encode_jwt", token.as_str())])
        .await;
    assert_eq!(resp.code, 200);
    assert_eq!(id_of(&resp), producer_id);

    let resp = app
        .get("/api/queryUser/", &[("encode_jwt", token.as_str())])
        .await;
    let profile = resp.obj.unwrap();
    assert_eq!(profile["is_producer"], json!(true));
    assert_eq!(profile["region"], json!("Oslo"));
}

#[tokio::test]
async fn rejected_cover_creates_no_song_list() {
    let app = TestApp::new();
    let token = app.register("quin", "quin@example.com").await;

    let gif = [Part {
        field: "cover_picture",
        filename: "cover.gif",
        data: b"GIF89a",
    }];
    let resp = app
        .post_multipart(
            "/api/createSongList/",
            &[("encode_jwt", token.as_str()), ("songlist_title", "Favourites")],
            &gif,
        )
        .await;
    assert_eq!(resp.code, 406);
    assert_eq!(resp.message, "invalid file extension");

    let resp = app
        .get("/api/querySongList/", &[("encode_jwt", token.as_str())])
        .await;
    assert_eq!(resp.obj, Some(json!([])));
}

/// Create an album with one song for `token`; returns (album id, song id).
async fn album_with_song(app: &TestApp, token: &str, album: &str, song: &str) -> (String, String) {
    let resp = app
        .post(
            "/api/createAlbum/",
            &[("encode_jwt", token), ("album_name", album)],
        )
        .await;
    assert_eq!(resp.code, 200, "{}", resp.message);
    let album_id = id_of(&resp);
    let resp = app
        .post(
            "/api/createSong/",
            &[
                ("encode_jwt", token),
                ("album_id", album_id.as_str()),
                ("song_name", song),
            ],
        )
        .await;
    assert_eq!(resp.code, 200, "{}", resp.message);
    (album_id, id_of(&resp))
}

#[tokio::test]
async fn song_collaborations_are_producer_scoped() {
    let app = TestApp::new();
    let (owner, _) = app.register_producer("rae", "rae@example.com").await;
    let (guest, guest_id) = app.register_producer("sol", "sol@example.com").await;
    let listener = app.register("tam", "tam@example.com").await;
    let (_, song_id) = album_with_song(&app, &owner, "Tides", "Undertow").await;

    let invite = [
        ("encode_jwt", listener.as_str()),
        ("song_sid", song_id.as_str()),
        ("producer_pid", guest_id.as_str()),
    ];
    let resp = app.post("/api/createSongCollaboration/", &invite).await;
    assert_eq!(resp.code, 401);
    assert_eq!(resp.message, "producer authority required");

    // The guest cannot invite themselves onto a song they do not own
    let resp = app
        .post(
            "/api/createSongCollaboration/",
            &[
                ("encode_jwt", guest.as_str()),
                ("song_sid", song_id.as_str()),
                ("producer_pid", guest_id.as_str()),
            ],
        )
        .await;
    assert_eq!(resp.code, 404);
    assert_eq!(resp.message, "song not found");

    let invite = [
        ("encode_jwt", owner.as_str()),
        ("song_sid", song_id.as_str()),
        ("producer_pid", guest_id.as_str()),
        ("role", "bass"),
    ];
    let resp = app.post("/api/createSongCollaboration/", &invite).await;
    assert_eq!(resp.code, 200, "{}", resp.message);
    let resp = app.post("/api/createSongCollaboration/", &invite).await;
    assert_eq!(resp.code, 409);

    let resp = app
        .get(
            "/api/querySongCollaboration/",
            &[("encode_jwt", guest.as_str()), ("collaboration_status", "p")],
        )
        .await;
    let pending = resp.obj.unwrap();
    assert_eq!(pending.as_array().unwrap().len(), 1);
    assert_eq!(pending[0]["role"], json!("bass"));
    assert_eq!(pending[0]["status"], json!("p"));

    // Only the invitee settles the invitation
    let resp = app
        .post(
            "/api/handleSongCollaboration/",
            &[
                ("encode_jwt", owner.as_str()),
                ("song_sid", song_id.as_str()),
                ("confirm", "y"),
            ],
        )
        .await;
    assert_eq!(resp.code, 404);
    let resp = app
        .post(
            "/api/handleSongCollaboration/",
            &[
                ("encode_jwt", guest.as_str()),
                ("song_sid", song_id.as_str()),
                ("confirm", "y"),
            ],
        )
        .await;
    assert_eq!(resp.code, 200, "{}", resp.message);

    let resp = app
        .get("/api/querySongByProducer/", &[("producer_pid", guest_id.as_str())])
        .await;
    let songs = resp.obj.unwrap();
    assert_eq!(songs["producer_upload"], json!([]));
    assert_eq!(songs["collaborate"][0]["song_name"], json!("Undertow"));
}

#[tokio::test]
async fn fans_are_listed_for_the_producer_only() {
    let app = TestApp::new();
    let (token, producer_id) = app.register_producer("uma", "uma@example.com").await;
    let fan = app.register("vic", "vic@example.com").await;

    let resp = app
        .post(
            "/api/followProducer/",
            &[("encode_jwt", fan.as_str()), ("producer_pid", producer_id.as_str())],
        )
        .await;
    assert_eq!(resp.code, 200);

    let resp = app
        .get("/api/queryFansOfProducer/", &[("encode_jwt", fan.as_str())])
        .await;
    assert_eq!(resp.code, 401);

    let resp = app
        .get("/api/queryFansOfProducer/", &[("encode_jwt", token.as_str())])
        .await;
    let fans = resp.obj.unwrap();
    assert_eq!(fans.as_array().unwrap().len(), 1);
    assert_eq!(fans[0]["username"], json!("vic"));
}

#[tokio::test]
async fn public_search_and_play_counts() {
    let app = TestApp::new();
    let (token, _) = app.register_producer("wren", "wren@example.com").await;
    let (album_id, first) = album_with_song(&app, &token, "Coastline", "Harbour").await;
    let resp = app
        .post(
            "/api/createSong/",
            &[
                ("encode_jwt", token.as_str()),
                ("album_id", album_id.as_str()),
                ("song_name", "Lighthouse"),
            ],
        )
        .await;
    let second = id_of(&resp);

    for _ in 0..2 {
        let resp = app.post("/api/addPlayBack/", &[("song_sid", second.as_str())]).await;
        assert_eq!(resp.code, 200);
    }
    let resp = app.post("/api/addPlayBack/", &[("song_sid", first.as_str())]).await;
    assert_eq!(resp.code, 200);

    let resp = app
        .get("/api/querySongByCondition/", &[("condition", "COAST"), ("limit", "1")])
        .await;
    let hits = resp.obj.unwrap();
    assert_eq!(hits.as_array().unwrap().len(), 1);
    assert_eq!(hits[0]["song_name"], json!("Lighthouse"));
    assert_eq!(hits[0]["play_back"], json!(2));

    let resp = app.get("/api/querySongByCondition/", &[]).await;
    assert_eq!(resp.code, 400);
    assert_eq!(resp.message, "missing parameter condition");

    let resp = app
        .get("/api/querySongByAlbum/", &[("album_aid", album_id.as_str())])
        .await;
    assert_eq!(resp.obj.unwrap().as_array().unwrap().len(), 2);

    let resp = app
        .get("/api/queryProducerByCondition/", &[("name", "WR"), ("ptype", "band")])
        .await;
    assert_eq!(resp.obj.unwrap()[0]["name"], json!("wren"));

    let resp = app
        .post("/api/addPlayBack/", &[("song_sid", "not-a-song")])
        .await;
    assert_eq!(resp.code, 404);
}
