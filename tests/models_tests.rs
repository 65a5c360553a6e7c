use serde_json::json;

use spotify_remote_rs::{
    Artist, ArtistKind, Collection, CollectionKind, MediaKind, Queueable, SessionError,
};

fn track_payload() -> serde_json::Value {
    json!({
        "type": "track",
        "name": "Bohemian Rhapsody",
        "duration_ms": 354_320u64,
        "uri": "spotify:track:7tFiyTwD0nx5a1eklYtX2J",
        "external_urls": { "spotify": "https://open.spotify.com/track/7tFiyTwD0nx5a1eklYtX2J" },
        "artists": [
            {
                "type": "artist",
                "name": "Queen",
                "external_urls": { "spotify": "https://open.spotify.com/artist/queen" }
            },
            { "type": "artist", "name": "Freddie Mercury" }
        ],
        "album": {
            "name": "A Night at the Opera",
            "images": [
                { "url": "https://i.scdn.co/image/large" },
                { "url": "https://i.scdn.co/image/small" }
            ]
        }
    })
}

fn episode_payload() -> serde_json::Value {
    json!({
        "type": "episode",
        "name": "Episode 42",
        "duration_ms": 1_800_000u64,
        "uri": "spotify:episode:abc123",
        "external_urls": { "spotify": "https://open.spotify.com/episode/abc123" },
        "show": {
            "type": "show",
            "name": "Some Podcast",
            "external_urls": { "spotify": "https://open.spotify.com/show/xyz" }
        },
        "images": [ { "url": "https://i.scdn.co/image/episode" } ]
    })
}

// --- queueable parsing ---

#[test]
fn test_track_parses_with_all_fields() {
    let track = Queueable::from_value(&track_payload()).unwrap();

    assert_eq!(track.kind, MediaKind::Track);
    assert_eq!(track.name, "Bohemian Rhapsody");
    assert_eq!(track.duration_ms, 354_320);
    assert_eq!(track.uri, "spotify:track:7tFiyTwD0nx5a1eklYtX2J");
    assert_eq!(track.artists.len(), 2);
    assert_eq!(track.primary_artist().name, "Queen");
    // first image of the album, not the smallest
    assert_eq!(track.image.as_deref(), Some("https://i.scdn.co/image/large"));
}

#[test]
fn test_episode_attributes_its_show() {
    let episode = Queueable::from_value(&episode_payload()).unwrap();

    assert_eq!(episode.kind, MediaKind::Episode);
    assert_eq!(episode.artists.len(), 1);
    assert_eq!(episode.primary_artist().kind, ArtistKind::Show);
    assert_eq!(episode.primary_artist().name, "Some Podcast");
    assert_eq!(episode.image.as_deref(), Some("https://i.scdn.co/image/episode"));
}

#[test]
fn test_missing_required_field_names_the_path() {
    let mut payload = track_payload();
    payload.as_object_mut().unwrap().remove("duration_ms");

    match Queueable::from_value(&payload) {
        Err(SessionError::MalformedMediaObject { field, shape }) => {
            assert_eq!(field, "duration_ms");
            assert_eq!(shape, "track");
        }
        other => panic!("expected MalformedMediaObject, got {:?}", other),
    }
}

#[test]
fn test_null_field_is_treated_as_missing() {
    let mut payload = track_payload();
    payload["external_urls"] = serde_json::Value::Null;

    match Queueable::from_value(&payload) {
        Err(SessionError::MalformedMediaObject { field, .. }) => {
            assert_eq!(field, "external_urls.spotify");
        }
        other => panic!("expected MalformedMediaObject, got {:?}", other),
    }
}

#[test]
fn test_empty_artist_list_is_rejected() {
    let mut payload = track_payload();
    payload["artists"] = json!([]);

    assert!(matches!(
        Queueable::from_value(&payload),
        Err(SessionError::MalformedMediaObject { .. })
    ));
}

#[test]
fn test_missing_artwork_is_tolerated() {
    let mut payload = track_payload();
    payload["album"] = json!({ "name": "A Night at the Opera" });

    let track = Queueable::from_value(&payload).unwrap();
    assert_eq!(track.image, None);
}

#[test]
fn test_unknown_type_tag_fails_loudly() {
    let payload = json!({ "type": "audiobook_chapter", "name": "whatever" });

    match Queueable::from_value(&payload) {
        Err(SessionError::UnrecognizedMediaShape(tag)) => assert_eq!(tag, "audiobook_chapter"),
        other => panic!("expected UnrecognizedMediaShape, got {:?}", other),
    }
}

#[test]
fn test_missing_type_tag_fails_loudly() {
    let payload = json!({ "name": "no tag at all" });

    assert!(matches!(
        Queueable::from_value(&payload),
        Err(SessionError::UnrecognizedMediaShape(_))
    ));
}

// --- display and search strings ---

#[test]
fn test_display_str_formats_duration_and_artist_link() {
    let track = Queueable::from_value(&track_payload()).unwrap();

    assert_eq!(
        track.display_str(),
        "**Bohemian Rhapsody** [5:54] by [Queen](https://open.spotify.com/artist/queen)"
    );
}

#[test]
fn test_display_str_falls_back_to_bare_name_without_url() {
    let mut payload = track_payload();
    payload["artists"] = json!([ { "type": "artist", "name": "A" } ]);
    payload["duration_ms"] = json!(61_000u64);
    payload["name"] = json!("Song");

    let track = Queueable::from_value(&payload).unwrap();
    assert_eq!(track.display_str(), "**Song** [1:1] by A");
}

#[test]
fn test_search_str_is_lowercased_name_and_primary_artist() {
    let track = Queueable::from_value(&track_payload()).unwrap();
    assert_eq!(track.search_str(), "bohemian rhapsody queen");
}

// --- artists ---

#[test]
fn test_artist_dispatch_covers_all_shapes() {
    let person = Artist::from_value(&json!({ "type": "artist", "name": "Queen" })).unwrap();
    assert_eq!(person.kind, ArtistKind::Person);

    let show = Artist::from_value(&json!({ "type": "show", "name": "Pod" })).unwrap();
    assert_eq!(show.kind, ArtistKind::Show);

    let user = Artist::from_value(&json!({ "type": "user", "display_name": "dj" })).unwrap();
    assert_eq!(user.kind, ArtistKind::User);
    assert_eq!(user.name, "dj");

    let author = Artist::from_value(&json!({
        "type": "author",
        "name": "Writer",
        "external_urls": { "spotify": "https://example.com" }
    }))
    .unwrap();
    assert_eq!(author.kind, ArtistKind::Author);
    // authors never carry a link even when one is present
    assert_eq!(author.url, None);
}

// --- collections ---

#[test]
fn test_album_header_parses_without_tracks() {
    let album = Collection::from_value(&json!({
        "type": "album",
        "name": "A Night at the Opera",
        "id": "album1",
        "artists": [ { "type": "artist", "name": "Queen" } ]
    }))
    .unwrap();

    assert_eq!(album.kind, CollectionKind::Album);
    assert_eq!(album.id, "album1");
    assert!(album.tracks.is_empty());
    assert_eq!(album.search_str(), "a night at the opera queen");
}

#[test]
fn test_playlist_is_attributed_to_its_owner() {
    let playlist = Collection::from_value(&json!({
        "type": "playlist",
        "name": "Road Trip",
        "id": "pl1",
        "owner": { "type": "user", "display_name": "alice" }
    }))
    .unwrap();

    assert_eq!(playlist.kind, CollectionKind::Playlist);
    assert_eq!(playlist.artists[0].kind, ArtistKind::User);
    assert_eq!(playlist.artists[0].name, "alice");
}

#[test]
fn test_collection_rejects_unknown_tag() {
    assert!(matches!(
        Collection::from_value(&json!({ "type": "show", "name": "x", "id": "y" })),
        Err(SessionError::UnrecognizedMediaShape(_))
    ));
}
