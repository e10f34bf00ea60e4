//! Integration tests for the songbook backend.

use std::sync::Arc;

use reqwest::{Client, Method};
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::auth::TokenService;
use crate::config::Config;
use crate::db::{init_database, Repository};
use crate::search::SearchIndex;
use crate::{create_router, AppState};

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");
        let index_path = temp_dir.path().join("index");

        // Initialize database
        let pool = init_database(&db_path).await.expect("Failed to init DB");
        let repo = Arc::new(Repository::new(pool));

        // Initialize search index
        let search = Arc::new(SearchIndex::open(&index_path).expect("Failed to init search"));

        let config = Config {
            db_path,
            index_path,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
            token_secret: Some("test-secret".to_string()),
            token_ttl_hours: 24,
        };

        let state = AppState {
            repo,
            search,
            tokens: Arc::new(TokenService::new(b"test-secret", config.token_ttl_hours)),
            config: Arc::new(config),
        };

        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        TestFixture {
            client: Client::new(),
            base_url,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and return the status with the decoded body.
    async fn send(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (u16, Value) {
        let mut req = self.client.request(method, self.url(path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send().await.unwrap();
        let status = resp.status().as_u16();
        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(&self, path: &str, token: Option<&str>) -> (u16, Value) {
        self.send(Method::GET, path, token, None).await
    }

    async fn post(&self, path: &str, token: &str, body: Value) -> (u16, Value) {
        self.send(Method::POST, path, Some(token), Some(body)).await
    }

    async fn put(&self, path: &str, token: &str, body: Value) -> (u16, Value) {
        self.send(Method::PUT, path, Some(token), Some(body)).await
    }

    async fn delete(&self, path: &str, token: &str) -> (u16, Value) {
        self.send(Method::DELETE, path, Some(token), None).await
    }

    /// Register a user and return its token and id.
    async fn register(&self, username: &str) -> (String, String) {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({ "username": username, "password": "secret123" })),
            )
            .await;
        assert_eq!(status, 201, "register failed: {}", body);
        (
            body["data"]["token"].as_str().unwrap().to_string(),
            body["data"]["user"]["id"].as_str().unwrap().to_string(),
        )
    }

    /// Create a group and return its full body (including the invitation code).
    async fn create_group(&self, token: &str, name: &str) -> Value {
        let (status, body) = self
            .post("/api/groups", token, json!({ "name": name }))
            .await;
        assert_eq!(status, 201, "create group failed: {}", body);
        body["data"].clone()
    }

    async fn create_song(&self, token: &str, group_id: &str, title: &str, lyrics: &str) -> String {
        let (status, body) = self
            .post(
                "/api/songs",
                token,
                json!({ "title": title, "groupId": group_id, "lyrics": lyrics }),
            )
            .await;
        assert_eq!(status, 201, "create song failed: {}", body);
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn create_repertoire(&self, token: &str, group_id: &str, songs: &[&str]) -> Value {
        let (status, body) = self
            .post(
                "/api/repertoires",
                token,
                json!({ "name": "Sunday Service", "groupId": group_id, "songs": songs }),
            )
            .await;
        assert_eq!(status, 201, "create repertoire failed: {}", body);
        body["data"].clone()
    }
}

fn sheet_ids(sheet: &Value) -> Vec<String> {
    sheet["data"]["songs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["songId"].as_str().unwrap().to_string())
        .collect()
}

// ==================== BASICS & AUTH ====================

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_register_login_and_me() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture
        .send(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "username": "  maria  ", "password": "secret123" })),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["user"]["username"], "maria");
    // The first account is the site admin
    assert_eq!(body["data"]["user"]["role"], "admin");
    assert!(body["data"]["user"].get("passwordHash").is_none());

    let (second, _) = fixture.register("joao").await;
    let (status, me) = fixture.get("/api/auth/me", Some(&second)).await;
    assert_eq!(status, 200);
    assert_eq!(me["data"]["username"], "joao");
    assert_eq!(me["data"]["role"], "user");

    let (status, body) = fixture
        .send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "MARIA", "password": "secret123" })),
        )
        .await;
    assert_eq!(status, 200);
    assert!(body["data"]["token"].as_str().unwrap().contains('.'));

    let (status, body) = fixture
        .send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "maria", "password": "wrong-password" })),
        )
        .await;
    assert_eq!(status, 401);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_registration_validation() {
    let fixture = TestFixture::new().await;
    fixture.register("maria").await;

    let cases = [
        json!({ "username": "Maria", "password": "secret123" }),
        json!({ "username": "ab", "password": "secret123" }),
        json!({ "username": "carlos", "password": "12345" }),
    ];
    for case in cases {
        let (status, body) = fixture
            .send(Method::POST, "/api/auth/register", None, Some(case))
            .await;
        assert_eq!(status, 400, "expected rejection: {}", body);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }
}

#[tokio::test]
async fn test_missing_and_invalid_credentials() {
    let fixture = TestFixture::new().await;

    let (status, _) = fixture.get("/api/auth/me", None).await;
    assert_eq!(status, 401);

    let (status, _) = fixture.get("/api/songs", Some("garbage.token")).await;
    assert_eq!(status, 401);

    let (status, _) = fixture
        .send(
            Method::POST,
            "/api/songs",
            None,
            Some(json!({ "title": "x", "groupId": "g" })),
        )
        .await;
    assert_eq!(status, 401);

    // Public reads need no credential
    let (status, body) = fixture.get("/api/songs", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"], json!([]));
}

// ==================== GROUPS ====================

#[tokio::test]
async fn test_group_invitation_flow() {
    let fixture = TestFixture::new().await;
    let (_admin, _) = fixture.register("siteadmin").await;
    let (leader, _) = fixture.register("leader").await;
    let (member, member_id) = fixture.register("member").await;
    let (late, _) = fixture.register("latecomer").await;

    let group = fixture.create_group(&leader, "Choir").await;
    let id = group["id"].as_str().unwrap();
    assert!(group["groupId"].as_str().unwrap().starts_with("GRP-"));
    let code = group["invitationCode"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 8);

    // Codes match after trim and uppercase normalization
    let padded = format!("  {}  ", code.to_lowercase());
    let (status, body) = fixture
        .post("/api/groups/join", &member, json!({ "invitationCode": padded }))
        .await;
    assert_eq!(status, 200, "join failed: {}", body);
    assert!(body["data"]["members"]
        .as_array()
        .unwrap()
        .contains(&json!(member_id)));
    // Plain members do not see the invitation code
    assert!(body["data"].get("invitationCode").is_none());

    // Joining twice is rejected
    let (status, _) = fixture
        .post(
            &format!("/api/groups/{}/members", id),
            &member,
            json!({ "invitationCode": code }),
        )
        .await;
    assert_eq!(status, 400);

    // Wrong code
    let (status, _) = fixture
        .post(
            &format!("/api/groups/{}/members", id),
            &late,
            json!({ "invitationCode": "WRONG000" }),
        )
        .await;
    assert_eq!(status, 400);

    // Members cannot manage invitations
    let (status, _) = fixture
        .post(&format!("/api/groups/{}/toggle-invitation", id), &member, json!({}))
        .await;
    assert_eq!(status, 403);

    // Disabled invitations block joining even with the right code
    let (status, body) = fixture
        .post(&format!("/api/groups/{}/toggle-invitation", id), &leader, json!({}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["invitationEnabled"], false);
    let (status, _) = fixture
        .post(
            &format!("/api/groups/{}/members", id),
            &late,
            json!({ "invitationCode": code }),
        )
        .await;
    assert_eq!(status, 403);

    // Outsiders cannot read the group
    let (status, _) = fixture.get(&format!("/api/groups/{}", id), Some(&late)).await;
    assert_eq!(status, 403);

    let (status, body) = fixture.get("/api/groups", Some(&member)).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    let (_, body) = fixture.get("/api/groups", Some(&late)).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_regenerated_code_replaces_old_one() {
    let fixture = TestFixture::new().await;
    let (leader, _) = fixture.register("leader").await;
    let (member, _) = fixture.register("member").await;

    let group = fixture.create_group(&leader, "Band").await;
    let id = group["id"].as_str().unwrap();
    let old_code = group["invitationCode"].as_str().unwrap().to_string();

    let (status, body) = fixture
        .post(&format!("/api/groups/{}/regenerate-code", id), &leader, json!({}))
        .await;
    assert_eq!(status, 200);
    let new_code = body["data"]["invitationCode"].as_str().unwrap().to_string();
    assert_ne!(new_code, old_code);

    let (status, _) = fixture
        .post("/api/groups/join", &member, json!({ "invitationCode": old_code }))
        .await;
    assert_eq!(status, 404);
    let (status, _) = fixture
        .post("/api/groups/join", &member, json!({ "invitationCode": new_code }))
        .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_moderators_and_member_removal() {
    let fixture = TestFixture::new().await;
    let (leader, leader_id) = fixture.register("leader").await;
    let (member, member_id) = fixture.register("member").await;
    let (other, other_id) = fixture.register("other").await;

    let group = fixture.create_group(&leader, "Praise Team").await;
    let id = group["id"].as_str().unwrap();
    let code = group["invitationCode"].as_str().unwrap();
    for token in [&member, &other] {
        let (status, _) = fixture
            .post("/api/groups/join", token, json!({ "invitationCode": code }))
            .await;
        assert_eq!(status, 200);
    }

    // Only the leader appoints moderators; expanded references are accepted
    let (status, _) = fixture
        .post(
            &format!("/api/groups/{}/moderators", id),
            &member,
            json!({ "userId": other_id }),
        )
        .await;
    assert_eq!(status, 403);
    let (status, body) = fixture
        .post(
            &format!("/api/groups/{}/moderators", id),
            &leader,
            json!({ "userId": { "_id": member_id } }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["moderators"], json!([member_id]));

    // A moderator can remove a member but never the leader
    let (status, _) = fixture
        .delete(&format!("/api/groups/{}/members/{}", id, leader_id), &member)
        .await;
    assert_eq!(status, 400);
    let (status, _) = fixture
        .delete(&format!("/api/groups/{}/members/{}", id, other_id), &member)
        .await;
    assert_eq!(status, 200);

    // Leaving drops moderator status too
    let (status, body) = fixture
        .delete(&format!("/api/groups/{}/members/{}", id, member_id), &member)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["moderators"], json!([]));

    let (status, _) = fixture.delete(&format!("/api/groups/{}", id), &other).await;
    assert_eq!(status, 403);
    let (status, _) = fixture.delete(&format!("/api/groups/{}", id), &leader).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_group_names_are_unique() {
    let fixture = TestFixture::new().await;
    let (leader, _) = fixture.register("leader").await;
    fixture.create_group(&leader, "Choir").await;
    let other = fixture.create_group(&leader, "Band").await;

    let (status, _) = fixture
        .post("/api/groups", &leader, json!({ "name": "CHOIR" }))
        .await;
    assert_eq!(status, 400);

    let (status, _) = fixture
        .put(
            &format!("/api/groups/{}", other["id"].as_str().unwrap()),
            &leader,
            json!({ "name": "choir" }),
        )
        .await;
    assert_eq!(status, 400);
}

// ==================== SONGS ====================

#[tokio::test]
async fn test_song_crud_and_membership() {
    let fixture = TestFixture::new().await;
    let (leader, _) = fixture.register("leader").await;
    let (outsider, _) = fixture.register("outsider").await;
    let group = fixture.create_group(&leader, "Choir").await;
    let group_id = group["id"].as_str().unwrap();

    let (status, _) = fixture
        .post(
            "/api/songs",
            &outsider,
            json!({ "title": "Nope", "groupId": group_id }),
        )
        .await;
    assert_eq!(status, 403);

    let (status, body) = fixture
        .post(
            "/api/songs",
            &leader,
            json!({
                "title": "Amazing Grace",
                "groupId": { "id": group_id },
                "author": "John Newton",
                "category": "worship",
                "tags": ["hymn", "Hymn", "classic"],
                "key": "G",
                "tempo": 72
            }),
        )
        .await;
    assert_eq!(status, 201);
    let song = &body["data"];
    let id = song["id"].as_str().unwrap();
    assert_eq!(song["tags"], json!(["hymn", "classic"]));
    assert_eq!(song["lastPlayed"], Value::Null);
    assert_eq!(song["version"], 1);

    let (status, body) = fixture
        .get(&format!("/api/songs?groupId={}&tag=HYMN", group_id), None)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    let (_, body) = fixture
        .get(&format!("/api/songs?groupId={}&search=newton", group_id), None)
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    let (status, _) = fixture.get("/api/songs?category=polka", None).await;
    assert_eq!(status, 400);

    let (status, body) = fixture
        .put(
            &format!("/api/songs/{}", id),
            &leader,
            json!({ "key": "A", "expectedVersion": 1 }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["key"], "A");
    assert_eq!(body["data"]["title"], "Amazing Grace");

    // Stale write
    let (status, body) = fixture
        .put(
            &format!("/api/songs/{}", id),
            &leader,
            json!({ "key": "B", "expectedVersion": 1 }),
        )
        .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "VERSION_MISMATCH");
    assert_eq!(body["error"]["details"]["currentVersion"], 2);

    let (status, _) = fixture.delete(&format!("/api/songs/{}", id), &outsider).await;
    assert_eq!(status, 403);
    let (status, _) = fixture.delete(&format!("/api/songs/{}", id), &leader).await;
    assert_eq!(status, 200);
    let (status, body) = fixture.get(&format!("/api/songs/{}", id), None).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_play_history_keeps_last_three() {
    let fixture = TestFixture::new().await;
    let (leader, _) = fixture.register("leader").await;
    let group = fixture.create_group(&leader, "Choir").await;
    let id = fixture
        .create_song(&leader, group["id"].as_str().unwrap(), "Grace", "")
        .await;

    for i in 1..=5 {
        let (status, _) = fixture
            .post(
                &format!("/api/songs/{}/played", id),
                &leader,
                json!({
                    "date": format!("2024-01-0{}T10:00:00Z", i),
                    "event": format!("Service {}", i)
                }),
            )
            .await;
        assert_eq!(status, 201);
    }

    let (_, body) = fixture.get(&format!("/api/songs/{}", id), None).await;
    let history = body["data"]["playHistory"].as_array().unwrap();
    let events: Vec<&str> = history
        .iter()
        .map(|h| h["event"].as_str().unwrap())
        .collect();
    assert_eq!(events, vec!["Service 3", "Service 4", "Service 5"]);
    assert_eq!(body["data"]["lastPlayed"], "2024-01-05T10:00:00Z");
    assert!(body["data"]["daysSinceLastPlayed"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_song_media_and_stats() {
    let fixture = TestFixture::new().await;
    let (leader, _) = fixture.register("leader").await;
    let group = fixture.create_group(&leader, "Choir").await;
    let group_id = group["id"].as_str().unwrap();
    let id = fixture.create_song(&leader, group_id, "Grace", "").await;
    fixture.create_song(&leader, group_id, "Joy", "").await;

    let (status, body) = fixture
        .post(
            &format!("/api/songs/{}/media", id),
            &leader,
            json!({ "url": "https://youtu.be/abc", "title": "Live" }),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(body["data"]["platform"], "youtube");
    let link_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = fixture
        .post(
            &format!("/api/songs/{}/media", id),
            &leader,
            json!({ "url": "not a url" }),
        )
        .await;
    assert_eq!(status, 400);

    let (status, _) = fixture
        .delete(&format!("/api/songs/{}/media/{}", id, link_id), &leader)
        .await;
    assert_eq!(status, 200);
    let (status, _) = fixture
        .delete(&format!("/api/songs/{}/media/{}", id, link_id), &leader)
        .await;
    assert_eq!(status, 404);

    fixture
        .post(&format!("/api/songs/{}/played", id), &leader, json!({}))
        .await;
    let (status, body) = fixture
        .get(&format!("/api/songs/stats/group/{}", group_id), None)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["totalSongs"], 2);
    assert_eq!(body["data"]["neverPlayed"], 1);
    assert_eq!(body["data"]["playedLast30Days"], 1);
    assert_eq!(body["data"]["byCategory"]["other"], 2);
}

#[tokio::test]
async fn test_full_text_search() {
    let fixture = TestFixture::new().await;
    let (leader, _) = fixture.register("leader").await;
    let group = fixture.create_group(&leader, "Choir").await;
    let group_id = group["id"].as_str().unwrap();
    let grace = fixture
        .create_song(&leader, group_id, "Amazing Grace", "how sweet the sound")
        .await;
    fixture
        .create_song(&leader, group_id, "Morning Hymn", "grace at dawn")
        .await;

    // Index commits become visible after the reader reloads
    let (status, body) = fixture
        .get(&format!("/api/songs/search?q=grace&groupId={}", group_id), None)
        .await;
    assert_eq!(status, 200);
    let hits = body["data"].as_array().unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0]["id"], json!(grace));

    let (_, body) = fixture.get("/api/songs/search?q=", None).await;
    assert_eq!(body["data"], json!([]));
}

// ==================== REPERTOIRES & VERSIONS ====================

#[tokio::test]
async fn test_repertoire_songs_must_belong_to_group() {
    let fixture = TestFixture::new().await;
    let (leader, _) = fixture.register("leader").await;
    let choir = fixture.create_group(&leader, "Choir").await;
    let band = fixture.create_group(&leader, "Band").await;
    let foreign = fixture
        .create_song(&leader, band["id"].as_str().unwrap(), "Foreign", "")
        .await;

    let (status, body) = fixture
        .post(
            "/api/repertoires",
            &leader,
            json!({ "name": "Mass", "groupId": choir["id"], "songs": [foreign] }),
        )
        .await;
    assert_eq!(status, 400, "{}", body);

    let (status, _) = fixture
        .post(
            "/api/repertoires",
            &leader,
            json!({ "name": "Mass", "groupId": choir["id"], "songs": ["missing"] }),
        )
        .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_version_lifecycle() {
    let fixture = TestFixture::new().await;
    let (leader, _) = fixture.register("leader").await;
    let group = fixture.create_group(&leader, "Choir").await;
    let rep = fixture
        .create_repertoire(&leader, group["id"].as_str().unwrap(), &[])
        .await;
    let id = rep["id"].as_str().unwrap();
    assert_eq!(rep["versions"][0]["name"], "Original");
    let original = rep["versions"][0]["id"].as_str().unwrap().to_string();

    // The only version cannot be deleted
    let (status, body) = fixture
        .delete(&format!("/api/repertoires/{}/versions/{}", id, original), &leader)
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = fixture
        .post(
            &format!("/api/repertoires/{}/versions", id),
            &leader,
            json!({ "name": "  " }),
        )
        .await;
    assert_eq!(status, 400);

    let (status, body) = fixture
        .post(
            &format!("/api/repertoires/{}/versions", id),
            &leader,
            json!({ "name": "Acoustic", "notes": "no drums" }),
        )
        .await;
    assert_eq!(status, 201);
    let acoustic = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = fixture
        .put(
            &format!("/api/repertoires/{}/versions/{}", id, acoustic),
            &leader,
            json!({ "name": "Unplugged" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["name"], "Unplugged");
    assert_eq!(body["data"]["notes"], "no drums");

    let (status, _) = fixture
        .put(
            &format!("/api/repertoires/{}/versions/nope", id),
            &leader,
            json!({ "name": "x" }),
        )
        .await;
    assert_eq!(status, 404);

    let (status, body) = fixture
        .delete(&format!("/api/repertoires/{}/versions/{}", id, original), &leader)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = fixture
        .post(
            &format!("/api/repertoires/{}/played", id),
            &leader,
            json!({ "versionIndex": 1 }),
        )
        .await;
    assert_eq!(status, 400);
    let (status, body) = fixture
        .post(&format!("/api/repertoires/{}/played", id), &leader, json!({}))
        .await;
    assert_eq!(status, 201);
    assert_eq!(body["data"]["versionIndex"], 0);
}

#[tokio::test]
async fn test_positions_order_songs_and_modes_are_independent() {
    let fixture = TestFixture::new().await;
    let (leader, _) = fixture.register("leader").await;
    let group = fixture.create_group(&leader, "Choir").await;
    let group_id = group["id"].as_str().unwrap();
    let a = fixture.create_song(&leader, group_id, "A", "base a").await;
    let b = fixture.create_song(&leader, group_id, "B", "base b").await;
    let c = fixture.create_song(&leader, group_id, "C", "base c").await;
    let rep = fixture
        .create_repertoire(&leader, group_id, &[&a, &b, &c])
        .await;
    let id = rep["id"].as_str().unwrap();
    let vid = rep["versions"][0]["id"].as_str().unwrap();
    let song_path = |song: &str| format!("/api/repertoires/{}/versions/{}/songs/{}", id, vid, song);

    // Content first, then a pure reorder must not clear it
    let (status, _) = fixture
        .put(&song_path(&b), &leader, json!({ "modifiedLyrics": "new b", "notes": "soft" }))
        .await;
    assert_eq!(status, 200);
    let (status, body) = fixture
        .put(&song_path(&b), &leader, json!({ "position": 0 }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["modifiedLyrics"], "new b");
    assert_eq!(body["data"]["position"], 0);

    fixture
        .put(&song_path(&c), &leader, json!({ "position": 1 }))
        .await;

    // And a content write must not clear the position
    let (_, body) = fixture
        .put(&song_path(&c), &leader, json!({ "modifiedChords": "D G" }))
        .await;
    assert_eq!(body["data"]["position"], 1);

    let (status, sheet) = fixture
        .get(&format!("/api/repertoires/{}/sheet?versionIndex=0", id), None)
        .await;
    assert_eq!(status, 200);
    assert_eq!(sheet_ids(&sheet), vec![b.clone(), c.clone(), a.clone()]);
    assert_eq!(sheet["data"]["songs"][0]["lyrics"], "new b");
    assert_eq!(sheet["data"]["songs"][0]["notes"], "soft");
    assert_eq!(sheet["data"]["songs"][2]["lyrics"], "base a");

    // Songs outside the base list are rejected
    let (status, _) = fixture
        .put(&song_path("stranger"), &leader, json!({ "position": 2 }))
        .await;
    assert_eq!(status, 400);

    let (status, body) = fixture
        .put(
            &format!("/api/repertoires/{}/versions/{}/reorder", id, vid),
            &leader,
            json!({ "songIds": [a, { "id": c }, b] }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"], json!([a, c, b]));

    let (status, _) = fixture
        .get(&format!("/api/repertoires/{}/sheet?versionIndex=5", id), None)
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_blank_lyrics_differ_from_no_override() {
    let fixture = TestFixture::new().await;
    let (leader, _) = fixture.register("leader").await;
    let group = fixture.create_group(&leader, "Choir").await;
    let group_id = group["id"].as_str().unwrap();
    let a = fixture.create_song(&leader, group_id, "A", "base a").await;
    let b = fixture.create_song(&leader, group_id, "B", "base b").await;
    let rep = fixture.create_repertoire(&leader, group_id, &[&a, &b]).await;
    let id = rep["id"].as_str().unwrap();
    let vid = rep["versions"][0]["id"].as_str().unwrap();

    let (status, _) = fixture
        .put(
            &format!("/api/repertoires/{}/versions/{}/songs/{}", id, vid, a),
            &leader,
            json!({ "modifiedLyrics": "" }),
        )
        .await;
    assert_eq!(status, 200);

    let (_, sheet) = fixture
        .get(&format!("/api/repertoires/{}/sheet", id), None)
        .await;
    assert_eq!(sheet["data"]["songs"][0]["lyrics"], "");
    assert_eq!(sheet["data"]["songs"][0]["modified"], true);
    assert_eq!(sheet["data"]["songs"][1]["lyrics"], "base b");
    assert_eq!(sheet["data"]["songs"][1]["modified"], false);

    let path = format!("/api/repertoires/{}/versions/{}/songs/{}", id, vid, b);
    let (status, _) = fixture.delete(&path, &leader).await;
    assert_eq!(status, 404);
    let path = format!("/api/repertoires/{}/versions/{}/songs/{}", id, vid, a);
    let (status, body) = fixture.delete(&path, &leader).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_batch_modifications_are_atomic() {
    let fixture = TestFixture::new().await;
    let (leader, _) = fixture.register("leader").await;
    let group = fixture.create_group(&leader, "Choir").await;
    let group_id = group["id"].as_str().unwrap();
    let a = fixture.create_song(&leader, group_id, "A", "").await;
    let b = fixture.create_song(&leader, group_id, "B", "").await;
    let rep = fixture.create_repertoire(&leader, group_id, &[&a, &b]).await;
    let id = rep["id"].as_str().unwrap();
    let vid = rep["versions"][0]["id"].as_str().unwrap();
    let path = format!("/api/repertoires/{}/versions/{}/songs", id, vid);

    let (status, _) = fixture
        .put(
            &path,
            &leader,
            json!({ "modifications": [
                { "song": a, "modifiedLyrics": "one" },
                { "song": "not-listed", "modifiedLyrics": "two" }
            ]}),
        )
        .await;
    assert_eq!(status, 400);
    let (_, body) = fixture.get(&path, None).await;
    assert_eq!(body["data"], json!([]));

    let (status, body) = fixture
        .put(
            &path,
            &leader,
            json!({ "modifications": [
                { "song": a, "modifiedLyrics": "one" },
                { "song": { "_id": b }, "modifiedLyrics": 42 }
            ]}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    // Non-string lyrics are stored as text
    assert_eq!(body["data"][1]["modifiedLyrics"], "42");
}

#[tokio::test]
async fn test_bulk_lyrics_editor_round_trip() {
    let fixture = TestFixture::new().await;
    let (leader, _) = fixture.register("leader").await;
    let group = fixture.create_group(&leader, "Choir").await;
    let group_id = group["id"].as_str().unwrap();
    let a = fixture.create_song(&leader, group_id, "First", "line a").await;
    let b = fixture.create_song(&leader, group_id, "Second", "line b").await;
    let rep = fixture.create_repertoire(&leader, group_id, &[&a, &b]).await;
    let id = rep["id"].as_str().unwrap();
    let vid = rep["versions"][0]["id"].as_str().unwrap();
    let path = format!("/api/repertoires/{}/versions/{}/lyrics", id, vid);

    let (status, body) = fixture.get(&path, None).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["fromDraft"], false);
    assert_eq!(
        body["data"]["text"],
        "--- SONG 1: First ---\nline a\n--- END SONG 1 ---\n\n--- SONG 2: Second ---\nline b\n--- END SONG 2 ---"
    );

    // Song 2 lost its end marker: it is saved blank
    let edited = "--- SONG 1: First ---\nnew a\n--- END SONG 1 ---\n\n--- SONG 2: Second ---\nnew b";
    let (status, _) = fixture.put(&path, &leader, json!({ "text": edited })).await;
    assert_eq!(status, 200);

    let (_, body) = fixture.get(&path, None).await;
    assert_eq!(body["data"]["fromDraft"], true);
    assert_eq!(body["data"]["text"], edited);

    let (_, sheet) = fixture
        .get(&format!("/api/repertoires/{}/sheet", id), None)
        .await;
    assert_eq!(sheet["data"]["songs"][0]["lyrics"], "new a");
    assert_eq!(sheet["data"]["songs"][1]["lyrics"], "");

    // A later per-song lyric edit invalidates the draft
    fixture
        .put(
            &format!("/api/repertoires/{}/versions/{}/songs/{}", id, vid, b),
            &leader,
            json!({ "modifiedLyrics": "fixed b" }),
        )
        .await;
    let (_, body) = fixture.get(&path, None).await;
    assert_eq!(body["data"]["fromDraft"], false);
    assert!(body["data"]["text"].as_str().unwrap().contains("fixed b"));
}

#[tokio::test]
async fn test_removing_song_from_list_drops_its_modifications() {
    let fixture = TestFixture::new().await;
    let (leader, _) = fixture.register("leader").await;
    let group = fixture.create_group(&leader, "Choir").await;
    let group_id = group["id"].as_str().unwrap();
    let a = fixture.create_song(&leader, group_id, "A", "").await;
    let b = fixture.create_song(&leader, group_id, "B", "").await;
    let rep = fixture.create_repertoire(&leader, group_id, &[&a, &b]).await;
    let id = rep["id"].as_str().unwrap();
    let vid = rep["versions"][0]["id"].as_str().unwrap();

    fixture
        .put(
            &format!("/api/repertoires/{}/versions/{}/songs/{}", id, vid, b),
            &leader,
            json!({ "notes": "capo 2" }),
        )
        .await;

    let (status, body) = fixture
        .put(
            &format!("/api/repertoires/{}", id),
            &leader,
            json!({ "songs": [a], "category": "youth" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["songs"], json!([a]));
    assert_eq!(body["data"]["category"], "youth");
    assert_eq!(body["data"]["versions"][0]["songModifications"], json!([]));

    let (_, stats) = fixture
        .get(&format!("/api/repertoires/stats/group/{}", group_id), None)
        .await;
    assert_eq!(stats["data"]["totalRepertoires"], 1);
    assert_eq!(stats["data"]["byCategory"]["youth"], 1);
    assert_eq!(stats["data"]["totalVersions"], 1);
}

#[tokio::test]
async fn test_reorder_invalidates_lyrics_draft() {
    let fixture = TestFixture::new().await;
    let (leader, _) = fixture.register("leader").await;
    let group = fixture.create_group(&leader, "Choir").await;
    let group_id = group["id"].as_str().unwrap();
    let a = fixture.create_song(&leader, group_id, "First", "line a").await;
    let b = fixture.create_song(&leader, group_id, "Second", "line b").await;
    let rep = fixture.create_repertoire(&leader, group_id, &[&a, &b]).await;
    let id = rep["id"].as_str().unwrap();
    let vid = rep["versions"][0]["id"].as_str().unwrap();
    let path = format!("/api/repertoires/{}/versions/{}/lyrics", id, vid);

    let edited = "--- SONG 1: First ---\nnew a\n--- END SONG 1 ---\n\n--- SONG 2: Second ---\nnew b\n--- END SONG 2 ---";
    let (status, _) = fixture.put(&path, &leader, json!({ "text": edited })).await;
    assert_eq!(status, 200);

    let (status, _) = fixture
        .put(
            &format!("/api/repertoires/{}/versions/{}/reorder", id, vid),
            &leader,
            json!({ "songIds": [b, a] }),
        )
        .await;
    assert_eq!(status, 200);

    // The editor text follows the new display order
    let (_, body) = fixture.get(&path, None).await;
    assert_eq!(body["data"]["fromDraft"], false);
    let text = body["data"]["text"].as_str().unwrap().to_string();
    assert!(text.starts_with("--- SONG 1: Second ---\nnew b\n"));

    let (status, _) = fixture.put(&path, &leader, json!({ "text": text })).await;
    assert_eq!(status, 200);
    let (_, sheet) = fixture
        .get(&format!("/api/repertoires/{}/sheet", id), None)
        .await;
    assert_eq!(sheet_ids(&sheet), vec![b.clone(), a.clone()]);
    assert_eq!(sheet["data"]["songs"][0]["lyrics"], "new b");
    assert_eq!(sheet["data"]["songs"][1]["lyrics"], "new a");
}

#[tokio::test]
async fn test_added_song_invalidates_lyrics_draft() {
    let fixture = TestFixture::new().await;
    let (leader, _) = fixture.register("leader").await;
    let group = fixture.create_group(&leader, "Choir").await;
    let group_id = group["id"].as_str().unwrap();
    let a = fixture.create_song(&leader, group_id, "First", "line a").await;
    let b = fixture.create_song(&leader, group_id, "Second", "line b").await;
    let c = fixture.create_song(&leader, group_id, "Third", "line c").await;
    let rep = fixture.create_repertoire(&leader, group_id, &[&a, &b]).await;
    let id = rep["id"].as_str().unwrap();
    let vid = rep["versions"][0]["id"].as_str().unwrap();
    let path = format!("/api/repertoires/{}/versions/{}/lyrics", id, vid);

    let (_, body) = fixture.get(&path, None).await;
    let composed = body["data"]["text"].as_str().unwrap().to_string();
    let (status, _) = fixture
        .put(&path, &leader, json!({ "text": composed }))
        .await;
    assert_eq!(status, 200);

    let (status, _) = fixture
        .put(
            &format!("/api/repertoires/{}", id),
            &leader,
            json!({ "songs": [a, b, c] }),
        )
        .await;
    assert_eq!(status, 200);

    let (_, body) = fixture.get(&path, None).await;
    assert_eq!(body["data"]["fromDraft"], false);
    let text = body["data"]["text"].as_str().unwrap().to_string();
    assert!(text.contains("--- SONG 3: Third ---\nline c\n--- END SONG 3 ---"));

    fixture.put(&path, &leader, json!({ "text": text })).await;
    let (_, sheet) = fixture
        .get(&format!("/api/repertoires/{}/sheet", id), None)
        .await;
    assert_eq!(sheet["data"]["songs"][2]["title"], "Third");
    assert_eq!(sheet["data"]["songs"][2]["lyrics"], "line c");
}

#[tokio::test]
async fn test_partial_reorder_and_unknown_version() {
    let fixture = TestFixture::new().await;
    let (leader, _) = fixture.register("leader").await;
    let group = fixture.create_group(&leader, "Choir").await;
    let group_id = group["id"].as_str().unwrap();
    let a = fixture.create_song(&leader, group_id, "A", "").await;
    let b = fixture.create_song(&leader, group_id, "B", "").await;
    let c = fixture.create_song(&leader, group_id, "C", "").await;
    let rep = fixture
        .create_repertoire(&leader, group_id, &[&a, &b, &c])
        .await;
    let id = rep["id"].as_str().unwrap();
    let vid = rep["versions"][0]["id"].as_str().unwrap();
    let reorder = format!("/api/repertoires/{}/versions/{}/reorder", id, vid);

    fixture
        .put(&reorder, &leader, json!({ "songIds": [a, b, c] }))
        .await;
    let (status, body) = fixture
        .put(&reorder, &leader, json!({ "songIds": [c] }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"], json!([c, a, b]));

    let (status, _) = fixture
        .put(
            &format!("/api/repertoires/{}/versions/missing/songs/stranger", id),
            &leader,
            json!({ "notes": "x" }),
        )
        .await;
    assert_eq!(status, 404);
}
