//! Transmission and schedule flows: every change republishes the playlist
//! document and hot-reloads it.

mod common;

use common::{TestHarness, LOGIN};
use streamctl_db::models::NewVideo;
use streamctl_db::queries::{playlists, videos};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Harness whose reload endpoint is a mock that always reports success.
async fn harness_with_reload() -> (TestHarness, std::net::SocketAddr, MockServer) {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/schedules"))
        .and(query_param("appName", LOGIN))
        .respond_with(ResponseTemplate::new(200).set_body_string("Schedule reload DONE"))
        .mount(&mock)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = TestHarness::config_for(dir.path());
    config.reload.url_template =
        format!("{}/schedules?appName={{login}}&action=reloadSchedule", mock.uri());
    let (h, addr) = TestHarness::with_config(dir, config).serve().await;
    (h, addr, mock)
}

/// A folder with one video and a playlist holding it; returns the
/// playlist id.
async fn seed_playlist(h: &TestHarness) -> String {
    let folder = h
        .ctx
        .orchestrator
        .create_folder(LOGIN, "shows")
        .await
        .unwrap();
    let conn = h.conn();
    let remote = format!("{}/shows/intro.mp4", h.tenant_root().display());
    let video = videos::create_video(
        &conn,
        h.tenant.id,
        folder.id,
        &NewVideo {
            file_name: "intro.mp4".into(),
            remote_path: remote,
            duration_secs: Some(90),
            size_bytes: 1000,
            ..Default::default()
        },
    )
    .unwrap();
    let playlist = playlists::create_playlist(&conn, h.tenant.id, "Morning").unwrap();
    playlists::set_items(&conn, playlist.id, &[video.id]).unwrap();
    playlist.id.to_string()
}

fn document(h: &TestHarness) -> String {
    std::fs::read_to_string(h.tenant_root().join("playlists_agendamentos.smil")).unwrap()
}

#[tokio::test]
async fn transmission_switches_document_mode() {
    let (h, addr, mock) = harness_with_reload().await;
    let playlist_id = seed_playlist(&h).await;
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/api/tenants/{LOGIN}/transmission");

    let resp = client
        .post(&url)
        .json(&serde_json::json!({ "playlist_id": playlist_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["success"], true);
    assert!(json["warnings"].as_array().unwrap().is_empty());
    assert_eq!(json["transmission"]["status"], "active");
    assert!(json["ended"].is_null());
    let first_id = json["transmission"]["id"].as_str().unwrap().to_string();

    let smil = document(&h);
    assert!(smil.contains(r#"<playlist name="Morning" playOnStream="radio1" repeat="true">"#));
    assert!(smil.contains(r#"src="mp4:shows/intro.mp4""#));
    assert!(smil.contains(r#"length="90""#));
    assert!(!smil.contains("scheduled="));

    // A relay transmission replaces the playlist one atomically.
    let resp = client
        .post(&url)
        .json(&serde_json::json!({ "source": "rtmp://relay.example/live" }))
        .send()
        .await
        .unwrap();
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["ended"], first_id.as_str());
    assert!(!document(&h).contains("<playlist "));

    let resp = client.get(&url).send().await.unwrap();
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["transmission"]["source"], "rtmp://relay.example/live");

    let resp = client.delete(&url).send().await.unwrap();
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["message"], "transmission ended");

    let resp = client.delete(&url).send().await.unwrap();
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["message"], "no active transmission");

    // One reload per publish: two starts and one end.
    let requests = mock.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
}

#[tokio::test]
async fn transmission_needs_playlist_or_source() {
    let (_h, addr, _mock) = harness_with_reload().await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/api/tenants/{LOGIN}/transmission"))
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn foreign_playlist_is_not_found() {
    let (_h, addr, _mock) = harness_with_reload().await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/api/tenants/{LOGIN}/transmission"))
        .json(&serde_json::json!({ "playlist_id": uuid::Uuid::new_v4() }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn schedules_are_published_with_start_times() {
    let (h, addr, _mock) = harness_with_reload().await;
    let playlist_id = seed_playlist(&h).await;
    let client = reqwest::Client::new();
    let date = (chrono::Local::now().date_naive() + chrono::Duration::days(1))
        .format("%Y-%m-%d")
        .to_string();

    let resp = client
        .post(format!("http://{addr}/api/tenants/{LOGIN}/schedules"))
        .json(&serde_json::json!({
            "playlist_id": playlist_id,
            "date": date,
            "hour": 7,
            "minute": 30,
            "shuffle": true,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["success"], true);
    let schedule_id = json["schedule"]["id"].as_str().unwrap().to_string();

    let smil = document(&h);
    assert!(smil.contains(&format!(
        r#"<playlist name="Morning@{date}T0730" playOnStream="radio1" repeat="true" scheduled="{date} 07:30:00">"#
    )));

    let resp = client
        .get(format!("http://{addr}/api/tenants/{LOGIN}/schedules"))
        .send()
        .await
        .unwrap();
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json.as_array().unwrap().len(), 1);

    let resp = client
        .delete(format!(
            "http://{addr}/api/tenants/{LOGIN}/schedules/{schedule_id}"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(!document(&h).contains("<playlist "));
}

#[tokio::test]
async fn playlist_items_replace_and_republish() {
    let (h, addr, _mock) = harness_with_reload().await;
    let playlist_id = seed_playlist(&h).await;
    let client = reqwest::Client::new();
    let items_url = format!("http://{addr}/api/tenants/{LOGIN}/playlists/{playlist_id}/items");

    let resp = client.get(&items_url).send().await.unwrap();
    let json: serde_json::Value = resp.json().await.unwrap();
    let video_id = json[0]["video_id"].as_str().unwrap().to_string();

    let resp = client
        .put(&items_url)
        .json(&serde_json::json!({ "videos": [video_id, video_id] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["message"], "playlist updated with 2 item(s)");

    let resp = client.get(&items_url).send().await.unwrap();
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn reload_action_publishes_pending_changes_first() {
    use streamctl_common::PlaylistId;
    use streamctl_db::queries::transmissions;

    let (h, addr, mock) = harness_with_reload().await;
    let playlist_id: PlaylistId = seed_playlist(&h).await.parse().unwrap();
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/api/tenants/{LOGIN}/sync"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(!document(&h).contains("<playlist "));

    // Store change that has not been published yet.
    transmissions::start_transmission(&h.conn(), h.tenant.id, Some(playlist_id), None).unwrap();
    h.ctx.generator.mark_stale(h.tenant.id);

    let resp = client
        .post(format!("http://{addr}/api/tenants/{LOGIN}/app/reload"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["success"], true);
    assert!(json["message"]
        .as_str()
        .unwrap()
        .starts_with("document regenerated"));
    // State comes from the engine, which reports the instance as not loaded.
    assert_eq!(json["state"], "unloaded");

    assert!(document(&h).contains(r#"<playlist name="Morning" playOnStream="radio1" repeat="true">"#));
    let resp = client
        .get(format!("http://{addr}/api/tenants/{LOGIN}/status"))
        .send()
        .await
        .unwrap();
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["config"], "generated");

    // One reload from the sync, one from the action.
    assert_eq!(mock.received_requests().await.unwrap().len(), 2);
}
