use crate::fixtures::test_app::{TestApp, TestUser};
use bson::oid::ObjectId;
use serde_json::{Value, json};

fn workspace() -> String {
    ObjectId::new().to_hex()
}

async fn start_call(app: &TestApp, workspace_id: &str, user: &TestUser, body: Value) -> Value {
    let resp = app
        .auth_post(
            &format!("/api/workspace/{workspace_id}/call"),
            &user.access_token,
        )
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200, "start_call should succeed");
    resp.json().await.unwrap()
}

async fn join_call(app: &TestApp, workspace_id: &str, call_id: &str, user: &TestUser) -> Value {
    let resp = app
        .auth_post(
            &format!("/api/workspace/{workspace_id}/call/{call_id}/join"),
            &user.access_token,
        )
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200, "join_call should succeed");
    resp.json().await.unwrap()
}

#[tokio::test]
async fn start_call_creates_pending_call_with_room_token() {
    let app = TestApp::spawn().await;
    let ws_id = workspace();
    let u1 = app.seed_user("alice");

    let call = start_call(&app, &ws_id, &u1, json!({ "call_type": "video" })).await;

    assert_eq!(call["status"], "pending");
    assert_eq!(call["call_type"], "video");
    assert_eq!(call["initiator_id"], u1.id_hex);
    assert_eq!(call["max_participants"], 15);
    assert_eq!(call["room_id"].as_str().unwrap().len(), 24);
    assert!(call["is_recording"] == false);

    // The initiator holds a connecting seat with video on (video call).
    let call_id = ObjectId::parse_str(call["id"].as_str().unwrap()).unwrap();
    let participant = app.store.participant(call_id, u1.id).unwrap();
    assert!(participant.video_enabled);
    assert!(participant.audio_enabled);
}

#[tokio::test]
async fn start_call_rejects_initiator_already_in_a_call() {
    let app = TestApp::spawn().await;
    let ws_id = workspace();
    let u1 = app.seed_user("alice");

    start_call(&app, &ws_id, &u1, json!({ "call_type": "voice" })).await;

    let resp = app
        .auth_post(&format!("/api/workspace/{ws_id}/call"), &u1.access_token)
        .json(&json!({ "call_type": "voice" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn start_call_with_unknown_initiator_is_not_found() {
    let app = TestApp::spawn().await;
    let ws_id = workspace();
    let token = app.token_for_unknown_user();

    let resp = app
        .auth_post(&format!("/api/workspace/{ws_id}/call"), &token)
        .json(&json!({ "call_type": "voice" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
async fn start_call_invites_and_notifies_participants() {
    let app = TestApp::spawn().await;
    let ws_id = workspace();
    let u1 = app.seed_user("alice");
    let u2 = app.seed_user("bob");
    let u3 = app.seed_user("carol");

    let call = start_call(
        &app,
        &ws_id,
        &u1,
        json!({
            "call_type": "video",
            "title": "Candidate debrief",
            "participants": [u2.id_hex, u3.id_hex],
        }),
    )
    .await;

    let call_id = ObjectId::parse_str(call["id"].as_str().unwrap()).unwrap();
    for invitee in [&u2, &u3] {
        let row = app.store.participant(call_id, invitee.id).unwrap();
        assert_eq!(
            row.status,
            hirewire_db::models::ParticipantStatus::Invited
        );
        let notices = app.store.notifications_for(invitee.id);
        assert_eq!(notices.len(), 1);
        assert!(notices[0].title.contains("alice"));
    }
    // The initiator gets no invite for their own call.
    assert!(app.store.notifications_for(u1.id).is_empty());
}

#[tokio::test]
async fn huddle_notifies_channel_members() {
    let app = TestApp::spawn().await;
    let ws_oid = ObjectId::new();
    let ws_id = ws_oid.to_hex();
    let u1 = app.seed_user("alice");
    let u2 = app.seed_user("bob");
    let u3 = app.seed_user("carol");
    let channel = app
        .store
        .seed_channel(ws_oid, "hiring", false, &[u1.id, u2.id, u3.id]);

    start_call(
        &app,
        &ws_id,
        &u1,
        json!({
            "call_type": "huddle",
            "channel_id": channel.id.unwrap().to_hex(),
        }),
    )
    .await;

    assert_eq!(app.store.notifications_for(u2.id).len(), 1);
    assert_eq!(app.store.notifications_for(u3.id).len(), 1);
    assert!(app.store.notifications_for(u1.id).is_empty());
}

#[tokio::test]
async fn private_channel_requires_access() {
    let app = TestApp::spawn().await;
    let ws_oid = ObjectId::new();
    let ws_id = ws_oid.to_hex();
    let u1 = app.seed_user("alice");
    let outsider = app.seed_user("mallory");
    let channel = app.store.seed_channel(ws_oid, "panel", true, &[u1.id]);
    let channel_hex = channel.id.unwrap().to_hex();

    // Starting a call bound to a channel you cannot see is forbidden.
    let resp = app
        .auth_post(
            &format!("/api/workspace/{ws_id}/call"),
            &outsider.access_token,
        )
        .json(&json!({ "call_type": "voice", "channel_id": channel_hex }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    // So is joining one.
    let call = start_call(
        &app,
        &ws_id,
        &u1,
        json!({ "call_type": "voice", "channel_id": channel_hex }),
    )
    .await;
    let call_id = call["id"].as_str().unwrap();
    let resp = app
        .auth_post(
            &format!("/api/workspace/{ws_id}/call/{call_id}/join"),
            &outsider.access_token,
        )
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);
}

#[tokio::test]
async fn join_promotes_call_to_active() {
    let app = TestApp::spawn().await;
    let ws_id = workspace();
    let u1 = app.seed_user("alice");
    let u2 = app.seed_user("bob");

    let call = start_call(&app, &ws_id, &u1, json!({ "call_type": "voice" })).await;
    let call_id = call["id"].as_str().unwrap();

    let joined = join_call(&app, &ws_id, call_id, &u2).await;
    assert_eq!(joined["call"]["status"], "active");
    assert_eq!(joined["participant"]["status"], "connecting");

    let detail: Value = app
        .auth_get(
            &format!("/api/workspace/{ws_id}/call/{call_id}"),
            &u1.access_token,
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["status"], "active");
    assert_eq!(detail["participants"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn join_rejects_user_in_another_call() {
    let app = TestApp::spawn().await;
    let ws_id = workspace();
    let u1 = app.seed_user("alice");
    let u2 = app.seed_user("bob");

    start_call(&app, &ws_id, &u1, json!({ "call_type": "voice" })).await;
    let other = start_call(&app, &ws_id, &u2, json!({ "call_type": "voice" })).await;
    let other_id = other["id"].as_str().unwrap();

    let resp = app
        .auth_post(
            &format!("/api/workspace/{ws_id}/call/{other_id}/join"),
            &u1.access_token,
        )
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 409);
    let body: Value = resp.json().await.unwrap();
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .contains("another active call")
    );
}

#[tokio::test]
async fn max_participants_below_two_is_rejected() {
    let app = TestApp::spawn().await;
    let ws_id = workspace();
    let u1 = app.seed_user("alice");

    let resp = app
        .auth_post(&format!("/api/workspace/{ws_id}/call"), &u1.access_token)
        .json(&json!({ "call_type": "voice", "max_participants": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 422);
}

#[tokio::test]
async fn host_leave_reassigns_host_and_keeps_call_active() {
    let app = TestApp::spawn().await;
    let ws_id = workspace();
    let u1 = app.seed_user("alice");
    let u2 = app.seed_user("bob");

    let call = start_call(&app, &ws_id, &u1, json!({ "call_type": "huddle" })).await;
    let call_id = call["id"].as_str().unwrap();
    join_call(&app, &ws_id, call_id, &u2).await;

    let left: Value = app
        .auth_post(
            &format!("/api/workspace/{ws_id}/call/{call_id}/leave"),
            &u1.access_token,
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(left["ended"], false);
    assert_eq!(left["new_host"], u2.id_hex);

    let detail: Value = app
        .auth_get(
            &format!("/api/workspace/{ws_id}/call/{call_id}"),
            &u2.access_token,
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["status"], "active");
    assert_eq!(detail["initiator_id"], u2.id_hex);
}

#[tokio::test]
async fn last_leave_ends_call() {
    let app = TestApp::spawn().await;
    let ws_id = workspace();
    let u1 = app.seed_user("alice");

    let call = start_call(&app, &ws_id, &u1, json!({ "call_type": "voice" })).await;
    let call_id = call["id"].as_str().unwrap();

    let left: Value = app
        .auth_post(
            &format!("/api/workspace/{ws_id}/call/{call_id}/leave"),
            &u1.access_token,
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(left["ended"], true);

    let detail: Value = app
        .auth_get(
            &format!("/api/workspace/{ws_id}/call/{call_id}"),
            &u1.access_token,
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["status"], "ended");
    assert!(detail["total_duration"].as_i64().unwrap() >= 0);
}

#[tokio::test]
async fn end_call_requires_host_or_admin() {
    let app = TestApp::spawn().await;
    let ws_id = workspace();
    let u1 = app.seed_user("alice");
    let u2 = app.seed_user("bob");
    let admin = app.seed_admin("root");

    let call = start_call(&app, &ws_id, &u1, json!({ "call_type": "video" })).await;
    let call_id = call["id"].as_str().unwrap();
    join_call(&app, &ws_id, call_id, &u2).await;

    let resp = app
        .auth_post(
            &format!("/api/workspace/{ws_id}/call/{call_id}/end"),
            &u2.access_token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    let resp = app
        .auth_post(
            &format!("/api/workspace/{ws_id}/call/{call_id}/end"),
            &admin.access_token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let ended: Value = resp.json().await.unwrap();
    assert_eq!(ended["status"], "ended");

    // Everyone who took part hears about it.
    assert!(
        app.store
            .notifications_for(u2.id)
            .iter()
            .any(|n| n.title.contains("ended"))
    );
}

#[tokio::test]
async fn screen_share_is_exclusive_per_call() {
    let app = TestApp::spawn().await;
    let ws_id = workspace();
    let u1 = app.seed_user("alice");
    let u2 = app.seed_user("bob");

    let call = start_call(&app, &ws_id, &u1, json!({ "call_type": "video" })).await;
    let call_id = call["id"].as_str().unwrap();
    join_call(&app, &ws_id, call_id, &u2).await;

    let share_path = format!("/api/workspace/{ws_id}/call/{call_id}/screen-share");

    let resp = app.auth_post(&share_path, &u1.access_token).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    // Second sharer bounces off.
    let resp = app.auth_post(&share_path, &u2.access_token).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 409);

    // After the first stops, the retry goes through.
    let resp = app
        .auth_delete(&share_path, &u1.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let resp = app.auth_post(&share_path, &u2.access_token).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let participant: Value = resp.json().await.unwrap();
    assert_eq!(participant["screen_sharing"], true);
}

#[tokio::test]
async fn consent_and_metrics_are_persisted() {
    let app = TestApp::spawn().await;
    let ws_id = workspace();
    let u1 = app.seed_user("alice");

    let call = start_call(&app, &ws_id, &u1, json!({ "call_type": "video" })).await;
    let call_id_hex = call["id"].as_str().unwrap();
    let call_id = ObjectId::parse_str(call_id_hex).unwrap();

    let resp = app
        .auth_post(
            &format!("/api/workspace/{ws_id}/call/{call_id_hex}/consent"),
            &u1.access_token,
        )
        .json(&json!({ "consent": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let row = app.store.participant(call_id, u1.id).unwrap();
    assert_eq!(row.recording_consent, Some(true));
    assert!(row.consent_given_at.is_some());

    let resp = app
        .auth_post(
            &format!("/api/workspace/{ws_id}/call/{call_id_hex}/metrics"),
            &u1.access_token,
        )
        .json(&json!({
            "bitrate": 1200.5,
            "packet_loss": 0.02,
            "latency": 45.0,
            "network_quality": "good",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let participant: Value = resp.json().await.unwrap();
    assert_eq!(participant["avg_bitrate"], 1200.5);

    // Last-write-wins merge into the call's metrics map, keyed by user.
    let stored = app.store.call(call_id).unwrap();
    let entry = stored.quality_metrics.get(&u1.id_hex).unwrap();
    assert_eq!(entry.network_quality.as_deref(), Some("good"));
    assert_eq!(entry.packet_loss, Some(0.02));
}

#[tokio::test]
async fn settings_update_is_host_gated() {
    let app = TestApp::spawn().await;
    let ws_id = workspace();
    let u1 = app.seed_user("alice");
    let u2 = app.seed_user("bob");

    let call = start_call(&app, &ws_id, &u1, json!({ "call_type": "video" })).await;
    let call_id = call["id"].as_str().unwrap();
    join_call(&app, &ws_id, call_id, &u2).await;

    let path = format!("/api/workspace/{ws_id}/call/{call_id}/settings");

    let resp = app
        .auth_put(&path, &u2.access_token)
        .json(&json!({ "title": "hijacked" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    let resp = app
        .auth_put(&path, &u1.access_token)
        .json(&json!({ "title": "Panel sync", "max_participants": 4 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let updated: Value = resp.json().await.unwrap();
    assert_eq!(updated["title"], "Panel sync");
    assert_eq!(updated["max_participants"], 4);
}

#[tokio::test]
async fn active_calls_listing_excludes_ended() {
    let app = TestApp::spawn().await;
    let ws_id = workspace();
    let u1 = app.seed_user("alice");
    let u2 = app.seed_user("bob");

    let call_a = start_call(&app, &ws_id, &u1, json!({ "call_type": "voice" })).await;
    start_call(&app, &ws_id, &u2, json!({ "call_type": "video" })).await;

    let call_a_id = call_a["id"].as_str().unwrap();
    app.auth_post(
        &format!("/api/workspace/{ws_id}/call/{call_a_id}/end"),
        &u1.access_token,
    )
    .send()
    .await
    .unwrap();

    let active: Vec<Value> = app
        .auth_get(
            &format!("/api/workspace/{ws_id}/call/active"),
            &u1.access_token,
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["call_type"], "video");
}

#[tokio::test]
async fn pending_calls_expire_when_ttl_configured() {
    let app = TestApp::spawn_with_settings(|s| {
        s.call.pending_ttl_secs = Some(1);
        s.call.sweep_interval_secs = 1;
    })
    .await;
    let ws_id = workspace();
    let u1 = app.seed_user("alice");

    let call = start_call(&app, &ws_id, &u1, json!({ "call_type": "voice" })).await;
    let call_id = ObjectId::parse_str(call["id"].as_str().unwrap()).unwrap();

    tokio::time::sleep(std::time::Duration::from_secs(3)).await;

    let stored = app.store.call(call_id).unwrap();
    assert_eq!(stored.status, hirewire_db::models::CallStatus::Ended);
}
