mod common;

use hearth_chat::chat::delivery::{send_direct, send_group};
use reqwest::StatusCode;
use serde_json::{json, Value};

use common::spawn;

#[tokio::test]
async fn test_requests_need_a_known_identity() {
    let server = spawn().await;

    let resp = server
        .http
        .get(server.url("/chat/unread-count"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], false);

    let resp = server.get("mallory", "/chat/unread-count").await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_direct_message_read_flow() {
    let server = spawn().await;
    let alice = server.identity("alice");
    let dm = send_direct(&server.state, &alice, "bob", "Hello", None).unwrap();

    let unread: Value = server.get("bob", "/chat/unread-count").await.json().await.unwrap();
    assert_eq!(unread, json!({ "total": 1, "group": 0, "direct": 1 }));

    let history: Value = server.get("bob", "/chat/messages/alice").await.json().await.unwrap();
    assert_eq!(history[0]["id"], dm.message.id.as_str());
    assert_eq!(history[0]["conversationId"], "alice_bob");
    assert_eq!(history[0]["readBy"], json!([]));

    let resp = server
        .post("bob", "/chat/mark-read", json!({ "conversationId": "alice_bob" }))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.json::<Value>().await.unwrap(), json!({ "count": 1 }));

    let history: Value = server.get("alice", "/chat/messages/bob").await.json().await.unwrap();
    assert_eq!(history[0]["readBy"][0]["user"], "bob");

    let unread: Value = server.get("bob", "/chat/unread-count").await.json().await.unwrap();
    assert_eq!(unread["total"], 0);

    // Idempotent
    let again: Value = server
        .post("bob", "/chat/mark-read", json!({ "conversationId": "alice_bob" }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(again["count"], 0);
}

#[tokio::test]
async fn test_mark_read_requires_a_target() {
    let server = spawn().await;
    let resp = server.post("bob", "/chat/mark-read", json!({})).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = server
        .post("bob", "/chat/mark-read", json!({ "messageIds": ["not-a-uuid"] }))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_direct_history_with_other_family_is_rejected() {
    let server = spawn().await;
    let alice = server.identity("alice");
    send_group(&server.state, &alice, "family news", None).unwrap();

    let resp = server.get("carol", "/chat/messages/alice").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let group: Value = server.get("carol", "/chat/messages?type=group").await.json().await.unwrap();
    assert_eq!(group, json!([]));
}

#[tokio::test]
async fn test_group_history_paging() {
    let server = spawn().await;
    let alice = server.identity("alice");
    for i in 0..5 {
        send_group(&server.state, &alice, &format!("m{}", i), None).unwrap();
    }

    let page: Vec<Value> = server
        .get("bob", "/chat/messages?type=group&limit=2")
        .await
        .json()
        .await
        .unwrap();
    let bodies: Vec<&str> = page.iter().map(|m| m["message"].as_str().unwrap()).collect();
    assert_eq!(bodies, ["m3", "m4"]);

    let page: Vec<Value> = server
        .get("bob", "/chat/messages?limit=2&skip=4")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0]["sender"], json!({ "id": "alice", "name": "Alice" }));

    let resp = server.get("bob", "/chat/messages?type=direct").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_for_everyone_rules() {
    let server = spawn().await;
    let alice = server.identity("alice");
    let dm = send_direct(&server.state, &alice, "bob", "Hello", None).unwrap();
    let path = format!("/chat/messages/{}/for-everyone", dm.message.id);

    let resp = server.delete("bob", &path).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = server.delete("alice", &path).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"]["deletedForEveryone"], true);
    assert_eq!(body["message"]["message"], "");

    let resp = server.delete("alice", &path).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Both sides see the tombstone
    for (viewer, peer) in [("alice", "bob"), ("bob", "alice")] {
        let history: Value = server
            .get(viewer, &format!("/chat/messages/{}", peer))
            .await
            .json()
            .await
            .unwrap();
        assert_eq!(history[0]["deletedForEveryone"], true);
        assert_eq!(history[0]["message"], "");
    }

    let missing = format!("/chat/messages/{}/for-everyone", uuid::Uuid::new_v4());
    assert_eq!(server.delete("alice", &missing).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        server.delete("alice", "/chat/messages/garbage/for-everyone").await.status(),
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn test_delete_for_me_is_private() {
    let server = spawn().await;
    let alice = server.identity("alice");
    let keep = send_direct(&server.state, &alice, "bob", "keep", None).unwrap();
    let hide = send_direct(&server.state, &alice, "bob", "hide", None).unwrap();
    let path = format!("/chat/messages/{}/for-me", hide.message.id);

    assert_eq!(server.delete("bob", &path).await.status(), StatusCode::OK);
    assert_eq!(server.delete("bob", &path).await.status(), StatusCode::BAD_REQUEST);
    assert_eq!(server.delete("carol", &path).await.status(), StatusCode::NOT_FOUND);

    let bob_view: Vec<Value> = server.get("bob", "/chat/messages/alice").await.json().await.unwrap();
    assert_eq!(bob_view.len(), 1);
    assert_eq!(bob_view[0]["id"], keep.message.id.as_str());

    let alice_view: Vec<Value> = server.get("alice", "/chat/messages/bob").await.json().await.unwrap();
    assert_eq!(alice_view.len(), 2);
}

#[tokio::test]
async fn test_moderator_purge() {
    let server = spawn().await;
    let alice = server.identity("alice");
    let group = send_group(&server.state, &alice, "oops", None).unwrap();
    let path = format!("/chat/{}", group.message.id);

    assert_eq!(server.delete("bob", &path).await.status(), StatusCode::FORBIDDEN);
    assert_eq!(server.delete("mia", &path).await.status(), StatusCode::OK);
    assert_eq!(server.delete("mia", &path).await.status(), StatusCode::NOT_FOUND);

    let history: Vec<Value> = server.get("bob", "/chat/messages").await.json().await.unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn test_conversation_list() {
    let server = spawn().await;
    let alice = server.identity("alice");
    let mia = server.identity("mia");
    send_direct(&server.state, &mia, "bob", "from mia", None).unwrap();
    send_direct(&server.state, &alice, "bob", "from alice", None).unwrap();

    let list: Vec<Value> = server.get("bob", "/chat/conversations").await.json().await.unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["conversationId"], "alice_bob");
    assert_eq!(list[0]["user"]["name"], "Alice");
    assert_eq!(list[0]["lastMessage"]["message"], "from alice");
    assert_eq!(list[0]["unreadCount"], 1);
    assert_eq!(list[1]["conversationId"], "bob_mia");
}

#[tokio::test]
async fn test_health_and_stats() {
    let server = spawn().await;
    let alice = server.identity("alice");
    send_group(&server.state, &alice, "hi", None).unwrap();

    let health: Value = server
        .http
        .get(server.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["service"], "hearth-chat");

    let stats: Value = server
        .http
        .get(server.url("/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["stored_messages"], 1);
    assert_eq!(stats["roster_members"], 4);
    assert_eq!(stats["online_connections"], 0);
}
