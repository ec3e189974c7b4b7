//! Shared helpers: boot the real router on an ephemeral port.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use hearth_chat::protocol::{ClientEvent, ServerEvent};
use hearth_chat::{router, ChatConfig, ChatState, Directory, Identity, MessageStore, Role};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: ChatState,
    pub http: reqwest::Client,
}

/// Family `f1`: alice, bob, mia (moderator). Family `f2`: carol.
pub fn roster() -> Directory {
    let directory = Directory::new();
    for (id, family, name, role) in [
        ("alice", "f1", "Alice", Role::Member),
        ("bob", "f1", "Bob", Role::Member),
        ("mia", "f1", "Mia", Role::Moderator),
        ("carol", "f2", "Carol", Role::Member),
    ] {
        directory
            .upsert(Identity {
                user_id: id.to_string(),
                family_id: family.to_string(),
                display_name: name.to_string(),
                role,
            })
            .unwrap();
    }
    directory
}

pub async fn spawn() -> TestServer {
    spawn_with_store(MessageStore::in_memory().unwrap()).await
}

pub async fn spawn_with_store(store: MessageStore) -> TestServer {
    let state = ChatState::new(ChatConfig::default(), store, roster());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        addr,
        state,
        http: reqwest::Client::new(),
    }
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn identity(&self, user_id: &str) -> Identity {
        self.state.directory.get(user_id).unwrap()
    }

    pub async fn get(&self, user_id: &str, path: &str) -> reqwest::Response {
        self.http
            .get(self.url(path))
            .header("x-user-id", user_id)
            .send()
            .await
            .unwrap()
    }

    pub async fn post(&self, user_id: &str, path: &str, body: serde_json::Value) -> reqwest::Response {
        self.http
            .post(self.url(path))
            .header("x-user-id", user_id)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn delete(&self, user_id: &str, path: &str) -> reqwest::Response {
        self.http
            .delete(self.url(path))
            .header("x-user-id", user_id)
            .send()
            .await
            .unwrap()
    }

    /// Open a socket as `user_id` and consume the `registered` event.
    pub async fn connect(&self, user_id: &str) -> Socket {
        let mut request = format!("ws://{}/ws", self.addr).into_client_request().unwrap();
        request
            .headers_mut()
            .insert("x-user-id", HeaderValue::from_str(user_id).unwrap());
        let (mut socket, _) = tokio_tungstenite::connect_async(request).await.unwrap();

        match next_event(&mut socket).await {
            ServerEvent::Registered { user_id: id, .. } => assert_eq!(id, user_id),
            other => panic!("Expected registered, got {:?}", other),
        }
        socket
    }
}

pub async fn send(socket: &mut Socket, event: ClientEvent) {
    let json = serde_json::to_string(&event).unwrap();
    socket.send(Message::Text(json)).await.unwrap();
}

pub async fn send_raw(socket: &mut Socket, text: &str) {
    socket.send(Message::Text(text.to_string())).await.unwrap();
}

/// The next server event, failing the test after two seconds.
pub async fn next_event(socket: &mut Socket) -> ServerEvent {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for event")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Assert nothing arrives for a short while.
pub async fn expect_silence(socket: &mut Socket) {
    let result = tokio::time::timeout(Duration::from_millis(200), socket.next()).await;
    assert!(result.is_err(), "unexpected frame: {:?}", result);
}
