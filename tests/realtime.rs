mod common;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use uuid::Uuid;

use adminhub::client::{
    spawn, ApiClient, ClientContext, ClientError, ConnectionState, PermissionGate, ReconnectPolicy, SharedGate,
};
use adminhub::events::{Room, ServerEvent};
use common::{spawn_app, TestApp};

async fn serve(app: &TestApp) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn next_text<S>(stream: &mut S) -> Value
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Reads until the server closes the socket, failing on any event frame.
async fn expect_closed<S>(stream: &mut S)
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("socket was never closed");
        match message {
            None | Some(Ok(Message::Close(_))) | Some(Err(_)) => return,
            Some(Ok(Message::Text(text))) => {
                let frame: Value = serde_json::from_str(&text).unwrap();
                assert_ne!(frame["type"], "event", "event delivered to a closing socket: {frame}");
            }
            Some(Ok(_)) => {}
        }
    }
}

fn join(room: &str) -> Message {
    Message::Text(json!({ "type": "join", "room": room }).to_string())
}

#[tokio::test]
async fn socket_requires_a_token() {
    let app = spawn_app().await;
    let addr = serve(&app).await;
    assert!(connect_async(format!("ws://{addr}/ws")).await.is_err());
    assert!(connect_async(format!("ws://{addr}/ws?token=bogus")).await.is_err());
}

#[tokio::test]
async fn rooms_are_authorized_on_join() {
    let app = spawn_app().await;
    let addr = serve(&app).await;
    let (token, user_id) = app.register("member@example.com").await;
    let (socket, _) = connect_async(format!("ws://{addr}/ws?token={token}")).await.unwrap();
    let (mut sink, mut stream) = socket.split();

    sink.send(join("admin")).await.unwrap();
    let refused = next_text(&mut stream).await;
    assert_eq!(refused["type"], "error");
    assert_eq!(refused["room"], "admin");

    sink.send(join(&format!("user:{}", Uuid::new_v4()))).await.unwrap();
    assert_eq!(next_text(&mut stream).await["type"], "error");

    sink.send(join(&format!("user:{user_id}"))).await.unwrap();
    let joined = next_text(&mut stream).await;
    assert_eq!(joined["type"], "joined");

    // Members hold dashboard:read by default.
    sink.send(join("dashboard")).await.unwrap();
    assert_eq!(next_text(&mut stream).await["type"], "joined");

    sink.send(Message::Text(json!({ "type": "ping" }).to_string())).await.unwrap();
    assert_eq!(next_text(&mut stream).await["type"], "pong");

    sink.send(Message::Text("not json".into())).await.unwrap();
    assert_eq!(next_text(&mut stream).await["type"], "error");
}

#[tokio::test]
async fn client_receives_its_notifications_and_permission_changes() {
    let app = spawn_app().await;
    let addr = serve(&app).await;
    let (admin, _) = app.login_admin().await;
    let (token, user_id) = app.register("bob@example.com").await;
    let bob: Uuid = user_id.parse().unwrap();

    let me = app.get("/auth/me", &token).await;
    let permissions = serde_json::from_value(me.body["data"]["permissions"].clone()).unwrap();
    let gate: SharedGate = Arc::new(std::sync::RwLock::new(PermissionGate::from_login(bob, permissions)));

    let (seen_tx, mut seen) = mpsc::unbounded_channel();
    let mut context = ClientContext::new();
    PermissionGate::attach(&gate, &mut context);
    context.on("notification:new", move |_, event| {
        if let ServerEvent::NotificationNew(notification) = event {
            let _ = seen_tx.send(notification.title.clone());
        }
    });
    context.subscribe(Room::User(bob));
    let context = Arc::new(Mutex::new(context));

    let mut handle = spawn(
        format!("ws://{addr}/ws?token={token}"),
        Arc::clone(&context),
        ReconnectPolicy::default(),
    );
    assert!(handle.wait_for(ConnectionState::Connected).await);

    // Wait for the server to confirm the join before producing events.
    tokio::time::timeout(Duration::from_secs(5), async {
        while context.lock().unwrap().joined_rooms().next().is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("room was never joined");

    let created = app
        .post(
            "/notifications",
            &admin,
            json!({ "user_id": user_id, "title": "Welcome aboard", "message": "Hello" }),
        )
        .await;
    assert!(created.status.is_success());

    let title = tokio::time::timeout(Duration::from_secs(5), seen.recv())
        .await
        .expect("no notification arrived")
        .unwrap();
    assert_eq!(title, "Welcome aboard");
    assert!(!gate.read().unwrap().is_stale());

    let group = app.group_with(&admin, "readers", &["users:read"]).await;
    app.post(&format!("/groups/{group}/members"), &admin, json!({ "user_id": user_id }))
        .await;

    tokio::time::timeout(Duration::from_secs(5), async {
        while !gate.read().unwrap().is_stale() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("gate never went stale");

    handle.shutdown().await;
}

#[tokio::test]
async fn revoked_rooms_are_left_and_locked_sockets_closed() {
    let app = spawn_app().await;
    let addr = serve(&app).await;
    let (admin, _) = app.login_admin().await;
    let (token, user_id) = app.register("auditor@example.com").await;
    let group = app.group_with(&admin, "auditors", &["activity:read"]).await;
    app.post(&format!("/groups/{group}/members"), &admin, json!({ "user_id": user_id }))
        .await;

    let (socket, _) = connect_async(format!("ws://{addr}/ws?token={token}")).await.unwrap();
    let (mut sink, mut stream) = socket.split();
    sink.send(join("activity")).await.unwrap();
    assert_eq!(next_text(&mut stream).await["type"], "joined");

    let removed = app
        .request(
            axum::http::Method::DELETE,
            &format!("/groups/{group}/members/{user_id}"),
            Some(&admin),
            None,
        )
        .await;
    assert!(removed.status.is_success());

    let refused = next_text(&mut stream).await;
    assert_eq!(refused["type"], "error");
    assert_eq!(refused["room"], "activity");
    let left = next_text(&mut stream).await;
    assert_eq!(left["type"], "left");
    assert_eq!(left["room"], "activity");

    // New activity no longer reaches the socket.
    app.register("someone-else@example.com").await;
    sink.send(Message::Text(json!({ "type": "ping" }).to_string())).await.unwrap();
    assert_eq!(next_text(&mut stream).await["type"], "pong");

    let locked = app.post(&format!("/users/{user_id}/lock"), &admin, json!({})).await;
    assert!(locked.status.is_success());
    expect_closed(&mut stream).await;
}

#[tokio::test]
async fn logout_closes_that_sessions_socket() {
    let app = spawn_app().await;
    let addr = serve(&app).await;
    let (token, user_id) = app.register("leaving@example.com").await;
    let (other_token, _) = app.login("leaving@example.com", "member-password").await;

    let (ending, _) = connect_async(format!("ws://{addr}/ws?token={token}")).await.unwrap();
    let (mut ending_sink, mut ending_stream) = ending.split();
    let (staying, _) = connect_async(format!("ws://{addr}/ws?token={other_token}")).await.unwrap();
    let (mut staying_sink, mut staying_stream) = staying.split();

    for sink in [&mut ending_sink, &mut staying_sink] {
        sink.send(join(&format!("user:{user_id}"))).await.unwrap();
    }
    assert_eq!(next_text(&mut ending_stream).await["type"], "joined");
    assert_eq!(next_text(&mut staying_stream).await["type"], "joined");

    let out = app.post("/auth/logout", &token, json!({})).await;
    assert!(out.status.is_success());
    expect_closed(&mut ending_stream).await;

    staying_sink.send(Message::Text(json!({ "type": "ping" }).to_string())).await.unwrap();
    assert_eq!(next_text(&mut staying_stream).await["type"], "pong");
}

#[tokio::test]
async fn api_client_signs_in_and_refreshes_its_gate() {
    let app = spawn_app().await;
    let addr = serve(&app).await;
    let (admin, _) = app.login_admin().await;
    app.register("carol@example.com").await;

    let mut client = ApiClient::new(format!("http://{addr}"), "/api");
    assert!(matches!(client.me(false).await, Err(ClientError::NotSignedIn)));

    let refused = client.login("carol@example.com", "wrong-password").await;
    match refused {
        Err(ClientError::Api { status, code, .. }) => {
            assert_eq!(status, 401);
            assert_eq!(code, "UNAUTHORIZED");
        }
        other => panic!("expected an api error, got {other:?}"),
    }

    let session = client.login("carol@example.com", "member-password").await.unwrap();
    assert!(client.websocket_url().unwrap().starts_with(&format!("ws://{addr}/ws?token=")));
    let mut gate = session.gate();
    assert!(gate.has("dashboard:read"));
    assert!(!gate.has("users:read"));

    let me = client.me(false).await.unwrap();
    assert_eq!(me.user.email, "carol@example.com");

    let group = app.group_with(&admin, "readers", &["users:read"]).await;
    app.post(&format!("/groups/{group}/members"), &admin, json!({ "user_id": session.user.id }))
        .await;
    assert!(gate.observe(&ServerEvent::PermissionsChanged { user_id: session.user.id }));
    assert!(gate.is_stale());

    client.refresh_gate(&mut gate).await.unwrap();
    assert!(!gate.is_stale());
    assert!(gate.has("users:read"));

    client.logout().await.unwrap();
    assert!(client.token().is_none());
    assert_eq!(app.get("/auth/me", &session.token).await.status, axum::http::StatusCode::UNAUTHORIZED);
}
