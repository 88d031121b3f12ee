//! `GET /ws`: authenticated socket that joins rooms on request and relays
//! everything the hub publishes into them.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::ApiError,
    events::{ClientFrame, ConnectionId, Peer, Room, RoomAccess, ServerFrame},
    middleware::{authenticate, check_permission_or_error, AuthUser, Credential},
    state::AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let credential = params
        .token
        .as_deref()
        .filter(|token| !token.is_empty())
        .map(Credential::from_query)
        .or_else(|| Credential::from_headers(&headers))
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
    let auth = authenticate(&state, credential).await?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, auth)))
}

async fn handle_socket(socket: WebSocket, state: AppState, auth: AuthUser) {
    let user_id = auth.id();
    let peer = Peer {
        user_id,
        session_id: auth.session.id,
    };
    let (conn, mut outbound) = state.hub.connect(peer);
    let (mut sink, mut stream) = socket.split();
    log::info!(target: "adminhub::ws", "{} connected (connection {conn})", auth.user.email);

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => handle_frame(&state, conn, user_id, &text).await,
                Some(Ok(Message::Close(_))) | None => break,
                // Protocol-level ping/pong is answered by axum.
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    log::debug!(target: "adminhub::ws", "connection {conn} errored: {err}");
                    break;
                }
            },
            queued = outbound.recv() => match queued {
                Some(text) => {
                    if let Err(err) = sink.send(Message::Text(text.to_string())).await {
                        log::debug!(target: "adminhub::ws", "connection {conn} send failed: {err}");
                        break;
                    }
                }
                // The hub dropped this connection: session ended or account locked.
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
        }
    }

    state.hub.disconnect(conn);
    log::info!(target: "adminhub::ws", "{} disconnected (connection {conn})", auth.user.email);
}

async fn handle_frame(state: &AppState, conn: ConnectionId, user_id: Uuid, text: &str) {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(err) => {
            state.hub.send_to(
                conn,
                &ServerFrame::Error {
                    message: format!("invalid frame: {err}"),
                    room: None,
                },
            );
            return;
        }
    };

    match frame {
        ClientFrame::Join { room, since } => match authorize_room(state, user_id, room).await {
            Ok(()) => {
                state.hub.join(conn, room, since);
            }
            Err(err) => {
                let message = match err {
                    ApiError::Forbidden(_) => format!("not allowed to join {room}"),
                    other => {
                        log::error!(target: "adminhub::ws", "join {room} failed: {other}");
                        format!("could not join {room}")
                    }
                };
                state.hub.send_to(conn, &ServerFrame::Error { message, room: Some(room) });
            }
        },
        ClientFrame::Leave { room } => {
            if !state.hub.leave(conn, room) {
                state.hub.send_to(
                    conn,
                    &ServerFrame::Error {
                        message: format!("not subscribed to {room}"),
                        room: Some(room),
                    },
                );
            }
        }
        ClientFrame::Ping => {
            state.hub.send_to(conn, &ServerFrame::Pong);
        }
    }
}

/// Personal rooms belong to their user alone; topic rooms need the
/// permission they are tagged with.
pub async fn authorize_room(state: &AppState, user_id: Uuid, room: Room) -> Result<(), ApiError> {
    match room.access() {
        RoomAccess::Owner(owner) if owner == user_id => Ok(()),
        RoomAccess::Owner(_) => Err(ApiError::Forbidden(room.to_string())),
        RoomAccess::Permission(code) => check_permission_or_error(&state.resolver, user_id, code).await,
    }
}
