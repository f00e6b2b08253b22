//! WebSocket endpoint: one long-lived connection multiplexing many request
//! subscriptions, with heartbeat and idle termination.

pub mod hub;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use platefinder_common::protocol::{
    Channel, ClientFrame, HardCloseReason, NackReason, ServerFrame, CLOSE_GOING_AWAY,
    CLOSE_NORMAL, CLOSE_POLICY,
};

use crate::AppState;
use hub::{ConnHandle, SessionHub, SubscribeOutcome};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    // Hard policy checks happen before the session starts; violations close
    // with 1008 and a reason the client must not retry on.
    let origin = headers
        .get("origin")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let origin_blocked = !state.config.ws_allowed_origins.is_empty()
        && !origin
            .as_deref()
            .map(|o| state.config.ws_allowed_origins.iter().any(|a| a == o))
            .unwrap_or(false);
    let not_authorized = state.config.ws_require_auth && query.user_id.is_none();

    ws.on_upgrade(move |socket| async move {
        if origin_blocked {
            warn!(origin = origin.as_deref().unwrap_or("-"), "WebSocket origin blocked");
            close_policy(socket, HardCloseReason::OriginBlocked).await;
            return;
        }
        if not_authorized {
            warn!("WebSocket connection without identity while auth is required");
            close_policy(socket, HardCloseReason::NotAuthorized).await;
            return;
        }
        handle_socket(socket, state, query).await;
    })
}

async fn close_policy(mut socket: WebSocket, reason: HardCloseReason) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: CLOSE_POLICY,
            reason: reason.as_str().into(),
        })))
        .await;
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, query: WsQuery) {
    let conn_id = Uuid::new_v4().to_string();
    let session_id = query
        .session_id
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "anonymous".to_string());

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    state.hub.register_conn(ConnHandle {
        conn_id: conn_id.clone(),
        user_id: query.user_id.clone(),
        session_id: session_id.clone(),
        tx: out_tx,
    });
    info!(conn_id = %conn_id, session_id = %session_id, "WebSocket connected");

    let (mut sink, mut stream) = socket.split();
    let mut heartbeat = tokio::time::interval(state.config.ws_heartbeat);
    heartbeat.tick().await; // consume the immediate first tick

    let mut is_alive = true;
    let mut last_activity = Instant::now();
    let mut close_code: u16 = CLOSE_NORMAL;
    let mut close_reason: Option<&'static str> = None;

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                close_code = CLOSE_GOING_AWAY;
                close_reason = Some("shutting_down");
                break;
            }

            _ = heartbeat.tick() => {
                if !is_alive {
                    debug!(conn_id = %conn_id, "Missed heartbeat, terminating");
                    break;
                }
                if last_activity.elapsed() > state.config.ws_idle_timeout {
                    debug!(conn_id = %conn_id, "Idle timeout, terminating");
                    break;
                }
                is_alive = false;
                if sink
                    .send(Message::Text(ServerFrame::Ping.to_text().into()))
                    .await
                    .is_err()
                {
                    break;
                }
            }

            outgoing = out_rx.recv() => {
                match outgoing {
                    Some(payload) => {
                        if sink.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        last_activity = Instant::now();
                        match handle_frame(&state.hub, &conn_id, text.as_str(), &mut is_alive) {
                            FrameAction::Reply(frame) => {
                                if sink
                                    .send(Message::Text(frame.to_text().into()))
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                            }
                            FrameAction::ReplyMany(frames) => {
                                let mut dead = false;
                                for payload in frames {
                                    if sink.send(Message::Text(payload.into())).await.is_err() {
                                        dead = true;
                                        break;
                                    }
                                }
                                if dead {
                                    break;
                                }
                            }
                            FrameAction::Close(reason) => {
                                close_code = CLOSE_POLICY;
                                close_reason = Some(reason.as_str());
                                break;
                            }
                            FrameAction::None => {}
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        last_activity = Instant::now();
                        let _ = sink.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_activity = Instant::now();
                        is_alive = true;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(conn_id = %conn_id, error = %e, "WebSocket read error");
                        break;
                    }
                }
            }
        }
    }

    state.hub.unregister_conn(&conn_id);
    let _ = sink
        .send(Message::Close(Some(CloseFrame {
            code: close_code,
            reason: close_reason.unwrap_or("").into(),
        })))
        .await;
    info!(conn_id = %conn_id, code = close_code, "WebSocket closed");
}

enum FrameAction {
    None,
    Reply(ServerFrame),
    ReplyMany(Vec<String>),
    Close(HardCloseReason),
}

fn handle_frame(
    hub: &SessionHub,
    conn_id: &str,
    text: &str,
    is_alive: &mut bool,
) -> FrameAction {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(conn_id, error = %e, "Unparseable client frame");
            return FrameAction::Close(HardCloseReason::InvalidRequest);
        }
    };

    match frame {
        ClientFrame::Ping => FrameAction::Reply(ServerFrame::Pong),
        ClientFrame::Pong => {
            *is_alive = true;
            FrameAction::None
        }
        ClientFrame::Subscribe {
            channel,
            request_id,
        } => {
            let Ok(channel) = channel.parse::<Channel>() else {
                return FrameAction::Reply(ServerFrame::SubNack {
                    channel: None,
                    request_id,
                    reason: NackReason::InvalidChannel,
                });
            };
            let Some(request_id) = request_id.filter(|r| !r.is_empty()) else {
                return FrameAction::Reply(ServerFrame::SubNack {
                    channel: Some(channel),
                    request_id: None,
                    reason: NackReason::MissingRequestId,
                });
            };

            match hub.subscribe(conn_id, channel, &request_id) {
                SubscribeOutcome::Active { backlog } => {
                    let ack = ServerFrame::SubAck {
                        channel,
                        request_id,
                    };
                    let mut payloads = vec![ack.to_text()];
                    payloads.extend(backlog);
                    FrameAction::ReplyMany(payloads)
                }
                SubscribeOutcome::Pending => FrameAction::Reply(ServerFrame::SubAck {
                    channel,
                    request_id,
                }),
                SubscribeOutcome::Rejected(reason) => FrameAction::Reply(ServerFrame::SubNack {
                    channel: Some(channel),
                    request_id: Some(request_id),
                    reason,
                }),
            }
        }
        ClientFrame::Unsubscribe {
            channel,
            request_id,
        } => {
            if let (Ok(channel), Some(request_id)) = (channel.parse::<Channel>(), request_id) {
                hub.unsubscribe(conn_id, channel, &request_id);
            }
            FrameAction::None
        }
    }
}
