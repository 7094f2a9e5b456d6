use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;

use cohort_core::auth::Claims;
use cohort_core::error::GatewayError;
use cohort_core::{chat, signaling, AppState};
use cohort_db::users;
use cohort_models::gateway::*;

use crate::session::Session;

pub(crate) async fn handle_connection(socket: WebSocket, state: AppState, claims: Claims) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let user = match users::get_user(&state.db, claims.sub).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            tracing::warn!(user_id = claims.sub, "gateway: token for unknown user");
            let _ = send_error(&mut ws_tx, "Authentication error").await;
            return;
        }
        Err(err) => {
            tracing::error!("gateway: user lookup failed: {err}");
            let _ = send_error(&mut ws_tx, "Authentication error").await;
            return;
        }
    };

    let mut session = Session::new(&user);
    let connection_id = session.connection_id.clone();
    let mut outbound = state.bus.register(&connection_id);
    let was_offline = state.presence.add(session.user_id, &connection_id);

    match state.rooms.hydrate(&user, &state.presence).await {
        Ok(rooms) => session.rooms = rooms,
        Err(err) => {
            tracing::error!(user_id = session.user_id, "gateway: hydration failed: {err}");
            let _ = send_error(&mut ws_tx, "Unable to join chat rooms").await;
            state.bus.unregister(&connection_id);
            state.presence.remove(session.user_id, &connection_id);
            return;
        }
    }
    state.bus.set_rooms(&connection_id, &session.room_keys());
    push_room_snapshot(&state, &session);

    if was_offline {
        emit_user_status(&state, &session, true);
    }

    tracing::info!(
        user_id = session.user_id,
        connection = %connection_id,
        rooms = session.rooms.len(),
        "gateway: connection established"
    );

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                match serde_json::to_string(&frame) {
                    Ok(text) => {
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => tracing::error!("gateway: frame serialization failed: {err}"),
                }
            }
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_text(&state, &mut session, &text).await;
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = ws_tx.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::debug!(connection = %connection_id, "gateway: socket error: {err}");
                        break;
                    }
                }
            }
        }
    }

    state.bus.unregister(&connection_id);
    let went_offline = state.presence.remove(session.user_id, &connection_id);
    if went_offline {
        cleanup_calls(&state, &session);
        emit_user_status(&state, &session, false);
    }
    tracing::info!(
        user_id = session.user_id,
        connection = %connection_id,
        "gateway: connection closed"
    );
}

async fn send_error(
    ws_tx: &mut (impl SinkExt<Message> + Unpin),
    message: &str,
) -> Result<(), ()> {
    let frame = ServerFrame::event(EVENT_ERROR, json!({ "message": message }));
    let text = serde_json::to_string(&frame).map_err(|_| ())?;
    ws_tx.send(Message::Text(text.into())).await.map_err(|_| ())
}

fn push_room_snapshot(state: &AppState, session: &Session) {
    if let Ok(data) = serde_json::to_value(&session.rooms) {
        state
            .bus
            .emit_to_connection(&session.connection_id, ServerFrame::event(EVENT_ROOMS, data));
    }
}

/// Presence transitions go to the rooms that contain the user, not to
/// the whole server. Connections in several shared rooms get one frame.
fn emit_user_status(state: &AppState, session: &Session, is_online: bool) {
    state.bus.emit_to_rooms(
        &session.room_keys(),
        &ServerFrame::event(
            EVENT_USER_STATUS,
            json!({
                "userId": session.user_id.to_string(),
                "isOnline": is_online,
            }),
        ),
    );
}

/// Sweeps the departed user out of every live call and tells the
/// remaining members the call leg ended.
fn cleanup_calls(state: &AppState, session: &Session) {
    for cleanup in state.calls.remove_user_everywhere(session.user_id) {
        if cleanup.share_cleared {
            let frame = ServerFrame::event(
                EVENT_SCREEN_SHARE_UPDATE,
                json!({
                    "roomKey": cleanup.room_key,
                    "userId": session.user_id.to_string(),
                    "isSharing": false,
                }),
            );
            for &member in &cleanup.remaining {
                state
                    .bus
                    .emit_to_connections(&state.presence.connections_of(member), &frame);
            }
        }
        let frame = ServerFrame::event(
            EVENT_END,
            json!({
                "from": session.user_id.to_string(),
                "roomKey": cleanup.room_key,
            }),
        );
        for &member in &cleanup.remaining {
            state
                .bus
                .emit_to_connections(&state.presence.connections_of(member), &frame);
        }
    }
}

async fn handle_text(state: &AppState, session: &mut Session, text: &str) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(err) => {
            tracing::debug!(user_id = session.user_id, "gateway: unparseable frame: {err}");
            state.bus.emit_to_connection(
                &session.connection_id,
                ServerFrame::event(EVENT_ERROR, json!({ "message": "Invalid frame" })),
            );
            return;
        }
    };

    let ack = frame.ack;
    match dispatch(state, session, frame).await {
        Ok(body) => {
            if let Some(ack) = ack {
                state
                    .bus
                    .emit_to_connection(&session.connection_id, ServerFrame::ack(ack, body));
            }
        }
        Err(err) => {
            tracing::debug!(user_id = session.user_id, "gateway: request failed: {err}");
            match ack {
                Some(ack) => state
                    .bus
                    .emit_to_connection(&session.connection_id, ServerFrame::ack(ack, err.ack())),
                None => state.bus.emit_to_connection(
                    &session.connection_id,
                    ServerFrame::event(EVENT_ERROR, json!({ "message": err.to_string() })),
                ),
            }
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(data: serde_json::Value) -> Result<T, GatewayError> {
    serde_json::from_value(data).map_err(|_| GatewayError::Validation("Invalid payload".into()))
}

async fn dispatch(
    state: &AppState,
    session: &mut Session,
    frame: ClientFrame,
) -> Result<serde_json::Value, GatewayError> {
    match frame.event.as_str() {
        EVENT_SEND => {
            let view =
                chat::send_message(state, &session.rooms, &session.profile, parse(frame.data)?)
                    .await?;
            Ok(json!({ "success": true, "data": view }))
        }
        EVENT_MARK_DELIVERED => {
            chat::mark_delivered(state, &session.rooms, session.user_id, parse(frame.data)?)
                .await?;
            Ok(json!({ "success": true }))
        }
        EVENT_MARK_READ => {
            chat::mark_read(state, &session.rooms, session.user_id, parse(frame.data)?).await?;
            Ok(json!({ "success": true }))
        }
        EVENT_DELETE => {
            chat::delete_message(
                state,
                &session.rooms,
                session.user_id,
                &session.connection_id,
                parse(frame.data)?,
            )
            .await?;
            Ok(json!({ "success": true }))
        }
        EVENT_HISTORY => {
            let messages =
                chat::history(state, &session.rooms, session.user_id, parse(frame.data)?).await?;
            Ok(json!({ "success": true, "messages": messages }))
        }
        EVENT_REFRESH => {
            let user = users::get_user(&state.db, session.user_id)
                .await?
                .ok_or(GatewayError::Unauthorized)?;
            session.rooms = state.rooms.hydrate(&user, &state.presence).await?;
            state
                .bus
                .set_rooms(&session.connection_id, &session.room_keys());
            push_room_snapshot(state, session);
            Ok(json!({ "success": true }))
        }
        EVENT_RING => {
            signaling::ring(state, &session.rooms, &session.profile, parse(frame.data)?)?;
            Ok(json!({ "success": true }))
        }
        EVENT_RING_ACCEPT => {
            signaling::accept(state, &session.rooms, &session.profile, parse(frame.data)?)?;
            Ok(json!({ "success": true }))
        }
        EVENT_RING_DECLINE => {
            signaling::decline(state, &session.rooms, session.user_id, parse(frame.data)?)?;
            Ok(json!({ "success": true }))
        }
        EVENT_OFFER => {
            signaling::offer(state, &session.rooms, session.user_id, parse(frame.data)?)?;
            Ok(json!({ "success": true }))
        }
        EVENT_ANSWER => {
            signaling::answer(state, &session.rooms, session.user_id, parse(frame.data)?)?;
            Ok(json!({ "success": true }))
        }
        EVENT_CANDIDATE => {
            signaling::candidate(state, &session.rooms, session.user_id, parse(frame.data)?)?;
            Ok(json!({ "success": true }))
        }
        EVENT_END => {
            signaling::end(state, &session.rooms, session.user_id, parse(frame.data)?)?;
            Ok(json!({ "success": true }))
        }
        EVENT_SCREEN_SHARE => {
            signaling::screen_share(state, &session.rooms, &session.profile, parse(frame.data)?)?;
            Ok(json!({ "success": true }))
        }
        other => {
            tracing::debug!(user_id = session.user_id, event = other, "gateway: unknown event");
            Err(GatewayError::Validation(format!("Unknown event '{other}'")))
        }
    }
}
