//! WebRTC signaling relays. The gateway never inspects SDP or ICE
//! payloads; it authorizes the room, checks the target is reachable,
//! and forwards. Call membership bookkeeping lives in [`crate::calls`].

use cohort_models::gateway::{
    ScreenSharePayload, ServerFrame, SignalPayload, EVENT_ANSWER, EVENT_CANDIDATE, EVENT_END,
    EVENT_OFFER, EVENT_RING, EVENT_RING_ACCEPT, EVENT_RING_DECLINE, EVENT_SCREEN_SHARE_UPDATE,
};
use cohort_models::room::{RoomDescriptor, RoomKind};
use cohort_models::user::SenderInfo;
use serde_json::{json, Map, Value};

use crate::error::GatewayError;
use crate::AppState;

fn authorize<'a>(
    rooms: &'a [RoomDescriptor],
    payload: &SignalPayload,
) -> Result<(&'a RoomDescriptor, i64), GatewayError> {
    let target = payload
        .to
        .ok_or_else(|| GatewayError::Validation("Invalid payload".into()))?;
    if payload.room_key.trim().is_empty() {
        return Err(GatewayError::Validation("Invalid payload".into()));
    }
    let room = rooms
        .iter()
        .find(|room| room.key == payload.room_key)
        .ok_or_else(|| GatewayError::Forbidden("Room not allowed".into()))?;
    if room.kind != RoomKind::Broadcast && !room.has_participant(target) {
        return Err(GatewayError::Forbidden("Target not in room".into()));
    }
    Ok((room, target))
}

fn signal_data(from: i64, room_key: &str, extra: &Map<String, Value>) -> Value {
    let mut map = extra.clone();
    map.insert("from".into(), Value::String(from.to_string()));
    map.insert("roomKey".into(), Value::String(room_key.to_string()));
    Value::Object(map)
}

fn ids_as_strings(ids: &[i64]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

/// Rings a peer on every device they have connected. The payload
/// carries the caller's display fields so the callee can render the
/// incoming-call screen without a directory lookup.
pub fn ring(
    state: &AppState,
    rooms: &[RoomDescriptor],
    caller: &SenderInfo,
    payload: SignalPayload,
) -> Result<(), GatewayError> {
    let (room, target) = authorize(rooms, &payload)?;
    let connections = state.presence.connections_of(target);
    if connections.is_empty() {
        return Err(GatewayError::TargetOffline);
    }

    let mut data = match signal_data(caller.id, &room.key, &payload.extra) {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    data.insert(
        "caller".into(),
        serde_json::to_value(caller).unwrap_or(Value::Null),
    );

    state
        .bus
        .emit_to_connections(&connections, &ServerFrame::event(EVENT_RING, Value::Object(data)));
    Ok(())
}

/// Joins both sides of the accepted ring into the call, then tells
/// every party who else is in the session.
pub fn accept(
    state: &AppState,
    rooms: &[RoomDescriptor],
    acceptor: &SenderInfo,
    payload: SignalPayload,
) -> Result<(), GatewayError> {
    let (room, caller) = authorize(rooms, &payload)?;
    let caller_connections = state.presence.connections_of(caller);
    if caller_connections.is_empty() {
        return Err(GatewayError::TargetOffline);
    }

    let snapshot = state.calls.join_pair(&room.key, caller, acceptor.id);
    let others: Vec<i64> = snapshot
        .members
        .iter()
        .copied()
        .filter(|&id| id != caller && id != acceptor.id)
        .collect();

    // The original caller learns who accepted and who else is present.
    state.bus.emit_to_connections(
        &caller_connections,
        &ServerFrame::event(
            EVENT_RING_ACCEPT,
            json!({
                "from": acceptor.id.to_string(),
                "roomKey": room.key,
                "peers": ids_as_strings(&others),
            }),
        ),
    );

    // Existing members learn about the new participant and the full
    // peer set from their own point of view.
    for &member in &others {
        let mut peers = vec![caller];
        peers.extend(others.iter().copied().filter(|&id| id != member));
        state.bus.emit_to_connections(
            &state.presence.connections_of(member),
            &ServerFrame::event(
                EVENT_RING_ACCEPT,
                json!({
                    "from": acceptor.id.to_string(),
                    "roomKey": room.key,
                    "peers": ids_as_strings(&peers),
                }),
            ),
        );
    }

    // The acceptor's own devices get the roster plus current share
    // state so a late joiner can attach to an ongoing screen share.
    let screen_sharing = snapshot
        .screen_sharer
        .map(|user_id| json!({ "userId": user_id.to_string() }))
        .unwrap_or(Value::Null);
    state.bus.emit_to_connections(
        &state.presence.connections_of(acceptor.id),
        &ServerFrame::event(
            EVENT_RING_ACCEPT,
            json!({
                "from": caller.to_string(),
                "roomKey": room.key,
                "peers": ids_as_strings(&others),
                "isAccepter": true,
                "screenSharing": screen_sharing,
            }),
        ),
    );
    Ok(())
}

/// Pure relay of a targeted signaling event. `required` names an extra
/// field that must be present (the SDP or ICE body).
fn relay(
    state: &AppState,
    rooms: &[RoomDescriptor],
    from: i64,
    payload: SignalPayload,
    event: &str,
    required: Option<&str>,
) -> Result<(), GatewayError> {
    let (room, target) = authorize(rooms, &payload)?;
    if let Some(field) = required {
        if !payload.extra.contains_key(field) {
            return Err(GatewayError::Validation("Invalid payload".into()));
        }
    }
    let connections = state.presence.connections_of(target);
    if connections.is_empty() {
        return Err(GatewayError::TargetOffline);
    }
    state.bus.emit_to_connections(
        &connections,
        &ServerFrame::event(event, signal_data(from, &room.key, &payload.extra)),
    );
    Ok(())
}

pub fn decline(
    state: &AppState,
    rooms: &[RoomDescriptor],
    from: i64,
    payload: SignalPayload,
) -> Result<(), GatewayError> {
    relay(state, rooms, from, payload, EVENT_RING_DECLINE, None)
}

pub fn offer(
    state: &AppState,
    rooms: &[RoomDescriptor],
    from: i64,
    payload: SignalPayload,
) -> Result<(), GatewayError> {
    relay(state, rooms, from, payload, EVENT_OFFER, Some("offer"))
}

pub fn answer(
    state: &AppState,
    rooms: &[RoomDescriptor],
    from: i64,
    payload: SignalPayload,
) -> Result<(), GatewayError> {
    relay(state, rooms, from, payload, EVENT_ANSWER, Some("answer"))
}

pub fn candidate(
    state: &AppState,
    rooms: &[RoomDescriptor],
    from: i64,
    payload: SignalPayload,
) -> Result<(), GatewayError> {
    relay(state, rooms, from, payload, EVENT_CANDIDATE, Some("candidate"))
}

/// Retracts the caller from the session and relays the hang-up. The
/// retraction runs even when the target has already disconnected; the
/// implicit share clear for a departing holder stays silent, since the
/// hang-up relay already conveys it.
pub fn end(
    state: &AppState,
    rooms: &[RoomDescriptor],
    from: i64,
    payload: SignalPayload,
) -> Result<(), GatewayError> {
    let (room, target) = authorize(rooms, &payload)?;

    state.calls.leave(&room.key, from);

    let connections = state.presence.connections_of(target);
    if connections.is_empty() {
        return Err(GatewayError::TargetOffline);
    }
    state.bus.emit_to_connections(
        &connections,
        &ServerFrame::event(EVENT_END, signal_data(from, &room.key, &payload.extra)),
    );
    Ok(())
}

pub fn screen_share(
    state: &AppState,
    rooms: &[RoomDescriptor],
    user: &SenderInfo,
    payload: ScreenSharePayload,
) -> Result<(), GatewayError> {
    let room = rooms
        .iter()
        .find(|room| room.key == payload.room_key)
        .ok_or_else(|| GatewayError::Forbidden("Room not allowed".into()))?;

    let members = state
        .calls
        .set_screen_share(&room.key, user.id, payload.is_sharing);

    let others: Vec<i64> = members.into_iter().filter(|&id| id != user.id).collect();
    notify_share_update(state, &room.key, user.id, payload.is_sharing, &others);
    Ok(())
}

fn notify_share_update(
    state: &AppState,
    room_key: &str,
    user_id: i64,
    is_sharing: bool,
    members: &[i64],
) {
    let frame = ServerFrame::event(
        EVENT_SCREEN_SHARE_UPDATE,
        json!({
            "roomKey": room_key,
            "userId": user_id.to_string(),
            "isSharing": is_sharing,
        }),
    );
    for &member in members {
        state
            .bus
            .emit_to_connections(&state.presence.connections_of(member), &frame);
    }
}
