//! The messaging pipeline: validate against the connection's room
//! snapshot, persist, then fan out. There is no store-and-forward;
//! offline recipients catch up from history. Receipt writes during a
//! send are best-effort and never abort the primary broadcast.

use std::collections::HashMap;

use chrono::Utc;
use cohort_db::messages::{self, ChatMessageRow, NewChatMessage};
use cohort_db::receipts;
use cohort_db::users;
use cohort_models::gateway::{
    DeletePayload, HistoryPayload, MarkPayload, SendPayload, ServerFrame, EVENT_MESSAGES_READ,
    EVENT_MESSAGE_DELETED, EVENT_MESSAGE_DELIVERED, EVENT_NEW_MESSAGE,
};
use cohort_models::message::{Attachment, CallMeta, ContactCard, MessageKind, MessageView};
use cohort_models::room::RoomDescriptor;
use cohort_models::user::SenderInfo;
use serde_json::json;

use crate::error::GatewayError;
use crate::{snowflake, AppState};

const HISTORY_DEFAULT_LIMIT: i64 = 50;
const HISTORY_MAX_LIMIT: i64 = 100;

fn find_room<'a>(
    rooms: &'a [RoomDescriptor],
    room_key: &str,
) -> Result<&'a RoomDescriptor, GatewayError> {
    rooms
        .iter()
        .find(|room| room.key == room_key)
        .ok_or_else(|| GatewayError::Forbidden("Room not allowed".into()))
}

fn infer_kind(payload: &SendPayload) -> MessageKind {
    if let Some(kind) = payload.message_type {
        return kind;
    }
    if payload.contact_data.is_some() {
        return MessageKind::Contact;
    }
    if let Some(first) = payload.attachments.first() {
        if first.file_type.starts_with("image/") {
            return MessageKind::Image;
        }
        return MessageKind::Document;
    }
    MessageKind::Text
}

/// Fills display fields of a shared contact card from the users table
/// when the client sent only the id.
async fn inline_contact(
    state: &AppState,
    card: ContactCard,
) -> Result<ContactCard, GatewayError> {
    if card.username.is_some() {
        return Ok(card);
    }
    match users::get_user(&state.db, card.user_id).await? {
        Some(user) => Ok(ContactCard {
            user_id: card.user_id,
            username: Some(user.username),
            email: card.email.or(user.email),
            phone: card.phone.or(user.phone),
            avatar_url: card.avatar_url.or(user.avatar_url),
        }),
        None => Ok(card),
    }
}

pub async fn send_message(
    state: &AppState,
    rooms: &[RoomDescriptor],
    sender: &SenderInfo,
    payload: SendPayload,
) -> Result<MessageView, GatewayError> {
    if payload.room_key.trim().is_empty() {
        return Err(GatewayError::Validation("Room key is required".into()));
    }
    let room = rooms
        .iter()
        .find(|room| room.key == payload.room_key)
        .ok_or_else(|| {
            GatewayError::Forbidden("You cannot send messages to this chat".into())
        })?;

    let text = payload.text.as_deref().unwrap_or("").trim().to_string();
    if text.is_empty() && payload.attachments.is_empty() && payload.contact_data.is_none() {
        return Err(GatewayError::Validation("Message content is required".into()));
    }

    let kind = infer_kind(&payload);
    let contact = match payload.contact_data.clone() {
        Some(card) => Some(inline_contact(state, card).await?),
        None => None,
    };

    let mut participants = room.participant_ids();
    if participants.is_empty() {
        participants.push(sender.id);
    }

    let id = snowflake::generate(state.config.worker_id);
    let created_at = Utc::now();

    messages::create_message(
        &state.db,
        &NewChatMessage {
            id,
            room_key: room.key.clone(),
            room_kind: room.kind.as_str().to_string(),
            group_id: room.group_id,
            sender_id: sender.id,
            participants: participants.clone(),
            body: text.clone(),
            message_kind: kind.as_str().to_string(),
            attachments: serde_json::to_value(&payload.attachments)
                .unwrap_or_else(|_| json!([])),
            contact: contact
                .as_ref()
                .map(|card| serde_json::to_value(card).unwrap_or(serde_json::Value::Null)),
            is_encrypted: payload.is_encrypted,
            meta: payload
                .meta
                .as_ref()
                .map(|meta| serde_json::to_value(meta).unwrap_or(serde_json::Value::Null)),
            created_at,
        },
    )
    .await?;

    let mut view = MessageView {
        id,
        room_key: room.key.clone(),
        text,
        message_type: kind,
        attachments: payload.attachments,
        contact_data: contact,
        sender: sender.clone(),
        timestamp: created_at,
        read_by: Vec::new(),
        delivered_to: Vec::new(),
        is_deleted: false,
        deleted_by: Vec::new(),
        is_encrypted: payload.is_encrypted,
        meta: payload.meta,
    };

    if let Ok(data) = serde_json::to_value(&view) {
        state
            .bus
            .emit_to_room(&room.key, &ServerFrame::event(EVENT_NEW_MESSAGE, data));
    }

    // Immediate delivery receipts for recipients with a live connection.
    let mut delivered = Vec::new();
    for &recipient in participants.iter().filter(|&&p| p != sender.id) {
        if !state.presence.is_online(recipient) {
            continue;
        }
        match receipts::upsert_delivery(&state.db, id, &room.key, recipient).await {
            Ok(()) => delivered.push(recipient),
            Err(err) => {
                tracing::warn!(message_id = id, recipient, "delivery receipt write failed: {err}");
            }
        }
    }
    if !delivered.is_empty() {
        view.delivered_to = delivered.clone();
        state.bus.emit_to_room(
            &room.key,
            &ServerFrame::event(
                EVENT_MESSAGE_DELIVERED,
                json!({
                    "messageId": id.to_string(),
                    "roomKey": room.key,
                    "deliveredTo": delivered.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
                }),
            ),
        );
    }

    Ok(view)
}

pub async fn mark_delivered(
    state: &AppState,
    rooms: &[RoomDescriptor],
    user_id: i64,
    payload: MarkPayload,
) -> Result<(), GatewayError> {
    if payload.message_ids.is_empty() {
        return Err(GatewayError::Validation(
            "Room key and message IDs are required".into(),
        ));
    }
    let room = find_room(rooms, &payload.room_key)?;
    for &message_id in &payload.message_ids {
        receipts::upsert_delivery(&state.db, message_id, &room.key, user_id).await?;
    }
    state.bus.emit_to_room(
        &room.key,
        &ServerFrame::event(
            EVENT_MESSAGE_DELIVERED,
            json!({
                "roomKey": room.key,
                "userId": user_id.to_string(),
                "messageIds": payload.message_ids.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
            }),
        ),
    );
    Ok(())
}

/// Marks messages read, writing the implied delivery receipt first.
/// Only messages read for the first time are fanned out.
pub async fn mark_read(
    state: &AppState,
    rooms: &[RoomDescriptor],
    user_id: i64,
    payload: MarkPayload,
) -> Result<(), GatewayError> {
    if payload.message_ids.is_empty() {
        return Err(GatewayError::Validation(
            "Room key and message IDs are required".into(),
        ));
    }
    let room = find_room(rooms, &payload.room_key)?;
    let mut newly_read = Vec::new();
    for &message_id in &payload.message_ids {
        receipts::upsert_delivery(&state.db, message_id, &room.key, user_id).await?;
        if receipts::insert_read_if_absent(&state.db, message_id, &room.key, user_id).await? {
            newly_read.push(message_id);
        }
    }
    if !newly_read.is_empty() {
        state.bus.emit_to_room(
            &room.key,
            &ServerFrame::event(
                EVENT_MESSAGES_READ,
                json!({
                    "roomKey": room.key,
                    "userId": user_id.to_string(),
                    "messageIds": newly_read.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
                }),
            ),
        );
    }
    Ok(())
}

pub async fn delete_message(
    state: &AppState,
    rooms: &[RoomDescriptor],
    user_id: i64,
    connection_id: &str,
    payload: DeletePayload,
) -> Result<(), GatewayError> {
    let message_id = payload
        .message_id
        .ok_or_else(|| GatewayError::Validation("Invalid payload".into()))?;
    let row = messages::get_message(&state.db, message_id)
        .await?
        .ok_or(GatewayError::NotFound)?;
    let room = find_room(rooms, &row.room_key)?;

    let data = json!({
        "messageId": message_id.to_string(),
        "roomKey": room.key,
        "deleteForEveryone": payload.delete_for_everyone,
    });

    if payload.delete_for_everyone {
        if row.sender_id != user_id {
            return Err(GatewayError::Forbidden(
                "You can only delete your own messages for everyone".into(),
            ));
        }
        messages::mark_deleted_for_everyone(&state.db, message_id).await?;
        state
            .bus
            .emit_to_room(&room.key, &ServerFrame::event(EVENT_MESSAGE_DELETED, data));
    } else {
        messages::add_deleted_for(&state.db, message_id, user_id).await?;
        state
            .bus
            .emit_to_connection(connection_id, ServerFrame::event(EVENT_MESSAGE_DELETED, data));
    }
    Ok(())
}

/// Backlog fetch, oldest first, with receipts merged in. Messages the
/// caller deleted for themselves are filtered out.
pub async fn history(
    state: &AppState,
    rooms: &[RoomDescriptor],
    user_id: i64,
    payload: HistoryPayload,
) -> Result<Vec<MessageView>, GatewayError> {
    let room = find_room(rooms, &payload.room_key)?;
    let limit = payload
        .limit
        .unwrap_or(HISTORY_DEFAULT_LIMIT)
        .clamp(1, HISTORY_MAX_LIMIT);

    let rows: Vec<ChatMessageRow> =
        messages::get_room_messages(&state.db, &room.key, payload.before, limit)
            .await?
            .into_iter()
            .filter(|row| !row.deleted_for.contains(&user_id))
            .collect();

    let message_ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
    let mut delivered: HashMap<i64, Vec<i64>> = HashMap::new();
    for receipt in receipts::get_delivery_for_messages(&state.db, &message_ids).await? {
        delivered.entry(receipt.message_id).or_default().push(receipt.user_id);
    }
    let mut read: HashMap<i64, Vec<i64>> = HashMap::new();
    for receipt in receipts::get_read_for_messages(&state.db, &message_ids).await? {
        read.entry(receipt.message_id).or_default().push(receipt.user_id);
    }

    let mut sender_ids: Vec<i64> = rows.iter().map(|row| row.sender_id).collect();
    sender_ids.sort_unstable();
    sender_ids.dedup();
    let senders: HashMap<i64, SenderInfo> = users::get_users_by_ids(&state.db, &sender_ids)
        .await?
        .iter()
        .map(|user| (user.id, crate::rooms::sender_info_from_user(user)))
        .collect();

    let mut views: Vec<MessageView> = rows
        .into_iter()
        .map(|row| {
            let sender = senders.get(&row.sender_id).cloned().unwrap_or(SenderInfo {
                id: row.sender_id,
                username: "unknown".into(),
                avatar_url: None,
                role: String::new(),
            });
            let delivered_to = delivered.remove(&row.id).unwrap_or_default();
            let read_by = read.remove(&row.id).unwrap_or_default();
            format_message(row, sender, delivered_to, read_by)
        })
        .collect();
    views.reverse();
    Ok(views)
}

fn format_message(
    row: ChatMessageRow,
    sender: SenderInfo,
    delivered_to: Vec<i64>,
    read_by: Vec<i64>,
) -> MessageView {
    let attachments: Vec<Attachment> =
        serde_json::from_value(row.attachments).unwrap_or_default();
    let contact_data: Option<ContactCard> = row
        .contact
        .and_then(|value| serde_json::from_value(value).ok());
    let meta: Option<CallMeta> = row
        .meta
        .and_then(|value| serde_json::from_value(value).ok());

    MessageView {
        id: row.id,
        room_key: row.room_key,
        text: row.body,
        message_type: MessageKind::parse(&row.message_kind).unwrap_or_default(),
        attachments,
        contact_data,
        sender,
        timestamp: row.created_at,
        read_by,
        delivered_to,
        is_deleted: row.is_deleted,
        deleted_by: row.deleted_for,
        is_encrypted: row.is_encrypted,
        meta,
    }
}
