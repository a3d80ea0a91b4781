use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::{http::StatusCode, Body, Error, Response};

use crate::ddb::{self, attr_bool, attr_s, Attrs};
use crate::error::{json_response, ApiError};
use crate::notifications::{self, NotificationEvent};
use crate::types::{CreateMessageRequest, Message};
use crate::users;

fn mailbox_pk(user_id: &str) -> String {
    format!("MSGBOX#{}", user_id)
}

fn message_sk(message_id: &str) -> String {
    format!("MSG#{}", message_id)
}

fn message_from_attrs(item: &Attrs) -> Message {
    Message {
        message_id: ddb::get_s(item, "SK")
            .strip_prefix("MSG#")
            .map(|s| s.to_string())
            .unwrap_or_default(),
        sender_id: ddb::get_s(item, "sender_id"),
        receiver_id: ddb::get_s(item, "receiver_id"),
        item_id: ddb::get_s_opt(item, "item_id"),
        claim_id: ddb::get_s_opt(item, "claim_id"),
        content: ddb::get_s(item, "content"),
        is_read: ddb::get_bool(item, "is_read"),
        created_at: ddb::get_s(item, "created_at"),
    }
}

async fn put_mailbox_copy(
    client: &DynamoClient,
    table_name: &str,
    mailbox_user: &str,
    message: &Message,
) -> Result<(), ApiError> {
    let mut put = client
        .put_item()
        .table_name(table_name)
        .item("PK", attr_s(mailbox_pk(mailbox_user)))
        .item("SK", attr_s(message_sk(&message.message_id)))
        .item("sender_id", attr_s(message.sender_id.clone()))
        .item("receiver_id", attr_s(message.receiver_id.clone()))
        .item("content", attr_s(message.content.clone()))
        .item("is_read", attr_bool(message.is_read))
        .item("created_at", attr_s(message.created_at.clone()));
    if let Some(item_id) = &message.item_id {
        put = put.item("item_id", attr_s(item_id.clone()));
    }
    if let Some(claim_id) = &message.claim_id {
        put = put.item("claim_id", attr_s(claim_id.clone()));
    }
    put.send()
        .await
        .map_err(|e| ApiError::store("put message", e))?;
    Ok(())
}

/// Send a message, optionally linked to an item or claim for context. The
/// record is dual-written into the sender's and receiver's mailboxes; the
/// receiver also gets a notification.
pub async fn create_message(
    client: &DynamoClient,
    table_name: &str,
    sender_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: CreateMessageRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            return ApiError::Validation(format!("invalid request body: {}", e)).into_response()
        }
    };
    if req.receiver_id == sender_id {
        return ApiError::Validation("cannot message yourself".to_string()).into_response();
    }
    let receiver = match users::fetch_user(client, table_name, &req.receiver_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return ApiError::NotFound("receiver".to_string()).into_response(),
        Err(e) => return e.into_response(),
    };

    let message = Message {
        message_id: uuid::Uuid::new_v4().to_string(),
        sender_id: sender_id.to_string(),
        receiver_id: receiver.user_id.clone(),
        item_id: req.item_id,
        claim_id: req.claim_id,
        content: req.content,
        is_read: false,
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    for mailbox_user in [sender_id, message.receiver_id.as_str()] {
        if let Err(e) = put_mailbox_copy(client, table_name, mailbox_user, &message).await {
            return e.into_response();
        }
    }

    let sender_name = users::fetch_user(client, table_name, sender_id)
        .await
        .ok()
        .flatten()
        .map(|u| u.name)
        .unwrap_or_else(|| sender_id.to_string());
    notifications::fan_out(
        client,
        table_name,
        NotificationEvent::NewMessage {
            message_id: message.message_id.clone(),
            sender_id: sender_id.to_string(),
            sender_name,
            receiver_id: message.receiver_id.clone(),
            item_id: message.item_id.clone(),
            claim_id: message.claim_id.clone(),
        },
        &[],
    )
    .await;

    json_response(StatusCode::CREATED, &message)
}

/// List the calling user's mailbox, newest first.
pub async fn list_messages(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
) -> Result<Response<Body>, Error> {
    let result = match client
        .query()
        .table_name(table_name)
        .key_condition_expression("PK = :pk")
        .expression_attribute_values(":pk", attr_s(mailbox_pk(user_id)))
        .send()
        .await
    {
        Ok(result) => result,
        Err(e) => return ApiError::store("query messages", e).into_response(),
    };

    let mut messages: Vec<Message> = result.items().iter().map(message_from_attrs).collect();
    messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    json_response(StatusCode::OK, &messages)
}

/// Mark a received message as read. Only the receiver's mailbox copy carries
/// read state.
pub async fn mark_message_read(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    message_id: &str,
) -> Result<Response<Body>, Error> {
    let result = client
        .update_item()
        .table_name(table_name)
        .key("PK", attr_s(mailbox_pk(user_id)))
        .key("SK", attr_s(message_sk(message_id)))
        .condition_expression("attribute_exists(PK) AND receiver_id = :caller")
        .update_expression("SET is_read = :read")
        .expression_attribute_values(":caller", attr_s(user_id))
        .expression_attribute_values(":read", attr_bool(true))
        .send()
        .await;

    match result {
        Ok(_) => json_response(StatusCode::OK, &serde_json::json!({ "is_read": true })),
        Err(e) => {
            let service_err = e.into_service_error();
            if service_err.is_conditional_check_failed_exception() {
                ApiError::NotFound("message".to_string()).into_response()
            } else {
                ApiError::store("mark message read", service_err).into_response()
            }
        }
    }
}
