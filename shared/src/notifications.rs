use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::{http::StatusCode, Body, Error, Response};

use crate::ddb::{self, attr_bool, attr_s, Attrs};
use crate::error::{json_response, ApiError};
use crate::types::{Notification, NotificationType};

/// A domain event that produces notifications. The admin broadcast set is
/// passed in by the caller rather than looked up here, so the fan-out stays a
/// pure recipient mapping plus independent writes.
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    ClaimSubmitted {
        item_id: String,
        item_title: String,
        claim_id: String,
        claimant_id: String,
        claimant_name: String,
        poster_id: String,
    },
    ClaimDecided {
        item_id: String,
        item_title: String,
        claim_id: String,
        claimant_id: String,
        poster_id: String,
        approved: bool,
        decided_by: String,
    },
    ItemArchived {
        item_id: String,
        item_title: String,
        poster_id: String,
        archived_by: String,
    },
    ItemDeleted {
        item_id: String,
        item_title: String,
        poster_id: String,
        deleted_by: String,
    },
    NewMessage {
        message_id: String,
        sender_id: String,
        sender_name: String,
        receiver_id: String,
        item_id: Option<String>,
        claim_id: Option<String>,
    },
}

/// One rendered notification, addressed to a single user.
#[derive(Debug, Clone)]
pub struct OutboundNotification {
    pub user_id: String,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub payload: serde_json::Value,
}

/// Expand an event into its per-recipient notifications. `ClaimSubmitted`
/// broadcasts to every admin: one record per admin, not a shared record.
pub fn expand(event: &NotificationEvent, admin_ids: &[String]) -> Vec<OutboundNotification> {
    match event {
        NotificationEvent::ClaimSubmitted {
            item_id,
            item_title,
            claim_id,
            claimant_id,
            claimant_name,
            poster_id,
        } => {
            let payload = serde_json::json!({
                "item_id": item_id,
                "claim_id": claim_id,
                "claimant_id": claimant_id,
            });
            let mut out = vec![OutboundNotification {
                user_id: poster_id.clone(),
                notification_type: NotificationType::ClaimSubmitted,
                title: "New claim on your item".to_string(),
                message: format!("{} submitted a claim on \"{}\"", claimant_name, item_title),
                payload: payload.clone(),
            }];
            for admin_id in admin_ids {
                out.push(OutboundNotification {
                    user_id: admin_id.clone(),
                    notification_type: NotificationType::ClaimSubmitted,
                    title: "Claim awaiting review".to_string(),
                    message: format!(
                        "{} submitted a claim on \"{}\"",
                        claimant_name, item_title
                    ),
                    payload: payload.clone(),
                });
            }
            out
        }
        NotificationEvent::ClaimDecided {
            item_id,
            item_title,
            claim_id,
            claimant_id,
            poster_id,
            approved,
            decided_by,
        } => {
            let payload = serde_json::json!({
                "item_id": item_id,
                "claim_id": claim_id,
                "decided_by": decided_by,
            });
            let mut out = vec![OutboundNotification {
                user_id: claimant_id.clone(),
                notification_type: if *approved {
                    NotificationType::ClaimApproved
                } else {
                    NotificationType::ClaimRejected
                },
                title: if *approved {
                    "Your claim was approved".to_string()
                } else {
                    "Your claim was rejected".to_string()
                },
                message: if *approved {
                    format!("Your claim on \"{}\" was approved", item_title)
                } else {
                    format!("Your claim on \"{}\" was rejected", item_title)
                },
                payload: payload.clone(),
            }];
            if *approved {
                out.push(OutboundNotification {
                    user_id: poster_id.clone(),
                    notification_type: NotificationType::ItemClaimed,
                    title: "Your item was claimed".to_string(),
                    message: format!("\"{}\" was claimed by its owner", item_title),
                    payload,
                });
            }
            out
        }
        NotificationEvent::ItemArchived {
            item_id,
            item_title,
            poster_id,
            archived_by,
        } => vec![OutboundNotification {
            user_id: poster_id.clone(),
            notification_type: NotificationType::ItemArchived,
            title: "Your item was archived".to_string(),
            message: format!("\"{}\" was archived by an admin", item_title),
            payload: serde_json::json!({ "item_id": item_id, "archived_by": archived_by }),
        }],
        NotificationEvent::ItemDeleted {
            item_id,
            item_title,
            poster_id,
            deleted_by,
        } => vec![OutboundNotification {
            user_id: poster_id.clone(),
            notification_type: NotificationType::ItemDeleted,
            title: "Your item was removed".to_string(),
            message: format!("\"{}\" was removed by an admin", item_title),
            payload: serde_json::json!({ "item_id": item_id, "deleted_by": deleted_by }),
        }],
        NotificationEvent::NewMessage {
            message_id,
            sender_id,
            sender_name,
            receiver_id,
            item_id,
            claim_id,
        } => vec![OutboundNotification {
            user_id: receiver_id.clone(),
            notification_type: NotificationType::NewMessage,
            title: "New message".to_string(),
            message: format!("{} sent you a message", sender_name),
            payload: serde_json::json!({
                "message_id": message_id,
                "sender_id": sender_id,
                "item_id": item_id,
                "claim_id": claim_id,
            }),
        }],
    }
}

/// Write one notification record per recipient. Fire-and-forget: a failed
/// write is logged and never surfaced, so it can never block or roll back the
/// domain operation that triggered it.
pub async fn fan_out(
    client: &DynamoClient,
    table_name: &str,
    event: NotificationEvent,
    admin_ids: &[String],
) {
    for outbound in expand(&event, admin_ids) {
        let notification_id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let result = client
            .put_item()
            .table_name(table_name)
            .item("PK", attr_s(format!("NOTIF#{}", outbound.user_id)))
            .item("SK", attr_s(format!("NOTIF#{}", notification_id)))
            .item("type", attr_s(outbound.notification_type.as_str()))
            .item("title", attr_s(outbound.title))
            .item("message", attr_s(outbound.message))
            .item("payload", attr_s(outbound.payload.to_string()))
            .item("is_read", attr_bool(false))
            .item("created_at", attr_s(now))
            .send()
            .await;
        if let Err(e) = result {
            tracing::error!(
                "failed to write notification for user {}: {:?}",
                outbound.user_id,
                e
            );
        }
    }
}

fn notification_from_item(user_id: &str, item: &Attrs) -> Notification {
    let notification_id = ddb::get_s(item, "SK")
        .strip_prefix("NOTIF#")
        .map(|s| s.to_string())
        .unwrap_or_default();
    Notification {
        notification_id,
        user_id: user_id.to_string(),
        notification_type: NotificationType::parse(&ddb::get_s(item, "type"))
            .unwrap_or(NotificationType::NewMessage),
        title: ddb::get_s(item, "title"),
        message: ddb::get_s(item, "message"),
        payload: serde_json::from_str(&ddb::get_s(item, "payload"))
            .unwrap_or(serde_json::Value::Null),
        is_read: ddb::get_bool(item, "is_read"),
        created_at: ddb::get_s(item, "created_at"),
    }
}

/// List the calling user's notifications, newest first.
pub async fn list_notifications(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
) -> Result<Response<Body>, Error> {
    let result = match client
        .query()
        .table_name(table_name)
        .key_condition_expression("PK = :pk")
        .expression_attribute_values(":pk", attr_s(format!("NOTIF#{}", user_id)))
        .send()
        .await
    {
        Ok(result) => result,
        Err(e) => return ApiError::store("query notifications", e).into_response(),
    };

    let mut notifications: Vec<Notification> = result
        .items()
        .iter()
        .map(|item| notification_from_item(user_id, item))
        .collect();
    notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    json_response(StatusCode::OK, &notifications)
}

/// Mark one of the calling user's notifications as read.
pub async fn mark_notification_read(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    notification_id: &str,
) -> Result<Response<Body>, Error> {
    let result = client
        .update_item()
        .table_name(table_name)
        .key("PK", attr_s(format!("NOTIF#{}", user_id)))
        .key("SK", attr_s(format!("NOTIF#{}", notification_id)))
        .condition_expression("attribute_exists(PK)")
        .update_expression("SET is_read = :read")
        .expression_attribute_values(":read", attr_bool(true))
        .send()
        .await;

    match result {
        Ok(_) => json_response(StatusCode::OK, &serde_json::json!({ "is_read": true })),
        Err(e) => {
            let service_err = e.into_service_error();
            if service_err.is_conditional_check_failed_exception() {
                ApiError::NotFound("notification".to_string()).into_response()
            } else {
                ApiError::store("mark notification read", service_err).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submitted() -> NotificationEvent {
        NotificationEvent::ClaimSubmitted {
            item_id: "item-1".to_string(),
            item_title: "Blue umbrella".to_string(),
            claim_id: "claim-1".to_string(),
            claimant_id: "user-x".to_string(),
            claimant_name: "Xavier".to_string(),
            poster_id: "user-p".to_string(),
        }
    }

    fn decided(approved: bool) -> NotificationEvent {
        NotificationEvent::ClaimDecided {
            item_id: "item-1".to_string(),
            item_title: "Blue umbrella".to_string(),
            claim_id: "claim-1".to_string(),
            claimant_id: "user-x".to_string(),
            poster_id: "user-p".to_string(),
            approved,
            decided_by: "admin-1".to_string(),
        }
    }

    #[test]
    fn claim_submitted_fans_out_to_poster_and_every_admin() {
        let admins = vec!["admin-1".to_string(), "admin-2".to_string()];
        let out = expand(&submitted(), &admins);

        // one record for the poster plus one per admin
        assert_eq!(out.len(), 1 + admins.len());
        assert_eq!(out[0].user_id, "user-p");
        assert_eq!(out[1].user_id, "admin-1");
        assert_eq!(out[2].user_id, "admin-2");
        for n in &out {
            assert_eq!(n.notification_type, NotificationType::ClaimSubmitted);
            assert_eq!(n.payload["claim_id"], "claim-1");
        }
    }

    #[test]
    fn claim_submitted_with_no_admins_still_notifies_poster() {
        let out = expand(&submitted(), &[]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].user_id, "user-p");
    }

    #[test]
    fn approval_notifies_claimant_and_poster() {
        let out = expand(&decided(true), &["admin-1".to_string()]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].user_id, "user-x");
        assert_eq!(out[0].notification_type, NotificationType::ClaimApproved);
        assert_eq!(out[1].user_id, "user-p");
        assert_eq!(out[1].notification_type, NotificationType::ItemClaimed);
    }

    #[test]
    fn rejection_notifies_claimant_only() {
        // the admin list is irrelevant to decisions
        let out = expand(&decided(false), &["admin-1".to_string(), "admin-2".to_string()]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].user_id, "user-x");
        assert_eq!(out[0].notification_type, NotificationType::ClaimRejected);
    }

    #[test]
    fn item_events_notify_poster_only() {
        let archived = NotificationEvent::ItemArchived {
            item_id: "item-1".to_string(),
            item_title: "Blue umbrella".to_string(),
            poster_id: "user-p".to_string(),
            archived_by: "admin-1".to_string(),
        };
        let deleted = NotificationEvent::ItemDeleted {
            item_id: "item-1".to_string(),
            item_title: "Blue umbrella".to_string(),
            poster_id: "user-p".to_string(),
            deleted_by: "admin-1".to_string(),
        };
        for event in [archived, deleted] {
            let out = expand(&event, &["admin-1".to_string()]);
            assert_eq!(out.len(), 1);
            assert_eq!(out[0].user_id, "user-p");
        }
    }

    #[test]
    fn new_message_notifies_receiver() {
        let event = NotificationEvent::NewMessage {
            message_id: "msg-1".to_string(),
            sender_id: "user-a".to_string(),
            sender_name: "Alice".to_string(),
            receiver_id: "user-b".to_string(),
            item_id: Some("item-1".to_string()),
            claim_id: None,
        };
        let out = expand(&event, &[]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].user_id, "user-b");
        assert_eq!(out[0].notification_type, NotificationType::NewMessage);
        assert_eq!(out[0].payload["item_id"], "item-1");
    }
}
