use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::{http::StatusCode, Body, Error, Response};

use crate::ddb::{self, attr_s, string_list_attr, Attrs};
use crate::error::{json_response, ApiError};
use crate::notifications::{self, NotificationEvent};
use crate::types::{
    qr_payload_for, AdminItemStatusRequest, CreateItemRequest, Item, ItemKind, ItemStatus, Role,
    UpdateItemRequest,
};
use crate::users;

const ITEMS_PK: &str = "ITEMS";

fn item_sk(item_id: &str) -> String {
    format!("ITEM#{}", item_id)
}

fn item_from_attrs(item: &Attrs) -> Item {
    let item_id = ddb::get_s(item, "SK")
        .strip_prefix("ITEM#")
        .map(|s| s.to_string())
        .unwrap_or_default();
    Item {
        qr_payload: qr_payload_for(&item_id),
        item_id,
        poster_id: ddb::get_s(item, "poster_id"),
        title: ddb::get_s(item, "title"),
        description: ddb::get_s(item, "description"),
        category: ddb::get_s_opt(item, "category"),
        location: ddb::get_s(item, "location"),
        status: ItemStatus::parse(&ddb::get_s(item, "status")).unwrap_or(ItemStatus::Archived),
        kind: ItemKind::parse(&ddb::get_s(item, "kind")).unwrap_or(ItemKind::Lost),
        date_lost: ddb::get_s_opt(item, "date_lost"),
        date_found: ddb::get_s_opt(item, "date_found"),
        claimed_by: ddb::get_s_opt(item, "claimed_by"),
        image_refs: ddb::get_string_list(item, "image_refs"),
        created_at: ddb::get_s(item, "created_at"),
    }
}

/// Fetch an item record for handlers that need the domain value.
pub async fn fetch_item(
    client: &DynamoClient,
    table_name: &str,
    item_id: &str,
) -> Result<Option<Item>, ApiError> {
    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", attr_s(ITEMS_PK))
        .key("SK", attr_s(item_sk(item_id)))
        .send()
        .await
        .map_err(|e| ApiError::store("get item", e))?;

    Ok(result.item().map(item_from_attrs))
}

/// Transition an item to `claimed` on claim approval. Conditional on the item
/// still being active so the registry's transition table holds even if the
/// item was archived between the claim check and this write.
pub async fn apply_claim_approval(
    client: &DynamoClient,
    table_name: &str,
    item_id: &str,
    claimant_id: &str,
) -> Result<(), ApiError> {
    let result = client
        .update_item()
        .table_name(table_name)
        .key("PK", attr_s(ITEMS_PK))
        .key("SK", attr_s(item_sk(item_id)))
        .condition_expression("#status = :active")
        .update_expression("SET #status = :claimed, claimed_by = :claimant")
        .expression_attribute_names("#status", "status")
        .expression_attribute_values(":active", attr_s(ItemStatus::Active.as_str()))
        .expression_attribute_values(":claimed", attr_s(ItemStatus::Claimed.as_str()))
        .expression_attribute_values(":claimant", attr_s(claimant_id))
        .send()
        .await;

    match result {
        Ok(_) => Ok(()),
        Err(e) => {
            let service_err = e.into_service_error();
            if service_err.is_conditional_check_failed_exception() {
                Err(ApiError::InvalidState("item is no longer active".to_string()))
            } else {
                Err(ApiError::store("update item status", service_err))
            }
        }
    }
}

/// Report a lost or found item.
pub async fn create_item(
    client: &DynamoClient,
    table_name: &str,
    poster_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: CreateItemRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            return ApiError::Validation(format!("invalid request body: {}", e)).into_response()
        }
    };
    let kind = match req.kind() {
        Ok(kind) => kind,
        Err(e) => return e.into_response(),
    };

    // The poster must be a registered campus member with a role that posts.
    let caller = match users::fetch_user(client, table_name, poster_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return ApiError::PermissionDenied("unknown caller".to_string()).into_response()
        }
        Err(e) => return e.into_response(),
    };
    if !caller.role.may_post_items() {
        return ApiError::PermissionDenied(
            "items are posted by students, staff, and teachers".to_string(),
        )
        .into_response();
    }

    let item_id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    let mut put = client
        .put_item()
        .table_name(table_name)
        .item("PK", attr_s(ITEMS_PK))
        .item("SK", attr_s(item_sk(&item_id)))
        .item("poster_id", attr_s(poster_id))
        .item("title", attr_s(req.title.clone()))
        .item("description", attr_s(req.description.clone()))
        .item("location", attr_s(req.location.clone()))
        .item("status", attr_s(ItemStatus::Active.as_str()))
        .item("kind", attr_s(kind.as_str()))
        .item("image_refs", string_list_attr(&req.image_refs))
        .item("created_at", attr_s(now.clone()));
    if let Some(category) = &req.category {
        put = put.item("category", attr_s(category.clone()));
    }
    if let Some(date_lost) = &req.date_lost {
        put = put.item("date_lost", attr_s(date_lost.clone()));
    }
    if let Some(date_found) = &req.date_found {
        put = put.item("date_found", attr_s(date_found.clone()));
    }

    if let Err(e) = put.send().await {
        return ApiError::store("put item", e).into_response();
    }

    let item = Item {
        qr_payload: qr_payload_for(&item_id),
        item_id,
        poster_id: poster_id.to_string(),
        title: req.title,
        description: req.description,
        category: req.category,
        location: req.location,
        status: ItemStatus::Active,
        kind,
        date_lost: req.date_lost,
        date_found: req.date_found,
        claimed_by: None,
        image_refs: req.image_refs,
        created_at: now,
    };
    json_response(StatusCode::CREATED, &item)
}

/// Get a single item.
pub async fn get_item(
    client: &DynamoClient,
    table_name: &str,
    item_id: &str,
) -> Result<Response<Body>, Error> {
    match fetch_item(client, table_name, item_id).await {
        Ok(Some(item)) => json_response(StatusCode::OK, &item),
        Ok(None) => ApiError::NotFound("item".to_string()).into_response(),
        Err(e) => e.into_response(),
    }
}

/// List items, optionally filtered by status and/or kind.
pub async fn list_items(
    client: &DynamoClient,
    table_name: &str,
    status: Option<&str>,
    kind: Option<&str>,
) -> Result<Response<Body>, Error> {
    let result = match client
        .query()
        .table_name(table_name)
        .key_condition_expression("PK = :pk")
        .expression_attribute_values(":pk", attr_s(ITEMS_PK))
        .send()
        .await
    {
        Ok(result) => result,
        Err(e) => return ApiError::store("query items", e).into_response(),
    };

    let status = status.and_then(ItemStatus::parse);
    let kind = kind.and_then(ItemKind::parse);

    let mut items: Vec<Item> = result
        .items()
        .iter()
        .map(item_from_attrs)
        .filter(|item| status.map_or(true, |s| item.status == s))
        .filter(|item| kind.map_or(true, |k| item.kind == k))
        .collect();
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    json_response(StatusCode::OK, &items)
}

/// Poster edit of non-status fields, only while the item is active. Status is
/// never editable here; only admins or the claim engine may move it.
pub async fn update_item(
    client: &DynamoClient,
    table_name: &str,
    caller_id: &str,
    item_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: UpdateItemRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            return ApiError::Validation(format!("invalid request body: {}", e)).into_response()
        }
    };

    let item = match fetch_item(client, table_name, item_id).await {
        Ok(Some(item)) => item,
        Ok(None) => return ApiError::NotFound("item".to_string()).into_response(),
        Err(e) => return e.into_response(),
    };
    if item.poster_id != caller_id {
        return ApiError::PermissionDenied("only the poster can edit this item".to_string())
            .into_response();
    }
    if item.status != ItemStatus::Active {
        return ApiError::InvalidState("only active items can be edited".to_string())
            .into_response();
    }

    let mut update_expr = vec![];
    let mut expr_names = std::collections::HashMap::new();
    let mut expr_values = std::collections::HashMap::new();

    if let Some(title) = req.title {
        update_expr.push("#title = :title");
        expr_names.insert("#title".to_string(), "title".to_string());
        expr_values.insert(":title".to_string(), attr_s(title));
    }
    if let Some(description) = req.description {
        update_expr.push("description = :description");
        expr_values.insert(":description".to_string(), attr_s(description));
    }
    if let Some(category) = req.category {
        update_expr.push("category = :category");
        expr_values.insert(":category".to_string(), attr_s(category));
    }
    if let Some(location) = req.location {
        update_expr.push("#location = :location");
        expr_names.insert("#location".to_string(), "location".to_string());
        expr_values.insert(":location".to_string(), attr_s(location));
    }
    if let Some(image_refs) = req.image_refs {
        update_expr.push("image_refs = :image_refs");
        expr_values.insert(":image_refs".to_string(), string_list_attr(&image_refs));
    }

    if !update_expr.is_empty() {
        let mut builder = client
            .update_item()
            .table_name(table_name)
            .key("PK", attr_s(ITEMS_PK))
            .key("SK", attr_s(item_sk(item_id)))
            .update_expression(format!("SET {}", update_expr.join(", ")));
        for (k, v) in expr_names {
            builder = builder.expression_attribute_names(k, v);
        }
        for (k, v) in expr_values {
            builder = builder.expression_attribute_values(k, v);
        }
        if let Err(e) = builder.send().await {
            return ApiError::store("update item", e).into_response();
        }
    }

    get_item(client, table_name, item_id).await
}

/// Admin escape hatch: set item status directly, bypassing the engine's
/// transition table. Archiving notifies the poster.
pub async fn admin_set_status(
    client: &DynamoClient,
    table_name: &str,
    admin_id: &str,
    item_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: AdminItemStatusRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            return ApiError::Validation(format!("invalid request body: {}", e)).into_response()
        }
    };

    let item = match fetch_item(client, table_name, item_id).await {
        Ok(Some(item)) => item,
        Ok(None) => return ApiError::NotFound("item".to_string()).into_response(),
        Err(e) => return e.into_response(),
    };

    let mut builder = client
        .update_item()
        .table_name(table_name)
        .key("PK", attr_s(ITEMS_PK))
        .key("SK", attr_s(item_sk(item_id)))
        .expression_attribute_names("#status", "status")
        .expression_attribute_values(":status", attr_s(req.status.as_str()));
    // moving an item back to active clears any previous claimant
    if req.status == ItemStatus::Active {
        builder = builder.update_expression("SET #status = :status REMOVE claimed_by");
    } else {
        builder = builder.update_expression("SET #status = :status");
    }
    if let Err(e) = builder.send().await {
        return ApiError::store("update item status", e).into_response();
    }

    if req.status == ItemStatus::Archived && item.status != ItemStatus::Archived {
        notifications::fan_out(
            client,
            table_name,
            NotificationEvent::ItemArchived {
                item_id: item.item_id.clone(),
                item_title: item.title.clone(),
                poster_id: item.poster_id.clone(),
                archived_by: admin_id.to_string(),
            },
            &[],
        )
        .await;
    }

    get_item(client, table_name, item_id).await
}

/// Hard delete. Posters may delete their own item while it is not claimed;
/// admins may delete any item, which notifies the poster. Claims and messages
/// referencing the item are left in place and stay readable.
pub async fn delete_item(
    client: &DynamoClient,
    table_name: &str,
    caller_id: &str,
    item_id: &str,
) -> Result<Response<Body>, Error> {
    let item = match fetch_item(client, table_name, item_id).await {
        Ok(Some(item)) => item,
        Ok(None) => return ApiError::NotFound("item".to_string()).into_response(),
        Err(e) => return e.into_response(),
    };

    let caller = match users::fetch_user(client, table_name, caller_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return ApiError::PermissionDenied("unknown caller".to_string()).into_response()
        }
        Err(e) => return e.into_response(),
    };

    let is_admin = caller.role == Role::Admin;
    if !is_admin {
        if item.poster_id != caller_id {
            return ApiError::PermissionDenied("only the poster or an admin can delete this item".to_string())
                .into_response();
        }
        if item.status == ItemStatus::Claimed {
            return ApiError::InvalidState("claimed items can only be deleted by an admin".to_string())
                .into_response();
        }
    }

    if let Err(e) = client
        .delete_item()
        .table_name(table_name)
        .key("PK", attr_s(ITEMS_PK))
        .key("SK", attr_s(item_sk(item_id)))
        .send()
        .await
    {
        return ApiError::store("delete item", e).into_response();
    }

    // poster deleting their own post gets no notification
    if is_admin && item.poster_id != caller_id {
        notifications::fan_out(
            client,
            table_name,
            NotificationEvent::ItemDeleted {
                item_id: item.item_id.clone(),
                item_title: item.title.clone(),
                poster_id: item.poster_id.clone(),
                deleted_by: caller_id.to_string(),
            },
            &[],
        )
        .await;
    }

    Ok(Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .body(Body::Empty)
        .map_err(Box::new)?)
}
