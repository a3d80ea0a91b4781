use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::{http::StatusCode, Body, Error, Response};

use crate::ddb::{self, attr_n, attr_s, Attrs};
use crate::error::{json_response, ApiError};
use crate::types::{CreateUserRequest, Role, UpdateUserRequest, User};

fn user_pk(user_id: &str) -> String {
    format!("USER#{}", user_id)
}

fn role_pk(role: Role) -> String {
    format!("ROLE#{}", role.as_str())
}

fn user_from_item(user_id: &str, item: &Attrs) -> User {
    User {
        user_id: user_id.to_string(),
        name: ddb::get_s(item, "name"),
        email: ddb::get_s(item, "email"),
        phone: ddb::get_s_opt(item, "phone"),
        role: Role::parse(&ddb::get_s(item, "role")).unwrap_or(Role::Student),
        points: ddb::get_n_i64(item, "points"),
        created_at: ddb::get_s(item, "created_at"),
    }
}

/// Fetch a user record, for handlers that need the domain value rather than
/// an HTTP response.
pub async fn fetch_user(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
) -> Result<Option<User>, ApiError> {
    let pk = user_pk(user_id);
    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", attr_s(pk.clone()))
        .key("SK", attr_s(pk))
        .send()
        .await
        .map_err(|e| ApiError::store("get user", e))?;

    Ok(result.item().map(|item| user_from_item(user_id, item)))
}

/// Caller must be an admin; used by the claim decision and item escape-hatch
/// routes.
pub async fn require_admin(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
) -> Result<User, ApiError> {
    match fetch_user(client, table_name, user_id).await? {
        Some(user) if user.role == Role::Admin => Ok(user),
        _ => Err(ApiError::PermissionDenied("admin access required".to_string())),
    }
}

/// Ids of every admin, from the role index partition. Passed explicitly into
/// the notification fan-out so the broadcast set is never implicit.
pub async fn admin_user_ids(
    client: &DynamoClient,
    table_name: &str,
) -> Result<Vec<String>, ApiError> {
    let result = client
        .query()
        .table_name(table_name)
        .key_condition_expression("PK = :pk")
        .expression_attribute_values(":pk", attr_s(role_pk(Role::Admin)))
        .send()
        .await
        .map_err(|e| ApiError::store("query admins", e))?;

    Ok(result
        .items()
        .iter()
        .filter_map(|item| {
            ddb::get_s(item, "SK")
                .strip_prefix("USER#")
                .map(|s| s.to_string())
        })
        .collect())
}

/// Atomic point award. `ADD` increments at the storage layer, so concurrent
/// awards never lose updates.
pub async fn award_points(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    amount: i64,
) -> Result<(), ApiError> {
    let pk = user_pk(user_id);
    client
        .update_item()
        .table_name(table_name)
        .key("PK", attr_s(pk.clone()))
        .key("SK", attr_s(pk))
        .update_expression("ADD points :inc")
        .expression_attribute_values(":inc", attr_n(amount))
        .send()
        .await
        .map_err(|e| ApiError::store("award points", e))?;
    Ok(())
}

async fn put_role_marker(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    role: Role,
) -> Result<(), ApiError> {
    client
        .put_item()
        .table_name(table_name)
        .item("PK", attr_s(role_pk(role)))
        .item("SK", attr_s(user_pk(user_id)))
        .send()
        .await
        .map_err(|e| ApiError::store("put role marker", e))?;
    Ok(())
}

async fn delete_role_marker(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    role: Role,
) -> Result<(), ApiError> {
    client
        .delete_item()
        .table_name(table_name)
        .key("PK", attr_s(role_pk(role)))
        .key("SK", attr_s(user_pk(user_id)))
        .send()
        .await
        .map_err(|e| ApiError::store("delete role marker", e))?;
    Ok(())
}

/// Create the user record after signup. Dual-writes the role index marker so
/// the admin broadcast set can be queried without a scan.
pub async fn create_user(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: CreateUserRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            return ApiError::Validation(format!("invalid request body: {}", e)).into_response()
        }
    };

    let now = chrono::Utc::now().to_rfc3339();
    let pk = user_pk(user_id);

    let mut put = client
        .put_item()
        .table_name(table_name)
        .item("PK", attr_s(pk.clone()))
        .item("SK", attr_s(pk))
        .item("name", attr_s(req.name.clone()))
        .item("email", attr_s(req.email.clone()))
        .item("role", attr_s(req.role.as_str()))
        .item("points", attr_n(0))
        .item("created_at", attr_s(now.clone()));
    if let Some(phone) = &req.phone {
        put = put.item("phone", attr_s(phone.clone()));
    }

    if let Err(e) = put.send().await {
        return ApiError::store("put user", e).into_response();
    }
    if let Err(e) = put_role_marker(client, table_name, user_id, req.role).await {
        return e.into_response();
    }

    let user = User {
        user_id: user_id.to_string(),
        name: req.name,
        email: req.email,
        phone: req.phone,
        role: req.role,
        points: 0,
        created_at: now,
    };
    json_response(StatusCode::CREATED, &user)
}

/// Get the calling user's profile.
pub async fn get_user(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
) -> Result<Response<Body>, Error> {
    match fetch_user(client, table_name, user_id).await {
        Ok(Some(user)) => json_response(StatusCode::OK, &user),
        Ok(None) => ApiError::NotFound("user".to_string()).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Update the calling user's profile. Role changes are admin-only and rewrite
/// the role index marker.
pub async fn update_user(
    client: &DynamoClient,
    table_name: &str,
    caller_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: UpdateUserRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            return ApiError::Validation(format!("invalid request body: {}", e)).into_response()
        }
    };

    let current = match fetch_user(client, table_name, caller_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return ApiError::NotFound("user".to_string()).into_response(),
        Err(e) => return e.into_response(),
    };

    if req.role.is_some() && current.role != Role::Admin {
        return ApiError::PermissionDenied("only admins can change roles".to_string())
            .into_response();
    }

    let pk = user_pk(caller_id);
    let mut update_expr = vec![];
    let mut expr_names = std::collections::HashMap::new();
    let mut expr_values = std::collections::HashMap::new();

    if let Some(name) = req.name {
        update_expr.push("#name = :name");
        expr_names.insert("#name".to_string(), "name".to_string());
        expr_values.insert(":name".to_string(), attr_s(name));
    }
    if let Some(phone) = req.phone {
        update_expr.push("phone = :phone");
        expr_values.insert(":phone".to_string(), attr_s(phone));
    }
    if let Some(role) = req.role {
        update_expr.push("#role = :role");
        expr_names.insert("#role".to_string(), "role".to_string());
        expr_values.insert(":role".to_string(), attr_s(role.as_str()));
    }

    if !update_expr.is_empty() {
        let mut builder = client
            .update_item()
            .table_name(table_name)
            .key("PK", attr_s(pk.clone()))
            .key("SK", attr_s(pk))
            .update_expression(format!("SET {}", update_expr.join(", ")));
        for (k, v) in expr_names {
            builder = builder.expression_attribute_names(k, v);
        }
        for (k, v) in expr_values {
            builder = builder.expression_attribute_values(k, v);
        }
        if let Err(e) = builder.send().await {
            return ApiError::store("update user", e).into_response();
        }
    }

    if let Some(new_role) = req.role {
        if new_role != current.role {
            if let Err(e) = delete_role_marker(client, table_name, caller_id, current.role).await {
                return e.into_response();
            }
            if let Err(e) = put_role_marker(client, table_name, caller_id, new_role).await {
                return e.into_response();
            }
        }
    }

    get_user(client, table_name, caller_id).await
}
