use campusfound_shared::{claims, items, messages, notifications, s3, users, AppState};
use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, RequestExt, Response,
};
use std::env;
use std::sync::Arc;

/// Main Lambda handler: routes requests to the item registry, claim engine,
/// notification, message and image endpoints.
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let method = event.method().clone();
    let path = event.uri().path().to_string();
    let body = event.body();
    tracing::info!("API invoked - Method: {} Path: {}", method, path);

    // Handle CORS preflight
    if method == Method::OPTIONS {
        return Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Origin", "*")
            .header(
                "Access-Control-Allow-Methods",
                "GET,POST,PUT,PATCH,DELETE,OPTIONS",
            )
            .header(
                "Access-Control-Allow-Headers",
                "Content-Type,Authorization,X-User-Id",
            )
            .body(Body::Empty)
            .map_err(Box::new)?);
    }

    let table_name = env::var("TABLE_NAME").unwrap_or_else(|_| "campusfound".to_string());

    // Caller identity from the JWT validated by API Gateway, with an
    // X-User-Id override for local development.
    let user_id = match caller_id(&event) {
        Some(id) => id,
        None => {
            return Ok(Response::builder()
                .status(StatusCode::UNAUTHORIZED)
                .header("Content-Type", "application/json")
                .header("Access-Control-Allow-Origin", "*")
                .body(
                    serde_json::json!({"error": "Unauthorized", "message": "missing caller identity"})
                        .to_string()
                        .into(),
                )
                .map_err(Box::new)?)
        }
    };

    let dynamo = &state.dynamo_client;
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    // Users
    if path.starts_with("/users") {
        return match (&method, parts.as_slice()) {
            (&Method::POST, ["users"]) => {
                users::create_user(dynamo, &table_name, &user_id, body).await
            }
            (&Method::GET, ["users", "me"]) => {
                users::get_user(dynamo, &table_name, &user_id).await
            }
            (&Method::PATCH, ["users", "me"]) => {
                users::update_user(dynamo, &table_name, &user_id, body).await
            }
            _ => not_found(),
        };
    }

    // Item registry
    if path.starts_with("/items") {
        return match (&method, parts.as_slice()) {
            (&Method::POST, ["items"]) => {
                items::create_item(dynamo, &table_name, &user_id, body).await
            }
            (&Method::GET, ["items"]) => {
                let params = event.query_string_parameters();
                items::list_items(
                    dynamo,
                    &table_name,
                    params.first("status"),
                    params.first("kind"),
                )
                .await
            }
            (&Method::GET, ["items", item_id]) => {
                items::get_item(dynamo, &table_name, item_id).await
            }
            (&Method::PATCH, ["items", item_id]) => {
                items::update_item(dynamo, &table_name, &user_id, item_id, body).await
            }
            (&Method::DELETE, ["items", item_id]) => {
                items::delete_item(dynamo, &table_name, &user_id, item_id).await
            }
            _ => not_found(),
        };
    }

    // Claim lifecycle engine
    if path.starts_with("/claims") {
        return match (&method, parts.as_slice()) {
            (&Method::POST, ["claims"]) => {
                claims::submit_claim(dynamo, &table_name, &user_id, body).await
            }
            (&Method::GET, ["claims"]) => {
                let params = event.query_string_parameters();
                claims::list_claims(
                    dynamo,
                    &table_name,
                    &user_id,
                    params.first("status"),
                    params.first("item_id"),
                )
                .await
            }
            (&Method::GET, ["claims", claim_id]) => {
                claims::get_claim(dynamo, &table_name, &user_id, claim_id).await
            }
            (&Method::PUT, ["claims", claim_id, "status"]) => {
                if let Err(e) = users::require_admin(dynamo, &table_name, &user_id).await {
                    return e.into_response();
                }
                claims::decide_claim(dynamo, &table_name, &user_id, claim_id, body).await
            }
            _ => not_found(),
        };
    }

    // Admin item escape hatch
    if path.starts_with("/admin/items") {
        if let Err(e) = users::require_admin(dynamo, &table_name, &user_id).await {
            return e.into_response();
        }
        return match (&method, parts.as_slice()) {
            (&Method::PUT, ["admin", "items", item_id, "status"]) => {
                items::admin_set_status(dynamo, &table_name, &user_id, item_id, body).await
            }
            (&Method::DELETE, ["admin", "items", item_id]) => {
                items::delete_item(dynamo, &table_name, &user_id, item_id).await
            }
            _ => not_found(),
        };
    }

    // Notifications (own records only)
    if path.starts_with("/notifications") {
        return match (&method, parts.as_slice()) {
            (&Method::GET, ["notifications"]) => {
                notifications::list_notifications(dynamo, &table_name, &user_id).await
            }
            (&Method::PATCH, ["notifications", notification_id, "read"]) => {
                notifications::mark_notification_read(
                    dynamo,
                    &table_name,
                    &user_id,
                    notification_id,
                )
                .await
            }
            _ => not_found(),
        };
    }

    // Messages
    if path.starts_with("/messages") {
        return match (&method, parts.as_slice()) {
            (&Method::POST, ["messages"]) => {
                messages::create_message(dynamo, &table_name, &user_id, body).await
            }
            (&Method::GET, ["messages"]) => {
                messages::list_messages(dynamo, &table_name, &user_id).await
            }
            (&Method::PATCH, ["messages", message_id, "read"]) => {
                messages::mark_message_read(dynamo, &table_name, &user_id, message_id).await
            }
            _ => not_found(),
        };
    }

    // Image blob store
    if path.starts_with("/images") {
        return match (&method, parts.as_slice()) {
            (&Method::POST, ["images"]) => s3::upload_image(&state.s3_client, body).await,
            (&Method::GET, ["images", "signed-url"]) => {
                let params = event.query_string_parameters();
                match params.first("key") {
                    Some(key) => s3::signed_read_url(&state.s3_client, key).await,
                    None => bad_request("missing key query parameter"),
                }
            }
            (&Method::DELETE, ["images"]) => {
                let params = event.query_string_parameters();
                match params.first("key") {
                    Some(key) => s3::delete_object(&state.s3_client, key).await,
                    None => bad_request("missing key query parameter"),
                }
            }
            _ => not_found(),
        };
    }

    tracing::warn!("No route matched - Method: {} Path: {}", method, path);
    not_found()
}

fn caller_id(event: &Request) -> Option<String> {
    event
        .headers()
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .or_else(|| {
            event
                .request_context_ref()
                .and_then(|ctx| ctx.authorizer())
                .and_then(|auth| auth.jwt.as_ref())
                .and_then(|jwt| jwt.claims.get("sub"))
                .map(|s| s.to_string())
        })
}

fn not_found() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::json!({"error": "NotFound", "message": "no such route"}).to_string().into())
        .map_err(Box::new)?)
}

fn bad_request(message: &str) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::BAD_REQUEST)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(
            serde_json::json!({"error": "InvalidRequest", "message": message})
                .to_string()
                .into(),
        )
        .map_err(Box::new)?)
}
