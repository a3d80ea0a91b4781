use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use lambda_http::{http::StatusCode, Body, Error, Response};
use std::env;

use crate::error::{json_response, ApiError};

const SIGNED_URL_TTL_SECS: u64 = 3600;

pub fn bucket_name() -> String {
    env::var("BUCKET_NAME").unwrap_or_else(|_| "campusfound".to_string())
}

#[derive(serde::Deserialize)]
pub struct UploadImageRequest {
    /// Exactly one of item_id / claim_id decides the key layout.
    pub item_id: Option<String>,
    pub claim_id: Option<String>,
    pub file_name: String,
    pub content_type: String,
    pub file_data: String, // base64 encoded
}

#[derive(serde::Serialize)]
pub struct UploadImageResponse {
    pub image_ref: String,
    pub url: String,
}

fn object_key(req: &UploadImageRequest, image_id: &str) -> Result<String, ApiError> {
    let extension = req.file_name.split('.').next_back().unwrap_or("jpg");
    match (&req.item_id, &req.claim_id) {
        (Some(item_id), None) => Ok(format!("items/{}/{}.{}", item_id, image_id, extension)),
        (None, Some(claim_id)) => Ok(format!("claims/{}/proof.{}", claim_id, extension)),
        _ => Err(ApiError::Validation(
            "exactly one of item_id or claim_id is required".to_string(),
        )),
    }
}

/// Upload an item photo or claim proof image and return its storage key.
pub async fn upload_image(
    s3_client: &S3Client,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: UploadImageRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            return ApiError::Validation(format!("invalid request body: {}", e)).into_response()
        }
    };

    let image_id = uuid::Uuid::new_v4().to_string();
    let key = match object_key(&req, &image_id) {
        Ok(key) => key,
        Err(e) => return e.into_response(),
    };

    use base64::Engine;
    let file_bytes = match base64::engine::general_purpose::STANDARD.decode(&req.file_data) {
        Ok(bytes) => bytes,
        Err(e) => {
            return ApiError::Validation(format!("failed to decode base64: {}", e))
                .into_response()
        }
    };

    let bucket = bucket_name();
    if let Err(e) = s3_client
        .put_object()
        .bucket(&bucket)
        .key(&key)
        .body(ByteStream::from(file_bytes))
        .content_type(&req.content_type)
        .send()
        .await
    {
        return ApiError::store("upload to s3", e).into_response();
    }

    let response = UploadImageResponse {
        image_ref: key.clone(),
        url: format!("https://{}.s3.amazonaws.com/{}", bucket, key),
    };
    json_response(StatusCode::CREATED, &response)
}

/// Time-limited signed read URL for a private object (claim proof images are
/// not public).
pub async fn signed_read_url(
    s3_client: &S3Client,
    key: &str,
) -> Result<Response<Body>, Error> {
    let presigning = match aws_sdk_s3::presigning::PresigningConfig::expires_in(
        std::time::Duration::from_secs(SIGNED_URL_TTL_SECS),
    ) {
        Ok(config) => config,
        Err(e) => return ApiError::store("presigning config", e).into_response(),
    };

    let presigned = match s3_client
        .get_object()
        .bucket(bucket_name())
        .key(key)
        .presigned(presigning)
        .await
    {
        Ok(presigned) => presigned,
        Err(e) => return ApiError::store("presign get", e).into_response(),
    };

    json_response(
        StatusCode::OK,
        &serde_json::json!({
            "url": presigned.uri().to_string(),
            "expires_in": SIGNED_URL_TTL_SECS,
        }),
    )
}

/// Remove an uploaded object.
pub async fn delete_object(s3_client: &S3Client, key: &str) -> Result<Response<Body>, Error> {
    if let Err(e) = s3_client
        .delete_object()
        .bucket(bucket_name())
        .key(key)
        .send()
        .await
    {
        return ApiError::store("delete from s3", e).into_response();
    }
    Ok(Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .body(Body::Empty)
        .map_err(Box::new)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(item_id: Option<&str>, claim_id: Option<&str>) -> UploadImageRequest {
        UploadImageRequest {
            item_id: item_id.map(|s| s.to_string()),
            claim_id: claim_id.map(|s| s.to_string()),
            file_name: "photo.png".to_string(),
            content_type: "image/png".to_string(),
            file_data: String::new(),
        }
    }

    #[test]
    fn item_and_claim_keys() {
        assert_eq!(
            object_key(&req(Some("item-1"), None), "img-1").unwrap(),
            "items/item-1/img-1.png"
        );
        assert_eq!(
            object_key(&req(None, Some("claim-1")), "img-1").unwrap(),
            "claims/claim-1/proof.png"
        );
    }

    #[test]
    fn exactly_one_target_required() {
        assert!(object_key(&req(None, None), "img-1").is_err());
        assert!(object_key(&req(Some("item-1"), Some("claim-1")), "img-1").is_err());
    }
}
