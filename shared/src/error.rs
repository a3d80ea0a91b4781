use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::Serialize;
use thiserror::Error;

use crate::types::ClaimStatus;

/// Domain errors for the claim lifecycle and item registry. Each variant maps
/// to a stable caller-visible code; none of them are retried internally.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(String),

    /// The target exists but its current status forbids the operation
    /// (e.g. claiming a non-active item).
    #[error("{0}")]
    InvalidState(String),

    /// A poster may not claim their own item.
    #[error("you cannot claim an item you posted")]
    SelfClaim,

    /// The claimant already has a non-rejected claim on this item. Carries the
    /// conflicting claim's status so the client can explain why.
    #[error("you already have a {} claim on this item", .0.as_str())]
    DuplicateClaim(ClaimStatus),

    /// The claim has already left pending; decisions are terminal.
    #[error("claim has already been reviewed")]
    AlreadyReviewed,

    #[error("{0}")]
    PermissionDenied(String),

    /// Malformed or inconsistent request body.
    #[error("{0}")]
    Validation(String),

    /// Data store or blob store failure. Surfaced immediately, never retried
    /// here; the caller may retry.
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    conflicting_status: Option<ClaimStatus>,
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NotFound",
            ApiError::InvalidState(_) => "InvalidState",
            ApiError::SelfClaim => "SelfClaim",
            ApiError::DuplicateClaim(_) => "DuplicateClaim",
            ApiError::AlreadyReviewed => "AlreadyReviewed",
            ApiError::PermissionDenied(_) => "PermissionDenied",
            ApiError::Validation(_) => "InvalidRequest",
            ApiError::Internal(_) => "InternalError",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidState(_) | ApiError::AlreadyReviewed => StatusCode::CONFLICT,
            ApiError::SelfClaim | ApiError::DuplicateClaim(_) => StatusCode::CONFLICT,
            ApiError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn into_response(self) -> Result<Response<Body>, Error> {
        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
            conflicting_status: match &self {
                ApiError::DuplicateClaim(status) => Some(*status),
                _ => None,
            },
        };
        Ok(Response::builder()
            .status(self.status_code())
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(serde_json::to_string(&body)?.into())
            .map_err(Box::new)?)
    }

    pub fn store(context: &str, e: impl std::fmt::Debug) -> ApiError {
        ApiError::Internal(format!("{}: {:?}", context, e))
    }
}

/// Build a JSON success response with the CORS headers every route carries.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(body)?.into())
        .map_err(Box::new)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(ApiError::NotFound("item".into()).code(), "NotFound");
        assert_eq!(ApiError::SelfClaim.code(), "SelfClaim");
        assert_eq!(
            ApiError::DuplicateClaim(ClaimStatus::Pending).code(),
            "DuplicateClaim"
        );
        assert_eq!(ApiError::AlreadyReviewed.code(), "AlreadyReviewed");
        assert_eq!(ApiError::Internal("boom".into()).code(), "InternalError");
    }

    #[test]
    fn duplicate_claim_surfaces_conflicting_status() {
        let err = ApiError::DuplicateClaim(ClaimStatus::Approved);
        assert!(err.to_string().contains("approved"));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn status_code_mapping() {
        assert_eq!(
            ApiError::NotFound("claim".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::PermissionDenied("admin only".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::AlreadyReviewed.status_code(), StatusCode::CONFLICT);
    }
}
