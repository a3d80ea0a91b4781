//! Claim lifecycle engine: submission preconditions, the single admin
//! decision, and the side effects an approval cascades onto the item, the
//! claimant's points, and the notification fan-out.

use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::{http::StatusCode, Body, Error, Response};

use crate::ddb::{self, attr_s, Attrs};
use crate::error::{json_response, ApiError};
use crate::items;
use crate::notifications::{self, NotificationEvent};
use crate::types::{
    Claim, ClaimDetail, ClaimStatus, DecideClaimRequest, Item, ItemStatus, Role,
    SubmitClaimRequest, APPROVAL_POINT_BONUS,
};
use crate::users;

const CLAIMS_PK: &str = "CLAIMS";

fn claim_sk(claim_id: &str) -> String {
    format!("CLAIM#{}", claim_id)
}

fn guard_pk(item_id: &str) -> String {
    format!("ITEM#{}", item_id)
}

fn guard_sk(claimant_id: &str) -> String {
    format!("OPENCLAIM#{}", claimant_id)
}

/// The uniqueness guard for one (item, claimant) pair. Written with an
/// `attribute_not_exists` condition, so two concurrent submissions cannot
/// both produce a pending claim.
#[derive(Debug, Clone)]
pub struct OpenClaimGuard {
    pub claim_id: String,
    pub status: ClaimStatus,
}

fn guard_from_attrs(item: &Attrs) -> OpenClaimGuard {
    OpenClaimGuard {
        claim_id: ddb::get_s(item, "claim_id"),
        status: ClaimStatus::parse(&ddb::get_s(item, "status")).unwrap_or(ClaimStatus::Pending),
    }
}

fn claim_from_attrs(item: &Attrs) -> Claim {
    Claim {
        claim_id: ddb::get_s(item, "SK")
            .strip_prefix("CLAIM#")
            .map(|s| s.to_string())
            .unwrap_or_default(),
        item_id: ddb::get_s(item, "item_id"),
        claimant_id: ddb::get_s(item, "claimant_id"),
        status: ClaimStatus::parse(&ddb::get_s(item, "status")).unwrap_or(ClaimStatus::Pending),
        proof_description: ddb::get_s(item, "proof_description"),
        proof_image_ref: ddb::get_s_opt(item, "proof_image_ref"),
        reviewed_by: ddb::get_s_opt(item, "reviewed_by"),
        reviewed_at: ddb::get_s_opt(item, "reviewed_at"),
        admin_notes: ddb::get_s_opt(item, "admin_notes"),
        created_at: ddb::get_s(item, "created_at"),
    }
}

/// Submission preconditions, checked in order against a snapshot of the item
/// and the claimant's open-claim guard. Self-claims are rejected before the
/// status check so they fail the same way whatever state the item is in.
pub fn check_submission(
    item: &Item,
    claimant_id: &str,
    existing: Option<&OpenClaimGuard>,
) -> Result<(), ApiError> {
    if item.poster_id == claimant_id {
        return Err(ApiError::SelfClaim);
    }
    // an item is claimable exactly when the registry would let an approval
    // move it to claimed
    if !item.status.can_transition(ItemStatus::Claimed) {
        return Err(ApiError::InvalidState("item is not claimable".to_string()));
    }
    if let Some(guard) = existing {
        if guard.status.blocks_resubmission() {
            return Err(ApiError::DuplicateClaim(guard.status));
        }
    }
    Ok(())
}

/// A claim may only be decided once; any status other than pending is
/// terminal.
pub fn check_decision(current: ClaimStatus, requested: ClaimStatus) -> Result<(), ApiError> {
    if requested == ClaimStatus::Pending {
        return Err(ApiError::Validation(
            "status must be approved or rejected".to_string(),
        ));
    }
    if current.is_terminal() {
        return Err(ApiError::AlreadyReviewed);
    }
    Ok(())
}

/// A single claim is readable by the claimant, the item's poster, or an
/// admin. The list endpoint stays scoped to own-claims-unless-admin; poster
/// visibility only applies to direct reads.
pub fn check_claim_access(
    claim: &Claim,
    caller_id: &str,
    caller_is_admin: bool,
    item_poster_id: Option<&str>,
) -> Result<(), ApiError> {
    if claim.claimant_id == caller_id || caller_is_admin || item_poster_id == Some(caller_id) {
        return Ok(());
    }
    Err(ApiError::PermissionDenied(
        "claims are only visible to the claimant, the item's poster, or an admin".to_string(),
    ))
}

/// The writes an approval must cascade: the item transition and the fixed
/// point bonus. Rejections have no item or point side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalEffects {
    pub item_id: String,
    pub item_status: ItemStatus,
    pub claimed_by: String,
    pub point_award: i64,
}

pub fn decision_effects(claim: &Claim, decision: ClaimStatus) -> Option<ApprovalEffects> {
    match decision {
        ClaimStatus::Approved => Some(ApprovalEffects {
            item_id: claim.item_id.clone(),
            item_status: ItemStatus::Claimed,
            claimed_by: claim.claimant_id.clone(),
            point_award: APPROVAL_POINT_BONUS,
        }),
        ClaimStatus::Rejected | ClaimStatus::Pending => None,
    }
}

/// Reconcile a guard record against the claim it points at. A guard left
/// behind by a rejection whose cleanup delete failed must not block the
/// claimant forever; a guard whose claim record cannot be read stays in
/// force, since a concurrent submission sits in exactly that window between
/// its guard put and its claim put.
pub fn reconcile_guard(
    guard: Option<OpenClaimGuard>,
    referenced: Option<&Claim>,
) -> Option<OpenClaimGuard> {
    let guard = guard?;
    match referenced {
        Some(claim) if claim.status == ClaimStatus::Rejected => None,
        Some(claim) => Some(OpenClaimGuard {
            status: claim.status,
            ..guard
        }),
        None => Some(guard),
    }
}

/// Error to report after losing the guard put and re-reading the guard. If
/// the guard vanished in between (a rejection landed), there is no duplicate
/// to report; the contention is surfaced as an internal error instead of a
/// fabricated conflict.
fn guard_conflict(refetched: Option<OpenClaimGuard>) -> ApiError {
    match refetched {
        Some(guard) => ApiError::DuplicateClaim(guard.status),
        None => ApiError::Internal("open-claim guard contention, retry submission".to_string()),
    }
}

async fn fetch_guard(
    client: &DynamoClient,
    table_name: &str,
    item_id: &str,
    claimant_id: &str,
) -> Result<Option<OpenClaimGuard>, ApiError> {
    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", attr_s(guard_pk(item_id)))
        .key("SK", attr_s(guard_sk(claimant_id)))
        .send()
        .await
        .map_err(|e| ApiError::store("get open-claim guard", e))?;
    Ok(result.item().map(guard_from_attrs))
}

/// Conditional guard put. `Ok(false)` means another guard for the same
/// (item, claimant) pair already exists.
async fn put_guard(
    client: &DynamoClient,
    table_name: &str,
    item_id: &str,
    claimant_id: &str,
    claim_id: &str,
    now: &str,
) -> Result<bool, ApiError> {
    let result = client
        .put_item()
        .table_name(table_name)
        .item("PK", attr_s(guard_pk(item_id)))
        .item("SK", attr_s(guard_sk(claimant_id)))
        .item("claim_id", attr_s(claim_id))
        .item("status", attr_s(ClaimStatus::Pending.as_str()))
        .item("created_at", attr_s(now))
        .condition_expression("attribute_not_exists(PK)")
        .send()
        .await;
    match result {
        Ok(_) => Ok(true),
        Err(e) => {
            let service_err = e.into_service_error();
            if service_err.is_conditional_check_failed_exception() {
                Ok(false)
            } else {
                Err(ApiError::store("put open-claim guard", service_err))
            }
        }
    }
}

async fn delete_guard(
    client: &DynamoClient,
    table_name: &str,
    item_id: &str,
    claimant_id: &str,
) -> Result<(), ApiError> {
    client
        .delete_item()
        .table_name(table_name)
        .key("PK", attr_s(guard_pk(item_id)))
        .key("SK", attr_s(guard_sk(claimant_id)))
        .send()
        .await
        .map_err(|e| ApiError::store("delete open-claim guard", e))?;
    Ok(())
}

pub async fn fetch_claim(
    client: &DynamoClient,
    table_name: &str,
    claim_id: &str,
) -> Result<Option<Claim>, ApiError> {
    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", attr_s(CLAIMS_PK))
        .key("SK", attr_s(claim_sk(claim_id)))
        .send()
        .await
        .map_err(|e| ApiError::store("get claim", e))?;
    Ok(result.item().map(claim_from_attrs))
}

async fn submit_claim_inner(
    client: &DynamoClient,
    table_name: &str,
    claimant_id: &str,
    req: &SubmitClaimRequest,
) -> Result<(Claim, Item), ApiError> {
    let item = items::fetch_item(client, table_name, &req.item_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("item".to_string()))?;

    // A guard orphaned by a rejection whose cleanup delete failed is dropped
    // here; anything else stays in force.
    let existing = match fetch_guard(client, table_name, &req.item_id, claimant_id).await? {
        Some(guard) => {
            let referenced = fetch_claim(client, table_name, &guard.claim_id).await?;
            let reconciled = reconcile_guard(Some(guard), referenced.as_ref());
            if reconciled.is_none() {
                delete_guard(client, table_name, &req.item_id, claimant_id).await?;
            }
            reconciled
        }
        None => None,
    };
    check_submission(&item, claimant_id, existing.as_ref())?;

    let claim_id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    // The guard put is conditional, so a concurrent submission by the same
    // claimant loses here instead of producing a second pending claim.
    let mut placed = put_guard(client, table_name, &req.item_id, claimant_id, &claim_id, &now).await?;
    if !placed {
        match fetch_guard(client, table_name, &req.item_id, claimant_id).await? {
            Some(guard) => return Err(ApiError::DuplicateClaim(guard.status)),
            // the competing guard was already released (a rejection landed
            // in between); try once more before reporting contention
            None => {
                placed =
                    put_guard(client, table_name, &req.item_id, claimant_id, &claim_id, &now)
                        .await?;
            }
        }
    }
    if !placed {
        return Err(guard_conflict(
            fetch_guard(client, table_name, &req.item_id, claimant_id).await?,
        ));
    }

    let mut put = client
        .put_item()
        .table_name(table_name)
        .item("PK", attr_s(CLAIMS_PK))
        .item("SK", attr_s(claim_sk(&claim_id)))
        .item("item_id", attr_s(req.item_id.clone()))
        .item("claimant_id", attr_s(claimant_id))
        .item("status", attr_s(ClaimStatus::Pending.as_str()))
        .item("proof_description", attr_s(req.proof_description.clone()))
        .item("created_at", attr_s(now.clone()));
    if let Some(proof_image_ref) = &req.proof_image_ref {
        put = put.item("proof_image_ref", attr_s(proof_image_ref.clone()));
    }
    if let Err(e) = put.send().await {
        // release the guard so the claimant is not locked out by a half
        // committed submission
        let _ = delete_guard(client, table_name, &req.item_id, claimant_id).await;
        return Err(ApiError::store("put claim", e));
    }

    let claim = Claim {
        claim_id,
        item_id: req.item_id.clone(),
        claimant_id: claimant_id.to_string(),
        status: ClaimStatus::Pending,
        proof_description: req.proof_description.clone(),
        proof_image_ref: req.proof_image_ref.clone(),
        reviewed_by: None,
        reviewed_at: None,
        admin_notes: None,
        created_at: now,
    };
    Ok((claim, item))
}

/// Submit a claim of ownership against an active item.
pub async fn submit_claim(
    client: &DynamoClient,
    table_name: &str,
    claimant_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: SubmitClaimRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            return ApiError::Validation(format!("invalid request body: {}", e)).into_response()
        }
    };

    let (claim, item) = match submit_claim_inner(client, table_name, claimant_id, &req).await {
        Ok(created) => created,
        Err(e) => return e.into_response(),
    };

    // Fan-out is fire-and-forget; an admin lookup failure only shrinks the
    // broadcast, it never fails the submission.
    let admin_ids = match users::admin_user_ids(client, table_name).await {
        Ok(ids) => ids,
        Err(e) => {
            tracing::error!("failed to query admin ids for claim broadcast: {}", e);
            vec![]
        }
    };
    let claimant_name = users::fetch_user(client, table_name, claimant_id)
        .await
        .ok()
        .flatten()
        .map(|u| u.name)
        .unwrap_or_else(|| claimant_id.to_string());
    notifications::fan_out(
        client,
        table_name,
        NotificationEvent::ClaimSubmitted {
            item_id: item.item_id.clone(),
            item_title: item.title.clone(),
            claim_id: claim.claim_id.clone(),
            claimant_id: claimant_id.to_string(),
            claimant_name,
            poster_id: item.poster_id.clone(),
        },
        &admin_ids,
    )
    .await;

    json_response(StatusCode::CREATED, &claim)
}

async fn decide_claim_inner(
    client: &DynamoClient,
    table_name: &str,
    admin_id: &str,
    claim_id: &str,
    req: &DecideClaimRequest,
) -> Result<Claim, ApiError> {
    let claim = fetch_claim(client, table_name, claim_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("claim".to_string()))?;
    check_decision(claim.status, req.status)?;

    let now = chrono::Utc::now().to_rfc3339();

    // Conditional on the claim still being pending: of two concurrent
    // decisions the first writer wins and the second sees AlreadyReviewed.
    let mut update = client
        .update_item()
        .table_name(table_name)
        .key("PK", attr_s(CLAIMS_PK))
        .key("SK", attr_s(claim_sk(claim_id)))
        .condition_expression("#status = :pending")
        .expression_attribute_names("#status", "status")
        .expression_attribute_values(":pending", attr_s(ClaimStatus::Pending.as_str()))
        .expression_attribute_values(":status", attr_s(req.status.as_str()))
        .expression_attribute_values(":reviewed_by", attr_s(admin_id))
        .expression_attribute_values(":reviewed_at", attr_s(now.clone()));
    if let Some(notes) = &req.admin_notes {
        update = update
            .update_expression(
                "SET #status = :status, reviewed_by = :reviewed_by, reviewed_at = :reviewed_at, admin_notes = :notes",
            )
            .expression_attribute_values(":notes", attr_s(notes.clone()));
    } else {
        update = update.update_expression(
            "SET #status = :status, reviewed_by = :reviewed_by, reviewed_at = :reviewed_at",
        );
    }
    if let Err(e) = update.send().await {
        let service_err = e.into_service_error();
        if service_err.is_conditional_check_failed_exception() {
            return Err(ApiError::AlreadyReviewed);
        }
        return Err(ApiError::store("update claim", service_err));
    }

    match decision_effects(&claim, req.status) {
        Some(effects) => {
            // Item transition and guard update come after the claim write.
            // These are sequential, non-transactional calls: a failure here
            // leaves the claim approved and is surfaced, not rolled back.
            items::apply_claim_approval(client, table_name, &effects.item_id, &effects.claimed_by)
                .await?;
            client
                .update_item()
                .table_name(table_name)
                .key("PK", attr_s(guard_pk(&claim.item_id)))
                .key("SK", attr_s(guard_sk(&claim.claimant_id)))
                .update_expression("SET #status = :approved")
                .expression_attribute_names("#status", "status")
                .expression_attribute_values(":approved", attr_s(ClaimStatus::Approved.as_str()))
                .send()
                .await
                .map_err(|e| ApiError::store("update open-claim guard", e))?;

            // Point award is best-effort by design: if it fails the claim
            // stays approved and the miss is only logged.
            if let Err(e) =
                users::award_points(client, table_name, &claim.claimant_id, effects.point_award)
                    .await
            {
                tracing::error!(
                    "point award failed for claimant {} on claim {}: {}",
                    claim.claimant_id,
                    claim_id,
                    e
                );
            }
        }
        None => {
            // Rejection: releasing the guard lets the claimant try again
            // with better proof. The claim is already rejected, so a failed
            // delete only leaves a stale guard that the next submission
            // reconciles away.
            if let Err(e) = delete_guard(client, table_name, &claim.item_id, &claim.claimant_id)
                .await
            {
                tracing::error!(
                    "failed to release open-claim guard for claim {}: {}",
                    claim_id,
                    e
                );
            }
        }
    }

    Ok(Claim {
        status: req.status,
        reviewed_by: Some(admin_id.to_string()),
        reviewed_at: Some(now),
        admin_notes: req.admin_notes.clone(),
        ..claim
    })
}

/// Admin decision on a pending claim. Approval cascades onto the item, the
/// claimant's points, and the fan-out; rejection releases the claimant's
/// guard so they may resubmit.
pub async fn decide_claim(
    client: &DynamoClient,
    table_name: &str,
    admin_id: &str,
    claim_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: DecideClaimRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            return ApiError::Validation(format!("invalid request body: {}", e)).into_response()
        }
    };

    let claim = match decide_claim_inner(client, table_name, admin_id, claim_id, &req).await {
        Ok(claim) => claim,
        Err(e) => return e.into_response(),
    };

    let item = items::fetch_item(client, table_name, &claim.item_id)
        .await
        .ok()
        .flatten();
    let item_title = item.as_ref().map(|i| i.title.clone());

    // The claimant is always told of the outcome, even if the item has been
    // deleted since; the poster copy is only generated for approvals, where
    // the item is guaranteed to still exist.
    notifications::fan_out(
        client,
        table_name,
        NotificationEvent::ClaimDecided {
            item_id: claim.item_id.clone(),
            item_title: item_title.clone().unwrap_or_default(),
            claim_id: claim.claim_id.clone(),
            claimant_id: claim.claimant_id.clone(),
            poster_id: item.as_ref().map(|i| i.poster_id.clone()).unwrap_or_default(),
            approved: claim.status == ClaimStatus::Approved,
            decided_by: admin_id.to_string(),
        },
        &[],
    )
    .await;

    let claimant_name = users::fetch_user(client, table_name, &claim.claimant_id)
        .await
        .ok()
        .flatten()
        .map(|u| u.name);
    let reviewer_name = users::fetch_user(client, table_name, admin_id)
        .await
        .ok()
        .flatten()
        .map(|u| u.name);

    let detail = ClaimDetail {
        claim,
        item_title,
        claimant_name,
        reviewer_name,
    };
    json_response(StatusCode::OK, &detail)
}

/// Get a single claim. Readable by the claimant, the item's poster, or an
/// admin.
pub async fn get_claim(
    client: &DynamoClient,
    table_name: &str,
    caller_id: &str,
    claim_id: &str,
) -> Result<Response<Body>, Error> {
    let claim = match fetch_claim(client, table_name, claim_id).await {
        Ok(Some(claim)) => claim,
        Ok(None) => return ApiError::NotFound("claim".to_string()).into_response(),
        Err(e) => return e.into_response(),
    };

    if claim.claimant_id != caller_id {
        let caller = match users::fetch_user(client, table_name, caller_id).await {
            Ok(user) => user,
            Err(e) => return e.into_response(),
        };
        let is_admin = caller.map(|u| u.role == Role::Admin).unwrap_or(false);
        let poster_id = if is_admin {
            None
        } else {
            match items::fetch_item(client, table_name, &claim.item_id).await {
                Ok(item) => item.map(|i| i.poster_id),
                Err(e) => return e.into_response(),
            }
        };
        if let Err(e) = check_claim_access(&claim, caller_id, is_admin, poster_id.as_deref()) {
            return e.into_response();
        }
    }

    json_response(StatusCode::OK, &claim)
}

/// List claims: admins see everything, everyone else sees their own. Posters
/// get single-claim reads via `get_claim`, not a listing. Optional `status`
/// and `item_id` filters.
pub async fn list_claims(
    client: &DynamoClient,
    table_name: &str,
    caller_id: &str,
    status: Option<&str>,
    item_id: Option<&str>,
) -> Result<Response<Body>, Error> {
    let caller = match users::fetch_user(client, table_name, caller_id).await {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };
    let is_admin = caller.map(|u| u.role == Role::Admin).unwrap_or(false);

    let result = match client
        .query()
        .table_name(table_name)
        .key_condition_expression("PK = :pk")
        .expression_attribute_values(":pk", attr_s(CLAIMS_PK))
        .send()
        .await
    {
        Ok(result) => result,
        Err(e) => return ApiError::store("query claims", e).into_response(),
    };

    let status = status.and_then(ClaimStatus::parse);
    let mut claims: Vec<Claim> = result
        .items()
        .iter()
        .map(claim_from_attrs)
        .filter(|c| is_admin || c.claimant_id == caller_id)
        .filter(|c| status.map_or(true, |s| c.status == s))
        .filter(|c| item_id.map_or(true, |id| c.item_id == id))
        .collect();
    claims.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    json_response(StatusCode::OK, &claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{qr_payload_for, ItemKind};

    fn item(status: ItemStatus) -> Item {
        Item {
            item_id: "item-1".to_string(),
            poster_id: "user-p".to_string(),
            title: "Black backpack".to_string(),
            description: "Left in the library".to_string(),
            category: None,
            location: "Main library".to_string(),
            status,
            kind: ItemKind::Found,
            date_lost: None,
            date_found: Some("2025-03-01".to_string()),
            claimed_by: None,
            image_refs: vec![],
            qr_payload: qr_payload_for("item-1"),
            created_at: "2025-03-01T09:00:00Z".to_string(),
        }
    }

    fn guard(status: ClaimStatus) -> OpenClaimGuard {
        OpenClaimGuard {
            claim_id: "claim-0".to_string(),
            status,
        }
    }

    fn claim(status: ClaimStatus) -> Claim {
        Claim {
            claim_id: "claim-0".to_string(),
            item_id: "item-1".to_string(),
            claimant_id: "user-x".to_string(),
            status,
            proof_description: "It has my initials on the strap".to_string(),
            proof_image_ref: None,
            reviewed_by: None,
            reviewed_at: None,
            admin_notes: None,
            created_at: "2025-03-02T10:00:00Z".to_string(),
        }
    }

    #[test]
    fn submission_succeeds_on_active_item_without_prior_claim() {
        assert!(check_submission(&item(ItemStatus::Active), "user-x", None).is_ok());
    }

    #[test]
    fn self_claim_rejected_regardless_of_item_status() {
        for status in [ItemStatus::Active, ItemStatus::Claimed, ItemStatus::Archived] {
            let err = check_submission(&item(status), "user-p", None).unwrap_err();
            assert!(matches!(err, ApiError::SelfClaim));
        }
    }

    #[test]
    fn non_active_item_is_not_claimable() {
        for status in [ItemStatus::Claimed, ItemStatus::Archived] {
            let err = check_submission(&item(status), "user-x", None).unwrap_err();
            assert!(matches!(err, ApiError::InvalidState(_)));
        }
    }

    #[test]
    fn pending_or_approved_guard_blocks_resubmission() {
        for status in [ClaimStatus::Pending, ClaimStatus::Approved] {
            let err = check_submission(&item(ItemStatus::Active), "user-x", Some(&guard(status)))
                .unwrap_err();
            match err {
                ApiError::DuplicateClaim(conflicting) => assert_eq!(conflicting, status),
                other => panic!("expected DuplicateClaim, got {:?}", other),
            }
        }
    }

    #[test]
    fn rejected_guard_allows_resubmission() {
        // a rejected claim's guard is deleted; a stale rejected guard must
        // still not block
        assert!(check_submission(
            &item(ItemStatus::Active),
            "user-x",
            Some(&guard(ClaimStatus::Rejected))
        )
        .is_ok());
    }

    #[test]
    fn decisions_are_terminal() {
        assert!(check_decision(ClaimStatus::Pending, ClaimStatus::Approved).is_ok());
        assert!(check_decision(ClaimStatus::Pending, ClaimStatus::Rejected).is_ok());

        for current in [ClaimStatus::Approved, ClaimStatus::Rejected] {
            for requested in [ClaimStatus::Approved, ClaimStatus::Rejected] {
                let err = check_decision(current, requested).unwrap_err();
                assert!(matches!(err, ApiError::AlreadyReviewed));
            }
        }
    }

    #[test]
    fn pending_is_not_a_valid_decision() {
        let err = check_decision(ClaimStatus::Pending, ClaimStatus::Pending).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn claim_readable_by_claimant_poster_and_admin() {
        let c = claim(ClaimStatus::Pending);
        assert!(check_claim_access(&c, "user-x", false, Some("user-p")).is_ok());
        assert!(check_claim_access(&c, "user-p", false, Some("user-p")).is_ok());
        assert!(check_claim_access(&c, "admin-1", true, None).is_ok());

        let err = check_claim_access(&c, "user-z", false, Some("user-p")).unwrap_err();
        assert!(matches!(err, ApiError::PermissionDenied(_)));
    }

    #[test]
    fn approval_couples_item_transition_to_fixed_bonus() {
        let pending = claim(ClaimStatus::Pending);
        let effects =
            decision_effects(&pending, ClaimStatus::Approved).expect("approval has side effects");
        assert_eq!(effects.item_id, pending.item_id);
        assert_eq!(effects.item_status, ItemStatus::Claimed);
        assert_eq!(effects.claimed_by, pending.claimant_id);
        assert_eq!(effects.point_award, 20);
        assert_eq!(effects.point_award, APPROVAL_POINT_BONUS);
    }

    #[test]
    fn rejection_has_no_item_or_point_effects() {
        assert!(decision_effects(&claim(ClaimStatus::Pending), ClaimStatus::Rejected).is_none());
    }

    #[test]
    fn full_claim_round_trip_invariants() {
        let it = item(ItemStatus::Active);
        assert!(check_submission(&it, "user-x", None).is_ok());

        let pending = claim(ClaimStatus::Pending);
        assert!(check_decision(pending.status, ClaimStatus::Approved).is_ok());
        let effects = decision_effects(&pending, ClaimStatus::Approved).unwrap();
        assert!(it.status.can_transition(effects.item_status));
        assert_eq!(effects.claimed_by, pending.claimant_id);
        assert_eq!(effects.point_award, APPROVAL_POINT_BONUS);

        // the decision is one-shot: a follow-up rejection bounces
        assert!(matches!(
            check_decision(ClaimStatus::Approved, ClaimStatus::Rejected),
            Err(ApiError::AlreadyReviewed)
        ));
    }

    #[test]
    fn guard_orphaned_by_failed_rejection_cleanup_is_dropped() {
        let rejected = claim(ClaimStatus::Rejected);
        let reconciled = reconcile_guard(Some(guard(ClaimStatus::Pending)), Some(&rejected));
        assert!(reconciled.is_none());

        // with the stale guard gone, resubmission passes the preconditions
        assert!(check_submission(&item(ItemStatus::Active), "user-x", reconciled.as_ref()).is_ok());
    }

    #[test]
    fn guard_with_live_claim_stays_in_force() {
        let approved = claim(ClaimStatus::Approved);
        let reconciled = reconcile_guard(Some(guard(ClaimStatus::Pending)), Some(&approved));
        assert_eq!(reconciled.map(|g| g.status), Some(ClaimStatus::Approved));

        // no claim record readable yet: a concurrent submission sits in that
        // window between its guard put and its claim put, so the guard keeps
        // blocking
        let kept = reconcile_guard(Some(guard(ClaimStatus::Pending)), None);
        assert_eq!(kept.map(|g| g.status), Some(ClaimStatus::Pending));
    }

    #[test]
    fn lost_guard_race_with_no_survivor_is_not_a_duplicate() {
        assert!(matches!(guard_conflict(None), ApiError::Internal(_)));
        match guard_conflict(Some(guard(ClaimStatus::Approved))) {
            ApiError::DuplicateClaim(status) => assert_eq!(status, ClaimStatus::Approved),
            other => panic!("expected DuplicateClaim, got {:?}", other),
        }
    }
}
