use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Points credited to a claimant when their claim is approved.
pub const APPROVAL_POINT_BONUS: i64 = 20;

// ========== USER ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Staff,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Staff => "staff",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "student" => Some(Role::Student),
            "staff" => Some(Role::Staff),
            "teacher" => Some(Role::Teacher),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    /// Items are posted by campus members; admins mediate claims and manage
    /// the registry but do not post.
    pub fn may_post_items(self) -> bool {
        !matches!(self, Role::Admin)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub points: i64,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    /// Role changes are admin-only; rejected for everyone else.
    pub role: Option<Role>,
}

// ========== ITEM ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Active,
    Claimed,
    Archived,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Active => "active",
            ItemStatus::Claimed => "claimed",
            ItemStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<ItemStatus> {
        match s {
            "active" => Some(ItemStatus::Active),
            "claimed" => Some(ItemStatus::Claimed),
            "archived" => Some(ItemStatus::Archived),
            _ => None,
        }
    }

    /// Transition table consulted by the claim engine and the archive path.
    /// The admin status escape hatch bypasses this on purpose.
    pub fn can_transition(self, to: ItemStatus) -> bool {
        matches!(
            (self, to),
            (ItemStatus::Active, ItemStatus::Claimed) | (ItemStatus::Active, ItemStatus::Archived)
        )
    }
}

/// Whether the item was reported as lost or as found, derived from which
/// date field is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Lost,
    Found,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Lost => "lost",
            ItemKind::Found => "found",
        }
    }

    pub fn parse(s: &str) -> Option<ItemKind> {
        match s {
            "lost" => Some(ItemKind::Lost),
            "found" => Some(ItemKind::Found),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Item {
    pub item_id: String,
    pub poster_id: String,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub location: String,
    pub status: ItemStatus,
    pub kind: ItemKind,
    pub date_lost: Option<String>,
    pub date_found: Option<String>,
    pub claimed_by: Option<String>,
    pub image_refs: Vec<String>,
    /// Derived, non-authoritative. Regenerated from the item id, never trusted
    /// as an identifier on its own.
    pub qr_payload: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub location: String,
    pub date_lost: Option<String>,
    pub date_found: Option<String>,
    #[serde(default)]
    pub image_refs: Vec<String>,
}

impl CreateItemRequest {
    /// Exactly one of date_lost / date_found must be set; the item kind is
    /// derived from which one it is.
    pub fn kind(&self) -> Result<ItemKind, ApiError> {
        match (&self.date_lost, &self.date_found) {
            (Some(_), None) => Ok(ItemKind::Lost),
            (None, Some(_)) => Ok(ItemKind::Found),
            (Some(_), Some(_)) => Err(ApiError::Validation(
                "date_lost and date_found are mutually exclusive".to_string(),
            )),
            (None, None) => Err(ApiError::Validation(
                "one of date_lost or date_found is required".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub image_refs: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct AdminItemStatusRequest {
    pub status: ItemStatus,
}

pub fn qr_payload_for(item_id: &str) -> String {
    format!("campusfound://items/{}", item_id)
}

// ========== CLAIM ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Pending,
    Approved,
    Rejected,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Approved => "approved",
            ClaimStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<ClaimStatus> {
        match s {
            "pending" => Some(ClaimStatus::Pending),
            "approved" => Some(ClaimStatus::Approved),
            "rejected" => Some(ClaimStatus::Rejected),
            _ => None,
        }
    }

    /// Approved and rejected are terminal; no re-review.
    pub fn is_terminal(self) -> bool {
        self != ClaimStatus::Pending
    }

    /// A non-rejected claim blocks the same claimant from re-claiming the item.
    pub fn blocks_resubmission(self) -> bool {
        matches!(self, ClaimStatus::Pending | ClaimStatus::Approved)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claim {
    pub claim_id: String,
    pub item_id: String,
    pub claimant_id: String,
    pub status: ClaimStatus,
    pub proof_description: String,
    pub proof_image_ref: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<String>,
    pub admin_notes: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitClaimRequest {
    pub item_id: String,
    pub proof_description: String,
    pub proof_image_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DecideClaimRequest {
    pub status: ClaimStatus,
    pub admin_notes: Option<String>,
}

/// Claim plus display detail resolved for the review screen.
#[derive(Debug, Serialize)]
pub struct ClaimDetail {
    #[serde(flatten)]
    pub claim: Claim,
    pub item_title: Option<String>,
    pub claimant_name: Option<String>,
    pub reviewer_name: Option<String>,
}

// ========== NOTIFICATION ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    ClaimSubmitted,
    ClaimApproved,
    ClaimRejected,
    ItemClaimed,
    ItemArchived,
    ItemDeleted,
    NewMessage,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::ClaimSubmitted => "claim_submitted",
            NotificationType::ClaimApproved => "claim_approved",
            NotificationType::ClaimRejected => "claim_rejected",
            NotificationType::ItemClaimed => "item_claimed",
            NotificationType::ItemArchived => "item_archived",
            NotificationType::ItemDeleted => "item_deleted",
            NotificationType::NewMessage => "new_message",
        }
    }

    pub fn parse(s: &str) -> Option<NotificationType> {
        match s {
            "claim_submitted" => Some(NotificationType::ClaimSubmitted),
            "claim_approved" => Some(NotificationType::ClaimApproved),
            "claim_rejected" => Some(NotificationType::ClaimRejected),
            "item_claimed" => Some(NotificationType::ItemClaimed),
            "item_archived" => Some(NotificationType::ItemArchived),
            "item_deleted" => Some(NotificationType::ItemDeleted),
            "new_message" => Some(NotificationType::NewMessage),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Notification {
    pub notification_id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub payload: serde_json::Value,
    pub is_read: bool,
    pub created_at: String,
}

// ========== MESSAGE ==========

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Message {
    pub message_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub item_id: Option<String>,
    pub claim_id: Option<String>,
    pub content: String,
    pub is_read: bool,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    pub receiver_id: String,
    pub content: String,
    pub item_id: Option<String>,
    pub claim_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_status_transition_table() {
        assert!(ItemStatus::Active.can_transition(ItemStatus::Claimed));
        assert!(ItemStatus::Active.can_transition(ItemStatus::Archived));

        // claimed and archived are terminal for the engine
        assert!(!ItemStatus::Claimed.can_transition(ItemStatus::Active));
        assert!(!ItemStatus::Claimed.can_transition(ItemStatus::Archived));
        assert!(!ItemStatus::Archived.can_transition(ItemStatus::Active));
        assert!(!ItemStatus::Archived.can_transition(ItemStatus::Claimed));
        assert!(!ItemStatus::Active.can_transition(ItemStatus::Active));
    }

    #[test]
    fn posting_is_open_to_campus_members_not_admins() {
        assert!(Role::Student.may_post_items());
        assert!(Role::Staff.may_post_items());
        assert!(Role::Teacher.may_post_items());
        assert!(!Role::Admin.may_post_items());
    }

    #[test]
    fn claim_status_terminality() {
        assert!(!ClaimStatus::Pending.is_terminal());
        assert!(ClaimStatus::Approved.is_terminal());
        assert!(ClaimStatus::Rejected.is_terminal());

        assert!(ClaimStatus::Pending.blocks_resubmission());
        assert!(ClaimStatus::Approved.blocks_resubmission());
        assert!(!ClaimStatus::Rejected.blocks_resubmission());
    }

    #[test]
    fn item_kind_requires_exactly_one_date() {
        let base = |lost: Option<&str>, found: Option<&str>| CreateItemRequest {
            title: "Black backpack".to_string(),
            description: "Left in the library".to_string(),
            category: None,
            location: "Main library, level 2".to_string(),
            date_lost: lost.map(|s| s.to_string()),
            date_found: found.map(|s| s.to_string()),
            image_refs: vec![],
        };

        assert_eq!(base(Some("2025-03-01"), None).kind().unwrap(), ItemKind::Lost);
        assert_eq!(base(None, Some("2025-03-01")).kind().unwrap(), ItemKind::Found);
        assert!(base(Some("2025-03-01"), Some("2025-03-02")).kind().is_err());
        assert!(base(None, None).kind().is_err());
    }

    #[test]
    fn status_strings_round_trip() {
        for s in [ItemStatus::Active, ItemStatus::Claimed, ItemStatus::Archived] {
            assert_eq!(ItemStatus::parse(s.as_str()), Some(s));
        }
        for s in [ClaimStatus::Pending, ClaimStatus::Approved, ClaimStatus::Rejected] {
            assert_eq!(ClaimStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(ItemStatus::parse("lost"), None);
    }
}
