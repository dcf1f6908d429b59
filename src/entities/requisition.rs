use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Requisition header: one row per stock request, carrying the dispatch
/// number, the approval chain, and the audit trail of every transition.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "requisitions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Human-facing document number, `REQ-<year>-<seq>`. Assigned exactly
    /// once at submission, never mutated.
    #[sea_orm(unique)]
    pub dispatch_number: String,

    pub request_date: DateTime<Utc>,
    pub department: String,
    pub requested_by: String,
    pub requester_email: String,
    pub comments: Option<String>,

    pub status: RequisitionStatus,

    /// Department head resolved at submission.
    pub approver1: String,
    /// Second-tier approver role, fixed to "Finance Manager".
    pub approver2: String,

    pub confirmed_by: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,

    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approval_comments: Option<String>,

    pub rejected_by: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub rejection_stage: Option<String>,

    pub issued_by: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub issue_notes: Option<String>,

    pub driver_received_by: Option<String>,
    pub driver_received_at: Option<DateTime<Utc>>,
    pub driver_signature: Option<String>,
    pub driver_notes: Option<String>,

    pub final_received_by: Option<String>,
    pub final_received_at: Option<DateTime<Utc>>,
    pub final_signature: Option<String>,
    pub final_receipt_method: Option<FinalReceiptMethod>,
    pub final_notes: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::requisition_item::Entity")]
    RequisitionItem,
    #[sea_orm(has_many = "super::issued_item::Entity")]
    IssuedItem,
}

impl Related<super::requisition_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RequisitionItem.def()
    }
}

impl Related<super::issued_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::IssuedItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Lifecycle status. The only place allowed to produce a new status value is
/// [`RequisitionStatus::apply`]; services never assign statuses directly.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum RequisitionStatus {
    #[sea_orm(string_value = "Pending")]
    Pending,
    #[sea_orm(string_value = "Confirmed")]
    Confirmed,
    #[sea_orm(string_value = "Approved")]
    Approved,
    #[sea_orm(string_value = "Issued")]
    Issued,
    #[sea_orm(string_value = "Delivered")]
    Delivered,
    #[sea_orm(string_value = "Completed")]
    Completed,
    #[sea_orm(string_value = "Rejected")]
    Rejected,
}

/// Events accepted by the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum TransitionEvent {
    Confirm,
    Approve,
    Reject,
    /// Issuance handed to a driver; handover confirmation still pending.
    IssueToDriver,
    /// Issuance received directly by the requester; skips handover.
    IssueDirect,
    ConfirmHandover,
    ConfirmFinalReceipt,
}

impl RequisitionStatus {
    /// Status every requisition is created in.
    pub fn initial() -> Self {
        Self::Pending
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Completed)
    }

    /// The single transition table. Returns the successor status, or `None`
    /// when the event is not legal from `self`.
    pub fn apply(self, event: TransitionEvent) -> Option<Self> {
        use RequisitionStatus::*;
        use TransitionEvent::*;

        match (self, event) {
            (Pending, Confirm) => Some(Confirmed),
            (Pending, Reject) | (Confirmed, Reject) => Some(Rejected),
            (Confirmed, Approve) => Some(Approved),
            (Approved, IssueToDriver) => Some(Issued),
            (Approved, IssueDirect) => Some(Delivered),
            (Issued, ConfirmHandover) => Some(Delivered),
            (Delivered, ConfirmFinalReceipt) => Some(Completed),
            _ => None,
        }
    }
}

/// How the final receipt was captured.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum FinalReceiptMethod {
    #[sea_orm(string_value = "qr_scan")]
    QrScan,
    #[sea_orm(string_value = "system_scan")]
    SystemScan,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_path_direct_receiver() {
        let status = RequisitionStatus::Pending;
        let status = status.apply(TransitionEvent::Confirm).unwrap();
        let status = status.apply(TransitionEvent::Approve).unwrap();
        let status = status.apply(TransitionEvent::IssueDirect).unwrap();
        assert_eq!(status, RequisitionStatus::Delivered);
        let status = status.apply(TransitionEvent::ConfirmFinalReceipt).unwrap();
        assert_eq!(status, RequisitionStatus::Completed);
    }

    #[test]
    fn forward_path_driver_receiver() {
        let status = RequisitionStatus::Approved;
        let status = status.apply(TransitionEvent::IssueToDriver).unwrap();
        assert_eq!(status, RequisitionStatus::Issued);
        let status = status.apply(TransitionEvent::ConfirmHandover).unwrap();
        assert_eq!(status, RequisitionStatus::Delivered);
    }

    #[test]
    fn rejection_only_before_approval() {
        assert_eq!(
            RequisitionStatus::Pending.apply(TransitionEvent::Reject),
            Some(RequisitionStatus::Rejected)
        );
        assert_eq!(
            RequisitionStatus::Confirmed.apply(TransitionEvent::Reject),
            Some(RequisitionStatus::Rejected)
        );
        assert_eq!(RequisitionStatus::Approved.apply(TransitionEvent::Reject), None);
        assert_eq!(RequisitionStatus::Issued.apply(TransitionEvent::Reject), None);
    }

    #[test]
    fn terminal_states_admit_nothing() {
        use TransitionEvent::*;
        for terminal in [RequisitionStatus::Rejected, RequisitionStatus::Completed] {
            assert!(terminal.is_terminal());
            for event in [
                Confirm,
                Approve,
                Reject,
                IssueToDriver,
                IssueDirect,
                ConfirmHandover,
                ConfirmFinalReceipt,
            ] {
                assert_eq!(terminal.apply(event), None);
            }
        }
    }
}
