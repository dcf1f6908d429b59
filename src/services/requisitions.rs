use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::issued_item,
    entities::requisition::{self, FinalReceiptMethod, RequisitionStatus, TransitionEvent},
    entities::requisition_item,
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::{
        dispatch_detached, ApprovalEmail, IssuanceEmail, IssuedProductLine, NotificationDispatcher,
        RejectionEmail,
    },
    services::approvals::ApprovalRuleLookup,
    services::numbering::DispatchNumberGenerator,
    services::stock::{DeltaOutcome, StockDelta, StockLedger},
};

/// Rejection stage recorded when a department head rejects.
pub const DEPARTMENT_HEAD_STAGE: &str = "Department Head";

/// Request/response types for the requisition service

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SubmitRequisitionRequest {
    /// Defaults to now when absent.
    pub request_date: Option<DateTime<Utc>>,
    #[validate(length(min = 1, message = "Department is required"))]
    pub department: String,
    #[validate(length(min = 1, message = "Requester name is required"))]
    pub requested_by: String,
    #[validate(email(message = "Requester email must be valid"))]
    pub requester_email: String,
    pub comments: Option<String>,
    #[validate(length(min = 1, message = "At least one line item is required"))]
    pub items: Vec<SubmitItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SubmitItem {
    pub product_id: Uuid,
    #[validate(length(min = 1, message = "Item name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Item unit is required"))]
    pub unit: String,
    #[validate(range(min = 1, message = "Requested quantity must be positive"))]
    pub requested_quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ConfirmRequest {
    #[validate(length(min = 1, message = "Confirmer name is required"))]
    pub confirmed_by: String,
    /// Per-line overrides; lines not mentioned default to the requested
    /// quantity.
    #[serde(default)]
    pub lines: Vec<ConfirmLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ConfirmLine {
    pub product_id: Uuid,
    #[validate(range(min = 0, message = "Approved quantity cannot be negative"))]
    pub approved_quantity: i32,
    pub approval_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ApproveRequest {
    #[validate(length(min = 1, message = "Approver name is required"))]
    pub approved_by: String,
    /// Must match the requisition's second-tier approver role.
    #[validate(length(min = 1, message = "Approver role is required"))]
    pub role: String,
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RejectRequest {
    #[validate(length(min = 1, message = "Rejector name is required"))]
    pub rejected_by: String,
    #[validate(length(min = 1, message = "Rejection reason is required"))]
    pub reason: String,
    /// Optional; when present it must match the stage implied by the
    /// current status.
    pub stage: Option<String>,
}

/// Who takes the goods at issuance. Supplied by the issuing clerk at the
/// moment of issuance, not derived from the requisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReceiverKind {
    /// A driver carries the goods; handover confirmation follows.
    Driver,
    /// The requester receives directly; the handover step is skipped.
    Direct,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct IssueRequest {
    #[validate(length(min = 1, message = "Issuer name is required"))]
    pub issued_by: String,
    pub notes: Option<String>,
    pub receiver: ReceiverKind,
    #[validate(length(min = 1, message = "At least one line must be issued"))]
    pub lines: Vec<IssueLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct IssueLine {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Issued quantity must be positive"))]
    pub issued_quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct HandoverRequest {
    #[validate(length(min = 1, message = "Recipient name is required"))]
    pub received_by: String,
    #[validate(length(min = 1, message = "Signature is required"))]
    pub signature: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct FinalReceiptRequest {
    #[validate(length(min = 1, message = "Receiver name is required"))]
    pub received_by: String,
    #[validate(length(min = 1, message = "Signature is required"))]
    pub signature: String,
    #[schema(value_type = String)]
    pub method: FinalReceiptMethod,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RequisitionItemResponse {
    pub product_id: Uuid,
    pub name: String,
    pub unit: String,
    pub requested_quantity: i32,
    pub approved_quantity: Option<i32>,
    pub approval_notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IssuedItemResponse {
    pub product_id: Uuid,
    pub name: String,
    pub unit: String,
    pub requested_quantity: i32,
    pub issued_quantity: i32,
    pub shortage: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RequisitionResponse {
    pub id: Uuid,
    pub dispatch_number: String,
    pub request_date: DateTime<Utc>,
    pub department: String,
    pub requested_by: String,
    pub requester_email: String,
    pub comments: Option<String>,
    #[schema(value_type = String)]
    pub status: RequisitionStatus,
    pub approver1: String,
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
    #[schema(value_type = Option<String>)]
    pub final_receipt_method: Option<FinalReceiptMethod>,
    pub final_notes: Option<String>,
    pub items: Vec<RequisitionItemResponse>,
    pub issued_items: Vec<IssuedItemResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ShortageLine {
    pub product_id: Uuid,
    pub name: String,
    pub unit: String,
    pub shortage: i32,
}

/// Issuance result: the transitioned requisition plus the advisory shortage
/// list for the caller to surface.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IssueOutcome {
    pub requisition: RequisitionResponse,
    pub shortages: Vec<ShortageLine>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RequisitionListResponse {
    pub requisitions: Vec<RequisitionResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Debug, Default, Clone)]
pub struct RequisitionFilter {
    pub status: Option<RequisitionStatus>,
    pub requested_by: Option<String>,
    pub page: u64,
    pub per_page: u64,
}

/// The requisition lifecycle state machine. Every transition runs in one
/// database transaction and re-checks the current status with a conditional
/// update, so a stale caller fails instead of double-applying effects.
#[derive(Clone)]
pub struct RequisitionService {
    db: Arc<DbPool>,
    numbering: Arc<DispatchNumberGenerator>,
    approvals: Arc<dyn ApprovalRuleLookup>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    event_sender: Option<Arc<EventSender>>,
    fulfillment_email: Option<String>,
}

impl RequisitionService {
    pub fn new(
        db: Arc<DbPool>,
        numbering: Arc<DispatchNumberGenerator>,
        approvals: Arc<dyn ApprovalRuleLookup>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        event_sender: Option<Arc<EventSender>>,
        fulfillment_email: Option<String>,
    ) -> Self {
        Self {
            db,
            numbering,
            approvals,
            dispatcher,
            event_sender,
            fulfillment_email,
        }
    }

    /// Submits a new requisition. Assigns the dispatch number exactly once
    /// and resolves the approver chain for the department.
    #[instrument(skip(self, request), fields(department = %request.department, requested_by = %request.requested_by))]
    pub async fn submit(
        &self,
        request: SubmitRequisitionRequest,
    ) -> Result<RequisitionResponse, ServiceError> {
        request.validate()?;
        let mut seen = HashSet::new();
        for item in &request.items {
            item.validate()?;
            if !seen.insert(item.product_id) {
                return Err(ServiceError::ValidationFailed(format!(
                    "Duplicate line item for product {}",
                    item.product_id
                )));
            }
        }

        let chain = self.approvals.approver_chain(&request.department).await?;
        let dispatch_number = self.numbering.next().await;

        let now = Utc::now();
        let requisition_id = Uuid::new_v4();

        let txn = self.db.begin().await?;

        let header = requisition::ActiveModel {
            id: Set(requisition_id),
            dispatch_number: Set(dispatch_number.clone()),
            request_date: Set(request.request_date.unwrap_or(now)),
            department: Set(request.department.clone()),
            requested_by: Set(request.requested_by.clone()),
            requester_email: Set(request.requester_email.clone()),
            comments: Set(request.comments.clone()),
            status: Set(RequisitionStatus::initial()),
            approver1: Set(chain.department_head.clone()),
            approver2: Set(chain.finance_role.clone()),
            confirmed_by: Set(None),
            confirmed_at: Set(None),
            approved_by: Set(None),
            approved_at: Set(None),
            approval_comments: Set(None),
            rejected_by: Set(None),
            rejected_at: Set(None),
            rejection_reason: Set(None),
            rejection_stage: Set(None),
            issued_by: Set(None),
            issued_at: Set(None),
            issue_notes: Set(None),
            driver_received_by: Set(None),
            driver_received_at: Set(None),
            driver_signature: Set(None),
            driver_notes: Set(None),
            final_received_by: Set(None),
            final_received_at: Set(None),
            final_signature: Set(None),
            final_receipt_method: Set(None),
            final_notes: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
            version: Set(1),
        };
        let header = header.insert(&txn).await?;

        let mut items = Vec::with_capacity(request.items.len());
        for (position, item) in request.items.iter().enumerate() {
            let line = requisition_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                requisition_id: Set(requisition_id),
                product_id: Set(item.product_id),
                name: Set(item.name.clone()),
                unit: Set(item.unit.clone()),
                requested_quantity: Set(item.requested_quantity),
                approved_quantity: Set(None),
                approval_notes: Set(None),
                position: Set(position as i32),
            };
            items.push(line.insert(&txn).await?);
        }

        txn.commit().await?;

        info!(
            requisition_id = %requisition_id,
            dispatch_number = %dispatch_number,
            "Requisition submitted"
        );
        self.emit(Event::RequisitionSubmitted {
            requisition_id,
            dispatch_number,
        })
        .await;

        if let Some(approver_email) = chain.department_head_email {
            let dispatcher = self.dispatcher.clone();
            let email = ApprovalEmail {
                requisition_id,
                approver_email,
                requester_name: request.requested_by.clone(),
                department: request.department.clone(),
            };
            dispatch_detached("approval request", async move {
                dispatcher.approval_request(email).await
            });
        }

        Ok(Self::to_response(header, items, Vec::new()))
    }

    /// Department-head confirmation: attaches per-line approved quantities
    /// (default = requested) and hands the requisition to finance.
    #[instrument(skip(self, request), fields(requisition_id = %requisition_id))]
    pub async fn confirm(
        &self,
        requisition_id: Uuid,
        request: ConfirmRequest,
    ) -> Result<RequisitionResponse, ServiceError> {
        request.validate()?;
        for line in &request.lines {
            line.validate()?;
        }

        let now = Utc::now();
        let txn = self.db.begin().await?;

        let header = Self::load(&txn, requisition_id).await?;
        let next = header
            .status
            .apply(TransitionEvent::Confirm)
            .ok_or_else(|| {
                ServiceError::invalid_state(header.status, RequisitionStatus::Pending)
            })?;

        if header.approver1 != request.confirmed_by {
            return Err(ServiceError::ValidationFailed(format!(
                "Only department head '{}' may confirm this requisition",
                header.approver1
            )));
        }

        let items = Self::load_items(&txn, requisition_id).await?;
        let known: HashSet<Uuid> = items.iter().map(|i| i.product_id).collect();
        for line in &request.lines {
            if !known.contains(&line.product_id) {
                return Err(ServiceError::ValidationFailed(format!(
                    "Product {} is not on this requisition",
                    line.product_id
                )));
            }
        }

        self.guarded_update(
            &txn,
            &header,
            next,
            vec![
                (
                    requisition::Column::ConfirmedBy,
                    Expr::value(Some(request.confirmed_by.clone())),
                ),
                (requisition::Column::ConfirmedAt, Expr::value(Some(now))),
            ],
            now,
        )
        .await?;

        let overrides: HashMap<Uuid, &ConfirmLine> =
            request.lines.iter().map(|l| (l.product_id, l)).collect();
        for item in items {
            let (approved, notes) = match overrides.get(&item.product_id) {
                Some(line) => (line.approved_quantity, line.approval_notes.clone()),
                None => (item.requested_quantity, None),
            };
            let mut active: requisition_item::ActiveModel = item.into();
            active.approved_quantity = Set(Some(approved));
            active.approval_notes = Set(notes);
            active.update(&txn).await?;
        }

        txn.commit().await?;

        info!(requisition_id = %requisition_id, "Requisition confirmed by department head");
        self.emit(Event::RequisitionConfirmed(requisition_id)).await;
        // Resolve the finance target through the same seam that produced the
        // approver chain at submission. A failed lookup only costs the
        // notification, never the committed transition.
        match self.approvals.approver_chain(&header.department).await {
            Ok(chain) => {
                self.notify_approval_tier(&header, chain.finance_email, "finance approval")
                    .await
            }
            Err(e) => warn!(error = %e, "Finance notification target unavailable"),
        }

        self.get(requisition_id).await
    }

    /// Finance approval: second and final approval tier before issuance.
    #[instrument(skip(self, request), fields(requisition_id = %requisition_id))]
    pub async fn approve(
        &self,
        requisition_id: Uuid,
        request: ApproveRequest,
    ) -> Result<RequisitionResponse, ServiceError> {
        request.validate()?;

        let now = Utc::now();
        let txn = self.db.begin().await?;

        let header = Self::load(&txn, requisition_id).await?;
        let next = header
            .status
            .apply(TransitionEvent::Approve)
            .ok_or_else(|| {
                ServiceError::invalid_state(header.status, RequisitionStatus::Confirmed)
            })?;

        if request.role.trim() != header.approver2 {
            return Err(ServiceError::ValidationFailed(format!(
                "Only the {} may approve requisitions",
                header.approver2
            )));
        }

        self.guarded_update(
            &txn,
            &header,
            next,
            vec![
                (
                    requisition::Column::ApprovedBy,
                    Expr::value(Some(request.approved_by.clone())),
                ),
                (requisition::Column::ApprovedAt, Expr::value(Some(now))),
                (
                    requisition::Column::ApprovalComments,
                    Expr::value(request.comments.clone()),
                ),
            ],
            now,
        )
        .await?;

        txn.commit().await?;

        info!(requisition_id = %requisition_id, approved_by = %request.approved_by, "Requisition approved by finance");
        self.emit(Event::RequisitionApproved(requisition_id)).await;
        self.notify_approval_tier(&header, self.fulfillment_email.clone(), "fulfillment")
            .await;

        self.get(requisition_id).await
    }

    /// Rejection from either pre-approval stage. Terminal.
    #[instrument(skip(self, request), fields(requisition_id = %requisition_id))]
    pub async fn reject(
        &self,
        requisition_id: Uuid,
        request: RejectRequest,
    ) -> Result<RequisitionResponse, ServiceError> {
        request.validate()?;

        let now = Utc::now();
        let txn = self.db.begin().await?;

        let header = Self::load(&txn, requisition_id).await?;
        let next = header.status.apply(TransitionEvent::Reject).ok_or_else(|| {
            ServiceError::invalid_state(header.status, "Pending or Confirmed")
        })?;

        let stage = if header.status == RequisitionStatus::Pending {
            DEPARTMENT_HEAD_STAGE
        } else {
            header.approver2.as_str()
        };
        if let Some(supplied) = &request.stage {
            if supplied != stage {
                return Err(ServiceError::ValidationFailed(format!(
                    "Rejection stage '{}' does not match the current stage '{}'",
                    supplied, stage
                )));
            }
        }
        if header.status == RequisitionStatus::Pending && request.rejected_by != header.approver1 {
            return Err(ServiceError::ValidationFailed(format!(
                "Only department head '{}' may reject at this stage",
                header.approver1
            )));
        }
        let stage = stage.to_string();

        self.guarded_update(
            &txn,
            &header,
            next,
            vec![
                (
                    requisition::Column::RejectedBy,
                    Expr::value(Some(request.rejected_by.clone())),
                ),
                (requisition::Column::RejectedAt, Expr::value(Some(now))),
                (
                    requisition::Column::RejectionReason,
                    Expr::value(Some(request.reason.clone())),
                ),
                (
                    requisition::Column::RejectionStage,
                    Expr::value(Some(stage.clone())),
                ),
            ],
            now,
        )
        .await?;

        txn.commit().await?;

        info!(requisition_id = %requisition_id, stage = %stage, "Requisition rejected");
        self.emit(Event::RequisitionRejected {
            requisition_id,
            stage: stage.clone(),
        })
        .await;

        let dispatcher = self.dispatcher.clone();
        let email = RejectionEmail {
            requisition_id,
            requester_email: header.requester_email.clone(),
            rejector_name: request.rejected_by.clone(),
            reason: request.reason.clone(),
            stage,
        };
        dispatch_detached("rejection notice", async move {
            dispatcher.rejection(email).await
        });

        self.get(requisition_id).await
    }

    /// Issuance: decrements stock through the ledger (shortage-tolerant,
    /// never blocks), populates the separate issued-items list, and moves to
    /// `Issued` or `Delivered` depending on the receiver kind. The status
    /// re-check and the stock movement share one transaction, so a
    /// double-submitted issue cannot double-decrement.
    #[instrument(skip(self, request), fields(requisition_id = %requisition_id))]
    pub async fn issue(
        &self,
        requisition_id: Uuid,
        request: IssueRequest,
    ) -> Result<IssueOutcome, ServiceError> {
        request.validate()?;
        let mut seen = HashSet::new();
        for line in &request.lines {
            line.validate()?;
            if !seen.insert(line.product_id) {
                return Err(ServiceError::ValidationFailed(format!(
                    "Duplicate issue line for product {}",
                    line.product_id
                )));
            }
        }

        let now = Utc::now();
        let txn = self.db.begin().await?;

        let header = Self::load(&txn, requisition_id).await?;
        let event = match request.receiver {
            ReceiverKind::Driver => TransitionEvent::IssueToDriver,
            ReceiverKind::Direct => TransitionEvent::IssueDirect,
        };
        let next = header.status.apply(event).ok_or_else(|| {
            ServiceError::invalid_state(header.status, RequisitionStatus::Approved)
        })?;

        let items = Self::load_items(&txn, requisition_id).await?;
        let by_product: HashMap<Uuid, &requisition_item::Model> =
            items.iter().map(|i| (i.product_id, i)).collect();
        for line in &request.lines {
            if !by_product.contains_key(&line.product_id) {
                return Err(ServiceError::ValidationFailed(format!(
                    "Product {} is not on this requisition",
                    line.product_id
                )));
            }
        }

        let deltas: Vec<StockDelta> = request
            .lines
            .iter()
            .map(|line| StockDelta {
                product_id: line.product_id,
                delta: -line.issued_quantity,
            })
            .collect();
        let outcomes = StockLedger::apply_batch_on(&txn, &deltas).await?;
        let outcome_by_product: HashMap<Uuid, &DeltaOutcome> =
            outcomes.iter().map(|o| (o.product_id, o)).collect();

        let mut shortages = Vec::new();
        let mut issued_models = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            let item = by_product[&line.product_id];
            let shortage = outcome_by_product[&line.product_id].shortage;
            if shortage > 0 {
                shortages.push(ShortageLine {
                    product_id: line.product_id,
                    name: item.name.clone(),
                    unit: item.unit.clone(),
                    shortage,
                });
            }
            let issued = issued_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                requisition_id: Set(requisition_id),
                product_id: Set(line.product_id),
                name: Set(item.name.clone()),
                unit: Set(item.unit.clone()),
                requested_quantity: Set(item.requested_quantity),
                issued_quantity: Set(line.issued_quantity),
                shortage: Set(shortage),
                created_at: Set(now),
            };
            issued_models.push(issued.insert(&txn).await?);
        }

        let issue_notes = compose_issue_notes(request.notes.as_deref(), &shortages);

        self.guarded_update(
            &txn,
            &header,
            next,
            vec![
                (
                    requisition::Column::IssuedBy,
                    Expr::value(Some(request.issued_by.clone())),
                ),
                (requisition::Column::IssuedAt, Expr::value(Some(now))),
                (
                    requisition::Column::IssueNotes,
                    Expr::value(issue_notes.clone()),
                ),
            ],
            now,
        )
        .await?;

        txn.commit().await?;

        info!(
            requisition_id = %requisition_id,
            next_status = %next,
            shortage_lines = shortages.len(),
            "Requisition issued"
        );
        self.emit(Event::RequisitionIssued {
            requisition_id,
            shortage_lines: shortages.len(),
        })
        .await;
        for outcome in &outcomes {
            self.emit(Event::StockAdjusted {
                product_id: outcome.product_id,
                delta: outcome.delta,
                new_quantity: outcome.new_quantity,
                shortage: outcome.shortage,
            })
            .await;
        }

        self.notify_requester(&header, &issued_models, issue_notes);

        let requisition = self.get(requisition_id).await?;
        Ok(IssueOutcome {
            requisition,
            shortages,
        })
    }

    /// Driver handover confirmation; only legal from `Issued`.
    #[instrument(skip(self, request), fields(requisition_id = %requisition_id))]
    pub async fn confirm_handover(
        &self,
        requisition_id: Uuid,
        request: HandoverRequest,
    ) -> Result<RequisitionResponse, ServiceError> {
        request.validate()?;

        let now = Utc::now();
        let txn = self.db.begin().await?;

        let header = Self::load(&txn, requisition_id).await?;
        let next = header
            .status
            .apply(TransitionEvent::ConfirmHandover)
            .ok_or_else(|| {
                ServiceError::invalid_state(header.status, RequisitionStatus::Issued)
            })?;

        self.guarded_update(
            &txn,
            &header,
            next,
            vec![
                (
                    requisition::Column::DriverReceivedBy,
                    Expr::value(Some(request.received_by.clone())),
                ),
                (
                    requisition::Column::DriverReceivedAt,
                    Expr::value(Some(now)),
                ),
                (
                    requisition::Column::DriverSignature,
                    Expr::value(Some(request.signature.clone())),
                ),
                (
                    requisition::Column::DriverNotes,
                    Expr::value(request.notes.clone()),
                ),
            ],
            now,
        )
        .await?;

        let issued = Self::load_issued(&txn, requisition_id).await?;
        txn.commit().await?;

        info!(requisition_id = %requisition_id, "Handover confirmed");
        self.emit(Event::RequisitionDelivered(requisition_id)).await;
        self.notify_requester(
            &header,
            &issued,
            Some(format!("Handover confirmed by {}", request.received_by)),
        );

        self.get(requisition_id).await
    }

    /// Final receipt confirmation; only legal from `Delivered`. Terminal.
    #[instrument(skip(self, request), fields(requisition_id = %requisition_id))]
    pub async fn confirm_final_receipt(
        &self,
        requisition_id: Uuid,
        request: FinalReceiptRequest,
    ) -> Result<RequisitionResponse, ServiceError> {
        request.validate()?;

        let now = Utc::now();
        let txn = self.db.begin().await?;

        let header = Self::load(&txn, requisition_id).await?;
        let next = header
            .status
            .apply(TransitionEvent::ConfirmFinalReceipt)
            .ok_or_else(|| {
                ServiceError::invalid_state(header.status, RequisitionStatus::Delivered)
            })?;

        self.guarded_update(
            &txn,
            &header,
            next,
            vec![
                (
                    requisition::Column::FinalReceivedBy,
                    Expr::value(Some(request.received_by.clone())),
                ),
                (requisition::Column::FinalReceivedAt, Expr::value(Some(now))),
                (
                    requisition::Column::FinalSignature,
                    Expr::value(Some(request.signature.clone())),
                ),
                (
                    requisition::Column::FinalReceiptMethod,
                    Expr::value(Some(request.method)),
                ),
                (
                    requisition::Column::FinalNotes,
                    Expr::value(request.notes.clone()),
                ),
            ],
            now,
        )
        .await?;

        let issued = Self::load_issued(&txn, requisition_id).await?;
        txn.commit().await?;

        info!(requisition_id = %requisition_id, "Final receipt confirmed");
        self.emit(Event::RequisitionCompleted(requisition_id)).await;
        self.notify_requester(
            &header,
            &issued,
            Some(format!("Final receipt confirmed by {}", request.received_by)),
        );

        self.get(requisition_id).await
    }

    /// Fetches one requisition with its line items and issued items.
    #[instrument(skip(self), fields(requisition_id = %requisition_id))]
    pub async fn get(&self, requisition_id: Uuid) -> Result<RequisitionResponse, ServiceError> {
        let db = &*self.db;
        let header = Self::load(db, requisition_id).await?;
        let items = Self::load_items(db, requisition_id).await?;
        let issued = Self::load_issued(db, requisition_id).await?;
        Ok(Self::to_response(header, items, issued))
    }

    /// Lists requisitions, optionally filtered by status and requester.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: RequisitionFilter,
    ) -> Result<RequisitionListResponse, ServiceError> {
        let db = &*self.db;
        let page = filter.page.max(1);
        let per_page = filter.per_page.clamp(1, 100);

        let mut find = requisition::Entity::find();
        if let Some(status) = filter.status {
            find = find.filter(requisition::Column::Status.eq(status));
        }
        if let Some(requested_by) = &filter.requested_by {
            find = find.filter(requisition::Column::RequestedBy.eq(requested_by.clone()));
        }

        let paginator = find
            .order_by_desc(requisition::Column::CreatedAt)
            .paginate(db, per_page);
        let total = paginator.num_items().await?;
        let headers = paginator.fetch_page(page - 1).await?;

        let ids: Vec<Uuid> = headers.iter().map(|h| h.id).collect();
        let mut items_by_req: HashMap<Uuid, Vec<requisition_item::Model>> = HashMap::new();
        let mut issued_by_req: HashMap<Uuid, Vec<issued_item::Model>> = HashMap::new();
        if !ids.is_empty() {
            let all_items = requisition_item::Entity::find()
                .filter(requisition_item::Column::RequisitionId.is_in(ids.clone()))
                .order_by_asc(requisition_item::Column::Position)
                .all(db)
                .await?;
            for item in all_items {
                items_by_req.entry(item.requisition_id).or_default().push(item);
            }
            let all_issued = issued_item::Entity::find()
                .filter(issued_item::Column::RequisitionId.is_in(ids))
                .all(db)
                .await?;
            for item in all_issued {
                issued_by_req.entry(item.requisition_id).or_default().push(item);
            }
        }

        let requisitions = headers
            .into_iter()
            .map(|header| {
                let items = items_by_req.remove(&header.id).unwrap_or_default();
                let issued = issued_by_req.remove(&header.id).unwrap_or_default();
                Self::to_response(header, items, issued)
            })
            .collect();

        Ok(RequisitionListResponse {
            requisitions,
            total,
            page,
            per_page,
        })
    }

    // Internal helpers

    async fn load<C: ConnectionTrait>(
        conn: &C,
        requisition_id: Uuid,
    ) -> Result<requisition::Model, ServiceError> {
        requisition::Entity::find_by_id(requisition_id)
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Requisition {} not found", requisition_id))
            })
    }

    async fn load_items<C: ConnectionTrait>(
        conn: &C,
        requisition_id: Uuid,
    ) -> Result<Vec<requisition_item::Model>, ServiceError> {
        Ok(requisition_item::Entity::find()
            .filter(requisition_item::Column::RequisitionId.eq(requisition_id))
            .order_by_asc(requisition_item::Column::Position)
            .all(conn)
            .await?)
    }

    async fn load_issued<C: ConnectionTrait>(
        conn: &C,
        requisition_id: Uuid,
    ) -> Result<Vec<issued_item::Model>, ServiceError> {
        Ok(issued_item::Entity::find()
            .filter(issued_item::Column::RequisitionId.eq(requisition_id))
            .all(conn)
            .await?)
    }

    /// The uniform transition guard: a single conditional update on
    /// (id, status, version). Zero rows affected means another caller moved
    /// the requisition first; the enclosing transaction rolls back.
    async fn guarded_update<C: ConnectionTrait>(
        &self,
        conn: &C,
        header: &requisition::Model,
        next: RequisitionStatus,
        fields: Vec<(requisition::Column, sea_orm::sea_query::SimpleExpr)>,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let mut update = requisition::Entity::update_many()
            .col_expr(requisition::Column::Status, Expr::value(next))
            .col_expr(requisition::Column::UpdatedAt, Expr::value(Some(now)))
            .col_expr(
                requisition::Column::Version,
                Expr::col(requisition::Column::Version).add(1),
            );
        for (column, value) in fields {
            update = update.col_expr(column, value);
        }

        let result = update
            .filter(requisition::Column::Id.eq(header.id))
            .filter(requisition::Column::Status.eq(header.status))
            .filter(requisition::Column::Version.eq(header.version))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            warn!(
                requisition_id = %header.id,
                status = %header.status,
                "Concurrent modification detected during transition"
            );
            return Err(ServiceError::Conflict(format!(
                "Requisition {} was modified concurrently; re-read and retry",
                header.id
            )));
        }

        Ok(())
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send event");
            }
        }
    }

    /// Notifies the next approval tier, when a target address is configured.
    async fn notify_approval_tier(
        &self,
        header: &requisition::Model,
        target: Option<String>,
        context: &'static str,
    ) {
        let Some(approver_email) = target else {
            return;
        };
        let dispatcher = self.dispatcher.clone();
        let email = ApprovalEmail {
            requisition_id: header.id,
            approver_email,
            requester_name: header.requested_by.clone(),
            department: header.department.clone(),
        };
        dispatch_detached(context, async move {
            dispatcher.approval_request(email).await
        });
    }

    /// Issuance-style notice to the requester, also used for handover and
    /// final-receipt updates with the stage described in the notes.
    fn notify_requester(
        &self,
        header: &requisition::Model,
        issued: &[issued_item::Model],
        notes: Option<String>,
    ) {
        let dispatcher = self.dispatcher.clone();
        let email = IssuanceEmail {
            requisition_id: header.id,
            requester_email: header.requester_email.clone(),
            requester_name: header.requested_by.clone(),
            issued_products: issued
                .iter()
                .map(|i| IssuedProductLine {
                    product_id: i.product_id,
                    name: i.name.clone(),
                    unit: i.unit.clone(),
                    requested_quantity: i.requested_quantity,
                    issued_quantity: i.issued_quantity,
                })
                .collect(),
            notes,
        };
        dispatch_detached("requester notice", async move {
            dispatcher.issuance(email).await
        });
    }

    fn to_response(
        header: requisition::Model,
        items: Vec<requisition_item::Model>,
        issued: Vec<issued_item::Model>,
    ) -> RequisitionResponse {
        RequisitionResponse {
            id: header.id,
            dispatch_number: header.dispatch_number,
            request_date: header.request_date,
            department: header.department,
            requested_by: header.requested_by,
            requester_email: header.requester_email,
            comments: header.comments,
            status: header.status,
            approver1: header.approver1,
            approver2: header.approver2,
            confirmed_by: header.confirmed_by,
            confirmed_at: header.confirmed_at,
            approved_by: header.approved_by,
            approved_at: header.approved_at,
            approval_comments: header.approval_comments,
            rejected_by: header.rejected_by,
            rejected_at: header.rejected_at,
            rejection_reason: header.rejection_reason,
            rejection_stage: header.rejection_stage,
            issued_by: header.issued_by,
            issued_at: header.issued_at,
            issue_notes: header.issue_notes,
            driver_received_by: header.driver_received_by,
            driver_received_at: header.driver_received_at,
            driver_signature: header.driver_signature,
            driver_notes: header.driver_notes,
            final_received_by: header.final_received_by,
            final_received_at: header.final_received_at,
            final_signature: header.final_signature,
            final_receipt_method: header.final_receipt_method,
            final_notes: header.final_notes,
            items: items
                .into_iter()
                .map(|i| RequisitionItemResponse {
                    product_id: i.product_id,
                    name: i.name,
                    unit: i.unit,
                    requested_quantity: i.requested_quantity,
                    approved_quantity: i.approved_quantity,
                    approval_notes: i.approval_notes,
                })
                .collect(),
            issued_items: issued
                .into_iter()
                .map(|i| IssuedItemResponse {
                    product_id: i.product_id,
                    name: i.name,
                    unit: i.unit,
                    requested_quantity: i.requested_quantity,
                    issued_quantity: i.issued_quantity,
                    shortage: i.shortage,
                })
                .collect(),
            created_at: header.created_at,
            updated_at: header.updated_at,
            version: header.version,
        }
    }
}

/// Folds user notes and shortage annotations into the stored issue notes.
fn compose_issue_notes(user_notes: Option<&str>, shortages: &[ShortageLine]) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    if let Some(notes) = user_notes {
        if !notes.trim().is_empty() {
            parts.push(notes.trim().to_string());
        }
    }
    for line in shortages {
        parts.push(format!(
            "Shortage: {} short by {} {}",
            line.name, line.shortage, line.unit
        ));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shortage(name: &str, unit: &str, shortage: i32) -> ShortageLine {
        ShortageLine {
            product_id: Uuid::new_v4(),
            name: name.to_string(),
            unit: unit.to_string(),
            shortage,
        }
    }

    #[test]
    fn issue_notes_absent_when_nothing_to_record() {
        assert_eq!(compose_issue_notes(None, &[]), None);
        assert_eq!(compose_issue_notes(Some("   "), &[]), None);
    }

    #[test]
    fn issue_notes_keep_user_text_and_append_shortages() {
        let notes = compose_issue_notes(
            Some("urgent restock"),
            &[shortage("Ethanol 96%", "bottles", 6)],
        )
        .unwrap();
        assert_eq!(notes, "urgent restock; Shortage: Ethanol 96% short by 6 bottles");
    }

    #[test]
    fn issue_notes_list_every_shortage_line() {
        let notes = compose_issue_notes(
            None,
            &[
                shortage("Gloves", "boxes", 2),
                shortage("Pipette tips", "racks", 1),
            ],
        )
        .unwrap();
        assert!(notes.contains("Gloves short by 2 boxes"));
        assert!(notes.contains("Pipette tips short by 1 racks"));
    }
}
