use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, EntityTrait, PaginatorTrait, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::issue_record::{self, Entity as IssueRecordEntity},
    entities::product::Entity as ProductEntity,
    errors::ServiceError,
    events::{Event, EventSender},
    services::stock::StockLedger,
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct DirectIssueRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Issue quantity must be positive"))]
    pub quantity: i32,
    #[validate(length(min = 1, message = "Recipient is required"))]
    pub issued_to: String,
    #[validate(length(min = 1, message = "Issuer is required"))]
    pub issued_by: String,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IssueRecordResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub issued_to: String,
    pub issued_by: String,
    pub notes: Option<String>,
    pub shortage: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IssueRecordListResponse {
    pub records: Vec<IssueRecordResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Ad-hoc direct issues outside the requisition lifecycle. The stock
/// movement shares a transaction with the audit record, and goes through
/// the ledger like every other quantity change.
#[derive(Clone)]
pub struct IssueRecordService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl IssueRecordService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, request), fields(product_id = %request.product_id, quantity = request.quantity))]
    pub async fn create(
        &self,
        request: DirectIssueRequest,
    ) -> Result<IssueRecordResponse, ServiceError> {
        request.validate()?;

        let now = Utc::now();
        let txn = self.db.begin().await?;

        let product = ProductEntity::find_by_id(request.product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", request.product_id))
            })?;

        let outcome =
            StockLedger::apply_delta_on(&txn, request.product_id, -request.quantity).await?;

        let record = issue_record::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(request.product_id),
            product_name: Set(product.name.clone()),
            quantity: Set(request.quantity),
            issued_to: Set(request.issued_to.clone()),
            issued_by: Set(request.issued_by.clone()),
            notes: Set(request.notes.clone()),
            shortage: Set(outcome.shortage),
            created_at: Set(now),
        };
        let record = record.insert(&txn).await?;

        txn.commit().await?;

        info!(
            record_id = %record.id,
            product_id = %record.product_id,
            shortage = record.shortage,
            "Direct issue recorded"
        );
        self.emit(Event::StockAdjusted {
            product_id: outcome.product_id,
            delta: outcome.delta,
            new_quantity: outcome.new_quantity,
            shortage: outcome.shortage,
        })
        .await;
        self.emit(Event::DirectIssueRecorded {
            record_id: record.id,
            product_id: record.product_id,
        })
        .await;

        Ok(Self::to_response(record))
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<IssueRecordListResponse, ServiceError> {
        let db = &*self.db;
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);

        let paginator = IssueRecordEntity::find()
            .order_by_desc(issue_record::Column::CreatedAt)
            .paginate(db, per_page);
        let total = paginator.num_items().await?;
        let records = paginator
            .fetch_page(page - 1)
            .await?
            .into_iter()
            .map(Self::to_response)
            .collect();

        Ok(IssueRecordListResponse {
            records,
            total,
            page,
            per_page,
        })
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send issue record event");
            }
        }
    }

    fn to_response(model: issue_record::Model) -> IssueRecordResponse {
        IssueRecordResponse {
            id: model.id,
            product_id: model.product_id,
            product_name: model.product_name,
            quantity: model.quantity,
            issued_to: model.issued_to,
            issued_by: model.issued_by,
            notes: model.notes,
            shortage: model.shortage,
            created_at: model.created_at,
        }
    }
}
