use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::product::{self, Entity as ProductEntity},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// A signed quantity change: negative for issuance, positive for
/// returns/receipts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StockDelta {
    pub product_id: Uuid,
    pub delta: i32,
}

/// Result of one applied delta. `shortage` is the portion of a debit the
/// stock on hand could not cover; the delta is applied in full regardless
/// and the quantity is allowed to run negative (backorder model).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaOutcome {
    pub product_id: Uuid,
    pub delta: i32,
    pub new_quantity: i32,
    pub shortage: i32,
}

/// Uncovered portion of a debit. With `new_quantity = before + delta` this
/// is exactly `max(0, -delta - before)`: the units the stock on hand could
/// not cover. Credits never report shortage.
pub fn debit_shortage(new_quantity: i32, delta: i32) -> i32 {
    if delta < 0 {
        new_quantity.saturating_neg().max(0)
    } else {
        0
    }
}

/// The only writer of `products.quantity` in the crate. Every mutation is a
/// relative `UPDATE quantity = quantity + delta` inside a transaction, so
/// concurrent movements on the same product never lose an update.
#[derive(Clone)]
pub struct StockLedger {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl StockLedger {
    pub fn new(db: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Applies one delta on a caller-supplied connection or transaction.
    /// Used by issuance to share its transaction with the status update.
    pub async fn apply_delta_on<C: ConnectionTrait>(
        conn: &C,
        product_id: Uuid,
        delta: i32,
    ) -> Result<DeltaOutcome, ServiceError> {
        let now = Utc::now();

        let update = ProductEntity::update_many()
            .col_expr(
                product::Column::Quantity,
                Expr::col(product::Column::Quantity).add(delta),
            )
            .col_expr(product::Column::LastUpdated, Expr::value(Some(now)))
            .filter(product::Column::Id.eq(product_id))
            .exec(conn)
            .await?;

        if update.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Product {} not found",
                product_id
            )));
        }

        let updated = ProductEntity::find_by_id(product_id)
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", product_id))
            })?;

        let shortage = debit_shortage(updated.quantity, delta);

        if shortage > 0 {
            warn!(
                product_id = %product_id,
                delta = delta,
                new_quantity = updated.quantity,
                shortage = shortage,
                "Stock overdrawn; recording shortage"
            );
        }

        Ok(DeltaOutcome {
            product_id,
            delta,
            new_quantity: updated.quantity,
            shortage,
        })
    }

    /// Applies a batch on a caller-supplied transaction. The whole batch
    /// fails before any mutation if a product id does not resolve.
    pub async fn apply_batch_on<C: ConnectionTrait>(
        conn: &C,
        deltas: &[StockDelta],
    ) -> Result<Vec<DeltaOutcome>, ServiceError> {
        if deltas.is_empty() {
            return Err(ServiceError::ValidationFailed(
                "Stock batch must contain at least one delta".to_string(),
            ));
        }

        let ids: Vec<Uuid> = deltas.iter().map(|d| d.product_id).collect();
        let found: HashSet<Uuid> = ProductEntity::find()
            .filter(product::Column::Id.is_in(ids.clone()))
            .all(conn)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();

        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !found.contains(id))
            .map(|id| id.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ServiceError::ValidationFailed(format!(
                "Unknown product ids in stock batch: {}",
                missing.join(", ")
            )));
        }

        // Stable lock order: concurrent batches touching the same products
        // must acquire their row locks in the same sequence.
        let mut ordered: Vec<StockDelta> = deltas.to_vec();
        ordered.sort_by_key(|d| d.product_id);

        let mut outcomes = Vec::with_capacity(ordered.len());
        for delta in &ordered {
            outcomes.push(Self::apply_delta_on(conn, delta.product_id, delta.delta).await?);
        }
        Ok(outcomes)
    }

    /// Applies a single signed delta atomically.
    #[instrument(skip(self), fields(product_id = %product_id, delta = delta))]
    pub async fn apply_delta(
        &self,
        product_id: Uuid,
        delta: i32,
    ) -> Result<DeltaOutcome, ServiceError> {
        let txn = self.db.begin().await?;
        let outcome = Self::apply_delta_on(&txn, product_id, delta).await?;
        txn.commit().await?;

        info!(
            product_id = %product_id,
            delta = delta,
            new_quantity = outcome.new_quantity,
            shortage = outcome.shortage,
            "Stock delta applied"
        );
        self.emit(&[outcome.clone()]).await;

        Ok(outcome)
    }

    /// Applies all deltas inside one transaction: either every quantity
    /// moves or none does.
    #[instrument(skip(self, deltas), fields(count = deltas.len()))]
    pub async fn apply_batch(
        &self,
        deltas: &[StockDelta],
    ) -> Result<Vec<DeltaOutcome>, ServiceError> {
        let txn = self.db.begin().await?;
        let outcomes = Self::apply_batch_on(&txn, deltas).await?;
        txn.commit().await?;

        info!(count = outcomes.len(), "Stock batch applied");
        self.emit(&outcomes).await;

        Ok(outcomes)
    }

    async fn emit(&self, outcomes: &[DeltaOutcome]) {
        if let Some(sender) = &self.event_sender {
            for outcome in outcomes {
                let event = Event::StockAdjusted {
                    product_id: outcome.product_id,
                    delta: outcome.delta,
                    new_quantity: outcome.new_quantity,
                    shortage: outcome.shortage,
                };
                if let Err(e) = sender.send(event).await {
                    warn!(error = %e, "Failed to send stock adjusted event");
                }
            }
        }
    }
}
