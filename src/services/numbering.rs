use std::sync::Arc;

use chrono::{Datelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, TransactionTrait,
};
use tracing::{error, instrument, warn};

use crate::{
    db::DbPool,
    entities::dispatch_counter::{self, Entity as CounterEntity},
    errors::ServiceError,
};

/// The counter is a single well-known row.
const COUNTER_ROW_ID: i32 = 1;

/// Attempts before degrading to the timestamp fallback.
const MAX_ATTEMPTS: u32 = 3;

/// Sequential format `REQ-<year>-<seq>`; the sequence is zero-padded to at
/// least six digits but keeps growing past them.
static SEQUENTIAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^REQ-\d{4}-\d{6,}$").expect("valid dispatch number regex"));

/// Timestamp fallback format used when counter storage is unavailable.
static FALLBACK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^REQ-\d+$").expect("valid fallback regex"));

/// Renders a sequential dispatch number. The six-digit width is a floor,
/// not a cap: sequence 1000000 renders as `REQ-2024-1000000`.
pub fn format_dispatch_number(year: i32, seq: i64) -> String {
    format!("REQ-{}-{:06}", year, seq)
}

pub fn is_sequential_dispatch_number(value: &str) -> bool {
    SEQUENTIAL_RE.is_match(value)
}

pub fn is_fallback_dispatch_number(value: &str) -> bool {
    !is_sequential_dispatch_number(value) && FALLBACK_RE.is_match(value)
}

/// Year-scoped sequential dispatch number generator backed by a single
/// counter row. Uniqueness under concurrent callers comes from the backing
/// store: the increment and the year-reset check are conditional updates
/// inside one transaction.
#[derive(Clone)]
pub struct DispatchNumberGenerator {
    db: Arc<DbPool>,
}

impl DispatchNumberGenerator {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Draws the next dispatch number. Never fails: if the atomic path stays
    /// unavailable after retries, degrades to `REQ-<epoch-millis>` so
    /// requisition creation is not blocked by numbering infrastructure.
    /// The fallback loses the fixed-width sort order, which is an accepted
    /// degradation under outage.
    #[instrument(skip(self))]
    pub async fn next(&self) -> String {
        let year = Utc::now().year();

        for attempt in 1..=MAX_ATTEMPTS {
            match self.draw(year).await {
                Ok(seq) => return format_dispatch_number(year, seq),
                Err(e) => {
                    warn!(attempt = attempt, error = %e, "Dispatch number draw failed; retrying");
                }
            }
        }

        let fallback = format!("REQ-{}", Utc::now().timestamp_millis());
        error!(
            fallback = %fallback,
            "Counter storage unavailable; falling back to timestamp dispatch number"
        );
        fallback
    }

    /// One draw: increment for the current year, or reset a stale year, or
    /// create the counter on first use. All three branches run in the same
    /// transaction, and both guarded updates are single conditional
    /// statements, so two callers can never both reset the counter.
    async fn draw(&self, year: i32) -> Result<i64, ServiceError> {
        let txn = self.db.begin().await?;

        let incremented = CounterEntity::update_many()
            .col_expr(
                dispatch_counter::Column::Count,
                Expr::col(dispatch_counter::Column::Count).add(1),
            )
            .filter(dispatch_counter::Column::Id.eq(COUNTER_ROW_ID))
            .filter(dispatch_counter::Column::LastResetYear.eq(year))
            .exec(&txn)
            .await?;

        if incremented.rows_affected == 0 {
            let reset = CounterEntity::update_many()
                .col_expr(dispatch_counter::Column::Count, Expr::value(1i64))
                .col_expr(dispatch_counter::Column::LastResetYear, Expr::value(year))
                .filter(dispatch_counter::Column::Id.eq(COUNTER_ROW_ID))
                .filter(dispatch_counter::Column::LastResetYear.lt(year))
                .exec(&txn)
                .await?;

            if reset.rows_affected == 0 {
                // Lazy creation on first draw. A concurrent first draw makes
                // this insert conflict, which surfaces as a retriable error.
                let counter = dispatch_counter::ActiveModel {
                    id: Set(COUNTER_ROW_ID),
                    count: Set(1),
                    last_reset_year: Set(year),
                };
                counter.insert(&txn).await?;
            }
        }

        let row = CounterEntity::find_by_id(COUNTER_ROW_ID)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError("Dispatch counter row vanished mid-draw".to_string())
            })?;

        txn.commit().await?;

        Ok(row.count)
    }
}
