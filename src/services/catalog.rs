use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::product::{self, Entity as ProductEntity},
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 100, message = "Product code is required"))]
    pub code: String,
    #[validate(length(min = 1, max = 255, message = "Product name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Category is required"))]
    pub category: String,
    #[validate(length(min = 1, message = "Unit is required"))]
    pub unit: String,
    /// Opening stock; later changes go through the stock ledger only.
    #[serde(default)]
    pub quantity: i32,
    #[schema(value_type = String)]
    pub unit_price: Decimal,
}

/// Metadata-only update. Deliberately carries no quantity field: stock
/// movements route through the ledger, never through a field patch.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 255, message = "Product name cannot be empty"))]
    pub name: Option<String>,
    #[validate(length(min = 1, message = "Category cannot be empty"))]
    pub category: Option<String>,
    #[validate(length(min = 1, message = "Unit cannot be empty"))]
    pub unit: Option<String>,
    #[schema(value_type = Option<String>)]
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub category: String,
    pub unit: String,
    pub quantity: i32,
    #[schema(value_type = String)]
    pub unit_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductListResponse {
    pub products: Vec<ProductResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Product master service. Owns identity and metadata; quantity is owned by
/// the stock ledger.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl CatalogService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create(
        &self,
        request: CreateProductRequest,
    ) -> Result<ProductResponse, ServiceError> {
        request.validate()?;

        let db = &*self.db;
        let existing = ProductEntity::find()
            .filter(product::Column::Code.eq(request.code.clone()))
            .one(db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Product code '{}' already exists",
                request.code
            )));
        }

        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(request.code.clone()),
            name: Set(request.name.clone()),
            category: Set(request.category.clone()),
            unit: Set(request.unit.clone()),
            quantity: Set(request.quantity),
            unit_price: Set(request.unit_price),
            created_at: Set(now),
            last_updated: Set(Some(now)),
        };
        let created = model.insert(db).await?;

        info!(product_id = %created.id, code = %created.code, "Product created");
        self.emit(Event::ProductCreated(created.id)).await;

        Ok(Self::to_response(created))
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn get(&self, product_id: Uuid) -> Result<ProductResponse, ServiceError> {
        let product = ProductEntity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", product_id))
            })?;
        Ok(Self::to_response(product))
    }

    #[instrument(skip(self))]
    pub async fn get_by_code(&self, code: &str) -> Result<ProductResponse, ServiceError> {
        let product = ProductEntity::find()
            .filter(product::Column::Code.eq(code))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product '{}' not found", code)))?;
        Ok(Self::to_response(product))
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        page: u64,
        per_page: u64,
        category: Option<String>,
    ) -> Result<ProductListResponse, ServiceError> {
        let db = &*self.db;
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);

        let mut find = ProductEntity::find();
        if let Some(category) = category {
            find = find.filter(product::Column::Category.eq(category));
        }

        let paginator = find
            .order_by_asc(product::Column::Code)
            .paginate(db, per_page);
        let total = paginator.num_items().await?;
        let products = paginator
            .fetch_page(page - 1)
            .await?
            .into_iter()
            .map(Self::to_response)
            .collect();

        Ok(ProductListResponse {
            products,
            total,
            page,
            per_page,
        })
    }

    /// Updates metadata. Quantity is intentionally untouchable here.
    #[instrument(skip(self, request), fields(product_id = %product_id))]
    pub async fn update(
        &self,
        product_id: Uuid,
        request: UpdateProductRequest,
    ) -> Result<ProductResponse, ServiceError> {
        request.validate()?;

        let db = &*self.db;
        let product = ProductEntity::find_by_id(product_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", product_id))
            })?;

        let mut active: product::ActiveModel = product.into();
        if let Some(name) = request.name {
            active.name = Set(name);
        }
        if let Some(category) = request.category {
            active.category = Set(category);
        }
        if let Some(unit) = request.unit {
            active.unit = Set(unit);
        }
        if let Some(unit_price) = request.unit_price {
            active.unit_price = Set(unit_price);
        }
        active.last_updated = Set(Some(Utc::now()));

        let updated = active.update(db).await?;

        info!(product_id = %product_id, "Product metadata updated");
        self.emit(Event::ProductUpdated(product_id)).await;

        Ok(Self::to_response(updated))
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send catalog event");
            }
        }
    }

    fn to_response(model: product::Model) -> ProductResponse {
        ProductResponse {
            id: model.id,
            code: model.code,
            name: model.name,
            category: model.category,
            unit: model.unit,
            quantity: model.quantity,
            unit_price: model.unit_price,
            created_at: model.created_at,
            last_updated: model.last_updated,
        }
    }
}
