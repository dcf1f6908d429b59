#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{routing::get, Router};
use rust_decimal_macros::dec;
use tokio::sync::mpsc;
use uuid::Uuid;

use labops_api::{
    config::{AppConfig, DepartmentHead},
    db::{self, DbConfig},
    events::{process_events, EventSender},
    handlers::AppServices,
    notifications::{
        ApprovalEmail, IssuanceEmail, NotificationDispatcher, NotificationError, RejectionEmail,
    },
    services::approvals::StaticApprovalRules,
    services::catalog::{CreateProductRequest, ProductResponse},
    services::requisitions::{
        ApproveRequest, ConfirmRequest, RequisitionResponse, SubmitItem, SubmitRequisitionRequest,
    },
    AppState,
};

pub const DEPARTMENT: &str = "Microbiology";
pub const DEPARTMENT_HEAD: &str = "Dr. Okoye";
pub const FINANCE_MANAGER: &str = "Finance Manager";
pub const REQUESTER: &str = "A. Technician";
pub const REQUESTER_EMAIL: &str = "tech@lab.example";

/// Captures every dispatched notification so tests can assert on them.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub approvals: Mutex<Vec<ApprovalEmail>>,
    pub rejections: Mutex<Vec<RejectionEmail>>,
    pub issuances: Mutex<Vec<IssuanceEmail>>,
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn approval_request(&self, email: ApprovalEmail) -> Result<(), NotificationError> {
        self.approvals.lock().unwrap().push(email);
        Ok(())
    }

    async fn rejection(&self, email: RejectionEmail) -> Result<(), NotificationError> {
        self.rejections.lock().unwrap().push(email);
        Ok(())
    }

    async fn issuance(&self, email: IssuanceEmail) -> Result<(), NotificationError> {
        self.issuances.lock().unwrap().push(email);
        Ok(())
    }
}

pub struct TestApp {
    pub state: AppState,
    pub notices: Arc<RecordingDispatcher>,
}

impl TestApp {
    /// Fresh in-memory database with migrations applied and all services
    /// wired against a recording dispatcher. The pool is capped at one
    /// connection so `sqlite::memory:` stays a single database.
    pub async fn new() -> Self {
        let db_config = DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let pool = db::establish_connection_with_config(&db_config)
            .await
            .expect("db connect");
        db::run_migrations(&pool).await.expect("migrations");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        tokio::spawn(process_events(event_rx));

        let notices = Arc::new(RecordingDispatcher::default());
        let dispatcher: Arc<dyn NotificationDispatcher> = notices.clone();

        let mut heads = HashMap::new();
        heads.insert(
            DEPARTMENT.to_string(),
            DepartmentHead {
                name: DEPARTMENT_HEAD.to_string(),
                email: Some("okoye@lab.example".to_string()),
            },
        );
        let approvals = Arc::new(StaticApprovalRules::new(
            heads,
            Some("finance@lab.example".to_string()),
        ));

        let services = AppServices::new(
            db_arc.clone(),
            Arc::new(event_sender.clone()),
            dispatcher,
            approvals,
            Some("stores@lab.example".to_string()),
        );

        let config = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );

        let state = AppState {
            db: db_arc,
            config,
            event_sender,
            services,
        };

        Self { state, notices }
    }

    pub fn services(&self) -> &AppServices {
        &self.state.services
    }

    pub fn db(&self) -> Arc<db::DbPool> {
        self.state.db.clone()
    }

    /// The application router as served by the binary, minus the outer
    /// tower layers.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(|| async { "labops-api up" }))
            .nest("/health", labops_api::handlers::health::router())
            .nest("/api/v1", labops_api::api_v1_routes())
            .with_state(self.state.clone())
    }

    pub async fn seed_product(&self, code: &str, name: &str, quantity: i32) -> ProductResponse {
        self.services()
            .catalog
            .create(CreateProductRequest {
                code: code.to_string(),
                name: name.to_string(),
                category: "Reagents".to_string(),
                unit: "pieces".to_string(),
                quantity,
                unit_price: dec!(4.50),
            })
            .await
            .expect("seed product")
    }

    pub fn submit_request(items: Vec<SubmitItem>) -> SubmitRequisitionRequest {
        SubmitRequisitionRequest {
            request_date: None,
            department: DEPARTMENT.to_string(),
            requested_by: REQUESTER.to_string(),
            requester_email: REQUESTER_EMAIL.to_string(),
            comments: None,
            items,
        }
    }

    pub fn item(product_id: Uuid, name: &str, quantity: i32) -> SubmitItem {
        SubmitItem {
            product_id,
            name: name.to_string(),
            unit: "pieces".to_string(),
            requested_quantity: quantity,
        }
    }

    /// Submit one requisition for the given product lines.
    pub async fn submit(&self, items: Vec<SubmitItem>) -> RequisitionResponse {
        self.services()
            .requisitions
            .submit(Self::submit_request(items))
            .await
            .expect("submit requisition")
    }

    /// Drive a freshly submitted requisition through both approval tiers.
    pub async fn submit_and_approve(&self, items: Vec<SubmitItem>) -> RequisitionResponse {
        let requisition = self.submit(items).await;
        self.services()
            .requisitions
            .confirm(
                requisition.id,
                ConfirmRequest {
                    confirmed_by: DEPARTMENT_HEAD.to_string(),
                    lines: vec![],
                },
            )
            .await
            .expect("confirm requisition");
        self.services()
            .requisitions
            .approve(
                requisition.id,
                ApproveRequest {
                    approved_by: "F. Manager".to_string(),
                    role: FINANCE_MANAGER.to_string(),
                    comments: None,
                },
            )
            .await
            .expect("approve requisition")
    }
}
