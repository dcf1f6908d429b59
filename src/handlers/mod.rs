pub mod health;
pub mod issues;
pub mod products;
pub mod requisitions;
pub mod stock;

use std::sync::Arc;

use crate::db::DbPool;
use crate::events::EventSender;
use crate::notifications::NotificationDispatcher;
use crate::services::approvals::ApprovalRuleLookup;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub requisitions: Arc<crate::services::requisitions::RequisitionService>,
    pub stock: Arc<crate::services::stock::StockLedger>,
    pub catalog: Arc<crate::services::catalog::CatalogService>,
    pub issues: Arc<crate::services::issues::IssueRecordService>,
    pub numbering: Arc<crate::services::numbering::DispatchNumberGenerator>,
}

impl AppServices {
    /// Wires every service against the shared pool, event bus, and the
    /// injected collaborator seams.
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        approvals: Arc<dyn ApprovalRuleLookup>,
        fulfillment_email: Option<String>,
    ) -> Self {
        let numbering = Arc::new(crate::services::numbering::DispatchNumberGenerator::new(
            db_pool.clone(),
        ));
        let stock = Arc::new(crate::services::stock::StockLedger::new(
            db_pool.clone(),
            Some(event_sender.clone()),
        ));
        let catalog = Arc::new(crate::services::catalog::CatalogService::new(
            db_pool.clone(),
            Some(event_sender.clone()),
        ));
        let issues = Arc::new(crate::services::issues::IssueRecordService::new(
            db_pool.clone(),
            Some(event_sender.clone()),
        ));
        let requisitions = Arc::new(crate::services::requisitions::RequisitionService::new(
            db_pool,
            numbering.clone(),
            approvals,
            dispatcher,
            Some(event_sender),
            fulfillment_email,
        ));

        Self {
            requisitions,
            stock,
            catalog,
            issues,
            numbering,
        }
    }
}
