use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

/// Body for the approval-request email (`POST /api/email/approval`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalEmail {
    pub requisition_id: Uuid,
    pub approver_email: String,
    pub requester_name: String,
    pub department: String,
}

/// Body for the rejection email (`POST /api/email/rejection`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionEmail {
    pub requisition_id: Uuid,
    pub requester_email: String,
    pub rejector_name: String,
    pub reason: String,
    pub stage: String,
}

/// One issued line as rendered into the issuance email.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedProductLine {
    pub product_id: Uuid,
    pub name: String,
    pub unit: String,
    pub requested_quantity: i32,
    pub issued_quantity: i32,
}

/// Body for the issuance email (`POST /api/email/issuance`). Also reused
/// for handover/receipt notices, with the stage described in `notes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceEmail {
    pub requisition_id: Uuid,
    pub requester_email: String,
    pub requester_name: String,
    pub issued_products: Vec<IssuedProductLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid notification endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
    #[error("Notification service rejected request: status {status}")]
    Rejected { status: u16 },
}

/// Outbound notification seam. Implementations deliver to the external
/// email/notification service; callers schedule them detached via
/// [`dispatch_detached`] so a hung or failing downstream never holds up a
/// state transition.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn approval_request(&self, email: ApprovalEmail) -> Result<(), NotificationError>;
    async fn rejection(&self, email: RejectionEmail) -> Result<(), NotificationError>;
    async fn issuance(&self, email: IssuanceEmail) -> Result<(), NotificationError>;
}

/// HTTP client for the external email service.
/// Constructed once at boot and injected; no ambient global transporter.
#[derive(Clone)]
pub struct HttpNotificationDispatcher {
    client: Client,
    base_url: Url,
}

impl HttpNotificationDispatcher {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, NotificationError> {
        let base_url = Url::parse(base_url)?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<(), NotificationError> {
        let url = self.base_url.join(path)?;
        let response = self.client.post(url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl NotificationDispatcher for HttpNotificationDispatcher {
    #[instrument(skip(self, email), fields(requisition_id = %email.requisition_id))]
    async fn approval_request(&self, email: ApprovalEmail) -> Result<(), NotificationError> {
        self.post("api/email/approval", &email).await?;
        info!(requisition_id = %email.requisition_id, "Approval request email dispatched");
        Ok(())
    }

    #[instrument(skip(self, email), fields(requisition_id = %email.requisition_id))]
    async fn rejection(&self, email: RejectionEmail) -> Result<(), NotificationError> {
        self.post("api/email/rejection", &email).await?;
        info!(requisition_id = %email.requisition_id, "Rejection email dispatched");
        Ok(())
    }

    #[instrument(skip(self, email), fields(requisition_id = %email.requisition_id))]
    async fn issuance(&self, email: IssuanceEmail) -> Result<(), NotificationError> {
        self.post("api/email/issuance", &email).await?;
        info!(requisition_id = %email.requisition_id, "Issuance email dispatched");
        Ok(())
    }
}

/// No-op dispatcher used when no notification endpoint is configured.
#[derive(Clone, Default)]
pub struct NoopDispatcher;

#[async_trait]
impl NotificationDispatcher for NoopDispatcher {
    async fn approval_request(&self, email: ApprovalEmail) -> Result<(), NotificationError> {
        debug!(requisition_id = %email.requisition_id, "Notification dispatch disabled; approval request dropped");
        Ok(())
    }

    async fn rejection(&self, email: RejectionEmail) -> Result<(), NotificationError> {
        debug!(requisition_id = %email.requisition_id, "Notification dispatch disabled; rejection dropped");
        Ok(())
    }

    async fn issuance(&self, email: IssuanceEmail) -> Result<(), NotificationError> {
        debug!(requisition_id = %email.requisition_id, "Notification dispatch disabled; issuance dropped");
        Ok(())
    }
}

/// Fire-and-forget scheduling: the future is detached onto the runtime, its
/// outcome is logged, and the caller returns without awaiting it. Transition
/// success never depends on delivery.
pub fn dispatch_detached<F>(context: &'static str, fut: F)
where
    F: Future<Output = Result<(), NotificationError>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(error) = fut.await {
            warn!(error = %error, context = context, "Notification dispatch failed");
        }
    });
}
