use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "LabOps API",
        version = "0.1.0",
        description = r#"
# Laboratory Requisition & Stock API

Backend for laboratory inventory requisitions: a two-tier
approval-and-fulfillment workflow (submission, department-head
confirmation, finance approval, issuance, handover, final receipt), a
shortage-tolerant stock ledger, year-scoped sequential dispatch numbering,
and detached email notification dispatch.

## Requisition lifecycle

`Pending` → `Confirmed` → `Approved` → `Issued` → `Delivered` →
`Completed`, with a `Rejected` branch from the two pre-approval stages.
Direct-receiver issuance skips the handover step and lands on `Delivered`.

## Stock policy

Issuance never blocks on stock: quantities may run negative and the
uncovered portion is recorded as a shortage on the issued line and in the
issue notes.
"#
    ),
    paths(
        crate::handlers::requisitions::submit_requisition,
        crate::handlers::requisitions::list_requisitions,
        crate::handlers::requisitions::get_requisition,
        crate::handlers::requisitions::confirm_requisition,
        crate::handlers::requisitions::approve_requisition,
        crate::handlers::requisitions::reject_requisition,
        crate::handlers::requisitions::issue_requisition,
        crate::handlers::requisitions::confirm_handover,
        crate::handlers::requisitions::confirm_final_receipt,
        crate::handlers::products::create_product,
        crate::handlers::products::list_products,
        crate::handlers::products::get_product,
        crate::handlers::products::get_product_by_code,
        crate::handlers::products::update_product,
        crate::handlers::stock::adjust_stock,
        crate::handlers::stock::bulk_adjust_stock,
        crate::handlers::issues::create_issue_record,
        crate::handlers::issues::list_issue_records,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::services::requisitions::SubmitRequisitionRequest,
        crate::services::requisitions::SubmitItem,
        crate::services::requisitions::ConfirmRequest,
        crate::services::requisitions::ConfirmLine,
        crate::services::requisitions::ApproveRequest,
        crate::services::requisitions::RejectRequest,
        crate::services::requisitions::IssueRequest,
        crate::services::requisitions::IssueLine,
        crate::services::requisitions::ReceiverKind,
        crate::services::requisitions::HandoverRequest,
        crate::services::requisitions::FinalReceiptRequest,
        crate::services::requisitions::RequisitionResponse,
        crate::services::requisitions::RequisitionItemResponse,
        crate::services::requisitions::IssuedItemResponse,
        crate::services::requisitions::IssueOutcome,
        crate::services::requisitions::ShortageLine,
        crate::services::requisitions::RequisitionListResponse,
        crate::services::catalog::CreateProductRequest,
        crate::services::catalog::UpdateProductRequest,
        crate::services::catalog::ProductResponse,
        crate::services::catalog::ProductListResponse,
        crate::services::issues::DirectIssueRequest,
        crate::services::issues::IssueRecordResponse,
        crate::services::issues::IssueRecordListResponse,
        crate::handlers::stock::AdjustStockRequest,
        crate::handlers::stock::BulkAdjustStockRequest,
        crate::handlers::stock::AdjustmentLine,
    )),
    tags(
        (name = "requisitions", description = "Requisition lifecycle"),
        (name = "products", description = "Product master"),
        (name = "stock", description = "Stock ledger"),
        (name = "issues", description = "Direct issue audit log")
    )
)]
pub struct ApiDoc;

/// Swagger UI mount, merged into the application router.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
