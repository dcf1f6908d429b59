//! End-to-end tests for the requisition lifecycle:
//! submission → department-head confirmation → finance approval → issuance
//! → handover/delivery → final receipt, plus the rejection branches and the
//! uniform wrong-status guards.

mod common;

use assert_matches::assert_matches;
use common::{TestApp, DEPARTMENT_HEAD, FINANCE_MANAGER, REQUESTER, REQUESTER_EMAIL};
use labops_api::entities::requisition::{FinalReceiptMethod, RequisitionStatus};
use labops_api::errors::ServiceError;
use labops_api::services::requisitions::{
    ApproveRequest, ConfirmLine, ConfirmRequest, FinalReceiptRequest, HandoverRequest,
    IssueLine, IssueRequest, ReceiverKind, RejectRequest,
};

fn issue_request(receiver: ReceiverKind, lines: Vec<IssueLine>) -> IssueRequest {
    IssueRequest {
        issued_by: "Storekeeper".to_string(),
        notes: None,
        receiver,
        lines,
    }
}

#[tokio::test]
async fn direct_receiver_round_trip_decrements_stock_and_lands_on_delivered() {
    let app = TestApp::new().await;
    let product = app.seed_product("P1", "Petri dishes", 20).await;

    let requisition = app
        .submit_and_approve(vec![TestApp::item(product.id, "Petri dishes", 5)])
        .await;
    assert_eq!(requisition.status, RequisitionStatus::Approved);
    assert_eq!(requisition.items[0].approved_quantity, Some(5));

    let outcome = app
        .services()
        .requisitions
        .issue(
            requisition.id,
            issue_request(
                ReceiverKind::Direct,
                vec![IssueLine {
                    product_id: product.id,
                    issued_quantity: 5,
                }],
            ),
        )
        .await
        .expect("issue");

    assert_eq!(outcome.requisition.status, RequisitionStatus::Delivered);
    assert!(outcome.shortages.is_empty());
    assert_eq!(outcome.requisition.issued_items.len(), 1);
    assert_eq!(outcome.requisition.issued_items[0].issued_quantity, 5);
    // The requested list keeps its pre-issuance quantities for audit.
    assert_eq!(outcome.requisition.items[0].approved_quantity, Some(5));

    let product = app.services().catalog.get(product.id).await.unwrap();
    assert_eq!(product.quantity, 15);
}

#[tokio::test]
async fn driver_receiver_path_requires_handover_before_receipt() {
    let app = TestApp::new().await;
    let product = app.seed_product("P2", "Nitrile gloves", 50).await;

    let requisition = app
        .submit_and_approve(vec![TestApp::item(product.id, "Nitrile gloves", 10)])
        .await;

    let outcome = app
        .services()
        .requisitions
        .issue(
            requisition.id,
            issue_request(
                ReceiverKind::Driver,
                vec![IssueLine {
                    product_id: product.id,
                    issued_quantity: 10,
                }],
            ),
        )
        .await
        .expect("issue");
    assert_eq!(outcome.requisition.status, RequisitionStatus::Issued);

    // Final receipt is not legal until the handover is confirmed.
    let err = app
        .services()
        .requisitions
        .confirm_final_receipt(
            requisition.id,
            FinalReceiptRequest {
                received_by: REQUESTER.to_string(),
                signature: "sig-final".to_string(),
                method: FinalReceiptMethod::QrScan,
                notes: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidState { .. });

    let delivered = app
        .services()
        .requisitions
        .confirm_handover(
            requisition.id,
            HandoverRequest {
                received_by: "D. River".to_string(),
                signature: "sig-driver".to_string(),
                notes: Some("cold chain intact".to_string()),
            },
        )
        .await
        .expect("handover");
    assert_eq!(delivered.status, RequisitionStatus::Delivered);
    assert_eq!(delivered.driver_received_by.as_deref(), Some("D. River"));

    let completed = app
        .services()
        .requisitions
        .confirm_final_receipt(
            requisition.id,
            FinalReceiptRequest {
                received_by: REQUESTER.to_string(),
                signature: "sig-final".to_string(),
                method: FinalReceiptMethod::SystemScan,
                notes: None,
            },
        )
        .await
        .expect("final receipt");
    assert_eq!(completed.status, RequisitionStatus::Completed);
    assert_eq!(
        completed.final_receipt_method,
        Some(FinalReceiptMethod::SystemScan)
    );
}

#[tokio::test]
async fn issue_from_wrong_status_fails_and_leaves_everything_unchanged() {
    let app = TestApp::new().await;
    let product = app.seed_product("P3", "Ethanol 96%", 30).await;

    // Still Pending: not confirmed, not approved.
    let requisition = app
        .submit(vec![TestApp::item(product.id, "Ethanol 96%", 5)])
        .await;

    let err = app
        .services()
        .requisitions
        .issue(
            requisition.id,
            issue_request(
                ReceiverKind::Direct,
                vec![IssueLine {
                    product_id: product.id,
                    issued_quantity: 5,
                }],
            ),
        )
        .await
        .unwrap_err();
    match err {
        ServiceError::InvalidState { current, expected } => {
            assert_eq!(current, "Pending");
            assert_eq!(expected, "Approved");
        }
        other => panic!("expected InvalidState, got {:?}", other),
    }

    // No partial effects: stock untouched, no issued lines, status unchanged.
    let product = app.services().catalog.get(product.id).await.unwrap();
    assert_eq!(product.quantity, 30);
    let reloaded = app.services().requisitions.get(requisition.id).await.unwrap();
    assert_eq!(reloaded.status, RequisitionStatus::Pending);
    assert!(reloaded.issued_items.is_empty());
}

#[tokio::test]
async fn double_issue_fails_without_double_decrement() {
    let app = TestApp::new().await;
    let product = app.seed_product("P4", "Pipette tips", 100).await;

    let requisition = app
        .submit_and_approve(vec![TestApp::item(product.id, "Pipette tips", 10)])
        .await;

    let lines = vec![IssueLine {
        product_id: product.id,
        issued_quantity: 10,
    }];
    app.services()
        .requisitions
        .issue(
            requisition.id,
            issue_request(ReceiverKind::Direct, lines.clone()),
        )
        .await
        .expect("first issue");

    let err = app
        .services()
        .requisitions
        .issue(requisition.id, issue_request(ReceiverKind::Direct, lines))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidState { .. });

    let product = app.services().catalog.get(product.id).await.unwrap();
    assert_eq!(product.quantity, 90, "stock decremented exactly once");
}

#[tokio::test]
async fn shortage_tolerant_issuance_records_shortage_and_goes_negative() {
    let app = TestApp::new().await;
    let product = app.seed_product("P5", "Agar plates", 4).await;

    let requisition = app
        .submit_and_approve(vec![TestApp::item(product.id, "Agar plates", 10)])
        .await;

    let outcome = app
        .services()
        .requisitions
        .issue(
            requisition.id,
            IssueRequest {
                issued_by: "Storekeeper".to_string(),
                notes: Some("urgent".to_string()),
                receiver: ReceiverKind::Direct,
                lines: vec![IssueLine {
                    product_id: product.id,
                    issued_quantity: 10,
                }],
            },
        )
        .await
        .expect("shortage never blocks issuance");

    assert_eq!(outcome.shortages.len(), 1);
    assert_eq!(outcome.shortages[0].shortage, 6);
    assert_eq!(outcome.requisition.issued_items[0].shortage, 6);
    let notes = outcome.requisition.issue_notes.unwrap();
    assert!(notes.contains("urgent"));
    assert!(notes.contains("Agar plates short by 6"));

    let product = app.services().catalog.get(product.id).await.unwrap();
    assert_eq!(product.quantity, -6, "backorder model lets stock go negative");
}

#[tokio::test]
async fn rejected_from_confirmed_is_terminal_with_full_audit() {
    let app = TestApp::new().await;
    let product = app.seed_product("P6", "Syringes", 40).await;

    let requisition = app.submit(vec![TestApp::item(product.id, "Syringes", 5)]).await;
    app.services()
        .requisitions
        .confirm(
            requisition.id,
            ConfirmRequest {
                confirmed_by: DEPARTMENT_HEAD.to_string(),
                lines: vec![],
            },
        )
        .await
        .expect("confirm");

    let rejected = app
        .services()
        .requisitions
        .reject(
            requisition.id,
            RejectRequest {
                rejected_by: "F. Manager".to_string(),
                reason: "Budget exhausted for this quarter".to_string(),
                stage: Some(FINANCE_MANAGER.to_string()),
            },
        )
        .await
        .expect("reject");

    assert_eq!(rejected.status, RequisitionStatus::Rejected);
    assert_eq!(rejected.rejected_by.as_deref(), Some("F. Manager"));
    assert!(rejected.rejected_at.is_some());
    assert_eq!(
        rejected.rejection_reason.as_deref(),
        Some("Budget exhausted for this quarter")
    );
    assert_eq!(rejected.rejection_stage.as_deref(), Some(FINANCE_MANAGER));

    // Terminal: every further transition fails.
    let confirm_err = app
        .services()
        .requisitions
        .confirm(
            requisition.id,
            ConfirmRequest {
                confirmed_by: DEPARTMENT_HEAD.to_string(),
                lines: vec![],
            },
        )
        .await
        .unwrap_err();
    assert_matches!(confirm_err, ServiceError::InvalidState { .. });

    let approve_err = app
        .services()
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
        .unwrap_err();
    assert_matches!(approve_err, ServiceError::InvalidState { .. });

    let issue_err = app
        .services()
        .requisitions
        .issue(
            requisition.id,
            issue_request(
                ReceiverKind::Direct,
                vec![IssueLine {
                    product_id: product.id,
                    issued_quantity: 5,
                }],
            ),
        )
        .await
        .unwrap_err();
    assert_matches!(issue_err, ServiceError::InvalidState { .. });
}

#[tokio::test]
async fn reject_requires_a_reason() {
    let app = TestApp::new().await;
    let product = app.seed_product("P7", "Masks", 10).await;
    let requisition = app.submit(vec![TestApp::item(product.id, "Masks", 2)]).await;

    let err = app
        .services()
        .requisitions
        .reject(
            requisition.id,
            RejectRequest {
                rejected_by: DEPARTMENT_HEAD.to_string(),
                reason: "".to_string(),
                stage: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationFailed(_));

    let reloaded = app.services().requisitions.get(requisition.id).await.unwrap();
    assert_eq!(reloaded.status, RequisitionStatus::Pending);
}

#[tokio::test]
async fn only_the_resolved_department_head_may_confirm_or_reject_pending() {
    let app = TestApp::new().await;
    let product = app.seed_product("P8", "Tube racks", 10).await;
    let requisition = app.submit(vec![TestApp::item(product.id, "Tube racks", 2)]).await;
    assert_eq!(requisition.approver1, DEPARTMENT_HEAD);

    let err = app
        .services()
        .requisitions
        .confirm(
            requisition.id,
            ConfirmRequest {
                confirmed_by: "Somebody Else".to_string(),
                lines: vec![],
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationFailed(_));

    let err = app
        .services()
        .requisitions
        .reject(
            requisition.id,
            RejectRequest {
                rejected_by: "Somebody Else".to_string(),
                reason: "not needed".to_string(),
                stage: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationFailed(_));
}

#[tokio::test]
async fn approval_requires_the_finance_role() {
    let app = TestApp::new().await;
    let product = app.seed_product("P9", "Buffers", 10).await;
    let requisition = app.submit(vec![TestApp::item(product.id, "Buffers", 2)]).await;
    app.services()
        .requisitions
        .confirm(
            requisition.id,
            ConfirmRequest {
                confirmed_by: DEPARTMENT_HEAD.to_string(),
                lines: vec![],
            },
        )
        .await
        .unwrap();

    let err = app
        .services()
        .requisitions
        .approve(
            requisition.id,
            ApproveRequest {
                approved_by: "Impatient Intern".to_string(),
                role: "Lab Assistant".to_string(),
                comments: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationFailed(_));
}

#[tokio::test]
async fn confirm_defaults_approved_quantities_and_honors_overrides() {
    let app = TestApp::new().await;
    let p1 = app.seed_product("P10", "Beakers", 30).await;
    let p2 = app.seed_product("P11", "Flasks", 30).await;

    let requisition = app
        .submit(vec![
            TestApp::item(p1.id, "Beakers", 6),
            TestApp::item(p2.id, "Flasks", 8),
        ])
        .await;

    let confirmed = app
        .services()
        .requisitions
        .confirm(
            requisition.id,
            ConfirmRequest {
                confirmed_by: DEPARTMENT_HEAD.to_string(),
                lines: vec![ConfirmLine {
                    product_id: p2.id,
                    approved_quantity: 4,
                    approval_notes: Some("half for now".to_string()),
                }],
            },
        )
        .await
        .expect("confirm");

    let beakers = confirmed
        .items
        .iter()
        .find(|i| i.product_id == p1.id)
        .unwrap();
    assert_eq!(beakers.approved_quantity, Some(6), "defaults to requested");
    let flasks = confirmed
        .items
        .iter()
        .find(|i| i.product_id == p2.id)
        .unwrap();
    assert_eq!(flasks.approved_quantity, Some(4));
    assert_eq!(flasks.approval_notes.as_deref(), Some("half for now"));
}

#[tokio::test]
async fn submission_validates_line_items() {
    let app = TestApp::new().await;
    let product = app.seed_product("P12", "Stir bars", 10).await;

    // Empty line list
    let err = app
        .services()
        .requisitions
        .submit(TestApp::submit_request(vec![]))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationFailed(_));

    // Duplicate product lines
    let err = app
        .services()
        .requisitions
        .submit(TestApp::submit_request(vec![
            TestApp::item(product.id, "Stir bars", 1),
            TestApp::item(product.id, "Stir bars", 2),
        ]))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationFailed(_));

    // Non-positive quantity
    let err = app
        .services()
        .requisitions
        .submit(TestApp::submit_request(vec![TestApp::item(
            product.id,
            "Stir bars",
            0,
        )]))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationFailed(_));

    // Unknown department
    let mut request = TestApp::submit_request(vec![TestApp::item(product.id, "Stir bars", 1)]);
    request.department = "Astrology".to_string();
    let err = app.services().requisitions.submit(request).await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn handover_and_receipt_require_signatures() {
    let app = TestApp::new().await;
    let product = app.seed_product("P13", "Cuvettes", 20).await;
    let requisition = app
        .submit_and_approve(vec![TestApp::item(product.id, "Cuvettes", 5)])
        .await;
    app.services()
        .requisitions
        .issue(
            requisition.id,
            issue_request(
                ReceiverKind::Driver,
                vec![IssueLine {
                    product_id: product.id,
                    issued_quantity: 5,
                }],
            ),
        )
        .await
        .unwrap();

    let err = app
        .services()
        .requisitions
        .confirm_handover(
            requisition.id,
            HandoverRequest {
                received_by: "D. River".to_string(),
                signature: "".to_string(),
                notes: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationFailed(_));

    // The failed attempt must not have advanced the status.
    let reloaded = app.services().requisitions.get(requisition.id).await.unwrap();
    assert_eq!(reloaded.status, RequisitionStatus::Issued);
}

#[tokio::test]
async fn lifecycle_notifications_reach_the_configured_targets() {
    let app = TestApp::new().await;
    let product = app.seed_product("P14", "Filters", 20).await;

    let requisition = app.submit(vec![TestApp::item(product.id, "Filters", 3)]).await;
    // Dispatch is detached; give the spawned tasks a beat to run.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    {
        let approvals = app.notices.approvals.lock().unwrap();
        assert_eq!(approvals.len(), 1);
        assert_eq!(approvals[0].approver_email, "okoye@lab.example");
        assert_eq!(approvals[0].department, common::DEPARTMENT);
    }

    app.services()
        .requisitions
        .reject(
            requisition.id,
            RejectRequest {
                rejected_by: DEPARTMENT_HEAD.to_string(),
                reason: "duplicate request".to_string(),
                stage: None,
            },
        )
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    {
        let rejections = app.notices.rejections.lock().unwrap();
        assert_eq!(rejections.len(), 1);
        assert_eq!(rejections[0].requester_email, REQUESTER_EMAIL);
        assert_eq!(rejections[0].stage, "Department Head");
    }
}

#[tokio::test]
async fn list_filters_by_status_and_requester() {
    let app = TestApp::new().await;
    let product = app.seed_product("P15", "Tips", 50).await;

    let first = app.submit(vec![TestApp::item(product.id, "Tips", 1)]).await;
    let _second = app.submit(vec![TestApp::item(product.id, "Tips", 2)]).await;
    app.services()
        .requisitions
        .confirm(
            first.id,
            ConfirmRequest {
                confirmed_by: DEPARTMENT_HEAD.to_string(),
                lines: vec![],
            },
        )
        .await
        .unwrap();

    let pending = app
        .services()
        .requisitions
        .list(labops_api::services::requisitions::RequisitionFilter {
            status: Some(RequisitionStatus::Pending),
            requested_by: None,
            page: 1,
            per_page: 20,
        })
        .await
        .unwrap();
    assert_eq!(pending.total, 1);
    assert_eq!(pending.requisitions[0].status, RequisitionStatus::Pending);

    let by_requester = app
        .services()
        .requisitions
        .list(labops_api::services::requisitions::RequisitionFilter {
            status: None,
            requested_by: Some(REQUESTER.to_string()),
            page: 1,
            per_page: 20,
        })
        .await
        .unwrap();
    assert_eq!(by_requester.total, 2);
}
