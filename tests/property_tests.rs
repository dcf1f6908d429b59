//! Property-based tests for the pure core: the transition table, the
//! shortage formula, and the dispatch number format.

use labops_api::entities::requisition::{RequisitionStatus, TransitionEvent};
use labops_api::services::numbering::{
    format_dispatch_number, is_fallback_dispatch_number, is_sequential_dispatch_number,
};
use labops_api::services::stock::debit_shortage;
use proptest::prelude::*;
use rstest::rstest;

const ALL_STATUSES: [RequisitionStatus; 7] = [
    RequisitionStatus::Pending,
    RequisitionStatus::Confirmed,
    RequisitionStatus::Approved,
    RequisitionStatus::Issued,
    RequisitionStatus::Delivered,
    RequisitionStatus::Completed,
    RequisitionStatus::Rejected,
];

const ALL_EVENTS: [TransitionEvent; 7] = [
    TransitionEvent::Confirm,
    TransitionEvent::Approve,
    TransitionEvent::Reject,
    TransitionEvent::IssueToDriver,
    TransitionEvent::IssueDirect,
    TransitionEvent::ConfirmHandover,
    TransitionEvent::ConfirmFinalReceipt,
];

#[rstest]
#[case(1, "REQ-2024-000001")]
#[case(41_182, "REQ-2024-041182")]
#[case(999_999, "REQ-2024-999999")]
#[case(1_000_000, "REQ-2024-1000000")]
fn dispatch_numbers_render_byte_for_byte(#[case] seq: i64, #[case] expected: &str) {
    assert_eq!(format_dispatch_number(2024, seq), expected);
}

fn status_strategy() -> impl Strategy<Value = RequisitionStatus> {
    proptest::sample::select(ALL_STATUSES.to_vec())
}

fn event_strategy() -> impl Strategy<Value = TransitionEvent> {
    proptest::sample::select(ALL_EVENTS.to_vec())
}

proptest! {
    /// Terminal states admit no transition whatsoever.
    #[test]
    fn terminal_states_are_closed(event in event_strategy()) {
        prop_assert_eq!(RequisitionStatus::Rejected.apply(event), None);
        prop_assert_eq!(RequisitionStatus::Completed.apply(event), None);
    }

    /// A successful transition never yields the status it started from, and
    /// `Rejected` is only reachable via the reject event.
    #[test]
    fn transitions_move_forward(status in status_strategy(), event in event_strategy()) {
        if let Some(next) = status.apply(event) {
            prop_assert_ne!(next, status);
            if next == RequisitionStatus::Rejected {
                prop_assert_eq!(event, TransitionEvent::Reject);
                prop_assert!(matches!(
                    status,
                    RequisitionStatus::Pending | RequisitionStatus::Confirmed
                ));
            }
        }
    }

    /// Every non-terminal status accepts exactly one forward event, plus
    /// the rejection branch from the two pre-approval stages; `Approved`
    /// accepts the two issuance variants.
    #[test]
    fn out_degree_matches_the_table(status in status_strategy()) {
        let accepted = ALL_EVENTS
            .iter()
            .filter(|event| status.apply(**event).is_some())
            .count();
        let expected = match status {
            RequisitionStatus::Pending | RequisitionStatus::Confirmed => 2,
            RequisitionStatus::Approved => 2,
            RequisitionStatus::Issued | RequisitionStatus::Delivered => 1,
            RequisitionStatus::Completed | RequisitionStatus::Rejected => 0,
        };
        prop_assert_eq!(accepted, expected);
    }

    /// `debit_shortage(before + delta, delta)` equals the specified
    /// `max(0, -delta - before)` for debits, and is zero for credits.
    #[test]
    fn shortage_matches_the_ledger_formula(
        before in -1_000_000i32..1_000_000,
        delta in -1_000_000i32..1_000_000,
    ) {
        let new_quantity = before + delta;
        let shortage = debit_shortage(new_quantity, delta);
        if delta < 0 {
            prop_assert_eq!(shortage, (-delta - before).max(0));
        } else {
            prop_assert_eq!(shortage, 0);
        }
        prop_assert!(shortage >= 0);
    }

    /// Sequential numbers always match the wire format and never the
    /// fallback format.
    #[test]
    fn sequential_format_is_stable(year in 1000i32..10_000, seq in 1i64..100_000_000) {
        let number = format_dispatch_number(year, seq);
        prop_assert!(is_sequential_dispatch_number(&number));
        prop_assert!(!is_fallback_dispatch_number(&number));
    }

    /// Within the six-digit width, lexicographic order equals numeric order
    /// (the fixed-width sort invariant the fallback format sacrifices).
    #[test]
    fn zero_padding_preserves_sort_order(
        year in 1000i32..10_000,
        a in 1i64..=999_999,
        b in 1i64..=999_999,
    ) {
        let fa = format_dispatch_number(year, a);
        let fb = format_dispatch_number(year, b);
        prop_assert_eq!(a.cmp(&b), fa.cmp(&fb));
    }
}
