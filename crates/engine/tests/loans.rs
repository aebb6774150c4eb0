mod common;

use std::sync::Arc;

use sea_orm::{ConnectionTrait, Statement};

use common::{
    FailingNotifier, RecordingNotifier, add_member, at, build_engine, deactivate_member,
    engine_with_db, inr,
};
use engine::{
    ApprovalTerms, EngineError, EntryMode, ErrorKind, IntegrityWarning, InterestRate, LoanStatus,
    NewEntry, NotificationKind,
};
use uuid::Uuid;

#[tokio::test]
async fn deposit_loan_and_installments_scenario() {
    let (engine, db) = engine_with_db().await;
    let member = add_member(&db, "Asha", at(2025, 1, 1), None).await;
    for (month, amount) in [(1, inr(1000)), (2, inr(2000))] {
        engine
            .append_entry(NewEntry::deposit(member, amount, at(2025, month, 10)))
            .await
            .unwrap();
    }

    let loan = engine
        .request_loan(member, inr(2000), 1200, None, at(2025, 3, 1))
        .await
        .unwrap();
    assert_eq!(loan.status, LoanStatus::Pending);
    let loan = engine
        .approve_loan(loan.id, ApprovalTerms::within_cap(), at(2025, 3, 2))
        .await
        .unwrap();
    assert_eq!(loan.status, LoanStatus::Active);
    assert_eq!(loan.remaining_balance, inr(2000));

    let balance = engine.remaining_balance(member).await.unwrap();
    assert!(balance.has_active_loan);
    assert_eq!(balance.loan_id, Some(loan.id));
    assert_eq!(balance.remaining_balance, inr(2000));

    for month in [4, 5] {
        engine
            .append_entry(NewEntry::installment(
                member,
                loan.id,
                inr(500),
                at(2025, month, 1),
            ))
            .await
            .unwrap();
    }

    let balance = engine.remaining_balance(member).await.unwrap();
    assert_eq!(balance.loan_amount, inr(2000));
    assert_eq!(balance.remaining_balance, inr(1000));
    assert!(balance.warnings.is_empty());
    assert_eq!(engine.total_deposits(member).await.unwrap(), inr(3000));

    // An active loan can no longer be rejected.
    let entries_before = engine.passbook(member).await.unwrap().len();
    let err = engine
        .reject_loan(loan.id, at(2025, 5, 2))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);
    assert_eq!(
        engine.loan(loan.id).await.unwrap().status,
        LoanStatus::Active
    );
    assert_eq!(
        engine.passbook(member).await.unwrap().len(),
        entries_before
    );
    assert_eq!(
        engine.remaining_balance(member).await.unwrap().remaining_balance,
        inr(1000)
    );
}

#[tokio::test]
async fn approval_above_the_cap_needs_an_override() {
    let (engine, db) = engine_with_db().await;
    let member = add_member(&db, "Asha", at(2025, 1, 1), None).await;
    engine
        .append_entry(NewEntry::deposit(member, inr(1000), at(2025, 1, 10)))
        .await
        .unwrap();
    let loan = engine
        .request_loan(member, inr(801), 1200, None, at(2025, 3, 1))
        .await
        .unwrap();

    let err = engine
        .approve_loan(loan.id, ApprovalTerms::within_cap(), at(2025, 3, 2))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAmount);
    assert_eq!(
        engine.loan(loan.id).await.unwrap().status,
        LoanStatus::Pending
    );
    assert_eq!(engine.passbook(member).await.unwrap().len(), 1);

    // A deposit posted after the request counts at approval time.
    engine
        .append_entry(NewEntry::deposit(member, inr(2), at(2025, 3, 2)))
        .await
        .unwrap();
    let approved = engine
        .approve_loan(loan.id, ApprovalTerms::within_cap(), at(2025, 3, 3))
        .await
        .unwrap();
    assert_eq!(approved.status, LoanStatus::Active);
}

#[tokio::test]
async fn override_approves_above_the_cap() {
    let (engine, db) = engine_with_db().await;
    let member = add_member(&db, "Asha", at(2025, 1, 1), None).await;
    let loan = engine
        .request_loan(member, inr(5000), 1200, None, at(2025, 3, 1))
        .await
        .unwrap();

    let approved = engine
        .approve_loan(loan.id, ApprovalTerms::overriding_cap(), at(2025, 3, 2))
        .await
        .unwrap();
    assert_eq!(approved.status, LoanStatus::Active);
    assert_eq!(approved.remaining_balance, inr(5000));
    assert_eq!(engine.eligibility(member).await.unwrap().cap, 0);
}

#[tokio::test]
async fn approval_records_the_repayment_schedule() {
    let (engine, db) = engine_with_db().await;
    let member = add_member(&db, "Asha", at(2025, 1, 1), None).await;
    engine
        .append_entry(NewEntry::deposit(member, inr(5000), at(2025, 1, 10)))
        .await
        .unwrap();
    let loan = engine
        .request_loan(member, inr(2400), 1200, None, at(2025, 3, 1))
        .await
        .unwrap();
    assert_eq!(loan.installments_count, None);

    let err = engine
        .approve_loan(
            loan.id,
            ApprovalTerms::within_cap().with_schedule(0, inr(220)),
            at(2025, 3, 2),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let approved = engine
        .approve_loan(
            loan.id,
            ApprovalTerms::within_cap().with_schedule(12, inr(220)),
            at(2025, 3, 2),
        )
        .await
        .unwrap();
    assert_eq!(approved.installments_count, Some(12));
    assert_eq!(approved.installment_amount, Some(inr(220)));
    assert_eq!(approved.remaining_balance, inr(2400));

    let stored = engine.loan(loan.id).await.unwrap();
    assert_eq!(stored, approved);

    let disbursement = engine
        .passbook(member)
        .await
        .unwrap()
        .into_iter()
        .find(|entry| entry.mode == EntryMode::LoanApproval)
        .unwrap();
    assert_eq!(
        disbursement.description.as_deref(),
        Some("Loan disbursed: ₹2400.00, Installments: 12, EMI: ₹220.00, Total payable: ₹2640.00")
    );
}

#[tokio::test]
async fn no_active_loan_reports_zero_balance() {
    let (engine, db) = engine_with_db().await;
    let member = add_member(&db, "Asha", at(2025, 1, 1), None).await;

    let balance = engine.remaining_balance(member).await.unwrap();
    assert!(!balance.has_active_loan);
    assert_eq!(balance.loan_id, None);
    assert_eq!(balance.remaining_balance, 0);
}

#[tokio::test]
async fn request_validates_amount_rate_and_member() {
    let (engine, db) = engine_with_db().await;
    let member = add_member(&db, "Asha", at(2025, 1, 1), None).await;

    let err = engine
        .request_loan(member, 0, 1200, None, at(2025, 2, 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAmount);

    let err = engine
        .request_loan(member, inr(10), -1, None, at(2025, 2, 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = engine
        .request_loan(Uuid::new_v4(), inr(10), 1200, None, at(2025, 2, 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    deactivate_member(&db, member).await;
    let err = engine
        .request_loan(member, inr(10), 1200, None, at(2025, 2, 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert!(engine.pending_loans().await.unwrap().is_empty());
}

#[tokio::test]
async fn second_approval_fails_and_posts_nothing() {
    let (engine, db) = engine_with_db().await;
    let member = add_member(&db, "Asha", at(2025, 1, 1), None).await;
    let loan = engine
        .request_loan(member, inr(2000), 1200, None, at(2025, 3, 1))
        .await
        .unwrap();

    engine
        .approve_loan(loan.id, ApprovalTerms::overriding_cap(), at(2025, 3, 2))
        .await
        .unwrap();
    let err = engine
        .approve_loan(loan.id, ApprovalTerms::overriding_cap(), at(2025, 3, 3))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);

    let approvals = engine
        .passbook(member)
        .await
        .unwrap()
        .into_iter()
        .filter(|entry| entry.mode == EntryMode::LoanApproval)
        .count();
    assert_eq!(approvals, 1);
}

#[tokio::test]
async fn concurrent_approvals_have_exactly_one_winner() {
    let (engine, db) = engine_with_db().await;
    let member = add_member(&db, "Asha", at(2025, 1, 1), None).await;
    let loan = engine
        .request_loan(member, inr(2000), 1200, None, at(2025, 3, 1))
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        engine.approve_loan(loan.id, ApprovalTerms::overriding_cap(), at(2025, 3, 2)),
        engine.approve_loan(loan.id, ApprovalTerms::overriding_cap(), at(2025, 3, 2)),
    );
    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|result| result.is_ok()).count(), 1);
    assert!(outcomes.iter().any(|result| matches!(
        result,
        Err(EngineError::InvalidStateTransition(_))
    )));

    let approvals = engine
        .passbook(member)
        .await
        .unwrap()
        .into_iter()
        .filter(|entry| entry.mode == EntryMode::LoanApproval)
        .count();
    assert_eq!(approvals, 1);
}

#[tokio::test]
async fn approval_rolls_back_when_disbursement_cannot_be_posted() {
    let (engine, db) = engine_with_db().await;
    let member = add_member(&db, "Asha", at(2025, 1, 1), None).await;
    let loan = engine
        .request_loan(member, inr(2000), 1200, None, at(2025, 3, 1))
        .await
        .unwrap();

    db.execute_unprepared(
        "CREATE TRIGGER ledger_closed BEFORE INSERT ON passbook_entries \
         BEGIN SELECT RAISE(ABORT, 'ledger closed'); END",
    )
    .await
    .unwrap();

    let err = engine
        .approve_loan(loan.id, ApprovalTerms::overriding_cap(), at(2025, 3, 2))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Database);

    let stored = engine.loan(loan.id).await.unwrap();
    assert_eq!(stored.status, LoanStatus::Pending);
    assert_eq!(stored.remaining_balance, 0);
    assert!(engine.passbook(member).await.unwrap().is_empty());
}

#[tokio::test]
async fn rejection_is_terminal_and_leaves_passbook_untouched() {
    let (engine, db) = engine_with_db().await;
    let member = add_member(&db, "Asha", at(2025, 1, 1), None).await;
    let loan = engine
        .request_loan(member, inr(2000), 1200, None, at(2025, 3, 1))
        .await
        .unwrap();

    let rejected = engine.reject_loan(loan.id, at(2025, 3, 2)).await.unwrap();
    assert_eq!(rejected.status, LoanStatus::Rejected);
    assert!(engine.passbook(member).await.unwrap().is_empty());

    for result in [
        engine
            .approve_loan(loan.id, ApprovalTerms::overriding_cap(), at(2025, 3, 3))
            .await,
        engine.reject_loan(loan.id, at(2025, 3, 3)).await,
    ] {
        assert_eq!(
            result.unwrap_err().kind(),
            ErrorKind::InvalidStateTransition
        );
    }
}

#[tokio::test]
async fn one_active_loan_per_member() {
    let (engine, db) = engine_with_db().await;
    let member = add_member(&db, "Asha", at(2025, 1, 1), None).await;
    let first = engine
        .request_loan(member, inr(1000), 1200, None, at(2025, 3, 1))
        .await
        .unwrap();
    let second = engine
        .request_loan(member, inr(500), 1200, None, at(2025, 3, 2))
        .await
        .unwrap();

    let pending: Vec<Uuid> = engine
        .pending_loans()
        .await
        .unwrap()
        .into_iter()
        .map(|loan| loan.id)
        .collect();
    assert_eq!(pending, vec![first.id, second.id]);

    engine
        .approve_loan(first.id, ApprovalTerms::overriding_cap(), at(2025, 3, 3))
        .await
        .unwrap();
    let err = engine
        .approve_loan(second.id, ApprovalTerms::overriding_cap(), at(2025, 3, 4))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);
    assert_eq!(
        engine.loan(second.id).await.unwrap().status,
        LoanStatus::Pending
    );
}

#[tokio::test]
async fn final_installment_closes_the_loan() {
    let notifier = Arc::new(RecordingNotifier::default());
    let (engine, db) = build_engine(InterestRate::default(), Some(notifier.clone())).await;
    let member = add_member(&db, "Asha", at(2025, 1, 1), None).await;
    let loan = engine
        .request_loan(member, inr(1000), 1200, None, at(2025, 3, 1))
        .await
        .unwrap();
    engine
        .approve_loan(loan.id, ApprovalTerms::overriding_cap(), at(2025, 3, 2))
        .await
        .unwrap();

    let receipt = engine
        .record_installment(loan.id, inr(600), inr(10), at(2025, 4, 1), Some("  april "))
        .await
        .unwrap();
    assert_eq!(receipt.status, LoanStatus::Active);
    assert_eq!(receipt.remaining_balance, inr(400));

    let err = engine
        .record_installment(loan.id, inr(401), 0, at(2025, 5, 1), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAmount);

    let receipt = engine
        .record_installment(loan.id, inr(400), 0, at(2025, 5, 1), None)
        .await
        .unwrap();
    assert_eq!(receipt.status, LoanStatus::Closed);
    assert_eq!(receipt.remaining_balance, 0);
    assert_eq!(
        engine.loan(loan.id).await.unwrap().status,
        LoanStatus::Closed
    );

    let balance = engine.remaining_balance(member).await.unwrap();
    assert!(!balance.has_active_loan);

    let passbook = engine.passbook(member).await.unwrap();
    let installment = passbook
        .iter()
        .find(|entry| entry.mode == EntryMode::Installment)
        .unwrap();
    assert_eq!(installment.description.as_deref(), Some("april"));
    assert_eq!(installment.interest_auto, inr(10));
    let marker = passbook.last().unwrap();
    assert_eq!(marker.mode, EntryMode::Notification);
    assert_eq!(marker.loan_id, Some(loan.id));
    assert_eq!(marker.loan_installment, 0);

    let err = engine
        .record_installment(loan.id, inr(1), 0, at(2025, 6, 1), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);

    let sent = notifier.sent();
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|n| n.kind == NotificationKind::Loan));
    assert!(sent.iter().all(|n| n.member_id == member));
}

#[tokio::test]
async fn close_loan_requires_zero_balance() {
    let (engine, db) = engine_with_db().await;
    let member = add_member(&db, "Asha", at(2025, 1, 1), None).await;
    let loan = engine
        .request_loan(member, inr(1000), 1200, None, at(2025, 3, 1))
        .await
        .unwrap();
    engine
        .approve_loan(loan.id, ApprovalTerms::overriding_cap(), at(2025, 3, 2))
        .await
        .unwrap();

    let err = engine.close_loan(loan.id, at(2025, 4, 1)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);

    engine
        .append_entry(NewEntry::installment(
            member,
            loan.id,
            inr(1000),
            at(2025, 4, 1),
        ))
        .await
        .unwrap();
    let closed = engine.close_loan(loan.id, at(2025, 4, 2)).await.unwrap();
    assert_eq!(closed.status, LoanStatus::Closed);

    let loans = engine.member_loans(member).await.unwrap();
    assert_eq!(loans.len(), 1);
    assert_eq!(loans[0].status, LoanStatus::Closed);
}

#[tokio::test]
async fn overpaid_balance_is_floored_at_zero() {
    let (engine, db) = engine_with_db().await;
    let member = add_member(&db, "Asha", at(2025, 1, 1), None).await;
    let loan = engine
        .request_loan(member, inr(1000), 1200, None, at(2025, 3, 1))
        .await
        .unwrap();
    engine
        .approve_loan(loan.id, ApprovalTerms::overriding_cap(), at(2025, 3, 2))
        .await
        .unwrap();
    engine
        .append_entry(NewEntry::installment(
            member,
            loan.id,
            inr(1500),
            at(2025, 4, 1),
        ))
        .await
        .unwrap();

    let balance = engine.remaining_balance(member).await.unwrap();
    assert_eq!(balance.remaining_balance, 0);

    let report = engine.integrity_check().await.unwrap();
    assert!(
        report
            .findings
            .contains(&IntegrityWarning::RepaidLoanStillActive { loan_id: loan.id })
    );
}

#[tokio::test]
async fn several_active_loans_warn_instead_of_failing() {
    let (engine, db) = engine_with_db().await;
    let member = add_member(&db, "Asha", at(2025, 1, 1), None).await;
    let older = engine
        .request_loan(member, inr(1000), 1200, None, at(2025, 3, 1))
        .await
        .unwrap();
    engine
        .approve_loan(older.id, ApprovalTerms::overriding_cap(), at(2025, 3, 2))
        .await
        .unwrap();

    let newer = engine
        .request_loan(member, inr(300), 1200, None, at(2025, 5, 1))
        .await
        .unwrap();
    let backend = db.get_database_backend();
    db.execute(Statement::from_sql_and_values(
        backend,
        "UPDATE loans SET status = 'active', remaining_balance = loan_amount WHERE id = ?",
        vec![newer.id.to_string().into()],
    ))
    .await
    .unwrap();

    let balance = engine.remaining_balance(member).await.unwrap();
    assert_eq!(balance.loan_id, Some(newer.id));
    assert_eq!(balance.remaining_balance, inr(300));
    assert_eq!(
        balance.warnings,
        vec![IntegrityWarning::MultipleActiveLoans {
            member_id: member,
            loan_ids: vec![newer.id, older.id],
        }]
    );

    let report = engine.integrity_check().await.unwrap();
    assert!(!report.is_clean());
    assert!(report.findings.iter().any(|finding| matches!(
        finding,
        IntegrityWarning::MultipleActiveLoans { member_id, .. } if *member_id == member
    )));
}

#[tokio::test]
async fn installment_on_pending_loan_is_flagged() {
    let (engine, db) = engine_with_db().await;
    let member = add_member(&db, "Asha", at(2025, 1, 1), None).await;
    let loan = engine
        .request_loan(member, inr(1000), 1200, None, at(2025, 3, 1))
        .await
        .unwrap();
    let entry_id = engine
        .append_entry(NewEntry::installment(
            member,
            loan.id,
            inr(100),
            at(2025, 3, 5),
        ))
        .await
        .unwrap();

    let report = engine.integrity_check().await.unwrap();
    assert_eq!(
        report.findings,
        vec![IntegrityWarning::InstallmentOnUndisbursedLoan {
            entry_id,
            loan_id: loan.id,
        }]
    );
}

#[tokio::test]
async fn notifications_follow_commits_and_failures_are_swallowed() {
    let notifier = Arc::new(RecordingNotifier::default());
    let (engine, db) = build_engine(InterestRate::default(), Some(notifier.clone())).await;
    let member = add_member(&db, "Asha", at(2025, 1, 1), None).await;
    let loan = engine
        .request_loan(member, inr(2000), 1200, None, at(2025, 3, 1))
        .await
        .unwrap();
    assert!(notifier.sent().is_empty());

    engine
        .approve_loan(loan.id, ApprovalTerms::overriding_cap(), at(2025, 3, 2))
        .await
        .unwrap();
    let _ = engine
        .approve_loan(loan.id, ApprovalTerms::overriding_cap(), at(2025, 3, 3))
        .await;
    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].title, "Loan Update");
    assert!(sent[0].message.contains("2000.00"));

    let (engine, db) = build_engine(InterestRate::default(), Some(Arc::new(FailingNotifier))).await;
    let member = add_member(&db, "Ravi", at(2025, 1, 1), None).await;
    let loan = engine
        .request_loan(member, inr(100), 1200, None, at(2025, 3, 1))
        .await
        .unwrap();
    let rejected = engine.reject_loan(loan.id, at(2025, 3, 2)).await.unwrap();
    assert_eq!(rejected.status, LoanStatus::Rejected);
}
