//! Edge case tests for the ledger library, exercised through its public API.

use chrono::NaiveDate;
use coop_ledger::{
    Decimal4, ErrorKind, Ledger, LedgerConfig, LedgerError, LoanState, Member, NewLoan,
    NewPayment, Session, WithdrawalPolicy,
};
use std::io::Cursor;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;

fn config() -> LedgerConfig {
    LedgerConfig::default().with_hash_cost(256, 1)
}

fn ledger() -> Ledger {
    Ledger::in_memory(config()).unwrap()
}

fn dec(s: &str) -> Decimal4 {
    Decimal4::from_str(s).unwrap()
}

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn member(ledger: &Ledger, number: &str) -> Member {
    ledger
        .create_member(number, &format!("Member {}", number), "pw")
        .unwrap()
}

// ==================== SAVINGS ====================

#[test]
fn test_savings_balance_is_deposits_minus_withdrawals() {
    let ledger = ledger();
    let ana = member(&ledger, "001");

    ledger.record_deposit(ana.id, day("2025-01-01"), dec("100"), None).unwrap();
    ledger.record_deposit(ana.id, day("2025-02-01"), dec("200"), Some("mensual")).unwrap();
    ledger.record_withdrawal(ana.id, day("2025-03-01"), dec("50"), Some("emergencia")).unwrap();

    let summary = ledger.member_summary(ana.id).unwrap();
    assert_eq!(summary.savings_balance, dec("250"));
    assert_eq!(
        summary.savings_balance,
        summary.total_deposits - summary.total_withdrawals
    );
}

#[test]
fn test_zero_and_negative_amounts_rejected() {
    let ledger = ledger();
    let ana = member(&ledger, "001");

    for amount in ["0", "-5", "0.0000"] {
        let err = ledger
            .record_deposit(ana.id, day("2025-01-01"), dec(amount), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = ledger
            .record_withdrawal(ana.id, day("2025-01-01"), dec(amount), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    assert!(ledger.list_deposits(ana.id).unwrap().is_empty());
}

#[test]
fn test_smallest_unit_preserved() {
    let ledger = ledger();
    let ana = member(&ledger, "001");

    ledger.record_deposit(ana.id, day("2025-01-01"), dec("0.0001"), None).unwrap();
    ledger.record_deposit(ana.id, day("2025-01-01"), dec("0.0002"), None).unwrap();

    let summary = ledger.member_summary(ana.id).unwrap();
    assert_eq!(summary.total_deposits.to_string(), "0.0003");
}

#[test]
fn test_lenient_policy_allows_negative_savings() {
    let ledger = ledger();
    let ana = member(&ledger, "001");

    ledger.record_deposit(ana.id, day("2025-01-01"), dec("10"), None).unwrap();
    ledger.record_withdrawal(ana.id, day("2025-01-02"), dec("25"), None).unwrap();

    assert_eq!(ledger.member_summary(ana.id).unwrap().savings_balance, dec("-15"));
}

#[test]
fn test_strict_policy_rejects_overdraft() {
    let ledger =
        Ledger::in_memory(config().with_withdrawal_policy(WithdrawalPolicy::RejectOverdraft))
            .unwrap();
    let ana = member(&ledger, "001");

    ledger.record_deposit(ana.id, day("2025-01-01"), dec("10"), None).unwrap();
    ledger.record_withdrawal(ana.id, day("2025-01-02"), dec("10"), None).unwrap();
    let err = ledger
        .record_withdrawal(ana.id, day("2025-01-03"), dec("0.0001"), None)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(ledger.list_withdrawals(ana.id).unwrap().len(), 1);
}

#[test]
fn test_movements_for_unknown_member_are_not_found() {
    let ledger = ledger();

    let err = ledger
        .record_deposit(42, day("2025-01-01"), dec("1"), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = ledger
        .issue_loan(42, NewLoan::new(day("2025-01-01"), dec("1")))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    assert_eq!(ledger.organization_summary().unwrap().total_deposits, Decimal4::ZERO);
}

// ==================== LOANS ====================

#[test]
fn test_partial_payment_then_overpayment_floors_at_zero() {
    let ledger = ledger();
    let ana = member(&ledger, "001");
    let loan = ledger
        .issue_loan(ana.id, NewLoan::new(day("2025-01-10"), dec("1000")))
        .unwrap();
    assert_eq!(loan.outstanding_balance, dec("1000"));
    assert_eq!(loan.state(), LoanState::Open);

    let first = ledger
        .record_payment(loan.id, NewPayment::new(day("2025-02-10"), dec("300"), dec("50")))
        .unwrap();
    assert_eq!(first.loan.outstanding_balance, dec("700"));

    let second = ledger
        .record_payment(loan.id, NewPayment::new(day("2025-03-10"), dec("800"), dec("0")))
        .unwrap();
    assert_eq!(second.loan.outstanding_balance, Decimal4::ZERO);
    assert_eq!(second.loan.state(), LoanState::Settled);

    // The status label is left alone; settlement is tracked by the balance.
    assert_eq!(second.loan.status, "active");

    let summary = ledger.member_summary(ana.id).unwrap();
    assert_eq!(summary.total_paid_principal, dec("1100"));
    assert_eq!(summary.total_paid_interest, dec("50"));
    assert_eq!(ledger.derived_outstanding_balance(loan.id).unwrap(), Decimal4::ZERO);

    assert!(ledger.list_all_open_loans().unwrap().is_empty());
}

#[test]
fn test_interest_only_payment_keeps_balance() {
    let ledger = ledger();
    let ana = member(&ledger, "001");
    let loan = ledger
        .issue_loan(ana.id, NewLoan::new(day("2025-01-10"), dec("500")))
        .unwrap();

    let recorded = ledger
        .record_payment(
            loan.id,
            NewPayment::new(day("2025-02-10"), dec("0"), dec("25")).with_penalty(dec("5")),
        )
        .unwrap();

    assert_eq!(recorded.loan.outstanding_balance, dec("500"));
    assert_eq!(recorded.payment.total(), dec("30"));
}

#[test]
fn test_payment_to_unknown_loan_is_not_found() {
    let ledger = ledger();
    let err = ledger
        .record_payment(99, NewPayment::new(day("2025-01-01"), dec("1"), dec("0")))
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[test]
fn test_invalid_loan_terms_rejected() {
    let ledger = ledger();
    let ana = member(&ledger, "001");

    let mut zero = NewLoan::new(day("2025-01-10"), dec("0"));
    zero.interest_type = Some("flat".to_string());
    assert_eq!(
        ledger.issue_loan(ana.id, zero).unwrap_err().kind(),
        ErrorKind::InvalidInput
    );

    let mut backwards = NewLoan::new(day("2025-01-10"), dec("100"));
    backwards.end_date = Some(day("2024-12-31"));
    assert_eq!(
        ledger.issue_loan(ana.id, backwards).unwrap_err().kind(),
        ErrorKind::InvalidInput
    );

    let loan = ledger
        .issue_loan(ana.id, NewLoan::new(day("2025-01-10"), dec("100")))
        .unwrap();
    let negative = NewPayment::new(day("2025-02-10"), dec("-1"), dec("0"));
    assert_eq!(
        ledger.record_payment(loan.id, negative).unwrap_err().kind(),
        ErrorKind::InvalidInput
    );
    assert!(ledger.list_payments_for_loan(loan.id).unwrap().is_empty());
}

#[test]
fn test_open_loans_listed_across_members() {
    let ledger = ledger();
    let luis = member(&ledger, "002");
    let ana = member(&ledger, "001");

    ledger
        .issue_loan(luis.id, NewLoan::new(day("2025-01-01"), dec("10")))
        .unwrap();
    ledger
        .issue_loan(ana.id, NewLoan::new(day("2025-03-01"), dec("20")))
        .unwrap();
    ledger
        .issue_loan(ana.id, NewLoan::new(day("2025-02-01"), dec("30")))
        .unwrap();

    let numbers: Vec<_> = ledger
        .list_all_open_loans()
        .unwrap()
        .into_iter()
        .map(|v| (v.membership_number, v.loan.principal_amount.to_string()))
        .collect();

    assert_eq!(
        numbers,
        vec![
            ("001".to_string(), "30.0000".to_string()),
            ("001".to_string(), "20.0000".to_string()),
            ("002".to_string(), "10.0000".to_string()),
        ]
    );
}

// ==================== MEMBERS ====================

#[test]
fn test_delete_member_cascades_and_spares_others() {
    let ledger = ledger();
    let ana = member(&ledger, "001");
    let luis = member(&ledger, "002");

    ledger.record_deposit(ana.id, day("2025-01-01"), dec("100"), None).unwrap();
    ledger.record_withdrawal(ana.id, day("2025-01-02"), dec("10"), None).unwrap();
    let loan = ledger
        .issue_loan(ana.id, NewLoan::new(day("2025-01-03"), dec("300")))
        .unwrap();
    ledger
        .record_payment(loan.id, NewPayment::new(day("2025-02-01"), dec("100"), dec("5")))
        .unwrap();
    ledger
        .record_payment(loan.id, NewPayment::new(day("2025-03-01"), dec("100"), dec("5")))
        .unwrap();

    ledger.record_deposit(luis.id, day("2025-01-01"), dec("40"), None).unwrap();
    let luis_loan = ledger
        .issue_loan(luis.id, NewLoan::new(day("2025-01-03"), dec("80")))
        .unwrap();
    ledger
        .record_payment(luis_loan.id, NewPayment::new(day("2025-02-01"), dec("20"), dec("1")))
        .unwrap();

    let removed = ledger.delete_member(ana.id).unwrap();
    assert_eq!(removed.deposits, 1);
    assert_eq!(removed.withdrawals, 1);
    assert_eq!(removed.loans, 1);
    assert_eq!(removed.payments, 2);

    assert_eq!(ledger.get_member(ana.id).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(ledger.get_loan(loan.id).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(
        ledger.list_payments_for_loan(loan.id).unwrap_err().kind(),
        ErrorKind::NotFound
    );

    let org = ledger.organization_summary().unwrap();
    assert_eq!(org.member_count, 1);
    assert_eq!(org.total_deposits, dec("40"));
    assert_eq!(org.total_loans_principal, dec("80"));
    assert_eq!(ledger.list_payments_for_member(luis.id).unwrap().len(), 1);
}

#[test]
fn test_delete_member_leaves_no_rows_in_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("coop.db");
    let ledger = Ledger::open(&path, config()).unwrap();
    let ana = member(&ledger, "001");
    let loan = ledger
        .issue_loan(ana.id, NewLoan::new(day("2025-01-03"), dec("300")))
        .unwrap();
    ledger
        .record_payment(loan.id, NewPayment::new(day("2025-02-01"), dec("100"), dec("5")))
        .unwrap();

    ledger.delete_member(ana.id).unwrap();

    let conn = rusqlite::Connection::open(&path).unwrap();
    for table in ["members", "deposits", "withdrawals", "loans", "loan_payments"] {
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0, "{} not empty", table);
    }
}

#[test]
fn test_duplicate_and_blank_member_fields() {
    let ledger = ledger();
    member(&ledger, "001");

    let err = ledger.create_member("001", "Otra", "pw").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateKey);

    let err = ledger.create_member("  ", "Nadie", "pw").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = ledger.create_member("003", "Nadie", "").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    assert_eq!(ledger.list_members().unwrap().len(), 1);
}

#[test]
fn test_authentication_and_session_access() {
    let ledger = ledger();
    let ana = member(&ledger, "001");
    let luis = member(&ledger, "002");

    let err = ledger.authenticate("001", "wrong").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthFailed);
    let err = ledger.authenticate("999", "pw").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthFailed);

    let session = Session::member(&ledger.authenticate("001", "pw").unwrap());
    assert!(session.require_access_to(ana.id).is_ok());
    assert!(session.require_access_to(luis.id).is_err());
    assert!(session.require_admin().is_err());

    ledger.create_admin("admin", "Tesorería", "root-pw").unwrap();
    let admin = Session::admin(&ledger.authenticate_admin("admin", "root-pw").unwrap());
    assert!(admin.require_access_to(luis.id).is_ok());
    assert!(admin.require_admin().is_ok());

    ledger.reset_credential(ana.id, "new-pw").unwrap();
    assert!(ledger.authenticate("001", "pw").is_err());
    assert_eq!(ledger.authenticate("001", "new-pw").unwrap().id, ana.id);
}

// ==================== BATCH IMPORT ====================

#[test]
fn test_import_skips_payment_for_loan_of_deleted_member() {
    let ledger = ledger();
    let ana = member(&ledger, "001");
    member(&ledger, "002");

    let report = ledger
        .import_csv(Cursor::new(
            "type,member,loan,date,end_date,amount,interest\n\
             loan,001,,2025-01-01,,100,\n\
             payment,,1,2025-02-01,,10,1\n",
        ))
        .unwrap();
    assert_eq!((report.applied, report.skipped), (2, 0));

    ledger.delete_member(ana.id).unwrap();

    let report = ledger
        .import_csv(Cursor::new(
            "type,member,loan,date,end_date,amount,interest\n\
             payment,,1,2025-03-01,,10,1\n\
             deposit,002,,2025-03-01,,5,\n",
        ))
        .unwrap();
    assert_eq!((report.applied, report.skipped), (1, 1));
}

#[test]
fn test_import_of_empty_batch() {
    let ledger = ledger();
    let report = ledger
        .import_csv(Cursor::new("type,member,loan,date,end_date,amount\n"))
        .unwrap();
    assert_eq!((report.applied, report.skipped), (0, 0));
}

// ==================== CONCURRENCY ====================

#[test]
fn test_concurrent_payments_on_shared_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(Ledger::open(dir.path().join("coop.db"), config()).unwrap());
    let ana = member(&ledger, "001");
    let loan = ledger
        .issue_loan(ana.id, NewLoan::new(day("2025-01-01"), dec("1000")))
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                for _ in 0..5 {
                    ledger
                        .record_payment(
                            loan.id,
                            NewPayment::new(day("2025-02-01"), dec("10"), dec("1")),
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let loan = ledger.get_loan(loan.id).unwrap();
    assert_eq!(loan.outstanding_balance, dec("600"));
    assert_eq!(ledger.list_payments_for_loan(loan.id).unwrap().len(), 40);
    assert_eq!(ledger.derived_outstanding_balance(loan.id).unwrap(), dec("600"));
}

#[test]
fn test_concurrent_writers_on_separate_handles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("coop.db");
    let first = Ledger::open(&path, config()).unwrap();
    let ana = member(&first, "001");

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let path = path.clone();
            thread::spawn(move || {
                let ledger = Ledger::open(&path, config()).unwrap();
                for _ in 0..10 {
                    ledger
                        .record_deposit(ana.id, day("2025-01-01"), dec("1.5"), None)
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(first.member_summary(ana.id).unwrap().total_deposits, dec("60"));
}
