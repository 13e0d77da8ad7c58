//! Loan ledger: issuance, payment allocation and outstanding balances.
//!
//! A loan's `outstanding_balance` is a cached projection of its payments:
//!
//! ```text
//! outstanding_balance == max(0, principal_amount - Σ principal_portion)
//! ```
//!
//! It is initialized to the principal at issuance and only ever changed by
//! [`Ledger::record_payment`], which inserts the payment and lowers the
//! balance in one immediate transaction. Interest and penalty portions are
//! recorded as supplied; they never touch the balance.
//!
//! The `status` label is administrator-controlled and independent of the
//! derived [`LoanState`]. A loan can be `Settled` while still labelled
//! "active", or labelled "defaulted" while `Open`.

use crate::decimal::Decimal4;
use crate::error::{LedgerError, Result};
use crate::member::{require_member, required, MemberId};
use crate::movement::label;
use crate::store::{sum_decimals, Ledger};
use chrono::NaiveDate;
use log::debug;
use rusqlite::{params, Connection, Row};
use serde::Serialize;

pub type LoanId = i64;
pub type PaymentId = i64;

const LOAN_COLUMNS: &str = "l.id, l.member_id, l.start_date, l.end_date, l.principal_amount, \
     l.interest_rate, l.interest_type, l.outstanding_balance, l.status";

const PAYMENT_COLUMNS: &str =
    "p.id, p.loan_id, p.date, p.principal_portion, p.interest_portion, p.penalty_portion";

/// Derived settlement state of a loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanState {
    /// `outstanding_balance > 0`
    Open,
    /// `outstanding_balance == 0`
    Settled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Loan {
    pub id: LoanId,
    pub member_id: MemberId,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub principal_amount: Decimal4,
    /// Informational; the ledger never accrues interest.
    pub interest_rate: Option<Decimal4>,
    pub interest_type: Option<String>,
    pub outstanding_balance: Decimal4,
    /// Administrator-set label, e.g. "active", "closed", "defaulted".
    pub status: String,
}

impl Loan {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Loan {
            id: row.get(0)?,
            member_id: row.get(1)?,
            start_date: row.get(2)?,
            end_date: row.get(3)?,
            principal_amount: row.get(4)?,
            interest_rate: row.get(5)?,
            interest_type: row.get(6)?,
            outstanding_balance: row.get(7)?,
            status: row.get(8)?,
        })
    }

    pub fn is_settled(&self) -> bool {
        self.outstanding_balance.is_zero()
    }

    pub fn state(&self) -> LoanState {
        if self.is_settled() {
            LoanState::Settled
        } else {
            LoanState::Open
        }
    }

    /// Checks the cached balance against the payments it was derived from.
    pub fn check_invariant(&self, payments: &[Payment]) -> bool {
        let paid: Decimal4 = payments.iter().map(|p| p.principal_portion).sum();
        self.outstanding_balance == self.principal_amount.saturating_sub(paid)
    }
}

/// Terms of a loan to issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLoan {
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub principal_amount: Decimal4,
    pub interest_rate: Option<Decimal4>,
    pub interest_type: Option<String>,
    pub status: String,
}

impl NewLoan {
    /// An "active" loan with no end date or interest terms.
    pub fn new(start_date: NaiveDate, principal_amount: Decimal4) -> Self {
        NewLoan {
            start_date,
            end_date: None,
            principal_amount,
            interest_rate: None,
            interest_type: None,
            status: "active".to_string(),
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.principal_amount.is_positive() {
            return Err(LedgerError::invalid(format!(
                "loan principal must be greater than zero, got {}",
                self.principal_amount
            )));
        }
        if let Some(rate) = self.interest_rate {
            if rate.is_negative() {
                return Err(LedgerError::invalid(format!(
                    "interest rate must not be negative, got {}",
                    rate
                )));
            }
        }
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(LedgerError::invalid(format!(
                    "loan end date {} is before start date {}",
                    end, self.start_date
                )));
            }
        }
        Ok(())
    }
}

/// A loan repayment split into principal, interest and penalty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payment {
    pub id: PaymentId,
    pub loan_id: LoanId,
    pub date: NaiveDate,
    pub principal_portion: Decimal4,
    pub interest_portion: Decimal4,
    pub penalty_portion: Decimal4,
}

impl Payment {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Payment {
            id: row.get(0)?,
            loan_id: row.get(1)?,
            date: row.get(2)?,
            principal_portion: row.get(3)?,
            interest_portion: row.get(4)?,
            penalty_portion: row.get(5)?,
        })
    }

    pub fn total(&self) -> Decimal4 {
        self.principal_portion + self.interest_portion + self.penalty_portion
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewPayment {
    pub date: NaiveDate,
    pub principal: Decimal4,
    pub interest: Decimal4,
    pub penalty: Decimal4,
}

impl NewPayment {
    /// A payment with no penalty portion.
    pub fn new(date: NaiveDate, principal: Decimal4, interest: Decimal4) -> Self {
        NewPayment {
            date,
            principal,
            interest,
            penalty: Decimal4::ZERO,
        }
    }

    pub fn with_penalty(mut self, penalty: Decimal4) -> Self {
        self.penalty = penalty;
        self
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("principal", self.principal),
            ("interest", self.interest),
            ("penalty", self.penalty),
        ] {
            if value.is_negative() {
                return Err(LedgerError::invalid(format!(
                    "{} portion must not be negative, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Result of [`Ledger::record_payment`]: the stored payment and the loan
/// with its updated balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedPayment {
    pub payment: Payment,
    pub loan: Loan,
}

/// A loan joined with its member's identity, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoanView {
    #[serde(flatten)]
    pub loan: Loan,
    pub membership_number: String,
    pub display_name: String,
}

impl LoanView {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(LoanView {
            loan: Loan::from_row(row)?,
            membership_number: row.get(9)?,
            display_name: row.get(10)?,
        })
    }
}

fn loan_by_id(conn: &Connection, id: LoanId) -> Result<Loan> {
    conn.query_row(
        &format!("SELECT {} FROM loans l WHERE l.id = ?1", LOAN_COLUMNS),
        [id],
        Loan::from_row,
    )
    .map_err(|e| LedgerError::from(e).entity(format!("loan {}", id)))
}

/// `max(0, principal - Σ principal_portion)` computed from the payment rows.
fn derived_balance(conn: &Connection, loan: &Loan) -> Result<Decimal4> {
    let paid = sum_decimals(
        conn,
        "SELECT principal_portion FROM loan_payments WHERE loan_id = ?1",
        [loan.id],
    )?;
    Ok(loan.principal_amount.saturating_sub(paid))
}

fn loan_views(conn: &Connection, filter: &str, params: impl rusqlite::Params) -> Result<Vec<LoanView>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {}, m.membership_number, m.display_name \
         FROM loans l JOIN members m ON m.id = l.member_id \
         {} ORDER BY m.membership_number, l.start_date, l.id",
        LOAN_COLUMNS, filter
    ))?;
    let views = stmt
        .query_map(params, LoanView::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(views)
}

impl Ledger {
    /// Issues a loan with `outstanding_balance = principal_amount`.
    pub fn issue_loan(&self, member_id: MemberId, terms: NewLoan) -> Result<Loan> {
        terms.validate()?;
        let status = required("loan status", &terms.status)?;
        let interest_type = label(terms.interest_type.as_deref());

        let loan = self.write("issue_loan", |tx| {
            require_member(tx, member_id)?;
            tx.execute(
                "INSERT INTO loans (member_id, start_date, end_date, principal_amount, interest_rate, \
                 interest_type, outstanding_balance, status) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?4, ?7)",
                params![
                    member_id,
                    terms.start_date,
                    terms.end_date,
                    terms.principal_amount,
                    terms.interest_rate,
                    interest_type,
                    status
                ],
            )?;
            loan_by_id(tx, tx.last_insert_rowid())
        })?;

        debug!(
            "Issued loan {} of {} to member {}",
            loan.id, loan.principal_amount, member_id
        );
        Ok(loan)
    }

    /// Records a payment and lowers the loan's outstanding balance by its
    /// principal portion, flooring at zero.
    ///
    /// Overpaying principal is accepted; the excess is not credited anywhere.
    /// The loan's `status` is left untouched.
    pub fn record_payment(&self, loan_id: LoanId, payment: NewPayment) -> Result<RecordedPayment> {
        payment.validate()?;

        let recorded = self.write("record_payment", |tx| {
            let loan = loan_by_id(tx, loan_id)?;

            tx.execute(
                "INSERT INTO loan_payments \
                 (loan_id, date, principal_portion, interest_portion, penalty_portion) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    loan_id,
                    payment.date,
                    payment.principal,
                    payment.interest,
                    payment.penalty
                ],
            )?;
            let payment_id = tx.last_insert_rowid();

            let balance = loan.outstanding_balance.saturating_sub(payment.principal);
            tx.execute(
                "UPDATE loans SET outstanding_balance = ?1 WHERE id = ?2",
                params![balance, loan_id],
            )?;

            let loan = Loan {
                outstanding_balance: balance,
                ..loan
            };
            debug_assert_eq!(
                derived_balance(tx, &loan).ok(),
                Some(balance),
                "cached balance diverged from payments for loan {}",
                loan_id
            );

            Ok(RecordedPayment {
                payment: Payment {
                    id: payment_id,
                    loan_id,
                    date: payment.date,
                    principal_portion: payment.principal,
                    interest_portion: payment.interest,
                    penalty_portion: payment.penalty,
                },
                loan,
            })
        })?;

        debug!(
            "Payment {} on loan {}: principal {}, interest {}, penalty {}; outstanding {}",
            recorded.payment.id,
            loan_id,
            payment.principal,
            payment.interest,
            payment.penalty,
            recorded.loan.outstanding_balance
        );
        Ok(recorded)
    }

    /// Changes the administrator-set status label. Never touches the balance.
    pub fn set_loan_status(&self, loan_id: LoanId, status: &str) -> Result<Loan> {
        let status = required("loan status", status)?;

        let loan = self.write("set_loan_status", |tx| {
            let changed = tx.execute(
                "UPDATE loans SET status = ?1 WHERE id = ?2",
                params![status, loan_id],
            )?;
            if changed == 0 {
                return Err(LedgerError::not_found(format!("loan {}", loan_id)));
            }
            loan_by_id(tx, loan_id)
        })?;

        debug!("Loan {} status set to '{}'", loan_id, loan.status);
        Ok(loan)
    }

    pub fn get_loan(&self, loan_id: LoanId) -> Result<Loan> {
        self.read(|conn| loan_by_id(conn, loan_id))
    }

    /// Outstanding balance recomputed from the payment rows rather than the
    /// cached field.
    pub fn derived_outstanding_balance(&self, loan_id: LoanId) -> Result<Decimal4> {
        self.read(|conn| {
            let loan = loan_by_id(conn, loan_id)?;
            derived_balance(conn, &loan)
        })
    }

    /// A member's loans ordered by start date.
    pub fn list_loans_for_member(&self, member_id: MemberId) -> Result<Vec<LoanView>> {
        self.read(|conn| {
            require_member(conn, member_id)?;
            loan_views(conn, "WHERE l.member_id = ?1", [member_id])
        })
    }

    /// Every loan with a non-zero outstanding balance, ordered by membership
    /// number then start date.
    pub fn list_all_open_loans(&self) -> Result<Vec<LoanView>> {
        let views = self.read(|conn| loan_views(conn, "", params![]))?;
        Ok(views.into_iter().filter(|v| !v.loan.is_settled()).collect())
    }

    /// Payments on one loan, oldest first.
    pub fn list_payments_for_loan(&self, loan_id: LoanId) -> Result<Vec<Payment>> {
        self.read(|conn| {
            loan_by_id(conn, loan_id)?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM loan_payments p WHERE p.loan_id = ?1 ORDER BY p.date, p.id",
                PAYMENT_COLUMNS
            ))?;
            let payments = stmt
                .query_map([loan_id], Payment::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(payments)
        })
    }

    /// Payments across all of a member's loans, newest first.
    pub fn list_payments_for_member(&self, member_id: MemberId) -> Result<Vec<Payment>> {
        self.read(|conn| {
            require_member(conn, member_id)?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM loan_payments p JOIN loans l ON l.id = p.loan_id \
                 WHERE l.member_id = ?1 ORDER BY p.date DESC, p.id DESC",
                PAYMENT_COLUMNS
            ))?;
            let payments = stmt
                .query_map([member_id], Payment::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(payments)
        })
    }
}
