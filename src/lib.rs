//! # Coop Ledger
//!
//! Ledger and balance engine for a savings and credit cooperative: members,
//! savings deposits and withdrawals, loans and loan repayments, with
//! per-member and organization-wide summaries.
//!
//! ## Design Principles
//!
//! - **Fixed-point arithmetic**: Uses 4 decimal places via `rust_decimal`
//! - **Atomic writes**: Every mutating operation is one SQLite transaction
//! - **Strict invariants**: `outstanding_balance == max(0, principal - paid principal)`
//! - **Deterministic output**: Members sorted by membership number
//!
//! ## Example
//!
//! ```no_run
//! use coop_ledger::{Ledger, LedgerConfig, NewLoan, NewPayment};
//!
//! let ledger = Ledger::open("coop.db", LedgerConfig::default()).unwrap();
//! let ana = ledger.create_member("001", "Ana", "secret").unwrap();
//!
//! let day = chrono::NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
//! let loan = ledger
//!     .issue_loan(ana.id, NewLoan::new(day, "1000".parse().unwrap()))
//!     .unwrap();
//! ledger
//!     .record_payment(loan.id, NewPayment::new(day, "300".parse().unwrap(), "50".parse().unwrap()))
//!     .unwrap();
//!
//! ledger.write_member_summaries(std::io::stdout()).unwrap();
//! ```

pub mod backup;
pub mod batch;
pub mod config;
pub mod credential;
pub mod decimal;
pub mod error;
pub mod loan;
pub mod member;
pub mod movement;
pub mod record;
pub mod session;
pub mod store;
pub mod summary;

#[cfg(test)]
mod testutil;

pub use batch::ImportReport;
pub use config::{HashCost, LedgerConfig, WithdrawalPolicy};
pub use decimal::Decimal4;
pub use error::{ErrorKind, LedgerError, Result};
pub use loan::{
    Loan, LoanId, LoanState, LoanView, NewLoan, NewPayment, Payment, PaymentId, RecordedPayment,
};
pub use member::{Member, MemberDeletion, MemberId};
pub use movement::{Deposit, DepositId, Withdrawal, WithdrawalId};
pub use record::{parse_amount, parse_date, Movement, MovementRecord};
pub use session::{Admin, AdminId, Role, Session};
pub use store::Ledger;
pub use summary::{MemberSummary, OrganizationSummary};
