//! Movement store: append-only savings deposits and withdrawals.

use crate::config::WithdrawalPolicy;
use crate::decimal::Decimal4;
use crate::error::{LedgerError, Result};
use crate::member::{require_member, MemberId};
use crate::store::{sum_decimals, Ledger};
use chrono::NaiveDate;
use log::debug;
use rusqlite::{params, Connection, Row};
use serde::Serialize;

pub type DepositId = i64;
pub type WithdrawalId = i64;

/// A savings credit ("aporte").
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deposit {
    pub id: DepositId,
    pub member_id: MemberId,
    pub date: NaiveDate,
    pub amount: Decimal4,
    /// Free-text contribution frequency, e.g. "mensual".
    pub frequency: Option<String>,
}

/// A savings debit ("retiro").
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Withdrawal {
    pub id: WithdrawalId,
    pub member_id: MemberId,
    pub date: NaiveDate,
    pub amount: Decimal4,
    pub reason: Option<String>,
}

impl Deposit {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Deposit {
            id: row.get(0)?,
            member_id: row.get(1)?,
            date: row.get(2)?,
            amount: row.get(3)?,
            frequency: row.get(4)?,
        })
    }
}

impl Withdrawal {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Withdrawal {
            id: row.get(0)?,
            member_id: row.get(1)?,
            date: row.get(2)?,
            amount: row.get(3)?,
            reason: row.get(4)?,
        })
    }
}

fn require_positive(what: &str, amount: Decimal4) -> Result<()> {
    if !amount.is_positive() {
        return Err(LedgerError::invalid(format!(
            "{} amount must be greater than zero, got {}",
            what, amount
        )));
    }
    Ok(())
}

/// Blank labels are stored as NULL.
pub(crate) fn label(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// `deposits - withdrawals` for one member.
pub(crate) fn savings_balance(conn: &Connection, member_id: MemberId) -> Result<Decimal4> {
    let deposits = sum_decimals(
        conn,
        "SELECT amount FROM deposits WHERE member_id = ?1",
        [member_id],
    )?;
    let withdrawals = sum_decimals(
        conn,
        "SELECT amount FROM withdrawals WHERE member_id = ?1",
        [member_id],
    )?;
    Ok(deposits - withdrawals)
}

impl Ledger {
    pub fn record_deposit(
        &self,
        member_id: MemberId,
        date: NaiveDate,
        amount: Decimal4,
        frequency: Option<&str>,
    ) -> Result<Deposit> {
        require_positive("deposit", amount)?;
        let frequency = label(frequency);

        let deposit = self.write("record_deposit", |tx| {
            require_member(tx, member_id)?;
            tx.execute(
                "INSERT INTO deposits (member_id, date, amount, frequency) VALUES (?1, ?2, ?3, ?4)",
                params![member_id, date, amount, frequency],
            )?;
            Ok(Deposit {
                id: tx.last_insert_rowid(),
                member_id,
                date,
                amount,
                frequency: frequency.clone(),
            })
        })?;

        debug!(
            "Deposited {} for member {} on {}",
            deposit.amount, member_id, deposit.date
        );
        Ok(deposit)
    }

    /// Records a withdrawal.
    ///
    /// Under [`WithdrawalPolicy::Lenient`] the savings balance may go
    /// negative. Under `RejectOverdraft` the balance is checked inside the
    /// same transaction as the insert.
    pub fn record_withdrawal(
        &self,
        member_id: MemberId,
        date: NaiveDate,
        amount: Decimal4,
        reason: Option<&str>,
    ) -> Result<Withdrawal> {
        require_positive("withdrawal", amount)?;
        let reason = label(reason);
        let policy = self.config().withdrawal_policy;

        let withdrawal = self.write("record_withdrawal", |tx| {
            require_member(tx, member_id)?;

            if policy == WithdrawalPolicy::RejectOverdraft {
                let available = savings_balance(tx, member_id)?;
                if amount > available {
                    return Err(LedgerError::invalid(format!(
                        "withdrawal of {} exceeds savings balance {}",
                        amount, available
                    )));
                }
            }

            tx.execute(
                "INSERT INTO withdrawals (member_id, date, amount, reason) VALUES (?1, ?2, ?3, ?4)",
                params![member_id, date, amount, reason],
            )?;
            Ok(Withdrawal {
                id: tx.last_insert_rowid(),
                member_id,
                date,
                amount,
                reason: reason.clone(),
            })
        })?;

        debug!(
            "Withdrew {} for member {} on {}",
            withdrawal.amount, member_id, withdrawal.date
        );
        Ok(withdrawal)
    }

    /// A member's deposits, newest first.
    pub fn list_deposits(&self, member_id: MemberId) -> Result<Vec<Deposit>> {
        self.read(|conn| {
            require_member(conn, member_id)?;
            let mut stmt = conn.prepare(
                "SELECT id, member_id, date, amount, frequency FROM deposits \
                 WHERE member_id = ?1 ORDER BY date DESC, id DESC",
            )?;
            let rows = stmt
                .query_map([member_id], Deposit::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// A member's withdrawals, newest first.
    pub fn list_withdrawals(&self, member_id: MemberId) -> Result<Vec<Withdrawal>> {
        self.read(|conn| {
            require_member(conn, member_id)?;
            let mut stmt = conn.prepare(
                "SELECT id, member_id, date, amount, reason FROM withdrawals \
                 WHERE member_id = ?1 ORDER BY date DESC, id DESC",
            )?;
            let rows = stmt
                .query_map([member_id], Withdrawal::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}
