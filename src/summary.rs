//! Read-only rollups over movements and loans.
//!
//! Summaries are recomputed from the stored rows on every call and hold no
//! state of their own, so they always reflect the latest committed writes.

use crate::decimal::Decimal4;
use crate::error::{LedgerError, Result};
use crate::member::{require_member, MemberId};
use crate::store::{sum_decimals, Ledger};
use rusqlite::params;
use serde::Serialize;

/// Totals for one member. Every field is zero when the member has no rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemberSummary {
    pub total_deposits: Decimal4,
    pub total_withdrawals: Decimal4,
    pub total_loans_principal: Decimal4,
    pub total_paid_principal: Decimal4,
    pub total_paid_interest: Decimal4,
    pub total_paid_penalty: Decimal4,
    /// `total_deposits - total_withdrawals`; negative under a lenient
    /// withdrawal policy.
    pub savings_balance: Decimal4,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OrganizationSummary {
    pub member_count: u64,
    pub total_deposits: Decimal4,
    pub total_withdrawals: Decimal4,
    pub total_loans_principal: Decimal4,
    /// `total_deposits - total_withdrawals`
    pub net_balance: Decimal4,
}

fn net(deposits: Decimal4, withdrawals: Decimal4) -> Result<Decimal4> {
    deposits
        .checked_sub(withdrawals)
        .ok_or_else(|| LedgerError::invalid("balance exceeds the amount range"))
}

const MEMBER_PAYMENTS: &str = "FROM loan_payments p JOIN loans l ON l.id = p.loan_id WHERE l.member_id = ?1";

impl Ledger {
    pub fn member_summary(&self, member_id: MemberId) -> Result<MemberSummary> {
        self.read(|conn| {
            require_member(conn, member_id)?;
            let by_member = params![member_id];

            let total_deposits = sum_decimals(
                conn,
                "SELECT amount FROM deposits WHERE member_id = ?1",
                by_member,
            )?;
            let total_withdrawals = sum_decimals(
                conn,
                "SELECT amount FROM withdrawals WHERE member_id = ?1",
                by_member,
            )?;
            let total_loans_principal = sum_decimals(
                conn,
                "SELECT principal_amount FROM loans WHERE member_id = ?1",
                by_member,
            )?;
            let total_paid_principal = sum_decimals(
                conn,
                &format!("SELECT p.principal_portion {}", MEMBER_PAYMENTS),
                by_member,
            )?;
            let total_paid_interest = sum_decimals(
                conn,
                &format!("SELECT p.interest_portion {}", MEMBER_PAYMENTS),
                by_member,
            )?;
            let total_paid_penalty = sum_decimals(
                conn,
                &format!("SELECT p.penalty_portion {}", MEMBER_PAYMENTS),
                by_member,
            )?;

            let savings_balance = net(total_deposits, total_withdrawals)?;

            Ok(MemberSummary {
                total_deposits,
                total_withdrawals,
                total_loans_principal,
                total_paid_principal,
                total_paid_interest,
                total_paid_penalty,
                savings_balance,
            })
        })
    }

    pub fn organization_summary(&self) -> Result<OrganizationSummary> {
        self.read(|conn| {
            let member_count: i64 =
                conn.query_row("SELECT COUNT(*) FROM members", [], |row| row.get(0))?;
            let total_deposits = sum_decimals(conn, "SELECT amount FROM deposits", params![])?;
            let total_withdrawals = sum_decimals(conn, "SELECT amount FROM withdrawals", params![])?;
            let total_loans_principal =
                sum_decimals(conn, "SELECT principal_amount FROM loans", params![])?;

            Ok(OrganizationSummary {
                member_count: member_count as u64,
                total_deposits,
                total_withdrawals,
                total_loans_principal,
                net_balance: net(total_deposits, total_withdrawals)?,
            })
        })
    }
}
