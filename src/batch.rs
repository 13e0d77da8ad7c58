//! CSV batch import of movements and CSV reports.
//!
//! Import is streaming: records are read one at a time and each valid
//! record is applied in its own transaction. Invalid or rejected records
//! are logged at warn level with their row number and skipped.

use crate::error::Result;
use crate::member::Member;
use crate::record::{Movement, MovementRecord};
use crate::store::Ledger;
use csv::{ReaderBuilder, Trim};
use log::{debug, warn};
use std::io::{Read, Write};

/// Outcome of [`Ledger::import_csv`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub applied: usize,
    pub skipped: usize,
}

impl Ledger {
    /// Applies every valid record in the CSV to the ledger.
    pub fn import_csv<R: Read>(&self, reader: R) -> Result<ImportReport> {
        let mut csv_reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        let mut report = ImportReport::default();

        for (row_idx, result) in csv_reader.deserialize::<MovementRecord>().enumerate() {
            let row_num = row_idx + 2; // 1-indexed, accounting for header row

            let outcome = result
                .map_err(Into::into)
                .and_then(|record| record.parse())
                .and_then(|movement| self.apply(movement));

            match outcome {
                Ok(()) => {
                    report.applied += 1;
                    debug!("Row {}: applied", row_num);
                }
                Err(e) => {
                    report.skipped += 1;
                    warn!("Row {}: {}", row_num, e);
                }
            }
        }

        Ok(report)
    }

    fn apply(&self, movement: Movement) -> Result<()> {
        match movement {
            Movement::Deposit {
                member,
                date,
                amount,
                frequency,
            } => {
                let member = self.find_member_by_number(&member)?;
                self.record_deposit(member.id, date, amount, frequency.as_deref())?;
            }
            Movement::Withdrawal {
                member,
                date,
                amount,
                reason,
            } => {
                let member = self.find_member_by_number(&member)?;
                self.record_withdrawal(member.id, date, amount, reason.as_deref())?;
            }
            Movement::Loan { member, terms } => {
                let member = self.find_member_by_number(&member)?;
                self.issue_loan(member.id, terms)?;
            }
            Movement::Payment { loan, payment } => {
                self.record_payment(loan, payment)?;
            }
        }
        Ok(())
    }

    /// Writes one summary row per member, sorted by membership number.
    ///
    /// All monetary values are formatted with exactly 4 decimal places.
    pub fn write_member_summaries<W: Write>(&self, writer: W) -> Result<()> {
        let members = self.list_members()?;
        self.write_summaries(writer, &members)
    }

    /// Writes summary rows for the given members, in the given order.
    pub fn write_summaries<W: Write>(&self, writer: W, members: &[Member]) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "member",
            "name",
            "deposits",
            "withdrawals",
            "savings",
            "loans",
            "paid_principal",
            "paid_interest",
            "paid_penalty",
        ])?;

        for member in members {
            let s = self.member_summary(member.id)?;
            csv_writer.write_record([
                member.membership_number.clone(),
                member.display_name.clone(),
                s.total_deposits.to_string(),
                s.total_withdrawals.to_string(),
                s.savings_balance.to_string(),
                s.total_loans_principal.to_string(),
                s.total_paid_principal.to_string(),
                s.total_paid_interest.to_string(),
                s.total_paid_penalty.to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(())
    }

    pub fn write_organization_summary<W: Write>(&self, writer: W) -> Result<()> {
        let org = self.organization_summary()?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["members", "deposits", "withdrawals", "loans", "net_balance"])?;
        csv_writer.write_record([
            org.member_count.to_string(),
            org.total_deposits.to_string(),
            org.total_withdrawals.to_string(),
            org.total_loans_principal.to_string(),
            org.net_balance.to_string(),
        ])?;

        csv_writer.flush()?;
        Ok(())
    }

    /// Writes every open loan, ordered by membership number then start date.
    pub fn write_open_loans<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "loan",
            "member",
            "name",
            "start_date",
            "principal",
            "outstanding",
            "status",
        ])?;

        for view in self.list_all_open_loans()? {
            csv_writer.write_record([
                view.loan.id.to_string(),
                view.membership_number,
                view.display_name,
                view.loan.start_date.to_string(),
                view.loan.principal_amount.to_string(),
                view.loan.outstanding_balance.to_string(),
                view.loan.status,
            ])?;
        }

        csv_writer.flush()?;
        Ok(())
    }
}
