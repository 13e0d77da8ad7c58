//! Textual movement records and the parsers that turn caller-supplied text
//! into typed values.
//!
//! Every parse failure is `InvalidInput`; nothing is ever coerced to zero.

use crate::decimal::Decimal4;
use crate::error::{LedgerError, Result};
use crate::loan::{LoanId, NewLoan, NewPayment};
use chrono::NaiveDate;
use serde::Deserialize;
use std::str::FromStr;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Parses a monetary amount such as `"150.25"`.
pub fn parse_amount(field: &str, raw: &str) -> Result<Decimal4> {
    Decimal4::from_str(raw)
        .map_err(|_| LedgerError::invalid(format!("{} '{}' is not a valid amount", field, raw.trim())))
}

/// Parses an ISO `YYYY-MM-DD` date.
pub fn parse_date(field: &str, raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|_| {
        LedgerError::invalid(format!("{} '{}' is not a YYYY-MM-DD date", field, raw.trim()))
    })
}

fn require<'a>(field: &str, value: Option<&'a str>) -> Result<&'a str> {
    non_blank(value).ok_or_else(|| LedgerError::invalid(format!("{} is required", field)))
}

/// One row of a movement batch, as read from CSV.
///
/// Columns: `type,member,loan,date,end_date,amount,interest,penalty,rate,detail,status`.
/// Which columns are used depends on `type`:
///
/// | type         | member | loan | date  | end_date | amount    | interest | penalty | rate | detail        | status |
/// |--------------|--------|------|-------|----------|-----------|----------|---------|------|---------------|--------|
/// | `deposit`    | yes    |      | yes   |          | yes       |          |         |      | frequency     |        |
/// | `withdrawal` | yes    |      | yes   |          | yes       |          |         |      | reason        |        |
/// | `loan`       | yes    |      | start | optional | principal |          |         | opt. | interest type | opt.   |
/// | `payment`    |        | yes  | yes   |          | principal | yes      | opt.    |      |               |        |
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct MovementRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub member: Option<String>,
    pub loan: Option<String>,
    pub date: Option<String>,
    pub end_date: Option<String>,
    pub amount: Option<String>,
    pub interest: Option<String>,
    pub penalty: Option<String>,
    pub rate: Option<String>,
    pub detail: Option<String>,
    pub status: Option<String>,
}

/// A parsed movement. Members are still referenced by membership number;
/// the importer resolves them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Movement {
    Deposit {
        member: String,
        date: NaiveDate,
        amount: Decimal4,
        frequency: Option<String>,
    },
    Withdrawal {
        member: String,
        date: NaiveDate,
        amount: Decimal4,
        reason: Option<String>,
    },
    Loan {
        member: String,
        terms: NewLoan,
    },
    Payment {
        loan: LoanId,
        payment: NewPayment,
    },
}

impl MovementRecord {
    pub fn parse(&self) -> Result<Movement> {
        let kind = self.kind.trim().to_lowercase();

        match kind.as_str() {
            "deposit" => Ok(Movement::Deposit {
                member: self.member()?,
                date: parse_date("date", require("date", self.date.as_deref())?)?,
                amount: parse_amount("amount", require("amount", self.amount.as_deref())?)?,
                frequency: self.detail(),
            }),
            "withdrawal" => Ok(Movement::Withdrawal {
                member: self.member()?,
                date: parse_date("date", require("date", self.date.as_deref())?)?,
                amount: parse_amount("amount", require("amount", self.amount.as_deref())?)?,
                reason: self.detail(),
            }),
            "loan" => {
                let start = parse_date("start date", require("date", self.date.as_deref())?)?;
                let principal =
                    parse_amount("principal", require("amount", self.amount.as_deref())?)?;

                let mut terms = NewLoan::new(start, principal);
                terms.end_date = non_blank(self.end_date.as_deref())
                    .map(|raw| parse_date("end date", raw))
                    .transpose()?;
                terms.interest_rate = non_blank(self.rate.as_deref())
                    .map(|raw| parse_amount("interest rate", raw))
                    .transpose()?;
                terms.interest_type = self.detail();
                if let Some(status) = non_blank(self.status.as_deref()) {
                    terms.status = status.to_string();
                }

                Ok(Movement::Loan {
                    member: self.member()?,
                    terms,
                })
            }
            "payment" => {
                let raw_loan = require("loan", self.loan.as_deref())?;
                let loan: LoanId = raw_loan
                    .parse()
                    .map_err(|_| LedgerError::invalid(format!("loan '{}' is not a loan id", raw_loan)))?;

                let date = parse_date("date", require("date", self.date.as_deref())?)?;
                let principal =
                    parse_amount("principal", require("amount", self.amount.as_deref())?)?;
                let interest =
                    parse_amount("interest", require("interest", self.interest.as_deref())?)?;
                let penalty = non_blank(self.penalty.as_deref())
                    .map(|raw| parse_amount("penalty", raw))
                    .transpose()?
                    .unwrap_or(Decimal4::ZERO);

                Ok(Movement::Payment {
                    loan,
                    payment: NewPayment::new(date, principal, interest).with_penalty(penalty),
                })
            }
            "" => Err(LedgerError::invalid("movement type is required")),
            other => Err(LedgerError::invalid(format!(
                "unknown movement type '{}'",
                other
            ))),
        }
    }

    fn member(&self) -> Result<String> {
        require("member", self.member.as_deref()).map(str::to_string)
    }

    fn detail(&self) -> Option<String> {
        non_blank(self.detail.as_deref()).map(str::to_string)
    }
}
