//! Member registry: identity records, credentials and cascading deletion.

use crate::credential::{hash_credential, verify_credential, verify_missing};
use crate::error::{LedgerError, Result};
use crate::store::Ledger;
use log::debug;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

pub type MemberId = i64;

const MEMBER_COLUMNS: &str = "id, membership_number, display_name, credential_hash";

/// A person holding an account in the cooperative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    pub id: MemberId,

    /// External-facing identifier, unique across the cooperative.
    pub membership_number: String,

    pub display_name: String,

    /// Argon2id PHC string. Never serialized.
    #[serde(skip_serializing)]
    pub credential_hash: String,
}

impl Member {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Member {
            id: row.get(0)?,
            membership_number: row.get(1)?,
            display_name: row.get(2)?,
            credential_hash: row.get(3)?,
        })
    }
}

/// Row counts removed by [`Ledger::delete_member`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemberDeletion {
    pub deposits: usize,
    pub withdrawals: usize,
    pub loans: usize,
    pub payments: usize,
}

/// Trims `value` and rejects it if nothing is left.
pub(crate) fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::invalid(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

/// Fails with `NotFound` unless member `id` exists.
pub(crate) fn require_member(conn: &Connection, id: MemberId) -> Result<()> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM members WHERE id = ?1", [id], |row| row.get(0))
        .optional()?;
    match found {
        Some(_) => Ok(()),
        None => Err(LedgerError::not_found(format!("member {}", id))),
    }
}

fn member_by_id(conn: &Connection, id: MemberId) -> Result<Member> {
    conn.query_row(
        &format!("SELECT {} FROM members WHERE id = ?1", MEMBER_COLUMNS),
        [id],
        Member::from_row,
    )
    .map_err(|e| LedgerError::from(e).entity(format!("member {}", id)))
}

impl Ledger {
    /// Registers a new member.
    ///
    /// Fails with `InvalidInput` if any field is empty and `DuplicateKey` if
    /// the membership number is taken.
    pub fn create_member(
        &self,
        membership_number: &str,
        display_name: &str,
        credential: &str,
    ) -> Result<Member> {
        let number = required("membership number", membership_number)?;
        let name = required("display name", display_name)?;
        let hash = hash_credential(credential, self.config().hash_cost)?;

        let member = self
            .write("create_member", |tx| {
                tx.execute(
                    "INSERT INTO members (membership_number, display_name, credential_hash) \
                     VALUES (?1, ?2, ?3)",
                    params![number, name, hash],
                )?;
                member_by_id(tx, tx.last_insert_rowid())
            })
            .map_err(|e| e.entity(format!("membership number '{}'", number)))?;

        debug!("Created member {} ({})", member.membership_number, member.id);
        Ok(member)
    }

    pub fn get_member(&self, id: MemberId) -> Result<Member> {
        self.read(|conn| member_by_id(conn, id))
    }

    pub fn find_member_by_number(&self, membership_number: &str) -> Result<Member> {
        let number = membership_number.trim();
        self.read(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM members WHERE membership_number = ?1", MEMBER_COLUMNS),
                [number],
                Member::from_row,
            )
            .map_err(|e| LedgerError::from(e).entity(format!("member '{}'", number)))
        })
    }

    /// All members ordered by membership number.
    pub fn list_members(&self) -> Result<Vec<Member>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM members ORDER BY membership_number",
                MEMBER_COLUMNS
            ))?;
            let members = stmt
                .query_map([], Member::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(members)
        })
    }

    /// Changes a member's membership number and display name.
    pub fn update_member(
        &self,
        id: MemberId,
        membership_number: &str,
        display_name: &str,
    ) -> Result<Member> {
        let number = required("membership number", membership_number)?;
        let name = required("display name", display_name)?;

        self.write("update_member", |tx| {
            let changed = tx
                .execute(
                    "UPDATE members SET membership_number = ?1, display_name = ?2 WHERE id = ?3",
                    params![number, name, id],
                )
                .map_err(|e| {
                    LedgerError::from(e).entity(format!("membership number '{}'", number))
                })?;
            if changed == 0 {
                return Err(LedgerError::not_found(format!("member {}", id)));
            }
            member_by_id(tx, id)
        })
    }

    /// Replaces a member's credential hash.
    pub fn reset_credential(&self, id: MemberId, new_credential: &str) -> Result<()> {
        let hash = hash_credential(new_credential, self.config().hash_cost)?;

        self.write("reset_credential", |tx| {
            let changed = tx.execute(
                "UPDATE members SET credential_hash = ?1 WHERE id = ?2",
                params![hash, id],
            )?;
            if changed == 0 {
                return Err(LedgerError::not_found(format!("member {}", id)));
            }
            Ok(())
        })?;

        debug!("Reset credential for member {}", id);
        Ok(())
    }

    /// Deletes a member together with its deposits, withdrawals, loans and
    /// the payments of those loans, all in one transaction.
    pub fn delete_member(&self, id: MemberId) -> Result<MemberDeletion> {
        let removed = self.write("delete_member", |tx| {
            require_member(tx, id)?;

            let payments = tx.execute(
                "DELETE FROM loan_payments \
                 WHERE loan_id IN (SELECT id FROM loans WHERE member_id = ?1)",
                [id],
            )?;
            let loans = tx.execute("DELETE FROM loans WHERE member_id = ?1", [id])?;
            let deposits = tx.execute("DELETE FROM deposits WHERE member_id = ?1", [id])?;
            let withdrawals = tx.execute("DELETE FROM withdrawals WHERE member_id = ?1", [id])?;
            tx.execute("DELETE FROM members WHERE id = ?1", [id])?;

            Ok(MemberDeletion {
                deposits,
                withdrawals,
                loans,
                payments,
            })
        })?;

        debug!("Deleted member {}: {:?}", id, removed);
        Ok(removed)
    }

    /// Returns the member if `credential` matches.
    ///
    /// Unknown numbers and wrong credentials both fail with `AuthFailed`.
    pub fn authenticate(&self, membership_number: &str, credential: &str) -> Result<Member> {
        let member = match self.find_member_by_number(membership_number) {
            Ok(member) => member,
            Err(LedgerError::NotFound(_)) => {
                verify_missing(credential, self.config().hash_cost);
                return Err(LedgerError::AuthFailed);
            }
            Err(e) => return Err(e),
        };

        if verify_credential(credential, &member.credential_hash) {
            Ok(member)
        } else {
            Err(LedgerError::AuthFailed)
        }
    }
}
