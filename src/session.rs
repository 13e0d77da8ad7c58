//! Administrator accounts and the explicit session passed by caller layers.
//!
//! The ledger operations themselves are actor-agnostic. A caller (web layer,
//! CLI) authenticates once, keeps the resulting [`Session`], and checks it
//! before invoking an operation.

use crate::credential::{hash_credential, verify_credential, verify_missing};
use crate::error::{LedgerError, Result};
use crate::member::{required, Member, MemberId};
use crate::store::Ledger;
use log::debug;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

pub type AdminId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Admin {
    pub id: AdminId,
    pub username: String,
    pub display_name: String,
    #[serde(skip_serializing)]
    pub credential_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Admin,
}

/// Identity and role of the authenticated actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub actor_id: i64,
    pub display_name: String,
    pub role: Role,
}

impl Session {
    pub fn member(member: &Member) -> Self {
        Session {
            actor_id: member.id,
            display_name: member.display_name.clone(),
            role: Role::Member,
        }
    }

    pub fn admin(admin: &Admin) -> Self {
        Session {
            actor_id: admin.id,
            display_name: admin.display_name.clone(),
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Administrative operations (recording movements, editing members).
    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(LedgerError::AuthFailed)
        }
    }

    /// Members may only read their own records; admins may read anyone's.
    pub fn require_access_to(&self, member_id: MemberId) -> Result<()> {
        match self.role {
            Role::Admin => Ok(()),
            Role::Member if self.actor_id == member_id => Ok(()),
            Role::Member => Err(LedgerError::AuthFailed),
        }
    }
}

impl Ledger {
    pub fn create_admin(&self, username: &str, display_name: &str, credential: &str) -> Result<Admin> {
        let username = required("username", username)?;
        let display_name = required("display name", display_name)?;
        let hash = hash_credential(credential, self.config().hash_cost)?;

        let id = self
            .write("create_admin", |tx| {
                tx.execute(
                    "INSERT INTO admins (username, display_name, credential_hash) VALUES (?1, ?2, ?3)",
                    params![username, display_name, hash],
                )?;
                Ok(tx.last_insert_rowid())
            })
            .map_err(|e| e.entity(format!("admin '{}'", username)))?;

        debug!("Created admin {} ({})", username, id);
        Ok(Admin {
            id,
            username,
            display_name,
            credential_hash: hash,
        })
    }

    /// Same failure semantics as [`Ledger::authenticate`].
    pub fn authenticate_admin(&self, username: &str, credential: &str) -> Result<Admin> {
        let username = username.trim();
        let admin = self.read(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, username, display_name, credential_hash FROM admins WHERE username = ?1",
                    [username],
                    |row| {
                        Ok(Admin {
                            id: row.get(0)?,
                            username: row.get(1)?,
                            display_name: row.get(2)?,
                            credential_hash: row.get(3)?,
                        })
                    },
                )
                .optional()?)
        })?;

        let matched = match &admin {
            Some(admin) => verify_credential(credential, &admin.credential_hash),
            None => verify_missing(credential, self.config().hash_cost),
        };
        match admin {
            Some(admin) if matched => Ok(admin),
            _ => Err(LedgerError::AuthFailed),
        }
    }
}
