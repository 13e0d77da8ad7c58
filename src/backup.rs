//! Whole-file snapshot and restore of a file-backed ledger.
//!
//! Snapshots are opaque byte blobs. A restore accepts a blob only if it is a
//! SQLite file holding the ledger tables. Restoring while other processes
//! write to the same file is the caller's responsibility to prevent.

use crate::error::{LedgerError, Result};
use crate::store::Ledger;
use chrono::Local;
use log::{debug, info};
use rusqlite::{Connection, OpenFlags};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const SQLITE_HEADER: &[u8] = b"SQLite format 3\0";

const LEDGER_TABLES: [&str; 5] = ["members", "deposits", "withdrawals", "loans", "loan_payments"];

/// Opens `path` read-only and checks that every ledger table is present.
fn check_ledger_file(path: &Path) -> Result<()> {
    let unreadable = |e: rusqlite::Error| {
        LedgerError::invalid(format!("backup is not a readable ledger database: {}", e))
    };

    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(unreadable)?;
    let mut stmt = conn
        .prepare("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1")
        .map_err(unreadable)?;

    for table in LEDGER_TABLES {
        let found: i64 = stmt.query_row([table], |row| row.get(0)).map_err(unreadable)?;
        if found == 0 {
            return Err(LedgerError::invalid(format!(
                "backup has no '{}' table",
                table
            )));
        }
    }
    Ok(())
}

impl Ledger {
    fn file_path(&self) -> Result<&Path> {
        self.path()
            .ok_or_else(|| LedgerError::invalid("in-memory ledgers cannot be backed up"))
    }

    /// Returns the bytes of the database file.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let path = self.file_path()?;
        // Holding the lock keeps writers out while the file is read.
        let _conn = self.lock();
        let bytes = fs::read(path)?;
        debug!("Snapshot of {} ({} bytes)", path.display(), bytes.len());
        Ok(bytes)
    }

    /// Replaces the database file with `blob` and reopens the connection.
    ///
    /// The blob is written to a temporary file beside the database, checked,
    /// and renamed over it, so a failed restore leaves the old file intact.
    /// The live connection stays on the old file until the new one is open.
    pub fn restore(&self, blob: &[u8]) -> Result<()> {
        if !blob.starts_with(SQLITE_HEADER) {
            return Err(LedgerError::invalid("backup is not a SQLite database file"));
        }
        let path = self.file_path()?;
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));

        let mut conn = self.lock();

        let mut staged = tempfile::NamedTempFile::new_in(dir)?;
        staged.write_all(blob)?;
        staged.as_file().sync_all()?;
        check_ledger_file(staged.path())?;

        staged
            .persist(path)
            .map_err(|e| LedgerError::Io(e.error))?;
        *conn = Ledger::connect(path, self.config())?;

        info!("Restored ledger at {} ({} bytes)", path.display(), blob.len());
        Ok(())
    }

    /// Writes a snapshot to `dir/backup_YYYYMMDD_HHMM.db`, creating `dir`
    /// if needed, and returns the file's path.
    pub fn backup_to_dir(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let filename = format!("backup_{}.db", Local::now().format("%Y%m%d_%H%M"));
        let target = dir.join(filename);
        fs::write(&target, self.snapshot()?)?;

        info!("Backup written to {}", target.display());
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{date, dec, test_config, Fixture};

    #[test]
    fn test_in_memory_ledger_cannot_snapshot() {
        let f = Fixture::new();
        assert!(matches!(
            f.ledger.snapshot(),
            Err(LedgerError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_restore_rolls_back_to_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path().join("coop.db"), test_config()).unwrap();
        let ana = ledger.create_member("001", "Ana", "pw").unwrap();
        ledger
            .record_deposit(ana.id, date("2025-01-01"), dec("100"), None)
            .unwrap();

        let blob = ledger.snapshot().unwrap();
        assert!(blob.starts_with(SQLITE_HEADER));

        ledger
            .record_deposit(ana.id, date("2025-01-02"), dec("900"), None)
            .unwrap();
        ledger.create_member("002", "Luis", "pw").unwrap();
        assert_eq!(ledger.organization_summary().unwrap().member_count, 2);

        ledger.restore(&blob).unwrap();

        let org = ledger.organization_summary().unwrap();
        assert_eq!(org.member_count, 1);
        assert_eq!(org.total_deposits, dec("100"));

        // The reopened connection accepts writes.
        ledger
            .record_deposit(ana.id, date("2025-01-03"), dec("1"), None)
            .unwrap();
    }

    #[test]
    fn test_restore_rejects_garbage_and_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path().join("coop.db"), test_config()).unwrap();
        ledger.create_member("001", "Ana", "pw").unwrap();

        let err = ledger.restore(b"definitely not a database").unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
        assert_eq!(ledger.list_members().unwrap().len(), 1);
    }

    #[test]
    fn test_restore_rejects_corrupt_body_and_stays_usable() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path().join("coop.db"), test_config()).unwrap();
        let ana = ledger.create_member("001", "Ana", "pw").unwrap();

        let mut blob = SQLITE_HEADER.to_vec();
        blob.extend_from_slice(&[0xFF; 512]);
        let err = ledger.restore(&blob).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)), "{:?}", err);

        ledger
            .record_deposit(ana.id, date("2025-01-01"), dec("5"), None)
            .unwrap();
        assert_eq!(ledger.member_summary(ana.id).unwrap().total_deposits, dec("5"));
    }

    #[test]
    fn test_restore_rejects_sqlite_file_without_ledger_tables() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path().join("coop.db"), test_config()).unwrap();
        ledger.create_member("001", "Ana", "pw").unwrap();

        let other = dir.path().join("other.db");
        {
            let conn = Connection::open(&other).unwrap();
            conn.execute_batch("CREATE TABLE notes (body TEXT);").unwrap();
        }
        let blob = fs::read(&other).unwrap();
        assert!(blob.starts_with(SQLITE_HEADER));

        let err = ledger.restore(&blob).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)), "{:?}", err);
        assert_eq!(ledger.list_members().unwrap().len(), 1);
    }

    #[test]
    fn test_backup_to_dir_names_file_by_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path().join("coop.db"), test_config()).unwrap();
        ledger.create_member("001", "Ana", "pw").unwrap();

        let backups = dir.path().join("backups");
        let path = ledger.backup_to_dir(&backups).unwrap();

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("backup_") && name.ends_with(".db"), "{}", name);

        let copy = Ledger::open(&path, test_config()).unwrap();
        assert_eq!(copy.list_members().unwrap().len(), 1);
    }
}
