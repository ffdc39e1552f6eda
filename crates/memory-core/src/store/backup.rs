//! Point-in-time file backups of the store.
//!
//! A backup is taken by:
//! 1. Checkpointing the WAL so the main database file is complete
//! 2. Copying the file into a fresh, never-overwritten path
//! 3. fsync of the copy
//! 4. Verifying size and SHA-256 digest against the live file

use crate::config::MigrationConfig;
use crate::error::{MemoryError, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Upper bound on `-N` suffixes tried before giving up on a free backup name.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// A verified backup of the store file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub sha256: String,
    pub created_at: String,
}

/// Backup file name for `db_path` at `now`, before collision handling.
///
/// `memory.db` becomes `memory.v1-backup-2026-10-19T101530.123Z.db`; a file
/// without a `.db` suffix keeps its full name and gains the marker and `.db`.
pub fn backup_path_for(db_path: &Path, now: DateTime<Utc>) -> PathBuf {
    backup_path_with_suffix(db_path, &timestamp_marker(now), None)
}

fn timestamp_marker(now: DateTime<Utc>) -> String {
    // ISO 8601 with the colons stripped so the name is valid on every platform.
    now.format("%Y-%m-%dT%H%M%S%.3fZ").to_string()
}

fn backup_path_with_suffix(db_path: &Path, marker: &str, attempt: Option<u32>) -> PathBuf {
    let file_name = db_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "store".to_string());
    let stem = file_name.strip_suffix(".db").unwrap_or(&file_name);
    let suffix = attempt.map(|n| format!("-{}", n)).unwrap_or_default();
    let backup_name = format!(
        "{}.{}-{}{}.db",
        stem,
        MigrationConfig::BACKUP_MARKER,
        marker,
        suffix
    );
    db_path.with_file_name(backup_name)
}

/// Copy the store file to a new backup path and verify the copy.
pub(crate) fn create_backup(conn: &Connection, db_path: &Path) -> Result<BackupArtifact> {
    if !db_path.exists() {
        return Err(MemoryError::backup("store file does not exist", db_path));
    }

    checkpoint_wal(conn, db_path)?;

    let now = Utc::now();
    let marker = timestamp_marker(now);
    let (backup_path, mut dest) = create_free_file(db_path, &marker)?;

    let copy_result = (|| -> io::Result<u64> {
        let mut src = File::open(db_path)?;
        let copied = io::copy(&mut src, &mut dest)?;
        dest.sync_all()?;
        Ok(copied)
    })();
    drop(dest);

    let copied = match copy_result {
        Ok(n) => n,
        Err(e) => {
            discard_partial(&backup_path);
            return Err(MemoryError::Backup {
                message: format!("Failed to copy store to {}", backup_path.display()),
                path: Some(backup_path),
                source: Some(e),
            });
        }
    };

    let verified = verify_copy(db_path, &backup_path, copied);
    let digest = match verified {
        Ok(digest) => digest,
        Err(e) => {
            discard_partial(&backup_path);
            return Err(e);
        }
    };

    info!(
        "Backed up store {} to {} ({} bytes)",
        db_path.display(),
        backup_path.display(),
        copied
    );

    Ok(BackupArtifact {
        path: backup_path,
        size_bytes: copied,
        sha256: digest,
        created_at: now.to_rfc3339(),
    })
}

fn checkpoint_wal(conn: &Connection, db_path: &Path) -> Result<()> {
    // Columns: busy, log frames, checkpointed frames.
    let busy: i64 = conn
        .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |row| row.get(0))
        .map_err(|e| MemoryError::backup(format!("WAL checkpoint failed: {}", e), db_path))?;
    if busy != 0 {
        return Err(MemoryError::backup(
            "WAL checkpoint could not complete; store is busy",
            db_path,
        ));
    }
    Ok(())
}

fn create_free_file(db_path: &Path, marker: &str) -> Result<(PathBuf, File)> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let candidate =
            backup_path_with_suffix(db_path, marker, (attempt > 0).then_some(attempt));
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!("Backup name taken, trying next: {}", candidate.display());
            }
            Err(e) => {
                return Err(MemoryError::Backup {
                    message: format!("Failed to create backup file {}", candidate.display()),
                    path: Some(candidate),
                    source: Some(e),
                });
            }
        }
    }
    Err(MemoryError::backup(
        "no free backup file name available",
        db_path,
    ))
}

fn verify_copy(db_path: &Path, backup_path: &Path, copied: u64) -> Result<String> {
    let backup_len = fs::metadata(backup_path)
        .map_err(|e| MemoryError::Backup {
            message: "Backup file missing after copy".to_string(),
            path: Some(backup_path.to_path_buf()),
            source: Some(e),
        })?
        .len();
    if backup_len != copied {
        return Err(MemoryError::backup(
            format!("Backup size {} does not match copied {}", backup_len, copied),
            backup_path,
        ));
    }

    let source_digest = sha256_file(db_path)?;
    let backup_digest = sha256_file(backup_path)?;
    if source_digest != backup_digest {
        return Err(MemoryError::backup(
            "Backup digest does not match the store file",
            backup_path,
        ));
    }
    Ok(backup_digest)
}

/// Hex SHA-256 digest of a file.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| MemoryError::Backup {
        message: format!("Failed to open {} for hashing", path.display()),
        path: Some(path.to_path_buf()),
        source: Some(e),
    })?;

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer).map_err(|e| MemoryError::Backup {
            message: format!("Failed to read {} for hashing", path.display()),
            path: Some(path.to_path_buf()),
            source: Some(e),
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn discard_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!("Failed to remove unverified backup {}: {}", path.display(), e);
    }
}
